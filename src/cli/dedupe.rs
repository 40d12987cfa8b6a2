use anyhow::{Context, Result};
use chrono::NaiveDate;

use super::{connect, day_or_today};
use crate::database_ops::dedupe;
use crate::database_ops::migrations::MigrationSet;
use crate::database_ops::probe::report_missing;
use crate::database_ops::report::Report;
use crate::database_ops::RunMode;
use crate::store::{ErrorKind, Store};
use crate::util::env::{KeyRole, Tables};

#[derive(Debug, Clone, Default)]
pub struct DedupeConfig {
    /// Day to reconcile (defaults to today).
    pub date: Option<NaiveDate>,
    pub execute: bool,
}

/// Plan and (in `Execute`) delete duplicates for one day of the planning table.
pub async fn reconcile(store: &dyn Store, tables: &Tables, day: NaiveDate, mode: RunMode) -> Result<Report> {
    let mut report = Report::new(format!("duplicates {} {day}", tables.planning));
    let fetched = match dedupe::fetch_day(store, &tables.planning, day).await {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::MissingRelation => {
            report_missing(&mut report, &tables.planning, Some(MigrationSet::Planning));
            return Ok(report);
        }
        Err(e) => return Err(e).with_context(|| format!("reading {} for {day}", tables.planning)),
    };
    let plan = dedupe::plan_duplicates(&fetched.entries);
    let result = dedupe::apply_plan(store, &tables.planning, &plan, mode).await;

    for r in &fetched.rejected {
        report.warn(format!(
            "unparseable row id={}: {} (left alone)",
            r.id.as_deref().unwrap_or("?"),
            r.reason
        ));
    }
    dedupe::report_plan(&mut report, &plan, &result, mode);
    Ok(report)
}

pub async fn run(cfg: DedupeConfig) -> Result<()> {
    let store = connect("dedupe", KeyRole::ServiceRole)?;
    let tables = Tables::from_env();
    let mode = RunMode::from_execute_flag(cfg.execute);
    reconcile(&store, &tables, day_or_today(cfg.date), mode).await?.print();
    Ok(())
}
