use anyhow::{Context, Result};
use chrono::NaiveDate;

use super::{connect_any, day_or_today};
use crate::database_ops::absences;
use crate::database_ops::migrations::MigrationSet;
use crate::database_ops::probe::report_missing;
use crate::database_ops::report::Report;
use crate::store::{ErrorKind, Store};
use crate::util::env::Tables;

#[derive(Debug, Clone, Default)]
pub struct AbsencesConfig {
    pub date: Option<NaiveDate>,
    /// Sweep the whole table instead of one day.
    pub all: bool,
}

pub async fn audit(store: &dyn Store, table: &str, cfg: &AbsencesConfig) -> Result<Report> {
    let (title, result) = if cfg.all {
        (format!("absences {table}"), absences::audit_all(store, table).await)
    } else {
        let day = day_or_today(cfg.date);
        (
            format!("absences {table} {day}"),
            absences::audit_day(store, table, day).await,
        )
    };

    let mut report = Report::new(title);
    match result {
        Ok(audit) => absences::report_audit(&mut report, &audit),
        Err(e) if e.kind() == ErrorKind::MissingRelation => {
            report_missing(&mut report, table, Some(MigrationSet::Absences))
        }
        Err(e) => return Err(e).with_context(|| format!("reading {table}")),
    }
    Ok(report)
}

pub async fn run(cfg: AbsencesConfig) -> Result<()> {
    let store = connect_any("absences")?;
    let table = Tables::from_env().absences;
    audit(&store, &table, &cfg).await?.print();
    Ok(())
}
