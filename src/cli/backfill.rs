use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::PathBuf;

use super::{connect, day_or_today};
use crate::database_ops::backfill::{self, RuleSet};
use crate::database_ops::migrations::MigrationSet;
use crate::database_ops::probe::{self, report_missing, ColumnProbe};
use crate::database_ops::report::Report;
use crate::database_ops::RunMode;
use crate::store::{Filter, Store};
use crate::util::env::{self as env_util, ConfigError, KeyRole, Tables};

const SAMPLE_RULES: &str = "config/session_rules.sample.json";

#[derive(Debug, Clone, Default)]
pub struct BackfillConfig {
    /// Rules file; falls back to `CADDY_SESSION_RULES`.
    pub rules: Option<PathBuf>,
    /// Only rows of this day (defaults to today unless `all_dates`).
    pub date: Option<NaiveDate>,
    pub all_dates: bool,
    pub execute: bool,
}

fn load_rules(cfg: &BackfillConfig) -> Result<RuleSet, ConfigError> {
    let path = cfg
        .rules
        .clone()
        .or_else(|| env_util::env_opt("CADDY_SESSION_RULES").map(PathBuf::from))
        .ok_or_else(|| {
            ConfigError::Invalid(format!(
                "no session rules given; pass --rules or set CADDY_SESSION_RULES (see {SAMPLE_RULES})"
            ))
        })?;
    let rules = RuleSet::from_file(&path)
        .and_then(|r| r.ensure_session_values().map(|()| r))
        .map_err(|e| ConfigError::Invalid(format!("{}: {e}", path.display())))?;
    Ok(rules)
}

/// Probe the target column, then plan and apply the backfill on `table`.
pub async fn fill(store: &dyn Store, table: &str, rules: &RuleSet, cfg: &BackfillConfig) -> Result<Report> {
    let mode = RunMode::from_execute_flag(cfg.execute);
    let mut report = Report::new(format!("backfill {}.{}", table, rules.target));
    match probe::probe_column(store, table, &rules.target).await {
        ColumnProbe::Present => {}
        ColumnProbe::MissingColumn => {
            report.warn(format!("{table}.{}: column missing", rules.target));
            report.remediation("add it first: `caddy-ops migrate planning --execute`");
            return Ok(report);
        }
        ColumnProbe::MissingTable => {
            report_missing(&mut report, table, Some(MigrationSet::Planning));
            return Ok(report);
        }
        other => {
            report.fail(format!("{table}.{}: {other}", rules.target));
            return Ok(report);
        }
    }

    let extra = if cfg.all_dates {
        Vec::new()
    } else {
        let day = day_or_today(cfg.date);
        report.info(format!("limited to {day}"));
        vec![Filter::eq("date", day)]
    };
    let rows = backfill::fetch_missing(store, table, rules, extra)
        .await
        .with_context(|| format!("reading {table}"))?;
    let plan = backfill::plan_backfill(rules, &rows);
    let result = backfill::apply_backfill(store, table, &rules.target, &plan, mode).await;
    backfill::report_backfill(&mut report, rules, &plan, &result, mode);
    Ok(report)
}

pub async fn run(cfg: BackfillConfig) -> Result<()> {
    let rules = load_rules(&cfg)?;
    let store = connect("backfill-session", KeyRole::ServiceRole)?;
    let table = Tables::from_env().planning;
    fill(&store, &table, &rules, &cfg).await?.print();
    Ok(())
}
