use anyhow::Result;
use itertools::Itertools;

use super::connect_any;
use crate::database_ops::probe::{self, ColumnProbe};
use crate::database_ops::report::Report;
use crate::util::env::Tables;

#[derive(Debug, Clone, Default)]
pub struct ProbeConfig {
    /// Restrict the probe to these tables (defaults to every configured table).
    pub tables: Option<Vec<String>>,
    /// Extra `table.column` checks; the planning `session` column is always checked.
    pub columns: Vec<String>,
}

fn split_column(raw: &str) -> Option<(&str, &str)> {
    let (table, column) = raw.split_once('.')?;
    (!table.is_empty() && !column.is_empty()).then_some((table, column))
}

/// The planning `session` check first, then the extras, each once.
fn column_checks(planning: &str, extra: &[String]) -> Vec<String> {
    std::iter::once(format!("{planning}.session"))
        .chain(extra.iter().cloned())
        .unique()
        .collect()
}

pub async fn run(cfg: ProbeConfig) -> Result<()> {
    let store = connect_any("probe")?;
    let tables = Tables::from_env();
    let names: Vec<&str> = match &cfg.tables {
        Some(list) => list.iter().map(String::as_str).collect(),
        None => tables.all(),
    };

    let mut report = Report::new("table probe");
    let outcomes = probe::probe_tables(&store, &names).await;
    probe::report_tables(&mut report, &outcomes);

    for col in &column_checks(&tables.planning, &cfg.columns) {
        let Some((table, column)) = split_column(col) else {
            report.warn(format!("{col}: expected table.column"));
            continue;
        };
        match probe::probe_column(&store, table, column).await {
            ColumnProbe::Present => report.ok(format!("{col}: present")),
            ColumnProbe::MissingColumn => {
                report.warn(format!("{col}: missing column"));
                report.remediation("apply the column with `caddy-ops migrate planning --execute`");
            }
            ColumnProbe::MissingTable => report.warn(format!("{col}: table missing")),
            other => report.fail(format!("{col}: {other}")),
        }
    }
    report.print();
    Ok(())
}
