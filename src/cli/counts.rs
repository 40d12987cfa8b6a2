use anyhow::Result;

use super::connect_any;
use crate::database_ops::counts;
use crate::database_ops::probe::ProbeOutcome;
use crate::database_ops::report::Report;
use crate::util::env::Tables;

#[derive(Debug, Clone, Default)]
pub struct CountsConfig {
    /// Optional comma-separated table filter.
    pub tables: Option<Vec<String>>,
}

pub async fn run(cfg: CountsConfig) -> Result<()> {
    let store = connect_any("counts")?;
    let tables = Tables::from_env();
    let names: Vec<&str> = match &cfg.tables {
        Some(list) => list.iter().map(String::as_str).collect(),
        None => tables.all(),
    };

    let mut report = Report::new("row counts");
    for (table, outcome) in counts::count_tables(&store, &names).await {
        match outcome {
            ProbeOutcome::ExistsWithRows(n) => report.ok(format!("{table:24} {n}")),
            ProbeOutcome::ExistsEmpty => report.info(format!("{table:24} 0")),
            ProbeOutcome::Missing => report.warn(format!("{table:24} missing")),
            other => report.fail(format!("{table:24} {other}")),
        }
    }
    report.print();
    Ok(())
}
