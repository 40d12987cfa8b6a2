use anyhow::Result;

use super::connect;
use crate::database_ops::counts;
use crate::database_ops::report::Report;
use crate::util::env::{KeyRole, Tables};

#[derive(Debug, Clone, Default)]
pub struct RlsCheckConfig {
    pub tables: Option<Vec<String>>,
}

/// Needs both keys: the anon view is compared against the service-role view.
pub async fn run(cfg: RlsCheckConfig) -> Result<()> {
    let anon = connect("rls-check", KeyRole::Anon)?;
    let service = connect("rls-check", KeyRole::ServiceRole)?;
    let tables = Tables::from_env();
    let names: Vec<&str> = match &cfg.tables {
        Some(list) => list.iter().map(String::as_str).collect(),
        None => tables.all(),
    };

    let verdicts = counts::compare_visibility(&anon, &service, &names).await;
    let mut report = Report::new("row-level security");
    counts::report_visibility(&mut report, &verdicts);
    report.print();
    Ok(())
}
