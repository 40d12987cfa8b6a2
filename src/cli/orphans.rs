use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};

use super::{connect_any, day_or_today};
use crate::database_ops::migrations::MigrationSet;
use crate::database_ops::orphans;
use crate::database_ops::probe::{self, report_missing, ProbeOutcome};
use crate::database_ops::report::Report;
use crate::store::{ErrorKind, Store};
use crate::util::env::Tables;

#[derive(Debug, Clone, Default)]
pub struct OrphansConfig {
    /// First day scanned (defaults to 30 days ago).
    pub since: Option<NaiveDate>,
}

pub async fn check(store: &dyn Store, tables: &Tables, since: NaiveDate) -> Result<Report> {
    let mut report = Report::new(format!("orphaned planning entries since {since}"));
    match orphans::scan(store, tables, since).await {
        Ok(found) => orphans::report_orphans(&mut report, &found),
        Err(e) if e.kind() == ErrorKind::MissingRelation => {
            // The joined read does not say which relation is absent
            let names = [
                tables.planning.as_str(),
                tables.employees.as_str(),
                tables.postes.as_str(),
            ];
            for (table, outcome) in probe::probe_tables(store, &names).await {
                if outcome == ProbeOutcome::Missing {
                    report_missing(&mut report, &table, MigrationSet::creating(tables, &table));
                }
            }
        }
        Err(e) => {
            return Err(e).with_context(|| format!("scanning {} since {since}", tables.planning))
        }
    }
    Ok(report)
}

pub async fn run(cfg: OrphansConfig) -> Result<()> {
    let store = connect_any("orphans")?;
    let tables = Tables::from_env();
    let since = cfg
        .since
        .unwrap_or_else(|| day_or_today(None) - Duration::days(30));
    check(&store, &tables, since).await?.print();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    #[tokio::test]
    async fn names_the_missing_table() {
        let tables = Tables::default();
        let store = MemoryStore::new()
            .with_table(&tables.planning, vec![])
            .with_table(&tables.employees, vec![]);
        let since = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let text = check(&store, &tables, since).await.unwrap().to_string();
        assert!(text.contains("[warn] postes_cuisine: missing"));
        assert!(text.contains("caddy-ops migrate planning --execute"));
        assert!(!text.contains("employes: missing"));
    }
}
