//! Read-only existence checks run before anything mutates the schema.
use futures::future::join_all;
use std::fmt;
use tracing::{debug, instrument};

use super::migrations::MigrationSet;
use super::report::Report;
use crate::store::{ErrorKind, Select, Store, StoreError};

/// Rows read per probe; enough to tell "has data" from "empty".
pub const PROBE_LIMIT: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Table readable; carries the exact row count.
    ExistsWithRows(u64),
    ExistsEmpty,
    Missing,
    OtherError { kind: ErrorKind, detail: String },
}

impl ProbeOutcome {
    pub fn from_result(result: Result<u64, StoreError>) -> Self {
        match result {
            Ok(0) => ProbeOutcome::ExistsEmpty,
            Ok(n) => ProbeOutcome::ExistsWithRows(n),
            Err(e) if e.kind() == ErrorKind::MissingRelation => ProbeOutcome::Missing,
            Err(e) => ProbeOutcome::OtherError {
                kind: e.kind(),
                detail: e.detail(),
            },
        }
    }

    pub fn exists(&self) -> bool {
        matches!(self, ProbeOutcome::ExistsWithRows(_) | ProbeOutcome::ExistsEmpty)
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::ExistsWithRows(n) => write!(f, "exists, {n} rows"),
            ProbeOutcome::ExistsEmpty => f.write_str("exists, empty"),
            ProbeOutcome::Missing => f.write_str("missing"),
            ProbeOutcome::OtherError { kind, detail } => write!(f, "{kind}: {detail}"),
        }
    }
}

/// Capped read with exact count against one table.
#[instrument(skip(store))]
pub async fn probe_table(store: &dyn Store, table: &str) -> ProbeOutcome {
    let query = Select::from(table).limit(PROBE_LIMIT).with_count();
    let result = store
        .select(&query)
        .await
        .map(|page| page.total.unwrap_or(page.rows.len() as u64));
    let outcome = ProbeOutcome::from_result(result);
    debug!(%outcome, "probe");
    outcome
}

/// Independent tables are probed concurrently; results keep the input order.
pub async fn probe_tables(store: &dyn Store, tables: &[&str]) -> Vec<(String, ProbeOutcome)> {
    let outcomes = join_all(tables.iter().map(|t| probe_table(store, t))).await;
    tables
        .iter()
        .map(|t| t.to_string())
        .zip(outcomes)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnProbe {
    Present,
    MissingColumn,
    MissingTable,
    OtherError { kind: ErrorKind, detail: String },
}

impl fmt::Display for ColumnProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnProbe::Present => f.write_str("present"),
            ColumnProbe::MissingColumn => f.write_str("missing column"),
            ColumnProbe::MissingTable => f.write_str("missing table"),
            ColumnProbe::OtherError { kind, detail } => write!(f, "{kind}: {detail}"),
        }
    }
}

#[instrument(skip(store))]
pub async fn probe_column(store: &dyn Store, table: &str, column: &str) -> ColumnProbe {
    let query = Select::from(table).columns(column).limit(1);
    match store.select(&query).await {
        Ok(_) => ColumnProbe::Present,
        Err(e) => match e.kind() {
            ErrorKind::MissingColumn => ColumnProbe::MissingColumn,
            ErrorKind::MissingRelation => ColumnProbe::MissingTable,
            kind => ColumnProbe::OtherError {
                kind,
                detail: e.detail(),
            },
        },
    }
}

/// Warn about a missing table and say how to create it. `set` names the
/// migration set that owns the table when the caller knows it.
pub fn report_missing(report: &mut Report, table: &str, set: Option<MigrationSet>) {
    let set = set.map_or_else(|| "<set>".to_string(), |s| s.to_string());
    report.warn(format!("{table}: missing"));
    report.remediation(&format!(
        "create it with `caddy-ops migrate {set} --execute`, or run the set's SQL\n\
         (`caddy-ops migrate {set}` prints it) in the dashboard SQL editor"
    ));
}

/// Report lines for a batch of table probes.
pub fn report_tables(report: &mut Report, outcomes: &[(String, ProbeOutcome)]) {
    for (table, outcome) in outcomes {
        match outcome {
            ProbeOutcome::ExistsWithRows(_) => report.ok(format!("{table}: {outcome}")),
            ProbeOutcome::ExistsEmpty => report.info(format!("{table}: {outcome}")),
            ProbeOutcome::Missing => report_missing(report, table, None),
            ProbeOutcome::OtherError { kind, detail } => {
                report.fail(format!("{table}: {kind}: {detail}"));
                if *kind == ErrorKind::Permission {
                    report.remediation(
                        "adjust the table's access policy or rerun with the service-role key",
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::report::Status;
    use crate::store::memory::MemoryStore;
    use serde_json::json;

    fn store() -> MemoryStore {
        MemoryStore::new()
            .with_table(
                "planning_cuisine",
                (1..=5).map(|i| json!({"id": i, "creneau": "8h"})).collect(),
            )
            .with_table("absences_cuisine", vec![])
            .with_table("postes_cuisine", vec![json!({"id": 1, "nom": "Plonge"})])
            .deny("postes_cuisine")
    }

    #[tokio::test]
    async fn classifies_each_table_exactly_once() {
        let s = store();
        let out = probe_tables(
            &s,
            &["planning_cuisine", "absences_cuisine", "nope", "postes_cuisine"],
        )
        .await;
        assert_eq!(out[0].1, ProbeOutcome::ExistsWithRows(5));
        assert_eq!(out[1].1, ProbeOutcome::ExistsEmpty);
        assert_eq!(out[2].1, ProbeOutcome::Missing);
        assert!(matches!(
            out[3].1,
            ProbeOutcome::OtherError {
                kind: ErrorKind::Permission,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn probing_missing_table_has_no_side_effects() {
        let s = store();
        assert_eq!(probe_table(&s, "does_not_exist").await, ProbeOutcome::Missing);
        assert!(s.rows("does_not_exist").is_empty());
        assert_eq!(s.rows("planning_cuisine").len(), 5);
        assert!(s.executed_sql.lock().unwrap().is_empty());
    }

    #[test]
    fn permission_is_never_reported_as_missing() {
        let o = ProbeOutcome::from_result(Err(StoreError::api(
            401,
            Some("42501"),
            "permission denied for table x",
        )));
        assert!(!o.exists());
        assert_ne!(o, ProbeOutcome::Missing);
    }

    #[tokio::test]
    async fn column_probe_distinguishes_table_and_column() {
        let s = store();
        assert_eq!(
            probe_column(&s, "planning_cuisine", "creneau").await,
            ColumnProbe::Present
        );
        assert_eq!(
            probe_column(&s, "planning_cuisine", "session").await,
            ColumnProbe::MissingColumn
        );
        assert_eq!(
            probe_column(&s, "nope", "session").await,
            ColumnProbe::MissingTable
        );
    }

    #[test]
    fn missing_table_gets_remediation() {
        let mut r = Report::new("probe");
        report_tables(&mut r, &[("nope".into(), ProbeOutcome::Missing)]);
        assert_eq!(r.count(Status::Warn), 1);
        assert!(r.to_string().contains("migrate"));
    }
}
