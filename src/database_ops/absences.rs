use chrono::NaiveDate;
use tracing::instrument;

use super::report::Report;
use crate::model::{parse_rows, AbsenceEntry, Rejected};
use crate::store::{select_all, Filter, Select, Store, StoreError};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AbsenceAudit {
    /// Absences whose range covers the day.
    pub active: Vec<AbsenceEntry>,
    pub invalid: Vec<(AbsenceEntry, Vec<String>)>,
    pub rejected: Vec<Rejected>,
}

/// Absences overlapping `day`, split into consistent and inconsistent rows.
#[instrument(skip(store))]
pub async fn audit_day(
    store: &dyn Store,
    table: &str,
    day: NaiveDate,
) -> Result<AbsenceAudit, StoreError> {
    let query = Select::from(table)
        .filter(Filter::lte("date_debut", day))
        .filter(Filter::gte("date_fin", day))
        .order_asc("date_debut");
    let parsed = parse_rows::<AbsenceEntry>(select_all(store, &query).await?);
    Ok(classify(parsed.rows, parsed.rejected, Some(day)))
}

/// Whole-table consistency sweep; inverted ranges never match a date filter,
/// so this is the only way to find them.
#[instrument(skip(store))]
pub async fn audit_all(store: &dyn Store, table: &str) -> Result<AbsenceAudit, StoreError> {
    let rows = select_all(store, &Select::from(table).order_asc("date_debut")).await?;
    let parsed = parse_rows::<AbsenceEntry>(rows);
    Ok(classify(parsed.rows, parsed.rejected, None))
}

fn classify(rows: Vec<AbsenceEntry>, rejected: Vec<Rejected>, day: Option<NaiveDate>) -> AbsenceAudit {
    let mut audit = AbsenceAudit {
        rejected,
        ..AbsenceAudit::default()
    };
    for a in rows {
        let problems = a.validate();
        if !problems.is_empty() {
            audit.invalid.push((a, problems));
        } else if day.map_or(true, |d| a.covers(d)) {
            audit.active.push(a);
        }
    }
    audit
}

pub fn report_audit(report: &mut Report, audit: &AbsenceAudit) {
    report.info(format!("{} absences", audit.active.len()));
    for a in &audit.active {
        let repl = a
            .remplacant_id
            .as_ref()
            .map(|r| format!(" remplacant={r}"))
            .unwrap_or_default();
        report.ok(format!(
            "employee={} {}..{} {} [{}]{repl}",
            a.employee_id, a.date_debut, a.date_fin, a.type_absence, a.statut
        ));
    }
    for (a, problems) in &audit.invalid {
        report.fail(format!("absence id={}: {}", a.id, problems.join("; ")));
    }
    for r in &audit.rejected {
        report.fail(format!(
            "unparseable absence id={}: {}",
            r.id.as_deref().unwrap_or("?"),
            r.reason
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RowId;
    use crate::store::memory::MemoryStore;
    use serde_json::json;

    fn store() -> MemoryStore {
        MemoryStore::new().with_table(
            "absences_cuisine",
            vec![
                json!({"id": 1, "employee_id": 10, "date_debut": "2024-05-01", "date_fin": "2024-05-03",
                       "type_absence": "conge", "statut": "validee", "remplacant_id": 11}),
                json!({"id": 2, "employee_id": 12, "date_debut": "2024-05-04", "date_fin": "2024-05-06",
                       "type_absence": "maladie", "statut": "en_attente"}),
                json!({"id": 3, "employee_id": 13, "date_debut": "2024-05-09", "date_fin": "2024-05-01",
                       "type_absence": "conge", "statut": "validee"}),
                json!({"id": 4, "employee_id": 14, "date_debut": "2024-05-02", "date_fin": "2024-05-02",
                       "type_absence": "vacances", "statut": "validee"}),
                json!({"id": 5, "employee_id": 15, "date_debut": "not a date", "date_fin": "2024-05-02",
                       "type_absence": "conge", "statut": "validee"}),
            ],
        )
    }

    #[tokio::test]
    async fn day_audit_returns_covering_absences() {
        let day = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let audit = audit_day(&store(), "absences_cuisine", day).await.unwrap();
        let active: Vec<String> = audit.active.iter().map(|a| a.id.to_string()).collect();
        assert_eq!(active, vec!["1", "4"]);
        assert!(audit.invalid.is_empty());
    }

    #[tokio::test]
    async fn full_sweep_finds_inverted_ranges_and_bad_rows() {
        let audit = audit_all(&store(), "absences_cuisine").await.unwrap();
        assert_eq!(audit.active.len(), 3);
        let invalid: Vec<String> = audit.invalid.iter().map(|(a, _)| a.id.to_string()).collect();
        assert_eq!(invalid, vec!["3"]);
        assert_eq!(audit.rejected.len(), 1);

        let mut r = Report::new("absences");
        report_audit(&mut r, &audit);
        assert!(r.to_string().contains("date_fin 2024-05-01 is before date_debut 2024-05-09"));
    }

    #[tokio::test]
    async fn full_sweep_reads_every_page() {
        let mut rows: Vec<_> = (1..=12)
            .map(|i| {
                json!({"id": i, "employee_id": i, "date_debut": "2024-05-01", "date_fin": "2024-05-03",
                       "type_absence": "conge", "statut": "validee"})
            })
            .collect();
        rows.push(json!({"id": 13, "employee_id": 13, "date_debut": "2024-06-09", "date_fin": "2024-06-01",
                         "type_absence": "conge", "statut": "validee"}));
        let store = MemoryStore::new()
            .with_table("absences_cuisine", rows)
            .with_page_cap(5);
        let audit = audit_all(&store, "absences_cuisine").await.unwrap();
        assert_eq!(audit.active.len(), 12);
        assert_eq!(audit.invalid.len(), 1);
        assert_eq!(audit.invalid[0].0.id, RowId::Int(13));
    }
}
