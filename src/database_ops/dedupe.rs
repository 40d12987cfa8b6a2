use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

use super::report::Report;
use super::RunMode;
use crate::model::{parse_rows, PlanningEntry, Rejected, RowId, SlotKey};
use crate::store::{select_all, Filter, Select, Store, StoreError};

#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateGroup {
    pub key: SlotKey,
    pub keep: RowId,
    pub remove: Vec<RowId>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DuplicatePlan {
    pub groups: Vec<DuplicateGroup>,
    pub scanned: usize,
}

impl DuplicatePlan {
    pub fn to_delete(&self) -> impl Iterator<Item = &RowId> {
        self.groups.iter().flat_map(|g| g.remove.iter())
    }

    pub fn delete_count(&self) -> usize {
        self.groups.iter().map(|g| g.remove.len()).sum()
    }
}

/// Group by (employee, poste, créneau, date) and keep the earliest-created
/// member of each group; ties on `created_at` keep the lowest id.
pub fn plan_duplicates(entries: &[PlanningEntry]) -> DuplicatePlan {
    let mut groups: BTreeMap<SlotKey, Vec<&PlanningEntry>> = BTreeMap::new();
    for entry in entries {
        groups.entry(entry.slot_key()).or_default().push(entry);
    }

    let mut plan = DuplicatePlan {
        groups: Vec::new(),
        scanned: entries.len(),
    };
    for (key, mut members) in groups {
        if members.len() <= 1 {
            continue;
        }
        members.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        let keep = members[0].id.clone();
        let remove = members[1..].iter().map(|e| e.id.clone()).collect();
        plan.groups.push(DuplicateGroup { key, keep, remove });
    }
    plan
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeleteReport {
    pub deleted: usize,
    pub would_delete: usize,
    /// Row already gone when we got to it.
    pub not_found: usize,
    pub failed: Vec<(RowId, String)>,
}

/// Delete planned duplicates one id at a time; nothing is deleted in `DryRun`.
#[instrument(skip(store, plan), fields(to_delete = plan.delete_count()))]
pub async fn apply_plan(
    store: &dyn Store,
    table: &str,
    plan: &DuplicatePlan,
    mode: RunMode,
) -> DeleteReport {
    let mut out = DeleteReport::default();
    for id in plan.to_delete() {
        if mode.is_dry_run() {
            out.would_delete += 1;
            continue;
        }
        match store.delete(table, &[Filter::eq("id", id)]).await {
            Ok(0) => {
                warn!(%id, "duplicate already gone");
                out.not_found += 1;
            }
            Ok(_) => {
                info!(%id, "duplicate deleted");
                out.deleted += 1;
            }
            Err(e) => {
                warn!(%id, error = %e, "delete failed; continuing");
                out.failed.push((id.clone(), e.detail()));
            }
        }
    }
    out
}

pub struct Fetched {
    pub entries: Vec<PlanningEntry>,
    pub rejected: Vec<Rejected>,
}

/// All planning rows for one day, oldest first.
pub async fn fetch_day(
    store: &dyn Store,
    table: &str,
    day: NaiveDate,
) -> Result<Fetched, StoreError> {
    let query = Select::from(table)
        .filter(Filter::eq("date", day))
        .order_asc("created_at");
    let parsed = parse_rows::<PlanningEntry>(select_all(store, &query).await?);
    Ok(Fetched {
        entries: parsed.rows,
        rejected: parsed.rejected,
    })
}

pub fn report_plan(report: &mut Report, plan: &DuplicatePlan, result: &DeleteReport, mode: RunMode) {
    report.info(format!(
        "scanned {} entries, {} duplicate groups",
        plan.scanned,
        plan.groups.len()
    ));
    for g in &plan.groups {
        let remove = g.remove.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ");
        report.warn(format!("{}: keep {} remove [{}]", g.key, g.keep, remove));
    }
    match mode {
        RunMode::DryRun => {
            if result.would_delete > 0 {
                report.info(format!(
                    "dry run: {} rows would be deleted; rerun with --execute to delete",
                    result.would_delete
                ));
            } else {
                report.ok("no duplicates");
            }
        }
        RunMode::Execute => {
            if result.deleted > 0 || result.not_found > 0 {
                report.ok(format!(
                    "deleted {} rows ({} already gone)",
                    result.deleted, result.not_found
                ));
            } else if result.failed.is_empty() {
                report.ok("no duplicates");
            }
            for (id, why) in &result.failed {
                report.fail(format!("delete id={id}: {why}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use chrono::{DateTime, Utc};
    use serde_json::{json, Value};

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn entry(id: i64, emp: &str, poste: i64, creneau: &str, created: &str) -> PlanningEntry {
        PlanningEntry {
            id: id.into(),
            employee_id: RowId::Text(emp.into()),
            poste_id: poste.into(),
            creneau: creneau.into(),
            date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            session: None,
            created_at: ts(created),
        }
    }

    fn row(e: &PlanningEntry) -> Value {
        serde_json::to_value(e).unwrap()
    }

    #[test]
    fn later_duplicate_is_flagged() {
        let rows = vec![
            entry(1, "A", 10, "8h", "2024-05-02T06:00:00Z"),
            entry(2, "A", 10, "8h", "2024-05-02T06:05:00Z"),
        ];
        let plan = plan_duplicates(&rows);
        assert_eq!(plan.groups.len(), 1);
        assert_eq!(plan.groups[0].keep, RowId::Int(1));
        assert_eq!(plan.to_delete().cloned().collect::<Vec<_>>(), vec![RowId::Int(2)]);
    }

    #[test]
    fn earliest_is_kept_regardless_of_input_order() {
        let rows = vec![
            entry(7, "A", 10, "8h", "2024-05-02T09:00:00Z"),
            entry(9, "A", 10, "8h", "2024-05-02T06:00:00Z"),
            entry(3, "A", 10, "8h", "2024-05-02T07:00:00Z"),
        ];
        let plan = plan_duplicates(&rows);
        assert_eq!(plan.groups[0].keep, RowId::Int(9));
        assert_eq!(plan.delete_count(), 2);
    }

    #[test]
    fn timestamp_ties_keep_lowest_id() {
        let rows = vec![
            entry(5, "A", 10, "8h", "2024-05-02T06:00:00Z"),
            entry(4, "A", 10, "8h", "2024-05-02T06:00:00Z"),
        ];
        assert_eq!(plan_duplicates(&rows).groups[0].keep, RowId::Int(4));
    }

    #[test]
    fn distinct_keys_flag_nothing() {
        let rows = vec![
            entry(1, "A", 10, "8h", "2024-05-02T06:00:00Z"),
            entry(2, "B", 10, "8h", "2024-05-02T06:00:00Z"),
            entry(3, "A", 11, "8h", "2024-05-02T06:00:00Z"),
            entry(4, "A", 10, "10h", "2024-05-02T06:00:00Z"),
        ];
        let plan = plan_duplicates(&rows);
        assert!(plan.groups.is_empty());
        assert_eq!(plan.scanned, 4);
    }

    #[tokio::test]
    async fn odd_session_labels_do_not_hide_duplicates() {
        let mut rows: Vec<Value> = vec![
            row(&entry(1, "A", 10, "8h", "2024-05-02T06:00:00Z")),
            row(&entry(2, "A", 10, "8h", "2024-05-02T06:05:00Z")),
        ];
        rows[1]["session"] = json!("soir");
        let store = MemoryStore::new().with_table("planning_cuisine", rows);
        let day = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let fetched = fetch_day(&store, "planning_cuisine", day).await.unwrap();
        assert!(fetched.rejected.is_empty());
        assert_eq!(plan_duplicates(&fetched.entries).delete_count(), 1);
    }

    #[tokio::test]
    async fn dry_run_deletes_nothing() {
        let rows = vec![
            entry(1, "A", 10, "8h", "2024-05-02T06:00:00Z"),
            entry(2, "A", 10, "8h", "2024-05-02T06:05:00Z"),
        ];
        let store = MemoryStore::new().with_table("planning_cuisine", rows.iter().map(row).collect());
        let plan = plan_duplicates(&rows);
        let res = apply_plan(&store, "planning_cuisine", &plan, RunMode::DryRun).await;
        assert_eq!(res.would_delete, 1);
        assert_eq!(res.deleted, 0);
        assert_eq!(store.rows("planning_cuisine").len(), 2);
    }

    #[tokio::test]
    async fn execute_deletes_and_continues_past_failures() {
        let rows = vec![
            entry(1, "A", 10, "8h", "2024-05-02T06:00:00Z"),
            entry(2, "A", 10, "8h", "2024-05-02T06:05:00Z"),
            entry(3, "A", 10, "8h", "2024-05-02T06:06:00Z"),
            entry(4, "B", 10, "8h", "2024-05-02T06:00:00Z"),
            entry(5, "B", 10, "8h", "2024-05-02T06:01:00Z"),
        ];
        let store = MemoryStore::new()
            .with_table("planning_cuisine", rows.iter().map(row).collect())
            .fail_writes_for_id("2");
        let day = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let fetched = fetch_day(&store, "planning_cuisine", day).await.unwrap();
        assert!(fetched.rejected.is_empty());
        let plan = plan_duplicates(&fetched.entries);
        let res = apply_plan(&store, "planning_cuisine", &plan, RunMode::Execute).await;
        assert_eq!(res.deleted, 2);
        assert_eq!(res.failed.len(), 1);
        assert_eq!(res.failed[0].0, RowId::Int(2));
        let left: Vec<i64> = store
            .rows("planning_cuisine")
            .iter()
            .map(|r| r["id"].as_i64().unwrap())
            .collect();
        assert_eq!(left, vec![1, 2, 4]);

        let mut report = Report::new("dedupe");
        report_plan(&mut report, &plan, &res, RunMode::Execute);
        assert!(report.has_failures());
    }

    #[tokio::test]
    async fn malformed_rows_are_rejected_not_deleted() {
        let store = MemoryStore::new().with_table(
            "planning_cuisine",
            vec![json!({"id": 1, "date": "2024-05-02", "creneau": "8h"})],
        );
        let day = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let fetched = fetch_day(&store, "planning_cuisine", day).await.unwrap();
        assert!(fetched.entries.is_empty());
        assert_eq!(fetched.rejected.len(), 1);
    }
}
