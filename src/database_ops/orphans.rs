use chrono::NaiveDate;
use std::collections::HashSet;

use super::report::Report;
use crate::model::{parse_rows, Employee, PlanningEntry, Poste, RowId};
use crate::store::{select_all, Filter, Select, Store, StoreError};
use crate::util::env::Tables;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OrphanReport {
    pub scanned: usize,
    pub unknown_employee: Vec<RowId>,
    pub unknown_poste: Vec<RowId>,
    pub inactive_poste: Vec<RowId>,
}

pub fn find_orphans(entries: &[PlanningEntry], employees: &[Employee], postes: &[Poste]) -> OrphanReport {
    let emp_ids: HashSet<&RowId> = employees.iter().map(|e| &e.id).collect();
    let active_postes: HashSet<&RowId> = postes.iter().filter(|p| p.actif).map(|p| &p.id).collect();
    let all_postes: HashSet<&RowId> = postes.iter().map(|p| &p.id).collect();

    let mut out = OrphanReport {
        scanned: entries.len(),
        ..OrphanReport::default()
    };
    for e in entries {
        if !emp_ids.contains(&e.employee_id) {
            out.unknown_employee.push(e.id.clone());
        }
        if !all_postes.contains(&e.poste_id) {
            out.unknown_poste.push(e.id.clone());
        } else if !active_postes.contains(&e.poste_id) {
            out.inactive_poste.push(e.id.clone());
        }
    }
    out
}

/// Planning entries from `since` onward checked against employees and postes.
pub async fn scan(store: &dyn Store, tables: &Tables, since: NaiveDate) -> Result<OrphanReport, StoreError> {
    let planning = Select::from(tables.planning.as_str()).filter(Filter::gte("date", since));
    let employees = Select::from(tables.employees.as_str()).columns("id,actif");
    let postes = Select::from(tables.postes.as_str());
    let (p, e, s) = futures::try_join!(
        select_all(store, &planning),
        select_all(store, &employees),
        select_all(store, &postes)
    )?;
    let entries = parse_rows::<PlanningEntry>(p).rows;
    let employees = parse_rows::<Employee>(e).rows;
    let postes = parse_rows::<Poste>(s).rows;
    Ok(find_orphans(&entries, &employees, &postes))
}

pub fn report_orphans(report: &mut Report, o: &OrphanReport) {
    let ids = |v: &[RowId]| v.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(", ");
    report.info(format!("scanned {} planning entries", o.scanned));
    if o.unknown_employee.is_empty() && o.unknown_poste.is_empty() && o.inactive_poste.is_empty() {
        report.ok("every entry references a known employee and active poste");
        return;
    }
    if !o.unknown_employee.is_empty() {
        report.fail(format!("unknown employee: [{}]", ids(&o.unknown_employee)));
    }
    if !o.unknown_poste.is_empty() {
        report.fail(format!("unknown poste: [{}]", ids(&o.unknown_poste)));
    }
    if !o.inactive_poste.is_empty() {
        report.warn(format!("inactive poste: [{}]", ids(&o.inactive_poste)));
    }
}
