//! Head-only row counts, and the anon vs service-role visibility comparison.
use futures::future::join_all;
use std::fmt;

use super::probe::ProbeOutcome;
use super::report::Report;
use crate::store::{ErrorKind, Store};

pub async fn count_tables(store: &dyn Store, tables: &[&str]) -> Vec<(String, ProbeOutcome)> {
    let results = join_all(tables.iter().map(|t| store.count(t, &[]))).await;
    tables
        .iter()
        .zip(results)
        .map(|(t, r)| (t.to_string(), ProbeOutcome::from_result(r)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RlsVerdict {
    /// Both keys see the same number of rows.
    Open(u64),
    /// Policy hides some rows from the public key.
    Filtered { anon: u64, service: u64 },
    /// Public key is refused outright.
    Denied,
    Missing,
    Inconclusive(String),
}

impl fmt::Display for RlsVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RlsVerdict::Open(n) => write!(f, "anon sees all {n} rows"),
            RlsVerdict::Filtered { anon, service } => {
                write!(f, "anon sees {anon} of {service} rows")
            }
            RlsVerdict::Denied => f.write_str("anon denied"),
            RlsVerdict::Missing => f.write_str("missing"),
            RlsVerdict::Inconclusive(why) => write!(f, "inconclusive: {why}"),
        }
    }
}

pub fn rls_verdict(anon: &ProbeOutcome, service: &ProbeOutcome) -> RlsVerdict {
    let rows = |o: &ProbeOutcome| match o {
        ProbeOutcome::ExistsWithRows(n) => Some(*n),
        ProbeOutcome::ExistsEmpty => Some(0),
        _ => None,
    };
    match (anon, service) {
        (ProbeOutcome::Missing, _) | (_, ProbeOutcome::Missing) => RlsVerdict::Missing,
        (
            ProbeOutcome::OtherError {
                kind: ErrorKind::Permission,
                ..
            },
            _,
        ) => RlsVerdict::Denied,
        _ => match (rows(anon), rows(service)) {
            (Some(a), Some(s)) if a >= s => RlsVerdict::Open(s),
            (Some(a), Some(s)) => RlsVerdict::Filtered { anon: a, service: s },
            _ => RlsVerdict::Inconclusive(format!("anon: {anon}; service: {service}")),
        },
    }
}

/// Count each table with both keys and classify what RLS lets the public key see.
pub async fn compare_visibility(
    anon: &dyn Store,
    service: &dyn Store,
    tables: &[&str],
) -> Vec<(String, RlsVerdict)> {
    let (a, s) = futures::join!(count_tables(anon, tables), count_tables(service, tables));
    a.into_iter()
        .zip(s)
        .map(|((table, ao), (_, so))| {
            let v = rls_verdict(&ao, &so);
            (table, v)
        })
        .collect()
}

pub fn report_visibility(report: &mut Report, verdicts: &[(String, RlsVerdict)]) {
    for (table, v) in verdicts {
        match v {
            RlsVerdict::Open(_) => report.ok(format!("{table}: {v}")),
            RlsVerdict::Filtered { anon: 0, .. } => {
                report.warn(format!("{table}: {v}"));
                report.remediation(&format!(
                    "if the front-end must read {table}, add a SELECT policy, e.g.\n\
                     CREATE POLICY {table}_read ON public.{table} FOR SELECT TO anon, authenticated USING (true);"
                ));
            }
            RlsVerdict::Filtered { .. } => report.info(format!("{table}: {v}")),
            RlsVerdict::Denied => {
                report.fail(format!("{table}: {v}"));
                report.remediation(&format!(
                    "GRANT SELECT ON public.{table} TO anon, authenticated; then review its policies"
                ));
            }
            RlsVerdict::Missing => report.warn(format!("{table}: missing")),
            RlsVerdict::Inconclusive(_) => report.fail(format!("{table}: {v}")),
        }
    }
}
