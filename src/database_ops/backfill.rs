//! Column backfill driven by an ordered rule table: first matching rule wins,
//! otherwise the table's default applies. Rows that already carry a value are
//! never touched, so reruns converge to zero updates.
use itertools::Itertools;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use thiserror::Error;
use tracing::{info, instrument, warn};

use super::report::Report;
use super::RunMode;
use crate::model::Session;
use crate::store::{select_all, Filter, Select, Store, StoreError};

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("cannot read rules file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid rules file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("rule {index}: {reason}")]
    Rule { index: usize, reason: String },
}

#[derive(Debug, Deserialize)]
struct RawRule {
    column: String,
    #[serde(default)]
    contains: Option<String>,
    #[serde(default)]
    pattern: Option<String>,
    value: Value,
}

#[derive(Debug, Deserialize)]
struct RawRuleSet {
    target: String,
    rules: Vec<RawRule>,
    default: Value,
}

#[derive(Debug, Clone)]
pub enum Matcher {
    Contains(String),
    Pattern(Regex),
}

impl Matcher {
    fn matches(&self, text: &str) -> bool {
        match self {
            Matcher::Contains(needle) => text.contains(needle.as_str()),
            Matcher::Pattern(re) => re.is_match(text),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub column: String,
    pub matcher: Matcher,
    pub value: Value,
}

#[derive(Debug, Clone)]
pub struct RuleSet {
    pub target: String,
    pub rules: Vec<Rule>,
    pub default: Value,
}

fn cell_text(row: &Value, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

impl RuleSet {
    pub fn from_json(raw: &str) -> Result<Self, RuleError> {
        let raw: RawRuleSet = serde_json::from_str(raw)?;
        if raw.target.trim().is_empty() {
            return Err(RuleError::Rule {
                index: 0,
                reason: "target column is empty".into(),
            });
        }
        let mut rules = Vec::with_capacity(raw.rules.len());
        for (index, r) in raw.rules.into_iter().enumerate() {
            let matcher = match (r.contains, r.pattern) {
                (Some(c), None) => Matcher::Contains(c),
                (None, Some(p)) => Matcher::Pattern(Regex::new(&p).map_err(|e| RuleError::Rule {
                    index,
                    reason: e.to_string(),
                })?),
                _ => {
                    return Err(RuleError::Rule {
                        index,
                        reason: "exactly one of `contains` or `pattern` is required".into(),
                    })
                }
            };
            if r.value.is_null() {
                return Err(RuleError::Rule {
                    index,
                    reason: "value must not be null".into(),
                });
            }
            rules.push(Rule {
                column: r.column,
                matcher,
                value: r.value,
            });
        }
        Ok(Self {
            target: raw.target,
            rules,
            default: raw.default,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, RuleError> {
        let raw = std::fs::read_to_string(path).map_err(|source| RuleError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Every value the table can produce must be a valid `Session`.
    pub fn ensure_session_values(&self) -> Result<(), RuleError> {
        let check = |index: usize, v: &Value| {
            v.as_str()
                .ok_or_else(|| "session value must be a string".to_string())
                .and_then(|s| s.parse::<Session>().map(|_| ()))
                .map_err(|reason| RuleError::Rule { index, reason })
        };
        for (i, r) in self.rules.iter().enumerate() {
            check(i, &r.value)?;
        }
        check(self.rules.len(), &self.default)
    }

    /// Columns the rules read, so the fetch can select only what it needs.
    pub fn source_columns(&self) -> Vec<&str> {
        let mut cols: Vec<&str> = self.rules.iter().map(|r| r.column.as_str()).collect();
        cols.sort_unstable();
        cols.dedup();
        cols
    }

    /// Index of the matching rule (None = default) and the derived value.
    pub fn derive(&self, row: &Value) -> (Option<usize>, &Value) {
        for (i, rule) in self.rules.iter().enumerate() {
            if let Some(text) = cell_text(row, &rule.column) {
                if rule.matcher.matches(&text) {
                    return (Some(i), &rule.value);
                }
            }
        }
        (None, &self.default)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedUpdate {
    pub id: String,
    pub rule: Option<usize>,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BackfillPlan {
    pub updates: Vec<PlannedUpdate>,
    /// Rows skipped because the target already has a value.
    pub already_set: usize,
    pub without_id: usize,
}

pub fn plan_backfill(rules: &RuleSet, rows: &[Value]) -> BackfillPlan {
    let mut plan = BackfillPlan::default();
    for row in rows {
        if cell_text(row, &rules.target).is_some() {
            plan.already_set += 1;
            continue;
        }
        let Some(id) = cell_text(row, "id") else {
            plan.without_id += 1;
            continue;
        };
        let (rule, value) = rules.derive(row);
        plan.updates.push(PlannedUpdate {
            id,
            rule,
            value: value.clone(),
        });
    }
    plan
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BackfillReport {
    pub updated: usize,
    pub planned: usize,
    /// Update accepted but no row matched (deleted or already filled meanwhile).
    pub unchanged: usize,
    pub failed: Vec<(String, String)>,
}

/// Row-at-a-time updates; each failure is recorded and the loop moves on.
#[instrument(skip(store, plan), fields(updates = plan.updates.len()))]
pub async fn apply_backfill(
    store: &dyn Store,
    table: &str,
    target: &str,
    plan: &BackfillPlan,
    mode: RunMode,
) -> BackfillReport {
    let mut out = BackfillReport::default();
    for u in &plan.updates {
        if mode.is_dry_run() {
            out.planned += 1;
            continue;
        }
        // Guarding on NULL keeps a concurrent writer's value intact
        let filters = [Filter::eq("id", &u.id), Filter::is_null(target)];
        match store.update(table, &filters, &json!({ target: u.value })).await {
            Ok(0) => out.unchanged += 1,
            Ok(_) => {
                info!(id = %u.id, value = %u.value, "backfilled");
                out.updated += 1;
            }
            Err(e) => {
                warn!(id = %u.id, error = %e, "backfill update failed; continuing");
                out.failed.push((u.id.clone(), e.detail()));
            }
        }
    }
    out
}

fn selected_columns(rules: &RuleSet) -> String {
    ["id", rules.target.as_str()]
        .into_iter()
        .chain(rules.source_columns())
        .unique()
        .join(",")
}

/// Rows whose target column is NULL, optionally limited to one date.
pub async fn fetch_missing(
    store: &dyn Store,
    table: &str,
    rules: &RuleSet,
    extra: Vec<Filter>,
) -> Result<Vec<Value>, StoreError> {
    let query = Select::from(table)
        .columns(selected_columns(rules))
        .filter(Filter::is_null(rules.target.clone()))
        .filters(extra)
        .order_asc("id");
    select_all(store, &query).await
}

pub fn report_backfill(
    report: &mut Report,
    rules: &RuleSet,
    plan: &BackfillPlan,
    result: &BackfillReport,
    mode: RunMode,
) {
    report.info(format!(
        "{} rows need `{}`, {} already set",
        plan.updates.len(),
        rules.target,
        plan.already_set
    ));
    if plan.without_id > 0 {
        report.warn(format!("{} rows without id skipped", plan.without_id));
    }
    let defaulted = plan.updates.iter().filter(|u| u.rule.is_none()).count();
    if defaulted > 0 {
        report.warn(format!("{defaulted} rows matched no rule; default {} applied", rules.default));
    }
    match mode {
        RunMode::DryRun => {
            for u in &plan.updates {
                let via = u.rule.map(|i| format!("rule {i}")).unwrap_or_else(|| "default".into());
                report.info(format!("id={} -> {} ({via})", u.id, u.value));
            }
            if result.planned > 0 {
                report.info("dry run: rerun with --execute to write");
            } else {
                report.ok("nothing to backfill");
            }
        }
        RunMode::Execute => {
            report.ok(format!(
                "{} updated, {} unchanged, {} failed",
                result.updated,
                result.unchanged,
                result.failed.len()
            ));
            for (id, why) in &result.failed {
                report.fail(format!("update id={id}: {why}"));
            }
        }
    }
}
