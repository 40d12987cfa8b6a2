//! Best-effort DDL: every statement is attempted and reported on its own.
//! Partially applied states are expected and stay visible; nothing is rolled back.
use std::collections::HashMap;
use tracing::{info, instrument, warn};

use super::probe::{probe_table, ProbeOutcome};
use super::report::Report;
use super::RunMode;
use crate::store::{ErrorKind, Store};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub label: String,
    pub sql: String,
    /// Skip the statement when this table already exists.
    pub guard_table: Option<String>,
}

impl Statement {
    pub fn new(label: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            sql: sql.into(),
            guard_table: None,
        }
    }

    pub fn unless_exists(mut self, table: impl Into<String>) -> Self {
        self.guard_table = Some(table.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Applied,
    /// Dry run: the statement was shown, not sent.
    Planned,
    Skipped(String),
    Failed { kind: ErrorKind, detail: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub label: String,
    pub sql: String,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MigrationReport {
    pub steps: Vec<StepResult>,
}

impl MigrationReport {
    pub fn applied(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.outcome == StepOutcome::Applied)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.failures().count()
    }

    pub fn skipped(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Skipped(_)))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepResult> {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Failed { .. }))
    }

    /// True when statements failed because the SQL RPC is not installed.
    pub fn sql_rpc_missing(&self) -> bool {
        self.failures().any(|s| {
            matches!(
                s.outcome,
                StepOutcome::Failed {
                    kind: ErrorKind::MissingFunction,
                    ..
                }
            )
        })
    }

    pub fn to_report(&self, title: &str, sql_rpc: &str) -> Report {
        let mut report = Report::new(title);
        for step in &self.steps {
            match &step.outcome {
                StepOutcome::Applied => report.ok(format!("{}: applied", step.label)),
                StepOutcome::Planned => {
                    report.info(format!("{}: would run", step.label));
                    report.remediation(&step.sql);
                }
                StepOutcome::Skipped(why) => {
                    report.info(format!("{}: skipped ({why})", step.label))
                }
                StepOutcome::Failed { kind, detail } => {
                    report.fail(format!("{}: {kind}: {detail}", step.label))
                }
            }
        }
        if self.failed() > 0 {
            report.info(format!(
                "{} applied, {} skipped, {} failed; rerun once the cause is fixed",
                self.applied(),
                self.skipped(),
                self.failed()
            ));
            report.info("manual fallback: open the dashboard SQL editor and run:");
            if self.sql_rpc_missing() {
                report.remediation(&sql_rpc_definition(sql_rpc));
            }
            for step in self.failures() {
                report.remediation(&format!("-- {}\n{};", step.label, step.sql.trim_end_matches(';')));
            }
        }
        report
    }
}

/// Helper function the raw-SQL escape hatch calls; service-role only.
pub fn sql_rpc_definition(name: &str) -> String {
    format!(
        "CREATE OR REPLACE FUNCTION public.{name}(sql text)\n\
         RETURNS void LANGUAGE plpgsql SECURITY DEFINER AS $$\n\
         BEGIN\n  EXECUTE sql;\nEND;\n$$;\n\
         REVOKE ALL ON FUNCTION public.{name}(text) FROM public, anon, authenticated;"
    )
}

/// Attempt every statement in order; a failure never stops the ones after it.
#[instrument(skip(store, statements), fields(statements = statements.len()))]
pub async fn apply_statements(
    store: &dyn Store,
    statements: &[Statement],
    mode: RunMode,
) -> MigrationReport {
    let mut guards: HashMap<String, ProbeOutcome> = HashMap::new();
    let mut report = MigrationReport::default();

    for stmt in statements {
        if let Some(table) = &stmt.guard_table {
            if !guards.contains_key(table) {
                let outcome = probe_table(store, table).await;
                guards.insert(table.clone(), outcome);
            }
            if let Some(outcome) = guards.get(table) {
                if outcome.exists() {
                    report.steps.push(StepResult {
                        label: stmt.label.clone(),
                        sql: stmt.sql.clone(),
                        outcome: StepOutcome::Skipped(format!("{table} {outcome}")),
                    });
                    continue;
                }
            }
        }

        let outcome = match mode {
            RunMode::DryRun => StepOutcome::Planned,
            RunMode::Execute => match store.exec_sql(&stmt.sql).await {
                Ok(()) => {
                    info!(label = %stmt.label, "statement applied");
                    StepOutcome::Applied
                }
                Err(e) => {
                    warn!(label = %stmt.label, error = %e, "statement failed; continuing");
                    StepOutcome::Failed {
                        kind: e.kind(),
                        detail: e.detail(),
                    }
                }
            },
        };
        report.steps.push(StepResult {
            label: stmt.label.clone(),
            sql: stmt.sql.clone(),
            outcome,
        });
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn statements() -> Vec<Statement> {
        vec![
            Statement::new("one", "CREATE TABLE IF NOT EXISTS a (id int)"),
            Statement::new("two", "CREATE TABLE IF NOT EXISTS b (id int) BROKEN"),
            Statement::new("three", "CREATE INDEX IF NOT EXISTS c_idx ON c (id)"),
            Statement::new("four", "ALTER TABLE d ADD COLUMN IF NOT EXISTS x text"),
        ]
    }

    #[tokio::test]
    async fn failure_of_one_statement_does_not_stop_the_rest() {
        let store = MemoryStore::new().fail_sql_containing("BROKEN");
        let report = apply_statements(&store, &statements(), RunMode::Execute).await;
        assert_eq!(report.steps.len(), 4);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.applied(), 3);
        assert_eq!(store.executed_sql.lock().unwrap().len(), 3);
        assert_eq!(report.steps[1].label, "two");
    }

    #[tokio::test]
    async fn failure_count_matches_failing_statements() {
        let store = MemoryStore::new()
            .fail_sql_containing("BROKEN")
            .fail_sql_containing("c_idx");
        let report = apply_statements(&store, &statements(), RunMode::Execute).await;
        assert_eq!(report.failed(), 2);
        let text = report.to_report("migrate", "exec_sql").to_string();
        assert!(text.contains("-- two"));
        assert!(text.contains("-- three"));
        assert!(!text.contains("CREATE OR REPLACE FUNCTION"));
    }

    #[tokio::test]
    async fn dry_run_sends_nothing() {
        let store = MemoryStore::new();
        let report = apply_statements(&store, &statements(), RunMode::DryRun).await;
        assert!(report
            .steps
            .iter()
            .all(|s| s.outcome == StepOutcome::Planned));
        assert!(store.executed_sql.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn existing_guard_table_skips_its_ddl() {
        let store = MemoryStore::new().with_table("a", vec![]);
        let stmts = vec![
            Statement::new("create a", "CREATE TABLE a (id int)").unless_exists("a"),
            Statement::new("create e", "CREATE TABLE e (id int)").unless_exists("e"),
        ];
        let report = apply_statements(&store, &stmts, RunMode::Execute).await;
        assert!(matches!(report.steps[0].outcome, StepOutcome::Skipped(_)));
        assert_eq!(report.steps[1].outcome, StepOutcome::Applied);
        assert_eq!(
            store.executed_sql.lock().unwrap().as_slice(),
            ["CREATE TABLE e (id int)"]
        );
    }

    #[tokio::test]
    async fn missing_rpc_prints_manual_instructions() {
        let store = MemoryStore::without_sql_rpc();
        let report = apply_statements(&store, &statements(), RunMode::Execute).await;
        assert_eq!(report.failed(), 4);
        assert!(report.sql_rpc_missing());
        let text = report.to_report("migrate", "exec_sql").to_string();
        assert!(text.contains("CREATE OR REPLACE FUNCTION public.exec_sql(sql text)"));
        assert!(text.contains("dashboard SQL editor"));
    }
}
