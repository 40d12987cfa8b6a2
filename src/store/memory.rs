//! In-process `Store` for unit tests.
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use super::{Filter, Page, Select, Store, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<BTreeMap<String, Vec<Value>>>,
    /// SQL containing any of these fragments fails with a syntax error.
    failing_sql: Mutex<Vec<String>>,
    /// Row ids whose update/delete fails with a transient error.
    failing_ids: Mutex<HashSet<String>>,
    denied_tables: Mutex<HashSet<String>>,
    no_sql_rpc: bool,
    /// Emulates the server's `max-rows`: selects never return more than this.
    page_cap: Option<usize>,
    pub executed_sql: Mutex<Vec<String>>,
}

fn value_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn cmp_text(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

fn matches(f: &Filter, row: &Value) -> bool {
    let cell = row.get(f.column()).and_then(value_text);
    match (f, cell.as_deref()) {
        (Filter::IsNull(_), c) => c.is_none(),
        (Filter::NotNull(_), c) => c.is_some(),
        (_, None) => false,
        (Filter::Eq(_, v), Some(c)) => cmp_text(c, v) == Ordering::Equal,
        (Filter::Neq(_, v), Some(c)) => cmp_text(c, v) != Ordering::Equal,
        (Filter::Gt(_, v), Some(c)) => cmp_text(c, v) == Ordering::Greater,
        (Filter::Gte(_, v), Some(c)) => cmp_text(c, v) != Ordering::Less,
        (Filter::Lt(_, v), Some(c)) => cmp_text(c, v) == Ordering::Less,
        (Filter::Lte(_, v), Some(c)) => cmp_text(c, v) != Ordering::Greater,
        (Filter::In(_, vs), Some(c)) => vs.iter().any(|v| cmp_text(c, v) == Ordering::Equal),
    }
}

fn missing(table: &str) -> StoreError {
    StoreError::api(
        404,
        Some("42P01"),
        format!("relation \"public.{table}\" does not exist"),
    )
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose raw-SQL RPC is not installed.
    pub fn without_sql_rpc() -> Self {
        Self {
            no_sql_rpc: true,
            ..Self::default()
        }
    }

    pub fn with_table(self, name: &str, rows: Vec<Value>) -> Self {
        self.tables.lock().unwrap().insert(name.to_string(), rows);
        self
    }

    pub fn fail_sql_containing(self, fragment: &str) -> Self {
        self.failing_sql.lock().unwrap().push(fragment.to_string());
        self
    }

    pub fn fail_writes_for_id(self, id: &str) -> Self {
        self.failing_ids.lock().unwrap().insert(id.to_string());
        self
    }

    pub fn with_page_cap(mut self, cap: usize) -> Self {
        self.page_cap = Some(cap);
        self
    }

    pub fn deny(self, table: &str) -> Self {
        self.denied_tables.lock().unwrap().insert(table.to_string());
        self
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    fn guard(&self, table: &str) -> Result<(), StoreError> {
        if self.denied_tables.lock().unwrap().contains(table) {
            return Err(StoreError::api(
                401,
                Some("42501"),
                format!("permission denied for table {table}"),
            ));
        }
        if !self.tables.lock().unwrap().contains_key(table) {
            return Err(missing(table));
        }
        Ok(())
    }

    fn check_id_writable(&self, filters: &[Filter]) -> Result<(), StoreError> {
        let failing = self.failing_ids.lock().unwrap();
        for f in filters {
            if let Filter::Eq(col, v) = f {
                if col == "id" && failing.contains(v) {
                    return Err(StoreError::api(503, None, "upstream timeout"));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn select(&self, query: &Select) -> Result<Page, StoreError> {
        self.guard(&query.table)?;
        let tables = self.tables.lock().unwrap();
        let all = tables.get(&query.table).cloned().unwrap_or_default();
        if query.columns != "*" {
            for col in query.columns.split(',').map(str::trim) {
                if !all.is_empty() && all.iter().all(|r| r.get(col).is_none()) {
                    return Err(StoreError::api(
                        400,
                        Some("42703"),
                        format!("column {}.{col} does not exist", query.table),
                    ));
                }
            }
        }
        let mut rows: Vec<Value> = all
            .into_iter()
            .filter(|r| query.filters.iter().all(|f| matches(f, r)))
            .collect();
        for (col, asc) in query.order.iter().rev() {
            rows.sort_by(|a, b| {
                let x = a.get(col).and_then(value_text).unwrap_or_default();
                let y = b.get(col).and_then(value_text).unwrap_or_default();
                let o = cmp_text(&x, &y);
                if *asc {
                    o
                } else {
                    o.reverse()
                }
            });
        }
        let total = query.with_count.then_some(rows.len() as u64);
        let skip = query.offset.unwrap_or(0).min(rows.len());
        rows.drain(..skip);
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        if let Some(cap) = self.page_cap {
            rows.truncate(cap);
        }
        Ok(Page { rows, total })
    }

    async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64, StoreError> {
        self.guard(table)?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .get(table)
            .map(|rows| rows.iter().filter(|r| filters.iter().all(|f| matches(f, r))).count())
            .unwrap_or(0) as u64)
    }

    async fn insert(&self, table: &str, rows: &[Value]) -> Result<Vec<Value>, StoreError> {
        self.guard(table)?;
        let mut tables = self.tables.lock().unwrap();
        let target = tables.entry(table.to_string()).or_default();
        let mut next_id = target
            .iter()
            .filter_map(|r| r.get("id").and_then(Value::as_i64))
            .max()
            .unwrap_or(0);
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut row = row.clone();
            if let Value::Object(map) = &mut row {
                if !map.contains_key("id") {
                    next_id += 1;
                    map.insert("id".into(), Value::from(next_id));
                }
            }
            target.push(row.clone());
            out.push(row);
        }
        Ok(out)
    }

    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: &Value,
    ) -> Result<usize, StoreError> {
        self.guard(table)?;
        self.check_id_writable(filters)?;
        let mut tables = self.tables.lock().unwrap();
        let mut touched = 0;
        if let Some(rows) = tables.get_mut(table) {
            for row in rows.iter_mut().filter(|r| filters.iter().all(|f| matches(f, r))) {
                if let (Value::Object(dst), Value::Object(src)) = (row, patch) {
                    for (k, v) in src {
                        dst.insert(k.clone(), v.clone());
                    }
                    touched += 1;
                }
            }
        }
        Ok(touched)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize, StoreError> {
        self.guard(table)?;
        self.check_id_writable(filters)?;
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table.to_string()).or_default();
        let before = rows.len();
        rows.retain(|r| !filters.iter().all(|f| matches(f, r)));
        Ok(before - rows.len())
    }

    async fn exec_sql(&self, sql: &str) -> Result<(), StoreError> {
        if self.no_sql_rpc {
            return Err(StoreError::api(
                404,
                Some("PGRST202"),
                "Could not find the function public.exec_sql(sql) in the schema cache",
            ));
        }
        if let Some(frag) = self
            .failing_sql
            .lock()
            .unwrap()
            .iter()
            .find(|f| sql.contains(f.as_str()))
        {
            return Err(StoreError::api(
                400,
                Some("42601"),
                format!("syntax error at or near \"{frag}\""),
            ));
        }
        self.executed_sql.lock().unwrap().push(sql.to_string());
        Ok(())
    }
}
