//! Remote data-store surface: the table API plus the raw-SQL escape hatch.
//!
//! Every operation in `database_ops` takes a `&dyn Store` so the client is an
//! explicit dependency; `RestStore` is the production implementation.
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use tracing::debug;

pub mod filter;
#[cfg(test)]
pub mod memory;
pub mod rest;

pub use filter::Filter;
pub use rest::RestStore;

/// Coarse error classes operators act on differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MissingRelation,
    MissingColumn,
    MissingFunction,
    Permission,
    Transient,
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::MissingRelation => "missing relation",
            ErrorKind::MissingColumn => "missing column",
            ErrorKind::MissingFunction => "missing function",
            ErrorKind::Permission => "permission denied",
            ErrorKind::Transient => "transient",
            ErrorKind::Other => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP {status}{}: {message}", code_suffix(.code))]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
        hint: Option<String>,
    },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected payload: {0}")]
    Decode(String),
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref().map(|c| format!(" [{c}]")).unwrap_or_default()
}

impl StoreError {
    pub fn api(status: u16, code: Option<&str>, message: impl Into<String>) -> Self {
        StoreError::Api {
            status,
            code: code.map(str::to_string),
            message: message.into(),
            hint: None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            StoreError::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Api { status, code, .. } => match code.as_deref() {
                Some("42P01") | Some("PGRST205") => ErrorKind::MissingRelation,
                Some("42703") | Some("PGRST204") => ErrorKind::MissingColumn,
                Some("42883") | Some("PGRST202") => ErrorKind::MissingFunction,
                Some("42501") => ErrorKind::Permission,
                _ if matches!(status, 401 | 403) => ErrorKind::Permission,
                _ if *status == 429 || *status >= 500 => ErrorKind::Transient,
                _ => ErrorKind::Other,
            },
            StoreError::Transport(_) => ErrorKind::Transient,
            StoreError::Decode(_) => ErrorKind::Other,
        }
    }

    /// Message plus hint, for operator-facing output.
    pub fn detail(&self) -> String {
        match self {
            StoreError::Api {
                hint: Some(hint), ..
            } => format!("{self} (hint: {hint})"),
            _ => self.to_string(),
        }
    }
}

/// A bounded read against one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub table: String,
    pub columns: String,
    pub filters: Vec<Filter>,
    pub order: Vec<(String, bool)>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub with_count: bool,
}

impl Select {
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: "*".into(),
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            with_count: false,
        }
    }

    pub fn columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = columns.into();
        self
    }

    pub fn filter(mut self, f: Filter) -> Self {
        self.filters.push(f);
        self
    }

    pub fn filters(mut self, fs: impl IntoIterator<Item = Filter>) -> Self {
        self.filters.extend(fs);
        self
    }

    pub fn order_asc(mut self, column: impl Into<String>) -> Self {
        self.order.push((column.into(), true));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: usize) -> Self {
        self.offset = Some(n);
        self
    }

    pub fn with_count(mut self) -> Self {
        self.with_count = true;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub rows: Vec<Value>,
    /// Exact total matching the filters, when requested.
    pub total: Option<u64>,
}

/// Rows requested per page by `select_all`; the server may cap pages lower.
pub const PAGE_SIZE: usize = 1000;

/// Every row matching `query`, read page by page.
///
/// The server truncates responses to its `max-rows` setting without saying so,
/// so the loop runs until the exact total is reached (or an empty page comes
/// back) rather than trusting a single response. `id` is appended to the
/// ordering so pages never overlap.
pub async fn select_all(store: &dyn Store, query: &Select) -> Result<Vec<Value>, StoreError> {
    let mut base = query.clone().with_count();
    base.limit = None;
    base.offset = None;
    if !base.order.iter().any(|(c, _)| c == "id") {
        base = base.order_asc("id");
    }

    let mut rows: Vec<Value> = Vec::new();
    let mut total: Option<u64> = None;
    loop {
        let page = store
            .select(&base.clone().limit(PAGE_SIZE).offset(rows.len()))
            .await?;
        if total.is_none() {
            total = page.total;
        }
        let fetched = page.rows.len();
        rows.extend(page.rows);
        let done = match total {
            Some(t) => rows.len() as u64 >= t,
            None => fetched < PAGE_SIZE,
        };
        if fetched == 0 || done {
            break;
        }
        debug!(table = %base.table, fetched = rows.len(), ?total, "paging");
    }
    Ok(rows)
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn select(&self, query: &Select) -> Result<Page, StoreError>;

    /// Head-only exact count.
    async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64, StoreError>;

    async fn insert(&self, table: &str, rows: &[Value]) -> Result<Vec<Value>, StoreError>;

    /// Returns the number of rows the patch touched.
    async fn update(&self, table: &str, filters: &[Filter], patch: &Value)
        -> Result<usize, StoreError>;

    /// Returns the number of rows removed.
    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize, StoreError>;

    /// Raw SQL through the remote-procedure escape hatch (DDL the table API cannot express).
    async fn exec_sql(&self, sql: &str) -> Result<(), StoreError>;
}
