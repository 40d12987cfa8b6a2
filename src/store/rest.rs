use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_RANGE};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument};

use super::{Filter, Page, Select, Store, StoreError};
use crate::util::env::{self as env_util, ConfigError, Credentials, KeyRole};

fn truncate_for_log(mut s: String, max_len: usize) -> String {
    if s.len() > max_len {
        let mut cut = max_len;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push('…');
    }
    s
}

/// PostgREST error body (`{"code","message","details","hint"}`).
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

/// Hosted-store client over the PostgREST table API (`/rest/v1`).
#[derive(Debug, Clone)]
pub struct RestStore {
    rest_base: String,
    http: Client,
    role: KeyRole,
    sql_rpc: String,
}

impl RestStore {
    pub fn new(creds: &Credentials, role: KeyRole) -> Result<Self, ConfigError> {
        let key = creds.key_for(role)?;
        let timeout_secs: u64 = env_util::env_parse("CADDY_HTTP_TIMEOUT_SECS", 30);
        let sql_rpc = env_util::env_opt("CADDY_SQL_RPC").unwrap_or_else(|| "exec_sql".into());

        let mut headers = HeaderMap::new();
        let apikey = HeaderValue::from_str(key)
            .map_err(|_| ConfigError::Invalid(format!("{role} key contains invalid characters")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|_| ConfigError::Invalid(format!("{role} key contains invalid characters")))?;
        headers.insert("apikey", apikey);
        headers.insert(reqwest::header::AUTHORIZATION, bearer);

        let http = Client::builder()
            .user_agent(concat!("caddy-ops/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ConfigError::Invalid(format!("http client: {e}")))?;

        let rest_base = format!("{}/rest/v1", creds.url.as_str().trim_end_matches('/'));
        Ok(Self {
            rest_base,
            http,
            role,
            sql_rpc,
        })
    }

    /// Name of the raw-SQL function `exec_sql` calls.
    pub fn sql_rpc(&self) -> &str {
        &self.sql_rpc
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.rest_base, table)
    }

    fn request(&self, method: Method, table: &str, filters: &[Filter]) -> RequestBuilder {
        let pairs: Vec<(String, String)> = filters.iter().map(Filter::to_query_pair).collect();
        self.http
            .request(method, self.table_url(table))
            .header("Accept", "application/json")
            .query(&pairs)
    }

    async fn check(resp: Response) -> Result<Response, StoreError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(parse_error(status.as_u16(), &body))
    }

    async fn rows(resp: Response) -> Result<Vec<Value>, StoreError> {
        let body: Value = resp.json().await?;
        match body {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            other => Err(StoreError::Decode(truncate_for_log(other.to_string(), 300))),
        }
    }
}

fn parse_error(status: u16, body: &str) -> StoreError {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(api) => {
            let mut message = api.message.unwrap_or_else(|| "request failed".into());
            if let Some(details) = api.details.filter(|d| !d.is_empty()) {
                message = format!("{message} ({details})");
            }
            StoreError::Api {
                status,
                code: api.code,
                message,
                hint: api.hint,
            }
        }
        Err(_) => StoreError::Api {
            status,
            code: None,
            message: if body.trim().is_empty() {
                "empty response body".into()
            } else {
                truncate_for_log(body.to_string(), 500)
            },
            hint: None,
        },
    }
}

/// Total from `Content-Range: 0-2/17` or `*/0`.
fn total_from_headers(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.rsplit_once('/'))
        .and_then(|(_, total)| total.parse::<u64>().ok())
}

#[async_trait]
impl Store for RestStore {
    #[instrument(skip(self), fields(table = %query.table, role = %self.role))]
    async fn select(&self, query: &Select) -> Result<Page, StoreError> {
        let mut req = self
            .request(Method::GET, &query.table, &query.filters)
            .query(&[("select", query.columns.as_str())]);
        if !query.order.is_empty() {
            let order = query
                .order
                .iter()
                .map(|(c, asc)| format!("{c}.{}", if *asc { "asc" } else { "desc" }))
                .collect::<Vec<_>>()
                .join(",");
            req = req.query(&[("order", order)]);
        }
        if let Some(limit) = query.limit {
            req = req.query(&[("limit", limit)]);
        }
        if let Some(offset) = query.offset {
            req = req.query(&[("offset", offset)]);
        }
        if query.with_count {
            req = req.header("Prefer", "count=exact");
        }
        let resp = Self::check(req.send().await?).await?;
        let total = total_from_headers(resp.headers());
        let rows = Self::rows(resp).await?;
        debug!(rows = rows.len(), ?total, "select ok");
        Ok(Page { rows, total })
    }

    #[instrument(skip(self, filters), fields(role = %self.role))]
    async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64, StoreError> {
        let resp = self
            .request(Method::HEAD, table, filters)
            .header("Prefer", "count=exact")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            // HEAD carries no body; map the status alone
            let code = match status.as_u16() {
                404 => Some("42P01"),
                _ => None,
            };
            return Err(StoreError::api(status.as_u16(), code, format!("count on {table} failed")));
        }
        total_from_headers(resp.headers())
            .ok_or_else(|| StoreError::Decode("missing Content-Range total".into()))
    }

    #[instrument(skip(self, rows), fields(rows = rows.len(), role = %self.role))]
    async fn insert(&self, table: &str, rows: &[Value]) -> Result<Vec<Value>, StoreError> {
        let resp = self
            .request(Method::POST, table, &[])
            .header("Prefer", "return=representation")
            .json(rows)
            .send()
            .await?;
        Self::rows(Self::check(resp).await?).await
    }

    #[instrument(skip(self, filters, patch), fields(role = %self.role))]
    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: &Value,
    ) -> Result<usize, StoreError> {
        let resp = self
            .request(Method::PATCH, table, filters)
            .header("Prefer", "return=representation")
            .json(patch)
            .send()
            .await?;
        Ok(Self::rows(Self::check(resp).await?).await?.len())
    }

    #[instrument(skip(self, filters), fields(role = %self.role))]
    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize, StoreError> {
        let resp = self
            .request(Method::DELETE, table, filters)
            .header("Prefer", "return=representation")
            .send()
            .await?;
        Ok(Self::rows(Self::check(resp).await?).await?.len())
    }

    #[instrument(skip(self, sql), fields(rpc = %self.sql_rpc, role = %self.role))]
    async fn exec_sql(&self, sql: &str) -> Result<(), StoreError> {
        let url = format!("{}/rpc/{}", self.rest_base, self.sql_rpc);
        let resp = self
            .http
            .post(&url)
            .header("Accept", "application/json")
            .json(&json!({ "sql": sql }))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }
}
