//! PostgREST-compatible HTTP backend.
//!
//! Reads are `GET {base}/rest/v1/{table}` with `select`, filter, `order`, and
//! `limit` query parameters. Writes use `POST`/`PATCH`/`DELETE` with
//! `Prefer: return=representation` so the affected rows come back. The
//! namespace is sent as the schema profile header (`Accept-Profile` for reads,
//! `Content-Profile` for writes).

use std::sync::Arc;

use async_trait::async_trait;
use fieldhouse_core::{Filter, Mutation, Row, Secret, TableQuery};
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde_json::Value;

use super::{BackendClient, ClientFactory, ClientOptions};
use crate::error::BackendError;

/// HTTP client bound to one base URL, credential, and namespace.
pub struct RestBackend {
    http: reqwest::Client,
    base: Url,
    namespace: String,
    api_key: Option<Secret>,
}

impl RestBackend {
    fn endpoint(&self, table: &str) -> Result<Url, BackendError> {
        self.base
            .join(&format!("rest/v1/{table}"))
            .map_err(|e| BackendError::Rejected(format!("invalid table path {table:?}: {e}")))
    }

    fn request(&self, method: Method, table: &str) -> Result<RequestBuilder, BackendError> {
        let profile_header = if method == Method::GET {
            "Accept-Profile"
        } else {
            "Content-Profile"
        };
        let mut builder = self
            .http
            .request(method, self.endpoint(table)?)
            .header(profile_header, &self.namespace);
        if let Some(key) = &self.api_key {
            builder = builder
                .header("apikey", key.expose())
                .bearer_auth(key.expose());
        }
        Ok(builder)
    }

    async fn send(&self, builder: RequestBuilder, table: &str) -> Result<Vec<Row>, BackendError> {
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            if status == StatusCode::NO_CONTENT {
                return Ok(Vec::new());
            }
            let body: Value = response
                .json()
                .await
                .map_err(|e| BackendError::Decode(e.to_string()))?;
            return rows_from_body(body);
        }
        let message = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Unauthorized(message),
            StatusCode::NOT_FOUND => BackendError::NotFound(format!("{table}: {message}")),
            _ => BackendError::Status {
                status: status.as_u16(),
                message,
            },
        })
    }
}

fn transport_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Transport(format!("request timed out: {err}"))
    } else {
        BackendError::Transport(err.to_string())
    }
}

fn rows_from_body(body: Value) -> Result<Vec<Row>, BackendError> {
    match body {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(row) => Ok(row),
                other => Err(BackendError::Decode(format!("expected object row, got {other}"))),
            })
            .collect(),
        Value::Object(row) => Ok(vec![row]),
        Value::Null => Ok(Vec::new()),
        other => Err(BackendError::Decode(format!("unexpected response body: {other}"))),
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|f| {
            (
                f.column.clone(),
                format!("{}.{}", f.op.as_str(), render_value(&f.value)),
            )
        })
        .collect()
}

/// Query-string pairs for a read.
fn select_params(query: &TableQuery) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), query.column_list())];
    params.extend(filter_params(&query.filters));
    if let Some(order) = &query.order {
        let direction = if order.ascending { "asc" } else { "desc" };
        params.push(("order".to_string(), format!("{}.{direction}", order.column)));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

#[async_trait]
impl BackendClient for RestBackend {
    async fn select(&self, query: &TableQuery) -> Result<Vec<Row>, BackendError> {
        let builder = self
            .request(Method::GET, &query.table)?
            .query(&select_params(query));
        self.send(builder, &query.table).await
    }

    async fn mutate(&self, mutation: &Mutation) -> Result<Vec<Row>, BackendError> {
        let table = mutation.table();
        let builder = match mutation {
            Mutation::Insert { rows, .. } => self.request(Method::POST, table)?.json(rows),
            Mutation::Update { filters, patch, .. } => self
                .request(Method::PATCH, table)?
                .query(&filter_params(filters))
                .json(patch),
            Mutation::Delete { filters, .. } => self
                .request(Method::DELETE, table)?
                .query(&filter_params(filters)),
        };
        let builder = builder.header("Prefer", "return=representation");
        self.send(builder, table).await
    }
}

/// Factory producing [`RestBackend`] clients.
#[derive(Debug, Default, Clone)]
pub struct RestClientFactory;

impl RestClientFactory {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ClientFactory for RestClientFactory {
    fn create_client(
        &self,
        url: &str,
        credentials: Option<&Secret>,
        options: &ClientOptions,
    ) -> Result<Arc<dyn BackendClient>, BackendError> {
        let raw = options.data_url.as_deref().unwrap_or(url);
        // `Url::join` replaces the last path segment unless the base ends in '/'.
        let normalized = if raw.ends_with('/') {
            raw.to_string()
        } else {
            format!("{raw}/")
        };
        let base = Url::parse(&normalized)
            .map_err(|e| BackendError::Rejected(format!("invalid url {raw:?}: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .pool_max_idle_per_host(options.pool_size as usize)
            .https_only(options.tls_enabled)
            .build()
            .map_err(|e| BackendError::Rejected(format!("failed to build http client: {e}")))?;

        Ok(Arc::new(RestBackend {
            http,
            base,
            namespace: options.namespace.clone(),
            api_key: credentials.cloned(),
        }))
    }
}
