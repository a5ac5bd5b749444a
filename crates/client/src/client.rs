//! HTTP implementation of [`RemoteStore`].
//!
//! `GET  {base}/api/tables?tableType=..&ownerId=..` → [`LoadResponse`]
//! `POST {base}/api/tables` with a [`SaveRequest`] → [`SaveResponse`]
//!
//! "Not found" is reported in-band (`exists: false`) rather than as a 404.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use tablesync_core::{Document, RawDocument, Scope};

use crate::auth::{load_auth, AuthCredentials};
use crate::error::SyncError;
use crate::store::{LoadOutcome, RemoteStore, SaveAck};

const TABLES_PATH: &str = "/api/tables";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Body of a load response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadResponse {
    pub exists: bool,
    #[serde(default)]
    pub data: Option<RawDocument>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Body of a save request: the scope plus the full document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest<'a> {
    #[serde(flatten)]
    pub scope: &'a Scope,
    pub data: &'a Document,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResponse {
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Table store over HTTP (async reqwest).
#[derive(Clone)]
pub struct HttpStore {
    http: reqwest::Client,
    api_base: String,
    token: String,
    headers: HeaderMap,
}

impl HttpStore {
    /// Create a store using saved auth credentials.
    pub fn from_saved_auth(timeout: Duration) -> Result<Self, SyncError> {
        let creds = load_auth().ok_or(SyncError::NotAuthenticated)?;
        Self::with_timeout(creds, timeout)
    }

    /// Create a store with explicit credentials and the default timeout.
    pub fn new(creds: AuthCredentials) -> Result<Self, SyncError> {
        Self::with_timeout(creds, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(creds: AuthCredentials, timeout: Duration) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .user_agent(format!("tablesync/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Network(format!("failed to create HTTP client: {}", e)))?;

        let mut store = Self {
            http,
            api_base: creds.api_base.trim_end_matches('/').to_string(),
            token: creds.token,
            headers: HeaderMap::new(),
        };
        if let Some(csrf) = creds.csrf_token {
            store = store.with_header("x-csrf-token", &csrf)?;
        }
        Ok(store)
    }

    /// Attach an extra header to every request (CSRF tokens and the like).
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, SyncError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| SyncError::Parse(format!("invalid header name {:?}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| SyncError::Parse(format!("invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn tables_url(&self) -> String {
        format!("{}{}", self.api_base, TABLES_PATH)
    }

    async fn post_document(&self, scope: &Scope, doc: &Document) -> Result<SaveAck, SyncError> {
        let response = self
            .http
            .post(self.tables_url())
            .bearer_auth(&self.token)
            .headers(self.headers.clone())
            .json(&SaveRequest { scope, data: doc })
            .send()
            .await?;
        let response = check_status(response).await?;

        // An empty 2xx body is a valid ack; the server clock is just unknown.
        let text = response.text().await?;
        let body: SaveResponse = if text.trim().is_empty() {
            SaveResponse::default()
        } else {
            serde_json::from_str(&text).map_err(|e| SyncError::Parse(e.to_string()))?
        };

        Ok(SaveAck { updated_at: body.updated_at.unwrap_or_else(Utc::now) })
    }
}

#[async_trait]
impl RemoteStore for HttpStore {
    async fn load(&self, scope: &Scope) -> Result<LoadOutcome, SyncError> {
        let response = self
            .http
            .get(self.tables_url())
            .bearer_auth(&self.token)
            .headers(self.headers.clone())
            .query(&scope.query_pairs())
            .send()
            .await?;
        let response = check_status(response).await?;

        let body: LoadResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Parse(e.to_string()))?;

        match body.data {
            Some(raw) if body.exists => {
                let mut doc = Document::from(raw);
                if body.updated_at.is_some() {
                    doc.updated_at = body.updated_at;
                }
                log::debug!("loaded {}: {} columns, {} rows", scope, doc.columns.len(), doc.rows.len());
                Ok(LoadOutcome::Found(doc))
            }
            _ => Ok(LoadOutcome::NotFound),
        }
    }

    async fn save(
        &self,
        scope: &Scope,
        doc: &Document,
        cancel: &CancellationToken,
    ) -> Result<SaveAck, SyncError> {
        if cancel.is_cancelled() {
            return Err(SyncError::Aborted);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SyncError::Aborted),
            result = self.post_document(scope, doc) => result,
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SyncError::from_status(status.as_u16(), body))
}
