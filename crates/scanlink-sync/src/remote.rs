//! # Remote Store
//!
//! The remote side of replication: one record per barcode, reached over a
//! PostgREST-style HTTP surface.
//!
//! ## Requests
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  find    GET   <base>/rest/v1/barcode_scans?barcode_data=eq.<barcode>   │
//! │  create  POST  <base>/rest/v1/barcode_scans           200/201 = ok      │
//! │  update  PATCH <base>/rest/v1/barcode_scans?id=eq.<id> 200/204 = ok     │
//! │  ping    GET   <base>/rest/v1/barcode_scans?limit=1                     │
//! │  list    GET   <base>/rest/v1/barcode_scans?select=*                    │
//! │                                                                         │
//! │  Headers: apikey, Authorization: Bearer <key>, Prefer: return=minimal   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`RemoteStore`] is the seam the sync engine talks to; [`RestRemoteStore`]
//! is the HTTP implementation.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::config::RemoteSettings;
use crate::error::{SyncError, SyncResult};

/// Field map sent as a JSON object body.
pub type Fields = Map<String, Value>;

// =============================================================================
// Records
// =============================================================================

/// Primary key of a remote record. Numeric or textual depending on schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordId::Int(id) => write!(f, "{}", id),
            RecordId::Text(id) => f.write_str(id),
        }
    }
}

/// A record as returned by the existence check or a listing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteRecord {
    pub id: RecordId,

    pub barcode_data: String,

    /// Every other column, status pairs included.
    #[serde(flatten)]
    pub fields: Fields,
}

// =============================================================================
// Remote Store Trait
// =============================================================================

/// Operations the sync engine needs from the remote store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Looks up the record whose `barcode_data` equals `barcode`.
    async fn find_by_barcode(&self, barcode: &str) -> SyncResult<Option<RemoteRecord>>;

    /// Creates a record. An HTTP 400 maps to [`SyncError::SchemaMismatch`].
    async fn create(&self, fields: &Fields) -> SyncResult<()>;

    /// Updates only the given columns of record `id`.
    async fn update(&self, id: &RecordId, fields: &Fields) -> SyncResult<()>;

    /// Cheap request proving the endpoint and key work.
    async fn ping(&self) -> SyncResult<()>;

    /// Every record in the table.
    async fn list_records(&self) -> SyncResult<Vec<RemoteRecord>>;
}

// =============================================================================
// REST Implementation
// =============================================================================

/// HTTP client for the remote table.
#[derive(Debug, Clone)]
pub struct RestRemoteStore {
    http: Client,
    endpoint: Url,
    api_key: String,
}

impl RestRemoteStore {
    /// Builds a client from settings. URL and key are required.
    pub fn new(settings: &RemoteSettings) -> SyncResult<Self> {
        Self::with_client_builder(settings, Client::builder())
    }

    /// Like [`RestRemoteStore::new`], starting from a preconfigured builder
    /// (proxy, TLS roots). The request timeout comes from `settings`.
    pub fn with_client_builder(
        settings: &RemoteSettings,
        builder: reqwest::ClientBuilder,
    ) -> SyncResult<Self> {
        let raw_url = settings
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| SyncError::InvalidConfig("remote.url is not set".into()))?;
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| SyncError::InvalidConfig("remote.api_key is not set".into()))?;

        let endpoint = endpoint_url(raw_url, &settings.table)?;

        let http = builder
            .timeout(settings.timeout())
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint,
            api_key,
        })
    }

    /// Table endpoint requests are sent to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }
}

/// `<base>/rest/v1/<table>`, tolerant of a trailing slash on `base`.
pub fn endpoint_url(base: &str, table: &str) -> SyncResult<Url> {
    let mut base = base.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    let url = Url::parse(&base)?.join("rest/v1/")?.join(table)?;
    Ok(url)
}

async fn rejected(response: reqwest::Response) -> SyncError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    SyncError::RemoteRejected { status, body }
}

#[async_trait]
impl RemoteStore for RestRemoteStore {
    async fn find_by_barcode(&self, barcode: &str) -> SyncResult<Option<RemoteRecord>> {
        let filter = format!("eq.{}", barcode);
        let response = self
            .authorized(self.http.get(self.endpoint.clone()))
            .query(&[("barcode_data", filter.as_str())])
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(rejected(response).await);
        }

        let mut records: Vec<RemoteRecord> = response.json().await?;
        debug!(barcode, found = records.len(), "Remote lookup finished");
        Ok(if records.is_empty() {
            None
        } else {
            Some(records.swap_remove(0))
        })
    }

    async fn create(&self, fields: &Fields) -> SyncResult<()> {
        let response = self
            .authorized(self.http.post(self.endpoint.clone()))
            .header("Prefer", "return=minimal")
            .json(fields)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(()),
            StatusCode::BAD_REQUEST => {
                let body = response.text().await.unwrap_or_default();
                Err(SyncError::SchemaMismatch(body))
            }
            _ => Err(rejected(response).await),
        }
    }

    async fn update(&self, id: &RecordId, fields: &Fields) -> SyncResult<()> {
        let filter = format!("eq.{}", id);
        let response = self
            .authorized(self.http.patch(self.endpoint.clone()))
            .query(&[("id", filter.as_str())])
            .header("Prefer", "return=minimal")
            .json(fields)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
            _ => Err(rejected(response).await),
        }
    }

    async fn ping(&self) -> SyncResult<()> {
        let response = self
            .authorized(self.http.get(self.endpoint.clone()))
            .query(&[("limit", "1")])
            .send()
            .await?;

        if response.status() == StatusCode::OK {
            Ok(())
        } else {
            Err(rejected(response).await)
        }
    }

    async fn list_records(&self) -> SyncResult<Vec<RemoteRecord>> {
        let response = self
            .authorized(self.http.get(self.endpoint.clone()))
            .query(&[("select", "*")])
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(rejected(response).await);
        }

        let records: Vec<RemoteRecord> = response.json().await?;
        debug!(count = records.len(), "Remote listing finished");
        Ok(records)
    }
}

// =============================================================================
// Tests
// =============================================================================
