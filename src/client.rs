use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::admin::{AdminRows, AdminSession, AdminTable};
use crate::error::ApiError;
use crate::session::SessionIdentity;
use crate::state::ApplicationState;
use crate::upload::DocumentUpload;

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub city: String,
    pub monthly_salary: u64,
    pub credit_score: u32,
    pub pre_approved_limit: u64,
}

#[derive(Debug, Serialize)]
struct CreateSessionRequest<'a> {
    customer_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateSessionResponse {
    session_id: String,
    /// Not every backend build echoes this; see `SessionTicket::user_id`.
    #[serde(default)]
    customer_id: Option<String>,
    #[serde(default)]
    state: Option<ApplicationState>,
}

#[derive(Debug, Deserialize)]
struct StateResponse {
    #[allow(dead_code)]
    session_id: String,
    state: ApplicationState,
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub user_id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatReply {
    pub response: String,
    /// Name of the backend sub-agent that produced the answer
    #[serde(default)]
    pub agent: Option<String>,
}

/// Server acknowledgement of an uploaded document.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UploadReceipt {
    #[serde(default)]
    pub status: String,
    /// Human-readable description of what was received; replayed into the chat.
    pub message: String,
    #[serde(default)]
    pub file_name: Option<String>,
}

/// Result of `create_session`: the identity pair the chat view needs.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionTicket {
    pub session_id: String,
    pub user_id: String,
    pub initial_state: Option<ApplicationState>,
}

impl SessionTicket {
    /// The backend keys sessions by the lower-cased customer id. Prefer the id it
    /// echoes back, fall back to deriving it the same way.
    fn from_response(selected_customer: &str, resp: CreateSessionResponse) -> Self {
        let user_id = resp
            .customer_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| selected_customer.to_lowercase());
        Self { session_id: resp.session_id, user_id, initial_state: resp.state }
    }
}

// ── Backend seam ──────────────────────────────────────────────────────────────

/// Everything the front-end asks of the loan assistant backend.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn list_customers(&self) -> Result<Vec<Customer>, ApiError>;
    async fn create_session(&self, customer_id: &str) -> Result<SessionTicket, ApiError>;
    async fn get_state(&self, identity: &SessionIdentity) -> Result<ApplicationState, ApiError>;
    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatReply, ApiError>;
    async fn upload_document(
        &self,
        identity: &SessionIdentity,
        document: &DocumentUpload,
    ) -> Result<UploadReceipt, ApiError>;
    async fn download_sanction_letter(&self, identity: &SessionIdentity) -> Result<Vec<u8>, ApiError>;
    async fn admin_table(&self, admin: &AdminSession, table: AdminTable) -> Result<AdminRows, ApiError>;
}

// ── HTTP client ───────────────────────────────────────────────────────────────

pub struct HttpBackend {
    http: reqwest::Client,
    pub endpoint: String,
}

impl HttpBackend {
    pub fn new(endpoint: String, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("loandesk/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, endpoint })
    }

    /// `endpoint` + path segments (each percent-encoded) + query pairs.
    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<reqwest::Url, ApiError> {
        let invalid = |detail: String| ApiError::Endpoint { endpoint: self.endpoint.clone(), detail };
        let mut url = reqwest::Url::parse(&self.endpoint).map_err(|e| invalid(e.to_string()))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| invalid("endpoint cannot carry a path".to_string()))?;
            path.pop_if_empty().extend(segments);
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn send(&self, req: reqwest::RequestBuilder, url: &reqwest::Url) -> Result<reqwest::Response, ApiError> {
        let resp = req.send().await.map_err(|e| ApiError::from_reqwest(url.as_str(), e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Status { url: url.to_string(), status: status.as_u16(), body });
        }
        Ok(resp)
    }

    async fn read_json<T: DeserializeOwned>(resp: reqwest::Response, url: &reqwest::Url) -> Result<T, ApiError> {
        let bytes = resp.bytes().await.map_err(|e| ApiError::from_reqwest(url.as_str(), e))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::Decode { url: url.to_string(), detail: e.to_string() })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: reqwest::Url) -> Result<T, ApiError> {
        debug!(component = "client", method = "GET", url = %url);
        let resp = self.send(self.http.get(url.clone()), &url).await?;
        Self::read_json(resp, &url).await
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn list_customers(&self) -> Result<Vec<Customer>, ApiError> {
        let url = self.url(&["api", "customers"], &[])?;
        self.get_json(url).await
    }

    async fn create_session(&self, customer_id: &str) -> Result<SessionTicket, ApiError> {
        let url = self.url(&["api", "session"], &[])?;
        debug!(component = "client", method = "POST", url = %url, customer_id);
        let req = self.http.post(url.clone()).json(&CreateSessionRequest { customer_id });
        let resp = self.send(req, &url).await?;
        let body: CreateSessionResponse = Self::read_json(resp, &url).await?;
        Ok(SessionTicket::from_response(customer_id, body))
    }

    async fn get_state(&self, identity: &SessionIdentity) -> Result<ApplicationState, ApiError> {
        let url = self.url(
            &["api", "state", identity.session_id()],
            &[("user_id", identity.user_id())],
        )?;
        let body: StateResponse = self.get_json(url).await?;
        Ok(body.state)
    }

    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatReply, ApiError> {
        let url = self.url(&["api", "chat"], &[])?;
        debug!(component = "client", method = "POST", url = %url, session_id = %request.session_id);
        let resp = self.send(self.http.post(url.clone()).json(request), &url).await?;
        Self::read_json(resp, &url).await
    }

    async fn upload_document(
        &self,
        identity: &SessionIdentity,
        document: &DocumentUpload,
    ) -> Result<UploadReceipt, ApiError> {
        let url = self.url(
            &["api", "upload-document"],
            &[("session_id", identity.session_id()), ("user_id", identity.user_id())],
        )?;
        let part = reqwest::multipart::Part::bytes(document.bytes.clone())
            .file_name(document.file_name.clone())
            .mime_str(&document.mime)
            .map_err(|e| ApiError::from_reqwest(url.as_str(), e))?;
        let form = reqwest::multipart::Form::new().part("file", part);
        debug!(
            component = "client",
            method = "POST",
            url = %url,
            file = %document.file_name,
            size = document.bytes.len(),
        );
        let resp = self.send(self.http.post(url.clone()).multipart(form), &url).await?;
        Self::read_json(resp, &url).await
    }

    async fn download_sanction_letter(&self, identity: &SessionIdentity) -> Result<Vec<u8>, ApiError> {
        let url = self.url(
            &["api", "download-sanction-letter", identity.session_id()],
            &[("user_id", identity.user_id())],
        )?;
        let resp = self.send(self.http.get(url.clone()), &url).await?;
        let bytes = resp.bytes().await.map_err(|e| ApiError::from_reqwest(url.as_str(), e))?;
        Ok(bytes.to_vec())
    }

    async fn admin_table(&self, admin: &AdminSession, table: AdminTable) -> Result<AdminRows, ApiError> {
        let url = self.url(&["api", "admin", table.path()], &[])?;
        debug!(component = "client", admin = %admin.username(), table = table.path(), url = %url);
        let resp = self.send(self.http.get(url.clone()), &url).await?;
        let bytes = resp.bytes().await.map_err(|e| ApiError::from_reqwest(url.as_str(), e))?;
        AdminRows::decode(table, &bytes)
            .map_err(|e| ApiError::Decode { url: url.to_string(), detail: e.to_string() })
    }
}
