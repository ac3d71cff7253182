/// Error types shared by the backend client and the session core.
///
/// Library-facing failures are typed enums; the binary's plumbing (config
/// loading, terminal setup) stays on `anyhow`.
use thiserror::Error;

// ── Transport ─────────────────────────────────────────────────────────────────

/// A failed call to the loan assistant backend.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The request never produced an HTTP response (refused, reset, timed out).
    #[error("could not reach {url}: {detail}")]
    Network { url: String, detail: String },

    /// The backend answered with a non-success status.
    #[error("{url} returned HTTP {status}: {body}")]
    Status { url: String, status: u16, body: String },

    /// The response body did not match the expected shape.
    #[error("unexpected response from {url}: {detail}")]
    Decode { url: String, detail: String },

    /// The configured endpoint could not be turned into a request URL.
    #[error("invalid endpoint {endpoint}: {detail}")]
    Endpoint { endpoint: String, detail: String },
}

impl ApiError {
    /// True when the failure is a connectivity problem rather than a server-side one.
    pub fn is_connection(&self) -> bool {
        matches!(self, ApiError::Network { .. })
    }

    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode { url: url.to_string(), detail: err.to_string() }
        } else if let Some(status) = err.status() {
            ApiError::Status { url: url.to_string(), status: status.as_u16(), body: err.to_string() }
        } else {
            ApiError::Network { url: url.to_string(), detail: err.to_string() }
        }
    }
}

// ── Session preconditions ─────────────────────────────────────────────────────

/// Fatal for the chat view: it cannot run without a full session identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Invalid Session: missing {0}")]
    MissingIdentity(&'static str),
}

// ── Local upload validation ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("File size exceeds the {limit_mb} MB limit. Please choose a smaller file.")]
    TooLarge { size: u64, limit: u64, limit_mb: u64 },

    #[error("Unsupported file type ({mime}). Please upload a PDF, JPEG or PNG file.")]
    UnsupportedType { mime: String },

    #[error("Could not read {path}: {detail}")]
    Unreadable { path: String, detail: String },
}

// ── Admin gate ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,
}

// ── Persona ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error)]
pub enum PersonaError {
    #[error("persona is not configured: {0}")]
    NotConfigured(String),

    #[error("failed to create persona session token: {0}")]
    Token(String),

    #[error("persona client error: {0}")]
    Client(String),
}
