/// Local validation for documents attached to the chat.
///
/// Everything here runs before any network call: a file that fails the size or
/// type check never reaches the backend.
use std::path::Path;

use crate::error::UploadError;

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

pub const ALLOWED_MIME_TYPES: &[&str] = &["application/pdf", "image/jpeg", "image/jpg", "image/png"];

/// A validated document, read into memory and ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentUpload {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPolicy {
    pub max_bytes: u64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self { max_bytes: DEFAULT_MAX_UPLOAD_BYTES }
    }
}

impl UploadPolicy {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    /// Check size and declared type. Size is checked first so an oversized file of
    /// the wrong type reports the size problem.
    pub fn validate(&self, size: u64, mime: &str) -> Result<(), UploadError> {
        if size > self.max_bytes {
            return Err(UploadError::TooLarge {
                size,
                limit: self.max_bytes,
                limit_mb: self.max_bytes.div_ceil(1024 * 1024),
            });
        }
        let mime = mime.to_ascii_lowercase();
        if !ALLOWED_MIME_TYPES.contains(&mime.as_str()) {
            return Err(UploadError::UnsupportedType { mime });
        }
        Ok(())
    }

    /// Validate an already-loaded document.
    pub fn check(&self, document: &DocumentUpload) -> Result<(), UploadError> {
        self.validate(document.bytes.len() as u64, &document.mime)
    }

    /// Stat, validate, then read a file from disk. The file body is only read once
    /// the metadata has passed validation.
    pub async fn load(&self, path: &Path) -> Result<DocumentUpload, UploadError> {
        let unreadable = |e: std::io::Error| UploadError::Unreadable {
            path: path.display().to_string(),
            detail: e.to_string(),
        };
        let meta = tokio::fs::metadata(path).await.map_err(unreadable)?;
        if !meta.is_file() {
            return Err(UploadError::Unreadable {
                path: path.display().to_string(),
                detail: "not a regular file".to_string(),
            });
        }
        let mime = mime_for(path);
        self.validate(meta.len(), &mime)?;

        let bytes = tokio::fs::read(path).await.map_err(unreadable)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let document = DocumentUpload { file_name, mime, bytes };
        // The file may have grown between stat and read.
        self.check(&document)?;
        Ok(document)
    }
}

/// MIME type guessed from the file extension.
pub fn mime_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}
