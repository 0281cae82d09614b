//! Error types for image transfer operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransferError>;

/// Longest registry response body carried inside an error
const BODY_EXCERPT_LEN: usize = 512;

#[derive(Error, Debug)]
pub enum TransferError {
    /// Image reference string could not be parsed
    #[error("Invalid image reference: {0}")]
    InvalidReference(String),

    /// Unexpected status or malformed `WWW-Authenticate` during auth discovery
    #[error("Auth discovery failed: {0}")]
    AuthDiscovery(String),

    /// Token endpoint failure or malformed token response
    #[error("Token request failed: {0}")]
    Token(String),

    /// Registry answered a manifest or blob operation with a non-success status
    #[error("Registry returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    /// Manifest schemaVersion is neither 1 nor 2
    #[error("Unsupported manifest schema version {0}")]
    UnsupportedSchema(i64),

    /// Manifest list has no entry for the requested platform
    #[error("No manifest found for platform {0}")]
    PlatformNotFound(String),

    /// HTTP or I/O failure while transferring a blob
    #[error("Download failed: {0}")]
    Download(String),

    /// Non-201 on a blob POST/PUT or manifest PUT
    #[error("Upload failed: {0}")]
    Upload(String),

    /// Gzip or zstd stream corruption
    #[error("Decompression failed: {0}")]
    Decompress(String),

    /// Filesystem failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode failure
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Transport-level HTTP failure
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl TransferError {
    /// Build a [`TransferError::Upstream`] from a response, consuming the
    /// body and keeping a short excerpt for the message.
    pub async fn upstream(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let body = body.chars().take(BODY_EXCERPT_LEN).collect();
        TransferError::Upstream { status, body }
    }
}
