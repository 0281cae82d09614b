//! Blob and manifest upload per the Distribution push protocol
//!
//! Blobs go up in two phases: a POST allocates an upload URL, a single PUT
//! carries the bytes with the digest as a query parameter. A HEAD preflight
//! skips blobs the registry already holds. Chunked PATCH uploads are a
//! known extension point, not implemented.

use std::path::Path;

use reqwest::{Body, StatusCode, header};
use tokio_util::io::ReaderStream;

use super::client::RegistryClient;
use super::manifest::MANIFEST_V2_TYPE;
use crate::digest::DigestUtils;
use crate::error::{Result, TransferError};
use crate::image::session::TokenScope;
use crate::logging::Logger;

impl RegistryClient {
    /// Upload one file as a blob, returning its `(digest, size)`.
    ///
    /// The digest is computed over the file exactly as uploaded; callers
    /// must hand over the gzip file when a layer was recompressed.
    pub async fn upload_blob(
        &mut self,
        path: &Path,
        media_type: &str,
        logger: &Logger,
    ) -> Result<(String, u64)> {
        let digest = DigestUtils::digest_file(path)?;
        let size = std::fs::metadata(path)?.len();
        logger.step(&format!(
            "Uploading blob {} ({})",
            path.display(),
            logger.format_size(size)
        ));

        let token = self.token(TokenScope::Push).await?;

        // Preflight: the registry may already hold this blob
        let mut request = self
            .http
            .transfer
            .head(format!("{}/blobs/{}", self.repo_url(), digest));
        if let Some(bearer) = token.bearer() {
            request = request.bearer_auth(bearer);
        }
        let response = request.send().await?;
        if response.status() == StatusCode::OK {
            logger.detail(&format!("blob {} already exists, skipping", digest));
            return Ok((digest, size));
        }

        // POST allocates the upload URL in the Location header
        let mut request = self
            .http
            .transfer
            .post(format!("{}/blobs/uploads/", self.repo_url()));
        if let Some(bearer) = token.bearer() {
            request = request.bearer_auth(bearer);
        }
        let response = request.send().await?;
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if location.is_empty() {
            return Err(TransferError::Upload(format!(
                "empty upload location (status {})",
                response.status()
            )));
        }
        let upload_url = if location.starts_with("http") {
            location
        } else {
            // Relative Location headers resolve against the registry
            format!(
                "{}://{}{}",
                self.session.protocol, self.session.reference.registry, location
            )
        };

        let file = tokio::fs::File::open(path).await?;
        let mut request = self
            .http
            .transfer
            .put(&upload_url)
            .query(&[("digest", digest.as_str())])
            .header(header::CONTENT_LENGTH, size)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(Body::wrap_stream(ReaderStream::new(file)));
        if let Some(bearer) = token.bearer() {
            request = request.bearer_auth(bearer);
        }
        let response = request
            .send()
            .await
            .map_err(|e| TransferError::Upload(e.to_string()))?;
        if response.status() != StatusCode::CREATED {
            return Err(TransferError::Upload(format!(
                "blob PUT for {} returned status {}",
                digest,
                response.status()
            )));
        }

        logger.detail(&format!("blob {} uploaded as {}", digest, media_type));
        Ok((digest, size))
    }

    /// PUT the synthesized v2 manifest under the session's tag
    pub async fn upload_manifest(&mut self, body: Vec<u8>, logger: &Logger) -> Result<()> {
        let token = self.token(TokenScope::Push).await?;
        let url = format!(
            "{}/manifests/{}",
            self.repo_url(),
            self.session.reference.reference
        );

        let mut request = self
            .http
            .transfer
            .put(&url)
            .header(header::CONTENT_TYPE, MANIFEST_V2_TYPE)
            .body(body);
        if let Some(bearer) = token.bearer() {
            request = request.bearer_auth(bearer);
        }
        let response = request
            .send()
            .await
            .map_err(|e| TransferError::Upload(e.to_string()))?;
        if response.status() != StatusCode::CREATED {
            return Err(TransferError::Upload(format!(
                "manifest PUT returned status {}",
                response.status()
            )));
        }

        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or(&url);
        logger.success(&format!("Manifest pushed to {}", location));
        Ok(())
    }
}
