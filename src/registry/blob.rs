//! Blob URL resolution and resumable downloads
//!
//! Mirror probing applies only to Docker Hub pulls. A 3xx answer from the
//! mirror exposes the real blob location, which may be rewritten through
//! `DOCKER_BLOB_REVERSE_PROXY` for networks that front the CDN with their
//! own proxy. Downloads resume from the current file size via byte ranges.

use std::path::Path;

use futures_util::StreamExt;
use reqwest::{StatusCode, header};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use url::Url;

use super::client::{PROBE_TIMEOUT, RegistryClient};
use crate::error::{Result, TransferError};
use crate::image::reference::DEFAULT_REGISTRY;
use crate::image::session::{AuthToken, TokenScope};

pub const REVERSE_PROXY_ENV: &str = "DOCKER_BLOB_REVERSE_PROXY";

/// Replace the scheme and host of a mirror redirect with the reverse-proxy
/// base, keeping path and query. A missing or non-http proxy leaves the
/// location untouched.
pub(crate) fn apply_reverse_proxy(location: &str, proxy: Option<&str>) -> String {
    let Some(proxy) = proxy.filter(|p| p.starts_with("http")) else {
        return location.to_string();
    };
    match Url::parse(location) {
        Ok(url) => {
            let mut rewritten = format!("{}{}", proxy.trim_end_matches('/'), url.path());
            if let Some(query) = url.query() {
                rewritten.push('?');
                rewritten.push_str(query);
            }
            rewritten
        }
        Err(_) => location.to_string(),
    }
}

impl RegistryClient {
    /// Resolve the URL a blob should be fetched from, preferring the mirror
    /// for Docker Hub when one is configured. Any probe failure falls back
    /// to the registry's own blob endpoint.
    pub async fn resolve_blob_url(&mut self, blob_sum: &str) -> Result<String> {
        let original = format!("{}/blobs/{}", self.repo_url(), blob_sum);

        let mirror = match &self.session.mirror {
            Some(mirror)
                if self.session.reference.registry == DEFAULT_REGISTRY
                    && mirror.starts_with("http") =>
            {
                mirror.trim_end_matches('/').to_string()
            }
            _ => return Ok(original),
        };

        let token = self.token(TokenScope::Pull).await?;
        let mirror_url = format!(
            "{}/v2/{}/blobs/{}",
            mirror, self.session.reference.repository, blob_sum
        );

        let mut request = self.http.probe.head(&mirror_url).timeout(PROBE_TIMEOUT);
        if let Some(bearer) = token.bearer() {
            request = request.bearer_auth(bearer);
        }
        let response = match request.send().await {
            Ok(response) => response,
            Err(_) => return Ok(original),
        };

        let status = response.status();
        if status.is_success() {
            return Ok(mirror_url);
        }
        if status.is_redirection() {
            if let Some(location) = response
                .headers()
                .get(header::LOCATION)
                .and_then(|value| value.to_str().ok())
            {
                let proxy = std::env::var(REVERSE_PROXY_ENV).ok();
                return Ok(apply_reverse_proxy(location, proxy.as_deref()));
            }
        }
        Ok(original)
    }

    /// Resumable ranged download of `url` into `output`.
    ///
    /// An existing partial file continues from its current size; a server
    /// that refuses the range restarts the file from scratch. A file that
    /// already holds `declared_size` bytes is left alone without a request.
    pub async fn download_blob(&mut self, url: &str, output: &Path, declared_size: u64) -> Result<()> {
        let token = self.token(TokenScope::Pull).await?;

        let mut total_size = declared_size;
        if total_size == 0 {
            total_size = self.probe_blob_size(url, &token).await?;
        }

        let current_size = match fs::metadata(output).await {
            Ok(metadata) => metadata.len(),
            Err(_) => 0,
        };
        if total_size > 0 && current_size == total_size {
            return Ok(());
        }

        let mut request = self
            .http
            .transfer
            .get(url)
            .header(header::RANGE, format!("bytes={}-", current_size));
        if let Some(bearer) = token.bearer() {
            request = request.bearer_auth(bearer);
        }
        let response = request
            .send()
            .await
            .map_err(|e| TransferError::Download(e.to_string()))?;

        let status = response.status();
        let mut file = if status == StatusCode::PARTIAL_CONTENT {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(output)
                .await?
        } else if status.as_u16() < 300 {
            OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(output)
                .await?
        } else {
            return Err(TransferError::Download(format!(
                "blob GET for {} returned status {}",
                url, status
            )));
        };

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| TransferError::Download(e.to_string()))?;
            file.write_all(&bytes).await?;
        }
        file.flush().await?;
        Ok(())
    }

    async fn probe_blob_size(&self, url: &str, token: &AuthToken) -> Result<u64> {
        let mut request = self.http.transfer.head(url).timeout(PROBE_TIMEOUT);
        if let Some(bearer) = token.bearer() {
            request = request.bearer_auth(bearer);
        }
        let response = request
            .send()
            .await
            .map_err(|e| TransferError::Download(e.to_string()))?;
        Ok(response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_rewrite_replaces_scheme_and_host() {
        let rewritten = apply_reverse_proxy(
            "https://cdn.example.com/blobs/sha256/abc?token=xyz&expires=60",
            Some("http://proxy.internal:8080"),
        );
        assert_eq!(
            rewritten,
            "http://proxy.internal:8080/blobs/sha256/abc?token=xyz&expires=60"
        );
    }

    #[test]
    fn test_proxy_rewrite_without_query() {
        let rewritten = apply_reverse_proxy(
            "https://cdn.example.com/blobs/sha256/abc",
            Some("https://proxy.internal/"),
        );
        assert_eq!(rewritten, "https://proxy.internal/blobs/sha256/abc");
    }

    #[test]
    fn test_missing_proxy_keeps_location() {
        let location = "https://cdn.example.com/blobs/sha256/abc";
        assert_eq!(apply_reverse_proxy(location, None), location);
    }

    #[test]
    fn test_non_http_proxy_is_ignored() {
        let location = "https://cdn.example.com/blobs/sha256/abc";
        assert_eq!(apply_reverse_proxy(location, Some("ftp://nope")), location);
    }
}
