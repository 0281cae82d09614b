//! Bearer-token authentication per the Distribution auth spec
//!
//! Flow: probe the manifest endpoint unauthenticated, parse the
//! `WWW-Authenticate` challenge on 401, then fetch a token scoped to the
//! repository and action from the advertised realm. Tokens are cached per
//! scope for the session lifetime; expiry is not tracked and a 401 on a
//! later call is not retried.

use regex::Regex;
use reqwest::StatusCode;
use serde::Deserialize;

use super::client::RegistryClient;
use crate::error::{Result, TransferError};
use crate::image::session::{AuthToken, TokenScope};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// Parsed `WWW-Authenticate: Bearer` challenge
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct BearerChallenge {
    pub realm: String,
    pub service: String,
}

pub(crate) fn parse_bearer_challenge(header: &str) -> Result<BearerChallenge> {
    if !header.starts_with("Bearer realm=\"") {
        return Err(TransferError::AuthDiscovery(format!(
            "invalid WWW-Authenticate header: {}",
            header
        )));
    }

    // Realm is the text between the first pair of double quotes
    let realm = header
        .split('"')
        .nth(1)
        .unwrap_or_default()
        .to_string();

    let service = Regex::new(r#"service="([^"]+)""#)
        .map_err(|e| TransferError::AuthDiscovery(e.to_string()))?
        .captures(header)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| {
            TransferError::AuthDiscovery(format!(
                "missing service in WWW-Authenticate header: {}",
                header
            ))
        })?;

    Ok(BearerChallenge { realm, service })
}

impl RegistryClient {
    /// Return the cached token for `scope`, requesting one on first use
    pub(crate) async fn token(&mut self, scope: TokenScope) -> Result<AuthToken> {
        if let Some(token) = self.session.cached_token(scope) {
            return Ok(token.clone());
        }
        let token = self.request_token(scope).await?;
        self.session.store_token(scope, token.clone());
        Ok(token)
    }

    async fn request_token(&self, scope: TokenScope) -> Result<AuthToken> {
        // Unauthenticated probe against the manifest endpoint discovers the
        // auth challenge; 200 means the registry is open
        let manifest_url = format!(
            "{}/manifests/{}",
            self.repo_url(),
            self.session.reference.reference
        );
        let response = self
            .http
            .api
            .get(&manifest_url)
            .send()
            .await
            .map_err(|e| TransferError::AuthDiscovery(e.to_string()))?;

        match response.status() {
            StatusCode::OK => return Ok(AuthToken::Anonymous),
            StatusCode::UNAUTHORIZED => {}
            _ => return Err(TransferError::upstream(response).await),
        }

        let challenge = {
            let header = response
                .headers()
                .get("www-authenticate")
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| {
                    TransferError::AuthDiscovery(
                        "registry sent 401 without a WWW-Authenticate header".to_string(),
                    )
                })?;
            parse_bearer_challenge(header)?
        };

        let scope_param = format!(
            "repository:{}:{}",
            self.session.reference.repository,
            scope.actions()
        );
        let mut request = self.http.api.get(&challenge.realm).query(&[
            ("service", challenge.service.as_str()),
            ("scope", scope_param.as_str()),
        ]);
        if !self.session.username.is_empty() && !self.session.password.is_empty() {
            request = request.basic_auth(&self.session.username, Some(&self.session.password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransferError::Token(e.to_string()))?;
        if !response.status().is_success() {
            return Err(TransferError::Token(format!(
                "token endpoint returned status {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| TransferError::Token(format!("malformed token response: {}", e)))?;
        Ok(AuthToken::Bearer(token.token))
    }
}
