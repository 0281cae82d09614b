//! Per-invocation transfer session
//!
//! An [`ImageSession`] owns the parsed reference, credentials, protocol,
//! optional pull mirror, the requested platform, and the scoped token
//! cache. One session lives for exactly one pull or push.

use std::fmt;

use crate::image::reference::ImageRef;

/// Target platform for manifest-list selection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub architecture: String,
    /// CPU variant such as `v8`; empty matches any
    pub variant: String,
}

impl Platform {
    pub fn new(os: &str, architecture: &str, variant: &str) -> Self {
        Self {
            os: os.to_string(),
            architecture: architecture.to_string(),
            variant: variant.to_string(),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)?;
        if !self.variant.is_empty() {
            write!(f, "/{}", self.variant)?;
        }
        Ok(())
    }
}

/// Action category a registry token is scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenScope {
    Pull,
    Push,
}

impl TokenScope {
    /// Action list for the `scope=` query parameter; write tokens carry both
    pub fn actions(self) -> &'static str {
        match self {
            TokenScope::Pull => "pull",
            TokenScope::Push => "pull,push",
        }
    }
}

/// Cached outcome of a token request
#[derive(Debug, Clone)]
pub enum AuthToken {
    /// Registry answered 200 on the unauthenticated probe; no token needed
    Anonymous,
    /// Opaque bearer token; validity is not tracked
    Bearer(String),
}

impl AuthToken {
    pub fn bearer(&self) -> Option<&str> {
        match self {
            AuthToken::Anonymous => None,
            AuthToken::Bearer(token) => Some(token),
        }
    }
}

pub struct ImageSession {
    pub reference: ImageRef,
    /// May be empty for anonymous access
    pub username: String,
    pub password: String,
    /// `https`, or `http` for insecure registries
    pub protocol: String,
    /// Pull-through mirror base URL for Docker Hub blobs
    pub mirror: Option<String>,
    pub platform: Platform,
    pull_token: Option<AuthToken>,
    push_token: Option<AuthToken>,
}

impl ImageSession {
    pub fn new(
        reference: ImageRef,
        username: String,
        password: String,
        insecure_registry: bool,
        mirror: Option<String>,
        platform: Platform,
    ) -> Self {
        let protocol = if insecure_registry { "http" } else { "https" };
        Self {
            reference,
            username,
            password,
            protocol: protocol.to_string(),
            mirror,
            platform,
            pull_token: None,
            push_token: None,
        }
    }

    pub(crate) fn cached_token(&self, scope: TokenScope) -> Option<&AuthToken> {
        match scope {
            TokenScope::Pull => self.pull_token.as_ref(),
            TokenScope::Push => self.push_token.as_ref(),
        }
    }

    pub(crate) fn store_token(&mut self, scope: TokenScope, token: AuthToken) {
        match scope {
            TokenScope::Pull => self.pull_token = Some(token),
            TokenScope::Push => self.push_token = Some(token),
        }
    }
}
