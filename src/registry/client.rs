//! HTTP plumbing for the registry protocol driver
//!
//! Builds the reqwest clients the driver needs: a short-timeout client for
//! API calls, a no-redirect client for mirror probes, and an untimed client
//! for blob transfers and uploads.

use std::time::Duration;

use reqwest::{Client, redirect};

use crate::error::Result;
use crate::image::session::ImageSession;

/// Timeout for auth discovery, token, and manifest requests
pub const API_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout for mirror and blob-size HEAD probes
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HttpClients {
    /// 10-second client for token and manifest endpoints
    pub api: Client,
    /// Client that never follows redirects, for mirror HEAD probes
    pub probe: Client,
    /// Untimed client for blob GETs and push uploads
    pub transfer: Client,
}

impl HttpClients {
    pub fn new() -> Result<Self> {
        Ok(Self {
            api: Client::builder().timeout(API_TIMEOUT).build()?,
            probe: Client::builder()
                .redirect(redirect::Policy::none())
                .build()?,
            transfer: Client::builder().build()?,
        })
    }
}

/// Registry driver bound to one [`ImageSession`]
pub struct RegistryClient {
    pub(crate) http: HttpClients,
    pub(crate) session: ImageSession,
}

impl RegistryClient {
    pub fn new(session: ImageSession) -> Result<Self> {
        Ok(Self {
            http: HttpClients::new()?,
            session,
        })
    }

    pub fn session(&self) -> &ImageSession {
        &self.session
    }

    /// `{protocol}://{registry}/v2/{repository}`
    pub(crate) fn repo_url(&self) -> String {
        format!(
            "{}://{}/v2/{}",
            self.session.protocol, self.session.reference.registry, self.session.reference.repository
        )
    }
}
