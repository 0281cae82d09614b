//! Image reference parsing
//!
//! Turns user strings like `node`, `user/image:tag`, or
//! `host:5000/ns/image@sha256:...` into a canonical
//! `(registry, repository, reference)` tuple.

use crate::error::{Result, TransferError};

pub const DEFAULT_REGISTRY: &str = "registry-1.docker.io";
pub const DEFAULT_NAMESPACE: &str = "library";
pub const DEFAULT_TAG: &str = "latest";

/// Canonical form of a user-supplied image reference, immutable after parse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Registry host, `host[:port]`
    pub registry: String,
    /// Path segments before the image name, `library` for official images
    pub namespace: String,
    /// Last path segment before the tag or digest
    pub image_name: String,
    /// Tag, or a `sha256:<hex>` digest
    pub reference: String,
    /// Display form: name alone for official images, `ns/name` for user
    /// images, `host/ns/name` for third-party registries
    pub slug: String,
    /// `<namespace>/<image_name>` as used in registry URLs
    pub repository: String,
}

impl ImageRef {
    pub fn parse(input: &str) -> Result<Self> {
        if input.is_empty() {
            return Err(TransferError::InvalidReference(
                "empty image reference".to_string(),
            ));
        }

        let parts: Vec<&str> = input.split('/').collect();
        let name_part = parts[parts.len() - 1];

        // `name@sha256:<hex>` wins over `name:tag`; bare names get `latest`
        let (image_name, reference) = if let Some((name, digest)) = name_part.split_once('@') {
            (name, digest)
        } else if let Some((name, tag)) = name_part.split_once(':') {
            (name, tag)
        } else {
            (name_part, DEFAULT_TAG)
        };

        if image_name.is_empty() || reference.is_empty() {
            return Err(TransferError::InvalidReference(format!(
                "missing image name or tag in '{}'",
                input
            )));
        }

        // A first segment holding a dot or a colon names the registry
        let (registry, namespace, slug) =
            if parts.len() > 1 && (parts[0].contains('.') || parts[0].contains(':')) {
                let namespace = parts[1..parts.len() - 1].join("/");
                if namespace.is_empty() {
                    return Err(TransferError::InvalidReference(format!(
                        "missing repository path in '{}'",
                        input
                    )));
                }
                let slug = format!("{}/{}/{}", parts[0], namespace, image_name);
                (parts[0].to_string(), namespace, slug)
            } else if parts.len() == 1 {
                (
                    DEFAULT_REGISTRY.to_string(),
                    DEFAULT_NAMESPACE.to_string(),
                    image_name.to_string(),
                )
            } else {
                let namespace = parts[..parts.len() - 1].join("/");
                let slug = format!("{}/{}", namespace, image_name);
                (DEFAULT_REGISTRY.to_string(), namespace, slug)
            };

        if namespace.split('/').any(str::is_empty) {
            return Err(TransferError::InvalidReference(format!(
                "empty path segment in '{}'",
                input
            )));
        }

        let repository = format!("{}/{}", namespace, image_name);

        Ok(Self {
            registry,
            namespace,
            image_name: image_name.to_string(),
            reference: reference.to_string(),
            slug,
            repository,
        })
    }
}
