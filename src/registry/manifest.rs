//! Manifest fetching, content negotiation, and schema dispatch
//!
//! The driver negotiates across schema 1, schema 2, and manifest lists via
//! repeated `Accept` headers, then dispatches on `schemaVersion` and the
//! presence of a `manifests` array.

use reqwest::{StatusCode, header};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::client::RegistryClient;
use crate::error::{Result, TransferError};
use crate::image::session::{Platform, TokenScope};

pub const MANIFEST_V2_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const MANIFEST_LIST_TYPE: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
pub const MANIFEST_V1_TYPE: &str = "application/vnd.docker.distribution.manifest.v1+json";
pub const CONFIG_TYPE: &str = "application/vnd.docker.container.image.v1+json";
pub const LAYER_GZIP_TYPE: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";

/// Content-addressed object reference inside a schema 2 manifest
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Descriptor {
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub size: u64,
    pub digest: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FsLayer {
    #[serde(rename = "blobSum")]
    pub blob_sum: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct V1History {
    /// Layer metadata as a JSON string embedded in JSON; re-parsed per layer
    #[serde(rename = "v1Compatibility")]
    pub v1_compatibility: String,
}

/// Schema 1 manifest: layer ids live inside the embedded compat objects
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestV1 {
    #[serde(rename = "fsLayers")]
    pub fs_layers: Vec<FsLayer>,
    pub history: Vec<V1History>,
}

/// Schema 2 single-platform manifest; also the shape synthesized on push
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ManifestV2 {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(rename = "mediaType", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformSpec {
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub variant: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestListEntry {
    pub digest: String,
    pub platform: PlatformSpec,
}

/// Fat manifest / OCI index pointing at per-platform sub-manifests
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestList {
    pub manifests: Vec<ManifestListEntry>,
}

pub enum Manifest {
    V1(ManifestV1),
    V2(ManifestV2),
    List(ManifestList),
}

impl Manifest {
    /// Decode a manifest body, dispatching on `schemaVersion` and the
    /// presence of a `manifests` array
    pub fn parse(body: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(body)?;
        let schema_version = value
            .get("schemaVersion")
            .and_then(Value::as_i64)
            .unwrap_or(0);

        match schema_version {
            1 => Ok(Manifest::V1(serde_json::from_value(value)?)),
            2 if value.get("manifests").is_some() => {
                Ok(Manifest::List(serde_json::from_value(value)?))
            }
            2 => Ok(Manifest::V2(serde_json::from_value(value)?)),
            other => Err(TransferError::UnsupportedSchema(other)),
        }
    }
}

impl ManifestList {
    /// Pick the sub-manifest for the requested platform.
    ///
    /// OS and architecture must match exactly; the variant matches when
    /// either side leaves it empty, otherwise it must be equal.
    pub fn select(&self, platform: &Platform) -> Result<&ManifestListEntry> {
        self.manifests
            .iter()
            .find(|entry| {
                entry.platform.os == platform.os
                    && entry.platform.architecture == platform.architecture
                    && variant_matches(&entry.platform.variant, &platform.variant)
            })
            .ok_or_else(|| TransferError::PlatformNotFound(platform.to_string()))
    }
}

fn variant_matches(manifest_variant: &str, requested: &str) -> bool {
    manifest_variant.is_empty() || requested.is_empty() || manifest_variant == requested
}

impl RegistryClient {
    /// Fetch and decode a manifest; `reference` is a tag or digest
    pub async fn fetch_manifest(&mut self, reference: &str) -> Result<Manifest> {
        let token = self.token(TokenScope::Pull).await?;
        let url = format!("{}/manifests/{}", self.repo_url(), reference);

        let mut request = self
            .http
            .api
            .get(&url)
            .header(header::ACCEPT, MANIFEST_V2_TYPE)
            .header(header::ACCEPT, MANIFEST_LIST_TYPE)
            .header(header::ACCEPT, MANIFEST_V1_TYPE);
        if let Some(bearer) = token.bearer() {
            request = request.bearer_auth(bearer);
        }

        let response = request.send().await?;
        if response.status() != StatusCode::OK {
            return Err(TransferError::upstream(response).await);
        }

        let body = response.bytes().await?;
        Manifest::parse(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_v1() {
        let body = br#"{
            "schemaVersion": 1,
            "fsLayers": [{"blobSum": "sha256:aaa"}, {"blobSum": "sha256:bbb"}],
            "history": [
                {"v1Compatibility": "{\"id\":\"111\"}"},
                {"v1Compatibility": "{\"id\":\"222\",\"parent\":\"111\"}"}
            ]
        }"#;
        match Manifest::parse(body).unwrap() {
            Manifest::V1(manifest) => {
                assert_eq!(manifest.fs_layers.len(), 2);
                assert_eq!(manifest.fs_layers[0].blob_sum, "sha256:aaa");
                assert!(manifest.history[1].v1_compatibility.contains("parent"));
            }
            _ => panic!("expected a v1 manifest"),
        }
    }

    #[test]
    fn test_parse_v2_single() {
        let body = br#"{
            "schemaVersion": 2,
            "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
            "config": {
                "mediaType": "application/vnd.docker.container.image.v1+json",
                "size": 100,
                "digest": "sha256:cfg"
            },
            "layers": [{
                "mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip",
                "size": 5000,
                "digest": "sha256:aaa"
            }]
        }"#;
        match Manifest::parse(body).unwrap() {
            Manifest::V2(manifest) => {
                assert_eq!(manifest.config.digest, "sha256:cfg");
                assert_eq!(manifest.layers.len(), 1);
                assert_eq!(manifest.layers[0].size, 5000);
            }
            _ => panic!("expected a v2 manifest"),
        }
    }

    #[test]
    fn test_parse_list() {
        let body = br#"{
            "schemaVersion": 2,
            "mediaType": "application/vnd.docker.distribution.manifest.list.v2+json",
            "manifests": [
                {"digest": "sha256:amd", "platform": {"os": "linux", "architecture": "amd64"}},
                {"digest": "sha256:arm", "platform": {"os": "linux", "architecture": "arm64", "variant": "v8"}}
            ]
        }"#;
        match Manifest::parse(body).unwrap() {
            Manifest::List(list) => {
                assert_eq!(list.manifests.len(), 2);
                assert_eq!(list.manifests[1].platform.variant, "v8");
            }
            _ => panic!("expected a manifest list"),
        }
    }

    #[test]
    fn test_unsupported_schema() {
        assert!(matches!(
            Manifest::parse(br#"{"schemaVersion": 3}"#),
            Err(TransferError::UnsupportedSchema(3))
        ));
        assert!(matches!(
            Manifest::parse(br#"{}"#),
            Err(TransferError::UnsupportedSchema(0))
        ));
    }

    fn sample_list() -> ManifestList {
        ManifestList {
            manifests: vec![
                ManifestListEntry {
                    digest: "sha256:amd".to_string(),
                    platform: PlatformSpec {
                        os: "linux".to_string(),
                        architecture: "amd64".to_string(),
                        variant: String::new(),
                    },
                },
                ManifestListEntry {
                    digest: "sha256:arm".to_string(),
                    platform: PlatformSpec {
                        os: "linux".to_string(),
                        architecture: "arm64".to_string(),
                        variant: "v8".to_string(),
                    },
                },
                ManifestListEntry {
                    digest: "sha256:win".to_string(),
                    platform: PlatformSpec {
                        os: "windows".to_string(),
                        architecture: "amd64".to_string(),
                        variant: String::new(),
                    },
                },
            ],
        }
    }

    #[test]
    fn test_select_exact_platform() {
        let list = sample_list();
        let entry = list.select(&Platform::new("linux", "amd64", "")).unwrap();
        assert_eq!(entry.digest, "sha256:amd");
        let entry = list.select(&Platform::new("windows", "amd64", "")).unwrap();
        assert_eq!(entry.digest, "sha256:win");
    }

    #[test]
    fn test_select_empty_variant_matches_any() {
        let list = sample_list();
        let entry = list.select(&Platform::new("linux", "arm64", "")).unwrap();
        assert_eq!(entry.digest, "sha256:arm");
    }

    #[test]
    fn test_select_refuses_differing_variants() {
        let list = sample_list();
        let result = list.select(&Platform::new("linux", "arm64", "v7"));
        assert!(matches!(result, Err(TransferError::PlatformNotFound(_))));
    }

    #[test]
    fn test_select_matching_variant() {
        let list = sample_list();
        let entry = list.select(&Platform::new("linux", "arm64", "v8")).unwrap();
        assert_eq!(entry.digest, "sha256:arm");
    }

    #[test]
    fn test_select_unknown_platform() {
        let list = sample_list();
        let result = list.select(&Platform::new("linux", "s390x", ""));
        assert!(matches!(result, Err(TransferError::PlatformNotFound(_))));
    }
}
