//! On-disk image layout consumed by `docker load`
//!
//! A pulled image is a directory holding `manifest.json`, `repositories`,
//! the config blob as `<hex>.json` (v2 only), and one
//! `<layer_id>/{VERSION,json,layer.tar}` tree per layer. Push reads the
//! same shape back.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Literal contents of every layer's VERSION file
pub const LAYER_VERSION: &str = "1.0";

/// Metadata skeleton for non-final v2 layers: empty container_config,
/// epoch creation time
const EMPTY_LAYER_JSON: &str = r#"{"created":"1970-01-01T00:00:00Z","container_config":{"Hostname":"","Domainname":"","User":"","AttachStdin":false,"AttachStdout":false,"AttachStderr":false,"Tty":false,"OpenStdin":false,"StdinOnce":false,"Env":null,"Cmd":null,"Image":"","Volumes":null,"WorkingDir":"","Entrypoint":null,"OnBuild":null,"Labels":null}}"#;

/// Single entry of the top-level `manifest.json` array.
///
/// Tar archives produced by other tools sometimes carry lowercase keys;
/// both spellings are accepted on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalManifestEntry {
    #[serde(rename = "Config", alias = "config")]
    pub config: String,
    #[serde(rename = "RepoTags", alias = "repoTags", default)]
    pub repo_tags: Vec<String>,
    #[serde(rename = "Layers", alias = "layers")]
    pub layers: Vec<String>,
}

fn set_identity(object: &mut Map<String, Value>, id: &str, parent: Option<&str>) {
    object.insert("id".to_string(), Value::String(id.to_string()));
    if let Some(parent) = parent {
        object.insert("parent".to_string(), Value::String(parent.to_string()));
    }
}

/// Per-layer `json` for every layer but the last
pub fn intermediate_layer_json(id: &str, parent: Option<&str>) -> Result<String> {
    let mut object: Map<String, Value> = serde_json::from_str(EMPTY_LAYER_JSON)?;
    set_identity(&mut object, id, parent);
    Ok(serde_json::to_string(&object)?)
}

/// Per-layer `json` for the final layer: the fetched config blob with the
/// image-wide keys stripped. `rootfS` covers config blobs written on
/// case-insensitive filesystems.
pub fn final_layer_json(config_blob: &[u8], id: &str, parent: Option<&str>) -> Result<String> {
    let mut object: Map<String, Value> = serde_json::from_slice(config_blob)?;
    object.remove("history");
    object.remove("rootfs");
    object.remove("rootfS");
    set_identity(&mut object, id, parent);
    Ok(serde_json::to_string(&object)?)
}

/// Contents of the `repositories` file: `{slug: {tag: layer_id}}`
pub fn repositories_json(slug: &str, reference: &str, layer_id: &str) -> Result<String> {
    let mut tags = Map::new();
    tags.insert(reference.to_string(), Value::String(layer_id.to_string()));
    let mut repositories = Map::new();
    repositories.insert(slug.to_string(), Value::Object(tags));
    Ok(serde_json::to_string(&Value::Object(repositories))?)
}
