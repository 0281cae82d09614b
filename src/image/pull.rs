//! Pull pipelines: materialize a registry image as a `docker load` tree
//!
//! Schema 1 images carry their layer ids in the manifest; schema 2 images
//! get v1-style ids synthesized from the parent chain. Both pipelines end
//! by archiving the output directory into `<target>.tar`.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use serde_json::{Map, Value};

use crate::digest::DigestUtils;
use crate::error::{Result, TransferError};
use crate::image::layout::{self, LAYER_VERSION, LocalManifestEntry};
use crate::image::session::ImageSession;
use crate::logging::Logger;
use crate::registry::RegistryClient;
use crate::registry::manifest::{Descriptor, Manifest, ManifestV1, ManifestV2};
use crate::tar_utils;

/// Compression applied to a layer blob, derived from its media type suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LayerCompression {
    Gzip,
    Zstd,
    /// Raw tarball, including explicit `.tar` media types
    None,
}

impl LayerCompression {
    pub(crate) fn from_media_type(media_type: &str) -> Self {
        if media_type.ends_with("gzip") {
            LayerCompression::Gzip
        } else if media_type.ends_with("zstd") {
            LayerCompression::Zstd
        } else {
            LayerCompression::None
        }
    }

    /// File name the blob is downloaded under before decompression
    pub(crate) fn blob_file_name(self) -> &'static str {
        match self {
            LayerCompression::Gzip => "layer.tar.gz",
            LayerCompression::Zstd => "layer.tar.zstd",
            LayerCompression::None => "layer.tar",
        }
    }
}

/// Pull the session's image into `dir`, producing the layout directory and
/// `<target>.tar` next to it. Returns the tar path.
pub async fn pull_image(client: &mut RegistryClient, dir: &Path, logger: &Logger) -> Result<PathBuf> {
    let session = client.session();
    let reference = session.reference.reference.clone();
    let target_name = target_dir_name(session);
    logger.step(&format!(
        "Pulling {}/{}:{} to {}",
        session.reference.registry, session.reference.repository, reference,
        dir.display()
    ));

    let target = dir.join(&target_name);
    fs::create_dir_all(&target)?;

    let manifest = match client.fetch_manifest(&reference).await? {
        Manifest::List(list) => {
            let digest = {
                let entry = list.select(&client.session().platform)?;
                logger.verbose(&format!(
                    "Manifest list: selected {} for platform {}",
                    entry.digest,
                    client.session().platform
                ));
                entry.digest.clone()
            };
            match client.fetch_manifest(&digest).await? {
                Manifest::List(_) => {
                    return Err(TransferError::UnsupportedSchema(2));
                }
                manifest => manifest,
            }
        }
        manifest => manifest,
    };

    match manifest {
        Manifest::V1(manifest) => pull_v1(client, &manifest, &target, logger).await?,
        Manifest::V2(manifest) => pull_v2(client, &manifest, &target, logger).await?,
        Manifest::List(_) => return Err(TransferError::UnsupportedSchema(2)),
    }

    let tar_path = dir.join(format!("{}.tar", target_name));
    tar_utils::pack_dir(&target, &tar_path)?;
    logger.success(&format!("Image written to {}", tar_path.display()));
    Ok(tar_path)
}

/// `<registry>/<repository>:<tag>-<architecture>` with path separators
/// flattened so the whole name is a single directory
fn target_dir_name(session: &ImageSession) -> String {
    format!(
        "{}/{}:{}-{}",
        session.reference.registry,
        session.reference.repository,
        session.reference.reference,
        session.platform.architecture
    )
    .replace('/', "---")
}

/// Schema 1: every layer already carries its id and a ready-to-use tarball
async fn pull_v1(
    client: &mut RegistryClient,
    manifest: &ManifestV1,
    target: &Path,
    logger: &Logger,
) -> Result<()> {
    logger.info(&format!(
        "Schema 1 manifest, {} layers",
        manifest.fs_layers.len()
    ));

    let mut first_layer_id = String::new();
    for (history, fs_layer) in manifest.history.iter().zip(&manifest.fs_layers) {
        let metadata: Map<String, Value> = serde_json::from_str(&history.v1_compatibility)?;
        let layer_id = metadata
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                TransferError::Download("v1 history entry has no layer id".to_string())
            })?
            .to_string();
        if first_layer_id.is_empty() {
            first_layer_id = layer_id.clone();
        }

        let layer_dir = target.join(&layer_id);
        fs::create_dir_all(&layer_dir)?;
        fs::write(layer_dir.join("VERSION"), LAYER_VERSION)?;
        fs::write(layer_dir.join("json"), serde_json::to_string(&metadata)?)?;

        logger.detail(&format!("layer {} <- {}", layer_id, fs_layer.blob_sum));
        let url = client.resolve_blob_url(&fs_layer.blob_sum).await?;
        client
            .download_blob(&url, &layer_dir.join("layer.tar"), 0)
            .await?;
    }

    let session = client.session();
    fs::write(
        target.join("repositories"),
        layout::repositories_json(
            &session.reference.slug,
            &session.reference.reference,
            &first_layer_id,
        )?,
    )?;
    Ok(())
}

/// Schema 2: fetch the config blob, then chain fake layer ids in manifest
/// order while materializing each layer
async fn pull_v2(
    client: &mut RegistryClient,
    manifest: &ManifestV2,
    target: &Path,
    logger: &Logger,
) -> Result<()> {
    logger.info(&format!(
        "Schema 2 manifest, {} layers",
        manifest.layers.len()
    ));

    let config_hex = manifest
        .config
        .digest
        .strip_prefix("sha256:")
        .unwrap_or(&manifest.config.digest)
        .to_string();
    let config_file = format!("{}.json", config_hex);
    let config_path = target.join(&config_file);
    let url = client.resolve_blob_url(&manifest.config.digest).await?;
    client
        .download_blob(&url, &config_path, manifest.config.size)
        .await?;
    let config_blob = fs::read(&config_path)?;

    let last_index = manifest.layers.len().saturating_sub(1);
    let mut parent_id = String::new();
    let mut layer_paths = Vec::with_capacity(manifest.layers.len());

    for (index, layer) in manifest.layers.iter().enumerate() {
        let fake_id = DigestUtils::fake_layer_id(&parent_id, &layer.digest);
        layer_paths.push(format!("{}/layer.tar", fake_id));

        let layer_dir = target.join(&fake_id);
        fs::create_dir_all(&layer_dir)?;
        fs::write(layer_dir.join("VERSION"), LAYER_VERSION)?;

        let parent = (!parent_id.is_empty()).then_some(parent_id.as_str());
        let layer_json = if index == last_index {
            layout::final_layer_json(&config_blob, &fake_id, parent)?
        } else {
            layout::intermediate_layer_json(&fake_id, parent)?
        };
        fs::write(layer_dir.join("json"), layer_json)?;

        materialize_layer(client, layer, &layer_dir, logger).await?;
        parent_id = fake_id;
    }

    let session = client.session();
    fs::write(
        target.join("repositories"),
        layout::repositories_json(
            &session.reference.slug,
            &session.reference.reference,
            &parent_id,
        )?,
    )?;

    let entry = LocalManifestEntry {
        config: config_file,
        repo_tags: vec![format!(
            "{}:{}",
            session.reference.slug, session.reference.reference
        )],
        layers: layer_paths,
    };
    fs::write(
        target.join("manifest.json"),
        serde_json::to_string(&vec![entry])?,
    )?;
    Ok(())
}

/// Download one layer blob into `<layer_dir>/layer.tar`, decompressing
/// according to its media type. A complete tarball from a previous run
/// satisfies the layer without a request.
async fn materialize_layer(
    client: &mut RegistryClient,
    layer: &Descriptor,
    layer_dir: &Path,
    logger: &Logger,
) -> Result<()> {
    let tar_path = layer_dir.join("layer.tar");
    if let Ok(metadata) = fs::metadata(&tar_path) {
        if metadata.len() >= layer.size {
            let stale = layer_dir.join("layer.tar.gz");
            if stale.exists() {
                fs::remove_file(&stale)?;
            }
            logger.detail(&format!("layer {} already present", layer.digest));
            return Ok(());
        }
    }

    let compression = LayerCompression::from_media_type(&layer.media_type);
    let blob_path = layer_dir.join(compression.blob_file_name());
    logger.detail(&format!(
        "downloading {} ({})",
        layer.digest,
        logger.format_size(layer.size)
    ));

    let url = client.resolve_blob_url(&layer.digest).await?;
    client.download_blob(&url, &blob_path, layer.size).await?;

    if compression != LayerCompression::None {
        decompress_blob(compression, &blob_path, &tar_path)?;
        fs::remove_file(&blob_path)?;
    }
    Ok(())
}

/// Stream-decompress `source` into `dest`
fn decompress_blob(compression: LayerCompression, source: &Path, dest: &Path) -> Result<()> {
    let input = File::open(source)?;
    let mut output = File::create(dest)?;
    match compression {
        LayerCompression::Gzip => {
            let mut decoder = GzDecoder::new(input);
            io::copy(&mut decoder, &mut output).map_err(|e| {
                TransferError::Decompress(format!("gzip stream {}: {}", source.display(), e))
            })?;
        }
        LayerCompression::Zstd => {
            let mut decoder = zstd::stream::read::Decoder::new(input).map_err(|e| {
                TransferError::Decompress(format!("zstd stream {}: {}", source.display(), e))
            })?;
            io::copy(&mut decoder, &mut output).map_err(|e| {
                TransferError::Decompress(format!("zstd stream {}: {}", source.display(), e))
            })?;
        }
        LayerCompression::None => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::reference::ImageRef;
    use crate::image::session::Platform;
    use std::io::Write;

    #[test]
    fn test_media_type_dispatch() {
        assert_eq!(
            LayerCompression::from_media_type("application/vnd.docker.image.rootfs.diff.tar.gzip"),
            LayerCompression::Gzip
        );
        assert_eq!(
            LayerCompression::from_media_type("application/vnd.oci.image.layer.v1.tar+zstd"),
            LayerCompression::Zstd
        );
        assert_eq!(
            LayerCompression::from_media_type("application/vnd.oci.image.layer.v1.tar"),
            LayerCompression::None
        );
        assert_eq!(
            LayerCompression::from_media_type("application/octet-stream"),
            LayerCompression::None
        );
    }

    #[test]
    fn test_blob_file_names() {
        assert_eq!(LayerCompression::Gzip.blob_file_name(), "layer.tar.gz");
        assert_eq!(LayerCompression::Zstd.blob_file_name(), "layer.tar.zstd");
        assert_eq!(LayerCompression::None.blob_file_name(), "layer.tar");
    }

    #[test]
    fn test_target_dir_name_flattens_separators() {
        let session = ImageSession::new(
            ImageRef::parse("node:20").unwrap(),
            String::new(),
            String::new(),
            false,
            None,
            Platform::new("linux", "amd64", ""),
        );
        assert_eq!(
            target_dir_name(&session),
            "registry-1.docker.io---library---node:20-amd64"
        );
    }

    #[test]
    fn test_decompress_gzip_blob() {
        let dir = tempfile::tempdir().unwrap();
        let payload = b"tarball bytes".repeat(100);

        let gz_path = dir.path().join("layer.tar.gz");
        let mut encoder = flate2::write::GzEncoder::new(
            File::create(&gz_path).unwrap(),
            flate2::Compression::default(),
        );
        encoder.write_all(&payload).unwrap();
        encoder.finish().unwrap();

        let tar_path = dir.path().join("layer.tar");
        decompress_blob(LayerCompression::Gzip, &gz_path, &tar_path).unwrap();
        assert_eq!(fs::read(&tar_path).unwrap(), payload);
    }

    #[test]
    fn test_decompress_zstd_blob() {
        let dir = tempfile::tempdir().unwrap();
        let payload = b"tarball bytes".repeat(100);

        let zstd_path = dir.path().join("layer.tar.zstd");
        let compressed = zstd::stream::encode_all(&payload[..], 0).unwrap();
        fs::write(&zstd_path, compressed).unwrap();

        let tar_path = dir.path().join("layer.tar");
        decompress_blob(LayerCompression::Zstd, &zstd_path, &tar_path).unwrap();
        assert_eq!(fs::read(&tar_path).unwrap(), payload);
    }

    #[test]
    fn test_decompress_rejects_corrupt_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let gz_path = dir.path().join("layer.tar.gz");
        fs::write(&gz_path, b"definitely not gzip").unwrap();

        let result = decompress_blob(
            LayerCompression::Gzip,
            &gz_path,
            &dir.path().join("layer.tar"),
        );
        assert!(matches!(result, Err(TransferError::Decompress(_))));
    }
}
