//! Push pipeline: upload a local image directory or tar to a registry
//!
//! The input is either a layout directory produced by pull, or a tarball
//! from pull or `docker save`, extracted to a temp directory first. Layers
//! are gzip-normalized before upload and the digests recorded along the way
//! feed the synthesized v2 manifest.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use tar::Archive;
use tempfile::TempDir;

use crate::error::{Result, TransferError};
use crate::image::layout::LocalManifestEntry;
use crate::logging::Logger;
use crate::registry::RegistryClient;
use crate::registry::manifest::{CONFIG_TYPE, Descriptor, LAYER_GZIP_TYPE, MANIFEST_V2_TYPE, ManifestV2};

/// Gzip magic prefix used for content sniffing
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Bytes sniffed from a layer to decide whether it needs recompression
const SNIFF_LEN: usize = 512;

/// Push a local image directory or tarball to the session's registry
pub async fn push_image(client: &mut RegistryClient, input: &Path, logger: &Logger) -> Result<()> {
    let session = client.session();
    logger.step(&format!(
        "Pushing {} to {}/{}:{}",
        input.display(),
        session.reference.registry,
        session.reference.repository,
        session.reference.reference
    ));

    let source = ImageSource::detect(input, logger)?;
    push_dir(client, source.dir(), logger).await
}

/// Local image input: a directory used in place, or a tarball extracted
/// into a temp directory that is removed when the source drops
enum ImageSource {
    Directory(PathBuf),
    Extracted(TempDir),
}

impl ImageSource {
    fn detect(input: &Path, logger: &Logger) -> Result<Self> {
        let info = fs::metadata(input)?;
        if info.is_dir() {
            return Ok(ImageSource::Directory(input.to_path_buf()));
        }

        let temp = tempfile::Builder::new().prefix("oci-").tempdir()?;
        logger.verbose(&format!(
            "Extracting {} to {}",
            input.display(),
            temp.path().display()
        ));
        extract_tar(input, temp.path())?;
        Ok(ImageSource::Extracted(temp))
    }

    fn dir(&self) -> &Path {
        match self {
            ImageSource::Directory(path) => path,
            ImageSource::Extracted(temp) => temp.path(),
        }
    }
}

/// Unpack an image tarball, keeping each entry's declared mode
fn extract_tar(tar_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(tar_path)?;
    let mut archive = Archive::new(file);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_type = entry.header().entry_type();
        let path = dest.join(entry.path()?);

        if entry_type.is_dir() {
            fs::create_dir_all(&path)?;
        } else if entry_type.is_file() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            entry.unpack(&path)?;
        }
    }
    Ok(())
}

async fn push_dir(client: &mut RegistryClient, dir: &Path, logger: &Logger) -> Result<()> {
    let manifest_path = dir.join("manifest.json");
    if !manifest_path.exists() {
        // Schema 1 trees carry no manifest.json and cannot be upconverted here
        return Err(TransferError::Upload(format!(
            "no manifest.json in {}; only schema 2 image trees can be pushed",
            dir.display()
        )));
    }

    let entries: Vec<LocalManifestEntry> = serde_json::from_slice(&fs::read(&manifest_path)?)?;
    let entry = entries
        .into_iter()
        .next()
        .ok_or_else(|| TransferError::Upload("manifest.json is empty".to_string()))?;

    let (config_digest, config_size) = client
        .upload_blob(&dir.join(&entry.config), CONFIG_TYPE, logger)
        .await?;

    let mut layers = Vec::with_capacity(entry.layers.len());
    for layer_name in &entry.layers {
        let (digest, size) = upload_layer(client, &dir.join(layer_name), logger).await?;
        layers.push(Descriptor {
            media_type: LAYER_GZIP_TYPE.to_string(),
            size,
            digest,
        });
    }

    let manifest = ManifestV2 {
        schema_version: 2,
        media_type: Some(MANIFEST_V2_TYPE.to_string()),
        config: Descriptor {
            media_type: CONFIG_TYPE.to_string(),
            size: config_size,
            digest: config_digest,
        },
        layers,
    };
    client
        .upload_manifest(serde_json::to_vec(&manifest)?, logger)
        .await
}

/// Upload one layer, recompressing to gzip when the blob is not already gzip
async fn upload_layer(
    client: &mut RegistryClient,
    path: &Path,
    logger: &Logger,
) -> Result<(String, u64)> {
    let upload_path = ensure_gzip(path, logger)?;
    client.upload_blob(&upload_path, LAYER_GZIP_TYPE, logger).await
}

/// Return the path of a gzip-compressed version of `path`, compressing to
/// `<path>.gz` when the content is not already gzip
fn ensure_gzip(path: &Path, logger: &Logger) -> Result<PathBuf> {
    let mut file = File::open(path)?;
    let mut head = [0u8; SNIFF_LEN];
    let read = file.read(&mut head)?;
    if read >= GZIP_MAGIC.len() && head[..GZIP_MAGIC.len()] == GZIP_MAGIC {
        return Ok(path.to_path_buf());
    }

    let mut gz_name = path.as_os_str().to_os_string();
    gz_name.push(".gz");
    let gz_path = PathBuf::from(gz_name);
    logger.verbose(&format!(
        "Compressing {} to {}",
        path.display(),
        gz_path.display()
    ));

    file.seek(SeekFrom::Start(0))?;
    let mut encoder = GzEncoder::new(File::create(&gz_path)?, Compression::default());
    io::copy(&mut file, &mut encoder)?;
    encoder.finish()?;
    Ok(gz_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;

    #[test]
    fn test_ensure_gzip_leaves_gzip_files_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layer.tar");

        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        io::copy(&mut &b"already compressed"[..], &mut encoder).unwrap();
        encoder.finish().unwrap();

        let upload_path = ensure_gzip(&path, &Logger::new_quiet()).unwrap();
        assert_eq!(upload_path, path);
        assert!(!dir.path().join("layer.tar.gz").exists());
    }

    #[test]
    fn test_ensure_gzip_compresses_raw_layers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layer.tar");
        let payload = b"plain tar bytes".repeat(64);
        fs::write(&path, &payload).unwrap();

        let upload_path = ensure_gzip(&path, &Logger::new_quiet()).unwrap();
        assert_eq!(upload_path, dir.path().join("layer.tar.gz"));

        let mut decoder = GzDecoder::new(File::open(&upload_path).unwrap());
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed).unwrap();
        assert_eq!(decompressed, payload);
    }

    #[test]
    fn test_extract_tar_restores_layout() {
        let staging = tempfile::tempdir().unwrap();
        fs::write(staging.path().join("manifest.json"), b"[]").unwrap();
        let layer_dir = staging.path().join("aaa");
        fs::create_dir(&layer_dir).unwrap();
        fs::write(layer_dir.join("layer.tar"), b"payload").unwrap();

        let out = tempfile::tempdir().unwrap();
        let tar_path = out.path().join("image.tar");
        crate::tar_utils::pack_dir(staging.path(), &tar_path).unwrap();

        let dest = tempfile::tempdir().unwrap();
        extract_tar(&tar_path, dest.path()).unwrap();
        assert_eq!(fs::read(dest.path().join("manifest.json")).unwrap(), b"[]");
        assert_eq!(
            fs::read(dest.path().join("aaa/layer.tar")).unwrap(),
            b"payload"
        );
    }
}
