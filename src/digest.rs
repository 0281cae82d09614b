//! SHA-256 digest helpers shared by the pull and push pipelines

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const READ_BUFFER_SIZE: usize = 64 * 1024;

pub struct DigestUtils;

impl DigestUtils {
    /// Lowercase hex SHA-256 of a byte slice
    pub fn sha256_hex(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }

    /// Content address of a byte slice, `sha256:<hex>`
    pub fn digest_string(data: &[u8]) -> String {
        format!("sha256:{}", Self::sha256_hex(data))
    }

    /// Content address of a file, computed without loading it into memory
    pub fn digest_file(path: &Path) -> Result<String> {
        let mut file = File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];

        loop {
            let read = file.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
    }

    /// Synthesized v1-style layer id required by `docker load` for v2 images.
    ///
    /// The id chains the parent layer id with the blob digest; the first
    /// layer uses the empty string as its parent.
    pub fn fake_layer_id(parent_id: &str, blob_digest: &str) -> String {
        Self::sha256_hex(format!("{}\n{}\n", parent_id, blob_digest).as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_digest_string_format() {
        let digest = DigestUtils::digest_string(b"hello");
        assert!(digest.starts_with("sha256:"));
        assert_eq!(digest.len(), "sha256:".len() + 64);
        assert_eq!(
            digest,
            "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_digest_file_matches_digest_of_bytes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"layer bytes").unwrap();
        assert_eq!(
            DigestUtils::digest_file(file.path()).unwrap(),
            DigestUtils::digest_string(b"layer bytes")
        );
    }

    #[test]
    fn test_fake_layer_id_chain_is_deterministic() {
        let digests = ["sha256:aaa", "sha256:bbb", "sha256:ccc"];

        let mut parent = String::new();
        let mut chain = Vec::new();
        for digest in &digests {
            let id = DigestUtils::fake_layer_id(&parent, digest);
            assert_eq!(id.len(), 64);
            chain.push(id.clone());
            parent = id;
        }

        // Recomputing from the digests alone reproduces the ids
        let mut parent = String::new();
        for (digest, expected) in digests.iter().zip(&chain) {
            let id = DigestUtils::fake_layer_id(&parent, digest);
            assert_eq!(&id, expected);
            parent = id;
        }

        // First layer hashes "\n<digest>\n"
        assert_eq!(
            chain[0],
            DigestUtils::sha256_hex(b"\nsha256:aaa\n"),
        );
    }
}
