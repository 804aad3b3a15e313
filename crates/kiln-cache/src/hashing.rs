//! File hashing with the SHA-2 family.

use kiln_core::ports::{HashAlgorithm, HashFactory};
use kiln_core::{Error, Result};
use sha2::{Digest, Sha256, Sha512};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;

pub const SHA256: &str = "SHA-256";
pub const SHA512: &str = "SHA-512";

/// Hash factory for a configured algorithm id.
pub fn hash_factory_for(algorithm: &str) -> Result<Arc<dyn HashFactory>> {
    if algorithm.eq_ignore_ascii_case(SHA256) {
        Ok(Arc::new(Sha256HashFactory))
    } else if algorithm.eq_ignore_ascii_case(SHA512) {
        Ok(Arc::new(Sha512HashFactory))
    } else {
        Err(Error::InvalidConfig(format!(
            "unsupported hash algorithm {} (expected {} or {})",
            algorithm, SHA256, SHA512
        )))
    }
}

fn hash_file<D: Digest>(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| {
        Error::Storage(format!("Failed to open {} for hashing: {}", path.display(), e))
    })?;
    let mut reader = BufReader::new(file);
    let mut hasher = D::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = reader.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hash factory producing [`Sha256Hasher`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256HashFactory;

impl HashFactory for Sha256HashFactory {
    fn algorithm(&self) -> &str {
        SHA256
    }

    fn create(&self) -> Box<dyn HashAlgorithm> {
        Box::new(Sha256Hasher)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl HashAlgorithm for Sha256Hasher {
    fn hash(&self, path: &Path) -> Result<String> {
        hash_file::<Sha256>(path)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sha512HashFactory;

impl HashFactory for Sha512HashFactory {
    fn algorithm(&self) -> &str {
        SHA512
    }

    fn create(&self) -> Box<dyn HashAlgorithm> {
        Box::new(Sha512Hasher)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sha512Hasher;

impl HashAlgorithm for Sha512Hasher {
    fn hash(&self, path: &Path) -> Result<String> {
        hash_file::<Sha512>(path)
    }
}

/// Hex SHA-256 of an in-memory buffer.
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
