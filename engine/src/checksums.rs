//! Streaming checksums.
//!
//! This module provides:
//! - Multiple checksum algorithms (XXH64, BLAKE3, SHA-256, MD5)
//! - An incremental hasher trait fed chunk by chunk by the copy pipeline
//! - File-level checksum computation
//!
//! XXH64 (seed 0) is the default. Its hex form is unpadded lowercase, so a
//! digest with leading zero nibbles prints shorter than 16 characters; the
//! history log stores it in that form.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;
use xxhash_rust::xxh64::Xxh64;

/// Supported checksum algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    /// XXH64, seed 0 (fast, 64-bit, non-cryptographic)
    Xxh64,
    /// BLAKE3 (modern, fast, 256-bit)
    Blake3,
    /// SHA-256 (cryptographic, 256-bit)
    Sha256,
    /// MD5 (deprecated, but included for compatibility)
    Md5,
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Xxh64 => write!(f, "xxh64"),
            Self::Blake3 => write!(f, "blake3"),
            Self::Sha256 => write!(f, "sha256"),
            Self::Md5 => write!(f, "md5"),
        }
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "xxh64" | "xxhash" => Ok(Self::Xxh64),
            "blake3" => Ok(Self::Blake3),
            "sha256" => Ok(Self::Sha256),
            "md5" => Ok(Self::Md5),
            other => Err(format!(
                "Invalid hash algorithm '{}'. Must be 'xxh64', 'blake3', 'sha256', or 'md5'",
                other
            )),
        }
    }
}

/// A computed checksum value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumValue {
    algorithm: ChecksumAlgorithm,
    hex: String,
}

impl ChecksumValue {
    pub fn new(algorithm: ChecksumAlgorithm, hex: String) -> Self {
        ChecksumValue { algorithm, hex }
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    /// Get the hex string representation
    pub fn hex(&self) -> &str {
        &self.hex
    }

    pub fn into_hex(self) -> String {
        self.hex
    }
}

impl fmt::Display for ChecksumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hex)
    }
}

/// Incremental hasher fed with consecutive chunks of one stream.
pub trait ChecksumHasher: Send {
    /// Update the hasher with new data
    fn update(&mut self, data: &[u8]);

    /// Digest of everything fed so far
    fn finalize(&self) -> ChecksumValue;
}

struct Xxh64Hasher {
    state: Xxh64,
}

impl ChecksumHasher for Xxh64Hasher {
    fn update(&mut self, data: &[u8]) {
        self.state.update(data);
    }

    fn finalize(&self) -> ChecksumValue {
        ChecksumValue::new(ChecksumAlgorithm::Xxh64, format!("{:x}", self.state.digest()))
    }
}

struct Blake3Hasher {
    hasher: blake3::Hasher,
}

impl ChecksumHasher for Blake3Hasher {
    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    fn finalize(&self) -> ChecksumValue {
        ChecksumValue::new(
            ChecksumAlgorithm::Blake3,
            self.hasher.finalize().to_hex().to_string(),
        )
    }
}

struct Sha256Hasher {
    hasher: sha2::Sha256,
}

impl ChecksumHasher for Sha256Hasher {
    fn update(&mut self, data: &[u8]) {
        use sha2::Digest;
        self.hasher.update(data);
    }

    fn finalize(&self) -> ChecksumValue {
        use sha2::Digest;
        let digest = self.hasher.clone().finalize();
        ChecksumValue::new(ChecksumAlgorithm::Sha256, format!("{:x}", digest))
    }
}

struct Md5Hasher {
    context: md5::Context,
}

impl ChecksumHasher for Md5Hasher {
    fn update(&mut self, data: &[u8]) {
        self.context.consume(data);
    }

    fn finalize(&self) -> ChecksumValue {
        let digest = self.context.clone().compute();
        ChecksumValue::new(ChecksumAlgorithm::Md5, format!("{:x}", digest))
    }
}

/// Create a new hasher for the given algorithm
pub fn create_hasher(algorithm: ChecksumAlgorithm) -> Box<dyn ChecksumHasher> {
    match algorithm {
        ChecksumAlgorithm::Xxh64 => Box::new(Xxh64Hasher {
            state: Xxh64::new(0),
        }),
        ChecksumAlgorithm::Blake3 => Box::new(Blake3Hasher {
            hasher: blake3::Hasher::new(),
        }),
        ChecksumAlgorithm::Sha256 => Box::new(Sha256Hasher {
            hasher: sha2::Sha256::default(),
        }),
        ChecksumAlgorithm::Md5 => Box::new(Md5Hasher {
            context: md5::Context::new(),
        }),
    }
}

/// Compute checksum for a file
pub fn compute_file_checksum(path: &Path, algorithm: ChecksumAlgorithm) -> io::Result<ChecksumValue> {
    let mut file = File::open(path)?;
    let mut hasher = create_hasher(algorithm);
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buffer[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(hasher.finalize())
}
