//! Content digests for integrity verification.
//!
//! Digests here detect whether two files hold identical bytes; they are not
//! a security boundary. MD5 is the default because equality detection is the
//! only requirement; SHA-256 and BLAKE3 are available for callers that want
//! them.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::EngineError;

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Md5,
    Sha256,
    Blake3,
}

impl Default for DigestAlgorithm {
    fn default() -> Self {
        DigestAlgorithm::Md5
    }
}

impl std::fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Md5 => write!(f, "md5"),
            Self::Sha256 => write!(f, "sha256"),
            Self::Blake3 => write!(f, "blake3"),
        }
    }
}

impl std::str::FromStr for DigestAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            other => Err(format!("unsupported digest algorithm: {other}")),
        }
    }
}

enum Hasher {
    Md5(md5::Context),
    Sha256(sha2::Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl Hasher {
    fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Md5 => Hasher::Md5(md5::Context::new()),
            DigestAlgorithm::Sha256 => {
                use sha2::Digest;
                Hasher::Sha256(sha2::Sha256::new())
            }
            DigestAlgorithm::Blake3 => Hasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Md5(ctx) => ctx.consume(data),
            Hasher::Sha256(hasher) => {
                use sha2::Digest;
                hasher.update(data);
            }
            Hasher::Blake3(hasher) => {
                hasher.update(data);
            }
        }
    }

    fn finalize(self) -> String {
        match self {
            Hasher::Md5(ctx) => format!("{:x}", ctx.compute()),
            Hasher::Sha256(hasher) => {
                use sha2::Digest;
                format!("{:x}", hasher.finalize())
            }
            Hasher::Blake3(hasher) => hasher.finalize().to_hex().to_string(),
        }
    }
}

/// Stream a file through the selected hash and return the lowercase hex
/// digest.
///
/// The file handle is dropped on every exit path, so a digest immediately
/// followed by a rename of the same file is safe on platforms that lock open
/// handles.
pub fn digest_file(path: &Path, algorithm: DigestAlgorithm) -> Result<String, EngineError> {
    let mut file = File::open(path).map_err(|e| EngineError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut hasher = Hasher::new(algorithm);
    let mut buffer = [0u8; 65536];

    loop {
        match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buffer[..n]),
            Err(e) => {
                return Err(EngineError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        }
    }

    Ok(hasher.finalize())
}
