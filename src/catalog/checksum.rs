use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;

/// Supported checksum algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumKind {
    #[default]
    Md5,
    Sha256,
    Sha512,
}

impl ChecksumKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChecksumKind::Md5 => "md5",
            ChecksumKind::Sha256 => "sha256",
            ChecksumKind::Sha512 => "sha512",
        }
    }

    /// Fresh accumulator for this algorithm.
    pub fn hasher(&self) -> RunningHash {
        match self {
            ChecksumKind::Md5 => RunningHash::Md5(Md5::new()),
            ChecksumKind::Sha256 => RunningHash::Sha256(Sha256::new()),
            ChecksumKind::Sha512 => RunningHash::Sha512(Sha512::new()),
        }
    }
}

impl fmt::Display for ChecksumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a computed digest is rendered before it is compared with the
/// published value. The comparison itself is always exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HexCase {
    #[default]
    Upper,
    Lower,
}

impl HexCase {
    pub fn encode(&self, bytes: impl AsRef<[u8]>) -> String {
        match self {
            HexCase::Upper => hex::encode_upper(bytes),
            HexCase::Lower => hex::encode(bytes),
        }
    }
}

/// Hash accumulator over one of the supported algorithms.
#[derive(Clone)]
pub enum RunningHash {
    Md5(Md5),
    Sha256(Sha256),
    Sha512(Sha512),
}

impl RunningHash {
    pub fn update(&mut self, bytes: &[u8]) {
        match self {
            RunningHash::Md5(h) => h.update(bytes),
            RunningHash::Sha256(h) => h.update(bytes),
            RunningHash::Sha512(h) => h.update(bytes),
        }
    }

    pub fn finalize_hex(self, case: HexCase) -> String {
        match self {
            RunningHash::Md5(h) => case.encode(h.finalize()),
            RunningHash::Sha256(h) => case.encode(h.finalize()),
            RunningHash::Sha512(h) => case.encode(h.finalize()),
        }
    }
}

impl fmt::Debug for RunningHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            RunningHash::Md5(_) => ChecksumKind::Md5,
            RunningHash::Sha256(_) => ChecksumKind::Sha256,
            RunningHash::Sha512(_) => ChecksumKind::Sha512,
        };
        f.debug_tuple("RunningHash").field(&kind).finish()
    }
}
