use std::collections::BTreeSet;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

/// The digest algorithms a verification record may declare.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChecksumKind {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl ChecksumKind {
    pub const ALL: [ChecksumKind; 4] = [
        ChecksumKind::Md5,
        ChecksumKind::Sha1,
        ChecksumKind::Sha256,
        ChecksumKind::Sha512,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChecksumKind::Md5 => "md5",
            ChecksumKind::Sha1 => "sha1",
            ChecksumKind::Sha256 => "sha256",
            ChecksumKind::Sha512 => "sha512",
        }
    }

    /// md5 and sha1 are accepted for compatibility but are not
    /// collision-resistant.
    pub fn is_secure(self) -> bool {
        matches!(self, ChecksumKind::Sha256 | ChecksumKind::Sha512)
    }
}

impl fmt::Display for ChecksumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChecksumKind {
    type Err = UnknownChecksumKind;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value {
            "md5" => Ok(ChecksumKind::Md5),
            "sha1" => Ok(ChecksumKind::Sha1),
            "sha256" => Ok(ChecksumKind::Sha256),
            "sha512" => Ok(ChecksumKind::Sha512),
            _ => Err(UnknownChecksumKind {
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown checksum kind '{value}'")]
pub struct UnknownChecksumKind {
    pub value: String,
}

/// An expected checksum for one artifact, with optionally accepted historical
/// alternatives and provenance metadata carried through the verification
/// document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Checksum {
    pub kind: ChecksumKind,
    pub value: String,
    pub alternatives: BTreeSet<String>,
    pub origin: Option<String>,
    pub reason: Option<String>,
}

impl Checksum {
    pub fn new(kind: ChecksumKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            alternatives: BTreeSet::new(),
            origin: None,
            reason: None,
        }
    }

    pub fn with_alternative(mut self, value: impl Into<String>) -> Self {
        self.alternatives.insert(value.into());
        self
    }

    /// Passes if the computed hash equals the expected value or any accepted
    /// alternative. Hex comparison is case-insensitive; the declared value
    /// keeps whatever case the document used so diagnostics echo it back
    /// verbatim.
    pub fn matches(&self, actual: &str) -> bool {
        self.value.eq_ignore_ascii_case(actual)
            || self
                .alternatives
                .iter()
                .any(|alternative| alternative.eq_ignore_ascii_case(actual))
    }
}

/// Computes artifact digests. Hashing streams the file so large artifacts are
/// never read into memory at once.
#[derive(Debug, Default)]
pub struct ChecksumService;

impl ChecksumService {
    pub fn new() -> Self {
        Self
    }

    /// Computes the `kind` digest of `path` as a lowercase hex string.
    /// Deterministic, pure function of the file bytes.
    pub fn hash(&self, path: &Path, kind: ChecksumKind) -> std::io::Result<String> {
        let file = std::fs::File::open(path)?;
        match kind {
            ChecksumKind::Md5 => hash_reader::<Md5>(file),
            ChecksumKind::Sha1 => hash_reader::<Sha1>(file),
            ChecksumKind::Sha256 => hash_reader::<Sha256>(file),
            ChecksumKind::Sha512 => hash_reader::<Sha512>(file),
        }
    }
}

fn hash_reader<D: Digest>(mut reader: impl Read) -> std::io::Result<String> {
    let mut hasher = D::new();
    let mut buf = [0_u8; 64 * 1024];
    loop {
        let read = reader.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}
