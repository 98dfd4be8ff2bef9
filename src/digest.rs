//! Fixed-size content and path fingerprints.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use thiserror::Error;

/// Number of bytes in a [`Digest`].
pub const DIGEST_LEN: usize = 16;

/// A 128-bit fingerprint identifying either a filesystem path or the content
/// of a cached object.
///
/// Equality is byte-wise over the full digest. The [`Hash`] implementation
/// only scrambles the leading eight bytes for fast table placement; any map
/// keyed by `Digest` therefore relies on the full-width `Eq` check to
/// disambiguate colliding fingerprints, which must never be optimized away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// Wraps raw digest bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Fingerprints a filesystem path.
    ///
    /// The path is hashed as the exact byte sequence of its string form, so
    /// `/a/b` and `/a/b/` produce different digests. Callers are expected to
    /// normalize paths before lookup.
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        Self(md5::compute(path.as_bytes()).0)
    }

    /// Fingerprints the content of an object.
    #[must_use]
    pub fn from_content(bytes: &[u8]) -> Self {
        Self(md5::compute(bytes).0)
    }

    /// Returns the raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Lowercase hex rendering, used as the object's on-disk name.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Hash for Digest {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // The digest is already uniformly distributed; the first word is
        // enough for table placement.
        state.write_u64(u64::from_le_bytes(
            self.0[..8].try_into().unwrap_or([0u8; 8]),
        ));
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Failure to parse a hex string as a [`Digest`].
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid digest: {0:?}")]
pub struct ParseDigestError(pub String);

impl FromStr for Digest {
    type Err = ParseDigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| ParseDigestError(s.to_owned()))?;
        let bytes: [u8; DIGEST_LEN] = bytes
            .try_into()
            .map_err(|_| ParseDigestError(s.to_owned()))?;
        Ok(Self(bytes))
    }
}

impl serde::Serialize for Digest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for Digest {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
