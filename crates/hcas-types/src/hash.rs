use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Width in bytes of every digest the system produces.
pub const HASH_LEN: usize = 32;

/// Content-addressed identifier for blobs and distributions.
///
/// A `ContentHash` is the raw 32-byte digest of an object's bytes (or, for a
/// distribution, the Merkle root over its manifest). It always renders as
/// lowercase hex, which is also the key used on the wire and on disk.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; HASH_LEN]);

impl ContentHash {
    /// Wrap a pre-computed digest.
    pub const fn from_digest(digest: [u8; HASH_LEN]) -> Self {
        Self(digest)
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Lowercase hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters), for logs.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string (64 hex characters, either case).
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != HASH_LEN {
            return Err(TypeError::InvalidLength {
                expected: HASH_LEN,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; HASH_LEN];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Directory shards used by the filesystem backend: `(hex[0:2], hex[2:4])`.
    pub fn shards(&self) -> (String, String) {
        (hex::encode(&self.0[..1]), hex::encode(&self.0[1..2]))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s.trim())
    }
}

impl From<[u8; HASH_LEN]> for ContentHash {
    fn from(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }
}

impl From<ContentHash> for [u8; HASH_LEN] {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ContentHash {
        let mut digest = [0u8; HASH_LEN];
        for (i, b) in digest.iter_mut().enumerate() {
            *b = i as u8 * 7;
        }
        ContentHash::from_digest(digest)
    }

    #[test]
    fn hex_is_lowercase_and_64_chars() {
        let hex = ContentHash::from_digest([0xAB; HASH_LEN]).to_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn parse_accepts_uppercase() {
        let upper = "AB".repeat(32);
        let parsed = ContentHash::from_hex(&upper).unwrap();
        assert_eq!(parsed, ContentHash::from_digest([0xab; HASH_LEN]));
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(matches!(
            ContentHash::from_hex("abc"),
            Err(TypeError::InvalidHex(_))
        ));
        assert!(matches!(
            ContentHash::from_hex("abcd"),
            Err(TypeError::InvalidLength { expected: 32, actual: 2 })
        ));
        assert!(ContentHash::from_hex(&"g".repeat(64)).is_err());
    }

    #[test]
    fn shards_are_first_four_hex_chars() {
        let hash = sample();
        let hex = hash.to_hex();
        let (a, b) = hash.shards();
        assert_eq!(a, &hex[0..2]);
        assert_eq!(b, &hex[2..4]);
    }

    #[test]
    fn from_str_trims_whitespace() {
        let hash = sample();
        let parsed: ContentHash = format!("{hash}\n").parse().unwrap();
        assert_eq!(parsed, hash);
    }

    #[test]
    fn serializes_as_hex_string() {
        let hash = sample();
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash.to_hex()));
        let parsed: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, hash);
    }
}
