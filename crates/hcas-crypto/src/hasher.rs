use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use hcas_types::ContentHash;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Content byte of the sentinel padding leaf.
pub const SENTINEL_CONTENT: &[u8] = &[0x00];

/// SHA-256 of [`SENTINEL_CONTENT`], the well-known padding hash.
pub const SENTINEL_SHA256: ContentHash = ContentHash::from_digest([
    0x6e, 0x34, 0x0b, 0x9c, 0xff, 0xb3, 0x7a, 0x98, 0x9c, 0xa5, 0x44, 0xe6, 0xbb, 0x78, 0x0a, 0x2c,
    0x78, 0x90, 0x1d, 0x3f, 0xb3, 0x37, 0x38, 0x76, 0x85, 0x11, 0xa3, 0x06, 0x17, 0xaf, 0xa0, 0x1d,
]);

/// Digest function used for every content address in a deployment.
///
/// Client and server must agree on the algorithm, otherwise dedup checks
/// never hit and the server-confirmed hashes differ from local ones.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Blake3,
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha256 => write!(f, "sha256"),
            Self::Blake3 => write!(f, "blake3"),
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = HasherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            other => Err(HasherError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Deterministic content hasher.
///
/// Besides plain content digests it provides the bound manifest-leaf digest
/// `H(path || ":" || blobHash)` and the pair digest `H(left || right)` used
/// for internal Merkle nodes. Both operate on raw digest bytes, never on
/// their hex form.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContentHasher {
    algorithm: HashAlgorithm,
}

impl ContentHasher {
    pub const SHA256: Self = Self {
        algorithm: HashAlgorithm::Sha256,
    };
    pub const BLAKE3: Self = Self {
        algorithm: HashAlgorithm::Blake3,
    };

    pub const fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    /// Algorithm this hasher was built for.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Hash raw bytes.
    pub fn hash(&self, data: &[u8]) -> ContentHash {
        self.hash_parts(&[data])
    }

    /// Hash the concatenation of `parts` without materializing it.
    pub fn hash_parts(&self, parts: &[&[u8]]) -> ContentHash {
        let mut state = self.incremental();
        for part in parts {
            state.update(part);
        }
        state.finalize()
    }

    /// Manifest leaf digest binding a path to the blob it references.
    pub fn hash_entry(&self, path: &str, blob: &ContentHash) -> ContentHash {
        self.hash_parts(&[path.as_bytes(), b":", blob.as_bytes()])
    }

    /// Internal node digest over two child digests.
    pub fn hash_pair(&self, left: &ContentHash, right: &ContentHash) -> ContentHash {
        self.hash_parts(&[left.as_bytes(), right.as_bytes()])
    }

    /// Hash of the sentinel padding leaf for this algorithm.
    pub fn sentinel(&self) -> ContentHash {
        match self.algorithm {
            HashAlgorithm::Sha256 => SENTINEL_SHA256,
            HashAlgorithm::Blake3 => self.hash(SENTINEL_CONTENT),
        }
    }

    /// Verify that data produces the expected hash.
    pub fn verify(&self, data: &[u8], expected: &ContentHash) -> bool {
        self.hash(data) == *expected
    }

    /// Hash everything a reader yields.
    pub fn hash_reader<R: Read>(&self, mut reader: R) -> io::Result<ContentHash> {
        let mut state = self.incremental();
        let mut buffer = [0u8; 8192];
        loop {
            let read = reader.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            state.update(&buffer[..read]);
        }
        Ok(state.finalize())
    }

    /// Stream a file from disk through the hasher.
    pub fn hash_file(&self, path: &Path) -> io::Result<ContentHash> {
        self.hash_reader(BufReader::new(File::open(path)?))
    }

    /// Start an incremental hash.
    pub fn incremental(&self) -> IncrementalHasher {
        let inner = match self.algorithm {
            HashAlgorithm::Sha256 => State::Sha256(Sha256::new()),
            HashAlgorithm::Blake3 => State::Blake3(Box::new(blake3::Hasher::new())),
        };
        IncrementalHasher { inner }
    }
}

enum State {
    Sha256(Sha256),
    Blake3(Box<blake3::Hasher>),
}

/// Incremental hasher for building a digest across multiple chunks.
pub struct IncrementalHasher {
    inner: State,
}

impl IncrementalHasher {
    /// Feed more bytes.
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.inner {
            State::Sha256(h) => h.update(data),
            State::Blake3(h) => {
                h.update(data);
            }
        }
    }

    /// Digest of everything fed so far.
    pub fn finalize(self) -> ContentHash {
        match self.inner {
            State::Sha256(h) => ContentHash::from_digest(h.finalize().into()),
            State::Blake3(h) => ContentHash::from_digest(*h.finalize().as_bytes()),
        }
    }
}

/// Errors from hashing configuration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("unknown hash algorithm: {0}")]
    UnknownAlgorithm(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let data = b"hello world";
        assert_eq!(
            ContentHasher::SHA256.hash(data),
            ContentHasher::SHA256.hash(data)
        );
    }

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            ContentHasher::SHA256.hash(b"hello").to_hex(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn sentinel_constant_matches_zero_byte_digest() {
        assert_eq!(SENTINEL_SHA256, ContentHasher::SHA256.hash(SENTINEL_CONTENT));
        assert_eq!(
            SENTINEL_SHA256.to_hex(),
            "6e340b9cffb37a989ca544e6bb780a2c78901d3fb33738768511a30617afa01d"
        );
        assert_eq!(
            ContentHasher::BLAKE3.sentinel(),
            ContentHasher::BLAKE3.hash(&[0x00])
        );
    }

    #[test]
    fn algorithms_disagree() {
        assert_ne!(
            ContentHasher::SHA256.hash(b"data"),
            ContentHasher::BLAKE3.hash(b"data")
        );
    }

    #[test]
    fn parts_equal_concatenation() {
        let hasher = ContentHasher::default();
        assert_eq!(
            hasher.hash_parts(&[b"hello ", b"world"]),
            hasher.hash(b"hello world")
        );
    }

    #[test]
    fn entry_hash_binds_raw_blob_bytes() {
        let hasher = ContentHasher::SHA256;
        let blob = hasher.hash(b"hello");
        let mut expected = b"a.txt:".to_vec();
        expected.extend_from_slice(blob.as_bytes());
        assert_eq!(hasher.hash_entry("a.txt", &blob), hasher.hash(&expected));
        assert_ne!(
            hasher.hash_entry("a.txt", &blob),
            hasher.hash(format!("a.txt:{blob}").as_bytes())
        );
    }

    #[test]
    fn pair_hash_is_order_sensitive() {
        let hasher = ContentHasher::SHA256;
        let a = hasher.hash(b"a");
        let b = hasher.hash(b"b");
        assert_ne!(hasher.hash_pair(&a, &b), hasher.hash_pair(&b, &a));
    }

    #[test]
    fn verify_detects_tampering() {
        let hasher = ContentHasher::BLAKE3;
        let id = hasher.hash(b"original");
        assert!(hasher.verify(b"original", &id));
        assert!(!hasher.verify(b"tampered", &id));
    }

    #[test]
    fn hash_file_matches_hash_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let data = vec![0xABu8; 20_000];
        std::fs::write(&path, &data).unwrap();
        for hasher in [ContentHasher::SHA256, ContentHasher::BLAKE3] {
            assert_eq!(hasher.hash_file(&path).unwrap(), hasher.hash(&data));
        }
    }

    #[test]
    fn algorithm_parses_from_str() {
        assert_eq!("sha256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!("BLAKE3".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Blake3);
        assert!("md5".parse::<HashAlgorithm>().is_err());
        assert_eq!(HashAlgorithm::Blake3.to_string(), "blake3");
    }
}
