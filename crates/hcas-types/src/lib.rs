//! Foundation types for hcas, the content-addressable storage service.
//!
//! Every other hcas crate depends on `hcas-types`.
//!
//! # Key Types
//!
//! - [`ContentHash`]: 32-byte digest naming a blob or a distribution
//! - [`ManifestEntry`] / [`Manifest`]: ordered `path -> blob hash` listing
//!   and its `path:hashHex` line codec
//! - [`validate_label`]: naming rules for mutable labels

pub mod error;
pub mod hash;
pub mod label;
pub mod manifest;

pub use error::TypeError;
pub use hash::{ContentHash, HASH_LEN};
pub use label::validate_label;
pub use manifest::{Manifest, ManifestEntry, ENTRY_SEPARATOR};
