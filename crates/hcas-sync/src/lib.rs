//! Client-side synchronization for hcas.
//!
//! [`Synchronizer`] walks a local directory, uploads its files through a
//! bounded pool of worker threads with dedup probing, and publishes the
//! result as one distribution. [`HttpTransport`] speaks the server's wire
//! protocol; [`LocalTransport`] talks to an in-process [`hcas_store::CasService`].

pub mod error;
pub mod retry;
pub mod sync;
pub mod transport;
pub mod types;

pub use error::{SyncError, SyncResult};
pub use retry::RetryPolicy;
pub use sync::{set_label_checked, Synchronizer};
pub use transport::{CasTransport, HttpConfig, HttpTransport, LocalTransport, DEFAULT_URL};
pub use types::{
    DistroReport, FileReport, LabelReport, SyncOptions, SyncReport, DEFAULT_WORKERS,
};
