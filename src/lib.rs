//! forkstat - repository statistics over shared rooted storage.
//!
//! Repositories stored together because they share an initial commit (forks)
//! are processed concurrently, one job per repository, and exported as one
//! CSV row each: language usage and line counts, commit and branch counts,
//! fork count and license.
//!
//! # Modules
//!
//! - [`license`] - License text classification and license file discovery
//! - [`locker`] - Per storage root mutual exclusion
//! - [`storage`] - Repository store and rooted storage seams, with backends
//! - [`analysis`] - Language detection and line counting
//! - [`processor`] - Per-repository extraction
//! - [`worker`] - Bounded worker pool
//! - [`forks`] - Fork counting over shared roots
//! - [`export`] - Streaming CSV output
//! - [`pipeline`] - Ties everything together
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use forkstat::{ExportConfig, GitTransactioner, ManifestStore, Pipeline};
//!
//! let store = ManifestStore::open(Path::new("repositories.json")).unwrap();
//! let txer = GitTransactioner::new("/var/lib/roots");
//! let summary = Pipeline::new(Arc::new(store), Arc::new(txer), ExportConfig::default())
//!     .run_to_file(Path::new("result.csv"))
//!     .unwrap();
//! println!("{} processed, {} failed", summary.processed, summary.failed);
//! ```

pub mod analysis;
pub mod error;
pub mod export;
pub mod forks;
pub mod license;
pub mod locker;
pub mod model;
pub mod pipeline;
pub mod processor;
pub mod storage;
pub mod worker;

pub use error::{ExportError, LicenseError, ProcessError, StorageError};
pub use license::{LicenseCatalog, LicenseFamily, LicenseGuess};
pub use model::{ExportRecord, RepositoryRecord, RootId};
pub use pipeline::{CancelToken, ExportConfig, ForkCounting, Pipeline, RunSummary};
pub use storage::{GitTransactioner, ManifestStore};
