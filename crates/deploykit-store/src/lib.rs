//! DeployKit storage engine
//!
//! Stores each uploaded site bundle as an immutable deployment directory,
//! aliases deployments by source commit and tracks which deployment of a
//! project is live. All state lives in the directory tree under one storage
//! root; there is no database and no lock manager.
//!
//! - [`ids`] - validated project names, commit hashes and deployment ids
//! - [`paths`] - where each of those lives on disk
//! - [`archive`] - safe extraction of untrusted `tar.zst` uploads
//! - [`deployments`] - create, list and delete deployments
//! - [`pointers`] - commit aliases and the `current` pointer
//!
//! The API is synchronous. Async callers should move calls onto a blocking
//! thread.

pub mod archive;
pub mod deployments;
pub mod error;
pub mod ids;
pub mod paths;
pub mod pointers;

#[cfg(test)]
pub(crate) mod test_support;

pub use archive::{extract, ExtractSummary, SkipReason, SkippedEntry};
pub use deployments::{DeploymentEntry, DeploymentRecord, DeploymentStore};
pub use error::{Error, Result};
pub use ids::{CommitHash, DeploymentId, IdentifierKind, ProjectName};
pub use paths::{Layout, ProjectPaths};
pub use pointers::{AliasTarget, CommitAlias, PointerManager};
