//! Catalog acquisition.
//!
//! Two interchangeable ways of obtaining a [`Snapshot`] of a Zotero library:
//!
//! - [`RemoteAcquirer`] — the Zotero Web API v3, paginated, authenticated
//!   with an API key.
//! - [`LocalAcquirer`] — the `zotero.sqlite` database on disk, read from a
//!   temporary copy so a running Zotero instance (which holds a lock) never
//!   blocks us.
//!
//! Both are exposed behind the [`CatalogAcquirer`] trait so the rest of the
//! program never branches on which path supplied the metadata. Acquisition
//! failures all surface as [`error::ErrorKind`], which separates bad
//! credentials from an unreachable source from data we can't interpret.

pub mod error;
mod local;
mod remote;

pub use crate::local::LocalAcquirer;
pub use crate::remote::{Library, RemoteAcquirer};
use crate::error::Result;
use async_trait::async_trait;
use zotcopy_catalog::{Snapshot, SnapshotSource};

/// Capability: produce a raw catalog snapshot, or fail with an acquisition
/// error.
#[async_trait]
pub trait CatalogAcquirer: Send + Sync {
    /// Which acquisition path this is (recorded in the snapshot).
    fn source(&self) -> SnapshotSource;

    /// Acquire the full catalog: all items and all file attachments.
    async fn acquire(&self) -> Result<Snapshot>;
}
