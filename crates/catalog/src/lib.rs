//! Catalog data model and normalizer.
//!
//! A *snapshot* is the raw output of a catalog acquisition — an ordered list
//! of item records and attachment records exactly as the source reported
//! them. Both acquisition paths (the Zotero Web API and the local
//! `zotero.sqlite` database) produce the same [`Snapshot`] type, so nothing
//! downstream ever branches on where the metadata came from.
//!
//! [`Snapshot::normalize`] turns a snapshot into a [`Catalog`]: the validated
//! in-memory model the deduplication pipeline consumes. Normalization is a
//! pure transformation. It rejects snapshots with duplicate item keys or
//! attachments whose parent item doesn't exist, and it preserves source
//! insertion order — downstream tie-breaking depends on that order being
//! stable.

pub mod error;
mod models;
mod normalize;

pub use crate::models::{Attachment, Catalog, Item, RawAttachment, RawItem, Snapshot, SnapshotSource};
