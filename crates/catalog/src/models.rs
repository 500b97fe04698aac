//! Snapshot and catalog models.
//!
//! `Raw*` types mirror what an acquisition source reports, untouched. The
//! normalized [`Item`]/[`Attachment`]/[`Catalog`] types are what the rest of
//! the pipeline works with; they only exist behind a successful
//! [`Snapshot::normalize`](crate::Snapshot::normalize) call.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use time::OffsetDateTime;

/// Which acquisition path produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    /// Zotero Web API v3.
    Remote,
    /// Local `zotero.sqlite` database.
    Local,
}

/// An item record as reported by the acquisition source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawItem {
    /// Zotero item key (8 characters, unique within a library).
    pub key: String,
    /// Item title; may be empty for untitled items.
    #[serde(default)]
    pub title: String,
}

/// An attachment record as reported by the acquisition source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAttachment {
    /// Zotero attachment key.
    pub key: String,
    /// Key of the owning item.
    pub parent: String,
    /// Filename as recorded by the catalog. May diverge from the actual
    /// on-disk name.
    pub filename: String,
    /// Path hint from the catalog: absolute for linked files, relative to
    /// the attachment's storage directory otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_hint: Option<PathBuf>,
    /// MD5 the catalog recorded for the file, if any. Carried for reporting
    /// only — content identity is always recomputed from disk, since the
    /// catalog gives no guarantee this hash is fresh.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_md5: Option<String>,
    /// MIME type as recorded by the catalog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Raw catalog snapshot: the uniform output of both acquisition paths.
///
/// Serializable so the `fetch`/`read` CLI subcommands can persist it and the
/// `copy` subcommand can consume it later without re-acquiring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// When the snapshot was acquired.
    #[serde(with = "time::serde::rfc3339")]
    pub acquired_at: OffsetDateTime,
    pub source: SnapshotSource,
    /// Item records in source order.
    pub items: Vec<RawItem>,
    /// Attachment records in source order.
    pub attachments: Vec<RawAttachment>,
}

impl Snapshot {
    pub fn new(source: SnapshotSource, items: Vec<RawItem>, attachments: Vec<RawAttachment>) -> Self {
        Self { acquired_at: OffsetDateTime::now_utc(), source, items, attachments }
    }
}

/// A validated logical catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub key: String,
    pub title: String,
    /// Keys of attachments owned by this item, in source order.
    pub attachments: Vec<String>,
}

/// A validated reference to one physical file owned by an [`Item`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub key: String,
    pub parent: String,
    pub filename: String,
    pub path_hint: Option<PathBuf>,
    pub recorded_md5: Option<String>,
    pub content_type: Option<String>,
}

/// The normalized catalog: items and attachments with referential integrity
/// checked and source insertion order preserved.
///
/// Immutable for the lifetime of a run — the pipeline never writes back.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub(crate) items: Vec<Item>,
    pub(crate) attachments: Vec<Attachment>,
    pub(crate) item_index: HashMap<String, usize>,
}

impl Catalog {
    /// Items in source order.
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Attachments in source order.
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Look up an item by key.
    pub fn item(&self, key: &str) -> Option<&Item> {
        self.item_index.get(key).map(|&i| &self.items[i])
    }
}
