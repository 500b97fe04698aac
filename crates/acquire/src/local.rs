//! Local `zotero.sqlite` acquirer.
//!
//! Zotero keeps an exclusive lock on its database while running, so the
//! acquirer first copies the file into a temporary directory and reads the
//! copy. The copy lives as long as the acquirer does. The queries live in
//! `queries/*.sql` and target the parts of Zotero's schema that have been
//! stable for years: `items`/`itemTypes`/`deletedItems`, the
//! `itemData`/`itemDataValues`/`fields` EAV triple for titles, and
//! `itemAttachments` for file references.

use crate::CatalogAcquirer;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use sqlx::FromRow;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, instrument};
use zotcopy_catalog::{RawAttachment, RawItem, Snapshot, SnapshotSource};

/// Prefix Zotero uses for paths of attachments stored inside its own
/// storage directory.
const STORAGE_PREFIX: &str = "storage:";
/// Prefix for linked files resolved against a user-configured base
/// directory ("Linked Attachment Base Directory" in Zotero's settings).
const ATTACHMENTS_PREFIX: &str = "attachments:";

#[derive(Debug, FromRow)]
struct ItemRow {
    key: String,
    title: String,
}

#[derive(Debug, FromRow)]
struct AttachmentRow {
    key: String,
    parent_key: String,
    path: String,
    content_type: Option<String>,
}

/// Catalog acquirer backed by a local Zotero database.
#[derive(Debug)]
pub struct LocalAcquirer {
    pool: SqlitePool,
    /// Keeps the database copy alive for the lifetime of the acquirer.
    _workdir: TempDir,
}

impl LocalAcquirer {
    /// Open the database at `path`, working on a private copy.
    ///
    /// Fails with [`ErrorKind::Unreachable`] if the database file doesn't
    /// exist or can't be copied or opened.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            exn::bail!(ErrorKind::Unreachable(format!(
                "database not found at {} (has Zotero been run at least once?)",
                path.display()
            )));
        }
        let workdir = TempDir::new()
            .or_raise(|| ErrorKind::Unreachable("could not create temporary directory".to_string()))?;
        let copy = workdir.path().join("zotero.sqlite");
        tokio::fs::copy(path, &copy)
            .await
            .or_raise(|| ErrorKind::Unreachable(format!("could not copy database from {}", path.display())))?;
        debug!(copy = %copy.display(), "reading catalog from database copy");

        let options = SqliteConnectOptions::new().filename(&copy).read_only(true);
        let pool = SqlitePoolOptions::new()
            // Read-only and short-lived; one connection is plenty.
            .max_connections(1)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Unreachable("could not open database copy".to_string()))?;
        Ok(Self { pool, _workdir: workdir })
    }

    async fn items(&self) -> Result<Vec<RawItem>> {
        let rows: Vec<ItemRow> = sqlx::query_as(include_str!("../queries/select_items.sql"))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(|row| RawItem { key: row.key, title: row.title }).collect())
    }

    async fn attachments(&self) -> Result<Vec<RawAttachment>> {
        let rows: Vec<AttachmentRow> = sqlx::query_as(include_str!("../queries/select_attachments.sql"))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.into_iter().map(RawAttachment::try_from).collect()
    }
}

/// Schema mismatches (missing tables or columns) show up as database errors
/// here; they mean the file isn't a Zotero database we understand.
fn map_sqlx_error(err: sqlx::Error) -> ErrorKind {
    match &err {
        sqlx::Error::Database(db) => ErrorKind::Malformed(db.message().to_string()),
        sqlx::Error::ColumnNotFound(col) => ErrorKind::Malformed(format!("missing column {col}")),
        _ => ErrorKind::Unreachable(err.to_string()),
    }
}

impl TryFrom<AttachmentRow> for RawAttachment {
    type Error = crate::error::Error;

    /// Decode Zotero's `path` column. Three shapes occur in practice:
    /// `storage:<filename>` for imported files, `attachments:<relative>` for
    /// base-directory linked files, and a plain absolute path for ordinary
    /// linked files.
    fn try_from(row: AttachmentRow) -> Result<Self> {
        let (filename, path_hint) = if let Some(name) = row.path.strip_prefix(STORAGE_PREFIX) {
            (name.to_string(), None)
        } else {
            let path = PathBuf::from(row.path.strip_prefix(ATTACHMENTS_PREFIX).unwrap_or(&row.path));
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_raise(|| ErrorKind::Malformed(format!("attachment {} has no filename", row.key)))?;
            (name, Some(path))
        };
        Ok(Self {
            key: row.key,
            parent: row.parent_key,
            filename,
            path_hint,
            recorded_md5: None,
            content_type: row.content_type,
        })
    }
}

#[async_trait]
impl CatalogAcquirer for LocalAcquirer {
    fn source(&self) -> SnapshotSource {
        SnapshotSource::Local
    }

    async fn acquire(&self) -> Result<Snapshot> {
        let items = self.items().await?;
        let attachments = self.attachments().await?;
        debug!(items = items.len(), attachments = attachments.len(), "acquired local catalog");
        Ok(Snapshot::new(SnapshotSource::Local, items, attachments))
    }
}
