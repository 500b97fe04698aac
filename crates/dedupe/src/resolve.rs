//! Attachment Resolver
//!
//! Maps each catalog [`Attachment`] to at most one on-disk file. Resolution
//! is total: every attachment ends up [`Found`](Resolution::Found),
//! [`Missing`](Resolution::Missing) or [`Ambiguous`](Resolution::Ambiguous),
//! and no per-record outcome aborts the run. The only fatal condition is a
//! storage root that cannot be read at all, since then every single lookup
//! would fail for the same external reason.

use std::path::{Path, PathBuf};

use tracing::{debug, instrument, warn};
use zotcopy_catalog::{Attachment, Catalog};

use crate::error::{ErrorKind, Result};

/// Why an attachment could not be resolved to a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingReason {
    /// No candidate path exists on disk.
    NoCandidate,
    /// A candidate exists but could not be opened for reading.
    Unreadable(PathBuf),
    /// The file disappeared or failed partway through hashing.
    ReadFailed(PathBuf),
}

impl std::fmt::Display for MissingReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoCandidate => write!(f, "no candidate file found"),
            Self::Unreadable(path) => write!(f, "candidate not readable: \"{}\"", path.display()),
            Self::ReadFailed(path) => write!(f, "read failed: \"{}\"", path.display()),
        }
    }
}

/// Outcome of resolving a single attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Exactly one readable file.
    Found(PathBuf),
    Missing(MissingReason),
    /// More than one equally-ranked candidate; resolver refuses to guess.
    Ambiguous(Vec<PathBuf>),
}

/// An attachment paired with its resolution outcome.
#[derive(Debug, Clone)]
pub struct ResolvedAttachment {
    pub attachment: Attachment,
    pub resolution: Resolution,
}

/// Resolve every attachment in the catalog, in catalog order.
#[instrument(skip_all, fields(root = %storage_root.display()))]
pub async fn resolve_all(catalog: &Catalog, storage_root: &Path) -> Result<Vec<ResolvedAttachment>> {
    match tokio::fs::metadata(storage_root).await {
        Ok(meta) if meta.is_dir() => {}
        _ => exn::bail!(ErrorKind::StorageRoot(storage_root.to_path_buf())),
    }
    let mut resolved = Vec::with_capacity(catalog.attachments().len());
    for attachment in catalog.attachments() {
        let resolution = resolve_one(storage_root, attachment).await;
        if !matches!(resolution, Resolution::Found(_)) {
            warn!(key = %attachment.key, outcome = ?resolution, "attachment did not resolve");
        }
        resolved.push(ResolvedAttachment { attachment: attachment.clone(), resolution });
    }
    Ok(resolved)
}

/// Candidate order: absolute path hint, then the hint (or recorded filename)
/// under the per-attachment storage directory, then a case-insensitive scan
/// of that directory. The first readable candidate wins.
async fn resolve_one(storage_root: &Path, attachment: &Attachment) -> Resolution {
    if let Some(hint) = &attachment.path_hint
        && hint.is_absolute()
    {
        return match probe(hint).await {
            Probe::Readable => Resolution::Found(hint.clone()),
            Probe::Unreadable => Resolution::Missing(MissingReason::Unreadable(hint.clone())),
            Probe::Absent => Resolution::Missing(MissingReason::NoCandidate),
        };
    }

    let dir = storage_root.join(&attachment.key);
    let mut unreadable = None;
    let mut names: Vec<PathBuf> = Vec::new();
    if let Some(hint) = &attachment.path_hint {
        names.push(dir.join(hint));
    }
    names.push(dir.join(&attachment.filename));
    for candidate in names {
        match probe(&candidate).await {
            Probe::Readable => return Resolution::Found(candidate),
            Probe::Unreadable => unreadable = Some(candidate),
            Probe::Absent => {}
        }
    }

    // The recorded filename can be stale; fall back to matching the
    // directory contents without case sensitivity.
    match scan_for(&dir, &attachment.filename).await {
        Ok(mut matches) if matches.len() == 1 => {
            let path = matches.remove(0);
            debug!(key = %attachment.key, path = %path.display(), "resolved by directory scan");
            match probe(&path).await {
                Probe::Readable => Resolution::Found(path),
                _ => Resolution::Missing(MissingReason::Unreadable(path)),
            }
        }
        Ok(matches) if matches.len() > 1 => Resolution::Ambiguous(matches),
        _ => match unreadable {
            Some(path) => Resolution::Missing(MissingReason::Unreadable(path)),
            None => Resolution::Missing(MissingReason::NoCandidate),
        },
    }
}

enum Probe {
    Readable,
    Unreadable,
    Absent,
}

async fn probe(path: &Path) -> Probe {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => match tokio::fs::File::open(path).await {
            Ok(_) => Probe::Readable,
            Err(_) => Probe::Unreadable,
        },
        Ok(_) => Probe::Unreadable,
        Err(_) => Probe::Absent,
    }
}

/// Case-insensitive filename matches within `dir`, sorted for determinism.
async fn scan_for(dir: &Path, filename: &str) -> std::io::Result<Vec<PathBuf>> {
    let wanted = filename.to_lowercase();
    let mut matches = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().to_lowercase() == wanted {
            matches.push(entry.path());
        }
    }
    matches.sort();
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use zotcopy_catalog::{RawAttachment, RawItem, Snapshot, SnapshotSource};

    fn catalog_with(attachments: Vec<RawAttachment>) -> Catalog {
        let items = vec![RawItem { key: "ITEM0001".into(), title: "Some Paper".into() }];
        Snapshot::new(SnapshotSource::Local, items, attachments)
            .normalize()
            .unwrap()
    }

    fn stored(key: &str, filename: &str, hint: Option<&str>) -> RawAttachment {
        RawAttachment {
            key: key.into(),
            parent: "ITEM0001".into(),
            filename: filename.into(),
            path_hint: hint.map(PathBuf::from),
            recorded_md5: None,
            content_type: None,
        }
    }

    #[tokio::test]
    async fn missing_storage_root_is_fatal() {
        let catalog = catalog_with(vec![stored("ATTACH01", "paper.pdf", None)]);
        let err = resolve_all(&catalog, Path::new("/definitely/not/here"))
            .await
            .unwrap_err();
        assert!(matches!(&*err, ErrorKind::StorageRoot(_)));
    }

    #[tokio::test]
    async fn resolves_recorded_filename_in_storage_directory() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("ATTACH01");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("paper.pdf"), b"pdf bytes").unwrap();

        let catalog = catalog_with(vec![stored("ATTACH01", "paper.pdf", Some("paper.pdf"))]);
        let resolved = resolve_all(&catalog, root.path()).await.unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].resolution, Resolution::Found(dir.join("paper.pdf")));
    }

    #[tokio::test]
    async fn falls_back_to_case_insensitive_scan() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("ATTACH01");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("Paper.PDF"), b"pdf bytes").unwrap();

        let catalog = catalog_with(vec![stored("ATTACH01", "paper.pdf", None)]);
        let resolved = resolve_all(&catalog, root.path()).await.unwrap();
        assert_eq!(resolved[0].resolution, Resolution::Found(dir.join("Paper.PDF")));
    }

    #[tokio::test]
    async fn multiple_scan_matches_are_ambiguous() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("ATTACH01");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("Paper.pdf"), b"one").unwrap();
        std::fs::write(dir.join("pAPER.pdf"), b"two").unwrap();

        let catalog = catalog_with(vec![stored("ATTACH01", "paper.pdf", None)]);
        let resolved = resolve_all(&catalog, root.path()).await.unwrap();
        match &resolved[0].resolution {
            Resolution::Ambiguous(candidates) => assert_eq!(candidates.len(), 2),
            other => panic!("expected ambiguous, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn absent_file_is_missing_not_fatal() {
        let root = tempfile::tempdir().unwrap();
        let catalog = catalog_with(vec![
            stored("ATTACH01", "gone.pdf", None),
            stored("ATTACH02", "here.pdf", None),
        ]);
        let dir = root.path().join("ATTACH02");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("here.pdf"), b"bytes").unwrap();

        let resolved = resolve_all(&catalog, root.path()).await.unwrap();
        assert_eq!(resolved[0].resolution, Resolution::Missing(MissingReason::NoCandidate));
        assert!(matches!(resolved[1].resolution, Resolution::Found(_)));
    }

    #[tokio::test]
    async fn absolute_hint_takes_priority() {
        let root = tempfile::tempdir().unwrap();
        let linked = tempfile::tempdir().unwrap();
        let target = linked.path().join("linked.pdf");
        std::fs::write(&target, b"linked bytes").unwrap();

        let catalog = catalog_with(vec![stored(
            "ATTACH01",
            "linked.pdf",
            Some(target.to_str().unwrap()),
        )]);
        let resolved = resolve_all(&catalog, root.path()).await.unwrap();
        assert_eq!(resolved[0].resolution, Resolution::Found(target));
    }
}
