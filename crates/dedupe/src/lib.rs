//! Attachment Deduplication Engine
//!
//! The pipeline behind `zotcopy copy`: resolve every catalog attachment to a
//! file on disk, fingerprint the resolved files, collapse byte-identical
//! copies into equivalence classes, plan one collision-free destination per
//! class, then execute the plan and report the full remap table.
//!
//! Content identity is blake3-digest-plus-size. That means two attachments
//! count as "the same file" exactly when their bytes agree, regardless of
//! filename, and a digest collision between different contents is treated as
//! practically impossible. Hashes recorded by the catalog are never trusted;
//! identity is always recomputed from what is actually on disk.
//!
//! Stages (resolution excepted) never fail the run for a single bad
//! attachment: problems accumulate into the [`RunReport`] and the rest of
//! the library still gets copied.

pub mod copy;
pub mod error;
pub mod fingerprint;
pub mod plan;
pub mod report;
pub mod resolve;

pub use error::{Error, ErrorKind, Result};
pub use report::RunReport;

use std::path::Path;

use futures::{StreamExt, pin_mut};
use tracing::{info, instrument};
use zotcopy_catalog::Catalog;

use crate::copy::{CopyEvent, CopyOutcome};
use crate::fingerprint::ClassMember;
use crate::report::{FailedEntry, RemapEntry};
use crate::resolve::Resolution;

/// How many files are hashed at once.
pub(crate) const MAX_HASH_CONCURRENCY: usize = 16;
/// How many copies are in flight at once.
pub(crate) const MAX_COPY_CONCURRENCY: usize = 8;

/// Run the whole pipeline for one catalog.
///
/// Fatal errors (inaccessible storage root, unusable destination root) abort
/// before any destination file is touched or partway with only complete
/// files written; everything else lands in the returned [`RunReport`].
#[instrument(skip_all, fields(attachments = catalog.attachments().len()))]
pub async fn run(
    catalog: &Catalog,
    storage_root: &Path,
    destination_root: &Path,
) -> Result<RunReport> {
    let mut report = RunReport::default();
    let mut found = Vec::new();
    for entry in resolve::resolve_all(catalog, storage_root).await? {
        match entry.resolution {
            Resolution::Found(path) => found.push(ClassMember { attachment: entry.attachment, path }),
            Resolution::Missing(_) => report.missing.push(entry.attachment.key),
            Resolution::Ambiguous(_) => report.ambiguous.push(entry.attachment.key),
        }
    }

    let grouping = fingerprint::group(found).await;
    report
        .missing
        .extend(grouping.failures.into_iter().map(|member| member.attachment.key));

    let plan = plan::build(catalog, &grouping.classes);
    info!(
        entries = plan.len(),
        missing = report.missing.len(),
        ambiguous = report.ambiguous.len(),
        "copy plan ready"
    );

    let events = copy::execute(&plan, destination_root);
    pin_mut!(events);
    while let Some(event) = events.next().await {
        match event? {
            CopyEvent::Entry { relative, attachments, outcome } => match outcome {
                CopyOutcome::Copied | CopyOutcome::Skipped => {
                    if matches!(outcome, CopyOutcome::Copied) {
                        report.copied += 1;
                    } else {
                        report.skipped += 1;
                    }
                    report.remaps.extend(attachments.into_iter().map(|attachment| RemapEntry {
                        attachment,
                        destination: relative.clone(),
                    }));
                }
                CopyOutcome::Failed(reason) => {
                    report.failed.push(FailedEntry { destination: relative, reason });
                }
            },
            CopyEvent::Started { .. } | CopyEvent::Finished => {}
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use zotcopy_catalog::{RawAttachment, RawItem, Snapshot, SnapshotSource};

    fn catalog(items: &[(&str, &str)], attachments: &[(&str, &str, &str)]) -> Catalog {
        let items = items
            .iter()
            .map(|(key, title)| RawItem { key: (*key).into(), title: (*title).into() })
            .collect();
        let attachments = attachments
            .iter()
            .map(|(key, parent, filename)| RawAttachment {
                key: (*key).into(),
                parent: (*parent).into(),
                filename: (*filename).into(),
                path_hint: None,
                recorded_md5: None,
                content_type: None,
            })
            .collect();
        Snapshot::new(SnapshotSource::Local, items, attachments)
            .normalize()
            .unwrap()
    }

    fn write_attachment(root: &Path, key: &str, filename: &str, contents: &[u8]) {
        let dir = root.join(key);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(filename), contents).unwrap();
    }

    #[tokio::test]
    async fn byte_identical_duplicates_collapse_to_one_copy() {
        let storage = tempfile::tempdir().unwrap();
        let destination = tempfile::tempdir().unwrap();
        write_attachment(storage.path(), "ATTACH01", "paper.pdf", b"the same pdf");
        write_attachment(storage.path(), "ATTACH02", "paper (1).pdf", b"the same pdf");

        let catalog = catalog(
            &[("ITEM0001", "Deep Learning")],
            &[
                ("ATTACH01", "ITEM0001", "paper.pdf"),
                ("ATTACH02", "ITEM0001", "paper (1).pdf"),
            ],
        );
        let report = run(&catalog, storage.path(), destination.path()).await.unwrap();

        assert_eq!(report.copied, 1);
        assert!(report.is_complete());
        assert_eq!(report.remaps.len(), 2);
        let destination_set: std::collections::HashSet<&PathBuf> =
            report.remaps.iter().map(|r| &r.destination).collect();
        assert_eq!(destination_set.len(), 1);
        assert!(destination.path().join("deep-learning/paper.pdf").exists());
        assert!(!destination.path().join("deep-learning/paper (1).pdf").exists());
    }

    #[tokio::test]
    async fn missing_attachment_is_reported_not_fatal() {
        let storage = tempfile::tempdir().unwrap();
        let destination = tempfile::tempdir().unwrap();
        write_attachment(storage.path(), "ATTACH02", "present.pdf", b"bytes");

        let catalog = catalog(
            &[("ITEM0001", "Gone"), ("ITEM0002", "Present")],
            &[
                ("ATTACH01", "ITEM0001", "gone.pdf"),
                ("ATTACH02", "ITEM0002", "present.pdf"),
            ],
        );
        let report = run(&catalog, storage.path(), destination.path()).await.unwrap();

        assert_eq!(report.missing, vec!["ATTACH01".to_owned()]);
        assert_eq!(report.copied, 1);
        assert!(destination.path().join("present/present.pdf").exists());
    }

    #[tokio::test]
    async fn same_name_different_content_gets_both_files() {
        let storage = tempfile::tempdir().unwrap();
        let destination = tempfile::tempdir().unwrap();
        write_attachment(storage.path(), "ATTACH01", "notes.pdf", b"first contents");
        write_attachment(storage.path(), "ATTACH02", "notes.pdf", b"second contents");

        let catalog = catalog(
            &[("ITEM0001", "Notes"), ("ITEM0002", "Notes")],
            &[
                ("ATTACH01", "ITEM0001", "notes.pdf"),
                ("ATTACH02", "ITEM0002", "notes.pdf"),
            ],
        );
        let report = run(&catalog, storage.path(), destination.path()).await.unwrap();

        assert_eq!(report.copied, 2);
        let copied: Vec<PathBuf> = report.remaps.iter().map(|r| r.destination.clone()).collect();
        assert_eq!(copied.len(), 2);
        assert_ne!(copied[0], copied[1]);
        let contents: std::collections::HashSet<Vec<u8>> = copied
            .iter()
            .map(|relative| std::fs::read(destination.path().join(relative)).unwrap())
            .collect();
        assert_eq!(contents.len(), 2);
    }

    #[tokio::test]
    async fn second_run_is_a_no_op() {
        let storage = tempfile::tempdir().unwrap();
        let destination = tempfile::tempdir().unwrap();
        write_attachment(storage.path(), "ATTACH01", "a.pdf", b"alpha");
        write_attachment(storage.path(), "ATTACH02", "b.pdf", b"beta");

        let catalog = catalog(
            &[("ITEM0001", "Alpha"), ("ITEM0002", "Beta")],
            &[("ATTACH01", "ITEM0001", "a.pdf"), ("ATTACH02", "ITEM0002", "b.pdf")],
        );
        let first = run(&catalog, storage.path(), destination.path()).await.unwrap();
        assert_eq!((first.copied, first.skipped), (2, 0));

        let second = run(&catalog, storage.path(), destination.path()).await.unwrap();
        assert_eq!((second.copied, second.skipped), (0, 2));
        assert_eq!(second.remaps.len(), first.remaps.len());
    }
}
