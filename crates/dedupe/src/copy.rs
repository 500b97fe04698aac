//! Copy Executor
//!
//! Carries out a [`CopyPlan`] against the destination root. Every write goes
//! through a `.part` sibling file and an atomic rename, so a cancelled or
//! crashed run never leaves a half-written file at a final destination.
//! Staged bytes are re-read and digest-checked before the rename publishes
//! them. Entries run concurrently; the plan's destination-uniqueness
//! invariant means no two in-flight copies can touch the same path.

use std::path::{Path, PathBuf};

use async_stream::stream;
use futures::{Stream, StreamExt, stream::FuturesUnordered};
use tracing::{debug, warn};

use crate::MAX_COPY_CONCURRENCY;
use crate::error::{ErrorKind, Result};
use crate::fingerprint;
use crate::plan::{CopyPlan, CopyPlanEntry};

/// What happened to a single plan entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    Copied,
    /// Destination already held identical bytes; re-runs are no-ops.
    Skipped,
    /// Copy or verification failed; the run continues without this entry.
    Failed(String),
}

/// Progress events emitted while the plan executes.
#[derive(Debug)]
pub enum CopyEvent {
    Started { total: usize },
    Entry { relative: PathBuf, attachments: Vec<String>, outcome: CopyOutcome },
    Finished,
}

/// Execute the plan, yielding one [`CopyEvent::Entry`] per plan entry.
///
/// The only fatal error is failing to create the destination root; per-entry
/// failures surface as [`CopyOutcome::Failed`].
pub fn execute<'a>(
    plan: &'a CopyPlan,
    destination_root: &'a Path,
) -> impl Stream<Item = Result<CopyEvent>> + 'a {
    stream! {
        if tokio::fs::create_dir_all(destination_root).await.is_err() {
            yield Err(ErrorKind::Destination(destination_root.to_path_buf()).into());
            return;
        }
        yield Ok(CopyEvent::Started { total: plan.len() });

        let mut queue: Vec<_> = plan
            .entries()
            .iter()
            .map(|entry| async move {
                let outcome = execute_entry(destination_root, entry).await;
                (entry, outcome)
            })
            .collect();
        let mut in_flight = FuturesUnordered::new();
        in_flight.extend(queue.drain(..MAX_COPY_CONCURRENCY.min(queue.len())));
        while let Some((entry, outcome)) = in_flight.next().await {
            // Pop-n-push, FIFO.
            if !queue.is_empty() {
                in_flight.push(queue.remove(0));
            }
            yield Ok(CopyEvent::Entry {
                relative: entry.relative.clone(),
                attachments: entry.attachments.clone(),
                outcome,
            });
        }
        yield Ok(CopyEvent::Finished);
    }
}

async fn execute_entry(root: &Path, entry: &CopyPlanEntry) -> CopyOutcome {
    let destination = root.join(&entry.relative);
    if let Ok(existing) = fingerprint::digest_file(&destination).await
        && existing == entry.fingerprint
    {
        debug!(path = %destination.display(), "destination already up to date");
        return CopyOutcome::Skipped;
    }
    if let Some(parent) = destination.parent()
        && let Err(error) = tokio::fs::create_dir_all(parent).await
    {
        return fail(&destination, format!("could not create parent directory: {error}"));
    }

    let staging = staging_path(&destination);
    // A previous cancelled run may have left its staging file behind.
    let _ = tokio::fs::remove_file(&staging).await;
    if let Err(error) = tokio::fs::copy(&entry.source, &staging).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return fail(&destination, format!("copy failed: {error}"));
    }
    match fingerprint::digest_file(&staging).await {
        Ok(staged) if staged == entry.fingerprint => {}
        Ok(_) => {
            let _ = tokio::fs::remove_file(&staging).await;
            return fail(&destination, "digest mismatch after copy".to_owned());
        }
        Err(error) => {
            let _ = tokio::fs::remove_file(&staging).await;
            return fail(&destination, format!("verification read failed: {error}"));
        }
    }
    if let Err(error) = tokio::fs::rename(&staging, &destination).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return fail(&destination, format!("rename failed: {error}"));
    }
    CopyOutcome::Copied
}

fn fail(destination: &Path, reason: String) -> CopyOutcome {
    warn!(path = %destination.display(), %reason, "copy entry failed");
    CopyOutcome::Failed(reason)
}

fn staging_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}
