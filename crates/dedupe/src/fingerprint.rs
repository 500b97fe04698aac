//! Content Identity Engine
//!
//! Two files are "the same attachment" when their streamed blake3 digest and
//! byte size agree. The hash is always recomputed from disk; the md5 some
//! catalogs record comes with no freshness guarantee and is never trusted
//! for identity. Hashing runs with bounded concurrency and a fixed read
//! buffer, so memory stays flat no matter how large the library is.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tracing::{instrument, warn};
use zotcopy_catalog::Attachment;

use crate::MAX_HASH_CONCURRENCY;

const READ_BUFFER_BYTES: usize = 64 * 1024;

/// Content identity of one file: blake3 digest plus byte size.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Lowercase hex blake3 digest.
    pub digest: String,
    pub size: u64,
}

impl Fingerprint {
    /// Leading digest characters, for log lines and collision suffixes.
    pub fn short(&self) -> &str {
        &self.digest[..8.min(self.digest.len())]
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.short(), self.size)
    }
}

/// One resolved file awaiting (or carrying) a fingerprint.
#[derive(Debug, Clone)]
pub struct ClassMember {
    pub attachment: Attachment,
    pub path: PathBuf,
}

/// All members whose file contents are byte-identical.
#[derive(Debug, Clone)]
pub struct EquivalenceClass {
    pub fingerprint: Fingerprint,
    /// Never empty; catalog order preserved.
    pub members: Vec<ClassMember>,
}

/// Output of [`group`]: classes in digest order, plus the entries whose
/// files failed partway through reading.
#[derive(Debug, Default)]
pub struct Grouping {
    pub classes: Vec<EquivalenceClass>,
    pub failures: Vec<ClassMember>,
}

/// Hash a file in fixed-size chunks.
pub async fn digest_file(path: &Path) -> std::io::Result<Fingerprint> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; READ_BUFFER_BYTES];
    let mut size: u64 = 0;
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        size += read as u64;
    }
    Ok(Fingerprint { digest: hasher.finalize().to_hex().to_string(), size })
}

/// Fingerprint every member and group byte-identical files together.
///
/// A read failure here (file deleted between resolution and hashing,
/// permissions flipped, disk error) demotes that member to a failure
/// instead of aborting: the rest of the library still gets copied.
#[instrument(skip_all, fields(members = members.len()))]
pub async fn group(members: Vec<ClassMember>) -> Grouping {
    let mut queue: Vec<_> = members
        .into_iter()
        .enumerate()
        .map(|(index, member)| async move {
            let outcome = digest_file(&member.path).await;
            (index, member, outcome)
        })
        .collect();
    let total = queue.len();

    let mut in_flight = FuturesUnordered::new();
    in_flight.extend(queue.drain(..MAX_HASH_CONCURRENCY.min(queue.len())));
    let mut slots: Vec<Option<(ClassMember, std::io::Result<Fingerprint>)>> =
        std::iter::repeat_with(|| None).take(total).collect();
    while let Some((index, member, outcome)) = in_flight.next().await {
        // Pop-n-push, FIFO.
        if !queue.is_empty() {
            in_flight.push(queue.remove(0));
        }
        slots[index] = Some((member, outcome));
    }

    let mut grouping = Grouping::default();
    let mut by_fingerprint: BTreeMap<Fingerprint, Vec<ClassMember>> = BTreeMap::new();
    for (member, outcome) in slots.into_iter().flatten() {
        match outcome {
            Ok(fingerprint) => by_fingerprint.entry(fingerprint).or_default().push(member),
            Err(error) => {
                warn!(key = %member.attachment.key, path = %member.path.display(), %error, "hashing failed");
                grouping.failures.push(member);
            }
        }
    }
    grouping.classes = by_fingerprint
        .into_iter()
        .map(|(fingerprint, members)| EquivalenceClass { fingerprint, members })
        .collect();
    grouping
}
