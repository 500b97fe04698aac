//! Copy Planner
//!
//! Pure, single-threaded stage that turns equivalence classes into an exact
//! list of copy operations. One file per class: the canonical member's name
//! survives, everything else in the class becomes a remap entry pointing at
//! the same destination. Runs only after every fingerprint is known, so the
//! plan can guarantee destination uniqueness before a single byte is copied.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use rslug::slugify;
use tracing::{debug, instrument};
use zotcopy_catalog::Catalog;

use crate::fingerprint::{ClassMember, EquivalenceClass, Fingerprint};

/// Trailing duplicate markers that downloaders and Zotero itself append:
/// `paper 2.pdf`, `paper (3).pdf`.
static DUPLICATE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\s+\d+|\s*\(\d+\))$").unwrap());

/// `true` when the filename carries no trailing duplicate marker.
pub fn is_clean(filename: &str) -> bool {
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_owned());
    !DUPLICATE_MARKER.is_match(&stem)
}

/// One planned copy: a single source file fanned out from possibly many
/// attachments.
#[derive(Debug, Clone)]
pub struct CopyPlanEntry {
    pub source: PathBuf,
    /// Destination, relative to the destination root.
    pub relative: PathBuf,
    pub fingerprint: Fingerprint,
    /// Attachment keys mapped to this destination, canonical member first.
    pub attachments: Vec<String>,
}

/// The complete, collision-free set of copy operations for one run.
#[derive(Debug, Clone, Default)]
pub struct CopyPlan {
    entries: Vec<CopyPlanEntry>,
}

impl CopyPlan {
    pub fn entries(&self) -> &[CopyPlanEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Build the copy plan for a set of equivalence classes.
///
/// Classes are processed in digest order, so any permutation of the input
/// produces byte-for-byte the same plan. Cross-class destination collisions
/// get a suffix taken from the colliding class's own digest, lengthened
/// until unique.
#[instrument(skip_all, fields(classes = classes.len()))]
pub fn build(catalog: &Catalog, classes: &[EquivalenceClass]) -> CopyPlan {
    let mut ordered: Vec<&EquivalenceClass> = classes.iter().collect();
    ordered.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));

    let mut taken: HashSet<PathBuf> = HashSet::new();
    let mut entries = Vec::with_capacity(ordered.len());
    for class in ordered {
        let Some(canonical) = canonical_member(&class.members) else {
            continue;
        };
        let directory = directory_for(catalog, canonical);
        let filename = sanitize_filename(&canonical.attachment.filename, &canonical.attachment.key);
        let relative = disambiguate(&mut taken, &directory, &filename, &class.fingerprint);
        if class.members.len() > 1 {
            debug!(
                destination = %relative.display(),
                duplicates = class.members.len() - 1,
                "collapsing byte-identical attachments"
            );
        }
        let mut attachments = vec![canonical.attachment.key.clone()];
        attachments.extend(
            class
                .members
                .iter()
                .filter(|m| m.attachment.key != canonical.attachment.key)
                .map(|m| m.attachment.key.clone()),
        );
        entries.push(CopyPlanEntry {
            source: canonical.path.clone(),
            relative,
            fingerprint: class.fingerprint.clone(),
            attachments,
        });
    }
    CopyPlan { entries }
}

/// Tie-break: clean filename beats marked, then lexicographically smallest
/// filename, then lowest attachment key. Total order, so the choice cannot
/// depend on member order.
fn canonical_member(members: &[ClassMember]) -> Option<&ClassMember> {
    fn rank(member: &ClassMember) -> (bool, &str, &str) {
        (
            !is_clean(&member.attachment.filename),
            member.attachment.filename.as_str(),
            member.attachment.key.as_str(),
        )
    }
    members.iter().min_by(|a, b| rank(a).cmp(&rank(b)))
}

/// Destination directory name: slug of the owning item's title, or the item
/// key when the title slugs away to nothing.
fn directory_for(catalog: &Catalog, canonical: &ClassMember) -> String {
    let parent = &canonical.attachment.parent;
    let slug = catalog
        .item(parent)
        .map(|item| slugify!(&item.title).to_string())
        .unwrap_or_default();
    if slug.is_empty() { parent.clone() } else { slug }
}

/// Strip anything that would escape the destination directory. A filename
/// that sanitizes away entirely falls back to the attachment key.
fn sanitize_filename(filename: &str, key: &str) -> String {
    let cleaned: String = filename
        .chars()
        .map(|c| if std::path::is_separator(c) || c == '\0' { '-' } else { c })
        .collect();
    let cleaned = cleaned.trim();
    match cleaned {
        "" | "." | ".." => key.to_owned(),
        _ => cleaned.to_owned(),
    }
}

fn disambiguate(
    taken: &mut HashSet<PathBuf>,
    directory: &str,
    filename: &str,
    fingerprint: &Fingerprint,
) -> PathBuf {
    let plain = Path::new(directory).join(filename);
    if taken.insert(plain.clone()) {
        return plain;
    }
    let (stem, extension) = split_name(filename);
    let mut width = 8;
    loop {
        let prefix = &fingerprint.digest[..width.min(fingerprint.digest.len())];
        let candidate = match extension {
            Some(ext) => Path::new(directory).join(format!("{stem}-{prefix}.{ext}")),
            None => Path::new(directory).join(format!("{stem}-{prefix}")),
        };
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        if width >= fingerprint.digest.len() {
            // Distinct classes have distinct fingerprints, so size breaks
            // the final tie.
            let candidate = match extension {
                Some(ext) => {
                    Path::new(directory).join(format!("{stem}-{prefix}-{}.{ext}", fingerprint.size))
                }
                None => Path::new(directory).join(format!("{stem}-{prefix}-{}", fingerprint.size)),
            };
            taken.insert(candidate.clone());
            return candidate;
        }
        width += 8;
    }
}

fn split_name(filename: &str) -> (&str, Option<&str>) {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (filename, None),
    }
}
