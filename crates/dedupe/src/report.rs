//! Run Report
//!
//! The end-of-run summary: copy tallies, everything that went wrong without
//! being fatal, and the full attachment-to-destination remap table. The
//! `Display` impl is what the CLI prints; the `Serialize` impl backs the
//! machine-readable `--json` output.

use std::path::PathBuf;

use serde::Serialize;

/// One attachment mapped to its final destination (relative to the
/// destination root). Deduplicated attachments share a destination.
#[derive(Debug, Clone, Serialize)]
pub struct RemapEntry {
    pub attachment: String,
    pub destination: PathBuf,
}

/// A plan entry that could not be completed.
#[derive(Debug, Clone, Serialize)]
pub struct FailedEntry {
    pub destination: PathBuf,
    pub reason: String,
}

/// Everything a run produced, fatal errors excepted.
#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    pub copied: u64,
    pub skipped: u64,
    /// Attachment keys that never resolved to a readable file.
    pub missing: Vec<String>,
    /// Attachment keys with more than one equally plausible file.
    pub ambiguous: Vec<String>,
    pub failed: Vec<FailedEntry>,
    pub remaps: Vec<RemapEntry>,
}

impl RunReport {
    /// `true` when every attachment in the catalog ended up at a
    /// destination.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.ambiguous.is_empty() && self.failed.is_empty()
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "copied {}, skipped {}, failed {}, missing {}, ambiguous {} ({} attachments mapped)",
            self.copied,
            self.skipped,
            self.failed.len(),
            self.missing.len(),
            self.ambiguous.len(),
            self.remaps.len(),
        )?;
        for key in &self.missing {
            writeln!(f, "  missing: {key}")?;
        }
        for key in &self.ambiguous {
            writeln!(f, "  ambiguous: {key}")?;
        }
        for failure in &self.failed {
            writeln!(f, "  failed: \"{}\" ({})", failure.destination.display(), failure.reason)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_summarises_counts_and_problems() {
        let report = RunReport {
            copied: 3,
            skipped: 1,
            missing: vec!["ATTACH09".into()],
            ambiguous: vec![],
            failed: vec![FailedEntry {
                destination: PathBuf::from("notes/notes.pdf"),
                reason: "copy failed: permission denied".into(),
            }],
            remaps: vec![RemapEntry {
                attachment: "ATTACH01".into(),
                destination: PathBuf::from("alpha/a.pdf"),
            }],
        };
        let rendered = report.to_string();
        assert!(rendered.starts_with("copied 3, skipped 1, failed 1, missing 1, ambiguous 0"));
        assert!(rendered.contains("missing: ATTACH09"));
        assert!(rendered.contains("notes/notes.pdf"));
        assert!(!report.is_complete());
    }

    #[test]
    fn serialises_to_stable_json_shape() {
        let report = RunReport { copied: 1, ..RunReport::default() };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["copied"], 1);
        assert!(json["remaps"].as_array().unwrap().is_empty());
    }
}
