//! Snapshot validation and normalization.

use crate::error::{ErrorKind, Result};
use crate::models::{Attachment, Catalog, Item, Snapshot};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use tracing::instrument;

impl Snapshot {
    /// Validate this snapshot and build the normalized [`Catalog`].
    ///
    /// Rejects duplicate item keys, duplicate attachment keys, and
    /// attachments referencing an item that isn't in the snapshot. Item and
    /// attachment order is preserved exactly as the source reported it,
    /// which keeps downstream canonical-selection tie-breaking reproducible.
    #[instrument(skip_all, fields(items = self.items.len(), attachments = self.attachments.len()))]
    pub fn normalize(&self) -> Result<Catalog> {
        let mut items: Vec<Item> = Vec::with_capacity(self.items.len());
        let mut item_index: HashMap<String, usize> = HashMap::with_capacity(self.items.len());
        for raw in &self.items {
            match item_index.entry(raw.key.clone()) {
                Entry::Occupied(_) => exn::bail!(ErrorKind::DuplicateItem(raw.key.clone())),
                Entry::Vacant(slot) => {
                    slot.insert(items.len());
                },
            }
            items.push(Item {
                key: raw.key.clone(),
                title: raw.title.clone(),
                attachments: Vec::new(),
            });
        }

        let mut attachments: Vec<Attachment> = Vec::with_capacity(self.attachments.len());
        let mut seen = HashSet::with_capacity(self.attachments.len());
        for raw in &self.attachments {
            if !seen.insert(raw.key.clone()) {
                exn::bail!(ErrorKind::DuplicateAttachment(raw.key.clone()));
            }
            let Some(&parent_idx) = item_index.get(&raw.parent) else {
                exn::bail!(ErrorKind::OrphanAttachment(raw.key.clone(), raw.parent.clone()));
            };
            items[parent_idx].attachments.push(raw.key.clone());
            attachments.push(Attachment {
                key: raw.key.clone(),
                parent: raw.parent.clone(),
                filename: raw.filename.clone(),
                path_hint: raw.path_hint.clone(),
                recorded_md5: raw.recorded_md5.clone(),
                content_type: raw.content_type.clone(),
            });
        }

        Ok(Catalog { items, attachments, item_index })
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;
    use crate::models::{RawAttachment, RawItem, Snapshot, SnapshotSource};

    fn item(key: &str, title: &str) -> RawItem {
        RawItem { key: key.into(), title: title.into() }
    }

    fn attachment(key: &str, parent: &str, filename: &str) -> RawAttachment {
        RawAttachment {
            key: key.into(),
            parent: parent.into(),
            filename: filename.into(),
            path_hint: None,
            recorded_md5: None,
            content_type: None,
        }
    }

    #[test]
    fn test_normalize_preserves_order() {
        let snapshot = Snapshot::new(
            SnapshotSource::Local,
            vec![item("ZZZZ1111", "Last alphabetically"), item("AAAA1111", "First alphabetically")],
            vec![
                attachment("ATT00003", "AAAA1111", "c.pdf"),
                attachment("ATT00001", "ZZZZ1111", "a.pdf"),
                attachment("ATT00002", "ZZZZ1111", "b.pdf"),
            ],
        );
        let catalog = snapshot.normalize().unwrap();
        let keys: Vec<_> = catalog.items().iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, ["ZZZZ1111", "AAAA1111"]);
        let att_keys: Vec<_> = catalog.attachments().iter().map(|a| a.key.as_str()).collect();
        assert_eq!(att_keys, ["ATT00003", "ATT00001", "ATT00002"]);
        // Membership also follows source order, not key order.
        assert_eq!(catalog.item("ZZZZ1111").unwrap().attachments, ["ATT00001", "ATT00002"]);
    }

    #[test]
    fn test_item_with_no_attachments() {
        let snapshot = Snapshot::new(SnapshotSource::Remote, vec![item("AAAA1111", "Childless")], vec![]);
        let catalog = snapshot.normalize().unwrap();
        assert!(catalog.item("AAAA1111").unwrap().attachments.is_empty());
    }

    #[test]
    fn test_duplicate_item_rejected() {
        let snapshot =
            Snapshot::new(SnapshotSource::Local, vec![item("AAAA1111", "One"), item("AAAA1111", "Two")], vec![]);
        let err = snapshot.normalize().unwrap_err();
        assert!(matches!(&*err, ErrorKind::DuplicateItem(k) if k == "AAAA1111"));
    }

    #[test]
    fn test_duplicate_attachment_rejected() {
        let snapshot = Snapshot::new(
            SnapshotSource::Local,
            vec![item("AAAA1111", "Item")],
            vec![attachment("ATT00001", "AAAA1111", "a.pdf"), attachment("ATT00001", "AAAA1111", "b.pdf")],
        );
        let err = snapshot.normalize().unwrap_err();
        assert!(matches!(&*err, ErrorKind::DuplicateAttachment(k) if k == "ATT00001"));
    }

    #[test]
    fn test_orphan_attachment_rejected() {
        let snapshot = Snapshot::new(
            SnapshotSource::Remote,
            vec![item("AAAA1111", "Item")],
            vec![attachment("ATT00001", "MISSING1", "a.pdf")],
        );
        let err = snapshot.normalize().unwrap_err();
        assert!(matches!(&*err, ErrorKind::OrphanAttachment(a, p) if a == "ATT00001" && p == "MISSING1"));
    }

    #[test]
    fn test_snapshot_round_trips_through_json() {
        let mut raw = attachment("ATT00001", "AAAA1111", "paper.pdf");
        raw.recorded_md5 = Some("d41d8cd98f00b204e9800998ecf8427e".into());
        let snapshot = Snapshot::new(SnapshotSource::Remote, vec![item("AAAA1111", "Paper")], vec![raw]);
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.items, snapshot.items);
        assert_eq!(back.attachments, snapshot.attachments);
        assert_eq!(back.source, snapshot.source);
    }
}
