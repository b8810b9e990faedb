//! The client's view of a room's files and the merge that folds listing
//! snapshots into it.
//!
//! Merging is an additive union keyed by storage key: a snapshot can add
//! entries or replace existing ones, never remove them. A listing that lags
//! behind a recent write therefore cannot make a file vanish from view.

use std::collections::HashMap;

use roomdrop_common::record::FileRecord;

/// Fold `incoming` into `existing` and return the result ordered newest
/// first.
///
/// Records with an unseen storage key are appended, records with a known
/// key replace the existing entry in place. The final sort is stable, so
/// entries with equal `created_at` keep their prior relative order.
pub fn merge(existing: Vec<FileRecord>, incoming: Vec<FileRecord>) -> Vec<FileRecord> {
    let mut merged = existing;
    let mut index: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .map(|(i, r)| (r.storage_key.clone(), i))
        .collect();

    for record in incoming {
        match index.get(&record.storage_key) {
            Some(&i) => merged[i] = record,
            None => {
                index.insert(record.storage_key.clone(), merged.len());
                merged.push(record);
            }
        }
    }

    merged.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    merged
}

/// Ordered, deduplicated collection of a room's files.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientFileSet {
    files: Vec<FileRecord>,
}

impl ClientFileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a listing snapshot (or a single freshly uploaded record).
    pub fn apply(&mut self, snapshot: Vec<FileRecord>) {
        let existing = std::mem::take(&mut self.files);
        self.files = merge(existing, snapshot);
    }

    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, storage_key: &str) -> bool {
        self.files.iter().any(|f| f.storage_key == storage_key)
    }
}
