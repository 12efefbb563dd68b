//! Pending change aggregation.

use jotdb_schema::{Fields, RecordKey};

/// The pending changes for one collection, ordered by kind: adds, then
/// updates, then removes.
///
/// Update entries carry only the properties whose serialized value
/// differs from the record's snapshot; an empty diff never produces an
/// update entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CollectionChanges {
    /// Collection name.
    pub collection: String,
    /// Records to insert, keyed by their (possibly generated) identity.
    pub adds: Vec<(RecordKey, Fields)>,
    /// Per-record property diffs to apply.
    pub updates: Vec<(RecordKey, Fields)>,
    /// Identities to delete.
    pub removes: Vec<RecordKey>,
}

impl CollectionChanges {
    /// Creates an empty change list for a collection.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..Self::default()
        }
    }

    /// Returns `true` if there are no pending operations.
    pub fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.updates.is_empty() && self.removes.is_empty()
    }

    /// Total number of pending operations.
    pub fn len(&self) -> usize {
        self.adds.len() + self.updates.len() + self.removes.len()
    }
}

/// All pending changes for one commit, across collections.
///
/// An empty change set makes commit a no-op: the plugin is not called.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeSet {
    /// Per-collection changes, in collection-name order.
    pub collections: Vec<CollectionChanges>,
}

impl ChangeSet {
    /// Creates an empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a collection's changes if non-empty.
    pub fn push(&mut self, changes: CollectionChanges) {
        if !changes.is_empty() {
            self.collections.push(changes);
        }
    }

    /// Returns `true` if no collection has pending operations.
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Total number of pending operations across collections.
    pub fn len(&self) -> usize {
        self.collections.iter().map(CollectionChanges::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jotdb_schema::Value;

    #[test]
    fn empty_collection_changes_are_dropped() {
        let mut set = ChangeSet::new();
        set.push(CollectionChanges::new("people"));
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn len_counts_all_kinds() {
        let mut changes = CollectionChanges::new("people");
        let key = RecordKey::new(vec![Value::Integer(1)]);
        changes.adds.push((key.clone(), Fields::new()));
        changes.removes.push(key);
        let mut set = ChangeSet::new();
        set.push(changes);
        assert_eq!(set.len(), 2);
        assert!(!set.is_empty());
    }
}
