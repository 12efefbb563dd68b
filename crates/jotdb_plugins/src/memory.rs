//! In-memory storage plugin.

use jotdb_core::{
    multi_key_cmp, AggregateKind, Capabilities, ChangeSet, PersistReceipt, PlanPrefix,
    PluginError, PluginResult, PushableOp, SortDirection, StoragePlugin,
};
use jotdb_schema::{Fields, RecordKey, Value};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::debug;

type CollectionRows = BTreeMap<RecordKey, Fields>;

/// A fully capable in-memory backend.
///
/// Records live in per-collection maps ordered by identity. Every plan
/// shape is executed natively, so this plugin doubles as the reference
/// for what a pushed prefix means. Persist applies a change set to a
/// working copy and swaps it in whole, so a mid-batch failure leaves
/// the store untouched.
#[derive(Default)]
pub struct MemoryPlugin {
    store: RwLock<BTreeMap<String, CollectionRows>>,
}

impl MemoryPlugin {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.store.read().get(collection).map_or(0, BTreeMap::len)
    }

    /// Returns `true` if the collection holds no records.
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn rows(&self, collection: &str) -> Vec<Fields> {
        self.store
            .read()
            .get(collection)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }
}

/// Applies a pushed prefix to materialized rows, in plan order.
///
/// Consecutive sorts compose into one stable multi-key sort, so
/// `sort(a).sort(b)` orders by `a` first and breaks ties by `b`.
fn apply_prefix(rows: &mut Vec<Fields>, prefix: &PlanPrefix) -> PluginResult<()> {
    let mut ops = prefix.ops.iter().peekable();
    while let Some(op) = ops.next() {
        match op {
            PushableOp::Filter { predicate, params } => {
                let mut failure = None;
                rows.retain(|row| match predicate.matches(row, params) {
                    Ok(keep) => keep,
                    Err(err) => {
                        failure.get_or_insert_with(|| PluginError::failed(err.to_string()));
                        false
                    }
                });
                if let Some(err) = failure {
                    return Err(err);
                }
            }
            PushableOp::Sort {
                property,
                direction,
            } => {
                let mut keys: Vec<(String, SortDirection)> =
                    vec![(property.clone(), *direction)];
                while let Some(PushableOp::Sort {
                    property,
                    direction,
                }) = ops.peek()
                {
                    keys.push((property.clone(), *direction));
                    ops.next();
                }
                rows.sort_by(|a, b| multi_key_cmp(&keys, a, b));
            }
            PushableOp::Skip(n) => {
                rows.drain(..(*n).min(rows.len()));
            }
            PushableOp::Take(n) => rows.truncate(*n),
        }
    }
    Ok(())
}

impl StoragePlugin for MemoryPlugin {
    fn name(&self) -> &str {
        "memory"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    fn query(&self, collection: &str, prefix: &PlanPrefix) -> PluginResult<Vec<Fields>> {
        let mut rows = self.rows(collection);
        apply_prefix(&mut rows, prefix)?;
        debug!(collection, rows = rows.len(), "memory query");
        Ok(rows)
    }

    fn query_aggregate(
        &self,
        collection: &str,
        prefix: &PlanPrefix,
        aggregate: &AggregateKind,
    ) -> PluginResult<Option<Value>> {
        // Count is the one aggregate worth answering natively here; the
        // rest need the rows materialized anyway.
        if !matches!(aggregate, AggregateKind::Count) {
            return Ok(None);
        }
        let mut rows = self.rows(collection);
        apply_prefix(&mut rows, prefix)?;
        Ok(Some(Value::Integer(rows.len() as i64)))
    }

    fn persist(&self, changes: &ChangeSet) -> PluginResult<PersistReceipt> {
        let mut store = self.store.write();
        let mut working = store.clone();

        for collection in &changes.collections {
            let name = &collection.collection;
            let rows = working.entry(name.clone()).or_default();

            for (key, fields) in &collection.adds {
                if rows.contains_key(key) {
                    return Err(PluginError::failed(format!(
                        "{name}: insert of already stored {key}"
                    )));
                }
                rows.insert(key.clone(), fields.clone());
            }
            for (key, diff) in &collection.updates {
                let Some(row) = rows.get_mut(key) else {
                    return Err(PluginError::failed(format!(
                        "{name}: update of missing {key}"
                    )));
                };
                for (property, value) in diff {
                    row.insert(property.clone(), value.clone());
                }
            }
            for key in &collection.removes {
                if rows.remove(key).is_none() {
                    return Err(PluginError::failed(format!(
                        "{name}: removal of missing {key}"
                    )));
                }
            }
        }

        debug!(ops = changes.len(), "memory persist");
        *store = working;
        Ok(PersistReceipt::new())
    }
}

impl std::fmt::Debug for MemoryPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPlugin")
            .field("collections", &self.store.read().len())
            .finish()
    }
}
