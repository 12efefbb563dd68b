//! The unit of work: session state and commit.

use crate::change::ChangeSet;
use crate::collection::Collection;
use crate::error::{EngineError, EngineResult};
use crate::outcome::Outcome;
use crate::plugin::{PersistReceipt, StoragePlugin};
use jotdb_schema::CompiledSchema;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Counters describing what a commit applied.
#[derive(Debug, Default)]
pub struct CommitResult {
    /// Records inserted.
    pub adds: usize,
    /// Records updated.
    pub updates: usize,
    /// Records removed.
    pub removes: usize,
    /// Plugin-assigned values written back during reconciliation.
    pub receipt: PersistReceipt,
}

impl CommitResult {
    /// Returns `true` if the commit had nothing to apply.
    pub fn is_empty(&self) -> bool {
        self.adds == 0 && self.updates == 0 && self.removes == 0
    }
}

/// A unit of work over one storage plugin.
///
/// A session hands out [`Collection`]s, accumulates their staged work,
/// and flushes everything in a single [`Session::commit`]. Sessions are
/// independent: records tracked by one session are never shared with
/// another, even over the same plugin.
pub struct Session {
    plugin: Arc<dyn StoragePlugin>,
    collections: RwLock<BTreeMap<String, Arc<Collection>>>,
    committing: AtomicBool,
}

impl Session {
    /// Opens a session over the given plugin.
    pub fn new(plugin: Arc<dyn StoragePlugin>) -> Self {
        Self {
            plugin,
            collections: RwLock::new(BTreeMap::new()),
            committing: AtomicBool::new(false),
        }
    }

    /// Returns the plugin's diagnostic name.
    pub fn plugin_name(&self) -> String {
        self.plugin.name().to_string()
    }

    /// Returns the collection for a schema, creating it on first use.
    ///
    /// The same session always returns the same collection instance for
    /// a given schema name, so tracked records stay coherent within the
    /// session.
    pub fn collection(&self, schema: Arc<CompiledSchema>) -> Arc<Collection> {
        let mut collections = self.collections.write();
        Arc::clone(
            collections
                .entry(schema.name().to_string())
                .or_insert_with(|| Arc::new(Collection::new(schema, Arc::clone(&self.plugin)))),
        )
    }

    /// Computes all pending changes without mutating anything.
    ///
    /// Pure and repeatable: calling this any number of times yields the
    /// same result and performs no plugin I/O.
    pub fn preview(&self) -> ChangeSet {
        let collections = self.collections.read();
        let mut changes = ChangeSet::new();
        for collection in collections.values() {
            changes.push(collection.preview());
        }
        changes
    }

    /// Returns `true` if any collection has staged work.
    pub fn has_changes(&self) -> bool {
        let collections = self.collections.read();
        collections.values().any(|c| !c.preview().is_empty())
    }

    /// Flushes all staged work through the plugin in one persist call.
    ///
    /// An empty change set commits trivially without touching the
    /// plugin. On success every tracked record rebases onto its
    /// post-commit state, with plugin-assigned values applied. On
    /// failure no tracking state changes: the same commit can be
    /// retried after the cause is fixed.
    ///
    /// # Errors
    ///
    /// - [`EngineError::CommitInFlight`] when re-entered during an
    ///   ongoing commit on this session
    /// - [`EngineError::Plugin`] when the persist fails
    pub fn commit(&self) -> EngineResult<CommitResult> {
        if self.committing.swap(true, Ordering::Acquire) {
            return Err(EngineError::CommitInFlight);
        }
        let result = self.commit_inner();
        self.committing.store(false, Ordering::Release);
        result
    }

    fn commit_inner(&self) -> EngineResult<CommitResult> {
        let changes = self.preview();
        if changes.is_empty() {
            return Ok(CommitResult::default());
        }

        let (adds, updates, removes) = changes.collections.iter().fold(
            (0, 0, 0),
            |(a, u, r), c| (a + c.adds.len(), u + c.updates.len(), r + c.removes.len()),
        );
        debug!(
            plugin = self.plugin.name(),
            adds, updates, removes, "committing change set"
        );

        let receipt = self.plugin.persist(&changes)?;

        let collections = self.collections.read();
        for collection in collections.values() {
            collection.reconcile(&receipt);
        }

        Ok(CommitResult {
            adds,
            updates,
            removes,
            receipt,
        })
    }

    /// Callback form of [`Session::commit`].
    pub fn commit_with(&self, callback: impl FnOnce(Outcome<CommitResult>)) {
        callback(self.commit().into());
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("plugin", &self.plugin.name())
            .field("collections", &self.collections.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{PlanPrefix, PluginError, PluginResult};
    use crate::record::RecordState;
    use jotdb_schema::{
        Fields, IdentityKind, PropertySchema, RecordKey, SchemaBuilder, Value,
    };
    use parking_lot::Mutex;

    /// Plugin that records persist calls and optionally assigns ids.
    struct StubPlugin {
        rows: Mutex<Vec<Fields>>,
        persists: Mutex<Vec<ChangeSet>>,
        fail_persist: bool,
        assign_ids: bool,
    }

    impl StubPlugin {
        fn new() -> Self {
            Self {
                rows: Mutex::new(Vec::new()),
                persists: Mutex::new(Vec::new()),
                fail_persist: false,
                assign_ids: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail_persist: true,
                ..Self::new()
            }
        }

        fn assigning() -> Self {
            Self {
                assign_ids: true,
                ..Self::new()
            }
        }
    }

    impl StoragePlugin for StubPlugin {
        fn name(&self) -> &str {
            "stub"
        }

        fn query(&self, _collection: &str, _prefix: &PlanPrefix) -> PluginResult<Vec<Fields>> {
            Ok(self.rows.lock().clone())
        }

        fn persist(&self, changes: &ChangeSet) -> PluginResult<PersistReceipt> {
            if self.fail_persist {
                return Err(PluginError::failed("backend down"));
            }
            self.persists.lock().push(changes.clone());
            let mut receipt = PersistReceipt::new();
            if self.assign_ids {
                for collection in &changes.collections {
                    for (n, (key, _)) in collection.adds.iter().enumerate() {
                        let mut assigned = Fields::new();
                        assigned.insert(
                            "id".to_string(),
                            Value::text(format!("srv-{n}")),
                        );
                        receipt.record_generated(
                            collection.collection.clone(),
                            key.clone(),
                            assigned,
                        );
                    }
                }
            }
            Ok(receipt)
        }
    }

    fn people_schema() -> Arc<CompiledSchema> {
        Arc::new(
            SchemaBuilder::new("people")
                .property(PropertySchema::text("id").key().identity(IdentityKind::Random))
                .property(PropertySchema::text("name"))
                .property(PropertySchema::integer("age").optional())
                .build()
                .unwrap(),
        )
    }

    fn person(name: &str) -> Fields {
        let mut fields = Fields::new();
        fields.insert("name".to_string(), Value::text(name));
        fields
    }

    #[test]
    fn add_then_commit_clears_pending_changes() {
        let plugin = Arc::new(StubPlugin::new());
        let session = Session::new(plugin.clone());
        let people = session.collection(people_schema());

        let records = people.add(vec![person("Ann")]).unwrap();
        assert!(session.has_changes());
        // Identity was generated before commit.
        let id = records[0].get("id").unwrap();
        assert!(matches!(&id, Value::Text(s) if !s.is_empty()));

        let result = session.commit().unwrap();
        assert_eq!(result.adds, 1);
        assert!(!session.has_changes());
        assert_eq!(plugin.persists.lock().len(), 1);
    }

    #[test]
    fn empty_commit_never_calls_the_plugin() {
        let plugin = Arc::new(StubPlugin::new());
        let session = Session::new(plugin.clone());
        let _ = session.collection(people_schema());

        let result = session.commit().unwrap();
        assert!(result.is_empty());
        assert!(plugin.persists.lock().is_empty());
    }

    #[test]
    fn reassigning_the_same_value_yields_one_update() {
        let plugin = Arc::new(StubPlugin::new());
        let session = Session::new(plugin.clone());
        let people = session.collection(people_schema());

        let records = people.add(vec![person("Ann")]).unwrap();
        session.commit().unwrap();

        let record = &records[0];
        record.set("name", Value::text("Bea")).unwrap();
        record.set("name", Value::text("Bea")).unwrap();

        let changes = session.preview();
        assert_eq!(changes.collections.len(), 1);
        assert_eq!(changes.collections[0].updates.len(), 1);
        let (_, diff) = &changes.collections[0].updates[0];
        assert_eq!(diff.len(), 1);
        assert_eq!(diff.get("name"), Some(&Value::text("Bea")));
    }

    #[test]
    fn add_then_remove_cancels_both() {
        let plugin = Arc::new(StubPlugin::new());
        let session = Session::new(plugin.clone());
        let people = session.collection(people_schema());

        let records = people.add(vec![person("Ann")]).unwrap();
        people.remove(&records).unwrap();

        assert!(!session.has_changes());
        session.commit().unwrap();
        assert!(plugin.persists.lock().is_empty());
    }

    #[test]
    fn preview_is_pure_and_repeatable() {
        let session = Session::new(Arc::new(StubPlugin::new()));
        let people = session.collection(people_schema());
        people.add(vec![person("Ann"), person("Bea")]).unwrap();

        let first = session.preview();
        let second = session.preview();
        assert_eq!(first, second);
        assert!(session.has_changes());
    }

    #[test]
    fn failed_commit_leaves_tracking_untouched() {
        let session = Session::new(Arc::new(StubPlugin::failing()));
        let people = session.collection(people_schema());
        people.add(vec![person("Ann")]).unwrap();

        let before = session.preview();
        let err = session.commit().unwrap_err();
        assert!(matches!(err, EngineError::Plugin(_)));

        // Same changes still pending, so the commit can be retried.
        assert_eq!(session.preview(), before);
        assert!(session.has_changes());
    }

    #[test]
    fn commit_can_run_again_after_failure_guard_resets() {
        let session = Session::new(Arc::new(StubPlugin::failing()));
        let people = session.collection(people_schema());
        people.add(vec![person("Ann")]).unwrap();

        assert!(session.commit().is_err());
        // The in-flight flag resets even on failure.
        assert!(matches!(
            session.commit().unwrap_err(),
            EngineError::Plugin(_)
        ));
    }

    #[test]
    fn plugin_assigned_values_rebase_and_rekey() {
        let session = Session::new(Arc::new(StubPlugin::assigning()));
        let people = session.collection(people_schema());

        let records = people.add(vec![person("Ann")]).unwrap();
        let before = records[0].get("id").unwrap();

        let result = session.commit().unwrap();
        assert!(!result.receipt.is_empty());

        let after = records[0].get("id").unwrap();
        assert_ne!(before, after);
        assert_eq!(after, Value::text("srv-0"));

        // The record is settled under its server identity: a follow-up
        // mutation diffs cleanly.
        records[0].set("age", Value::Integer(30)).unwrap();
        let changes = session.preview();
        assert_eq!(changes.collections[0].updates.len(), 1);
        let (key, _) = &changes.collections[0].updates[0];
        assert_eq!(key, &RecordKey::new(vec![Value::text("srv-0")]));
    }

    #[test]
    fn default_of_wrong_type_is_rejected() {
        let schema = Arc::new(
            SchemaBuilder::new("flags")
                .property(PropertySchema::text("id").key().identity(IdentityKind::Random))
                .property(PropertySchema::bool("active").default_value(Value::text("yes")))
                .build()
                .unwrap(),
        );
        let session = Session::new(Arc::new(StubPlugin::new()));
        let flags = session.collection(schema);

        let err = flags.add(vec![Fields::new()]).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation { ref property, .. } if property == "active"
        ));
        assert!(!session.has_changes());
    }

    #[test]
    fn failed_remove_stages_nothing_from_the_batch() {
        let session = Session::new(Arc::new(StubPlugin::new()));
        let people = session.collection(people_schema());
        let records = people.add(vec![person("Ann"), person("Bea")]).unwrap();

        // Break the second record's key while it is still fresh.
        records[1].set("id", Value::Null).unwrap();
        let err = people.remove(&records).unwrap_err();
        assert!(matches!(err, EngineError::Schema(_)));

        // The first record was not touched by the failed batch.
        assert_eq!(records[0].state(), RecordState::Clean);
        let changes = session.preview();
        assert_eq!(changes.collections[0].adds.len(), 2);
        assert!(changes.collections[0].removes.is_empty());
    }

    #[test]
    fn same_schema_name_returns_same_collection() {
        let session = Session::new(Arc::new(StubPlugin::new()));
        let a = session.collection(people_schema());
        let b = session.collection(people_schema());
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn removal_of_committed_record_stages_a_remove() {
        let plugin = Arc::new(StubPlugin::new());
        let session = Session::new(plugin.clone());
        let people = session.collection(people_schema());

        let records = people.add(vec![person("Ann")]).unwrap();
        session.commit().unwrap();

        people.remove(&records).unwrap();
        let changes = session.preview();
        assert_eq!(changes.collections[0].removes.len(), 1);

        session.commit().unwrap();
        assert!(!session.has_changes());
        // Fetching afterwards does not resurrect the removed wrapper.
        assert_eq!(plugin.persists.lock().len(), 2);
    }
}
