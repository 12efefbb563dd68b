//! Collections: the per-schema facet of the unit of work.

use crate::change::CollectionChanges;
use crate::error::{EngineError, EngineResult};
use crate::executor::{self, QueryOutput};
use crate::outcome::Outcome;
use crate::plan::Query;
use crate::plugin::{PersistReceipt, StoragePlugin};
use crate::record::{RecordState, TrackedRecord};
use jotdb_schema::{CompiledSchema, Fields, IdentityGenerator, RecordKey, Value};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

struct CollectionState {
    /// Tracked records by identity. This cache is owned exclusively by
    /// this collection instance; a second collection over the same
    /// storage re-reads and re-wraps independently.
    tracked: BTreeMap<RecordKey, TrackedRecord>,
    /// Identities staged for insert, in staging order.
    staged_adds: Vec<RecordKey>,
    /// Identities staged for removal, in staging order.
    staged_removes: Vec<RecordKey>,
}

/// A schema-typed collection bound to a session's plugin.
///
/// Obtained from [`crate::Session::collection`]. Reads materialize
/// records as [`TrackedRecord`]s; re-reading a record already tracked
/// returns the same handle, so in-flight mutations are never lost.
/// Staged work (adds, removals, observed updates) accumulates here
/// until the session commits.
pub struct Collection {
    schema: Arc<CompiledSchema>,
    plugin: Arc<dyn StoragePlugin>,
    identities: IdentityGenerator,
    state: RwLock<CollectionState>,
}

impl Collection {
    pub(crate) fn new(schema: Arc<CompiledSchema>, plugin: Arc<dyn StoragePlugin>) -> Self {
        Self {
            schema,
            plugin,
            identities: IdentityGenerator::new(),
            state: RwLock::new(CollectionState {
                tracked: BTreeMap::new(),
                staged_adds: Vec::new(),
                staged_removes: Vec::new(),
            }),
        }
    }

    /// Returns the collection name.
    pub fn name(&self) -> &str {
        self.schema.name()
    }

    /// Returns the compiled schema.
    pub fn schema(&self) -> &Arc<CompiledSchema> {
        &self.schema
    }

    /// Executes a plan and materializes the results as tracked records.
    ///
    /// The plan must not project or aggregate; use
    /// [`Collection::select`] or [`Collection::aggregate`] for those.
    ///
    /// # Errors
    ///
    /// Local plan errors, or a [`EngineError::Plugin`] from the read.
    pub fn fetch(&self, query: &Query) -> EngineResult<Vec<TrackedRecord>> {
        match executor::execute(self.plugin.as_ref(), self.name(), &self.schema, query)? {
            QueryOutput::Records(records) => {
                let mut state = self.state.write();
                let mut out = Vec::with_capacity(records.len());
                for fields in records {
                    let key = self.schema.key_of(&fields)?;
                    match state.tracked.get(&key) {
                        // The existing wrapper stays authoritative.
                        Some(existing) if existing.state() == RecordState::Removed => {}
                        Some(existing) => out.push(existing.clone()),
                        None => {
                            let record =
                                TrackedRecord::materialized(Arc::clone(&self.schema), fields);
                            state.tracked.insert(key, record.clone());
                            out.push(record);
                        }
                    }
                }
                Ok(out)
            }
            QueryOutput::Projected(_) => Err(EngineError::invalid_query(
                "plan projects records; use select",
            )),
            QueryOutput::Scalar(_) => Err(EngineError::invalid_query(
                "plan aggregates; use aggregate",
            )),
        }
    }

    /// Callback form of [`Collection::fetch`].
    pub fn fetch_with(&self, query: &Query, callback: impl FnOnce(Outcome<Vec<TrackedRecord>>)) {
        callback(self.fetch(query).into());
    }

    /// Executes a plan and returns plain, untracked values.
    ///
    /// # Errors
    ///
    /// Local plan errors, or a [`EngineError::Plugin`] from the read.
    pub fn select(&self, query: &Query) -> EngineResult<Vec<Value>> {
        match executor::execute(self.plugin.as_ref(), self.name(), &self.schema, query)? {
            QueryOutput::Records(records) => {
                Ok(records.into_iter().map(Value::Map).collect())
            }
            QueryOutput::Projected(values) => Ok(values),
            QueryOutput::Scalar(_) => Err(EngineError::invalid_query(
                "plan aggregates; use aggregate",
            )),
        }
    }

    /// Callback form of [`Collection::select`].
    pub fn select_with(&self, query: &Query, callback: impl FnOnce(Outcome<Vec<Value>>)) {
        callback(self.select(query).into());
    }

    /// Executes a plan ending in an aggregate and returns its scalar.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidQuery`] when the plan has no trailing
    /// aggregate; [`EngineError::EmptySequence`] for min/max over an
    /// empty source without a default.
    pub fn aggregate(&self, query: &Query) -> EngineResult<Value> {
        match executor::execute(self.plugin.as_ref(), self.name(), &self.schema, query)? {
            QueryOutput::Scalar(value) => Ok(value),
            _ => Err(EngineError::invalid_query("plan has no trailing aggregate")),
        }
    }

    /// Callback form of [`Collection::aggregate`].
    pub fn aggregate_with(&self, query: &Query, callback: impl FnOnce(Outcome<Value>)) {
        callback(self.aggregate(query).into());
    }

    /// Stages records for insert and returns their tracked wrappers.
    ///
    /// For each record, in order: defaults fill omitted properties,
    /// identity properties are generated (exactly once - supplying one
    /// is a validation error), values are checked against type tags,
    /// null rules, and validators, and `distinct` constraints are
    /// checked best-effort against in-memory state only (staged and
    /// tracked records; cross-process uniqueness belongs to the storage
    /// plugin).
    ///
    /// All records validate before any stages: on error, nothing from
    /// this call is staged.
    ///
    /// # Errors
    ///
    /// [`EngineError::Validation`] naming the offending property.
    pub fn add(&self, records: Vec<Fields>) -> EngineResult<Vec<TrackedRecord>> {
        let mut state = self.state.write();

        let mut prepared: Vec<(RecordKey, Fields)> = Vec::with_capacity(records.len());
        for fields in records {
            let fields = self.prepare(fields)?;
            self.check_distinct(&state, &prepared, &fields)?;

            let key = self.schema.key_of(&fields)?;
            let already_tracked = state
                .tracked
                .get(&key)
                .is_some_and(|r| r.state() != RecordState::Removed);
            if already_tracked || prepared.iter().any(|(k, _)| *k == key) {
                return Err(EngineError::validation(
                    &self.schema.key_names()[0],
                    format!("a record with {key} is already tracked"),
                ));
            }
            prepared.push((key, fields));
        }

        let mut out = Vec::with_capacity(prepared.len());
        for (key, fields) in prepared {
            let record = TrackedRecord::staged(Arc::clone(&self.schema), fields);
            state.tracked.insert(key.clone(), record.clone());
            state.staged_adds.push(key);
            out.push(record);
        }
        Ok(out)
    }

    /// Callback form of [`Collection::add`].
    pub fn add_with(&self, records: Vec<Fields>, callback: impl FnOnce(Outcome<Vec<TrackedRecord>>)) {
        callback(self.add(records).into());
    }

    /// Runs defaults, identity generation, and validation for one
    /// record. Pure with respect to collection state.
    fn prepare(&self, input: Fields) -> EngineResult<Fields> {
        let mut fields = input;

        for property in self.schema.properties() {
            let name = property.name();

            if let Some(kind) = property.identity_kind() {
                if fields.contains_key(name) {
                    return Err(EngineError::validation(
                        name,
                        "identity property values are generated, never supplied",
                    ));
                }
                fields.insert(
                    name.to_string(),
                    self.identities.generate(kind, property.tag()),
                );
                continue;
            }

            if !fields.contains_key(name) {
                if let Some(default) = property.default_fn_ref() {
                    fields.insert(name.to_string(), default());
                } else if !property.is_optional() && property.compute_fn().is_none() {
                    return Err(EngineError::validation(name, "missing required property"));
                }
            }

            // Defaulted values go through the same tag, null, and
            // validator checks as supplied ones.
            if let Some(value) = fields.get(name) {
                if value.is_null() {
                    if !property.is_nullable() {
                        return Err(EngineError::validation(name, "null is not allowed"));
                    }
                } else if value.tag() != Some(property.tag()) {
                    return Err(EngineError::validation(
                        name,
                        format!("expected {}", property.tag()),
                    ));
                }
                for validator in property.validators() {
                    validator(value)
                        .map_err(|message| EngineError::validation(name, message))?;
                }
            }
        }

        // Computed+tracked properties are persisted: snapshot them from
        // the assembled record.
        let computed: Vec<(String, Value)> = self
            .schema
            .properties()
            .filter(|p| p.is_tracked())
            .filter_map(|p| p.compute_fn().map(|f| (p.name().to_string(), f(&fields))))
            .collect();
        fields.extend(computed);

        Ok(fields)
    }

    fn check_distinct(
        &self,
        state: &CollectionState,
        batch: &[(RecordKey, Fields)],
        fields: &Fields,
    ) -> EngineResult<()> {
        for property in self.schema.properties().filter(|p| p.is_distinct()) {
            let name = property.name();
            let Some(value) = fields.get(name) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let serialized = property.serialized(value);

            let in_tracked = state.tracked.values().any(|record| {
                record.state() != RecordState::Removed
                    && record
                        .get(name)
                        .is_some_and(|v| property.serialized(&v) == serialized)
            });
            let in_batch = batch.iter().any(|(_, other)| {
                other
                    .get(name)
                    .is_some_and(|v| property.serialized(v) == serialized)
            });
            if in_tracked || in_batch {
                return Err(EngineError::validation(
                    name,
                    format!("duplicate value {serialized}"),
                ));
            }
        }
        Ok(())
    }

    /// Stages removals.
    ///
    /// A record staged as an add and removed before commit cancels
    /// both operations. An already-committed record stages a standalone
    /// remove. Removing a record twice is a no-op.
    ///
    /// Like [`Collection::add`], the call is all-or-nothing: every key
    /// extracts before anything stages, so a failure leaves no record
    /// from this batch removed.
    ///
    /// # Errors
    ///
    /// Key extraction failure only.
    pub fn remove(&self, records: &[TrackedRecord]) -> EngineResult<()> {
        let mut state = self.state.write();

        let mut keyed = Vec::with_capacity(records.len());
        for record in records {
            if record.state() == RecordState::Removed {
                continue;
            }
            keyed.push((record.key()?, record));
        }

        for (key, record) in keyed {
            record.mark_removed();
            if let Some(staged) = state.staged_adds.iter().position(|k| *k == key) {
                // Add then remove before commit: both cancel.
                state.staged_adds.remove(staged);
                state.tracked.remove(&key);
            } else if !state.staged_removes.contains(&key) {
                state.staged_removes.push(key);
            }
        }
        Ok(())
    }

    /// Computes this collection's pending changes. Pure: tracking state
    /// is not mutated and no plugin call is made.
    pub(crate) fn preview(&self) -> CollectionChanges {
        let state = self.state.read();
        let mut changes = CollectionChanges::new(self.name());

        for key in &state.staged_adds {
            if let Some(record) = state.tracked.get(key) {
                // Fresh records may have had their key reassigned after
                // staging; the add travels under the current key.
                let key = record.key().unwrap_or_else(|_| key.clone());
                changes
                    .adds
                    .push((key, self.serialize_fields(&record.fields())));
            }
        }

        for (key, record) in &state.tracked {
            if record.is_fresh() || record.state() == RecordState::Removed {
                continue;
            }
            let diff = record.pending_diff();
            if !diff.is_empty() {
                changes.updates.push((key.clone(), diff));
            }
        }

        changes.removes = state.staged_removes.clone();
        changes
    }

    /// Applies serialize hooks to schema properties of an add payload.
    fn serialize_fields(&self, fields: &Fields) -> Fields {
        fields
            .iter()
            .map(|(name, value)| {
                let value = match self.schema.get(name) {
                    Some(property) => property.serialized(value),
                    None => value.clone(),
                };
                (name.clone(), value)
            })
            .collect()
    }

    /// Reconciles tracking state after a successful persist.
    ///
    /// Every staged add and observed update rebases onto its post-commit
    /// state (plugin-assigned values applied, snapshot replaced), and
    /// committed removals leave the cache.
    pub(crate) fn reconcile(&self, receipt: &PersistReceipt) {
        let mut state = self.state.write();

        let staged: Vec<RecordKey> = state.staged_adds.drain(..).collect();
        for key in staged {
            let Some(record) = state.tracked.get(&key).cloned() else {
                continue;
            };
            // The receipt is keyed by the key the add traveled under,
            // which may differ from the staging key.
            let wire_key = record.key().unwrap_or_else(|_| key.clone());
            record.rebase(receipt.generated_for(self.name(), &wire_key));
            // A plugin-assigned identity may have moved the record.
            let new_key = record.key().unwrap_or_else(|_| wire_key.clone());
            if new_key != key {
                state.tracked.remove(&key);
                state.tracked.insert(new_key, record);
            }
        }

        for record in state.tracked.values() {
            if record.state() == RecordState::Dirty {
                record.rebase(None);
            }
        }

        let removed: Vec<RecordKey> = state.staged_removes.drain(..).collect();
        for key in removed {
            state.tracked.remove(&key);
        }
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Collection")
            .field("name", &self.name())
            .field("tracked", &state.tracked.len())
            .field("staged_adds", &state.staged_adds.len())
            .field("staged_removes", &state.staged_removes.len())
            .finish()
    }
}
