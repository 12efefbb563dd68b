//! Change-tracking record wrapper.

use crate::diff;
use crate::error::{EngineError, EngineResult};
use jotdb_schema::{CompiledSchema, Fields, RecordKey, Value};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Lifecycle state of a tracked record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// No observed difference from the snapshot.
    Clean,
    /// At least one property differs from the snapshot.
    Dirty,
    /// Removal staged or committed. Terminal; mutation fails.
    Removed,
}

struct RecordInner {
    schema: Arc<CompiledSchema>,
    /// Original snapshot: the state the next diff starts from.
    snapshot: Fields,
    /// Live view; the authoritative field values.
    live: Fields,
    /// Properties whose serialized value currently differs from the
    /// snapshot. The old/new side table behind the dirty state.
    changed: BTreeSet<String>,
    state: RecordState,
    /// True for records staged by add and not yet committed. Key
    /// properties stay writable until the first commit.
    fresh: bool,
}

impl RecordInner {
    /// Re-derives the changed set entry for one property.
    fn observe(&mut self, property: &str) {
        let Some(schema_property) = self.schema.get(property) else {
            // Non-schema properties pass through unobserved.
            return;
        };
        let live = self.live.get(property).unwrap_or(&Value::Null);
        let snap = self.snapshot.get(property).unwrap_or(&Value::Null);
        if schema_property.serialized(live) == schema_property.serialized(snap) {
            self.changed.remove(property);
        } else {
            self.changed.insert(property.to_string());
        }
        if self.state != RecordState::Removed {
            self.state = if self.changed.is_empty() {
                RecordState::Clean
            } else {
                RecordState::Dirty
            };
        }
    }
}

/// A record whose mutations are observed.
///
/// Wraps the record materialized from a plugin (or staged by `add`)
/// together with its original snapshot. Every write goes through
/// [`TrackedRecord::set`] or [`TrackedRecord::set_path`], which record
/// the difference against the snapshot - no explicit "mark dirty" call
/// exists. Reading is transparent.
///
/// Cloning the handle clones a reference: all clones observe the same
/// record. The wrapper stays authoritative for field values; the unit
/// of work holds only identities.
///
/// Assigning a value whose serialized form equals the snapshot's never
/// creates a spurious diff, and assigning the same difference twice
/// records it once.
#[derive(Clone)]
pub struct TrackedRecord {
    inner: Arc<RwLock<RecordInner>>,
}

impl TrackedRecord {
    /// Wraps a record read from a plugin. The snapshot is the record as
    /// materialized.
    pub(crate) fn materialized(schema: Arc<CompiledSchema>, fields: Fields) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RecordInner {
                schema,
                snapshot: fields.clone(),
                live: fields,
                changed: BTreeSet::new(),
                state: RecordState::Clean,
                fresh: false,
            })),
        }
    }

    /// Wraps a freshly added record awaiting its first commit.
    pub(crate) fn staged(schema: Arc<CompiledSchema>, fields: Fields) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RecordInner {
                schema,
                snapshot: fields.clone(),
                live: fields,
                changed: BTreeSet::new(),
                state: RecordState::Clean,
                fresh: true,
            })),
        }
    }

    /// Returns the schema this record conforms to.
    pub fn schema(&self) -> Arc<CompiledSchema> {
        Arc::clone(&self.inner.read().schema)
    }

    /// Returns the current value of a property.
    pub fn get(&self, property: &str) -> Option<Value> {
        self.inner.read().live.get(property).cloned()
    }

    /// Returns a copy of all current fields.
    pub fn fields(&self) -> Fields {
        self.inner.read().live.clone()
    }

    /// Returns the record's lifecycle state.
    pub fn state(&self) -> RecordState {
        self.inner.read().state
    }

    /// Returns the record key, from the live fields.
    pub fn key(&self) -> EngineResult<RecordKey> {
        let inner = self.inner.read();
        Ok(inner.schema.key_of(&inner.live)?)
    }

    /// Assigns a property.
    ///
    /// # Errors
    ///
    /// - [`EngineError::RecordRemoved`] after removal; the assignment
    ///   has no effect
    /// - [`EngineError::ReadonlyViolation`] for readonly properties
    /// - [`EngineError::KeyImmutable`] for key properties after the
    ///   record has materialized
    pub fn set(&self, property: &str, value: impl Into<Value>) -> EngineResult<()> {
        let mut inner = self.inner.write();
        Self::check_writable(&inner, property)?;
        inner.live.insert(property.to_string(), value.into());
        inner.observe(property);
        Ok(())
    }

    /// Assigns a value inside a nested object or array property.
    ///
    /// The first path segment names the record property; the rest
    /// descend through map keys and array indices. Deep mutation is
    /// observed exactly like a top-level assignment: the property
    /// appears in the diff only if its serialized form changed.
    ///
    /// # Errors
    ///
    /// Same as [`TrackedRecord::set`], plus a validation error when the
    /// path does not resolve.
    pub fn set_path(&self, path: &[&str], value: impl Into<Value>) -> EngineResult<()> {
        let [property, rest @ ..] = path else {
            return Err(EngineError::validation("", "empty path"));
        };
        if rest.is_empty() {
            return self.set(property, value);
        }

        let mut inner = self.inner.write();
        Self::check_writable(&inner, property)?;

        let root = inner
            .live
            .get_mut(*property)
            .ok_or_else(|| EngineError::validation(*property, "no such property"))?;
        let mut target = root;
        for segment in &rest[..rest.len() - 1] {
            target = descend(target, segment)
                .ok_or_else(|| EngineError::validation(*property, "path does not resolve"))?;
        }
        let leaf = rest[rest.len() - 1];
        let slot = descend(target, leaf)
            .ok_or_else(|| EngineError::validation(*property, "path does not resolve"))?;
        *slot = value.into();

        inner.observe(property);
        Ok(())
    }

    fn check_writable(inner: &RecordInner, property: &str) -> EngineResult<()> {
        if inner.state == RecordState::Removed {
            return Err(EngineError::RecordRemoved);
        }
        if let Some(schema_property) = inner.schema.get(property) {
            if schema_property.is_readonly() {
                return Err(EngineError::ReadonlyViolation {
                    property: property.to_string(),
                });
            }
            if schema_property.is_key() && !inner.fresh {
                return Err(EngineError::KeyImmutable {
                    property: property.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Computes this record's pending diff against its snapshot.
    pub(crate) fn pending_diff(&self) -> Fields {
        let inner = self.inner.read();
        diff::diff(&inner.schema, &inner.snapshot, &inner.live)
    }

    pub(crate) fn is_fresh(&self) -> bool {
        self.inner.read().fresh
    }

    pub(crate) fn mark_removed(&self) {
        self.inner.write().state = RecordState::Removed;
    }

    /// Replaces the snapshot with the post-commit state.
    ///
    /// Computed+tracked properties are re-derived into the live view
    /// (they were persisted), plugin-assigned values are written back,
    /// and the record returns to `Clean` with the new snapshot as the
    /// base of the next diff.
    pub(crate) fn rebase(&self, generated: Option<&Fields>) {
        let mut inner = self.inner.write();

        let computed: Vec<(String, Value)> = inner
            .schema
            .properties()
            .filter(|p| p.is_tracked())
            .filter_map(|p| {
                p.compute_fn()
                    .map(|f| (p.name().to_string(), f(&inner.live)))
            })
            .collect();
        for (name, value) in computed {
            inner.live.insert(name, value);
        }

        if let Some(values) = generated {
            for (name, value) in values {
                inner.live.insert(name.clone(), value.clone());
            }
        }

        inner.snapshot = inner.live.clone();
        inner.changed.clear();
        inner.state = RecordState::Clean;
        inner.fresh = false;
    }
}

/// Steps one level into a map (by key) or array (by index).
fn descend<'a>(value: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    match value {
        Value::Map(fields) => fields.get_mut(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(move |i| items.get_mut(i)),
        _ => None,
    }
}

impl std::fmt::Debug for TrackedRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("TrackedRecord")
            .field("schema", &inner.schema.name())
            .field("state", &inner.state)
            .field("fresh", &inner.fresh)
            .field("changed", &inner.changed)
            .finish()
    }
}
