//! The storage plugin contract.

use crate::change::ChangeSet;
use crate::plan::{AggregateKind, Predicate, SortDirection};
use jotdb_schema::{Fields, RecordKey, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;

/// An opaque failure surfaced from a plugin.
///
/// The engine propagates plugin errors unchanged to the caller and
/// never retries automatically.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The plugin failed with a message.
    #[error("{message}")]
    Failed {
        /// Description of the failure.
        message: String,
    },

    /// An underlying backend error.
    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

impl PluginError {
    /// Creates a message-bearing failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Operation shapes a plugin declares it can execute itself.
///
/// Absence of a flag means "always fall back to local evaluation" for
/// that shape. The default is all-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Parameterized predicate filters.
    pub filters: bool,
    /// Property sorts.
    pub sorts: bool,
    /// Skip/take paging.
    pub paging: bool,
    /// Scalar aggregates over a pushed prefix.
    pub aggregates: bool,
}

impl Capabilities {
    /// All shapes supported.
    #[must_use]
    pub fn all() -> Self {
        Self {
            filters: true,
            sorts: true,
            paging: true,
            aggregates: true,
        }
    }
}

/// One operation of a pushed-down plan prefix.
///
/// Only shapes a plugin can declare support for appear here; opaque
/// closures never cross the plugin boundary.
#[derive(Debug, Clone)]
pub enum PushableOp {
    /// Keep records matching the predicate, resolved against `params`.
    Filter {
        /// The predicate.
        predicate: Predicate,
        /// The parameter bag.
        params: Fields,
    },
    /// Order records by a property. Consecutive sorts compose into one
    /// stable multi-key sort.
    Sort {
        /// The sort key property.
        property: String,
        /// Sort direction.
        direction: SortDirection,
    },
    /// Drop the first `n` records.
    Skip(usize),
    /// Keep at most `n` records.
    Take(usize),
}

/// The prefix of a query plan handed to a plugin.
///
/// The plugin may ignore any operation it cannot execute, but it must
/// not reorder the operations it does execute.
#[derive(Debug, Clone, Default)]
pub struct PlanPrefix {
    /// The pushed operations, in plan order.
    pub ops: Vec<PushableOp>,
}

impl PlanPrefix {
    /// Returns `true` if nothing was pushed down.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Values the plugin assigned during persist, keyed by collection name
/// and record identity.
///
/// Typical content: a server-confirmed identity for an added record.
/// The engine writes these back into the corresponding tracked records
/// during commit reconciliation.
#[derive(Debug, Clone, Default)]
pub struct PersistReceipt {
    generated: BTreeMap<(String, RecordKey), Fields>,
}

impl PersistReceipt {
    /// Creates an empty receipt.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records plugin-assigned property values for an added record.
    pub fn record_generated(
        &mut self,
        collection: impl Into<String>,
        key: RecordKey,
        values: Fields,
    ) {
        self.generated.insert((collection.into(), key), values);
    }

    /// Returns the assigned values for a record, if any.
    pub fn generated_for(&self, collection: &str, key: &RecordKey) -> Option<&Fields> {
        self.generated
            .get(&(collection.to_string(), key.clone()))
    }

    /// Returns `true` if nothing was assigned.
    pub fn is_empty(&self) -> bool {
        self.generated.is_empty()
    }

    /// Iterates over all assigned values.
    pub fn iter(&self) -> impl Iterator<Item = (&(String, RecordKey), &Fields)> {
        self.generated.iter()
    }
}

/// A storage backend adapter.
///
/// Plugins are interchangeable: the engine addresses every backend
/// through this contract and is unaware of what stands behind it - a
/// plain map, a document store, or a decorated composite fanning out to
/// replicas.
///
/// # Invariants
///
/// - `query` returns records in the plugin's native order unless the
///   prefix orders them; operations the plugin executes keep their
///   prefix order
/// - `persist` applies the whole change set atomically from the
///   caller's point of view and fails as a unit
/// - implementations must be `Send + Sync`
pub trait StoragePlugin: Send + Sync {
    /// A short name for diagnostics.
    fn name(&self) -> &str;

    /// The operation shapes this plugin executes itself.
    ///
    /// The engine evaluates everything else locally.
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Reads raw records from a collection, applying the pushed prefix.
    ///
    /// # Errors
    ///
    /// Returns a [`PluginError`] on backend failure.
    fn query(&self, collection: &str, prefix: &PlanPrefix) -> PluginResult<Vec<Fields>>;

    /// Natively computes a scalar aggregate over the pushed prefix.
    ///
    /// Returning `Ok(None)` declines: the engine materializes and
    /// reduces locally. The default declines everything.
    ///
    /// # Errors
    ///
    /// Returns a [`PluginError`] on backend failure.
    fn query_aggregate(
        &self,
        _collection: &str,
        _prefix: &PlanPrefix,
        _aggregate: &AggregateKind,
    ) -> PluginResult<Option<Value>> {
        Ok(None)
    }

    /// Applies a change set atomically.
    ///
    /// Returns plugin-assigned values (e.g. server-confirmed
    /// identities) for added records.
    ///
    /// # Errors
    ///
    /// Returns a [`PluginError`] on failure; no part of the change set
    /// may remain applied.
    fn persist(&self, changes: &ChangeSet) -> PluginResult<PersistReceipt>;
}
