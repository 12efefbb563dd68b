//! Write fan-out across replica plugins.

use jotdb_core::{
    AggregateKind, Capabilities, ChangeSet, PersistReceipt, PlanPrefix, PluginError,
    PluginResult, StoragePlugin,
};
use jotdb_schema::{Fields, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Which plugin serves reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadFrom {
    /// Read from the primary (the default).
    #[default]
    Primary,
    /// Read from the replica at this index.
    Replica(usize),
}

/// Fans every persist out to a primary and a set of replicas.
///
/// Reads go to one designated member; writes go to all, primary first.
/// A replica failure fails the commit, surfaced as the replica's own
/// error - members that already persisted keep their copy, and the
/// session's staged changes stay pending so the commit can be retried
/// once the replica recovers.
pub struct ReplicationPlugin {
    primary: Arc<dyn StoragePlugin>,
    replicas: Vec<Arc<dyn StoragePlugin>>,
    read_from: ReadFrom,
}

impl ReplicationPlugin {
    /// Creates a replication group with only a primary.
    pub fn new(primary: Arc<dyn StoragePlugin>) -> Self {
        Self {
            primary,
            replicas: Vec::new(),
            read_from: ReadFrom::default(),
        }
    }

    /// Adds a replica. Replicas receive writes in registration order.
    #[must_use]
    pub fn replica(mut self, replica: Arc<dyn StoragePlugin>) -> Self {
        self.replicas.push(replica);
        self
    }

    /// Designates the read member.
    ///
    /// An out-of-range replica index falls back to the primary.
    #[must_use]
    pub fn read_from(mut self, read_from: ReadFrom) -> Self {
        self.read_from = read_from;
        self
    }

    fn reader(&self) -> &Arc<dyn StoragePlugin> {
        match self.read_from {
            ReadFrom::Primary => &self.primary,
            ReadFrom::Replica(index) => self.replicas.get(index).unwrap_or(&self.primary),
        }
    }
}

impl StoragePlugin for ReplicationPlugin {
    fn name(&self) -> &str {
        "replication"
    }

    /// The read member's capabilities: only it ever sees a pushed prefix.
    fn capabilities(&self) -> Capabilities {
        self.reader().capabilities()
    }

    fn query(&self, collection: &str, prefix: &PlanPrefix) -> PluginResult<Vec<Fields>> {
        self.reader().query(collection, prefix)
    }

    fn query_aggregate(
        &self,
        collection: &str,
        prefix: &PlanPrefix,
        aggregate: &AggregateKind,
    ) -> PluginResult<Option<Value>> {
        self.reader().query_aggregate(collection, prefix, aggregate)
    }

    fn persist(&self, changes: &ChangeSet) -> PluginResult<PersistReceipt> {
        debug!(replicas = self.replicas.len(), ops = changes.len(), "replicated persist");
        let receipt = self.primary.persist(changes)?;
        // Every replica gets its attempt before a failure is reported.
        let mut failure = None;
        for replica in &self.replicas {
            if let Err(err) = replica.persist(changes) {
                warn!(replica = replica.name(), %err, "replica persist failed");
                failure.get_or_insert_with(|| {
                    PluginError::failed(format!("replica {}: {err}", replica.name()))
                });
            }
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(receipt),
        }
    }
}

impl std::fmt::Debug for ReplicationPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationPlugin")
            .field("primary", &self.primary.name())
            .field("replicas", &self.replicas.len())
            .field("read_from", &self.read_from)
            .finish()
    }
}
