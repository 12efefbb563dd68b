//! Logging decorator over any storage plugin.

use jotdb_core::{
    AggregateKind, Capabilities, ChangeSet, PersistReceipt, PlanPrefix, PluginResult,
    StoragePlugin,
};
use jotdb_schema::{Fields, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Wraps a plugin and traces every call that crosses the boundary.
///
/// Transparent otherwise: capabilities, results, and errors pass
/// through unchanged, so a logged plugin composes anywhere its inner
/// plugin does.
pub struct LoggingPlugin {
    inner: Arc<dyn StoragePlugin>,
    name: String,
}

impl LoggingPlugin {
    /// Wraps `inner`.
    pub fn new(inner: Arc<dyn StoragePlugin>) -> Self {
        let name = format!("logging({})", inner.name());
        Self { inner, name }
    }
}

impl StoragePlugin for LoggingPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    fn query(&self, collection: &str, prefix: &PlanPrefix) -> PluginResult<Vec<Fields>> {
        debug!(plugin = self.inner.name(), collection, pushed = prefix.ops.len(), "query");
        let result = self.inner.query(collection, prefix);
        match &result {
            Ok(rows) => debug!(collection, rows = rows.len(), "query ok"),
            Err(err) => warn!(collection, %err, "query failed"),
        }
        result
    }

    fn query_aggregate(
        &self,
        collection: &str,
        prefix: &PlanPrefix,
        aggregate: &AggregateKind,
    ) -> PluginResult<Option<Value>> {
        debug!(plugin = self.inner.name(), collection, ?aggregate, "query aggregate");
        let result = self.inner.query_aggregate(collection, prefix, aggregate);
        if let Err(err) = &result {
            warn!(collection, %err, "aggregate failed");
        }
        result
    }

    fn persist(&self, changes: &ChangeSet) -> PluginResult<PersistReceipt> {
        info!(plugin = self.inner.name(), ops = changes.len(), "persist");
        let result = self.inner.persist(changes);
        match &result {
            Ok(receipt) => {
                debug!(generated = !receipt.is_empty(), "persist ok");
            }
            Err(err) => warn!(%err, "persist failed"),
        }
        result
    }
}

impl std::fmt::Debug for LoggingPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingPlugin").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryPlugin;
    use jotdb_core::CollectionChanges;
    use jotdb_schema::RecordKey;

    fn seeded() -> LoggingPlugin {
        let inner = MemoryPlugin::new();
        let mut changes = CollectionChanges::new("people");
        let mut fields = Fields::new();
        fields.insert("id".to_string(), Value::Integer(1));
        changes
            .adds
            .push((RecordKey::new(vec![Value::Integer(1)]), fields));
        let mut set = ChangeSet::new();
        set.push(changes);
        inner.persist(&set).unwrap();
        LoggingPlugin::new(Arc::new(inner))
    }

    #[test]
    fn passes_through_unchanged() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let plugin = seeded();
        assert_eq!(plugin.name(), "logging(memory)");
        assert_eq!(plugin.capabilities(), Capabilities::all());

        let rows = plugin.query("people", &PlanPrefix::default()).unwrap();
        assert_eq!(rows.len(), 1);

        let count = plugin
            .query_aggregate("people", &PlanPrefix::default(), &AggregateKind::Count)
            .unwrap();
        assert_eq!(count, Some(Value::Integer(1)));
    }

    #[test]
    fn errors_pass_through() {
        let plugin = seeded();
        let mut changes = CollectionChanges::new("people");
        changes
            .removes
            .push(RecordKey::new(vec![Value::Integer(99)]));
        let mut set = ChangeSet::new();
        set.push(changes);
        assert!(plugin.persist(&set).is_err());
    }
}
