//! Query plan execution against a plugin.
//!
//! The executor partitions a plan into a plugin-pushable prefix and a
//! local-fallback suffix. The prefix is the longest leading run of
//! operations the plugin's capability flags cover; everything after the
//! first unsupported operation is evaluated in memory, in the exact
//! order it appears in the plan. Filters, sorts, and paging are never
//! reordered relative to each other; the one exception is distinct,
//! which always evaluates on the projected shape and so runs after the
//! plan's projection wherever it was written.

use crate::error::{EngineError, EngineResult};
use crate::plan::{
    multi_key_cmp, AggregateKind, FilterOp, PlanOp, Projection, Query, SortDirection,
};
use crate::plugin::{PlanPrefix, PushableOp, StoragePlugin};
use jotdb_schema::{CompiledSchema, Fields, Value};
use std::collections::BTreeSet;
use tracing::debug;

/// The result of executing a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum QueryOutput {
    /// Schema-shaped records (no opaque projection ran).
    Records(Vec<Fields>),
    /// Rows reshaped by an opaque projector.
    Projected(Vec<Value>),
    /// A trailing aggregate's scalar.
    Scalar(Value),
}

/// Executes a plan against a plugin.
pub(crate) fn execute(
    plugin: &dyn StoragePlugin,
    collection: &str,
    schema: &CompiledSchema,
    query: &Query,
) -> EngineResult<QueryOutput> {
    // Local errors are detected before any plugin I/O: an unbound
    // parameter anywhere in the plan fails the whole call here.
    for op in query.ops() {
        if let PlanOp::Filter(FilterOp::Pushable { predicate, params }) = op {
            predicate.check_bound(params)?;
        }
    }

    let caps = plugin.capabilities();
    let mut prefix = PlanPrefix::default();
    let mut split = 0;
    for op in query.ops() {
        let pushed = match op {
            PlanOp::Filter(FilterOp::Pushable { predicate, params }) if caps.filters => {
                Some(PushableOp::Filter {
                    predicate: predicate.clone(),
                    params: params.clone(),
                })
            }
            PlanOp::Sort {
                property,
                direction,
            } if caps.sorts => Some(PushableOp::Sort {
                property: property.clone(),
                direction: *direction,
            }),
            PlanOp::Skip(n) if caps.paging => Some(PushableOp::Skip(*n)),
            PlanOp::Take(n) if caps.paging => Some(PushableOp::Take(*n)),
            _ => None,
        };
        match pushed {
            Some(op) => {
                prefix.ops.push(op);
                split += 1;
            }
            None => break,
        }
    }
    let raw_suffix = &query.ops()[split..];

    // Distinct evaluates on the projected shape: a distinct written
    // before the plan's projection is deferred until after the last
    // projection. Every other operation keeps its plan order.
    let last_project = raw_suffix
        .iter()
        .rposition(|op| matches!(op, PlanOp::Project(_)));
    let mut suffix: Vec<PlanOp> = Vec::with_capacity(raw_suffix.len());
    let mut deferred_distinct = false;
    for (i, op) in raw_suffix.iter().enumerate() {
        if matches!(op, PlanOp::Distinct) && last_project.is_some_and(|j| i < j) {
            deferred_distinct = true;
            continue;
        }
        suffix.push(op.clone());
        if deferred_distinct && Some(i) == last_project {
            suffix.push(PlanOp::Distinct);
            deferred_distinct = false;
        }
    }

    debug!(
        collection,
        plugin = plugin.name(),
        pushed = prefix.ops.len(),
        local = suffix.len(),
        "partitioned query plan"
    );

    // Aggregate short-circuit: when the whole local suffix is one
    // trailing aggregate and the plugin aggregates natively, skip
    // materialization entirely.
    if caps.aggregates {
        if let [PlanOp::Aggregate(kind)] = suffix.as_slice() {
            if let Some(value) = plugin.query_aggregate(collection, &prefix, kind)? {
                return Ok(QueryOutput::Scalar(value));
            }
        }
    }

    let raw = plugin.query(collection, &prefix)?;
    let mut rows = Rows::Records(
        raw.into_iter()
            .map(|fields| deserialize_record(schema, fields))
            .collect(),
    );

    let mut i = 0;
    while i < suffix.len() {
        match &suffix[i] {
            PlanOp::Filter(op) => {
                rows = rows.filtered(op)?;
                i += 1;
            }
            PlanOp::Sort { .. } => {
                // Consecutive sorts compose into one stable multi-key
                // sort, primary key first.
                let mut keys = Vec::new();
                while let Some(PlanOp::Sort {
                    property,
                    direction,
                }) = suffix.get(i)
                {
                    keys.push((property.clone(), *direction));
                    i += 1;
                }
                rows.sort(&keys);
            }
            PlanOp::Skip(n) => {
                rows.skip(*n);
                i += 1;
            }
            PlanOp::Take(n) => {
                rows.take(*n);
                i += 1;
            }
            PlanOp::Project(projection) => {
                rows = rows.projected(projection);
                i += 1;
            }
            PlanOp::Distinct => {
                rows.distinct(schema);
                i += 1;
            }
            PlanOp::Aggregate(kind) => {
                if i + 1 != suffix.len() {
                    return Err(EngineError::invalid_query(
                        "aggregate must be the final operation",
                    ));
                }
                return Ok(QueryOutput::Scalar(rows.aggregate(kind)?));
            }
        }
    }

    Ok(match rows {
        Rows::Records(records) => QueryOutput::Records(records),
        Rows::Projected(values) => QueryOutput::Projected(values),
    })
}

/// Applies deserialize hooks to a raw record from the plugin.
fn deserialize_record(schema: &CompiledSchema, fields: Fields) -> Fields {
    fields
        .into_iter()
        .map(|(name, value)| {
            let value = match schema.get(&name) {
                Some(property) => property.deserialized(&value),
                None => value,
            };
            (name, value)
        })
        .collect()
}

/// Serialized form of a record, for distinct comparison.
fn serialize_record(schema: &CompiledSchema, fields: &Fields) -> Value {
    Value::Map(
        fields
            .iter()
            .map(|(name, value)| {
                let value = match schema.get(name) {
                    Some(property) => property.serialized(value),
                    None => value.clone(),
                };
                (name.clone(), value)
            })
            .collect(),
    )
}

/// Working rows of the local suffix: schema-shaped until an opaque
/// projection runs, arbitrary values after.
enum Rows {
    Records(Vec<Fields>),
    Projected(Vec<Value>),
}

impl Rows {
    fn filtered(self, op: &FilterOp) -> EngineResult<Rows> {
        let matches = |fields: &Fields| -> EngineResult<bool> {
            match op {
                FilterOp::Pushable { predicate, params } => predicate.matches(fields, params),
                FilterOp::Local(f) => Ok(f(fields)),
            }
        };
        Ok(match self {
            Rows::Records(records) => {
                let mut kept = Vec::with_capacity(records.len());
                for record in records {
                    if matches(&record)? {
                        kept.push(record);
                    }
                }
                Rows::Records(kept)
            }
            Rows::Projected(values) => {
                let mut kept = Vec::with_capacity(values.len());
                for value in values {
                    let keep = match value.as_map() {
                        Some(fields) => matches(fields)?,
                        None => false,
                    };
                    if keep {
                        kept.push(value);
                    }
                }
                Rows::Projected(kept)
            }
        })
    }

    fn sort(&mut self, keys: &[(String, SortDirection)]) {
        match self {
            // Vec::sort_by is stable, so ties keep their prior order.
            Rows::Records(records) => records.sort_by(|a, b| multi_key_cmp(keys, a, b)),
            Rows::Projected(values) => values.sort_by(|a, b| {
                let empty = Fields::new();
                let af = a.as_map().unwrap_or(&empty);
                let bf = b.as_map().unwrap_or(&empty);
                multi_key_cmp(keys, af, bf)
            }),
        }
    }

    fn skip(&mut self, n: usize) {
        match self {
            Rows::Records(records) => {
                records.drain(..n.min(records.len()));
            }
            Rows::Projected(values) => {
                values.drain(..n.min(values.len()));
            }
        }
    }

    fn take(&mut self, n: usize) {
        match self {
            Rows::Records(records) => records.truncate(n),
            Rows::Projected(values) => values.truncate(n),
        }
    }

    fn projected(self, projection: &Projection) -> Rows {
        match projection {
            Projection::Columns(columns) => {
                let narrow = |fields: Fields| -> Fields {
                    fields
                        .into_iter()
                        .filter(|(name, _)| columns.iter().any(|c| c == name))
                        .collect()
                };
                match self {
                    Rows::Records(records) => {
                        Rows::Records(records.into_iter().map(narrow).collect())
                    }
                    Rows::Projected(values) => Rows::Projected(
                        values
                            .into_iter()
                            .map(|value| match value {
                                Value::Map(fields) => Value::Map(narrow(fields)),
                                other => other,
                            })
                            .collect(),
                    ),
                }
            }
            Projection::Map(f) => match self {
                Rows::Records(records) => {
                    Rows::Projected(records.iter().map(|fields| f(fields)).collect())
                }
                Rows::Projected(values) => Rows::Projected(
                    values
                        .into_iter()
                        .map(|value| match value.as_map() {
                            Some(fields) => f(fields),
                            None => value,
                        })
                        .collect(),
                ),
            },
        }
    }

    fn distinct(&mut self, schema: &CompiledSchema) {
        let mut seen = BTreeSet::new();
        match self {
            Rows::Records(records) => {
                records.retain(|record| seen.insert(serialize_record(schema, record)));
            }
            Rows::Projected(values) => {
                values.retain(|value| seen.insert(value.clone()));
            }
        }
    }

    fn len(&self) -> usize {
        match self {
            Rows::Records(records) => records.len(),
            Rows::Projected(values) => values.len(),
        }
    }

    /// Extracts a property from every row that has it.
    fn extract(&self, property: &str) -> Vec<Value> {
        let from_fields = |fields: &Fields| fields.get(property).cloned();
        match self {
            Rows::Records(records) => records.iter().filter_map(from_fields).collect(),
            Rows::Projected(values) => values
                .iter()
                .filter_map(|value| value.as_map().and_then(from_fields))
                .collect(),
        }
    }

    fn aggregate(&self, kind: &AggregateKind) -> EngineResult<Value> {
        match kind {
            AggregateKind::Count => Ok(Value::Integer(self.len() as i64)),
            AggregateKind::Sum(property) => Ok(sum_values(&self.extract(property))),
            AggregateKind::Min { property, default } => {
                fold_extremum(&self.extract(property), default.as_ref(), |a, b| a < b)
            }
            AggregateKind::Max { property, default } => {
                fold_extremum(&self.extract(property), default.as_ref(), |a, b| a > b)
            }
        }
    }
}

fn sum_values(values: &[Value]) -> Value {
    let mut int_sum: i64 = 0;
    let mut float_sum: f64 = 0.0;
    let mut saw_float = false;
    for value in values {
        match value {
            Value::Integer(i) => int_sum = int_sum.wrapping_add(*i),
            Value::Float(f) => {
                saw_float = true;
                float_sum += f;
            }
            _ => {}
        }
    }
    if saw_float {
        Value::Float(float_sum + int_sum as f64)
    } else {
        // Empty source sums to zero.
        Value::Integer(int_sum)
    }
}

fn fold_extremum(
    values: &[Value],
    default: Option<&Value>,
    better: impl Fn(&Value, &Value) -> bool,
) -> EngineResult<Value> {
    let mut best: Option<&Value> = None;
    for value in values {
        if value.is_null() {
            continue;
        }
        match best {
            Some(current) if !better(value, current) => {}
            _ => best = Some(value),
        }
    }
    match (best, default) {
        (Some(value), _) => Ok(value.clone()),
        (None, Some(default)) => Ok(default.clone()),
        (None, None) => Err(EngineError::EmptySequence),
    }
}
