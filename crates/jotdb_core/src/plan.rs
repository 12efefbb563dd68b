//! Query plans and the expression builder.
//!
//! A [`Query`] is an ordered list of typed operations built fluently.
//! Every chainable call returns a new plan extended by one operation;
//! the original plan is never mutated, so partially built queries can
//! be reused and branched safely.
//!
//! Filters come in two forms, mirroring the pushdown split:
//!
//! - [`Query::filter`] takes a [`Predicate`] over literal or named
//!   parameters plus a parameter bag. These are **plugin-evaluable**: a
//!   plugin that declares filter support executes them itself.
//! - [`Query::filter_with`] takes an opaque closure. These are
//!   **local-only**: the engine materializes the full collection from
//!   the plugin and filters in memory, at full-scan cost.

use crate::error::{EngineError, EngineResult};
use jotdb_schema::{Fields, Value};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Direction of a sort operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// An operand of a comparison: a literal value or a named parameter
/// resolved against the filter's parameter bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// A literal value.
    Literal(Value),
    /// A reference into the parameter bag.
    Param(String),
}

impl Operand {
    /// Shorthand for a literal operand.
    pub fn lit(value: impl Into<Value>) -> Self {
        Operand::Literal(value.into())
    }

    /// Shorthand for a parameter reference.
    pub fn param(name: impl Into<String>) -> Self {
        Operand::Param(name.into())
    }

    fn resolve<'a>(&'a self, params: &'a Fields) -> EngineResult<&'a Value> {
        match self {
            Operand::Literal(value) => Ok(value),
            Operand::Param(name) => {
                params
                    .get(name)
                    .ok_or_else(|| EngineError::UnboundParameter { name: name.clone() })
            }
        }
    }
}

/// A composable, plugin-evaluable predicate over record properties.
///
/// Comparisons use the canonical value ordering; a property absent from
/// a record compares as null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Property equals operand.
    Eq(String, Operand),
    /// Property differs from operand.
    Ne(String, Operand),
    /// Property is greater than operand.
    Gt(String, Operand),
    /// Property is greater than or equal to operand.
    Ge(String, Operand),
    /// Property is less than operand.
    Lt(String, Operand),
    /// Property is less than or equal to operand.
    Le(String, Operand),
    /// Text property contains the operand text, or array property
    /// contains the operand value.
    Contains(String, Operand),
    /// Text property starts with the operand text.
    StartsWith(String, Operand),
    /// All inner predicates hold.
    And(Vec<Predicate>),
    /// At least one inner predicate holds.
    Or(Vec<Predicate>),
    /// The inner predicate does not hold.
    Not(Box<Predicate>),
}

impl Predicate {
    /// Evaluates the predicate against a record.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnboundParameter`] if the predicate
    /// references a parameter missing from `params`.
    pub fn matches(&self, record: &Fields, params: &Fields) -> EngineResult<bool> {
        let field = |name: &str| record.get(name).unwrap_or(&Value::Null);
        match self {
            Predicate::Eq(p, o) => Ok(field(p) == o.resolve(params)?),
            Predicate::Ne(p, o) => Ok(field(p) != o.resolve(params)?),
            Predicate::Gt(p, o) => {
                Ok(field(p).cmp_canonical(o.resolve(params)?) == Ordering::Greater)
            }
            Predicate::Ge(p, o) => {
                Ok(field(p).cmp_canonical(o.resolve(params)?) != Ordering::Less)
            }
            Predicate::Lt(p, o) => {
                Ok(field(p).cmp_canonical(o.resolve(params)?) == Ordering::Less)
            }
            Predicate::Le(p, o) => {
                Ok(field(p).cmp_canonical(o.resolve(params)?) != Ordering::Greater)
            }
            Predicate::Contains(p, o) => {
                let needle = o.resolve(params)?;
                Ok(match (field(p), needle) {
                    (Value::Text(haystack), Value::Text(n)) => haystack.contains(n.as_str()),
                    (Value::Array(items), n) => items.iter().any(|item| item == n),
                    _ => false,
                })
            }
            Predicate::StartsWith(p, o) => {
                let prefix = o.resolve(params)?;
                Ok(match (field(p), prefix) {
                    (Value::Text(haystack), Value::Text(pre)) => haystack.starts_with(pre.as_str()),
                    _ => false,
                })
            }
            Predicate::And(inner) => {
                for predicate in inner {
                    if !predicate.matches(record, params)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Predicate::Or(inner) => {
                for predicate in inner {
                    if predicate.matches(record, params)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Predicate::Not(inner) => Ok(!inner.matches(record, params)?),
        }
    }

    /// Checks that every referenced parameter is present in the bag.
    pub fn check_bound(&self, params: &Fields) -> EngineResult<()> {
        match self {
            Predicate::Eq(_, o)
            | Predicate::Ne(_, o)
            | Predicate::Gt(_, o)
            | Predicate::Ge(_, o)
            | Predicate::Lt(_, o)
            | Predicate::Le(_, o)
            | Predicate::Contains(_, o)
            | Predicate::StartsWith(_, o) => o.resolve(params).map(|_| ()),
            Predicate::And(inner) | Predicate::Or(inner) => {
                inner.iter().try_for_each(|p| p.check_bound(params))
            }
            Predicate::Not(inner) => inner.check_bound(params),
        }
    }
}

/// An opaque local-only record predicate.
pub type RecordPredicate = Arc<dyn Fn(&Fields) -> bool + Send + Sync>;

/// An opaque local-only projector.
pub type Projector = Arc<dyn Fn(&Fields) -> Value + Send + Sync>;

/// A filter operation: pushable predicate or local closure.
#[derive(Clone)]
pub enum FilterOp {
    /// Plugin-evaluable: predicate algebra plus its parameter bag.
    Pushable {
        /// The predicate.
        predicate: Predicate,
        /// Named parameters the predicate resolves against.
        params: Fields,
    },
    /// Local-only: evaluated after full materialization.
    Local(RecordPredicate),
}

impl fmt::Debug for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterOp::Pushable { predicate, params } => f
                .debug_struct("Pushable")
                .field("predicate", predicate)
                .field("params", params)
                .finish(),
            FilterOp::Local(_) => f.write_str("Local(..)"),
        }
    }
}

/// A projection operation.
#[derive(Clone)]
pub enum Projection {
    /// Narrow records to the named properties. Record shape preserved.
    Columns(Vec<String>),
    /// Map each record through an opaque closure. Local-only.
    Map(Projector),
}

impl fmt::Debug for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Projection::Columns(cols) => f.debug_tuple("Columns").field(cols).finish(),
            Projection::Map(_) => f.write_str("Map(..)"),
        }
    }
}

/// A terminal scalar aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateKind {
    /// Number of records.
    Count,
    /// Sum of the property across records. Empty source sums to zero.
    Sum(String),
    /// Minimum of the property. Empty source yields the default, or
    /// fails with `EmptySequence` when no default is configured.
    Min {
        /// The property to minimize.
        property: String,
        /// Value produced for an empty source.
        default: Option<Value>,
    },
    /// Maximum of the property. Same empty-source behavior as `Min`.
    Max {
        /// The property to maximize.
        property: String,
        /// Value produced for an empty source.
        default: Option<Value>,
    },
}

/// One operation in a query plan.
///
/// Operation order is preserved and semantically significant: the
/// executor never reorders filters, sorts, or paging relative to each
/// other.
#[derive(Debug, Clone)]
pub enum PlanOp {
    /// Keep records matching the filter.
    Filter(FilterOp),
    /// Reshape records.
    Project(Projection),
    /// Order records by a property. Consecutive sorts compose into one
    /// stable multi-key sort, primary key first.
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
    /// Drop duplicates of the current projection shape, comparing
    /// serialized forms. First occurrence wins.
    Distinct,
    /// Reduce to a scalar. Terminal.
    Aggregate(AggregateKind),
}

/// Compares two records on an ordered list of sort keys.
///
/// Missing properties compare as null. Used by the local executor and
/// reusable by plugins that push sorts down, so both sides order
/// identically.
pub fn multi_key_cmp(keys: &[(String, SortDirection)], a: &Fields, b: &Fields) -> Ordering {
    for (property, direction) in keys {
        let av = a.get(property).unwrap_or(&Value::Null);
        let bv = b.get(property).unwrap_or(&Value::Null);
        let ord = av.cmp_canonical(bv);
        let ord = match direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// An immutable query plan.
///
/// ```
/// use jotdb_core::{Operand, Predicate, Query};
/// use jotdb_schema::Value;
///
/// let adults = Query::new().filter(
///     Predicate::Ge("age".into(), Operand::param("min")),
///     [("min".to_string(), Value::Integer(18))],
/// );
/// // Branch without touching `adults`:
/// let first_page = adults.sort("name").take(10);
/// assert_eq!(adults.ops().len(), 1);
/// assert_eq!(first_page.ops().len(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Query {
    ops: Vec<PlanOp>,
}

impl Query {
    /// Creates an empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the operations in order.
    pub fn ops(&self) -> &[PlanOp] {
        &self.ops
    }

    fn extended(&self, op: PlanOp) -> Self {
        let mut ops = self.ops.clone();
        ops.push(op);
        Self { ops }
    }

    /// Adds a plugin-evaluable filter with its parameter bag.
    #[must_use]
    pub fn filter(&self, predicate: Predicate, params: impl IntoIterator<Item = (String, Value)>) -> Self {
        self.extended(PlanOp::Filter(FilterOp::Pushable {
            predicate,
            params: params.into_iter().collect(),
        }))
    }

    /// Adds a local-only filter.
    ///
    /// The closure may capture anything, but the plugin cannot evaluate
    /// it: the engine materializes the full collection before filtering,
    /// a full-scan cost.
    #[must_use]
    pub fn filter_with(&self, f: impl Fn(&Fields) -> bool + Send + Sync + 'static) -> Self {
        self.extended(PlanOp::Filter(FilterOp::Local(Arc::new(f))))
    }

    /// Narrows records to the named properties.
    #[must_use]
    pub fn project(&self, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extended(PlanOp::Project(Projection::Columns(
            columns.into_iter().map(Into::into).collect(),
        )))
    }

    /// Maps each record through a closure. Local-only.
    #[must_use]
    pub fn project_with(&self, f: impl Fn(&Fields) -> Value + Send + Sync + 'static) -> Self {
        self.extended(PlanOp::Project(Projection::Map(Arc::new(f))))
    }

    /// Sorts ascending by a property. Cumulative: a later sort call
    /// refines ties left by earlier ones.
    #[must_use]
    pub fn sort(&self, property: impl Into<String>) -> Self {
        self.extended(PlanOp::Sort {
            property: property.into(),
            direction: SortDirection::Ascending,
        })
    }

    /// Sorts descending by a property.
    #[must_use]
    pub fn sort_desc(&self, property: impl Into<String>) -> Self {
        self.extended(PlanOp::Sort {
            property: property.into(),
            direction: SortDirection::Descending,
        })
    }

    /// Skips the first `n` records.
    #[must_use]
    pub fn skip(&self, n: usize) -> Self {
        self.extended(PlanOp::Skip(n))
    }

    /// Keeps at most `n` records.
    #[must_use]
    pub fn take(&self, n: usize) -> Self {
        self.extended(PlanOp::Take(n))
    }

    /// Drops duplicate results, comparing serialized forms.
    ///
    /// Distinct always evaluates on the projected shape: when the plan
    /// also projects, deduplication runs after the projection no matter
    /// where in the chain this call appears.
    #[must_use]
    pub fn distinct(&self) -> Self {
        self.extended(PlanOp::Distinct)
    }

    /// Counts records. Terminal.
    #[must_use]
    pub fn count(&self) -> Self {
        self.extended(PlanOp::Aggregate(AggregateKind::Count))
    }

    /// Sums a property. Terminal.
    #[must_use]
    pub fn sum(&self, property: impl Into<String>) -> Self {
        self.extended(PlanOp::Aggregate(AggregateKind::Sum(property.into())))
    }

    /// Minimum of a property. Terminal; empty source fails with
    /// `EmptySequence`.
    #[must_use]
    pub fn min(&self, property: impl Into<String>) -> Self {
        self.extended(PlanOp::Aggregate(AggregateKind::Min {
            property: property.into(),
            default: None,
        }))
    }

    /// Minimum of a property with a default for an empty source.
    #[must_use]
    pub fn min_or(&self, property: impl Into<String>, default: impl Into<Value>) -> Self {
        self.extended(PlanOp::Aggregate(AggregateKind::Min {
            property: property.into(),
            default: Some(default.into()),
        }))
    }

    /// Maximum of a property. Terminal; empty source fails with
    /// `EmptySequence`.
    #[must_use]
    pub fn max(&self, property: impl Into<String>) -> Self {
        self.extended(PlanOp::Aggregate(AggregateKind::Max {
            property: property.into(),
            default: None,
        }))
    }

    /// Maximum of a property with a default for an empty source.
    #[must_use]
    pub fn max_or(&self, property: impl Into<String>, default: impl Into<Value>) -> Self {
        self.extended(PlanOp::Aggregate(AggregateKind::Max {
            property: property.into(),
            default: Some(default.into()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, Value)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn plans_are_immutable() {
        let base = Query::new().sort("name");
        let extended = base.take(5);
        assert_eq!(base.ops().len(), 1);
        assert_eq!(extended.ops().len(), 2);
    }

    #[test]
    fn branching_shares_no_state() {
        let base = Query::new().filter(
            Predicate::Eq("kind".into(), Operand::lit("book")),
            [],
        );
        let by_name = base.sort("name");
        let by_price = base.sort_desc("price");
        assert_eq!(by_name.ops().len(), 2);
        assert_eq!(by_price.ops().len(), 2);
        assert_eq!(base.ops().len(), 1);
    }

    #[test]
    fn predicate_matches_with_params() {
        let r = record(&[("name", Value::text("Jane"))]);
        let p = Predicate::StartsWith("name".into(), Operand::param("prefix"));
        let params: Fields = [("prefix".to_string(), Value::text("Ja"))].into_iter().collect();
        assert!(p.matches(&r, &params).unwrap());
    }

    #[test]
    fn unbound_parameter_is_an_error() {
        let r = record(&[("name", Value::text("Jane"))]);
        let p = Predicate::Eq("name".into(), Operand::param("who"));
        assert!(matches!(
            p.matches(&r, &Fields::new()),
            Err(EngineError::UnboundParameter { .. })
        ));
        assert!(p.check_bound(&Fields::new()).is_err());
    }

    #[test]
    fn missing_property_compares_as_null() {
        let r = Fields::new();
        let p = Predicate::Eq("age".into(), Operand::lit(Value::Null));
        assert!(p.matches(&r, &Fields::new()).unwrap());
    }

    #[test]
    fn contains_on_text_and_array() {
        let r = record(&[
            ("title", Value::text("query pipelines")),
            ("tags", Value::Array(vec![Value::text("db"), Value::text("orm")])),
        ]);
        assert!(Predicate::Contains("title".into(), Operand::lit("pipe"))
            .matches(&r, &Fields::new())
            .unwrap());
        assert!(Predicate::Contains("tags".into(), Operand::lit("orm"))
            .matches(&r, &Fields::new())
            .unwrap());
        assert!(!Predicate::Contains("tags".into(), Operand::lit("sql"))
            .matches(&r, &Fields::new())
            .unwrap());
    }

    #[test]
    fn boolean_combinators() {
        let r = record(&[("age", Value::Integer(30))]);
        let p = Predicate::And(vec![
            Predicate::Ge("age".into(), Operand::lit(18i64)),
            Predicate::Not(Box::new(Predicate::Gt("age".into(), Operand::lit(65i64)))),
        ]);
        assert!(p.matches(&r, &Fields::new()).unwrap());
    }

    #[test]
    fn multi_key_cmp_orders_by_keys_in_turn() {
        let keys = vec![
            ("last".to_string(), SortDirection::Ascending),
            ("first".to_string(), SortDirection::Descending),
        ];
        let a = record(&[("last", Value::text("Doe")), ("first", Value::text("Ann"))]);
        let b = record(&[("last", Value::text("Doe")), ("first", Value::text("Zoe"))]);
        // Same last name, descending first name: Zoe before Ann.
        assert_eq!(multi_key_cmp(&keys, &a, &b), Ordering::Greater);
    }
}
