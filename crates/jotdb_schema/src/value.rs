//! Dynamic value type with canonical ordering.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// The fields of a record: property name to value.
///
/// `BTreeMap` keeps property order canonical, so two records with the
/// same contents compare equal regardless of assignment order.
pub type Fields = BTreeMap<String, Value>;

/// Type tag for a schema property.
///
/// Every property declares the shape of value it holds; `Session::add`
/// checks supplied values against the tag before staging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypeTag {
    /// Boolean.
    Bool,
    /// Signed 64-bit integer.
    Integer,
    /// 64-bit float.
    Float,
    /// UTF-8 text.
    Text,
    /// Ordered list of values.
    Array,
    /// Nested record (string-keyed map).
    Object,
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeTag::Bool => "bool",
            TypeTag::Integer => "integer",
            TypeTag::Float => "float",
            TypeTag::Text => "text",
            TypeTag::Array => "array",
            TypeTag::Object => "object",
        };
        f.write_str(name)
    }
}

/// A dynamic value.
///
/// This is the currency of the whole engine: record fields, query
/// parameters, diff entries, and plugin payloads are all `Value` trees.
/// Equality and ordering are total and canonical - floats compare via
/// `total_cmp`, and integers and floats are distinct types (an
/// `Integer(1)` is never equal to a `Float(1.0)`), so `Eq`/`Ord` are
/// consistent and values can key ordered collections.
#[derive(Debug, Clone)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Floating-point value.
    Float(f64),
    /// Text string.
    Text(String),
    /// Array of values.
    Array(Vec<Value>),
    /// Nested record.
    Map(Fields),
}

impl Value {
    /// Creates a text value.
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    /// Creates a map value from key/value pairs.
    pub fn map(pairs: impl IntoIterator<Item = (String, Value)>) -> Self {
        Value::Map(pairs.into_iter().collect())
    }

    /// Returns the type tag of this value, or `None` for null.
    pub fn tag(&self) -> Option<TypeTag> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(TypeTag::Bool),
            Value::Integer(_) => Some(TypeTag::Integer),
            Value::Float(_) => Some(TypeTag::Float),
            Value::Text(_) => Some(TypeTag::Text),
            Value::Array(_) => Some(TypeTag::Array),
            Value::Map(_) => Some(TypeTag::Object),
        }
    }

    /// Returns `true` if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean content, if this is a bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer content, if this is an integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the float content, if this is a float.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the text content, if this is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the array content, if this is an array.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the map content, if this is a map.
    pub fn as_map(&self) -> Option<&Fields> {
        match self {
            Value::Map(fields) => Some(fields),
            _ => None,
        }
    }

    /// Rank used to order values of different types.
    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Integer(_) => 2,
            Value::Float(_) => 3,
            Value::Text(_) => 4,
            Value::Array(_) => 5,
            Value::Map(_) => 6,
        }
    }

    /// Compares two values in canonical order.
    ///
    /// Values of different types order by type rank; same-typed values
    /// order by content. This is the ordering `sort` and `distinct` use.
    pub fn cmp_canonical(&self, other: &Self) -> Ordering {
        let rank = self.type_rank().cmp(&other.type_rank());
        if rank != Ordering::Equal {
            return rank;
        }

        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => {
                for (av, bv) in a.iter().zip(b.iter()) {
                    let ord = av.cmp_canonical(bv);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Map(a), Value::Map(b)) => {
                for ((ak, av), (bk, bv)) in a.iter().zip(b.iter()) {
                    let key_ord = ak.cmp(bk);
                    if key_ord != Ordering::Equal {
                        return key_ord;
                    }
                    let val_ord = av.cmp_canonical(bv);
                    if val_ord != Ordering::Equal {
                        return val_ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            // Unreachable: same type rank implies same variant.
            _ => Ordering::Equal,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp_canonical(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_canonical(other)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(fields) => {
                f.write_str("{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn equality_is_structural() {
        let a = Value::map([
            ("name".to_string(), Value::text("Ann")),
            ("age".to_string(), Value::Integer(30)),
        ]);
        let b = Value::map([
            ("age".to_string(), Value::Integer(30)),
            ("name".to_string(), Value::text("Ann")),
        ]);
        assert_eq!(a, b);
    }

    #[test]
    fn integer_and_float_are_distinct() {
        assert_ne!(Value::Integer(1), Value::Float(1.0));
    }

    #[test]
    fn nan_equals_itself() {
        // total_cmp gives NaN a fixed position, so Eq holds.
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
    }

    #[test]
    fn ordering_by_type_rank() {
        assert!(Value::Null < Value::Bool(false));
        assert!(Value::Bool(true) < Value::Integer(i64::MIN));
        assert!(Value::Integer(i64::MAX) < Value::Text(String::new()));
    }

    #[test]
    fn array_ordering_is_elementwise() {
        let a = Value::Array(vec![Value::Integer(1), Value::Integer(2)]);
        let b = Value::Array(vec![Value::Integer(1), Value::Integer(3)]);
        let c = Value::Array(vec![Value::Integer(1)]);
        assert!(a < b);
        assert!(c < a);
    }

    #[test]
    fn tag_reports_variant() {
        assert_eq!(Value::Integer(0).tag(), Some(TypeTag::Integer));
        assert_eq!(Value::Null.tag(), None);
        assert_eq!(Value::map([]).tag(), Some(TypeTag::Object));
    }

    fn value_strategy() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Integer),
            any::<f64>().prop_map(Value::Float),
            "[a-z]{0,8}".prop_map(Value::Text),
        ];
        leaf.prop_recursive(3, 32, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,4}", inner, 0..4).prop_map(Value::Map),
            ]
        })
    }

    proptest! {
        #[test]
        fn ordering_is_total_and_reflexive(a in value_strategy(), b in value_strategy()) {
            prop_assert_eq!(a.cmp_canonical(&a), Ordering::Equal);
            prop_assert_eq!(a.cmp_canonical(&b), b.cmp_canonical(&a).reverse());
        }
    }
}
