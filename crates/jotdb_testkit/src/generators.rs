//! Proptest strategies over the canonical value model.

use jotdb_schema::{Fields, Value};
use proptest::collection::{btree_map, vec};
use proptest::prelude::*;

/// A strategy over scalar values (no arrays or maps).
pub fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        // Finite floats only: NaN ordering is exercised separately.
        (-1.0e9f64..1.0e9).prop_map(Value::Float),
        "[a-zA-Z0-9 ]{0,16}".prop_map(Value::Text),
    ]
}

/// A strategy over arbitrarily nested values, depth-bounded.
pub fn arb_value() -> impl Strategy<Value = Value> {
    arb_scalar().prop_recursive(3, 24, 6, |inner| {
        prop_oneof![
            vec(inner.clone(), 0..6).prop_map(Value::Array),
            btree_map("[a-z]{1,8}", inner, 0..6).prop_map(Value::Map),
        ]
    })
}

/// A strategy over free-form field maps.
pub fn arb_fields() -> impl Strategy<Value = Fields> {
    btree_map("[a-z]{1,8}", arb_value(), 0..8)
}

/// A strategy over valid people payloads for the fixture schema.
pub fn arb_person() -> impl Strategy<Value = Fields> {
    ("[A-Z][a-z]{1,10}", 0i64..120).prop_map(|(name, age)| {
        let mut fields = Fields::new();
        fields.insert("name".to_string(), Value::Text(name));
        fields.insert("age".to_string(), Value::Integer(age));
        fields
    })
}
