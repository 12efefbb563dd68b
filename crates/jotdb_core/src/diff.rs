//! Structural diffing of records against their snapshots.

use jotdb_schema::{CompiledSchema, Fields, Value};

/// Computes the property diff between a snapshot and the current state.
///
/// The result maps property names to their new **serialized** values
/// and contains a property if and only if its serialized form differs
/// between the two sides. An empty result means no update operation is
/// emitted for the record.
///
/// Rules, per property:
/// - `computed` without `tracked`: excluded - derived on read, never
///   persisted
/// - `computed` + `tracked`: the current value is recomputed from the
///   current record state before comparing, so persisted derived fields
///   update without the caller ever writing them
/// - `identity` without `tracked`: excluded - write-once, assigned at
///   add time
/// - everything else: serialize both sides with the property's hook
///   (default: deep structural form) and compare
///
/// Only schema-declared properties participate; anything else on the
/// record passes through undiffed.
pub fn diff(schema: &CompiledSchema, snapshot: &Fields, current: &Fields) -> Fields {
    let mut changes = Fields::new();

    for property in schema.properties() {
        let name = property.name();

        if property.identity_kind().is_some() && !property.is_tracked() {
            continue;
        }

        let current_value;
        let current_ref = if let Some(compute) = property.compute_fn() {
            if !property.is_tracked() {
                continue;
            }
            current_value = compute(current);
            &current_value
        } else {
            current.get(name).unwrap_or(&Value::Null)
        };

        let new_serialized = property.serialized(current_ref);
        let old_serialized =
            property.serialized(snapshot.get(name).unwrap_or(&Value::Null));

        if new_serialized != old_serialized {
            changes.insert(name.to_string(), new_serialized);
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use jotdb_schema::{IdentityKind, PropertySchema, SchemaBuilder};
    use proptest::prelude::*;

    fn fields(pairs: &[(&str, Value)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn basic_schema() -> CompiledSchema {
        SchemaBuilder::new("people")
            .property(PropertySchema::text("id").key())
            .property(PropertySchema::text("name"))
            .property(PropertySchema::integer("age").optional())
            .build()
            .unwrap()
    }

    #[test]
    fn identical_records_diff_empty() {
        let schema = basic_schema();
        let a = fields(&[("id", Value::text("1")), ("name", Value::text("Ann"))]);
        assert!(diff(&schema, &a, &a.clone()).is_empty());
    }

    #[test]
    fn changed_property_appears_with_new_value() {
        let schema = basic_schema();
        let old = fields(&[("id", Value::text("1")), ("name", Value::text("Ann"))]);
        let new = fields(&[("id", Value::text("1")), ("name", Value::text("Bea"))]);
        let d = diff(&schema, &old, &new);
        assert_eq!(d.len(), 1);
        assert_eq!(d.get("name"), Some(&Value::text("Bea")));
    }

    #[test]
    fn property_cleared_to_null_is_a_change() {
        let schema = basic_schema();
        let old = fields(&[("id", Value::text("1")), ("age", Value::Integer(30))]);
        let new = fields(&[("id", Value::text("1"))]);
        let d = diff(&schema, &old, &new);
        assert_eq!(d.get("age"), Some(&Value::Null));
    }

    #[test]
    fn non_schema_properties_are_ignored() {
        let schema = basic_schema();
        let old = fields(&[("id", Value::text("1")), ("scratch", Value::Integer(1))]);
        let new = fields(&[("id", Value::text("1")), ("scratch", Value::Integer(2))]);
        assert!(diff(&schema, &old, &new).is_empty());
    }

    #[test]
    fn serialize_hook_decides_equality() {
        let schema = SchemaBuilder::new("people")
            .property(PropertySchema::text("id").key())
            .property(PropertySchema::text("name").serialize_with(|v| {
                match v.as_text() {
                    Some(s) => Value::Text(s.to_lowercase()),
                    None => v.clone(),
                }
            }))
            .build()
            .unwrap();
        let old = fields(&[("id", Value::text("1")), ("name", Value::text("ann"))]);
        let new = fields(&[("id", Value::text("1")), ("name", Value::text("ANN"))]);
        // Same serialized form, so not a change.
        assert!(diff(&schema, &old, &new).is_empty());
    }

    #[test]
    fn computed_without_tracked_is_excluded() {
        let schema = SchemaBuilder::new("people")
            .property(PropertySchema::text("id").key())
            .property(PropertySchema::text("display").computed(|f| {
                Value::text(format!(
                    "~{}",
                    f.get("id").and_then(|v| v.as_text()).unwrap_or("")
                ))
            }))
            .build()
            .unwrap();
        let old = fields(&[("id", Value::text("1"))]);
        let new = fields(&[("id", Value::text("1"))]);
        assert!(diff(&schema, &old, &new).is_empty());
    }

    #[test]
    fn computed_tracked_is_recomputed_and_diffed() {
        let schema = SchemaBuilder::new("people")
            .property(PropertySchema::text("id").key())
            .property(PropertySchema::text("name"))
            .property(
                PropertySchema::integer("name_len")
                    .tracked()
                    .computed(|f| {
                        Value::Integer(
                            f.get("name").and_then(|v| v.as_text()).map_or(0, |s| s.len() as i64),
                        )
                    }),
            )
            .build()
            .unwrap();
        let old = fields(&[
            ("id", Value::text("1")),
            ("name", Value::text("Ann")),
            ("name_len", Value::Integer(3)),
        ]);
        let new = fields(&[("id", Value::text("1")), ("name", Value::text("Beatrice"))]);
        let d = diff(&schema, &old, &new);
        assert_eq!(d.get("name"), Some(&Value::text("Beatrice")));
        // Never written by the caller, derived from the new state.
        assert_eq!(d.get("name_len"), Some(&Value::Integer(8)));
    }

    #[test]
    fn identity_is_excluded_unless_tracked() {
        let schema = SchemaBuilder::new("people")
            .property(PropertySchema::text("id").key().identity(IdentityKind::Random))
            .property(PropertySchema::text("name"))
            .build()
            .unwrap();
        let old = fields(&[("name", Value::text("Ann"))]);
        let new = fields(&[("id", Value::text("gen-1")), ("name", Value::text("Ann"))]);
        assert!(diff(&schema, &old, &new).is_empty());

        let tracked = SchemaBuilder::new("people")
            .property(
                PropertySchema::text("id")
                    .key()
                    .identity(IdentityKind::Random)
                    .tracked(),
            )
            .property(PropertySchema::text("name"))
            .build()
            .unwrap();
        let d = diff(&tracked, &old, &new);
        assert_eq!(d.get("id"), Some(&Value::text("gen-1")));
    }

    proptest! {
        #[test]
        fn diff_of_identical_fields_is_always_empty(
            name in "[a-zA-Z]{0,12}",
            age in any::<i64>(),
        ) {
            let schema = basic_schema();
            let f = fields(&[
                ("id", Value::text("1")),
                ("name", Value::Text(name)),
                ("age", Value::Integer(age)),
            ]);
            prop_assert!(diff(&schema, &f, &f.clone()).is_empty());
        }
    }
}
