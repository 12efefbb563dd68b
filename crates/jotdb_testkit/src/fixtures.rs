//! Canned schemas and session helpers.

use jotdb_core::Session;
use jotdb_plugins::MemoryPlugin;
use jotdb_schema::{
    CompiledSchema, Fields, IdentityKind, PropertySchema, SchemaBuilder, Value,
};
use std::sync::Arc;

/// A people schema: random text identity, required name, optional age,
/// distinct nullable email.
pub fn people_schema() -> Arc<CompiledSchema> {
    Arc::new(
        SchemaBuilder::new("people")
            .property(PropertySchema::text("id").key().identity(IdentityKind::Random))
            .property(PropertySchema::text("name"))
            .property(PropertySchema::integer("age").optional().validate(|v| {
                match v.as_integer() {
                    Some(n) if n >= 0 => Ok(()),
                    Some(_) => Err("age must be non-negative".to_string()),
                    None => Ok(()),
                }
            }))
            .property(PropertySchema::text("email").optional().nullable().distinct())
            .build()
            .expect("fixture schema compiles"),
    )
}

/// An orders schema with a composite key and a tracked computed total.
pub fn orders_schema() -> Arc<CompiledSchema> {
    Arc::new(
        SchemaBuilder::new("orders")
            .property(PropertySchema::text("customer").key())
            .property(PropertySchema::integer("number").key())
            .property(PropertySchema::float("unit_price"))
            .property(PropertySchema::integer("quantity").default_value(Value::Integer(1)))
            .property(
                PropertySchema::float("total").tracked().computed(|f| {
                    let price = f.get("unit_price").and_then(Value::as_float).unwrap_or(0.0);
                    let quantity =
                        f.get("quantity").and_then(Value::as_integer).unwrap_or(0);
                    Value::Float(price * quantity as f64)
                }),
            )
            .build()
            .expect("fixture schema compiles"),
    )
}

/// Opens a session over a fresh in-memory plugin, returning both.
pub fn memory_session() -> (Session, Arc<MemoryPlugin>) {
    let plugin = Arc::new(MemoryPlugin::new());
    (Session::new(plugin.clone()), plugin)
}

/// Builds a person payload.
pub fn person(name: &str, age: i64) -> Fields {
    let mut fields = Fields::new();
    fields.insert("name".to_string(), Value::text(name));
    fields.insert("age".to_string(), Value::Integer(age));
    fields
}

/// Adds and commits `names` as people, returning the committed count.
///
/// # Panics
///
/// Panics if staging or commit fails; fixtures feed valid data.
pub fn seed_people(session: &Session, names: &[(&str, i64)]) -> usize {
    let people = session.collection(people_schema());
    let payloads = names.iter().map(|(n, a)| person(n, *a)).collect();
    people.add(payloads).expect("fixture people validate");
    session.commit().expect("fixture commit succeeds").adds
}
