//! Compiled schema artifact.

use crate::error::{SchemaError, SchemaResult};
use crate::key::RecordKey;
use crate::property::PropertySchema;
use crate::value::Fields;
use std::collections::BTreeMap;

/// Builds a [`CompiledSchema`] from property declarations.
///
/// The builder is the only way to obtain a compiled schema, so every
/// schema in circulation has passed the compile-time checks (unique
/// property names, at least one key property, coherent flags).
#[derive(Debug)]
pub struct SchemaBuilder {
    name: String,
    properties: Vec<PropertySchema>,
}

impl SchemaBuilder {
    /// Starts a schema with the given collection name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
        }
    }

    /// Adds a property declaration.
    #[must_use]
    pub fn property(mut self, property: PropertySchema) -> Self {
        self.properties.push(property);
        self
    }

    /// Compiles the schema.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::DuplicateProperty`] if a name repeats
    /// - [`SchemaError::NoKeyProperty`] if no property is marked `key`
    /// - [`SchemaError::ConflictingFlags`] if a property is both
    ///   identity and computed, or computed without a compute function
    pub fn build(self) -> SchemaResult<CompiledSchema> {
        let mut properties: BTreeMap<String, PropertySchema> = BTreeMap::new();
        let mut key_names = Vec::new();

        for property in self.properties {
            if property.identity_kind().is_some() && property.compute_fn().is_some() {
                return Err(SchemaError::conflicting_flags(
                    property.name(),
                    "a property cannot be both identity and computed",
                ));
            }
            if property.is_key() {
                key_names.push(property.name().to_string());
            }
            let name = property.name().to_string();
            if properties.insert(name.clone(), property).is_some() {
                return Err(SchemaError::DuplicateProperty {
                    schema: self.name,
                    property: name,
                });
            }
        }

        if key_names.is_empty() {
            return Err(SchemaError::NoKeyProperty { schema: self.name });
        }

        Ok(CompiledSchema {
            name: self.name,
            properties,
            key_names,
        })
    }
}

/// An immutable, compiled record schema.
///
/// Maps property names to their metadata. The set of properties marked
/// `key` forms the record identity; [`CompiledSchema::key_of`] extracts
/// it from a record's fields in serialized form.
#[derive(Debug)]
pub struct CompiledSchema {
    name: String,
    properties: BTreeMap<String, PropertySchema>,
    key_names: Vec<String>,
}

impl CompiledSchema {
    /// Returns the collection name this schema describes.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a property by name.
    pub fn get(&self, name: &str) -> Option<&PropertySchema> {
        self.properties.get(name)
    }

    /// Returns `true` if the schema declares the property.
    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// Iterates over all properties in name order.
    pub fn properties(&self) -> impl Iterator<Item = &PropertySchema> {
        self.properties.values()
    }

    /// Returns the key property names, in declaration order.
    pub fn key_names(&self) -> &[String] {
        &self.key_names
    }

    /// Extracts the record key from a record's fields.
    ///
    /// Key values are taken in serialized form so a custom serialize
    /// hook on a key property yields the same identity the diff engine
    /// sees.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::MissingKeyValue`] if any key property has
    /// no value.
    pub fn key_of(&self, fields: &Fields) -> SchemaResult<RecordKey> {
        let mut values = Vec::with_capacity(self.key_names.len());
        for name in &self.key_names {
            let property = self
                .properties
                .get(name)
                .unwrap_or_else(|| unreachable!("key name always resolves"));
            match fields.get(name) {
                Some(value) if !value.is_null() => {
                    values.push(property.serialized(value));
                }
                _ => {
                    return Err(SchemaError::MissingKeyValue {
                        property: name.clone(),
                    })
                }
            }
        }
        Ok(RecordKey::new(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityKind;
    use crate::value::Value;

    fn people() -> CompiledSchema {
        SchemaBuilder::new("people")
            .property(PropertySchema::text("id").key().identity(IdentityKind::Random))
            .property(PropertySchema::text("name"))
            .property(PropertySchema::integer("age").optional())
            .build()
            .unwrap()
    }

    #[test]
    fn compiles_and_exposes_metadata() {
        let schema = people();
        assert_eq!(schema.name(), "people");
        assert_eq!(schema.key_names(), &["id".to_string()]);
        assert!(schema.get("age").unwrap().is_optional());
        assert!(!schema.contains("height"));
    }

    #[test]
    fn rejects_keyless_schema() {
        let err = SchemaBuilder::new("notes")
            .property(PropertySchema::text("body"))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::NoKeyProperty { .. }));
    }

    #[test]
    fn rejects_duplicate_property() {
        let err = SchemaBuilder::new("people")
            .property(PropertySchema::text("id").key())
            .property(PropertySchema::text("id"))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateProperty { .. }));
    }

    #[test]
    fn rejects_identity_computed_conflict() {
        let err = SchemaBuilder::new("people")
            .property(
                PropertySchema::text("id")
                    .key()
                    .identity(IdentityKind::Random)
                    .computed(|_| Value::Null),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::ConflictingFlags { .. }));
    }

    #[test]
    fn key_of_extracts_serialized_key() {
        let schema = SchemaBuilder::new("people")
            .property(
                PropertySchema::text("id").key().serialize_with(|v| {
                    match v.as_text() {
                        Some(s) => Value::Text(s.to_lowercase()),
                        None => v.clone(),
                    }
                }),
            )
            .property(PropertySchema::text("name"))
            .build()
            .unwrap();

        let mut fields = Fields::new();
        fields.insert("id".to_string(), Value::text("AB-1"));
        let key = schema.key_of(&fields).unwrap();
        assert_eq!(key.values(), &[Value::text("ab-1")]);
    }

    #[test]
    fn key_of_fails_without_key_value() {
        let schema = people();
        let fields = Fields::new();
        assert!(matches!(
            schema.key_of(&fields),
            Err(SchemaError::MissingKeyValue { .. })
        ));
    }
}
