//! # JotDB Schema
//!
//! Compiled schema descriptors and the canonical value model for JotDB.
//!
//! This crate is the leaf of the JotDB workspace. It provides:
//! - [`Value`] - the dynamic value type; its canonical ordering and
//!   equality are the *serialized form* every diff and distinct
//!   comparison in the engine uses
//! - [`PropertySchema`] and [`CompiledSchema`] - per-property metadata
//!   (key/identity/distinct/readonly/computed/tracked flags, defaults,
//!   serialize/deserialize hooks, validators) compiled into an immutable
//!   descriptor
//! - [`RecordKey`] - the identity of a record, extracted from its key
//!   properties in serialized form
//! - [`IdentityGenerator`] - per-instance generation of identity values
//!   (sequential, random, timestamp)
//!
//! ## Example
//!
//! ```
//! use jotdb_schema::{IdentityKind, PropertySchema, SchemaBuilder, Value};
//!
//! let schema = SchemaBuilder::new("people")
//!     .property(PropertySchema::text("id").key().identity(IdentityKind::Random))
//!     .property(PropertySchema::text("name"))
//!     .property(PropertySchema::integer("age").optional())
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(schema.key_names(), &["id".to_string()]);
//! assert!(schema.get("name").is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod identity;
mod key;
mod property;
mod schema;
mod value;

pub use error::{SchemaError, SchemaResult};
pub use identity::{IdentityGenerator, IdentityKind};
pub use key::RecordKey;
pub use property::{
    ComputeFn, ConvertFn, DefaultFn, PropertySchema, ValidateFn,
};
pub use schema::{CompiledSchema, SchemaBuilder};
pub use value::{Fields, TypeTag, Value};
