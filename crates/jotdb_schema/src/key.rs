//! Record identity.

use crate::value::Value;
use std::fmt;

/// The identity of a record: its key-property values in serialized form,
/// in key declaration order.
///
/// Record keys address tracked records in the collection cache and
/// change operations in a change set. Two records with equal keys refer
/// to the same stored record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RecordKey(Vec<Value>);

impl RecordKey {
    /// Creates a key from serialized key-property values.
    #[must_use]
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Returns the key-property values.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("key:")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}
