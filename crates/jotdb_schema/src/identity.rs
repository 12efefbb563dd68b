//! Identity value generation.

use crate::value::{TypeTag, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Policy for generating identity-property values at add time.
///
/// The policy is declared on the schema; the engine applies it exactly
/// once per added record, before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    /// Monotonically increasing counter, per generator instance.
    Sequential,
    /// Random token (UUID v4).
    Random,
    /// Milliseconds since the Unix epoch at generation time.
    Timestamp,
}

/// Generates identity values.
///
/// State is per instance: each collection owns its own generator, so
/// sequential counters never leak across collections, sessions, or
/// tests.
#[derive(Debug)]
pub struct IdentityGenerator {
    next: AtomicU64,
}

impl IdentityGenerator {
    /// Creates a generator with its sequential counter at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Generates an identity value of the given kind, shaped to fit the
    /// property's type tag (integer properties get integers, everything
    /// else gets text).
    pub fn generate(&self, kind: IdentityKind, tag: TypeTag) -> Value {
        match kind {
            IdentityKind::Sequential => {
                let n = self.next.fetch_add(1, Ordering::Relaxed);
                match tag {
                    TypeTag::Integer => Value::Integer(n as i64),
                    _ => Value::Text(n.to_string()),
                }
            }
            IdentityKind::Random => {
                let id = Uuid::new_v4();
                match tag {
                    TypeTag::Integer => {
                        Value::Integer((id.as_u128() & i64::MAX as u128) as i64)
                    }
                    _ => Value::Text(id.to_string()),
                }
            }
            IdentityKind::Timestamp => {
                let ms = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis() as i64)
                    .unwrap_or(0);
                match tag {
                    TypeTag::Text => Value::Text(ms.to_string()),
                    _ => Value::Integer(ms),
                }
            }
        }
    }
}

impl Default for IdentityGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_counts_up() {
        let gen = IdentityGenerator::new();
        assert_eq!(
            gen.generate(IdentityKind::Sequential, TypeTag::Integer),
            Value::Integer(1)
        );
        assert_eq!(
            gen.generate(IdentityKind::Sequential, TypeTag::Integer),
            Value::Integer(2)
        );
    }

    #[test]
    fn sequential_text_form() {
        let gen = IdentityGenerator::new();
        assert_eq!(
            gen.generate(IdentityKind::Sequential, TypeTag::Text),
            Value::text("1")
        );
    }

    #[test]
    fn counters_are_per_instance() {
        let a = IdentityGenerator::new();
        let b = IdentityGenerator::new();
        a.generate(IdentityKind::Sequential, TypeTag::Integer);
        assert_eq!(
            b.generate(IdentityKind::Sequential, TypeTag::Integer),
            Value::Integer(1)
        );
    }

    #[test]
    fn random_is_nonempty_and_distinct() {
        let gen = IdentityGenerator::new();
        let a = gen.generate(IdentityKind::Random, TypeTag::Text);
        let b = gen.generate(IdentityKind::Random, TypeTag::Text);
        assert!(!a.as_text().unwrap().is_empty());
        assert_ne!(a, b);
    }

    #[test]
    fn timestamp_is_positive_integer() {
        let gen = IdentityGenerator::new();
        let v = gen.generate(IdentityKind::Timestamp, TypeTag::Integer);
        assert!(v.as_integer().unwrap() > 0);
    }
}
