//! Per-property schema metadata.

use crate::identity::IdentityKind;
use crate::value::{Fields, TypeTag, Value};
use std::fmt;
use std::sync::Arc;

/// Produces a default value for an omitted property.
pub type DefaultFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// Computes a derived value from the current record state.
pub type ComputeFn = Arc<dyn Fn(&Fields) -> Value + Send + Sync>;

/// Converts a value between its live and serialized forms.
pub type ConvertFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Validates a property value; returns a message on rejection.
pub type ValidateFn = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Metadata for one schema property.
///
/// Built fluently and consumed by [`crate::SchemaBuilder`]:
///
/// ```
/// use jotdb_schema::{IdentityKind, PropertySchema};
///
/// let id = PropertySchema::text("id").key().identity(IdentityKind::Random);
/// let age = PropertySchema::integer("age").optional().validate(|v| {
///     match v.as_integer() {
///         Some(n) if n >= 0 => Ok(()),
///         _ => Err("age must be non-negative".to_string()),
///     }
/// });
/// ```
#[derive(Clone)]
pub struct PropertySchema {
    name: String,
    tag: TypeTag,
    key: bool,
    identity: Option<IdentityKind>,
    distinct: bool,
    index: bool,
    optional: bool,
    nullable: bool,
    readonly: bool,
    tracked: bool,
    computed: Option<ComputeFn>,
    default: Option<DefaultFn>,
    serialize: Option<ConvertFn>,
    deserialize: Option<ConvertFn>,
    validators: Vec<ValidateFn>,
}

impl PropertySchema {
    /// Creates a property with the given name and type tag.
    pub fn new(name: impl Into<String>, tag: TypeTag) -> Self {
        Self {
            name: name.into(),
            tag,
            key: false,
            identity: None,
            distinct: false,
            index: false,
            optional: false,
            nullable: false,
            readonly: false,
            tracked: false,
            computed: None,
            default: None,
            serialize: None,
            deserialize: None,
            validators: Vec::new(),
        }
    }

    /// Creates a boolean property.
    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, TypeTag::Bool)
    }

    /// Creates an integer property.
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, TypeTag::Integer)
    }

    /// Creates a float property.
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, TypeTag::Float)
    }

    /// Creates a text property.
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, TypeTag::Text)
    }

    /// Creates an array property.
    pub fn array(name: impl Into<String>) -> Self {
        Self::new(name, TypeTag::Array)
    }

    /// Creates a nested-object property.
    pub fn object(name: impl Into<String>) -> Self {
        Self::new(name, TypeTag::Object)
    }

    /// Marks this property as part of the record key.
    ///
    /// Key properties are immutable after materialization.
    #[must_use]
    pub fn key(mut self) -> Self {
        self.key = true;
        self
    }

    /// Marks this property as engine-generated at add time.
    #[must_use]
    pub fn identity(mut self, kind: IdentityKind) -> Self {
        self.identity = Some(kind);
        self
    }

    /// Requires values of this property to be distinct across records.
    ///
    /// Enforcement before commit is best-effort against in-memory state;
    /// the storage plugin owns the real guarantee.
    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Requests a plugin-side index on this property.
    #[must_use]
    pub fn indexed(mut self) -> Self {
        self.index = true;
        self
    }

    /// Allows the property to be omitted at add time.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Allows the property to hold null.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Rejects assignments after materialization.
    #[must_use]
    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    /// Includes this property in diffs even when computed or identity.
    #[must_use]
    pub fn tracked(mut self) -> Self {
        self.tracked = true;
        self
    }

    /// Derives this property from the record state at diff time.
    #[must_use]
    pub fn computed(mut self, f: impl Fn(&Fields) -> Value + Send + Sync + 'static) -> Self {
        self.computed = Some(Arc::new(f));
        self
    }

    /// Supplies a default for omitted values.
    #[must_use]
    pub fn default_fn(mut self, f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(Arc::new(f));
        self
    }

    /// Supplies a constant default for omitted values.
    #[must_use]
    pub fn default_value(self, value: Value) -> Self {
        self.default_fn(move || value.clone())
    }

    /// Sets the serialize hook (live form to serialized form).
    #[must_use]
    pub fn serialize_with(mut self, f: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        self.serialize = Some(Arc::new(f));
        self
    }

    /// Sets the deserialize hook (stored form to live form).
    #[must_use]
    pub fn deserialize_with(mut self, f: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        self.deserialize = Some(Arc::new(f));
        self
    }

    /// Appends a validator. Validators run in registration order.
    #[must_use]
    pub fn validate(
        mut self,
        f: impl Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.validators.push(Arc::new(f));
        self
    }

    /// Returns the property name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the type tag.
    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    /// Returns `true` if this is a key property.
    pub fn is_key(&self) -> bool {
        self.key
    }

    /// Returns the identity policy, if any.
    pub fn identity_kind(&self) -> Option<IdentityKind> {
        self.identity
    }

    /// Returns `true` if values must be distinct across records.
    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// Returns `true` if a plugin-side index is requested.
    pub fn is_indexed(&self) -> bool {
        self.index
    }

    /// Returns `true` if the property may be omitted.
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Returns `true` if the property may be null.
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Returns `true` if assignments after materialization are rejected.
    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Returns `true` if the property participates in diffs even when
    /// computed or identity.
    pub fn is_tracked(&self) -> bool {
        self.tracked
    }

    /// Returns the computed-value function, if any.
    pub fn compute_fn(&self) -> Option<&ComputeFn> {
        self.computed.as_ref()
    }

    /// Returns the default-value function, if any.
    pub fn default_fn_ref(&self) -> Option<&DefaultFn> {
        self.default.as_ref()
    }

    /// Returns the registered validators.
    pub fn validators(&self) -> &[ValidateFn] {
        &self.validators
    }

    /// Applies the serialize hook, or clones the value when none is set.
    ///
    /// Diffing and key extraction always go through this, so custom
    /// serialized forms and the default structural form behave alike.
    pub fn serialized(&self, value: &Value) -> Value {
        match &self.serialize {
            Some(f) => f(value),
            None => value.clone(),
        }
    }

    /// Applies the deserialize hook, or clones the value when none is set.
    pub fn deserialized(&self, value: &Value) -> Value {
        match &self.deserialize {
            Some(f) => f(value),
            None => value.clone(),
        }
    }
}

impl fmt::Debug for PropertySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertySchema")
            .field("name", &self.name)
            .field("tag", &self.tag)
            .field("key", &self.key)
            .field("identity", &self.identity)
            .field("distinct", &self.distinct)
            .field("index", &self.index)
            .field("optional", &self.optional)
            .field("nullable", &self.nullable)
            .field("readonly", &self.readonly)
            .field("tracked", &self.tracked)
            .field("computed", &self.computed.is_some())
            .field("default", &self.default.is_some())
            .field("validators", &self.validators.len())
            .finish()
    }
}
