//! Connector Framework operation types
//!
//! Types exchanged with the host on every call: identities, attribute sets,
//! attribute deltas, connector objects, query filters and per-call options.

use chrono::{DateTime, Utc};
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Attribute name carrying the remote-visible, mutable identifier.
pub const NAME: &str = "__NAME__";

/// Attribute name carrying the remote-assigned, immutable identifier.
pub const UID: &str = "__UID__";

/// Operational attribute toggling whether an account is enabled.
pub const ENABLE: &str = "__ENABLE__";

/// Mutable human-visible identifier (login for users, display name for groups).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Name(String);

impl Name {
    /// Create a new name.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the value.
    pub fn value(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier assigned by the target system.
///
/// A `Uid` may carry the last known [`Name`] of the object as a hint, which
/// lets connectors skip a read when they need the current name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Uid {
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name_hint: Option<Name>,
}

impl Uid {
    /// Create a UID without a name hint.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            name_hint: None,
        }
    }

    /// Create a UID carrying the last known name.
    pub fn with_name_hint(value: impl Into<String>, name: Name) -> Self {
        Self {
            value: value.into(),
            name_hint: Some(name),
        }
    }

    /// Get the value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Get the name hint, if any.
    pub fn name_hint(&self) -> Option<&Name> {
        self.name_hint.as_ref()
    }
}

// The hint is advisory; two UIDs are the same object when their values match.
impl PartialEq for Uid {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for Uid {}

impl std::hash::Hash for Uid {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    /// A string value.
    String(String),
    /// A 64-bit integer value.
    Long(i64),
    /// A boolean value.
    Boolean(bool),
    /// An instant in time.
    DateTime(DateTime<Utc>),
}

impl AttributeValue {
    /// Get as a string if this is a string value.
    pub fn as_string(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as an integer if this is a long value.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            AttributeValue::Long(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as a boolean if this is a boolean value.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            AttributeValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as an instant if this is a date-time value.
    pub fn as_date_time(&self) -> Option<DateTime<Utc>> {
        match self {
            AttributeValue::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Short name of the value's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::String(_) => "string",
            AttributeValue::Long(_) => "long",
            AttributeValue::Boolean(_) => "boolean",
            AttributeValue::DateTime(_) => "datetime",
        }
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Long(i)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Boolean(b)
    }
}

impl From<DateTime<Utc>> for AttributeValue {
    fn from(dt: DateTime<Utc>) -> Self {
        AttributeValue::DateTime(dt)
    }
}

/// A set of attributes for create operations or search results.
///
/// Each name appears at most once and maps to its full, ordered value list.
/// Single-valued attributes hold a one-element list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeSet {
    attributes: BTreeMap<String, Vec<AttributeValue>>,
}

impl AttributeSet {
    /// Create a new empty attribute set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set all values of an attribute, replacing any previous values.
    pub fn set<V: Into<AttributeValue>>(
        &mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) {
        self.attributes
            .insert(name.into(), values.into_iter().map(Into::into).collect());
    }

    /// Set a single-valued attribute using builder pattern.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set(name, [value.into()]);
        self
    }

    /// Set a multi-valued attribute using builder pattern.
    pub fn with_values<V: Into<AttributeValue>>(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.set(name, values);
        self
    }

    /// Get all values of an attribute.
    pub fn get(&self, name: &str) -> Option<&[AttributeValue]> {
        self.attributes.get(name).map(Vec::as_slice)
    }

    /// Get the first value of an attribute.
    pub fn get_single(&self, name: &str) -> Option<&AttributeValue> {
        self.get(name).and_then(<[AttributeValue]>::first)
    }

    /// Get a single-valued string attribute.
    pub fn get_string(&self, name: &str) -> Option<&str> {
        self.get_single(name).and_then(AttributeValue::as_string)
    }

    /// Get every string value of a multi-valued attribute.
    pub fn get_strings(&self, name: &str) -> Option<Vec<&str>> {
        self.get(name)
            .map(|values| values.iter().filter_map(AttributeValue::as_string).collect())
    }

    /// Check if an attribute exists.
    pub fn has(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Remove an attribute.
    pub fn remove(&mut self, name: &str) -> Option<Vec<AttributeValue>> {
        self.attributes.remove(name)
    }

    /// Get all attribute names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    /// Get the number of attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Iterate over all attributes.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[AttributeValue])> {
        self.attributes
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }
}

impl FromIterator<(String, Vec<AttributeValue>)> for AttributeSet {
    fn from_iter<T: IntoIterator<Item = (String, Vec<AttributeValue>)>>(iter: T) -> Self {
        Self {
            attributes: iter.into_iter().collect(),
        }
    }
}

/// A change to one attribute during an update.
///
/// `values_to_replace = Some(vec![])` with no add/remove is a request to
/// clear the attribute, not a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDelta {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    values_to_add: Option<Vec<AttributeValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    values_to_remove: Option<Vec<AttributeValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    values_to_replace: Option<Vec<AttributeValue>>,
}

impl AttributeDelta {
    /// Replace every value of the attribute.
    pub fn replace<V: Into<AttributeValue>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self {
            name: name.into(),
            values_to_add: None,
            values_to_remove: None,
            values_to_replace: Some(values.into_iter().map(Into::into).collect()),
        }
    }

    /// Replace a single-valued attribute.
    pub fn replace_single(name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self::replace(name, [value.into()])
    }

    /// Clear the attribute.
    pub fn clear(name: impl Into<String>) -> Self {
        Self::replace::<AttributeValue>(name, [])
    }

    /// Add and/or remove individual values of a multi-valued attribute.
    pub fn add_remove<A: Into<AttributeValue>, R: Into<AttributeValue>>(
        name: impl Into<String>,
        add: impl IntoIterator<Item = A>,
        remove: impl IntoIterator<Item = R>,
    ) -> Self {
        let add: Vec<AttributeValue> = add.into_iter().map(Into::into).collect();
        let remove: Vec<AttributeValue> = remove.into_iter().map(Into::into).collect();
        Self {
            name: name.into(),
            values_to_add: (!add.is_empty()).then_some(add),
            values_to_remove: (!remove.is_empty()).then_some(remove),
            values_to_replace: None,
        }
    }

    /// Get the attribute name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Values to add, if any.
    pub fn values_to_add(&self) -> Option<&[AttributeValue]> {
        self.values_to_add.as_deref()
    }

    /// Values to remove, if any.
    pub fn values_to_remove(&self) -> Option<&[AttributeValue]> {
        self.values_to_remove.as_deref()
    }

    /// Replacement values, if this is a replace delta.
    pub fn values_to_replace(&self) -> Option<&[AttributeValue]> {
        self.values_to_replace.as_deref()
    }

    /// Check if this delta clears the attribute.
    pub fn is_clear(&self) -> bool {
        self.values_to_add.is_none()
            && self.values_to_remove.is_none()
            && self.values_to_replace.as_ref().is_some_and(Vec::is_empty)
    }
}

/// The set of attribute changes for one update call, keyed by attribute name.
///
/// Deserializing rejects a key that differs from the delta's own name and a
/// name given twice.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AttributeDeltaSet {
    deltas: BTreeMap<String, AttributeDelta>,
}

impl AttributeDeltaSet {
    /// Create a new empty delta set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a delta, returning the previous delta for the same attribute.
    pub fn insert(&mut self, delta: AttributeDelta) -> Option<AttributeDelta> {
        self.deltas.insert(delta.name.clone(), delta)
    }

    /// Insert a delta using builder pattern.
    pub fn with(mut self, delta: AttributeDelta) -> Self {
        self.insert(delta);
        self
    }

    /// Get the delta for an attribute.
    pub fn get(&self, name: &str) -> Option<&AttributeDelta> {
        self.deltas.get(name)
    }

    /// Check if there are no changes.
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// Get the number of changed attributes.
    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    /// Iterate over the deltas in attribute-name order.
    pub fn iter(&self) -> impl Iterator<Item = &AttributeDelta> {
        self.deltas.values()
    }
}

impl<'de> Deserialize<'de> for AttributeDeltaSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DeltaSetVisitor;

        impl<'de> Visitor<'de> for DeltaSetVisitor {
            type Value = AttributeDeltaSet;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a map of attribute name to attribute delta")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut set = AttributeDeltaSet::new();
                while let Some((key, delta)) = map.next_entry::<String, AttributeDelta>()? {
                    if key != delta.name {
                        return Err(de::Error::custom(format!(
                            "delta keyed '{key}' is for attribute '{}'",
                            delta.name
                        )));
                    }
                    if set.insert(delta).is_some() {
                        return Err(de::Error::custom(format!(
                            "attribute '{key}' appears more than once"
                        )));
                    }
                }
                Ok(set)
            }
        }

        deserializer.deserialize_map(DeltaSetVisitor)
    }
}

impl FromIterator<AttributeDelta> for AttributeDeltaSet {
    fn from_iter<T: IntoIterator<Item = AttributeDelta>>(iter: T) -> Self {
        let mut set = Self::new();
        for delta in iter {
            set.insert(delta);
        }
        set
    }
}

/// An object read from the target system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorObject {
    pub object_class: String,
    pub uid: Uid,
    pub name: Name,
    pub attributes: AttributeSet,
}

/// Query filter accepted by search operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Filter {
    /// Exact match on the remote identifier.
    Uid(Uid),
    /// Exact match on the name.
    Name(Name),
}

/// Per-call options supplied by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationOptions {
    /// Attributes the caller wants returned, in addition to the defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes_to_get: Option<Vec<String>>,

    /// Whether attributes returned by default are included.
    #[serde(default = "default_true")]
    pub return_default_attributes: bool,

    /// Page size hint for enumeration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
}

fn default_true() -> bool {
    true
}

impl Default for OperationOptions {
    fn default() -> Self {
        Self {
            attributes_to_get: None,
            return_default_attributes: true,
            page_size: None,
        }
    }
}

impl OperationOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request additional attributes.
    #[must_use]
    pub fn with_attributes_to_get<S: Into<String>>(
        mut self,
        names: impl IntoIterator<Item = S>,
    ) -> Self {
        self.attributes_to_get = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Exclude attributes returned by default.
    #[must_use]
    pub fn without_default_attributes(mut self) -> Self {
        self.return_default_attributes = false;
        self
    }

    /// Set the page size hint.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }
}
