//! Connector Framework schema types
//!
//! Types describing what a connector exposes to the host: object classes and
//! the attributes each one carries, with their create/update/read visibility.

use serde::{Deserialize, Serialize};

/// Host name for the account object class.
pub const ACCOUNT_OBJECT_CLASS: &str = "__ACCOUNT__";

/// Host name for the group object class.
pub const GROUP_OBJECT_CLASS: &str = "__GROUP__";

/// Schema of a target system.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// The object classes available in this schema.
    pub object_classes: Vec<ObjectClassInfo>,
}

impl Schema {
    /// Create a new empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object class using builder pattern.
    #[must_use]
    pub fn with_object_class(mut self, object_class: ObjectClassInfo) -> Self {
        self.object_classes.push(object_class);
        self
    }

    /// Get an object class by name.
    pub fn get_object_class(&self, name: &str) -> Option<&ObjectClassInfo> {
        self.object_classes.iter().find(|oc| oc.name == name)
    }

    /// Get all object class names.
    pub fn object_class_names(&self) -> Vec<&str> {
        self.object_classes.iter().map(|oc| oc.name.as_str()).collect()
    }
}

/// An object class and its attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectClassInfo {
    /// Name the host uses for this object class.
    pub name: String,

    /// Attributes in declaration order.
    pub attributes: Vec<AttributeInfo>,
}

impl ObjectClassInfo {
    /// Create a new object class with no attributes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    /// Add an attribute using builder pattern.
    #[must_use]
    pub fn with_attribute(mut self, attribute: AttributeInfo) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Get an attribute by name.
    pub fn get_attribute(&self, name: &str) -> Option<&AttributeInfo> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Attributes that must be supplied on create.
    pub fn required_attributes(&self) -> Vec<&AttributeInfo> {
        self.attributes.iter().filter(|a| a.required).collect()
    }
}

/// Attribute metadata as seen by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeInfo {
    /// Attribute name used in attribute sets and deltas.
    pub name: String,

    /// Field name in the target system.
    pub native_name: String,

    /// Data type of the attribute values.
    pub data_type: AttributeDataType,

    #[serde(default)]
    pub multi_valued: bool,

    #[serde(default)]
    pub required: bool,

    #[serde(default = "default_true")]
    pub creatable: bool,

    #[serde(default = "default_true")]
    pub updatable: bool,

    #[serde(default = "default_true")]
    pub readable: bool,

    /// Whether the attribute is returned when the caller does not ask for it.
    #[serde(default = "default_true")]
    pub returned_by_default: bool,

    /// Whether values compare case-insensitively.
    #[serde(default)]
    pub case_insensitive: bool,
}

fn default_true() -> bool {
    true
}

/// Data type for schema attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeDataType {
    /// String/text value.
    String,
    /// 64-bit integer value.
    Long,
    /// Boolean value.
    Boolean,
    /// Timezone-qualified instant.
    DateTime,
}

impl AttributeDataType {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeDataType::String => "string",
            AttributeDataType::Long => "long",
            AttributeDataType::Boolean => "boolean",
            AttributeDataType::DateTime => "datetime",
        }
    }
}

impl std::fmt::Display for AttributeDataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
