use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use crate::types::Handle;

/// Wire-level description of one debuggee value, as found in a reply `body` or in `refs`.
///
/// Primitives carry their value inline; composite values (objects, arrays, functions, ...)
/// list their children as [`PropertyDescriptor`]s that point at other handles.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawVariableDescriptor {
    pub handle: Handle,
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    /// String length (for strings whose `value` may have been truncated by the debuggee).
    #[serde(default)]
    pub length: Option<u64>,
    /// Function name.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub inferred_name: Option<String>,
    #[serde(default)]
    pub properties: Vec<PropertyDescriptor>,
}

impl RawVariableDescriptor {
    /// `true` for values that can never have children.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self.type_tag.as_str(),
            "undefined" | "null" | "boolean" | "number" | "string" | "symbol"
        )
    }

    pub fn properties(&self) -> &[PropertyDescriptor] {
        if self.is_primitive() {
            return &[];
        }
        &self.properties
    }

    /// Find a property by name (e.g. `length` on arrays).
    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties()
            .iter()
            .find(|property| matches!(&property.name, PropertyName::Name(n) if n == name))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDescriptor {
    pub name: PropertyName,
    #[serde(rename = "ref")]
    pub reference: Handle,
    #[serde(default)]
    pub property_type: Option<i64>,
    #[serde(default)]
    pub attributes: Option<i64>,
}

/// Property names are strings, except array elements which the debuggee reports as integers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(untagged)]
pub enum PropertyName {
    Index(i64),
    Name(String),
}

impl PropertyName {
    pub fn as_index(&self) -> Option<i64> {
        match self {
            PropertyName::Index(index) => Some(*index),
            PropertyName::Name(name) => name.parse().ok(),
        }
    }
}

impl fmt::Display for PropertyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyName::Index(index) => write!(f, "{index}"),
            PropertyName::Name(name) => f.write_str(name),
        }
    }
}
