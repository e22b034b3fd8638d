use serde_json::Value;

use super::{
    ChildRef, ChildResolution, EvaluationResult, HandleTable, PropertyName, RawVariableDescriptor,
    ValueType,
};
use crate::types::Handle;

/// One node of a handle graph as handed to an [`EvaluationResultFactory`].
#[derive(Debug, Clone, Copy)]
pub struct NodeVariable<'a> {
    pub handle: Handle,
    /// Name under which the node was reached (property name, or the requested expression).
    pub name: Option<&'a str>,
    pub expression: Option<&'a str>,
    pub descriptor: &'a RawVariableDescriptor,
    /// Every descriptor of the reply being processed.
    pub table: &'a HandleTable,
}

/// Builds caller-facing results from raw descriptors.
///
/// Injected into commands so callers can substitute their own presentation (or a counting mock
/// in tests). Implementations must be pure: the resolver calls `create` exactly once per distinct
/// handle of a reply.
pub trait EvaluationResultFactory: Send + Sync {
    fn create(&self, variable: &NodeVariable<'_>) -> EvaluationResult;
}

/// Presentation matching what Node.js tooling usually shows: quoted strings, `[Function: f]`,
/// `Array[3]`, `{Object}`.
#[derive(Debug, Clone)]
pub struct DefaultEvaluationResultFactory {
    max_string_length: usize,
}

impl DefaultEvaluationResultFactory {
    pub const DEFAULT_MAX_STRING_LENGTH: usize = 10_000;

    pub fn new(max_string_length: usize) -> Self {
        Self { max_string_length }
    }

    fn display(&self, variable: &NodeVariable<'_>, value_type: ValueType) -> (String, Option<usize>) {
        let descriptor = variable.descriptor;
        match value_type {
            ValueType::Undefined => ("undefined".to_owned(), None),
            ValueType::Null => ("null".to_owned(), None),
            ValueType::String => {
                let text = match &descriptor.value {
                    Some(Value::String(text)) => text.as_str(),
                    _ => descriptor.text.as_deref().unwrap_or_default(),
                };
                let char_count = text.chars().count();
                let full_length = descriptor
                    .length
                    .and_then(|length| usize::try_from(length).ok())
                    .unwrap_or(char_count)
                    .max(char_count);
                let shown: String = text.chars().take(self.max_string_length).collect();
                let ellipsis = if full_length > char_count.min(self.max_string_length) {
                    "..."
                } else {
                    ""
                };
                (format!("\"{shown}{ellipsis}\""), Some(full_length))
            }
            ValueType::Boolean | ValueType::Number | ValueType::Symbol => {
                let display = match &descriptor.value {
                    Some(Value::String(text)) => text.clone(),
                    Some(value) if !value.is_null() => value.to_string(),
                    _ => descriptor.text.clone().unwrap_or_default(),
                };
                (display, None)
            }
            ValueType::Function => {
                let name = descriptor
                    .name
                    .as_deref()
                    .filter(|name| !name.is_empty())
                    .or_else(|| descriptor.inferred_name.as_deref().filter(|name| !name.is_empty()));
                match name {
                    Some(name) => (format!("[Function: {name}]"), None),
                    None => ("[Function]".to_owned(), None),
                }
            }
            ValueType::Array => (format!("Array[{}]", array_length(variable)), None),
            ValueType::Date | ValueType::RegExp | ValueType::Error => {
                let display = descriptor
                    .text
                    .clone()
                    .unwrap_or_else(|| format!("{{{}}}", class_name(descriptor)));
                (display, None)
            }
            ValueType::Object | ValueType::Unknown => {
                (format!("{{{}}}", class_name(descriptor)), None)
            }
        }
    }
}

impl Default for DefaultEvaluationResultFactory {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_STRING_LENGTH)
    }
}

impl EvaluationResultFactory for DefaultEvaluationResultFactory {
    fn create(&self, variable: &NodeVariable<'_>) -> EvaluationResult {
        let descriptor = variable.descriptor;
        let value_type = ValueType::of(descriptor);
        let (display_value, string_length) = self.display(variable, value_type);

        let children = descriptor
            .properties()
            .iter()
            .map(|property| ChildRef {
                name: property.name.to_string(),
                handle: property.reference,
                expression: variable
                    .expression
                    .map(|parent| child_expression(parent, &property.name)),
                resolution: if variable.table.contains(property.reference) {
                    ChildResolution::Resolved
                } else {
                    ChildResolution::Unresolved
                },
            })
            .collect();

        EvaluationResult {
            handle: variable.handle,
            name: variable.name.map(str::to_owned),
            expression: variable.expression.map(str::to_owned),
            value_type,
            type_name: descriptor
                .class_name
                .clone()
                .unwrap_or_else(|| descriptor.type_tag.clone()),
            display_value,
            string_length,
            children,
        }
    }
}

fn class_name(descriptor: &RawVariableDescriptor) -> &str {
    descriptor.class_name.as_deref().unwrap_or("Object")
}

/// Arrays report their length through a `length` property pointing at a number; fall back to
/// counting indexed properties.
fn array_length(variable: &NodeVariable<'_>) -> u64 {
    let from_property = variable
        .descriptor
        .property("length")
        .and_then(|property| variable.table.get(property.reference))
        .and_then(|length| length.value.as_ref())
        .and_then(Value::as_u64);
    from_property.unwrap_or_else(|| {
        variable
            .descriptor
            .properties()
            .iter()
            .filter(|property| matches!(property.name, PropertyName::Index(_)))
            .count() as u64
    })
}

/// `parent.child`, `parent[0]` or `parent["not an identifier"]`.
fn child_expression(parent: &str, name: &PropertyName) -> String {
    match name {
        PropertyName::Index(index) => format!("{parent}[{index}]"),
        PropertyName::Name(name) if is_identifier(name) => format!("{parent}.{name}"),
        PropertyName::Name(name) => {
            let quoted = serde_json::to_string(name).unwrap_or_else(|_| format!("\"{name}\""));
            format!("{parent}[{quoted}]")
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' || first == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}
