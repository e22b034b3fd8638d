use super::{RawVariableDescriptor, ResolvedGraph};
use crate::types::Handle;

/// Coarse classification of a debuggee value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Undefined,
    Null,
    Boolean,
    Number,
    String,
    Symbol,
    Object,
    Array,
    Function,
    RegExp,
    Error,
    Date,
    Unknown,
}

impl ValueType {
    pub fn of(descriptor: &RawVariableDescriptor) -> Self {
        match descriptor.type_tag.as_str() {
            "undefined" => ValueType::Undefined,
            "null" => ValueType::Null,
            "boolean" => ValueType::Boolean,
            "number" => ValueType::Number,
            "string" => ValueType::String,
            "symbol" => ValueType::Symbol,
            "function" => ValueType::Function,
            "regexp" => ValueType::RegExp,
            "error" => ValueType::Error,
            "object" => match descriptor.class_name.as_deref() {
                Some("Array") => ValueType::Array,
                Some("Date") => ValueType::Date,
                Some("RegExp") => ValueType::RegExp,
                Some("Error") => ValueType::Error,
                _ => ValueType::Object,
            },
            _ => ValueType::Unknown,
        }
    }

    /// Whether values of this type can carry children.
    pub fn is_composite(self) -> bool {
        matches!(
            self,
            ValueType::Object
                | ValueType::Array
                | ValueType::Function
                | ValueType::RegExp
                | ValueType::Error
                | ValueType::Date
        )
    }
}

/// Whether a child's handle had a descriptor in the reply that produced its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildResolution {
    Resolved,
    /// The debuggee did not describe this handle; a follow-up `lookup` can fetch it.
    Unresolved,
}

/// Reference from a composite result to one of its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildRef {
    pub name: String,
    pub handle: Handle,
    pub expression: Option<String>,
    pub resolution: ChildResolution,
}

impl ChildRef {
    pub fn is_resolved(&self) -> bool {
        self.resolution == ChildResolution::Resolved
    }
}

/// Caller-facing, immutable view of one debuggee value.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    pub handle: Handle,
    pub name: Option<String>,
    /// Expression that re-evaluates to this value, when one could be derived.
    pub expression: Option<String>,
    pub value_type: ValueType,
    /// Raw type name as reported by the debuggee (class name for objects).
    pub type_name: String,
    pub display_value: String,
    /// Full length of string values, even when `display_value` is truncated.
    pub string_length: Option<usize>,
    pub children: Vec<ChildRef>,
}

impl EvaluationResult {
    /// A bare result for `handle` with no display information.
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            name: None,
            expression: None,
            value_type: ValueType::Unknown,
            type_name: String::new(),
            display_value: String::new(),
            string_length: None,
            children: Vec::new(),
        }
    }

    pub fn is_expandable(&self) -> bool {
        !self.children.is_empty()
    }
}

/// Result of an `evaluate` command: the root value plus every node reachable from it that the
/// reply described.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationOutcome {
    pub result: EvaluationResult,
    pub graph: ResolvedGraph,
}

impl EvaluationOutcome {
    pub fn child(&self, name: &str) -> Option<&EvaluationResult> {
        let child = self.result.children.iter().find(|child| child.name == name)?;
        self.graph.resolve(child)
    }
}
