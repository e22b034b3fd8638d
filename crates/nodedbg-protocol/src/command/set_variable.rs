use std::{fmt, sync::Arc};

use serde_json::{json, Value};

use super::{evaluate::resolve_value, Command};
use crate::error::{DebuggerError, Result};
use crate::evaluation::{EvaluationOutcome, EvaluationResultFactory};
use crate::types::Handle;
use crate::wire::Response;

/// Value to assign with [`SetVariableValueCommand`].
#[derive(Debug, Clone, PartialEq)]
pub enum NewValue {
    /// An existing debuggee value.
    Handle(Handle),
    Undefined,
    /// A JSON primitive: `null`, boolean, number or string.
    Primitive(Value),
}

impl NewValue {
    fn to_json(&self) -> Value {
        match self {
            NewValue::Handle(handle) => json!({ "handle": handle }),
            NewValue::Undefined => json!({ "type": "undefined" }),
            NewValue::Primitive(value) => {
                let type_tag = match value {
                    Value::Null => "null",
                    Value::Bool(_) => "boolean",
                    Value::Number(_) => "number",
                    _ => "string",
                };
                json!({ "type": type_tag, "value": value })
            }
        }
    }
}

/// `setVariableValue`: assign a new value to a variable of a scope in a paused frame.
pub struct SetVariableValueCommand {
    name: String,
    new_value: NewValue,
    scope_number: u32,
    frame_number: u32,
    factory: Arc<dyn EvaluationResultFactory>,
}

impl SetVariableValueCommand {
    pub fn new(
        factory: Arc<dyn EvaluationResultFactory>,
        name: impl Into<String>,
        new_value: NewValue,
        scope_number: u32,
        frame_number: u32,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(DebuggerError::InvalidArgument(
                "variable name must not be empty".to_owned(),
            ));
        }
        if let NewValue::Primitive(Value::Array(_) | Value::Object(_)) = new_value {
            return Err(DebuggerError::InvalidArgument(
                "only primitive values can be assigned inline".to_owned(),
            ));
        }
        Ok(Self {
            name,
            new_value,
            scope_number,
            frame_number,
            factory,
        })
    }
}

impl fmt::Debug for SetVariableValueCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetVariableValueCommand")
            .field("name", &self.name)
            .field("new_value", &self.new_value)
            .field("scope_number", &self.scope_number)
            .field("frame_number", &self.frame_number)
            .finish_non_exhaustive()
    }
}

impl Command for SetVariableValueCommand {
    type Output = EvaluationOutcome;

    fn name(&self) -> &'static str {
        "setVariableValue"
    }

    fn arguments(&self) -> Option<Value> {
        Some(json!({
            "name": self.name,
            "newValue": self.new_value.to_json(),
            "scope": {
                "number": self.scope_number,
                "frameNumber": self.frame_number,
            },
        }))
    }

    fn process_response(&self, response: &Response) -> Result<EvaluationOutcome> {
        let new_value = response
            .body()?
            .get("newValue")
            .ok_or_else(|| DebuggerError::protocol("setVariableValue body has no `newValue`"))?;
        resolve_value(new_value, response, &self.name, self.factory.as_ref())
    }
}
