use std::{fmt, sync::Arc};

use serde_json::{Map, Value};

use super::Command;
use crate::error::{DebuggerError, Result};
use crate::evaluation::{
    parse_descriptor, resolve_graph, EvaluationOutcome, EvaluationResultFactory, HandleTable,
    ResolveRoot,
};
use crate::wire::Response;

/// `evaluate`: evaluate an expression in a stack frame (or the global scope).
pub struct EvaluateCommand {
    expression: String,
    frame: Option<u32>,
    global: bool,
    max_string_length: Option<usize>,
    factory: Arc<dyn EvaluationResultFactory>,
}

impl EvaluateCommand {
    pub fn new(
        factory: Arc<dyn EvaluationResultFactory>,
        expression: impl Into<String>,
    ) -> Result<Self> {
        let expression = expression.into();
        if expression.trim().is_empty() {
            return Err(DebuggerError::InvalidArgument(
                "evaluate requires a non-empty expression".to_owned(),
            ));
        }
        Ok(Self {
            expression,
            frame: None,
            global: false,
            max_string_length: None,
            factory,
        })
    }

    /// Evaluate in the given frame of the paused stack (defaults to the top frame).
    pub fn in_frame(mut self, frame: u32) -> Self {
        self.frame = Some(frame);
        self.global = false;
        self
    }

    pub fn global(mut self) -> Self {
        self.global = true;
        self.frame = None;
        self
    }

    /// Ask the debuggee to truncate string values longer than `len`.
    pub fn with_max_string_length(mut self, len: usize) -> Self {
        self.max_string_length = Some(len);
        self
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }
}

impl fmt::Debug for EvaluateCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluateCommand")
            .field("expression", &self.expression)
            .field("frame", &self.frame)
            .field("global", &self.global)
            .finish_non_exhaustive()
    }
}

impl Command for EvaluateCommand {
    type Output = EvaluationOutcome;

    fn name(&self) -> &'static str {
        "evaluate"
    }

    fn arguments(&self) -> Option<Value> {
        let mut arguments = Map::new();
        arguments.insert("expression".into(), Value::from(self.expression.as_str()));
        if let Some(frame) = self.frame {
            arguments.insert("frame".into(), Value::from(frame));
        }
        if self.global {
            arguments.insert("global".into(), Value::Bool(true));
        }
        arguments.insert("disable_break".into(), Value::Bool(true));
        if let Some(len) = self.max_string_length {
            arguments.insert("maxStringLength".into(), Value::from(len));
        }
        Some(Value::Object(arguments))
    }

    fn process_response(&self, response: &Response) -> Result<EvaluationOutcome> {
        resolve_value(
            response.body()?,
            response,
            &self.expression,
            self.factory.as_ref(),
        )
    }
}

/// Resolve a single descriptor (plus the reply's `refs`) into an [`EvaluationOutcome`] rooted
/// at `name`.
pub(super) fn resolve_value(
    value: &Value,
    response: &Response,
    name: &str,
    factory: &dyn EvaluationResultFactory,
) -> Result<EvaluationOutcome> {
    let descriptor = parse_descriptor(value, "value descriptor")?;
    let root = descriptor.handle;
    let mut table = HandleTable::from_refs(response.refs()?)?;
    table.insert(descriptor);

    let graph = resolve_graph(&[ResolveRoot::named(root, name)], &table, factory);
    let result = graph
        .get(root)
        .cloned()
        .ok_or_else(|| DebuggerError::protocol(format!("handle {root} was not resolved")))?;
    Ok(EvaluationOutcome { result, graph })
}
