use serde_json::{json, Value};

use super::Command;
use crate::error::{DebuggerError, Result};
use crate::wire::Response;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    In,
    Next,
    Out,
}

impl StepAction {
    pub fn as_str(self) -> &'static str {
        match self {
            StepAction::In => "in",
            StepAction::Next => "next",
            StepAction::Out => "out",
        }
    }
}

/// `continue`: resume the debuggee, optionally stepping.
#[derive(Debug, Clone, Default)]
pub struct ContinueCommand {
    step: Option<(StepAction, u32)>,
}

impl ContinueCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(action: StepAction, count: u32) -> Result<Self> {
        if count == 0 {
            return Err(DebuggerError::InvalidArgument(
                "step count must be at least 1".to_owned(),
            ));
        }
        Ok(Self {
            step: Some((action, count)),
        })
    }
}

impl Command for ContinueCommand {
    /// Whether the debuggee reports itself as running after the command.
    type Output = bool;

    fn name(&self) -> &'static str {
        "continue"
    }

    fn arguments(&self) -> Option<Value> {
        self.step.map(|(action, count)| {
            json!({
                "stepaction": action.as_str(),
                "stepcount": count,
            })
        })
    }

    fn process_response(&self, response: &Response) -> Result<bool> {
        Ok(response.running.unwrap_or(true))
    }
}
