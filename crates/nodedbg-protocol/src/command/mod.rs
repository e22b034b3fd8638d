//! Commands that can be issued over a [`CommandChannel`](crate::CommandChannel).
//!
//! A command only knows how to describe itself on the wire and how to interpret the reply
//! addressed to it. Sequence ids, pending-state tracking and timeouts belong to the channel.

mod evaluate;
mod lookup;
mod resume;
mod set_variable;

use serde_json::Value;

use crate::error::Result;
use crate::wire::Response;

pub use evaluate::EvaluateCommand;
pub use lookup::{LookupCommand, LookupResults};
pub use resume::{ContinueCommand, StepAction};
pub use set_variable::{NewValue, SetVariableValueCommand};

/// One request/response exchange with the debuggee.
pub trait Command: Send {
    type Output: Send;

    /// Protocol command name (`"lookup"`, `"evaluate"`, ...).
    fn name(&self) -> &'static str;

    /// The `arguments` object of the request, if the command takes any.
    ///
    /// Must be deterministic: identical commands produce identical arguments.
    fn arguments(&self) -> Option<Value>;

    /// Interpret a successful reply.
    ///
    /// Called once, on the task awaiting the command, after `"success": false` replies have
    /// already been turned into [`DebuggerError::CommandFailed`](crate::DebuggerError).
    fn process_response(&self, response: &Response) -> Result<Self::Output>;
}
