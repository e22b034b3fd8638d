//! Command/response substrate for the V8 debugger protocol spoken by Node.js.
//!
//! The crate is layered leaf-first:
//!
//! - [`wire`]: `Content-Length` framing plus the request/response/event envelopes.
//! - [`evaluation`]: per-response handle tables, the [`EvaluationResultFactory`] capability and
//!   cycle-safe resolution of handle graphs.
//! - [`command`]: the [`Command`] trait and its variants (`lookup`, `evaluate`, `continue`,
//!   `setVariableValue`).
//! - [`CommandChannel`]: sequence id assignment, the pending-command table, reply routing,
//!   timeouts and teardown for one debuggee connection.

mod channel;
pub mod command;
mod error;
pub mod evaluation;
mod poison;
mod types;
pub mod wire;

// The scripted mock debuggee is only needed for tests and downstream integration suites.
#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use channel::{ChannelConfig, CommandChannel, CommandState, ConnectInfo, PendingCommand};
pub use command::{
    Command, ContinueCommand, EvaluateCommand, LookupCommand, LookupResults, NewValue,
    SetVariableValueCommand, StepAction,
};
pub use error::{DebuggerError, Result};
pub use evaluation::{
    ChildRef, ChildResolution, DefaultEvaluationResultFactory, EvaluationOutcome,
    EvaluationResult, EvaluationResultFactory, HandleTable, NodeVariable, RawVariableDescriptor,
    ResolvedGraph, ValueType,
};
pub use types::{Handle, SequenceId};
pub use wire::DebuggerEvent;

/// Tracing target used by the protocol layer.
pub(crate) const TRACE_TARGET: &str = "nodedbg.protocol";
