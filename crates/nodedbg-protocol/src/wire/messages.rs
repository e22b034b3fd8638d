use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::command::Command;
use crate::error::{DebuggerError, Result};
use crate::types::SequenceId;

/// Outgoing request envelope.
///
/// Field order is part of the wire contract: `command`, `seq`, `type`, `arguments`.
#[derive(Debug, Clone, Serialize)]
pub struct Request<'a> {
    pub command: &'a str,
    pub seq: SequenceId,
    #[serde(rename = "type")]
    pub message_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// Serialize `command` as the JSON body of a request with sequence id `seq`.
///
/// The output is deterministic: identical inputs always produce identical bytes.
pub fn encode_request<C: Command + ?Sized>(seq: SequenceId, command: &C) -> Result<Vec<u8>> {
    let request = Request {
        command: command.name(),
        seq,
        message_type: "request",
        arguments: command.arguments(),
    };
    Ok(serde_json::to_vec(&request)?)
}

#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub seq: Option<u64>,
    pub request_seq: SequenceId,
    #[serde(default)]
    pub command: Option<String>,
    pub success: bool,
    #[serde(default)]
    pub running: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub refs: Option<Value>,
}

impl Response {
    /// Turn a `"success": false` reply into [`DebuggerError::CommandFailed`].
    pub fn into_success(self, command: &str) -> Result<Self> {
        if self.success {
            return Ok(self);
        }
        Err(DebuggerError::CommandFailed {
            command: self.command.unwrap_or_else(|| command.to_owned()),
            message: self
                .message
                .unwrap_or_else(|| "debuggee reported failure".to_owned()),
        })
    }

    pub fn body(&self) -> Result<&Value> {
        match &self.body {
            Some(Value::Null) | None => Err(DebuggerError::protocol("response has no body")),
            Some(body) => Ok(body),
        }
    }

    /// The auxiliary reference collection. Absent or `null` means "no references".
    pub fn refs(&self) -> Result<&[Value]> {
        match &self.refs {
            None | Some(Value::Null) => Ok(&[]),
            Some(Value::Array(refs)) => Ok(refs),
            Some(_) => Err(DebuggerError::protocol("response `refs` is not an array")),
        }
    }
}

/// Asynchronous notification from the debuggee (`break`, `exception`, `afterCompile`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebuggerEvent {
    #[serde(default)]
    pub seq: Option<u64>,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Classification of one inbound message body.
#[derive(Debug)]
pub enum Incoming {
    /// A reply addressed to `request_seq`. The envelope may still be malformed, in which case
    /// the error belongs to that command only.
    Response {
        request_seq: SequenceId,
        response: Result<Response>,
    },
    Event(DebuggerEvent),
    /// Text that cannot be routed anywhere.
    Ignored(String),
}

pub fn parse_incoming(text: &str) -> Incoming {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(err) => return Incoming::Ignored(format!("invalid JSON: {err}")),
    };

    match value.get("type").and_then(Value::as_str) {
        Some("response") => {
            let Some(request_seq) = value.get("request_seq").and_then(Value::as_u64) else {
                return Incoming::Ignored("response without a numeric request_seq".to_owned());
            };
            let response = serde_json::from_value::<Response>(value).map_err(|err| {
                DebuggerError::protocol(format!("malformed response envelope: {err}"))
            });
            Incoming::Response {
                request_seq,
                response,
            }
        }
        Some("event") => match serde_json::from_value::<DebuggerEvent>(value) {
            Ok(event) => Incoming::Event(event),
            Err(err) => Incoming::Ignored(format!("malformed event: {err}")),
        },
        Some(_) => Incoming::Ignored("unexpected message type".to_owned()),
        None => Incoming::Ignored("message without a type".to_owned()),
    }
}
