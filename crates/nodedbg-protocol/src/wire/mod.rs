//! Wire-level V8 debugger protocol.
//!
//! Every message is an HTTP-like header block followed by a UTF-8 JSON body:
//!
//! ```text
//! Content-Length: 96\r\n
//! \r\n
//! {"command":"lookup","seq":3,"type":"request","arguments":{"handles":[25],"includeSource":false}}
//! ```
//!
//! The debuggee opens every connection with a header-only banner (`Type: connect`,
//! `V8-Version`, `Protocol-Version`, `Embedding-Host`, `Content-Length: 0`).

mod codec;
mod messages;

pub use codec::{Frame, FrameReader, FrameWriter};
pub use messages::{encode_request, parse_incoming, DebuggerEvent, Incoming, Request, Response};

/// Maximum accepted message body size (in bytes).
///
/// Caps the incoming `Content-Length` so a corrupt or hostile peer cannot force huge
/// allocations before the body is even read.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024; // 16 MiB

/// Maximum allowed size of a single header line (in bytes).
pub const MAX_HEADER_LINE_BYTES: usize = 8 * 1024; // 8 KiB
