use std::{
    collections::{HashMap, VecDeque},
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use serde_json::{Map, Value};
use tokio::{
    net::{tcp::OwnedWriteHalf, TcpListener},
    sync::Mutex,
};
use tokio_util::sync::CancellationToken;

use crate::poison::lock;
use crate::wire::{FrameReader, FrameWriter};

/// A scripted V8 debuggee used for unit/integration testing.
///
/// It accepts a single connection, sends the connect banner and answers each request with
/// the reply scripted for its command name. Replies can be delayed (to force out-of-order
/// delivery) or dropped entirely (to force timeouts).
pub struct MockDebuggee {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<State>,
}

#[derive(Clone, Debug)]
pub struct MockDebuggeeConfig {
    pub v8_version: String,
    pub protocol_version: String,
    pub embedding_host: String,
    /// When disabled the mock never sends the connect banner (for handshake timeout tests).
    pub send_banner: bool,
}

impl Default for MockDebuggeeConfig {
    fn default() -> Self {
        Self {
            v8_version: "3.28.71.19".to_string(),
            protocol_version: "1".to_string(),
            embedding_host: "node v0.12.18".to_string(),
            send_banner: true,
        }
    }
}

/// Canned reply for one request.
#[derive(Clone, Debug)]
pub struct MockReply {
    pub success: bool,
    pub running: bool,
    pub body: Option<Value>,
    pub refs: Option<Value>,
    pub message: Option<String>,
    pub delay: Duration,
    /// Never answer the request.
    pub dropped: bool,
}

impl MockReply {
    pub fn success(body: Value) -> Self {
        Self {
            success: true,
            running: false,
            body: Some(body),
            refs: None,
            message: None,
            delay: Duration::ZERO,
            dropped: false,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            body: None,
            ..Self::success(Value::Null)
        }
    }

    pub fn dropped() -> Self {
        Self {
            dropped: true,
            ..Self::success(Value::Null)
        }
    }

    pub fn with_refs(mut self, refs: Value) -> Self {
        self.refs = Some(refs);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_running(mut self, running: bool) -> Self {
        self.running = running;
        self
    }
}

type SharedWriter = Arc<Mutex<FrameWriter<OwnedWriteHalf>>>;

struct State {
    config: MockDebuggeeConfig,
    next_seq: AtomicU64,
    /// Scripted replies per command name. The last reply of a queue is reused.
    replies: std::sync::Mutex<HashMap<String, VecDeque<MockReply>>>,
    requests: Mutex<Vec<Value>>,
    writer: Mutex<Option<SharedWriter>>,
    connection: CancellationToken,
}

impl State {
    fn next_reply(&self, command: &str) -> Option<MockReply> {
        let mut replies = lock(&self.replies, "MockDebuggee.replies");
        let queue = replies.get_mut(command)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl MockDebuggee {
    pub async fn spawn() -> std::io::Result<Self> {
        Self::spawn_with_config(MockDebuggeeConfig::default()).await
    }

    pub async fn spawn_with_config(config: MockDebuggeeConfig) -> std::io::Result<Self> {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();

        let state = Arc::new(State {
            config,
            next_seq: AtomicU64::new(1),
            replies: std::sync::Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            writer: Mutex::new(None),
            connection: shutdown.child_token(),
        });
        let task_state = state.clone();
        let task_shutdown = shutdown.clone();

        tokio::spawn(async move {
            let _ = run(listener, task_state, task_shutdown).await;
        });

        Ok(Self {
            addr,
            shutdown,
            state,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Queue a reply for requests named `command`.
    pub fn script(&self, command: &str, reply: MockReply) {
        let mut replies = lock(&self.state.replies, "MockDebuggee.replies");
        replies
            .entry(command.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Every request received so far, in arrival order.
    pub async fn requests(&self) -> Vec<Value> {
        self.state.requests.lock().await.clone()
    }

    /// Push a `"type":"event"` message to the connected client.
    pub async fn send_event(&self, event: &str, body: Value) -> std::io::Result<()> {
        let mut message = Map::new();
        message.insert("seq".into(), self.state.next_seq.fetch_add(1, Ordering::Relaxed).into());
        message.insert("type".into(), "event".into());
        message.insert("event".into(), event.into());
        message.insert("body".into(), body);
        self.send_raw(&Value::Object(message).to_string()).await
    }

    /// Send `text` as a framed message body, verbatim.
    pub async fn send_raw(&self, text: &str) -> std::io::Result<()> {
        let writer = self.state.writer.lock().await.clone().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotConnected, "no client connected")
        })?;
        let mut writer = writer.lock().await;
        writer.write_message(text.as_bytes()).await
    }

    /// Drop the client connection (simulates the debuggee exiting).
    pub fn disconnect(&self) {
        self.state.connection.cancel();
    }
}

impl Drop for MockDebuggee {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run(
    listener: TcpListener,
    state: Arc<State>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let (socket, _) = tokio::select! {
        _ = shutdown.cancelled() => return Ok(()),
        accept = listener.accept() => accept?,
    };
    let _ = socket.set_nodelay(true);
    let (reader, writer) = socket.into_split();
    let mut reader = FrameReader::new(reader);
    let writer: SharedWriter = Arc::new(Mutex::new(FrameWriter::new(writer)));
    *state.writer.lock().await = Some(writer.clone());

    if state.config.send_banner {
        let config = &state.config;
        writer
            .lock()
            .await
            .write_frame(
                &[
                    ("Type", "connect"),
                    ("V8-Version", config.v8_version.as_str()),
                    ("Protocol-Version", config.protocol_version.as_str()),
                    ("Embedding-Host", config.embedding_host.as_str()),
                ],
                &[],
            )
            .await?;
    }

    let result = loop {
        let frame = tokio::select! {
            _ = state.connection.cancelled() => break Ok(()),
            res = reader.read_frame() => res,
        };
        let frame = match frame {
            Ok(Some(frame)) => frame,
            Ok(None) => break Ok(()),
            Err(err) => break Err(err),
        };
        let Ok(request) = serde_json::from_slice::<Value>(&frame.body) else {
            continue;
        };
        state.requests.lock().await.push(request.clone());
        handle_request(&state, &writer, &request);
    };

    // Dropping the last writer handle closes the socket.
    state.writer.lock().await.take();
    result
}

fn handle_request(state: &Arc<State>, writer: &SharedWriter, request: &Value) {
    let command = request
        .get("command")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let request_seq = request.get("seq").and_then(Value::as_u64).unwrap_or_default();
    let reply = state
        .next_reply(&command)
        .unwrap_or_else(|| MockReply::failure(format!("unknown command `{command}`")));
    if reply.dropped {
        return;
    }

    let mut message = Map::new();
    message.insert("seq".into(), state.next_seq.fetch_add(1, Ordering::Relaxed).into());
    message.insert("request_seq".into(), request_seq.into());
    message.insert("type".into(), "response".into());
    message.insert("command".into(), command.into());
    message.insert("success".into(), reply.success.into());
    message.insert("running".into(), reply.running.into());
    if let Some(body) = reply.body {
        message.insert("body".into(), body);
    }
    if let Some(refs) = reply.refs {
        message.insert("refs".into(), refs);
    }
    if let Some(text) = reply.message {
        message.insert("message".into(), text.into());
    }
    let text = Value::Object(message).to_string();

    // Replies are written from their own task so a delayed reply never holds up later ones.
    let writer = writer.clone();
    let delay = reply.delay;
    let connection = state.connection.clone();
    tokio::spawn(async move {
        if !delay.is_zero() {
            tokio::select! {
                _ = connection.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        let _ = writer.lock().await.write_message(text.as_bytes()).await;
    });
}
