use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    sync::{broadcast, oneshot, Mutex as AsyncMutex},
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::command::Command;
use crate::error::{DebuggerError, Result};
use crate::poison::lock;
use crate::types::SequenceId;
use crate::wire::{
    encode_request, parse_incoming, DebuggerEvent, Frame, FrameReader, FrameWriter, Incoming,
    Response,
};
use crate::TRACE_TARGET;

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// How long to wait for the debuggee's connect banner.
    pub handshake_timeout: Duration,
    /// Deadline for each command, measured from the moment it is registered.
    pub reply_timeout: Duration,
    /// How often pending commands are checked against their deadline.
    pub sweep_interval: Duration,
    pub event_channel_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            reply_timeout: Duration::from_secs(10),
            sweep_interval: Duration::from_millis(100),
            event_channel_size: 64,
        }
    }
}

impl From<&nodedbg_config::ChannelSettings> for ChannelConfig {
    fn from(settings: &nodedbg_config::ChannelSettings) -> Self {
        Self {
            handshake_timeout: settings.handshake_timeout(),
            reply_timeout: settings.reply_timeout(),
            sweep_interval: settings.sweep_interval(),
            event_channel_size: settings.event_channel_size.max(1),
        }
    }
}

/// Contents of the header-only banner the debuggee sends when a client connects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectInfo {
    pub v8_version: Option<String>,
    pub protocol_version: Option<String>,
    pub embedding_host: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl ConnectInfo {
    fn from_banner(frame: Frame) -> Result<Self> {
        match frame.header("Type") {
            Some(kind) if kind.eq_ignore_ascii_case("connect") => {}
            _ => {
                return Err(DebuggerError::protocol(
                    "debuggee did not open with a `Type: connect` banner",
                ))
            }
        }
        let header = |name: &str| frame.header(name).map(str::to_owned);
        Ok(Self {
            v8_version: header("V8-Version"),
            protocol_version: header("Protocol-Version"),
            embedding_host: header("Embedding-Host"),
            headers: frame.headers.clone(),
        })
    }
}

/// Lifecycle of an issued command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    /// Registered in the pending table, request not yet written.
    Created,
    /// Written to the debuggee, awaiting its reply.
    Sent,
    Completed,
    /// The debuggee replied with a failure, the reply was malformed or the connection dropped.
    Failed,
    TimedOut,
    Cancelled,
}

type Delivery = Result<Response>;

struct PendingEntry {
    command: &'static str,
    deadline: Instant,
    tx: oneshot::Sender<Delivery>,
}

#[derive(Default)]
struct PendingTable {
    closed: bool,
    entries: HashMap<SequenceId, PendingEntry>,
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

struct Inner {
    writer: AsyncMutex<FrameWriter<BoxedWriter>>,
    pending: Mutex<PendingTable>,
    next_seq: AtomicU64,
    events: broadcast::Sender<DebuggerEvent>,
    shutdown: CancellationToken,
    config: ChannelConfig,
}

/// Request/response correlation for one debuggee connection.
///
/// Any number of tasks may issue commands concurrently through clones of the channel. A
/// single reader task routes replies back to their issuers by sequence id, so replies may
/// arrive in any order and a slow command never blocks the others.
///
/// Dropping the last clone tears the connection down as [`CommandChannel::close`] does.
#[derive(Clone)]
pub struct CommandChannel {
    inner: Arc<Inner>,
    // The background tasks hold `inner` but not this guard.
    _shutdown_on_drop: Arc<DropGuard>,
}

impl CommandChannel {
    pub async fn connect(addr: SocketAddr) -> Result<(Self, ConnectInfo)> {
        Self::connect_with_config(addr, ChannelConfig::default()).await
    }

    pub async fn connect_with_config(
        addr: SocketAddr,
        config: ChannelConfig,
    ) -> Result<(Self, ConnectInfo)> {
        let stream = TcpStream::connect(addr).await?;
        let _ = stream.set_nodelay(true);
        let (reader, writer) = stream.into_split();
        let mut reader = FrameReader::new(reader);

        let banner = tokio::time::timeout(config.handshake_timeout, reader.read_frame())
            .await
            .map_err(|_| DebuggerError::Timeout)??
            .ok_or(DebuggerError::ConnectionClosed)?;
        let info = ConnectInfo::from_banner(banner)?;
        tracing::info!(
            target: TRACE_TARGET,
            %addr,
            v8_version = info.v8_version.as_deref().unwrap_or("unknown"),
            embedding_host = info.embedding_host.as_deref().unwrap_or("unknown"),
            "connected to debuggee"
        );

        Ok((Self::start(reader, Box::new(writer), config), info))
    }

    /// Run a channel over an already established transport (no connect banner is expected).
    ///
    /// Must be called from within a tokio runtime: the reader and timeout tasks are spawned
    /// immediately.
    pub fn from_transport<R, W>(reader: R, writer: W, config: ChannelConfig) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::start(FrameReader::new(reader), Box::new(writer), config)
    }

    fn start<R>(reader: FrameReader<R>, writer: BoxedWriter, config: ChannelConfig) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let (events, _) = broadcast::channel(config.event_channel_size.max(1));
        let inner = Arc::new(Inner {
            writer: AsyncMutex::new(FrameWriter::new(writer)),
            pending: Mutex::new(PendingTable::default()),
            next_seq: AtomicU64::new(1),
            events,
            shutdown: CancellationToken::new(),
            config,
        });

        tokio::spawn(read_loop(reader, inner.clone()));
        tokio::spawn(sweep_loop(inner.clone()));

        let guard = inner.shutdown.clone().drop_guard();
        Self {
            inner,
            _shutdown_on_drop: Arc::new(guard),
        }
    }

    /// Assign a sequence id, register the command as pending and transmit it.
    ///
    /// Returns as soon as the request is written; the reply is observed through the returned
    /// [`PendingCommand`].
    pub async fn send<C: Command>(&self, command: C) -> Result<PendingCommand<C>> {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        let payload = encode_request(seq, &command)?;
        let (tx, rx) = oneshot::channel();

        {
            let mut table = lock(&self.inner.pending, "CommandChannel.pending");
            if table.closed {
                return Err(DebuggerError::ChannelClosed);
            }
            table.entries.insert(
                seq,
                PendingEntry {
                    command: command.name(),
                    deadline: Instant::now() + self.inner.config.reply_timeout,
                    tx,
                },
            );
        }

        let mut pending = PendingCommand {
            seq,
            command,
            rx,
            state: CommandState::Created,
            output: None,
        };

        let written = {
            let mut writer = self.inner.writer.lock().await;
            writer.write_message(&payload).await
        };
        if let Err(err) = written {
            self.inner.remove_pending(seq);
            return Err(err.into());
        }

        tracing::debug!(
            target: TRACE_TARGET,
            seq,
            command = pending.command.name(),
            "sent command"
        );
        pending.state = CommandState::Sent;
        Ok(pending)
    }

    /// Send `command` and wait for its result.
    pub async fn execute<C: Command>(&self, command: C) -> Result<C::Output> {
        self.send(command).await?.wait().await
    }

    /// Route one inbound message body.
    ///
    /// Replies go to the pending command with the matching sequence id; replies nobody is
    /// waiting for (late, duplicate or unsolicited) and unparseable text are logged and
    /// dropped. Events are broadcast to [`CommandChannel::subscribe_events`] receivers.
    pub fn on_incoming_text(&self, text: &str) {
        self.inner.on_incoming_text(text);
    }

    /// Tear the channel down: every pending command fails with [`DebuggerError::Cancelled`]
    /// and later sends fail with [`DebuggerError::ChannelClosed`].
    pub fn close(&self) {
        if self.inner.close_with(|| DebuggerError::Cancelled) {
            tracing::debug!(target: TRACE_TARGET, "command channel closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.inner.pending, "CommandChannel.pending").closed
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.inner.pending, "CommandChannel.pending")
            .entries
            .len()
    }

    /// A token that is cancelled when the channel closes, either explicitly via
    /// [`CommandChannel::close`] or because the connection dropped.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<DebuggerEvent> {
        self.inner.events.subscribe()
    }
}

impl Inner {
    fn on_incoming_text(&self, text: &str) {
        match parse_incoming(text) {
            Incoming::Response {
                request_seq,
                response,
            } => {
                let entry = lock(&self.pending, "CommandChannel.pending")
                    .entries
                    .remove(&request_seq);
                match entry {
                    Some(entry) => {
                        tracing::trace!(
                            target: TRACE_TARGET,
                            seq = request_seq,
                            command = entry.command,
                            "routing reply"
                        );
                        let _ = entry.tx.send(response);
                    }
                    None => {
                        tracing::debug!(
                            target: TRACE_TARGET,
                            seq = request_seq,
                            "discarding reply without a pending command"
                        );
                    }
                }
            }
            Incoming::Event(event) => {
                tracing::trace!(target: TRACE_TARGET, event = %event.event, "debugger event");
                let _ = self.events.send(event);
            }
            Incoming::Ignored(reason) => {
                tracing::warn!(
                    target: TRACE_TARGET,
                    reason = %reason,
                    "ignoring unroutable debuggee message"
                );
            }
        }
    }

    fn remove_pending(&self, seq: SequenceId) {
        lock(&self.pending, "CommandChannel.pending")
            .entries
            .remove(&seq);
    }

    /// Fail every command whose deadline is at or before `now`.
    fn expire_overdue(&self, now: Instant) {
        let expired: Vec<(SequenceId, PendingEntry)> = {
            let mut table = lock(&self.pending, "CommandChannel.pending");
            let overdue: Vec<SequenceId> = table
                .entries
                .iter()
                .filter(|(_, entry)| entry.deadline <= now)
                .map(|(seq, _)| *seq)
                .collect();
            overdue
                .into_iter()
                .filter_map(|seq| table.entries.remove(&seq).map(|entry| (seq, entry)))
                .collect()
        };

        for (seq, entry) in expired {
            tracing::warn!(
                target: TRACE_TARGET,
                seq,
                command = entry.command,
                "command timed out"
            );
            let _ = entry.tx.send(Err(DebuggerError::Timeout));
        }
    }

    /// Mark the channel closed and fail everything still pending. Returns `false` if the
    /// channel was already closed.
    fn close_with(&self, error: impl Fn() -> DebuggerError) -> bool {
        let drained = {
            let mut table = lock(&self.pending, "CommandChannel.pending");
            if table.closed {
                return false;
            }
            table.closed = true;
            std::mem::take(&mut table.entries)
        };

        self.shutdown.cancel();
        for (seq, entry) in drained {
            tracing::debug!(
                target: TRACE_TARGET,
                seq,
                command = entry.command,
                "failing pending command on teardown"
            );
            let _ = entry.tx.send(Err(error()));
        }
        true
    }
}

async fn read_loop<R: AsyncRead + Unpin>(mut reader: FrameReader<R>, inner: Arc<Inner>) {
    let cancelled = loop {
        let frame = tokio::select! {
            _ = inner.shutdown.cancelled() => break true,
            res = reader.read_frame() => res,
        };

        match frame {
            Ok(Some(frame)) => {
                // Header-only frames (a repeated connect banner) carry nothing to route.
                if frame.body.is_empty() {
                    continue;
                }
                match std::str::from_utf8(&frame.body) {
                    Ok(text) => inner.on_incoming_text(text),
                    Err(err) => {
                        tracing::warn!(
                            target: TRACE_TARGET,
                            error = %err,
                            "dropping message that is not UTF-8"
                        );
                    }
                }
            }
            Ok(None) => {
                tracing::debug!(target: TRACE_TARGET, "debuggee closed the connection");
                break false;
            }
            Err(err) => {
                tracing::warn!(
                    target: TRACE_TARGET,
                    error = %err,
                    "failed to read debuggee message"
                );
                break false;
            }
        }
    };

    // After an explicit close this is a no-op. Dropping every channel handle lands here too.
    inner.close_with(|| {
        if cancelled {
            DebuggerError::Cancelled
        } else {
            DebuggerError::ConnectionClosed
        }
    });
}

async fn sweep_loop(inner: Arc<Inner>) {
    let mut ticker = tokio::time::interval(inner.config.sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            _ = ticker.tick() => inner.expire_overdue(Instant::now()),
        }
    }
}

/// Handle to one in-flight command.
///
/// The command completes exactly once: with its reply, a timeout, or a teardown failure,
/// whichever reaches the pending table first.
pub struct PendingCommand<C: Command> {
    seq: SequenceId,
    command: C,
    rx: oneshot::Receiver<Delivery>,
    state: CommandState,
    output: Option<Result<C::Output>>,
}

impl<C: Command> PendingCommand<C> {
    pub fn seq(&self) -> SequenceId {
        self.seq
    }

    pub fn command(&self) -> &C {
        &self.command
    }

    /// Current lifecycle state, without waiting.
    ///
    /// A reply that arrived in the meantime is interpreted right away, so a reply the command
    /// cannot make sense of reports [`CommandState::Failed`].
    pub fn state(&mut self) -> CommandState {
        if self.state == CommandState::Sent {
            let delivery = match self.rx.try_recv() {
                Ok(delivery) => Some(delivery),
                Err(oneshot::error::TryRecvError::Empty) => None,
                Err(oneshot::error::TryRecvError::Closed) => {
                    Some(Err(DebuggerError::ConnectionClosed))
                }
            };
            if let Some(delivery) = delivery {
                let output = self.finish(delivery);
                self.output = Some(output);
            }
        }
        self.state
    }

    /// Wait for the reply and let the command interpret it.
    ///
    /// Runs on the caller's task, so response processing never stalls the connection's reader.
    pub async fn wait(mut self) -> Result<C::Output> {
        if let Some(output) = self.output.take() {
            return output;
        }
        let delivery = (&mut self.rx)
            .await
            .unwrap_or(Err(DebuggerError::ConnectionClosed));
        self.finish(delivery)
    }

    fn finish(&mut self, delivery: Delivery) -> Result<C::Output> {
        let output = delivery
            .and_then(|response| response.into_success(self.command.name()))
            .and_then(|response| self.command.process_response(&response));
        if let Err(err) = &output {
            tracing::debug!(
                target: TRACE_TARGET,
                seq = self.seq,
                command = self.command.name(),
                error = %err,
                "command did not complete"
            );
        }
        self.state = state_of(&output);
        output
    }
}

fn state_of<T>(output: &Result<T>) -> CommandState {
    match output {
        Ok(_) => CommandState::Completed,
        Err(DebuggerError::Timeout) => CommandState::TimedOut,
        Err(DebuggerError::Cancelled) => CommandState::Cancelled,
        Err(_) => CommandState::Failed,
    }
}
