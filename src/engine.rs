//! Connection lifecycle controller and command/response engine (§4.3, §4.5, §5).
//!
//! Everything that must not be mutated from two places at once — the framer,
//! the command queue, the handler table, the tag counter — is owned by a
//! single task spawned from [`Client::connect`]. Callers only ever touch
//! channel handles: an unbounded sender for commands in, an unbounded
//! receiver for [`Event`]s out, and a `oneshot::Receiver` per enqueued
//! command. The task itself is driven by one `tokio::select!` over four
//! event sources: the command channel, inbound transport bytes, the idle
//! timer, and the per-write socket timeout.

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Sleep};
use tracing::Instrument;

use crate::command::{CommandOutcome, CommandRecord, Completion, EnqueueOptions, TagGenerator};
use crate::compiler::{Compiler, Request};
use crate::compression::Compression;
use crate::connection::{Config, ImapStream, Security, connect_plain, connect_tls};
use crate::dispatcher::{self, DispatchedResponse, Frame};
use crate::framer::Framer;
use crate::parser::Parser;
use crate::{Error, Result};

/// A registered callback for a global untagged response name.
pub type HandlerFn = Box<dyn Fn(DispatchedResponse) + Send + Sync>;

/// Events the engine publishes for the caller to poll.
#[derive(Debug)]
pub enum Event {
    /// The connection observed its first response (greeting) and is ready
    /// to accept commands.
    Ready,
    /// The command queue drained and stayed empty for `enter_idle_after`.
    Idle,
    /// A fatal error tore the connection down. Delivered at most once.
    Error(Error),
    /// The peer's leaf certificate (DER-encoded), passed through from the
    /// transport whenever a TLS handshake completes: once after
    /// `connect()` for implicit TLS, or after a successful
    /// [`Client::upgrade`] for STARTTLS. Never sent for plaintext streams.
    Cert(Vec<u8>),
}

/// Connection lifecycle state (§4.5).
///
/// `Connecting` is not represented here: it is the state of [`Client::connect`]
/// before an [`Engine`] exists at all, so there is nothing for this enum to
/// track yet. The engine task's life begins at `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Open,
    Ready,
    Closing,
    Closed,
}

struct PendingRequest {
    request: Request,
    options: EnqueueOptions,
    completion: oneshot::Sender<Result<CommandOutcome>>,
}

enum EngineCommand {
    Enqueue(Request, EnqueueOptions, oneshot::Sender<Result<CommandOutcome>>),
    SetHandler(String, HandlerFn),
    EnableCompression,
    Upgrade(oneshot::Sender<Result<()>>),
    Close,
}

/// A day's worth of sleep, used as the "unarmed" deadline for the idle and
/// socket-timeout timers so both can live in `tokio::select!` unconditionally
/// and be armed later via `Sleep::reset`.
fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(60 * 60 * 24 * 365)
}

/// Handle to a running engine task.
///
/// Dropping the last `Client` closes the connection best-effort (the drop
/// impl sends a close request that the engine processes if it is still
/// alive; it does not block waiting for teardown).
pub struct Client {
    commands: mpsc::UnboundedSender<EngineCommand>,
}

impl Client {
    /// Opens a transport per `config.security` and spawns the engine task.
    ///
    /// # Errors
    /// Returns the transport error if the connect (and, for implicit TLS,
    /// the handshake) does not complete within `config.connect_timeout`.
    pub async fn connect(
        config: Config,
        parser: std::sync::Arc<dyn Parser>,
        compiler: std::sync::Arc<dyn Compiler>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Event>)> {
        let span = tracing::info_span!(
            "imap_connection",
            session_id = %config.session_id.as_deref().unwrap_or("-"),
            host = %config.host,
            port = config.port,
        );
        let stream = async {
            tracing::info!("connecting");
            let stream = tokio::time::timeout(config.connect_timeout, async {
                match config.security {
                    Security::Implicit => connect_tls(&config.host, config.port).await,
                    Security::None | Security::StartTls => {
                        connect_plain(&config.host, config.port).await
                    }
                }
            })
            .await
            .map_err(|_| Error::Timeout(config.connect_timeout))??;
            tracing::info!("connected");
            Ok::<_, Error>(stream)
        }
        .instrument(span.clone())
        .await?;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        if let Some(cert) = stream.peer_certificate() {
            let _ = events_tx.send(Event::Cert(cert));
        }

        let engine = Engine {
            stream: Some(stream),
            parser,
            compiler,
            compression: None,
            framer: Framer::new(),
            tags: TagGenerator::new(),
            queue: VecDeque::new(),
            current: None,
            handlers: HashMap::new(),
            events: events_tx,
            config,
            state: ConnectionState::Open,
            can_send: false,
            funneled: false,
            idle_armed: false,
            socket_armed: false,
            socket_timeout: Duration::ZERO,
            idle_sleep: Box::pin(tokio::time::sleep_until(far_future())),
            socket_sleep: Box::pin(tokio::time::sleep_until(far_future())),
        };

        tokio::spawn(engine.run(commands_rx).instrument(span));

        Ok((Self { commands: commands_tx }, events_rx))
    }

    /// Enqueues a bare request with no untagged collection.
    #[must_use]
    pub fn enqueue(&self, request: Request) -> Completion {
        self.enqueue_with_options(request, EnqueueOptions::default())
    }

    /// Enqueues a request with explicit options (§4.3 enqueue contract).
    #[must_use]
    pub fn enqueue_with_options(&self, request: Request, options: EnqueueOptions) -> Completion {
        let (tx, rx) = oneshot::channel();
        let _ = self.commands.send(EngineCommand::Enqueue(request, options, tx));
        rx
    }

    /// Registers (or replaces) the handler for a global untagged command name.
    pub fn set_handler(
        &self,
        name: impl Into<String>,
        handler: impl Fn(DispatchedResponse) + Send + Sync + 'static,
    ) {
        let _ = self
            .commands
            .send(EngineCommand::SetHandler(name.into().to_ascii_uppercase(), Box::new(handler)));
    }

    /// Enables the DEFLATE/INFLATE shim (§4.4). Must be called immediately
    /// after the tagged `OK` for `COMPRESS DEFLATE` has resolved, before any
    /// further bytes are expected from the server.
    pub fn enable_compression(&self) {
        let _ = self.commands.send(EngineCommand::EnableCompression);
    }

    /// Performs an in-place STARTTLS upgrade.
    ///
    /// # Errors
    /// Returns the TLS handshake error, or [`Error::ConnectionClosed`] if the
    /// engine has already torn down.
    pub async fn upgrade(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(EngineCommand::Upgrade(tx))
            .map_err(|_| Error::ConnectionClosed)?;
        rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Sends `LOGOUT` and waits for the server to close the connection (or
    /// for the command to resolve normally). Either path is treated as a
    /// successful logout, matching a server that closes immediately after
    /// its tagged `OK`.
    ///
    /// # Errors
    /// Returns a protocol error if the server rejects `LOGOUT` outright.
    pub async fn logout(&self) -> Result<()> {
        match self.enqueue(Request::bare("LOGOUT")).await {
            Ok(Ok(_outcome)) => Ok(()),
            Ok(Err(Error::ConnectionClosed)) | Err(_) => Ok(()),
            Ok(Err(err)) => Err(err),
        }
    }

    /// Requests teardown. Always "succeeds" from the caller's perspective;
    /// the engine swallows errors encountered while closing.
    pub fn close(&self) {
        let _ = self.commands.send(EngineCommand::Close);
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        let _ = self.commands.send(EngineCommand::Close);
    }
}

struct Engine {
    stream: Option<ImapStream>,
    parser: std::sync::Arc<dyn Parser>,
    compiler: std::sync::Arc<dyn Compiler>,
    compression: Option<Compression>,
    framer: Framer,
    tags: TagGenerator,
    queue: VecDeque<PendingRequest>,
    current: Option<CommandRecord>,
    handlers: HashMap<String, HandlerFn>,
    events: mpsc::UnboundedSender<Event>,
    config: Config,
    state: ConnectionState,
    can_send: bool,
    funneled: bool,
    idle_armed: bool,
    socket_armed: bool,
    socket_timeout: Duration,
    idle_sleep: Pin<Box<Sleep>>,
    socket_sleep: Pin<Box<Sleep>>,
}

impl Engine {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<EngineCommand>) {
        let mut read_buf = vec![0_u8; 8192];

        loop {
            tokio::select! {
                biased;

                maybe_cmd = commands.recv() => {
                    match maybe_cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => {
                            self.close_internal().await;
                        }
                    }
                }

                read_result = Self::read_chunk(&mut self.stream, &mut self.compression, &mut read_buf) => {
                    self.socket_armed = false;
                    match read_result {
                        Ok(Some(plain)) => self.on_inbound(&plain).await,
                        Ok(None) => self.fail(Error::ConnectionClosed).await,
                        Err(err) => self.fail(err).await,
                    }
                }

                () = &mut self.idle_sleep, if self.idle_armed => {
                    self.idle_armed = false;
                    tracing::debug!("idle");
                    let _ = self.events.send(Event::Idle);
                }

                () = &mut self.socket_sleep, if self.socket_armed => {
                    self.socket_armed = false;
                    let elapsed = self.socket_timeout;
                    self.fail(Error::Timeout(elapsed)).await;
                }
            }

            if self.state == ConnectionState::Closed {
                break;
            }
        }
    }

    async fn read_chunk(
        stream: &mut Option<ImapStream>,
        compression: &mut Option<Compression>,
        buf: &mut [u8],
    ) -> Result<Option<Vec<u8>>> {
        let Some(stream) = stream.as_mut() else {
            return Ok(None);
        };
        let n = stream.read(buf).await?;
        if n == 0 {
            return Ok(None);
        }
        let raw = &buf[..n];
        let plain = match compression {
            Some(codec) => codec.inflate(raw).await?,
            None => raw.to_vec(),
        };
        Ok(Some(plain))
    }

    async fn on_inbound(&mut self, chunk: &[u8]) {
        let frames = self.framer.push(chunk);
        for frame in frames {
            tokio::task::yield_now().await;
            self.dispatch_frame(&frame).await;
            if self.state == ConnectionState::Closed {
                return;
            }
        }
    }

    async fn dispatch_frame(&mut self, text: &[u8]) {
        match dispatcher::classify(text) {
            Frame::Continuation { payload } => {
                tracing::trace!(%payload, "continuation");
                self.handle_continuation().await;
            }
            Frame::Unparsed(raw) => match self.parser.parse(raw) {
                Ok(ast) => {
                    let response = dispatcher::normalize(ast);
                    tracing::debug!(tag = %response.tag, command = %response.command, "dispatch");
                    self.route(response).await;
                }
                Err(err) => self.fail(err).await,
            },
        }
    }

    async fn handle_continuation(&mut self) {
        let Some(current) = self.current.as_mut() else {
            return;
        };

        if current.has_remaining_chunks() {
            let index = current.next_chunk;
            let chunk = current.data[index].clone();
            let is_last = index == current.data.len() - 1;
            current.next_chunk += 1;
            if let Err(err) = self.write_wire(&chunk, is_last).await {
                self.fail(err).await;
            }
        } else if current.error_response_expects_empty_line {
            if let Err(err) = self.write_wire(b"", true).await {
                self.fail(err).await;
            }
        }
        // Continuation handling never flips `can_send`.
    }

    async fn route(&mut self, response: DispatchedResponse) {
        let is_untagged = response.tag == "*";
        let mut completed = false;

        if is_untagged {
            if let Some(current) = self.current.as_mut() {
                if current.accept_untagged.contains(&response.command) {
                    current
                        .payload
                        .entry(response.command.clone())
                        .or_default()
                        .push(response.clone());
                }
            }
            if let Some(handler) = self.handlers.get(&response.command) {
                handler(response.clone());
            }
        } else if let Some(current) = &self.current {
            if response.tag == current.tag {
                completed = true;
            }
        }

        if completed {
            if let Some(record) = self.current.take() {
                let result = if matches!(response.command.as_str(), "NO" | "BAD") {
                    Err(Error::Protocol {
                        code: response.code.clone(),
                        human_readable: response
                            .human_readable
                            .clone()
                            .unwrap_or_else(|| "Error".to_string()),
                    })
                } else {
                    Ok(CommandOutcome {
                        tagged: response,
                        payload: record.payload,
                    })
                };
                let _ = record.completion.send(result);
            }
            self.can_send = true;
        }

        if !matches!(
            self.state,
            ConnectionState::Ready | ConnectionState::Closing | ConnectionState::Closed
        ) {
            self.state = ConnectionState::Ready;
            tracing::info!("ready");
            let _ = self.events.send(Event::Ready);
            self.can_send = true;
        }

        if self.can_send {
            self.maybe_send_next().await;
        }
    }

    async fn handle_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Enqueue(request, options, completion) => {
                self.queue.push_back(PendingRequest { request, options, completion });
                if self.can_send {
                    self.maybe_send_next().await;
                }
            }
            EngineCommand::SetHandler(name, handler) => {
                self.handlers.insert(name, handler);
            }
            EngineCommand::EnableCompression => {
                self.compression = Some(if self.config.compression_worker {
                    Compression::spawn_worker()
                } else {
                    Compression::inline()
                });
                tracing::info!("compression enabled");
            }
            EngineCommand::Upgrade(reply) => {
                let result = self.upgrade_tls().await;
                let _ = reply.send(result);
            }
            EngineCommand::Close => {
                self.close_internal().await;
            }
        }
    }

    async fn maybe_send_next(&mut self) {
        if self.current.is_some() {
            return;
        }
        let Some(pending) = self.queue.pop_front() else {
            self.arm_idle();
            return;
        };
        self.idle_armed = false;

        let tag = self.tags.next();
        match self.compiler.compile(&tag, &pending.request, true, false) {
            Ok(chunks) if !chunks.is_empty() => {
                let mut record =
                    CommandRecord::new(tag, pending.request, pending.options, pending.completion);
                record.data = chunks;
                record.next_chunk = 1;
                let first = record.data[0].clone();
                self.current = Some(record);
                self.can_send = false;
                if let Err(err) = self.write_wire(&first, true).await {
                    self.fail(err).await;
                }
            }
            Ok(_) => {
                let _ = pending
                    .completion
                    .send(Err(Error::Compiler("compiler produced no chunks".to_string())));
                self.can_send = true;
            }
            Err(err) => {
                let _ = pending.completion.send(Err(err));
                self.can_send = true;
            }
        }
    }

    /// Writes one chunk to the wire, appending CRLF per `append_crlf`, and
    /// arms the per-write socket timeout.
    ///
    /// Every *first* chunk of a command gets CRLF regardless of how many
    /// chunks follow: it is always a complete command line, whether that
    /// line stands alone or ends in a literal declaration awaiting a server
    /// continuation. Continuation-released chunks only get CRLF when they
    /// are the last chunk of the command.
    async fn write_wire(&mut self, bytes: &[u8], append_crlf: bool) -> Result<()> {
        let mut out = bytes.to_vec();
        if append_crlf {
            out.extend_from_slice(b"\r\n");
        }

        tracing::trace!(bytes = out.len(), "write");
        self.socket_timeout = self.config.socket_timeout_for(out.len());

        let wire = match self.compression.as_mut() {
            Some(codec) => codec.deflate(&out).await?,
            None => out,
        };

        let Some(stream) = self.stream.as_mut() else {
            return Err(Error::ConnectionClosed);
        };
        stream.write_all(&wire).await?;
        stream.flush().await?;

        self.socket_sleep.as_mut().reset(Instant::now() + self.socket_timeout);
        self.socket_armed = true;
        Ok(())
    }

    fn arm_idle(&mut self) {
        self.idle_sleep.as_mut().reset(Instant::now() + self.config.enter_idle_after);
        self.idle_armed = true;
    }

    async fn upgrade_tls(&mut self) -> Result<()> {
        let Some(stream) = self.stream.take() else {
            return Err(Error::ConnectionClosed);
        };
        match stream.upgrade_to_tls(&self.config.host).await {
            Ok(upgraded) => {
                if let Some(cert) = upgraded.peer_certificate() {
                    let _ = self.events.send(Event::Cert(cert));
                }
                self.stream = Some(upgraded);
                tracing::info!("upgraded to TLS");
                Ok(())
            }
            Err(err) => {
                tracing::error!(error = %err, "TLS upgrade failed");
                self.state = ConnectionState::Closed;
                Err(err)
            }
        }
    }

    /// The unified error funnel (§7): close, publish once, reject everyone
    /// outstanding with a connection-closed error derived from the cause.
    async fn fail(&mut self, err: Error) {
        if self.funneled {
            return;
        }
        self.funneled = true;
        tracing::error!(error = %err, "fatal error");

        self.close_internal().await;
        let _ = self.events.send(Event::Error(err));
    }

    /// Idempotent teardown (§4.5 `close()`): rejects every outstanding
    /// completion with [`Error::ConnectionClosed`], drops the compression
    /// shim, detaches the transport. Never itself errors. Shared by the
    /// explicit `Close` command and the error funnel in [`Self::fail`], so
    /// close is the only cancellation primitive at the command level either
    /// way a connection ends.
    async fn close_internal(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.state = ConnectionState::Closing;
        self.idle_armed = false;
        self.socket_armed = false;
        self.compression = None;

        if let Some(record) = self.current.take() {
            let _ = record.completion.send(Err(Error::ConnectionClosed));
        }
        for pending in self.queue.drain(..) {
            let _ = pending.completion.send(Err(Error::ConnectionClosed));
        }

        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }

        self.state = ConnectionState::Closed;
        tracing::info!("closed");
    }
}
