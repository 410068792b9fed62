//! Session lifecycle: handshake, reader task, error channel, shutdown

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    command::Command,
    connection::AmiConnectOptions,
    constants::{ANY_MESSAGE_TOPIC, BANNER_PREFIX, RESPONSE_GOODBYE},
    correlator::Correlator,
    dictionary::Dictionary,
    engine,
    error::{AmiError, AmiResult},
    headers::AmiHeader,
    message::AmiMessage,
    protocol::parse_frame,
    pubsub::{EventSink, PubSub},
    retry::RetryPolicy,
    transport::{AmiStream, Transport},
};

/// Lifecycle of a session. `Closed` is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionState {
    /// Socket not yet handed over.
    Created,
    /// Socket open, handshake in progress.
    Connected,
    /// Login accepted.
    Authenticated,
    /// Reader task running.
    Reading,
    /// Session ended.
    Closed(CloseReason),
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CloseReason {
    /// [`AmiSession::close`] or [`AmiSession::logoff`] was called.
    ClientRequested,
    /// The reader hit EOF or a socket error (message kept, io::Error is not Clone).
    ConnectionLost(String),
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::ClientRequested => write!(f, "client requested close"),
            CloseReason::ConnectionLost(msg) => write!(f, "connection lost: {}", msg),
        }
    }
}

/// Receive side of the session error channel.
///
/// Yields each reader failure once, plus write failures from
/// [`AmiSession::send`]. Ends after [`AmiSession::close`].
#[derive(Clone)]
pub struct ErrorSink {
    rx: Arc<Mutex<mpsc::Receiver<AmiError>>>,
}

impl std::fmt::Debug for ErrorSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorSink")
            .finish_non_exhaustive()
    }
}

impl ErrorSink {
    /// Wait for the next error; `None` once the channel is closed.
    pub async fn recv(&self) -> Option<AmiError> {
        self.rx
            .lock()
            .await
            .recv()
            .await
    }

    /// Take a pending error without waiting.
    ///
    /// `None` means no error is queued, or another clone is parked in
    /// [`recv`](Self::recv) and holds the receiver.
    pub fn try_recv(&self) -> Option<AmiError> {
        self.rx
            .try_lock()
            .ok()?
            .try_recv()
            .ok()
    }
}

fn advance(state_tx: &watch::Sender<SessionState>, next: SessionState) {
    state_tx.send_if_modified(|state| {
        if matches!(state, SessionState::Closed(_)) {
            false
        } else {
            *state = next;
            true
        }
    });
}

struct SessionInner {
    transport: Arc<Transport>,
    bus: Arc<PubSub>,
    correlator: Correlator,
    cancel: CancellationToken,
    errors: ErrorSink,
    error_tx: parking_lot::Mutex<Option<mpsc::Sender<AmiError>>>,
    state_tx: Arc<watch::Sender<SessionState>>,
    reader: parking_lot::Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    close_done: CancellationToken,
    retry: RetryPolicy,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.cancel
            .cancel();
    }
}

/// A logged-in AMI connection (Clone + Send).
///
/// Clones share one socket. Writes are serialized; a background task reads
/// frames, resolves pending actions, and publishes to event sinks. Dropping
/// the last clone stops the reader.
#[derive(Clone)]
pub struct AmiSession {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for AmiSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmiSession")
            .field("state", &self.state())
            .finish()
    }
}

impl AmiSession {
    /// Run banner check and login over an already-open stream, then start
    /// the reader.
    ///
    /// Banner and login share one deadline, `options.timeout_ms`.
    pub async fn establish<S: AmiStream>(stream: S, options: &AmiConnectOptions) -> AmiResult<Self> {
        let (state_tx, _) = watch::channel(SessionState::Created);
        let state_tx = Arc::new(state_tx);

        let transport = Arc::new(Transport::new(stream, options.ingest_queue_size));
        advance(&state_tx, SessionState::Connected);

        let cancel = CancellationToken::new();
        match timeout(options.timeout(), handshake(&transport, &cancel, options)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                transport
                    .shutdown()
                    .await;
                return Err(e);
            }
            Err(_) => {
                warn!("[LOGIN] handshake timed out after {}ms", options.timeout_ms);
                transport
                    .shutdown()
                    .await;
                return Err(AmiError::ConnTimeout {
                    timeout_ms: options.timeout_ms,
                });
            }
        }
        advance(&state_tx, SessionState::Authenticated);

        let (error_tx, error_rx) = mpsc::channel(
            options
                .error_queue_size
                .max(1),
        );
        let bus = Arc::new(PubSub::new());
        let correlator = Correlator::new();

        advance(&state_tx, SessionState::Reading);
        let reader = tokio::spawn(reader_loop(ReaderContext {
            transport: transport.clone(),
            bus: bus.clone(),
            correlator: correlator.clone(),
            dictionary: options
                .dictionary
                .clone(),
            error_tx: error_tx.clone(),
            state_tx: state_tx.clone(),
            cancel: cancel.clone(),
        }));

        info!("[LOGIN] session ready");
        Ok(Self {
            inner: Arc::new(SessionInner {
                transport,
                bus,
                correlator,
                cancel,
                errors: ErrorSink {
                    rx: Arc::new(Mutex::new(error_rx)),
                },
                error_tx: parking_lot::Mutex::new(Some(error_tx)),
                state_tx,
                reader: parking_lot::Mutex::new(Some(reader)),
                closed: AtomicBool::new(false),
                close_done: CancellationToken::new(),
                retry: options.retry,
            }),
        })
    }

    /// Sink receiving every inbound frame, responses included.
    pub fn all_events(&self) -> Option<EventSink> {
        self.inner
            .bus
            .subscribe(ANY_MESSAGE_TOPIC)
    }

    /// Sink for one event name (case-insensitive). Repeated calls for the
    /// same name share one queue. `None` once the session is closed.
    pub fn on_event(&self, name: &str) -> Option<EventSink> {
        self.inner
            .bus
            .subscribe(name)
    }

    /// One fresh sink for several event names.
    pub fn on_events<I, S>(&self, names: I) -> Option<EventSink>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.inner
            .bus
            .subscribe_many(names)
    }

    /// Write `command` without waiting for a reply.
    ///
    /// A command without an `ActionID` is sent with a fresh one, so its
    /// reply cannot be taken for another action's.
    ///
    /// Returns `false` if nothing was written; the cause goes to the error
    /// channel unless the session is already closed.
    pub async fn send(&self, command: &Command) -> bool {
        let mut command = command.clone();
        command.ensure_action_id();
        match self
            .write_command(&command)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                if self.is_closed() {
                    debug!("[SEND] dropped on closed session: {}", e);
                } else {
                    self.push_error(e);
                }
                false
            }
        }
    }

    /// The session error channel.
    pub fn error(&self) -> ErrorSink {
        self.inner
            .errors
            .clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.inner
            .state_tx
            .borrow()
            .clone()
    }

    /// Watch lifecycle transitions.
    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.inner
            .state_tx
            .subscribe()
    }

    /// `true` once closed by the client or by a lost connection.
    pub fn is_closed(&self) -> bool {
        self.inner
            .closed
            .load(Ordering::SeqCst)
            || matches!(self.state(), SessionState::Closed(_))
    }

    /// Retry policy this session was configured with.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.inner.retry
    }

    /// `Action: Ping`; fails on anything but `Response: Success`.
    pub async fn ping(&self, cancel: &CancellationToken) -> AmiResult<AmiMessage> {
        engine::single(cancel, self, Command::ping())
            .await?
            .into_result()
    }

    /// `Action: Logoff`, then close regardless of the outcome.
    pub async fn logoff(&self, cancel: &CancellationToken) -> AmiResult<()> {
        let reply = engine::single(cancel, self, Command::logoff()).await;
        self.close()
            .await;
        let reply = reply?;
        if reply
            .response()
            .is_some_and(|r| r.eq_ignore_ascii_case(RESPONSE_GOODBYE))
        {
            Ok(())
        } else {
            Err(AmiError::from_reply(&reply))
        }
    }

    /// Stop the reader, close every sink and the socket, then the error
    /// channel. Safe to call any number of times from any task; every call
    /// returns only once shutdown has finished.
    pub async fn close(&self) {
        if self
            .inner
            .closed
            .swap(true, Ordering::SeqCst)
        {
            self.inner
                .close_done
                .cancelled()
                .await;
            return;
        }
        // releases late callers even if this future is dropped midway
        let _done = self
            .inner
            .close_done
            .clone()
            .drop_guard();
        info!("[CLOSE] closing session");

        self.inner
            .cancel
            .cancel();
        let reader = self
            .inner
            .reader
            .lock()
            .take();
        if let Some(handle) = reader {
            if let Err(e) = handle.await {
                warn!("[CLOSE] reader task ended abnormally: {}", e);
            }
        }

        self.inner
            .bus
            .destroy();
        self.inner
            .transport
            .shutdown()
            .await;
        self.inner
            .correlator
            .fail_all();
        self.inner
            .error_tx
            .lock()
            .take();
        advance(
            &self.inner.state_tx,
            SessionState::Closed(CloseReason::ClientRequested),
        );
    }

    pub(crate) async fn write_command(&self, command: &Command) -> AmiResult<()> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        let wire = command.to_wire_format()?;
        debug!("[SEND] {}", command.redacted_wire());
        self.inner
            .transport
            .write(wire.as_bytes())
            .await
    }

    pub(crate) fn correlator(&self) -> &Correlator {
        &self.inner.correlator
    }

    pub(crate) fn bus(&self) -> &PubSub {
        &self.inner.bus
    }

    /// Error for a call that found the session gone.
    pub(crate) fn closed_error(&self) -> AmiError {
        if self
            .inner
            .closed
            .load(Ordering::SeqCst)
        {
            return AmiError::Cancelled;
        }
        match self.state() {
            SessionState::Closed(CloseReason::ConnectionLost(reason)) => AmiError::Network(reason),
            _ => AmiError::Network("session closed".to_string()),
        }
    }

    fn push_error(&self, err: AmiError) {
        let guard = self
            .inner
            .error_tx
            .lock();
        if let Some(tx) = guard.as_ref() {
            if let Err(mpsc::error::TrySendError::Full(err)) = tx.try_send(err) {
                warn!("[SEND] error channel full, dropping: {}", err);
            }
        }
    }
}

async fn handshake(
    transport: &Transport,
    cancel: &CancellationToken,
    options: &AmiConnectOptions,
) -> AmiResult<()> {
    debug!("[LOGIN] waiting for banner");
    let banner = transport
        .recv_line(cancel)
        .await?;
    let banner = banner.trim();
    if !banner.starts_with(BANNER_PREFIX) {
        warn!("[LOGIN] unexpected greeting {:?}", banner);
        return Err(AmiError::InvalidPrompt {
            line: banner.to_string(),
        });
    }
    debug!("[LOGIN] server greeting: {}", banner);

    let login = Command::login(
        &options.username,
        &options.secret,
        options
            .events
            .as_deref(),
    );
    debug!("[LOGIN] sending {}", login.redacted_wire());
    transport
        .write(
            login
                .to_wire_format()?
                .as_bytes(),
        )
        .await?;

    let raw = transport
        .recv_frame(cancel)
        .await?;
    let reply = parse_frame(&raw)?;
    if !reply.is_success() {
        let message = reply
            .message()
            .or_else(|| reply.header(AmiHeader::Response))
            .unwrap_or("no response")
            .to_string();
        warn!("[LOGIN] rejected: {}", message);
        return Err(AmiError::LoginFailed { message });
    }
    info!("[LOGIN] authenticated as {}", options.username);
    Ok(())
}

struct ReaderContext {
    transport: Arc<Transport>,
    bus: Arc<PubSub>,
    correlator: Correlator,
    dictionary: Option<Dictionary>,
    error_tx: mpsc::Sender<AmiError>,
    state_tx: Arc<watch::Sender<SessionState>>,
    cancel: CancellationToken,
}

/// Background reader. Owns its clone of the error sender, so the error
/// channel only closes after this task has returned.
async fn reader_loop(ctx: ReaderContext) {
    let run = std::panic::AssertUnwindSafe(reader_loop_inner(&ctx));
    let failure = match futures_util::FutureExt::catch_unwind(run).await {
        Ok(failure) => failure,
        Err(_) => {
            tracing::error!("[READER] task panicked");
            Some("reader task panicked".to_string())
        }
    };

    ctx.correlator
        .fail_all();
    ctx.bus
        .destroy();

    if let Some(reason) = failure {
        advance(
            &ctx.state_tx,
            SessionState::Closed(CloseReason::ConnectionLost(reason.clone())),
        );
        if ctx
            .error_tx
            .try_send(AmiError::Network(reason))
            .is_err()
        {
            warn!("[READER] error channel full, connection loss not reported");
        }
    }
}

/// Returns the failure reason when the connection was lost, `None` when
/// cancelled.
async fn reader_loop_inner(ctx: &ReaderContext) -> Option<String> {
    loop {
        let raw = match ctx
            .transport
            .recv_frame(&ctx.cancel)
            .await
        {
            Ok(raw) => raw,
            Err(AmiError::Cancelled) => {
                debug!("[READER] cancelled");
                return None;
            }
            Err(AmiError::Network(reason)) => {
                warn!("[READER] connection lost: {}", reason);
                return Some(reason);
            }
            Err(e) => {
                warn!("[READER] dropping frame: {}", e);
                continue;
            }
        };

        let mut message = match parse_frame(&raw) {
            Ok(m) => m,
            Err(e) => {
                warn!("[READER] dropping malformed frame: {}", e);
                continue;
            }
        };

        // correlate on raw names, translate afterwards
        let waiter = if message.is_response() {
            ctx.correlator
                .take_waiter(&message)
        } else {
            None
        };
        if let Some(dictionary) = &ctx.dictionary {
            dictionary.apply(&mut message);
        }
        if let Some(tx) = waiter {
            if tx
                .send(message.clone())
                .is_err()
            {
                debug!("[READER] reply waiter went away");
            }
        }

        if !ctx
            .bus
            .publish(&message)
        {
            debug!("[READER] bus destroyed");
        }
    }
}
