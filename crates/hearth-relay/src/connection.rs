use std::sync::Arc;
use std::time::Duration;

use hearth::envelope::Envelope;
use hearth::secret::Secret;

use tokio::sync::{Mutex, watch};

use tokio_util::sync::CancellationToken;

use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::DEFAULT_CALL_TIMEOUT;
use crate::correlator::{Correlator, Resolution};
use crate::dispatcher::Dispatcher;
use crate::error::{Error, ErrorKind, Result};
use crate::registry::Registry;
use crate::transport::{FrameSink, FrameStream, Transport};

// Maximum time spent closing the transport during a shutdown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

// Maximum time a hub waits for the secret frame of a worker.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// The lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected yet.
    Disconnected,
    /// Dialing the peer.
    Connecting,
    /// Exchanging the handshake frame.
    Authenticating,
    /// Envelope traffic is allowed.
    Active,
    /// Shutting down. Outstanding calls are being failed.
    Draining,
    /// Shut down.
    Closed,
}

impl ConnectionState {
    const fn name(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Active => "active",
            Self::Draining => "draining",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The side of the relay a [`Connection`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The public endpoint issuing commands and caching pushed state.
    Hub,
    /// The private endpoint dialing the hub and executing commands.
    Worker,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Hub => "Hub",
            Self::Worker => "Worker",
        })
    }
}

/// A relay connection between a hub and its worker.
///
/// A connection owns the transport. Its read loop offers each inbound
/// envelope to the correlator first, and routes the envelopes no call awaits
/// to the provider registry. All outbound writes, whether commands, replies
/// or heartbeats, go through a single writer lock.
///
/// On a worker, each command is executed in its own task, so a slow
/// provider never stalls the read loop. On a hub, inbound pushes are
/// consumed in transport order.
pub struct Connection {
    role: Role,
    sink: Mutex<Option<Box<dyn FrameSink>>>,
    correlator: Correlator,
    dispatcher: Dispatcher,
    done: CancellationToken,
    state: watch::Sender<ConnectionState>,
    call_timeout: Duration,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("role", &self.role)
            .field("state", &self.state())
            .field("pending_calls", &self.correlator.len())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Creates a [`Connection`] in the [`ConnectionState::Disconnected`]
    /// state.
    #[must_use]
    pub fn new(role: Role, registry: Arc<Registry>) -> Self {
        Self {
            role,
            sink: Mutex::new(None),
            correlator: Correlator::new(),
            dispatcher: Dispatcher::new(registry),
            done: CancellationToken::new(),
            state: watch::Sender::new(ConnectionState::Disconnected),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Sets the maximum time a correlated call waits for its reply.
    #[must_use]
    pub fn call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Dials the peer, then sends the shared secret as the first frame.
    ///
    /// The connection is [`ConnectionState::Active`] once the secret has
    /// been written. A failure is never retried.
    ///
    /// # Errors
    ///
    /// The dial fails, or the secret cannot be written.
    pub async fn connect<F>(self, dial: F, secret: Secret) -> Result<Arc<Self>>
    where
        F: Future<Output = Result<Transport>>,
    {
        self.set_state(ConnectionState::Connecting);

        let transport = match dial.await {
            Ok(transport) => transport,
            Err(e) => {
                error!("Dial failed: {e}");
                self.set_state(ConnectionState::Closed);
                return Err(e);
            }
        };

        let (mut sink, stream) = transport.split();

        self.set_state(ConnectionState::Authenticating);
        if let Err(e) = sink.send_frame(secret.into_frame()).await {
            error!("Impossible to send the secret: {e}");
            let _ = sink.close().await;
            self.set_state(ConnectionState::Closed);
            return Err(Error::new(
                ErrorKind::Handshake,
                format!("Impossible to send the secret: {}", e.description()),
            ));
        }

        Ok(self.activate(sink, stream))
    }

    /// Accepts a transport dialed by a worker.
    ///
    /// The first frame is read as the shared secret. Its content is **not**
    /// validated.
    ///
    /// # Errors
    ///
    /// The transport fails or closes before the secret frame arrives, or the
    /// secret frame does not arrive within 10 seconds.
    pub async fn accept(self, transport: Transport) -> Result<Arc<Self>> {
        let (mut sink, mut stream) = transport.split();

        self.set_state(ConnectionState::Authenticating);
        let frame = tokio::time::timeout(HANDSHAKE_TIMEOUT, stream.next_frame()).await;
        let failure = match frame {
            Ok(Ok(Some(secret))) => {
                debug!("Received a secret of {} bytes", secret.len());
                return Ok(self.activate(sink, stream));
            }
            Ok(Ok(None)) => "Peer closed the connection before the handshake".to_owned(),
            Ok(Err(e)) => format!("Impossible to read the secret: {}", e.description()),
            Err(_) => format!(
                "No secret received within {} s",
                HANDSHAKE_TIMEOUT.as_secs()
            ),
        };

        error!("{failure}");
        let _ = sink.close().await;
        self.set_state(ConnectionState::Closed);
        Err(Error::new(ErrorKind::Handshake, failure))
    }

    /// Attaches an already established transport, without any handshake.
    ///
    /// Used by a hub over `MQTT`, where the worker may have published its
    /// secret before the hub subscribed. A secret frame received later is
    /// discarded as a malformed envelope.
    #[must_use]
    pub fn attach(self, transport: Transport) -> Arc<Self> {
        let (sink, stream) = transport.split();
        self.activate(sink, stream)
    }

    fn activate(mut self, sink: Box<dyn FrameSink>, stream: Box<dyn FrameStream>) -> Arc<Self> {
        *self.sink.get_mut() = Some(sink);
        self.set_state(ConnectionState::Active);

        let connection = Arc::new(self);
        drop(tokio::spawn(Arc::clone(&connection).read_loop(stream)));
        connection
    }

    /// Sends an envelope.
    ///
    /// Safe to call concurrently: frames are written one at a time.
    ///
    /// # Errors
    ///
    /// - The connection is not [`ConnectionState::Active`]
    /// - The transport write fails, which also shuts the connection down
    pub async fn send(&self, envelope: &Envelope) -> Result<()> {
        self.ensure_active()?;

        let frame = envelope
            .encode()
            .map_err(|e| Error::new(ErrorKind::Encode, e.to_string()))?;

        let result = {
            let mut sink = self.sink.lock().await;
            match sink.as_mut() {
                Some(sink) => sink.send_frame(frame).await,
                None => Err(Error::new(ErrorKind::Closed, "Connection closed")),
            }
        };

        if let Err(e) = &result {
            error!("Impossible to send {envelope}: {e}");
            self.shutdown().await;
        }

        result
    }

    /// Sends a request and waits for the correlated reply, within the
    /// configured call timeout.
    ///
    /// # Errors
    ///
    /// - The connection is not [`ConnectionState::Active`]
    /// - A call with the same identifier is already pending
    /// - The request cannot be written
    /// - No reply arrived in time, or the connection has been shut down
    /// - The peer answered with an error envelope, whose payload becomes the
    ///   error description
    pub async fn call(&self, request: Envelope) -> Result<Envelope> {
        self.call_with_timeout(request, self.call_timeout).await
    }

    /// Sends a request and waits for the correlated reply, within the given
    /// timeout.
    ///
    /// # Errors
    ///
    /// Same as [`Connection::call`].
    pub async fn call_with_timeout(&self, request: Envelope, timeout: Duration) -> Result<Envelope> {
        self.ensure_active()?;

        let pending = self.correlator.register(&request.id)?;
        // A shutdown may have failed all calls right before the registration.
        if self.done.is_cancelled() {
            return Err(Error::new(ErrorKind::Closed, "Connection closed"));
        }

        self.send(&request).await?;

        let reply = pending.wait(timeout).await?;
        if reply.is_error() {
            return Err(Error::new(ErrorKind::Remote, reply.into_payload()));
        }

        Ok(reply)
    }

    /// Shuts the connection down.
    ///
    /// The cancellation signal is raised, every pending call fails at once
    /// and the transport is closed. Calling it again has no effect.
    pub async fn shutdown(&self) {
        let draining = self.state.send_if_modified(|state| {
            if matches!(state, ConnectionState::Draining | ConnectionState::Closed) {
                false
            } else {
                debug!("{} connection: {state} -> draining", self.role);
                *state = ConnectionState::Draining;
                true
            }
        });

        if !draining {
            return;
        }

        self.done.cancel();
        self.correlator.fail_all();

        let closed = tokio::time::timeout(CLOSE_TIMEOUT, async {
            if let Some(mut sink) = self.sink.lock().await.take()
                && let Err(e) = sink.close().await
            {
                debug!("Transport close failed: {e}");
            }
        })
        .await;

        if closed.is_err() {
            warn!("Transport not closed within {} s", CLOSE_TIMEOUT.as_secs());
        }

        self.set_state(ConnectionState::Closed);
        info!("{} connection closed", self.role);
    }

    /// Returns the side of the relay.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Returns a receiver notified on each lifecycle transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Waits until the connection is [`ConnectionState::Closed`].
    pub async fn closed(&self) {
        let mut receiver = self.state.subscribe();
        let _ = receiver
            .wait_for(|state| *state == ConnectionState::Closed)
            .await;
    }

    /// Returns a token cancelled as soon as the connection shuts down.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.done.child_token()
    }

    /// Returns the number of calls waiting for their reply.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.correlator.len()
    }

    /// Returns the provider registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        self.dispatcher.registry()
    }

    fn ensure_active(&self) -> Result<()> {
        let state = self.state();
        if state == ConnectionState::Active {
            Ok(())
        } else {
            Err(Error::new(
                ErrorKind::NotActive,
                format!("{} connection is {state}", self.role),
            ))
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("{} connection: {previous} -> {state}", self.role);
        }
    }

    async fn read_loop(self: Arc<Self>, mut stream: Box<dyn FrameStream>) {
        loop {
            let frame = tokio::select! {
                // Use the cancellation token to stop the loop
                () = self.done.cancelled() => break,
                frame = stream.next_frame() => frame,
            };

            let frame = match frame {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("Peer closed the connection");
                    break;
                }
                Err(e) => {
                    error!("Read failure: {e}");
                    break;
                }
            };

            match Envelope::decode(&frame) {
                Ok(envelope) => self.route(envelope).await,
                Err(e) => warn!("Discard malformed frame of {} bytes: {e}", frame.len()),
            }
        }

        self.shutdown().await;
    }

    async fn route(self: &Arc<Self>, envelope: Envelope) {
        let Resolution::Unmatched(envelope) = self.correlator.resolve(envelope) else {
            return;
        };

        match self.role {
            Role::Hub => {
                if let Some(answer) = self.dispatcher.dispatch(envelope).await {
                    // Uncorrelated traffic is never answered by a hub.
                    if answer.is_error() {
                        warn!("Uncorrelated envelope rejected: {}", answer.payload);
                    } else {
                        debug!("Discard {answer}");
                    }
                }
            }
            Role::Worker => {
                let span = info_span!(
                    "command",
                    id = %envelope.id,
                    source = %envelope.source,
                    action = %envelope.action,
                    trace_id = envelope.trace_id().unwrap_or_default(),
                );

                let connection = Arc::clone(self);
                drop(tokio::spawn(
                    async move {
                        let Some(reply) = connection.dispatcher.dispatch(envelope).await else {
                            return;
                        };
                        if let Err(e) = connection.send(&reply).await {
                            warn!("Reply {reply} not sent: {e}");
                        }
                    }
                    .instrument(span),
                ));
            }
        }
    }
}
