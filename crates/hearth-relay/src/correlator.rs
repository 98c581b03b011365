use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use hashbrown::HashMap;

use hearth::envelope::Envelope;

use tokio::sync::oneshot;

use tracing::{debug, warn};

use crate::error::{Error, ErrorKind, Result};

// A delivery slot, tagged with the sequence number of the call owning it.
type Slot = (u64, oneshot::Sender<Envelope>);

#[derive(Debug, Default)]
struct PendingTable {
    slots: Mutex<HashMap<String, Slot>>,
    sequence: AtomicU64,
}

impl PendingTable {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The outcome of [`Correlator::resolve`].
#[derive(Debug, PartialEq)]
pub enum Resolution {
    /// The envelope was a reply and has been delivered to its caller.
    Delivered,
    /// No call awaits the envelope, which must be routed as a new inbound
    /// message.
    Unmatched(Envelope),
}

impl Resolution {
    /// Checks whether the envelope has been delivered.
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Maps the identifiers of outstanding requests to their eventual replies.
///
/// The correlator is owned by a connection. Every inbound envelope is
/// offered to [`Correlator::resolve`] before any provider routing happens,
/// so that a single connection multiplexes request/reply and push
/// traffic.
#[derive(Debug, Clone, Default)]
pub struct Correlator {
    table: Arc<PendingTable>,
}

impl Correlator {
    /// Creates an empty [`Correlator`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a [`PendingCall`] for the given identifier.
    ///
    /// Registration must happen **before** the request is sent, otherwise
    /// a fast reply could be routed as an inbound message.
    ///
    /// # Errors
    ///
    /// Another call with the same identifier is still waiting for its
    /// reply. Identifiers derived from identical payloads collide, and
    /// delivering one reply to two callers is not possible.
    pub fn register(&self, id: &str) -> Result<PendingCall> {
        let (sender, receiver) = oneshot::channel();
        let sequence = self.table.sequence.fetch_add(1, Ordering::Relaxed);

        let mut slots = self.table.lock();
        if slots.contains_key(id) {
            warn!("A call with identifier `{id}` is already waiting for its reply");
            return Err(Error::new(
                ErrorKind::DuplicateId,
                format!("A call with identifier `{id}` is already pending"),
            ));
        }
        let _ = slots.insert(id.to_owned(), (sequence, sender));

        Ok(PendingCall {
            id: id.to_owned(),
            sequence,
            receiver,
            table: Arc::clone(&self.table),
        })
    }

    /// Registers a call and waits for its reply.
    ///
    /// # Errors
    ///
    /// - A call with the same identifier is already pending
    /// - No reply arrived before the timeout
    /// - The connection has been shut down
    pub async fn await_reply(&self, id: &str, timeout: Duration) -> Result<Envelope> {
        self.register(id)?.wait(timeout).await
    }

    /// Delivers the envelope to the call awaiting its identifier, if any.
    pub fn resolve(&self, envelope: Envelope) -> Resolution {
        let slot = self.table.lock().remove(envelope.id.as_str());

        let Some((_, sender)) = slot else {
            return Resolution::Unmatched(envelope);
        };

        if let Err(envelope) = sender.send(envelope) {
            debug!(
                "The caller of `{}` stopped waiting, discard the reply",
                envelope.id
            );
        }

        Resolution::Delivered
    }

    /// Fails all outstanding calls.
    ///
    /// Every waiting caller returns immediately with a
    /// [`ErrorKind::Closed`] error.
    pub fn fail_all(&self) {
        let mut slots = self.table.lock();
        if !slots.is_empty() {
            debug!("Failing {} outstanding calls", slots.len());
        }
        slots.clear();
    }

    /// Returns the number of outstanding calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    /// Checks whether no call is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }

    /// Checks whether a call with the given identifier is outstanding.
    #[must_use]
    pub fn is_pending(&self, id: &str) -> bool {
        self.table.lock().contains_key(id)
    }
}

/// A request awaiting its correlated reply.
///
/// Dropping a [`PendingCall`] unregisters it, hence the table never grows
/// with abandoned or timed out calls.
#[derive(Debug)]
pub struct PendingCall {
    id: String,
    sequence: u64,
    receiver: oneshot::Receiver<Envelope>,
    table: Arc<PendingTable>,
}

impl PendingCall {
    /// Returns the identifier of the awaited reply.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Waits for the reply until the timeout elapses.
    ///
    /// # Errors
    ///
    /// - No reply arrived before the timeout
    /// - All outstanding calls have been failed by a shutdown
    pub async fn wait(mut self, timeout: Duration) -> Result<Envelope> {
        match tokio::time::timeout(timeout, &mut self.receiver).await {
            Ok(Ok(envelope)) => Ok(envelope),
            Ok(Err(_)) => Err(Error::new(
                ErrorKind::Closed,
                format!("Connection closed while waiting for `{}`", self.id),
            )),
            Err(_) => Err(Error::new(
                ErrorKind::Timeout,
                format!(
                    "No reply for `{}` within {} ms",
                    self.id,
                    timeout.as_millis()
                ),
            )),
        }
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        let mut slots = self.table.lock();
        // Another call may have registered the same identifier after this
        // one was resolved.
        if slots
            .get(self.id.as_str())
            .is_some_and(|(sequence, _)| *sequence == self.sequence)
        {
            let _ = slots.remove(self.id.as_str());
        }
    }
}
