use std::pin::Pin;

use crate::error::Result;

/// An in-memory transport connecting two endpoints of the same process.
pub mod channel;
/// The `MQTT` transport.
pub mod mqtt;
/// The `WebSocket` transport.
pub mod websocket;

/// The future returned by transport operations.
pub type FrameFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// The write half of a transport.
///
/// A sink is never shared: the connection manager owns it behind its writer
/// lock, so implementations do not need to handle concurrent writes.
pub trait FrameSink: Send + 'static {
    /// Writes a single frame.
    fn send_frame(&mut self, frame: String) -> FrameFuture<'_, ()>;

    /// Closes the write half, notifying the peer when the transport allows
    /// it.
    fn close(&mut self) -> FrameFuture<'_, ()>;
}

/// The read half of a transport.
pub trait FrameStream: Send + 'static {
    /// Reads the next frame.
    ///
    /// Returns `None` once the peer has closed the transport.
    /// Control frames are handled internally and never returned.
    fn next_frame(&mut self) -> FrameFuture<'_, Option<String>>;
}

/// One ordered, reliable, message-oriented channel split into its two
/// halves.
pub struct Transport {
    pub(crate) sink: Box<dyn FrameSink>,
    pub(crate) stream: Box<dyn FrameStream>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Transport")
    }
}

impl Transport {
    /// Creates a [`Transport`] from its write and read halves.
    #[must_use]
    pub fn new(sink: impl FrameSink, stream: impl FrameStream) -> Self {
        Self {
            sink: Box::new(sink),
            stream: Box::new(stream),
        }
    }

    /// Splits the [`Transport`] into its write and read halves.
    #[must_use]
    pub fn split(self) -> (Box<dyn FrameSink>, Box<dyn FrameStream>) {
        (self.sink, self.stream)
    }
}
