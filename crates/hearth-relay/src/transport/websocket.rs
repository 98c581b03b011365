use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};

use tokio::io::{AsyncRead, AsyncWrite};

use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, connect_async};

use tracing::{debug, warn};

use crate::error::{Error, ErrorKind, Result};

use super::{FrameFuture, FrameSink, FrameStream, Transport};

/// The write half of a `WebSocket`.
///
/// Every frame is transmitted as a text message.
pub struct WebSocketSink<S> {
    inner: SplitSink<WebSocketStream<S>, Message>,
}

impl<S> FrameSink for WebSocketSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn send_frame(&mut self, frame: String) -> FrameFuture<'_, ()> {
        Box::pin(async move {
            self.inner
                .send(Message::text(frame))
                .await
                .map_err(Error::from)
        })
    }

    fn close(&mut self) -> FrameFuture<'_, ()> {
        Box::pin(async move { self.inner.close().await.map_err(Error::from) })
    }
}

/// The read half of a `WebSocket`.
///
/// Text messages are returned as frames, binary messages only when they
/// contain valid `UTF-8` data. A close message ends the stream.
pub struct WebSocketFrames<S> {
    inner: SplitStream<WebSocketStream<S>>,
}

impl<S> FrameStream for WebSocketFrames<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn next_frame(&mut self) -> FrameFuture<'_, Option<String>> {
        Box::pin(async move {
            while let Some(message) = self.inner.next().await {
                let message = match message {
                    Ok(message) => message,
                    Err(e) => return Err(Error::from(e)),
                };
                match message {
                    Message::Text(text) => return Ok(Some(text.as_str().to_owned())),
                    Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                        Ok(frame) => return Ok(Some(frame)),
                        Err(e) => warn!("Discard binary message which is not UTF-8: {e}"),
                    },
                    Message::Close(close) => {
                        debug!("Close message received: {close:?}");
                        return Ok(None);
                    }
                    // Pings are answered by `tungstenite` itself.
                    Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
                }
            }
            Ok(None)
        })
    }
}

/// Splits an established `WebSocket` into a [`Transport`].
#[must_use]
pub fn transport<S>(socket: WebSocketStream<S>) -> Transport
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, stream) = socket.split();
    Transport::new(
        WebSocketSink { inner: sink },
        WebSocketFrames { inner: stream },
    )
}

/// Dials a `WebSocket` endpoint, such as `ws://hub.example.org:8080/ws`.
///
/// # Errors
///
/// The endpoint is not a valid `WebSocket` address, the server cannot be
/// reached, or the `WebSocket` upgrade is refused.
pub async fn dial(endpoint: &str) -> Result<Transport> {
    let (socket, response) = connect_async(endpoint).await.map_err(|e| {
        Error::new(
            ErrorKind::Transport,
            format!("Impossible to dial `{endpoint}`: {e}"),
        )
    })?;

    debug!("WebSocket upgrade answered with status {}", response.status());

    Ok(transport(socket))
}
