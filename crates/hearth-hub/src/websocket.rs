use axum::extract::ws::{Message, WebSocket};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};

use hearth_relay::error::{Error, ErrorKind};
use hearth_relay::transport::{FrameFuture, FrameSink, FrameStream, Transport};

use tracing::{debug, warn};

fn transport_error(e: &axum::Error) -> Error {
    Error::new(ErrorKind::Transport, e.to_string())
}

struct Writer(SplitSink<WebSocket, Message>);

impl FrameSink for Writer {
    fn send_frame(&mut self, frame: String) -> FrameFuture<'_, ()> {
        Box::pin(async move {
            self.0
                .send(Message::Text(frame.into()))
                .await
                .map_err(|e| transport_error(&e))
        })
    }

    fn close(&mut self) -> FrameFuture<'_, ()> {
        Box::pin(async move { self.0.close().await.map_err(|e| transport_error(&e)) })
    }
}

struct Reader(SplitStream<WebSocket>);

impl FrameStream for Reader {
    fn next_frame(&mut self) -> FrameFuture<'_, Option<String>> {
        Box::pin(async move {
            while let Some(message) = self.0.next().await {
                let message = match message {
                    Ok(message) => message,
                    Err(e) => return Err(transport_error(&e)),
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
                    Message::Ping(_) | Message::Pong(_) => {}
                }
            }
            Ok(None)
        })
    }
}

/// Turns an upgraded `axum` WebSocket into a [`Transport`].
#[must_use]
pub fn transport(socket: WebSocket) -> Transport {
    let (sink, stream) = socket.split();
    Transport::new(Writer(sink), Reader(stream))
}
