use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::error::{Error, ErrorKind};

use super::{FrameFuture, FrameSink, FrameStream, Transport};

#[derive(Debug)]
enum Signal {
    Frame(String),
    Failure(String),
}

/// The write half of an in-memory channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Option<UnboundedSender<Signal>>,
}

impl ChannelSink {
    /// Makes the next read on the peer stream fail with a transport error.
    ///
    /// Useful to simulate an abnormal closure.
    pub fn fail(&self, description: impl Into<String>) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(Signal::Failure(description.into()));
        }
    }
}

impl FrameSink for ChannelSink {
    fn send_frame(&mut self, frame: String) -> FrameFuture<'_, ()> {
        let result = match &self.sender {
            Some(sender) => sender
                .send(Signal::Frame(frame))
                .map_err(|_| Error::new(ErrorKind::Transport, "Channel peer dropped")),
            None => Err(Error::new(ErrorKind::Transport, "Channel closed")),
        };
        Box::pin(std::future::ready(result))
    }

    fn close(&mut self) -> FrameFuture<'_, ()> {
        self.sender = None;
        Box::pin(std::future::ready(Ok(())))
    }
}

/// The read half of an in-memory channel.
#[derive(Debug)]
pub struct ChannelStream {
    receiver: UnboundedReceiver<Signal>,
}

impl FrameStream for ChannelStream {
    fn next_frame(&mut self) -> FrameFuture<'_, Option<String>> {
        Box::pin(async move {
            match self.receiver.recv().await {
                Some(Signal::Frame(frame)) => Ok(Some(frame)),
                Some(Signal::Failure(description)) => {
                    Err(Error::new(ErrorKind::Transport, description))
                }
                None => Ok(None),
            }
        })
    }
}

/// Creates two connected channel endpoints.
///
/// Frames written to the sink of an endpoint are read, in order, from the
/// stream of the other one.
#[must_use]
pub fn pair() -> ((ChannelSink, ChannelStream), (ChannelSink, ChannelStream)) {
    let (left_sender, left_receiver) = mpsc::unbounded_channel();
    let (right_sender, right_receiver) = mpsc::unbounded_channel();

    (
        (
            ChannelSink {
                sender: Some(right_sender),
            },
            ChannelStream {
                receiver: left_receiver,
            },
        ),
        (
            ChannelSink {
                sender: Some(left_sender),
            },
            ChannelStream {
                receiver: right_receiver,
            },
        ),
    )
}

/// Creates two connected [`Transport`]s.
#[must_use]
pub fn transport_pair() -> (Transport, Transport) {
    let ((left_sink, left_stream), (right_sink, right_stream)) = pair();
    (
        Transport::new(left_sink, left_stream),
        Transport::new(right_sink, right_stream),
    )
}
