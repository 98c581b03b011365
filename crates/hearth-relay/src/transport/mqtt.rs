use std::time::Duration;

use rumqttc::v5::{
    AsyncClient, Event, EventLoop, MqttOptions, mqttbytes::QoS, mqttbytes::v5::Packet,
};

use tracing::{debug, info, warn};

use crate::error::{Error, ErrorKind, Result};

use super::{FrameFuture, FrameSink, FrameStream, Transport};

// The capacity of the bounded asynchronous channel.
const ASYNC_CHANNEL_CAPACITY: usize = 10;

// Keep alive time to send `pingreq` to broker when the connection is idle.
const KEEP_ALIVE_TIME: Duration = Duration::from_secs(5);

// Default broker port.
const DEFAULT_BROKER_PORT: u16 = 1883;

/// Configuration of an `MQTT` transport.
///
/// Each endpoint publishes its frames on one topic and subscribes to
/// another, hence a hub and its worker use mirrored configurations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttConfig {
    host: String,
    port: u16,
    client_id: String,
    publish_topic: String,
    subscribe_topic: String,
    keep_alive: Duration,
}

impl MqttConfig {
    /// Creates an [`MqttConfig`] for the given broker host.
    ///
    /// The broker port defaults to `1883`.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        client_id: impl Into<String>,
        publish_topic: impl Into<String>,
        subscribe_topic: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_BROKER_PORT,
            client_id: client_id.into(),
            publish_topic: publish_topic.into(),
            subscribe_topic: subscribe_topic.into(),
            keep_alive: KEEP_ALIVE_TIME,
        }
    }

    /// Sets the broker port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the keep alive interval.
    #[must_use]
    pub const fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Returns the mirrored configuration for the peer endpoint.
    ///
    /// Topics are swapped, so that what this endpoint publishes is what the
    /// peer subscribes to.
    #[must_use]
    pub fn mirrored(&self, client_id: impl Into<String>) -> Self {
        Self {
            host: self.host.clone(),
            port: self.port,
            client_id: client_id.into(),
            publish_topic: self.subscribe_topic.clone(),
            subscribe_topic: self.publish_topic.clone(),
            keep_alive: self.keep_alive,
        }
    }

    /// Returns the topic frames are published on.
    #[must_use]
    pub fn publish_topic(&self) -> &str {
        &self.publish_topic
    }

    /// Returns the topic frames are received from.
    #[must_use]
    pub fn subscribe_topic(&self) -> &str {
        &self.subscribe_topic
    }
}

/// The write half of an `MQTT` transport.
pub struct MqttSink {
    client: AsyncClient,
    topic: String,
}

impl FrameSink for MqttSink {
    fn send_frame(&mut self, frame: String) -> FrameFuture<'_, ()> {
        Box::pin(async move {
            self.client
                .publish(self.topic.clone(), QoS::AtLeastOnce, false, frame.into_bytes())
                .await
                .map_err(Error::from)
        })
    }

    fn close(&mut self) -> FrameFuture<'_, ()> {
        Box::pin(async move { self.client.disconnect().await.map_err(Error::from) })
    }
}

/// The read half of an `MQTT` transport.
///
/// Polling the event loop also drives outgoing publications, so the stream
/// must be read continuously for the sink to make progress.
pub struct MqttFrames {
    eventloop: EventLoop,
    topic: String,
}

impl FrameStream for MqttFrames {
    fn next_frame(&mut self) -> FrameFuture<'_, Option<String>> {
        Box::pin(async move {
            loop {
                let event = self.eventloop.poll().await.map_err(Error::from)?;

                match parse_event(event, &self.topic) {
                    Incoming::Frame(frame) => return Ok(Some(frame)),
                    Incoming::Closed => return Ok(None),
                    Incoming::Ignored => {}
                }
            }
        })
    }
}

// What an event loop notification means for the frame stream.
#[derive(Debug, PartialEq, Eq)]
enum Incoming {
    Frame(String),
    Closed,
    Ignored,
}

#[inline]
fn parse_event(event: Event, topic: &str) -> Incoming {
    let packet = match event {
        Event::Incoming(packet) => packet,
        Event::Outgoing(_) => return Incoming::Ignored,
    };

    match packet {
        Packet::Publish(publish) => {
            if publish.topic.as_ref() != topic.as_bytes() {
                debug!("Discard publication on an unexpected topic");
                return Incoming::Ignored;
            }
            match String::from_utf8(publish.payload.to_vec()) {
                Ok(frame) => Incoming::Frame(frame),
                Err(e) => {
                    warn!("Discard publication which is not UTF-8: {e}");
                    Incoming::Ignored
                }
            }
        }
        Packet::Disconnect(_) => {
            info!("Broker disconnected the client");
            Incoming::Closed
        }
        _ => Incoming::Ignored,
    }
}

/// Connects to an `MQTT` broker and subscribes to the inbound topic.
///
/// The function waits for the broker acknowledgement, so that an
/// unreachable broker is reported as a dial failure.
///
/// # Errors
///
/// The broker cannot be reached, refuses the connection, or the
/// subscription cannot be requested.
pub async fn connect(config: &MqttConfig) -> Result<Transport> {
    let mut options = MqttOptions::new(config.client_id.as_str(), config.host.as_str(), config.port);
    options.set_keep_alive(config.keep_alive);

    let (client, mut eventloop) = AsyncClient::new(options, ASYNC_CHANNEL_CAPACITY);

    // Wait for the connection acknowledgement.
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(Error::new(
                    ErrorKind::Transport,
                    format!(
                        "Impossible to reach the broker at `{}:{}`: {e}",
                        config.host, config.port
                    ),
                ));
            }
        }
    }

    client
        .subscribe(config.subscribe_topic.as_str(), QoS::AtLeastOnce)
        .await?;

    info!(
        "Connected to the broker at `{}:{}`, subscribed to `{}`",
        config.host, config.port, config.subscribe_topic
    );

    Ok(Transport::new(
        MqttSink {
            client,
            topic: config.publish_topic.clone(),
        },
        MqttFrames {
            eventloop,
            topic: config.subscribe_topic.clone(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rumqttc::v5::Event;
    use rumqttc::v5::mqttbytes::QoS;
    use rumqttc::v5::mqttbytes::v5::{
        Disconnect, DisconnectReasonCode, Packet, PingResp, Publish,
    };
    use rumqttc::Outgoing;

    use super::{Incoming, MqttConfig, parse_event};

    const TOPIC: &str = "hearth/commands";

    fn publication(topic: &str, payload: Vec<u8>) -> Event {
        Event::Incoming(Packet::Publish(Publish::new(
            topic,
            QoS::AtLeastOnce,
            payload,
            None,
        )))
    }

    #[test]
    fn test_mirrored_config() {
        let worker = MqttConfig::new("broker.local", "worker", "hearth/events", "hearth/commands")
            .port(1884)
            .keep_alive(Duration::from_secs(30));

        let hub = worker.mirrored("hub");

        assert_eq!(hub.publish_topic(), "hearth/commands");
        assert_eq!(hub.subscribe_topic(), "hearth/events");
        assert_eq!(hub.port, 1884);
        assert_eq!(hub.keep_alive, Duration::from_secs(30));
        assert_eq!(hub.mirrored("worker"), worker);
    }

    #[test]
    fn test_publication_on_inbound_topic() {
        let frame = r#"{"id":"1","source":"hue","action":"groups","payload":""}"#;

        assert_eq!(
            parse_event(publication(TOPIC, frame.as_bytes().to_vec()), TOPIC),
            Incoming::Frame(frame.into())
        );
    }

    #[test]
    fn test_ignored_events() {
        // Our own publications are echoed on the other topic.
        assert_eq!(
            parse_event(publication("hearth/events", b"{}".to_vec()), TOPIC),
            Incoming::Ignored
        );
        assert_eq!(
            parse_event(publication(TOPIC, vec![0xff, 0xfe, 0x00]), TOPIC),
            Incoming::Ignored
        );
        assert_eq!(
            parse_event(Event::Incoming(Packet::PingResp(PingResp)), TOPIC),
            Incoming::Ignored
        );
        assert_eq!(
            parse_event(Event::Outgoing(Outgoing::PingReq), TOPIC),
            Incoming::Ignored
        );
    }

    #[test]
    fn test_broker_disconnect() {
        let disconnect = Disconnect::new(DisconnectReasonCode::ServerShuttingDown);

        assert_eq!(
            parse_event(Event::Incoming(Packet::Disconnect(disconnect)), TOPIC),
            Incoming::Closed
        );
    }
}
