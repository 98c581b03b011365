use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;

use core::fmt;

use serde::{Deserialize, Serialize};

use sha2::{Digest, Sha256};

/// The action carried by every envelope which signals a failure.
///
/// The payload of such an envelope is a human-readable message and never
/// domain data.
pub const ERROR_ACTION: &str = "error";

/// The tracing entry holding the identifier of a distributed trace.
pub const TRACE_ID: &str = "trace_id";

/// A distributed-trace context propagated across the relay.
pub type Tracing = BTreeMap<String, String>;

/// Generates a correlation identifier from the content of a payload.
///
/// The identifier is the lowercase hexadecimal `SHA-256` digest of the
/// payload bytes, hence two identical payloads always share the same
/// identifier.
#[must_use]
pub fn content_id(payload: &str) -> String {
    let digest = Sha256::digest(payload.as_bytes());
    format!("{digest:x}")
}

/// The message unit exchanged over a relay connection.
///
/// Each transport frame carries exactly one envelope, with the single
/// exception of the handshake frame described in [`crate::secret`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Correlation key.
    ///
    /// A reply reuses the identifier of its request verbatim.
    pub id: String,
    /// The device family owning this message.
    pub source: String,
    /// The operation within the device family.
    pub action: String,
    /// Opaque data, usually `JSON` encoded.
    #[serde(default)]
    pub payload: String,
    /// Distributed-trace context.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tracing: Option<Tracing>,
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "[{}] {}/{} ({} bytes)",
            self.id,
            self.source,
            self.action,
            self.payload.len()
        )
    }
}

impl Envelope {
    /// Creates an [`Envelope`] whose identifier is derived from the
    /// payload content.
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        action: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        let payload = payload.into();
        Self {
            id: content_id(&payload),
            source: source.into(),
            action: action.into(),
            payload,
            tracing: None,
        }
    }

    /// Creates an [`Envelope`] with an explicit identifier.
    #[must_use]
    pub fn with_id(
        id: impl Into<String>,
        source: impl Into<String>,
        action: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            action: action.into(),
            payload: payload.into(),
            tracing: None,
        }
    }

    /// Creates an unsolicited error [`Envelope`] for the given source.
    ///
    /// The identifier is derived from the error message.
    #[must_use]
    pub fn failure(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(source, ERROR_ACTION, message)
    }

    /// Attaches a distributed-trace context.
    #[must_use]
    #[inline]
    pub fn with_tracing(mut self, tracing: Tracing) -> Self {
        self.tracing = Some(tracing);
        self
    }

    /// Builds the reply to this envelope.
    ///
    /// The reply keeps the identifier, the source, and the trace context of
    /// this envelope.
    #[must_use]
    pub fn reply(&self, action: impl Into<String>, payload: impl Into<String>) -> Self {
        self.reply_from(self.source.as_str(), action, payload)
    }

    /// Builds the reply to this envelope on behalf of another source.
    #[must_use]
    pub fn reply_from(
        &self,
        source: impl Into<String>,
        action: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            id: self.id.clone(),
            source: source.into(),
            action: action.into(),
            payload: payload.into(),
            tracing: self.tracing.clone(),
        }
    }

    /// Builds the error reply to this envelope.
    #[must_use]
    pub fn error(&self, message: impl Into<String>) -> Self {
        self.reply(ERROR_ACTION, message)
    }

    /// Checks whether this envelope signals a failure.
    #[must_use]
    #[inline]
    pub fn is_error(&self) -> bool {
        self.action == ERROR_ACTION
    }

    /// Returns the distributed-trace identifier, if any.
    #[must_use]
    pub fn trace_id(&self) -> Option<&str> {
        self.tracing
            .as_ref()
            .and_then(|tracing| tracing.get(TRACE_ID))
            .map(String::as_str)
    }

    /// Serializes the envelope into a transport frame.
    ///
    /// # Errors
    ///
    /// Serialization fails only if the envelope cannot be represented as
    /// `JSON`, which cannot happen for string fields.
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserializes an envelope from a transport frame.
    ///
    /// # Errors
    ///
    /// The frame is not a `JSON` object containing at least the `id`,
    /// `source`, and `action` fields.
    pub fn decode(frame: &str) -> serde_json::Result<Self> {
        serde_json::from_str(frame)
    }

    /// Returns the identifier.
    #[must_use]
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Consumes the envelope, returning its payload.
    #[must_use]
    #[inline]
    pub fn into_payload(self) -> String {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::{String, ToString};

    use serde_json::json;

    use crate::{deserialize, serialize};

    use super::{ERROR_ACTION, Envelope, TRACE_ID, Tracing, content_id};

    fn tracing() -> Tracing {
        let mut tracing = Tracing::new();
        let _ = tracing.insert(TRACE_ID.into(), "4bf92f3577b34da6".into());
        tracing
    }

    #[test]
    fn test_content_id() {
        // SHA-256 of the empty string.
        assert_eq!(
            content_id(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(content_id("[1,2]"), content_id("[1,2]"));
        assert_ne!(content_id("[1,2]"), content_id("[2,1]"));
    }

    #[test]
    fn test_new_envelope() {
        let envelope = Envelope::new("hue", "groups", "{}");

        assert_eq!(envelope.id, content_id("{}"));
        assert_eq!(envelope.source, "hue");
        assert_eq!(envelope.action, "groups");
        assert!(!envelope.is_error());
        assert_eq!(envelope.trace_id(), None);
    }

    #[test]
    fn test_reply_keeps_id_and_tracing() {
        let request = Envelope::with_id("abc", "hue", "groups", "").with_tracing(tracing());

        let reply = request.reply("groups", r#"[{"id":"1"}]"#);
        assert_eq!(reply.id, "abc");
        assert_eq!(reply.source, "hue");
        assert_eq!(reply.trace_id(), Some("4bf92f3577b34da6"));

        let reply = request.reply_from("dyson", "devices", "[]");
        assert_eq!(reply.id, "abc");
        assert_eq!(reply.source, "dyson");
    }

    #[test]
    fn test_error_envelope() {
        let request = Envelope::with_id("abc", "hue", "groups", "");
        let error = request.error("group not found");

        assert_eq!(
            error,
            Envelope::with_id("abc", "hue", ERROR_ACTION, "group not found")
        );
        assert!(error.is_error());

        let failure = Envelope::failure("netatmo", "token expired");
        assert_eq!(failure.id, content_id("token expired"));
        assert!(failure.is_error());
    }

    #[test]
    fn test_wire_format() {
        let envelope = Envelope::with_id("abc", "hue", "groups", "{}");
        assert_eq!(
            serialize(&envelope),
            json!({
                "id": "abc",
                "source": "hue",
                "action": "groups",
                "payload": "{}",
            })
        );

        let envelope = envelope.with_tracing(tracing());
        assert_eq!(
            serialize(&envelope),
            json!({
                "id": "abc",
                "source": "hue",
                "action": "groups",
                "payload": "{}",
                "tracing": { "trace_id": "4bf92f3577b34da6" },
            })
        );
        assert_eq!(deserialize::<Envelope>(serialize(&envelope)), envelope);
    }

    #[test]
    fn test_decode() {
        // A missing payload is an empty payload.
        let envelope = Envelope::decode(r#"{"id":"x","source":"sonos","action":"groups"}"#).unwrap();
        assert_eq!(envelope, Envelope::with_id("x", "sonos", "groups", ""));

        // The handshake secret is not an envelope.
        assert!(Envelope::decode("s3cr3t").is_err());
        // Missing mandatory fields.
        assert!(Envelope::decode(r#"{"id":"x","payload":"{}"}"#).is_err());
    }

    #[test]
    fn test_encode_decode_frame() {
        let envelope = Envelope::new("dyson", "devices", "[]").with_tracing(tracing());
        let frame = envelope.encode().unwrap();

        assert_eq!(Envelope::decode(&frame).unwrap(), envelope);
        assert_eq!(
            envelope.to_string(),
            String::from("[") + &content_id("[]") + "] dyson/devices (2 bytes)"
        );
    }
}
