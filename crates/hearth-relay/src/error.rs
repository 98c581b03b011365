use std::borrow::Cow;

/// All relay error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Dialing, reading from or writing to the transport failed.
    Transport,
    /// The handshake frame could not be exchanged.
    Handshake,
    /// A frame is not a valid envelope.
    Decode,
    /// An envelope could not be serialized.
    Encode,
    /// No reply arrived before the deadline.
    Timeout,
    /// The connection has been shut down.
    Closed,
    /// The connection does not accept envelope traffic yet.
    NotActive,
    /// A call with the same identifier is already waiting for its reply.
    DuplicateId,
    /// No provider is registered for the envelope source.
    UnknownSource,
    /// The provider does not support the envelope action.
    UnknownAction,
    /// A provider handler failed.
    Handler,
    /// The peer answered with an error envelope.
    Remote,
}

impl ErrorKind {
    pub(crate) const fn description(self) -> &'static str {
        match self {
            Self::Transport => "Transport",
            Self::Handshake => "Handshake",
            Self::Decode => "Decode",
            Self::Encode => "Encode",
            Self::Timeout => "Timeout",
            Self::Closed => "Closed",
            Self::NotActive => "Not active",
            Self::DuplicateId => "Duplicate identifier",
            Self::UnknownSource => "Unknown source",
            Self::UnknownAction => "Unknown action",
            Self::Handler => "Handler",
            Self::Remote => "Remote",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// A relay error.
#[derive(Clone, PartialEq)]
pub struct Error {
    kind: ErrorKind,
    description: Cow<'static, str>,
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.error())
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.error())
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Creates an [`Error`] from an [`ErrorKind`] and a description.
    pub fn new(kind: ErrorKind, description: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }

    /// Creates a provider handler [`Error`].
    ///
    /// The description is the message transmitted to the peer inside an
    /// error envelope.
    pub fn handler(description: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Handler, description)
    }

    /// Returns the [`ErrorKind`].
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Checks whether the error ends the connection.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Transport | ErrorKind::Handshake | ErrorKind::Closed
        )
    }

    fn error(&self) -> String {
        format!("{}: {}", self.kind, self.description)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::new(ErrorKind::Transport, e.to_string())
    }
}

impl From<rumqttc::v5::ClientError> for Error {
    fn from(e: rumqttc::v5::ClientError) -> Self {
        Self::new(ErrorKind::Transport, e.to_string())
    }
}

impl From<rumqttc::v5::ConnectionError> for Error {
    fn from(e: rumqttc::v5::ConnectionError) -> Self {
        Self::new(ErrorKind::Transport, e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorKind::Transport, e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::new(ErrorKind::Decode, e.to_string())
    }
}

/// A specialized [`Result`] type for [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind};

    #[test]
    fn test_error_display() {
        let error = Error::handler("group not found");

        assert_eq!(error.kind(), ErrorKind::Handler);
        assert_eq!(error.description(), "group not found");
        assert_eq!(error.to_string(), "Handler: group not found");
        assert!(!error.is_fatal());
    }

    #[test]
    fn test_fatal_errors() {
        assert!(Error::new(ErrorKind::Transport, "broken pipe").is_fatal());
        assert!(Error::new(ErrorKind::Closed, "shutdown").is_fatal());
        assert!(!Error::new(ErrorKind::Timeout, "10s elapsed").is_fatal());
    }

    #[test]
    fn test_decode_error_conversion() {
        let error: Error = serde_json::from_str::<u8>("{").unwrap_err().into();
        assert_eq!(error.kind(), ErrorKind::Decode);
    }
}
