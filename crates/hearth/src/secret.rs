use alloc::string::String;

use core::fmt;

/// The shared secret sent by a worker right after dialing its hub.
///
/// The secret travels as a single bare frame, the only frame on a relay
/// connection which is **not** an [`crate::envelope::Envelope`].
/// A hub reads this frame but does not validate its content, hence the
/// secret marks a trust boundary rather than an authentication mechanism.
///
/// The [`fmt::Debug`] representation never reveals the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Secret {
    /// Creates a [`Secret`].
    #[must_use]
    pub const fn new(value: String) -> Self {
        Self(value)
    }

    /// Returns the [`Secret`] as a [`&str`].
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the [`Secret`], returning the handshake frame.
    #[inline]
    #[must_use]
    pub fn into_frame(self) -> String {
        self.0
    }

    /// Checks whether the secret is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use alloc::format;

    use super::Secret;

    #[test]
    fn test_secret_is_redacted() {
        let secret = Secret::from("s3cr3t");

        assert_eq!(format!("{secret:?}"), "Secret(***)");
        assert_eq!(secret.as_str(), "s3cr3t");
        assert!(!secret.is_empty());
        assert_eq!(secret.into_frame(), "s3cr3t");
    }
}
