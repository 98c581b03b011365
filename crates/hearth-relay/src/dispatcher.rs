use std::sync::Arc;

use hearth::envelope::Envelope;

use tracing::{debug, error, warn};

use crate::error::{Error, ErrorKind};
use crate::registry::Registry;

/// Routes uncorrelated envelopes to the provider of their source.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
}

impl Dispatcher {
    /// Creates a [`Dispatcher`] over a provider registry.
    #[must_use]
    pub const fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Returns the provider registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Routes an envelope to the provider of its source.
    ///
    /// Returns the envelope to send back, if any:
    ///
    /// - An unknown source or action yields an error envelope
    /// - A remote executor yields its reply, or an error envelope when it
    ///   fails
    /// - A state consumer yields nothing
    ///
    /// Every returned envelope reuses the identifier of the routed one.
    /// An error envelope is never answered, in order not to bounce errors
    /// between the two endpoints.
    pub async fn dispatch(&self, envelope: Envelope) -> Option<Envelope> {
        if envelope.is_error() {
            self.dispatch_error(&envelope);
            return None;
        }

        let Some(binding) = self.registry.get(&envelope.source) else {
            return Some(Self::reject(
                &envelope,
                &Error::new(
                    ErrorKind::UnknownSource,
                    format!("No provider registered for `{}`", envelope.source),
                ),
            ));
        };

        if let Some(executor) = binding.executor_for(&envelope.action) {
            debug!("Executing {envelope}");
            return Some(match executor(envelope.clone()).await {
                Ok(reply) => reply.into_reply(&envelope),
                Err(e) => Self::reject(&envelope, &e),
            });
        }

        if binding.consume(&envelope) {
            debug!("Consumed {envelope}");
            return None;
        }

        Some(Self::reject(
            &envelope,
            &Error::new(
                ErrorKind::UnknownAction,
                format!(
                    "Provider `{}` does not support action `{}`",
                    envelope.source, envelope.action
                ),
            ),
        ))
    }

    fn dispatch_error(&self, envelope: &Envelope) {
        error!(
            "Uncorrelated error from `{}`: {}",
            envelope.source, envelope.payload
        );

        if let Some(binding) = self.registry.get(&envelope.source) {
            let _ = binding.consume(envelope);
        }
    }

    fn reject(envelope: &Envelope, error: &Error) -> Envelope {
        warn!("Rejecting {envelope}: {error}");
        envelope.error(error.description())
    }
}
