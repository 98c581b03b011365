use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use hashbrown::HashMap;

use hearth::envelope::Envelope;
use hearth::operation::Operation;

use indexmap::IndexMap;

use serde::Serialize;

use tracing::info;

use crate::error::Result;
use crate::state::{CachedState, StateCache};

/// The future returned by a remote executor.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Reply>> + Send>>;

/// The future returned by a snapshot producer.
pub type SnapshotFuture = Pin<Box<dyn Future<Output = Vec<Result<Reply>>> + Send>>;

type ExecuteFn = Box<dyn Fn(Envelope) -> HandlerFuture + Send + Sync>;
type SnapshotFn = Box<dyn Fn() -> SnapshotFuture + Send + Sync>;
type SupplyFn = Box<dyn Fn() -> CachedState + Send + Sync>;
type ConsumeFn = Box<dyn Fn(&Envelope) + Send + Sync>;

/// The result produced by a handler.
///
/// The dispatcher wraps it into an envelope, reusing the identifier of the
/// request when the result answers one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Source describing the result.
    ///
    /// When `None`, the source of the provider is used.
    pub source: Option<String>,
    /// Action describing the result.
    pub action: String,
    /// Result data.
    pub payload: String,
}

impl Reply {
    /// Creates a [`Reply`] on behalf of the provider source.
    #[must_use]
    pub fn new(action: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            source: None,
            action: action.into(),
            payload: payload.into(),
        }
    }

    /// Creates a [`Reply`] on behalf of another source.
    #[must_use]
    pub fn from_source(
        source: impl Into<String>,
        action: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            source: Some(source.into()),
            action: action.into(),
            payload: payload.into(),
        }
    }

    /// Turns the [`Reply`] into the answer to a request.
    #[must_use]
    pub fn into_reply(self, request: &Envelope) -> Envelope {
        let source = self.source.unwrap_or_else(|| request.source.clone());
        request.reply_from(source, self.action, self.payload)
    }

    /// Turns the [`Reply`] into an unsolicited push with a fresh identifier.
    #[must_use]
    pub fn into_push(self, provider: &str) -> Envelope {
        let source = self.source.unwrap_or_else(|| provider.to_owned());
        Envelope::new(source, self.action, self.payload)
    }
}

/// A capability role a provider can implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Returns the last cached state, without network I/O.
    StateSupplier,
    /// Merges pushed state into the cache.
    StateConsumer,
    /// Performs a device-control side effect.
    RemoteExecutor,
    /// Produces the heartbeat payloads.
    SnapshotProducer,
}

/// The capability roles implemented by the provider of one source.
///
/// Every role is an optional slot, populated through the builder methods.
#[derive(Default)]
pub struct ProviderBinding {
    executors: IndexMap<String, ExecuteFn>,
    snapshot: Option<SnapshotFn>,
    supplier: Option<SupplyFn>,
    consumer: Option<ConsumeFn>,
}

impl std::fmt::Debug for ProviderBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderBinding")
            .field("executors", &self.executors.keys().collect::<Vec<_>>())
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

impl ProviderBinding {
    /// Creates a [`ProviderBinding`] without any role.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a remote executor for an action.
    ///
    /// The `create`, `update` and `delete` actions also serve every action
    /// ending with the same suffix.
    #[must_use]
    pub fn executor<F, Fut>(mut self, action: impl Into<String>, executor: F) -> Self
    where
        F: Fn(Envelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply>> + Send + 'static,
    {
        let _ = self.executors.insert(
            action.into(),
            Box::new(move |envelope: Envelope| -> HandlerFuture { Box::pin(executor(envelope)) }),
        );
        self
    }

    /// Sets the snapshot producer.
    #[must_use]
    pub fn snapshot<F, Fut>(mut self, producer: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Vec<Result<Reply>>> + Send + 'static,
    {
        self.snapshot = Some(Box::new(move || -> SnapshotFuture { Box::pin(producer()) }));
        self
    }

    /// Sets the state supplier.
    #[must_use]
    pub fn supplier<F>(mut self, supplier: F) -> Self
    where
        F: Fn() -> CachedState + Send + Sync + 'static,
    {
        self.supplier = Some(Box::new(supplier));
        self
    }

    /// Sets the state consumer.
    #[must_use]
    pub fn consumer<F>(mut self, consumer: F) -> Self
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.consumer = Some(Box::new(consumer));
        self
    }

    /// Backs both the state supplier and the state consumer with a
    /// [`StateCache`].
    #[must_use]
    pub fn cached(self, cache: &StateCache) -> Self {
        let supplier = cache.clone();
        let consumer = cache.clone();
        self.supplier(move || supplier.snapshot())
            .consumer(move |envelope| consumer.consume(envelope))
    }

    /// Returns the implemented capability roles.
    #[must_use]
    pub fn capabilities(&self) -> Vec<Capability> {
        let mut capabilities = Vec::new();
        if self.supplier.is_some() {
            capabilities.push(Capability::StateSupplier);
        }
        if self.consumer.is_some() {
            capabilities.push(Capability::StateConsumer);
        }
        if !self.executors.is_empty() {
            capabilities.push(Capability::RemoteExecutor);
        }
        if self.snapshot.is_some() {
            capabilities.push(Capability::SnapshotProducer);
        }
        capabilities
    }

    /// Returns the actions served by a remote executor.
    pub fn actions(&self) -> impl Iterator<Item = &str> {
        self.executors.keys().map(String::as_str)
    }

    /// Selects the executor for an action.
    ///
    /// An exact match comes first, then the `create`, `update` or `delete`
    /// operation selected by the action suffix.
    pub(crate) fn executor_for(&self, action: &str) -> Option<&ExecuteFn> {
        self.executors
            .get(action)
            .or_else(|| self.executors.get(Operation::parse(action).key()))
    }

    /// Starts the snapshot producer, if any.
    #[must_use]
    pub fn produce_snapshot(&self) -> Option<SnapshotFuture> {
        self.snapshot.as_ref().map(|producer| producer())
    }

    pub(crate) fn consume(&self, envelope: &Envelope) -> bool {
        self.consumer
            .as_ref()
            .map(|consumer| consumer(envelope))
            .is_some()
    }

    /// Returns the state cached by the supplier, if any.
    #[must_use]
    pub fn supply(&self) -> Option<CachedState> {
        self.supplier.as_ref().map(|supplier| supplier())
    }

    /// Checks whether a snapshot producer is set.
    #[must_use]
    pub const fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }
}

/// The provider bindings, indexed by source.
#[derive(Debug, Default)]
pub struct Registry {
    bindings: RwLock<HashMap<String, Arc<ProviderBinding>>>,
}

impl Registry {
    /// Creates an empty [`Registry`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the provider of a source.
    ///
    /// The last registration for a source wins.
    pub fn register(&self, source: impl Into<String>, binding: ProviderBinding) {
        let source = source.into();
        info!(
            "Registering `{source}` with roles {:?}",
            binding.capabilities()
        );

        let mut bindings = self
            .bindings
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if bindings.insert(source.clone(), Arc::new(binding)).is_some() {
            info!("The previous provider of `{source}` has been replaced");
        }
    }

    /// Adds the provider of a source, builder style.
    #[must_use]
    pub fn with(self, source: impl Into<String>, binding: ProviderBinding) -> Self {
        self.register(source, binding);
        self
    }

    /// Returns the provider of a source.
    #[must_use]
    pub fn get(&self, source: &str) -> Option<Arc<ProviderBinding>> {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source)
            .cloned()
    }

    /// Returns all registered sources, sorted by name.
    #[must_use]
    pub fn sources(&self) -> Vec<String> {
        let mut sources = self
            .bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        sources.sort();
        sources
    }

    /// Returns all providers implementing the snapshot role, sorted by
    /// source.
    #[must_use]
    pub fn snapshot_producers(&self) -> Vec<(String, Arc<ProviderBinding>)> {
        let mut producers = self
            .bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, binding)| binding.has_snapshot())
            .map(|(source, binding)| (source.clone(), Arc::clone(binding)))
            .collect::<Vec<_>>();
        producers.sort_by(|(left, _), (right, _)| left.cmp(right));
        producers
    }

    /// Returns the state cached for a source.
    ///
    /// `None` when the source is unknown or has no state supplier.
    #[must_use]
    pub fn supply(&self, source: &str) -> Option<CachedState> {
        self.get(source).and_then(|binding| binding.supply())
    }
}
