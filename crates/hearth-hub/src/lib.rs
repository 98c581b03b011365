//! The `hearth-hub` library crate provides the building blocks of a
//! `hearth` hub, the publicly reachable process which controls the devices
//! of a private network through a connected worker.
//!
//! A hub:
//!
//! - Accepts the worker connection over `WebSocket`, or attaches to the
//!   worker through an `MQTT` broker
//! - Issues correlated commands to the worker and waits for their replies
//! - Caches the state the worker pushes, so that readers never wait on the
//!   private network
//! - Exposes a `JSON` API for the collaborators, such as a dashboard, which
//!   read cached state and send commands
//!
//! Only one worker is connected at a time: a new worker connection replaces
//! the previous one.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

/// Hub configuration.
pub mod config;
/// The hub, owning the worker connection.
pub mod hub;
/// Error responses of the `JSON` API.
pub mod responses;
/// The `HTTP` server.
pub mod server;
/// The `axum` WebSocket transport.
pub mod websocket;

pub use hearth_relay::error::{Error, ErrorKind, Result};
pub use hearth_relay::registry::{ProviderBinding, Registry, Reply};
pub use hearth_relay::state::{CachedState, StateCache};
