//! The `hearth-relay` library crate provides the machinery shared by a
//! `hearth` hub and its worker to exchange envelopes over a single
//! long-lived connection.
//!
//! Core functionalities of this crate include:
//!
//! - Owning a transport and serializing every outbound write through a
//!   single writer lock
//! - Correlating replies with the requests awaiting them, with a bounded
//!   wait
//! - Routing every uncorrelated envelope to the provider registered for its
//!   source, according to the capability roles the provider implements
//! - Driving the connection lifecycle, from dial and handshake up to a
//!   cascading shutdown which unblocks every pending call
//!
//! Both `WebSocket` and `MQTT` transports are supported, along with an
//! in-memory channel transport which connects two endpoints within the same
//! process.
//!
//! The relay leverages `tokio` as an asynchronous executor: one read loop
//! per connection, plus one short-lived task for each in-flight call,
//! coordinating through a shared cancellation token.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use std::time::Duration;

/// The connection manager.
pub mod connection;
/// Request and reply correlation.
pub mod correlator;
/// Routing of uncorrelated envelopes.
pub mod dispatcher;
/// Error management.
pub mod error;
/// Provider capability roles and their registry.
pub mod registry;
/// Cached provider state.
pub mod state;
/// Transports carrying relay frames.
pub mod transport;

/// Maximum time a correlated call waits for its reply.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Period between two heartbeat cycles.
pub const DEFAULT_HEARTBEAT_PERIOD: Duration = Duration::from_secs(60);

#[cfg(test)]
mod tests;
