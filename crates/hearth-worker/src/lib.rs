//! The `hearth-worker` library crate provides the building blocks of a
//! `hearth` worker, the process running inside a private network next to
//! the smart-home devices.
//!
//! A worker:
//!
//! - Dials its hub over `WebSocket` or `MQTT` and sends the shared secret
//!   as its first frame
//! - Executes the commands received from the hub through the remote
//!   executors of its providers, answering each command with a reply or an
//!   error envelope carrying the same identifier
//! - Periodically pushes the snapshots produced by its providers, so that
//!   the hub always holds a recent cached state
//!
//! A worker never reconnects by itself: once its connection is closed, the
//! process supervisor decides whether to start it again.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

/// Worker configuration.
pub mod config;
/// The periodic snapshot push.
pub mod heartbeat;
/// The worker handle.
pub mod worker;

pub use hearth_relay::error::{Error, ErrorKind, Result};
pub use hearth_relay::registry::{ProviderBinding, Registry, Reply};
