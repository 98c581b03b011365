//! The communication interface between a `hearth` hub and its worker.
//!
//! This crate provides APIs to:
//!
//! - Encode and decode an [`envelope::Envelope`], the only message unit that
//!   crosses a relay connection. An envelope names the device family it
//!   concerns (its source), the operation within that family (its action),
//!   and carries an opaque payload.
//! - Derive correlation identifiers from the content of a payload, so that a
//!   reply can be matched with the request that triggered it.
//! - Classify an action into a well-known `create`, `update` or `delete`
//!   operation.
//! - Carry the shared secret a worker sends right after dialing its hub.
//!
//! This crate can be compiled for both `std` and `no_std` environments.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![no_std]

extern crate alloc;

/// The wire envelope and its codec.
pub mod envelope;
/// Classification of envelope actions.
pub mod operation;
/// The shared secret sent during the handshake.
pub mod secret;
/// Well-known device family names.
pub mod source;

#[cfg(test)]
pub(crate) fn serialize<T: serde::Serialize>(value: T) -> serde_json::Value {
    serde_json::to_value(value).unwrap()
}

#[cfg(test)]
pub(crate) fn deserialize<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> T {
    serde_json::from_value(value).unwrap()
}
