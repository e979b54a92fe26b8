//! Host-side driver for Texas Instruments' Unified Network Processor
//! Interface (UNPI) — the byte-oriented framing protocol used to talk to TI
//! wireless network coprocessors (ZNP, BLE-NP, …) over a serial or similar
//! stream transport.
//!
//! Two concerns, layered:
//!
//! - [`frame`] and [`codec`] — the wire format itself: start-of-frame
//!   resynchronisation, XOR checksum validation, encode/decode.
//! - [`broker`] — a concurrent-safe transaction layer on top: a single reader
//!   pump fanning frames out to identity-keyed listeners, a single writer
//!   pump serialising emission, and `request`/`request_response`/
//!   `await_message`/`subscribe` primitives with deadline-driven
//!   cancellation.
//!
//! The byte transport itself (serial port, socket, pipe) and the payload
//! (de)serialisation scheme are both external collaborators — see
//! [`library::Payload`].

pub mod broker;
pub mod codec;
pub mod deadline;
pub mod error;
pub mod frame;
pub mod library;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use broker::{Broker, CancelHandle, Subscription};
pub use deadline::Deadline;
pub use error::UnpiError;
pub use frame::{Frame, Identity, MessageType, Subsystem};
pub use library::{MessageLibrary, Payload};
