//! Meshlink wire protocol.
//!
//! Shared types for the mesh session layer: network addresses, send
//! reliability flags and the system-channel message codec.

#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod address;
pub mod flags;
pub mod message;

pub use address::Address;
pub use flags::{Delivery, SendFlags};
pub use message::{DecodeError, MAX_NAME_LENGTH, SystemMessage, msg_type, truncate_name};
