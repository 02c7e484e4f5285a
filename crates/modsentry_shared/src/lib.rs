//! # MODSENTRY Shared
//!
//! Types exchanged between client and server during login.
//!
//! ## CRITICAL RULE
//!
//! Nothing in here may hold server-side state. The server validates a
//! [`SyncPayload`] the moment it arrives; the client builds one with a
//! [`ClientAttestor`].

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod client;
pub mod constants;
pub mod error;
pub mod payload;

pub use client::ClientAttestor;
pub use constants::{DISCONNECT_REASON, MAX_CHECKSUM_LEN, MAX_PASSKEY_LEN};
pub use error::{PayloadError, PayloadField, PayloadResult};
pub use payload::SyncPayload;
