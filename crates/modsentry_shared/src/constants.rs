//! # Wire Constants
//!
//! **CRITICAL:** Client and server must agree on these values.
//! Changing them breaks every deployed client.

/// Maximum passkey length in bytes.
pub const MAX_PASSKEY_LEN: usize = 512;

/// Maximum checksum length in bytes.
pub const MAX_CHECKSUM_LEN: usize = 4096;

/// The only reason ever shown to a rejected client.
pub const DISCONNECT_REASON: &str = "Mod verification failed";

/// Returns true for bytes allowed in a passkey: `[A-Za-z0-9 ,:+/=]`.
#[must_use]
pub const fn is_passkey_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b' ' | b',' | b':' | b'+' | b'/' | b'=')
}

/// Returns true for bytes of the standard base64 alphabet: `[A-Za-z0-9+/=]`.
#[must_use]
pub const fn is_base64_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'=')
}
