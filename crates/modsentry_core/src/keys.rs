//! # Key Derivation
//!
//! The rotating server secret and the per-player passkeys built from it.
//!
//! ```text
//! Clock ──► "2026, October 19th" ──┐
//!                                  ├──► "2026, October 19th:Zm9v...32 chars"
//! identity ──► base64(SHA-256)[..32]┘
//! ```
//!
//! The secret is a pure function of the calendar date. It rotates daily and
//! anyone who knows the scheme can rebuild it, so it is only one layer of
//! the protocol and never used on its own.

use crate::clock::Clock;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{Datelike, NaiveDate};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Separator between the secret and the identity hash.
pub const PASSKEY_SEPARATOR: char = ':';

/// Length of the identity hash part of a passkey.
pub const IDENTITY_HASH_LEN: usize = 32;

/// Renders the permanent secret for `date`, e.g. `2026, October 19th`.
#[must_use]
pub fn permanent_secret(date: NaiveDate) -> String {
    format!(
        "{}, {} {}{}",
        date.year(),
        date.format("%B"),
        date.day(),
        ordinal_suffix(date.day())
    )
}

fn ordinal_suffix(day: u32) -> &'static str {
    if (11..=13).contains(&(day % 100)) {
        return "th";
    }
    match day % 10 {
        1 => "st",
        2 => "nd",
        3 => "rd",
        _ => "th",
    }
}

/// Fixed-length, non-reversible hash of a player identity.
#[must_use]
pub fn identity_hash(identity: &str) -> String {
    let encoded = STANDARD.encode(Sha256::digest(identity.as_bytes()));
    encoded[..IDENTITY_HASH_LEN].to_string()
}

/// Builds the passkey for `identity` under `secret`.
#[must_use]
pub fn derive_passkey(secret: &str, identity: &str) -> Passkey {
    Passkey(format!(
        "{secret}{PASSKEY_SEPARATOR}{}",
        identity_hash(identity)
    ))
}

/// Constant-time byte comparison.
///
/// Runtime depends only on the lengths, never on where the inputs differ.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// A per-player passkey.
///
/// `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Passkey(String);

impl Passkey {
    /// Wraps a passkey string received from elsewhere.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The full passkey text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The permanent secret part (everything before the last separator).
    ///
    /// Returns `None` if the passkey has no separator.
    #[must_use]
    pub fn secret(&self) -> Option<&str> {
        self.0.rsplit_once(PASSKEY_SEPARATOR).map(|(secret, _)| secret)
    }

    /// Constant-time comparison against a claimed passkey.
    #[must_use]
    pub fn matches(&self, claimed: &str) -> bool {
        constant_time_eq(self.0.as_bytes(), claimed.as_bytes())
    }
}

impl fmt::Debug for Passkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Passkey")
            .field(&format_args!("[{} chars]", self.0.len()))
            .finish()
    }
}

/// Derives secrets and passkeys from a shared clock.
#[derive(Clone)]
pub struct KeyDeriver {
    clock: Arc<dyn Clock>,
}

impl KeyDeriver {
    /// Creates a deriver reading the date from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Today's permanent secret.
    #[must_use]
    pub fn current_secret(&self) -> String {
        permanent_secret(self.clock.today())
    }

    /// Today's passkey for `identity`.
    #[must_use]
    pub fn passkey_for(&self, identity: &str) -> Passkey {
        derive_passkey(&self.current_secret(), identity)
    }

    /// The clock this deriver reads.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

impl fmt::Debug for KeyDeriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyDeriver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_secret_format() {
        assert_eq!(permanent_secret(date(2026, 10, 19)), "2026, October 19th");
        assert_eq!(permanent_secret(date(2026, 1, 1)), "2026, January 1st");
        assert_eq!(permanent_secret(date(2026, 3, 2)), "2026, March 2nd");
        assert_eq!(permanent_secret(date(2026, 5, 23)), "2026, May 23rd");
        assert_eq!(permanent_secret(date(2026, 7, 31)), "2026, July 31st");
    }

    #[test]
    fn test_teens_always_th() {
        assert_eq!(permanent_secret(date(2026, 2, 11)), "2026, February 11th");
        assert_eq!(permanent_secret(date(2026, 2, 12)), "2026, February 12th");
        assert_eq!(permanent_secret(date(2026, 2, 13)), "2026, February 13th");
    }

    #[test]
    fn test_passkey_shape() {
        let passkey = derive_passkey("2026, October 19th", "069a79f4-44e9-4726-a5be-fca90e38aaf5");
        let (secret, hash) = passkey.as_str().rsplit_once(':').unwrap();

        assert_eq!(secret, "2026, October 19th");
        assert_eq!(hash.len(), IDENTITY_HASH_LEN);
        assert_eq!(passkey.secret(), Some("2026, October 19th"));
    }

    #[test]
    fn test_passkey_is_deterministic_per_identity() {
        let a1 = derive_passkey("s", "alice");
        let a2 = derive_passkey("s", "alice");
        let b = derive_passkey("s", "bob");

        assert_eq!(a1, a2);
        assert_ne!(a1, b);
        assert!(a1.matches(a2.as_str()));
        assert!(!a1.matches(b.as_str()));
    }

    #[test]
    fn test_passkey_rotates_with_date() {
        let clock = Arc::new(FixedClock::on_date(2026, 10, 19).unwrap());
        let deriver = KeyDeriver::new(clock.clone());
        let today = deriver.passkey_for("alice");

        clock.advance(24 * 3600);
        let tomorrow = deriver.passkey_for("alice");

        assert_ne!(today, tomorrow);
        assert_eq!(tomorrow.secret(), Some("2026, October 20th"));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn test_debug_hides_value() {
        let passkey = Passkey::new("2026, October 19th:secretpart");
        let rendered = format!("{passkey:?}");
        assert!(!rendered.contains("secretpart"));
    }
}
