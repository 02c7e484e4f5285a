//! # Cipher
//!
//! Two layers, always applied in the same order:
//!
//! ```text
//! digest ──► obfuscate(secret) ──► encrypt(passkey) ──► wire
//!            XOR + base64          AES-128-GCM
//!                                  key = PBKDF2-HMAC-SHA256(passkey)
//!                                  base64(IV[12] ‖ ct ‖ tag[16])
//! ```
//!
//! Obfuscation is reversible by anyone holding the secret. It is not a
//! confidentiality layer. Encryption is authenticated: a wrong passkey or a
//! flipped bit fails with [`CoreError::Decryption`], never with garbage.
//!
//! The key is a deterministic function of the passkey (the salt is derived
//! from the passkey too), so two encryptions under one passkey differ only by
//! their random IV. Ciphertexts must therefore never be compared directly.

use crate::error::{CoreError, CoreResult};
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes128Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::fmt;

/// PBKDF2 iteration count.
pub const KDF_ITERATIONS: u32 = 10_000;

/// AES-128 key length in bytes.
const KEY_LEN: usize = 16;

/// Salt length in bytes (prefix of SHA-256 of the passkey).
const SALT_LEN: usize = 16;

/// GCM nonce length in bytes.
pub const IV_LEN: usize = 12;

/// GCM tag length in bytes.
pub const TAG_LEN: usize = 16;

/// XORs `data` with the repeating bytes of `secret`.
///
/// Works on any byte sequence; applying it twice with the same secret
/// returns the input.
///
/// # Errors
///
/// Returns [`CoreError::KeyDerivation`] if `secret` is empty.
pub fn obfuscate_bytes(data: &[u8], secret: &str) -> CoreResult<Vec<u8>> {
    let key = secret.as_bytes();
    if key.is_empty() {
        return Err(CoreError::KeyDerivation("obfuscation secret is empty".into()));
    }
    Ok(data
        .iter()
        .zip(key.iter().cycle())
        .map(|(d, k)| d ^ k)
        .collect())
}

/// Reverses [`obfuscate_bytes`].
///
/// # Errors
///
/// Returns [`CoreError::KeyDerivation`] if `secret` is empty.
pub fn deobfuscate_bytes(data: &[u8], secret: &str) -> CoreResult<Vec<u8>> {
    obfuscate_bytes(data, secret)
}

/// XOR-obfuscates the text `data` with `secret`, then base64.
///
/// # Errors
///
/// Returns [`CoreError::KeyDerivation`] if `secret` is empty.
pub fn obfuscate(data: &str, secret: &str) -> CoreResult<String> {
    Ok(STANDARD.encode(obfuscate_bytes(data.as_bytes(), secret)?))
}

/// Reverses [`obfuscate`].
///
/// # Errors
///
/// Fails on an empty secret, invalid base64 or non UTF-8 output.
pub fn deobfuscate(encoded: &str, secret: &str) -> CoreResult<String> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| CoreError::InvalidEncoding(format!("obfuscated data: {e}")))?;
    String::from_utf8(deobfuscate_bytes(&bytes, secret)?)
        .map_err(|_| CoreError::InvalidEncoding("deobfuscated data is not UTF-8".into()))
}

/// AES-128-GCM cipher keyed by one passkey.
///
/// Key derivation is the expensive part, so a verification that needs
/// several operations under the same passkey builds this once.
pub struct PasskeyCipher {
    aead: Aes128Gcm,
}

impl PasskeyCipher {
    /// Derives the key for `passkey`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::KeyDerivation`] if `passkey` is empty.
    pub fn new(passkey: &str) -> CoreResult<Self> {
        if passkey.is_empty() {
            return Err(CoreError::KeyDerivation("passkey is empty".into()));
        }

        let digest = Sha256::digest(passkey.as_bytes());
        let salt = &digest[..SALT_LEN];

        let mut key = [0u8; KEY_LEN];
        pbkdf2::pbkdf2_hmac::<Sha256>(passkey.as_bytes(), salt, KDF_ITERATIONS, &mut key);

        let aead = Aes128Gcm::new_from_slice(&key)
            .map_err(|e| CoreError::KeyDerivation(e.to_string()))?;
        Ok(Self { aead })
    }

    /// Encrypts `plaintext` under a fresh random IV.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Encryption`] if the AEAD rejects the input.
    pub fn encrypt(&self, plaintext: &str) -> CoreResult<String> {
        let nonce = Aes128Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .aead
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CoreError::Encryption)?;

        let mut out = Vec::with_capacity(IV_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(STANDARD.encode(out))
    }

    /// Decrypts the output of [`PasskeyCipher::encrypt`].
    ///
    /// # Errors
    ///
    /// Fails closed with [`CoreError::Decryption`] on a tag mismatch, or
    /// [`CoreError::InvalidEncoding`] on malformed input.
    pub fn decrypt(&self, encoded: &str) -> CoreResult<String> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| CoreError::InvalidEncoding(format!("ciphertext: {e}")))?;
        if bytes.len() < IV_LEN + TAG_LEN {
            return Err(CoreError::InvalidEncoding(format!(
                "ciphertext too short: {} bytes",
                bytes.len()
            )));
        }

        let (iv, sealed) = bytes.split_at(IV_LEN);
        let plain = self
            .aead
            .decrypt(Nonce::from_slice(iv), sealed)
            .map_err(|_| CoreError::Decryption)?;

        String::from_utf8(plain)
            .map_err(|_| CoreError::InvalidEncoding("plaintext is not UTF-8".into()))
    }

    /// Obfuscates with `secret`, then encrypts.
    ///
    /// # Errors
    ///
    /// See [`obfuscate`] and [`PasskeyCipher::encrypt`].
    pub fn obfuscate_and_encrypt(&self, data: &str, secret: &str) -> CoreResult<String> {
        self.encrypt(&obfuscate(data, secret)?)
    }

    /// Decrypts, then deobfuscates with `secret`.
    ///
    /// # Errors
    ///
    /// See [`PasskeyCipher::decrypt`] and [`deobfuscate`].
    pub fn decrypt_and_deobfuscate(&self, encoded: &str, secret: &str) -> CoreResult<String> {
        deobfuscate(&self.decrypt(encoded)?, secret)
    }
}

impl fmt::Debug for PasskeyCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasskeyCipher").finish_non_exhaustive()
    }
}

/// Encrypts `plaintext` under `passkey`.
///
/// # Errors
///
/// See [`PasskeyCipher::new`] and [`PasskeyCipher::encrypt`].
pub fn encrypt(plaintext: &str, passkey: &str) -> CoreResult<String> {
    PasskeyCipher::new(passkey)?.encrypt(plaintext)
}

/// Decrypts `encoded` under `passkey`.
///
/// # Errors
///
/// See [`PasskeyCipher::new`] and [`PasskeyCipher::decrypt`].
pub fn decrypt(encoded: &str, passkey: &str) -> CoreResult<String> {
    PasskeyCipher::new(passkey)?.decrypt(encoded)
}

/// Obfuscates with `secret`, then encrypts under `passkey`.
///
/// # Errors
///
/// See [`obfuscate`] and [`encrypt`].
pub fn obfuscate_and_encrypt(data: &str, secret: &str, passkey: &str) -> CoreResult<String> {
    PasskeyCipher::new(passkey)?.obfuscate_and_encrypt(data, secret)
}

/// Decrypts under `passkey`, then deobfuscates with `secret`.
///
/// # Errors
///
/// See [`decrypt`] and [`deobfuscate`].
pub fn decrypt_and_deobfuscate(encoded: &str, secret: &str, passkey: &str) -> CoreResult<String> {
    PasskeyCipher::new(passkey)?.decrypt_and_deobfuscate(encoded, secret)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::collection::vec;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn obfuscation_round_trips_any_bytes(
            data in vec(any::<u8>(), 0..512),
            secret in "[ -~]{1,40}",
        ) {
            let hidden = obfuscate_bytes(&data, &secret).unwrap();
            prop_assert_eq!(hidden.len(), data.len());
            prop_assert_eq!(deobfuscate_bytes(&hidden, &secret).unwrap(), data);
        }

        #[test]
        fn text_obfuscation_round_trips(data in any::<String>(), secret in "\\PC{1,20}") {
            let wire = obfuscate(&data, &secret).unwrap();
            prop_assert_eq!(deobfuscate(&wire, &secret).unwrap(), data);
        }
    }

    proptest! {
        // Every case runs PBKDF2, keep the count modest.
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn encryption_round_trips_under_same_passkey(
            plaintext in any::<String>(),
            passkey in "[ -~]{1,64}",
        ) {
            let cipher = PasskeyCipher::new(&passkey).unwrap();
            let sealed = cipher.encrypt(&plaintext).unwrap();
            prop_assert_eq!(cipher.decrypt(&sealed).unwrap(), plaintext);
        }

        #[test]
        fn decryption_fails_under_other_passkey(
            plaintext in any::<String>(),
            sender in "[ -~]{1,64}",
            receiver in "[ -~]{1,64}",
        ) {
            prop_assume!(sender != receiver);
            let sealed = encrypt(&plaintext, &sender).unwrap();
            prop_assert!(matches!(decrypt(&sealed, &receiver), Err(CoreError::Decryption)));
        }
    }
}
