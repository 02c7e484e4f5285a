//! Client attestation end to end: what the client sends must decrypt back
//! to the aggregate of its own mods directory.

use modsentry_core::{cipher, derive_passkey, ArtifactFilter, DirectoryFingerprint};
use modsentry_shared::{ClientAttestor, PayloadError, SyncPayload};
use std::fs;
use tempfile::TempDir;

const SECRET: &str = "2026, October 19th";
const PLAYER: &str = "069a79f4-44e9-4726-a5be-fca90e38aaf5";

fn mods_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("A.jar"), b"alpha").unwrap();
    fs::write(dir.path().join("B.jar"), b"beta").unwrap();
    dir
}

#[test]
fn test_payload_decrypts_to_local_digest() {
    let dir = mods_dir();
    let passkey = derive_passkey(SECRET, PLAYER);
    let attestor = ClientAttestor::new(dir.path(), ArtifactFilter::default());

    let payload = attestor.attest(&passkey).unwrap();
    assert_eq!(payload.passkey(), passkey.as_str());

    let expected = DirectoryFingerprint::scan(dir.path(), &ArtifactFilter::default()).unwrap();
    let recovered =
        cipher::decrypt_and_deobfuscate(payload.checksum(), SECRET, passkey.as_str()).unwrap();
    assert_eq!(recovered, expected.digest.as_str());
}

#[test]
fn test_empty_mods_directory_cannot_attest() {
    let dir = TempDir::new().unwrap();
    let attestor = ClientAttestor::new(dir.path(), ArtifactFilter::default());
    let passkey = derive_passkey(SECRET, PLAYER);

    assert!(matches!(
        attestor.attest(&passkey),
        Err(PayloadError::Attestation(_))
    ));
}

#[test]
fn test_passkey_without_secret_part_is_refused() {
    let dir = mods_dir();
    let attestor = ClientAttestor::new(dir.path(), ArtifactFilter::default());
    let bogus = modsentry_core::Passkey::new("nocolonhere");

    assert!(attestor.attest(&bogus).is_err());
}

#[test]
fn test_deserialization_validates() {
    let good: SyncPayload = toml::from_str("passkey = \"2026, October 19th:abc\"\nchecksum = \"QUJD\"").unwrap();
    assert_eq!(good.checksum(), "QUJD");

    let oversized = format!("passkey = \"k\"\nchecksum = \"{}\"", "A".repeat(5000));
    assert!(toml::from_str::<SyncPayload>(&oversized).is_err());

    assert!(toml::from_str::<SyncPayload>("passkey = \"\"\nchecksum = \"QUJD\"").is_err());
}
