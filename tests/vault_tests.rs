//! Tests for the vault codec: round-trips, pass-through semantics and the
//! distinct decrypt failure modes.

use convoy::error::Error;
use convoy::vault::{self, Vault, VAULT_PREFIX};
use indexmap::IndexMap;

#[test]
fn encrypt_decrypt_round_trip() {
    let vault = Vault::new("hunter2");
    let token = vault.encrypt("the plan").unwrap();

    assert!(token.starts_with(VAULT_PREFIX));
    assert_eq!(vault.decrypt(&token).unwrap(), "the plan");
}

#[test]
fn round_trip_empty_and_unicode() {
    let vault = Vault::new("pw");
    for plaintext in ["", "λ plaintext ünïcode", "line1\nline2\n"] {
        let token = vault.encrypt(plaintext).unwrap();
        assert_eq!(vault.decrypt(&token).unwrap(), plaintext);
    }
}

#[test]
fn plain_strings_pass_through_unchanged() {
    let vault = Vault::new("pw");
    assert_eq!(vault.decrypt("not a token").unwrap(), "not a token");
    assert_eq!(vault.decrypt("").unwrap(), "");
}

#[test]
fn random_nonce_makes_ciphertexts_distinct() {
    let vault = Vault::new("pw");
    let a = vault.encrypt("same input").unwrap();
    let b = vault.encrypt("same input").unwrap();
    assert_ne!(a, b);

    // Both still decrypt to the same plaintext.
    assert_eq!(vault.decrypt(&a).unwrap(), vault.decrypt(&b).unwrap());
}

#[test]
fn wrong_password_is_a_decrypt_error() {
    let token = Vault::new("right").encrypt("secret").unwrap();
    let err = Vault::new("wrong").decrypt(&token).unwrap_err();
    assert!(matches!(err, Error::VaultDecrypt(_)));
}

#[test]
fn corrupt_base64_is_a_decrypt_error() {
    let vault = Vault::new("pw");
    let err = vault
        .decrypt(&format!("{}%%%not-base64%%%", VAULT_PREFIX))
        .unwrap_err();
    assert!(err.to_string().contains("base64"));
}

#[test]
fn short_ciphertext_is_a_decrypt_error() {
    let vault = Vault::new("pw");
    // Valid base64 decoding to fewer bytes than one nonce.
    let err = vault.decrypt(&format!("{}AAAA", VAULT_PREFIX)).unwrap_err();
    assert!(err.to_string().contains("short"));
}

#[test]
fn tampered_ciphertext_fails_authentication() {
    let vault = Vault::new("pw");
    let token = vault.encrypt("payload").unwrap();

    // Flip a character in the base64 body.
    let body = &token[VAULT_PREFIX.len()..];
    let flipped = if body.as_bytes()[0] == b'A' { "B" } else { "A" };
    let tampered = format!("{}{}{}", VAULT_PREFIX, flipped, &body[1..]);

    assert!(vault.decrypt(&tampered).is_err());
}

#[test]
fn decrypt_map_only_touches_tokens() {
    let vault = Vault::new("pw");
    let token = vault.encrypt("db-pass").unwrap();

    let mut map = IndexMap::new();
    map.insert("plain".to_string(), "as-is".to_string());
    map.insert("secret".to_string(), token);

    vault.decrypt_map(&mut map).unwrap();
    assert_eq!(map["plain"], "as-is");
    assert_eq!(map["secret"], "db-pass");
}

#[test]
fn load_password_strips_whitespace() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vault_pass");
    std::fs::write(&path, "pw\n").unwrap();

    assert_eq!(vault::load_password(&path).unwrap(), "pw");
    assert!(vault::load_password(dir.path().join("missing")).is_err());
}
