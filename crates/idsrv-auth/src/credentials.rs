//! Credential hashing and opaque handle generation.
//!
//! - User passwords are hashed with Argon2id and stored as PHC strings.
//! - Client secrets are high-entropy, so they are stored as SHA-256 hex digests
//!   and compared digest-to-digest.
//! - Authorization codes and refresh tokens are 256-bit random values encoded
//!   as base64url. Only their SHA-256 digest is ever kept server-side.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

/// Hash a password for storage using Argon2id.
///
/// # Errors
///
/// Returns `argon2::password_hash::Error` if hashing fails (rare).
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a stored Argon2 PHC hash.
///
/// Returns `Ok(false)` on mismatch and `Err` only when the stored hash is
/// not a valid PHC string.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed_hash = PasswordHash::new(hash)?;
    let result = Argon2::default().verify_password(password.as_bytes(), &parsed_hash);
    Ok(result.is_ok())
}

/// SHA-256 of `value`, hex encoded.
#[must_use]
pub fn sha256_hex(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash a client secret for storage.
#[must_use]
pub fn hash_client_secret(secret: &str) -> String {
    sha256_hex(secret)
}

/// Check a presented client secret against the stored digests.
#[must_use]
pub fn verify_client_secret(secret: &str, stored_hashes: &[String]) -> bool {
    let presented = hash_client_secret(secret);
    stored_hashes
        .iter()
        .any(|stored| constant_time_eq(stored.as_bytes(), presented.as_bytes()))
}

/// Generate a 256-bit random handle encoded as base64url (43 characters).
#[must_use]
pub fn generate_handle() -> String {
    let mut bytes = [0u8; 32];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
