//! PKCE (Proof Key for Code Exchange, RFC 7636).
//!
//! Only the S256 method is accepted. A request that omits
//! `code_challenge_method` defaults to `plain` (RFC 7636 §4.3) and is
//! therefore rejected.
//!
//! ```
//! use idsrv_auth::oauth::pkce::{PkceChallenge, PkceVerifier};
//!
//! let verifier = PkceVerifier::generate();
//! let challenge = PkceChallenge::from_verifier(&verifier);
//!
//! let stored = PkceChallenge::new(challenge.as_str().to_string()).unwrap();
//! assert!(stored.verify(&verifier).is_ok());
//! ```

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AuthError;

/// Errors that can occur during PKCE validation.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PkceError {
    /// Verifier length is outside 43..=128.
    #[error("Invalid verifier length: must be 43-128 characters, got {0}")]
    InvalidVerifierLength(usize),

    /// Verifier contains characters outside the unreserved set.
    #[error("Invalid verifier characters: must be [A-Za-z0-9-._~]")]
    InvalidVerifierCharacters,

    /// Challenge is not a 43 character base64url string.
    #[error("Invalid challenge format: must be base64url of a SHA-256 digest")]
    InvalidChallengeFormat,

    /// Unsupported challenge method.
    #[error("Unsupported challenge method: {0}. Only S256 is supported.")]
    UnsupportedMethod(String),

    /// The verifier does not hash to the recorded challenge.
    #[error("PKCE verification failed: verifier does not match challenge")]
    VerificationFailed,
}

impl From<PkceError> for AuthError {
    fn from(err: PkceError) -> Self {
        match err {
            PkceError::VerificationFailed => AuthError::invalid_grant(err.to_string()),
            other => AuthError::invalid_request(other.to_string()),
        }
    }
}

/// PKCE challenge method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PkceChallengeMethod {
    /// SHA-256 hash.
    #[default]
    S256,
}

impl PkceChallengeMethod {
    /// Parses the `code_challenge_method` parameter. `None` means `plain`.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedMethod` for anything but `S256`.
    pub fn parse(method: Option<&str>) -> Result<Self, PkceError> {
        match method {
            Some("S256") => Ok(Self::S256),
            Some(other) => Err(PkceError::UnsupportedMethod(other.to_string())),
            None => Err(PkceError::UnsupportedMethod("plain".to_string())),
        }
    }

    /// Returns the method name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S256 => "S256",
        }
    }
}

impl std::fmt::Display for PkceChallengeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// PKCE code verifier.
#[derive(Debug, Clone)]
pub struct PkceVerifier(String);

impl PkceVerifier {
    /// Validates a verifier received from a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the length or character set is wrong.
    pub fn new(verifier: String) -> Result<Self, PkceError> {
        let len = verifier.len();
        if !(43..=128).contains(&len) {
            return Err(PkceError::InvalidVerifierLength(len));
        }

        if !verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
        {
            return Err(PkceError::InvalidVerifierCharacters);
        }

        Ok(Self(verifier))
    }

    /// Generates a random verifier (32 bytes, base64url, 43 characters).
    #[must_use]
    pub fn generate() -> Self {
        use rand::Rng;
        let bytes: [u8; 32] = rand::thread_rng().r#gen();
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Returns the verifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// PKCE code challenge (`BASE64URL(SHA256(verifier))`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkceChallenge(String);

impl PkceChallenge {
    /// Computes the S256 challenge of `verifier`.
    #[must_use]
    pub fn from_verifier(verifier: &PkceVerifier) -> Self {
        let hash = Sha256::digest(verifier.0.as_bytes());
        Self(URL_SAFE_NO_PAD.encode(hash))
    }

    /// Validates a challenge received from a client.
    ///
    /// # Errors
    ///
    /// Returns `InvalidChallengeFormat` unless the value decodes to 32 bytes.
    pub fn new(challenge: String) -> Result<Self, PkceError> {
        match URL_SAFE_NO_PAD.decode(&challenge) {
            Ok(bytes) if bytes.len() == 32 => Ok(Self(challenge)),
            _ => Err(PkceError::InvalidChallengeFormat),
        }
    }

    /// Checks `verifier` against this challenge.
    ///
    /// # Errors
    ///
    /// Returns `VerificationFailed` on mismatch.
    pub fn verify(&self, verifier: &PkceVerifier) -> Result<(), PkceError> {
        if Self::from_verifier(verifier).0 == self.0 {
            Ok(())
        } else {
            Err(PkceError::VerificationFailed)
        }
    }

    /// Returns the challenge as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc7636_appendix_b_vector() {
        let verifier =
            PkceVerifier::new("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string()).unwrap();
        let challenge = PkceChallenge::from_verifier(&verifier);
        assert_eq!(
            challenge.as_str(),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_verify_mismatch() {
        let challenge = PkceChallenge::from_verifier(&PkceVerifier::generate());
        assert_eq!(
            challenge.verify(&PkceVerifier::generate()),
            Err(PkceError::VerificationFailed)
        );
    }

    #[test]
    fn test_verifier_bounds() {
        assert_eq!(
            PkceVerifier::new("a".repeat(42)).unwrap_err(),
            PkceError::InvalidVerifierLength(42)
        );
        assert!(PkceVerifier::new("a".repeat(43)).is_ok());
        assert!(PkceVerifier::new("a".repeat(128)).is_ok());
        assert!(PkceVerifier::new("a".repeat(129)).is_err());
        assert_eq!(
            PkceVerifier::new(format!("{}+", "a".repeat(43))).unwrap_err(),
            PkceError::InvalidVerifierCharacters
        );
    }

    #[test]
    fn test_challenge_format() {
        assert!(PkceChallenge::new("E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM".into()).is_ok());
        assert!(PkceChallenge::new("short".into()).is_err());
        assert!(PkceChallenge::new("not base64!".into()).is_err());
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!(
            PkceChallengeMethod::parse(Some("S256")).unwrap(),
            PkceChallengeMethod::S256
        );
        assert!(PkceChallengeMethod::parse(Some("plain")).is_err());
        assert!(PkceChallengeMethod::parse(None).is_err());
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(
            AuthError::from(PkceError::VerificationFailed).oauth_error_code(),
            "invalid_grant"
        );
        assert_eq!(
            AuthError::from(PkceError::InvalidChallengeFormat).oauth_error_code(),
            "invalid_request"
        );
    }
}
