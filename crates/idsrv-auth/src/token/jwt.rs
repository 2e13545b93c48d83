//! Signing key material, JWK export and the JWT error type.
//!
//! Algorithms:
//!
//! - **RS256**: RSA with SHA-256 (widely compatible, default)
//! - **RS384**: RSA with SHA-384
//! - **ES384**: ECDSA with P-384 curve (smaller keys, fast generation)

use std::fmt;
use std::str::FromStr;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use p384::SecretKey as EcSecretKey;
use p384::ecdsa::SigningKey as EcSigningKey;
use rand::rngs::OsRng;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::RsaPrivateKey;
use rsa::traits::PublicKeyParts;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384};
use time::OffsetDateTime;

use crate::error::AuthError;

/// Signing and verification failures below the [`AuthError`] layer.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("could not sign token: {message}")]
    EncodingError {
        message: String,
    },

    #[error("could not parse token: {message}")]
    DecodingError {
        message: String,
    },

    #[error("token past exp")]
    Expired,

    #[error("signature mismatch")]
    InvalidSignature,

    /// The token claims are invalid (issuer, audience, required claims).
    #[error("claims rejected: {message}")]
    InvalidClaims {
        message: String,
    },

    /// No published verification key carries this key ID.
    #[error("no published key with kid {kid}")]
    KeyNotFound {
        kid: String,
    },

    #[error("could not generate key pair: {message}")]
    KeyGenerationError {
        message: String,
    },

    /// PEM or DER that does not parse as a supported private key.
    #[error("unusable key material: {message}")]
    InvalidKey {
        message: String,
    },
}

impl JwtError {
    #[must_use]
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::EncodingError {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn decoding_error(message: impl Into<String>) -> Self {
        Self::DecodingError {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_claims(message: impl Into<String>) -> Self {
        Self::InvalidClaims {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn key_not_found(kid: impl Into<String>) -> Self {
        Self::KeyNotFound { kid: kid.into() }
    }

    #[must_use]
    pub fn key_generation_error(message: impl Into<String>) -> Self {
        Self::KeyGenerationError {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Returns `true` for ordinary rejection outcomes of verification.
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::Expired
                | Self::InvalidSignature
                | Self::InvalidClaims { .. }
                | Self::KeyNotFound { .. }
                | Self::DecodingError { .. }
        )
    }

    /// Returns `true` if this is a key material error.
    #[must_use]
    pub fn is_key_error(&self) -> bool {
        matches!(
            self,
            Self::KeyGenerationError { .. } | Self::InvalidKey { .. }
        )
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidAudience
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidSubject
            | ErrorKind::ImmatureSignature
            | ErrorKind::MissingRequiredClaim(_) => Self::invalid_claims(err.to_string()),
            ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey
            | ErrorKind::InvalidKeyFormat => Self::invalid_key(err.to_string()),
            _ => Self::decoding_error(err.to_string()),
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => AuthError::ExpiredToken,
            JwtError::InvalidSignature | JwtError::KeyNotFound { .. } => {
                AuthError::SignatureInvalid
            }
            JwtError::DecodingError { message } | JwtError::InvalidClaims { message } => {
                AuthError::invalid_token(message)
            }
            JwtError::KeyGenerationError { message } | JwtError::InvalidKey { message } => {
                AuthError::key_unavailable(message)
            }
            JwtError::EncodingError { message } => AuthError::internal(message),
        }
    }
}

/// Supported signing algorithms for issued tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    /// RSA with SHA-256.
    #[default]
    RS256,
    /// RSA with SHA-384.
    RS384,
    /// ECDSA with P-384 curve.
    ES384,
}

impl SigningAlgorithm {
    /// Converts to the `jsonwebtoken` Algorithm type.
    #[must_use]
    pub fn to_jwt_algorithm(self) -> Algorithm {
        match self {
            Self::RS256 => Algorithm::RS256,
            Self::RS384 => Algorithm::RS384,
            Self::ES384 => Algorithm::ES384,
        }
    }

    /// Returns the algorithm name as used in JWK/JWT headers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::ES384 => "ES384",
        }
    }

    /// Returns `true` if this is an RSA-based algorithm.
    #[must_use]
    pub fn is_rsa(&self) -> bool {
        matches!(self, Self::RS256 | Self::RS384)
    }

    /// Left-most half of the algorithm's hash over `value`, base64url encoded.
    ///
    /// This is the `at_hash` / `c_hash` construction from OpenID Connect Core.
    #[must_use]
    pub fn half_hash(&self, value: &str) -> String {
        let digest: Vec<u8> = match self {
            Self::RS256 => Sha256::digest(value.as_bytes()).to_vec(),
            Self::RS384 | Self::ES384 => Sha384::digest(value.as_bytes()).to_vec(),
        };
        URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2])
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SigningAlgorithm {
    type Err = JwtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RS256" => Ok(Self::RS256),
            "RS384" => Ok(Self::RS384),
            "ES384" => Ok(Self::ES384),
            other => Err(JwtError::invalid_key(format!(
                "unsupported signing algorithm: {other}"
            ))),
        }
    }
}

/// JSON Web Key Set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Jwks {
    /// The keys in this set.
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// Finds a key by its `kid`.
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }
}

/// JSON Web Key (public part only).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Jwk {
    /// Key type ("RSA" or "EC").
    pub kty: String,

    /// Key ID.
    pub kid: String,

    /// Key use ("sig").
    #[serde(rename = "use")]
    pub use_: String,

    /// Algorithm.
    pub alg: String,

    /// RSA modulus (base64url).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA exponent (base64url).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    /// EC curve name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// EC x coordinate (base64url).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

impl Jwk {
    /// Builds a verification key from the published components.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` when the key type, algorithm or components are
    /// missing or malformed.
    pub fn to_decoding_key(&self) -> Result<(DecodingKey, Algorithm), JwtError> {
        let algorithm = SigningAlgorithm::from_str(&self.alg)?;
        let key = match (self.kty.as_str(), algorithm.is_rsa()) {
            ("RSA", true) => {
                let n = self.n.as_deref().ok_or_else(|| JwtError::invalid_key("missing n"))?;
                let e = self.e.as_deref().ok_or_else(|| JwtError::invalid_key("missing e"))?;
                DecodingKey::from_rsa_components(n, e)?
            }
            ("EC", false) => {
                let x = self.x.as_deref().ok_or_else(|| JwtError::invalid_key("missing x"))?;
                let y = self.y.as_deref().ok_or_else(|| JwtError::invalid_key("missing y"))?;
                DecodingKey::from_ec_components(x, y)?
            }
            (kty, _) => {
                return Err(JwtError::invalid_key(format!(
                    "key type {kty} does not match algorithm {algorithm}"
                )));
            }
        };
        Ok((key, algorithm.to_jwt_algorithm()))
    }
}

/// A signing key pair.
pub struct SigningKeyPair {
    /// Key ID, published in the JWT header and the JWKS.
    pub kid: String,

    /// Signing algorithm.
    pub algorithm: SigningAlgorithm,

    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    public_key_data: PublicKeyData,

    /// When the key was created or loaded.
    pub created_at: OffsetDateTime,
}

enum PublicKeyData {
    Rsa { n: Vec<u8>, e: Vec<u8> },
    Ec { x: Vec<u8>, y: Vec<u8> },
}

impl fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl SigningKeyPair {
    /// Generates a new key pair for `algorithm`.
    ///
    /// # Errors
    /// Returns an error if key generation fails.
    pub fn generate(algorithm: SigningAlgorithm) -> Result<Self, JwtError> {
        if algorithm.is_rsa() {
            Self::generate_rsa(algorithm)
        } else {
            Self::generate_ec()
        }
    }

    /// Generates a new 2048-bit RSA key pair.
    ///
    /// # Errors
    /// Returns an error if key generation fails or algorithm is not RSA-based.
    pub fn generate_rsa(algorithm: SigningAlgorithm) -> Result<Self, JwtError> {
        if !algorithm.is_rsa() {
            return Err(JwtError::invalid_key(format!(
                "Algorithm {algorithm} is not RSA-based"
            )));
        }

        let private_key = RsaPrivateKey::new(&mut OsRng, 2048)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;
        Self::from_rsa_key(new_kid(), algorithm, &private_key)
    }

    /// Generates a new EC key pair on the P-384 curve.
    ///
    /// # Errors
    /// Returns an error if key generation fails.
    pub fn generate_ec() -> Result<Self, JwtError> {
        let secret_key = EcSecretKey::random(&mut OsRng);
        Self::from_ec_key(new_kid(), &secret_key)
    }

    /// Loads a key pair from a PEM-encoded private key.
    ///
    /// RSA keys may be PKCS#1 or PKCS#8; EC keys may be PKCS#8 or SEC1. The
    /// public half is derived from the private key.
    ///
    /// # Errors
    /// Returns an error if the PEM data is invalid for `algorithm`.
    pub fn from_private_pem(
        kid: impl Into<String>,
        algorithm: SigningAlgorithm,
        private_pem: &str,
    ) -> Result<Self, JwtError> {
        if algorithm.is_rsa() {
            let private_key = RsaPrivateKey::from_pkcs8_pem(private_pem)
                .or_else(|_| RsaPrivateKey::from_pkcs1_pem(private_pem))
                .map_err(|e| JwtError::invalid_key(e.to_string()))?;
            Self::from_rsa_key(kid.into(), algorithm, &private_key)
        } else {
            let secret_key = EcSecretKey::from_pkcs8_pem(private_pem)
                .or_else(|_| EcSecretKey::from_sec1_pem(private_pem))
                .map_err(|e| JwtError::invalid_key(e.to_string()))?;
            Self::from_ec_key(kid.into(), &secret_key)
        }
    }

    fn from_rsa_key(
        kid: String,
        algorithm: SigningAlgorithm,
        private_key: &RsaPrivateKey,
    ) -> Result<Self, JwtError> {
        let public_key = private_key.to_public_key();
        let n = public_key.n().to_bytes_be();
        let e = public_key.e().to_bytes_be();

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;
        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())?;

        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())?;

        Ok(Self {
            kid,
            algorithm,
            encoding_key,
            decoding_key,
            public_key_data: PublicKeyData::Rsa { n, e },
            created_at: OffsetDateTime::now_utc(),
        })
    }

    fn from_ec_key(kid: String, secret_key: &EcSecretKey) -> Result<Self, JwtError> {
        let signing_key = EcSigningKey::from(secret_key);
        let point = signing_key.verifying_key().to_encoded_point(false);
        let x = point
            .x()
            .ok_or_else(|| JwtError::invalid_key("Missing x coordinate"))?;
        let y = point
            .y()
            .ok_or_else(|| JwtError::invalid_key("Missing y coordinate"))?;

        // jsonwebtoken only accepts PKCS#8 for EC private keys
        let private_pem = secret_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;
        let encoding_key = EncodingKey::from_ec_pem(private_pem.as_bytes())?;

        let x_b64 = URL_SAFE_NO_PAD.encode(x.as_slice());
        let y_b64 = URL_SAFE_NO_PAD.encode(y.as_slice());
        let decoding_key = DecodingKey::from_ec_components(&x_b64, &y_b64)?;

        Ok(Self {
            kid,
            algorithm: SigningAlgorithm::ES384,
            encoding_key,
            decoding_key,
            public_key_data: PublicKeyData::Ec {
                x: x.to_vec(),
                y: y.to_vec(),
            },
            created_at: OffsetDateTime::now_utc(),
        })
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Exports the public key as a JWK.
    #[must_use]
    pub fn to_jwk(&self) -> Jwk {
        match &self.public_key_data {
            PublicKeyData::Rsa { n, e } => Jwk {
                kty: "RSA".to_string(),
                kid: self.kid.clone(),
                use_: "sig".to_string(),
                alg: self.algorithm.as_str().to_string(),
                n: Some(URL_SAFE_NO_PAD.encode(n)),
                e: Some(URL_SAFE_NO_PAD.encode(e)),
                crv: None,
                x: None,
                y: None,
            },
            PublicKeyData::Ec { x, y } => Jwk {
                kty: "EC".to_string(),
                kid: self.kid.clone(),
                use_: "sig".to_string(),
                alg: self.algorithm.as_str().to_string(),
                n: None,
                e: None,
                crv: Some("P-384".to_string()),
                x: Some(URL_SAFE_NO_PAD.encode(x)),
                y: Some(URL_SAFE_NO_PAD.encode(y)),
            },
        }
    }
}

fn new_kid() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
