//! Signed, expiring session tokens
//!
//! Security notes:
//! - Tokens are signed with HS256 (HMAC-SHA256) and verification accepts
//!   nothing else, so a token declaring another algorithm is rejected
//! - Access and refresh tokens use independent secrets; a leaked refresh
//!   token never verifies as an access token and vice versa
//! - Expiry is part of the signed payload and checked with zero leeway

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::types::WicketError;

const ALGORITHM: Algorithm = Algorithm::HS256;
const MIN_SECRET_LEN: usize = 32;

/// Why a token failed to verify (or sign)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("signature does not match")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("token declares an unexpected signing algorithm")]
    WrongAlgorithm,
    #[error("token is malformed")]
    Malformed,
    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidAlgorithm => Self::WrongAlgorithm,
            _ => Self::Malformed,
        }
    }
}

/// Claims as carried on the wire: the caller's claims plus issue/expiry times
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signed<C> {
    #[serde(flatten)]
    pub claims: C,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Claims embedded in an access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Principal id
    pub sub: String,
    pub email: String,
    /// Primary role id at issue time
    pub role: Option<String>,
    /// Token version at issue time
    pub ver: u64,
}

/// Claims embedded in a refresh token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// Principal id
    pub sub: String,
    /// Token version at issue time
    pub ver: u64,
    /// Selects the long refresh lifetime tier
    pub remember: bool,
}

/// Signs and verifies tokens for one key space
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    /// Create a codec for the given secret
    ///
    /// Returns an error if the secret is empty or too short
    pub fn new(secret: &str) -> Result<Self, WicketError> {
        if secret.is_empty() {
            return Err(WicketError::Config(
                "token secret is required in production mode".into(),
            ));
        }

        if secret.len() < MIN_SECRET_LEN {
            return Err(WicketError::Config(format!(
                "token secret must be at least {MIN_SECRET_LEN} characters"
            )));
        }

        Ok(Self::from_secret(secret))
    }

    fn from_secret(secret: &str) -> Self {
        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Sign `claims`, valid for `ttl` from now
    pub fn sign<C: Serialize>(&self, claims: C, ttl: Duration) -> Result<String, TokenError> {
        let iat = unix_now().map_err(TokenError::Signing)?;
        let exp = iat
            .checked_add(ttl.as_secs())
            .ok_or_else(|| TokenError::Signing("token expiry overflows".into()))?;
        let signed = Signed { claims, iat, exp };

        encode(&Header::new(ALGORITHM), &signed, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify signature, algorithm and expiry, then decode the claims
    pub fn verify<C: DeserializeOwned>(&self, token: &str) -> Result<Signed<C>, TokenError> {
        let data = decode::<Signed<C>>(token, &self.decoding, &self.validation)?;
        Ok(data.claims)
    }
}

/// The two independent key spaces
#[derive(Clone)]
pub struct TokenKeys {
    pub access: TokenCodec,
    pub refresh: TokenCodec,
}

impl TokenKeys {
    pub fn new(access_secret: &str, refresh_secret: &str) -> Result<Self, WicketError> {
        if access_secret == refresh_secret {
            return Err(WicketError::Config(
                "access and refresh token secrets must differ".into(),
            ));
        }

        Ok(Self {
            access: TokenCodec::new(access_secret)?,
            refresh: TokenCodec::new(refresh_secret)?,
        })
    }

    /// Keys for dev mode (fixed secrets, never for production)
    pub fn new_dev() -> Self {
        Self {
            access: TokenCodec::from_secret("dev-mode-access-secret-not-for-production-use"),
            refresh: TokenCodec::from_secret("dev-mode-refresh-secret-not-for-production-use"),
        }
    }
}

fn unix_now() -> Result<u64, String> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| format!("System time error: {}", e))
}

/// Extract token from Authorization header.
/// Supports "Bearer <token>" format and raw tokens.
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;

    if let Some(token) = header.strip_prefix("Bearer ") {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    if !header.contains(' ') {
        let token = header.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    None
}

/// Extract the `token` parameter from a URL query string (percent-decoded)
pub fn extract_token_from_query(query: Option<&str>) -> Option<String> {
    let params: HashMap<String, String> = serde_urlencoded::from_str(query?).ok()?;
    params.get("token").filter(|t| !t.is_empty()).cloned()
}
