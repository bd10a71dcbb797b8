//! Token service
//!
//! Mints and verifies HS256 signed bearer tokens. The key is handed in at construction and never
//! changes afterwards, so a single service can be shared between all requests.

use chrono::DateTime;
use chrono::TimeDelta;
use chrono::Utc;
use jsonwebtoken::Algorithm;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use jsonwebtoken::Validation;
use jsonwebtoken::errors::ErrorKind;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// The only accepted signing algorithm
pub const ALGORITHM: Algorithm = Algorithm::HS256;

/// Shortest accepted signing key, in bytes
pub const MIN_KEY_LENGTH: usize = 32;

/// Errors while building the service or minting tokens
#[derive(Debug, Error)]
pub enum Error {
    /// The configured key is too short to be used for signing
    #[error("token signing key must be at least {MIN_KEY_LENGTH} bytes, got {0}")]
    KeyTooShort(usize),

    /// The token could not be signed
    #[error("could not sign token: {0}")]
    Key(#[source] jsonwebtoken::errors::Error),

    /// Now plus the ttl is past the last representable date
    #[error("token ttl of {0} seconds is out of range")]
    TtlOutOfRange(i64),
}

/// Reasons a token is not accepted
#[derive(Debug, Error)]
pub enum VerifyError {
    /// Signed with another key
    #[error("invalid token signature")]
    Signature,

    /// Signed with another algorithm than [`ALGORITHM`]
    #[error("unexpected token algorithm")]
    Algorithm,

    /// No longer valid
    #[error("token expired")]
    Expired,

    /// The expiry can not be represented as a date
    #[error("invalid token expiry: {0}")]
    InvalidExpiry(i64),

    /// Anything else: not a token, missing claims, ...
    #[error("malformed token: {0}")]
    Malformed(#[source] jsonwebtoken::errors::Error),
}

impl From<jsonwebtoken::errors::Error> for VerifyError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature => Self::Signature,
            ErrorKind::InvalidAlgorithm => Self::Algorithm,
            ErrorKind::ExpiredSignature => Self::Expired,
            _ => Self::Malformed(err),
        }
    }
}

/// The payload as it is signed
#[derive(Clone, Debug, Deserialize, Serialize)]
struct TokenClaims {
    /// The user ID
    sub: Uuid,

    /// Expiry, in seconds since the epoch
    exp: i64,
}

/// The verified payload of a token
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Claims {
    /// The authenticated user
    pub subject: Uuid,

    /// When the token stops being valid
    pub expires_at: DateTime<Utc>,
}

/// Token information served to the outside world
#[derive(Debug, Serialize)]
pub struct IssuedToken {
    /// Type of the token: Bearer
    pub token_type: &'static str,

    /// In how many seconds does the token expire
    pub expires_in: i64,

    /// The access token to provide to follow up requests in the Authorization header
    pub access_token: String,
}

/// Mint and verify tokens with a single shared secret
#[derive(Clone)]
pub struct TokenService {
    /// The encoding key
    encoding: EncodingKey,

    /// The decoding key
    decoding: DecodingKey,

    /// Rules every token has to pass
    validation: Validation,
}

impl TokenService {
    /// Create the service with a secret of at least [`MIN_KEY_LENGTH`] bytes
    ///
    /// # Errors
    ///
    /// Will return [`Error::KeyTooShort`] for shorter secrets
    pub fn new(secret: &[u8]) -> Result<Self, Error> {
        if secret.len() < MIN_KEY_LENGTH {
            return Err(Error::KeyTooShort(secret.len()));
        }

        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        })
    }

    /// Mint a token for `user_id`, valid for `ttl` (second precision)
    ///
    /// # Errors
    ///
    /// - [`Error::TtlOutOfRange`] when the expiry can not be represented
    /// - [`Error::Key`] when signing fails
    pub fn mint(&self, user_id: &Uuid, ttl: TimeDelta) -> Result<String, Error> {
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .ok_or(Error::TtlOutOfRange(ttl.num_seconds()))?;

        let claims = TokenClaims {
            sub: *user_id,
            exp: expires_at.timestamp(),
        };

        jsonwebtoken::encode(&Header::new(ALGORITHM), &claims, &self.encoding).map_err(Error::Key)
    }

    /// Mint a token and wrap it for the outside world
    ///
    /// # Errors
    ///
    /// Same as [`TokenService::mint`]
    pub fn issue(&self, user_id: &Uuid, ttl: TimeDelta) -> Result<IssuedToken, Error> {
        Ok(IssuedToken {
            token_type: "Bearer",
            expires_in: ttl.num_seconds(),
            access_token: self.mint(user_id, ttl)?,
        })
    }

    /// Verify signature, algorithm and expiry of a token
    ///
    /// # Errors
    ///
    /// Will return a [`VerifyError`] describing why the token is rejected
    pub fn verify(&self, token: &str) -> Result<Claims, VerifyError> {
        let claims =
            jsonwebtoken::decode::<TokenClaims>(token, &self.decoding, &self.validation)?.claims;

        // the library lets a token expiring this very second through
        if claims.exp <= Utc::now().timestamp() {
            return Err(VerifyError::Expired);
        }

        let expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or(VerifyError::InvalidExpiry(claims.exp))?;

        Ok(Claims {
            subject: claims.sub,
            expires_at,
        })
    }
}
