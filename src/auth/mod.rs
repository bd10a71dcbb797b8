//! Authentication of bearer tokens
//!
//! Only answers "who is this", whether that user may touch a resource is decided by the endpoint

use thiserror::Error;

pub use token::Claims;
pub use token::TokenService;
pub use token::VerifyError;

pub mod token;

/// The `Authorization` header is not `Bearer <token>`
#[derive(Debug, Error, PartialEq, Eq)]
#[error("expected authorization header format: Bearer <token>")]
pub struct HeaderError;

/// Authentication errors
#[derive(Debug, Error)]
pub enum Error {
    /// The header itself is malformed
    #[error("authenticate: {0}")]
    Header(#[from] HeaderError),

    /// The token is not accepted
    #[error("authenticate: {0}")]
    Verify(#[from] VerifyError),
}

/// Turns `Authorization` header values into claims
#[derive(Clone)]
pub struct Authenticator {
    /// Verifies the tokens
    token_service: TokenService,
}

impl Authenticator {
    pub fn new(token_service: TokenService) -> Self {
        Self { token_service }
    }

    /// Authenticate the value of an `Authorization` header
    ///
    /// # Errors
    ///
    /// - [`Error::Header`] when the value is not exactly `Bearer <token>`
    /// - [`Error::Verify`] when the token is rejected
    pub fn authenticate(&self, header: &str) -> Result<Claims, Error> {
        let token = parse_bearer(header)?;

        Ok(self.token_service.verify(token)?)
    }
}

/// Extract the token from `Bearer <token>`, nothing more and nothing less
fn parse_bearer(header: &str) -> Result<&str, HeaderError> {
    match header.split_once(' ') {
        Some(("Bearer", token)) if !token.is_empty() && !token.contains(char::is_whitespace) => {
            Ok(token)
        }
        _ => Err(HeaderError),
    }
}
