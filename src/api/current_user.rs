//! Current user
//!
//! Get the authenticated user from the claims the middleware attached to the request

use std::ops::Deref;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::api::Error;
use crate::auth::Claims;

/// The verified claims of the caller
#[derive(Clone, Debug)]
pub struct CurrentUser {
    claims: Claims,
}

impl CurrentUser {
    /// The ID of the authenticated user
    pub fn id(&self) -> Uuid {
        self.claims.subject
    }

    /// Only let the caller act on resources of `user_id`
    ///
    /// # Errors
    ///
    /// Will return a `403` for any other user
    pub fn ensure_is(&self, user_id: &Uuid) -> Result<(), Error> {
        if self.claims.subject == *user_id {
            Ok(())
        } else {
            Err(Error::forbidden("Not allowed to access"))
        }
    }
}

impl Deref for CurrentUser {
    type Target = Claims;

    fn deref(&self) -> &Self::Target {
        &self.claims
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // only there when the authentication middleware let the request through
        let claims = parts
            .extensions
            .get::<Claims>()
            .cloned()
            .ok_or_else(|| Error::forbidden("Missing authentication"))?;

        Ok(CurrentUser { claims })
    }
}
