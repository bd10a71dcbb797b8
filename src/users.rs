use std::sync::Arc;

use anyhow::Context as _;
use anyhow::Result;
use uuid::Uuid;

use crate::auth::TokenService;
use crate::config::Config;
use crate::storage;
use crate::storage::Context;
use crate::storage::CreateUserValues;
use crate::storage::UserRepository;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// Read side of the users, used to check note owners
#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserRepository>,
}

impl UserService {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    /// Find a user by its ID
    ///
    /// # Errors
    ///
    /// Will return [`storage::Error::NotFound`] for unknown users
    pub async fn query_by_id(&self, ctx: &Context, user_id: &Uuid) -> storage::Result<User> {
        self.users.find_single_user_by_id(ctx, user_id).await
    }
}

/// Make sure there is at least one user to hand out tokens for
///
/// A newly created user is logged together with an access token, so a fresh installation can be
/// used right away
pub async fn ensure_initial_user(
    users: &dyn UserRepository,
    token_service: &TokenService,
    config: &Config,
) -> Result<()> {
    let ctx = Context::background();

    let user = users
        .find_any_single_user(&ctx)
        .await
        .context("Could not look up users")?;

    if user.is_none() {
        let values = CreateUserValues {
            name: &config.initial_user_name,
            email: &config.initial_user_email,
        };

        let user = users
            .create_user(&ctx, &values)
            .await
            .context("Could not create initial user")?;

        let token = token_service
            .issue(&user.id, config.token_ttl)
            .context("Could not issue token for initial user")?;

        tracing::info!(
            user_id = %user.id,
            expires_in = token.expires_in,
            "Created initial user `{}`, access token: {}",
            user.name,
            token.access_token,
        );
    }

    Ok(())
}
