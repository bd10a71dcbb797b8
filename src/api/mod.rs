//! All API endpoint setup

use axum::Router;
use axum::middleware::from_fn;
use axum::routing::get;

pub use current_user::CurrentUser;
#[cfg(test)]
pub use middleware::FAILED_AUTHENTICATION;
pub use middleware::require_authentication;
pub use request::Form;
pub use request::PathParameters;
pub use request::RequestTimeout;
pub use response::Error;
pub use response::Success;

mod current_user;
mod middleware;
mod notes;
mod request;
mod response;

/// Get the Axum router for all API routes, every one of them requires authentication
pub fn router() -> Router {
    Router::new()
        .route("/users/{user_id}/notes", get(notes::list).post(notes::create))
        .route(
            "/users/{user_id}/notes/{note_id}",
            get(notes::single).put(notes::update).delete(notes::delete),
        )
        .route_layer(from_fn(require_authentication))
}
