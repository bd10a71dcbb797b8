//! Authentication middleware
//!
//! Every note endpoint sits behind it, the handlers only run for verified callers

use axum::Extension;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;

use crate::auth::Authenticator;

/// Body of every rejected request
pub const FAILED_AUTHENTICATION: &str = "Failed Authentication\n";

/// Verify the `Authorization` header and attach the claims to the request
///
/// Requests that do not pass get a plain `403` and never reach the handler
pub async fn require_authentication(
    Extension(authenticator): Extension<Authenticator>,
    mut request: Request,
    next: Next,
) -> Response {
    // a missing or non-text header goes through the same path as a malformed one
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    match authenticator.authenticate(header) {
        Ok(claims) => {
            tracing::debug!(
                user_id = %claims.subject,
                expires_at = %claims.expires_at,
                "Authenticated request"
            );

            request.extensions_mut().insert(claims);

            next.run(request).await
        }
        Err(err) => {
            tracing::info!(error = %err, path = %request.uri().path(), "Failed authentication");

            (StatusCode::FORBIDDEN, FAILED_AUTHENTICATION).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use axum::Router;
    use axum::body::Body;
    use axum::middleware;
    use axum::routing::get;
    use chrono::TimeDelta;
    use http_body_util::BodyExt;
    use tower::Service;
    use uuid::Uuid;

    use super::*;
    use crate::auth::Claims;
    use crate::auth::TokenService;

    const KEY: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn counting_app(counter: Arc<AtomicUsize>) -> Router {
        let authenticator = Authenticator::new(TokenService::new(KEY).unwrap());

        Router::new()
            .route(
                "/",
                get(move |Extension(claims): Extension<Claims>| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        claims.subject.to_string()
                    }
                }),
            )
            .route_layer(middleware::from_fn(require_authentication))
            .layer(Extension(authenticator))
    }

    async fn call(app: &mut Router, authorization: Option<&str>) -> (StatusCode, String) {
        let mut request = Request::builder().uri("/");
        if let Some(authorization) = authorization {
            request = request.header(AUTHORIZATION, authorization);
        }

        let response = app
            .call(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status_code = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();

        (status_code, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_missing_header_never_reaches_handler() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut app = counting_app(counter.clone());

        let (status_code, body) = call(&mut app, None).await;
        assert_eq!(StatusCode::FORBIDDEN, status_code);
        assert_eq!("Failed Authentication\n", body);
        assert_eq!(0, counter.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_rejected_headers() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut app = counting_app(counter.clone());

        let expired = TokenService::new(KEY)
            .unwrap()
            .mint(&Uuid::new_v4(), TimeDelta::seconds(-1))
            .unwrap();

        for header in [
            String::new(),
            "NoBearer abc".to_string(),
            "Bearer a b".to_string(),
            "Bearer not-a-token".to_string(),
            format!("Bearer {expired}"),
        ] {
            let (status_code, body) = call(&mut app, Some(&header)).await;
            assert_eq!(StatusCode::FORBIDDEN, status_code, "{header}");
            assert_eq!(FAILED_AUTHENTICATION, body);
        }

        assert_eq!(0, counter.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_valid_token_attaches_claims() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut app = counting_app(counter.clone());
        let user_id = Uuid::new_v4();

        let token = TokenService::new(KEY)
            .unwrap()
            .mint(&user_id, TimeDelta::seconds(60))
            .unwrap();

        let (status_code, body) = call(&mut app, Some(&format!("Bearer {token}"))).await;
        assert_eq!(StatusCode::OK, status_code);
        assert_eq!(user_id.to_string(), body);
        assert_eq!(1, counter.load(Ordering::SeqCst));
    }
}
