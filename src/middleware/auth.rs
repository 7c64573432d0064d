//! Bearer-token authentication. Token verification itself is an external
//! collaborator (§1); this module only extracts the header, hands it to
//! whatever `TokenVerifier` the app was built with, and stashes the result
//! on request extensions for handlers/extractors to pick up.

use crate::error::AppError;
use crate::models::{AuthenticatedUser, Claims};
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use serde_json::json;
use std::sync::Arc;

/// Verifies a bearer token against the external identity provider. The real
/// implementation (Firebase) lives outside this crate's scope; tests and
/// local runs can supply a mock.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Claims, AppError>;
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "error": "unauthorized", "message": "Authentication required" })),
                )
            })
    }
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
}

/// Required authentication: rejects with 401 when the token is missing or
/// fails verification (§6, §7 `Unauthorized`).
pub async fn auth_middleware(
    State(verifier): State<Arc<dyn TokenVerifier>>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = bearer_token(&request).ok_or(StatusCode::UNAUTHORIZED)?.to_string();
    let claims = verifier.verify(&token).await.map_err(|_| StatusCode::UNAUTHORIZED)?;
    let user = AuthenticatedUser::from(claims.clone());
    request.extensions_mut().insert(claims);
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Optional authentication: attaches the principal when a valid token is
/// present, otherwise proceeds unauthenticated (used by `GET /api/search`).
pub async fn optional_auth_middleware(
    State(verifier): State<Arc<dyn TokenVerifier>>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = bearer_token(&request).map(str::to_string) {
        if let Ok(claims) = verifier.verify(&token).await {
            let user = AuthenticatedUser::from(claims.clone());
            request.extensions_mut().insert(claims);
            request.extensions_mut().insert(user);
        }
    }
    next.run(request).await
}

/// Extract the authenticated principal from request extensions (helper for
/// handlers that receive a raw `Request`).
pub fn extract_user(request: &Request) -> Option<&AuthenticatedUser> {
    request.extensions().get::<AuthenticatedUser>()
}

/// Extract claims from request extensions (helper for handlers).
pub fn extract_claims(request: &Request) -> Option<&Claims> {
    request.extensions().get::<Claims>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request as HttpRequest, middleware, routing::get, Router};
    use tower::ServiceExt;

    struct AlwaysValid;

    #[async_trait]
    impl TokenVerifier for AlwaysValid {
        async fn verify(&self, token: &str) -> Result<Claims, AppError> {
            if token == "good" {
                Ok(Claims { sub: "user-1".to_string(), email: None, exp: 0, iat: 0 })
            } else {
                Err(AppError::Unauthorized)
            }
        }
    }

    async fn protected_handler() -> &'static str {
        "ok"
    }

    fn router() -> Router {
        let verifier: Arc<dyn TokenVerifier> = Arc::new(AlwaysValid);
        Router::new()
            .route("/protected", get(protected_handler))
            .route_layer(middleware::from_fn_with_state(verifier.clone(), auth_middleware))
            .with_state(verifier)
    }

    #[tokio::test]
    async fn rejects_missing_token() {
        let response = router()
            .oneshot(HttpRequest::builder().uri("/protected").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn accepts_valid_token() {
        let response = router()
            .oneshot(
                HttpRequest::builder()
                    .uri("/protected")
                    .header(AUTHORIZATION, "Bearer good")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
