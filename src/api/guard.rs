//! Request authentication and authorization gates.
//!
//! `require_auth` is installed as middleware in front of every protected
//! route. It extracts the bearer token (Authorization header, falling back to
//! the `jwt` cookie for browser clients), verifies it, and re-loads the user
//! from the database so that a deactivated or deleted account is rejected
//! even while its token is still cryptographically valid. Role and
//! verification checks run after authentication and reject with 403.
//!
//! `ServiceIdentity` is the parallel gate for machine-to-machine calls: it
//! accepts only tokens carrying a `service` claim, signed with the service
//! secret.

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;

use super::error::ApiError;
use crate::db::{Role, User};
use crate::token::{self, TokenError, UserClaims};
use crate::AppState;

/// Name of the cookie carrying the bearer token for browser clients.
pub const JWT_COOKIE: &str = "jwt";

/// Authenticated request context, attached to request extensions by
/// `require_auth`.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// The user as freshly loaded from the database, not as claimed by the
    /// token.
    pub user: User,
    /// The decoded token claims.
    pub claims: UserClaims,
}

impl AuthContext {
    /// Reject with 403 unless the authenticated user's role is in `roles`.
    pub fn authorize(&self, roles: &[Role]) -> Result<(), ApiError> {
        if roles.contains(&self.user.role) {
            Ok(())
        } else {
            Err(ApiError::forbidden(format!(
                "User role {} is not authorized to access this route",
                self.user.role
            )))
        }
    }

    /// Reject with 403 unless the user has completed email verification.
    pub fn require_verified(&self) -> Result<(), ApiError> {
        if self.user.is_verified {
            Ok(())
        } else {
            Err(ApiError::forbidden(
                "Email not verified. Please verify your email to access this route",
            ))
        }
    }
}

/// Extract the bearer token from the Authorization header, falling back to
/// the `jwt` cookie.
fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION).and_then(|h| h.to_str().ok()) {
        if let Some(token) = auth_header.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }

    CookieJar::from_headers(headers)
        .get(JWT_COOKIE)
        .map(|c| c.value().to_string())
}

/// Load the user referenced by a set of verified claims.
///
/// This is a live lookup: it is what rejects tokens for accounts that have
/// been deleted or deactivated since issuance.
async fn load_claimed_user(state: &AppState, claims: &UserClaims) -> Result<User, ApiError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&claims.id)
        .fetch_optional(&state.db)
        .await?;

    let user =
        user.ok_or_else(|| ApiError::unauthorized("Authentication failed: User not found"))?;

    if !user.is_active {
        return Err(ApiError::unauthorized(
            "Authentication failed: User account is deactivated",
        ));
    }

    Ok(user)
}

/// Middleware protecting authenticated routes.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(request.headers()).ok_or_else(|| {
        ApiError::unauthorized("Authentication failed: No token provided")
    })?;

    let claims = token::decode_user_token(&token, &state.config.auth.jwt_secret)
        .map_err(|e| ApiError::unauthorized(format!("Authentication failed: {e}")))?;

    let user = load_claimed_user(&state, &claims).await?;

    request.extensions_mut().insert(AuthContext { user, claims });
    Ok(next.run(request).await)
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication failed: No token provided"))
    }
}

/// Verified identity of a calling service, extracted from a service token.
#[derive(Debug, Clone)]
pub struct ServiceIdentity {
    pub name: String,
    pub permissions: Vec<String>,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for ServiceIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .ok_or_else(|| {
                ApiError::unauthorized("Service authentication failed: No token provided")
            })?;

        let claims = token::decode_service_token(token, state.config.auth.service_secret())
            .map_err(|e| match e {
                TokenError::NotAServiceToken => {
                    ApiError::forbidden(format!("Service authentication failed: {e}"))
                }
                _ => ApiError::unauthorized(format!("Service authentication failed: {e}")),
            })?;

        Ok(ServiceIdentity {
            name: claims.service,
            permissions: claims.permissions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{insert_user, test_state};
    use crate::token::{issue_service_token, issue_user_token};
    use axum::{
        body::Body,
        extract::Extension,
        http::{Request as HttpRequest, StatusCode},
        middleware,
        routing::get,
        Json, Router,
    };
    use tower::ServiceExt;

    async fn whoami(Extension(ctx): Extension<AuthContext>) -> Json<serde_json::Value> {
        Json(serde_json::json!({ "id": ctx.user.id, "role": ctx.user.role }))
    }

    async fn admin_only(ctx: AuthContext) -> Result<&'static str, ApiError> {
        ctx.authorize(&[Role::Admin])?;
        Ok("ok")
    }

    async fn verified_only(ctx: AuthContext) -> Result<&'static str, ApiError> {
        ctx.require_verified()?;
        Ok("ok")
    }

    async fn machine(identity: ServiceIdentity) -> Json<serde_json::Value> {
        Json(serde_json::json!({ "service": identity.name }))
    }

    fn test_router(state: Arc<AppState>) -> Router {
        let protected = Router::new()
            .route("/whoami", get(whoami))
            .route("/admin", get(admin_only))
            .route("/verified", get(verified_only))
            .layer(middleware::from_fn_with_state(state.clone(), require_auth));

        Router::new()
            .merge(protected)
            .route("/machine", get(machine))
            .with_state(state)
    }

    #[tokio::test]
    async fn test_missing_token_is_401() {
        let state = test_state().await;
        let app = test_router(state);

        let response = app
            .oneshot(HttpRequest::get("/whoami").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_bearer_token_authenticates() {
        let state = test_state().await;
        let user = insert_user(&state.db, "A", "a@x.com", "secret1", Role::Customer, true).await;
        let token = issue_user_token(&user, &state.config.auth.jwt_secret, 30).unwrap();
        let app = test_router(state);

        let response = app
            .oneshot(
                HttpRequest::get("/whoami")
                    .header("Authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cookie_fallback_authenticates() {
        let state = test_state().await;
        let user = insert_user(&state.db, "A", "a@x.com", "secret1", Role::Customer, true).await;
        let token = issue_user_token(&user, &state.config.auth.jwt_secret, 30).unwrap();
        let app = test_router(state);

        let response = app
            .oneshot(
                HttpRequest::get("/whoami")
                    .header("Cookie", format!("jwt={token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_wrong_secret_is_401() {
        let state = test_state().await;
        let user = insert_user(&state.db, "A", "a@x.com", "secret1", Role::Customer, true).await;
        let token = issue_user_token(&user, "some-other-secret", 30).unwrap();
        let app = test_router(state);

        let response = app
            .oneshot(
                HttpRequest::get("/whoami")
                    .header("Authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_deleted_user_is_401() {
        let state = test_state().await;
        let user = insert_user(&state.db, "A", "a@x.com", "secret1", Role::Customer, true).await;
        let token = issue_user_token(&user, &state.config.auth.jwt_secret, 30).unwrap();
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(&user.id)
            .execute(&state.db)
            .await
            .unwrap();
        let app = test_router(state);

        let response = app
            .oneshot(
                HttpRequest::get("/whoami")
                    .header("Authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_deactivated_user_is_401() {
        let state = test_state().await;
        let user = insert_user(&state.db, "A", "a@x.com", "secret1", Role::Customer, true).await;
        let token = issue_user_token(&user, &state.config.auth.jwt_secret, 30).unwrap();
        sqlx::query("UPDATE users SET is_active = 0 WHERE id = ?")
            .bind(&user.id)
            .execute(&state.db)
            .await
            .unwrap();
        let app = test_router(state);

        let response = app
            .oneshot(
                HttpRequest::get("/whoami")
                    .header("Authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_role_gate() {
        let state = test_state().await;
        let customer =
            insert_user(&state.db, "C", "c@x.com", "secret1", Role::Customer, true).await;
        let admin = insert_user(&state.db, "A", "admin@x.com", "secret1", Role::Admin, true).await;
        let secret = state.config.auth.jwt_secret.clone();
        let app = test_router(state);

        let token = issue_user_token(&customer, &secret, 30).unwrap();
        let response = app
            .clone()
            .oneshot(
                HttpRequest::get("/admin")
                    .header("Authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let token = issue_user_token(&admin, &secret, 30).unwrap();
        let response = app
            .oneshot(
                HttpRequest::get("/admin")
                    .header("Authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_verification_gate() {
        let state = test_state().await;
        let unverified =
            insert_user(&state.db, "U", "u@x.com", "secret1", Role::Customer, false).await;
        let token = issue_user_token(&unverified, &state.config.auth.jwt_secret, 30).unwrap();
        let app = test_router(state);

        let response = app
            .oneshot(
                HttpRequest::get("/verified")
                    .header("Authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_service_gate_accepts_service_token() {
        let state = test_state().await;
        let token = issue_service_token(
            "inventory-sync",
            vec!["read".to_string()],
            state.config.auth.service_secret(),
            3600,
        )
        .unwrap();
        let app = test_router(state);

        let response = app
            .oneshot(
                HttpRequest::get("/machine")
                    .header("Authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_service_gate_rejects_user_token() {
        let state = test_state().await;
        let user = insert_user(&state.db, "A", "a@x.com", "secret1", Role::Admin, true).await;
        let token = issue_user_token(&user, &state.config.auth.jwt_secret, 30).unwrap();
        let app = test_router(state);

        // Structurally valid but lacks a `service` claim
        let response = app
            .oneshot(
                HttpRequest::get("/machine")
                    .header("Authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_service_gate_no_token() {
        let state = test_state().await;
        let app = test_router(state);

        let response = app
            .oneshot(HttpRequest::get("/machine").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
