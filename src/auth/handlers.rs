//! Minimal operator login for the admin surface (§6, SPEC_FULL.md §A). No
//! OAuth dance and no wallet-signature challenge — a single shared operator
//! credential, exchanged for a JWT cookie the same way the teacher's wallet
//! login issued one.

use axum::{Json, extract::State};
use axum_extra::extract::{
    CookieJar,
    cookie::{Cookie, SameSite},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::AppState;
use crate::auth::{AuthError, AuthUser, create_jwt, jwt::hash_token};
use crate::auth::middleware::AUTH_COOKIE_NAME;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub account_id: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub account_id: String,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), AuthError> {
    if req.account_id != state.env_vars.admin_account_id || req.password != state.env_vars.admin_password {
        return Err(AuthError::InvalidSignature("invalid credentials".to_string()));
    }

    let jwt = create_jwt(&req.account_id, state.env_vars.jwt_secret.as_bytes(), state.env_vars.jwt_expiry_hours)?;

    sqlx::query!(
        r#"INSERT INTO user_sessions (account_id, token_hash, expires_at) VALUES ($1, $2, $3)"#,
        req.account_id,
        jwt.token_hash,
        jwt.expires_at,
    )
    .execute(&state.db_pool)
    .await
    .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

    let cookie = Cookie::build((AUTH_COOKIE_NAME, jwt.token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();

    Ok((jar.add(cookie), Json(LoginResponse { account_id: req.account_id })))
}

pub async fn get_me(user: AuthUser) -> Json<LoginResponse> {
    Json(LoginResponse { account_id: user.account_id })
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<CookieJar, AuthError> {
    if let Some(cookie) = jar.get(AUTH_COOKIE_NAME) {
        let token_hash = hash_token(cookie.value());
        sqlx::query!(
            r#"UPDATE user_sessions SET revoked_at = NOW() WHERE token_hash = $1"#,
            token_hash
        )
        .execute(&state.db_pool)
        .await
        .map_err(|e| AuthError::DatabaseError(e.to_string()))?;
    }

    Ok(jar.remove(Cookie::from(AUTH_COOKIE_NAME)))
}
