/// Authentication routes: registration, login, token refresh, logout, and
/// current user information.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{Authenticator, CurrentUser, PasswordHasher, TokenType};
use crate::error::{AppError, AuthError, DatabaseError, ValidationError};
use crate::validators::{is_valid_email, is_valid_name, is_valid_username, password_violations};

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    pub confirm_password: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    /// Email address or username
    pub identifier: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Deserialize, Default)]
pub struct LogoutRequest {
    /// Also revoke this refresh token, if supplied.
    pub refresh_token: Option<String>,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
}

fn check_password(password: &str) -> Result<(), AppError> {
    let violations = password_violations(password);
    if violations.is_empty() {
        return Ok(());
    }
    let rules: Vec<String> = violations.iter().map(|r| r.to_string()).collect();
    Err(ValidationError::InvalidFormat(format!("password {}", rules.join(", "))).into())
}

/// POST /auth/register
///
/// Register a new account and return an access/refresh token pair.
///
/// # Errors
/// - 400: invalid email/username/name/password, or mismatched confirmation
/// - 409: email or username already registered
pub async fn register(
    form: web::Json<RegisterRequest>,
    pool: web::Data<PgPool>,
    hasher: web::Data<PasswordHasher>,
    authenticator: web::Data<Arc<Authenticator>>,
) -> Result<HttpResponse, AppError> {
    let email = is_valid_email(&form.email)?;
    let username = is_valid_username(&form.username)?;
    let first_name = is_valid_name("first_name", &form.first_name)?;
    let last_name = is_valid_name("last_name", &form.last_name)?;
    check_password(&form.password)?;

    if let Some(confirm) = &form.confirm_password {
        if *confirm != form.password {
            return Err(
                ValidationError::InvalidFormat("passwords do not match".to_string()).into(),
            );
        }
    }

    // Explicit duplicate checks give the client a precise message; the
    // unique constraints below still guard against races.
    let taken = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM users WHERE email = $1 OR username = $2",
    )
    .bind(&email)
    .bind(&username)
    .fetch_one(pool.get_ref())
    .await?;
    if taken > 0 {
        return Err(DatabaseError::UniqueConstraintViolation(
            "email or username already registered".to_string(),
        )
        .into());
    }

    let password_hash = hasher.hash(&form.password)?;
    let user_id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO users
            (id, email, username, first_name, last_name, password_hash,
             is_active, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, true, $7, $7)
        "#,
    )
    .bind(user_id)
    .bind(&email)
    .bind(&username)
    .bind(&first_name)
    .bind(&last_name)
    .bind(&password_hash)
    .bind(Utc::now())
    .execute(pool.get_ref())
    .await?;

    let pair = authenticator.issue_pair(&user_id)?;

    tracing::info!(user_id = %user_id, "User registered");

    Ok(HttpResponse::Created().json(TokenResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        token_type: "bearer".to_string(),
        expires_in: authenticator.access_ttl_seconds(),
    }))
}

/// POST /auth/login
///
/// Authenticate with email or username plus password.
///
/// Unknown identifier and wrong password produce the same response, so
/// callers cannot enumerate accounts.
///
/// # Errors
/// - 401: invalid credentials
/// - 403: account is inactive
pub async fn login(
    form: web::Json<LoginRequest>,
    pool: web::Data<PgPool>,
    hasher: web::Data<PasswordHasher>,
    authenticator: web::Data<Arc<Authenticator>>,
) -> Result<HttpResponse, AppError> {
    let user = authenticator
        .users()
        .find_by_credential(form.identifier.trim())
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    if !hasher.verify(&form.password, &user.password_hash) {
        return Err(AuthError::InvalidCredentials.into());
    }

    if !user.is_active {
        return Err(AuthError::InactiveAccount.into());
    }

    // Opportunistic hash upgrade when the configured cost has been raised.
    if hasher.needs_upgrade(&user.password_hash) {
        let new_hash = hasher.hash(&form.password)?;
        sqlx::query("UPDATE users SET password_hash = $1, updated_at = $2 WHERE id = $3")
            .bind(&new_hash)
            .bind(Utc::now())
            .bind(user.id)
            .execute(pool.get_ref())
            .await?;
        tracing::info!(user_id = %user.id, "Password hash upgraded");
    }

    sqlx::query("UPDATE users SET last_login = $1 WHERE id = $2")
        .bind(Utc::now())
        .bind(user.id)
        .execute(pool.get_ref())
        .await?;

    let pair = authenticator.issue_pair(&user.id)?;

    tracing::info!(user_id = %user.id, "User logged in");

    Ok(HttpResponse::Ok().json(TokenResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        token_type: "bearer".to_string(),
        expires_in: authenticator.access_ttl_seconds(),
    }))
}

/// POST /auth/refresh
///
/// Exchange a refresh token for a new token pair. The presented refresh
/// token is revoked first (rotation), so a stolen token becomes useless the
/// moment the legitimate holder refreshes.
///
/// # Errors
/// - 401: invalid, expired, or revoked refresh token; subject no longer exists
/// - 403: account is inactive
pub async fn refresh(
    form: web::Json<RefreshRequest>,
    authenticator: web::Data<Arc<Authenticator>>,
) -> Result<HttpResponse, AppError> {
    let claims = authenticator
        .verify(&form.refresh_token, TokenType::Refresh)
        .await?;

    authenticator.revoke(&claims).await?;

    let user_id = claims.user_id()?;
    let user = authenticator
        .users()
        .find_by_id(user_id)
        .await?
        .ok_or(AuthError::UserNotFound)?;
    if !user.is_active {
        return Err(AuthError::InactiveAccount.into());
    }

    let pair = authenticator.issue_pair(&user.id)?;

    tracing::info!(user_id = %user.id, "Token refreshed");

    Ok(HttpResponse::Ok().json(TokenResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        token_type: "bearer".to_string(),
        expires_in: authenticator.access_ttl_seconds(),
    }))
}

/// POST /api/logout
///
/// Revoke the access token this request authenticated with, and optionally a
/// refresh token supplied in the body. Verification of that access token
/// already happened in the middleware.
pub async fn logout(
    current_user: web::ReqData<CurrentUser>,
    form: Option<web::Json<LogoutRequest>>,
    authenticator: web::Data<Arc<Authenticator>>,
) -> Result<HttpResponse, AppError> {
    authenticator.revoke(&current_user.claims).await?;

    if let Some(refresh_token) = form.and_then(|f| f.into_inner().refresh_token) {
        match authenticator.verify(&refresh_token, TokenType::Refresh).await {
            Ok(claims) => authenticator.revoke(&claims).await?,
            // An already-dead refresh token is not a logout failure.
            Err(e) => tracing::warn!(error = %e, "Refresh token not revocable at logout"),
        }
    }

    tracing::info!(user_id = %current_user.user.id, "User logged out");

    Ok(HttpResponse::NoContent().finish())
}

/// GET /api/me
///
/// Current authenticated user's profile.
pub async fn get_current_user(
    current_user: web::ReqData<CurrentUser>,
) -> Result<HttpResponse, AppError> {
    let user = &current_user.user;

    Ok(HttpResponse::Ok().json(UserResponse {
        id: user.id.to_string(),
        email: user.email.clone(),
        username: user.username.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        is_active: user.is_active,
    }))
}
