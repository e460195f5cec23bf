//! Registration, login and self-service profile routes

use super::Envelope;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::server::{AppState, AppStateArc};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use redress_common::validation::{
    normalize_department, normalize_email, validate_name, validate_password, Registration,
};
use redress_common::{AuthError, Role, User, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

pub fn auth_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(me))
        .route("/api/auth/profile", put(update_profile))
        .route("/api/auth/change-password", put(change_password))
}

#[derive(Debug, Serialize)]
pub struct Session {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

/// Hash on the blocking pool
async fn hash_password(state: &AppState, password: String) -> ApiResult<String> {
    let hasher = state.hasher;
    let hashed = tokio::task::spawn_blocking(move || hasher.hash(&password))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(hashed)
}

async fn password_matches(state: &AppState, password: String, encoded: String) -> ApiResult<bool> {
    let hasher = state.hasher;
    let matches = tokio::task::spawn_blocking(move || hasher.verify(&password, &encoded))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(matches)
}

fn session(state: &AppState, user: User) -> ApiResult<Session> {
    let token = state.signer.issue(&user.id, redress_common::now())?;
    Ok(Session { user, token })
}

async fn register(
    State(state): State<AppStateArc>,
    body: Result<Json<Registration>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Envelope<Session>>)> {
    let Json(body) = body?;
    let registration = body.validate()?;

    let password_hash = hash_password(&state, registration.password).await?;
    // self-registration always yields a plain user
    let user = User::new(
        registration.name,
        registration.email,
        password_hash,
        Role::User,
        registration.department,
        redress_common::now(),
    );
    let user = state.store.insert_user(user).await?;
    info!("Registered account {} ({})", user.id, user.email);

    Ok((
        StatusCode::CREATED,
        Envelope::with_message("User registered successfully", session(&state, user)?),
    ))
}

async fn login(
    State(state): State<AppStateArc>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<Envelope<Session>>> {
    let Json(body) = body?;

    let mut errors = ValidationError::default();
    let email = normalize_email(&body.email).map_err(|e| errors.absorb(e)).ok();
    if body.password.is_empty() {
        errors.push("password", "Password is required");
    }
    let email = errors.or_ok(email)?.unwrap_or_default();

    let user = state
        .store
        .find_user_by_email(&email)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    if !password_matches(&state, body.password, user.password_hash.clone()).await? {
        return Err(AuthError::InvalidCredentials.into());
    }
    if !user.is_active {
        return Err(AuthError::AccountDisabled.into());
    }

    info!("Login: {}", user.email);
    Ok(Envelope::with_message("Login successful", session(&state, user)?))
}

async fn me(user: AuthUser) -> Json<Envelope<Value>> {
    Envelope::data(json!({ "user": user.0 }))
}

async fn update_profile(
    State(state): State<AppStateArc>,
    AuthUser(mut user): AuthUser,
    body: Result<Json<ProfileUpdate>, JsonRejection>,
) -> ApiResult<Json<Envelope<Value>>> {
    let Json(body) = body?;

    if let Some(name) = body.name.as_deref() {
        user.name = validate_name(name)?;
    }
    if let Some(department) = body.department.as_deref() {
        user.department = normalize_department(Some(department));
    }
    user.updated_at = redress_common::now();
    state.store.update_user(&user).await?;

    Ok(Envelope::with_message(
        "Profile updated successfully",
        json!({ "user": user }),
    ))
}

async fn change_password(
    State(state): State<AppStateArc>,
    AuthUser(mut user): AuthUser,
    body: Result<Json<PasswordChange>, JsonRejection>,
) -> ApiResult<Json<Envelope<Value>>> {
    let Json(body) = body?;

    let mut errors = ValidationError::default();
    if body.current_password.is_empty() {
        errors.push("currentPassword", "Current password is required");
    }
    if let Err(mut e) = validate_password(&body.new_password) {
        for field in &mut e.errors {
            field.field = "newPassword".to_string();
        }
        errors.absorb(e);
    }
    errors.or_ok(())?;

    if !password_matches(&state, body.current_password, user.password_hash.clone()).await? {
        return Err(AuthError::WrongPassword.into());
    }

    user.password_hash = hash_password(&state, body.new_password).await?;
    user.updated_at = redress_common::now();
    state.store.update_user(&user).await?;
    info!("Password changed for {}", user.email);

    Ok(Envelope::message("Password changed successfully"))
}
