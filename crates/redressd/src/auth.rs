//! Bearer-token authentication.
//!
//! `AuthUser` resolves the `Authorization` header to a live, active account.
//! Handlers that take it are protected; handlers that don't are public.

use crate::error::ApiError;
use crate::server::AppStateArc;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use redress_common::token::bearer_token;
use redress_common::{AuthError, Principal, User};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl AuthUser {
    pub fn principal(&self) -> Principal {
        Principal::new(self.0.id.clone(), self.0.role)
    }

    pub fn id(&self) -> &str {
        &self.0.id
    }
}

#[async_trait]
impl FromRequestParts<AppStateArc> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppStateArc,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::MissingToken)?;
        let token = bearer_token(header).ok_or(AuthError::MissingToken)?;

        let claims = state.signer.verify(token, redress_common::now())?;
        let user = state
            .store
            .find_user(&claims.sub)
            .await?
            .ok_or(AuthError::UnknownUser)?;

        if !user.is_active {
            return Err(AuthError::AccountDisabled.into());
        }

        debug!("Authenticated {} as {}", user.email, user.role);
        Ok(AuthUser(user))
    }
}
