//! API routes for redressd
//!
//! Handlers answer with the `{ success, message?, data? }` envelope. Errors
//! go through `ApiError`.

pub mod admin;
pub mod auth;
pub mod complaints;

use crate::error::ApiError;
use crate::server::AppStateArc;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Success envelope
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    pub fn data(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: None,
            data: Some(data),
        })
    }

    pub fn with_message(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: Some(message.into()),
            data: Some(data),
        })
    }
}

impl Envelope<Value> {
    pub fn message(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: Some(message.into()),
            data: None,
        })
    }
}

/// `?page=&limit=` plus whatever filters a listing accepts, as raw strings
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
    #[serde(rename = "assignedTo")]
    pub assigned_to: Option<String>,
    pub role: Option<String>,
    pub search: Option<String>,
}

/// Treat `?status=` the same as an absent parameter
pub(crate) fn non_empty(raw: &Option<String>) -> Option<&str> {
    raw.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

// ============================================================================
// Root and Health Routes
// ============================================================================

pub fn root_routes() -> Router<AppStateArc> {
    Router::new().route("/", get(banner))
}

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/api/health", get(health_check))
}

async fn banner() -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "Complaint Management System API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "auth": "/api/auth",
            "complaints": "/api/complaints",
            "admin": "/api/admin",
            "health": "/api/health",
        },
    }))
}

async fn health_check(State(state): State<AppStateArc>) -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "Server is running",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSeconds": state.start_time.elapsed().as_secs(),
        "timestamp": redress_common::now(),
    }))
}

pub async fn not_found() -> ApiError {
    ApiError::RouteNotFound
}
