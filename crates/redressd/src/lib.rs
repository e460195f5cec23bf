//! Redress daemon library: HTTP surface over `redress_common`.

pub mod auth;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod seed;
pub mod server;

pub use error::{ApiError, ApiResult};
pub use server::{build_router, AppState, AppStateArc};
