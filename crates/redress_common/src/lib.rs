//! Shared types and logic for Redress components.
//!
//! Domain model, complaint lifecycle, authorization policy, credentials,
//! persistence and dashboard aggregates. The daemon (`redressd`) is a thin
//! HTTP layer over this crate.

pub mod analytics;
pub mod config;
pub mod credentials;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod policy;
pub mod store;
pub mod token;
pub mod validation;

pub use error::{AuthError, FieldError, StoreError, ValidationError};
pub use model::{Category, Complaint, Priority, Role, Status, TimelineEntry, User, UserSummary};
pub use policy::{authorize, Action, PolicyError, Principal, Resource, Scope, Subject};
pub use store::{DbLocation, Store};

use chrono::{DateTime, Duration, DurationRound, Utc};

/// Current time at the precision the store keeps (milliseconds)
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    now.duration_trunc(Duration::milliseconds(1)).unwrap_or(now)
}
