//! Complaint filing, listing and lifecycle routes

use super::{non_empty, Envelope, ListQuery};
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::server::{AppState, AppStateArc};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use redress_common::lifecycle::{apply_status_change, assign, reprioritize};
use redress_common::model::{Page, PageRequest, Pagination};
use redress_common::policy::require_scope;
use redress_common::store::ComplaintFilter;
use redress_common::validation::{validate_resolution_note, NewComplaint};
use redress_common::{
    authorize, Action, Category, Complaint, Principal, Priority, Resource, Role, Scope, Status,
    Subject, UserSummary, ValidationError,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::info;

pub fn complaint_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/api/complaints", post(create_complaint))
        .route("/api/complaints/my", get(my_complaints))
        .route("/api/complaints/all", get(all_complaints))
        .route(
            "/api/complaints/:id",
            get(get_complaint).delete(delete_complaint),
        )
        .route("/api/complaints/:id/status", put(update_status))
        .route("/api/complaints/:id/assign", put(assign_complaint))
        .route("/api/complaints/:id/priority", put(update_priority))
}

/// A complaint as the API shows it: derived resolution time and the
/// referenced accounts resolved to summaries
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintView {
    #[serde(flatten)]
    pub complaint: Complaint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_time: Option<f64>,
    /// Absent when the author's account was deleted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<UserSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<UserSummary>,
}

#[derive(Debug, Serialize)]
pub struct ComplaintPage {
    pub complaints: Vec<ComplaintView>,
    pub pagination: Pagination,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusUpdate {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    #[serde(default, alias = "staffId")]
    pub assigned_to: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PriorityUpdate {
    #[serde(default)]
    pub priority: String,
}

async fn views(state: &AppState, complaints: Vec<Complaint>) -> ApiResult<Vec<ComplaintView>> {
    let ids: Vec<String> = complaints
        .iter()
        .flat_map(|c| std::iter::once(c.user_id.clone()).chain(c.assigned_to.clone()))
        .collect();
    let people: HashMap<String, UserSummary> = state.store.user_summaries(ids).await?;

    Ok(complaints
        .into_iter()
        .map(|complaint| ComplaintView {
            resolution_time: complaint.resolution_time(),
            author: people.get(&complaint.user_id).cloned(),
            assignee: complaint
                .assigned_to
                .as_ref()
                .and_then(|id| people.get(id))
                .cloned(),
            complaint,
        })
        .collect())
}

async fn view(state: &AppState, complaint: Complaint) -> ApiResult<ComplaintView> {
    let mut one = views(state, vec![complaint]).await?;
    one.pop()
        .ok_or_else(|| ApiError::Internal("complaint view lost".to_string()))
}

async fn page_response(
    state: &AppState,
    page: Page<Complaint>,
) -> ApiResult<Json<Envelope<ComplaintPage>>> {
    Ok(Envelope::data(ComplaintPage {
        complaints: views(state, page.items).await?,
        pagination: page.pagination,
    }))
}

async fn load(state: &AppState, id: &str) -> ApiResult<Complaint> {
    state
        .store
        .find_complaint(id)
        .await?
        .ok_or(ApiError::NotFound("Complaint"))
}

/// Status, category and priority filters shared by both listings
fn attribute_filter(query: &ListQuery) -> Result<ComplaintFilter, ValidationError> {
    let mut errors = ValidationError::default();
    let mut filter = ComplaintFilter::default();

    if let Some(raw) = non_empty(&query.status) {
        match raw.parse::<Status>() {
            Ok(status) => filter.status = Some(status),
            Err(e) => errors.absorb(e),
        }
    }
    if let Some(raw) = non_empty(&query.category) {
        match raw.parse::<Category>() {
            Ok(category) => filter.category = Some(category),
            Err(e) => errors.absorb(e),
        }
    }
    if let Some(raw) = non_empty(&query.priority) {
        match raw.parse::<Priority>() {
            Ok(priority) => filter.priority = Some(priority),
            Err(e) => errors.absorb(e),
        }
    }
    errors.or_ok(filter)
}

/// Narrow a listing to what `scope` grants
fn apply_scope(filter: &mut ComplaintFilter, scope: Scope, principal: &Principal) {
    match scope {
        Scope::Own => filter.author = Some(principal.id.clone()),
        Scope::Assigned => filter.assignee = Some(principal.id.clone()),
        Scope::Any | Scope::Deny => {}
    }
}

// ============================================================================
// Filing and Listing
// ============================================================================

async fn create_complaint(
    State(state): State<AppStateArc>,
    user: AuthUser,
    body: Result<Json<NewComplaint>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Envelope<Value>>)> {
    require_scope(&user.principal(), Resource::Complaint, Action::Create)?;
    let Json(body) = body?;
    let draft = body.validate()?;

    let complaint = Complaint::file(user.id(), draft, redress_common::now());
    let complaint = state.store.insert_complaint(complaint).await?;
    info!(
        "Complaint {} filed by {} ({}, {})",
        complaint.id, user.0.email, complaint.category, complaint.priority
    );

    Ok((
        StatusCode::CREATED,
        Envelope::with_message(
            "Complaint submitted successfully",
            json!({ "complaint": view(&state, complaint).await? }),
        ),
    ))
}

async fn my_complaints(
    State(state): State<AppStateArc>,
    user: AuthUser,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<Envelope<ComplaintPage>>> {
    let principal = user.principal();
    let scope = require_scope(&principal, Resource::Complaint, Action::ListOwn)?;

    let Query(query) = query?;
    let mut filter = attribute_filter(&query)?;
    filter.search = non_empty(&query.search).map(str::to_string);
    apply_scope(&mut filter, scope, &principal);

    let page = state
        .store
        .list_complaints(filter, PageRequest::new(query.page, query.limit))
        .await?;
    page_response(&state, page).await
}

async fn all_complaints(
    State(state): State<AppStateArc>,
    user: AuthUser,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<Envelope<ComplaintPage>>> {
    let principal = user.principal();
    let scope = require_scope(&principal, Resource::Complaint, Action::List)?;

    let Query(query) = query?;
    let mut filter = attribute_filter(&query)?;
    filter.search = non_empty(&query.search).map(str::to_string);
    filter.assignee = non_empty(&query.assigned_to).map(str::to_string);
    apply_scope(&mut filter, scope, &principal);

    let page = state
        .store
        .list_complaints(filter, PageRequest::new(query.page, query.limit))
        .await?;
    page_response(&state, page).await
}

async fn get_complaint(
    State(state): State<AppStateArc>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Envelope<Value>>> {
    let complaint = load(&state, &id).await?;
    authorize(
        &user.principal(),
        Resource::Complaint,
        Action::Read,
        &Subject::complaint(&complaint),
    )?;
    Ok(Envelope::data(
        json!({ "complaint": view(&state, complaint).await? }),
    ))
}

// ============================================================================
// Lifecycle
// ============================================================================

async fn update_status(
    State(state): State<AppStateArc>,
    user: AuthUser,
    Path(id): Path<String>,
    body: Result<Json<StatusUpdate>, JsonRejection>,
) -> ApiResult<Json<Envelope<Value>>> {
    let principal = user.principal();
    require_scope(&principal, Resource::Complaint, Action::UpdateStatus)?;
    let Json(body) = body?;

    if body.status.trim().is_empty() {
        return Err(ValidationError::field("status", "Status is required").into());
    }
    let status: Status = body.status.trim().parse()?;
    validate_resolution_note(body.note.trim())?;

    let complaint = load(&state, &id).await?;
    authorize(
        &principal,
        Resource::Complaint,
        Action::UpdateStatus,
        &Subject::complaint(&complaint),
    )?;

    let previous = complaint.status;
    let next = apply_status_change(
        &complaint,
        status,
        &body.note,
        &principal.id,
        redress_common::now(),
    );
    state.store.save_complaint(&complaint, &next).await?;
    info!(
        "Complaint {} status {} -> {} by {}",
        next.id, previous, next.status, user.0.email
    );

    Ok(Envelope::with_message(
        "Complaint status updated successfully",
        json!({ "complaint": view(&state, next).await? }),
    ))
}

async fn assign_complaint(
    State(state): State<AppStateArc>,
    user: AuthUser,
    Path(id): Path<String>,
    body: Result<Json<Assignment>, JsonRejection>,
) -> ApiResult<Json<Envelope<Value>>> {
    let principal = user.principal();
    require_scope(&principal, Resource::Complaint, Action::Assign)?;
    let Json(body) = body?;

    let staff_id = body.assigned_to.trim();
    if staff_id.is_empty() {
        return Err(ValidationError::field("assignedTo", "Staff ID is required").into());
    }

    let complaint = load(&state, &id).await?;
    authorize(
        &principal,
        Resource::Complaint,
        Action::Assign,
        &Subject::complaint(&complaint),
    )?;

    let staff = state
        .store
        .find_user(staff_id)
        .await?
        .filter(|u| u.is_active && matches!(u.role, Role::Staff | Role::Admin))
        .ok_or_else(|| ApiError::BadRequest("Invalid staff member".to_string()))?;

    let next = assign(&complaint, &staff.id, redress_common::now());
    state.store.save_complaint(&complaint, &next).await?;
    info!("Complaint {} assigned to {}", next.id, staff.email);

    Ok(Envelope::with_message(
        "Complaint assigned successfully",
        json!({ "complaint": view(&state, next).await? }),
    ))
}

async fn update_priority(
    State(state): State<AppStateArc>,
    user: AuthUser,
    Path(id): Path<String>,
    body: Result<Json<PriorityUpdate>, JsonRejection>,
) -> ApiResult<Json<Envelope<Value>>> {
    let principal = user.principal();
    require_scope(&principal, Resource::Complaint, Action::UpdatePriority)?;
    let Json(body) = body?;

    if body.priority.trim().is_empty() {
        return Err(ValidationError::field("priority", "Priority is required").into());
    }
    let priority: Priority = body.priority.trim().parse()?;

    let complaint = load(&state, &id).await?;
    authorize(
        &principal,
        Resource::Complaint,
        Action::UpdatePriority,
        &Subject::complaint(&complaint),
    )?;

    let next = reprioritize(&complaint, priority, redress_common::now());
    state.store.save_complaint(&complaint, &next).await?;
    info!("Complaint {} priority set to {}", next.id, next.priority);

    Ok(Envelope::with_message(
        "Complaint priority updated successfully",
        json!({ "complaint": view(&state, next).await? }),
    ))
}

async fn delete_complaint(
    State(state): State<AppStateArc>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Envelope<Value>>> {
    let principal = user.principal();
    require_scope(&principal, Resource::Complaint, Action::Delete)?;

    let complaint = load(&state, &id).await?;
    authorize(
        &principal,
        Resource::Complaint,
        Action::Delete,
        &Subject::complaint(&complaint),
    )?;

    state.store.delete_complaint(&complaint.id).await?;
    info!("Complaint {} deleted by {}", complaint.id, user.0.email);

    Ok(Envelope::message("Complaint deleted successfully"))
}
