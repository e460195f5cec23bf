//! Admin dashboard and account management routes

use super::{non_empty, Envelope, ListQuery};
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::server::AppStateArc;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use redress_common::analytics::Dashboard;
use redress_common::model::{PageRequest, Pagination};
use redress_common::policy::require_scope;
use redress_common::store::{UserComplaintStats, UserFilter};
use redress_common::validation::parse_role_filter;
use redress_common::{
    authorize, Action, Principal, Resource, Role, Subject, User, UserSummary, ValidationError,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

pub fn admin_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/api/admin/analytics", get(analytics))
        .route("/api/admin/staff", get(staff_list))
        .route("/api/admin/users", get(list_users))
        .route("/api/admin/users/:id", get(get_user).delete(delete_user))
        .route("/api/admin/users/:id/role", put(update_role))
        .route("/api/admin/users/:id/toggle-status", put(toggle_status))
}

#[derive(Debug, Serialize)]
pub struct UserPage {
    pub users: Vec<User>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct UserDetail {
    pub user: User,
    pub statistics: UserComplaintStats,
}

#[derive(Debug, Serialize)]
pub struct StaffDirectory {
    pub staff: Vec<UserSummary>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RoleUpdate {
    #[serde(default)]
    pub role: String,
}

/// Admins may manage any account but their own
fn not_self(principal: &Principal, target_id: &str, message: &str) -> ApiResult<()> {
    if principal.id == target_id {
        return Err(ApiError::BadRequest(message.to_string()));
    }
    Ok(())
}

fn check(principal: &Principal, resource: Resource, action: Action) -> ApiResult<()> {
    authorize(principal, resource, action, &Subject::unowned())?;
    Ok(())
}

// ============================================================================
// Dashboard
// ============================================================================

async fn analytics(
    State(state): State<AppStateArc>,
    user: AuthUser,
) -> ApiResult<Json<Envelope<Dashboard>>> {
    check(&user.principal(), Resource::Analytics, Action::Read)?;
    let dashboard = state.store.dashboard(redress_common::now()).await?;
    Ok(Envelope::data(dashboard))
}

async fn staff_list(
    State(state): State<AppStateArc>,
    user: AuthUser,
) -> ApiResult<Json<Envelope<StaffDirectory>>> {
    check(&user.principal(), Resource::StaffDirectory, Action::List)?;
    let staff = state.store.staff_directory().await?;
    Ok(Envelope::data(StaffDirectory { staff }))
}

// ============================================================================
// Accounts
// ============================================================================

async fn list_users(
    State(state): State<AppStateArc>,
    user: AuthUser,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<Envelope<UserPage>>> {
    require_scope(&user.principal(), Resource::User, Action::List)?;
    let Query(query) = query?;

    let filter = UserFilter {
        role: parse_role_filter(non_empty(&query.role))?,
        search: non_empty(&query.search).map(str::to_string),
    };
    let page = state
        .store
        .list_users(filter, PageRequest::new(query.page, query.limit))
        .await?;

    Ok(Envelope::data(UserPage {
        users: page.items,
        pagination: page.pagination,
    }))
}

async fn find_account(state: &AppStateArc, id: &str) -> ApiResult<User> {
    state
        .store
        .find_user(id)
        .await?
        .ok_or(ApiError::NotFound("User"))
}

async fn get_user(
    State(state): State<AppStateArc>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Envelope<UserDetail>>> {
    check(&user.principal(), Resource::User, Action::Read)?;
    let account = find_account(&state, &id).await?;
    let statistics = state.store.user_complaint_stats(&account.id).await?;
    Ok(Envelope::data(UserDetail {
        user: account,
        statistics,
    }))
}

async fn update_role(
    State(state): State<AppStateArc>,
    user: AuthUser,
    Path(id): Path<String>,
    body: Result<Json<RoleUpdate>, JsonRejection>,
) -> ApiResult<Json<Envelope<Value>>> {
    let principal = user.principal();
    check(&principal, Resource::User, Action::UpdateRole)?;
    let Json(body) = body?;

    if body.role.trim().is_empty() {
        return Err(ValidationError::field("role", "Role is required").into());
    }
    let role: Role = body.role.trim().parse()?;

    let mut account = find_account(&state, &id).await?;
    not_self(&principal, &account.id, "Cannot change your own role")?;

    account.role = role;
    account.updated_at = redress_common::now();
    state.store.update_user(&account).await?;
    info!("Role of {} set to {} by {}", account.email, role, user.0.email);

    Ok(Envelope::with_message(
        "User role updated successfully",
        json!({ "user": account }),
    ))
}

async fn toggle_status(
    State(state): State<AppStateArc>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Envelope<Value>>> {
    let principal = user.principal();
    check(&principal, Resource::User, Action::ToggleActive)?;

    let mut account = find_account(&state, &id).await?;
    not_self(&principal, &account.id, "Cannot deactivate your own account")?;

    account.is_active = !account.is_active;
    account.updated_at = redress_common::now();
    state.store.update_user(&account).await?;

    let verb = if account.is_active {
        "activated"
    } else {
        "deactivated"
    };
    info!("Account {} {} by {}", account.email, verb, user.0.email);

    Ok(Envelope::with_message(
        format!("User {} successfully", verb),
        json!({ "user": account }),
    ))
}

async fn delete_user(
    State(state): State<AppStateArc>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Envelope<Value>>> {
    let principal = user.principal();
    check(&principal, Resource::User, Action::Delete)?;

    let account = find_account(&state, &id).await?;
    not_self(&principal, &account.id, "Cannot delete your own account")?;

    // complaints filed by the account stay in place
    state.store.delete_user(&account.id).await?;
    info!("Account {} deleted by {}", account.email, user.0.email);

    Ok(Envelope::message("User deleted successfully"))
}
