use crate::error::AppError;
use crate::handlers::page_handlers::render_error_page;
use crate::models::User;
use crate::services::user_service::UserServiceError;
use crate::AppState;
use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tower_sessions::Session;

/// Listing/detail view of a user with the password hash stripped.
struct UserRow {
    id: i64,
    email: String,
    role: String,
    email_verified: bool,
    verification_email_count: i64,
    last_verification_email_at: Option<String>,
    created_at: String,
}

impl From<User> for UserRow {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            role: user.role.to_string(),
            email_verified: user.email_verified,
            verification_email_count: user.verification_email_count,
            last_verification_email_at: user.last_verification_email_at,
            created_at: user.created_at.unwrap_or_default(),
        }
    }
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/users.html")]
struct AdminUsersTemplate {
    users: Vec<UserRow>,
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/user_detail.html")]
struct AdminUserDetailTemplate {
    user: UserRow,
}

/// GET /admin/users - All users, newest first.
pub async fn list_users_handler(State(state): State<AppState>) -> Response {
    match state.user_service.list_users(None, None).await {
        Ok(users) => {
            tracing::info!(count = users.len(), "👤 admin listed users");
            let template = AdminUsersTemplate {
                users: users.into_iter().map(UserRow::from).collect(),
            };
            template.into_response()
        }
        Err(e) => {
            tracing::error!("admin user listing failed: {}", e);
            render_error_page(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch users")
        }
    }
}

/// GET /admin/users/{id} - Single user details.
pub async fn user_detail_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Response {
    match state.user_service.find_user_by_id(id).await {
        Ok(Some(user)) => {
            let template = AdminUserDetailTemplate {
                user: UserRow::from(user),
            };
            template.into_response()
        }
        Ok(None) => render_error_page(StatusCode::NOT_FOUND, "User not found"),
        Err(e) => {
            tracing::error!("admin user fetch failed: {}", e);
            render_error_page(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch user")
        }
    }
}

/// POST /admin/users/{id}/toggle-admin - Flip a user's role. Admins may
/// toggle their own role.
pub async fn toggle_admin_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    match state.user_service.toggle_role(id).await {
        Ok(role) => {
            tracing::info!(user_id = id, role = %role, "👤 admin changed role");
            Ok(Json(json!({
                "success": true,
                "message": format!("User role changed to {}", role),
                "role": role.as_str(),
            })))
        }
        Err(UserServiceError::UserNotFound) => {
            Err(AppError::NotFound("User not found".to_string()))
        }
        Err(e) => {
            tracing::error!("role toggle failed: {}", e);
            Err(AppError::Internal(e.to_string()))
        }
    }
}

/// POST /admin/users/{id}/delete - Remove a user. Self-delete is rejected
/// before the store is touched.
pub async fn delete_user_handler(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let current_user_id = session
        .get::<i64>("user_id")
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .ok_or_else(|| AppError::Forbidden("Not authenticated".to_string()))?;

    match state.user_service.admin_delete_user(current_user_id, id).await {
        Err(UserServiceError::CannotDeleteSelf) => {
            tracing::warn!(user_id = id, "⚠️ admin tried to delete their own account");
            Ok(Json(json!({
                "success": false,
                "message": "Cannot delete your own account",
            })))
        }
        Ok(()) => {
            tracing::info!(user_id = id, "👤 admin deleted user");
            Ok(Json(json!({
                "success": true,
                "message": "User deleted successfully",
            })))
        }
        Err(UserServiceError::UserNotFound) => {
            Err(AppError::NotFound("User not found".to_string()))
        }
        Err(e) => {
            tracing::error!("user delete failed: {}", e);
            Err(AppError::Internal(e.to_string()))
        }
    }
}
