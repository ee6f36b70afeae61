use crate::handlers::page_handlers::render_error_page;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

pub async fn require_auth(session: Session, request: Request, next: Next) -> Response {
    if let Ok(Some(_user_id)) = session.get::<i64>("user_id").await {
        next.run(request).await
    } else {
        Redirect::to("/login").into_response()
    }
}

pub async fn redirect_if_authenticated(session: Session, request: Request, next: Next) -> Response {
    if let Ok(Some(_user_id)) = session.get::<i64>("user_id").await {
        Redirect::to("/dashboard").into_response()
    } else {
        next.run(request).await
    }
}

/// Admin gate: a session must be present and the session's user must still
/// hold the admin role in the store (the role is re-read on every request,
/// not trusted from the session).
pub async fn require_admin(
    State(state): State<AppState>,
    session: Session,
    request: Request,
    next: Next,
) -> Response {
    let user_id = match session.get::<i64>("user_id").await {
        Ok(Some(user_id)) => user_id,
        Ok(None) => return Redirect::to("/login").into_response(),
        Err(e) => {
            tracing::error!("session read failed in admin check: {}", e);
            return render_error_page(StatusCode::INTERNAL_SERVER_ERROR, "An error occurred");
        }
    };

    match state.user_service.find_user_by_id(user_id).await {
        Ok(Some(user)) if user.is_admin() => next.run(request).await,
        Ok(_) => render_error_page(
            StatusCode::FORBIDDEN,
            "Access Denied: Admin privileges required",
        ),
        Err(e) => {
            tracing::error!("admin check failed: {}", e);
            render_error_page(StatusCode::INTERNAL_SERVER_ERROR, "An error occurred")
        }
    }
}
