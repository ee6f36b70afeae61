use askama::Template;
use askama_web::WebTemplate;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use tower_sessions::Session;

#[derive(Template, WebTemplate)]
#[template(path = "index.html")]
struct IndexTemplate {}

#[derive(Template, WebTemplate)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    user_email: String,
}

#[derive(Template, WebTemplate)]
#[template(path = "error.html")]
struct ErrorTemplate {
    message: String,
}

/// Shared error page used by middleware and handlers alike.
pub fn render_error_page(status: StatusCode, message: &str) -> Response {
    let template = ErrorTemplate {
        message: message.to_string(),
    };
    let html = template
        .render()
        .unwrap_or_else(|_| format!("<html><body><h1>{}</h1></body></html>", message));
    (status, Html(html)).into_response()
}

/// GET / - Home page
pub async fn index_handler() -> Html<String> {
    let template = IndexTemplate {};
    Html(template.render().unwrap_or_else(|_| {
        "<html><body><h1>Error rendering home page</h1></body></html>".to_string()
    }))
}

/// GET /dashboard - Show the signed-in user's dashboard
pub async fn dashboard_handler(session: Session) -> Result<impl IntoResponse, (StatusCode, String)> {
    let _user_id = session
        .get::<i64>("user_id")
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or((StatusCode::UNAUTHORIZED, "Not authenticated".to_string()))?;

    let user_email = session
        .get::<String>("email")
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .unwrap_or_else(|| "Unknown".to_string());

    let template = DashboardTemplate { user_email };
    Ok(template.into_response())
}
