use crate::middleware::csrf::{get_or_create_csrf_token, validate_csrf_form_field};
use crate::services::verification_service::VerificationError;
use crate::AppState;
use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Form, Path, State},
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;
use tower_sessions::Session;

#[derive(Template, WebTemplate)]
#[template(path = "verify_account.html")]
struct VerifyAccountTemplate {
    message: Option<String>,
    error: Option<String>,
    csrf_token: String,
}

#[derive(Template, WebTemplate)]
#[template(path = "verify_success.html")]
struct VerifySuccessTemplate {}

#[derive(Template, WebTemplate)]
#[template(path = "verify_error.html")]
struct VerifyErrorTemplate {
    message: String,
}

#[derive(Deserialize)]
pub struct RequestVerificationForm {
    email: String,
    csrf_token: String,
}

/// GET /verify-email/{token} - The link from the verification email. The
/// token is an opaque path segment compared exactly against the store.
pub async fn verify_email_handler(
    State(app_state): State<AppState>,
    Path(token): Path<String>,
) -> Response {
    tracing::info!("📧 email verification attempt");

    match app_state.verification_service.verify(&token).await {
        Ok(user) => {
            tracing::info!(email = %user.email, "✅ user verified");
            let template = VerifySuccessTemplate {};
            Html(template.render().unwrap_or_else(|_| {
                "<html><body><h1>Email verified</h1></body></html>".to_string()
            }))
            .into_response()
        }
        Err(VerificationError::TokenNotFound) => {
            tracing::info!("❌ invalid or expired verification link");
            verify_error("Invalid or expired verification link")
        }
        Err(e) => {
            tracing::error!("verification failed: {}", e);
            verify_error("An error occurred during verification")
        }
    }
}

fn verify_error(message: &str) -> Response {
    let template = VerifyErrorTemplate {
        message: message.to_string(),
    };
    Html(
        template
            .render()
            .unwrap_or_else(|_| format!("<html><body><h1>{}</h1></body></html>", message)),
    )
    .into_response()
}

/// GET /verify-account - The resend-verification form.
pub async fn verify_account_page(session: Session) -> Html<String> {
    let csrf_token = get_or_create_csrf_token(&session)
        .await
        .unwrap_or_else(|_| String::from("error"));

    let template = VerifyAccountTemplate {
        message: None,
        error: None,
        csrf_token,
    };
    Html(template.render().unwrap_or_else(|_| {
        "<html><body><h1>Error rendering verification page</h1></body></html>".to_string()
    }))
}

async fn verify_account_outcome(
    session: &Session,
    message: Option<String>,
    error: Option<String>,
) -> Response {
    let csrf_token = get_or_create_csrf_token(session)
        .await
        .unwrap_or_else(|_| String::from("error"));

    let template = VerifyAccountTemplate {
        message,
        error,
        csrf_token,
    };
    Html(template.render().unwrap_or_else(|_| {
        "<html><body><h1>Error rendering verification page</h1></body></html>".to_string()
    }))
    .into_response()
}

/// POST /request-verification - Resend the verification email. The three
/// outcomes (sent, link still outstanding, already verified) each render a
/// distinct message.
pub async fn request_verification_handler(
    State(app_state): State<AppState>,
    session: Session,
    Form(form): Form<RequestVerificationForm>,
) -> Response {
    tracing::info!(email = %form.email, "📧 verification email request");

    if validate_csrf_form_field(&session, &form.csrf_token)
        .await
        .is_err()
    {
        return verify_account_outcome(
            &session,
            None,
            Some("Invalid security token. Please refresh the page and try again.".to_string()),
        )
        .await;
    }

    let email = form.email.trim().to_string();
    if email.is_empty() {
        return verify_account_outcome(
            &session,
            None,
            Some("Please enter your email address".to_string()),
        )
        .await;
    }

    let user = match app_state.user_service.find_user_by_email(&email).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            tracing::info!(email = %email, "❌ verification requested for unknown email");
            return verify_account_outcome(
                &session,
                None,
                Some("Email not found in our system".to_string()),
            )
            .await;
        }
        Err(e) => {
            tracing::error!("verification request lookup failed: {}", e);
            return verify_account_outcome(
                &session,
                None,
                Some("An error occurred. Please try again.".to_string()),
            )
            .await;
        }
    };

    match app_state.verification_service.resend(&user).await {
        Ok(_) => {
            verify_account_outcome(
                &session,
                Some(format!(
                    "Verification email sent to {}. Please check your inbox and click the verification link.",
                    user.email
                )),
                None,
            )
            .await
        }
        Err(VerificationError::AlreadyVerified) => {
            verify_account_outcome(
                &session,
                Some("Your account is already verified! You can now login.".to_string()),
                None,
            )
            .await
        }
        Err(VerificationError::StillPending { minutes_remaining }) => {
            verify_account_outcome(
                &session,
                Some(format!(
                    "A verification email was already sent to {}. It will expire in {} minutes. Please check your inbox (and spam folder).",
                    user.email, minutes_remaining
                )),
                None,
            )
            .await
        }
        Err(VerificationError::Delivery(e)) => {
            tracing::error!("❌ verification email failed via both providers: {}", e);
            verify_account_outcome(
                &session,
                None,
                Some("Failed to send verification email. Please try again later.".to_string()),
            )
            .await
        }
        Err(e) => {
            tracing::error!("verification resend failed: {}", e);
            verify_account_outcome(
                &session,
                None,
                Some("An error occurred. Please try again.".to_string()),
            )
            .await
        }
    }
}
