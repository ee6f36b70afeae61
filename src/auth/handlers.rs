use crate::middleware::csrf::{get_or_create_csrf_token, validate_csrf_form_field};
use crate::services::{
    auth_service::{AuthServiceError, LoginRequest},
    user_service::{CreateUserRequest, UserServiceError},
    verification_service::VerificationError,
};
use crate::AppState;
use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Form, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;

#[derive(Template, WebTemplate)]
#[template(path = "signup.html")]
struct SignupTemplate {
    errors: Vec<String>,
    email: Option<String>,
    csrf_token: String,
}

#[derive(Template, WebTemplate)]
#[template(path = "login.html")]
struct LoginTemplate {
    error: Option<String>,
    signup_success: bool,
    csrf_token: String,
}

#[derive(Deserialize)]
pub struct SignupForm {
    email: String,
    password: String,
    confirm_password: String,
    csrf_token: String,
}

#[derive(Deserialize)]
pub struct LoginForm {
    email: String,
    password: String,
    csrf_token: String,
}

#[derive(Deserialize)]
pub struct LoginQuery {
    signup: Option<String>,
}

pub async fn signup_page(session: Session) -> Html<String> {
    let csrf_token = get_or_create_csrf_token(&session)
        .await
        .unwrap_or_else(|_| String::from("error"));

    let template = SignupTemplate {
        errors: Vec::new(),
        email: None,
        csrf_token,
    };
    Html(template.render().unwrap_or_else(|_| {
        "<html><body><h1>Error rendering signup page</h1></body></html>".to_string()
    }))
}

async fn signup_error(msg: &str, email: Option<String>, session: &Session) -> Response {
    let csrf_token = get_or_create_csrf_token(session)
        .await
        .unwrap_or_else(|_| String::from("error"));

    let template = SignupTemplate {
        errors: vec![msg.to_string()],
        email,
        csrf_token,
    };
    Html(
        template
            .render()
            .unwrap_or_else(|_| format!("<html><body><h1>Error: {}</h1></body></html>", msg)),
    )
    .into_response()
}

pub async fn signup_handler(
    State(app_state): State<AppState>,
    session: Session,
    Form(form): Form<SignupForm>,
) -> Response {
    tracing::info!(email = %form.email, "🔐 signup attempt");

    if validate_csrf_form_field(&session, &form.csrf_token)
        .await
        .is_err()
    {
        return signup_error(
            "Invalid security token. Please refresh the page and try again.",
            None,
            &session,
        )
        .await;
    }

    let request = CreateUserRequest {
        email: form.email.clone(),
        password: form.password.clone(),
        password_confirm: Some(form.confirm_password.clone()),
        email_verified: false,
    };

    let user = match app_state.user_service.create_user(request).await {
        Ok(user) => user,
        Err(err) => {
            let error_msg = match err {
                UserServiceError::InvalidEmail => "Invalid email address",
                UserServiceError::WeakPassword => "Password must be at least 8 characters long",
                UserServiceError::PasswordMismatch => "Passwords do not match",
                UserServiceError::EmailTaken => "Email already registered",
                _ => "Registration failed. Please try again.",
            };
            return signup_error(error_msg, Some(form.email), &session).await;
        }
    };

    tracing::info!(user_id = user.id, email = %user.email, "✅ user created");

    // The account stays created even when delivery fails; the resend flow
    // on /verify-account exists to repair exactly that.
    match app_state.verification_service.issue_and_send(&user).await {
        Ok(_) => Redirect::to("/login?signup=success").into_response(),
        Err(VerificationError::Delivery(e)) => {
            tracing::error!("❌ verification email failed for {}: {}", user.email, e);
            signup_error(
                "Failed to send verification email. Please try again.",
                Some(form.email),
                &session,
            )
            .await
        }
        Err(e) => {
            tracing::error!("signup verification setup failed: {}", e);
            signup_error("An error occurred. Please try again.", None, &session).await
        }
    }
}

pub async fn login_page(session: Session, Query(query): Query<LoginQuery>) -> Html<String> {
    let csrf_token = get_or_create_csrf_token(&session)
        .await
        .unwrap_or_else(|_| String::from("error"));

    let template = LoginTemplate {
        error: None,
        signup_success: query.signup.as_deref() == Some("success"),
        csrf_token,
    };
    Html(template.render().unwrap_or_else(|_| {
        "<html><body><h1>Error rendering login page</h1></body></html>".to_string()
    }))
}

pub async fn login_handler(
    State(app_state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> impl IntoResponse {
    tracing::info!(email = %form.email, "🔓 login attempt");

    if validate_csrf_form_field(&session, &form.csrf_token)
        .await
        .is_err()
    {
        return login_error(
            "Invalid security token. Please refresh the page and try again.",
            &session,
        )
        .await
        .into_response();
    }

    if form.email.trim().is_empty() || form.password.is_empty() {
        return login_error("Email and password are required", &session)
            .await
            .into_response();
    }

    let request = LoginRequest {
        email: form.email.clone(),
        password: form.password.clone(),
    };

    match app_state.auth_service.authenticate(request).await {
        Ok(user) => {
            // Session payload is the user id and email, nothing else.
            if session.insert("user_id", user.id).await.is_err()
                || session.insert("email", user.email.clone()).await.is_err()
            {
                return login_error("Failed to create session", &session)
                    .await
                    .into_response();
            }

            tracing::info!(user_id = user.id, email = %user.email, "✅ login successful");
            Redirect::to("/dashboard").into_response()
        }
        Err(err) => {
            let error_msg = match err {
                AuthServiceError::InvalidCredentials => "Invalid email or password",
                AuthServiceError::EmailNotVerified => "Please verify your email before logging in",
                _ => "An error occurred. Please try again.",
            };
            login_error(error_msg, &session).await.into_response()
        }
    }
}

async fn login_error(msg: &str, session: &Session) -> impl IntoResponse {
    let csrf_token = get_or_create_csrf_token(session)
        .await
        .unwrap_or_else(|_| String::from("error"));

    let template = LoginTemplate {
        error: Some(msg.to_string()),
        signup_success: false,
        csrf_token,
    };
    Html(
        template
            .render()
            .unwrap_or_else(|_| format!("<html><body><h1>Error: {}</h1></body></html>", msg)),
    )
    .into_response()
}

pub async fn logout_handler(session: Session) -> impl IntoResponse {
    tracing::info!("🔓 logout");
    let _ = session.flush().await;
    Redirect::to("/")
}
