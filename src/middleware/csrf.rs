use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::{debug, warn};
use uuid::Uuid;

pub const CSRF_TOKEN_KEY: &str = "csrf_token";

/// CSRF token stored in the session alongside its creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrfToken {
    pub value: String,
    pub created_at: i64,
}

impl CsrfToken {
    pub fn new() -> Self {
        Self {
            value: Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Tokens expire after 24 hours.
    pub fn is_expired(&self) -> bool {
        let age = chrono::Utc::now().timestamp() - self.created_at;
        age > 86400
    }
}

impl Default for CsrfToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a new CSRF token and store it in the session.
pub async fn generate_csrf_token(
    session: &Session,
) -> Result<String, tower_sessions::session::Error> {
    let token = CsrfToken::new();
    let value = token.value.clone();

    session.insert(CSRF_TOKEN_KEY, token).await?;

    debug!("Generated new CSRF token: {}", &value[..8]);
    Ok(value)
}

/// Get the session's current CSRF token, minting one if absent or expired.
pub async fn get_or_create_csrf_token(
    session: &Session,
) -> Result<String, tower_sessions::session::Error> {
    let token: Option<CsrfToken> = session.get(CSRF_TOKEN_KEY).await?;

    match token {
        Some(existing_token) if !existing_token.is_expired() => Ok(existing_token.value),
        _ => generate_csrf_token(session).await,
    }
}

/// Handlers call this to validate the hidden form field on state-changing
/// posts. A valid token is rotated so it cannot be replayed.
pub async fn validate_csrf_form_field(
    session: &Session,
    form_token: &str,
) -> Result<(), StatusCode> {
    let stored_token: Option<CsrfToken> = session.get(CSRF_TOKEN_KEY).await.map_err(|e| {
        warn!("Failed to get CSRF token from session: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let stored_token = match stored_token {
        Some(token) => {
            if token.is_expired() {
                warn!("CSRF token expired during form validation");
                return Err(StatusCode::FORBIDDEN);
            }
            token
        }
        None => {
            warn!("No CSRF token in session for form validation");
            return Err(StatusCode::FORBIDDEN);
        }
    };

    if form_token != stored_token.value {
        warn!("CSRF form token mismatch");
        return Err(StatusCode::FORBIDDEN);
    }

    debug!("CSRF form token validated, regenerating for replay protection");
    let _ = generate_csrf_token(session).await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_not_expired() {
        let token = CsrfToken::new();
        assert!(!token.is_expired());
    }

    #[test]
    fn old_token_is_expired() {
        let token = CsrfToken {
            value: "x".to_string(),
            created_at: chrono::Utc::now().timestamp() - 86401,
        };
        assert!(token.is_expired());
    }
}
