use crate::models::User;
use crate::repositories::user_repository::UserRepository;
use argon2::{password_hash::PasswordHash, Argon2, PasswordVerifier};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum AuthServiceError {
    /// Covers both unknown email and wrong password; callers must not
    /// distinguish the two.
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Account not verified")]
    EmailNotVerified,
    #[error("User not found")]
    UserNotFound,
    #[error("Repository error: {0}")]
    RepositoryError(#[from] crate::repositories::user_repository::RepositoryError),
}

pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub struct AuthService {
    user_repository: Arc<dyn UserRepository>,
}

impl AuthService {
    pub fn new(user_repository: Arc<dyn UserRepository>) -> Self {
        Self { user_repository }
    }

    /// Login precondition chain, first failure wins:
    /// user exists -> password matches -> email verified.
    pub async fn authenticate(&self, request: LoginRequest) -> Result<User, AuthServiceError> {
        let email = request.email.trim().to_lowercase();

        let user = self
            .user_repository
            .find_by_email(&email)
            .await?
            .ok_or(AuthServiceError::InvalidCredentials)?;

        if !self.verify_password(&request.password, &user.password_hash) {
            return Err(AuthServiceError::InvalidCredentials);
        }

        if !user.email_verified {
            return Err(AuthServiceError::EmailNotVerified);
        }

        Ok(user)
    }

    pub async fn get_user_by_id(&self, user_id: i64) -> Result<User, AuthServiceError> {
        self.user_repository
            .find_by_id(user_id)
            .await?
            .ok_or(AuthServiceError::UserNotFound)
    }

    fn verify_password(&self, password: &str, password_hash: &str) -> bool {
        if let Ok(parsed_hash) = PasswordHash::new(password_hash) {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed_hash)
                .is_ok()
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, User};
    use crate::repositories::user_repository::MockUserRepository;
    use argon2::{
        password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
        Argon2,
    };
    use mockall::predicate::*;

    fn hashed(password: &str) -> String {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .expect("hashing")
            .to_string()
    }

    fn stored_user(password: &str, verified: bool) -> User {
        User {
            id: 1,
            email: "test@example.com".to_string(),
            password_hash: hashed(password),
            role: Role::User,
            email_verified: verified,
            verification_token: None,
            verification_token_expires_at: None,
            last_verification_email_at: None,
            verification_email_count: 0,
            created_at: None,
        }
    }

    #[tokio::test]
    async fn test_authenticate_unknown_email() {
        let mut mock_repo = MockUserRepository::new();

        mock_repo
            .expect_find_by_email()
            .with(eq("test@example.com"))
            .times(1)
            .returning(|_| Box::pin(async move { Ok(None) }));

        let service = AuthService::new(Arc::new(mock_repo));

        let request = LoginRequest {
            email: "test@example.com".to_string(),
            password: "password123".to_string(),
        };

        let result = service.authenticate(request).await;
        assert!(matches!(result, Err(AuthServiceError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_authenticate_wrong_password_is_same_outcome() {
        let mut mock_repo = MockUserRepository::new();

        let user = stored_user("password123", true);
        mock_repo
            .expect_find_by_email()
            .with(eq("test@example.com"))
            .times(1)
            .returning(move |_| {
                let user = user.clone();
                Box::pin(async move { Ok(Some(user)) })
            });

        let service = AuthService::new(Arc::new(mock_repo));

        let request = LoginRequest {
            email: "test@example.com".to_string(),
            password: "wrong-password".to_string(),
        };

        let result = service.authenticate(request).await;
        assert!(matches!(result, Err(AuthServiceError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_authenticate_unverified_is_distinct() {
        let mut mock_repo = MockUserRepository::new();

        let user = stored_user("password123", false);
        mock_repo
            .expect_find_by_email()
            .with(eq("test@example.com"))
            .times(1)
            .returning(move |_| {
                let user = user.clone();
                Box::pin(async move { Ok(Some(user)) })
            });

        let service = AuthService::new(Arc::new(mock_repo));

        let request = LoginRequest {
            email: "test@example.com".to_string(),
            password: "password123".to_string(),
        };

        let result = service.authenticate(request).await;
        assert!(matches!(result, Err(AuthServiceError::EmailNotVerified)));
    }

    #[tokio::test]
    async fn test_authenticate_verified_success() {
        let mut mock_repo = MockUserRepository::new();

        let user = stored_user("password123", true);
        mock_repo
            .expect_find_by_email()
            .with(eq("test@example.com"))
            .times(1)
            .returning(move |_| {
                let user = user.clone();
                Box::pin(async move { Ok(Some(user)) })
            });

        let service = AuthService::new(Arc::new(mock_repo));

        let request = LoginRequest {
            email: "Test@Example.com ".to_string(),
            password: "password123".to_string(),
        };

        let result = service.authenticate(request).await;
        assert!(result.is_ok());
    }
}
