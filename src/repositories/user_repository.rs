use crate::models::{Role, User};
use async_trait::async_trait;
use sqlx::SqlitePool;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("User not found")]
    NotFound,
    #[error("User already exists")]
    AlreadyExists,
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

const USER_COLUMNS: &str = "id, email, password_hash, role, email_verified, \
     verification_token, verification_token_expires_at, \
     last_verification_email_at, verification_email_count, created_at";

#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait UserRepository: Send + Sync {
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        email_verified: bool,
    ) -> RepositoryResult<User>;
    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<User>>;
    async fn find_by_id(&self, id: i64) -> RepositoryResult<Option<User>>;
    async fn find_by_verification_token(&self, token: &str) -> RepositoryResult<Option<User>>;
    /// Writes token and expiry as one statement; overwrites any prior token.
    async fn set_verification_token(
        &self,
        id: i64,
        token: &str,
        expires_at: &str,
    ) -> RepositoryResult<()>;
    /// Like `set_verification_token`, but also stamps the send time and
    /// bumps the resend counter in the same statement.
    async fn refresh_verification_token(
        &self,
        id: i64,
        token: &str,
        expires_at: &str,
        sent_at: &str,
    ) -> RepositoryResult<()>;
    /// Sets `email_verified` and clears token+expiry in one statement, so
    /// there is no observable state with both a verified flag and a live
    /// token.
    async fn mark_email_verified(&self, id: i64) -> RepositoryResult<()>;
    async fn set_role(&self, id: i64, role: Role) -> RepositoryResult<()>;
    async fn delete_user(&self, id: i64) -> RepositoryResult<()>;
    async fn list_users(
        &self,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> RepositoryResult<Vec<User>>;
}

pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        email_verified: bool,
    ) -> RepositoryResult<User> {
        // Uniqueness is enforced by the UNIQUE index, not a pre-check read;
        // concurrent signups for the same address race on the INSERT and the
        // loser gets the constraint violation.
        let result = sqlx::query(
            "INSERT INTO users (email, password_hash, email_verified) VALUES (?, ?, ?)",
        )
        .bind(email)
        .bind(password_hash)
        .bind(email_verified)
        .execute(&self.pool)
        .await;

        match result {
            Ok(res) => {
                let id = res.last_insert_rowid();
                self.find_by_id(id).await?.ok_or(RepositoryError::NotFound)
            }
            Err(e) => {
                if e.to_string().contains("UNIQUE") {
                    Err(RepositoryError::AlreadyExists)
                } else {
                    Err(RepositoryError::Database(e))
                }
            }
        }
    }

    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ?"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> RepositoryResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_verification_token(&self, token: &str) -> RepositoryResult<Option<User>> {
        // Exact match only; expiry is checked by the caller.
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE verification_token = ?"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn set_verification_token(
        &self,
        id: i64,
        token: &str,
        expires_at: &str,
    ) -> RepositoryResult<()> {
        let result = sqlx::query(
            "UPDATE users SET verification_token = ?, verification_token_expires_at = ? \
             WHERE id = ?",
        )
        .bind(token)
        .bind(expires_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn refresh_verification_token(
        &self,
        id: i64,
        token: &str,
        expires_at: &str,
        sent_at: &str,
    ) -> RepositoryResult<()> {
        let result = sqlx::query(
            "UPDATE users SET verification_token = ?, verification_token_expires_at = ?, \
             last_verification_email_at = ?, \
             verification_email_count = verification_email_count + 1 \
             WHERE id = ?",
        )
        .bind(token)
        .bind(expires_at)
        .bind(sent_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn mark_email_verified(&self, id: i64) -> RepositoryResult<()> {
        let result = sqlx::query(
            "UPDATE users SET email_verified = 1, verification_token = NULL, \
             verification_token_expires_at = NULL \
             WHERE id = ?",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn set_role(&self, id: i64, role: Role) -> RepositoryResult<()> {
        let result = sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn delete_user(&self, id: i64) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn list_users(
        &self,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> RepositoryResult<Vec<User>> {
        let limit = limit.unwrap_or(100);
        let offset = offset.unwrap_or(0);

        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }
}
