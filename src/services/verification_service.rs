use crate::models::User;
use crate::repositories::user_repository::{RepositoryError, UserRepository};
use crate::services::email_service::{EmailError, EmailGateway, EmailMessage};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::sync::Arc;

/// Verification links stay valid this long after they are issued.
pub const TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("Token not found or expired")]
    TokenNotFound,
    #[error("User not found")]
    UserNotFound,
    #[error("Account is already verified")]
    AlreadyVerified,
    #[error("A verification link is still outstanding for {minutes_remaining} more minutes")]
    StillPending { minutes_remaining: i64 },
    #[error("Email delivery failed: {0}")]
    Delivery(#[from] EmailError),
    #[error("Stored timestamp is invalid: {0}")]
    InvalidTimestamp(String),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResendEligibility {
    Allowed,
    StillPending { minutes_remaining: i64 },
    AlreadyVerified,
}

pub struct VerificationService {
    repository: Arc<dyn UserRepository>,
    emails: Arc<EmailGateway>,
    base_url: String,
}

impl VerificationService {
    pub fn new(
        repository: Arc<dyn UserRepository>,
        emails: Arc<EmailGateway>,
        base_url: String,
    ) -> Self {
        Self {
            repository,
            emails,
            base_url,
        }
    }

    fn generate_token() -> String {
        let mut rng = rand::thread_rng();
        let bytes: Vec<u8> = (0..32).map(|_| rng.gen()).collect();
        hex::encode(bytes)
    }

    /// Issues a fresh token (overwriting any prior one), persists it
    /// together with its expiry, then attempts delivery. The token is
    /// persisted even when delivery fails; the resend flow repairs that.
    pub async fn issue_and_send(&self, user: &User) -> Result<String, VerificationError> {
        let token = Self::generate_token();
        let expires_at = (Utc::now() + Duration::hours(TOKEN_TTL_HOURS)).to_rfc3339();

        self.repository
            .set_verification_token(user.id, &token, &expires_at)
            .await?;

        tracing::info!(user_id = user.id, "🔐 verification token issued");

        self.send_verification_email(&user.email, &token).await?;
        Ok(token)
    }

    /// Exact-match token lookup with a strictly-in-the-future expiry; a
    /// link expiring exactly now is already dead. On success the token is
    /// consumed: verified flag set and token+expiry cleared in one update,
    /// so a second lookup with the same token misses.
    pub async fn verify(&self, token: &str) -> Result<User, VerificationError> {
        let user = self
            .repository
            .find_by_verification_token(token)
            .await?
            .ok_or(VerificationError::TokenNotFound)?;

        let expires_at = match user.verification_token_expires_at.as_deref() {
            Some(raw) => parse_timestamp(raw)?,
            None => return Err(VerificationError::TokenNotFound),
        };

        if expires_at <= Utc::now() {
            tracing::info!(user_id = user.id, "verification link expired");
            return Err(VerificationError::TokenNotFound);
        }

        self.repository.mark_email_verified(user.id).await?;
        tracing::info!(user_id = user.id, email = %user.email, "✅ email verified");

        let mut user = user;
        user.email_verified = true;
        user.verification_token = None;
        user.verification_token_expires_at = None;
        Ok(user)
    }

    /// Resend policy: verified accounts never get another email, and an
    /// unexpired outstanding link blocks regeneration (reported with the
    /// ceiling-rounded minutes until it lapses).
    pub fn resend_eligibility(user: &User, now: DateTime<Utc>) -> ResendEligibility {
        if user.email_verified {
            return ResendEligibility::AlreadyVerified;
        }

        if user.verification_token.is_some() {
            if let Some(raw) = user.verification_token_expires_at.as_deref() {
                if let Ok(expires_at) = parse_timestamp(raw) {
                    if expires_at > now {
                        let seconds = (expires_at - now).num_seconds();
                        let minutes_remaining = (seconds + 59) / 60;
                        return ResendEligibility::StillPending { minutes_remaining };
                    }
                }
            }
        }

        ResendEligibility::Allowed
    }

    /// Regenerates the token, stamps the send time, bumps the resend
    /// counter (all in one store write) and delivers the new link.
    pub async fn resend(&self, user: &User) -> Result<String, VerificationError> {
        let now = Utc::now();
        match Self::resend_eligibility(user, now) {
            ResendEligibility::AlreadyVerified => return Err(VerificationError::AlreadyVerified),
            ResendEligibility::StillPending { minutes_remaining } => {
                return Err(VerificationError::StillPending { minutes_remaining });
            }
            ResendEligibility::Allowed => {}
        }

        let token = Self::generate_token();
        let expires_at = (now + Duration::hours(TOKEN_TTL_HOURS)).to_rfc3339();

        self.repository
            .refresh_verification_token(user.id, &token, &expires_at, &now.to_rfc3339())
            .await?;

        tracing::info!(user_id = user.id, "🔐 verification token regenerated");

        self.send_verification_email(&user.email, &token).await?;
        Ok(token)
    }

    async fn send_verification_email(&self, to: &str, token: &str) -> Result<(), VerificationError> {
        let verification_url = format!("{}/verify-email/{}", self.base_url, token);

        let html = format!(
            r#"
<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
    <h2 style="color: #667eea;">Welcome to Hello University!</h2>
    <p>Please verify your email by clicking the button below:</p>
    <a href="{url}" style="background-color: #667eea; color: white; padding: 12px 30px; text-decoration: none; border-radius: 5px; display: inline-block; margin: 20px 0;">
        Verify Email
    </a>
    <p>Or copy and paste this link: {url}</p>
    <p><strong>This link will expire in 24 hours.</strong></p>
    <p>If you didn't create this account, please ignore this email.</p>
    <hr style="border: none; border-top: 1px solid #ddd; margin: 20px 0;">
    <p style="color: #666; font-size: 12px;">Hello University - Quality Education &amp; Learning</p>
</div>
"#,
            url = verification_url
        );

        let message = EmailMessage {
            to: to.to_string(),
            subject: "Email Verification - Hello University".to_string(),
            html,
        };

        self.emails.send(&message).await?;
        Ok(())
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, VerificationError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| VerificationError::InvalidTimestamp(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::repositories::user_repository::MockUserRepository;
    use crate::services::email_service::{DailyQuota, LogEmailProvider, SystemClock};
    use mockall::predicate::*;

    fn log_gateway() -> Arc<EmailGateway> {
        Arc::new(EmailGateway::new(
            "sender@example.com".to_string(),
            vec![Box::new(LogEmailProvider)],
            DailyQuota::new(95, Utc::now().date_naive()),
            Box::new(SystemClock),
        ))
    }

    fn service(repo: MockUserRepository) -> VerificationService {
        VerificationService::new(
            Arc::new(repo),
            log_gateway(),
            "http://localhost:3000".to_string(),
        )
    }

    fn pending_user(id: i64, expires_at: Option<DateTime<Utc>>) -> User {
        User {
            id,
            email: "a@b.com".to_string(),
            password_hash: "hash".to_string(),
            role: Role::User,
            email_verified: false,
            verification_token: expires_at.map(|_| "deadbeef".repeat(8)),
            verification_token_expires_at: expires_at.map(|dt| dt.to_rfc3339()),
            last_verification_email_at: None,
            verification_email_count: 0,
            created_at: None,
        }
    }

    #[test]
    fn eligibility_verified_wins_over_pending_token() {
        let mut user = pending_user(1, Some(Utc::now() + Duration::hours(1)));
        user.email_verified = true;

        let eligibility = VerificationService::resend_eligibility(&user, Utc::now());
        assert_eq!(eligibility, ResendEligibility::AlreadyVerified);
    }

    #[test]
    fn eligibility_pending_reports_ceiling_minutes() {
        let now = Utc::now();
        let user = pending_user(1, Some(now + Duration::seconds(90)));

        let eligibility = VerificationService::resend_eligibility(&user, now);
        assert_eq!(
            eligibility,
            ResendEligibility::StillPending {
                minutes_remaining: 2
            }
        );

        let user = pending_user(1, Some(now + Duration::hours(24)));
        let eligibility = VerificationService::resend_eligibility(&user, now);
        assert_eq!(
            eligibility,
            ResendEligibility::StillPending {
                minutes_remaining: 24 * 60
            }
        );
    }

    #[test]
    fn eligibility_expired_or_absent_token_allows_resend() {
        let now = Utc::now();

        let user = pending_user(1, Some(now - Duration::seconds(1)));
        assert_eq!(
            VerificationService::resend_eligibility(&user, now),
            ResendEligibility::Allowed
        );

        // Expiring exactly now is not "still valid".
        let user = pending_user(1, Some(now));
        assert_eq!(
            VerificationService::resend_eligibility(&user, now),
            ResendEligibility::Allowed
        );

        let user = pending_user(1, None);
        assert_eq!(
            VerificationService::resend_eligibility(&user, now),
            ResendEligibility::Allowed
        );
    }

    #[tokio::test]
    async fn verify_consumes_token() {
        let mut mock_repo = MockUserRepository::new();
        let user = pending_user(3, Some(Utc::now() + Duration::hours(1)));
        let token = user.verification_token.clone().expect("token");

        let found = user.clone();
        let expected_token = token.clone();
        mock_repo
            .expect_find_by_verification_token()
            .withf(move |t| t == expected_token)
            .times(1)
            .returning(move |_| {
                let user = found.clone();
                Box::pin(async move { Ok(Some(user)) })
            });
        mock_repo
            .expect_mark_email_verified()
            .with(eq(3))
            .times(1)
            .returning(|_| Box::pin(async move { Ok(()) }));

        let service = service(mock_repo);

        let verified = service.verify(&token).await.expect("verified");
        assert!(verified.email_verified);
        assert!(verified.verification_token.is_none());
        assert!(verified.verification_token_expires_at.is_none());
    }

    #[tokio::test]
    async fn verify_rejects_expired_token_without_consuming() {
        let mut mock_repo = MockUserRepository::new();
        let user = pending_user(3, Some(Utc::now() - Duration::seconds(1)));
        let token = user.verification_token.clone().expect("token");

        mock_repo
            .expect_find_by_verification_token()
            .times(1)
            .returning(move |_| {
                let user = user.clone();
                Box::pin(async move { Ok(Some(user)) })
            });
        // No mark_email_verified expectation: calling it would panic.

        let service = service(mock_repo);

        let result = service.verify(&token).await;
        assert!(matches!(result, Err(VerificationError::TokenNotFound)));
    }

    #[tokio::test]
    async fn verify_unknown_token_is_not_found() {
        let mut mock_repo = MockUserRepository::new();
        mock_repo
            .expect_find_by_verification_token()
            .times(1)
            .returning(|_| Box::pin(async move { Ok(None) }));

        let service = service(mock_repo);

        let result = service.verify("nope").await;
        assert!(matches!(result, Err(VerificationError::TokenNotFound)));
    }

    #[tokio::test]
    async fn issue_and_send_persists_a_fresh_hex_token() {
        let mut mock_repo = MockUserRepository::new();
        mock_repo
            .expect_set_verification_token()
            .withf(|id, token, _expires| {
                *id == 5
                    && token.len() == 64
                    && token.chars().all(|c| c.is_ascii_hexdigit())
            })
            .times(1)
            .returning(|_, _, _| Box::pin(async move { Ok(()) }));

        let service = service(mock_repo);
        let user = pending_user(5, None);

        let token = service.issue_and_send(&user).await.expect("issued");
        assert_eq!(token.len(), 64);
    }

    #[tokio::test]
    async fn resend_blocked_while_link_outstanding() {
        let mock_repo = MockUserRepository::new();
        let service = service(mock_repo);

        let user = pending_user(5, Some(Utc::now() + Duration::minutes(10)));
        let result = service.resend(&user).await;

        assert!(matches!(
            result,
            Err(VerificationError::StillPending {
                minutes_remaining: 10
            })
        ));
    }

    #[tokio::test]
    async fn resend_allowed_refreshes_countered_token() {
        let mut mock_repo = MockUserRepository::new();
        mock_repo
            .expect_refresh_verification_token()
            .withf(|id, token, _expires, _sent| *id == 5 && token.len() == 64)
            .times(1)
            .returning(|_, _, _, _| Box::pin(async move { Ok(()) }));

        let service = service(mock_repo);

        let user = pending_user(5, Some(Utc::now() - Duration::hours(1)));
        let token = service.resend(&user).await.expect("resent");
        assert_eq!(token.len(), 64);
    }
}
