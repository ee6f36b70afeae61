use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::Serialize;
use std::env;
use std::sync::Mutex;

/// Daily send budget for the primary provider. Kept just under the
/// provider-side cap so we stop before they start rejecting.
pub const PRIMARY_DAILY_LIMIT: u32 = 95;

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("{provider} send failed: {message}")]
    ProviderFailed {
        provider: &'static str,
        message: String,
    },
    #[error("All email providers failed: {0}")]
    AllProvidersFailed(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait EmailProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn send(&self, from: &str, message: &EmailMessage) -> Result<(), EmailError>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Per-day send counter for the primary provider. The counter lives in
/// process memory only; a restart or a second process starts from zero.
#[derive(Debug, Clone)]
pub struct DailyQuota {
    limit: u32,
    sent: u32,
    reset_day: NaiveDate,
}

impl DailyQuota {
    pub fn new(limit: u32, today: NaiveDate) -> Self {
        Self {
            limit,
            sent: 0,
            reset_day: today,
        }
    }

    pub fn with_sent(limit: u32, sent: u32, day: NaiveDate) -> Self {
        Self {
            limit,
            sent,
            reset_day: day,
        }
    }

    /// Zeroes the counter when the calendar day has changed. Must run
    /// before the quota is consulted for the current send.
    pub fn roll(&mut self, today: NaiveDate) {
        if today != self.reset_day {
            self.sent = 0;
            self.reset_day = today;
            tracing::info!("🔄 daily email counter reset");
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.sent >= self.limit
    }

    pub fn record_send(&mut self) {
        self.sent += 1;
    }

    pub fn sent(&self) -> u32 {
        self.sent
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}

/// Synchronous delivery across an ordered provider list. Slot 0 is the
/// primary and the only slot the daily quota accounts for; later slots are
/// fallbacks tried in order, one after another, until a send succeeds or
/// every provider has failed.
pub struct EmailGateway {
    from: String,
    providers: Vec<Box<dyn EmailProvider>>,
    quota: Mutex<DailyQuota>,
    clock: Box<dyn Clock>,
}

impl EmailGateway {
    pub fn new(
        from: String,
        providers: Vec<Box<dyn EmailProvider>>,
        quota: DailyQuota,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            from,
            providers,
            quota: Mutex::new(quota),
            clock,
        }
    }

    pub fn sent_today(&self) -> u32 {
        self.quota.lock().expect("quota mutex poisoned").sent()
    }

    pub async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        if self.providers.is_empty() {
            return Err(EmailError::ConfigError(
                "no email providers configured".to_string(),
            ));
        }

        let today = self.clock.now().date_naive();
        let start = {
            let mut quota = self.quota.lock().expect("quota mutex poisoned");
            quota.roll(today);
            tracing::info!(
                to = %message.to,
                sent_today = quota.sent(),
                "📧 sending email"
            );
            if quota.is_exhausted() && self.providers.len() > 1 {
                tracing::warn!(
                    limit = quota.limit(),
                    "⚠️ primary provider daily limit reached, routing to fallback"
                );
                1
            } else {
                0
            }
        };

        let mut last_error: Option<EmailError> = None;
        for (idx, provider) in self.providers.iter().enumerate().skip(start) {
            match provider.send(&self.from, message).await {
                Ok(()) => {
                    // Only primary-provider sends count against the quota;
                    // fallback deliveries and failed attempts do not.
                    if idx == 0 {
                        let mut quota = self.quota.lock().expect("quota mutex poisoned");
                        quota.roll(today);
                        quota.record_send();
                        tracing::info!(
                            sent_today = quota.sent(),
                            "✅ email sent via {}",
                            provider.name()
                        );
                    } else {
                        tracing::info!("✅ email sent via {} (fallback)", provider.name());
                    }
                    return Ok(());
                }
                Err(e) => {
                    tracing::error!("❌ {} error: {}", provider.name(), e);
                    last_error = Some(e);
                }
            }
        }

        let detail = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no provider attempted".to_string());
        Err(EmailError::AllProvidersFailed(detail))
    }
}

#[derive(Serialize)]
struct SendGridAddress<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct SendGridPersonalization<'a> {
    to: Vec<SendGridAddress<'a>>,
}

#[derive(Serialize)]
struct SendGridContent<'a> {
    #[serde(rename = "type")]
    content_type: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
struct SendGridRequest<'a> {
    personalizations: Vec<SendGridPersonalization<'a>>,
    from: SendGridAddress<'a>,
    subject: &'a str,
    content: Vec<SendGridContent<'a>>,
}

/// Primary provider: SendGrid v3 mail send endpoint.
pub struct SendGridProvider {
    http_client: Client,
    base_url: String,
    api_key: String,
}

impl SendGridProvider {
    pub fn new(base_url: String, api_key: String, http_client: Client) -> Self {
        Self {
            http_client,
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl EmailProvider for SendGridProvider {
    fn name(&self) -> &'static str {
        "sendgrid"
    }

    async fn send(&self, from: &str, message: &EmailMessage) -> Result<(), EmailError> {
        let body = SendGridRequest {
            personalizations: vec![SendGridPersonalization {
                to: vec![SendGridAddress { email: &message.to }],
            }],
            from: SendGridAddress { email: from },
            subject: &message.subject,
            content: vec![SendGridContent {
                content_type: "text/html",
                value: &message.html,
            }],
        };

        self.http_client
            .post(format!("{}/v3/mail/send", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmailError::ProviderFailed {
                provider: "sendgrid",
                message: e.to_string(),
            })?
            .error_for_status()
            .map_err(|e| EmailError::ProviderFailed {
                provider: "sendgrid",
                message: e.to_string(),
            })?;

        Ok(())
    }
}

#[derive(Serialize)]
struct ResendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// Fallback provider: Resend REST API, bearer-token authenticated.
pub struct ResendProvider {
    http_client: Client,
    base_url: String,
    api_key: String,
}

impl ResendProvider {
    pub fn new(base_url: String, api_key: String, http_client: Client) -> Self {
        Self {
            http_client,
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl EmailProvider for ResendProvider {
    fn name(&self) -> &'static str {
        "resend"
    }

    async fn send(&self, from: &str, message: &EmailMessage) -> Result<(), EmailError> {
        let body = ResendRequest {
            from,
            to: &message.to,
            subject: &message.subject,
            html: &message.html,
        };

        self.http_client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmailError::ProviderFailed {
                provider: "resend",
                message: e.to_string(),
            })?
            .error_for_status()
            .map_err(|e| EmailError::ProviderFailed {
                provider: "resend",
                message: e.to_string(),
            })?;

        Ok(())
    }
}

/// Development stand-in when no provider API keys are configured: logs the
/// message instead of delivering it.
pub struct LogEmailProvider;

#[async_trait]
impl EmailProvider for LogEmailProvider {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, from: &str, message: &EmailMessage) -> Result<(), EmailError> {
        tracing::info!("📧 [LOG EMAIL] From: {}", from);
        tracing::info!("📧 [LOG EMAIL] To: {}", message.to);
        tracing::info!("📧 [LOG EMAIL] Subject: {}", message.subject);
        tracing::info!("📧 [LOG EMAIL] Body: {}", message.html);
        Ok(())
    }
}

/// Builds the gateway from environment configuration: SendGrid as primary
/// and Resend as fallback when their keys are present, otherwise the
/// console logger.
pub fn create_email_gateway() -> EmailGateway {
    let from =
        env::var("SENDER_EMAIL").unwrap_or_else(|_| "no-reply@hello-university.test".to_string());
    let http_client = Client::new();

    let mut providers: Vec<Box<dyn EmailProvider>> = Vec::new();

    if let Ok(api_key) = env::var("SENDGRID_API_KEY") {
        let base_url = env::var("SENDGRID_BASE_URL")
            .unwrap_or_else(|_| "https://api.sendgrid.com".to_string());
        providers.push(Box::new(SendGridProvider::new(
            base_url,
            api_key,
            http_client.clone(),
        )));
    }

    if let Ok(api_key) = env::var("RESEND_API_KEY") {
        let base_url =
            env::var("RESEND_BASE_URL").unwrap_or_else(|_| "https://api.resend.com".to_string());
        providers.push(Box::new(ResendProvider::new(
            base_url,
            api_key,
            http_client,
        )));
    }

    if providers.is_empty() {
        tracing::info!(
            "No email provider API keys configured. Using log provider (emails will be logged to console)"
        );
        providers.push(Box::new(LogEmailProvider));
    }

    let today = Utc::now().date_naive();
    EmailGateway::new(
        from,
        providers,
        DailyQuota::new(PRIMARY_DAILY_LIMIT, today),
        Box::new(SystemClock),
    )
}
