use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use hello_university::services::email_service::{
    Clock, DailyQuota, EmailError, EmailGateway, EmailMessage, EmailProvider, ResendProvider,
    SendGridProvider, PRIMARY_DAILY_LIMIT,
};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct FixedClock {
    now: DateTime<Utc>,
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }
}

fn test_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
}

fn fixed_clock() -> Box<FixedClock> {
    let now = Utc.from_utc_datetime(&test_day().and_hms_opt(12, 0, 0).unwrap());
    Box::new(FixedClock { now })
}

fn gateway_for(
    sendgrid_url: &str,
    resend_url: &str,
    sent_today: u32,
) -> EmailGateway {
    let http_client = reqwest::Client::new();
    let providers: Vec<Box<dyn EmailProvider>> = vec![
        Box::new(SendGridProvider::new(
            sendgrid_url.to_string(),
            "sg-test-key".to_string(),
            http_client.clone(),
        )),
        Box::new(ResendProvider::new(
            resend_url.to_string(),
            "re-test-key".to_string(),
            http_client,
        )),
    ];
    EmailGateway::new(
        "noreply@hello-university.test".to_string(),
        providers,
        DailyQuota::with_sent(PRIMARY_DAILY_LIMIT, sent_today, test_day()),
        fixed_clock(),
    )
}

fn message() -> EmailMessage {
    EmailMessage {
        to: "student@example.com".to_string(),
        subject: "Email Verification - Hello University".to_string(),
        html: "<p>verify</p>".to_string(),
    }
}

#[tokio::test]
async fn test_primary_delivery_uses_sendgrid_contract() {
    let sendgrid = MockServer::start().await;
    let resend = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v3/mail/send"))
        .and(header("authorization", "Bearer sg-test-key"))
        .and(body_partial_json(serde_json::json!({
            "from": { "email": "noreply@hello-university.test" },
            "subject": "Email Verification - Hello University",
            "personalizations": [
                { "to": [ { "email": "student@example.com" } ] }
            ],
            "content": [
                { "type": "text/html", "value": "<p>verify</p>" }
            ]
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&sendgrid)
        .await;

    // The fallback must not be touched on primary success.
    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&resend)
        .await;

    let gateway = gateway_for(&sendgrid.uri(), &resend.uri(), 94);

    gateway.send(&message()).await.expect("delivered");
    assert_eq!(gateway.sent_today(), 95);
}

#[tokio::test]
async fn test_primary_failure_falls_back_to_resend_contract() {
    let sendgrid = MockServer::start().await;
    let resend = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v3/mail/send"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&sendgrid)
        .await;

    Mock::given(method("POST"))
        .and(path("/emails"))
        .and(header("authorization", "Bearer re-test-key"))
        .and(body_partial_json(serde_json::json!({
            "from": "noreply@hello-university.test",
            "to": "student@example.com",
            "subject": "Email Verification - Hello University",
            "html": "<p>verify</p>"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&resend)
        .await;

    let gateway = gateway_for(&sendgrid.uri(), &resend.uri(), 10);

    gateway.send(&message()).await.expect("delivered");
    // Failed primary attempts are never counted against the quota.
    assert_eq!(gateway.sent_today(), 10);
}

#[tokio::test]
async fn test_exhausted_quota_skips_primary_entirely() {
    let sendgrid = MockServer::start().await;
    let resend = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v3/mail/send"))
        .respond_with(ResponseTemplate::new(202))
        .expect(0)
        .mount(&sendgrid)
        .await;

    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&resend)
        .await;

    let gateway = gateway_for(&sendgrid.uri(), &resend.uri(), PRIMARY_DAILY_LIMIT);

    gateway.send(&message()).await.expect("delivered");
    assert_eq!(gateway.sent_today(), PRIMARY_DAILY_LIMIT);
}

#[tokio::test]
async fn test_both_providers_failing_surfaces_delivery_failure() {
    let sendgrid = MockServer::start().await;
    let resend = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v3/mail/send"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&sendgrid)
        .await;

    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&resend)
        .await;

    let gateway = gateway_for(&sendgrid.uri(), &resend.uri(), 0);

    let result = gateway.send(&message()).await;
    assert!(matches!(result, Err(EmailError::AllProvidersFailed(_))));
    assert_eq!(gateway.sent_today(), 0);
}
