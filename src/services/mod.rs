pub mod auth_service;
pub mod email_service;
pub mod user_service;
pub mod verification_service;

pub use auth_service::{AuthService, AuthServiceError, LoginRequest};
pub use email_service::{
    create_email_gateway, Clock, DailyQuota, EmailError, EmailGateway, EmailMessage,
    EmailProvider, LogEmailProvider, ResendProvider, SendGridProvider, SystemClock,
    PRIMARY_DAILY_LIMIT,
};
pub use user_service::{CreateUserRequest, UserService, UserServiceError};
pub use verification_service::{
    ResendEligibility, VerificationError, VerificationService, TOKEN_TTL_HOURS,
};
