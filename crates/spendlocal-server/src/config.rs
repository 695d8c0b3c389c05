//! Server configuration from environment

use std::env;
use std::time::Duration;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_ORIGIN: &str = "http://localhost:5173";
const DEFAULT_VENMO_HANDLE: &str = "@SpendLocal";
const DEFAULT_OPERATOR_EMAIL: &str = "BexleyCohen@gmail.com";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Front-end origin used for checkout return URLs
    pub public_origin: String,
    pub venmo_handle: String,
    /// Mailbox receiving contact forms and forwarded mail
    pub operator_email: String,
    pub stripe_webhook_secret: Option<String>,
    pub identity_jwt_secret: Option<String>,
    pub admin_token: Option<String>,
    /// Upper bound on every store, Stripe, mail and launcher call
    pub external_timeout: Duration,
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let timeout_secs = var("EXTERNAL_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self {
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into()),
            public_origin: var("PUBLIC_ORIGIN").unwrap_or_else(|| DEFAULT_ORIGIN.into()),
            venmo_handle: var("VENMO_HANDLE").unwrap_or_else(|| DEFAULT_VENMO_HANDLE.into()),
            operator_email: var("OPERATOR_EMAIL").unwrap_or_else(|| DEFAULT_OPERATOR_EMAIL.into()),
            stripe_webhook_secret: var("STRIPE_WEBHOOK_SECRET"),
            identity_jwt_secret: var("IDENTITY_JWT_SECRET"),
            admin_token: var("ADMIN_TOKEN"),
            external_timeout: Duration::from_secs(timeout_secs),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.into(),
            public_origin: DEFAULT_ORIGIN.into(),
            venmo_handle: DEFAULT_VENMO_HANDLE.into(),
            operator_email: DEFAULT_OPERATOR_EMAIL.into(),
            stripe_webhook_secret: None,
            identity_jwt_secret: None,
            admin_token: None,
            external_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}
