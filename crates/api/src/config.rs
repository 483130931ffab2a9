//! Application configuration loaded from environment variables.

use std::time::Duration;

use common::RetryPolicy;
use consumers::{SmtpSecurity, SmtpSettings};

/// Process configuration with development defaults.
///
/// Reads from environment variables (after `.env`, when present):
/// - `HOST`, `PORT`: listen address (default `0.0.0.0:8080`)
/// - `LOG_LEVEL`, `LOG_FORMAT`: tracing filter and `pretty` | `json`
/// - `DATABASE_URL`: Postgres stores when set, in-memory otherwise
/// - `AMQP_URL`: RabbitMQ bus when set, in-process bus otherwise
/// - `PEER_BASE_URL`: reach the invoice and product owners over HTTP
/// - `PEER_CONNECT_TIMEOUT_MS`, `PEER_REQUEST_TIMEOUT_MS`,
///   `PEER_MAX_RETRIES`, `PEER_INITIAL_BACKOFF_MS`, `PEER_SERVICE_TOKEN`
/// - `INVENTORY_CAS_ATTEMPTS`, `INVENTORY_BACKOFF_MS`
/// - `CONSUMER_MAX_DELIVERIES`
/// - `VNPAY_PAY_URL`, `VNPAY_TMN_CODE`, `VNPAY_HASH_SECRET`, `VNPAY_RETURN_URL`
/// - `PASSWORD_RESET_URL`, `MAIL_FROM`
/// - `SMTP_HOST`: send mail over SMTP when set, log it otherwise;
///   `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD`,
///   `SMTP_SECURITY` (`starttls` | `tls` | `none`)
/// - `AUTH_TOKENS`: `token=userId:ROLE|ROLE:email;...`
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub amqp_url: Option<String>,
    pub peer: PeerConfig,
    pub inventory_cas_attempts: usize,
    pub inventory_backoff: Duration,
    pub consumer_max_deliveries: u32,
    pub gateway: GatewaySettings,
    pub password_reset_url: String,
    pub mail_from: String,
    pub smtp: Option<SmtpSettings>,
    pub auth_tokens: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub base_url: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_retries: usize,
    pub initial_backoff: Duration,
    pub service_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub pay_url: String,
    pub tmn_code: String,
    pub hash_secret: String,
    pub return_url: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let text = |key: &str, default: String| lookup(key).unwrap_or(default);
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let millis = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.parse().ok())
                .map_or(default, Duration::from_millis)
        };

        Self {
            host: text("HOST", defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: text("LOG_LEVEL", defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            database_url: optional("DATABASE_URL"),
            amqp_url: optional("AMQP_URL"),
            peer: PeerConfig {
                base_url: optional("PEER_BASE_URL"),
                connect_timeout: millis("PEER_CONNECT_TIMEOUT_MS", defaults.peer.connect_timeout),
                request_timeout: millis("PEER_REQUEST_TIMEOUT_MS", defaults.peer.request_timeout),
                max_retries: lookup("PEER_MAX_RETRIES")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.peer.max_retries),
                initial_backoff: millis("PEER_INITIAL_BACKOFF_MS", defaults.peer.initial_backoff),
                service_token: optional("PEER_SERVICE_TOKEN"),
            },
            inventory_cas_attempts: lookup("INVENTORY_CAS_ATTEMPTS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.inventory_cas_attempts),
            inventory_backoff: millis("INVENTORY_BACKOFF_MS", defaults.inventory_backoff),
            consumer_max_deliveries: lookup("CONSUMER_MAX_DELIVERIES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.consumer_max_deliveries),
            gateway: GatewaySettings {
                pay_url: text("VNPAY_PAY_URL", defaults.gateway.pay_url),
                tmn_code: text("VNPAY_TMN_CODE", defaults.gateway.tmn_code),
                hash_secret: text("VNPAY_HASH_SECRET", defaults.gateway.hash_secret),
                return_url: text("VNPAY_RETURN_URL", defaults.gateway.return_url),
            },
            password_reset_url: text("PASSWORD_RESET_URL", defaults.password_reset_url),
            mail_from: text("MAIL_FROM", defaults.mail_from),
            smtp: optional("SMTP_HOST").map(|host| {
                let security = lookup("SMTP_SECURITY")
                    .and_then(|v| SmtpSecurity::parse(&v))
                    .unwrap_or(SmtpSecurity::StartTls);
                let default_port = match security {
                    SmtpSecurity::StartTls => 587,
                    SmtpSecurity::Tls => 465,
                    SmtpSecurity::Plain => 25,
                };
                SmtpSettings {
                    host,
                    port: lookup("SMTP_PORT")
                        .and_then(|p| p.parse().ok())
                        .unwrap_or(default_port),
                    username: optional("SMTP_USERNAME"),
                    password: optional("SMTP_PASSWORD"),
                    security,
                }
            }),
            auth_tokens: optional("AUTH_TOKENS"),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn inventory_retry(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_attempts(self.inventory_cas_attempts)
            .initial_delay(self.inventory_backoff)
            .build()
    }

    pub fn peer_retry(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.peer.max_retries)
            .initial_delay(self.peer.initial_backoff)
            .build()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            amqp_url: None,
            peer: PeerConfig {
                base_url: None,
                connect_timeout: Duration::from_millis(2_000),
                request_timeout: Duration::from_millis(5_000),
                max_retries: 2,
                initial_backoff: Duration::from_millis(100),
                service_token: None,
            },
            inventory_cas_attempts: 3,
            inventory_backoff: Duration::from_millis(50),
            consumer_max_deliveries: consumers::worker::DEFAULT_MAX_DELIVERIES,
            gateway: GatewaySettings {
                pay_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".to_string(),
                tmn_code: "DEMOTMN1".to_string(),
                hash_secret: "DEMOSECRETKEY".to_string(),
                return_url: "http://localhost:8080/payments/callback".to_string(),
            },
            password_reset_url: "http://localhost:3000/reset-password".to_string(),
            mail_from: "no-reply@shopshoes.local".to_string(),
            smtp: None,
            auth_tokens: None,
        }
    }
}
