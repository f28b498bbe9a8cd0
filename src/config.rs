use std::env;
use std::str::FromStr;

use crate::crypto::EncryptionMethod;
use crate::engine::KeyFormat;
use crate::error::{AppError, Result};

/// Request budget for one route class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLimit {
    pub max_requests: u32,
    pub window_secs: i64,
}

impl WindowLimit {
    pub const fn new(max_requests: u32, window_secs: i64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }
}

/// Per route-class sliding window limits.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub verify: WindowLimit,
    pub login: WindowLimit,
    pub api: WindowLimit,
    pub other: WindowLimit,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            verify: WindowLimit::new(10, 60),
            login: WindowLimit::new(5, 60),
            api: WindowLimit::new(100, 60),
            other: WindowLimit::new(1000, 60),
        }
    }
}

impl RateLimitConfig {
    fn from_env() -> Self {
        let defaults = Self::default();
        let read = |class: &str, fallback: WindowLimit| WindowLimit {
            max_requests: parse_env(&format!("RATE_LIMIT_{}_MAX", class), fallback.max_requests),
            window_secs: parse_env(&format!("RATE_LIMIT_{}_WINDOW", class), fallback.window_secs)
                .max(1),
        };
        Self {
            verify: read("VERIFY", defaults.verify),
            login: read("LOGIN", defaults.login),
            api: read("API", defaults.api),
            other: read("OTHER", defaults.other),
        }
    }

    /// Longest configured window; idle keys older than this can be dropped.
    pub fn longest_window(&self) -> i64 {
        [self.verify, self.login, self.api, self.other]
            .iter()
            .map(|l| l.window_secs)
            .max()
            .unwrap_or(60)
    }
}

/// How client signatures are checked once the headers are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureMode {
    /// Presence and replay window only.
    #[default]
    None,
    /// HMAC-SHA256 over `"{client_id}.{timestamp}"` keyed with the API secret.
    Hmac,
}

impl FromStr for SignatureMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(SignatureMode::None),
            "hmac" | "hmac-sha256" => Ok(SignatureMode::Hmac),
            other => Err(AppError::Config(format!("Unknown SIGNATURE_POLICY: {}", other))),
        }
    }
}

/// Settings for the `/api` security stage.
#[derive(Debug, Clone, Default)]
pub struct ApiSecurityConfig {
    pub client_auth_required: bool,
    pub signature_mode: SignatureMode,
    pub api_key_required: bool,
    pub api_secret: String,
    pub encryption: Option<EncryptionMethod>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub audit_database_path: String,
    pub debug: bool,
    pub audit_log_enabled: bool,
    pub usage_log_retention_days: i64,
    pub admin_log_retention_days: i64,
    pub key_format: KeyFormat,
    pub api_security: ApiSecurityConfig,
    pub rate_limit: RateLimitConfig,
    pub trust_proxy_headers: bool,
    pub cors_allowed_origin: String,
    pub admin_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = parse_env("PORT", 3000);

        let key_defaults = KeyFormat::default();
        let key_format = KeyFormat {
            prefix: env::var("LICENSE_PREFIX").unwrap_or(key_defaults.prefix),
            length: parse_env("LICENSE_LENGTH", key_defaults.length),
            charset: env::var("LICENSE_CHARSET")
                .ok()
                .filter(|c| !c.is_empty())
                .unwrap_or(key_defaults.charset),
        };

        let encryption = match env::var("API_ENCRYPT_METHOD") {
            Ok(method) => EncryptionMethod::from_config(&method)?,
            Err(_) => None,
        };

        let api_security = ApiSecurityConfig {
            client_auth_required: env_flag("CLIENT_AUTH_REQUIRED"),
            signature_mode: env::var("SIGNATURE_POLICY")
                .map(|v| v.parse())
                .unwrap_or(Ok(SignatureMode::None))?,
            api_key_required: env_flag("API_KEY_REQUIRED"),
            api_secret: env::var("API_SECRET_KEY").unwrap_or_default(),
            encryption,
        };

        Ok(Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "licensegate.db".to_string()),
            audit_database_path: env::var("AUDIT_DATABASE_PATH")
                .unwrap_or_else(|_| "licensegate_audit.db".to_string()),
            debug: env_flag("APP_DEBUG"),
            audit_log_enabled: env::var("AUDIT_LOG_ENABLED")
                .map(|v| is_truthy(&v))
                .unwrap_or(true),
            usage_log_retention_days: parse_env("USAGE_LOG_RETENTION_DAYS", 90),
            admin_log_retention_days: parse_env("ADMIN_LOG_RETENTION_DAYS", 180),
            key_format,
            api_security,
            rate_limit: RateLimitConfig::from_env(),
            trust_proxy_headers: env_flag("TRUST_PROXY_HEADERS"),
            cors_allowed_origin: env::var("CORS_ALLOWED_ORIGIN")
                .unwrap_or_else(|_| "*".to_string()),
            admin_token: env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty()),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_env<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(name: &str) -> bool {
    env::var(name).map(|v| is_truthy(&v)).unwrap_or(false)
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
