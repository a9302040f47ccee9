use std::{env, fmt, net::SocketAddr};

use super::server_bind_address;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://bizops-notify.db?mode=rwc";
pub const DEFAULT_MAILER_FROM: &str = "notifications@localhost";

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Settings for the hosted email function used for escalations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailerConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub from: String,
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub database_url: String,
    /// `None` disables escalation email.
    pub mailer: Option<MailerConfig>,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;
        let database_url =
            non_empty_var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let mailer = non_empty_var("MAILER_BASE_URL").map(|base_url| MailerConfig {
            base_url,
            api_key: non_empty_var("MAILER_API_KEY"),
            from: non_empty_var("MAILER_FROM").unwrap_or_else(|| DEFAULT_MAILER_FROM.to_string()),
        });
        if let Some(config) = &mailer {
            if !(config.base_url.starts_with("http://") || config.base_url.starts_with("https://"))
            {
                return Err(ConfigError::InvalidMailerUrl(config.base_url.clone()));
            }
        }

        Ok(Self {
            bind_addr,
            environment,
            database_url,
            mailer,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    InvalidMailerUrl(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::InvalidMailerUrl(value) => {
                write!(f, "MAILER_BASE_URL must be an http(s) url (got {value})")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
