use std::env;
use std::fmt;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub telemetry: TelemetryConfig,
    pub invitations: InvitationConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let registration_base_url = env::var("INVITE_REGISTRATION_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000/register".to_string());
        let token_retry_budget = match env::var("INVITE_TOKEN_RETRY_BUDGET") {
            Ok(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|budget| *budget > 0)
                .ok_or(ConfigError::InvalidRetryBudget { value: raw })?,
            Err(_) => InvitationConfig::DEFAULT_RETRY_BUDGET,
        };

        Ok(Self {
            environment,
            telemetry: TelemetryConfig { log_level },
            invitations: InvitationConfig {
                registration_base_url,
                token_retry_budget,
            },
        })
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Settings governing invitation token allocation and registration links.
#[derive(Debug, Clone)]
pub struct InvitationConfig {
    /// Base URL the emailed registration link is built from; the access token
    /// rides along as a query parameter.
    pub registration_base_url: String,
    /// Upper bound on token allocation retries before the save is aborted.
    pub token_retry_budget: usize,
}

impl InvitationConfig {
    pub const DEFAULT_RETRY_BUDGET: usize = 10;
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidRetryBudget { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidRetryBudget { value } => {
                write!(
                    f,
                    "invalid INVITE_TOKEN_RETRY_BUDGET '{}': expected a positive integer",
                    value
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parsing_covers_aliases() {
        assert_eq!(
            AppEnvironment::from_str("Production"),
            AppEnvironment::Production
        );
        assert_eq!(AppEnvironment::from_str("prod"), AppEnvironment::Production);
        assert_eq!(AppEnvironment::from_str("ci"), AppEnvironment::Test);
        assert_eq!(
            AppEnvironment::from_str("anything-else"),
            AppEnvironment::Development
        );
    }
}
