//! Environment-driven defaults for the login flow.
//!
//! Resolution order everywhere is CLI flag > environment variable > the
//! defaults below. Malformed numeric values fall back to the default rather
//! than failing the command.

use std::time::Duration;

pub const MEMORI_AUTH_BASE_ENV_VAR: &str = "MEMORI_AUTH_BASE";
/// Legacy fallback for [`MEMORI_AUTH_BASE_ENV_VAR`].
pub const MEMORI_API_URL_BASE_ENV_VAR: &str = "MEMORI_API_URL_BASE";
pub const MEMORI_LOGIN_URL_ENV_VAR: &str = "MEMORI_LOGIN_URL";
pub const MEMORI_LOGIN_NEXT_URL_ENV_VAR: &str = "MEMORI_LOGIN_NEXT_URL";
pub const MEMORI_LOGIN_PORT_ENV_VAR: &str = "MEMORI_LOGIN_PORT";
pub const MEMORI_LOGIN_WAIT_TIMEOUT_ENV_VAR: &str = "MEMORI_LOGIN_WAIT_TIMEOUT";
pub const MEMORI_LOGIN_DEADLINE_ENV_VAR: &str = "MEMORI_LOGIN_DEADLINE";

pub const DEFAULT_AUTH_BASE: &str = "https://api.memorilabs.ai";
pub const DEFAULT_LOGIN_URL: &str = "https://memorilabs.ai/login";
pub const DEFAULT_NEXT_URL: &str = "/home";
pub const DEFAULT_CALLBACK_PORT: u16 = 54321;
/// Server-side budget of a single `wait` long-poll.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(40);
/// Wall-clock bound on one whole login attempt.
pub const DEFAULT_LOGIN_DEADLINE: Duration = Duration::from_secs(900);

/// Login settings as resolved from the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginDefaults {
    pub auth_base: String,
    pub login_url: String,
    pub next_url: String,
    pub port: u16,
    pub wait_timeout: Duration,
    pub deadline: Duration,
}

impl LoginDefaults {
    pub fn from_env() -> Self {
        Self {
            auth_base: env_string(MEMORI_AUTH_BASE_ENV_VAR)
                .or_else(|| env_string(MEMORI_API_URL_BASE_ENV_VAR))
                .unwrap_or_else(|| DEFAULT_AUTH_BASE.to_string()),
            login_url: env_string(MEMORI_LOGIN_URL_ENV_VAR)
                .unwrap_or_else(|| DEFAULT_LOGIN_URL.to_string()),
            next_url: env_string(MEMORI_LOGIN_NEXT_URL_ENV_VAR)
                .unwrap_or_else(|| DEFAULT_NEXT_URL.to_string()),
            port: parse_port(env_string(MEMORI_LOGIN_PORT_ENV_VAR), DEFAULT_CALLBACK_PORT),
            wait_timeout: parse_secs(
                env_string(MEMORI_LOGIN_WAIT_TIMEOUT_ENV_VAR),
                DEFAULT_WAIT_TIMEOUT,
            ),
            deadline: parse_secs(
                env_string(MEMORI_LOGIN_DEADLINE_ENV_VAR),
                DEFAULT_LOGIN_DEADLINE,
            ),
        }
    }
}

/// Non-empty environment string, or None.
pub(crate) fn env_string(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn parse_port(value: Option<String>, default: u16) -> u16 {
    value
        .and_then(|raw| raw.trim().parse::<u16>().ok())
        .unwrap_or(default)
}

fn parse_secs(value: Option<String>, default: Duration) -> Duration {
    value
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
