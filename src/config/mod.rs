//! Connection configuration and environment wiring.
//!
//! Credentials are a tagged choice: exactly one of an API token or a
//! username/password pair must be supplied. The environment constructor
//! honours the same variables the CLI/provider layers use.

use crate::core::domain::error::{PveError, PveResult, ValidationError};
use std::env;
use std::time::Duration;
use url::Url;

/// Environment variable holding the base URL, e.g. `https://10.0.0.2:8006`.
pub const ENV_ENDPOINT: &str = "PROXMOX_ENDPOINT";
/// Environment variable holding the ticket-auth username (`user@realm`).
pub const ENV_USERNAME: &str = "PROXMOX_USERNAME";
/// Environment variable holding the ticket-auth password.
pub const ENV_PASSWORD: &str = "PROXMOX_PASSWORD";
/// Environment variable holding an API token (exclusive with user/pass).
pub const ENV_API_KEY: &str = "PROXMOX_API_KEY";
/// Environment variable toggling TLS verification skip.
pub const ENV_INSECURE_TLS: &str = "PROXMOX_INSECURE_TLS";

/// How the client authenticates against the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// `Authorization: PVEAPIToken={token}` on every request.
    Token(String),
    /// Ticket login via `POST /access/ticket`; the ticket and CSRF token
    /// are cached and refreshed once on HTTP 401.
    UserPass { username: String, password: String },
}

impl Credentials {
    /// Builds credentials from the optional token and user/password
    /// values, enforcing that exactly one variant is present.
    pub fn resolve(
        token: Option<String>,
        username: Option<String>,
        password: Option<String>,
    ) -> PveResult<Self> {
        match (token, username, password) {
            (Some(token), None, None) => {
                if token.is_empty() {
                    return Err(ValidationError::Field {
                        field: "api_key".to_string(),
                        message: "API token cannot be empty".to_string(),
                    }
                    .into());
                }
                Ok(Credentials::Token(token))
            }
            (None, Some(username), Some(password)) => {
                if username.is_empty() {
                    return Err(ValidationError::Field {
                        field: "username".to_string(),
                        message: "username cannot be empty".to_string(),
                    }
                    .into());
                }
                Ok(Credentials::UserPass { username, password })
            }
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => Err(ValidationError::ConstraintViolation(
                "API token and username/password are mutually exclusive".to_string(),
            )
            .into()),
            (None, Some(_), None) | (None, None, Some(_)) => Err(ValidationError::ConstraintViolation(
                "ticket authentication needs both username and password".to_string(),
            )
            .into()),
            (None, None, None) => Err(ValidationError::ConstraintViolation(
                "no credentials: provide an API token or username/password".to_string(),
            )
            .into()),
        }
    }

    /// The account name behind the credentials, when derivable. Token ids
    /// look like `user@realm!tokenid=uuid`.
    pub fn username(&self) -> Option<&str> {
        match self {
            Credentials::Token(token) => token.split('!').next(),
            Credentials::UserPass { username, .. } => Some(username),
        }
    }

    /// Whether the credentials belong to the root account. Some plan
    /// fields are accepted by the API only for root.
    pub fn is_root(&self) -> bool {
        self.username()
            .map(|u| u == "root@pam")
            .unwrap_or(false)
    }
}

/// Client-side request throttle settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst_size: u32,
}

/// Everything needed to construct the shared transport.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub endpoint: Url,
    pub credentials: Credentials,
    /// Skip TLS certificate verification. Off by default.
    pub insecure_tls: bool,
    /// Per-request deadline for a single HTTP call.
    pub request_timeout: Duration,
    pub rate_limit: Option<RateLimitConfig>,
}

impl ConnectionOptions {
    pub fn new(endpoint: &str, credentials: Credentials) -> PveResult<Self> {
        let endpoint = Url::parse(endpoint).map_err(|e| {
            PveError::from(ValidationError::Field {
                field: "endpoint".to_string(),
                message: format!("invalid endpoint URL '{}': {}", endpoint, e),
            })
        })?;
        Ok(Self {
            endpoint,
            credentials,
            insecure_tls: false,
            request_timeout: Duration::from_secs(10),
            rate_limit: None,
        })
    }

    /// Reads `PROXMOX_ENDPOINT`, `PROXMOX_API_KEY` or
    /// `PROXMOX_USERNAME`/`PROXMOX_PASSWORD`, and `PROXMOX_INSECURE_TLS`.
    pub fn from_env() -> PveResult<Self> {
        let endpoint = env::var(ENV_ENDPOINT).map_err(|_| {
            PveError::from(ValidationError::Field {
                field: ENV_ENDPOINT.to_string(),
                message: "environment variable is required".to_string(),
            })
        })?;
        let credentials = Credentials::resolve(
            env::var(ENV_API_KEY).ok(),
            env::var(ENV_USERNAME).ok(),
            env::var(ENV_PASSWORD).ok(),
        )?;
        let mut options = Self::new(&endpoint, credentials)?;
        if let Ok(value) = env::var(ENV_INSECURE_TLS) {
            options.insecure_tls = matches!(value.as_str(), "1" | "true" | "yes");
        }
        Ok(options)
    }
}
