//! API configuration and boot-time validation.
//!
//! Every check here is fatal: the server refuses to start rather than run
//! with a weak signing secret.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use chrono::{Duration, Utc};
use nexus_core::auth::jwt::{DEFAULT_TOKEN_TTL_SECS, DEV_PLACEHOLDER_SECRET, MIN_SECRET_LEN};
use nexus_core::auth::password::{BCRYPT_COST, MAX_BCRYPT_COST, MIN_BCRYPT_COST};
use nexus_core::auth::rate_limit::RateLimitConfig;
use thiserror::Error;

/// Configuration errors. Any of these aborts startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("NEXUS_JWT_SECRET or JWT_SECRET environment variable must be set")]
    MissingSecret,

    #[error("JWT secret must be at least 32 characters long (got {0})")]
    SecretTooShort(usize),

    #[error("JWT secret is the default development value")]
    PlaceholderSecret,

    #[error("production environment detected but JWT secret looks like a development value")]
    DevSecretInProduction,

    #[error("invalid token expiry '{0}': expected <n>[s|m|h|d]")]
    InvalidExpiry(String),

    #[error("invalid environment '{0}': expected development, production or test")]
    InvalidEnvironment(String),

    #[error("invalid login rate limit: {0}")]
    InvalidRateLimit(String),

    #[error("bcrypt cost must be between 4 and 31 (got {0})")]
    InvalidBcryptCost(u32),

    #[error("invalid trusted proxy address '{0}'")]
    InvalidTrustedProxy(String),
}

/// Runtime environment. Production turns on `Secure` cookies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            "test" => Ok(Environment::Test),
            _ => Err(ConfigError::InvalidEnvironment(s.to_string())),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Test => "test",
        })
    }
}

/// Unvalidated settings as read from the command line and environment.
#[derive(Debug, Clone, Default)]
pub struct RawConfig {
    pub jwt_secret: Option<String>,
    pub token_expiry: Option<String>,
    pub environment: Option<String>,
    pub login_max_attempts: Option<u32>,
    pub login_window_secs: Option<i64>,
    pub bcrypt_cost: Option<u32>,
    /// Comma-separated proxy addresses whose forwarding headers are believed.
    pub trusted_proxies: Option<String>,
}

/// Validated configuration for the API.
#[derive(Clone)]
pub struct ApiConfig {
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub environment: Environment,
    pub login_limit: RateLimitConfig,
    pub bcrypt_cost: u32,
    /// Peers allowed to report the client address via `X-Forwarded-For`
    /// or `X-Real-IP`. Empty means the socket peer is always the client.
    pub trusted_proxies: Vec<IpAddr>,
}

impl ApiConfig {
    /// Validate `raw`, applying defaults for everything except the secret.
    ///
    /// | Setting              | Default       |
    /// |----------------------|---------------|
    /// | token expiry         | `24h`         |
    /// | environment          | `development` |
    /// | login max attempts   | `5`           |
    /// | login window         | `900` seconds |
    /// | bcrypt cost          | `12`          |
    /// | trusted proxies      | none          |
    pub fn new(raw: RawConfig) -> Result<Self, ConfigError> {
        let environment = match raw.environment.as_deref() {
            Some(s) => s.parse()?,
            None => Environment::default(),
        };

        let jwt_secret = raw
            .jwt_secret
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingSecret)?;
        if jwt_secret.chars().count() < MIN_SECRET_LEN {
            return Err(ConfigError::SecretTooShort(jwt_secret.chars().count()));
        }
        if jwt_secret == DEV_PLACEHOLDER_SECRET {
            return Err(ConfigError::PlaceholderSecret);
        }
        if environment.is_production()
            && (jwt_secret.contains("dev") || jwt_secret.contains("default"))
        {
            return Err(ConfigError::DevSecretInProduction);
        }

        let token_ttl = match raw.token_expiry.as_deref() {
            Some(s) => {
                let ttl = parse_expiry(s)?;
                // Every token expiry must stay a representable timestamp.
                if Utc::now().checked_add_signed(ttl).is_none() {
                    return Err(ConfigError::InvalidExpiry(s.to_string()));
                }
                ttl
            }
            None => Duration::seconds(DEFAULT_TOKEN_TTL_SECS),
        };

        let defaults = RateLimitConfig::default();
        let max_attempts = raw.login_max_attempts.unwrap_or(defaults.max_attempts);
        if max_attempts == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "max attempts must be positive".into(),
            ));
        }
        let window = match raw.login_window_secs {
            Some(secs) if secs <= 0 => {
                return Err(ConfigError::InvalidRateLimit(
                    "window must be positive".into(),
                ));
            }
            Some(secs) => Duration::try_seconds(secs).ok_or_else(|| {
                ConfigError::InvalidRateLimit("window is out of range".into())
            })?,
            None => defaults.window,
        };

        let bcrypt_cost = raw.bcrypt_cost.unwrap_or(BCRYPT_COST);
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&bcrypt_cost) {
            return Err(ConfigError::InvalidBcryptCost(bcrypt_cost));
        }

        let trusted_proxies = match raw.trusted_proxies.as_deref() {
            Some(list) => parse_trusted_proxies(list)?,
            None => Vec::new(),
        };

        Ok(Self {
            jwt_secret,
            token_ttl,
            environment,
            login_limit: RateLimitConfig::new(window, max_attempts),
            bcrypt_cost,
            trusted_proxies,
        })
    }

    /// Cookie `Secure` attribute.
    pub fn secure_cookies(&self) -> bool {
        self.environment.is_production()
    }

    /// Cookie max-age, matching the token lifetime.
    pub fn cookie_max_age_secs(&self) -> i64 {
        self.token_ttl.num_seconds()
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl", &self.token_ttl)
            .field("environment", &self.environment)
            .field("login_limit", &self.login_limit)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("trusted_proxies", &self.trusted_proxies)
            .finish()
    }
}

/// Parse a lifetime such as `30m`, `24h` or `7d`. A bare number is seconds.
pub fn parse_expiry(s: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidExpiry(s.to_string());
    let s = s.trim();
    let (digits, unit) = match s.char_indices().last() {
        Some((i, c)) if c.is_ascii_alphabetic() => (&s[..i], c),
        Some(_) => (s, 's'),
        None => return Err(invalid()),
    };
    let n: i64 = digits.parse().map_err(|_| invalid())?;
    if n <= 0 {
        return Err(invalid());
    }
    let ttl = match unit {
        's' => Duration::try_seconds(n),
        'm' => Duration::try_minutes(n),
        'h' => Duration::try_hours(n),
        'd' => Duration::try_days(n),
        _ => None,
    };
    ttl.ok_or_else(invalid)
}

/// Parse a comma-separated list of IP addresses. Blank entries are skipped.
pub fn parse_trusted_proxies(list: &str) -> Result<Vec<IpAddr>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<IpAddr>()
                .map_err(|_| ConfigError::InvalidTrustedProxy(s.to_string()))
        })
        .collect()
}
