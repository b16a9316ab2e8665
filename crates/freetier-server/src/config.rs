//! Server configuration, read once at startup from the environment.

use std::env;
use std::path::PathBuf;

use freetier_api::GithubConfig;
use freetier_db::CascadePolicy;

/// Values that must never be used as a signing secret.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "",
    "changeme",
    "change-me",
    "secret",
    "dev-secret-change-me",
    "your-secret-key",
    "your-secret-key-change-in-production",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("{0} is set to a placeholder value; choose a real secret")]
    Placeholder(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    /// Signs session cookies and OAuth state. Defaults to the JWT secret.
    pub session_secret: String,
    /// `None` unless both client id and secret are set.
    pub github: Option<GithubConfig>,
    pub cascade: CascadePolicy,
    /// Mark cookies `Secure`. Disable only for local plain-HTTP development.
    pub secure_cookies: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a config from any variable source.
    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str, default: &str| get(name).unwrap_or_else(|| default.to_string());

        let port_raw = var("FREETIER_PORT", "5050");
        let port = port_raw.parse().map_err(|_| ConfigError::Invalid {
            name: "FREETIER_PORT",
            value: port_raw.clone(),
        })?;

        let jwt_secret = get("FREETIER_JWT_SECRET").ok_or(ConfigError::Missing("FREETIER_JWT_SECRET"))?;
        check_secret("FREETIER_JWT_SECRET", &jwt_secret)?;

        let session_secret = match get("FREETIER_SESSION_SECRET") {
            Some(secret) => {
                check_secret("FREETIER_SESSION_SECRET", &secret)?;
                secret
            }
            None => jwt_secret.clone(),
        };

        let github = match (
            get("FREETIER_GITHUB_CLIENT_ID").filter(|v| !v.is_empty()),
            get("FREETIER_GITHUB_CLIENT_SECRET").filter(|v| !v.is_empty()),
        ) {
            (Some(client_id), Some(client_secret)) => Some(GithubConfig {
                client_id,
                client_secret: client_secret.trim().to_string(),
                callback_url: var(
                    "FREETIER_GITHUB_CALLBACK_URL",
                    "http://localhost:5050/auth/github/callback",
                ),
            }),
            _ => None,
        };

        let flag_var = |name: &'static str, default: &str| flag(name, var(name, default));

        let cascade = if flag_var("FREETIER_CASCADE_ON_DELETE", "false")? {
            CascadePolicy::Cascade
        } else {
            CascadePolicy::Orphan
        };
        let secure_cookies = flag_var("FREETIER_SECURE_COOKIES", "true")?;

        Ok(Self {
            host: var("FREETIER_HOST", "0.0.0.0"),
            port,
            db_path: PathBuf::from(var("FREETIER_DB_PATH", "freetier.db")),
            jwt_secret,
            session_secret,
            github,
            cascade,
            secure_cookies,
        })
    }
}

fn flag(name: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid { name, value }),
    }
}

fn check_secret(name: &'static str, value: &str) -> Result<(), ConfigError> {
    if PLACEHOLDER_SECRETS.contains(&value.trim()) {
        return Err(ConfigError::Placeholder(name));
    }
    Ok(())
}
