//! Server configuration.

use std::env;
use std::path::PathBuf;

use auth::{DEFAULT_JWT_EXPIRATION_HOURS, DEFAULT_RESET_TOKEN_MINUTES};

/// Signing secret used when none is configured in development.
const DEV_JWT_SECRET: &str = "taskboard-development-secret-change-me";

/// Default request body size cap (10 MiB).
const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Default per-file upload cap (10 MiB).
const DEFAULT_MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Deployment environment.
    pub environment: Environment,
    /// JWT signing secret.
    pub jwt_secret: String,
    /// Session token lifetime in hours.
    pub jwt_expiration_hours: u64,
    /// Password reset token lifetime in minutes.
    pub reset_token_minutes: u64,
    /// Allowed CORS origin. Any origin when unset.
    pub client_url: Option<String>,
    /// Request body size cap in bytes.
    pub max_body_bytes: usize,
    /// Directory uploaded files are written to.
    pub upload_path: PathBuf,
    /// Per-file upload cap in bytes.
    pub max_file_size: usize,
    /// Whether relay room joins require project access.
    pub relay_enforce_room_access: bool,
    /// Whether project access reports the stored membership role.
    pub surface_member_roles: bool,
    /// Argon2 memory cost override in KiB.
    pub password_memory_kib: Option<u32>,
    /// Log level.
    pub log_level: String,
    /// Log format.
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            environment: Environment::Development,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            jwt_expiration_hours: DEFAULT_JWT_EXPIRATION_HOURS,
            reset_token_minutes: DEFAULT_RESET_TOKEN_MINUTES,
            client_url: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            upload_path: PathBuf::from("./uploads"),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            relay_enforce_room_access: true,
            surface_member_roles: false,
            password_memory_kib: None,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let environment = match lookup("TASKBOARD_ENV").as_deref().map(str::trim) {
            None | Some("") | Some("development") => Environment::Development,
            Some("production") => Environment::Production,
            Some(other) => anyhow::bail!("TASKBOARD_ENV must be development or production, got {other}"),
        };

        let jwt_secret = match lookup("TASKBOARD_JWT_SECRET").filter(|s| !s.is_empty()) {
            Some(secret) => secret,
            None if environment == Environment::Production => {
                anyhow::bail!("TASKBOARD_JWT_SECRET is required in production")
            }
            None => defaults.jwt_secret.clone(),
        };

        let log_format = match lookup("TASKBOARD_LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            host: lookup("TASKBOARD_SERVER_HOST").unwrap_or(defaults.host),
            port: lookup("TASKBOARD_SERVER_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            environment,
            jwt_secret,
            jwt_expiration_hours: lookup("TASKBOARD_JWT_EXPIRATION_HOURS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.jwt_expiration_hours),
            reset_token_minutes: lookup("TASKBOARD_RESET_TOKEN_MINUTES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.reset_token_minutes),
            client_url: lookup("TASKBOARD_CLIENT_URL").filter(|s| !s.is_empty()),
            max_body_bytes: lookup("TASKBOARD_MAX_BODY_BYTES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_body_bytes),
            upload_path: lookup("TASKBOARD_UPLOAD_PATH")
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_path),
            max_file_size: lookup("TASKBOARD_MAX_FILE_SIZE")
                .and_then(|v| v.parse().ok())
                .filter(|size| *size > 0)
                .unwrap_or(defaults.max_file_size),
            relay_enforce_room_access: lookup("TASKBOARD_RELAY_ENFORCE_ROOM_ACCESS")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.relay_enforce_room_access),
            surface_member_roles: lookup("TASKBOARD_SURFACE_MEMBER_ROLES")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.surface_member_roles),
            password_memory_kib: lookup("TASKBOARD_PASSWORD_MEMORY_KIB")
                .and_then(|v| v.parse().ok()),
            log_level: lookup("TASKBOARD_LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format,
        })
    }

    /// Returns the server address.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns true when running in development mode.
    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();

        assert!(config.is_development());
        assert_eq!(config.port, 5000);
        assert_eq!(config.jwt_expiration_hours, 168);
        assert_eq!(config.reset_token_minutes, 60);
        assert_eq!(config.max_body_bytes, 10 * 1024 * 1024);
        assert!(config.relay_enforce_room_access);
        assert!(!config.surface_member_roles);
        assert_eq!(config.upload_path, PathBuf::from("./uploads"));
        assert_eq!(config.max_file_size, 10 * 1024 * 1024);
        assert_eq!(config.server_addr(), "0.0.0.0:5000");
    }

    #[test]
    fn test_production_requires_secret() {
        let result = Config::from_lookup(lookup(&[("TASKBOARD_ENV", "production")]));
        assert!(result.is_err());

        let config = Config::from_lookup(lookup(&[
            ("TASKBOARD_ENV", "production"),
            ("TASKBOARD_JWT_SECRET", "prod-secret"),
        ]))
        .unwrap();
        assert!(!config.is_development());
        assert_eq!(config.jwt_secret, "prod-secret");
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("TASKBOARD_SERVER_PORT", "8080"),
            ("TASKBOARD_RELAY_ENFORCE_ROOM_ACCESS", "false"),
            ("TASKBOARD_SURFACE_MEMBER_ROLES", "1"),
            ("TASKBOARD_LOG_FORMAT", "json"),
            ("TASKBOARD_CLIENT_URL", "http://localhost:3000"),
            ("TASKBOARD_UPLOAD_PATH", "/var/lib/taskboard/files"),
            ("TASKBOARD_MAX_FILE_SIZE", "1048576"),
        ]))
        .unwrap();

        assert_eq!(config.upload_path, PathBuf::from("/var/lib/taskboard/files"));
        assert_eq!(config.max_file_size, 1024 * 1024);

        assert_eq!(config.port, 8080);
        assert!(!config.relay_enforce_room_access);
        assert!(config.surface_member_roles);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.client_url.as_deref(), Some("http://localhost:3000"));
    }

    #[test]
    fn test_unknown_environment() {
        assert!(Config::from_lookup(lookup(&[("TASKBOARD_ENV", "staging")])).is_err());
    }
}
