use serde::{Deserialize, Serialize};
use tandem_auth::AuthConfig;
use tandem_auth_redis::RedisConfig;

/// Top-level server configuration.
///
/// ```toml
/// [server]
/// port = 8080
///
/// [auth]
/// issuer = "https://auth.example.com"
/// slc_ttl = "15m"
///
/// [auth.signing]
/// secret = "change-me-to-at-least-32-bytes-long"
///
/// [[users]]
/// username = "alice"
/// subject_id = "42"
/// password_hash = "$argon2id$v=19$..."
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Shared credential store; the in-process store is used when disabled
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Accounts accepted by the login endpoint
    #[serde(default)]
    pub users: Vec<UserEntry>,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        if self.redis.enabled && self.redis.url.is_empty() {
            return Err("redis.enabled=true requires redis.url".into());
        }
        for user in &self.users {
            if user.username.is_empty() {
                return Err("users[].username cannot be empty".into());
            }
            if argon2::PasswordHash::new(&user.password_hash).is_err() {
                return Err(format!(
                    "users[{}].password_hash is not a PHC hash string",
                    user.username
                ));
            }
        }
        self.auth.validate().map_err(|e| format!("auth: {e}"))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
    /// How often expired entries are swept from the in-process store
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    64 * 1024
}
fn default_purge_interval_secs() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
            purge_interval_secs: default_purge_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// A login account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEntry {
    pub username: String,
    pub subject_id: String,
    /// Argon2 PHC string
    pub password_hash: String,
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Loads the configuration file (if it exists) and applies
    /// `TANDEM__SECTION__KEY` environment overrides.
    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or("tandem.toml"));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., TANDEM__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("TANDEM")
                .prefix_separator("__")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn valid() -> AppConfig {
        let mut config = AppConfig::default();
        config.auth.signing.secret = Some(SECRET.into());
        config
    }

    #[test]
    fn test_defaults_need_a_signing_secret() {
        assert!(AppConfig::default().validate().is_err());
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_log_level() {
        let mut config = valid();
        config.logging.level = "loud".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_non_phc_password_hash() {
        let mut config = valid();
        config.users.push(UserEntry {
            username: "alice".into(),
            subject_id: "42".into(),
            password_hash: "plaintext".into(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9091

[auth]
issuer = "https://auth.example.com"
slc_ttl = "5m"

[auth.signing]
secret = "{SECRET}"
"#
        )
        .unwrap();

        let config = loader::load_config(file.path().to_str()).unwrap();
        assert_eq!(config.server.port, 9091);
        assert_eq!(config.auth.issuer, "https://auth.example.com");
        assert_eq!(config.auth.slc_ttl, std::time::Duration::from_secs(300));
        assert!(!config.redis.enabled);
    }
}
