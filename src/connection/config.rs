use crate::core::{DbError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Script run by `create_tables` when none is configured.
pub const DEFAULT_BOOTSTRAP_SCRIPT: &str = "create_tables.sql";

/// Connection source configuration
///
/// Consumed once when the pool is built. Mirrors the classic
/// `db_driver` / `db_user` / `db_password` / `db_uri` property set.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Driver identity, resolved through the driver table
    pub driver: String,

    /// Username for authentication
    pub username: String,

    /// Password for authentication
    pub password: String,

    /// Target resource address (`:memory:` or a database file path for sqlite)
    pub uri: String,

    /// Upper bound on concurrently outstanding connections
    pub max_active: usize,

    /// Idle connections the driver keeps warm
    pub min_idle: usize,

    /// How long `acquire` waits for a free slot
    pub connect_timeout: Duration,

    /// Schema-creation script
    pub bootstrap_script: PathBuf,

    /// Directory for file attachments
    pub file_path: Option<PathBuf>,
}

impl ConnectionConfig {
    /// Create a new configuration for the given driver and uri
    pub fn new(driver: &str, uri: &str) -> Self {
        Self {
            driver: driver.to_string(),
            username: String::new(),
            password: String::new(),
            uri: uri.to_string(),
            max_active: 8,
            min_idle: 0,
            connect_timeout: Duration::from_secs(30),
            bootstrap_script: PathBuf::from(DEFAULT_BOOTSTRAP_SCRIPT),
            file_path: None,
        }
    }

    /// Set user credentials
    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.username = username.to_string();
        self.password = password.to_string();
        self
    }

    /// Set maximum outstanding connections
    pub fn max_active(mut self, max: usize) -> Self {
        self.max_active = max;
        self
    }

    /// Set minimum idle connections
    pub fn min_idle(mut self, min: usize) -> Self {
        self.min_idle = min;
        self
    }

    /// Set acquisition timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set bootstrap script path
    pub fn bootstrap_script(mut self, path: impl Into<PathBuf>) -> Self {
        self.bootstrap_script = path.into();
        self
    }

    /// Set attachment directory
    pub fn file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Parse a TOML document
    ///
    /// # Examples
    ///
    /// ```
    /// use txsession::ConnectionConfig;
    ///
    /// let config = ConnectionConfig::from_toml_str(r#"
    ///     db_driver = "sqlite"
    ///     db_uri = ":memory:"
    ///     max_active = 4
    /// "#).unwrap();
    /// assert_eq!(config.max_active, 4);
    /// ```
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(text).map_err(|e| DbError::Config(e.to_string()))?;
        let config = file.into_config();
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Render for logs, without the password
    pub fn redacted(&self) -> String {
        format!(
            "{}://{}:{}@{} (max_active={})",
            self.driver,
            self.username,
            "***",
            self.uri,
            self.max_active
        )
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.driver.is_empty() {
            return Err(DbError::Config("driver cannot be empty".into()));
        }

        if self.uri.is_empty() {
            return Err(DbError::Config("uri cannot be empty".into()));
        }

        if self.max_active == 0 {
            return Err(DbError::Config("max_active must be > 0".into()));
        }

        if u32::try_from(self.max_active).is_err() {
            return Err(DbError::Config(format!(
                "max_active cannot exceed {}",
                u32::MAX
            )));
        }

        if self.min_idle > self.max_active {
            return Err(DbError::Config("min_idle cannot exceed max_active".into()));
        }

        if self.connect_timeout.is_zero() {
            return Err(DbError::Config("connect_timeout must be > 0".into()));
        }

        Ok(())
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new("sqlite", ":memory:")
    }
}

/// On-disk shape; legacy property names are accepted as aliases.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(alias = "db_driver")]
    driver: String,
    #[serde(default, alias = "db_user")]
    username: String,
    #[serde(default, alias = "db_password")]
    password: String,
    #[serde(alias = "db_uri")]
    uri: String,
    max_active: Option<usize>,
    min_idle: Option<usize>,
    connect_timeout_ms: Option<u64>,
    bootstrap_script: Option<PathBuf>,
    #[serde(alias = "db_filepath")]
    file_path: Option<PathBuf>,
}

impl ConfigFile {
    fn into_config(self) -> ConnectionConfig {
        let mut config = ConnectionConfig::new(&self.driver, &self.uri)
            .credentials(&self.username, &self.password);
        if let Some(max) = self.max_active {
            config.max_active = max;
        }
        if let Some(min) = self.min_idle {
            config.min_idle = min;
        }
        if let Some(ms) = self.connect_timeout_ms {
            config.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(script) = self.bootstrap_script {
            config.bootstrap_script = script;
        }
        config.file_path = self.file_path;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.driver, "sqlite");
        assert_eq!(config.uri, ":memory:");
        assert_eq!(config.bootstrap_script, PathBuf::from(DEFAULT_BOOTSTRAP_SCRIPT));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = ConnectionConfig::new("memory", "scripted")
            .credentials("user", "pass")
            .max_active(20)
            .min_idle(2)
            .bootstrap_script("schema/init.sql");

        assert_eq!(config.username, "user");
        assert_eq!(config.max_active, 20);
        assert_eq!(config.min_idle, 2);
        assert_eq!(config.bootstrap_script, PathBuf::from("schema/init.sql"));
    }

    #[test]
    fn test_from_toml_legacy_keys() {
        let config = ConnectionConfig::from_toml_str(
            r#"
            db_driver = "sqlite"
            db_user = "alice"
            db_password = "secret"
            db_uri = "/var/lib/app/data.db"
            db_filepath = "/var/lib/app/files"
            connect_timeout_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.username, "alice");
        assert_eq!(config.password, "secret");
        assert_eq!(config.uri, "/var/lib/app/data.db");
        assert_eq!(config.connect_timeout, Duration::from_millis(250));
        assert_eq!(config.file_path, Some(PathBuf::from("/var/lib/app/files")));
        assert_eq!(config.max_active, 8);
    }

    #[test]
    fn test_from_toml_rejects_invalid() {
        assert!(ConnectionConfig::from_toml_str("driver = \"sqlite\"").is_err());
        assert!(matches!(
            ConnectionConfig::from_toml_str("driver = \"sqlite\"\nuri = \"x\"\nmax_active = 0"),
            Err(DbError::Config(_))
        ));
    }

    #[test]
    fn test_from_toml_rejects_zero_timeout() {
        let result = ConnectionConfig::from_toml_str(
            "db_driver = \"sqlite\"\ndb_uri = \":memory:\"\nconnect_timeout_ms = 0",
        );
        assert!(matches!(result, Err(DbError::Config(message)) if message.contains("connect_timeout")));
    }

    #[test]
    fn test_validate() {
        assert!(ConnectionConfig::new("", ":memory:").validate().is_err());
        assert!(ConnectionConfig::new("sqlite", "").validate().is_err());
        assert!(ConnectionConfig::default().max_active(0).validate().is_err());
        assert!(
            ConnectionConfig::default()
                .min_idle(10)
                .max_active(5)
                .validate()
                .is_err()
        );
        assert!(
            ConnectionConfig::default()
                .connect_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            ConnectionConfig::default()
                .max_active(u32::MAX as usize + 1)
                .validate()
                .is_err()
        );
        assert!(
            ConnectionConfig::default()
                .max_active(u32::MAX as usize)
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_redacted_hides_password() {
        let config = ConnectionConfig::default().credentials("alice", "secret123");
        let text = config.redacted();
        assert!(!text.contains("secret123"));
        assert!(text.contains("***"));
    }
}
