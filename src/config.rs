use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub kbgraph: KbgraphConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
}

/// Core settings
#[derive(Debug, Clone, Deserialize)]
pub struct KbgraphConfig {
    pub db_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,
}

/// SQLite tuning
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// How long a writer waits on a locked database before giving up.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
            allowed_origins: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_http_host() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    3000
}

const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace", "off"];

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in KBGRAPH_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        let _ = dotenv::dotenv();

        let config_path = std::env::var("KBGRAPH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        Self::from_file(&config_path)
    }

    /// Parse and validate a specific config file
    pub fn from_file(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.kbgraph.db_path.as_os_str().is_empty() {
            anyhow::bail!("kbgraph.db_path must not be empty");
        }

        if !LOG_LEVELS.contains(&self.kbgraph.log_level.to_lowercase().as_str()) {
            anyhow::bail!(
                "kbgraph.log_level must be one of {:?}, got {}",
                LOG_LEVELS,
                self.kbgraph.log_level
            );
        }

        if self.database.busy_timeout_ms == 0 {
            anyhow::bail!("database.busy_timeout_ms must be greater than 0");
        }

        if self.http_server.port == 0 {
            anyhow::bail!("http_server.port must be greater than 0");
        }

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.kbgraph.db_path
    }

    /// Get migrations directory
    pub fn migrations_dir(&self) -> &Path {
        &self.kbgraph.migrations_dir
    }

    /// Address the HTTP server binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.http_server.host, self.http_server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize config tests that mutate process-wide env so they don't race.
    static CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

    fn write_config(temp_dir: &TempDir, body: &str) -> PathBuf {
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_config_full() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(
            &temp_dir,
            r#"
[kbgraph]
db_path = "./kb.db"
log_level = "debug"
migrations_dir = "./sql"

[database]
busy_timeout_ms = 250

[http_server]
host = "0.0.0.0"
port = 8088
allowed_origins = ["http://localhost:5173"]
"#,
        );

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.kbgraph.log_level, "debug");
        assert_eq!(config.db_path(), Path::new("./kb.db"));
        assert_eq!(config.migrations_dir(), Path::new("./sql"));
        assert_eq!(config.database.busy_timeout_ms, 250);
        assert_eq!(config.bind_addr(), "0.0.0.0:8088");
        assert_eq!(config.http_server.allowed_origins.len(), 1);
    }

    #[test]
    fn test_config_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, "[kbgraph]\ndb_path = \"kb.db\"\n");

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.kbgraph.log_level, "info");
        assert_eq!(config.migrations_dir(), Path::new("migrations"));
        assert_eq!(config.database.busy_timeout_ms, 5000);
        assert_eq!(config.bind_addr(), "127.0.0.1:3000");
        assert!(config.http_server.allowed_origins.is_empty());
    }

    #[test]
    fn test_config_rejects_bad_log_level() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(
            &temp_dir,
            "[kbgraph]\ndb_path = \"kb.db\"\nlog_level = \"loud\"\n",
        );

        let err = Config::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn test_config_rejects_zero_timeout() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(
            &temp_dir,
            "[kbgraph]\ndb_path = \"kb.db\"\n\n[database]\nbusy_timeout_ms = 0\n",
        );

        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn test_config_load_from_env_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, "[kbgraph]\ndb_path = \"env.db\"\n");

        let original = std::env::var("KBGRAPH_CONFIG").ok();
        std::env::set_var("KBGRAPH_CONFIG", &path);
        let config = Config::load();
        std::env::remove_var("KBGRAPH_CONFIG");
        if let Some(v) = original {
            std::env::set_var("KBGRAPH_CONFIG", v);
        }

        assert_eq!(config.unwrap().db_path(), Path::new("env.db"));
    }

    #[test]
    fn test_config_invalid_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let original = std::env::var("KBGRAPH_CONFIG").ok();
        std::env::set_var("KBGRAPH_CONFIG", "nonexistent.toml");
        let config = Config::load();
        std::env::remove_var("KBGRAPH_CONFIG");
        if let Some(v) = original {
            std::env::set_var("KBGRAPH_CONFIG", v);
        }
        assert!(config.is_err());
    }
}
