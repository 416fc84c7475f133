//! Node configuration.
//!
//! Options are read from `config.toml` in the working directory (or the
//! file named by `LETTERED_CONFIG`), with environment variables taking
//! precedence over the file and compiled defaults filling the rest.

use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Display name everyone can see.
    pub alias: String,
    /// host:port peers dial to reach this node.
    pub hostname: String,
    /// Listen port of the P2P transport server.
    pub p2p_port: u16,
    /// Directory for the PEM files and the sqlite database.
    pub app_data_dir: PathBuf,
    pub management: ManagementConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManagementConfig {
    /// Listen port of the management HTTP API.
    pub port: u16,
    /// Password for logging in to the management console.
    pub password: String,
    /// Seconds a management session stays valid after login.
    pub session_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            alias: "Unnamed".to_string(),
            hostname: String::new(),
            p2p_port: 1926,
            app_data_dir: default_app_data_dir(),
            management: ManagementConfig::default(),
        }
    }
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            password: "letteradm".to_string(),
            session_timeout_secs: 3600,
        }
    }
}

fn default_app_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "lettered", "lettered")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Load config: defaults, then the config file (if present), then env
/// overrides.
pub fn load() -> Config {
    let path = std::env::var("LETTERED_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let mut config = load_file(&path).unwrap_or_default();

    if let Ok(value) = std::env::var("LETTERED_ALIAS") {
        config.alias = value;
    }
    if let Ok(value) = std::env::var("LETTERED_HOSTNAME") {
        config.hostname = value;
    }
    if let Ok(value) = std::env::var("LETTERED_P2P_PORT") {
        if let Ok(port) = value.parse::<u16>() {
            config.p2p_port = port;
        }
    }
    if let Ok(value) = std::env::var("LETTERED_APP_DATA_DIR") {
        config.app_data_dir = PathBuf::from(value);
    }

    config
}

fn load_file(path: &str) -> Option<Config> {
    let raw = fs::read_to_string(path).ok()?;
    match toml::from_str(&raw) {
        Ok(config) => Some(config),
        Err(err) => {
            tracing::warn!(path = %path, error = %err, "invalid config file, using defaults");
            None
        }
    }
}

/// Create the application data directory on first run. Only the owning
/// user may read it; it holds the TLS private key and the database.
pub fn ensure_data_dir(config: &Config) -> std::io::Result<()> {
    fs::create_dir_all(&config.app_data_dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&config.app_data_dir, fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}
