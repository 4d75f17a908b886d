//! TOML-based configuration persistence for a LanSync node.
//!
//! Reads and writes [`NodeConfig`] at the platform-appropriate location:
//! - Windows:  `%APPDATA%\LanSync\config.toml`
//! - Linux:    `$XDG_CONFIG_HOME/lansync/config.toml` (or `~/.config/lansync/`)
//! - macOS:    `~/Library/Application Support/LanSync/config.toml`
//!
//! A different file can be named on the command line with `--config`.
//!
//! # Example file
//!
//! ```toml
//! [server]
//! port = 5000
//! static_dir = "/opt/lansync/web"
//! upload_requires_auth = true
//!
//! [rendezvous]
//! url = "wss://tracker.example.net/ws"
//! node_name = "studio-desktop"
//!
//! [network]
//! adapter_denylist = ["virtual", "vmware", "wsl", "docker"]
//! ```
//!
//! # Serde default values
//!
//! Every field carries `#[serde(default = "...")]` and every section is
//! itself optional, so an empty file, a file from an older release, or no
//! file at all all produce a working configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use lansync_core::domain::auth::MAX_SESSIONS;
use lansync_core::domain::identity::DEFAULT_DENYLIST;
use lansync_core::Passcode;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The values parsed but are unusable together.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level node configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
    #[serde(default)]
    pub rendezvous: RendezvousConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Transfer server settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// IP address to bind.  `"0.0.0.0"` accepts connections on every interface.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// TCP port.  `0` lets the OS pick one.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory holding the browser client bundle.  Without it the static
    /// fallback answers 404.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<PathBuf>,
    /// Where uploads are written while they sit in the received list.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    /// Whether `POST /api/upload` needs a session.
    #[serde(default = "default_true")]
    pub upload_requires_auth: bool,
    /// Largest accepted upload body; unlimited when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_upload_bytes: Option<u64>,
}

/// Passcode and session policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
    /// Pin the passcode instead of drawing a random one at start-up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_passcode: Option<String>,
    /// Log every client out when the passcode rotates.
    #[serde(default)]
    pub revoke_sessions_on_rotate: bool,
    /// Most sessions held at once; the oldest is dropped beyond this.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

/// Presence tracking thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PresenceConfig {
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

/// Rendezvous channel settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RendezvousConfig {
    /// WebSocket URL of the rendezvous service.  Sync is disabled when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Human-readable name sent with every registration.
    #[serde(default = "default_node_name")]
    pub node_name: String,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,
    /// Publicly reachable URL handed out by an external tunnel, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
}

/// Local address selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// Adapter-name fragments that mark an interface as virtual.
    #[serde(default = "default_adapter_denylist")]
    pub adapter_denylist: Vec<String>,
    /// How often the LAN address is re-resolved.
    #[serde(default = "default_address_refresh_secs")]
    pub address_refresh_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    5000
}
fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("lansync-inbox")
}
fn default_true() -> bool {
    true
}
fn default_stale_after_secs() -> u64 {
    10
}
fn default_sweep_interval_secs() -> u64 {
    5
}
fn default_node_name() -> String {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .filter_map(|key| std::env::var_os(key))
        .map(|v| v.to_string_lossy().trim().to_string())
        .find(|v| !v.is_empty())
        .unwrap_or_else(|| "lansync-node".to_string())
}
fn default_backoff_base_ms() -> u64 {
    500
}
fn default_backoff_max_secs() -> u64 {
    30
}
fn default_adapter_denylist() -> Vec<String> {
    DEFAULT_DENYLIST.iter().map(|s| s.to_string()).collect()
}
fn default_max_sessions() -> usize {
    MAX_SESSIONS
}
fn default_address_refresh_secs() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            static_dir: None,
            scratch_dir: default_scratch_dir(),
            upload_requires_auth: default_true(),
            max_upload_bytes: None,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            fixed_passcode: None,
            revoke_sessions_on_rotate: false,
            max_sessions: default_max_sessions(),
        }
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self {
            url: None,
            node_name: default_node_name(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_secs: default_backoff_max_secs(),
            public_url: None,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            adapter_denylist: default_adapter_denylist(),
            address_refresh_secs: default_address_refresh_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl PresenceConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl NetworkConfig {
    pub fn address_refresh(&self) -> Duration {
        Duration::from_secs(self.address_refresh_secs)
    }
}

impl NodeConfig {
    /// Checks cross-field constraints that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when:
    /// - `stale_after_secs` or `sweep_interval_secs` is zero,
    /// - the sweep interval exceeds half the staleness threshold,
    /// - `fixed_passcode` is not exactly four digits,
    /// - the backoff base is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.presence;
        if p.stale_after_secs == 0 || p.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "presence thresholds must be at least one second".into(),
            ));
        }
        if p.sweep_interval_secs.saturating_mul(2) > p.stale_after_secs {
            return Err(ConfigError::Invalid(format!(
                "sweep_interval_secs ({}) must be at most half of stale_after_secs ({})",
                p.sweep_interval_secs, p.stale_after_secs
            )));
        }
        if let Some(code) = &self.auth.fixed_passcode {
            Passcode::parse(code)
                .map_err(|e| ConfigError::Invalid(format!("auth.fixed_passcode: {e}")))?;
        }
        if self.auth.max_sessions == 0 {
            return Err(ConfigError::Invalid("auth.max_sessions must be positive".into()));
        }
        if self.network.address_refresh_secs == 0 {
            return Err(ConfigError::Invalid(
                "network.address_refresh_secs must be positive".into(),
            ));
        }
        if self.rendezvous.backoff_base_ms == 0 {
            return Err(ConfigError::Invalid(
                "rendezvous.backoff_base_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads the config from the platform location, or defaults if it is absent.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<NodeConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `NodeConfig` from `path`, returning defaults if the file does not
/// exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<NodeConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(NodeConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `config` to the platform location.
///
/// # Errors
///
/// See [`save_config_to`].
pub fn save_config(config: &NodeConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_file_path()?)
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &NodeConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config base directory including the app subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("LanSync"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("lansync"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("LanSync")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
