//! Receiver configuration.
//!
//! Stored as TOML at `$SHADOWCLONE_CONFIG`, or by default:
//! - Linux: `~/.config/shadowclone/receiver.toml`
//! - Windows: `%APPDATA%/shadowclone/receiver.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use shadowclone_stream::{HeartbeatConfig, ReconnectPolicy, SessionConfig, StallAction};

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "SHADOWCLONE_CONFIG";

/// Receiver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the Shadow Clone server.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Explicit stream endpoint. Derived from `server_url` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,

    /// Where reports are saved. A leading `~` is the home directory.
    #[serde(default = "default_download_dir")]
    pub download_dir: String,

    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_interval_secs: u64,

    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_timeout_secs: u64,

    /// `reconnect` or `log_only`.
    #[serde(default)]
    pub stall_action: StallAction,

    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: f64,

    #[serde(default = "default_backoff_factor")]
    pub reconnect_backoff_factor: f64,

    #[serde(default = "default_reconnect_max_delay")]
    pub reconnect_max_delay_secs: f64,

    /// Unlimited when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect_max_attempts: Option<u32>,

    #[serde(default = "default_true")]
    pub refresh_token_on_reconnect: bool,

    /// Call the wake-up endpoint before the first login.
    #[serde(default)]
    pub wake_on_start: bool,
}

fn default_server_url() -> String {
    "http://127.0.0.1:5000".into()
}

fn default_download_dir() -> String {
    "~/Downloads".into()
}

fn default_heartbeat_secs() -> u64 {
    5
}

fn default_reconnect_delay() -> f64 {
    1.0
}

fn default_backoff_factor() -> f64 {
    1.0
}

fn default_reconnect_max_delay() -> f64 {
    30.0
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            stream_url: None,
            download_dir: default_download_dir(),
            heartbeat_interval_secs: default_heartbeat_secs(),
            heartbeat_timeout_secs: default_heartbeat_secs(),
            stall_action: StallAction::default(),
            reconnect_delay_secs: default_reconnect_delay(),
            reconnect_backoff_factor: default_backoff_factor(),
            reconnect_max_delay_secs: default_reconnect_max_delay(),
            reconnect_max_attempts: None,
            refresh_token_on_reconnect: default_true(),
            wake_on_start: false,
        }
    }
}

impl Config {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path()?)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            config.validate()?;
            tracing::debug!(path = %path.display(), "configuration loaded");
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        let secs = [
            ("reconnect_delay_secs", self.reconnect_delay_secs),
            ("reconnect_backoff_factor", self.reconnect_backoff_factor),
            ("reconnect_max_delay_secs", self.reconnect_max_delay_secs),
        ];
        for (name, value) in secs {
            if !value.is_finite() || value < 0.0 {
                anyhow::bail!("{name} must be a non-negative number, got {value}");
            }
        }
        if self.heartbeat_interval_secs == 0 {
            anyhow::bail!("heartbeat_interval_secs must be at least 1");
        }
        Ok(())
    }

    /// Session settings derived from this config.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            stream_url: self.stream_url.clone(),
            heartbeat: HeartbeatConfig {
                interval: Duration::from_secs(self.heartbeat_interval_secs),
                timeout: Duration::from_secs(self.heartbeat_timeout_secs),
                on_stall: self.stall_action,
            },
            reconnect: ReconnectPolicy {
                delay: secs_f64(self.reconnect_delay_secs),
                backoff_factor: self.reconnect_backoff_factor,
                max_delay: secs_f64(self.reconnect_max_delay_secs),
                max_attempts: self.reconnect_max_attempts,
            },
            refresh_token_on_reconnect: self.refresh_token_on_reconnect,
        }
    }

    /// Download directory with `~` expanded.
    pub fn download_path(&self) -> PathBuf {
        expand_home(&self.download_dir, home_dir().as_deref())
    }
}

fn secs_f64(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(windows)]
    let var = "USERPROFILE";
    #[cfg(not(windows))]
    let var = "HOME";
    std::env::var_os(var).map(PathBuf::from)
}

fn expand_home(path: &str, home: Option<&Path>) -> PathBuf {
    match (path.strip_prefix('~'), home) {
        (Some(""), Some(home)) => home.to_path_buf(),
        (Some(rest), Some(home)) if rest.starts_with(['/', '\\']) => home.join(&rest[1..]),
        _ => PathBuf::from(path),
    }
}

/// Returns the configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    if let Some(explicit) = std::env::var_os(CONFIG_ENV) {
        return Ok(PathBuf::from(explicit));
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata)
            .join("shadowclone")
            .join("receiver.toml"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = home_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
        Ok(home.join(".config").join("shadowclone").join("receiver.toml"))
    }
}
