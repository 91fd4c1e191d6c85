//! Configuration loading for swarmlink.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Get the swarmlink home directory (~/.swarmlink).
pub fn get_home_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(home.home_dir().join(".swarmlink"))
}

/// Get the settings file path.
pub fn get_settings_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("settings.json"))
}

/// Top-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Address the control-plane listener binds to.
    pub listen_addr: String,

    /// Registration credentials.
    pub auth: AuthSettings,

    /// Heartbeat sweep tuning.
    pub heartbeat: HeartbeatSettings,

    /// Dispatch timeout tuning.
    pub dispatch: DispatchSettings,

    /// Simulation engine tuning.
    pub simulation: SimulationSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:7600".to_string(),
            auth: AuthSettings::default(),
            heartbeat: HeartbeatSettings::default(),
            dispatch: DispatchSettings::default(),
            simulation: SimulationSettings::default(),
        }
    }
}

/// Registration credentials. With neither field set, any token is accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Shared token accepted from every agent.
    pub shared_token: Option<String>,

    /// Per-agent tokens; an entry here overrides the shared token.
    pub agent_tokens: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatSettings {
    /// Seconds between sweep passes.
    pub interval_secs: u64,

    /// Seconds of silence after which a connection is considered stale.
    pub timeout_secs: u64,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Default deadline for a dispatch, seconds.
    pub default_timeout_secs: u64,

    /// Seconds between timeout sweep passes.
    pub sweep_interval_secs: u64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            default_timeout_secs: 60,
            sweep_interval_secs: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Hard ceiling on ticks per `advance_ticks` call.
    pub tick_budget: u32,

    /// Lower bound for the auto-mode delay, milliseconds.
    pub auto_delay_min_ms: u64,

    /// Upper bound for the auto-mode delay, milliseconds.
    pub auto_delay_max_ms: u64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            tick_budget: 100,
            auto_delay_min_ms: 100,
            auto_delay_max_ms: 60_000,
        }
    }
}

/// Load settings from ~/.swarmlink/settings.json (or an explicit path).
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => get_settings_path()?,
    };

    if !path.exists() {
        return Err(Error::Config(format!(
            "Settings file not found at {}. Run 'swarmlink init' first.",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(&path)?;
    let settings: Settings = serde_json::from_str(&content)?;
    validate_settings(&settings)?;

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// Write settings to disk, creating parent directories as needed.
pub fn save_settings(settings: &Settings, path: &Path) -> Result<()> {
    validate_settings(settings)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(settings)?)?;

    tracing::info!("Wrote settings to {}", path.display());
    Ok(())
}

/// Reject settings that would misbehave at runtime.
pub fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.listen_addr.parse::<std::net::SocketAddr>().is_err() {
        return Err(Error::Config(format!(
            "listen_addr is not a valid socket address: {}",
            settings.listen_addr
        )));
    }
    if settings.heartbeat.interval_secs == 0 {
        return Err(Error::Config(
            "heartbeat.interval_secs must be positive".to_string(),
        ));
    }
    if settings.heartbeat.timeout_secs <= settings.heartbeat.interval_secs {
        return Err(Error::Config(
            "heartbeat.timeout_secs must exceed heartbeat.interval_secs".to_string(),
        ));
    }
    if settings.dispatch.default_timeout_secs == 0 {
        return Err(Error::Config(
            "dispatch.default_timeout_secs must be positive".to_string(),
        ));
    }
    if settings.simulation.tick_budget == 0 {
        return Err(Error::Config(
            "simulation.tick_budget must be positive".to_string(),
        ));
    }
    if settings.simulation.auto_delay_min_ms > settings.simulation.auto_delay_max_ms {
        return Err(Error::Config(
            "simulation.auto_delay_min_ms must not exceed auto_delay_max_ms".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert!(validate_settings(&settings).is_ok());
        assert_eq!(settings.heartbeat.timeout_secs, 30);
        assert_eq!(settings.simulation.tick_budget, 100);
    }

    #[test]
    fn rejects_inverted_heartbeat_windows() {
        let mut settings = Settings::default();
        settings.heartbeat.interval_secs = 30;
        settings.heartbeat.timeout_secs = 5;
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn rejects_bad_listen_addr() {
        let mut settings = Settings::default();
        settings.listen_addr = "not-an-addr".to_string();
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut settings = Settings::default();
        settings.auth.shared_token = Some("secret".to_string());
        save_settings(&settings, &path).unwrap();

        let loaded = load_settings(Some(&path)).unwrap();
        assert_eq!(loaded.auth.shared_token, Some("secret".to_string()));
        assert_eq!(loaded.listen_addr, settings.listen_addr);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        let err = load_settings(Some(&path)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
