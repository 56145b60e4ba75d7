//! Defines all configuration structures for the Orizon engine.
//!
//! These structs are designed to be deserialized from a configuration file
//! (e.g., a TOML file) using `serde`. This allows the engine's behavior,
//! including its sampling cadence, timezone, and audio preferences, to be
//! defined externally from the application code. Every field carries a
//! default so a missing or partial file still yields a runnable engine.

use serde::Deserialize;

/// The top-level configuration for the [`crate::engine::OrizonEngine`].
///
/// This struct is the entry point for all engine settings. It is typically
/// loaded from a TOML file at application startup via [`OrizonConfig::load`],
/// and updated at runtime only through discrete `settingChanged` bus
/// messages, never through ambient shared state.
#[derive(Debug, Clone, Deserialize)]
pub struct OrizonConfig {
    /// The sampling cadence the scheduler starts in.
    #[serde(default)]
    pub cadence: CadenceMode,

    /// The timezone the engine samples time in. Uses IANA Time Zone Database
    /// names (e.g., "America/New_York"), or `"local"` for host-local time.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Target frame period, in milliseconds, for the `Active` cadence.
    #[serde(default = "default_frame_millis")]
    pub frame_millis: u64,

    /// Audio cue preferences.
    #[serde(default)]
    pub audio: AudioConfig,

    /// Event bus diagnostics.
    #[serde(default)]
    pub bus: BusConfig,
}

/// Defines the operational rate of the time sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CadenceMode {
    /// One cycle per frame (~60 Hz). Suitable for smooth sweeping hands.
    #[default]
    Active,
    /// At most one cycle per second. Suitable for battery-constrained hosts.
    PowerSaver,
}

/// Preferences for the audio cue pipeline.
///
/// All three enable flags default to off: cue emission requires an explicit
/// opt-in plus the backend's one-time unlock gesture.
#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    /// Master audio switch. When off, cues are computed but never published.
    #[serde(default)]
    pub enabled: bool,

    /// Emit a `Tick` cue on every second boundary.
    #[serde(default)]
    pub tick_enabled: bool,

    /// Emit a `Chime` cue on every hour boundary.
    #[serde(default)]
    pub chime_enabled: bool,

    /// Minimum spacing between two `Tick` cues, guarding against an
    /// artificially high sampling cadence retriggering within one physical
    /// tick duration.
    #[serde(default = "default_tick_cooldown_millis")]
    pub tick_cooldown_millis: u64,
}

/// Diagnostic knobs for the event bus.
#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    /// Listener count per topic above which the bus logs a one-time leak
    /// warning. Diagnostic only, never an error.
    #[serde(default = "default_max_listeners")]
    pub max_listeners: usize,
}

// --- Default value functions for serde ---

fn default_timezone() -> String {
    "local".to_string()
}

fn default_frame_millis() -> u64 {
    16
}

fn default_tick_cooldown_millis() -> u64 {
    50
}

fn default_max_listeners() -> usize {
    10
}

impl Default for OrizonConfig {
    fn default() -> Self {
        Self {
            cadence: CadenceMode::default(),
            timezone: default_timezone(),
            frame_millis: default_frame_millis(),
            audio: AudioConfig::default(),
            bus: BusConfig::default(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tick_enabled: false,
            chime_enabled: false,
            tick_cooldown_millis: default_tick_cooldown_millis(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_listeners: default_max_listeners(),
        }
    }
}

impl OrizonConfig {
    /// Loads configuration from an optional TOML file plus `ORIZON_`-prefixed
    /// environment variables (nested keys separated by `__`).
    ///
    /// A missing file is not an error; defaults fill every absent field.
    pub fn load(name: &str) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(name).required(false))
            .add_source(config::Environment::with_prefix("ORIZON").separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_conservative() {
        let config = OrizonConfig::default();
        assert_eq!(config.cadence, CadenceMode::Active);
        assert_eq!(config.timezone, "local");
        assert!(!config.audio.enabled);
        assert!(!config.audio.tick_enabled);
        assert!(!config.audio.chime_enabled);
        assert_eq!(config.bus.max_listeners, 10);
    }

    #[test]
    fn partial_toml_fills_remaining_fields_with_defaults() {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(
                "cadence = \"powersaver\"\ntimezone = \"Asia/Karachi\"",
                config::FileFormat::Toml,
            ))
            .build()
            .expect("inline config builds");
        let parsed: OrizonConfig = settings.try_deserialize().expect("inline config deserializes");
        assert_eq!(parsed.cadence, CadenceMode::PowerSaver);
        assert_eq!(parsed.timezone, "Asia/Karachi");
        assert_eq!(parsed.audio.tick_cooldown_millis, 50);
        assert_eq!(parsed.frame_millis, 16);
    }
}
