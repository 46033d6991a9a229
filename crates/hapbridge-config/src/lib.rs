//! Configuration for the hapbridge binary.
//!
//! A TOML file with a `[bridge]` section and any number of
//! `[[accessories]]`, merged with `HAPBRIDGE_`-prefixed environment
//! variables, and translated to `hapbridge_core::BridgeConfig`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hapbridge_core::{Accessory, BridgeConfig, CoreError, Username, validate_pincode};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl From<CoreError> for ConfigError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Validation {
                field: "bridge".into(),
                reason: other.to_string(),
            },
        }
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub bridge: BridgeSection,

    /// Accessories admitted at startup.
    #[serde(default)]
    pub accessories: Vec<Accessory>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct BridgeSection {
    #[serde(default = "default_name")]
    pub name: String,

    /// MAC-style network identity, e.g. `CC:22:3D:E3:CE:30`.
    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default = "default_pin")]
    pub pin: String,

    /// Directory for identity records. Defaults to the platform data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<PathBuf>,

    /// Quiescent window for configuration updates.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            name: default_name(),
            username: default_username(),
            pin: default_pin(),
            storage_path: None,
            debounce_ms: default_debounce_ms(),
            manufacturer: None,
            model: None,
        }
    }
}

fn default_name() -> String {
    "hapbridge".into()
}
fn default_username() -> String {
    "CC:22:3D:E3:CE:30".into()
}
fn default_pin() -> String {
    hapbridge_core::config::DEFAULT_PINCODE.into()
}
fn default_debounce_ms() -> u64 {
    1000
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("io", "hapbridge", "hapbridge")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Default directory for persisted identity records.
pub fn default_storage_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("persist"),
        |dirs| dirs.data_dir().join("persist"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("hapbridge");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Defaults, then the TOML file at `path`, then `HAPBRIDGE_*` variables
/// (`HAPBRIDGE_BRIDGE__PIN` sets `bridge.pin`).
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("HAPBRIDGE_").split("__"))
}

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = figment(path).extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

/// Build a validated `BridgeConfig` from the `[bridge]` section.
pub fn to_bridge_config(cfg: &Config) -> Result<BridgeConfig, ConfigError> {
    let section = &cfg.bridge;
    let username = Username::parse(&section.username)?;
    validate_pincode(&section.pin)?;
    if section.debounce_ms == 0 {
        return Err(ConfigError::Validation {
            field: "debounce_ms".into(),
            reason: "must be greater than zero".into(),
        });
    }

    let mut bridge = BridgeConfig::new(section.name.clone(), username);
    bridge.pincode.clone_from(&section.pin);
    bridge.update_window = Duration::from_millis(section.debounce_ms);
    bridge.storage_path = Some(
        section
            .storage_path
            .clone()
            .unwrap_or_else(default_storage_path),
    );
    if let Some(manufacturer) = &section.manufacturer {
        bridge.manufacturer.clone_from(manufacturer);
    }
    if let Some(model) = &section.model {
        bridge.model.clone_from(model);
    }
    bridge.validate()?;
    Ok(bridge)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use hapbridge_core::{Category, ServiceKind};

    fn parse(toml: &str) -> Config {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string(toml))
            .extract()
            .unwrap()
    }

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = parse("");
        assert_eq!(cfg.bridge.name, "hapbridge");
        assert_eq!(cfg.bridge.debounce_ms, 1000);
        assert!(cfg.accessories.is_empty());
    }

    #[test]
    fn parses_bridge_and_accessories() {
        let cfg = parse(
            r#"
            [bridge]
            name = "Attic"
            username = "aa-bb-cc-dd-ee-ff"
            pin = "123-45-679"
            debounce_ms = 250

            [[accessories]]
            uuid = "tv-1"
            name = "Living Room TV"
            external = true
            groups = ["den"]

            [[accessories.services]]
            kind = "Television"

            [[accessories]]
            uuid = "lamp-1"
            name = "Lamp"
            category = "lightbulb"

            [[accessories.services]]
            kind = "Lightbulb"
            characteristics = [{ kind = "On", value = false }]
            "#,
        );

        assert_eq!(cfg.accessories.len(), 2);
        let tv = &cfg.accessories[0];
        assert!(tv.external);
        assert!(tv.groups.contains("den"));
        assert_eq!(tv.services[0].kind, ServiceKind::Television);
        assert_eq!(cfg.accessories[1].category, Some(Category::Lightbulb));

        let bridge = to_bridge_config(&cfg).unwrap();
        assert_eq!(bridge.username.as_str(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(bridge.update_window, Duration::from_millis(250));
        assert_eq!(bridge.display_name, "Attic");
    }

    #[test]
    fn rejects_bad_username() {
        let cfg = parse("[bridge]\nusername = \"not-a-mac\"\n");
        let err = to_bridge_config(&cfg).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "username"));
    }

    #[test]
    fn rejects_trivial_pin() {
        let cfg = parse("[bridge]\npin = \"111-11-111\"\n");
        let err = to_bridge_config(&cfg).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "pincode"));
    }

    #[test]
    fn rejects_zero_debounce() {
        let cfg = parse("[bridge]\ndebounce_ms = 0\n");
        assert!(to_bridge_config(&cfg).is_err());
    }

    #[test]
    fn explicit_storage_path_is_kept() {
        let cfg = parse("[bridge]\nstorage_path = \"/var/lib/hapbridge\"\n");
        let bridge = to_bridge_config(&cfg).unwrap();
        assert_eq!(bridge.storage_path, Some(PathBuf::from("/var/lib/hapbridge")));
    }

    #[test]
    fn save_then_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config::default();
        cfg.bridge.name = "Garage".into();
        save_config_to(&cfg, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.bridge.name, "Garage");
    }
}
