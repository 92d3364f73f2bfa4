//! Configuration vault – reads/writes `~/.botcore/config.toml`.
//!
//! Every field has a serde default, so an empty file (or none at all) is a
//! valid configuration.  A typical file:
//!
//! ```toml
//! tick_hz = 30
//! max_ticks = 900
//! seed_scene = "tipped"
//! priorities = ["admire_stack", "flip_block", "stack_blocks", "look_around"]
//!
//! [behaviors.flip_block]
//! face_preference = "farthest"
//! max_retries = 1
//!
//! [sim]
//! command_ticks = 5
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use botcore_hal::{Scene, SimConfig};
use botcore_types::BehaviorConfig;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Timing of the simulated robot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SimSettings {
    /// Control ticks a motion or interaction command takes.
    #[serde(default = "default_command_ticks")]
    pub command_ticks: u32,

    /// Control ticks an animation takes.
    #[serde(default = "default_animation_ticks")]
    pub animation_ticks: u32,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            command_ticks: default_command_ticks(),
            animation_ticks: default_animation_ticks(),
        }
    }
}

impl SimSettings {
    pub fn to_sim_config(&self) -> SimConfig {
        SimConfig {
            command_ticks: self.command_ticks,
            animation_ticks: self.animation_ticks,
            ..SimConfig::default()
        }
    }
}

/// Persisted run configuration stored in `~/.botcore/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    /// Control loop frequency.
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,

    /// Stop after this many ticks; `0` runs until Ctrl-C.
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u64,

    /// Starting layout of the simulated robot.
    #[serde(default = "default_scene")]
    pub seed_scene: String,

    /// Behaviors to register, highest priority first.  Empty registers every
    /// stock behavior in its default order.
    #[serde(default)]
    pub priorities: Vec<String>,

    /// Per-behavior settings keyed by behavior name.
    #[serde(default)]
    pub behaviors: BTreeMap<String, BehaviorConfig>,

    #[serde(default)]
    pub sim: SimSettings,
}

fn default_tick_hz() -> u32 {
    30
}
fn default_max_ticks() -> u64 {
    900
}
fn default_scene() -> String {
    Scene::default().to_string()
}
fn default_command_ticks() -> u32 {
    SimConfig::default().command_ticks
}
fn default_animation_ticks() -> u32 {
    SimConfig::default().animation_ticks
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_hz: default_tick_hz(),
            max_ticks: default_max_ticks(),
            seed_scene: default_scene(),
            priorities: Vec::new(),
            behaviors: BTreeMap::new(),
            sim: SimSettings::default(),
        }
    }
}

impl Config {
    /// The parsed starting scene.
    pub fn scene(&self) -> Result<Scene, String> {
        self.seed_scene.parse().map_err(|e| format!("{e}"))
    }

    /// Reject values the control loop cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_hz == 0 || self.tick_hz > 1000 {
            return Err(format!("tick_hz must be between 1 and 1000, got {}", self.tick_hz));
        }
        self.scene()?;
        Ok(())
    }
}

/// Return the path to `~/.botcore/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".botcore").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path, with environment overrides applied.
pub fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `BOTCORE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `BOTCORE_TICK_HZ` | `tick_hz` |
/// | `BOTCORE_MAX_TICKS` | `max_ticks` |
/// | `BOTCORE_SCENE` | `seed_scene` |
///
/// Unparseable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("BOTCORE_TICK_HZ")
        && let Ok(hz) = v.parse::<u32>()
    {
        cfg.tick_hz = hz;
    }
    if let Ok(v) = std::env::var("BOTCORE_MAX_TICKS")
        && let Ok(ticks) = v.parse::<u64>()
    {
        cfg.max_ticks = ticks;
    }
    if let Ok(v) = std::env::var("BOTCORE_SCENE") {
        cfg.seed_scene = v;
    }
}

/// Save the config to disk, creating `~/.botcore/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

/// JSON schema of [`Config`], pretty-printed.
pub fn schema_json() -> Result<String, String> {
    let schema = schemars::schema_for!(Config);
    serde_json::to_string_pretty(&schema).map_err(|e| format!("Failed to render schema: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_the_default_config() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg, Config::default());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn behavior_tables_become_behavior_configs() {
        let cfg: Config = toml::from_str(
            r#"
            priorities = ["flip_block", "look_around"]

            [behaviors.flip_block]
            face_preference = "farthest"
            max_retries = 1
            "#,
        )
        .unwrap();
        let flip = &cfg.behaviors["flip_block"];
        assert_eq!(flip.str_or("face_preference", "closest"), "farthest");
        assert_eq!(flip.u32_or("max_retries", 2), 1);
        assert_eq!(cfg.priorities, vec!["flip_block", "look_around"]);
    }

    #[test]
    fn validate_rejects_bad_scene_and_rate() {
        let cfg = Config {
            seed_scene: "moon".into(),
            ..Config::default()
        };
        assert!(cfg.validate().unwrap_err().contains("moon"));

        let cfg = Config {
            tick_hz: 0,
            ..Config::default()
        };
        assert!(cfg.validate().unwrap_err().contains("tick_hz"));
    }

    #[test]
    fn roundtrip_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let mut cfg = Config::default();
        cfg.seed_scene = "tipped".into();
        cfg.behaviors.insert(
            "look_around".into(),
            BehaviorConfig::default().with("sweeps", 2),
        );
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.seed_scene, "tipped");
        assert_eq!(loaded.behaviors["look_around"].u32_or("sweeps", 4), 2);
        assert_eq!(loaded.tick_hz, 30);
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .expect("dir metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn config_path_points_to_botcore_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.ends_with(".botcore/config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn env_overrides_apply_and_ignore_garbage() {
        // SAFETY: the only test touching these variables.
        unsafe {
            std::env::set_var("BOTCORE_TICK_HZ", "60");
            std::env::set_var("BOTCORE_MAX_TICKS", "not-a-number");
            std::env::set_var("BOTCORE_SCENE", "empty");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        unsafe {
            std::env::remove_var("BOTCORE_TICK_HZ");
            std::env::remove_var("BOTCORE_MAX_TICKS");
            std::env::remove_var("BOTCORE_SCENE");
        }
        assert_eq!(cfg.tick_hz, 60);
        assert_eq!(cfg.max_ticks, 900);
        assert_eq!(cfg.seed_scene, "empty");
    }

    #[test]
    fn schema_names_every_field() {
        let schema = schema_json().unwrap();
        for field in ["tick_hz", "max_ticks", "seed_scene", "priorities", "behaviors", "sim"] {
            assert!(schema.contains(field), "schema is missing {field}");
        }
    }
}
