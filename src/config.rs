//! Runtime configuration loaded from `assets/tornado.toml`.
//!
//! Two layers:
//!
//! * [`ConfigStore`] is the sectioned key-value provider.  It keeps the raw
//!   TOML table so interactive tuning can write individual keys back and save
//!   the file without losing keys it does not know about.
//! * [`TornadoConfig`] is the typed snapshot injected into vortices and
//!   particles.  Every field defaults to the matching constant in
//!   [`crate::constants`], so a minimal TOML only needs the keys you want to
//!   change.
//!
//! ## Tuning workflow
//!
//! 1. Edit `assets/tornado.toml` (or use the in-game setters).
//! 2. Vortices pick up force changes within 5 s, particles within 10 s.
//! 3. `SimCommand::SaveConfig` writes the current table back to disk.

use std::fs;
use std::path::{Path, PathBuf};

use bevy::log::warn;
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{SimResult, TornadoError};

pub const DEFAULT_CONFIG_PATH: &str = "assets/tornado.toml";

// ── Typed values ──────────────────────────────────────────────────────────────

/// Types readable from the store with [`ConfigStore::get_value`].
pub trait ConfigValue: Sized {
    fn from_toml(value: &toml::Value) -> Option<Self>;
}

impl ConfigValue for bool {
    fn from_toml(value: &toml::Value) -> Option<Self> {
        value.as_bool()
    }
}

impl ConfigValue for i64 {
    fn from_toml(value: &toml::Value) -> Option<Self> {
        value.as_integer()
    }
}

impl ConfigValue for i32 {
    fn from_toml(value: &toml::Value) -> Option<Self> {
        value.as_integer().and_then(|v| i32::try_from(v).ok())
    }
}

impl ConfigValue for usize {
    fn from_toml(value: &toml::Value) -> Option<Self> {
        value.as_integer().and_then(|v| usize::try_from(v).ok())
    }
}

impl ConfigValue for f64 {
    fn from_toml(value: &toml::Value) -> Option<Self> {
        value
            .as_float()
            .or_else(|| value.as_integer().map(|v| v as f64))
    }
}

impl ConfigValue for f32 {
    fn from_toml(value: &toml::Value) -> Option<Self> {
        f64::from_toml(value).map(|v| v as f32)
    }
}

impl ConfigValue for String {
    fn from_toml(value: &toml::Value) -> Option<Self> {
        value.as_str().map(str::to_owned)
    }
}

/// A value written back through [`ConfigStore::write_value`].
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<SettingValue> for toml::Value {
    fn from(value: SettingValue) -> Self {
        match value {
            SettingValue::Bool(v) => toml::Value::Boolean(v),
            SettingValue::Int(v) => toml::Value::Integer(v),
            SettingValue::Float(v) => toml::Value::Float(v),
            SettingValue::Text(v) => toml::Value::String(v),
        }
    }
}

// ── Store ─────────────────────────────────────────────────────────────────────

/// Sectioned key-value configuration backed by a TOML table.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    table: toml::Table,
}

impl ConfigStore {
    /// An in-memory store with no backing file; every read returns its default.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Parses a TOML document into an in-memory store.
    pub fn from_toml_str(contents: &str) -> SimResult<Self> {
        let table = contents
            .parse::<toml::Table>()
            .map_err(|e| TornadoError::Config {
                key: "<document>".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { path: None, table })
    }

    /// Loads `path`.  A missing file yields compiled defaults; a malformed one
    /// is reported and also yields defaults.  Either way the store remembers
    /// `path` so a later `save()` recreates the file.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let table = match fs::read_to_string(path) {
            Ok(contents) => match contents.parse::<toml::Table>() {
                Ok(table) => {
                    println!("✓ Loaded tornado config from {}", path.display());
                    table
                }
                Err(e) => {
                    eprintln!("⚠ Failed to parse {}: {e}; using defaults", path.display());
                    toml::Table::new()
                }
            },
            Err(_) => {
                println!("ℹ No {} found; using compiled defaults", path.display());
                toml::Table::new()
            }
        };
        Self {
            path: Some(path.to_path_buf()),
            table,
        }
    }

    /// Reads `section.key`, falling back to `default` when the section or key
    /// is missing or holds a value of the wrong type.
    pub fn get_value<T: ConfigValue>(&self, section: &str, key: &str, default: T) -> T {
        self.table
            .get(section)
            .and_then(toml::Value::as_table)
            .and_then(|s| s.get(key))
            .and_then(T::from_toml)
            .unwrap_or(default)
    }

    /// Sets `section.key`, creating the section if needed.  A non-table value
    /// occupying the section name is replaced.
    pub fn write_value(&mut self, section: &str, key: &str, value: SettingValue) {
        let entry = self
            .table
            .entry(section.to_string())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        if !entry.is_table() {
            *entry = toml::Value::Table(toml::Table::new());
        }
        if let Some(section_table) = entry.as_table_mut() {
            section_table.insert(key.to_string(), value.into());
        }
    }

    /// Writes the table back to the file it was loaded from.
    pub fn save(&self) -> SimResult<()> {
        let path = self.path.as_ref().ok_or_else(|| TornadoError::Config {
            key: "<path>".to_string(),
            message: "store has no backing file".to_string(),
        })?;
        let serialized = toml::to_string_pretty(&self.table).map_err(|e| TornadoError::Config {
            key: "<document>".to_string(),
            message: e.to_string(),
        })?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| TornadoError::Config {
                key: dir.display().to_string(),
                message: e.to_string(),
            })?;
        }
        fs::write(path, serialized).map_err(|e| TornadoError::Config {
            key: path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        self.path = Some(path.into());
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Produces the typed snapshot.  The strict serde decode is tried first;
    /// if any key has the wrong type, each key is read leniently instead so
    /// one bad entry does not reset every other setting.
    pub fn snapshot(&self) -> TornadoConfig {
        match toml::Value::Table(self.table.clone()).try_into::<TornadoConfig>() {
            Ok(config) => config,
            Err(e) => {
                warn!("tornado config has mistyped keys ({e}); reading keys individually");
                self.lenient_snapshot()
            }
        }
    }

    fn lenient_snapshot(&self) -> TornadoConfig {
        let d = TornadoConfig::default();
        TornadoConfig {
            vortex: VortexSettings {
                radius: self.get_value("vortex", "radius", d.vortex.radius),
                movement_enabled: self.get_value(
                    "vortex",
                    "movement_enabled",
                    d.vortex.movement_enabled,
                ),
                reverse_rotation: self.get_value(
                    "vortex",
                    "reverse_rotation",
                    d.vortex.reverse_rotation,
                ),
                move_speed_scale: self.get_value(
                    "vortex",
                    "move_speed_scale",
                    d.vortex.move_speed_scale,
                ),
                max_entity_distance: self.get_value(
                    "vortex",
                    "max_entity_distance",
                    d.vortex.max_entity_distance,
                ),
                max_entity_count: self.get_value(
                    "vortex",
                    "max_entity_count",
                    d.vortex.max_entity_count,
                ),
                rotation_speed: self.get_value("vortex", "rotation_speed", d.vortex.rotation_speed),
                vertical_force_scale: self.get_value(
                    "vortex",
                    "vertical_force_scale",
                    d.vortex.vertical_force_scale,
                ),
                horizontal_force_scale: self.get_value(
                    "vortex",
                    "horizontal_force_scale",
                    d.vortex.horizontal_force_scale,
                ),
                max_entity_speed: self.get_value(
                    "vortex",
                    "max_entity_speed",
                    d.vortex.max_entity_speed,
                ),
                never_despawn: self.get_value("vortex", "never_despawn", d.vortex.never_despawn),
            },
            vortex_advanced: VortexAdvancedSettings {
                particles_per_layer: self.get_value(
                    "vortex_advanced",
                    "particles_per_layer",
                    d.vortex_advanced.particles_per_layer,
                ),
                max_particle_layers: self.get_value(
                    "vortex_advanced",
                    "max_particle_layers",
                    d.vortex_advanced.max_particle_layers,
                ),
                layer_separation: self.get_value(
                    "vortex_advanced",
                    "layer_separation",
                    d.vortex_advanced.layer_separation,
                ),
                particle_asset: self.get_value(
                    "vortex_advanced",
                    "particle_asset",
                    d.vortex_advanced.particle_asset,
                ),
                particle_name: self.get_value(
                    "vortex_advanced",
                    "particle_name",
                    d.vortex_advanced.particle_name,
                ),
                cloud_top_enabled: self.get_value(
                    "vortex_advanced",
                    "cloud_top_enabled",
                    d.vortex_advanced.cloud_top_enabled,
                ),
            },
            other: OtherSettings {
                notifications: self.get_value("other", "notifications", d.other.notifications),
                spawn_in_storm: self.get_value("other", "spawn_in_storm", d.other.spawn_in_storm),
            },
            audio: AudioSettings {
                enable_eas: self.get_value("audio", "enable_eas", d.audio.enable_eas),
                eas_volume: self.get_value("audio", "eas_volume", d.audio.eas_volume),
                enable_sirens: self.get_value("audio", "enable_sirens", d.audio.enable_sirens),
                siren_volume: self.get_value("audio", "siren_volume", d.audio.siren_volume),
            },
        }
    }
}

// ── Snapshot ──────────────────────────────────────────────────────────────────

/// Typed view of every tunable the simulation reads.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TornadoConfig {
    pub vortex: VortexSettings,
    pub vortex_advanced: VortexAdvancedSettings,
    pub other: OtherSettings,
    pub audio: AudioSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VortexSettings {
    pub radius: f32,
    pub movement_enabled: bool,
    pub reverse_rotation: bool,
    pub move_speed_scale: f32,
    pub max_entity_distance: f32,
    pub max_entity_count: usize,
    pub rotation_speed: f32,
    pub vertical_force_scale: f32,
    pub horizontal_force_scale: f32,
    pub max_entity_speed: f32,
    pub never_despawn: bool,
}

impl Default for VortexSettings {
    fn default() -> Self {
        Self {
            radius: DEFAULT_VORTEX_RADIUS,
            movement_enabled: true,
            reverse_rotation: false,
            move_speed_scale: DEFAULT_MOVE_SPEED_SCALE,
            max_entity_distance: DEFAULT_MAX_ENTITY_DISTANCE,
            max_entity_count: DEFAULT_MAX_ENTITY_COUNT,
            rotation_speed: DEFAULT_ROTATION_SPEED,
            vertical_force_scale: DEFAULT_VERTICAL_FORCE_SCALE,
            horizontal_force_scale: DEFAULT_HORIZONTAL_FORCE_SCALE,
            max_entity_speed: DEFAULT_MAX_ENTITY_SPEED,
            never_despawn: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VortexAdvancedSettings {
    /// Raw configured value; the builder clamps it to `1..=6`.
    pub particles_per_layer: i64,
    /// Raw configured value; the builder caps it at 36.  The uncapped value
    /// (floored at 1) drives the per-layer rotation weight.
    pub max_particle_layers: i64,
    pub layer_separation: f32,
    pub particle_asset: String,
    pub particle_name: String,
    pub cloud_top_enabled: bool,
}

impl Default for VortexAdvancedSettings {
    fn default() -> Self {
        Self {
            particles_per_layer: DEFAULT_PARTICLES_PER_LAYER,
            max_particle_layers: DEFAULT_MAX_PARTICLE_LAYERS,
            layer_separation: DEFAULT_LAYER_SEPARATION,
            particle_asset: DEFAULT_PARTICLE_ASSET.to_string(),
            particle_name: DEFAULT_PARTICLE_NAME.to_string(),
            cloud_top_enabled: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtherSettings {
    pub notifications: bool,
    pub spawn_in_storm: bool,
}

impl Default for OtherSettings {
    fn default() -> Self {
        Self {
            notifications: true,
            spawn_in_storm: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub enable_eas: bool,
    pub eas_volume: f32,
    pub enable_sirens: bool,
    pub siren_volume: f32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            enable_eas: false,
            eas_volume: DEFAULT_EAS_VOLUME,
            enable_sirens: false,
            siren_volume: DEFAULT_SIREN_VOLUME,
        }
    }
}
