//! User-facing commands, one variant per menu action.

use bevy::math::Vec3;

use crate::config::SettingValue;
use crate::error::TornadoError;
use crate::factory::SpawnTicket;

#[derive(Debug, Clone, PartialEq)]
pub enum SimCommand {
    /// Summon a tornado in front of the player.  Ignored while one exists.
    SpawnTornado,
    DespawnAll,
    TeleportToTornado,
    /// Despawn if any tornado is live, otherwise summon one.
    ToggleTornado,
    /// Write one setting, then push the new snapshot into live vortices.
    Set {
        section: String,
        key: String,
        value: SettingValue,
    },
    SaveConfig,
    RefreshVortexSettings,
}

impl SimCommand {
    pub fn set_bool(section: &str, key: &str, value: bool) -> Self {
        Self::Set {
            section: section.to_string(),
            key: key.to_string(),
            value: SettingValue::Bool(value),
        }
    }

    pub fn set_float(section: &str, key: &str, value: f64) -> Self {
        Self::Set {
            section: section.to_string(),
            key: key.to_string(),
            value: SettingValue::Float(value),
        }
    }

    pub fn set_int(section: &str, key: &str, value: i64) -> Self {
        Self::Set {
            section: section.to_string(),
            key: key.to_string(),
            value: SettingValue::Int(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Spawned(SpawnTicket),
    Despawned,
    Teleported(Vec3),
    ConfigUpdated,
    Saved,
    Refreshed,
    /// Nothing to do; the reason is shown to the log.
    Ignored(&'static str),
    Rejected(TornadoError),
}
