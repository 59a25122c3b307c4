//! The narrow interfaces the simulation core talks to.
//!
//! The core never touches a game engine directly.  Everything it needs from
//! the outside world (entity queries, forces, effect anchors, map markers,
//! weather, sound) goes through [`WorldHost`] and [`AudioHost`].  The Bevy
//! sandbox in [`crate::sandbox`] and the scripted [`crate::testing::MockWorld`]
//! are the two implementations.
//!
//! All coordinates are Z-up world space.  Handles are opaque `u64` ids chosen
//! by the host.

use std::fmt;

use bevy::math::Vec3;

// ── Handles ───────────────────────────────────────────────────────────────────

/// A world entity (character, vehicle, object, or one of our effect anchors).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityHandle(pub u64);

/// A running looped visual effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FxHandle(pub u64);

/// A map marker (blip).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MarkerHandle(pub u64);

/// A playing sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SoundHandle(pub u64);

// ── Entity classification ─────────────────────────────────────────────────────

/// The three entity pools the vortex scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Character,
    Vehicle,
    Object,
}

impl EntityKind {
    /// Scan order: characters first, then vehicles, then loose objects.
    pub const ALL: [EntityKind; 3] = [
        EntityKind::Character,
        EntityKind::Vehicle,
        EntityKind::Object,
    ];
}

/// How a force is applied to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceMode {
    /// A one-shot impulse.
    Impulse,
    /// A continuous force through the centre of mass.
    CenterOfMass,
}

/// Weather kinds the host can report as the previous weather state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Weather {
    #[default]
    Clear,
    ExtraSunny,
    Clouds,
    Overcast,
    Smog,
    Foggy,
    Clearing,
    Rain,
    Thunder,
    Snow,
    SnowLight,
    Blizzard,
    Xmas,
}

impl Weather {
    /// Weather kinds that count as a storm for auto-spawning.
    pub fn is_stormy(self) -> bool {
        matches!(
            self,
            Weather::Clearing
                | Weather::Thunder
                | Weather::Rain
                | Weather::Blizzard
                | Weather::SnowLight
                | Weather::Xmas
        )
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Failure reported by a host call.
#[derive(Debug, Clone, PartialEq)]
pub enum HostError {
    /// The host has no free object slots.  Callers degrade instead of failing.
    PoolExhausted,
    /// A model was used before it finished streaming in.
    ModelNotLoaded(String),
    /// Any other failure of a named call.
    Call { call: &'static str, message: String },
}

impl HostError {
    /// Whether the caller may continue in a degraded state.
    pub fn is_degradable(&self) -> bool {
        matches!(self, HostError::PoolExhausted | HostError::ModelNotLoaded(_))
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::PoolExhausted => write!(f, "host object pool exhausted"),
            HostError::ModelNotLoaded(model) => write!(f, "model '{}' is not loaded", model),
            HostError::Call { call, message } => write!(f, "{} failed: {}", call, message),
        }
    }
}

impl std::error::Error for HostError {}

pub type HostResult<T> = Result<T, HostError>;

// ── World surface ─────────────────────────────────────────────────────────────

/// Queries and commands against the host game world.
pub trait WorldHost {
    /// Seconds elapsed over the last rendered frame.
    fn frame_time(&self) -> f32;

    /// The player's character, if one exists.
    fn player(&self) -> Option<EntityHandle>;

    fn entity_exists(&self, entity: EntityHandle) -> bool;
    fn entity_position(&self, entity: EntityHandle) -> Option<Vec3>;
    /// Unit facing direction of the entity.
    fn entity_forward(&self, entity: EntityHandle) -> Option<Vec3>;
    fn entity_kind(&self, entity: EntityHandle) -> Option<EntityKind>;
    fn is_plane(&self, entity: EntityHandle) -> bool;
    fn height_above_ground(&self, entity: EntityHandle) -> f32;

    fn is_ragdoll(&self, entity: EntityHandle) -> bool;
    fn set_ragdoll(&mut self, entity: EntityHandle, min_ms: u32, max_ms: u32);

    fn apply_force(&mut self, entity: EntityHandle, force: Vec3, mode: ForceMode);
    fn set_max_speed(&mut self, entity: EntityHandle, speed: f32);

    /// Ground height under `(x, y)`, or `None` when the lookup fails.
    fn ground_height(&self, x: f32, y: f32) -> Option<f32>;
    /// Closest navigable (road) point to `near`.
    fn closest_node(&self, near: Vec3) -> Option<Vec3>;
    /// Up to `limit` entities from one pool.
    fn nearby_entities(&self, kind: EntityKind, limit: usize) -> Vec<EntityHandle>;
    /// Whether world geometry blocks the segment `from → to`, ignoring `ignore`.
    fn ray_blocked(&self, from: Vec3, to: Vec3, ignore: EntityHandle) -> bool;

    fn request_fx_asset(&mut self, asset: &str);
    fn fx_asset_loaded(&self, asset: &str) -> bool;
    fn request_model(&mut self, model: &str);
    fn model_loaded(&self, model: &str) -> bool;

    /// Creates an invisible, non-colliding placeholder used to carry an effect.
    fn create_anchor(&mut self, model: &str, position: Vec3) -> HostResult<EntityHandle>;
    fn move_anchor(&mut self, anchor: EntityHandle, position: Vec3);
    fn delete_anchor(&mut self, anchor: EntityHandle);

    fn start_looped_fx(
        &mut self,
        asset: &str,
        name: &str,
        anchor: EntityHandle,
        scale: f32,
    ) -> HostResult<FxHandle>;
    fn stop_fx(&mut self, fx: FxHandle);
    fn clear_fx_in_range(&mut self, center: Vec3, radius: f32);

    /// Lets AI characters react to something frightening at `anchor`.
    fn add_threat_event(&mut self, anchor: EntityHandle);

    fn create_marker(&mut self, position: Vec3, label: &str) -> HostResult<MarkerHandle>;
    fn move_marker(&mut self, marker: MarkerHandle, position: Vec3);
    fn remove_marker(&mut self, marker: MarkerHandle);

    fn notify(&mut self, message: &str);
    fn teleport(&mut self, entity: EntityHandle, position: Vec3);

    fn rain_level(&self) -> f32;
    fn previous_weather(&self) -> Weather;
    fn set_wind_speed(&mut self, speed: f32);
}

// ── Audio surface ─────────────────────────────────────────────────────────────

/// Global (non-positional) sound playback.
pub trait AudioHost {
    fn play_looping(&mut self, name: &str, volume: f32) -> Option<SoundHandle>;
    fn set_volume(&mut self, sound: SoundHandle, volume: f32);
    fn stop(&mut self, sound: SoundHandle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stormy_weather_kinds() {
        assert!(Weather::Thunder.is_stormy());
        assert!(Weather::Xmas.is_stormy());
        assert!(!Weather::Clear.is_stormy());
        assert!(!Weather::Snow.is_stormy());
    }

    #[test]
    fn only_pool_and_model_failures_degrade() {
        assert!(HostError::PoolExhausted.is_degradable());
        assert!(HostError::ModelNotLoaded("prop".into()).is_degradable());
        assert!(!HostError::Call {
            call: "create_anchor",
            message: "boom".into()
        }
        .is_degradable());
    }
}
