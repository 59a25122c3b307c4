//! Scripted host for tests and headless scenarios.
//!
//! [`MockWorld`] implements [`WorldHost`] and [`AudioHost`] over plain tables:
//! entities with positions and kinds, effect anchors, running effects, map
//! markers and sounds.  Every command the simulation issues is recorded so
//! tests can assert on forces, notifications and cleared effect ranges.
//!
//! Knobs for failure paths:
//!
//! * `set_asset_latency(n)`: effect assets load `n` frames after request.
//! * `block_asset(name)`: an effect asset or model never loads.
//! * `set_anchor_capacity(Some(n))`: the anchor pool holds `n` objects.
//! * `fail_anchor_creation(Some(err))`: every anchor creation returns `err`.
//! * `fail_marker_creation(true)` / `panic_on_marker_move`.
//!
//! The world has no player until [`MockWorld::spawn_player`] is called.

pub mod scenarios;

use std::collections::{BTreeMap, HashMap, HashSet};

use bevy::math::Vec3;

use crate::constants::CORE_FX_ASSET;
use crate::host::{
    AudioHost, EntityHandle, EntityKind, ForceMode, FxHandle, HostError, HostResult, MarkerHandle,
    SoundHandle, Weather, WorldHost,
};

/// One `apply_force` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordedForce {
    pub force: Vec3,
    pub mode: ForceMode,
}

#[derive(Debug, Clone)]
struct MockEntity {
    kind: EntityKind,
    position: Vec3,
    velocity: Vec3,
    forward: Vec3,
    plane: bool,
    ragdoll: bool,
    max_speed: Option<f32>,
}

#[derive(Debug, Clone)]
struct MockFx {
    asset: String,
    anchor: EntityHandle,
}

#[derive(Debug, Clone)]
pub struct MockWorld {
    pub frame_time: f32,
    /// Flat ground height everywhere; `None` means the ground probe fails.
    pub ground: Option<f32>,
    /// Whether `closest_node` finds a road under any point.
    pub navigable: bool,
    pub line_of_sight_blocked: bool,
    pub rain_level: f32,
    pub previous_weather: Weather,
    pub wind_speed: f32,
    pub panic_on_marker_move: bool,

    frame: u64,
    next_handle: u64,
    player: Option<EntityHandle>,
    entities: BTreeMap<EntityHandle, MockEntity>,
    anchors: BTreeMap<EntityHandle, Vec3>,
    fx: BTreeMap<FxHandle, MockFx>,
    markers: BTreeMap<MarkerHandle, (Vec3, String)>,
    sounds: BTreeMap<SoundHandle, (String, f32)>,

    asset_latency: u32,
    assets_preloaded: bool,
    requested_assets: HashMap<String, u64>,
    requested_models: HashSet<String>,
    blocked_assets: HashSet<String>,
    anchor_capacity: Option<usize>,
    anchor_failure: Option<HostError>,
    marker_failure: bool,

    forces: Vec<(EntityHandle, RecordedForce)>,
    integrated_forces: usize,
    notifications: Vec<String>,
    cleared_fx: Vec<(Vec3, f32)>,
    threat_events: Vec<EntityHandle>,
}

impl Default for MockWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl MockWorld {
    pub fn new() -> Self {
        Self {
            frame_time: 1.0 / 60.0,
            ground: Some(0.0),
            navigable: true,
            line_of_sight_blocked: false,
            rain_level: 0.0,
            previous_weather: Weather::Clear,
            wind_speed: 0.0,
            panic_on_marker_move: false,
            frame: 0,
            next_handle: 1,
            player: None,
            entities: BTreeMap::new(),
            anchors: BTreeMap::new(),
            fx: BTreeMap::new(),
            markers: BTreeMap::new(),
            sounds: BTreeMap::new(),
            asset_latency: 0,
            assets_preloaded: false,
            requested_assets: HashMap::new(),
            requested_models: HashSet::new(),
            blocked_assets: HashSet::new(),
            anchor_capacity: None,
            anchor_failure: None,
            marker_failure: false,
            forces: Vec::new(),
            integrated_forces: 0,
            notifications: Vec::new(),
            cleared_fx: Vec::new(),
            threat_events: Vec::new(),
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_handle;
        self.next_handle += 1;
        id
    }

    // ── Scene setup ───────────────────────────────────────────────────────────

    pub fn spawn_entity(&mut self, kind: EntityKind, position: Vec3) -> EntityHandle {
        let handle = EntityHandle(self.next_id());
        self.entities.insert(
            handle,
            MockEntity {
                kind,
                position,
                velocity: Vec3::ZERO,
                forward: Vec3::X,
                plane: false,
                ragdoll: false,
                max_speed: None,
            },
        );
        handle
    }

    /// A vehicle flagged as a plane.
    pub fn spawn_plane(&mut self, position: Vec3) -> EntityHandle {
        let handle = self.spawn_entity(EntityKind::Vehicle, position);
        if let Some(entity) = self.entities.get_mut(&handle) {
            entity.plane = true;
        }
        handle
    }

    /// A character that becomes the player.
    pub fn spawn_player(&mut self, position: Vec3) -> EntityHandle {
        let handle = self.spawn_entity(EntityKind::Character, position);
        self.player = Some(handle);
        handle
    }

    pub fn set_position(&mut self, entity: EntityHandle, position: Vec3) {
        if let Some(e) = self.entities.get_mut(&entity) {
            e.position = position;
        }
    }

    pub fn set_forward(&mut self, entity: EntityHandle, forward: Vec3) {
        if let Some(e) = self.entities.get_mut(&entity) {
            e.forward = forward;
        }
    }

    pub fn remove_entity(&mut self, entity: EntityHandle) {
        self.entities.remove(&entity);
        if self.player == Some(entity) {
            self.player = None;
        }
    }

    // ── Failure knobs ─────────────────────────────────────────────────────────

    /// Every asset and model counts as loaded, regardless of latency.
    pub fn preload_all(&mut self) {
        self.assets_preloaded = true;
    }

    pub fn set_asset_latency(&mut self, frames: u32) {
        self.asset_latency = frames;
    }

    pub fn block_asset(&mut self, name: &str) {
        self.blocked_assets.insert(name.to_string());
    }

    pub fn set_anchor_capacity(&mut self, capacity: Option<usize>) {
        self.anchor_capacity = capacity;
    }

    pub fn fail_anchor_creation(&mut self, error: Option<HostError>) {
        self.anchor_failure = error;
    }

    pub fn fail_marker_creation(&mut self, fail: bool) {
        self.marker_failure = fail;
    }

    // ── Time and motion ───────────────────────────────────────────────────────

    pub fn advance_frame(&mut self) {
        self.frame += 1;
    }

    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Crude unit-mass integration of the forces recorded since the last call.
    /// Speeds are clamped to each entity's max speed.
    pub fn integrate(&mut self, dt: f32) {
        for (handle, recorded) in &self.forces[self.integrated_forces..] {
            if let Some(e) = self.entities.get_mut(handle) {
                match recorded.mode {
                    ForceMode::Impulse => e.velocity += recorded.force,
                    ForceMode::CenterOfMass => e.velocity += recorded.force * dt,
                }
            }
        }
        self.integrated_forces = self.forces.len();

        for e in self.entities.values_mut() {
            if let Some(max) = e.max_speed {
                e.velocity = e.velocity.clamp_length_max(max);
            }
            e.position += e.velocity * dt;
        }
    }

    // ── Inspection ────────────────────────────────────────────────────────────

    pub fn anchor_count(&self) -> usize {
        self.anchors.len()
    }

    pub fn anchor_position(&self, anchor: EntityHandle) -> Option<Vec3> {
        self.anchors.get(&anchor).copied()
    }

    pub fn fx_count(&self) -> usize {
        self.fx.len()
    }

    /// Running effects using `asset`.
    pub fn fx_count_for(&self, asset: &str) -> usize {
        self.fx.values().filter(|fx| fx.asset == asset).count()
    }

    pub fn anchor_has_fx(&self, anchor: EntityHandle) -> bool {
        self.fx.values().any(|fx| fx.anchor == anchor)
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    pub fn marker_label(&self, marker: MarkerHandle) -> Option<&str> {
        self.markers.get(&marker).map(|(_, label)| label.as_str())
    }

    pub fn marker_position(&self, marker: MarkerHandle) -> Option<Vec3> {
        self.markers.get(&marker).map(|(pos, _)| *pos)
    }

    pub fn forces_on(&self, entity: EntityHandle) -> Vec<RecordedForce> {
        self.forces
            .iter()
            .filter(|(h, _)| *h == entity)
            .map(|(_, f)| *f)
            .collect()
    }

    pub fn total_force_calls(&self) -> usize {
        self.forces.len()
    }

    pub fn max_speed(&self, entity: EntityHandle) -> Option<f32> {
        self.entities.get(&entity).and_then(|e| e.max_speed)
    }

    pub fn notifications(&self) -> &[String] {
        &self.notifications
    }

    pub fn cleared_fx(&self) -> &[(Vec3, f32)] {
        &self.cleared_fx
    }

    pub fn threat_events(&self) -> &[EntityHandle] {
        &self.threat_events
    }

    pub fn playing_sounds(&self) -> Vec<SoundHandle> {
        self.sounds.keys().copied().collect()
    }

    pub fn sound_volume(&self, sound: SoundHandle) -> Option<f32> {
        self.sounds.get(&sound).map(|(_, volume)| *volume)
    }

    pub fn model_requested(&self, model: &str) -> bool {
        self.requested_models.contains(model)
    }
}

impl WorldHost for MockWorld {
    fn frame_time(&self) -> f32 {
        self.frame_time
    }

    fn player(&self) -> Option<EntityHandle> {
        self.player
    }

    fn entity_exists(&self, entity: EntityHandle) -> bool {
        self.entities.contains_key(&entity) || self.anchors.contains_key(&entity)
    }

    fn entity_position(&self, entity: EntityHandle) -> Option<Vec3> {
        self.entities
            .get(&entity)
            .map(|e| e.position)
            .or_else(|| self.anchors.get(&entity).copied())
    }

    fn entity_forward(&self, entity: EntityHandle) -> Option<Vec3> {
        self.entities.get(&entity).map(|e| e.forward)
    }

    fn entity_kind(&self, entity: EntityHandle) -> Option<EntityKind> {
        self.entities.get(&entity).map(|e| e.kind)
    }

    fn is_plane(&self, entity: EntityHandle) -> bool {
        self.entities.get(&entity).is_some_and(|e| e.plane)
    }

    fn height_above_ground(&self, entity: EntityHandle) -> f32 {
        let ground = self.ground.unwrap_or(0.0);
        self.entity_position(entity)
            .map(|p| p.z - ground)
            .unwrap_or(0.0)
    }

    fn is_ragdoll(&self, entity: EntityHandle) -> bool {
        self.entities.get(&entity).is_some_and(|e| e.ragdoll)
    }

    fn set_ragdoll(&mut self, entity: EntityHandle, _min_ms: u32, _max_ms: u32) {
        if let Some(e) = self.entities.get_mut(&entity) {
            e.ragdoll = true;
        }
    }

    fn apply_force(&mut self, entity: EntityHandle, force: Vec3, mode: ForceMode) {
        self.forces.push((entity, RecordedForce { force, mode }));
    }

    fn set_max_speed(&mut self, entity: EntityHandle, speed: f32) {
        if let Some(e) = self.entities.get_mut(&entity) {
            e.max_speed = Some(speed);
        }
    }

    fn ground_height(&self, _x: f32, _y: f32) -> Option<f32> {
        self.ground
    }

    fn closest_node(&self, near: Vec3) -> Option<Vec3> {
        self.navigable
            .then(|| Vec3::new(near.x, near.y, self.ground.unwrap_or(near.z)))
    }

    fn nearby_entities(&self, kind: EntityKind, limit: usize) -> Vec<EntityHandle> {
        self.entities
            .iter()
            .filter(|(_, e)| e.kind == kind)
            .map(|(h, _)| *h)
            .take(limit)
            .collect()
    }

    fn ray_blocked(&self, _from: Vec3, _to: Vec3, _ignore: EntityHandle) -> bool {
        self.line_of_sight_blocked
    }

    fn request_fx_asset(&mut self, asset: &str) {
        self.requested_assets
            .entry(asset.to_string())
            .or_insert(self.frame);
    }

    fn fx_asset_loaded(&self, asset: &str) -> bool {
        if self.blocked_assets.contains(asset) {
            return false;
        }
        if asset == CORE_FX_ASSET || self.assets_preloaded || self.asset_latency == 0 {
            return true;
        }
        self.requested_assets
            .get(asset)
            .is_some_and(|&at| self.frame.saturating_sub(at) >= u64::from(self.asset_latency))
    }

    fn request_model(&mut self, model: &str) {
        self.requested_models.insert(model.to_string());
    }

    fn model_loaded(&self, model: &str) -> bool {
        !self.blocked_assets.contains(model)
    }

    fn create_anchor(&mut self, model: &str, position: Vec3) -> HostResult<EntityHandle> {
        if let Some(error) = &self.anchor_failure {
            return Err(error.clone());
        }
        if self
            .anchor_capacity
            .is_some_and(|cap| self.anchors.len() >= cap)
        {
            return Err(HostError::PoolExhausted);
        }
        if !self.model_loaded(model) {
            return Err(HostError::ModelNotLoaded(model.to_string()));
        }
        let handle = EntityHandle(self.next_id());
        self.anchors.insert(handle, position);
        Ok(handle)
    }

    fn move_anchor(&mut self, anchor: EntityHandle, position: Vec3) {
        if let Some(p) = self.anchors.get_mut(&anchor) {
            *p = position;
        }
    }

    fn delete_anchor(&mut self, anchor: EntityHandle) {
        self.anchors.remove(&anchor);
    }

    fn start_looped_fx(
        &mut self,
        asset: &str,
        _name: &str,
        anchor: EntityHandle,
        _scale: f32,
    ) -> HostResult<FxHandle> {
        if !self.anchors.contains_key(&anchor) {
            return Err(HostError::Call {
                call: "start_looped_fx",
                message: format!("anchor {anchor:?} does not exist"),
            });
        }
        if !self.fx_asset_loaded(asset) {
            return Err(HostError::Call {
                call: "start_looped_fx",
                message: format!("asset '{asset}' is not loaded"),
            });
        }
        let handle = FxHandle(self.next_id());
        self.fx.insert(
            handle,
            MockFx {
                asset: asset.to_string(),
                anchor,
            },
        );
        Ok(handle)
    }

    fn stop_fx(&mut self, fx: FxHandle) {
        self.fx.remove(&fx);
    }

    fn clear_fx_in_range(&mut self, center: Vec3, radius: f32) {
        self.cleared_fx.push((center, radius));
    }

    fn add_threat_event(&mut self, anchor: EntityHandle) {
        self.threat_events.push(anchor);
    }

    fn create_marker(&mut self, position: Vec3, label: &str) -> HostResult<MarkerHandle> {
        if self.marker_failure {
            return Err(HostError::Call {
                call: "create_marker",
                message: "blip limit reached".to_string(),
            });
        }
        let handle = MarkerHandle(self.next_id());
        self.markers.insert(handle, (position, label.to_string()));
        Ok(handle)
    }

    fn move_marker(&mut self, marker: MarkerHandle, position: Vec3) {
        if self.panic_on_marker_move {
            panic!("marker {marker:?} vanished mid-move");
        }
        if let Some((p, _)) = self.markers.get_mut(&marker) {
            *p = position;
        }
    }

    fn remove_marker(&mut self, marker: MarkerHandle) {
        self.markers.remove(&marker);
    }

    fn notify(&mut self, message: &str) {
        self.notifications.push(message.to_string());
    }

    fn teleport(&mut self, entity: EntityHandle, position: Vec3) {
        if let Some(e) = self.entities.get_mut(&entity) {
            e.position = position;
            e.velocity = Vec3::ZERO;
        }
    }

    fn rain_level(&self) -> f32 {
        self.rain_level
    }

    fn previous_weather(&self) -> Weather {
        self.previous_weather
    }

    fn set_wind_speed(&mut self, speed: f32) {
        self.wind_speed = speed;
    }
}

impl AudioHost for MockWorld {
    fn play_looping(&mut self, name: &str, volume: f32) -> Option<SoundHandle> {
        let handle = SoundHandle(self.next_id());
        self.sounds.insert(handle, (name.to_string(), volume));
        Some(handle)
    }

    fn set_volume(&mut self, sound: SoundHandle, volume: f32) {
        if let Some((_, v)) = self.sounds.get_mut(&sound) {
            *v = volume;
        }
    }

    fn stop(&mut self, sound: SoundHandle) {
        self.sounds.remove(&sound);
    }
}
