//! [`BevyHost`]: the sandbox `World` seen through [`WorldHost`] and [`AudioHost`].
//!
//! Bevy is Y-up, the simulation is Z-up.  [`to_bevy`] and [`from_bevy`] convert
//! at this boundary and nowhere else.  Handles are `Entity::to_bits`, so a
//! handle to a despawned entity simply stops resolving.

use bevy::audio::{AudioPlayer, AudioSink, AudioSinkPlayback, PlaybackSettings, Volume};
use bevy::prelude::*;
use bevy_rapier3d::prelude::{ExternalForce, ExternalImpulse, LockedAxes, Velocity};
use rand::Rng;

use super::{
    AlertSound, FxAnchor, LoopedFx, MapMarker, Notifications, Obstacle, PlayerCharacter, Pullable,
    Ragdoll, RoadGrid, SandboxWeather, SpeedLimit, StreamingAssets, Terrain, ThreatEvents,
};
use crate::constants::{SANDBOX_ANCHOR_CAPACITY, SANDBOX_NOTIFICATION_SECS};
use crate::host::{
    AudioHost, EntityHandle, EntityKind, ForceMode, FxHandle, HostError, HostResult, MarkerHandle,
    SoundHandle, Weather, WorldHost,
};

#[inline]
pub fn to_bevy(v: Vec3) -> Vec3 {
    Vec3::new(v.x, v.z, -v.y)
}

#[inline]
pub fn from_bevy(v: Vec3) -> Vec3 {
    Vec3::new(v.x, -v.z, v.y)
}

/// Whether the segment `from → to` passes through the box `[min, max]`.
pub fn segment_hits_box(from: Vec3, to: Vec3, min: Vec3, max: Vec3) -> bool {
    let dir = to - from;
    let (mut t_enter, mut t_exit) = (0.0_f32, 1.0_f32);
    for axis in 0..3 {
        let (origin, delta) = (from[axis], dir[axis]);
        if delta.abs() < f32::EPSILON {
            if origin < min[axis] || origin > max[axis] {
                return false;
            }
            continue;
        }
        let inv = 1.0 / delta;
        let (mut t0, mut t1) = ((min[axis] - origin) * inv, (max[axis] - origin) * inv);
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        t_enter = t_enter.max(t0);
        t_exit = t_exit.min(t1);
        if t_enter > t_exit {
            return false;
        }
    }
    true
}

pub struct BevyHost<'w> {
    world: &'w mut World,
}

impl<'w> BevyHost<'w> {
    pub fn new(world: &'w mut World) -> Self {
        Self { world }
    }

    fn live(&self, bits: u64) -> Option<Entity> {
        let entity = Entity::from_bits(bits);
        self.world.get_entity(entity).is_ok().then_some(entity)
    }

    /// Live entity carrying `T`.
    fn live_with<T: Component>(&self, bits: u64) -> Option<Entity> {
        self.live(bits).filter(|e| self.world.get::<T>(*e).is_some())
    }

    fn position_of(&self, entity: Entity) -> Option<Vec3> {
        self.world
            .get::<Transform>(entity)
            .map(|t| from_bevy(t.translation))
    }

    fn set_position_of(&mut self, entity: Entity, position: Vec3) {
        if let Some(mut transform) = self.world.get_mut::<Transform>(entity) {
            transform.translation = to_bevy(position);
        }
    }

    fn terrain(&self) -> Terrain {
        self.world
            .get_resource::<Terrain>()
            .copied()
            .unwrap_or_default()
    }

    fn weather(&self) -> SandboxWeather {
        self.world
            .get_resource::<SandboxWeather>()
            .copied()
            .unwrap_or_default()
    }

    fn despawn_if<T: Component>(&mut self, bits: u64) {
        if let Some(entity) = self.live_with::<T>(bits) {
            self.world.despawn(entity);
        }
    }

    fn anchor_count(&self) -> usize {
        self.world
            .try_query_filtered::<Entity, With<FxAnchor>>()
            .map_or(0, |mut q| q.iter(self.world).count())
    }
}

// ── WorldHost ─────────────────────────────────────────────────────────────────

impl WorldHost for BevyHost<'_> {
    fn frame_time(&self) -> f32 {
        self.world
            .get_resource::<Time>()
            .map_or(0.0, |time| time.delta_secs())
    }

    fn player(&self) -> Option<EntityHandle> {
        let mut q = self
            .world
            .try_query_filtered::<Entity, With<PlayerCharacter>>()?;
        q.iter(self.world).next().map(|e| EntityHandle(e.to_bits()))
    }

    fn entity_exists(&self, entity: EntityHandle) -> bool {
        self.live(entity.0).is_some()
    }

    fn entity_position(&self, entity: EntityHandle) -> Option<Vec3> {
        self.live(entity.0).and_then(|e| self.position_of(e))
    }

    fn entity_forward(&self, entity: EntityHandle) -> Option<Vec3> {
        let e = self.live(entity.0)?;
        let transform = self.world.get::<Transform>(e)?;
        Some(from_bevy(transform.forward().as_vec3()))
    }

    fn entity_kind(&self, entity: EntityHandle) -> Option<EntityKind> {
        let e = self.live(entity.0)?;
        self.world.get::<Pullable>(e).map(|p| p.kind)
    }

    fn is_plane(&self, entity: EntityHandle) -> bool {
        self.live(entity.0)
            .and_then(|e| self.world.get::<Pullable>(e))
            .is_some_and(|p| p.plane)
    }

    fn height_above_ground(&self, entity: EntityHandle) -> f32 {
        self.entity_position(entity)
            .map_or(0.0, |p| p.z - self.terrain().height)
    }

    fn is_ragdoll(&self, entity: EntityHandle) -> bool {
        self.live_with::<Ragdoll>(entity.0).is_some()
    }

    fn set_ragdoll(&mut self, entity: EntityHandle, min_ms: u32, max_ms: u32) {
        let Some(e) = self.live(entity.0) else {
            return;
        };
        let ms = rand::thread_rng().gen_range(min_ms..=max_ms.max(min_ms));
        let timer = Timer::from_seconds(ms as f32 / 1000.0, TimerMode::Once);
        self.world
            .entity_mut(e)
            .insert((Ragdoll(timer), LockedAxes::empty()));
    }

    fn apply_force(&mut self, entity: EntityHandle, force: Vec3, mode: ForceMode) {
        let Some(e) = self.live(entity.0) else {
            return;
        };
        let force = to_bevy(force);
        match mode {
            ForceMode::Impulse => {
                if let Some(mut impulse) = self.world.get_mut::<ExternalImpulse>(e) {
                    impulse.impulse += force;
                } else {
                    self.world.entity_mut(e).insert(ExternalImpulse {
                        impulse: force,
                        ..default()
                    });
                }
            }
            ForceMode::CenterOfMass => {
                if let Some(mut external) = self.world.get_mut::<ExternalForce>(e) {
                    external.force += force;
                } else {
                    self.world.entity_mut(e).insert(ExternalForce {
                        force,
                        ..default()
                    });
                }
            }
        }
    }

    fn set_max_speed(&mut self, entity: EntityHandle, speed: f32) {
        if let Some(e) = self.live(entity.0) {
            self.world.entity_mut(e).insert(SpeedLimit(speed));
        }
    }

    fn ground_height(&self, x: f32, y: f32) -> Option<f32> {
        let terrain = self.terrain();
        (x.abs() <= terrain.half_extent && y.abs() <= terrain.half_extent)
            .then_some(terrain.height)
    }

    fn closest_node(&self, near: Vec3) -> Option<Vec3> {
        let spacing = self.world.get_resource::<RoadGrid>()?.spacing;
        if spacing <= 0.0 {
            return None;
        }
        let terrain = self.terrain();
        let snap = |v: f32| (v / spacing).round() * spacing;
        // Nearest point on a road running along Y, and on one running along X.
        let along_y = Vec3::new(snap(near.x), near.y, 0.0);
        let along_x = Vec3::new(near.x, snap(near.y), 0.0);
        let flat = near.with_z(0.0);
        let node = if flat.distance(along_y) <= flat.distance(along_x) {
            along_y
        } else {
            along_x
        };
        let limit = terrain.half_extent;
        Some(Vec3::new(
            node.x.clamp(-limit, limit),
            node.y.clamp(-limit, limit),
            terrain.height,
        ))
    }

    fn nearby_entities(&self, kind: EntityKind, limit: usize) -> Vec<EntityHandle> {
        let Some(mut q) = self.world.try_query::<(Entity, &Pullable)>() else {
            return Vec::new();
        };
        q.iter(self.world)
            .filter(|(_, p)| p.kind == kind)
            .take(limit)
            .map(|(e, _)| EntityHandle(e.to_bits()))
            .collect()
    }

    fn ray_blocked(&self, from: Vec3, to: Vec3, ignore: EntityHandle) -> bool {
        let Some(mut q) = self.world.try_query::<(Entity, &Transform, &Obstacle)>() else {
            return false;
        };
        q.iter(self.world)
            .filter(|(e, _, _)| e.to_bits() != ignore.0)
            .any(|(_, transform, obstacle)| {
                let center = from_bevy(transform.translation);
                segment_hits_box(
                    from,
                    to,
                    center - obstacle.half_extents,
                    center + obstacle.half_extents,
                )
            })
    }

    fn request_fx_asset(&mut self, asset: &str) {
        if let Some(mut assets) = self.world.get_resource_mut::<StreamingAssets>() {
            let frames = assets.stream_frames;
            assets.fx.request(asset, frames);
        }
    }

    fn fx_asset_loaded(&self, asset: &str) -> bool {
        self.world
            .get_resource::<StreamingAssets>()
            .is_some_and(|assets| assets.fx.is_loaded(asset))
    }

    fn request_model(&mut self, model: &str) {
        if let Some(mut assets) = self.world.get_resource_mut::<StreamingAssets>() {
            let frames = assets.stream_frames;
            assets.models.request(model, frames);
        }
    }

    fn model_loaded(&self, model: &str) -> bool {
        self.world
            .get_resource::<StreamingAssets>()
            .is_some_and(|assets| assets.models.is_loaded(model))
    }

    fn create_anchor(&mut self, model: &str, position: Vec3) -> HostResult<EntityHandle> {
        if self.anchor_count() >= SANDBOX_ANCHOR_CAPACITY {
            return Err(HostError::PoolExhausted);
        }
        if !self.model_loaded(model) {
            return Err(HostError::ModelNotLoaded(model.to_string()));
        }
        let entity = self
            .world
            .spawn((
                FxAnchor,
                Transform::from_translation(to_bevy(position)),
                Visibility::Hidden,
            ))
            .id();
        Ok(EntityHandle(entity.to_bits()))
    }

    fn move_anchor(&mut self, anchor: EntityHandle, position: Vec3) {
        if let Some(e) = self.live_with::<FxAnchor>(anchor.0) {
            self.set_position_of(e, position);
        }
    }

    fn delete_anchor(&mut self, anchor: EntityHandle) {
        self.despawn_if::<FxAnchor>(anchor.0);
    }

    fn start_looped_fx(
        &mut self,
        asset: &str,
        name: &str,
        anchor: EntityHandle,
        scale: f32,
    ) -> HostResult<FxHandle> {
        let Some(parent) = self.live_with::<FxAnchor>(anchor.0) else {
            return Err(HostError::Call {
                call: "start_looped_fx",
                message: "anchor does not exist".into(),
            });
        };
        if !self.fx_asset_loaded(asset) {
            return Err(HostError::Call {
                call: "start_looped_fx",
                message: format!("asset '{asset}' is not loaded"),
            });
        }
        let fx = self
            .world
            .spawn((
                LoopedFx {
                    asset: asset.to_string(),
                    name: name.to_string(),
                    scale,
                },
                ChildOf(parent),
                Transform::default(),
                Visibility::default(),
            ))
            .id();
        Ok(FxHandle(fx.to_bits()))
    }

    fn stop_fx(&mut self, fx: FxHandle) {
        self.despawn_if::<LoopedFx>(fx.0);
    }

    fn clear_fx_in_range(&mut self, center: Vec3, radius: f32) {
        let Some(mut q) = self.world.try_query::<(Entity, &ChildOf)>() else {
            return;
        };
        let doomed: Vec<Entity> = q
            .iter(self.world)
            .filter(|(e, _)| self.world.get::<LoopedFx>(*e).is_some())
            .filter(|(_, child_of)| {
                self.position_of(child_of.parent())
                    .is_some_and(|p| p.distance(center) <= radius)
            })
            .map(|(e, _)| e)
            .collect();
        if !doomed.is_empty() {
            debug!("clearing {} effects within {radius} of {center}", doomed.len());
        }
        for entity in doomed {
            self.world.despawn(entity);
        }
    }

    fn add_threat_event(&mut self, anchor: EntityHandle) {
        let Some(e) = self.live(anchor.0) else {
            return;
        };
        if let Some(mut threats) = self.world.get_resource_mut::<ThreatEvents>() {
            if !threats.0.contains(&e) {
                threats.0.push(e);
            }
        }
    }

    fn create_marker(&mut self, position: Vec3, label: &str) -> HostResult<MarkerHandle> {
        let marker = self
            .world
            .spawn((
                MapMarker {
                    label: label.to_string(),
                },
                Transform::from_translation(to_bevy(position)),
            ))
            .id();
        Ok(MarkerHandle(marker.to_bits()))
    }

    fn move_marker(&mut self, marker: MarkerHandle, position: Vec3) {
        if let Some(e) = self.live_with::<MapMarker>(marker.0) {
            self.set_position_of(e, position);
        }
    }

    fn remove_marker(&mut self, marker: MarkerHandle) {
        self.despawn_if::<MapMarker>(marker.0);
    }

    fn notify(&mut self, message: &str) {
        info!("[notify] {message}");
        if let Some(mut notifications) = self.world.get_resource_mut::<Notifications>() {
            notifications
                .0
                .push((message.to_string(), SANDBOX_NOTIFICATION_SECS));
        }
    }

    fn teleport(&mut self, entity: EntityHandle, position: Vec3) {
        let Some(e) = self.live(entity.0) else {
            return;
        };
        self.set_position_of(e, position);
        if let Some(mut velocity) = self.world.get_mut::<Velocity>(e) {
            *velocity = Velocity::zero();
        }
    }

    fn rain_level(&self) -> f32 {
        self.weather().rain_level
    }

    fn previous_weather(&self) -> Weather {
        self.weather().previous
    }

    fn set_wind_speed(&mut self, speed: f32) {
        if let Some(mut weather) = self.world.get_resource_mut::<SandboxWeather>() {
            weather.wind_speed = speed;
        }
    }
}

// ── AudioHost ─────────────────────────────────────────────────────────────────

impl AudioHost for BevyHost<'_> {
    fn play_looping(&mut self, name: &str, volume: f32) -> Option<SoundHandle> {
        let sound = AlertSound {
            name: name.to_string(),
            volume,
        };
        // Headless apps have no asset server; the sound is tracked but silent.
        let clip = self
            .world
            .get_resource::<AssetServer>()
            .map(|server| server.load::<AudioSource>(format!("sounds/{name}.ogg")));
        let entity = match clip {
            Some(clip) => self
                .world
                .spawn((
                    sound,
                    AudioPlayer::new(clip),
                    PlaybackSettings::LOOP.with_volume(Volume::Linear(volume)),
                ))
                .id(),
            None => self.world.spawn(sound).id(),
        };
        Some(SoundHandle(entity.to_bits()))
    }

    fn set_volume(&mut self, sound: SoundHandle, volume: f32) {
        let Some(e) = self.live_with::<AlertSound>(sound.0) else {
            return;
        };
        if let Some(mut alert) = self.world.get_mut::<AlertSound>(e) {
            alert.volume = volume;
        }
        if let Some(mut sink) = self.world.get_mut::<AudioSink>(e) {
            sink.set_volume(Volume::Linear(volume));
        }
    }

    fn stop(&mut self, sound: SoundHandle) {
        self.despawn_if::<AlertSound>(sound.0);
    }
}
