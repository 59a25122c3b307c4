//! Owner of every live vortex.
//!
//! The factory validates spawn requests, drives the (single) in-flight build,
//! schedules storm spawns, keeps the global alert sounds in step with the
//! number of live vortices, and isolates each vortex's update so one failure
//! cannot take the others down.
//!
//! Per tick, in order:
//!
//! 1. step the pending build; register the vortex when it completes,
//! 2. with no live vortex: stop alert sounds and maybe schedule a storm spawn,
//! 3. fire a due scheduled spawn,
//! 4. dispose despawn-requested vortices and update the rest,
//! 5. refresh alert sound volumes,
//! 6. release host objects dropped during the tick.

use std::f32::consts::TAU;
use std::panic::{self, AssertUnwindSafe};

use bevy::log::{debug, error, info, warn};
use bevy::math::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::TornadoConfig;
use crate::constants::*;
use crate::error::{SimResult, TornadoError};
use crate::host::{AudioHost, SoundHandle, WorldHost};
use crate::release::ReleaseQueue;
use crate::vortex::{BuildPlan, BuildProgress, Vortex, VortexBuild, VortexId};

/// Returned by an accepted spawn request.  The vortex goes live once its
/// build completes on a later tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnTicket {
    pub id: VortexId,
    /// Spawn point after snapping to the ground.
    pub position: Vec3,
}

/// A storm spawn waiting for its random delay to elapse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledSpawn {
    pub started_at: u64,
    pub delay_ms: u64,
}

/// EAS beeps and city sirens, shared by all vortices.
#[derive(Debug, Default)]
struct AlertSounds {
    eas: Option<SoundHandle>,
    siren: Option<SoundHandle>,
}

impl AlertSounds {
    fn start(&mut self, audio: &mut impl AudioHost, config: &TornadoConfig) {
        if config.audio.enable_eas && self.eas.is_none() {
            self.eas = audio.play_looping(EAS_SOUND, config.audio.eas_volume);
        }
        if config.audio.enable_sirens && self.siren.is_none() {
            self.siren = audio.play_looping(SIREN_SOUND, config.audio.siren_volume);
        }
    }

    fn refresh(&mut self, audio: &mut impl AudioHost, config: &TornadoConfig) {
        Self::refresh_one(&mut self.eas, audio, config.audio.enable_eas, config.audio.eas_volume);
        Self::refresh_one(
            &mut self.siren,
            audio,
            config.audio.enable_sirens,
            config.audio.siren_volume,
        );
    }

    fn refresh_one(
        slot: &mut Option<SoundHandle>,
        audio: &mut impl AudioHost,
        enabled: bool,
        volume: f32,
    ) {
        let Some(sound) = *slot else {
            return;
        };
        if enabled {
            audio.set_volume(sound, volume);
        } else {
            audio.stop(sound);
            *slot = None;
        }
    }

    fn stop_all(&mut self, audio: &mut impl AudioHost) {
        if let Some(sound) = self.eas.take() {
            audio.stop(sound);
        }
        if let Some(sound) = self.siren.take() {
            audio.stop(sound);
        }
    }
}

#[derive(Debug)]
pub struct Factory {
    vortices: Vec<Vortex>,
    pending: Option<VortexBuild>,
    next_id: u64,
    last_spawn_complete: Option<u64>,
    last_storm_check: u64,
    scheduled: Option<ScheduledSpawn>,
    sounds: AlertSounds,
    queue: ReleaseQueue,
    rng: StdRng,
}

impl Default for Factory {
    fn default() -> Self {
        Self::new()
    }
}

impl Factory {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// A factory with a caller-supplied RNG, for deterministic runs.
    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            vortices: Vec::new(),
            pending: None,
            next_id: 1,
            last_spawn_complete: None,
            last_storm_check: 0,
            scheduled: None,
            sounds: AlertSounds::default(),
            queue: ReleaseQueue::new(),
            rng,
        }
    }

    // ── Spawning ──────────────────────────────────────────────────────────────

    /// Validates a spawn request and starts building a vortex at `position`
    /// snapped to the ground.  At most one build runs at a time; when the
    /// vortex limit is reached the oldest vortex is disposed first.
    pub fn create_vortex(
        &mut self,
        world: &mut impl WorldHost,
        position: Vec3,
        config: &TornadoConfig,
        now: u64,
    ) -> SimResult<SpawnTicket> {
        if let Some(last) = self.last_spawn_complete {
            let elapsed = now.saturating_sub(last);
            if elapsed < SPAWN_COOLDOWN_MS {
                debug!("spawn rejected: cooldown");
                return Err(TornadoError::SpawnCooldown {
                    remaining_ms: SPAWN_COOLDOWN_MS - elapsed,
                });
            }
        }
        if self.pending.is_some() {
            debug!("spawn rejected: build in progress");
            return Err(TornadoError::SpawnInProgress);
        }
        if !position.is_finite() {
            return Err(TornadoError::InvalidSpawnPosition {
                x: position.x,
                y: position.y,
                z: position.z,
            });
        }

        if self.vortices.len() >= VORTEX_LIMIT {
            let mut oldest = self.vortices.remove(0);
            info!("vortex limit reached; evicting {:?}", oldest.id());
            oldest.dispose();
        }

        let ground = world
            .ground_height(position.x, position.y)
            .filter(|g| g.is_finite() && *g >= GROUND_HEIGHT_FLOOR)
            .unwrap_or(position.z);
        let position = Vec3::new(position.x, position.y, ground - SPAWN_GROUND_OFFSET);

        world.clear_fx_in_range(position, SPAWN_FX_CLEAR_RADIUS);

        let id = VortexId(self.next_id);
        self.next_id += 1;
        let vortex = Vortex::new(id, position, config, now, &mut self.rng, &self.queue);
        self.pending = Some(VortexBuild::start(world, vortex, BuildPlan::from_config(config)));

        info!("spawning vortex {id:?} at {position:?}");
        Ok(SpawnTicket { id, position })
    }

    // ── Tick ──────────────────────────────────────────────────────────────────

    pub fn on_update<H: WorldHost + AudioHost>(
        &mut self,
        host: &mut H,
        config: &TornadoConfig,
        now: u64,
    ) {
        self.step_pending_build(host, config, now);

        if self.vortices.is_empty() {
            self.sounds.stop_all(host);
            if config.other.spawn_in_storm {
                self.check_storm(host, now);
            }
        }

        self.fire_scheduled_spawn(host, config, now);
        self.update_vortices(host, config, now);
        self.sounds.refresh(host, config);
        self.queue.flush(host);
    }

    fn step_pending_build<H: WorldHost + AudioHost>(
        &mut self,
        host: &mut H,
        config: &TornadoConfig,
        now: u64,
    ) {
        let Some(build) = self.pending.as_mut() else {
            return;
        };
        let id = build.id();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| build.step(host, config, now)));

        match outcome {
            Ok(Ok(BuildProgress::Pending)) => {}
            Ok(Ok(BuildProgress::Complete)) => {
                if let Some(build) = self.pending.take() {
                    self.register(host, build.finish(), config, now);
                }
            }
            Ok(Err(e)) => {
                error!("vortex {id:?} build failed: {e}");
                self.fail_build(host, config);
            }
            Err(_) => {
                error!("vortex {id:?} build panicked");
                self.fail_build(host, config);
            }
        }
    }

    fn fail_build(&mut self, host: &mut impl WorldHost, config: &TornadoConfig) {
        self.pending = None;
        if config.other.notifications {
            host.notify("Tornado failed to spawn.");
        }
    }

    fn register<H: WorldHost + AudioHost>(
        &mut self,
        host: &mut H,
        vortex: Vortex,
        config: &TornadoConfig,
        now: u64,
    ) {
        info!(
            "vortex {:?} is live with {} particles",
            vortex.id(),
            vortex.particles().len()
        );
        self.vortices.push(vortex);
        self.sounds.start(host, config);
        if config.other.notifications {
            host.notify("Tornado spawned nearby.");
        }
        self.last_spawn_complete = Some(now);
    }

    fn check_storm(&mut self, world: &mut impl WorldHost, now: u64) {
        let storming = world.rain_level() > STORM_RAIN_THRESHOLD
            || world.previous_weather().is_stormy();
        if !storming
            || self.pending.is_some()
            || self.scheduled.is_some()
            || now.saturating_sub(self.last_storm_check) <= STORM_CHECK_INTERVAL_MS
        {
            return;
        }

        if self.rng.gen::<f32>() < STORM_SPAWN_PROBABILITY {
            let delay_ms = self.rng.gen_range(0..STORM_SPAWN_MAX_DELAY_MS);
            self.scheduled = Some(ScheduledSpawn {
                started_at: now,
                delay_ms,
            });
            world.set_wind_speed(STORM_WIND_SPEED);
            info!("storm detected; spawn scheduled in {delay_ms} ms");
        }
        self.last_storm_check = now;
    }

    fn fire_scheduled_spawn(
        &mut self,
        world: &mut impl WorldHost,
        config: &TornadoConfig,
        now: u64,
    ) {
        let Some(scheduled) = self.scheduled else {
            return;
        };
        if now.saturating_sub(scheduled.started_at) <= scheduled.delay_ms {
            return;
        }
        self.scheduled = None;

        let Some(player_pos) = world.player().and_then(|p| world.entity_position(p)) else {
            warn!("scheduled storm spawn dropped: no player");
            return;
        };
        let angle = self.rng.gen_range(0.0..TAU);
        let dist = STORM_SPAWN_MIN_DISTANCE + self.rng.gen::<f32>() * STORM_SPAWN_DISTANCE_RANGE;
        let position = Vec3::new(
            player_pos.x + angle.cos() * dist,
            player_pos.y + angle.sin() * dist,
            player_pos.z,
        );
        if let Err(e) = self.create_vortex(world, position, config, now) {
            warn!("scheduled storm spawn rejected: {e}");
        }
    }

    fn update_vortices(&mut self, world: &mut impl WorldHost, config: &TornadoConfig, now: u64) {
        let rng = &mut self.rng;
        self.vortices.retain_mut(|vortex| {
            if vortex.is_despawn_requested() {
                info!("despawning vortex {:?}", vortex.id());
                vortex.dispose();
                return false;
            }

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                vortex.on_update(world, config, now, rng)
            }));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("vortex {:?}: {e}", vortex.id()),
                Err(_) => {
                    error!("vortex {:?} panicked during update; despawning", vortex.id());
                    vortex.request_despawn();
                }
            }
            true
        });
    }

    // ── Bulk operations ───────────────────────────────────────────────────────

    /// Cancels any build, stops alert sounds, disposes every vortex and clears
    /// leftover effects around the player.
    pub fn remove_all<H: WorldHost + AudioHost>(&mut self, host: &mut H) {
        if let Some(build) = self.pending.take() {
            build.abort();
        }
        self.sounds.stop_all(host);

        let count = self.vortices.len();
        for vortex in &mut self.vortices {
            vortex.dispose();
        }
        self.vortices.clear();

        if let Some(player_pos) = host.player().and_then(|p| host.entity_position(p)) {
            host.clear_fx_in_range(player_pos, REMOVE_ALL_FX_CLEAR_RADIUS);
        }
        let released = self.queue.flush(host);
        info!("removed {count} vortices ({released} host objects)");
    }

    /// Pushes `config` into every live vortex immediately.
    pub fn refresh_all(&mut self, config: &TornadoConfig, now: u64) {
        for vortex in &mut self.vortices {
            vortex.refresh_tuning(config, now);
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    #[inline]
    pub fn active_count(&self) -> usize {
        self.vortices.len()
    }

    #[inline]
    pub fn vortices(&self) -> &[Vortex] {
        &self.vortices
    }

    #[inline]
    pub fn first_vortex(&self) -> Option<&Vortex> {
        self.vortices.first()
    }

    #[inline]
    pub fn spawn_in_progress(&self) -> bool {
        self.pending.is_some()
    }

    #[inline]
    pub fn pending_build(&self) -> Option<&VortexBuild> {
        self.pending.as_ref()
    }

    #[inline]
    pub fn scheduled_spawn(&self) -> Option<ScheduledSpawn> {
        self.scheduled
    }

    #[inline]
    pub fn last_spawn_complete(&self) -> Option<u64> {
        self.last_spawn_complete
    }

    #[inline]
    pub fn eas_sound(&self) -> Option<SoundHandle> {
        self.sounds.eas
    }

    #[inline]
    pub fn siren_sound(&self) -> Option<SoundHandle> {
        self.sounds.siren
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostError, Weather};
    use crate::particle::FxState;
    use crate::testing::MockWorld;

    fn light_config() -> TornadoConfig {
        let mut config = TornadoConfig::default();
        config.vortex.movement_enabled = false;
        config.vortex_advanced.particles_per_layer = 2;
        config.vortex_advanced.max_particle_layers = 3;
        config.other.spawn_in_storm = false;
        config
    }

    fn factory() -> Factory {
        Factory::with_rng(StdRng::seed_from_u64(21))
    }

    /// Ticks until the pending build is registered; returns the time reached.
    fn finish_build(f: &mut Factory, world: &mut MockWorld, config: &TornadoConfig, mut now: u64) -> u64 {
        for _ in 0..1_000 {
            if !f.spawn_in_progress() {
                return now;
            }
            now += 16;
            world.advance_frame();
            f.on_update(world, config, now);
        }
        panic!("build never completed");
    }

    // ── create_vortex ─────────────────────────────────────────────────────────

    #[test]
    fn nan_position_is_rejected() {
        let mut world = MockWorld::new();
        let mut f = factory();
        let result = f.create_vortex(&mut world, Vec3::new(f32::NAN, 0.0, 0.0), &light_config(), 0);
        assert!(matches!(result, Err(TornadoError::InvalidSpawnPosition { .. })));
        assert!(!f.spawn_in_progress());
    }

    #[test]
    fn second_request_during_build_is_rejected() {
        let mut world = MockWorld::new();
        let mut f = factory();
        let config = light_config();
        f.create_vortex(&mut world, Vec3::ZERO, &config, 0).expect("first spawn");
        let second = f.create_vortex(&mut world, Vec3::new(50.0, 0.0, 0.0), &config, 10);
        assert_eq!(second, Err(TornadoError::SpawnInProgress));
    }

    #[test]
    fn cooldown_follows_completion() {
        let mut world = MockWorld::new();
        let mut f = factory();
        let config = light_config();
        f.create_vortex(&mut world, Vec3::ZERO, &config, 0).expect("spawn");
        let done = finish_build(&mut f, &mut world, &config, 0);
        assert_eq!(f.last_spawn_complete(), Some(done));

        let early = f.create_vortex(&mut world, Vec3::ZERO, &config, done + 500);
        assert_eq!(early, Err(TornadoError::SpawnCooldown { remaining_ms: 1_500 }));
        assert!(f
            .create_vortex(&mut world, Vec3::ZERO, &config, done + SPAWN_COOLDOWN_MS)
            .is_ok());
    }

    #[test]
    fn spawn_point_snaps_below_ground() {
        let mut world = MockWorld::new();
        let config = light_config();

        world.ground = Some(50.0);
        let mut f = factory();
        let ticket = f.create_vortex(&mut world, Vec3::new(1.0, 2.0, 300.0), &config, 0).expect("spawn");
        assert_eq!(ticket.position, Vec3::new(1.0, 2.0, 40.0));
        assert_eq!(world.cleared_fx().last(), Some(&(ticket.position, SPAWN_FX_CLEAR_RADIUS)));

        world.ground = Some(-5_000.0);
        let mut f = factory();
        let ticket = f.create_vortex(&mut world, Vec3::new(0.0, 0.0, 30.0), &config, 0).expect("spawn");
        assert_eq!(ticket.position.z, 20.0);

        world.ground = None;
        let mut f = factory();
        let ticket = f.create_vortex(&mut world, Vec3::new(0.0, 0.0, 30.0), &config, 0).expect("spawn");
        assert_eq!(ticket.position.z, 20.0);
    }

    #[test]
    fn completed_build_registers_and_notifies() {
        let mut world = MockWorld::new();
        let mut f = factory();
        let config = light_config();
        let ticket = f.create_vortex(&mut world, Vec3::ZERO, &config, 0).expect("spawn");
        assert_eq!(f.active_count(), 0);

        finish_build(&mut f, &mut world, &config, 0);
        assert_eq!(f.active_count(), 1);
        assert_eq!(f.first_vortex().map(Vortex::id), Some(ticket.id));
        assert!(world
            .notifications()
            .iter()
            .any(|n| n == "Tornado spawned nearby."));
    }

    #[test]
    fn limit_evicts_oldest_vortex() {
        let mut world = MockWorld::new();
        let mut f = factory();
        let mut config = light_config();
        config.vortex_advanced.max_particle_layers = 0;

        let mut now = 0;
        let mut first = None;
        for _ in 0..=VORTEX_LIMIT {
            let ticket = f.create_vortex(&mut world, Vec3::ZERO, &config, now).expect("spawn");
            first.get_or_insert(ticket.id);
            now = finish_build(&mut f, &mut world, &config, now) + SPAWN_COOLDOWN_MS;
            assert!(f.active_count() <= VORTEX_LIMIT);
        }
        assert_eq!(f.active_count(), VORTEX_LIMIT);
        assert!(f.vortices().iter().all(|v| Some(v.id()) != first));
        assert_eq!(world.marker_count(), VORTEX_LIMIT);
    }

    #[test]
    fn eviction_releases_oldest_vortex_host_objects() {
        let mut world = MockWorld::new();
        world.preload_all();
        let mut f = factory();
        let mut config = light_config();
        config.vortex.never_despawn = true;

        let mut now = 0;
        for _ in 0..VORTEX_LIMIT {
            f.create_vortex(&mut world, Vec3::ZERO, &config, now).expect("spawn");
            now = finish_build(&mut f, &mut world, &config, now) + SPAWN_COOLDOWN_MS;
        }
        f.on_update(&mut world, &config, now);
        assert_eq!(f.active_count(), VORTEX_LIMIT);

        let oldest = &f.vortices()[0];
        let evicted = oldest.id();
        let particles = oldest.particles().len();
        let running = oldest
            .particles()
            .iter()
            .filter(|p| matches!(p.fx_state(), FxState::Running(_)))
            .count();
        assert!(particles > 0);
        assert_eq!(running, particles);
        assert!(oldest.marker().is_some());
        let (anchors, fx, markers) = (world.anchor_count(), world.fx_count(), world.marker_count());

        f.create_vortex(&mut world, Vec3::ZERO, &config, now).expect("evicting spawn");
        f.queue.flush(&mut world);

        assert!(f.vortices().iter().all(|v| v.id() != evicted));
        assert_eq!(world.anchor_count(), anchors - particles);
        assert_eq!(world.fx_count(), fx - particles);
        assert_eq!(world.marker_count(), markers - 1);
    }

    #[test]
    fn build_failure_notifies_and_releases() {
        let mut world = MockWorld::new();
        let mut f = factory();
        let config = light_config();
        world.fail_anchor_creation(Some(HostError::Call {
            call: "create_anchor",
            message: "no script thread".into(),
        }));
        f.create_vortex(&mut world, Vec3::ZERO, &config, 0).expect("request accepted");
        f.on_update(&mut world, &config, 16);

        assert!(!f.spawn_in_progress());
        assert_eq!(f.active_count(), 0);
        assert!(world.notifications().iter().any(|n| n == "Tornado failed to spawn."));
        assert_eq!(world.anchor_count(), 0);
    }

    // ── Tick ──────────────────────────────────────────────────────────────────

    #[test]
    fn despawned_vortex_is_removed_and_released() {
        let mut world = MockWorld::new();
        let mut f = factory();
        let config = light_config();
        f.create_vortex(&mut world, Vec3::ZERO, &config, 0).expect("spawn");
        let now = finish_build(&mut f, &mut world, &config, 0);
        assert!(world.anchor_count() > 0);

        f.vortices[0].request_despawn();
        f.on_update(&mut world, &config, now + 16);
        assert_eq!(f.active_count(), 0);
        assert_eq!(world.anchor_count(), 0);
        assert_eq!(world.marker_count(), 0);
    }

    #[test]
    fn panicking_vortex_is_isolated() {
        let mut world = MockWorld::new();
        let mut f = factory();
        let config = light_config();
        f.create_vortex(&mut world, Vec3::ZERO, &config, 0).expect("spawn");
        let now = finish_build(&mut f, &mut world, &config, 0);

        world.panic_on_marker_move = true;
        f.on_update(&mut world, &config, now + 16);
        assert!(f.vortices()[0].is_despawn_requested());

        world.panic_on_marker_move = false;
        f.on_update(&mut world, &config, now + 32);
        assert_eq!(f.active_count(), 0);
        assert_eq!(world.anchor_count(), 0);
    }

    #[test]
    fn storm_schedules_spawn_and_raises_wind() {
        let mut world = MockWorld::new();
        world.spawn_player(Vec3::ZERO);
        world.previous_weather = Weather::Thunder;
        let mut f = factory();
        let mut config = light_config();
        config.other.spawn_in_storm = true;

        let mut now = 0;
        while f.scheduled_spawn().is_none() {
            now += STORM_CHECK_INTERVAL_MS + 1;
            assert!(now < 1_000_000, "storm never scheduled a spawn");
            f.on_update(&mut world, &config, now);
        }
        assert_eq!(world.wind_speed, STORM_WIND_SPEED);
        let scheduled = f.scheduled_spawn().expect("scheduled");
        assert!(scheduled.delay_ms < STORM_SPAWN_MAX_DELAY_MS);

        f.on_update(&mut world, &config, now + STORM_SPAWN_MAX_DELAY_MS + 1);
        assert!(f.scheduled_spawn().is_none());
        let build = f.pending_build().expect("storm spawn started");
        let distance = crate::math::distance_2d(build.vortex().position(), Vec3::ZERO);
        assert!((STORM_SPAWN_MIN_DISTANCE..=STORM_SPAWN_MIN_DISTANCE + STORM_SPAWN_DISTANCE_RANGE)
            .contains(&distance));
    }

    #[test]
    fn clear_weather_never_schedules() {
        let mut world = MockWorld::new();
        world.rain_level = 0.05;
        let mut f = factory();
        let mut config = light_config();
        config.other.spawn_in_storm = true;
        for tick in 1..200u64 {
            f.on_update(&mut world, &config, tick * 1_001);
        }
        assert!(f.scheduled_spawn().is_none());
    }

    #[test]
    fn alert_sounds_follow_config_and_vortex_count() {
        let mut world = MockWorld::new();
        let mut f = factory();
        let mut config = light_config();
        config.audio.enable_eas = true;
        config.audio.enable_sirens = true;
        f.create_vortex(&mut world, Vec3::ZERO, &config, 0).expect("spawn");
        let now = finish_build(&mut f, &mut world, &config, 0);
        assert!(f.eas_sound().is_some() && f.siren_sound().is_some());
        assert_eq!(world.playing_sounds().len(), 2);

        config.audio.siren_volume = 0.2;
        f.on_update(&mut world, &config, now + 16);
        let siren = f.siren_sound().expect("siren");
        assert_eq!(world.sound_volume(siren), Some(0.2));

        config.audio.enable_eas = false;
        f.on_update(&mut world, &config, now + 32);
        assert!(f.eas_sound().is_none());
        assert_eq!(world.playing_sounds().len(), 1);

        f.remove_all(&mut world);
        assert!(world.playing_sounds().is_empty());
    }

    #[test]
    fn remove_all_aborts_build_and_clears_around_player() {
        let mut world = MockWorld::new();
        let player = world.spawn_player(Vec3::new(7.0, 7.0, 0.0));
        let mut f = factory();
        let config = light_config();
        f.create_vortex(&mut world, Vec3::ZERO, &config, 0).expect("spawn");
        let now = finish_build(&mut f, &mut world, &config, 0);
        f.create_vortex(&mut world, Vec3::new(90.0, 0.0, 0.0), &config, now + SPAWN_COOLDOWN_MS)
            .expect("second spawn");
        f.on_update(&mut world, &config, now + SPAWN_COOLDOWN_MS + 16);

        f.remove_all(&mut world);
        assert_eq!(f.active_count(), 0);
        assert!(!f.spawn_in_progress());
        assert_eq!(world.anchor_count(), 0);
        assert_eq!(world.marker_count(), 0);
        let player_pos = world.entity_position(player).expect("player");
        assert_eq!(
            world.cleared_fx().last(),
            Some(&(player_pos, REMOVE_ALL_FX_CLEAR_RADIUS))
        );
    }
}
