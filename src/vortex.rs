//! One simulated tornado.
//!
//! A [`Vortex`] owns its particle layers, the set of entities it is currently
//! pulling, and a map marker.  The factory advances it once per tick through
//! [`Vortex::on_update`]:
//!
//! 1. life-span check (may request despawn),
//! 2. destination-seeking movement ([`movement`]),
//! 3. map marker refresh,
//! 4. rate-limited entity collection ([`entities`]),
//! 5. suction, lift and tangential forces on tracked entities,
//! 6. particle orbit updates.
//!
//! Construction of the particle layers is a separate, resumable process in
//! [`build`] so it can yield back to the host between frames.

pub mod build;
pub mod entities;
pub mod movement;

use std::collections::BTreeMap;

use bevy::log::{info, warn};
use bevy::math::Vec3;
use rand::Rng;

use crate::config::TornadoConfig;
use crate::constants::*;
use crate::error::{SimResult, TornadoError};
use crate::host::{EntityHandle, MarkerHandle, WorldHost};
use crate::particle::Particle;
use crate::release::{HostObject, ReleaseQueue};

pub use build::{BuildPlan, BuildProgress, BuildStage, VortexBuild};

/// Identifier assigned by the factory, unique for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VortexId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VortexState {
    /// Particles are still being constructed.
    Building,
    /// Steady-state per-tick updates.
    Active,
    /// Terminal; the owner must dispose the vortex.
    DespawnRequested,
}

/// How long a vortex lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifeSpan {
    Finite(u64),
    Unbounded,
}

/// A pulled entity plus the small lateral bias that keeps suction from
/// looking perfectly radial.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveEntity {
    pub handle: EntityHandle,
    pub x_bias: f32,
    pub y_bias: f32,
    pub is_player: bool,
}

/// Force and capture tunables cached from the config snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VortexTuning {
    pub vertical_force: f32,
    pub horizontal_force: f32,
    pub max_entity_speed: f32,
    pub max_entity_distance: f32,
    pub max_entity_count: usize,
    pub movement_enabled: bool,
    pub move_speed_scale: f32,
}

impl VortexTuning {
    pub fn from_config(config: &TornadoConfig) -> Self {
        Self {
            vertical_force: config.vortex.vertical_force_scale,
            horizontal_force: config.vortex.horizontal_force_scale,
            max_entity_speed: config.vortex.max_entity_speed,
            max_entity_distance: config.vortex.max_entity_distance,
            max_entity_count: config.vortex.max_entity_count,
            movement_enabled: config.vortex.movement_enabled,
            move_speed_scale: config.vortex.move_speed_scale,
        }
    }
}

/// Cached result of the player line-of-sight ray.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SightCache {
    pub checked_at: Option<u64>,
    pub blocked: bool,
}

impl SightCache {
    pub fn is_stale(&self, now: u64) -> bool {
        match self.checked_at {
            None => true,
            Some(t) => now.saturating_sub(t) > SIGHT_CACHE_MS,
        }
    }
}

#[derive(Debug)]
pub struct Vortex {
    id: VortexId,
    state: VortexState,
    position: Vec3,
    destination: Option<Vec3>,
    created_at: u64,
    life_span: LifeSpan,
    particles: Vec<Particle>,
    pulled: BTreeMap<EntityHandle, ActiveEntity>,
    pending_removal: Vec<EntityHandle>,
    next_scan_at: u64,
    tuning: VortexTuning,
    tuning_refreshed_at: u64,
    sight: SightCache,
    marker: Option<HostObject<MarkerHandle>>,
    queue: ReleaseQueue,
}

impl Vortex {
    /// A new vortex in the `Building` state.  The life span is drawn uniformly
    /// from `[LIFE_SPAN_MIN_MS, LIFE_SPAN_MAX_MS]` unless `never_despawn`.
    pub fn new(
        id: VortexId,
        position: Vec3,
        config: &TornadoConfig,
        now: u64,
        rng: &mut impl Rng,
        queue: &ReleaseQueue,
    ) -> Self {
        let life_span = if config.vortex.never_despawn {
            LifeSpan::Unbounded
        } else {
            LifeSpan::Finite(rng.gen_range(LIFE_SPAN_MIN_MS..=LIFE_SPAN_MAX_MS))
        };
        Self {
            id,
            state: VortexState::Building,
            position,
            destination: None,
            created_at: now,
            life_span,
            particles: Vec::new(),
            pulled: BTreeMap::new(),
            pending_removal: Vec::new(),
            next_scan_at: 0,
            tuning: VortexTuning::from_config(config),
            tuning_refreshed_at: now,
            sight: SightCache::default(),
            marker: None,
            queue: queue.clone(),
        }
    }

    /// Overrides the drawn life span.
    pub fn with_life_span(mut self, life_span: LifeSpan) -> Self {
        self.life_span = life_span;
        self
    }

    /// One simulation tick.  Host failures surface as errors after the rest of
    /// the tick has still run, so one bad call does not freeze the funnel.
    pub fn on_update(
        &mut self,
        world: &mut impl WorldHost,
        config: &TornadoConfig,
        now: u64,
        rng: &mut impl Rng,
    ) -> SimResult<()> {
        if self.is_expired(now) && self.state != VortexState::DespawnRequested {
            info!("vortex {:?} reached the end of its life span", self.id);
            self.request_despawn();
        }

        let previous = self.position;
        self.advance(world, rng);
        if !self.position.is_finite() {
            self.position = previous;
            self.destination = None;
            return Err(TornadoError::NonFinitePosition {
                context: "vortex movement",
            });
        }

        let marker_result = self.refresh_marker(world);

        self.collect_nearby_entities(world, now, rng);
        self.update_pulled_entities(world, config, now, rng);

        for particle in &mut self.particles {
            particle.on_update(world, self.position, config, now);
        }

        marker_result
    }

    fn is_expired(&self, now: u64) -> bool {
        match self.life_span {
            LifeSpan::Finite(span) => now >= self.created_at.saturating_add(span),
            LifeSpan::Unbounded => false,
        }
    }

    fn refresh_marker(&mut self, world: &mut impl WorldHost) -> SimResult<()> {
        match &self.marker {
            Some(marker) => {
                world.move_marker(marker.handle(), self.position);
                Ok(())
            }
            None => match world.create_marker(self.position, MARKER_LABEL) {
                Ok(handle) => {
                    self.marker = Some(HostObject::new(handle, &self.queue));
                    Ok(())
                }
                Err(e) if e.is_degradable() => {
                    warn!("vortex {:?} has no map marker: {e}", self.id);
                    Ok(())
                }
                Err(e) => Err(TornadoError::host("map marker", e)),
            },
        }
    }

    /// Re-reads the cached tunables of the vortex and all its particles now.
    pub fn refresh_tuning(&mut self, config: &TornadoConfig, now: u64) {
        self.tuning = VortexTuning::from_config(config);
        self.tuning_refreshed_at = now;
        for particle in &mut self.particles {
            particle.refresh_tuning(config, now);
        }
    }

    pub fn request_despawn(&mut self) {
        self.state = VortexState::DespawnRequested;
    }

    pub(crate) fn mark_active(&mut self) {
        if self.state == VortexState::Building {
            self.state = VortexState::Active;
        }
    }

    pub(crate) fn push_particle(&mut self, particle: Particle) {
        self.particles.push(particle);
    }

    /// Releases every particle, tracked entity and the map marker.  The host
    /// objects are queued on the release queue; the factory flushes it.
    /// Safe to call more than once.
    pub fn dispose(&mut self) {
        self.marker = None;
        for particle in &mut self.particles {
            particle.dispose();
        }
        self.particles.clear();
        self.pulled.clear();
        self.pending_removal.clear();
        self.state = VortexState::DespawnRequested;
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    #[inline]
    pub fn id(&self) -> VortexId {
        self.id
    }

    #[inline]
    pub fn state(&self) -> VortexState {
        self.state
    }

    #[inline]
    pub fn is_despawn_requested(&self) -> bool {
        self.state == VortexState::DespawnRequested
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    #[inline]
    pub fn destination(&self) -> Option<Vec3> {
        self.destination
    }

    pub fn set_destination(&mut self, destination: Option<Vec3>) {
        self.destination = destination;
    }

    #[inline]
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    #[inline]
    pub fn life_span(&self) -> LifeSpan {
        self.life_span
    }

    #[inline]
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    #[inline]
    pub fn pulled_entities(&self) -> &BTreeMap<EntityHandle, ActiveEntity> {
        &self.pulled
    }

    #[inline]
    pub fn tuning(&self) -> &VortexTuning {
        &self.tuning
    }

    #[inline]
    pub fn marker(&self) -> Option<MarkerHandle> {
        self.marker.as_ref().map(HostObject::handle)
    }
}
