//! A single rotating point of the funnel.
//!
//! Each particle orbits the vortex axis at a fixed radius and height, carrying
//! a looped visual effect on an invisible anchor object.  It owns the anchor
//! and the effect through [`HostObject`], so dropping a particle (or calling
//! [`Particle::dispose`]) always releases both.
//!
//! A particle whose anchor could not be created is *degraded*: it keeps its
//! slot in the vortex but never moves and never shows an effect.

use std::f32::consts::TAU;

use bevy::log::{error, warn};
use bevy::math::{Quat, Vec3};

use crate::config::TornadoConfig;
use crate::constants::*;
use crate::host::{EntityHandle, FxHandle, HostError, WorldHost};
use crate::math::{euler_to_quat, rotate_vector};
use crate::release::{HostObject, ReleaseQueue};
use crate::wait::{BoundedWait, WaitStatus};

/// Everything needed to place one particle.
#[derive(Debug, Clone)]
pub struct ParticleSpec {
    /// Vortex base position at build time; only used for the anchor's spawn point.
    pub base: Vec3,
    /// Roll/pitch/yaw (radians) of the particle's orbit frame.
    pub orientation: Vec3,
    pub fx_asset: String,
    pub fx_name: String,
    pub radius: f32,
    pub layer: usize,
    pub cloud_top: bool,
    /// Extra height above the layer's regular offset (cloud ring only).
    pub lift: f32,
}

/// Rotation tunables cached from the config snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleTuning {
    pub rotation_speed: f32,
    pub reverse_rotation: bool,
}

impl ParticleTuning {
    pub fn from_config(config: &TornadoConfig) -> Self {
        Self {
            rotation_speed: config.vortex.rotation_speed,
            reverse_rotation: config.vortex.reverse_rotation,
        }
    }

    /// Signed rotation speed.
    #[inline]
    pub fn signed_speed(&self) -> f32 {
        if self.reverse_rotation {
            -self.rotation_speed
        } else {
            self.rotation_speed
        }
    }
}

/// Lifecycle of the particle's visual effect.
#[derive(Debug)]
pub enum FxState {
    Idle,
    Loading {
        scale: f32,
        wait: BoundedWait,
    },
    Running(HostObject<FxHandle>),
    /// Asset never loaded or the effect refused to start; permanent.
    Failed,
}

/// Rotation multiplier for `layer`.  Decreases with height and bottoms out
/// at [`LAYER_WEIGHT_FLOOR`] so upper layers turn slower but never stop.
pub fn layer_weight(layer: usize, max_layers: i64) -> f32 {
    let max_layers = max_layers.max(1) as f32;
    let layer = layer as f32;
    let mut weight = 1.0 - layer / (max_layers * 4.0);
    weight *= 0.1 * layer;
    weight = 1.0 - weight;
    weight.max(LAYER_WEIGHT_FLOOR)
}

/// Keeps an orbit angle inside `[-TAU, TAU]`.  Non-finite angles reset to 0.
#[inline]
pub fn wrap_angle(angle: f32) -> f32 {
    if !angle.is_finite() {
        0.0
    } else if !(-TAU..=TAU).contains(&angle) {
        angle % TAU
    } else {
        angle
    }
}

#[derive(Debug)]
pub struct Particle {
    layer: usize,
    cloud_top: bool,
    offset: Vec3,
    rotation: Quat,
    radius: f32,
    angle: f32,
    layer_weight: f32,
    fx_asset: String,
    fx_name: String,
    anchor: Option<HostObject<EntityHandle>>,
    fx: FxState,
    tuning: ParticleTuning,
    tuning_refreshed_at: u64,
    queue: ReleaseQueue,
}

impl Particle {
    /// Creates the particle and its anchor.  Pool exhaustion or a model that
    /// never streamed in leaves the particle degraded; any other host failure
    /// is returned so the build can abort.
    pub fn create(
        world: &mut impl WorldHost,
        spec: ParticleSpec,
        config: &TornadoConfig,
        queue: &ReleaseQueue,
        now: u64,
    ) -> Result<Self, HostError> {
        let offset = Vec3::new(
            0.0,
            0.0,
            config.vortex_advanced.layer_separation * spec.layer as f32 + spec.lift,
        );

        let anchor = match world.create_anchor(ANCHOR_MODEL, spec.base + offset) {
            Ok(handle) => Some(HostObject::new(handle, queue)),
            Err(e) if e.is_degradable() => {
                warn!("particle on layer {} degraded: {e}", spec.layer);
                None
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            layer: spec.layer,
            cloud_top: spec.cloud_top,
            offset,
            rotation: euler_to_quat(spec.orientation.x, spec.orientation.y, spec.orientation.z),
            radius: spec.radius,
            angle: 0.0,
            layer_weight: layer_weight(spec.layer, config.vortex_advanced.max_particle_layers),
            fx_asset: spec.fx_asset,
            fx_name: spec.fx_name,
            anchor,
            fx: FxState::Idle,
            tuning: ParticleTuning::from_config(config),
            tuning_refreshed_at: now,
            queue: queue.clone(),
        })
    }

    /// Starts the looped effect at `scale`.  If the effect asset is still
    /// streaming, the start is deferred and retried on later updates until
    /// the poll budget runs out.  A no-op for degraded particles.
    pub fn start_fx(&mut self, world: &mut impl WorldHost, scale: f32) {
        if self.anchor.is_none() {
            return;
        }
        if world.fx_asset_loaded(&self.fx_asset) {
            self.attach_fx(world, scale);
        } else {
            world.request_fx_asset(&self.fx_asset);
            self.fx = FxState::Loading {
                scale,
                wait: BoundedWait::new(PARTICLE_FX_WAIT_ATTEMPTS),
            };
        }
    }

    fn attach_fx(&mut self, world: &mut impl WorldHost, scale: f32) {
        let Some(anchor) = self.anchor.as_ref().map(HostObject::handle) else {
            return;
        };
        self.fx = match world.start_looped_fx(&self.fx_asset, &self.fx_name, anchor, scale) {
            Ok(fx) => FxState::Running(HostObject::new(fx, &self.queue)),
            Err(e) => {
                error!("effect {}/{} failed to start: {e}", self.fx_asset, self.fx_name);
                FxState::Failed
            }
        };
    }

    fn poll_fx(&mut self, world: &mut impl WorldHost) {
        let FxState::Loading { scale, wait } = &mut self.fx else {
            return;
        };
        let scale = *scale;
        match wait.poll(world.fx_asset_loaded(&self.fx_asset)) {
            WaitStatus::Pending => {}
            WaitStatus::Ready => self.attach_fx(world, scale),
            WaitStatus::TimedOut => {
                let err = wait.timeout_error(&self.fx_asset);
                error!("effect {} not started: {err}", self.fx_name);
                self.fx = FxState::Failed;
            }
        }
    }

    /// Re-reads the rotation tunables from `config` immediately.
    pub fn refresh_tuning(&mut self, config: &TornadoConfig, now: u64) {
        self.tuning = ParticleTuning::from_config(config);
        self.tuning_refreshed_at = now;
    }

    /// Moves the anchor to its orbit position around `center` and advances
    /// the orbit angle by one frame.
    pub fn on_update(
        &mut self,
        world: &mut impl WorldHost,
        center: Vec3,
        config: &TornadoConfig,
        now: u64,
    ) {
        if now.saturating_sub(self.tuning_refreshed_at) > PARTICLE_TUNING_REFRESH_MS {
            self.refresh_tuning(config, now);
        }

        let Some(anchor) = self.anchor.as_ref().map(HostObject::handle) else {
            return;
        };
        if !world.entity_exists(anchor) {
            self.remove_fx();
            return;
        }
        self.poll_fx(world);

        world.move_anchor(anchor, self.world_position(center));

        let weight = if self.cloud_top {
            CLOUD_TOP_ROTATION_WEIGHT
        } else {
            self.layer_weight
        };
        self.angle -= self.tuning.signed_speed() * weight * world.frame_time();
        self.angle = wrap_angle(self.angle);
    }

    /// Where the anchor sits for the current angle around `center`.
    pub fn world_position(&self, center: Vec3) -> Vec3 {
        let (sin, cos) = self.angle.sin_cos();
        let relative = Vec3::new(self.radius * cos, self.radius * sin, 0.0);
        center + self.offset + rotate_vector(relative, self.rotation)
    }

    fn remove_fx(&mut self) {
        if matches!(self.fx, FxState::Running(_) | FxState::Loading { .. }) {
            self.fx = FxState::Idle;
        }
    }

    /// Stops the effect and releases the anchor.  Safe to call repeatedly.
    pub fn dispose(&mut self) {
        self.remove_fx();
        self.anchor = None;
    }

    #[inline]
    pub fn layer(&self) -> usize {
        self.layer
    }

    #[inline]
    pub fn angle(&self) -> f32 {
        self.angle
    }

    #[inline]
    pub fn radius(&self) -> f32 {
        self.radius
    }

    #[inline]
    pub fn offset(&self) -> Vec3 {
        self.offset
    }

    #[inline]
    pub fn is_cloud_top(&self) -> bool {
        self.cloud_top
    }

    #[inline]
    pub fn is_degraded(&self) -> bool {
        self.anchor.is_none()
    }

    #[inline]
    pub fn anchor(&self) -> Option<EntityHandle> {
        self.anchor.as_ref().map(HostObject::handle)
    }

    #[inline]
    pub fn fx_state(&self) -> &FxState {
        &self.fx
    }

    #[inline]
    pub fn fx_asset(&self) -> &str {
        &self.fx_asset
    }
}
