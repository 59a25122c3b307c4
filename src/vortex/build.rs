//! Resumable construction of a vortex's particle layers.
//!
//! Building a full funnel creates a few hundred host objects and has to wait
//! for effect assets to stream in.  Doing that inside one frame would stall
//! the host, so [`VortexBuild`] is a small state machine stepped once per
//! tick by the factory:
//!
//! ```text
//! Preloading ──(assets ready or poll budget spent)──▶ Spawning
//! Spawning   ──(yields once BUILD_YIELD_EVERY particles are created)──▶ Spawning
//! Spawning   ──(last layer done)──▶ Settling ──▶ Done
//! ```
//!
//! Asset preloading fails open: after [`ASSET_WAIT_ATTEMPTS`] polls the build
//! proceeds and individual particles degrade instead.

use bevy::log::{debug, info, warn};
use bevy::math::Vec3;

use super::{Vortex, VortexId};
use crate::config::TornadoConfig;
use crate::constants::*;
use crate::error::{SimResult, TornadoError};
use crate::host::WorldHost;
use crate::particle::{Particle, ParticleSpec};
use crate::wait::{BoundedWait, WaitStatus};

/// Layer layout derived from the config snapshot at spawn time.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildPlan {
    pub radius: f32,
    /// Clamped to `1..=MAX_PARTICLES_PER_LAYER_CAP`.
    pub particles_per_layer: usize,
    pub layers: usize,
    /// Angular spacing between slots, whole degrees.
    pub slot_degrees: i64,
    pub cloud_top: bool,
    pub particle_asset: String,
    pub particle_name: String,
}

impl BuildPlan {
    pub fn from_config(config: &TornadoConfig) -> Self {
        let advanced = &config.vortex_advanced;
        let per_layer = advanced
            .particles_per_layer
            .min(MAX_PARTICLES_PER_LAYER_CAP)
            .max(1);
        let cloud_top = advanced.cloud_top_enabled;
        let layers = if cloud_top {
            CLOUD_TOP_LAYER_COUNT
        } else {
            advanced.max_particle_layers.clamp(0, MAX_LAYERS_CAP) as usize
        };

        Self {
            radius: config.vortex.radius,
            particles_per_layer: per_layer as usize,
            layers,
            slot_degrees: 360 / per_layer,
            cloud_top,
            particle_asset: advanced.particle_asset.clone(),
            particle_name: advanced.particle_name.clone(),
        }
    }

    /// The top [`WIDE_LAYER_DEPTH`]` - 1` layers carry extra particles.
    pub fn particles_in_layer(&self, layer: usize) -> usize {
        if layer + WIDE_LAYER_DEPTH > self.layers {
            self.particles_per_layer + WIDE_LAYER_EXTRA
        } else {
            self.particles_per_layer
        }
    }

    /// Orbit frame for `slot`: a roll of `slot * slot_degrees`, in radians.
    pub fn slot_orientation(&self, slot: usize) -> Vec3 {
        let degrees = (slot as i64 * self.slot_degrees) as f32;
        Vec3::new(degrees.to_radians(), 0.0, 0.0)
    }

    /// Whether `layer` belongs to the cloud ring.
    pub fn is_cloud_layer(&self, layer: usize) -> bool {
        self.cloud_top && layer + CLOUD_TOP_DEPTH > self.layers
    }

    /// Main plus decoration particles the finished build will hold.
    pub fn total_particles(&self) -> usize {
        (0..self.layers)
            .map(|layer| {
                let main = self.particles_in_layer(layer);
                let decoration = if layer < DECORATION_LAYERS {
                    main.div_ceil(2)
                } else {
                    0
                };
                main + decoration
            })
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Preloading(BoundedWait),
    Spawning { layer: usize, slot: usize },
    /// Frames left before the vortex is handed over.
    Settling(u32),
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildProgress {
    Pending,
    Complete,
}

/// An in-flight vortex build.  Dropping it (or calling [`abort`](Self::abort))
/// releases every particle created so far.
#[derive(Debug)]
pub struct VortexBuild {
    vortex: Vortex,
    plan: BuildPlan,
    stage: BuildStage,
    radius: f32,
    size: f32,
    since_yield: usize,
}

impl VortexBuild {
    /// Requests the effect assets and anchor model, then waits for them on
    /// the following steps.
    pub fn start(world: &mut impl WorldHost, vortex: Vortex, plan: BuildPlan) -> Self {
        info!(
            "vortex {:?}: building {} layers x {} particles",
            vortex.id(),
            plan.layers,
            plan.particles_per_layer
        );
        if plan.particle_asset != CORE_FX_ASSET {
            world.request_fx_asset(&plan.particle_asset);
        }
        world.request_fx_asset(DECORATION_FX_ASSET);
        world.request_model(ANCHOR_MODEL);

        Self {
            radius: plan.radius,
            size: BASE_PARTICLE_SIZE,
            since_yield: 0,
            vortex,
            plan,
            stage: BuildStage::Preloading(BoundedWait::new(ASSET_WAIT_ATTEMPTS)),
        }
    }

    /// Advances the build by at most one frame's worth of work.
    pub fn step(
        &mut self,
        world: &mut impl WorldHost,
        config: &TornadoConfig,
        now: u64,
    ) -> SimResult<BuildProgress> {
        loop {
            match self.stage {
                BuildStage::Preloading(mut wait) => {
                    let status = wait.poll_with(|| self.assets_ready(&*world));
                    match status {
                        WaitStatus::Pending => {
                            self.stage = BuildStage::Preloading(wait);
                            return Ok(BuildProgress::Pending);
                        }
                        WaitStatus::Ready => {
                            debug!("vortex {:?}: assets loaded", self.vortex.id());
                        }
                        WaitStatus::TimedOut => {
                            let asset = self.missing_asset(&*world).unwrap_or(ANCHOR_MODEL);
                            let err = wait.timeout_error(asset);
                            warn!("vortex {:?}: {err}, building anyway", self.vortex.id());
                        }
                    }
                    self.stage = BuildStage::Spawning { layer: 0, slot: 0 };
                }
                BuildStage::Spawning { layer, slot } => {
                    if layer >= self.plan.layers {
                        info!(
                            "vortex {:?}: build complete, {} particles",
                            self.vortex.id(),
                            self.vortex.particles().len()
                        );
                        self.stage = BuildStage::Settling(BUILD_SETTLE_FRAMES);
                        continue;
                    }
                    if slot >= self.plan.particles_in_layer(layer) {
                        debug!(
                            "vortex {:?}: built layer {layer} ({} particles)",
                            self.vortex.id(),
                            self.vortex.particles().len()
                        );
                        self.stage = BuildStage::Spawning {
                            layer: layer + 1,
                            slot: 0,
                        };
                        continue;
                    }

                    self.spawn_slot(world, config, now, layer, slot)?;
                    self.stage = BuildStage::Spawning {
                        layer,
                        slot: slot + 1,
                    };
                    if self.since_yield >= BUILD_YIELD_EVERY {
                        self.since_yield = 0;
                        return Ok(BuildProgress::Pending);
                    }
                }
                BuildStage::Settling(0) => {
                    self.stage = BuildStage::Done;
                    return Ok(BuildProgress::Complete);
                }
                BuildStage::Settling(frames) => {
                    self.stage = BuildStage::Settling(frames - 1);
                    return Ok(BuildProgress::Pending);
                }
                BuildStage::Done => return Ok(BuildProgress::Complete),
            }
        }
    }

    fn assets_ready(&self, world: &impl WorldHost) -> bool {
        self.missing_asset(world).is_none()
    }

    /// First preload dependency the host has not finished streaming.
    fn missing_asset(&self, world: &impl WorldHost) -> Option<&str> {
        if self.plan.particle_asset != CORE_FX_ASSET
            && !world.fx_asset_loaded(&self.plan.particle_asset)
        {
            return Some(&self.plan.particle_asset);
        }
        if !world.fx_asset_loaded(DECORATION_FX_ASSET) {
            return Some(DECORATION_FX_ASSET);
        }
        if !world.model_loaded(ANCHOR_MODEL) {
            return Some(ANCHOR_MODEL);
        }
        None
    }

    fn spawn_slot(
        &mut self,
        world: &mut impl WorldHost,
        config: &TornadoConfig,
        now: u64,
        layer: usize,
        slot: usize,
    ) -> SimResult<()> {
        let base = self.vortex.position();
        let orientation = self.plan.slot_orientation(slot);

        if layer < DECORATION_LAYERS && slot % 2 == 0 {
            let spec = ParticleSpec {
                base,
                orientation,
                fx_asset: DECORATION_FX_ASSET.to_string(),
                fx_name: DECORATION_FX_NAME.to_string(),
                radius: self.radius,
                layer,
                cloud_top: false,
                lift: 0.0,
            };
            self.add_particle(world, spec, config, now, DECORATION_FX_SCALE)?;
        }

        let cloud_top = self.plan.is_cloud_layer(layer);
        let mut lift = 0.0;
        if cloud_top {
            lift = CLOUD_TOP_LIFT;
            self.size += CLOUD_TOP_SIZE_GROWTH;
            self.radius += CLOUD_TOP_RADIUS_GROWTH;
        }

        let spec = ParticleSpec {
            base,
            orientation,
            fx_asset: self.plan.particle_asset.clone(),
            fx_name: self.plan.particle_name.clone(),
            radius: self.radius,
            layer,
            cloud_top,
            lift,
        };
        self.add_particle(world, spec, config, now, self.size)?;

        self.radius += LAYER_RADIUS_GROWTH * layer as f32;
        self.size += LAYER_SIZE_GROWTH * layer as f32;
        Ok(())
    }

    fn add_particle(
        &mut self,
        world: &mut impl WorldHost,
        spec: ParticleSpec,
        config: &TornadoConfig,
        now: u64,
        scale: f32,
    ) -> SimResult<()> {
        let mut particle = Particle::create(world, spec, config, &self.vortex.queue, now)
            .map_err(|e| TornadoError::host("particle anchor", e))?;
        particle.start_fx(world, scale);
        if let Some(anchor) = particle.anchor() {
            world.add_threat_event(anchor);
        }
        self.vortex.push_particle(particle);
        self.since_yield += 1;
        Ok(())
    }

    /// Hands over the built vortex, ready for per-tick updates.
    pub fn finish(mut self) -> Vortex {
        self.vortex.mark_active();
        self.vortex
    }

    /// Cancels the build and queues every host object it created for release.
    pub fn abort(mut self) {
        warn!("vortex {:?}: build aborted", self.vortex.id());
        self.vortex.dispose();
    }

    #[inline]
    pub fn id(&self) -> VortexId {
        self.vortex.id()
    }

    #[inline]
    pub fn vortex(&self) -> &Vortex {
        &self.vortex
    }

    #[inline]
    pub fn plan(&self) -> &BuildPlan {
        &self.plan
    }

    #[inline]
    pub fn stage(&self) -> BuildStage {
        self.stage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostError;
    use crate::release::ReleaseQueue;
    use crate::testing::MockWorld;
    use crate::vortex::VortexState;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn config_with(per_layer: i64, layers: i64) -> TornadoConfig {
        let mut config = TornadoConfig::default();
        config.vortex_advanced.particles_per_layer = per_layer;
        config.vortex_advanced.max_particle_layers = layers;
        config
    }

    fn start(world: &mut MockWorld, config: &TornadoConfig, queue: &ReleaseQueue) -> VortexBuild {
        let mut rng = StdRng::seed_from_u64(4);
        let vortex = Vortex::new(VortexId(1), Vec3::new(0.0, 0.0, -10.0), config, 0, &mut rng, queue);
        VortexBuild::start(world, vortex, BuildPlan::from_config(config))
    }

    /// Steps until complete; returns the number of steps taken.
    fn run(build: &mut VortexBuild, world: &mut MockWorld, config: &TornadoConfig) -> usize {
        for steps in 1..10_000 {
            world.advance_frame();
            let progress = build.step(world, config, steps as u64 * 16).expect("build step");
            if progress == BuildProgress::Complete {
                return steps;
            }
        }
        panic!("build never completed");
    }

    // ── Plan ──────────────────────────────────────────────────────────────────

    #[test]
    fn plan_clamps_particles_and_layers() {
        let zero = BuildPlan::from_config(&config_with(0, 10));
        assert_eq!(zero.particles_per_layer, 1);
        assert_eq!(zero.slot_degrees, 360);

        let many = BuildPlan::from_config(&config_with(9, 48));
        assert_eq!(many.particles_per_layer, 6);
        assert_eq!(many.layers, 36);
        assert_eq!(many.slot_degrees, 60);

        let negative = BuildPlan::from_config(&config_with(-4, -2));
        assert_eq!(negative.particles_per_layer, 1);
        assert_eq!(negative.layers, 0);
    }

    #[test]
    fn cloud_top_uses_fixed_layer_count() {
        let mut config = config_with(4, 30);
        config.vortex_advanced.cloud_top_enabled = true;
        let plan = BuildPlan::from_config(&config);
        assert_eq!(plan.layers, CLOUD_TOP_LAYER_COUNT);
        assert!(!plan.is_cloud_layer(5));
        assert!(plan.is_cloud_layer(6));
        assert!(plan.is_cloud_layer(7));
    }

    #[test]
    fn top_three_layers_are_wider() {
        let plan = BuildPlan::from_config(&config_with(3, 10));
        assert_eq!(plan.particles_in_layer(6), 3);
        assert_eq!(plan.particles_in_layer(7), 5);
        assert_eq!(plan.particles_in_layer(9), 5);
    }

    #[test]
    fn slot_orientation_is_in_radians() {
        let plan = BuildPlan::from_config(&config_with(4, 10));
        let o = plan.slot_orientation(1);
        assert!((o.x - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
        assert_eq!(o.y, 0.0);
    }

    // ── Build ─────────────────────────────────────────────────────────────────

    #[test]
    fn preload_timeout_names_blocked_asset_and_builds_anyway() {
        let mut world = MockWorld::new();
        world.block_asset(DECORATION_FX_ASSET);
        let config = config_with(2, 2);
        let queue = ReleaseQueue::new();
        let mut build = start(&mut world, &config, &queue);
        assert_eq!(build.missing_asset(&world), Some(DECORATION_FX_ASSET));

        let steps = run(&mut build, &mut world, &config);
        assert!(steps > ASSET_WAIT_ATTEMPTS as usize);
        assert!(!build.vortex().particles().is_empty());
    }

    #[test]
    fn small_build_creates_main_and_decoration_particles() {
        let mut world = MockWorld::new();
        let config = config_with(2, 5);
        let queue = ReleaseQueue::new();
        let mut build = start(&mut world, &config, &queue);
        run(&mut build, &mut world, &config);

        // Layers 0-1: two main + one decoration each; layers 2-4: four main.
        let vortex = build.finish();
        assert_eq!(vortex.particles().len(), 18);
        assert_eq!(vortex.state(), VortexState::Active);
        let decorations = vortex
            .particles()
            .iter()
            .filter(|p| p.fx_asset() == DECORATION_FX_ASSET)
            .count();
        assert_eq!(decorations, 2);
        assert_eq!(world.threat_events().len(), 18);
        assert_eq!(BuildPlan::from_config(&config).total_particles(), 18);
    }

    #[test]
    fn build_yields_every_few_particles() {
        let mut world = MockWorld::new();
        let config = config_with(6, 12);
        let queue = ReleaseQueue::new();
        let mut build = start(&mut world, &config, &queue);

        let mut last = 0;
        loop {
            world.advance_frame();
            let progress = build.step(&mut world, &config, 0).expect("build step");
            let now = build.vortex().particles().len();
            assert!(now - last <= BUILD_YIELD_EVERY + 1, "one step built {}", now - last);
            last = now;
            if progress == BuildProgress::Complete {
                break;
            }
        }
        assert_eq!(last, BuildPlan::from_config(&config).total_particles());
    }

    #[test]
    fn build_waits_for_streaming_particle_asset() {
        let mut world = MockWorld::new();
        world.set_asset_latency(4);
        let mut config = config_with(1, 1);
        config.vortex_advanced.particle_asset = "scr_custom".into();
        let queue = ReleaseQueue::new();
        let mut build = start(&mut world, &config, &queue);

        assert_eq!(build.step(&mut world, &config, 0).expect("step"), BuildProgress::Pending);
        assert!(build.vortex().particles().is_empty());
        assert!(matches!(build.stage(), BuildStage::Preloading(_)));

        run(&mut build, &mut world, &config);
        assert!(!build.vortex().particles().is_empty());
    }

    #[test]
    fn preload_timeout_proceeds_anyway() {
        let mut world = MockWorld::new();
        world.block_asset(DECORATION_FX_ASSET);
        let config = config_with(1, 2);
        let queue = ReleaseQueue::new();
        let mut build = start(&mut world, &config, &queue);

        let steps = run(&mut build, &mut world, &config);
        assert!(steps >= ASSET_WAIT_ATTEMPTS as usize);
        assert_eq!(build.vortex().particles().len(), BuildPlan::from_config(&config).total_particles());
    }

    #[test]
    fn cloud_ring_is_lifted_and_wider() {
        let mut world = MockWorld::new();
        let mut config = config_with(1, 0);
        config.vortex_advanced.cloud_top_enabled = true;
        let queue = ReleaseQueue::new();
        let mut build = start(&mut world, &config, &queue);
        run(&mut build, &mut world, &config);

        let vortex = build.finish();
        let clouds: Vec<_> = vortex.particles().iter().filter(|p| p.is_cloud_top()).collect();
        // Layers 6 and 7, three particles each.
        assert_eq!(clouds.len(), 6);
        let below = vortex
            .particles()
            .iter()
            .filter(|p| !p.is_cloud_top() && p.layer() == 5)
            .map(|p| p.radius())
            .fold(0.0f32, f32::max);
        for cloud in clouds {
            assert!(cloud.radius() > below + CLOUD_TOP_RADIUS_GROWTH - 1e-3);
            let expected = DEFAULT_LAYER_SEPARATION * cloud.layer() as f32 + CLOUD_TOP_LIFT;
            assert!((cloud.offset().z - expected).abs() < 1e-4);
        }
    }

    #[test]
    fn exhausted_pool_degrades_particles_but_completes() {
        let mut world = MockWorld::new();
        world.set_anchor_capacity(Some(3));
        let config = config_with(2, 3);
        let queue = ReleaseQueue::new();
        let mut build = start(&mut world, &config, &queue);
        run(&mut build, &mut world, &config);

        let vortex = build.finish();
        let live = vortex.particles().iter().filter(|p| !p.is_degraded()).count();
        assert_eq!(live, 3);
        assert_eq!(vortex.particles().len(), BuildPlan::from_config(&config).total_particles());
    }

    #[test]
    fn host_failure_aborts_build_and_releases_anchors() {
        let mut world = MockWorld::new();
        let config = config_with(4, 6);
        let queue = ReleaseQueue::new();
        let mut build = start(&mut world, &config, &queue);

        // First step preloads and builds a handful of particles.
        build.step(&mut world, &config, 0).expect("first step");
        assert!(world.anchor_count() > 0);

        world.fail_anchor_creation(Some(HostError::Call {
            call: "create_anchor",
            message: "script thread killed".into(),
        }));
        let result = run_until_error(&mut build, &mut world, &config);
        assert!(matches!(result, TornadoError::Host { .. }));

        drop(build);
        queue.flush(&mut world);
        assert_eq!(world.anchor_count(), 0);
        assert_eq!(world.fx_count(), 0);
    }

    fn run_until_error(
        build: &mut VortexBuild,
        world: &mut MockWorld,
        config: &TornadoConfig,
    ) -> TornadoError {
        for _ in 0..1_000 {
            if let Err(e) = build.step(world, config, 0) {
                return e;
            }
        }
        panic!("build never failed");
    }

    #[test]
    fn abort_releases_everything() {
        let mut world = MockWorld::new();
        let config = config_with(3, 4);
        let queue = ReleaseQueue::new();
        let mut build = start(&mut world, &config, &queue);
        run(&mut build, &mut world, &config);
        assert!(world.anchor_count() > 0);

        build.abort();
        queue.flush(&mut world);
        assert_eq!(world.anchor_count(), 0);
        assert_eq!(world.fx_count(), 0);
    }
}
