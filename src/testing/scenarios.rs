//! Scripted end-to-end scenarios against [`MockWorld`].
//!
//! Each scenario builds a small world, feeds commands on fixed frames, ticks
//! the simulation with a fixed 16 ms step and checks the end state.  They run
//! under `cargo test` through [`run_headless`] and interactively through
//! `TORNADO_TEST=<name>` (see `test_mode.rs`), where the Bevy systems below
//! drive the same [`ScenarioRun`].

use bevy::app::AppExit;
use bevy::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::MockWorld;
use crate::command::SimCommand;
use crate::config::ConfigStore;
use crate::constants::*;
use crate::host::{EntityHandle, EntityKind, Weather, WorldHost};
use crate::math::distance_2d;
use crate::simulation::SimulationContext;
use crate::vortex::BuildPlan;

/// Fixed simulation step.
pub const FRAME_MS: u64 = 16;
const FRAME_SECS: f32 = FRAME_MS as f32 / 1000.0;

const BASE_CONFIG: &str = r#"
[vortex]
movement_enabled = false

[vortex_advanced]
max_particle_layers = 12
particles_per_layer = 4

[other]
spawn_in_storm = false
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    SpawnAndBuild,
    Suction,
    StormSpawn,
    DespawnReleases,
    AssetTimeout,
    Saturation,
}

impl Scenario {
    pub const ALL: [Scenario; 6] = [
        Scenario::SpawnAndBuild,
        Scenario::Suction,
        Scenario::StormSpawn,
        Scenario::DespawnReleases,
        Scenario::AssetTimeout,
        Scenario::Saturation,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Scenario::SpawnAndBuild => "spawn_and_build",
            Scenario::Suction => "suction",
            Scenario::StormSpawn => "storm_spawn",
            Scenario::DespawnReleases => "despawn_releases",
            Scenario::AssetTimeout => "asset_timeout",
            Scenario::Saturation => "saturation",
        }
    }

    pub fn frame_limit(self) -> u32 {
        match self {
            Scenario::SpawnAndBuild => 240,
            Scenario::Suction => 600,
            // Up to 20 s of storm delay plus a few failed rolls.
            Scenario::StormSpawn => 3_750,
            Scenario::DespawnReleases => 220,
            Scenario::AssetTimeout => 400,
            Scenario::Saturation => 300,
        }
    }

    fn store(self) -> ConfigStore {
        let mut store = match ConfigStore::from_toml_str(BASE_CONFIG) {
            Ok(store) => store,
            Err(e) => {
                error!("scenario base config is invalid: {e}");
                ConfigStore::in_memory()
            }
        };
        use crate::config::SettingValue::*;
        match self {
            Scenario::StormSpawn => store.write_value("other", "spawn_in_storm", Bool(true)),
            Scenario::DespawnReleases => store.write_value("audio", "enable_eas", Bool(true)),
            Scenario::Saturation => store.write_value("vortex", "max_entity_count", Int(10)),
            _ => {}
        }
        store
    }

    /// Populates the world.  Returns the entities whose motion is verified.
    fn setup(self, world: &mut MockWorld) -> Vec<EntityHandle> {
        world.spawn_player(Vec3::ZERO);
        // Summoned tornadoes land SUMMON_DISTANCE ahead of the player (+X).
        let spawn = Vec3::new(SUMMON_DISTANCE, 0.0, 0.0);
        match self {
            Scenario::Suction => ring(world, spawn, 24, 40.0),
            Scenario::Saturation => ring(world, spawn, 40, 20.0),
            Scenario::StormSpawn => {
                world.rain_level = 1.0;
                world.previous_weather = Weather::Rain;
                Vec::new()
            }
            Scenario::AssetTimeout => {
                world.block_asset(DECORATION_FX_ASSET);
                Vec::new()
            }
            Scenario::SpawnAndBuild | Scenario::DespawnReleases => Vec::new(),
        }
    }

    fn scripted_command(self, frame: u32) -> Option<SimCommand> {
        match (self, frame) {
            (Scenario::StormSpawn, _) => None,
            (_, 1) => Some(SimCommand::SpawnTornado),
            (Scenario::DespawnReleases, 200) => Some(SimCommand::DespawnAll),
            _ => None,
        }
    }
}

fn ring(world: &mut MockWorld, center: Vec3, count: usize, radius: f32) -> Vec<EntityHandle> {
    (0..count)
        .map(|i| {
            let angle = i as f32 / count as f32 * std::f32::consts::TAU;
            let pos = center + Vec3::new(angle.cos() * radius, angle.sin() * radius, 0.0);
            world.spawn_entity(EntityKind::Object, pos)
        })
        .collect()
}

// ── Runner ────────────────────────────────────────────────────────────────────

/// One scenario in progress.
#[derive(Resource)]
pub struct ScenarioRun {
    pub scenario: Scenario,
    pub world: MockWorld,
    pub context: SimulationContext,
    pub frame: u32,
    tracked: Vec<EntityHandle>,
    initial_mean_distance: f32,
}

impl ScenarioRun {
    pub fn new(scenario: Scenario, seed: u64) -> Self {
        let mut world = MockWorld::new();
        world.frame_time = FRAME_SECS;
        let tracked = scenario.setup(&mut world);
        let context = SimulationContext::with_rng(scenario.store(), StdRng::seed_from_u64(seed));
        let spawn = Vec3::new(SUMMON_DISTANCE, 0.0, 0.0);
        let initial_mean_distance = mean_distance(&world, &tracked, spawn);
        Self {
            scenario,
            world,
            context,
            frame: 0,
            tracked,
            initial_mean_distance,
        }
    }

    #[inline]
    pub fn now(&self) -> u64 {
        u64::from(self.frame) * FRAME_MS
    }

    pub fn is_finished(&self) -> bool {
        self.frame >= self.scenario.frame_limit()
    }

    pub fn step(&mut self) {
        self.frame += 1;
        self.world.advance_frame();
        let now = self.now();
        if let Some(command) = self.scenario.scripted_command(self.frame) {
            let outcome = self.context.execute(&mut self.world, command, now);
            debug!("[Frame {}] {outcome:?}", self.frame);
        }
        self.context.on_update(&mut self.world, now);
        self.world.integrate(FRAME_SECS);
    }

    /// Checks the end state.  `Ok` carries a one-line summary.
    pub fn verify(&self) -> Result<String, String> {
        let factory = self.context.factory();
        let world = &self.world;
        match self.scenario {
            Scenario::SpawnAndBuild => {
                let vortex = factory.first_vortex().ok_or("no vortex went live")?;
                let expected = BuildPlan::from_config(self.context.config()).total_particles();
                if vortex.particles().len() != expected {
                    return Err(format!(
                        "built {} particles, expected {expected}",
                        vortex.particles().len()
                    ));
                }
                if world.marker_count() != 1 {
                    return Err(format!("{} map markers", world.marker_count()));
                }
                if !world.notifications().iter().any(|n| n == "Tornado spawned nearby.") {
                    return Err("no spawn notification".into());
                }
                Ok(format!("{expected} particles, {} anchors", world.anchor_count()))
            }
            Scenario::Suction => {
                let center = factory.first_vortex().ok_or("no vortex went live")?.position();
                let mean = mean_distance(world, &self.tracked, center);
                let mean_z = self
                    .tracked
                    .iter()
                    .filter_map(|h| world.entity_position(*h))
                    .map(|p| p.z)
                    .sum::<f32>()
                    / self.tracked.len().max(1) as f32;
                if mean >= self.initial_mean_distance * 0.75 {
                    return Err(format!(
                        "mean distance {mean:.1} did not shrink from {:.1}",
                        self.initial_mean_distance
                    ));
                }
                if mean_z <= 1.0 {
                    return Err(format!("objects were not lifted (mean z {mean_z:.2})"));
                }
                Ok(format!(
                    "mean distance {:.1} -> {mean:.1}, mean height {mean_z:.1}",
                    self.initial_mean_distance
                ))
            }
            Scenario::StormSpawn => {
                if factory.active_count() == 0 && !factory.spawn_in_progress() {
                    return Err("storm never spawned a tornado".into());
                }
                if world.wind_speed != STORM_WIND_SPEED {
                    return Err(format!("wind speed {}", world.wind_speed));
                }
                Ok(format!("{} tornado(es) from the storm", factory.active_count()))
            }
            Scenario::DespawnReleases => {
                if factory.active_count() != 0 {
                    return Err(format!("{} vortices left", factory.active_count()));
                }
                let leftovers = (
                    world.anchor_count(),
                    world.fx_count(),
                    world.marker_count(),
                    world.playing_sounds().len(),
                );
                if leftovers != (0, 0, 0, 0) {
                    return Err(format!("leaked host objects {leftovers:?}"));
                }
                Ok("all host objects released".into())
            }
            Scenario::AssetTimeout => {
                let vortex = factory.first_vortex().ok_or("build never completed")?;
                if world.fx_count_for(DECORATION_FX_ASSET) != 0 {
                    return Err("blocked effect started anyway".into());
                }
                Ok(format!("{} particles despite blocked asset", vortex.particles().len()))
            }
            Scenario::Saturation => {
                let vortex = factory.first_vortex().ok_or("no vortex went live")?;
                let pulled = vortex.pulled_entities().len();
                if pulled != 10 {
                    return Err(format!("tracking {pulled} entities, cap is 10"));
                }
                Ok("entity cap respected".into())
            }
        }
    }
}

fn mean_distance(world: &MockWorld, tracked: &[EntityHandle], center: Vec3) -> f32 {
    if tracked.is_empty() {
        return 0.0;
    }
    tracked
        .iter()
        .filter_map(|h| world.entity_position(*h))
        .map(|p| distance_2d(p, center))
        .sum::<f32>()
        / tracked.len() as f32
}

/// Runs `scenario` to its frame limit without a Bevy app.
pub fn run_headless(scenario: Scenario, seed: u64) -> Result<String, String> {
    let mut run = ScenarioRun::new(scenario, seed);
    while !run.is_finished() {
        run.step();
    }
    run.verify()
}

// ── Bevy systems ──────────────────────────────────────────────────────────────

/// Test configuration
#[derive(Resource, Default)]
pub struct TestConfig {
    pub enabled: bool,
    pub test_name: String,
    pub frame_limit: u32,
}

pub fn scenario_tick_system(mut run: ResMut<ScenarioRun>) {
    if !run.is_finished() {
        run.step();
    }
}

pub fn test_logging_system(test_config: Res<TestConfig>, run: Res<ScenarioRun>) {
    if !test_config.enabled {
        return;
    }
    if run.frame == 1 || run.frame.is_multiple_of(50) {
        let factory = run.context.factory();
        let pulled: usize = factory
            .vortices()
            .iter()
            .map(|v| v.pulled_entities().len())
            .sum();
        println!(
            "[Frame {}] {} | vortices: {} | building: {} | pulled: {} | anchors: {}",
            run.frame,
            test_config.test_name,
            factory.active_count(),
            factory.spawn_in_progress(),
            pulled,
            run.world.anchor_count(),
        );
    }
}

pub fn test_verification_system(
    test_config: Res<TestConfig>,
    run: Res<ScenarioRun>,
    mut exit: MessageWriter<AppExit>,
) {
    if !test_config.enabled || run.frame < test_config.frame_limit {
        return;
    }
    match run.verify() {
        Ok(summary) => {
            println!("✓ PASS {}: {summary}", test_config.test_name);
            exit.write(AppExit::Success);
        }
        Err(reason) => {
            println!("✗ FAIL {}: {reason}", test_config.test_name);
            exit.write(AppExit::from_code(1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for scenario in Scenario::ALL {
            assert_eq!(Scenario::from_name(scenario.name()), Some(scenario));
        }
        assert_eq!(Scenario::from_name("nope"), None);
    }

    #[test]
    fn spawn_and_build_passes() {
        run_headless(Scenario::SpawnAndBuild, 1).expect("scenario passes");
    }

    #[test]
    fn despawn_releases_passes() {
        run_headless(Scenario::DespawnReleases, 1).expect("scenario passes");
    }
}
