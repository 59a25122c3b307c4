//! Simulation context and the Bevy plugin that ticks it.
//!
//! [`SimulationContext`] bundles the config store, the current typed snapshot
//! and the [`Factory`].  It is host-agnostic: both the Bevy sandbox and the
//! scripted [`crate::testing::MockWorld`] drive it through
//! [`SimulationContext::on_update`] and [`SimulationContext::execute`].
//!
//! [`SimulationPlugin`] owns the glue for Bevy: user commands arrive as
//! [`CommandRequest`] messages and are applied by an exclusive system right
//! before the tick, so every host call sees a consistent world.

use std::panic::{self, AssertUnwindSafe};

use bevy::log::{debug, error, info, warn};
use bevy::prelude::*;
use rand::rngs::StdRng;

use crate::command::{CommandOutcome, SimCommand};
use crate::config::{ConfigStore, TornadoConfig};
use crate::constants::*;
use crate::factory::Factory;
use crate::host::{AudioHost, WorldHost};
use crate::sandbox::host::BevyHost;

#[derive(Resource, Debug, Default)]
pub struct SimulationContext {
    store: ConfigStore,
    config: TornadoConfig,
    factory: Factory,
}

impl SimulationContext {
    pub fn new(store: ConfigStore) -> Self {
        Self::with_factory(store, Factory::new())
    }

    /// A context with a seeded RNG, for deterministic runs.
    pub fn with_rng(store: ConfigStore, rng: StdRng) -> Self {
        Self::with_factory(store, Factory::with_rng(rng))
    }

    fn with_factory(store: ConfigStore, factory: Factory) -> Self {
        let config = store.snapshot();
        Self {
            store,
            config,
            factory,
        }
    }

    /// One host frame.  A panic escaping the factory is reported to the user
    /// and swallowed so the host keeps running.
    pub fn on_update<H: WorldHost + AudioHost>(&mut self, host: &mut H, now: u64) {
        let Self {
            config, factory, ..
        } = self;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| factory.on_update(host, config, now)));
        if outcome.is_err() {
            error!("tornado tick panicked");
            host.notify("Tornado script error occurred!");
        }
    }

    pub fn execute<H: WorldHost + AudioHost>(
        &mut self,
        host: &mut H,
        command: SimCommand,
        now: u64,
    ) -> CommandOutcome {
        debug!("executing {command:?}");
        match command {
            SimCommand::SpawnTornado => self.summon(host, now),
            SimCommand::DespawnAll => self.despawn_all(host),
            SimCommand::TeleportToTornado => self.teleport_to_tornado(host),
            SimCommand::ToggleTornado => {
                if self.factory.active_count() > 0 {
                    self.despawn_all(host)
                } else {
                    self.summon(host, now)
                }
            }
            SimCommand::Set {
                section,
                key,
                value,
            } => {
                info!("setting {section}.{key} = {value:?}");
                self.store.write_value(&section, &key, value);
                self.reload(now);
                CommandOutcome::ConfigUpdated
            }
            SimCommand::SaveConfig => match self.store.save() {
                Ok(()) => {
                    info!("tornado config saved");
                    CommandOutcome::Saved
                }
                Err(e) => {
                    error!("could not save tornado config: {e}");
                    CommandOutcome::Rejected(e)
                }
            },
            SimCommand::RefreshVortexSettings => {
                self.reload(now);
                CommandOutcome::Refreshed
            }
        }
    }

    fn reload(&mut self, now: u64) {
        self.config = self.store.snapshot();
        self.factory.refresh_all(&self.config, now);
    }

    fn summon(&mut self, host: &mut impl WorldHost, now: u64) -> CommandOutcome {
        if self.factory.active_count() > 0 || self.factory.spawn_in_progress() {
            info!("summon ignored: a tornado is already active");
            return CommandOutcome::Ignored("a tornado is already active");
        }

        host.clear_fx_in_range(Vec3::ZERO, SUMMON_FX_CLEAR_RADIUS);
        if self.config.other.spawn_in_storm {
            host.set_wind_speed(STORM_WIND_SPEED);
        }

        let Some(player) = host.player() else {
            return CommandOutcome::Ignored("no player");
        };
        let (Some(position), Some(forward)) =
            (host.entity_position(player), host.entity_forward(player))
        else {
            return CommandOutcome::Ignored("no player");
        };

        let spawn_at = position + forward * SUMMON_DISTANCE;
        match self.factory.create_vortex(host, spawn_at, &self.config, now) {
            Ok(ticket) => {
                if self.config.other.notifications {
                    host.notify("Tornado spawned!");
                }
                CommandOutcome::Spawned(ticket)
            }
            Err(e) => {
                warn!("summon rejected: {e}");
                CommandOutcome::Rejected(e)
            }
        }
    }

    fn despawn_all<H: WorldHost + AudioHost>(&mut self, host: &mut H) -> CommandOutcome {
        self.factory.remove_all(host);
        if self.config.other.notifications {
            host.notify("All tornadoes despawned!");
        }
        CommandOutcome::Despawned
    }

    fn teleport_to_tornado(&mut self, host: &mut impl WorldHost) -> CommandOutcome {
        let Some(vortex) = self.factory.first_vortex() else {
            if self.config.other.notifications {
                host.notify("No active tornado found.");
            }
            return CommandOutcome::Ignored("no active tornado");
        };
        let Some(player) = host.player() else {
            return CommandOutcome::Ignored("no player");
        };

        let target = vortex.position() + Vec3::Z * TELEPORT_HEIGHT;
        host.teleport(player, target);
        if self.config.other.notifications {
            host.notify("Teleported to tornado.");
        }
        CommandOutcome::Teleported(target)
    }

    #[inline]
    pub fn config(&self) -> &TornadoConfig {
        &self.config
    }

    #[inline]
    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    #[inline]
    pub fn factory(&self) -> &Factory {
        &self.factory
    }

    #[inline]
    pub fn factory_mut(&mut self) -> &mut Factory {
        &mut self.factory
    }
}

// ── Bevy glue ─────────────────────────────────────────────────────────────────

/// A user command queued for the next simulation tick.
#[derive(Message, Debug, Clone)]
pub struct CommandRequest(pub SimCommand);

pub struct SimulationPlugin;

impl Plugin for SimulationPlugin {
    fn build(&self, app: &mut App) {
        // Keeps a context inserted by the caller (e.g. loaded from disk).
        app.init_resource::<SimulationContext>()
            .add_message::<CommandRequest>()
            .add_systems(Update, simulation_tick_system);
    }
}

/// Game time in whole milliseconds since startup.
pub fn game_time_ms(world: &World) -> u64 {
    world
        .get_resource::<Time>()
        .map(|time| time.elapsed().as_millis() as u64)
        .unwrap_or(0)
}

/// Applies queued commands, then ticks the simulation against the sandbox.
pub fn simulation_tick_system(world: &mut World) {
    let now = game_time_ms(world);
    let requests: Vec<CommandRequest> = world
        .get_resource_mut::<Messages<CommandRequest>>()
        .map(|mut messages| messages.drain().collect())
        .unwrap_or_default();

    world.resource_scope(|world, mut context: Mut<SimulationContext>| {
        let mut host = BevyHost::new(world);
        for CommandRequest(command) in requests {
            let outcome = context.execute(&mut host, command, now);
            debug!("command outcome: {outcome:?}");
        }
        context.on_update(&mut host, now);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SettingValue;
    use crate::error::TornadoError;
    use crate::host::EntityKind;
    use crate::testing::MockWorld;
    use rand::SeedableRng;

    fn context() -> SimulationContext {
        let store = ConfigStore::from_toml_str(
            "[vortex]\nmovement_enabled = false\n\n[vortex_advanced]\nmax_particle_layers = 2\nparticles_per_layer = 2\n\n[other]\nspawn_in_storm = false\n",
        )
        .expect("valid toml");
        SimulationContext::with_rng(store, StdRng::seed_from_u64(8))
    }

    fn tick_until_live(ctx: &mut SimulationContext, world: &mut MockWorld, mut now: u64) -> u64 {
        while ctx.factory().active_count() == 0 {
            now += 16;
            assert!(now < 100_000, "vortex never went live");
            world.advance_frame();
            ctx.on_update(world, now);
        }
        now
    }

    #[test]
    fn summon_spawns_ahead_of_player() {
        let mut world = MockWorld::new();
        let player = world.spawn_player(Vec3::new(10.0, 0.0, 0.0));
        world.set_forward(player, Vec3::Y);
        let mut ctx = context();

        let outcome = ctx.execute(&mut world, SimCommand::SpawnTornado, 0);
        let CommandOutcome::Spawned(ticket) = outcome else {
            panic!("expected a spawn, got {outcome:?}");
        };
        assert_eq!(ticket.position.x, 10.0);
        assert_eq!(ticket.position.y, SUMMON_DISTANCE);
        assert!(world.notifications().iter().any(|n| n == "Tornado spawned!"));
        assert_eq!(
            world.cleared_fx().first(),
            Some(&(Vec3::ZERO, SUMMON_FX_CLEAR_RADIUS))
        );
    }

    #[test]
    fn summon_ignored_while_a_tornado_exists() {
        let mut world = MockWorld::new();
        world.spawn_player(Vec3::ZERO);
        let mut ctx = context();
        ctx.execute(&mut world, SimCommand::SpawnTornado, 0);
        let again = ctx.execute(&mut world, SimCommand::SpawnTornado, 1);
        assert!(matches!(again, CommandOutcome::Ignored(_)));

        let now = tick_until_live(&mut ctx, &mut world, 1);
        let later = ctx.execute(&mut world, SimCommand::SpawnTornado, now + 10_000);
        assert!(matches!(later, CommandOutcome::Ignored(_)));
    }

    #[test]
    fn summon_raises_wind_when_storm_spawning_enabled() {
        let mut world = MockWorld::new();
        world.spawn_player(Vec3::ZERO);
        let mut ctx = context();
        ctx.execute(&mut world, SimCommand::set_bool("other", "spawn_in_storm", true), 0);
        ctx.execute(&mut world, SimCommand::SpawnTornado, 0);
        assert_eq!(world.wind_speed, STORM_WIND_SPEED);
    }

    #[test]
    fn toggle_spawns_then_despawns() {
        let mut world = MockWorld::new();
        world.spawn_player(Vec3::ZERO);
        let mut ctx = context();

        assert!(matches!(
            ctx.execute(&mut world, SimCommand::ToggleTornado, 0),
            CommandOutcome::Spawned(_)
        ));
        let now = tick_until_live(&mut ctx, &mut world, 0);
        assert!(matches!(
            ctx.execute(&mut world, SimCommand::ToggleTornado, now),
            CommandOutcome::Despawned
        ));
        assert_eq!(ctx.factory().active_count(), 0);
        assert_eq!(world.anchor_count(), 0);
        assert!(world.notifications().iter().any(|n| n == "All tornadoes despawned!"));
    }

    #[test]
    fn teleport_moves_player_above_first_vortex() {
        let mut world = MockWorld::new();
        let player = world.spawn_player(Vec3::ZERO);
        let mut ctx = context();

        let none = ctx.execute(&mut world, SimCommand::TeleportToTornado, 0);
        assert!(matches!(none, CommandOutcome::Ignored(_)));
        assert!(world.notifications().iter().any(|n| n == "No active tornado found."));

        ctx.execute(&mut world, SimCommand::SpawnTornado, 0);
        let now = tick_until_live(&mut ctx, &mut world, 0);
        let vortex_pos = ctx.factory().first_vortex().expect("live").position();
        let outcome = ctx.execute(&mut world, SimCommand::TeleportToTornado, now);
        let expected = vortex_pos + Vec3::Z * TELEPORT_HEIGHT;
        assert_eq!(outcome, CommandOutcome::Teleported(expected));
        assert_eq!(world.entity_position(player), Some(expected));
    }

    #[test]
    fn settings_write_through_to_live_vortices() {
        let mut world = MockWorld::new();
        world.spawn_player(Vec3::ZERO);
        let mut ctx = context();
        ctx.execute(&mut world, SimCommand::SpawnTornado, 0);
        let now = tick_until_live(&mut ctx, &mut world, 0);

        let outcome = ctx.execute(
            &mut world,
            SimCommand::set_float("vortex", "horizontal_force_scale", 4.5),
            now,
        );
        assert_eq!(outcome, CommandOutcome::ConfigUpdated);
        assert_eq!(ctx.config().vortex.horizontal_force_scale, 4.5);
        let vortex = ctx.factory().first_vortex().expect("live");
        assert_eq!(vortex.tuning().horizontal_force, 4.5);
        assert_eq!(ctx.store().get_value("vortex", "horizontal_force_scale", 0.0f32), 4.5);

        ctx.execute(&mut world, SimCommand::set_int("vortex", "max_entity_count", 3), now);
        assert_eq!(ctx.config().vortex.max_entity_count, 3);

        let center = ctx.factory().first_vortex().expect("live").position();
        for i in 0..10 {
            world.spawn_entity(EntityKind::Object, center + Vec3::new(i as f32, 5.0, 0.0));
        }
        for tick in 1..50 {
            ctx.on_update(&mut world, now + tick * 100);
        }
        let vortex = ctx.factory().first_vortex().expect("live");
        assert_eq!(vortex.pulled_entities().len(), 3);
    }

    #[test]
    fn save_without_backing_file_is_rejected() {
        let mut world = MockWorld::new();
        let mut ctx = context();
        let outcome = ctx.execute(&mut world, SimCommand::SaveConfig, 0);
        assert!(matches!(
            outcome,
            CommandOutcome::Rejected(TornadoError::Config { .. })
        ));
    }

    #[test]
    fn refresh_rereads_the_store() {
        let mut world = MockWorld::new();
        let mut ctx = context();
        ctx.store.write_value("vortex", "rotation_speed", SettingValue::Float(7.0));
        assert_eq!(ctx.config().vortex.rotation_speed, DEFAULT_ROTATION_SPEED);
        let outcome = ctx.execute(&mut world, SimCommand::RefreshVortexSettings, 0);
        assert_eq!(outcome, CommandOutcome::Refreshed);
        assert_eq!(ctx.config().vortex.rotation_speed, 7.0);
    }
}
