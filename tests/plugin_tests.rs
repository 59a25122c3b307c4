//! Headless tests of the Bevy glue: [`SimulationPlugin`] driving the sandbox
//! host through [`CommandRequest`] messages.
//!
//! These tests use [`MinimalPlugins`] plus [`SandboxWorldPlugin`]: no window,
//! no rendering, no physics step.  Rapier components are plain data here, so
//! forces accumulate and can be inspected directly.
//!
//! Covered scenarios:
//! 1. A summon request builds a tornado with anchors, effects and a marker.
//! 2. Loose props near the tornado receive impulses and a speed limit.
//! 3. Despawn-all removes every anchor, effect and marker.

use bevy::prelude::*;
use bevy_rapier3d::prelude::{ExternalForce, ExternalImpulse, Velocity};
use tornado::command::SimCommand;
use tornado::config::ConfigStore;
use tornado::host::EntityKind;
use tornado::sandbox::host::to_bevy;
use tornado::sandbox::{
    FxAnchor, LoopedFx, MapMarker, Notifications, PlayerCharacter, Pullable, SandboxWorldPlugin,
    SpeedLimit,
};
use tornado::simulation::{CommandRequest, SimulationContext, SimulationPlugin};

// ── Helpers ───────────────────────────────────────────────────────────────────

const SMALL_TORNADO: &str = r#"
[vortex]
movement_enabled = false

[vortex_advanced]
max_particle_layers = 3
particles_per_layer = 2

[other]
spawn_in_storm = false
"#;

fn app() -> App {
    let store = ConfigStore::from_toml_str(SMALL_TORNADO).expect("valid toml");
    let mut app = App::new();
    app.add_plugins(MinimalPlugins)
        .add_plugins(SandboxWorldPlugin)
        .insert_resource(SimulationContext::new(store))
        .add_plugins(SimulationPlugin);

    // The default transform faces Bevy -Z, which is +Y in simulation space.
    app.world_mut().spawn((
        Pullable {
            kind: EntityKind::Character,
            plane: false,
        },
        PlayerCharacter,
        Transform::from_translation(to_bevy(Vec3::new(0.0, 0.0, 1.0))),
        Velocity::zero(),
        ExternalForce::default(),
    ));
    app
}

fn request(app: &mut App, command: SimCommand) {
    app.world_mut()
        .resource_mut::<Messages<CommandRequest>>()
        .write(CommandRequest(command));
}

fn count<T: Component>(app: &mut App) -> usize {
    app.world_mut()
        .query_filtered::<Entity, With<T>>()
        .iter(app.world())
        .count()
}

fn run_until_live(app: &mut App) {
    for _ in 0..200 {
        app.update();
        if app.world().resource::<SimulationContext>().factory().active_count() > 0 {
            return;
        }
    }
    panic!("tornado never went live");
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[test]
fn summon_builds_a_tornado_in_the_sandbox() {
    let mut app = app();
    request(&mut app, SimCommand::SpawnTornado);
    run_until_live(&mut app);

    let context = app.world().resource::<SimulationContext>();
    let particles = context
        .factory()
        .first_vortex()
        .map(|v| v.particles().len())
        .unwrap_or_default();
    assert!(particles > 0);

    assert!(count::<FxAnchor>(&mut app) > 0);
    assert!(count::<LoopedFx>(&mut app) > 0);
    assert_eq!(count::<MapMarker>(&mut app), 1);

    let notifications = &app.world().resource::<Notifications>().0;
    assert!(notifications.iter().any(|(m, _)| m == "Tornado spawned!"));
}

#[test]
fn nearby_props_are_pulled() {
    let mut app = app();
    // The summon point is 180 units ahead of the player along +Y.
    let prop = app
        .world_mut()
        .spawn((
            Pullable {
                kind: EntityKind::Object,
                plane: false,
            },
            Transform::from_translation(to_bevy(Vec3::new(6.0, 180.0, 0.5))),
            Velocity::zero(),
            ExternalForce::default(),
            ExternalImpulse::default(),
        ))
        .id();

    request(&mut app, SimCommand::SpawnTornado);
    run_until_live(&mut app);
    for _ in 0..5 {
        app.update();
    }

    let world = app.world();
    let impulse = world
        .get::<ExternalImpulse>(prop)
        .map(|i| i.impulse)
        .unwrap_or_default();
    assert!(impulse.length() > 0.0, "prop received no impulse");
    assert_eq!(world.get::<SpeedLimit>(prop).map(|s| s.0), Some(40.0));
}

#[test]
fn despawn_all_clears_the_sandbox() {
    let mut app = app();
    request(&mut app, SimCommand::SpawnTornado);
    run_until_live(&mut app);

    request(&mut app, SimCommand::DespawnAll);
    app.update();

    assert_eq!(
        app.world().resource::<SimulationContext>().factory().active_count(),
        0
    );
    assert_eq!(count::<FxAnchor>(&mut app), 0);
    assert_eq!(count::<LoopedFx>(&mut app), 0);
    assert_eq!(count::<MapMarker>(&mut app), 0);
}
