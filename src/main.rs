use bevy::log::LogPlugin;
use bevy::prelude::*;
use bevy::window::WindowResolution;
use bevy_rapier3d::prelude::*;
use std::env;

use tornado::config::{ConfigStore, DEFAULT_CONFIG_PATH};
use tornado::sandbox::SandboxPlugin;
use tornado::simulation::{SimulationContext, SimulationPlugin};
use tornado::test_mode;

fn main() -> AppExit {
    // Check for test mode
    if let Ok(test_name) = env::var("TORNADO_TEST") {
        let mut app = App::new();
        app.add_plugins((MinimalPlugins, LogPlugin::default()));
        test_mode::configure_test_mode(&mut app, &test_name);
        return app.run();
    }

    let store = ConfigStore::load(DEFAULT_CONFIG_PATH);

    let mut app = App::new();
    app.add_plugins(DefaultPlugins.set(WindowPlugin {
        primary_window: Some(Window {
            title: "Tornado".into(),
            resolution: WindowResolution::new(1280, 720),
            ..Default::default()
        }),
        ..Default::default()
    }))
    .insert_resource(ClearColor(Color::srgb(0.55, 0.6, 0.66)))
    // Inserted before SimulationPlugin so its init_resource keeps the loaded store.
    .insert_resource(SimulationContext::new(store))
    .add_plugins(RapierPhysicsPlugin::<NoUserData>::default())
    .add_plugins((SandboxPlugin, SimulationPlugin));

    app.run()
}
