use bevy::prelude::*;

use crate::testing::scenarios::{
    scenario_tick_system, test_logging_system, test_verification_system, Scenario, ScenarioRun,
    TestConfig,
};

/// Seed for scripted runs, so a failing scenario fails the same way twice.
const SCENARIO_SEED: u64 = 0x5EED;

pub fn configure_test_mode(app: &mut App, test_name: &str) {
    let scenario = Scenario::from_name(test_name).unwrap_or_else(|| {
        let known: Vec<&str> = Scenario::ALL.iter().map(|s| s.name()).collect();
        eprintln!(
            "⚠ Unknown test '{}', running spawn_and_build. Known: {}",
            test_name,
            known.join(", ")
        );
        Scenario::SpawnAndBuild
    });

    app.insert_resource(TestConfig {
        enabled: true,
        test_name: scenario.name().to_string(),
        frame_limit: scenario.frame_limit(),
    })
    .insert_resource(ScenarioRun::new(scenario, SCENARIO_SEED))
    .add_systems(
        Update,
        (
            scenario_tick_system,
            test_logging_system,
            test_verification_system,
        )
            .chain(),
    );

    println!("Running test: {}", test_name);
}
