//! Scripted end-to-end scenarios run against the mock host.
//!
//! Every scenario in [`Scenario::ALL`] is exercised; each test drives the
//! simulation to the scenario's frame limit with a fixed 16 ms step and checks
//! the end state.  The same scenarios run interactively via
//! `TORNADO_TEST=<name> cargo run`.

use tornado::testing::scenarios::{run_headless, Scenario, ScenarioRun};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn assert_passes(scenario: Scenario) {
    match run_headless(scenario, 42) {
        Ok(summary) => println!("{}: {summary}", scenario.name()),
        Err(reason) => panic!("{} failed: {reason}", scenario.name()),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[test]
fn spawn_and_build() {
    assert_passes(Scenario::SpawnAndBuild);
}

#[test]
fn suction_pulls_objects_in_and_up() {
    assert_passes(Scenario::Suction);
}

#[test]
fn storm_spawns_a_tornado() {
    assert_passes(Scenario::StormSpawn);
}

#[test]
fn despawn_releases_every_host_object() {
    assert_passes(Scenario::DespawnReleases);
}

#[test]
fn blocked_asset_does_not_stall_the_build() {
    assert_passes(Scenario::AssetTimeout);
}

#[test]
fn saturation_respects_entity_cap() {
    assert_passes(Scenario::Saturation);
}

#[test]
fn runs_are_deterministic_for_a_seed() {
    let finish = |seed| {
        let mut run = ScenarioRun::new(Scenario::StormSpawn, seed);
        while !run.is_finished() {
            run.step();
        }
        run.context
            .factory()
            .first_vortex()
            .map(|v| (v.position(), v.created_at()))
    };
    assert_eq!(finish(7), finish(7));
}

#[test]
fn verification_fails_before_the_tornado_exists() {
    let run = ScenarioRun::new(Scenario::SpawnAndBuild, 1);
    assert!(run.verify().is_err());
}
