//! Tornado: a vortex particle and entity-suction simulation.
//!
//! The core ([`factory`], [`vortex`], [`particle`]) is engine-agnostic and talks
//! to the world only through the traits in [`host`].  [`sandbox`] hosts it in a
//! Bevy + Rapier3D scene; [`testing::MockWorld`] hosts it in tests.

pub mod command;
pub mod config;
pub mod constants;
pub mod error;
pub mod factory;
pub mod host;
pub mod math;
pub mod particle;
pub mod release;
pub mod sandbox;
pub mod simulation;
pub mod test_mode;
pub mod testing;
pub mod vortex;
pub mod wait;
