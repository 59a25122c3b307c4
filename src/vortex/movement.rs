//! Slow wandering of the vortex along the road network.
//!
//! The vortex drifts toward a destination chosen near a navigable node.  When
//! the player wanders off more than [`PLAYER_LEASH_DISTANCE`] away, a new
//! destination is picked around the player so the storm follows them.
//!
//! Road nodes are checked in two parts: the horizontal distance from the
//! candidate, and the height difference from the probed ground surface.  The
//! candidate itself sits [`DESTINATION_GROUND_OFFSET`] below the ground, so
//! comparing a node's height against the candidate would reject nodes lying
//! exactly on the road surface.

use std::f32::consts::TAU;

use bevy::log::debug;
use bevy::math::Vec3;
use rand::Rng;

use super::Vortex;
use crate::constants::*;
use crate::host::WorldHost;
use crate::math::{distance, distance_2d, lerp, move_towards};

/// One frame of movement: a fixed-size step toward `destination`, smoothed by
/// a lerp so the center glides instead of snapping.
pub fn step_towards(position: Vec3, destination: Vec3, move_speed_scale: f32, frame_time: f32) -> Vec3 {
    let target = move_towards(position, destination, move_speed_scale * MOVE_STEP_BASE);
    lerp(position, target, frame_time * MOVE_LERP_RATE)
}

impl Vortex {
    pub(crate) fn advance(&mut self, world: &mut impl WorldHost, rng: &mut impl Rng) {
        if !self.tuning.movement_enabled {
            return;
        }

        let reached = match self.destination {
            None => true,
            Some(dest) => distance(self.position, dest) < DESTINATION_REACHED_DISTANCE,
        };
        if reached {
            self.change_destination(world, false, rng);
        }

        let player_pos = world
            .player()
            .and_then(|player| world.entity_position(player));
        if let Some(player_pos) = player_pos {
            if distance(self.position, player_pos) > PLAYER_LEASH_DISTANCE {
                self.change_destination(world, true, rng);
            }
        }

        if let Some(dest) = self.destination {
            self.position = step_towards(
                self.position,
                dest,
                self.tuning.move_speed_scale,
                world.frame_time(),
            );
        }
    }

    /// Picks a new destination near a navigable node.
    ///
    /// Candidates are sampled around the player (`track_player`) or around the
    /// current destination (the current position when there is none).  A
    /// candidate is accepted when the closest node lies within
    /// [`NODE_MAX_HORIZONTAL`] horizontally and [`NODE_MAX_VERTICAL`]
    /// vertically of the ground under it.  When every attempt fails, tracking
    /// falls back to the player's exact position; wandering keeps the old
    /// destination.
    pub fn change_destination(
        &mut self,
        world: &mut impl WorldHost,
        track_player: bool,
        rng: &mut impl Rng,
    ) {
        let player_pos = world
            .player()
            .and_then(|player| world.entity_position(player));

        let (base, radius) = if track_player {
            match player_pos {
                Some(p) => (p, TRACK_PLAYER_RADIUS),
                None => return,
            }
        } else {
            (self.destination.unwrap_or(self.position), WANDER_RADIUS)
        };

        for _ in 0..DESTINATION_ATTEMPTS {
            let angle = rng.gen_range(0.0..TAU);
            let dist = rng.gen_range(0.0..radius);
            let mut candidate = Vec3::new(
                base.x + angle.cos() * dist,
                base.y + angle.sin() * dist,
                base.z,
            );

            let ground = world
                .ground_height(candidate.x, candidate.y)
                .filter(|g| g.is_finite());
            if let Some(g) = ground {
                candidate.z = g - DESTINATION_GROUND_OFFSET;
            }
            let surface = ground.unwrap_or(candidate.z);

            let Some(node) = world.closest_node(candidate) else {
                continue;
            };
            if distance_2d(candidate, node) < NODE_MAX_HORIZONTAL
                && (node.z - surface).abs() < NODE_MAX_VERTICAL
            {
                debug!("vortex {:?} heading to {:?}", self.id, candidate);
                self.destination = Some(candidate);
                return;
            }
        }

        if track_player {
            self.destination = player_pos;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TornadoConfig;
    use crate::host::EntityKind;
    use crate::release::ReleaseQueue;
    use crate::testing::MockWorld;
    use crate::vortex::VortexId;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn vortex(position: Vec3) -> Vortex {
        let mut rng = StdRng::seed_from_u64(9);
        let mut v = Vortex::new(
            VortexId(1),
            position,
            &TornadoConfig::default(),
            0,
            &mut rng,
            &ReleaseQueue::new(),
        );
        v.mark_active();
        v
    }

    #[test]
    fn step_is_bounded_by_move_speed() {
        let next = step_towards(Vec3::ZERO, Vec3::new(100.0, 0.0, 0.0), 1.0, 1.0);
        assert!((next.x - MOVE_STEP_BASE).abs() < 1e-6);
        // Small frame times lerp only part of the way.
        let partial = step_towards(Vec3::ZERO, Vec3::new(100.0, 0.0, 0.0), 1.0, 0.01);
        assert!(partial.x > 0.0 && partial.x < MOVE_STEP_BASE);
    }

    #[test]
    fn wandering_destination_stays_within_radius_and_snaps_below_ground() {
        let mut world = MockWorld::new();
        world.ground = Some(5.0);
        let mut rng = StdRng::seed_from_u64(11);
        let mut v = vortex(Vec3::new(50.0, 50.0, -5.0));

        // Nodes sit on the surface, a full ground offset above the candidate.
        v.change_destination(&mut world, false, &mut rng);
        let dest = v.destination().expect("a destination on open road");
        assert!(distance_2d(dest, v.position()) <= WANDER_RADIUS);
        assert_eq!(dest.z, 5.0 - DESTINATION_GROUND_OFFSET);
    }

    #[test]
    fn tracking_falls_back_to_player_when_no_road() {
        let mut world = MockWorld::new();
        world.navigable = false;
        let player = world.spawn_player(Vec3::new(400.0, 0.0, 0.0));
        let mut rng = StdRng::seed_from_u64(11);
        let mut v = vortex(Vec3::ZERO);

        v.change_destination(&mut world, true, &mut rng);
        assert_eq!(v.destination(), world.entity_position(player));
    }

    #[test]
    fn wandering_keeps_old_destination_when_no_road() {
        let mut world = MockWorld::new();
        world.navigable = false;
        let mut rng = StdRng::seed_from_u64(11);
        let mut v = vortex(Vec3::ZERO);
        let old = Vec3::new(30.0, 0.0, 0.0);
        v.set_destination(Some(old));

        v.change_destination(&mut world, false, &mut rng);
        assert_eq!(v.destination(), Some(old));
    }

    #[test]
    fn distant_player_pulls_destination_toward_them() {
        let mut world = MockWorld::new();
        world.spawn_player(Vec3::new(1_000.0, 0.0, 0.0));
        let mut rng = StdRng::seed_from_u64(5);
        let mut v = vortex(Vec3::ZERO);

        v.advance(&mut world, &mut rng);
        let dest = v.destination().expect("destination picked");
        assert!(distance_2d(dest, Vec3::new(1_000.0, 0.0, 0.0)) <= TRACK_PLAYER_RADIUS);
        assert!(v.position().x > 0.0, "vortex moved toward the player");
    }

    #[test]
    fn disabled_movement_keeps_position() {
        let mut world = MockWorld::new();
        world.spawn_entity(EntityKind::Character, Vec3::new(900.0, 0.0, 0.0));
        let mut config = TornadoConfig::default();
        config.vortex.movement_enabled = false;
        let mut rng = StdRng::seed_from_u64(5);
        let mut v = Vortex::new(VortexId(2), Vec3::ZERO, &config, 0, &mut rng, &ReleaseQueue::new());
        v.advance(&mut world, &mut rng);
        assert_eq!(v.position(), Vec3::ZERO);
        assert_eq!(v.destination(), None);
    }
}
