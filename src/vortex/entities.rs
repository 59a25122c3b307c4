//! Capturing nearby entities and pulling them into the funnel.
//!
//! Collection and release use different radii: an entity is collected while
//! `dist2d <= max_entity_distance + COLLECT_MARGIN` and released once
//! `dist2d > max_entity_distance + RELEASE_MARGIN`.  These margins were tuned
//! in-game; the tests pin the exact boundaries.

use bevy::math::Vec3;
use rand::Rng;

use super::{ActiveEntity, Vortex, VortexTuning};
use crate::config::TornadoConfig;
use crate::constants::*;
use crate::host::{EntityHandle, EntityKind, ForceMode, WorldHost};
use crate::math::{cross, distance_2d, length, normalize};

/// The three forces applied to one pulled entity in a tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PullForces {
    /// Impulse toward the (biased) vortex axis.
    pub suction: Vec3,
    /// Force toward a point high above the vortex center.
    pub lift: Vec3,
    /// Force around the axis.
    pub tangential: Vec3,
}

/// Computes the forces for an entity at `entity_pos` around `center`.
/// Returns `None` when the pull direction is degenerate.
///
/// `force_bias` is the per-tick random factor in `[0, 1)`.
pub fn pull_forces(
    center: Vec3,
    entity_pos: Vec3,
    entry: &ActiveEntity,
    vertical: f32,
    horizontal: f32,
    force_bias: f32,
    force_multiplier: f32,
) -> Option<PullForces> {
    let target = Vec3::new(center.x + entry.x_bias, center.y + entry.y_bias, entity_pos.z);
    let to_target = target - entity_pos;
    if length(to_target) < MIN_PULL_LENGTH {
        return None;
    }
    let direction = normalize(to_target);
    let dist = distance_2d(entity_pos, center);
    let force = FORCE_SCALE * (force_bias + force_bias / dist.max(1.0)) * force_multiplier;

    let up_target = Vec3::new(center.x, center.y, center.z + LIFT_TARGET_HEIGHT);
    let lift = normalize(up_target - entity_pos) * vertical;
    let tangential = normalize(cross(direction, Vec3::Z)) * force * horizontal;

    Some(PullForces {
        suction: direction * horizontal,
        lift,
        tangential,
    })
}

impl Vortex {
    /// Rate-limited scan of the host entity pools.
    pub(crate) fn collect_nearby_entities(
        &mut self,
        world: &mut impl WorldHost,
        now: u64,
        rng: &mut impl Rng,
    ) {
        if now < self.next_scan_at {
            return;
        }
        let max_count = self.tuning.max_entity_count;
        if self.pulled.len() >= max_count {
            self.next_scan_at = now + COLLECT_INTERVAL_FULL_MS;
            return;
        }

        let max_dist = self.tuning.max_entity_distance;
        let player = world.player();
        let mut added = 0usize;

        'pools: for kind in EntityKind::ALL {
            if self.pulled.len() >= max_count || added >= MAX_ADDS_PER_SCAN {
                break;
            }
            for handle in world.nearby_entities(kind, ENTITY_POOL_SIZE) {
                if added >= MAX_ADDS_PER_SCAN || self.pulled.len() >= max_count {
                    break 'pools;
                }
                if self.pulled.contains_key(&handle) || !world.entity_exists(handle) {
                    continue;
                }
                let Some(pos) = world.entity_position(handle) else {
                    continue;
                };
                if distance_2d(pos, self.position) > max_dist + COLLECT_MARGIN {
                    continue;
                }
                if world.height_above_ground(handle) > MAX_HEIGHT_ABOVE_GROUND {
                    continue;
                }

                if kind == EntityKind::Character && !world.is_ragdoll(handle) {
                    world.set_ragdoll(handle, RAGDOLL_MIN_MS, RAGDOLL_MAX_MS);
                }

                self.pulled.insert(
                    handle,
                    ActiveEntity {
                        handle,
                        x_bias: LATERAL_BIAS * rng.gen_range(-1.0..=1.0),
                        y_bias: LATERAL_BIAS * rng.gen_range(-1.0..=1.0),
                        is_player: Some(handle) == player,
                    },
                );
                added += 1;
            }
        }

        let delay = if self.pulled.len() >= max_count {
            COLLECT_INTERVAL_SATURATED_MS
        } else {
            COLLECT_INTERVAL_MS
        };
        self.next_scan_at = now + delay;
    }

    /// Releases out-of-range entities and applies forces to the rest.
    pub(crate) fn update_pulled_entities(
        &mut self,
        world: &mut impl WorldHost,
        config: &TornadoConfig,
        now: u64,
        rng: &mut impl Rng,
    ) {
        if now.saturating_sub(self.tuning_refreshed_at) > VORTEX_TUNING_REFRESH_MS {
            self.tuning = VortexTuning::from_config(config);
            self.tuning_refreshed_at = now;
        }

        self.pending_removal.clear();
        let snapshot: Vec<ActiveEntity> = self.pulled.values().copied().collect();
        let max_dist = self.tuning.max_entity_distance;
        let mut processed = 0usize;

        for entry in snapshot {
            let handle = entry.handle;
            if !world.entity_exists(handle) {
                self.release_entity(handle);
                continue;
            }
            let Some(pos) = world.entity_position(handle) else {
                self.release_entity(handle);
                continue;
            };
            let dist = distance_2d(pos, self.position);
            if dist > max_dist + RELEASE_MARGIN
                || world.height_above_ground(handle) > MAX_HEIGHT_ABOVE_GROUND
            {
                self.release_entity(handle);
                continue;
            }

            // Range checks above still run for every entry past the cap.
            if processed >= MAX_FORCED_PER_TICK {
                continue;
            }
            processed += 1;

            self.apply_pull(world, &entry, pos, now, rng);
        }

        for handle in self.pending_removal.drain(..) {
            self.pulled.remove(&handle);
        }
    }

    fn apply_pull(
        &mut self,
        world: &mut impl WorldHost,
        entry: &ActiveEntity,
        pos: Vec3,
        now: u64,
        rng: &mut impl Rng,
    ) {
        let handle = entry.handle;
        let mut vertical = self.tuning.vertical_force;
        let mut horizontal = self.tuning.horizontal_force;
        let mut multiplier = 1.0;

        if entry.is_player {
            vertical *= PLAYER_VERTICAL_BOOST;
            horizontal *= PLAYER_HORIZONTAL_BOOST;

            if self.sight.is_stale(now) {
                let target = Vec3::new(
                    self.position.x + entry.x_bias,
                    self.position.y + entry.y_bias,
                    pos.z,
                );
                self.sight.blocked = world.ray_blocked(pos, target, handle);
                self.sight.checked_at = Some(now);
            }
            if self.sight.blocked {
                return;
            }
        }

        if world.is_plane(handle) {
            multiplier = PLANE_FORCE_MULTIPLIER;
            vertical *= PLANE_FORCE_MULTIPLIER;
        }

        let force_bias = rng.gen_range(0.0..1.0);
        let Some(forces) = pull_forces(
            self.position,
            pos,
            entry,
            vertical,
            horizontal,
            force_bias,
            multiplier,
        ) else {
            return;
        };

        world.apply_force(handle, forces.suction, ForceMode::Impulse);
        world.apply_force(handle, forces.lift, ForceMode::CenterOfMass);
        world.apply_force(handle, forces.tangential, ForceMode::CenterOfMass);

        if world.entity_kind(handle) == Some(EntityKind::Character) && !world.is_ragdoll(handle) {
            world.set_ragdoll(handle, RAGDOLL_MIN_MS, RAGDOLL_MAX_MS);
        }
        world.set_max_speed(handle, self.tuning.max_entity_speed);
    }

    fn release_entity(&mut self, handle: EntityHandle) {
        if !self.pending_removal.contains(&handle) {
            self.pending_removal.push(handle);
        }
    }
}
