//! Centralised simulation constants.
//!
//! Every tuned number of the vortex simulation lives here so it can be found,
//! reasoned about, and changed in one place.  Many of these values were tuned
//! by feel in-game rather than derived; tests that depend on them exactly are
//! pinned to these constants, not to a physical model.
//!
//! Values that players can change at runtime also appear in
//! [`crate::config::TornadoConfig`], which uses the `DEFAULT_*` constants below
//! as its compiled defaults.

// ── Factory ───────────────────────────────────────────────────────────────────

/// Maximum number of vortices alive at once.  The oldest is evicted when a new
/// spawn would exceed it.
pub const VORTEX_LIMIT: usize = 30;

/// Minimum time between the completion of one spawn and the acceptance of the
/// next spawn request (ms).
pub const SPAWN_COOLDOWN_MS: u64 = 2_000;

/// Spawn positions are snapped this far below the resolved ground height so
/// the funnel base sits slightly under the terrain.
pub const SPAWN_GROUND_OFFSET: f32 = 10.0;

/// Ground heights below this are treated as a failed lookup.
pub const GROUND_HEIGHT_FLOOR: f32 = -1_000.0;

/// Radius around a new spawn point cleared of stale effect residue.
pub const SPAWN_FX_CLEAR_RADIUS: f32 = 200.0;

/// Radius around the player cleared of effect residue by `remove_all`.
pub const REMOVE_ALL_FX_CLEAR_RADIUS: f32 = 1_000.0;

// ── Storm auto-spawn ──────────────────────────────────────────────────────────

/// Weather predicates are evaluated at most this often (ms).
pub const STORM_CHECK_INTERVAL_MS: u64 = 1_000;

/// Chance per evaluation that a storm schedules a tornado.
pub const STORM_SPAWN_PROBABILITY: f32 = 0.30;

/// Scheduled storm spawns fire after a uniform delay in `[0, this)` ms.
pub const STORM_SPAWN_MAX_DELAY_MS: u64 = 20_000;

/// Rain intensity above which the weather counts as stormy.
pub const STORM_RAIN_THRESHOLD: f32 = 0.1;

/// Wind speed raised when a storm spawn is scheduled or a tornado is summoned.
pub const STORM_WIND_SPEED: f32 = 70.0;

/// Storm spawns land `[MIN, MIN + RANGE)` units from the player.
pub const STORM_SPAWN_MIN_DISTANCE: f32 = 200.0;
pub const STORM_SPAWN_DISTANCE_RANGE: f32 = 200.0;

// ── Commands ──────────────────────────────────────────────────────────────────

/// Distance ahead of the player at which a summoned tornado appears.
pub const SUMMON_DISTANCE: f32 = 180.0;

/// Radius around the world origin cleared before a summon.
pub const SUMMON_FX_CLEAR_RADIUS: f32 = 500.0;

/// Height above the funnel base the player lands at when teleporting.
pub const TELEPORT_HEIGHT: f32 = 10.0;

// ── Vortex lifetime ───────────────────────────────────────────────────────────

/// Random life span bounds for a despawning vortex (ms, inclusive).
pub const LIFE_SPAN_MIN_MS: u64 = 160_000;
pub const LIFE_SPAN_MAX_MS: u64 = 600_000;

/// Cached force tunables are re-read from the config snapshot this often (ms).
pub const VORTEX_TUNING_REFRESH_MS: u64 = 5_000;

// ── Vortex movement ───────────────────────────────────────────────────────────

/// A destination closer than this counts as reached and a new one is picked.
pub const DESTINATION_REACHED_DISTANCE: f32 = 15.0;

/// When the player is farther than this the vortex re-targets toward them.
pub const PLAYER_LEASH_DISTANCE: f32 = 200.0;

/// Radius around the player sampled while tracking them.
pub const TRACK_PLAYER_RADIUS: f32 = 130.0;

/// Radius around the current destination sampled while wandering.
pub const WANDER_RADIUS: f32 = 100.0;

/// Candidate destinations tried before falling back.
pub const DESTINATION_ATTEMPTS: usize = 50;

/// A candidate is accepted only if a navigable node lies within these bounds.
pub const NODE_MAX_HORIZONTAL: f32 = 40.0;
pub const NODE_MAX_VERTICAL: f32 = 10.0;

/// Destinations sit this far below the ground like the spawn point does.
pub const DESTINATION_GROUND_OFFSET: f32 = 10.0;

/// Per-tick step toward the destination before scaling by `move_speed_scale`.
pub const MOVE_STEP_BASE: f32 = 0.287;

/// The lerp toward the stepped target uses `frame_time * MOVE_LERP_RATE`.
pub const MOVE_LERP_RATE: f32 = 20.0;

/// Label shown on the host map marker.
pub const MARKER_LABEL: &str = "Tornado";

// ── Entity capture ────────────────────────────────────────────────────────────

/// Entities are collected while `dist2d <= max_entity_distance + COLLECT_MARGIN`.
pub const COLLECT_MARGIN: f32 = 5.0;

/// Tracked entities are released once `dist2d > max_entity_distance + RELEASE_MARGIN`.
pub const RELEASE_MARGIN: f32 = 4.0;

/// Entities higher than this above the ground are neither collected nor kept.
pub const MAX_HEIGHT_ABOVE_GROUND: f32 = 300.0;

/// Normal delay between entity scans (ms).
pub const COLLECT_INTERVAL_MS: u64 = 50;

/// Scan delay once a scan fills the tracked set to capacity (ms).
pub const COLLECT_INTERVAL_SATURATED_MS: u64 = 1_000;

/// Scan delay when a scan starts with the tracked set already full (ms).
pub const COLLECT_INTERVAL_FULL_MS: u64 = 2_000;

/// Entities added by a single scan, across all pools.
pub const MAX_ADDS_PER_SCAN: usize = 300;

/// Handles requested from each host entity pool per scan.
pub const ENTITY_POOL_SIZE: usize = 1_024;

/// Tracked entities receiving forces per tick.  Range and existence checks
/// still run for every tracked entity.
pub const MAX_FORCED_PER_TICK: usize = 500;

/// Lateral bias offsets are drawn from `[-LATERAL_BIAS, LATERAL_BIAS]`.
pub const LATERAL_BIAS: f32 = 3.0;

/// Ragdoll duration bounds handed to the host (ms).
pub const RAGDOLL_MIN_MS: u32 = 800;
pub const RAGDOLL_MAX_MS: u32 = 1_500;

// ── Forces ────────────────────────────────────────────────────────────────────

/// Base magnitude of the tangential force.
pub const FORCE_SCALE: f32 = 3.0;

/// Player-specific multipliers.
pub const PLAYER_VERTICAL_BOOST: f32 = 1.62;
pub const PLAYER_HORIZONTAL_BOOST: f32 = 1.2;

/// Extra multiplier for airborne vehicles (planes).
pub const PLANE_FORCE_MULTIPLIER: f32 = 6.0;

/// The lift force points at a spot this high above the vortex center.
pub const LIFT_TARGET_HEIGHT: f32 = 1_000.0;

/// Pull directions shorter than this are skipped.
pub const MIN_PULL_LENGTH: f32 = 0.0001;

/// How long a player line-of-sight ray result stays valid (ms).
pub const SIGHT_CACHE_MS: u64 = 1_000;

// ── Build ─────────────────────────────────────────────────────────────────────

/// Safety caps applied to the configured layer layout.
pub const MAX_LAYERS_CAP: i64 = 36;
pub const MAX_PARTICLES_PER_LAYER_CAP: i64 = 6;

/// Total layers when the cloud top is enabled.
pub const CLOUD_TOP_LAYER_COUNT: usize = 8;

/// Layers with `layer + CLOUD_TOP_DEPTH > layers` form the cloud ring.
pub const CLOUD_TOP_DEPTH: usize = 3;

/// Layers with `layer + WIDE_LAYER_DEPTH > layers` get `WIDE_LAYER_EXTRA` more particles.
pub const WIDE_LAYER_DEPTH: usize = 4;
pub const WIDE_LAYER_EXTRA: usize = 2;

/// Cloud-ring growth, applied cumulatively per cloud particle.
pub const CLOUD_TOP_LIFT: f32 = 12.0;
pub const CLOUD_TOP_SIZE_GROWTH: f32 = 6.0;
pub const CLOUD_TOP_RADIUS_GROWTH: f32 = 7.0;

/// Starting visual scale of the funnel particles.
pub const BASE_PARTICLE_SIZE: f32 = 3.0685;

/// Per-particle growth: `radius += LAYER_RADIUS_GROWTH * layer`.
pub const LAYER_RADIUS_GROWTH: f32 = 0.08 * 0.72;

/// Per-particle growth: `size += LAYER_SIZE_GROWTH * layer`.
pub const LAYER_SIZE_GROWTH: f32 = 0.01 * 0.12;

/// Bottom layers decorated with the secondary debris effect.
pub const DECORATION_LAYERS: usize = 2;
pub const DECORATION_FX_ASSET: &str = "scr_agencyheistb";
pub const DECORATION_FX_NAME: &str = "scr_env_agency3b_smoke";
pub const DECORATION_FX_SCALE: f32 = 4.7;

/// Effect asset that the host always has resident.
pub const CORE_FX_ASSET: &str = "core";

/// Invisible prop used as an effect anchor.
pub const ANCHOR_MODEL: &str = "prop_beach_volball02";

/// Asset preload budget: polls before the build proceeds anyway (~2 s at 60 fps).
pub const ASSET_WAIT_ATTEMPTS: u32 = 120;

/// Particles created per build step before yielding back to the host.
pub const BUILD_YIELD_EVERY: usize = 5;

/// Frames the build idles after the last particle before completing.
pub const BUILD_SETTLE_FRAMES: u32 = 1;

// ── Particles ─────────────────────────────────────────────────────────────────

/// Effect load budget per particle (polls).
pub const PARTICLE_FX_WAIT_ATTEMPTS: u32 = 50;

/// Rotation tunables are re-read from the config snapshot this often (ms).
pub const PARTICLE_TUNING_REFRESH_MS: u64 = 10_000;

/// Minimum per-layer rotation weight.
pub const LAYER_WEIGHT_FLOOR: f32 = 0.3;

/// Fixed rotation weight of cloud-top particles.
pub const CLOUD_TOP_ROTATION_WEIGHT: f32 = 0.16;

// ── Audio ─────────────────────────────────────────────────────────────────────

pub const EAS_SOUND: &str = "eas_beeps";
pub const SIREN_SOUND: &str = "city_siren";

// ── Configuration defaults ────────────────────────────────────────────────────

pub const DEFAULT_VORTEX_RADIUS: f32 = 9.4;
pub const DEFAULT_MOVE_SPEED_SCALE: f32 = 1.0;
pub const DEFAULT_MAX_ENTITY_DISTANCE: f32 = 57.0;
pub const DEFAULT_MAX_ENTITY_COUNT: usize = 200;
pub const DEFAULT_ROTATION_SPEED: f32 = 2.4;
pub const DEFAULT_VERTICAL_FORCE_SCALE: f32 = 2.29;
pub const DEFAULT_HORIZONTAL_FORCE_SCALE: f32 = 1.7;
pub const DEFAULT_MAX_ENTITY_SPEED: f32 = 40.0;
pub const DEFAULT_PARTICLES_PER_LAYER: i64 = 9;
pub const DEFAULT_MAX_PARTICLE_LAYERS: i64 = 48;
pub const DEFAULT_LAYER_SEPARATION: f32 = 22.0;
pub const DEFAULT_PARTICLE_ASSET: &str = "core";
pub const DEFAULT_PARTICLE_NAME: &str = "ent_amb_smoke_foundry";
pub const DEFAULT_EAS_VOLUME: f32 = 0.5;
pub const DEFAULT_SIREN_VOLUME: f32 = 0.5;

// ── Sandbox host ──────────────────────────────────────────────────────────────

/// Effect anchors the sandbox can hold before `create_anchor` reports an
/// exhausted pool.
pub const SANDBOX_ANCHOR_CAPACITY: usize = 2_048;

/// Frames between an asset request and the asset counting as loaded.
pub const SANDBOX_ASSET_STREAM_FRAMES: u32 = 10;

/// Half the side length of the flat ground square.  Ground probes outside it
/// fail.
pub const SANDBOX_GROUND_HALF_EXTENT: f32 = 600.0;

/// Distance between parallel roads of the street grid.
pub const SANDBOX_ROAD_SPACING: f32 = 80.0;

/// Characters within this distance of a threat anchor run from it.
pub const SANDBOX_THREAT_RADIUS: f32 = 90.0;
pub const SANDBOX_FLEE_SPEED: f32 = 7.0;

pub const SANDBOX_WALK_SPEED: f32 = 12.0;
pub const SANDBOX_TURN_SPEED: f32 = 2.5;

/// On-screen lifetime of a notification.
pub const SANDBOX_NOTIFICATION_SECS: f32 = 4.0;
