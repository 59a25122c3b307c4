//! Playable Bevy + Rapier3D sandbox hosting the simulation.
//!
//! A small street grid with buildings, pedestrians, cars, loose props and a
//! parked plane.  The simulation core sees it through [`host::BevyHost`]; this
//! module owns the ECS side of that contract:
//!
//! * components marking what the tornado can pull ([`Pullable`]) and the
//!   objects it creates ([`FxAnchor`], [`LoopedFx`], [`MapMarker`],
//!   [`AlertSound`]),
//! * resources standing in for host services (asset streaming, terrain, the
//!   road grid, weather, notifications),
//! * systems that make host commands physical: force reset before the tick,
//!   speed limits and ragdoll recovery after it, pedestrians fleeing threats.
//!
//! [`SandboxWorldPlugin`] is headless-safe.  [`SandboxPlugin`] adds the scene,
//! input, camera, gizmos and HUD on top.
//!
//! ## Keys
//!
//! | Key | Action |
//! |-----|--------|
//! | W/S, A/D | walk, turn |
//! | F5 | summon a tornado |
//! | F6 | toggle tornado |
//! | F7 | teleport to the tornado |
//! | F8 | despawn all tornadoes |
//! | F9 | save settings |
//! | F10 | reload vortex settings |
//! | R | toggle rain |

pub mod host;

use std::collections::{HashMap, HashSet};

use bevy::prelude::*;
use bevy_rapier3d::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::command::SimCommand;
use crate::constants::*;
use crate::host::{EntityKind, Weather};
use crate::simulation::{simulation_tick_system, CommandRequest};
use host::to_bevy;

// ── Components ────────────────────────────────────────────────────────────────

/// An entity the tornado may pick up.
#[derive(Component, Debug, Clone, Copy)]
pub struct Pullable {
    pub kind: EntityKind,
    pub plane: bool,
}

#[derive(Component)]
pub struct PlayerCharacter;

/// Limp body; removed when the timer finishes.
#[derive(Component)]
pub struct Ragdoll(pub Timer);

#[derive(Component, Debug, Clone, Copy)]
pub struct SpeedLimit(pub f32);

/// Invisible carrier for a looped effect.
#[derive(Component)]
pub struct FxAnchor;

/// A looped effect, parented to its [`FxAnchor`].
#[derive(Component, Debug, Clone)]
pub struct LoopedFx {
    pub asset: String,
    pub name: String,
    pub scale: f32,
}

#[derive(Component, Debug, Clone)]
pub struct MapMarker {
    pub label: String,
}

/// Blocks line of sight.  Half extents are Z-up.
#[derive(Component, Debug, Clone, Copy)]
pub struct Obstacle {
    pub half_extents: Vec3,
}

#[derive(Component, Debug, Clone)]
pub struct AlertSound {
    pub name: String,
    pub volume: f32,
}

#[derive(Component)]
pub struct NotificationText;

#[derive(Component)]
pub struct FollowCamera;

// ── Resources ─────────────────────────────────────────────────────────────────

/// Names that load a fixed number of frames after they are requested.
#[derive(Debug, Default)]
pub struct StreamingSet {
    loaded: HashSet<String>,
    pending: HashMap<String, u32>,
}

impl StreamingSet {
    pub fn preloaded(names: &[&str]) -> Self {
        Self {
            loaded: names.iter().map(|n| n.to_string()).collect(),
            pending: HashMap::new(),
        }
    }

    pub fn request(&mut self, name: &str, frames: u32) {
        if !self.loaded.contains(name) {
            self.pending.entry(name.to_string()).or_insert(frames);
        }
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.contains(name)
    }

    /// Advances every pending request by one frame.
    pub fn tick(&mut self) {
        let mut done = Vec::new();
        for (name, frames) in self.pending.iter_mut() {
            *frames = frames.saturating_sub(1);
            if *frames == 0 {
                done.push(name.clone());
            }
        }
        for name in done {
            self.pending.remove(&name);
            self.loaded.insert(name);
        }
    }
}

#[derive(Resource, Debug)]
pub struct StreamingAssets {
    pub fx: StreamingSet,
    pub models: StreamingSet,
    pub stream_frames: u32,
}

impl Default for StreamingAssets {
    fn default() -> Self {
        Self {
            fx: StreamingSet::preloaded(&[CORE_FX_ASSET]),
            models: StreamingSet::default(),
            stream_frames: SANDBOX_ASSET_STREAM_FRAMES,
        }
    }
}

/// Flat ground square centred on the origin.
#[derive(Resource, Debug, Clone, Copy)]
pub struct Terrain {
    pub height: f32,
    pub half_extent: f32,
}

impl Default for Terrain {
    fn default() -> Self {
        Self {
            height: 0.0,
            half_extent: SANDBOX_GROUND_HALF_EXTENT,
        }
    }
}

/// Roads run along every multiple of `spacing` on both axes.
#[derive(Resource, Debug, Clone, Copy)]
pub struct RoadGrid {
    pub spacing: f32,
}

impl Default for RoadGrid {
    fn default() -> Self {
        Self {
            spacing: SANDBOX_ROAD_SPACING,
        }
    }
}

#[derive(Resource, Debug, Default, Clone, Copy)]
pub struct SandboxWeather {
    pub rain_level: f32,
    pub previous: Weather,
    pub wind_speed: f32,
}

/// Anchors pedestrians currently run from.
#[derive(Resource, Debug, Default)]
pub struct ThreatEvents(pub Vec<Entity>);

/// On-screen messages with their remaining lifetime in seconds.
#[derive(Resource, Debug, Default)]
pub struct Notifications(pub Vec<(String, f32)>);

// ── Plugins ───────────────────────────────────────────────────────────────────

/// Host-side state and the physical follow-up of host commands.  Needs no
/// window, so tests run it under `MinimalPlugins`.
pub struct SandboxWorldPlugin;

impl Plugin for SandboxWorldPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<StreamingAssets>()
            .init_resource::<Terrain>()
            .init_resource::<RoadGrid>()
            .init_resource::<SandboxWeather>()
            .init_resource::<ThreatEvents>()
            .init_resource::<Notifications>()
            .add_systems(
                Update,
                (asset_streaming_system, force_reset_system).before(simulation_tick_system),
            )
            .add_systems(
                Update,
                (
                    speed_limit_system,
                    ragdoll_recovery_system,
                    threat_flee_system,
                    notification_expiry_system,
                )
                    .after(simulation_tick_system),
            );
    }
}

pub struct SandboxPlugin;

impl Plugin for SandboxPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(SandboxWorldPlugin)
            .add_systems(Startup, (setup_scene, setup_hud))
            .add_systems(
                Update,
                (player_movement_system, hotkey_system).before(simulation_tick_system),
            )
            .add_systems(
                Update,
                (
                    camera_follow_system,
                    fx_gizmo_system,
                    marker_gizmo_system,
                    hud_system,
                )
                    .after(simulation_tick_system),
            );
    }
}

// ── Host follow-up systems ────────────────────────────────────────────────────

pub fn asset_streaming_system(mut assets: ResMut<StreamingAssets>) {
    assets.fx.tick();
    assets.models.tick();
}

/// Clears continuous forces so each tick starts from zero.
pub fn force_reset_system(mut q: Query<&mut ExternalForce>) {
    for mut force in q.iter_mut() {
        force.force = Vec3::ZERO;
        force.torque = Vec3::ZERO;
    }
}

pub fn speed_limit_system(mut q: Query<(&SpeedLimit, &mut Velocity)>) {
    for (limit, mut velocity) in q.iter_mut() {
        velocity.linvel = velocity.linvel.clamp_length_max(limit.0);
    }
}

/// Stands characters back up once their ragdoll timer runs out.
pub fn ragdoll_recovery_system(
    mut commands: Commands,
    time: Res<Time>,
    mut q: Query<(Entity, &mut Ragdoll, &mut Transform)>,
) {
    for (entity, mut ragdoll, mut transform) in q.iter_mut() {
        ragdoll.0.tick(time.delta());
        if !ragdoll.0.is_finished() {
            continue;
        }
        let (yaw, _, _) = transform.rotation.to_euler(EulerRot::YXZ);
        transform.rotation = Quat::from_rotation_y(yaw);
        commands
            .entity(entity)
            .remove::<Ragdoll>()
            .insert(LockedAxes::ROTATION_LOCKED);
    }
}

/// Pedestrians near a live threat anchor run directly away from it.
pub fn threat_flee_system(
    mut threats: ResMut<ThreatEvents>,
    anchors: Query<&Transform, With<FxAnchor>>,
    mut pedestrians: Query<
        (&Pullable, &Transform, &mut Velocity),
        (Without<PlayerCharacter>, Without<Ragdoll>, Without<FxAnchor>),
    >,
) {
    threats.0.retain(|anchor| anchors.contains(*anchor));
    if threats.0.is_empty() {
        return;
    }
    let sources: Vec<Vec3> = threats
        .0
        .iter()
        .filter_map(|anchor| anchors.get(*anchor).ok())
        .map(|t| t.translation)
        .collect();

    for (pullable, transform, mut velocity) in pedestrians.iter_mut() {
        if pullable.kind != EntityKind::Character {
            continue;
        }
        let here = transform.translation;
        let nearest = sources
            .iter()
            .map(|s| (*s, Vec2::new(here.x - s.x, here.z - s.z)))
            .filter(|(_, away)| away.length() < SANDBOX_THREAT_RADIUS)
            .min_by(|a, b| a.1.length().total_cmp(&b.1.length()));
        if let Some((_, away)) = nearest {
            let dir = away.normalize_or_zero() * SANDBOX_FLEE_SPEED;
            velocity.linvel.x = dir.x;
            velocity.linvel.z = dir.y;
        }
    }
}

pub fn notification_expiry_system(time: Res<Time>, mut notifications: ResMut<Notifications>) {
    if notifications.0.is_empty() {
        return;
    }
    let dt = time.delta_secs();
    for (_, remaining) in notifications.0.iter_mut() {
        *remaining -= dt;
    }
    notifications.0.retain(|(_, remaining)| *remaining > 0.0);
}

// ── Scene ─────────────────────────────────────────────────────────────────────

const PEDESTRIANS: usize = 30;
const CARS: usize = 16;
const PROPS: usize = 60;

fn grid_point(rng: &mut StdRng, extent: f32) -> Vec3 {
    Vec3::new(
        rng.gen_range(-extent..extent),
        rng.gen_range(-extent..extent),
        0.0,
    )
}

fn pullable_body(kind: EntityKind, plane: bool) -> impl Bundle {
    (
        Pullable { kind, plane },
        RigidBody::Dynamic,
        Velocity::zero(),
        ExternalForce::default(),
        ExternalImpulse::default(),
        ColliderMassProperties::Mass(1.0),
    )
}

pub fn setup_scene(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    terrain: Res<Terrain>,
    roads: Res<RoadGrid>,
) {
    let mut rng = StdRng::seed_from_u64(0x7042_ad00);
    let half = terrain.half_extent;

    commands.spawn((
        Camera3d::default(),
        Transform::from_xyz(0.0, 20.0, 30.0).looking_at(Vec3::ZERO, Vec3::Y),
        FollowCamera,
    ));
    commands.spawn((
        DirectionalLight {
            illuminance: 12_000.0,
            shadows_enabled: true,
            ..default()
        },
        Transform::from_xyz(200.0, 400.0, 150.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    // Ground
    commands.spawn((
        Mesh3d(meshes.add(Plane3d::default().mesh().size(half * 2.0, half * 2.0))),
        MeshMaterial3d(materials.add(Color::srgb(0.32, 0.42, 0.28))),
        Transform::from_xyz(0.0, terrain.height, 0.0),
        RigidBody::Fixed,
        Collider::cuboid(half, 0.1, half),
    ));

    // Roads
    let road_mesh = meshes.add(Cuboid::new(half * 2.0, 0.05, 8.0));
    let road_material = materials.add(Color::srgb(0.18, 0.18, 0.2));
    let lines = (half / roads.spacing) as i32;
    for k in -lines..=lines {
        let offset = k as f32 * roads.spacing;
        for rotation in [Quat::IDENTITY, Quat::from_rotation_y(std::f32::consts::FRAC_PI_2)] {
            let along = rotation * Vec3::new(0.0, 0.0, offset);
            commands.spawn((
                Mesh3d(road_mesh.clone()),
                MeshMaterial3d(road_material.clone()),
                Transform::from_translation(along + Vec3::Y * (terrain.height + 0.03))
                    .with_rotation(rotation),
            ));
        }
    }

    // Buildings, one per block on a checkerboard.
    let building_material = materials.add(Color::srgb(0.55, 0.55, 0.6));
    for bx in -lines..lines {
        for by in -lines..lines {
            if (bx + by).rem_euclid(2) != 0 {
                continue;
            }
            let center = Vec3::new(
                (bx as f32 + 0.5) * roads.spacing,
                (by as f32 + 0.5) * roads.spacing,
                0.0,
            );
            if center.truncate().length() < roads.spacing * 1.5 {
                continue;
            }
            let footprint = roads.spacing * 0.3;
            let height = rng.gen_range(12.0..60.0);
            let half_extents = Vec3::new(footprint, footprint, height * 0.5);
            commands.spawn((
                Mesh3d(meshes.add(Cuboid::new(footprint * 2.0, height, footprint * 2.0))),
                MeshMaterial3d(building_material.clone()),
                Transform::from_translation(to_bevy(center + Vec3::Z * height * 0.5)),
                RigidBody::Fixed,
                Collider::cuboid(footprint, height * 0.5, footprint),
                Obstacle { half_extents },
            ));
        }
    }

    // Player
    let person_mesh = meshes.add(Capsule3d::new(0.4, 1.2));
    commands.spawn((
        Mesh3d(person_mesh.clone()),
        MeshMaterial3d(materials.add(Color::srgb(0.2, 0.4, 0.9))),
        Transform::from_translation(to_bevy(Vec3::new(0.0, 0.0, 1.2))),
        pullable_body(EntityKind::Character, false),
        Collider::capsule_y(0.6, 0.4),
        LockedAxes::ROTATION_LOCKED,
        PlayerCharacter,
    ));

    // Pedestrians
    let pedestrian_material = materials.add(Color::srgb(0.8, 0.6, 0.4));
    for _ in 0..PEDESTRIANS {
        let at = grid_point(&mut rng, half * 0.4) + Vec3::Z * 1.2;
        commands.spawn((
            Mesh3d(person_mesh.clone()),
            MeshMaterial3d(pedestrian_material.clone()),
            Transform::from_translation(to_bevy(at)),
            pullable_body(EntityKind::Character, false),
            Collider::capsule_y(0.6, 0.4),
            LockedAxes::ROTATION_LOCKED,
        ));
    }

    // Cars sit on the roads.
    let car_mesh = meshes.add(Cuboid::new(4.2, 1.5, 2.0));
    let car_material = materials.add(Color::srgb(0.75, 0.15, 0.12));
    for _ in 0..CARS {
        let lane = rng.gen_range(-lines..=lines) as f32 * roads.spacing;
        let along = rng.gen_range(-half * 0.5..half * 0.5);
        let at = if rng.gen_bool(0.5) {
            Vec3::new(along, lane + 2.0, 0.9)
        } else {
            Vec3::new(lane + 2.0, along, 0.9)
        };
        commands.spawn((
            Mesh3d(car_mesh.clone()),
            MeshMaterial3d(car_material.clone()),
            Transform::from_translation(to_bevy(at)),
            pullable_body(EntityKind::Vehicle, false),
            Collider::cuboid(2.1, 0.75, 1.0),
        ));
    }

    // Props
    let prop_mesh = meshes.add(Cuboid::new(0.8, 0.8, 0.8));
    let prop_material = materials.add(Color::srgb(0.6, 0.45, 0.25));
    for _ in 0..PROPS {
        let at = grid_point(&mut rng, half * 0.4) + Vec3::Z * 0.5;
        commands.spawn((
            Mesh3d(prop_mesh.clone()),
            MeshMaterial3d(prop_material.clone()),
            Transform::from_translation(to_bevy(at)),
            pullable_body(EntityKind::Object, false),
            Collider::cuboid(0.4, 0.4, 0.4),
        ));
    }

    // A parked plane on the outskirts.
    commands.spawn((
        Mesh3d(meshes.add(Cuboid::new(12.0, 2.0, 14.0))),
        MeshMaterial3d(materials.add(Color::srgb(0.9, 0.9, 0.92))),
        Transform::from_translation(to_bevy(Vec3::new(half * 0.6, 0.0, 1.5))),
        pullable_body(EntityKind::Vehicle, true),
        Collider::cuboid(6.0, 1.0, 7.0),
    ));

    println!(
        "✓ Sandbox spawned: {} pedestrians, {} cars, {} props",
        PEDESTRIANS, CARS, PROPS
    );
}

pub fn setup_hud(mut commands: Commands) {
    commands.spawn((
        Text::new(""),
        TextFont {
            font_size: 18.0,
            ..default()
        },
        TextColor(Color::WHITE),
        Node {
            position_type: PositionType::Absolute,
            top: Val::Px(12.0),
            left: Val::Px(12.0),
            ..default()
        },
        NotificationText,
    ));
    commands.spawn((
        Text::new("F5 summon | F6 toggle | F7 teleport | F8 despawn all | F9 save | F10 reload | R rain"),
        TextFont {
            font_size: 14.0,
            ..default()
        },
        TextColor(Color::srgba(1.0, 1.0, 1.0, 0.7)),
        Node {
            position_type: PositionType::Absolute,
            bottom: Val::Px(10.0),
            left: Val::Px(12.0),
            ..default()
        },
    ));
}

// ── Input ─────────────────────────────────────────────────────────────────────

pub fn player_movement_system(
    keys: Res<ButtonInput<KeyCode>>,
    time: Res<Time>,
    mut q: Query<(&mut Transform, &mut Velocity), (With<PlayerCharacter>, Without<Ragdoll>)>,
) {
    let Ok((mut transform, mut velocity)) = q.single_mut() else {
        return;
    };
    if keys.pressed(KeyCode::KeyA) {
        transform.rotate_y(SANDBOX_TURN_SPEED * time.delta_secs());
    } else if keys.pressed(KeyCode::KeyD) {
        transform.rotate_y(-SANDBOX_TURN_SPEED * time.delta_secs());
    }

    let forward = transform.forward();
    let mut walk = 0.0;
    if keys.pressed(KeyCode::KeyW) {
        walk += 1.0;
    }
    if keys.pressed(KeyCode::KeyS) {
        walk -= 0.5;
    }
    velocity.linvel.x = forward.x * walk * SANDBOX_WALK_SPEED;
    velocity.linvel.z = forward.z * walk * SANDBOX_WALK_SPEED;
}

pub fn hotkey_system(
    keys: Res<ButtonInput<KeyCode>>,
    mut weather: ResMut<SandboxWeather>,
    mut requests: MessageWriter<CommandRequest>,
) {
    let bindings = [
        (KeyCode::F5, SimCommand::SpawnTornado),
        (KeyCode::F6, SimCommand::ToggleTornado),
        (KeyCode::F7, SimCommand::TeleportToTornado),
        (KeyCode::F8, SimCommand::DespawnAll),
        (KeyCode::F9, SimCommand::SaveConfig),
        (KeyCode::F10, SimCommand::RefreshVortexSettings),
    ];
    for (key, command) in bindings {
        if keys.just_pressed(key) {
            requests.write(CommandRequest(command));
        }
    }

    if keys.just_pressed(KeyCode::KeyR) {
        if weather.rain_level > 0.0 {
            weather.rain_level = 0.0;
            weather.previous = Weather::Clearing;
        } else {
            weather.rain_level = 1.0;
            weather.previous = Weather::Rain;
        }
        info!("[weather] rain level {}", weather.rain_level);
    }
}

// ── Presentation ──────────────────────────────────────────────────────────────

pub fn camera_follow_system(
    player: Query<&Transform, With<PlayerCharacter>>,
    mut camera: Query<&mut Transform, (With<FollowCamera>, Without<PlayerCharacter>)>,
) {
    let (Ok(player), Ok(mut camera)) = (player.single(), camera.single_mut()) else {
        return;
    };
    let back = -player.forward().as_vec3() * 28.0;
    let target = player.translation + Vec3::new(back.x, 14.0, back.z);
    *camera = Transform::from_translation(target).looking_at(player.translation, Vec3::Y);
}

/// Effects have no particle renderer; each draws as a translucent sphere.
pub fn fx_gizmo_system(
    mut gizmos: Gizmos,
    fx: Query<(&LoopedFx, &ChildOf)>,
    anchors: Query<&Transform, With<FxAnchor>>,
) {
    for (effect, child_of) in fx.iter() {
        let Ok(anchor) = anchors.get(child_of.parent()) else {
            continue;
        };
        let color = if effect.asset == DECORATION_FX_ASSET {
            Color::srgba(0.45, 0.35, 0.25, 0.6)
        } else {
            Color::srgba(0.6, 0.6, 0.65, 0.5)
        };
        gizmos.sphere(
            Isometry3d::from_translation(anchor.translation),
            effect.scale * 1.8,
            color,
        );
    }
}

pub fn marker_gizmo_system(mut gizmos: Gizmos, markers: Query<&Transform, With<MapMarker>>) {
    for transform in markers.iter() {
        let ground = Vec3::new(transform.translation.x, 0.2, transform.translation.z);
        gizmos.circle(
            Isometry3d::new(ground, Quat::from_rotation_x(std::f32::consts::FRAC_PI_2)),
            6.0,
            Color::srgb(1.0, 0.2, 0.2),
        );
        gizmos.line(ground, ground + Vec3::Y * 40.0, Color::srgb(1.0, 0.2, 0.2));
    }
}

pub fn hud_system(
    notifications: Res<Notifications>,
    weather: Res<SandboxWeather>,
    mut text: Query<&mut Text, With<NotificationText>>,
) {
    if !notifications.is_changed() && !weather.is_changed() {
        return;
    }
    let Ok(mut text) = text.single_mut() else {
        return;
    };
    let mut lines = vec![format!(
        "Rain {:.1} | Wind {:.0}",
        weather.rain_level, weather.wind_speed
    )];
    lines.extend(notifications.0.iter().map(|(message, _)| message.clone()));
    text.0 = lines.join("\n");
}
