//! Stateless vector and quaternion helpers used by the vortex core.
//!
//! Everything here works in the simulation's Z-up world space and operates on
//! [`Vec3`] / [`Quat`] by value.  The functions deliberately do not guard
//! against NaN: a NaN input produces a NaN output, and callers that accept
//! external positions (spawning) check finiteness themselves.
//!
//! [`euler_to_quat`] and [`rotate_vector`] reproduce a specific roll-pitch-yaw
//! convention rather than glam's own `Quat::from_euler`.  Particle ring
//! placement depends on this exact mapping, so do not "simplify" them into
//! the glam equivalents.

use bevy::math::{Quat, Vec3};

/// Euclidean length.
#[inline]
pub fn length(v: Vec3) -> f32 {
    (v.x * v.x + v.y * v.y + v.z * v.z).sqrt()
}

/// Unit vector in the direction of `v`; the zero vector when `length(v) == 0`.
#[inline]
pub fn normalize(v: Vec3) -> Vec3 {
    let len = length(v);
    if len == 0.0 {
        Vec3::ZERO
    } else {
        v / len
    }
}

/// 3D distance between two points.
#[inline]
pub fn distance(a: Vec3, b: Vec3) -> f32 {
    length(a - b)
}

/// Distance projected onto the XY (ground) plane.
#[inline]
pub fn distance_2d(a: Vec3, b: Vec3) -> f32 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    (dx * dx + dy * dy).sqrt()
}

#[inline]
pub fn cross(a: Vec3, b: Vec3) -> Vec3 {
    Vec3::new(
        a.y * b.z - a.z * b.y,
        a.z * b.x - a.x * b.z,
        a.x * b.y - a.y * b.x,
    )
}

/// Linear interpolation with `t` clamped to `[0, 1]`.
#[inline]
pub fn lerp(a: Vec3, b: Vec3, t: f32) -> Vec3 {
    let t = t.clamp(0.0, 1.0);
    a + (b - a) * t
}

/// Step from `current` toward `target` by at most `max_delta`.
///
/// Returns `target` exactly when the remaining distance is within `max_delta`
/// (or zero); otherwise the result lies on the segment at distance `max_delta`
/// from `current`.
pub fn move_towards(current: Vec3, target: Vec3, max_delta: f32) -> Vec3 {
    let delta = target - current;
    let magnitude = length(delta);
    if magnitude <= max_delta || magnitude == 0.0 {
        return target;
    }
    current + delta / magnitude * max_delta
}

/// Builds a quaternion from roll (`x`), pitch (`y`) and yaw (`z`) in radians.
///
/// Component order follows the host engine's `(x, y, z, w)` constructor, which
/// places the all-cosine product in `x`.  With all angles zero the result is
/// `(1, 0, 0, 0)`: a half-turn about X, not the identity.
pub fn euler_to_quat(x: f32, y: f32, z: f32) -> Quat {
    let (sin_phi, cos_phi) = (0.5 * x).sin_cos();
    let (sin_theta, cos_theta) = (0.5 * y).sin_cos();
    let (sin_psi, cos_psi) = (0.5 * z).sin_cos();

    Quat::from_xyzw(
        cos_phi * cos_theta * cos_psi - sin_phi * sin_theta * sin_psi,
        sin_phi * cos_theta * cos_psi + cos_phi * sin_theta * sin_psi,
        cos_phi * sin_theta * cos_psi - sin_phi * cos_theta * sin_psi,
        cos_phi * cos_theta * sin_psi + sin_phi * sin_theta * cos_psi,
    )
}

/// Rotates `v` by `q` using the expanded rotation-matrix form.
///
/// Unlike `q * v` this does not assume `q` is normalised, so it stays exact
/// for quaternions produced by [`euler_to_quat`].
pub fn rotate_vector(v: Vec3, q: Quat) -> Vec3 {
    let x2 = q.x * 2.0;
    let y2 = q.y * 2.0;
    let z2 = q.z * 2.0;
    let xx = q.x * x2;
    let yy = q.y * y2;
    let zz = q.z * z2;
    let xy = q.x * y2;
    let xz = q.x * z2;
    let yz = q.y * z2;
    let wx = q.w * x2;
    let wy = q.w * y2;
    let wz = q.w * z2;

    Vec3::new(
        (1.0 - (yy + zz)) * v.x + (xy - wz) * v.y + (xz + wy) * v.z,
        (xy + wz) * v.x + (1.0 - (xx + zz)) * v.y + (yz - wx) * v.z,
        (xz - wy) * v.x + (yz + wx) * v.y + (1.0 - (xx + yy)) * v.z,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, PI};

    const EPS: f32 = 1e-5;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).abs().max_element() < EPS
    }

    // ── normalize / length ────────────────────────────────────────────────────

    #[test]
    fn normalize_zero_vector_is_zero() {
        assert_eq!(normalize(Vec3::ZERO), Vec3::ZERO);
    }

    #[test]
    fn normalize_produces_unit_length() {
        let n = normalize(Vec3::new(3.0, 4.0, 12.0));
        assert!((length(n) - 1.0).abs() < EPS);
    }

    #[test]
    fn nan_propagates_through_normalize() {
        let n = normalize(Vec3::new(f32::NAN, 1.0, 0.0));
        assert!(n.x.is_nan());
    }

    #[test]
    fn distance_2d_ignores_height() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 4.0, 500.0);
        assert!((distance_2d(a, b) - 5.0).abs() < EPS);
        assert!(distance(a, b) > 500.0);
    }

    #[test]
    fn cross_of_x_and_z_points_negative_y() {
        assert!(approx(cross(Vec3::X, Vec3::Z), Vec3::new(0.0, -1.0, 0.0)));
    }

    // ── lerp / move_towards ───────────────────────────────────────────────────

    #[test]
    fn lerp_clamps_t() {
        let a = Vec3::ZERO;
        let b = Vec3::new(10.0, 0.0, 0.0);
        assert_eq!(lerp(a, b, 2.0), b);
        assert_eq!(lerp(a, b, -1.0), a);
        assert!(approx(lerp(a, b, 0.25), Vec3::new(2.5, 0.0, 0.0)));
    }

    #[test]
    fn move_towards_returns_target_when_within_reach() {
        let target = Vec3::new(1.0, 1.0, 0.0);
        assert_eq!(move_towards(Vec3::ZERO, target, 5.0), target);
        // Exactly at the boundary also snaps.
        let target = Vec3::new(3.0, 4.0, 0.0);
        assert_eq!(move_towards(Vec3::ZERO, target, 5.0), target);
    }

    #[test]
    fn move_towards_steps_exactly_max_delta_along_segment() {
        let current = Vec3::new(1.0, 2.0, 3.0);
        let target = Vec3::new(101.0, 2.0, 3.0);
        let stepped = move_towards(current, target, 0.287);
        assert!((distance(current, stepped) - 0.287).abs() < EPS);
        assert!(approx(stepped, Vec3::new(1.287, 2.0, 3.0)));
    }

    #[test]
    fn move_towards_same_point_returns_target() {
        let p = Vec3::new(4.0, 4.0, 4.0);
        assert_eq!(move_towards(p, p, 0.0), p);
    }

    // ── euler_to_quat / rotate_vector ─────────────────────────────────────────

    #[test]
    fn euler_zero_is_half_turn_about_x() {
        let q = euler_to_quat(0.0, 0.0, 0.0);
        assert_eq!((q.x, q.y, q.z, q.w), (1.0, 0.0, 0.0, 0.0));
        let rotated = rotate_vector(Vec3::new(0.0, 1.0, 0.0), q);
        assert!(approx(rotated, Vec3::new(0.0, -1.0, 0.0)));
    }

    #[test]
    fn euler_roll_only_keeps_ring_in_ground_plane() {
        let q = euler_to_quat(FRAC_PI_2, 0.0, 0.0);
        let v = rotate_vector(Vec3::new(9.4, 0.0, 0.0), q);
        assert!(v.z.abs() < EPS, "roll-only rotation must not lift the ring");
        assert!((length(v) - 9.4).abs() < 1e-4);
    }

    #[test]
    fn evenly_spaced_roll_angles_spread_points_apart() {
        let a = rotate_vector(Vec3::X, euler_to_quat(0.0, 0.0, 0.0));
        let b = rotate_vector(Vec3::X, euler_to_quat(PI, 0.0, 0.0));
        assert!(distance(a, b) > 1.9);
    }

    #[test]
    fn rotating_zero_vector_yields_zero() {
        for &(x, y, z) in &[(0.0, 0.0, 0.0), (1.0, 2.0, 3.0), (-4.0, 0.5, 7.0)] {
            let q = euler_to_quat(x, y, z);
            assert_eq!(rotate_vector(Vec3::ZERO, q), Vec3::ZERO);
        }
    }

    #[test]
    fn rotation_preserves_length() {
        let q = euler_to_quat(0.3, 1.1, -2.0);
        let v = Vec3::new(2.0, -3.0, 6.0);
        assert!((length(rotate_vector(v, q)) - length(v)).abs() < 1e-4);
    }
}
