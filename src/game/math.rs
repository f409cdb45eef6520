//! Vector and rotation helpers shared by the motion pipeline and the states.
//!
//! Axis convention: +Y is up, +Z is forward and +X is right in a character's local frame.

use nalgebra::{Unit, UnitQuaternion, Vector3};

use super::constants::physics as consts;

pub type Vec3 = Vector3<f32>;
pub type Quat = UnitQuaternion<f32>;

/// Removes the component of `v` along the plane normal `n` (assumed unit length).
pub fn project_on_plane(v: &Vec3, n: &Vec3) -> Vec3 {
    v - n * v.dot(n)
}

/// Returns `v` unchanged unless it is longer than `max`, in which case it is scaled down to `max`.
pub fn clamp_to_max_length(v: &Vec3, max: f32) -> Vec3 {
    let len_sq = v.norm_squared();
    if len_sq > max * max && len_sq > 0.0 {
        v * (max / len_sq.sqrt())
    } else {
        *v
    }
}

/// Normalizes `v`, or returns zero for degenerate vectors.
pub fn normalize_safe(v: &Vec3) -> Vec3 {
    let len = v.norm();
    if len > 1.0e-6 {
        v / len
    } else {
        Vec3::zeros()
    }
}

pub fn forward(rotation: &Quat) -> Vec3 {
    rotation * Vec3::z()
}

pub fn up(rotation: &Quat) -> Vec3 {
    rotation * Vec3::y()
}

pub fn right(rotation: &Quat) -> Vec3 {
    rotation * Vec3::x()
}

/// Quaternion slerp that never panics on ambiguous configurations.
pub fn slerp(from: &Quat, to: &Quat, t: f32) -> Quat {
    from.try_slerp(to, t, 1.0e-6).unwrap_or(*to)
}

/// Framerate-independent interpolation factor for an exponential approach.
pub fn sharpness_factor(sharpness: f32, dt: f32) -> f32 {
    1.0 - (-sharpness * dt).exp()
}

/// Rotation whose forward axis is `forward` and whose up axis is as close as possible to `up`.
pub fn look_rotation(forward: &Vec3, up: &Vec3) -> Quat {
    let fwd = normalize_safe(forward);
    if fwd == Vec3::zeros() {
        return Quat::identity();
    }
    let mut up = normalize_safe(up);
    if up.cross(&fwd).norm_squared() < 1.0e-8 {
        up = if fwd.x.abs() < 0.9 { Vec3::x() } else { Vec3::z() };
    }
    UnitQuaternion::face_towards(&fwd, &up)
}

/// Rotation whose up axis is exactly `up` and whose forward axis is as close as possible to `forward`.
pub fn rotation_with_up_priority(up: &Vec3, forward: &Vec3) -> Quat {
    let up = normalize_safe(up);
    if up == Vec3::zeros() {
        return Quat::identity();
    }
    let mut fwd = normalize_safe(&project_on_plane(forward, &up));
    if fwd == Vec3::zeros() {
        let fallback = if up.z.abs() < 0.9 { Vec3::z() } else { Vec3::x() };
        fwd = normalize_safe(&project_on_plane(&fallback, &up));
    }
    UnitQuaternion::face_towards(&fwd, &up)
}

/// Keeps the length of `v` but lays it on the plane of `plane_normal`, preserving its heading around `up`.
pub fn reorient_on_plane(v: &Vec3, plane_normal: &Vec3, up: &Vec3) -> Vec3 {
    let length = v.norm();
    if length <= 0.0 {
        return Vec3::zeros();
    }
    let side = normalize_safe(&v.cross(up));
    if side == Vec3::zeros() {
        return normalize_safe(&project_on_plane(v, plane_normal)) * length;
    }
    normalize_safe(&plane_normal.cross(&side)) * length
}

/// Slerps `rotation` so that its forward axis turns toward `direction` around `up`.
pub fn slerp_rotation_towards_direction_around_up(
    rotation: &mut Quat,
    dt: f32,
    direction: &Vec3,
    up: &Vec3,
    sharpness: f32,
) {
    let on_plane = normalize_safe(&project_on_plane(direction, up));
    if on_plane == Vec3::zeros() {
        return;
    }
    let target = look_rotation(&on_plane, up);
    *rotation = slerp(rotation, &target, sharpness_factor(sharpness, dt));
}

/// Slerps `rotation` so that its up axis turns toward `target_up`.
pub fn slerp_up_towards_direction(rotation: &mut Quat, dt: f32, target_up: &Vec3, sharpness: f32) {
    let target_up = normalize_safe(target_up);
    if target_up == Vec3::zeros() {
        return;
    }
    let current_up = up(rotation);
    let Some(delta) = UnitQuaternion::rotation_between(&current_up, &target_up) else {
        return;
    };
    let target = delta * *rotation;
    *rotation = slerp(rotation, &target, sharpness_factor(sharpness, dt));
}

/// Applies the share of a fixed-step rotation that corresponds to a variable-rate frame.
pub fn add_variable_rate_rotation(rotation: &mut Quat, fixed_rate_rotation: &Quat, variable_dt: f32, fixed_dt: f32) {
    if fixed_dt <= 0.0 {
        return;
    }
    let ratio = (variable_dt / fixed_dt).clamp(0.0, 1.0);
    let partial = slerp(&Quat::identity(), fixed_rate_rotation, ratio);
    *rotation = partial * *rotation;
}

/// True when a surface with this normal is shallow enough to stand on.
pub fn is_walkable(normal: &Vec3, up: &Vec3, max_slope_radians: f32) -> bool {
    normal.dot(up) > max_slope_radians.cos() - consts::DOT_SIMILARITY_EPSILON
}

pub fn unit_or(v: &Vec3, fallback: Vec3) -> Unit<Vec3> {
    let n = normalize_safe(v);
    if n == Vec3::zeros() {
        Unit::new_normalize(fallback)
    } else {
        Unit::new_unchecked(n)
    }
}
