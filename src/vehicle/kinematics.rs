// ==============================================================================
// kinematics.rs — WHEEL BASIS + SLIP DECOMPOSITION (WORLD SPACE)
// ------------------------------------------------------------------------------
// wheel_basis_world(...):
// - Rotates the wheel's local forward around its steering axis by the steer
//   angle, then into world space with the chassis rotation
// - Projects forward onto the contact plane and builds right = forward × normal
//
// slip_components(point_vel, forward, right):
//     v_long = dot(v, forward)
//     v_lat  = dot(v, right)
// ==============================================================================

use nalgebra::{Point3, Unit, UnitQuaternion, Vector3};

/// World-space velocity of a point rigidly attached to the body:
/// v(p) = v_com + ω × (p - com)
#[inline]
pub fn point_velocity(
    linvel: Vector3<f32>,
    angvel: Vector3<f32>,
    com: Point3<f32>,
    p: Point3<f32>,
) -> Vector3<f32> {
    let r = p - com;
    linvel + angvel.cross(&r)
}

#[inline]
pub fn safe_normalize(v: Vector3<f32>, fallback: Vector3<f32>) -> Vector3<f32> {
    let n = v.norm();
    if n > 1e-6 && n.is_finite() { v / n } else { fallback }
}

/// Rolling direction and lateral (right-hand) direction of a wheel on its
/// contact plane, both unit length.
#[derive(Debug, Clone, Copy)]
pub struct WheelBasis {
    pub forward: Vector3<f32>,
    pub right: Vector3<f32>,
}

/// Returns the wheel basis in world space.
/// Positive steer angles turn the wheel counter-clockwise around `steering_axis`.
pub fn wheel_basis_world(
    chassis_rot: &UnitQuaternion<f32>,
    local_forward: Vector3<f32>,
    steering_axis: Vector3<f32>,
    steer_angle: f32,
    contact_normal: Vector3<f32>,
) -> WheelBasis {
    let axis = Unit::new_normalize(safe_normalize(steering_axis, Vector3::y()));
    let steer_rot = UnitQuaternion::from_axis_angle(&axis, steer_angle);
    let forward_world = chassis_rot * (steer_rot * local_forward);

    let n = safe_normalize(contact_normal, chassis_rot * axis.into_inner());
    let planar = forward_world - n * forward_world.dot(&n);
    let forward = safe_normalize(planar, safe_normalize(forward_world, Vector3::z()));
    let right = safe_normalize(forward.cross(&n), chassis_rot * Vector3::x());

    WheelBasis { forward, right }
}

/// Compute (v_long, v_lat) given point velocity and wheel basis.
#[inline]
pub fn slip_components(point_vel: Vector3<f32>, basis: &WheelBasis) -> (f32, f32) {
    (point_vel.dot(&basis.forward), point_vel.dot(&basis.right))
}
