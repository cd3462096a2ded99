// ==============================================================================
// wheel.rs — WHEEL GEOMETRY, CAST SUSPENSION, STEERING, WHEEL SPIN
// ------------------------------------------------------------------------------
// Each tick the host casts a ray, sphere or cylinder (CastKind) along the
// suspension direction from the wheel's attachment point. From the reported
// fraction this module derives:
// - suspension length, clamped to [min, max]
// - spring + damper force   F = k·(rest - L) - c·dL/dt   (floored at 0)
// - suspension impulse      J = F·dt (+ bump stop when bottomed out)
//
// No hit / hit beyond max / NaN fraction => fully extended, zero force.
//
// Spin (angular velocity) is integrated here from drive, brake and damping
// torques; the tire reaction is applied by the controller after the tire solve.
// ==============================================================================

use std::f32::consts::{PI, TAU};

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::vehicle::curve::LinearCurve;
use crate::vehicle::host::{CastHit, CastKind, ChassisState, WheelRay};
use crate::vehicle::kinematics::{point_velocity, safe_normalize, wheel_basis_world, WheelBasis};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpringMode {
    FrequencyAndDamping,
    StiffnessAndDamping,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpringSettings {
    pub mode: SpringMode,
    /// Hz in frequency mode, N/m in stiffness mode.
    pub frequency_or_stiffness: f32,
    /// Damping ratio in frequency mode, N·s/m in stiffness mode.
    pub damping: f32,
}

impl Default for SpringSettings {
    fn default() -> Self {
        Self {
            mode: SpringMode::FrequencyAndDamping,
            frequency_or_stiffness: 1.5,
            damping: 0.5,
        }
    }
}

impl SpringSettings {
    /// Spring constant and damper constant `(k, c)` for the given sprung mass.
    pub fn coefficients(&self, sprung_mass: f32) -> (f32, f32) {
        match self.mode {
            SpringMode::FrequencyAndDamping => {
                let omega = 2.0 * PI * self.frequency_or_stiffness;
                let k = sprung_mass * omega * omega;
                let c = 2.0 * sprung_mass * self.damping * omega;
                (k, c)
            }
            SpringMode::StiffnessAndDamping => (self.frequency_or_stiffness, self.damping),
        }
    }
}

/// Suspension force along the wheel-up direction. `length_rate` is dL/dt,
/// positive while extending.
#[inline]
pub fn spring_force(k: f32, c: f32, rest_length: f32, length: f32, length_rate: f32) -> f32 {
    (k * (rest_length - length) - c * length_rate).max(0.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelSettings {
    /// Attachment point, chassis-local.
    pub position: Vector3<f32>,
    pub suspension_direction: Vector3<f32>,
    pub steering_axis: Vector3<f32>,
    pub wheel_up: Vector3<f32>,
    pub wheel_forward: Vector3<f32>,
    pub suspension_min_length: f32,
    pub suspension_max_length: f32,
    /// Extra spring length beyond max; non-zero means the spring still pushes at full droop.
    pub suspension_preload_length: f32,
    pub suspension_spring: SpringSettings,
    /// What the host sweeps to find the ground.
    pub cast: CastKind,
    pub radius: f32,
    pub width: f32,
    pub inertia: f32,          // kg·m²
    pub angular_damping: f32,  // 1/s
    pub max_steer_angle: f32,  // radians
    pub max_brake_torque: f32, // N·m
    pub max_hand_brake_torque: f32,
    /// Longitudinal slip ratio -> friction coefficient.
    pub longitudinal_friction: LinearCurve,
    /// Slip angle (degrees) -> friction coefficient.
    pub lateral_friction: LinearCurve,
}

impl Default for WheelSettings {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            suspension_direction: Vector3::new(0.0, -1.0, 0.0),
            steering_axis: Vector3::y(),
            wheel_up: Vector3::y(),
            wheel_forward: Vector3::z(),
            suspension_min_length: 0.3,
            suspension_max_length: 0.5,
            suspension_preload_length: 0.0,
            suspension_spring: SpringSettings::default(),
            cast: CastKind::Ray,
            radius: 0.3,
            width: 0.1,
            inertia: 0.9,
            angular_damping: 0.2,
            max_steer_angle: 70f32.to_radians(),
            max_brake_torque: 1500.0,
            max_hand_brake_torque: 4000.0,
            longitudinal_friction: LinearCurve::new(vec![(0.0, 0.0), (0.06, 1.2), (0.2, 1.0)]),
            lateral_friction: LinearCurve::new(vec![(0.0, 0.0), (3.0, 1.2), (20.0, 1.0)]),
        }
    }
}

impl WheelSettings {
    pub fn validate(&self, wheel: usize) -> Result<(), ConfigError> {
        let (min, max) = (self.suspension_min_length, self.suspension_max_length);
        if !(min.is_finite() && max.is_finite()) || min < 0.0 || min > max {
            return Err(ConfigError::SuspensionRange { wheel, min, max });
        }
        if !(self.max_steer_angle >= 0.0) {
            return Err(ConfigError::SteerBounds { wheel, angle: self.max_steer_angle });
        }
        for (field, value) in [
            ("radius", self.radius),
            ("width", self.width),
            ("inertia", self.inertia),
        ] {
            if !(value > 0.0) {
                return Err(ConfigError::NonPositive { wheel, field, value });
            }
        }
        for (field, value) in [
            ("angular damping", self.angular_damping),
            ("max brake torque", self.max_brake_torque),
            ("max hand brake torque", self.max_hand_brake_torque),
            ("preload length", self.suspension_preload_length),
        ] {
            if !(value >= 0.0) {
                return Err(ConfigError::NonPositive { wheel, field, value });
            }
        }
        if let CastKind::Sphere { radius } = self.cast {
            if !(radius > 0.0 && radius <= self.radius) {
                return Err(ConfigError::NonPositive { wheel, field: "cast sphere radius (up to the wheel radius)", value: radius });
            }
        }
        let spring = &self.suspension_spring;
        if !(spring.frequency_or_stiffness > 0.0) {
            return Err(ConfigError::Spring { wheel, reason: "frequency/stiffness must be positive" });
        }
        if !(spring.damping >= 0.0) {
            return Err(ConfigError::Spring { wheel, reason: "damping must not be negative" });
        }
        if self.suspension_direction.norm() < 1e-6 || self.wheel_forward.norm() < 1e-6 {
            return Err(ConfigError::NonPositive {
                wheel,
                field: "axis length",
                value: 0.0,
            });
        }
        self.longitudinal_friction.validate()?;
        self.lateral_friction.validate()?;
        Ok(())
    }
}

/// Per-tick suspension outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactState {
    pub in_contact: bool,
    pub suspension_length: f32,
    /// Spring + damper force (N).
    pub normal_force: f32,
    /// Impulse pushed onto the chassis along the wheel-up direction (N·s).
    pub suspension_impulse: f32,
    pub contact_point: Point3<f32>,
    pub contact_normal: Vector3<f32>,
}

/// Everything a tick changes on a wheel; settings excluded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct WheelState {
    suspension_length: f32,
    in_contact: bool,
    contact_point: Point3<f32>,
    contact_normal: Vector3<f32>,
    suspension_impulse: f32,
    steer_angle: f32,
    angular_velocity: f32,
    rotation_angle: f32,
    longitudinal_slip: f32,
    lateral_slip: f32,
    longitudinal_impulse: f32,
    lateral_impulse: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Wheel {
    pub settings: WheelSettings,
    suspension_length: f32,
    in_contact: bool,
    contact_point: Point3<f32>,
    contact_normal: Vector3<f32>,
    suspension_impulse: f32,
    steer_angle: f32,
    angular_velocity: f32,
    rotation_angle: f32,
    pub(crate) longitudinal_slip: f32,
    pub(crate) lateral_slip: f32,
    pub(crate) longitudinal_impulse: f32,
    pub(crate) lateral_impulse: f32,
}

impl Wheel {
    pub fn new(settings: WheelSettings) -> Self {
        let suspension_length = settings.suspension_max_length;
        Self {
            settings,
            suspension_length,
            in_contact: false,
            contact_point: Point3::origin(),
            contact_normal: Vector3::y(),
            suspension_impulse: 0.0,
            steer_angle: 0.0,
            angular_velocity: 0.0,
            rotation_angle: 0.0,
            longitudinal_slip: 0.0,
            lateral_slip: 0.0,
            longitudinal_impulse: 0.0,
            lateral_impulse: 0.0,
        }
    }

    pub fn suspension_length(&self) -> f32 {
        self.suspension_length
    }

    pub fn in_contact(&self) -> bool {
        self.in_contact
    }

    pub fn contact_point(&self) -> Point3<f32> {
        self.contact_point
    }

    pub fn contact_normal(&self) -> Vector3<f32> {
        self.contact_normal
    }

    pub fn suspension_impulse(&self) -> f32 {
        self.suspension_impulse
    }

    pub fn steer_angle(&self) -> f32 {
        self.steer_angle
    }

    pub fn angular_velocity(&self) -> f32 {
        self.angular_velocity
    }

    pub fn rotation_angle(&self) -> f32 {
        self.rotation_angle
    }

    pub fn longitudinal_slip(&self) -> f32 {
        self.longitudinal_slip
    }

    pub fn lateral_slip(&self) -> f32 {
        self.lateral_slip
    }

    pub fn longitudinal_impulse(&self) -> f32 {
        self.longitudinal_impulse
    }

    pub fn lateral_impulse(&self) -> f32 {
        self.lateral_impulse
    }

    pub(crate) fn state(&self) -> WheelState {
        WheelState {
            suspension_length: self.suspension_length,
            in_contact: self.in_contact,
            contact_point: self.contact_point,
            contact_normal: self.contact_normal,
            suspension_impulse: self.suspension_impulse,
            steer_angle: self.steer_angle,
            angular_velocity: self.angular_velocity,
            rotation_angle: self.rotation_angle,
            longitudinal_slip: self.longitudinal_slip,
            lateral_slip: self.lateral_slip,
            longitudinal_impulse: self.longitudinal_impulse,
            lateral_impulse: self.lateral_impulse,
        }
    }

    pub(crate) fn restore_state(&mut self, state: WheelState) {
        self.suspension_length = state.suspension_length;
        self.in_contact = state.in_contact;
        self.contact_point = state.contact_point;
        self.contact_normal = state.contact_normal;
        self.suspension_impulse = state.suspension_impulse;
        self.steer_angle = state.steer_angle;
        self.angular_velocity = state.angular_velocity;
        self.rotation_angle = state.rotation_angle;
        self.longitudinal_slip = state.longitudinal_slip;
        self.lateral_slip = state.lateral_slip;
        self.longitudinal_impulse = state.longitudinal_impulse;
        self.lateral_impulse = state.lateral_impulse;
    }

    /// Clamp to [-max_steer_angle, +max_steer_angle]; NaN/inf keeps the previous angle.
    pub fn set_steer_angle(&mut self, angle: f32) {
        if !angle.is_finite() {
            return;
        }
        let max = self.settings.max_steer_angle;
        self.steer_angle = angle.clamp(-max, max);
    }

    pub fn set_angular_velocity(&mut self, omega: f32) {
        if omega.is_finite() {
            self.angular_velocity = omega;
        }
    }

    fn suspension_dir_world(&self, chassis: &ChassisState) -> Vector3<f32> {
        safe_normalize(
            chassis.transform.rotation * self.settings.suspension_direction,
            Vector3::new(0.0, -1.0, 0.0),
        )
    }

    /// World-space cast the host should sweep for this wheel.
    pub fn ray(&self, chassis: &ChassisState) -> WheelRay {
        let s = &self.settings;
        let up = chassis.transform.rotation * s.wheel_up;
        let axle = wheel_basis_world(&chassis.transform.rotation, s.wheel_forward, s.steering_axis, self.steer_angle, up).right;
        WheelRay {
            kind: s.cast,
            origin: chassis.transform * Point3::from(s.position),
            direction: self.suspension_dir_world(chassis),
            length: s.cast.sweep_length(s.suspension_max_length, s.radius),
            radius: s.radius,
            width: s.width,
            axle,
        }
    }

    /// Wheel hub position in world space for the current suspension length.
    pub fn center_world(&self, chassis: &ChassisState) -> Point3<f32> {
        let ray = self.ray(chassis);
        ray.origin + ray.direction * self.suspension_length
    }

    /// Rolling/lateral directions on the current contact plane.
    pub fn basis(&self, chassis: &ChassisState) -> WheelBasis {
        let up = chassis.transform.rotation * self.settings.wheel_up;
        let normal = if self.in_contact { self.contact_normal } else { up };
        wheel_basis_world(
            &chassis.transform.rotation,
            self.settings.wheel_forward,
            self.settings.steering_axis,
            self.steer_angle,
            normal,
        )
    }

    fn release_contact(&mut self) -> ContactState {
        self.suspension_length = self.settings.suspension_max_length;
        self.in_contact = false;
        self.suspension_impulse = 0.0;
        ContactState {
            in_contact: false,
            suspension_length: self.suspension_length,
            normal_force: 0.0,
            suspension_impulse: 0.0,
            contact_point: self.contact_point,
            contact_normal: self.contact_normal,
        }
    }

    /// Digest a cast result into suspension length and suspension impulse.
    pub fn update_suspension(
        &mut self,
        chassis: &ChassisState,
        hit: Option<CastHit>,
        sprung_mass: f32,
        dt: f32,
    ) -> ContactState {
        let Some(hit) = hit else {
            return self.release_contact();
        };
        let s = &self.settings;
        let ray = self.ray(chassis);

        if !hit.fraction.is_finite() || !hit.point.coords.iter().all(|c| c.is_finite()) {
            return self.release_contact();
        }

        let raw_length = s.cast.hub_travel(hit.fraction * ray.length, s.radius);
        if raw_length > s.suspension_max_length {
            return self.release_contact();
        }
        let length = raw_length.clamp(s.suspension_min_length, s.suspension_max_length);

        // Ground is treated as static: the length changes as fast as the
        // attachment point moves along the suspension direction.
        let v = point_velocity(chassis.linvel, chassis.angvel, chassis.center_of_mass, ray.origin);
        let closing_speed = v.dot(&ray.direction);
        let length_rate = -closing_speed;

        let (k, c) = s.suspension_spring.coefficients(sprung_mass);
        let rest = s.suspension_max_length + s.suspension_preload_length;
        let normal_force = spring_force(k, c, rest, length, length_rate);
        let mut impulse = normal_force * dt;

        // Bottomed out: stop the chassis from travelling further toward the ground.
        if raw_length < s.suspension_min_length && closing_speed > 0.0 {
            impulse += sprung_mass * closing_speed;
        }

        let normal = safe_normalize(hit.normal, -ray.direction);

        self.suspension_length = length;
        self.in_contact = true;
        self.contact_point = hit.point;
        self.contact_normal = normal;
        self.suspension_impulse = impulse;

        ContactState {
            in_contact: true,
            suspension_length: length,
            normal_force,
            suspension_impulse: impulse,
            contact_point: hit.point,
            contact_normal: normal,
        }
    }

    /// Anti-roll contribution; the suspension can only push.
    pub(crate) fn add_suspension_impulse(&mut self, delta: f32) {
        if self.in_contact {
            self.suspension_impulse = (self.suspension_impulse + delta).max(0.0);
        }
    }

    pub fn apply_drive_torque(&mut self, torque: f32, dt: f32) {
        self.angular_velocity += torque / self.settings.inertia * dt;
    }

    /// Brake torque slows the wheel toward zero but never reverses it.
    /// Returns true when the wheel ends up locked.
    pub fn apply_brake_torque(&mut self, torque: f32, dt: f32) -> bool {
        if torque <= 0.0 {
            return false;
        }
        let available = torque * dt;
        let momentum = self.angular_velocity * self.settings.inertia;
        if momentum.abs() <= available {
            self.angular_velocity = 0.0;
            true
        } else {
            self.angular_velocity -= momentum.signum() * available / self.settings.inertia;
            false
        }
    }

    pub fn apply_angular_damping(&mut self, dt: f32) {
        self.angular_velocity *= (1.0 - self.settings.angular_damping * dt).max(0.0);
    }

    /// Tire reaction: pushing the ground with J costs J·r of angular momentum.
    pub(crate) fn apply_longitudinal_reaction(&mut self, impulse: f32) {
        self.angular_velocity -= impulse * self.settings.radius / self.settings.inertia;
    }

    pub(crate) fn integrate_rotation(&mut self, dt: f32) {
        self.rotation_angle = (self.rotation_angle + self.angular_velocity * dt).rem_euclid(TAU);
    }
}
