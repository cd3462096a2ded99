//! The seam toward the rigid-body engine that owns the chassis.
//!
//! The controller never owns or frees the chassis: it names it by a
//! [`ChassisId`] and talks to the engine only through [`VehicleHost`].

use nalgebra::{Isometry3, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Stable, non-owning handle to the host's chassis body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChassisId(pub u64);

/// Chassis kinematics as seen by the host at the start of a tick.
#[derive(Debug, Clone, Copy)]
pub struct ChassisState {
    pub transform: Isometry3<f32>,
    pub linvel: Vector3<f32>,
    pub angvel: Vector3<f32>,
    /// World-space center of mass.
    pub center_of_mass: Point3<f32>,
    pub mass: f32,
}

impl ChassisState {
    /// Chassis at rest at `transform`.
    pub fn at_rest(transform: Isometry3<f32>, mass: f32) -> Self {
        Self {
            transform,
            linvel: Vector3::zeros(),
            angvel: Vector3::zeros(),
            center_of_mass: Point3::from(transform.translation.vector),
            mass,
        }
    }
}

/// Shape the host sweeps down the suspension.
///
/// - `Ray`: a ray from the attachment point, `max_length + radius` long.
/// - `Sphere`: a ball of `radius` (usually smaller than the wheel) whose
///   far side reaches the tire's bottom at full droop.
/// - `Cylinder`: the wheel itself (tire radius, tire width, axis along the
///   axle) centred on the attachment point, swept `max_length`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CastKind {
    #[default]
    Ray,
    Sphere { radius: f32 },
    Cylinder,
}

impl CastKind {
    /// Sweep distance along the suspension direction.
    pub fn sweep_length(self, max_length: f32, wheel_radius: f32) -> f32 {
        match self {
            CastKind::Ray => max_length + wheel_radius,
            CastKind::Sphere { radius } => max_length + wheel_radius - radius,
            CastKind::Cylinder => max_length,
        }
    }

    /// Hub travel for a hit at `distance` along the sweep.
    pub fn hub_travel(self, distance: f32, wheel_radius: f32) -> f32 {
        match self {
            CastKind::Ray => distance - wheel_radius,
            CastKind::Sphere { radius } => distance + radius - wheel_radius,
            CastKind::Cylinder => distance,
        }
    }
}

/// Suspension cast for one wheel, in world space.
#[derive(Debug, Clone, Copy)]
pub struct WheelRay {
    pub kind: CastKind,
    /// Attachment point; start of the ray, centre of the swept shape.
    pub origin: Point3<f32>,
    /// Unit suspension direction (points away from the chassis).
    pub direction: Vector3<f32>,
    /// Sweep distance, see [`CastKind::sweep_length`].
    pub length: f32,
    pub radius: f32,
    pub width: f32,
    /// Unit axle direction after steering, for cylinder casts.
    pub axle: Vector3<f32>,
}

/// Result of a ray / sphere / cylinder cast along a [`WheelRay`].
#[derive(Debug, Clone, Copy)]
pub struct CastHit {
    /// Contact point on the ground.
    pub point: Point3<f32>,
    pub normal: Vector3<f32>,
    /// Fraction of `WheelRay::length` the shape travelled before touching, in [0,1].
    pub fraction: f32,
}

/// What a physics engine must provide for a vehicle to run on it.
pub trait VehicleHost {
    fn chassis_state(&self, chassis: ChassisId) -> Option<ChassisState>;

    /// Synchronous collision cast; `None` means nothing within `ray.length`.
    fn cast_wheel(&self, chassis: ChassisId, wheel_index: usize, ray: &WheelRay) -> Option<CastHit>;

    fn apply_impulse_at_point(&mut self, chassis: ChassisId, impulse: Vector3<f32>, point: Point3<f32>);
}
