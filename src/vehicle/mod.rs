//! Engine-agnostic wheeled vehicle model.
//!
//! A [`VehicleController`] owns the wheels and drivetrain of one vehicle and
//! talks to the rigid-body engine that owns the chassis only through
//! [`VehicleHost`].

pub mod anti_roll;
pub mod controller;
pub mod curve;
pub mod differential;
pub mod engine;
pub mod host;
pub mod kinematics;
pub mod tire;
pub mod transmission;
pub mod wheel;

pub use anti_roll::AntiRollBarSettings;
pub use controller::{DriverInput, ImpulseAtPoint, VehicleController, VehicleImpulses};
pub use curve::LinearCurve;
pub use differential::DifferentialSettings;
pub use engine::{Engine, EngineSettings};
pub use host::{CastHit, CastKind, ChassisId, ChassisState, VehicleHost, WheelRay};
pub use tire::{
    friction_limit, scaled_longitudinal, TireFrictionQuery, TireImpulse, TireImpulseLimit, TireMaxImpulseFn,
    TireModel,
};
pub use transmission::{ShiftInput, ShiftState, Transmission, TransmissionMode, TransmissionSettings};
pub use wheel::{SpringMode, SpringSettings, Wheel, WheelSettings};
