//! Wheeled vehicle simulation: suspension, steering, engine, transmission,
//! differentials and tire forces for a chassis owned by a rigid-body engine,
//! plus a rapier3d host for it.

pub mod config;
pub mod error;
pub mod physics;
pub mod telemetry;
pub mod vehicle;

pub use config::{TireClamp, VehicleSettings};
pub use error::ConfigError;
