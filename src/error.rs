//! Construction-time configuration errors.
//!
//! A vehicle whose settings fail validation is never built; runtime numeric
//! trouble is handled inside the tick instead (see `vehicle::controller`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("vehicle has no wheels")]
    NoWheels,

    #[error("wheel {wheel}: suspension min length {min} exceeds max length {max}")]
    SuspensionRange { wheel: usize, min: f32, max: f32 },

    #[error("wheel {wheel}: max steer angle {angle} is negative (steer bounds inverted)")]
    SteerBounds { wheel: usize, angle: f32 },

    #[error("wheel {wheel}: {field} must be positive, got {value}")]
    NonPositive {
        wheel: usize,
        field: &'static str,
        value: f32,
    },

    #[error("wheel {wheel}: invalid spring tuning ({reason})")]
    Spring { wheel: usize, reason: &'static str },

    #[error("engine: {reason}")]
    Engine { reason: &'static str },

    #[error("curve: {reason}")]
    Curve { reason: &'static str },

    #[error("transmission: {reason}")]
    Transmission { reason: &'static str },

    #[error("transmission: shift-down rpm {down} must be below shift-up rpm {up}")]
    ShiftThresholds { up: f32, down: f32 },

    #[error("{kind} {index} references wheel {wheel}, but the vehicle has {count} wheels")]
    WheelIndex {
        kind: &'static str,
        index: usize,
        wheel: usize,
        count: usize,
    },

    #[error("{kind} {index} uses wheel {wheel} on both sides")]
    SameWheel {
        kind: &'static str,
        index: usize,
        wheel: usize,
    },

    #[error("differential engine torque ratios sum to {sum}, more than 1")]
    EngineTorqueRatioSum { sum: f32 },

    #[error("differential {index}: {reason}")]
    Differential { index: usize, reason: &'static str },

    #[error("tire clamp is a custom closure; install it with set_tire_max_impulse_callback")]
    CustomTireClamp,

    #[error("failed to parse vehicle settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to read vehicle settings: {0}")]
    Io(#[from] std::io::Error),
}
