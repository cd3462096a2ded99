//! Serializable vehicle configuration.
//!
//! `VehicleSettings::default()` is the sample four-wheel, rear-wheel-drive car.
//! Everything is validated before a controller is built.

use std::path::Path;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;
use crate::vehicle::anti_roll::AntiRollBarSettings;
use crate::vehicle::differential::{validate_engine_torque_ratios, DifferentialSettings};
use crate::vehicle::engine::EngineSettings;
use crate::vehicle::tire::{scaled_longitudinal, TireMaxImpulseFn};
use crate::vehicle::transmission::TransmissionSettings;
use crate::vehicle::wheel::WheelSettings;

/// Tire clamp in use. The first two can be named in a config file.
///
/// `Custom` marks a closure installed with
/// `VehicleController::set_tire_max_impulse_callback`. It is written out so a
/// saved config says so, but a closure cannot be stored: loading or building
/// a vehicle from a `custom` clamp is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TireClamp {
    #[default]
    Friction,
    ScaledLongitudinal { multiplier: f32 },
    Custom,
}

impl TireClamp {
    /// Closure for the built-in presets; `None` for `Friction` and `Custom`.
    pub fn max_impulse_fn(self) -> Option<TireMaxImpulseFn> {
        match self {
            TireClamp::Friction | TireClamp::Custom => None,
            TireClamp::ScaledLongitudinal { multiplier } => Some(scaled_longitudinal(multiplier)),
        }
    }

    pub fn validate(self) -> Result<(), ConfigError> {
        match self {
            TireClamp::Friction => Ok(()),
            TireClamp::ScaledLongitudinal { multiplier } if multiplier > 0.0 && multiplier.is_finite() => Ok(()),
            TireClamp::ScaledLongitudinal { multiplier } => Err(ConfigError::NonPositive {
                wheel: 0,
                field: "tire longitudinal multiplier",
                value: multiplier,
            }),
            TireClamp::Custom => Err(ConfigError::CustomTireClamp),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleSettings {
    /// Chassis-local up and forward.
    pub up: Vector3<f32>,
    pub forward: Vector3<f32>,
    pub wheels: Vec<WheelSettings>,
    pub engine: EngineSettings,
    pub transmission: TransmissionSettings,
    pub differentials: Vec<DifferentialSettings>,
    pub anti_roll_bars: Vec<AntiRollBarSettings>,
    pub tire_clamp: TireClamp,
}

// Sample car body: 0.9 x 0.2 x 2.0 half extents.
const HALF_WIDTH: f32 = 0.9;
const HALF_HEIGHT: f32 = 0.2;
const HALF_LENGTH: f32 = 2.0;
const WHEEL_RADIUS: f32 = 0.3;

impl Default for VehicleSettings {
    fn default() -> Self {
        let y = -0.9 * HALF_HEIGHT;
        let z = HALF_LENGTH - 2.0 * WHEEL_RADIUS;
        let front = |x: f32| WheelSettings {
            position: Vector3::new(x, y, z),
            radius: WHEEL_RADIUS,
            max_steer_angle: 1.0,
            max_hand_brake_torque: 0.0,
            ..WheelSettings::default()
        };
        let rear = |x: f32| WheelSettings {
            position: Vector3::new(x, y, -z),
            radius: WHEEL_RADIUS,
            max_steer_angle: 0.0,
            max_hand_brake_torque: 5000.0,
            ..WheelSettings::default()
        };

        Self {
            up: Vector3::y(),
            forward: Vector3::z(),
            // left front, right front, left rear, right rear
            wheels: vec![front(HALF_WIDTH), front(-HALF_WIDTH), rear(HALF_WIDTH), rear(-HALF_WIDTH)],
            engine: EngineSettings::default(),
            transmission: TransmissionSettings::default(),
            differentials: vec![DifferentialSettings {
                left_wheel: 2,
                right_wheel: 3,
                ..DifferentialSettings::default()
            }],
            anti_roll_bars: Vec::new(),
            tire_clamp: TireClamp::Friction,
        }
    }
}

impl VehicleSettings {
    /// Sample car with anti-roll bars on both axles.
    pub fn with_anti_roll_bars(mut self, stiffness: f32) -> Self {
        self.anti_roll_bars = vec![
            AntiRollBarSettings { left_wheel: 0, right_wheel: 1, stiffness },
            AntiRollBarSettings { left_wheel: 2, right_wheel: 3, stiffness },
        ];
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wheels.is_empty() {
            return Err(ConfigError::NoWheels);
        }
        for (i, wheel) in self.wheels.iter().enumerate() {
            wheel.validate(i)?;
        }
        self.engine.validate()?;
        self.transmission.validate()?;
        validate_differentials(&self.differentials, self.wheels.len())?;
        validate_anti_roll_bars(&self.anti_roll_bars, self.wheels.len())?;
        self.tire_clamp.validate()
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate().inspect_err(|err| warn!(%err, "vehicle settings rejected"))?;
        Ok(settings)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

pub(crate) fn validate_differentials(diffs: &[DifferentialSettings], wheel_count: usize) -> Result<(), ConfigError> {
    for (i, d) in diffs.iter().enumerate() {
        d.validate(i, wheel_count)?;
    }
    validate_engine_torque_ratios(diffs)
}

pub(crate) fn validate_anti_roll_bars(bars: &[AntiRollBarSettings], wheel_count: usize) -> Result<(), ConfigError> {
    for (i, bar) in bars.iter().enumerate() {
        bar.validate(i, wheel_count)?;
    }
    Ok(())
}
