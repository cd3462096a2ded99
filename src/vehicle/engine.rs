// ==============================================================================
// engine.rs — TORQUE CURVE + RPM INTEGRATION
// ------------------------------------------------------------------------------
// torque(rpm, throttle) = throttle · max_torque · curve(rpm / max_rpm)
//   - zero outside [min_rpm, max_rpm]
//   - linear governor fall-off to zero across the top `governor_band` of max_rpm
//
// integrate_rpm():
//   free-running   ω += torque / inertia · dt, then angular damping
//   clutch coupled rpm pulled toward |ω_wheel · ratio| by the engagement factor
//   result clamped to [min_rpm, max_rpm]; a non-finite result keeps the old rpm
// ==============================================================================

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::vehicle::curve::LinearCurve;

/// rad/s -> revolutions per minute.
pub const RAD_PER_SEC_TO_RPM: f32 = 60.0 / (2.0 * PI);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub max_torque: f32, // N·m
    pub min_rpm: f32,
    pub max_rpm: f32,
    /// Normalized rpm (rpm / max_rpm) -> fraction of max torque.
    pub normalized_torque: LinearCurve,
    pub inertia: f32,         // kg·m²
    pub angular_damping: f32, // 1/s
    /// Fraction of max_rpm over which torque is governed down to zero.
    pub governor_band: f32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_torque: 500.0,
            min_rpm: 1000.0,
            max_rpm: 6000.0,
            normalized_torque: LinearCurve::new(vec![(0.0, 0.8), (0.66, 1.0), (1.0, 0.8)]),
            inertia: 0.5,
            angular_damping: 0.2,
            governor_band: 0.05,
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_rpm >= 0.0 && self.max_rpm > self.min_rpm) {
            return Err(ConfigError::Engine { reason: "rpm range must satisfy 0 <= min < max" });
        }
        if !(self.max_torque >= 0.0) {
            return Err(ConfigError::Engine { reason: "max torque must not be negative" });
        }
        if !(self.inertia > 0.0) {
            return Err(ConfigError::Engine { reason: "inertia must be positive" });
        }
        if !(self.angular_damping >= 0.0) {
            return Err(ConfigError::Engine { reason: "angular damping must not be negative" });
        }
        if !(0.0..1.0).contains(&self.governor_band) {
            return Err(ConfigError::Engine { reason: "governor band must be in [0, 1)" });
        }
        self.normalized_torque.validate()
    }
}

/// How firmly the engine is tied to the driven wheels this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coupling {
    /// Engine revolutions per wheel revolution (gear · differential); 0 in neutral.
    pub ratio: f32,
    /// 0 = free-running, 1 = rigidly locked to the wheels.
    pub engagement: f32,
}

impl Coupling {
    pub const DISENGAGED: Coupling = Coupling { ratio: 0.0, engagement: 0.0 };
}

#[derive(Debug, Clone, PartialEq)]
pub struct Engine {
    pub settings: EngineSettings,
    rpm: f32,
}

impl Engine {
    pub fn new(settings: EngineSettings) -> Self {
        let rpm = settings.min_rpm;
        Self { settings, rpm }
    }

    pub fn rpm(&self) -> f32 {
        self.rpm
    }

    pub fn set_rpm(&mut self, rpm: f32) {
        if rpm.is_finite() {
            self.rpm = rpm.clamp(self.settings.min_rpm, self.settings.max_rpm);
        }
    }

    /// Engine torque at `rpm` for throttle in [0, 1].
    pub fn torque(&self, rpm: f32, throttle: f32) -> f32 {
        let s = &self.settings;
        if !(rpm >= s.min_rpm && rpm <= s.max_rpm) {
            return 0.0;
        }
        let throttle = if throttle.is_finite() { throttle.clamp(0.0, 1.0) } else { 0.0 };
        let mut torque = throttle * s.max_torque * s.normalized_torque.sample(rpm / s.max_rpm);

        let governor_start = s.max_rpm * (1.0 - s.governor_band);
        if rpm > governor_start && s.max_rpm > governor_start {
            torque *= (s.max_rpm - rpm) / (s.max_rpm - governor_start);
        }
        torque.max(0.0)
    }

    pub fn current_torque(&self, throttle: f32) -> f32 {
        self.torque(self.rpm, throttle)
    }

    pub fn integrate_rpm(
        &mut self,
        wheel_angular_velocity: f32,
        throttle: f32,
        coupling: Coupling,
        dt: f32,
    ) -> f32 {
        if !(dt > 0.0) {
            return self.rpm;
        }
        let s = &self.settings;
        let previous = self.rpm;

        let torque = self.torque(self.rpm, throttle);
        let mut omega = self.rpm / RAD_PER_SEC_TO_RPM;
        omega += torque / s.inertia * dt;
        omega *= (1.0 - s.angular_damping * dt).max(0.0);
        let mut rpm = omega * RAD_PER_SEC_TO_RPM;

        let engagement = if coupling.engagement.is_finite() {
            coupling.engagement.clamp(0.0, 1.0)
        } else {
            0.0
        };
        if coupling.ratio != 0.0 && engagement > 0.0 {
            let wheel_rpm = (wheel_angular_velocity * coupling.ratio).abs() * RAD_PER_SEC_TO_RPM;
            rpm += (wheel_rpm - rpm) * engagement;
        }

        self.rpm = if rpm.is_finite() {
            rpm.clamp(s.min_rpm, s.max_rpm)
        } else {
            previous
        };
        self.rpm
    }
}
