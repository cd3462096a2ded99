// ==============================================================================
// anti_roll.rs — ANTI-ROLL BAR LOAD TRANSFER (IMPULSE DOMAIN)
// ------------------------------------------------------------------------------
// An anti-roll bar creates no net vertical impulse; it moves suspension impulse
// across one axle based on the difference in suspension length.
//
//   transfer = k · (L_right - L_left) · dt
//   left  += transfer
//   right -= transfer
//
// The more compressed side (shorter length) gains load. The transfer is
// saturated so neither wheel is pushed below zero, and only wheels that touch
// the ground take part.
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::vehicle::wheel::Wheel;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AntiRollBarSettings {
    pub left_wheel: usize,
    pub right_wheel: usize,
    pub stiffness: f32, // N/m
}

impl Default for AntiRollBarSettings {
    fn default() -> Self {
        Self { left_wheel: 0, right_wheel: 1, stiffness: 1000.0 }
    }
}

impl AntiRollBarSettings {
    pub fn validate(&self, index: usize, wheel_count: usize) -> Result<(), ConfigError> {
        for wheel in [self.left_wheel, self.right_wheel] {
            if wheel >= wheel_count {
                return Err(ConfigError::WheelIndex { kind: "anti-roll bar", index, wheel, count: wheel_count });
            }
        }
        if self.left_wheel == self.right_wheel {
            return Err(ConfigError::SameWheel { kind: "anti-roll bar", index, wheel: self.left_wheel });
        }
        if !(self.stiffness >= 0.0) {
            return Err(ConfigError::NonPositive { wheel: self.left_wheel, field: "anti-roll stiffness", value: self.stiffness });
        }
        Ok(())
    }

    /// Impulse moved from the right wheel to the left wheel this tick.
    pub fn transfer(&self, left_length: f32, right_length: f32, dt: f32) -> f32 {
        self.stiffness * (right_length - left_length) * dt
    }
}

/// Redistribute suspension impulse over one axle. Returns the applied transfer.
pub fn apply_anti_roll(bar: &AntiRollBarSettings, wheels: &mut [Wheel], dt: f32) -> f32 {
    let (l, r) = (bar.left_wheel, bar.right_wheel);
    if l == r || l >= wheels.len() || r >= wheels.len() {
        return 0.0;
    }
    let (left_contact, right_contact) = (wheels[l].in_contact(), wheels[r].in_contact());
    if !left_contact && !right_contact {
        return 0.0;
    }

    let raw = bar.transfer(wheels[l].suspension_length(), wheels[r].suspension_length(), dt);
    if !raw.is_finite() || raw.abs() < 1e-9 {
        return 0.0;
    }

    // Saturation: the donor side cannot give more than it carries.
    let transfer = if raw > 0.0 {
        if right_contact { raw.min(wheels[r].suspension_impulse()) } else { raw }
    } else if left_contact {
        raw.max(-wheels[l].suspension_impulse())
    } else {
        raw
    };

    wheels[l].add_suspension_impulse(transfer);
    wheels[r].add_suspension_impulse(-transfer);
    transfer
}
