// ==============================================================================
// differential.rs — DRIVETRAIN TORQUE SPLIT
// ------------------------------------------------------------------------------
// Each differential takes `engine_torque_ratio` of the gearbox output, multiplies
// by its own `differential_ratio`, and splits the result over two wheels.
//
// - open:          left = (1 - split)·T, right = split·T
// - limited slip:  the slower wheel's share grows with the fast/slow speed ratio,
//                  reaching a slow:fast torque ratio of `limited_slip_ratio` once
//                  the speed ratio reaches it. Shares stay in [0, 1].
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Below this wheel speed (rad/s) the limited-slip bias is not applied.
const MIN_BIAS_SPEED: f32 = 1.0;

/// Tolerance on the sum of engine torque ratios.
pub const ENGINE_TORQUE_RATIO_TOLERANCE: f32 = 1.0e-3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DifferentialSettings {
    pub left_wheel: usize,
    pub right_wheel: usize,
    /// Final-drive ratio applied to this differential's torque.
    pub differential_ratio: f32,
    /// Share of torque that goes to the right wheel when both spin alike.
    pub left_right_split: f32,
    /// `None` = open differential.
    pub limited_slip_ratio: Option<f32>,
    /// Share of gearbox output routed to this differential.
    pub engine_torque_ratio: f32,
}

impl Default for DifferentialSettings {
    fn default() -> Self {
        Self {
            left_wheel: 0,
            right_wheel: 1,
            differential_ratio: 3.42,
            left_right_split: 0.5,
            limited_slip_ratio: Some(1.4),
            engine_torque_ratio: 1.0,
        }
    }
}

impl DifferentialSettings {
    pub fn validate(&self, index: usize, wheel_count: usize) -> Result<(), ConfigError> {
        for wheel in [self.left_wheel, self.right_wheel] {
            if wheel >= wheel_count {
                return Err(ConfigError::WheelIndex {
                    kind: "differential",
                    index,
                    wheel,
                    count: wheel_count,
                });
            }
        }
        if self.left_wheel == self.right_wheel {
            return Err(ConfigError::SameWheel {
                kind: "differential",
                index,
                wheel: self.left_wheel,
            });
        }
        if !(0.0..=1.0).contains(&self.left_right_split) {
            return Err(ConfigError::Differential { index, reason: "left/right split must be in [0, 1]" });
        }
        if !(self.differential_ratio.is_finite() && self.differential_ratio > 0.0) {
            return Err(ConfigError::Differential { index, reason: "differential ratio must be positive" });
        }
        if !(self.engine_torque_ratio >= 0.0) {
            return Err(ConfigError::Differential { index, reason: "engine torque ratio must not be negative" });
        }
        if let Some(lsr) = self.limited_slip_ratio {
            if !(lsr >= 1.0) {
                return Err(ConfigError::Differential { index, reason: "limited-slip ratio must be at least 1" });
            }
        }
        Ok(())
    }

    /// Torque delivered into this differential from the gearbox output shaft.
    pub fn input_torque(&self, gearbox_torque: f32) -> f32 {
        gearbox_torque * self.engine_torque_ratio * self.differential_ratio
    }

    /// Fractions of torque `(left, right)` for the given wheel speeds.
    pub fn torque_fractions(&self, left_omega: f32, right_omega: f32) -> (f32, f32) {
        let right = self.left_right_split.clamp(0.0, 1.0);
        let left = 1.0 - right;

        let Some(lsr) = self.limited_slip_ratio else {
            return (left, right);
        };
        let (wl, wr) = (left_omega.abs(), right_omega.abs());
        if !(wl.is_finite() && wr.is_finite()) || lsr <= 1.0 || wl.max(wr) < MIN_BIAS_SPEED {
            return (left, right);
        }

        let (slow, fast) = (wl.min(wr), wl.max(wr));
        let speed_ratio = if slow > 1e-6 { fast / slow } else { f32::INFINITY };
        let t = ((speed_ratio - 1.0) / (lsr - 1.0)).clamp(0.0, 1.0);

        // base shares of the slower and the faster wheel
        let (slow_base, fast_base) = if wl <= wr { (left, right) } else { (right, left) };
        let denom = slow_base * lsr + fast_base;
        let slow_locked = if denom > 0.0 { slow_base * lsr / denom } else { slow_base };
        let slow_share = (slow_base + (slow_locked - slow_base) * t).clamp(0.0, 1.0);
        let fast_share = 1.0 - slow_share;

        if wl <= wr { (slow_share, fast_share) } else { (fast_share, slow_share) }
    }

    /// Split `total` over `(left, right)`.
    pub fn split_torque(&self, total: f32, left_omega: f32, right_omega: f32) -> (f32, f32) {
        let (fl, fr) = self.torque_fractions(left_omega, right_omega);
        (total * fl, total * fr)
    }
}

/// Engine torque ratios over a set of differentials must not exceed 1.
pub fn validate_engine_torque_ratios(diffs: &[DifferentialSettings]) -> Result<(), ConfigError> {
    let sum: f32 = diffs.iter().map(|d| d.engine_torque_ratio).sum();
    if sum > 1.0 + ENGINE_TORQUE_RATIO_TOLERANCE {
        return Err(ConfigError::EngineTorqueRatioSum { sum });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn rear_diff() -> DifferentialSettings {
        DifferentialSettings {
            left_wheel: 2,
            right_wheel: 3,
            differential_ratio: 1.0,
            ..DifferentialSettings::default()
        }
    }

    #[test]
    fn equal_speeds_split_evenly() {
        let d = rear_diff();
        let total = d.input_torque(500.0 * 1.0);
        let (l, r) = d.split_torque(total, 40.0, 40.0);
        assert_relative_eq!(l, 250.0);
        assert_relative_eq!(r, 250.0);

        let open = DifferentialSettings { limited_slip_ratio: None, ..d };
        let (l, r) = open.split_torque(500.0, 10.0, 80.0);
        assert_relative_eq!(l, 250.0);
        assert_relative_eq!(r, 250.0);
    }

    #[test]
    fn limited_slip_favours_the_slower_wheel() {
        let d = rear_diff();
        let (l, r) = d.split_torque(500.0, 10.0, 30.0);
        assert!(l > r);
        // fully biased: slow:fast == limited_slip_ratio
        assert_relative_eq!(l / r, 1.4, max_relative = 1e-4);

        let (l, r) = d.split_torque(500.0, 12.0, 10.0);
        assert!(r > l);
        assert!(r / l < 1.4);
    }

    #[test]
    fn shares_never_go_negative() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..2000 {
            let d = DifferentialSettings {
                left_right_split: rng.gen_range(0.0..=1.0),
                limited_slip_ratio: Some(rng.gen_range(1.0..10.0)),
                ..rear_diff()
            };
            let (fl, fr) = d.torque_fractions(rng.gen_range(-200.0..200.0), rng.gen_range(-200.0..200.0));
            assert!((0.0..=1.0).contains(&fl) && (0.0..=1.0).contains(&fr));
            assert_relative_eq!(fl + fr, 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn torque_ratio_sum_is_bounded() {
        let front = DifferentialSettings { engine_torque_ratio: 0.5, ..DifferentialSettings::default() };
        let rear = DifferentialSettings { engine_torque_ratio: 0.5, ..rear_diff() };
        assert!(validate_engine_torque_ratios(&[front, rear]).is_ok());

        let greedy = DifferentialSettings { engine_torque_ratio: 0.6, ..rear_diff() };
        assert!(matches!(
            validate_engine_torque_ratios(&[front, greedy]),
            Err(ConfigError::EngineTorqueRatioSum { .. })
        ));
    }

    #[test]
    fn bad_indices_are_rejected() {
        assert!(matches!(rear_diff().validate(0, 3), Err(ConfigError::WheelIndex { wheel: 3, .. })));
        let same = DifferentialSettings { left_wheel: 1, right_wheel: 1, ..rear_diff() };
        assert!(matches!(same.validate(0, 4), Err(ConfigError::SameWheel { .. })));
        assert!(rear_diff().validate(0, 4).is_ok());
    }
}
