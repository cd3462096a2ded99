// ==============================================================================
// transmission.rs — GEARBOX + CLUTCH STATE MACHINE
// ------------------------------------------------------------------------------
// Gear numbering: 0 = neutral, 1..=N forward, -1..=-R reverse.
//
//   Engaged ──(auto rpm threshold | manual shift edge)──> Shifting{target}
//   Shifting ──(switch_time elapsed)──> Engaged in target gear
//
// While Shifting the clutch transmits nothing. After engaging, clutch friction
// ramps 0 -> 1 over clutch_release_time. Auto shifts additionally wait
// switch_latency after the previous shift, which together with the gap between
// shift_down_rpm and shift_up_rpm keeps the box from hunting.
// ==============================================================================

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransmissionMode {
    Auto,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransmissionSettings {
    pub mode: TransmissionMode,
    /// Forward ratios, first gear first. All positive.
    pub gear_ratios: Vec<f32>,
    /// Reverse ratios, first reverse gear first. All negative.
    pub reverse_gear_ratios: Vec<f32>,
    pub switch_time: f32,         // s
    pub clutch_release_time: f32, // s
    pub switch_latency: f32,      // s
    pub shift_up_rpm: f32,
    pub shift_down_rpm: f32,
    pub clutch_strength: f32,
}

impl Default for TransmissionSettings {
    fn default() -> Self {
        Self {
            mode: TransmissionMode::Auto,
            gear_ratios: vec![2.66, 1.78, 1.3, 1.0, 0.74],
            reverse_gear_ratios: vec![-2.90],
            switch_time: 0.5,
            clutch_release_time: 0.3,
            switch_latency: 0.5,
            shift_up_rpm: 4000.0,
            shift_down_rpm: 2000.0,
            clutch_strength: 10.0,
        }
    }
}

impl TransmissionSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gear_ratios.is_empty() {
            return Err(ConfigError::Transmission { reason: "at least one forward gear is required" });
        }
        if !self.gear_ratios.iter().all(|r| *r > 0.0 && r.is_finite()) {
            return Err(ConfigError::Transmission { reason: "forward gear ratios must be positive" });
        }
        if !self.reverse_gear_ratios.iter().all(|r| *r < 0.0 && r.is_finite()) {
            return Err(ConfigError::Transmission { reason: "reverse gear ratios must be negative" });
        }
        if !(self.switch_time >= 0.0 && self.clutch_release_time >= 0.0 && self.switch_latency >= 0.0) {
            return Err(ConfigError::Transmission { reason: "shift timings must not be negative" });
        }
        if !(self.clutch_strength > 0.0) {
            return Err(ConfigError::Transmission { reason: "clutch strength must be positive" });
        }
        if !(self.shift_down_rpm < self.shift_up_rpm) {
            return Err(ConfigError::ShiftThresholds {
                up: self.shift_up_rpm,
                down: self.shift_down_rpm,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShiftState {
    Engaged,
    Shifting { target: i32, remaining: f32 },
}

/// Shift requests for manual mode; only rising edges count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShiftInput {
    pub up: bool,
    pub down: bool,
}

/// Gearbox runtime, without the settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TransmissionState {
    gear: i32,
    state: ShiftState,
    clutch_friction: f32,
    time_since_shift: f32,
    last_input: ShiftInput,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transmission {
    pub settings: TransmissionSettings,
    gear: i32,
    state: ShiftState,
    clutch_friction: f32,
    time_since_shift: f32,
    last_input: ShiftInput,
}

impl Transmission {
    pub fn new(settings: TransmissionSettings) -> Self {
        Self {
            settings,
            gear: 0,
            state: ShiftState::Engaged,
            clutch_friction: 1.0,
            time_since_shift: f32::INFINITY,
            last_input: ShiftInput::default(),
        }
    }

    pub fn gear(&self) -> i32 {
        self.gear
    }

    pub(crate) fn runtime(&self) -> TransmissionState {
        TransmissionState {
            gear: self.gear,
            state: self.state,
            clutch_friction: self.clutch_friction,
            time_since_shift: self.time_since_shift,
            last_input: self.last_input,
        }
    }

    pub(crate) fn restore_runtime(&mut self, runtime: TransmissionState) {
        self.gear = runtime.gear;
        self.state = runtime.state;
        self.clutch_friction = runtime.clutch_friction;
        self.time_since_shift = runtime.time_since_shift;
        self.last_input = runtime.last_input;
    }

    pub fn state(&self) -> ShiftState {
        self.state
    }

    pub fn is_shifting(&self) -> bool {
        matches!(self.state, ShiftState::Shifting { .. })
    }

    /// Ratio for a gear number; neutral and unknown gears have none.
    pub fn gear_ratio(&self, gear: i32) -> Option<f32> {
        match gear {
            0 => None,
            g if g > 0 => self.settings.gear_ratios.get((g - 1) as usize).copied(),
            g => self.settings.reverse_gear_ratios.get((-g - 1) as usize).copied(),
        }
    }

    pub fn current_ratio(&self) -> Option<f32> {
        self.gear_ratio(self.gear)
    }

    /// Fraction of engine torque the clutch passes through right now.
    pub fn clutch_factor(&self) -> f32 {
        match (self.state, self.current_ratio()) {
            (ShiftState::Engaged, Some(_)) => self.clutch_friction,
            _ => 0.0,
        }
    }

    /// Per-tick engine-to-wheel locking factor in [0, 1].
    pub fn engagement(&self, dt: f32) -> f32 {
        (self.clutch_factor() * self.settings.clutch_strength * dt).clamp(0.0, 1.0)
    }

    /// Engine torque at the gearbox output shaft (before the differential).
    pub fn output_torque(&self, engine_torque: f32) -> f32 {
        match self.current_ratio() {
            Some(ratio) => engine_torque * ratio * self.clutch_factor(),
            None => 0.0,
        }
    }

    pub fn forward_gears(&self) -> i32 {
        self.settings.gear_ratios.len() as i32
    }

    pub fn reverse_gears(&self) -> i32 {
        self.settings.reverse_gear_ratios.len() as i32
    }

    /// Jump straight into a gear (no shift delay). Out-of-range gears are ignored.
    pub fn set_gear(&mut self, gear: i32) {
        if gear <= self.forward_gears() && gear >= -self.reverse_gears() {
            self.gear = gear;
            self.state = ShiftState::Engaged;
            self.clutch_friction = 1.0;
        }
    }

    fn begin_shift(&mut self, target: i32) {
        if target == self.gear {
            return;
        }
        debug!(from = self.gear, to = target, "gear change requested");
        if self.settings.switch_time <= 0.0 {
            self.engage(target);
        } else {
            self.state = ShiftState::Shifting { target, remaining: self.settings.switch_time };
        }
    }

    fn engage(&mut self, target: i32) {
        self.gear = target;
        self.state = ShiftState::Engaged;
        self.clutch_friction = if self.settings.clutch_release_time > 0.0 { 0.0 } else { 1.0 };
        self.time_since_shift = 0.0;
        debug!(gear = target, "gear engaged");
    }

    pub fn update(&mut self, dt: f32, engine_rpm: f32, forward_input: f32, shift: ShiftInput) {
        if !(dt > 0.0) {
            return;
        }
        self.time_since_shift += dt;

        match self.state {
            ShiftState::Shifting { target, remaining } => {
                let remaining = remaining - dt;
                if remaining <= 0.0 {
                    self.engage(target);
                } else {
                    self.state = ShiftState::Shifting { target, remaining };
                }
            }
            ShiftState::Engaged => {
                self.clutch_friction = if self.settings.clutch_release_time > 0.0 {
                    (self.clutch_friction + dt / self.settings.clutch_release_time).min(1.0)
                } else {
                    1.0
                };
                match self.settings.mode {
                    TransmissionMode::Auto => self.auto_shift(engine_rpm, forward_input),
                    TransmissionMode::Manual => self.manual_shift(shift),
                }
            }
        }

        self.last_input = shift;
    }

    fn auto_shift(&mut self, rpm: f32, forward_input: f32) {
        if forward_input > 0.0 && self.gear <= 0 {
            self.begin_shift(1);
            return;
        }
        if forward_input < 0.0 && self.gear >= 0 && self.reverse_gears() > 0 {
            self.begin_shift(-1);
            return;
        }
        if self.time_since_shift < self.settings.switch_latency || !rpm.is_finite() {
            return;
        }

        let s = &self.settings;
        let g = self.gear;
        if g > 0 {
            if rpm > s.shift_up_rpm && g < self.forward_gears() {
                self.begin_shift(g + 1);
            } else if rpm < s.shift_down_rpm && g > 1 {
                self.begin_shift(g - 1);
            }
        } else if g < 0 {
            if rpm > s.shift_up_rpm && -g < self.reverse_gears() {
                self.begin_shift(g - 1);
            } else if rpm < s.shift_down_rpm && g < -1 {
                self.begin_shift(g + 1);
            }
        }
    }

    fn manual_shift(&mut self, shift: ShiftInput) {
        let up_edge = shift.up && !self.last_input.up;
        let down_edge = shift.down && !self.last_input.down;
        if up_edge && self.gear < self.forward_gears() {
            self.begin_shift(self.gear + 1);
        } else if down_edge && self.gear > -self.reverse_gears() {
            self.begin_shift(self.gear - 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const DT: f32 = 1.0 / 60.0;

    fn run(t: &mut Transmission, seconds: f32, rpm: f32, forward: f32) {
        let ticks = (seconds / DT).ceil() as usize;
        for _ in 0..ticks {
            t.update(DT, rpm, forward, ShiftInput::default());
        }
    }

    #[test]
    fn gear_numbering_maps_to_ratios() {
        let t = Transmission::new(TransmissionSettings::default());
        assert_eq!(t.gear_ratio(0), None);
        assert_eq!(t.gear_ratio(1), Some(2.66));
        assert_eq!(t.gear_ratio(5), Some(0.74));
        assert_eq!(t.gear_ratio(6), None);
        assert_eq!(t.gear_ratio(-1), Some(-2.90));
        assert_eq!(t.gear_ratio(-2), None);
    }

    #[test]
    fn neutral_transmits_nothing() {
        let t = Transmission::new(TransmissionSettings::default());
        assert_eq!(t.gear(), 0);
        assert_eq!(t.clutch_factor(), 0.0);
        assert_eq!(t.output_torque(500.0), 0.0);
    }

    #[test]
    fn auto_engages_first_after_switch_time() {
        let mut t = Transmission::new(TransmissionSettings::default());
        t.update(DT, 1000.0, 1.0, ShiftInput::default());
        assert!(t.is_shifting());
        assert_eq!(t.clutch_factor(), 0.0);

        run(&mut t, 0.55, 1000.0, 1.0);
        assert_eq!(t.gear(), 1);
        assert!(!t.is_shifting());

        // clutch ramps back in
        run(&mut t, 0.35, 1000.0, 1.0);
        assert_relative_eq!(t.clutch_factor(), 1.0);
        assert_relative_eq!(t.output_torque(100.0), 266.0, max_relative = 1e-5);
    }

    #[test]
    fn auto_upshifts_once_per_latency_window() {
        let mut t = Transmission::new(TransmissionSettings::default());
        t.set_gear(1);
        t.update(DT, 4500.0, 1.0, ShiftInput::default());
        assert_eq!(t.state(), ShiftState::Shifting { target: 2, remaining: 0.5 });

        run(&mut t, 0.55, 4500.0, 1.0);
        assert_eq!(t.gear(), 2);
        // still over the threshold, but inside the latency window
        t.update(DT, 4500.0, 1.0, ShiftInput::default());
        assert!(!t.is_shifting());
    }

    #[test]
    fn auto_downshifts_below_threshold_only() {
        let mut t = Transmission::new(TransmissionSettings::default());
        t.set_gear(3);
        t.update(DT, 3000.0, 1.0, ShiftInput::default());
        assert!(!t.is_shifting());
        t.update(DT, 1500.0, 1.0, ShiftInput::default());
        assert_eq!(t.state(), ShiftState::Shifting { target: 2, remaining: 0.5 });
    }

    #[test]
    fn negative_input_selects_reverse() {
        let mut t = Transmission::new(TransmissionSettings::default());
        t.set_gear(2);
        t.update(DT, 1500.0, -1.0, ShiftInput::default());
        run(&mut t, 0.6, 1500.0, -1.0);
        assert_eq!(t.gear(), -1);
        assert!(t.output_torque(100.0) <= 0.0);
    }

    #[test]
    fn manual_shifts_on_rising_edges() {
        let mut t = Transmission::new(TransmissionSettings {
            mode: TransmissionMode::Manual,
            switch_time: 0.0,
            ..TransmissionSettings::default()
        });
        let up = ShiftInput { up: true, down: false };
        t.update(DT, 5000.0, 1.0, up);
        assert_eq!(t.gear(), 1);
        // held button: no further shifts
        t.update(DT, 5000.0, 1.0, up);
        t.update(DT, 5000.0, 1.0, up);
        assert_eq!(t.gear(), 1);

        t.update(DT, 5000.0, 1.0, ShiftInput::default());
        t.update(DT, 5000.0, 1.0, up);
        assert_eq!(t.gear(), 2);

        let down = ShiftInput { up: false, down: true };
        for _ in 0..3 {
            t.update(DT, 5000.0, 1.0, down);
            t.update(DT, 5000.0, 1.0, ShiftInput::default());
        }
        assert_eq!(t.gear(), -1);
        t.update(DT, 5000.0, 1.0, down);
        assert_eq!(t.gear(), -1, "no second reverse gear configured");
    }

    #[test]
    fn zero_dt_changes_nothing() {
        let mut t = Transmission::new(TransmissionSettings::default());
        let before = t.clone();
        t.update(0.0, 5000.0, 1.0, ShiftInput { up: true, down: false });
        assert_eq!(t, before);
    }

    #[test]
    fn inverted_shift_thresholds_are_rejected() {
        let s = TransmissionSettings {
            shift_up_rpm: 2000.0,
            shift_down_rpm: 3000.0,
            ..TransmissionSettings::default()
        };
        assert!(matches!(s.validate(), Err(ConfigError::ShiftThresholds { .. })));
    }
}
