// ==============================================================================
// controller.rs — VEHICLE CONTROLLER (ONE TICK, FIXED ORDER)
// ------------------------------------------------------------------------------
// compute(host, dt):
//   0) driver input -> steer angles, throttle, brake
//   1) cast every wheel, suspension length + impulse, anti-roll transfer
//   2) driven-wheel angular velocity (engine-torque-ratio weighted)
//   3) engine rpm
//   4) transmission (auto/manual shifting, clutch ramp)
//   5) differential split of gearbox torque to wheels
//   6) wheel spin: drive, brake, hand brake, damping
//   7) tire impulses for grounded wheels (+ reaction on wheel spin)
//   8) impulse list (suspension + tire) at the contact points
//
// step(host, dt) = compute + apply every impulse through the host.
//
// dt <= 0 / non-finite or a missing chassis: empty output, nothing mutated.
// Any non-finite result: state rolled back to the start of the tick and the
// tick produces zero forces.
// ==============================================================================

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::config::{validate_anti_roll_bars, validate_differentials, TireClamp, VehicleSettings};
use crate::error::ConfigError;
use crate::vehicle::anti_roll::{apply_anti_roll, AntiRollBarSettings};
use crate::vehicle::differential::DifferentialSettings;
use crate::vehicle::engine::{Coupling, Engine, EngineSettings};
use crate::vehicle::host::{ChassisId, ChassisState, VehicleHost};
use crate::vehicle::kinematics::{point_velocity, safe_normalize, slip_components};
use crate::vehicle::tire::{SlipVelocities, TireImpulse, TireMaxImpulseFn, TireModel};
use crate::vehicle::transmission::{ShiftInput, Transmission, TransmissionSettings, TransmissionState};
use crate::vehicle::wheel::{Wheel, WheelSettings, WheelState};

/// Forward input opposing travel faster than this (m/s) brakes instead.
const BRAKE_ON_REVERSE_SPEED: f32 = 1.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverInput {
    /// -1 (full reverse) ..= 1 (full forward)
    pub forward: f32,
    /// -1 (left) ..= 1 (right)
    pub right: f32,
    pub brake: f32,
    pub hand_brake: f32,
    pub shift_up: bool,
    pub shift_down: bool,
}

impl DriverInput {
    fn sanitized(self) -> Self {
        let clamp = |v: f32, lo: f32| if v.is_finite() { v.clamp(lo, 1.0) } else { 0.0 };
        Self {
            forward: clamp(self.forward, -1.0),
            right: clamp(self.right, -1.0),
            brake: clamp(self.brake, 0.0),
            hand_brake: clamp(self.hand_brake, 0.0),
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpulseAtPoint {
    pub impulse: Vector3<f32>,
    pub point: Point3<f32>,
}

/// Everything one tick wants the host to apply, plus what went into it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VehicleImpulses {
    pub impulses: Vec<ImpulseAtPoint>,
    /// Drive torque delivered to each wheel (N·m).
    pub wheel_drive_torque: Vec<f32>,
    pub tires: Vec<TireImpulse>,
    pub engine_torque: f32,
    /// The tick produced non-finite values and was discarded.
    pub degraded: bool,
}

impl VehicleImpulses {
    pub fn is_empty(&self) -> bool {
        self.impulses.is_empty()
    }

    pub fn total_impulse(&self) -> Vector3<f32> {
        self.impulses.iter().map(|i| i.impulse).sum()
    }
}

/// Engine and gearbox runtime that a tick may roll back. Wheel runtime goes
/// into the controller's reusable `rollback` buffer.
#[derive(Debug, Clone, Copy)]
struct Snapshot {
    rpm: f32,
    transmission: TransmissionState,
}

#[derive(Debug)]
pub struct VehicleController {
    chassis: ChassisId,
    up: Vector3<f32>,
    forward: Vector3<f32>,
    wheels: Vec<Wheel>,
    engine: Engine,
    transmission: Transmission,
    differentials: Vec<DifferentialSettings>,
    anti_roll_bars: Vec<AntiRollBarSettings>,
    tire: TireModel,
    tire_clamp: TireClamp,
    input: DriverInput,
    ticks: u64,
    rollback: Vec<WheelState>,
}

impl VehicleController {
    pub fn new(chassis: ChassisId, settings: VehicleSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        let tire = TireModel { max_impulse: settings.tire_clamp.max_impulse_fn() };
        let wheel_count = settings.wheels.len();
        Ok(Self {
            chassis,
            up: safe_normalize(settings.up, Vector3::y()),
            forward: safe_normalize(settings.forward, Vector3::z()),
            wheels: settings.wheels.into_iter().map(Wheel::new).collect(),
            engine: Engine::new(settings.engine),
            transmission: Transmission::new(settings.transmission),
            differentials: settings.differentials,
            anti_roll_bars: settings.anti_roll_bars,
            tire,
            tire_clamp: settings.tire_clamp,
            input: DriverInput::default(),
            ticks: 0,
            rollback: Vec::with_capacity(wheel_count),
        })
    }

    pub fn chassis(&self) -> ChassisId {
        self.chassis
    }

    /// Chassis-local up and forward axes.
    pub fn up(&self) -> Vector3<f32> {
        self.up
    }

    pub fn forward(&self) -> Vector3<f32> {
        self.forward
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn wheels(&self) -> &[Wheel] {
        &self.wheels
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn transmission(&self) -> &Transmission {
        &self.transmission
    }

    pub fn differentials(&self) -> &[DifferentialSettings] {
        &self.differentials
    }

    pub fn anti_roll_bars(&self) -> &[AntiRollBarSettings] {
        &self.anti_roll_bars
    }

    pub fn input(&self) -> DriverInput {
        self.input
    }

    pub fn set_input(&mut self, input: DriverInput) {
        self.input = input.sanitized();
    }

    /// Replace the settings of one wheel. Runtime state is reset.
    pub fn set_wheel_settings(&mut self, index: usize, settings: WheelSettings) -> Result<(), ConfigError> {
        let count = self.wheels.len();
        let slot = self.wheels.get_mut(index).ok_or(ConfigError::WheelIndex {
            kind: "wheel",
            index,
            wheel: index,
            count,
        })?;
        settings.validate(index)?;
        *slot = Wheel::new(settings);
        Ok(())
    }

    pub fn set_engine_settings(&mut self, settings: EngineSettings) -> Result<(), ConfigError> {
        settings.validate()?;
        let rpm = self.engine.rpm();
        self.engine = Engine::new(settings);
        self.engine.set_rpm(rpm);
        Ok(())
    }

    pub fn set_transmission_settings(&mut self, settings: TransmissionSettings) -> Result<(), ConfigError> {
        settings.validate()?;
        self.transmission = Transmission::new(settings);
        Ok(())
    }

    pub fn set_differentials(&mut self, differentials: Vec<DifferentialSettings>) -> Result<(), ConfigError> {
        validate_differentials(&differentials, self.wheels.len())?;
        self.differentials = differentials;
        Ok(())
    }

    pub fn set_anti_roll_bars(&mut self, bars: Vec<AntiRollBarSettings>) -> Result<(), ConfigError> {
        validate_anti_roll_bars(&bars, self.wheels.len())?;
        self.anti_roll_bars = bars;
        Ok(())
    }

    /// Install (or with `None`, remove) the tire impulse clamp override.
    /// The clamp then reports as `TireClamp::Custom` (or `Friction`).
    pub fn set_tire_max_impulse_callback(&mut self, callback: Option<TireMaxImpulseFn>) {
        self.tire_clamp = if callback.is_some() { TireClamp::Custom } else { TireClamp::Friction };
        self.tire.max_impulse = callback;
    }

    /// Switch to one of the named tire clamps.
    pub fn set_tire_clamp(&mut self, clamp: TireClamp) -> Result<(), ConfigError> {
        clamp.validate()?;
        self.tire.max_impulse = clamp.max_impulse_fn();
        self.tire_clamp = clamp;
        Ok(())
    }

    pub fn tire_clamp(&self) -> TireClamp {
        self.tire_clamp
    }

    pub fn has_tire_max_impulse_callback(&self) -> bool {
        self.tire.max_impulse.is_some()
    }

    /// Current configuration. A custom tire closure shows up as
    /// `TireClamp::Custom`, which cannot be loaded back.
    pub fn settings(&self) -> VehicleSettings {
        VehicleSettings {
            up: self.up,
            forward: self.forward,
            wheels: self.wheels.iter().map(|w| w.settings.clone()).collect(),
            engine: self.engine.settings.clone(),
            transmission: self.transmission.settings.clone(),
            differentials: self.differentials.clone(),
            anti_roll_bars: self.anti_roll_bars.clone(),
            tire_clamp: self.tire_clamp,
        }
    }

    fn snapshot(&mut self) -> Snapshot {
        self.rollback.clear();
        self.rollback.extend(self.wheels.iter().map(Wheel::state));
        Snapshot {
            rpm: self.engine.rpm(),
            transmission: self.transmission.runtime(),
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        for (wheel, state) in self.wheels.iter_mut().zip(&self.rollback) {
            wheel.restore_state(*state);
        }
        self.engine.set_rpm(snapshot.rpm);
        self.transmission.restore_runtime(snapshot.transmission);
    }

    /// Run one tick against the host's current chassis state and return the
    /// impulses without applying them.
    pub fn compute<H: VehicleHost + ?Sized>(&mut self, host: &H, dt: f32) -> VehicleImpulses {
        if !(dt > 0.0 && dt.is_finite()) {
            return VehicleImpulses::default();
        }
        let Some(chassis) = host.chassis_state(self.chassis) else {
            trace!(chassis = ?self.chassis, "chassis not found; skipping tick");
            return VehicleImpulses::default();
        };
        if !chassis_is_finite(&chassis) {
            warn!(chassis = ?self.chassis, "chassis state is not finite; skipping tick");
            return VehicleImpulses::default();
        }

        let snapshot = self.snapshot();
        let out = self.tick(host, &chassis, dt);

        if !output_is_finite(&out) || !self.state_is_finite() {
            warn!(chassis = ?self.chassis, "non-finite vehicle impulse; tick degraded to zero forces");
            self.restore(snapshot);
            return VehicleImpulses {
                wheel_drive_torque: vec![0.0; self.wheels.len()],
                tires: vec![TireImpulse::default(); self.wheels.len()],
                degraded: true,
                ..VehicleImpulses::default()
            };
        }
        self.ticks += 1;
        out
    }

    /// `compute` followed by applying every impulse to the chassis.
    pub fn step<H: VehicleHost + ?Sized>(&mut self, host: &mut H, dt: f32) -> VehicleImpulses {
        let out = self.compute(&*host, dt);
        for imp in &out.impulses {
            host.apply_impulse_at_point(self.chassis, imp.impulse, imp.point);
        }
        out
    }

    fn tick<H: VehicleHost + ?Sized>(&mut self, host: &H, chassis: &ChassisState, dt: f32) -> VehicleImpulses {
        let n = self.wheels.len();
        let sprung_mass = chassis.mass / n as f32;

        // ---------------- 0) input ----------------
        let mut input = self.input;
        let forward_world = chassis.transform.rotation * self.forward;
        let speed = chassis.linvel.dot(&forward_world);
        if input.forward * speed < 0.0 && speed.abs() > BRAKE_ON_REVERSE_SPEED {
            input.brake = input.brake.max(input.forward.abs());
            input.forward = 0.0;
        }
        let throttle = input.forward.abs();
        for w in &mut self.wheels {
            let angle = -input.right * w.settings.max_steer_angle;
            w.set_steer_angle(angle);
        }

        // ---------------- 1) suspension ----------------
        for (i, w) in self.wheels.iter_mut().enumerate() {
            let ray = w.ray(chassis);
            let hit = host.cast_wheel(self.chassis, i, &ray);
            w.update_suspension(chassis, hit, sprung_mass, dt);
        }
        for bar in &self.anti_roll_bars {
            apply_anti_roll(bar, &mut self.wheels, dt);
        }

        // ---------------- 2) driven wheel speed ----------------
        let (mut weight, mut omega_sum, mut ratio_sum) = (0.0f32, 0.0f32, 0.0f32);
        for d in &self.differentials {
            let avg = 0.5 * (self.wheels[d.left_wheel].angular_velocity() + self.wheels[d.right_wheel].angular_velocity());
            weight += d.engine_torque_ratio;
            omega_sum += d.engine_torque_ratio * avg;
            ratio_sum += d.engine_torque_ratio * d.differential_ratio;
        }
        let (driven_omega, diff_ratio) = if weight > 0.0 {
            (omega_sum / weight, ratio_sum / weight)
        } else {
            (0.0, 0.0)
        };

        // ---------------- 3) engine ----------------
        let coupling = match self.transmission.current_ratio() {
            Some(gear_ratio) => Coupling {
                ratio: gear_ratio * diff_ratio,
                engagement: self.transmission.engagement(dt),
            },
            None => Coupling::DISENGAGED,
        };
        let rpm = self.engine.integrate_rpm(driven_omega, throttle, coupling, dt);

        // ---------------- 4) transmission ----------------
        self.transmission.update(
            dt,
            rpm,
            input.forward,
            ShiftInput { up: input.shift_up, down: input.shift_down },
        );

        // ---------------- 5) differentials ----------------
        let engine_torque = self.engine.current_torque(throttle);
        let gearbox_torque = self.transmission.output_torque(engine_torque);
        let mut drive = vec![0.0f32; n];
        for d in &self.differentials {
            let total = d.input_torque(gearbox_torque);
            let (l, r) = d.split_torque(
                total,
                self.wheels[d.left_wheel].angular_velocity(),
                self.wheels[d.right_wheel].angular_velocity(),
            );
            drive[d.left_wheel] += l;
            drive[d.right_wheel] += r;
        }

        // ---------------- 6) wheel spin ----------------
        for (w, torque) in self.wheels.iter_mut().zip(&drive) {
            w.apply_drive_torque(*torque, dt);
            let brake = input.brake * w.settings.max_brake_torque + input.hand_brake * w.settings.max_hand_brake_torque;
            w.apply_brake_torque(brake, dt);
            w.apply_angular_damping(dt);
        }

        // ---------------- 7 + 8) tires, impulse list ----------------
        let mut impulses = Vec::with_capacity(2 * n);
        let mut tires = vec![TireImpulse::default(); n];
        for (i, w) in self.wheels.iter_mut().enumerate() {
            if !w.in_contact() {
                w.longitudinal_slip = 0.0;
                w.lateral_slip = 0.0;
                w.longitudinal_impulse = 0.0;
                w.lateral_impulse = 0.0;
                w.integrate_rotation(dt);
                continue;
            }

            let point = w.contact_point();
            let ray = w.ray(chassis);
            let susp = w.suspension_impulse();
            if susp > 0.0 {
                impulses.push(ImpulseAtPoint { impulse: -ray.direction * susp, point });
            }

            let basis = w.basis(chassis);
            let v = point_velocity(chassis.linvel, chassis.angvel, chassis.center_of_mass, point);
            let (v_long, v_lat) = slip_components(v, &basis);
            let tire = self.tire.compute_wheel_impulse(
                i,
                w,
                susp,
                SlipVelocities { longitudinal: v_long, lateral: v_lat },
                sprung_mass,
                dt,
            );

            w.apply_longitudinal_reaction(tire.longitudinal);
            w.longitudinal_slip = tire.longitudinal_slip;
            w.lateral_slip = tire.lateral_slip;
            w.longitudinal_impulse = tire.longitudinal;
            w.lateral_impulse = tire.lateral;
            w.integrate_rotation(dt);

            let tire_impulse = basis.forward * tire.longitudinal + basis.right * tire.lateral;
            if tire_impulse.norm_squared() > 0.0 {
                impulses.push(ImpulseAtPoint { impulse: tire_impulse, point });
            }
            tires[i] = tire;
        }

        VehicleImpulses {
            impulses,
            wheel_drive_torque: drive,
            tires,
            engine_torque,
            degraded: false,
        }
    }

    fn state_is_finite(&self) -> bool {
        self.engine.rpm().is_finite()
            && self.wheels.iter().all(|w| {
                w.angular_velocity().is_finite()
                    && w.suspension_impulse().is_finite()
                    && w.rotation_angle().is_finite()
            })
    }
}

fn chassis_is_finite(c: &ChassisState) -> bool {
    c.mass.is_finite()
        && c.mass > 0.0
        && c.linvel.iter().all(|v| v.is_finite())
        && c.angvel.iter().all(|v| v.is_finite())
        && c.center_of_mass.coords.iter().all(|v| v.is_finite())
        && c.transform.translation.vector.iter().all(|v| v.is_finite())
        && c.transform.rotation.coords.iter().all(|v| v.is_finite())
}

fn output_is_finite(out: &VehicleImpulses) -> bool {
    out.impulses.iter().all(|i| {
        i.impulse.iter().all(|v| v.is_finite()) && i.point.coords.iter().all(|v| v.is_finite())
    }) && out.wheel_drive_torque.iter().all(|t| t.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vehicle::host::{CastHit, CastKind, WheelRay};
    use crate::vehicle::tire::{TireFrictionQuery, TireImpulseLimit};
    use approx::assert_relative_eq;
    use nalgebra::{Isometry3, Vector3};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const DT: f32 = 1.0 / 60.0;

    /// Flat ground at y = 0 under a single chassis.
    struct FlatGround {
        chassis: ChassisState,
        applied: Vec<ImpulseAtPoint>,
    }

    impl FlatGround {
        fn at_height(y: f32) -> Self {
            Self {
                chassis: ChassisState::at_rest(Isometry3::translation(0.0, y, 0.0), 1500.0),
                applied: Vec::new(),
            }
        }
    }

    impl VehicleHost for FlatGround {
        fn chassis_state(&self, _: ChassisId) -> Option<ChassisState> {
            Some(self.chassis)
        }

        fn cast_wheel(&self, _: ChassisId, _: usize, ray: &WheelRay) -> Option<CastHit> {
            if ray.direction.y >= -1e-6 {
                return None;
            }
            let distance = ray.origin.y / -ray.direction.y;
            if !(0.0..=ray.length).contains(&distance) {
                return None;
            }
            Some(CastHit {
                point: ray.origin + ray.direction * distance,
                normal: Vector3::y(),
                fraction: distance / ray.length,
            })
        }

        fn apply_impulse_at_point(&mut self, _: ChassisId, impulse: Vector3<f32>, point: Point3<f32>) {
            self.applied.push(ImpulseAtPoint { impulse, point });
        }
    }

    fn controller() -> VehicleController {
        VehicleController::new(ChassisId(1), VehicleSettings::default()).unwrap()
    }

    #[test]
    fn controller_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<VehicleController>();
    }

    #[test]
    fn rejects_invalid_settings() {
        let mut s = VehicleSettings::default();
        s.wheels.clear();
        assert!(matches!(VehicleController::new(ChassisId(1), s), Err(ConfigError::NoWheels)));
    }

    #[test]
    fn fresh_controller_has_no_torque() {
        let c = controller();
        assert_eq!(c.engine().current_torque(c.input().forward.abs()), 0.0);
        assert_eq!(c.transmission().gear(), 0);
        assert!(c.wheels().iter().all(|w| w.angular_velocity() == 0.0));
    }

    #[test]
    fn zero_or_bad_dt_changes_nothing() {
        let mut c = controller();
        let mut host = FlatGround::at_height(0.85);
        c.set_input(DriverInput { forward: 1.0, right: 0.5, ..DriverInput::default() });
        c.step(&mut host, DT);

        let (wheels, engine, transmission) = (c.wheels.clone(), c.engine.clone(), c.transmission.clone());
        for dt in [0.0, -DT, f32::NAN, f32::INFINITY] {
            let out = c.step(&mut host, dt);
            assert!(out.is_empty());
        }
        assert_eq!(wheels, c.wheels);
        assert_eq!(engine, c.engine);
        assert_eq!(transmission, c.transmission);
        assert_eq!(c.ticks(), 1);
    }

    #[test]
    fn at_rest_without_input_has_no_drive_or_longitudinal_impulse() {
        let mut c = controller();
        let mut host = FlatGround::at_height(0.85);
        let out = c.step(&mut host, DT);
        assert!(!out.degraded);
        assert!(out.wheel_drive_torque.iter().all(|t| *t == 0.0));
        assert!(c.wheels().iter().all(|w| w.longitudinal_impulse() == 0.0));
        assert!(c.wheels().iter().all(|w| w.in_contact()));
        // suspension holds the car up
        assert!(host.applied.iter().map(|i| i.impulse.y).sum::<f32>() > 0.0);
    }

    #[test]
    fn airborne_wheels_extend_and_push_nothing() {
        let mut c = controller();
        let mut host = FlatGround::at_height(10.0);
        let out = c.step(&mut host, DT);
        assert!(out.is_empty());
        for w in c.wheels() {
            assert!(!w.in_contact());
            assert_relative_eq!(w.suspension_length(), 0.5);
        }
    }

    #[test]
    fn throttle_engages_first_gear_and_drives_rear_wheels() {
        let mut c = controller();
        let mut host = FlatGround::at_height(0.85);
        c.set_input(DriverInput { forward: 1.0, ..DriverInput::default() });
        let mut ticks = 0;
        while !(c.transmission().gear() == 1 && !c.transmission().is_shifting()) && ticks < 120 {
            c.step(&mut host, DT);
            ticks += 1;
        }
        assert_eq!(c.transmission().gear(), 1);

        // let the clutch bite
        for _ in 0..10 {
            c.step(&mut host, DT);
        }
        let out = c.step(&mut host, DT);
        assert!(out.wheel_drive_torque[2] > 0.0 && out.wheel_drive_torque[3] > 0.0);
        assert_eq!(out.wheel_drive_torque[0], 0.0);
        assert!(out.total_impulse().z > 0.0, "car should be pushed forward");
    }

    #[test]
    fn steering_follows_right_input() {
        let mut c = controller();
        let mut host = FlatGround::at_height(0.85);
        c.set_input(DriverInput { right: 1.0, ..DriverInput::default() });
        c.step(&mut host, DT);
        assert_relative_eq!(c.wheels()[0].steer_angle(), -1.0);
        assert_relative_eq!(c.wheels()[1].steer_angle(), -1.0);
        assert_eq!(c.wheels()[2].steer_angle(), 0.0);
    }

    #[test]
    fn reversing_input_while_rolling_forward_brakes() {
        let mut c = controller();
        let mut host = FlatGround::at_height(0.85);
        host.chassis.linvel = Vector3::new(0.0, 0.0, 10.0);
        for w in &mut c.wheels {
            w.set_angular_velocity(10.0 / 0.3);
        }
        c.set_input(DriverInput { forward: -1.0, ..DriverInput::default() });
        let out = c.step(&mut host, DT);
        assert!(c.transmission().gear() >= 0);
        assert!(out.wheel_drive_torque.iter().all(|t| *t == 0.0));
        assert!(c.wheels().iter().all(|w| w.angular_velocity() < 10.0 / 0.3));
    }

    #[test]
    fn override_is_called_once_per_grounded_wheel() {
        let mut c = controller();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        c.set_tire_max_impulse_callback(Some(Box::new(move |q: &TireFrictionQuery| {
            counter.fetch_add(1, Ordering::Relaxed);
            TireImpulseLimit {
                longitudinal: q.longitudinal_friction * q.suspension_impulse,
                lateral: q.lateral_friction * q.suspension_impulse,
            }
        })));
        assert!(c.has_tire_max_impulse_callback());

        let mut host = FlatGround::at_height(0.85);
        c.step(&mut host, DT);
        assert_eq!(calls.load(Ordering::Relaxed), 4);

        c.set_tire_max_impulse_callback(None);
        c.step(&mut host, DT);
        assert_eq!(calls.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn non_finite_chassis_is_skipped() {
        let mut c = controller();
        let mut host = FlatGround::at_height(0.85);
        host.chassis.linvel = Vector3::new(f32::NAN, 0.0, 0.0);
        let before = c.wheels.clone();
        let out = c.step(&mut host, DT);
        assert!(out.is_empty());
        assert_eq!(before, c.wheels);
    }

    #[test]
    fn overflowing_tick_degrades_to_zero_forces() {
        let mut c = controller();
        let mut host = FlatGround::at_height(0.85);
        c.set_input(DriverInput { forward: 1.0, right: 0.4, ..DriverInput::default() });
        for _ in 0..30 {
            c.step(&mut host, DT);
        }
        host.applied.clear();
        let (wheels, engine, transmission) = (c.wheels.clone(), c.engine.clone(), c.transmission.clone());
        let ticks = c.ticks();

        // finite, but the spring stiffness derived from it is not
        host.chassis.mass = 1.0e38;
        let out = c.step(&mut host, DT);
        assert!(out.degraded);
        assert!(host.applied.is_empty());
        assert_eq!(wheels, c.wheels);
        assert_eq!(engine, c.engine);
        assert_eq!(transmission, c.transmission);
        assert_eq!(c.ticks(), ticks);
    }

    #[test]
    fn rollback_state_is_plain_data() {
        fn assert_copy<T: Copy>() {}
        assert_copy::<WheelState>();
        assert_copy::<TransmissionState>();
        assert_copy::<Snapshot>();

        let mut c = controller();
        let mut host = FlatGround::at_height(0.85);
        c.step(&mut host, DT);
        let capacity = c.rollback.capacity();
        for _ in 0..10 {
            c.step(&mut host, DT);
        }
        assert_eq!(c.rollback.capacity(), capacity);
        assert_eq!(c.rollback.len(), c.wheels.len());
    }

    #[test]
    fn settings_keep_the_tire_clamp() {
        let s = VehicleSettings {
            tire_clamp: TireClamp::ScaledLongitudinal { multiplier: 10.0 },
            ..VehicleSettings::default()
        };
        let mut c = VehicleController::new(ChassisId(1), s.clone()).unwrap();
        assert_eq!(c.settings(), s);
        assert!(c.has_tire_max_impulse_callback());

        let reloaded = VehicleSettings::from_json_str(&c.settings().to_json_pretty().unwrap()).unwrap();
        assert_eq!(reloaded, s);

        c.set_tire_max_impulse_callback(Some(Box::new(|_: &TireFrictionQuery| TireImpulseLimit {
            longitudinal: 1.0,
            lateral: 1.0,
        })));
        assert_eq!(c.tire_clamp(), TireClamp::Custom);
        assert!(matches!(c.settings().validate(), Err(ConfigError::CustomTireClamp)));

        c.set_tire_max_impulse_callback(None);
        assert_eq!(c.settings().tire_clamp, TireClamp::Friction);

        assert!(c.set_tire_clamp(TireClamp::ScaledLongitudinal { multiplier: -1.0 }).is_err());
        assert_eq!(c.tire_clamp(), TireClamp::Friction);
        c.set_tire_clamp(TireClamp::ScaledLongitudinal { multiplier: 4.0 }).unwrap();
        assert!(c.has_tire_max_impulse_callback());
        assert_eq!(c.settings().tire_clamp, TireClamp::ScaledLongitudinal { multiplier: 4.0 });
    }

    #[test]
    fn sphere_cast_wheels_rest_at_the_same_length_as_rays() {
        // flat ground at y = 0, swept sphere touches when its centre is `radius` up
        struct SphereGround(ChassisState);
        impl VehicleHost for SphereGround {
            fn chassis_state(&self, _: ChassisId) -> Option<ChassisState> {
                Some(self.0)
            }
            fn cast_wheel(&self, _: ChassisId, _: usize, ray: &WheelRay) -> Option<CastHit> {
                let CastKind::Sphere { radius } = ray.kind else {
                    return None;
                };
                let distance = (ray.origin.y - radius) / -ray.direction.y;
                (0.0..=ray.length).contains(&distance).then(|| CastHit {
                    point: Point3::new(ray.origin.x, 0.0, ray.origin.z),
                    normal: Vector3::y(),
                    fraction: distance / ray.length,
                })
            }
            fn apply_impulse_at_point(&mut self, _: ChassisId, _: Vector3<f32>, _: Point3<f32>) {}
        }

        let mut s = VehicleSettings::default();
        for w in &mut s.wheels {
            w.cast = CastKind::Sphere { radius: 0.05 };
        }
        let mut c = VehicleController::new(ChassisId(1), s).unwrap();
        let mut host = SphereGround(ChassisState::at_rest(Isometry3::translation(0.0, 0.85, 0.0), 1500.0));
        c.step(&mut host, DT);
        for w in c.wheels() {
            assert!(w.in_contact());
            assert_relative_eq!(w.suspension_length(), 0.37, epsilon = 1e-5);
        }
    }

    #[test]
    fn setters_validate() {
        let mut c = controller();
        assert!(c.set_differentials(vec![DifferentialSettings { left_wheel: 0, right_wheel: 9, ..Default::default() }]).is_err());
        assert!(c.set_anti_roll_bars(vec![AntiRollBarSettings::default()]).is_ok());
        let bad = WheelSettings { radius: 0.0, ..WheelSettings::default() };
        assert!(matches!(c.set_wheel_settings(0, bad), Err(ConfigError::NonPositive { .. })));
        assert!(c.set_wheel_settings(7, WheelSettings::default()).is_err());
        assert_eq!(c.settings().wheels.len(), 4);

        // the gearbox is only reachable through the validated setter
        let mut gearbox = c.settings().transmission;
        gearbox.shift_down_rpm = gearbox.shift_up_rpm + 1.0;
        assert!(matches!(c.set_transmission_settings(gearbox), Err(ConfigError::ShiftThresholds { .. })));
        assert_eq!(c.transmission().settings, VehicleSettings::default().transmission);
    }
}
