// ==============================================================================
// telemetry.rs — PER-TICK VEHICLE SNAPSHOT (SERVER -> CLIENT)
// ------------------------------------------------------------------------------
// Serializable view of one vehicle after a tick:
// - chassis pose
// - engine / gearbox state
// - per wheel: hub center, suspension ray and hit, spin, slip, tire impulses
//
// Read-only: building a snapshot has no physics side effects.
// ==============================================================================

use serde::Serialize;

use crate::vehicle::controller::{VehicleController, VehicleImpulses};
use crate::vehicle::host::ChassisState;
use crate::vehicle::transmission::ShiftState;

#[derive(Debug, Clone, Serialize)]
pub struct ChassisTelemetry {
    pub position: [f32; 3],
    pub rotation: [f32; 4], // quaternion i, j, k, w
    pub linvel: [f32; 3],
    pub speed: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuspensionRay {
    pub origin: [f32; 3],
    pub direction: [f32; 3],
    pub length: f32,
    pub hit: Option<[f32; 3]>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WheelTelemetry {
    pub center: [f32; 3],
    pub radius: f32,
    pub grounded: bool,
    pub suspension_length: f32,
    pub suspension_impulse: f32,
    pub steer: f32,
    pub angular_velocity: f32,
    pub rotation: f32,
    pub drive_torque: f32,
    pub longitudinal_slip: f32,
    pub lateral_slip: f32,
    pub longitudinal_impulse: f32,
    pub lateral_impulse: f32,
    pub ray: SuspensionRay,
}

#[derive(Debug, Clone, Serialize)]
pub struct VehicleTelemetry {
    pub tick: u64,
    pub chassis: Option<ChassisTelemetry>,
    pub rpm: f32,
    pub gear: i32,
    pub shifting: bool,
    pub clutch: f32,
    pub engine_torque: f32,
    pub degraded: bool,
    pub wheels: Vec<WheelTelemetry>,
}

#[inline]
fn v3(v: &nalgebra::Vector3<f32>) -> [f32; 3] {
    [v.x, v.y, v.z]
}

#[inline]
fn p3(p: &nalgebra::Point3<f32>) -> [f32; 3] {
    [p.x, p.y, p.z]
}

impl VehicleTelemetry {
    /// Snapshot of `controller`. Without a chassis state wheel geometry is
    /// reported in chassis-local space.
    pub fn capture(
        controller: &VehicleController,
        chassis: Option<&ChassisState>,
        last: Option<&VehicleImpulses>,
    ) -> Self {
        let local = ChassisState::at_rest(nalgebra::Isometry3::identity(), 1.0);
        let frame = chassis.unwrap_or(&local);

        let wheels = controller
            .wheels()
            .iter()
            .enumerate()
            .map(|(i, w)| {
                let ray = w.ray(frame);
                WheelTelemetry {
                    center: p3(&w.center_world(frame)),
                    radius: w.settings.radius,
                    grounded: w.in_contact(),
                    suspension_length: w.suspension_length(),
                    suspension_impulse: w.suspension_impulse(),
                    steer: w.steer_angle(),
                    angular_velocity: w.angular_velocity(),
                    rotation: w.rotation_angle(),
                    drive_torque: last
                        .and_then(|l| l.wheel_drive_torque.get(i).copied())
                        .unwrap_or(0.0),
                    longitudinal_slip: w.longitudinal_slip(),
                    lateral_slip: w.lateral_slip(),
                    longitudinal_impulse: w.longitudinal_impulse(),
                    lateral_impulse: w.lateral_impulse(),
                    ray: SuspensionRay {
                        origin: p3(&ray.origin),
                        direction: v3(&ray.direction),
                        length: ray.length,
                        hit: w.in_contact().then(|| p3(&w.contact_point())),
                    },
                }
            })
            .collect();

        let transmission = controller.transmission();
        Self {
            tick: controller.ticks(),
            chassis: chassis.map(|c| {
                let q = c.transform.rotation;
                let forward = c.transform.rotation * controller.forward();
                ChassisTelemetry {
                    position: v3(&c.transform.translation.vector),
                    rotation: [q.i, q.j, q.k, q.w],
                    linvel: v3(&c.linvel),
                    speed: c.linvel.dot(&forward),
                }
            }),
            rpm: controller.engine().rpm(),
            gear: transmission.gear(),
            shifting: matches!(transmission.state(), ShiftState::Shifting { .. }),
            clutch: transmission.clutch_factor(),
            engine_torque: last.map(|l| l.engine_torque).unwrap_or(0.0),
            degraded: last.is_some_and(|l| l.degraded),
            wheels,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
