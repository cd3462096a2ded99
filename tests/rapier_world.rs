//! The sample car on rapier ground: it settles on its springs and drives off.

use wheeled_vehicle::physics::{ChassisSettings, PhysicsWorld};
use wheeled_vehicle::vehicle::{CastKind, DriverInput};
use wheeled_vehicle::VehicleSettings;

const DT: f32 = 1.0 / 60.0;

#[test]
fn sample_car_settles_on_its_suspension() {
    let mut world = PhysicsWorld::new();
    let id = world
        .spawn_vehicle(VehicleSettings::default(), &ChassisSettings::default(), [0.0, 1.0, 0.0])
        .unwrap();

    for _ in 0..240 {
        world.step(DT);
    }

    let state = world.chassis_state(id).unwrap();
    let y = state.transform.translation.vector.y;
    assert!((0.6..1.1).contains(&y), "chassis height {y}");
    assert!(state.linvel.norm() < 0.5, "still moving: {:?}", state.linvel);

    let car = world.vehicle(id).unwrap();
    assert!(car.wheels().iter().all(|w| w.in_contact()));
    assert!(world.last_impulses.get(&id).is_some_and(|out| !out.degraded));
}

#[test]
fn throttle_drives_the_car_forward() {
    let mut world = PhysicsWorld::new();
    let id = world
        .spawn_vehicle(VehicleSettings::default(), &ChassisSettings::default(), [0.0, 1.0, 0.0])
        .unwrap();
    for _ in 0..60 {
        world.step(DT);
    }
    let start = world.chassis_state(id).unwrap().transform.translation.vector;

    world.set_input(id, DriverInput { forward: 1.0, ..DriverInput::default() });
    for _ in 0..240 {
        world.step(DT);
    }

    let end = world.chassis_state(id).unwrap().transform.translation.vector;
    assert!(end.z - start.z > 1.0, "moved only {} m", end.z - start.z);
    assert!(world.vehicle(id).unwrap().transmission().gear() >= 1);
}

#[test]
fn swept_wheels_settle_like_ray_wheels() {
    let settle = |cast: CastKind| {
        let mut settings = VehicleSettings::default();
        for w in &mut settings.wheels {
            w.cast = cast;
        }
        let mut world = PhysicsWorld::new();
        let id = world
            .spawn_vehicle(settings, &ChassisSettings::default(), [0.0, 1.0, 0.0])
            .unwrap();
        for _ in 0..240 {
            world.step(DT);
        }
        let car = world.vehicle(id).unwrap();
        assert!(car.wheels().iter().all(|w| w.in_contact()), "{cast:?}");
        world.chassis_state(id).unwrap().transform.translation.vector.y
    };

    let ray = settle(CastKind::Ray);
    for cast in [CastKind::Sphere { radius: 0.05 }, CastKind::Cylinder] {
        let y = settle(cast);
        assert!((y - ray).abs() < 0.05, "{cast:?} rests at {y}, ray car at {ray}");
    }
}
