// ==============================================================================
// physics.rs — RAPIER3D HOST FOR VEHICLE CONTROLLERS
// ------------------------------------------------------------------------------
// PhysicsWorld owns the rapier sets, a static ground box and one dynamic chassis
// body per vehicle. Each step:
//   1) refresh the query pipeline (wheel casts need current collider poses)
//   2) tick every VehicleController through a RapierHost
//   3) rapier pipeline step
//   4) safety: reset bodies that left the world or went non-finite
//
// Collision layers: ground (non-moving) and moving. Ground only collides with
// moving bodies; moving bodies collide with both.
// ==============================================================================

use std::collections::HashMap;

use rapier3d::parry::query::ShapeCastOptions;
use rapier3d::parry::shape::{Ball, Cylinder, Shape};
use rapier3d::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::VehicleSettings;
use crate::error::ConfigError;
use crate::vehicle::controller::{DriverInput, VehicleController, VehicleImpulses};
use crate::vehicle::host::{CastHit, CastKind, ChassisId, ChassisState, VehicleHost, WheelRay};

pub const GROUP_GROUND: Group = Group::from_bits_truncate(0b0001);
pub const GROUP_MOVING: Group = Group::from_bits_truncate(0b0010);

/// Bodies beyond this distance from the origin are reset.
const WORLD_LIMIT: f32 = 1_000.0;

/// Chassis rigid body shape and mass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChassisSettings {
    pub half_extents: [f32; 3],
    pub mass: f32, // kg
    /// Center of mass, relative to the box center.
    pub com_offset: [f32; 3],
    pub linear_damping: f32,
    pub angular_damping: f32,
}

impl Default for ChassisSettings {
    fn default() -> Self {
        let half_height = 0.2;
        Self {
            half_extents: [0.9, half_height, 2.0],
            mass: 1500.0,
            com_offset: [0.0, -half_height, 0.0],
            linear_damping: 0.0,
            angular_damping: 0.05,
        }
    }
}

impl ChassisSettings {
    fn mass_properties(&self) -> MassProperties {
        let [hx, hy, hz] = self.half_extents;
        let (x2, y2, z2) = ((2.0 * hx).powi(2), (2.0 * hy).powi(2), (2.0 * hz).powi(2));
        let m = self.mass;
        let [cx, cy, cz] = self.com_offset;
        MassProperties::new(
            point![cx, cy, cz],
            m,
            vector![m / 12.0 * (y2 + z2), m / 12.0 * (x2 + z2), m / 12.0 * (x2 + y2)],
        )
    }
}

// --------------------------------------------------
// handle <-> id, rapier <-> vehicle math
// --------------------------------------------------
pub fn chassis_id(handle: RigidBodyHandle) -> ChassisId {
    let (index, generation) = handle.into_raw_parts();
    ChassisId(((generation as u64) << 32) | index as u64)
}

pub fn body_handle(id: ChassisId) -> RigidBodyHandle {
    RigidBodyHandle::from_raw_parts(id.0 as u32, (id.0 >> 32) as u32)
}

#[inline]
fn v3(v: &Vector<Real>) -> ::nalgebra::Vector3<f32> {
    ::nalgebra::Vector3::new(v.x, v.y, v.z)
}

#[inline]
fn p3(p: &Point<Real>) -> ::nalgebra::Point3<f32> {
    ::nalgebra::Point3::new(p.x, p.y, p.z)
}

fn iso3(iso: &Isometry<Real>) -> ::nalgebra::Isometry3<f32> {
    let t = iso.translation.vector;
    let q = iso.rotation.quaternion();
    ::nalgebra::Isometry3::from_parts(
        ::nalgebra::Translation3::new(t.x, t.y, t.z),
        ::nalgebra::UnitQuaternion::from_quaternion(::nalgebra::Quaternion::new(q.w, q.i, q.j, q.k)),
    )
}

fn body_state(bodies: &RigidBodySet, id: ChassisId) -> Option<ChassisState> {
    let body = bodies.get(body_handle(id))?;
    Some(ChassisState {
        transform: iso3(body.position()),
        linvel: v3(body.linvel()),
        angvel: v3(body.angvel()),
        center_of_mass: p3(body.center_of_mass()),
        mass: body.mass(),
    })
}

/// Borrowed view of a rapier world that a controller ticks against.
pub struct RapierHost<'a> {
    pub bodies: &'a mut RigidBodySet,
    pub colliders: &'a ColliderSet,
    pub query_pipeline: &'a QueryPipeline,
}

impl RapierHost<'_> {
    /// Sweep `shape` from `origin` along unit `dir`; the hit's witness and
    /// normal are the ground's, in world space.
    fn cast_swept(
        &self,
        origin: Point<Real>,
        dir: Vector<Real>,
        rotation: Rotation<Real>,
        shape: &dyn Shape,
        length: Real,
        filter: QueryFilter,
    ) -> Option<CastHit> {
        let pose = Isometry::from_parts(Translation::from(origin.coords), rotation);
        let options = ShapeCastOptions {
            max_time_of_impact: length,
            target_distance: 0.0,
            stop_at_penetration: true,
            compute_impact_geometry_on_penetration: true,
        };
        let (_collider, hit) =
            self.query_pipeline
                .cast_shape(&*self.bodies, self.colliders, &pose, &dir, shape, options, filter)?;
        Some(CastHit {
            point: p3(&hit.witness1),
            normal: v3(&hit.normal1),
            fraction: hit.time_of_impact / length,
        })
    }
}

impl VehicleHost for RapierHost<'_> {
    fn chassis_state(&self, chassis: ChassisId) -> Option<ChassisState> {
        body_state(&*self.bodies, chassis)
    }

    fn cast_wheel(&self, chassis: ChassisId, _wheel_index: usize, ray: &WheelRay) -> Option<CastHit> {
        let origin = point![ray.origin.x, ray.origin.y, ray.origin.z];
        let dir = vector![ray.direction.x, ray.direction.y, ray.direction.z];
        let filter = QueryFilter::default().exclude_rigid_body(body_handle(chassis));

        match ray.kind {
            CastKind::Ray => {
                let (_collider, hit) = self.query_pipeline.cast_ray_and_get_normal(
                    &*self.bodies,
                    self.colliders,
                    &Ray::new(origin, dir),
                    ray.length,
                    true,
                    filter,
                )?;
                let point = origin + dir * hit.time_of_impact;
                Some(CastHit {
                    point: p3(&point),
                    normal: v3(&hit.normal),
                    fraction: hit.time_of_impact / ray.length,
                })
            }
            CastKind::Sphere { radius } => {
                self.cast_swept(origin, dir, Rotation::identity(), &Ball::new(radius), ray.length, filter)
            }
            CastKind::Cylinder => {
                // rapier cylinders stand along local y; lay it along the axle
                let axle = vector![ray.axle.x, ray.axle.y, ray.axle.z];
                let rotation = Rotation::rotation_between(&Vector::y(), &axle)
                    .unwrap_or_else(|| Rotation::from_axis_angle(&Vector::x_axis(), std::f32::consts::PI));
                let wheel = Cylinder::new(0.5 * ray.width, ray.radius);
                self.cast_swept(origin, dir, rotation, &wheel, ray.length, filter)
            }
        }
    }

    fn apply_impulse_at_point(
        &mut self,
        chassis: ChassisId,
        impulse: ::nalgebra::Vector3<f32>,
        point: ::nalgebra::Point3<f32>,
    ) {
        if let Some(body) = self.bodies.get_mut(body_handle(chassis)) {
            body.apply_impulse_at_point(
                vector![impulse.x, impulse.y, impulse.z],
                point![point.x, point.y, point.z],
                true,
            );
        }
    }
}

pub struct PhysicsWorld {
    pub gravity: Vector<Real>,
    pub integration_parameters: IntegrationParameters,
    pub pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    pub joints: ImpulseJointSet,
    pub multibody_joints: MultibodyJointSet,
    pub ccd: CCDSolver,
    pub query_pipeline: QueryPipeline,
    pub vehicles: HashMap<ChassisId, VehicleController>,
    /// Output of the most recent tick, per vehicle.
    pub last_impulses: HashMap<ChassisId, VehicleImpulses>,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsWorld {
    pub fn new() -> Self {
        let mut bodies = RigidBodySet::new();
        let mut colliders = ColliderSet::new();

        // 100 x 1 x 100 half extents, top face at y = 0
        let ground_handle = bodies.insert(RigidBodyBuilder::fixed().translation(vector![0.0, -1.0, 0.0]));
        let ground = ColliderBuilder::cuboid(100.0, 1.0, 100.0)
            .collision_groups(InteractionGroups::new(GROUP_GROUND, GROUP_MOVING))
            .friction(1.0)
            .restitution(0.0)
            .build();
        colliders.insert_with_parent(ground, ground_handle, &mut bodies);

        info!(bodies = bodies.len(), colliders = colliders.len(), "ground inserted");

        Self {
            gravity: vector![0.0, -9.81, 0.0],
            integration_parameters: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies,
            colliders,
            joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            vehicles: HashMap::new(),
            last_impulses: HashMap::new(),
        }
    }

    /// Insert a chassis body at `position` and build its controller.
    pub fn spawn_vehicle(
        &mut self,
        settings: VehicleSettings,
        chassis: &ChassisSettings,
        position: [f32; 3],
    ) -> Result<ChassisId, ConfigError> {
        // Validate before touching the world so a bad config leaves no body behind.
        settings.validate()?;

        let [x, y, z] = position;
        let rb = RigidBodyBuilder::dynamic()
            .translation(vector![x, y, z])
            .linear_damping(chassis.linear_damping)
            .angular_damping(chassis.angular_damping)
            .ccd_enabled(true)
            .build();
        let [hx, hy, hz] = chassis.half_extents;
        let collider = ColliderBuilder::cuboid(hx, hy, hz)
            .collision_groups(InteractionGroups::new(GROUP_MOVING, GROUP_GROUND | GROUP_MOVING))
            .mass_properties(chassis.mass_properties())
            .friction(0.5)
            .restitution(0.0)
            .build();

        let handle = self.bodies.insert(rb);
        self.colliders.insert_with_parent(collider, handle, &mut self.bodies);
        if let Some(body) = self.bodies.get_mut(handle) {
            body.recompute_mass_properties_from_colliders(&self.colliders);
        }

        let id = chassis_id(handle);
        let controller = VehicleController::new(id, settings)?;
        self.vehicles.insert(id, controller);
        info!(chassis = ?id, ?position, "vehicle spawned");
        Ok(id)
    }

    pub fn despawn_vehicle(&mut self, id: ChassisId) {
        self.vehicles.remove(&id);
        self.last_impulses.remove(&id);
        self.bodies.remove(
            body_handle(id),
            &mut self.island_manager,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            true,
        );
        info!(chassis = ?id, "vehicle despawned");
    }

    pub fn set_input(&mut self, id: ChassisId, input: DriverInput) {
        if let Some(controller) = self.vehicles.get_mut(&id) {
            controller.set_input(input);
        }
    }

    pub fn vehicle(&self, id: ChassisId) -> Option<&VehicleController> {
        self.vehicles.get(&id)
    }

    pub fn chassis_state(&self, id: ChassisId) -> Option<ChassisState> {
        body_state(&self.bodies, id)
    }

    fn tick_vehicles(&mut self, dt: Real) {
        self.query_pipeline.update(&self.colliders);

        let mut host = RapierHost {
            bodies: &mut self.bodies,
            colliders: &self.colliders,
            query_pipeline: &self.query_pipeline,
        };
        for (id, controller) in self.vehicles.iter_mut() {
            let out = controller.step(&mut host, dt);
            self.last_impulses.insert(*id, out);
        }
    }

    pub fn step(&mut self, dt: Real) {
        if !(dt > 0.0 && dt.is_finite()) {
            return;
        }

        // 1) + 2) wheels, drivetrain, tires
        self.tick_vehicles(dt);

        // 3) integrate
        self.integration_parameters.dt = dt;
        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );

        // 4) safety
        for (handle, body) in self.bodies.iter_mut() {
            let pos = *body.translation();
            let bad = !(pos.x.is_finite() && pos.y.is_finite() && pos.z.is_finite())
                || pos.x.abs() > WORLD_LIMIT
                || pos.y.abs() > WORLD_LIMIT
                || pos.z.abs() > WORLD_LIMIT;
            if bad {
                body.set_translation(vector![0.0, 1.0, 0.0], true);
                body.set_rotation(Rotation::identity(), true);
                body.set_linvel(vector![0.0, 0.0, 0.0], true);
                body.set_angvel(vector![0.0, 0.0, 0.0], true);
                warn!(chassis = ?chassis_id(handle), "reset runaway body to the origin");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_round_trips_through_chassis_id() {
        let mut world = PhysicsWorld::new();
        let id = world
            .spawn_vehicle(VehicleSettings::default(), &ChassisSettings::default(), [0.0, 1.0, 0.0])
            .unwrap();
        let handle = body_handle(id);
        assert!(world.bodies.get(handle).is_some());
        assert_eq!(chassis_id(handle), id);
    }

    #[test]
    fn bad_settings_leave_no_body_behind() {
        let mut world = PhysicsWorld::new();
        let before = world.bodies.len();
        let mut settings = VehicleSettings::default();
        settings.wheels.clear();
        assert!(world.spawn_vehicle(settings, &ChassisSettings::default(), [0.0, 1.0, 0.0]).is_err());
        assert_eq!(world.bodies.len(), before);
    }

    #[test]
    fn chassis_mass_matches_settings() {
        let mut world = PhysicsWorld::new();
        let id = world
            .spawn_vehicle(VehicleSettings::default(), &ChassisSettings::default(), [0.0, 1.0, 0.0])
            .unwrap();
        let state = world.chassis_state(id).unwrap();
        assert!((state.mass - 1500.0).abs() < 1e-2);
        // center of mass sits below the body origin
        assert!(state.center_of_mass.y < 1.0);
    }

    #[test]
    fn despawn_removes_body_and_controller() {
        let mut world = PhysicsWorld::new();
        let id = world
            .spawn_vehicle(VehicleSettings::default(), &ChassisSettings::default(), [0.0, 1.0, 0.0])
            .unwrap();
        world.despawn_vehicle(id);
        assert!(world.vehicle(id).is_none());
        assert!(world.chassis_state(id).is_none());
    }

    fn cast_from(world: &mut PhysicsWorld, id: ChassisId, kind: CastKind) -> (f32, CastHit) {
        world.query_pipeline.update(&world.colliders);
        let chassis = world.chassis_state(id).unwrap();
        let mut settings = world.vehicle(id).unwrap().wheels()[0].settings.clone();
        settings.cast = kind;
        let wheel = crate::vehicle::wheel::Wheel::new(settings);
        let ray = wheel.ray(&chassis);
        let host = RapierHost {
            bodies: &mut world.bodies,
            colliders: &world.colliders,
            query_pipeline: &world.query_pipeline,
        };
        let hit = host.cast_wheel(id, 0, &ray).unwrap();
        (ray.length, hit)
    }

    #[test]
    fn every_cast_kind_finds_the_ground_below_the_hub() {
        let mut world = PhysicsWorld::new();
        let id = world
            .spawn_vehicle(VehicleSettings::default(), &ChassisSettings::default(), [0.0, 0.85, 0.0])
            .unwrap();
        // attachment point 0.67 above the ground top face
        for kind in [CastKind::Ray, CastKind::Sphere { radius: 0.05 }, CastKind::Cylinder] {
            let (length, hit) = cast_from(&mut world, id, kind);
            let travel = kind.hub_travel(hit.fraction * length, 0.3);
            assert!((travel - 0.37).abs() < 1e-2, "{kind:?}: hub travel {travel}");
            assert!(hit.point.y.abs() < 1e-2, "{kind:?}: contact {:?}", hit.point);
            assert!(hit.normal.y > 0.99, "{kind:?}: normal {:?}", hit.normal);
        }
    }
}
