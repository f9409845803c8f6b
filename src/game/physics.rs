//! Physics world
//!
//! Thin owner of the rapier pipeline. Every collider and body created here
//! carries a `ColliderTag` in its `user_data`, which is how the room filter
//! and the coherence pass find the object (and the part of it) a physics
//! handle belongs to.

use rapier3d::prelude::*;

use crate::world::{Room, SECTOR_SIZE};
use super::object::ObjectId;

/// Thickness of floor and ceiling slabs
const SLAB_THICKNESS: Real = 256.0;

/// Part number of an object's root body and main collider
pub const ROOT_PART: u32 = 0;

/// Which object (and which piece of it) a physics handle belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColliderTag {
    pub object: ObjectId,
    pub part: u32,
}

impl ColliderTag {
    pub fn root(object: ObjectId) -> Self {
        Self { object, part: ROOT_PART }
    }

    pub fn part(object: ObjectId, part: u32) -> Self {
        Self { object, part }
    }

    /// Packed as `index + 1 | generation << 32 | part << 64`, so zero means untagged
    pub fn encode(self) -> u128 {
        (self.object.index() as u128 + 1)
            | (self.object.generation() as u128) << 32
            | (self.part as u128) << 64
    }

    pub fn decode(data: u128) -> Option<Self> {
        let index = (data & 0xffff_ffff) as u32;
        if index == 0 {
            return None;
        }
        let generation = (data >> 32 & 0xffff_ffff) as u32;
        let part = (data >> 64 & 0xffff_ffff) as u32;
        Some(Self { object: ObjectId::new(index - 1, generation), part })
    }
}

/// The simulated world: bodies, colliders, joints and the pipeline state.
pub struct PhysicsWorld {
    pub gravity: Vector<Real>,
    pub integration_parameters: IntegrationParameters,
    pub pipeline: PhysicsPipeline,
    pub islands: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    pub impulse_joints: ImpulseJointSet,
    pub multibody_joints: MultibodyJointSet,
    pub ccd_solver: CCDSolver,
    pub query_pipeline: QueryPipeline,
}

impl PhysicsWorld {
    /// `gravity` is the downward acceleration in units per second squared
    pub fn new(gravity: Real) -> Self {
        Self {
            gravity: vector![0.0, -gravity, 0.0],
            integration_parameters: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
        }
    }

    /// Integrate one step. `hooks` decides which candidate pairs are kept.
    pub fn step(&mut self, dt: Real, hooks: &dyn PhysicsHooks) {
        self.integration_parameters.dt = dt;
        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            hooks,
            &(),
        );
    }

    /// Bring the query pipeline up to date without stepping
    pub fn refresh_queries(&mut self) {
        self.query_pipeline.update(&self.colliders);
    }

    fn tagged(builder: ColliderBuilder, tag: ColliderTag) -> Collider {
        builder
            .user_data(tag.encode())
            .active_hooks(ActiveHooks::FILTER_CONTACT_PAIRS | ActiveHooks::FILTER_INTERSECTION_PAIR)
            .build()
    }

    /// Fixed body with a floor and ceiling slab per sector. Sectors linked to
    /// a room below or above stay open on that side.
    pub fn add_room_geometry(&mut self, room: &Room, tag: ColliderTag) -> RigidBodyHandle {
        let body = RigidBodyBuilder::fixed()
            .translation(room.origin())
            .user_data(tag.encode())
            .build();
        let handle = self.bodies.insert(body);

        let half = SECTOR_SIZE * 0.5;
        let slab = SLAB_THICKNESS * 0.5;
        for (x, z, sector) in room.iter_sectors() {
            let cx = (x as Real + 0.5) * SECTOR_SIZE;
            let cz = (z as Real + 0.5) * SECTOR_SIZE;
            if sector.sector_below.is_none() {
                let floor = ColliderBuilder::cuboid(half, slab, half)
                    .translation(vector![cx, sector.floor - slab, cz]);
                self.colliders.insert_with_parent(Self::tagged(floor, tag), handle, &mut self.bodies);
            }
            if sector.sector_above.is_none() {
                let ceiling = ColliderBuilder::cuboid(half, slab, half)
                    .translation(vector![cx, sector.ceiling + slab, cz]);
                self.colliders.insert_with_parent(Self::tagged(ceiling, tag), handle, &mut self.bodies);
            }
        }
        handle
    }

    pub fn add_fixed_box(
        &mut self,
        position: Vector<Real>,
        half_extents: Vector<Real>,
        tag: ColliderTag,
    ) -> (RigidBodyHandle, ColliderHandle) {
        let body = RigidBodyBuilder::fixed()
            .translation(position)
            .user_data(tag.encode())
            .build();
        let handle = self.bodies.insert(body);
        let collider = Self::tagged(ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z), tag);
        let collider = self.colliders.insert_with_parent(collider, handle, &mut self.bodies);
        (handle, collider)
    }

    /// Upright box body: dynamic (simulated) or kinematic (script/animation driven)
    pub fn add_body(
        &mut self,
        position: Vector<Real>,
        half_extents: Vector<Real>,
        kinematic: bool,
        linvel: Vector<Real>,
        tag: ColliderTag,
    ) -> (RigidBodyHandle, ColliderHandle) {
        let builder = if kinematic {
            RigidBodyBuilder::kinematic_position_based()
        } else {
            RigidBodyBuilder::dynamic().linvel(linvel).lock_rotations()
        };
        let handle = self.bodies.insert(
            builder
                .translation(position)
                .user_data(tag.encode())
                .build(),
        );
        let collider = Self::tagged(ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z), tag);
        let collider = self.colliders.insert_with_parent(collider, handle, &mut self.bodies);
        (handle, collider)
    }

    /// Kinematic ball that follows a bone
    pub fn add_bone_body(&mut self, position: Isometry<Real>, radius: Real, tag: ColliderTag) -> RigidBodyHandle {
        let handle = self.bodies.insert(
            RigidBodyBuilder::kinematic_position_based()
                .position(position)
                .user_data(tag.encode())
                .build(),
        );
        self.colliders.insert_with_parent(Self::tagged(ColliderBuilder::ball(radius), tag), handle, &mut self.bodies);
        handle
    }

    /// Parentless sensor ball, moved by hand every step
    pub fn add_ghost(&mut self, position: Isometry<Real>, radius: Real, tag: ColliderTag) -> ColliderHandle {
        let collider = Self::tagged(ColliderBuilder::ball(radius).sensor(true).position(position), tag);
        self.colliders.insert(collider)
    }

    /// Hang a chain of dynamic balls below `anchor`, each jointed to the one above.
    /// Parts are numbered from `first_part` upwards.
    pub fn add_chain(
        &mut self,
        anchor: RigidBodyHandle,
        links: usize,
        link_length: Real,
        radius: Real,
        object: ObjectId,
        first_part: u32,
    ) -> Vec<RigidBodyHandle> {
        let Some(start) = self.bodies.get(anchor).map(|b| *b.translation()) else {
            return Vec::new();
        };

        let mut handles = Vec::with_capacity(links);
        let mut parent = anchor;
        for i in 0..links {
            let tag = ColliderTag::part(object, first_part + i as u32);
            let position = start - vector![0.0, link_length * (i as Real + 1.0), 0.0];
            let handle = self.bodies.insert(
                RigidBodyBuilder::dynamic()
                    .translation(position)
                    .user_data(tag.encode())
                    .build(),
            );
            self.colliders.insert_with_parent(Self::tagged(ColliderBuilder::ball(radius), tag), handle, &mut self.bodies);

            let joint = SphericalJointBuilder::new()
                .local_anchor1(point![0.0, -link_length * 0.5, 0.0])
                .local_anchor2(point![0.0, link_length * 0.5, 0.0])
                .contacts_enabled(false);
            self.impulse_joints.insert(parent, handle, joint, true);

            handles.push(handle);
            parent = handle;
        }
        handles
    }

    pub fn remove_body(&mut self, handle: RigidBodyHandle) {
        self.bodies.remove(
            handle,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
    }

    pub fn remove_collider(&mut self, handle: ColliderHandle) {
        self.colliders.remove(handle, &mut self.islands, &mut self.bodies, false);
    }

    pub fn collider_tag(&self, handle: ColliderHandle) -> Option<ColliderTag> {
        ColliderTag::decode(self.colliders.get(handle)?.user_data)
    }

    pub fn body_tag(&self, handle: RigidBodyHandle) -> Option<ColliderTag> {
        ColliderTag::decode(self.bodies.get(handle)?.user_data)
    }

    pub fn body_translation(&self, handle: RigidBodyHandle) -> Option<Point<Real>> {
        self.bodies.get(handle).map(|b| Point::from(*b.translation()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{RoomGraph, RoomId, create_test_level};

    #[test]
    fn test_tag_encoding() {
        let tag = ColliderTag::part(ObjectId::new(0, 7), 3);
        assert_eq!(ColliderTag::decode(tag.encode()), Some(tag));
        assert_eq!(ColliderTag::decode(0), None);
        assert_eq!(ColliderTag::decode(ColliderTag::root(ObjectId::new(41, 0)).encode()).unwrap().object.index(), 41);
    }

    #[test]
    fn test_room_geometry_leaves_vertical_links_open() {
        let graph = RoomGraph::build(create_test_level().rooms, 16.0);
        let mut physics = PhysicsWorld::new(0.0);
        let tag = ColliderTag::root(ObjectId::new(0, 0));

        let a = physics.add_room_geometry(graph.room(RoomId(0)).unwrap(), tag);
        // 16 floors and 16 ceilings
        assert_eq!(physics.bodies.get(a).unwrap().colliders().len(), 32);

        // B has E stacked on top: floors only
        let b = physics.add_room_geometry(graph.room(RoomId(1)).unwrap(), tag);
        assert_eq!(physics.bodies.get(b).unwrap().colliders().len(), 16);
    }

    #[test]
    fn test_dynamic_body_falls() {
        let mut physics = PhysicsWorld::new(4500.0);
        let tag = ColliderTag::root(ObjectId::new(0, 0));
        let (body, collider) = physics.add_body(vector![0.0, 1000.0, 0.0], vector![10.0, 10.0, 10.0], false, Vector::zeros(), tag);

        physics.step(1.0 / 60.0, &());
        assert!(physics.body_translation(body).unwrap().y < 1000.0);
        assert_eq!(physics.collider_tag(collider), Some(tag));
        assert_eq!(physics.body_tag(body), Some(tag));
    }

    #[test]
    fn test_chain_hangs_below_anchor() {
        let mut physics = PhysicsWorld::new(0.0);
        let object = ObjectId::new(2, 0);
        let anchor = physics.add_bone_body(Isometry::translation(0.0, 500.0, 0.0), 8.0, ColliderTag::part(object, 1));
        let links = physics.add_chain(anchor, 3, 50.0, 5.0, object, 2);

        assert_eq!(links.len(), 3);
        assert_eq!(physics.impulse_joints.len(), 3);
        assert_eq!(physics.body_translation(links[2]).unwrap().y, 350.0);
        assert_eq!(physics.body_tag(links[0]).unwrap().part, 2);

        physics.remove_body(links[2]);
        assert_eq!(physics.impulse_joints.len(), 2);
    }
}
