//! Draw list
//!
//! Read-only snapshot of the last completed logic step, in world space.
//! The viewer (or any other renderer) draws from this instead of reaching
//! into the engine's physics and object state.

use rapier3d::prelude::*;

use crate::game::{Engine, ObjectData, ObjectId};
use crate::world::{Aabb, RoomId};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoomDraw {
    pub id: RoomId,
    pub bounds: Aabb,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticDraw {
    pub id: ObjectId,
    pub room: Option<RoomId>,
    pub position: Point<Real>,
    pub half_extents: Vector<Real>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityDraw {
    pub id: ObjectId,
    pub room: Option<RoomId>,
    pub root: Isometry<Real>,
    pub half_extents: Vector<Real>,
    /// World-space bones, blended between the last two poses
    pub bones: Vec<Isometry<Real>>,
}

#[derive(Debug, Clone, Default)]
pub struct DrawList {
    /// Active rooms only
    pub rooms: Vec<RoomDraw>,
    pub statics: Vec<StaticDraw>,
    pub entities: Vec<EntityDraw>,
    pub alpha: f32,
}

impl DrawList {
    pub fn build(engine: &Engine) -> Self {
        let Some(world) = engine.world() else {
            return Self::default();
        };
        let physics = engine.physics();
        let alpha = engine.clock().alpha().clamp(0.0, 1.0);

        let rooms = world.graph.rooms().iter()
            .filter(|r| r.active)
            .map(|r| RoomDraw { id: r.id, bounds: r.bounds })
            .collect();

        let mut statics = Vec::new();
        let mut entities = Vec::new();
        for object in world.objects.iter() {
            let Some(position) = object.body.and_then(|h| physics.bodies.get(h)).map(|b| *b.position()) else {
                continue;
            };
            let half_extents = object.collider
                .and_then(|h| physics.colliders.get(h))
                .and_then(|c| c.shape().as_cuboid())
                .map(|c| c.half_extents)
                .unwrap_or_else(Vector::zeros);

            match &object.data {
                ObjectData::StaticMesh(mesh) => {
                    // Statics of an inactive alternate are not drawn
                    if object.room.and_then(|r| world.graph.room(r)).is_some_and(|r| !r.active) {
                        continue;
                    }
                    statics.push(StaticDraw {
                        id: object.id,
                        room: object.room,
                        position: Point::from(position.translation.vector),
                        half_extents: mesh.half_extents,
                    });
                }
                ObjectData::Entity(entity) => {
                    let bones = match &entity.pose {
                        Some(pose) => (0..pose.bones.len())
                            .filter_map(|i| pose.interpolated_bone(i, pose.lerp))
                            .map(|bone| position * bone)
                            .collect(),
                        None => Vec::new(),
                    };
                    entities.push(EntityDraw {
                        id: object.id,
                        room: object.room,
                        root: position,
                        half_extents,
                        bones,
                    });
                }
                ObjectData::Room(_) => {}
            }
        }

        Self { rooms, statics, entities, alpha }
    }
}
