//! Room-based collision filtering
//!
//! Rooms may overlap in world space (stacked floors, flipped alternates), so
//! the broad phase alone would let geometry of one room touch objects of an
//! unrelated one. `RoomFilter` is handed to every physics step and drops any
//! candidate pair whose rooms are not near each other. Scene queries apply
//! the same rule through `accept_query_hit`.

use rapier3d::parry::query::ShapeCastOptions;
use rapier3d::prelude::*;

use crate::world::{RoomGraph, RoomId};
use super::object::ObjectId;
use super::physics::{ColliderTag, PhysicsWorld};
use super::registry::ObjectRegistry;

/// What the filter knows about one side of a candidate pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairSide {
    pub object: Option<ObjectId>,
    pub room: Option<RoomId>,
    pub dynamic: bool,
}

/// Pair policy:
/// 1. same object: only two dynamic bodies may touch (chain links, ragdoll parts)
/// 2. both sides roomless: accept
/// 3. both rooms known and near: accept
/// 4. anything else (one side roomless, or far rooms): reject
pub fn accept_pair(graph: &RoomGraph, a: &PairSide, b: &PairSide) -> bool {
    if a.object.is_some() && a.object == b.object {
        return a.dynamic && b.dynamic;
    }
    match (a.room, b.room) {
        (None, None) => true,
        (Some(ra), Some(rb)) => graph.are_near(ra, rb),
        _ => false,
    }
}

/// Scene query policy: a hit counts when either room is unknown or the rooms are near
pub fn accept_query_hit(graph: &RoomGraph, origin: Option<RoomId>, hit: Option<RoomId>) -> bool {
    match (origin, hit) {
        (Some(a), Some(b)) => graph.are_near(a, b),
        _ => true,
    }
}

/// Collision hooks passed to `PhysicsWorld::step`.
/// Borrows the graph and registry immutably for the whole step.
pub struct RoomFilter<'a> {
    pub graph: &'a RoomGraph,
    pub objects: &'a ObjectRegistry,
}

impl RoomFilter<'_> {
    fn side(&self, colliders: &ColliderSet, bodies: &RigidBodySet, collider: ColliderHandle, body: Option<RigidBodyHandle>) -> PairSide {
        let object = colliders.get(collider)
            .and_then(|c| ColliderTag::decode(c.user_data))
            .map(|tag| tag.object);
        PairSide {
            object,
            room: object.and_then(|id| self.objects.room_of(id)),
            dynamic: body.and_then(|h| bodies.get(h)).is_some_and(|b| b.is_dynamic()),
        }
    }

    fn accept(&self, context: &PairFilterContext) -> bool {
        let a = self.side(context.colliders, context.bodies, context.collider1, context.rigid_body1);
        let b = self.side(context.colliders, context.bodies, context.collider2, context.rigid_body2);
        accept_pair(self.graph, &a, &b)
    }
}

impl PhysicsHooks for RoomFilter<'_> {
    fn filter_contact_pair(&self, context: &PairFilterContext) -> Option<SolverFlags> {
        self.accept(context).then_some(SolverFlags::COMPUTE_IMPULSES)
    }

    fn filter_intersection_pair(&self, context: &PairFilterContext) -> bool {
        self.accept(context)
    }
}

/// Who is asking, and what to leave out
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOrigin {
    /// Colliders of this object are never hit
    pub object: Option<ObjectId>,
    /// Room the query starts in; unresolved rooms accept every hit
    pub room: Option<RoomId>,
    /// Skip sensor colliders (ghost proxies)
    pub skip_ghosts: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub collider: ColliderHandle,
    pub object: Option<ObjectId>,
    pub toi: Real,
    pub point: Point<Real>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvexHit {
    pub collider: ColliderHandle,
    pub object: Option<ObjectId>,
    pub toi: Real,
    pub normal: Vector<Real>,
}

fn accept_collider(
    graph: &RoomGraph,
    objects: &ObjectRegistry,
    origin: &QueryOrigin,
    collider: &Collider,
) -> bool {
    if origin.skip_ghosts && collider.is_sensor() {
        return false;
    }
    let hit = ColliderTag::decode(collider.user_data).map(|t| t.object);
    if hit.is_some() && hit == origin.object {
        return false;
    }
    accept_query_hit(graph, origin.room, hit.and_then(|id| objects.room_of(id)))
}

/// Closest accepted ray hit within `max_toi`
pub fn cast_ray(
    physics: &PhysicsWorld,
    graph: &RoomGraph,
    objects: &ObjectRegistry,
    origin: &QueryOrigin,
    ray: &Ray,
    max_toi: Real,
) -> Option<RayHit> {
    let predicate = |_: ColliderHandle, collider: &Collider| accept_collider(graph, objects, origin, collider);
    let filter = QueryFilter::default().predicate(&predicate);

    let (collider, toi) = physics.query_pipeline.cast_ray(
        &physics.bodies,
        &physics.colliders,
        ray,
        max_toi,
        true,
        filter,
    )?;
    Some(RayHit {
        collider,
        object: physics.collider_tag(collider).map(|t| t.object),
        toi,
        point: ray.point_at(toi),
    })
}

/// Sweep `shape` from `position` along `velocity` for at most `max_toi` seconds
#[allow(clippy::too_many_arguments)]
pub fn cast_convex(
    physics: &PhysicsWorld,
    graph: &RoomGraph,
    objects: &ObjectRegistry,
    origin: &QueryOrigin,
    shape: &dyn Shape,
    position: &Isometry<Real>,
    velocity: &Vector<Real>,
    max_toi: Real,
) -> Option<ConvexHit> {
    let predicate = |_: ColliderHandle, collider: &Collider| accept_collider(graph, objects, origin, collider);
    let filter = QueryFilter::default().predicate(&predicate);

    let (collider, hit) = physics.query_pipeline.cast_shape(
        &physics.bodies,
        &physics.colliders,
        position,
        velocity,
        shape,
        ShapeCastOptions::with_max_time_of_impact(max_toi),
        filter,
    )?;
    Some(ConvexHit {
        collider,
        object: physics.collider_tag(collider).map(|t| t.object),
        toi: hit.time_of_impact,
        normal: hit.normal1.into_inner(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::create_test_level;

    fn graph() -> RoomGraph {
        RoomGraph::build(create_test_level().rooms, 16.0)
    }

    fn side(object: u32, room: Option<u32>, dynamic: bool) -> PairSide {
        PairSide {
            object: Some(ObjectId::new(object, 0)),
            room: room.map(RoomId),
            dynamic,
        }
    }

    #[test]
    fn test_rejects_far_rooms() {
        let graph = graph();
        assert!(!accept_pair(&graph, &side(0, Some(0), true), &side(1, Some(2), true)));
        assert!(accept_pair(&graph, &side(0, Some(0), true), &side(1, Some(1), false)));
        assert!(accept_pair(&graph, &side(0, Some(2), true), &side(1, Some(2), false)));
    }

    #[test]
    fn test_roomless_sides() {
        let graph = graph();
        assert!(accept_pair(&graph, &side(0, None, true), &side(1, None, true)));
        assert!(!accept_pair(&graph, &side(0, None, true), &side(1, Some(0), true)));
        // Queries are lenient where contacts are strict
        assert!(accept_query_hit(&graph, None, Some(RoomId(0))));
        assert!(accept_query_hit(&graph, Some(RoomId(2)), None));
        assert!(!accept_query_hit(&graph, Some(RoomId(0)), Some(RoomId(2))));
    }

    #[test]
    fn test_self_collision_needs_two_dynamic_bodies() {
        let graph = graph();
        assert!(accept_pair(&graph, &side(4, Some(0), true), &side(4, Some(0), true)));
        assert!(!accept_pair(&graph, &side(4, Some(0), true), &side(4, Some(0), false)));
        assert!(!accept_pair(&graph, &side(4, None, false), &side(4, None, false)));
    }

    #[test]
    fn test_alternate_pair_never_collides() {
        let graph = graph();
        assert!(!accept_pair(&graph, &side(0, Some(0), true), &side(1, Some(3), true)));
    }
}
