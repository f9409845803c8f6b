//! Entities: animated, simulated world objects
//!
//! An entity owns its animation state machine and the handles of every
//! secondary physics object that follows its skeleton. The root rigid body
//! lives on the owning `WorldObject`.

use rapier3d::prelude::*;

use super::pose::{SkeletalModel, SkeletalPose};

/// Kinematic body driven by a bone of the pose
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneAttachment {
    pub bone: usize,
    pub body: RigidBodyHandle,
}

/// Sensor collider that shadows a bone, for triggers and queries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GhostProxy {
    pub bone: usize,
    pub collider: ColliderHandle,
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub enabled: bool,
    /// Fully simulated; the pose layer does not touch it
    pub physics_driven: bool,
    /// Current animation state. States map one to one onto model animations.
    pub state: u16,
    /// Requested state, applied at the start of the next step
    pub next_state: Option<u16>,
    /// Desired horizontal velocity, units per second
    pub move_intent: Option<Vector<Real>>,
    /// Index into the level's model list
    pub model: Option<usize>,
    pub pose: Option<SkeletalPose>,
    pub attachments: Vec<BoneAttachment>,
    pub ghosts: Vec<GhostProxy>,
    /// Secondary chain links, root first
    pub chain: Vec<RigidBodyHandle>,
}

impl Entity {
    pub fn new(model: Option<(usize, &SkeletalModel)>) -> Self {
        Self {
            enabled: true,
            physics_driven: false,
            state: 0,
            next_state: None,
            move_intent: None,
            model: model.map(|(i, _)| i),
            pose: model.map(|(_, m)| SkeletalPose::new(m)),
            attachments: Vec::new(),
            ghosts: Vec::new(),
            chain: Vec::new(),
        }
    }

    /// Per-step logic: apply a pending state change and the movement intent.
    pub fn frame(&mut self, body: Option<&mut RigidBody>, model: Option<&SkeletalModel>, dt: Real) {
        if let Some(next) = self.next_state.take() {
            if next != self.state {
                let accepted = match (self.pose.as_mut(), model) {
                    (Some(pose), Some(model)) => pose.set_animation(model, next as usize),
                    _ => true,
                };
                if accepted {
                    self.state = next;
                } else {
                    tracing::debug!(state = next, "no animation for requested state");
                }
            }
        }

        let (Some(body), Some(intent)) = (body, self.move_intent) else { return };
        if body.is_kinematic() {
            let target = body.translation() + vector![intent.x, 0.0, intent.z] * dt;
            body.set_next_kinematic_translation(target);
        } else if body.is_dynamic() {
            let vertical = body.linvel().y;
            body.set_linvel(vector![intent.x, vertical, intent.z], true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::create_test_level;

    #[test]
    fn test_state_change_queues_animation() {
        let level = create_test_level();
        let model = &level.models[0];
        let mut entity = Entity::new(Some((0, model)));

        entity.next_state = Some(1);
        entity.frame(None, Some(model), 1.0 / 60.0);
        assert_eq!(entity.state, 1);
        assert!(entity.next_state.is_none());

        let pose = entity.pose.as_mut().unwrap();
        pose.advance(model);
        assert_eq!(pose.animation, 1);
    }

    #[test]
    fn test_unknown_state_is_rejected() {
        let level = create_test_level();
        let model = &level.models[0];
        let mut entity = Entity::new(Some((0, model)));

        entity.next_state = Some(40);
        entity.frame(None, Some(model), 1.0 / 60.0);
        assert_eq!(entity.state, 0);
    }

    #[test]
    fn test_intent_keeps_vertical_velocity() {
        let mut body = RigidBodyBuilder::dynamic().linvel(vector![0.0, -300.0, 0.0]).build();
        let mut entity = Entity::new(None);
        entity.move_intent = Some(vector![500.0, 999.0, 0.0]);

        entity.frame(Some(&mut body), None, 1.0 / 60.0);
        assert_eq!(*body.linvel(), vector![500.0, -300.0, 0.0]);
    }

    #[test]
    fn test_no_intent_leaves_body_alone() {
        let mut body = RigidBodyBuilder::dynamic().linvel(vector![10.0, 0.0, 0.0]).build();
        let mut entity = Entity::new(None);

        entity.frame(Some(&mut body), None, 1.0 / 60.0);
        assert_eq!(*body.linvel(), vector![10.0, 0.0, 0.0]);
    }
}
