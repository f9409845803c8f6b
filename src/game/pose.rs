//! Skeletal poses and the per-step pose layer
//!
//! A `SkeletalModel` is the shared rig (bone hierarchy plus keyframed
//! animations). Each animated entity owns a `SkeletalPose`: the current and
//! previous animation frame and the model-space bone transforms for both, so
//! the renderer can interpolate between the last two logic steps.
//!
//! `update_poses` runs once per logic step, at the end of pre-tick. It
//! advances every animated entity by one frame and pushes the new bone
//! transforms into the physics world: kinematic bodies attached to bones get
//! their next kinematic position, which the following integration reaches,
//! and ghost proxies are moved directly. Chains jointed to those bodies are
//! dragged along by the same integration.

use rapier3d::na::{Isometry3, Translation3, UnitQuaternion, Vector3};
use rapier3d::prelude::*;
use serde::{Serialize, Deserialize};

use super::physics::PhysicsWorld;
use super::registry::{ObjectData, ObjectRegistry};

/// Bone of a skeletal rig. Parents always precede their children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bone {
    pub parent: Option<usize>,
    /// Bind offset from the parent bone
    pub offset: [f32; 3],
}

/// Per-bone keyframe: extra translation plus euler rotation (roll, pitch, yaw)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoneKey {
    pub offset: [f32; 3],
    pub rotation: [f32; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Animation {
    /// One key per bone for every frame
    pub frames: Vec<Vec<BoneKey>>,
    /// Animation that plays once the last frame is reached
    pub next_animation: usize,
    pub next_frame: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkeletalModel {
    pub bones: Vec<Bone>,
    pub animations: Vec<Animation>,
}

impl SkeletalModel {
    /// Model-space transform of every bone for one animation frame.
    /// Missing animations or frames fall back to the bind pose.
    pub fn bone_transforms(&self, animation: usize, frame: usize) -> Vec<Isometry3<Real>> {
        let keys = self.animations
            .get(animation)
            .and_then(|a| a.frames.get(frame));

        let mut out: Vec<Isometry3<Real>> = Vec::with_capacity(self.bones.len());
        for (i, bone) in self.bones.iter().enumerate() {
            let key = keys.and_then(|k| k.get(i));
            let offset = Vector3::from(bone.offset)
                + key.map(|k| Vector3::from(k.offset)).unwrap_or_else(Vector3::zeros);
            let rotation = key
                .map(|k| UnitQuaternion::from_euler_angles(k.rotation[0], k.rotation[1], k.rotation[2]))
                .unwrap_or_else(UnitQuaternion::identity);
            let local = Isometry3::from_parts(Translation3::from(offset), rotation);

            let model_space = match bone.parent.and_then(|p| out.get(p)) {
                Some(parent) => parent * local,
                None => local,
            };
            out.push(model_space);
        }
        out
    }

    fn frame_count(&self, animation: usize) -> usize {
        self.animations.get(animation).map_or(0, |a| a.frames.len())
    }
}

/// Animation playback state of one entity
#[derive(Debug, Clone, PartialEq)]
pub struct SkeletalPose {
    pub prev_animation: usize,
    pub prev_frame: usize,
    pub animation: usize,
    pub frame: usize,
    /// Render-time interpolation fraction between previous and current frame
    pub lerp: f32,
    /// Model-space bone transforms of the current frame
    pub bones: Vec<Isometry3<Real>>,
    pub prev_bones: Vec<Isometry3<Real>>,
    /// Animation to switch to on the next advance
    pending: Option<usize>,
}

impl SkeletalPose {
    pub fn new(model: &SkeletalModel) -> Self {
        let bones = model.bone_transforms(0, 0);
        Self {
            prev_animation: 0,
            prev_frame: 0,
            animation: 0,
            frame: 0,
            lerp: 0.0,
            prev_bones: bones.clone(),
            bones,
            pending: None,
        }
    }

    /// Queue a switch to `animation`, starting at its first frame on the next
    /// advance. Returns false if the model has no such animation.
    pub fn set_animation(&mut self, model: &SkeletalModel, animation: usize) -> bool {
        if model.frame_count(animation) == 0 {
            return false;
        }
        self.pending = Some(animation);
        true
    }

    /// Step one animation frame. The previous fields take the old current ones.
    pub fn advance(&mut self, model: &SkeletalModel) {
        self.prev_animation = self.animation;
        self.prev_frame = self.frame;

        if let Some(next) = self.pending.take() {
            self.animation = next;
            self.frame = 0;
        } else if self.frame + 1 < model.frame_count(self.animation) {
            self.frame += 1;
        } else if let Some(anim) = model.animations.get(self.animation) {
            self.animation = anim.next_animation;
            self.frame = anim.next_frame;
        }

        let bones = model.bone_transforms(self.animation, self.frame);
        self.prev_bones = std::mem::replace(&mut self.bones, bones);
    }

    /// Bone transform blended between the previous and current frame
    pub fn interpolated_bone(&self, bone: usize, alpha: f32) -> Option<Isometry3<Real>> {
        let current = self.bones.get(bone)?;
        let previous = self.prev_bones.get(bone).unwrap_or(current);
        Some(previous.lerp_slerp(current, alpha.clamp(0.0, 1.0)))
    }
}

/// Advance every animated entity one frame and sync its secondary bodies.
pub fn update_poses(objects: &mut ObjectRegistry, models: &[SkeletalModel], physics: &mut PhysicsWorld) {
    for object in objects.iter_mut() {
        let root_body = object.body;
        let ObjectData::Entity(entity) = &mut object.data else { continue };
        if !entity.enabled || entity.physics_driven {
            continue;
        }
        let Some(model) = entity.model.and_then(|m| models.get(m)) else { continue };
        let Some(pose) = entity.pose.as_mut() else { continue };

        pose.advance(model);

        // Where the root ends up after this step's integration
        let root = root_body
            .and_then(|h| physics.bodies.get(h))
            .map(|b| *b.next_position())
            .unwrap_or_else(Isometry::identity);

        for attachment in &entity.attachments {
            let Some(bone) = pose.bones.get(attachment.bone) else { continue };
            if let Some(body) = physics.bodies.get_mut(attachment.body) {
                body.set_next_kinematic_position(root * bone);
            }
        }
        for ghost in &entity.ghosts {
            let Some(bone) = pose.bones.get(ghost.bone) else { continue };
            if let Some(collider) = physics.colliders.get_mut(ghost.collider) {
                collider.set_position(root * bone);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::create_test_level;

    fn test_model() -> SkeletalModel {
        create_test_level().models.remove(0)
    }

    #[test]
    fn test_child_bone_inherits_parent() {
        let model = test_model();
        let bones = model.bone_transforms(0, 1);
        assert_eq!(bones[0].translation.vector, Vector3::zeros());
        // bind offset 256 plus key offset 16
        assert!((bones[1].translation.vector.y - 272.0).abs() < 1e-4);
    }

    #[test]
    fn test_previous_lags_current_by_one_step() {
        let model = test_model();
        let mut pose = SkeletalPose::new(&model);

        pose.advance(&model);
        assert_eq!((pose.prev_animation, pose.prev_frame), (0, 0));
        assert_eq!((pose.animation, pose.frame), (0, 1));

        // Last frame wraps into the next animation
        pose.advance(&model);
        assert_eq!((pose.prev_animation, pose.prev_frame), (0, 1));
        assert_eq!((pose.animation, pose.frame), (0, 0));
    }

    #[test]
    fn test_animation_switch_waits_for_advance() {
        let model = test_model();
        let mut pose = SkeletalPose::new(&model);

        assert!(pose.set_animation(&model, 1));
        assert!(!pose.set_animation(&model, 9));
        assert_eq!(pose.animation, 0);

        pose.advance(&model);
        assert_eq!((pose.prev_animation, pose.animation, pose.frame), (0, 1, 0));
        pose.advance(&model);
        pose.advance(&model);
        pose.advance(&model);
        // Crouch has three frames, then falls back to idle
        assert_eq!((pose.prev_animation, pose.animation), (1, 0));
    }

    #[test]
    fn test_interpolated_bone() {
        let model = test_model();
        let mut pose = SkeletalPose::new(&model);
        pose.advance(&model);

        let halfway = pose.interpolated_bone(1, 0.5).unwrap();
        assert!((halfway.translation.vector.y - 264.0).abs() < 1e-3);
        let end = pose.interpolated_bone(1, 1.0).unwrap();
        assert!((end.translation.vector - pose.bones[1].translation.vector).norm() < 1e-3);
        assert!(pose.interpolated_bone(5, 0.5).is_none());
    }
}
