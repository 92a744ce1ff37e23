//! Skeleton: bone table, animations, controller and IK chains
//!
//! The skeleton owns every bone and animation it holds. Bones live in a flat
//! table indexed by [`BoneId`]; parent and child links are ids, so the tree
//! can be walked without shared ownership.
//!
//! Each call to [`Skeleton::animate`] runs the frame pipeline in a fixed
//! order:
//!
//! 1. the animation controller advances (transitions, blend weights, timers)
//! 2. every bone is reset to its bind pose, then active animations are
//!    sampled and blended by weight
//! 3. registered IK targets are solved
//! 4. global transforms are propagated from the root

use crate::animation::{
    Animation, AnimationCommand, AnimationController, ControllerConfig, TransitionType,
};
use crate::bone::{Bone, DofLimits};
use crate::error::{AnimError, Result};
use crate::ik::{IkConfig, IkRequest};
use crate::types::{Blend, BoneId, Transform, inverse_or_identity};
use glam::{Mat4, Vec3};
use std::collections::HashMap;
use std::fmt;

/// A bone hierarchy with its animations
#[derive(Debug, Clone, Default)]
pub struct Skeleton {
    pub(crate) bones: Vec<Bone>,
    name_to_id: HashMap<String, BoneId>,
    root: Option<BoneId>,
    animations: Vec<Animation>,
    animation_names: HashMap<String, usize>,
    controller: AnimationController,
    pub(crate) ik_chains: HashMap<String, Vec<BoneId>>,
    pub(crate) ik_requests: Vec<(String, IkRequest)>,
    pub(crate) ik_config: IkConfig,
    global_inverse: Mat4,
}

impl Skeleton {
    /// Create an empty skeleton with default configuration
    pub fn new() -> Self {
        Self::with_config(ControllerConfig::default(), IkConfig::default())
    }

    /// Create an empty skeleton with explicit controller and solver settings
    pub fn with_config(controller: ControllerConfig, ik: IkConfig) -> Self {
        Self {
            bones: Vec::new(),
            name_to_id: HashMap::new(),
            root: None,
            animations: Vec::new(),
            animation_names: HashMap::new(),
            controller: AnimationController::new(controller),
            ik_chains: HashMap::new(),
            ik_requests: Vec::new(),
            ik_config: ik,
            global_inverse: Mat4::IDENTITY,
        }
    }

    /// Add a bone below `parent` (or as the root when `parent` is None)
    ///
    /// Ids are handed out in insertion order. The bone's global transform and
    /// inverse bind matrix are derived from its parent straight away.
    pub fn add_bone(
        &mut self,
        name: impl Into<String>,
        bind: Transform,
        parent: Option<BoneId>,
    ) -> Result<BoneId> {
        let name = name.into();
        if self.name_to_id.contains_key(&name) {
            return Err(AnimError::DuplicateBone(name));
        }

        let parent_global = match parent {
            Some(parent_id) => self.bone(parent_id)?.global,
            None => {
                if let Some(root) = self.root() {
                    return Err(AnimError::MultipleRoots {
                        existing: root.name.clone(),
                        name,
                    });
                }
                Mat4::IDENTITY
            }
        };

        let id = BoneId::new(self.bones.len() as u32);
        let mut bone = Bone::new(id, name.clone(), bind, parent);
        bone.global = parent_global * bind.to_mat4();
        bone.offset = inverse_or_identity(bone.global);

        match parent {
            Some(parent_id) => self.bones[parent_id.index()].children.push(id),
            None => self.root = Some(id),
        }
        self.name_to_id.insert(name, id);
        self.bones.push(bone);

        Ok(id)
    }

    /// All bones, indexed by id
    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    /// The root bone, if any bones exist
    pub fn root(&self) -> Option<&Bone> {
        self.root.and_then(|id| self.bones.get(id.index()))
    }

    pub fn root_id(&self) -> Option<BoneId> {
        self.root
    }

    /// Look up a bone by id
    pub fn bone(&self, id: BoneId) -> Result<&Bone> {
        self.bones
            .get(id.index())
            .ok_or(AnimError::UnknownBoneId(id.0))
    }

    /// Look up a bone by name
    pub fn bone_by_name(&self, name: &str) -> Result<&Bone> {
        let id = self.bone_id(name)?;
        self.bone(id)
    }

    /// Resolve a bone name to its id
    pub fn bone_id(&self, name: &str) -> Result<BoneId> {
        self.name_to_id
            .get(name)
            .copied()
            .ok_or_else(|| AnimError::UnknownBoneName(name.to_string()))
    }

    fn bone_mut(&mut self, id: BoneId) -> Result<&mut Bone> {
        self.bones
            .get_mut(id.index())
            .ok_or(AnimError::UnknownBoneId(id.0))
    }

    /// Overwrite a bone's current local transform
    ///
    /// The next [`Skeleton::animate`] rebuilds the pose from the bind pose,
    /// so this only lasts until then.
    pub fn set_local(&mut self, id: BoneId, local: Transform) -> Result<()> {
        self.bone_mut(id)?.local = local;
        Ok(())
    }

    /// Replace a bone's bind pose
    pub fn set_bind(&mut self, id: BoneId, bind: Transform) -> Result<()> {
        self.bone_mut(id)?.bind = bind;
        Ok(())
    }

    /// Set the inverse bind matrix used for skinning
    pub fn set_offset(&mut self, id: BoneId, offset: Mat4) -> Result<()> {
        self.bone_mut(id)?.offset = offset;
        Ok(())
    }

    /// Set or clear a bone's joint limits
    pub fn set_dof_limits(&mut self, id: BoneId, limits: Option<DofLimits>) -> Result<()> {
        self.bone_mut(id)?.dof = limits;
        Ok(())
    }

    /// Inverse of the scene root transform, applied to every skinning matrix
    pub fn global_inverse(&self) -> Mat4 {
        self.global_inverse
    }

    pub fn set_global_inverse(&mut self, global_inverse: Mat4) {
        self.global_inverse = global_inverse;
    }

    /// Check whether `ancestor` lies on the parent chain of `bone`
    pub fn is_ancestor(&self, ancestor: BoneId, bone: BoneId) -> bool {
        let mut cursor = self.bones.get(bone.index()).and_then(|b| b.parent);
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            cursor = self.bones.get(id.index()).and_then(|b| b.parent);
        }
        false
    }

    /// Register an animation, returning its index
    pub fn add_animation(&mut self, animation: Animation) -> usize {
        let index = self.animations.len();
        if self.animation_names.contains_key(animation.name()) {
            log::warn!(
                "Animation name '{}' is already taken, index {index} is reachable by index only",
                animation.name()
            );
        } else {
            self.animation_names
                .insert(animation.name().to_string(), index);
        }
        self.animations.push(animation);
        index
    }

    pub fn animations(&self) -> &[Animation] {
        &self.animations
    }

    /// Look up an animation by index
    pub fn animation(&self, index: usize) -> Result<&Animation> {
        self.animations
            .get(index)
            .ok_or(AnimError::UnknownAnimation {
                index,
                count: self.animations.len(),
            })
    }

    /// Resolve an animation name to its index
    pub fn animation_index(&self, name: &str) -> Result<usize> {
        self.animation_names
            .get(name)
            .copied()
            .ok_or_else(|| AnimError::UnknownAnimationName(name.to_string()))
    }

    pub fn controller(&self) -> &AnimationController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut AnimationController {
        &mut self.controller
    }

    /// Queue an animation change
    pub fn add_to_animation_queue(
        &mut self,
        animation: usize,
        looping: bool,
        blend_duration: f64,
        transition: TransitionType,
    ) -> Result<()> {
        let command = AnimationCommand {
            animation,
            looping,
            blend_duration,
            transition,
        };
        self.controller.enqueue(command, self.animations.len())
    }

    pub fn clear_animation_queue(&mut self) {
        self.controller.clear_queue();
    }

    /// Timer of the current animation in ticks (0 when idle)
    pub fn animation_timer(&self) -> f64 {
        self.controller
            .current()
            .and_then(|index| self.animations.get(index))
            .map_or(0.0, Animation::timer)
    }

    pub fn is_idle(&self) -> bool {
        self.controller.is_idle()
    }

    /// Advance the skeleton by `dt` seconds and rebuild the pose
    pub fn animate(&mut self, dt: f64) {
        self.controller.update(dt, &mut self.animations);
        self.sample_pose();

        if !self.ik_requests.is_empty() {
            self.update_all_global_transforms();
            self.solve_ik_requests();
        }

        self.update_all_global_transforms();
    }

    /// Rebuild every local transform from the bind pose and active animations
    fn sample_pose(&mut self) {
        let active = self.controller.active(&self.animations);
        let animations = &self.animations;

        let pose = |index: usize, bone: &Bone| -> Transform {
            animations
                .get(index)
                .and_then(|anim| anim.sample(bone.id))
                .map_or(bone.bind, |p| p.to_transform(&bone.bind))
        };

        for bone in &mut self.bones {
            bone.local = match active.as_slice() {
                [] => bone.bind,
                [(index, weight)] => bone.bind.blend(&pose(*index, bone), *weight),
                [(a, wa), (b, wb), ..] => {
                    let total = wa + wb;
                    pose(*a, bone).blend(&pose(*b, bone), wb / total)
                }
            };
        }
    }

    /// Propagate `parent_global` down the subtree rooted at `id`
    ///
    /// Each bone gets `global = parent_global * local`, then its children are
    /// visited in order with the bone's global as their parent transform.
    pub fn update_global_transforms(&mut self, id: BoneId, parent_global: Mat4) {
        let mut stack = vec![(id, parent_global)];

        while let Some((id, parent_global)) = stack.pop() {
            let Some(bone) = self.bones.get_mut(id.index()) else {
                continue;
            };
            bone.global = parent_global * bone.local.to_mat4();

            let global = bone.global;
            stack.extend(bone.children.iter().rev().map(|&child| (child, global)));
        }
    }

    /// Propagate global transforms from the root with an identity parent
    pub fn update_all_global_transforms(&mut self) {
        if let Some(root) = self.root {
            self.update_global_transforms(root, Mat4::IDENTITY);
        }
    }

    /// Global transform of a bone's parent (identity for the root)
    pub(crate) fn parent_global(&self, id: BoneId) -> Mat4 {
        self.bones
            .get(id.index())
            .and_then(|b| b.parent)
            .and_then(|p| self.bones.get(p.index()))
            .map_or(Mat4::IDENTITY, |p| p.global)
    }

    /// Skinning matrix for one bone
    pub fn skinning_matrix(&self, id: BoneId) -> Result<Mat4> {
        Ok(self.bone(id)?.skinning_matrix(&self.global_inverse))
    }

    /// Skinning matrices for all bones, indexed by id
    pub fn skinning_matrices(&self) -> Vec<Mat4> {
        self.bones
            .iter()
            .map(|b| b.skinning_matrix(&self.global_inverse))
            .collect()
    }

    /// Skinning matrices as a flat column-major array for GPU upload
    ///
    /// Each bone contributes 16 floats.
    pub fn skinning_data(&self) -> Vec<f32> {
        let mut data = Vec::with_capacity(self.bones.len() * 16);
        for bone in &self.bones {
            data.extend_from_slice(&bone.skinning_matrix(&self.global_inverse).to_cols_array());
        }
        data
    }

    /// Parent-to-child joint positions, for drawing the skeleton as lines
    pub fn bone_segments(&self) -> Vec<(Vec3, Vec3)> {
        self.bones
            .iter()
            .filter_map(|bone| {
                let parent = self.bones.get(bone.parent?.index())?;
                Some((parent.global_position(), bone.global_position()))
            })
            .collect()
    }

    /// Write the hierarchy to the debug log
    pub fn log_hierarchy(&self) {
        for line in self.to_string().lines() {
            log::debug!("{line}");
        }
    }
}

impl fmt::Display for Skeleton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(root) = self.root else {
            return Ok(());
        };

        let mut stack = vec![(root, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            let Some(bone) = self.bones.get(id.index()) else {
                continue;
            };
            writeln!(f, "{:indent$}{} ({})", "", bone.name, bone.id, indent = depth * 2)?;
            stack.extend(bone.children.iter().rev().map(|&child| (child, depth + 1)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{Keyframe, Track};
    use glam::Quat;
    use pretty_assertions::assert_eq;
    use std::f32::consts::FRAC_PI_2;

    fn arm() -> Skeleton {
        let mut skeleton = Skeleton::new();
        let shoulder = skeleton
            .add_bone("shoulder", Transform::from_translation(Vec3::new(1.0, 0.0, 0.0)), None)
            .unwrap();
        let elbow = skeleton
            .add_bone(
                "elbow",
                Transform::from_translation(Vec3::new(0.0, 1.0, 0.0)),
                Some(shoulder),
            )
            .unwrap();
        skeleton
            .add_bone(
                "wrist",
                Transform::from_translation(Vec3::new(0.0, 1.0, 0.0)),
                Some(elbow),
            )
            .unwrap();
        skeleton
    }

    fn bend(skeleton: &Skeleton, angle: f32) -> Animation {
        let elbow = skeleton.bone_id("elbow").unwrap();
        let track = Track::new(vec![
            Keyframe::new(0.0, Vec3::new(0.0, 1.0, 0.0), Quat::IDENTITY),
            Keyframe::new(1.0, Vec3::new(0.0, 1.0, 0.0), Quat::from_rotation_z(angle)),
        ]);
        Animation::new(
            format!("bend{angle}"),
            1.0,
            1.0,
            HashMap::from([(elbow, track)]),
        )
        .unwrap()
    }

    #[test]
    fn test_add_bone_assigns_ids() {
        let skeleton = arm();
        assert_eq!(skeleton.bone_count(), 3);
        assert_eq!(skeleton.bone_id("shoulder").unwrap(), BoneId::new(0));
        assert_eq!(skeleton.bone_id("wrist").unwrap(), BoneId::new(2));
        assert_eq!(skeleton.root_id(), Some(BoneId::new(0)));
        assert_eq!(skeleton.bones()[1].children, vec![BoneId::new(2)]);
        assert_eq!(skeleton.bones()[2].parent, Some(BoneId::new(1)));
    }

    #[test]
    fn test_add_bone_errors() {
        let mut skeleton = arm();
        let err = skeleton
            .add_bone("elbow", Transform::IDENTITY, Some(BoneId::new(0)))
            .unwrap_err();
        assert_eq!(err, AnimError::DuplicateBone("elbow".into()));

        let err = skeleton.add_bone("hips", Transform::IDENTITY, None).unwrap_err();
        assert!(matches!(err, AnimError::MultipleRoots { .. }));

        let err = skeleton
            .add_bone("finger", Transform::IDENTITY, Some(BoneId::new(42)))
            .unwrap_err();
        assert_eq!(err, AnimError::UnknownBoneId(42));
        assert_eq!(skeleton.bone_count(), 3);
    }

    #[test]
    fn test_zero_scale_bind_skins_without_nan() {
        let mut skeleton = arm();
        let wrist = skeleton.bone_id("wrist").unwrap();
        let helper = skeleton
            .add_bone(
                "helper",
                Transform::new(Vec3::X, Quat::IDENTITY, Vec3::ZERO),
                Some(wrist),
            )
            .unwrap();

        assert_eq!(skeleton.bone(helper).unwrap().offset, Mat4::IDENTITY);
        skeleton.animate(0.0);
        assert!(skeleton.skinning_matrices().iter().all(Mat4::is_finite));
        assert!(skeleton.skinning_data().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_lookup_errors() {
        let skeleton = arm();
        assert!(skeleton.bone_by_name("tail").unwrap_err().is_lookup_error());
        assert!(skeleton.bone(BoneId::new(9)).unwrap_err().is_lookup_error());
        assert!(skeleton.animation(0).unwrap_err().is_lookup_error());
        assert!(skeleton.animation_index("run").unwrap_err().is_lookup_error());
    }

    #[test]
    fn test_global_transforms_compose() {
        let mut skeleton = arm();
        let shoulder = skeleton.bone_id("shoulder").unwrap();
        skeleton
            .set_local(
                shoulder,
                Transform::from_translation_rotation(
                    Vec3::new(1.0, 0.0, 0.0),
                    Quat::from_rotation_z(FRAC_PI_2),
                ),
            )
            .unwrap();
        skeleton.update_all_global_transforms();

        for bone in skeleton.bones() {
            let expected = skeleton.parent_global(bone.id) * bone.local.to_mat4();
            assert!(bone.global.abs_diff_eq(expected, 1e-6));
        }

        let wrist = skeleton.bone_by_name("wrist").unwrap().global_position();
        assert!(wrist.abs_diff_eq(Vec3::new(-1.0, 0.0, 0.0), 1e-5));
    }

    #[test]
    fn test_bind_pose_skinning_is_identity() {
        let skeleton = arm();
        for matrix in skeleton.skinning_matrices() {
            assert!(matrix.abs_diff_eq(Mat4::IDENTITY, 1e-5));
        }
        assert_eq!(skeleton.skinning_data().len(), 3 * 16);
    }

    #[test]
    fn test_animate_samples_pose() {
        let mut skeleton = arm();
        let index = skeleton.add_animation(bend(&skeleton, FRAC_PI_2));
        skeleton
            .add_to_animation_queue(index, false, 0.0, TransitionType::Immediate)
            .unwrap();

        skeleton.animate(0.0);
        skeleton.animate(0.5);

        let h = std::f32::consts::FRAC_1_SQRT_2;
        let wrist = skeleton.bone_by_name("wrist").unwrap().global_position();
        assert!(wrist.abs_diff_eq(Vec3::new(1.0 - h, 1.0 + h, 0.0), 1e-5));
        assert!((skeleton.animation_timer() - 0.5).abs() < 1e-9);

        // Finished one-shot clips fade out and the pose returns to bind
        skeleton.animate(0.5);
        let wrist = skeleton.bone_by_name("wrist").unwrap().global_position();
        assert!(wrist.abs_diff_eq(Vec3::new(1.0, 2.0, 0.0), 1e-5));
        assert!(skeleton.is_idle());
        assert_eq!(skeleton.animation_timer(), 0.0);
    }

    #[test]
    fn test_animate_zero_is_idempotent() {
        let mut skeleton = arm();
        let index = skeleton.add_animation(bend(&skeleton, 1.0));
        skeleton
            .add_to_animation_queue(index, true, 0.0, TransitionType::Immediate)
            .unwrap();
        skeleton.animate(0.0);
        skeleton.animate(0.3);

        let snapshot: Vec<_> = skeleton.bones().iter().map(|b| (b.local, b.global)).collect();
        for _ in 0..5 {
            skeleton.animate(0.0);
        }
        let after: Vec<_> = skeleton.bones().iter().map(|b| (b.local, b.global)).collect();
        assert_eq!(snapshot, after);
    }

    #[test]
    fn test_blend_mixes_two_animations() {
        let mut skeleton = arm();
        let a = skeleton.add_animation(bend(&skeleton, 0.0));
        let b = skeleton.add_animation(bend(&skeleton, 1.0));
        skeleton
            .add_to_animation_queue(a, false, 0.0, TransitionType::Immediate)
            .unwrap();
        skeleton
            .add_to_animation_queue(b, false, 1.0, TransitionType::Smooth)
            .unwrap();

        skeleton.animate(0.0);
        skeleton.animate(0.0);
        skeleton.animate(0.5);

        // Both clips sampled at 0.5 ticks; b rotates 0.5 rad, a holds identity
        let elbow = skeleton.bone_by_name("elbow").unwrap();
        let expected = Quat::IDENTITY.slerp(Quat::from_rotation_z(0.5), 0.5);
        assert!(elbow.local.rotation.dot(expected).abs() > 0.9999);
    }

    #[test]
    fn test_untracked_bones_keep_bind_pose() {
        let mut skeleton = arm();
        let index = skeleton.add_animation(bend(&skeleton, 1.0));
        skeleton
            .add_to_animation_queue(index, true, 0.0, TransitionType::Immediate)
            .unwrap();
        skeleton.animate(0.0);
        skeleton.animate(0.5);

        let wrist = skeleton.bone_by_name("wrist").unwrap();
        assert_eq!(wrist.local, wrist.bind);
    }

    #[test]
    fn test_bone_segments() {
        let skeleton = arm();
        let segments = skeleton.bone_segments();
        assert_eq!(segments.len(), 2);
        assert!(segments[0].0.abs_diff_eq(Vec3::new(1.0, 0.0, 0.0), 1e-6));
        assert!(segments[0].1.abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-6));
    }

    #[test]
    fn test_display_hierarchy() {
        let skeleton = arm();
        assert_eq!(
            skeleton.to_string(),
            "shoulder (#0)\n  elbow (#1)\n    wrist (#2)\n"
        );
    }

    #[test]
    fn test_is_ancestor() {
        let skeleton = arm();
        let (s, e, w) = (BoneId::new(0), BoneId::new(1), BoneId::new(2));
        assert!(skeleton.is_ancestor(s, w));
        assert!(skeleton.is_ancestor(e, w));
        assert!(!skeleton.is_ancestor(w, s));
        assert!(!skeleton.is_ancestor(s, s));
    }

    #[test]
    fn test_duplicate_animation_names() {
        let mut skeleton = arm();
        let first = skeleton.add_animation(bend(&skeleton, 1.0));
        let second = skeleton.add_animation(bend(&skeleton, 1.0));
        assert_eq!(skeleton.animation_index("bend1").unwrap(), first);
        assert_eq!(skeleton.animation(second).unwrap().name(), "bend1");
    }
}
