//! Chain inverse kinematics
//!
//! Chains are solved with cyclic coordinate descent (CCD): each pass walks the
//! chain from the effector's parent back to the chain root, turning every
//! joint so the effector swings toward the target.
//!
//! Two cases plain CCD handles badly get special treatment:
//!
//! - When the effector and target lie on the same line through a joint, the
//!   rotation axis is undefined. A non-root joint then bends so that the
//!   effector ends up as far from the previous chain joint as the target is,
//!   which lets that joint finish the job. The chain root turns half way
//!   round if the target is directly behind it.
//! - A pass that leaves the effector farther from the target than before is
//!   undone and solving stops, so the distance never grows between passes.

use crate::bone::Bone;
use crate::error::{AnimError, Result};
use crate::skeleton::Skeleton;
use crate::types::{BoneId, EPSILON, Transform};
use glam::{Quat, Vec3};
use std::f32::consts::PI;

/// Tolerance used when checking a solved pose against joint limits
const LIMIT_TOLERANCE: f32 = 1e-4;

/// How joint limits are enforced while solving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub enum ConstraintMode {
    /// Limits are ignored
    Disabled,
    /// Each joint step is clamped into its limits
    #[default]
    Clamp,
    /// Solve freely, then refuse any result that breaks a limit
    Reject,
}

/// Solver settings
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct IkConfig {
    /// Effector-to-target distance at which a chain counts as solved
    pub tolerance: f32,
    pub constraints: ConstraintMode,
}

impl Default for IkConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.01,
            constraints: ConstraintMode::default(),
        }
    }
}

/// Result of a solve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IkOutcome {
    /// Passes actually run
    pub iterations: usize,
    /// Final effector-to-target distance
    pub distance: f32,
    /// Whether the distance ended below the tolerance
    pub converged: bool,
}

/// A target solved every frame by [`Skeleton::animate`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IkRequest {
    pub target: Vec3,
    pub max_steps: usize,
}

impl Skeleton {
    pub fn ik_config(&self) -> &IkConfig {
        &self.ik_config
    }

    pub fn ik_config_mut(&mut self) -> &mut IkConfig {
        &mut self.ik_config
    }

    /// Register a chain, ordered from its root joint to the effector
    ///
    /// Each bone must be an ancestor of the one after it. Redefining a name
    /// replaces the previous chain.
    pub fn define_ik_chain(&mut self, name: impl Into<String>, bones: &[BoneId]) -> Result<()> {
        let name = name.into();

        for &id in bones {
            if self.bone(id).is_err() {
                return Err(AnimError::InvalidChain {
                    chain: name,
                    reason: format!("bone {id} does not exist"),
                });
            }
        }
        for pair in bones.windows(2) {
            if !self.is_ancestor(pair[0], pair[1]) {
                return Err(AnimError::InvalidChain {
                    chain: name,
                    reason: format!("bone {} is not an ancestor of bone {}", pair[0], pair[1]),
                });
            }
        }

        if self.ik_chains.insert(name.clone(), bones.to_vec()).is_some() {
            log::debug!("IK chain '{name}' redefined");
        }
        Ok(())
    }

    /// Register a chain by bone names
    pub fn define_ik_chain_by_names(&mut self, name: impl Into<String>, bones: &[&str]) -> Result<()> {
        let ids = bones
            .iter()
            .map(|bone| self.bone_id(bone))
            .collect::<Result<Vec<_>>>()?;
        self.define_ik_chain(name, &ids)
    }

    /// Bones of a registered chain
    pub fn ik_chain(&self, name: &str) -> Option<&[BoneId]> {
        self.ik_chains.get(name).map(Vec::as_slice)
    }

    fn solvable_chain(&self, chain: &str) -> Result<Vec<BoneId>> {
        let bones = self
            .ik_chains
            .get(chain)
            .ok_or_else(|| AnimError::UnknownChain(chain.to_string()))?;
        if bones.len() < 2 {
            return Err(AnimError::ChainTooShort {
                chain: chain.to_string(),
                len: bones.len(),
            });
        }
        Ok(bones.clone())
    }

    /// Solve a chain toward `target` right away, starting from the current pose
    ///
    /// Runs at most `max_steps` passes. The result stays in place until the
    /// next [`Skeleton::animate`] rebuilds the pose; use
    /// [`Skeleton::set_ik_target`] for a target that should hold every frame.
    pub fn compute_ik(&mut self, chain: &str, target: Vec3, max_steps: usize) -> Result<IkOutcome> {
        let bones = self.solvable_chain(chain)?;
        self.update_all_global_transforms();

        let original = self.chain_pose(&bones);
        let clamp = self.ik_config.constraints == ConstraintMode::Clamp;
        let tolerance = self.ik_config.tolerance;
        let effector = bones[bones.len() - 1];

        let mut distance = self.effector_distance(effector, target);
        let mut iterations = 0;

        while iterations < max_steps && distance >= tolerance {
            let before = self.chain_pose(&bones);
            for joint in (0..bones.len() - 1).rev() {
                self.rotate_joint(&bones, joint, target, clamp);
            }
            iterations += 1;

            let after = self.effector_distance(effector, target);
            if after > distance {
                log::trace!(
                    "IK chain '{chain}' pass {iterations} moved away from the target ({distance} -> {after}), reverting"
                );
                self.restore_chain_pose(&bones, &before);
                break;
            }
            distance = after;
        }

        if self.ik_config.constraints == ConstraintMode::Reject
            && let Some(bone) = self.violated_joint(&bones, &original)
        {
            let bone = bone.name.clone();
            self.restore_chain_pose(&bones, &original);
            return Err(AnimError::ConstraintViolation {
                chain: chain.to_string(),
                bone,
            });
        }

        let outcome = IkOutcome {
            iterations,
            distance,
            converged: distance < tolerance,
        };
        log::trace!("IK chain '{chain}': {outcome:?}");
        Ok(outcome)
    }

    /// Solve `chain` toward `target` on every [`Skeleton::animate`]
    ///
    /// Replaces any target already set for the chain.
    pub fn set_ik_target(&mut self, chain: &str, target: Vec3, max_steps: usize) -> Result<()> {
        self.solvable_chain(chain)?;
        let request = IkRequest { target, max_steps };

        match self.ik_requests.iter_mut().find(|(name, _)| name == chain) {
            Some((_, existing)) => *existing = request,
            None => self.ik_requests.push((chain.to_string(), request)),
        }
        Ok(())
    }

    /// Stop solving `chain` each frame, returning whether a target was set
    pub fn clear_ik_target(&mut self, chain: &str) -> bool {
        let before = self.ik_requests.len();
        self.ik_requests.retain(|(name, _)| name != chain);
        self.ik_requests.len() != before
    }

    /// Per-frame targets, in the order they are solved
    pub fn ik_targets(&self) -> impl Iterator<Item = (&str, &IkRequest)> {
        self.ik_requests.iter().map(|(name, r)| (name.as_str(), r))
    }

    pub(crate) fn solve_ik_requests(&mut self) {
        let requests = std::mem::take(&mut self.ik_requests);
        for (chain, request) in &requests {
            if let Err(e) = self.compute_ik(chain, request.target, request.max_steps) {
                log::warn!("IK target for chain '{chain}' not applied: {e}");
            }
        }
        self.ik_requests = requests;
    }

    fn effector_distance(&self, effector: BoneId, target: Vec3) -> f32 {
        self.bones[effector.index()].global_position().distance(target)
    }

    fn chain_pose(&self, bones: &[BoneId]) -> Vec<Transform> {
        bones.iter().map(|id| self.bones[id.index()].local).collect()
    }

    fn restore_chain_pose(&mut self, bones: &[BoneId], pose: &[Transform]) {
        for (id, local) in bones.iter().zip(pose) {
            self.bones[id.index()].local = *local;
        }
        let root = bones[0];
        let parent_global = self.parent_global(root);
        self.update_global_transforms(root, parent_global);
    }

    /// First joint whose rotation changed and now breaks its limits
    fn violated_joint(&self, bones: &[BoneId], original: &[Transform]) -> Option<&Bone> {
        bones[..bones.len() - 1]
            .iter()
            .zip(original)
            .map(|(id, before)| (&self.bones[id.index()], before))
            .find(|(bone, before)| {
                bone.local.rotation != before.rotation
                    && bone
                        .dof
                        .is_some_and(|dof| !dof.contains(bone.local.rotation, LIMIT_TOLERANCE))
            })
            .map(|(bone, _)| bone)
    }

    /// One CCD step at `bones[joint]`
    fn rotate_joint(&mut self, bones: &[BoneId], joint: usize, target: Vec3, clamp: bool) {
        let id = bones[joint];
        let effector = bones[bones.len() - 1];

        let joint_pos = self.bones[id.index()].global_position();
        let to_effector = self.bones[effector.index()].global_position() - joint_pos;
        let to_target = target - joint_pos;

        if to_effector.length() < EPSILON || to_target.length() < EPSILON {
            log::trace!("IK joint {id} skipped, degenerate direction");
            return;
        }

        let from = to_effector.normalize();
        let to = to_target.normalize();

        let world_rotation = if from.cross(to).length() > EPSILON {
            Quat::from_rotation_arc(from, to)
        } else if joint > 0 {
            let previous = self.bones[bones[joint - 1].index()].global_position();
            match bend_toward(previous, joint_pos, to_effector, target) {
                Some(rotation) => rotation,
                None => return,
            }
        } else if from.dot(to) < 0.0 {
            Quat::from_axis_angle(from.any_orthonormal_vector(), PI)
        } else {
            return;
        };

        let parent_rotation = self.parent_global(id).to_scale_rotation_translation().1;
        let bone = &mut self.bones[id.index()];
        let mut rotation =
            (parent_rotation.inverse() * world_rotation * parent_rotation * bone.local.rotation)
                .normalize();

        if clamp && let Some(dof) = bone.dof {
            rotation = dof.clamp(rotation);
        }
        bone.local.rotation = rotation;

        let parent_global = self.parent_global(id);
        self.update_global_transforms(id, parent_global);
    }
}

/// World rotation at `joint` that puts the effector at the target's distance from `previous`
///
/// Used when the effector and target are collinear with the joint, where the
/// usual CCD axis is undefined.
fn bend_toward(previous: Vec3, joint: Vec3, to_effector: Vec3, target: Vec3) -> Option<Quat> {
    let upper = joint - previous;
    let upper_len = upper.length();
    let lower_len = to_effector.length();
    if upper_len < EPSILON {
        return None;
    }

    let reach = target.distance(previous);
    let cos_want = ((reach * reach - upper_len * upper_len - lower_len * lower_len)
        / (2.0 * upper_len * lower_len))
        .clamp(-1.0, 1.0);
    let want = cos_want.acos();
    let current = upper
        .normalize()
        .dot(to_effector.normalize())
        .clamp(-1.0, 1.0)
        .acos();

    let delta = want - current;
    if delta.abs() < EPSILON {
        return None;
    }

    let axis = upper.cross(to_effector);
    let axis = if axis.length() > EPSILON {
        axis.normalize()
    } else {
        upper.normalize().any_orthonormal_vector()
    };
    Some(Quat::from_axis_angle(axis, delta))
}
