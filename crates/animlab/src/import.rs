//! Building skeletons from an imported scene
//!
//! Scene loaders hand over a node tree, the per-mesh bone weights and the
//! animation channels keyed by node name. Only nodes that matter for
//! skinning become bones: nodes referenced by the weight data plus their
//! ancestors below the declared root.

use crate::animation::{Animation, Keyframe, Track};
use crate::error::{AnimError, Result};
use crate::skeleton::Skeleton;
use crate::types::{BoneId, Transform, inverse_or_identity};
use glam::Mat4;
use std::collections::HashMap;

/// Maximum bone influences stored per vertex
pub const MAX_INFLUENCES: usize = 4;

/// A node of the imported scene graph
#[derive(Debug, Clone, PartialEq)]
pub struct SourceNode {
    pub name: String,
    /// Transform relative to the parent node
    pub transform: Mat4,
    pub children: Vec<SourceNode>,
}

impl SourceNode {
    pub fn new(name: impl Into<String>, transform: Mat4) -> Self {
        Self {
            name: name.into(),
            transform,
            children: Vec::new(),
        }
    }

    /// Append a child node
    pub fn with_child(mut self, child: SourceNode) -> Self {
        self.children.push(child);
        self
    }

    /// Find a node by name, depth first
    pub fn find(&self, name: &str) -> Option<&SourceNode> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(name))
    }
}

/// Weights of one bone over one mesh
#[derive(Debug, Clone, PartialEq)]
pub struct SourceBone {
    /// Name of the node this bone binds to
    pub name: String,
    /// Inverse bind matrix (mesh space to bone space)
    pub offset: Mat4,
    /// `(vertex, weight)` pairs, vertex indices local to the mesh
    pub weights: Vec<(usize, f32)>,
}

/// Bone weight data of one mesh
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceMesh {
    pub vertex_count: usize,
    pub bones: Vec<SourceBone>,
}

/// Keyframes for one node
#[derive(Debug, Clone, PartialEq)]
pub struct SourceChannel {
    pub bone_name: String,
    pub keyframes: Vec<Keyframe>,
}

/// An animation keyed by node name
#[derive(Debug, Clone, PartialEq)]
pub struct SourceAnimation {
    pub name: String,
    /// Duration in ticks
    pub duration: f64,
    /// Zero when the source leaves it unset
    pub ticks_per_second: f64,
    pub channels: Vec<SourceChannel>,
}

/// Import settings
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct ImportOptions {
    /// Name of the node to use as the root bone (scene root when None)
    pub root: Option<String>,
    /// Keep nodes that no weight references
    pub keep_helper_nodes: bool,
}

/// Up to [`MAX_INFLUENCES`] bone weights of one vertex
///
/// A slot is free while its weight is exactly zero.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VertexInfluence {
    pub bones: [u32; MAX_INFLUENCES],
    pub weights: [f32; MAX_INFLUENCES],
}

impl VertexInfluence {
    /// Store an influence in the first free slot
    ///
    /// Returns false when every slot is taken.
    pub fn add(&mut self, bone: BoneId, weight: f32) -> bool {
        match self.weights.iter().position(|&w| w == 0.0) {
            Some(slot) => {
                self.bones[slot] = bone.0;
                self.weights[slot] = weight;
                true
            }
            None => false,
        }
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.weights.iter().filter(|&&w| w != 0.0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of the stored weights
    pub fn total(&self) -> f32 {
        self.weights.iter().sum()
    }
}

/// Per-vertex bone weights across all meshes
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SkinWeights {
    /// One entry per vertex, meshes laid out back to back
    pub vertices: Vec<VertexInfluence>,
    /// Influences that did not fit and were discarded
    pub dropped: usize,
}

impl SkinWeights {
    fn with_vertices(count: usize) -> Self {
        Self {
            vertices: vec![VertexInfluence::default(); count],
            dropped: 0,
        }
    }
}

/// Output of [`import_skeleton`]
#[derive(Debug, Clone)]
pub struct ImportedModel {
    pub skeleton: Skeleton,
    pub weights: SkinWeights,
}

/// Node tree after pruning
struct KeptNode<'a> {
    node: &'a SourceNode,
    children: Vec<KeptNode<'a>>,
}

fn prune<'a>(
    node: &'a SourceNode,
    referenced: &HashMap<&str, Mat4>,
    keep_all: bool,
) -> Option<KeptNode<'a>> {
    let children: Vec<_> = node
        .children
        .iter()
        .filter_map(|child| prune(child, referenced, keep_all))
        .collect();

    if keep_all || referenced.contains_key(node.name.as_str()) || !children.is_empty() {
        Some(KeptNode { node, children })
    } else {
        log::trace!("Pruning helper node '{}'", node.name);
        None
    }
}

fn materialize(
    skeleton: &mut Skeleton,
    kept: &KeptNode<'_>,
    parent: Option<BoneId>,
) -> Result<()> {
    let id = skeleton.add_bone(
        kept.node.name.clone(),
        Transform::from_mat4(&kept.node.transform),
        parent,
    )?;
    for child in &kept.children {
        materialize(skeleton, child, Some(id))?;
    }
    Ok(())
}

/// Build a skeleton and packed vertex weights from an imported scene
///
/// Bones get ids in pre-order from the declared root. Nodes that no weight
/// references, and that have no referenced descendant, are left out unless
/// `keep_helper_nodes` is set. The root always becomes a bone.
pub fn import_skeleton(
    scene: &SourceNode,
    meshes: &[SourceMesh],
    options: &ImportOptions,
) -> Result<ImportedModel> {
    let root = match &options.root {
        Some(name) => scene
            .find(name)
            .ok_or_else(|| AnimError::MissingRoot(name.clone()))?,
        None => scene,
    };

    // First offset wins when several meshes bind the same node
    let mut referenced: HashMap<&str, Mat4> = HashMap::new();
    for bone in meshes.iter().flat_map(|mesh| &mesh.bones) {
        referenced.entry(bone.name.as_str()).or_insert(bone.offset);
    }

    let kept = prune(root, &referenced, options.keep_helper_nodes).unwrap_or(KeptNode {
        node: root,
        children: Vec::new(),
    });

    let mut skeleton = Skeleton::new();
    materialize(&mut skeleton, &kept, None)?;
    skeleton.set_global_inverse(inverse_or_identity(scene.transform));

    for (&name, &offset) in &referenced {
        let id = skeleton
            .bone_id(name)
            .map_err(|_| AnimError::UnknownBone(name.to_string()))?;
        skeleton.set_offset(id, offset)?;
    }

    // Unweighted bones skin to identity in the bind pose
    let global_inverse = skeleton.global_inverse();
    let unreferenced: Vec<_> = skeleton
        .bones()
        .iter()
        .filter(|bone| !referenced.contains_key(bone.name.as_str()))
        .map(|bone| (bone.id, inverse_or_identity(global_inverse * bone.global)))
        .collect();
    for (id, offset) in unreferenced {
        skeleton.set_offset(id, offset)?;
    }

    let weights = pack_weights(&skeleton, meshes)?;

    log::debug!(
        "Imported skeleton rooted at '{}' with {} bone(s), {} vertices",
        root.name,
        skeleton.bone_count(),
        weights.vertices.len()
    );

    Ok(ImportedModel { skeleton, weights })
}

fn pack_weights(skeleton: &Skeleton, meshes: &[SourceMesh]) -> Result<SkinWeights> {
    let total = meshes.iter().map(|mesh| mesh.vertex_count).sum();
    let mut packed = SkinWeights::with_vertices(total);

    let mut base = 0;
    for mesh in meshes {
        for bone in &mesh.bones {
            let id = skeleton
                .bone_id(&bone.name)
                .map_err(|_| AnimError::UnknownBone(bone.name.clone()))?;

            for &(vertex, weight) in &bone.weights {
                if vertex >= mesh.vertex_count {
                    return Err(AnimError::VertexOutOfRange {
                        bone: bone.name.clone(),
                        vertex,
                        count: mesh.vertex_count,
                    });
                }
                if weight == 0.0 {
                    continue;
                }
                if !packed.vertices[base + vertex].add(id, weight) {
                    packed.dropped += 1;
                }
            }
        }
        base += mesh.vertex_count;
    }

    if packed.dropped > 0 {
        log::warn!(
            "{} bone influence(s) dropped, vertices hold at most {MAX_INFLUENCES}",
            packed.dropped
        );
    }

    Ok(packed)
}

impl Skeleton {
    /// Add an animation whose channels are keyed by bone name
    ///
    /// Channels for names that are not bones of this skeleton are skipped.
    /// Returns the new animation's index.
    pub fn load_animation(&mut self, source: &SourceAnimation) -> Result<usize> {
        let mut tracks = HashMap::new();

        for channel in &source.channels {
            let Ok(id) = self.bone_id(&channel.bone_name) else {
                log::debug!(
                    "Animation '{}': channel '{}' does not drive a bone, skipped",
                    source.name,
                    channel.bone_name
                );
                continue;
            };

            let track = Track::new(channel.keyframes.clone());
            track
                .validate(source.duration)
                .map_err(|reason| AnimError::MalformedKeyframes {
                    animation: source.name.clone(),
                    bone: channel.bone_name.clone(),
                    reason,
                })?;
            tracks.insert(id, track);
        }

        let animation = Animation::new(
            source.name.clone(),
            source.duration,
            source.ticks_per_second,
            tracks,
        )?;
        Ok(self.add_animation(animation))
    }
}
