use thiserror::Error;

/// Error types for skeleton import, lookups and IK solving
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnimError {
    /// The declared root node is not present in the node tree
    #[error("Import error: root node '{0}' not found")]
    MissingRoot(String),

    /// Two materialized nodes share a bone name
    #[error("Import error: duplicate bone name '{0}'")]
    DuplicateBone(String),

    /// Mesh weight data references a node that is not part of the hierarchy
    #[error("Import error: weighted bone '{0}' is not in the node hierarchy")]
    UnknownBone(String),

    /// A bone weight targets a vertex outside its mesh
    #[error("Import error: bone '{bone}' weights vertex {vertex}, but the mesh has {count} vertices")]
    VertexOutOfRange {
        bone: String,
        vertex: usize,
        count: usize,
    },

    /// A second parentless bone was added to a skeleton
    #[error("Import error: skeleton already has root bone '{existing}', cannot add root '{name}'")]
    MultipleRoots { existing: String, name: String },

    /// Keyframe times are not finite, not strictly increasing, or exceed the duration
    #[error("Import error: animation '{animation}', bone '{bone}': {reason}")]
    MalformedKeyframes {
        animation: String,
        bone: String,
        reason: String,
    },

    /// No bone with this name
    #[error("Lookup error: unknown bone name '{0}'")]
    UnknownBoneName(String),

    /// No bone with this id
    #[error("Lookup error: unknown bone id {0}")]
    UnknownBoneId(u32),

    /// No IK chain registered under this name
    #[error("Lookup error: unknown IK chain '{0}'")]
    UnknownChain(String),

    /// Animation index past the end of the loaded animations
    #[error("Lookup error: animation index {index} out of range ({count} loaded)")]
    UnknownAnimation { index: usize, count: usize },

    /// No animation registered under this name
    #[error("Lookup error: unknown animation '{0}'")]
    UnknownAnimationName(String),

    /// Chain bones do not form a root-to-effector path in the hierarchy
    #[error("Lookup error: invalid IK chain '{chain}': {reason}")]
    InvalidChain { chain: String, reason: String },

    /// CCD needs at least one joint plus the effector
    #[error("Lookup error: IK chain '{chain}' has {len} bone(s), at least 2 are required")]
    ChainTooShort { chain: String, len: usize },

    /// The solved pose broke a joint limit and the solver is set to reject
    #[error("IK chain '{chain}' solution violates the limits of bone '{bone}'")]
    ConstraintViolation { chain: String, bone: String },
}

impl AnimError {
    /// Errors raised while building a skeleton or its animations
    pub fn is_import_error(&self) -> bool {
        matches!(
            self,
            Self::MissingRoot(_)
                | Self::DuplicateBone(_)
                | Self::UnknownBone(_)
                | Self::VertexOutOfRange { .. }
                | Self::MultipleRoots { .. }
                | Self::MalformedKeyframes { .. }
        )
    }

    /// Errors raised by a query or command naming something that does not exist
    pub fn is_lookup_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownBoneName(_)
                | Self::UnknownBoneId(_)
                | Self::UnknownChain(_)
                | Self::UnknownAnimation { .. }
                | Self::UnknownAnimationName(_)
                | Self::InvalidChain { .. }
                | Self::ChainTooShort { .. }
        )
    }
}

/// Result type using AnimError
pub type Result<T> = std::result::Result<T, AnimError>;
