use crate::{config::ConfigPath, ChainName, H160};

/// A policy tree that must not be deployed or evaluated. `path` points at the
/// offending node from the root of the tree.
#[derive(Debug, thiserror::Error)]
pub enum IsmConfigError {
    /// Threshold of zero would accept anything
    #[error("Threshold must be at least 1 (at `{path}`)")]
    ZeroThreshold {
        /// Offending node
        path: ConfigPath,
    },
    /// Threshold can never be reached
    #[error("Threshold {threshold} exceeds the {cardinality} available (at `{path}`)")]
    ThresholdExceedsCardinality {
        /// Offending node
        path: ConfigPath,
        /// Configured threshold
        threshold: u8,
        /// Number of validators or modules
        cardinality: usize,
    },
    /// Multisig without validators
    #[error("Multisig has no validators (at `{path}`)")]
    NoValidators {
        /// Offending node
        path: ConfigPath,
    },
    /// Aggregation without modules
    #[error("Aggregation has no modules (at `{path}`)")]
    NoModules {
        /// Offending node
        path: ConfigPath,
    },
    /// The same validator listed twice
    #[error("Validator {validator:?} already enrolled (at `{path}`)")]
    DuplicateValidator {
        /// Offending node
        path: ConfigPath,
        /// The repeated validator
        validator: H160,
    },
    /// The zero address can never sign
    #[error("Zero address is not a valid validator (at `{path}`)")]
    ZeroValidator {
        /// Offending node
        path: ConfigPath,
    },
    /// Nesting beyond what can be evaluated
    #[error("Module nesting exceeds the maximum depth of {max} (at `{path}`)")]
    TooDeep {
        /// Offending node
        path: ConfigPath,
        /// Maximum accepted depth
        max: usize,
    },
    /// No owner configured for a chain of the topology
    #[error("No owner configured for chain {0}")]
    MissingOwner(ChainName),
    /// Persisted configuration is not a valid policy document
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Evaluating a policy tree did not produce a verdict.
#[derive(Debug, thiserror::Error)]
pub enum IsmError {
    /// A routing module has no route for the message's origin
    #[error("No route configured for origin {origin}")]
    NoRoute {
        /// The origin that was looked up
        origin: ChainName,
    },
    /// The evidence does not fit the module being evaluated
    #[error("Malformed evidence: {0}")]
    MalformedEvidence(String),
    /// The tree is deeper than evaluation allows
    #[error("Module nesting exceeds the maximum depth of {0}")]
    MaxDepthExceeded(usize),
    /// A node with a zero threshold
    #[error("Module at depth {depth} has a zero threshold")]
    ZeroThreshold {
        /// Depth of the node
        depth: usize,
    },
}
