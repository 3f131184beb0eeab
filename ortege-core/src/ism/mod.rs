//! Interchain security modules: the policy tree deciding whether an inbound
//! message is authentic, its validation, evaluation and construction.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{config::ConfigPath, utils::keccak256, ChainMap, H160, H256};

pub use builder::*;
pub use error::*;
pub use evaluator::*;

mod builder;
mod error;
mod evaluator;

/// Maximum nesting of modules accepted in a policy tree.
pub const ISM_MAX_DEPTH: usize = 13;

/// Numeric module type reported by deployed modules.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[repr(u8)]
pub enum ModuleType {
    /// INVALID ISM
    #[default]
    Unused = 0,
    /// Routing ISM (defers to another ISM)
    Routing = 1,
    /// Aggregation ISM (aggregates multiple ISMs)
    Aggregation = 2,
    /// Legacy ISM (validators in calldata, set commitment in storage)
    LegacyMultisig = 3,
    /// Merkle Proof ISM (batching and censorship resistance)
    MerkleRootMultisig = 4,
    /// Message ID ISM (cheapest multisig with no batching)
    MessageIdMultisig = 5,
}

/// A set of validators and how many of them must sign.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigIsmConfig {
    /// Validator addresses; order is preserved, duplicates are invalid
    pub validators: Vec<H160>,
    /// Number of distinct validator signatures required
    pub threshold: u8,
}

impl MultisigIsmConfig {
    /// Commitment to the validator set, keccak256(threshold || validators)
    /// with each validator left-padded to 32 bytes.
    pub fn commitment(&self) -> H256 {
        let mut packed = Vec::with_capacity(1 + 32 * self.validators.len());
        packed.push(self.threshold);
        for validator in &self.validators {
            packed.extend_from_slice(H256::from(*validator).as_bytes());
        }
        keccak256(packed)
    }

    fn validate_at(&self, path: &ConfigPath) -> Result<(), IsmConfigError> {
        if self.validators.is_empty() {
            return Err(IsmConfigError::NoValidators { path: path.clone() });
        }
        check_threshold(path, self.threshold, self.validators.len())?;
        let mut seen = HashSet::with_capacity(self.validators.len());
        for validator in &self.validators {
            if validator.is_zero() {
                return Err(IsmConfigError::ZeroValidator { path: path.clone() });
            }
            if !seen.insert(*validator) {
                return Err(IsmConfigError::DuplicateValidator {
                    path: path.clone(),
                    validator: *validator,
                });
            }
        }
        Ok(())
    }
}

/// `threshold` of `modules` must accept a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationIsmConfig {
    /// Child modules
    pub modules: Vec<IsmConfig>,
    /// Number of children that must accept
    pub threshold: u8,
}

/// Picks a module by the origin chain of the message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingIsmConfig {
    /// Owner allowed to change the routes
    pub owner: H160,
    /// Module per origin chain
    pub domains: ChainMap<IsmConfig>,
}

/// A node of the policy tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum IsmConfig {
    /// Validators sign the merkle root checkpoint
    MerkleRootMultisig(MultisigIsmConfig),
    /// Validators sign the checkpoint together with the message id
    MessageIdMultisig(MultisigIsmConfig),
    /// m-of-n over child modules
    Aggregation(AggregationIsmConfig),
    /// Origin-keyed dispatch to child modules
    Routing(RoutingIsmConfig),
}

impl IsmConfig {
    /// Parse a persisted policy and validate it.
    pub fn from_json(json: &str) -> Result<Self, IsmConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// The module type a deployment of this node reports.
    pub fn module_type(&self) -> ModuleType {
        match self {
            Self::MerkleRootMultisig(_) => ModuleType::MerkleRootMultisig,
            Self::MessageIdMultisig(_) => ModuleType::MessageIdMultisig,
            Self::Aggregation(_) => ModuleType::Aggregation,
            Self::Routing(_) => ModuleType::Routing,
        }
    }

    /// Check every node of the tree: thresholds within `1..=cardinality`,
    /// non-empty validator and module lists, no duplicate or zero
    /// validators and a depth of at most `ISM_MAX_DEPTH`.
    pub fn validate(&self) -> Result<(), IsmConfigError> {
        self.validate_at(&ConfigPath::default(), 1)
    }

    pub(crate) fn validate_at(&self, path: &ConfigPath, depth: usize) -> Result<(), IsmConfigError> {
        if depth > ISM_MAX_DEPTH {
            return Err(IsmConfigError::TooDeep {
                path: path.clone(),
                max: ISM_MAX_DEPTH,
            });
        }
        match self {
            Self::MerkleRootMultisig(multisig) | Self::MessageIdMultisig(multisig) => {
                multisig.validate_at(path)
            }
            Self::Aggregation(aggregation) => {
                if aggregation.modules.is_empty() {
                    return Err(IsmConfigError::NoModules { path: path.clone() });
                }
                check_threshold(path, aggregation.threshold, aggregation.modules.len())?;
                let modules_path = path.join("modules");
                aggregation
                    .modules
                    .iter()
                    .enumerate()
                    .try_for_each(|(i, module)| module.validate_at(&modules_path.index(i), depth + 1))
            }
            Self::Routing(routing) => {
                let domains_path = path.join("domains");
                routing.domains.iter().try_for_each(|(chain, module)| {
                    module.validate_at(&domains_path.join(chain.as_str()), depth + 1)
                })
            }
        }
    }

    /// Number of levels in the tree, a lone multisig being 1.
    pub fn depth(&self) -> usize {
        match self {
            Self::MerkleRootMultisig(_) | Self::MessageIdMultisig(_) => 1,
            Self::Aggregation(aggregation) => {
                1 + aggregation.modules.iter().map(Self::depth).max().unwrap_or(0)
            }
            Self::Routing(routing) => {
                1 + routing.domains.values().map(Self::depth).max().unwrap_or(0)
            }
        }
    }
}

fn check_threshold(path: &ConfigPath, threshold: u8, cardinality: usize) -> Result<(), IsmConfigError> {
    if threshold == 0 {
        return Err(IsmConfigError::ZeroThreshold { path: path.clone() });
    }
    if usize::from(threshold) > cardinality {
        return Err(IsmConfigError::ThresholdExceedsCardinality {
            path: path.clone(),
            threshold,
            cardinality,
        });
    }
    Ok(())
}
