use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{config::ConfigPath, ChainMap, ChainName, OwnerMap, H160};

use super::{AggregationIsmConfig, IsmConfig, IsmConfigError, MultisigIsmConfig, RoutingIsmConfig};

/// Produces the module a routing ISM uses for messages from `remote`.
pub trait LeafFactory {
    /// Build the route for `remote`, whose validators are `validators`.
    fn leaf(&self, remote: &ChainName, validators: &MultisigIsmConfig) -> IsmConfig;
}

impl<F> LeafFactory for F
where
    F: Fn(&ChainName, &MultisigIsmConfig) -> IsmConfig,
{
    fn leaf(&self, remote: &ChainName, validators: &MultisigIsmConfig) -> IsmConfig {
        self(remote, validators)
    }
}

/// Which digest the validators of a bare multisig route sign.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MultisigLeaf {
    /// Merkle root checkpoints
    MerkleRoot,
    /// Checkpoints with the message id
    #[default]
    MessageId,
}

impl LeafFactory for MultisigLeaf {
    fn leaf(&self, _remote: &ChainName, validators: &MultisigIsmConfig) -> IsmConfig {
        match self {
            Self::MerkleRoot => IsmConfig::MerkleRootMultisig(validators.clone()),
            Self::MessageId => IsmConfig::MessageIdMultisig(validators.clone()),
        }
    }
}

/// Routes to an aggregation of both multisig variants over the same
/// validators, either of which is enough.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AggregatedMultisigLeaf;

impl LeafFactory for AggregatedMultisigLeaf {
    fn leaf(&self, _remote: &ChainName, validators: &MultisigIsmConfig) -> IsmConfig {
        IsmConfig::Aggregation(AggregationIsmConfig {
            modules: vec![
                IsmConfig::MerkleRootMultisig(validators.clone()),
                IsmConfig::MessageIdMultisig(validators.clone()),
            ],
            threshold: 1,
        })
    }
}

/// Build the default ISM of every chain in `topology`: a routing module owned
/// by the chain's owner with a route for every other chain of the topology.
///
/// Fails on the first chain without an owner or the first node that does not
/// validate; nothing is returned for a partially valid topology.
pub fn build_routing_isms(
    topology: &ChainMap<MultisigIsmConfig>,
    owners: &OwnerMap,
    leaf: &impl LeafFactory,
) -> Result<ChainMap<IsmConfig>, IsmConfigError> {
    let root = ConfigPath::default();
    let mut isms = ChainMap::new();
    for (local, validators) in topology {
        let path = root.join(local.as_str());
        IsmConfig::MerkleRootMultisig(validators.clone()).validate_at(&path, 1)?;

        let owner = owners
            .get(local)
            .copied()
            .ok_or_else(|| IsmConfigError::MissingOwner(local.clone()))?;
        let domains: ChainMap<IsmConfig> = topology
            .iter()
            .filter(|(remote, _)| *remote != local)
            .map(|(remote, validators)| (remote.clone(), leaf.leaf(remote, validators)))
            .collect();
        let ism = IsmConfig::Routing(RoutingIsmConfig { owner, domains });
        ism.validate_at(&path, 1)?;

        debug!(chain = %local, routes = topology.len() - 1, "Built routing ISM");
        isms.insert(local.clone(), ism);
    }
    Ok(isms)
}

/// Ownership and default ISM of the core deployment on one chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreConfig {
    /// Owner of the deployment
    pub owner: H160,
    /// ISM used by the mailbox when a recipient does not specify one
    pub default_ism: IsmConfig,
}

/// Pair each chain's default ISM with its owner.
pub fn core_configs(
    owners: &OwnerMap,
    default_isms: ChainMap<IsmConfig>,
) -> Result<ChainMap<CoreConfig>, IsmConfigError> {
    default_isms
        .into_iter()
        .map(|(chain, default_ism)| {
            let owner = owners
                .get(&chain)
                .copied()
                .ok_or_else(|| IsmConfigError::MissingOwner(chain.clone()))?;
            Ok((chain, CoreConfig { owner, default_ism }))
        })
        .collect()
}
