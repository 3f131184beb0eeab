use std::collections::HashSet;

use derive_new::new;
use ethers_core::types::{Bytes, Signature};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

use crate::{
    ChainName, Checkpoint, CheckpointWithMessageId, Signable, SignatureVerifier, H160, H256,
};

use super::{
    AggregationIsmConfig, IsmConfig, IsmError, MultisigIsmConfig, RoutingIsmConfig, ISM_MAX_DEPTH,
};

/// What the relayer presents for a message: the checkpoint validators signed
/// and their signatures. The same evidence is given to every node of the tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsmEvidence {
    /// The signed checkpoint
    pub checkpoint: Checkpoint,
    /// Id of the message, required by message id multisig modules
    pub message_id: Option<H256>,
    /// 65 byte ECDSA signatures, in no particular order
    pub signatures: Vec<Bytes>,
}

impl IsmEvidence {
    fn digest_for(&self, ism: &IsmConfig) -> Result<H256, IsmError> {
        match ism {
            IsmConfig::MessageIdMultisig(_) => {
                let message_id = self.message_id.ok_or_else(|| {
                    IsmError::MalformedEvidence(
                        "message id multisig requires a message id".to_owned(),
                    )
                })?;
                Ok(CheckpointWithMessageId {
                    checkpoint: self.checkpoint,
                    message_id,
                }
                .eth_signed_message_hash())
            }
            _ => Ok(self.checkpoint.eth_signed_message_hash()),
        }
    }

    fn parsed_signatures(&self) -> Result<Vec<Signature>, IsmError> {
        self.signatures
            .iter()
            .enumerate()
            .map(|(i, raw)| {
                Signature::try_from(raw.as_ref()).map_err(|err| {
                    IsmError::MalformedEvidence(format!("signature {i} is invalid: {err}"))
                })
            })
            .collect()
    }
}

/// Resolves a policy tree into a verdict for a message from `origin`.
#[derive(Debug, Clone, new)]
pub struct IsmEvaluator<V> {
    verifier: V,
}

impl<V: SignatureVerifier> IsmEvaluator<V> {
    /// `Ok(true)` if the policy accepts the evidence, `Ok(false)` if it
    /// rejects it and `Err` when no verdict can be reached, e.g. a routing
    /// module without a route for `origin`.
    #[instrument(err, skip(self, ism, evidence), fields(module_type = %ism.module_type()), ret)]
    pub fn evaluate(
        &self,
        ism: &IsmConfig,
        origin: &ChainName,
        evidence: &IsmEvidence,
    ) -> Result<bool, IsmError> {
        if ism.depth() > ISM_MAX_DEPTH {
            return Err(IsmError::MaxDepthExceeded(ISM_MAX_DEPTH));
        }
        check_thresholds(ism, 1)?;
        check_routes(ism, origin)?;
        self.evaluate_node(ism, origin, evidence)
    }

    fn evaluate_node(
        &self,
        ism: &IsmConfig,
        origin: &ChainName,
        evidence: &IsmEvidence,
    ) -> Result<bool, IsmError> {
        match ism {
            IsmConfig::MerkleRootMultisig(multisig) | IsmConfig::MessageIdMultisig(multisig) => {
                let digest = evidence.digest_for(ism)?;
                self.evaluate_multisig(multisig, digest, evidence)
            }
            IsmConfig::Aggregation(aggregation) => {
                self.evaluate_aggregation(aggregation, origin, evidence)
            }
            IsmConfig::Routing(routing) => self.evaluate_routing(routing, origin, evidence),
        }
    }

    fn evaluate_multisig(
        &self,
        multisig: &MultisigIsmConfig,
        digest: H256,
        evidence: &IsmEvidence,
    ) -> Result<bool, IsmError> {
        let threshold = usize::from(multisig.threshold);
        let signatures = evidence.parsed_signatures()?;

        let mut signed_by: HashSet<H160> = HashSet::with_capacity(threshold);
        for signature in &signatures {
            let signer = multisig
                .validators
                .iter()
                .filter(|validator| !signed_by.contains(*validator))
                .find(|validator| self.verifier.verify(**validator, digest, signature));
            if let Some(signer) = signer {
                trace!(validator = ?signer, "Counted validator signature");
                signed_by.insert(*signer);
                if signed_by.len() >= threshold {
                    return Ok(true);
                }
            }
        }
        debug!(
            signed = signed_by.len(),
            threshold, "Multisig threshold not reached"
        );
        Ok(false)
    }

    fn evaluate_aggregation(
        &self,
        aggregation: &AggregationIsmConfig,
        origin: &ChainName,
        evidence: &IsmEvidence,
    ) -> Result<bool, IsmError> {
        let threshold = usize::from(aggregation.threshold);
        let total = aggregation.modules.len();

        let mut accepted = 0;
        for (evaluated, module) in aggregation.modules.iter().enumerate() {
            match self.evaluate_node(module, origin, evidence) {
                Ok(true) => accepted += 1,
                Ok(false) => {}
                // routes were checked up front, so only unusable evidence lands here
                Err(err) => debug!(index = evaluated, ?err, "Aggregated module had no verdict"),
            }
            if accepted >= threshold {
                return Ok(true);
            }
            let remaining = total - evaluated - 1;
            if accepted + remaining < threshold {
                break;
            }
        }
        Ok(false)
    }

    fn evaluate_routing(
        &self,
        routing: &RoutingIsmConfig,
        origin: &ChainName,
        evidence: &IsmEvidence,
    ) -> Result<bool, IsmError> {
        let module = routing
            .domains
            .get(origin)
            .ok_or_else(|| IsmError::NoRoute {
                origin: origin.clone(),
            })?;
        self.evaluate_node(module, origin, evidence)
    }
}

/// Every threshold of the tree must be at least one, reachable or not.
fn check_thresholds(ism: &IsmConfig, depth: usize) -> Result<(), IsmError> {
    match ism {
        IsmConfig::MerkleRootMultisig(multisig) | IsmConfig::MessageIdMultisig(multisig) => {
            if multisig.threshold == 0 {
                return Err(IsmError::ZeroThreshold { depth });
            }
        }
        IsmConfig::Aggregation(aggregation) => {
            if aggregation.threshold == 0 {
                return Err(IsmError::ZeroThreshold { depth });
            }
            for module in &aggregation.modules {
                check_thresholds(module, depth + 1)?;
            }
        }
        IsmConfig::Routing(routing) => {
            for module in routing.domains.values() {
                check_thresholds(module, depth + 1)?;
            }
        }
    }
    Ok(())
}

/// Every routing module the message would pass through must have a route for
/// `origin`, whichever aggregated children end up being evaluated.
fn check_routes(ism: &IsmConfig, origin: &ChainName) -> Result<(), IsmError> {
    match ism {
        IsmConfig::MerkleRootMultisig(_) | IsmConfig::MessageIdMultisig(_) => Ok(()),
        IsmConfig::Aggregation(aggregation) => aggregation
            .modules
            .iter()
            .try_for_each(|module| check_routes(module, origin)),
        IsmConfig::Routing(routing) => match routing.domains.get(origin) {
            Some(module) => check_routes(module, origin),
            None => Err(IsmError::NoRoute {
                origin: origin.clone(),
            }),
        },
    }
}

#[cfg(test)]
mod tests;
