//! What the relayer needs from a chain carrying a Circle deployment.

use std::fmt::Debug;

use async_trait::async_trait;
use ethers::types::{Bytes, H160, H256, U256};

use ortege_core::{ChainName, ChainResult};

pub use ethereum::*;

mod ethereum;

/// A `MessageSent` log emitted while a bridge adapter transaction executed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageSentLog {
    /// Transaction that emitted the log
    pub tx_hash: H256,
    /// Block the transaction was included in
    pub block_number: u64,
    /// Position of the log in its block
    pub log_index: u64,
    /// ABI encoded log data, the raw message wrapped as `bytes`
    pub data: Bytes,
}

/// Inclusion state of a submission transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxStatus {
    /// Known to the node but not mined yet
    Pending,
    /// Mined and succeeded
    Confirmed,
    /// Mined and reverted
    Reverted,
    /// The node does not know the transaction, e.g. it was dropped
    Unknown,
}

/// Chain access of the relayer: reading bridge adapter activity on watched
/// chains and delivering attested messages on destination chains.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CircleChainClient: Send + Sync + Debug {
    /// Name of the chain this client talks to.
    fn chain(&self) -> &ChainName;

    /// Address transactions are sent from.
    fn signer(&self) -> H160;

    /// Number of the latest block.
    async fn latest_block(&self) -> ChainResult<u64>;

    /// `MessageSent` logs of transactions sent to the bridge adapter within
    /// `from_block..=to_block`, in block order.
    async fn message_sent_logs(&self, from_block: u64, to_block: u64)
        -> ChainResult<Vec<MessageSentLog>>;

    /// Whether the message transmitter already consumed the nonce with the
    /// given used-nonce key.
    async fn is_message_received(&self, used_nonce_key: H256) -> ChainResult<bool>;

    /// Send `receiveMessage(message, attestation)` to the message transmitter.
    /// Returns once the transaction was accepted by the node.
    async fn receive_message(&self, message: &Bytes, attestation: &Bytes) -> ChainResult<H256>;

    /// Where a previously sent transaction is.
    async fn transaction_status(&self, tx_hash: H256) -> ChainResult<TxStatus>;

    /// Native balance of the signer, in wei.
    async fn signer_balance(&self) -> ChainResult<U256>;
}
