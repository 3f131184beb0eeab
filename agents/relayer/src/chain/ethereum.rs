use std::collections::HashSet;
use std::fmt::{Debug, Formatter};

use async_trait::async_trait;
use ethers::abi::{self, ParamType, Token};
use ethers::providers::{Http, Middleware, Provider, ProviderError, RpcError};
use ethers::types::{BlockNumber, Bytes, Filter, TransactionRequest, H160, H256, U256};
use ethers::utils::id;
use tracing::{debug, instrument, warn};

use ortege_core::{ChainCommunicationError, ChainName, ChainResult, OrtegeProtocolError};

use super::{CircleChainClient, MessageSentLog, TxStatus};

/// Signature of the message transmitter event carrying an outgoing message.
pub const MESSAGE_SENT_EVENT: &str = "MessageSent(bytes)";
const RECEIVE_MESSAGE: &str = "receiveMessage(bytes,bytes)";
const USED_NONCES: &str = "usedNonces(bytes32)";

/// Unwrap the raw message from `MessageSent` log data.
pub fn decode_message_sent(data: &[u8]) -> Result<Vec<u8>, OrtegeProtocolError> {
    let mut tokens = abi::decode(&[ParamType::Bytes], data)
        .map_err(|err| OrtegeProtocolError::MalformedMessage(err.to_string()))?;
    match tokens.pop() {
        Some(Token::Bytes(message)) if tokens.is_empty() => Ok(message),
        _ => Err(OrtegeProtocolError::MalformedMessage(
            "MessageSent data is not a single bytes value".to_owned(),
        )),
    }
}

fn encode_call(signature: &str, args: &[Token]) -> Bytes {
    let mut calldata = id(signature).to_vec();
    calldata.extend(abi::encode(args));
    calldata.into()
}

/// Whether a JSON-RPC error message reports that the call itself failed, as
/// opposed to the node refusing it for now (funding, nonce, fee or mempool
/// state, rate limits).
fn is_execution_failure(message: &str) -> bool {
    let msg = message.to_ascii_lowercase().replace('_', " ");
    msg.contains("revert") || msg.contains("execution") || msg.contains("invalid opcode")
}

fn provider_error(err: ProviderError) -> ChainCommunicationError {
    let execution_failure = err
        .as_error_response()
        .map(|response| is_execution_failure(&response.message));
    match execution_failure {
        Some(true) => ChainCommunicationError::from_contract_error(err),
        Some(false) => {
            warn!(error = %err, "Retryable JsonRpcError");
            ChainCommunicationError::from_transport_error(err)
        }
        None => ChainCommunicationError::from_transport_error(err),
    }
}

/// Circle deployment on an EVM chain, accessed over JSON-RPC. Transactions
/// are signed by the node for the configured signer account.
pub struct EthereumCircleClient<M = Provider<Http>> {
    chain: ChainName,
    provider: M,
    signer: H160,
    bridge_adapter: H160,
    message_transmitter: H160,
}

impl<M> Debug for EthereumCircleClient<M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EthereumCircleClient")
            .field("chain", &self.chain)
            .field("signer", &self.signer)
            .field("bridge_adapter", &self.bridge_adapter)
            .field("message_transmitter", &self.message_transmitter)
            .finish()
    }
}

impl EthereumCircleClient<Provider<Http>> {
    /// Connect to the chain's JSON-RPC endpoint.
    pub fn connect(
        chain: ChainName,
        rpc_url: &url::Url,
        signer: H160,
        bridge_adapter: H160,
        message_transmitter: H160,
    ) -> ChainResult<Self> {
        let provider = Provider::<Http>::try_from(rpc_url.as_str())
            .map_err(ChainCommunicationError::from_other)?;
        Ok(Self {
            chain,
            provider,
            signer,
            bridge_adapter,
            message_transmitter,
        })
    }
}

impl<M> EthereumCircleClient<M>
where
    M: Middleware<Error = ProviderError> + 'static,
{
    async fn transaction_hashes_to_adapter(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> ChainResult<HashSet<H256>> {
        let filter = Filter::new()
            .address(self.bridge_adapter)
            .from_block(from_block)
            .to_block(to_block);
        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(provider_error)?;
        Ok(logs.into_iter().filter_map(|log| log.transaction_hash).collect())
    }
}

#[async_trait]
impl<M> CircleChainClient for EthereumCircleClient<M>
where
    M: Middleware<Error = ProviderError> + 'static,
{
    fn chain(&self) -> &ChainName {
        &self.chain
    }

    fn signer(&self) -> H160 {
        self.signer
    }

    #[instrument(err, skip(self), fields(chain = %self.chain))]
    async fn latest_block(&self) -> ChainResult<u64> {
        let block = self
            .provider
            .get_block_number()
            .await
            .map_err(provider_error)?;
        Ok(block.as_u64())
    }

    #[instrument(err, skip(self), fields(chain = %self.chain))]
    async fn message_sent_logs(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> ChainResult<Vec<MessageSentLog>> {
        let adapter_txs = self
            .transaction_hashes_to_adapter(from_block, to_block)
            .await?;
        if adapter_txs.is_empty() {
            return Ok(Vec::new());
        }

        let filter = Filter::new()
            .address(self.message_transmitter)
            .event(MESSAGE_SENT_EVENT)
            .from_block(BlockNumber::Number(from_block.into()))
            .to_block(BlockNumber::Number(to_block.into()));
        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(provider_error)?;

        let messages: Vec<_> = logs
            .into_iter()
            .filter_map(|log| {
                let tx_hash = log.transaction_hash?;
                if !adapter_txs.contains(&tx_hash) {
                    return None;
                }
                Some(MessageSentLog {
                    tx_hash,
                    block_number: log.block_number.map(|n| n.as_u64()).unwrap_or(from_block),
                    log_index: log.log_index.map(|i| i.as_u64()).unwrap_or_default(),
                    data: log.data,
                })
            })
            .collect();
        debug!(
            adapter_txs = adapter_txs.len(),
            messages = messages.len(),
            "Read MessageSent logs"
        );
        Ok(messages)
    }

    #[instrument(err, skip(self), fields(chain = %self.chain))]
    async fn is_message_received(&self, used_nonce_key: H256) -> ChainResult<bool> {
        let call = TransactionRequest::new().to(self.message_transmitter).data(encode_call(
            USED_NONCES,
            &[Token::FixedBytes(used_nonce_key.as_bytes().to_vec())],
        ));
        let result = self
            .provider
            .call(&call.into(), None)
            .await
            .map_err(provider_error)?;
        if result.len() < 32 {
            return Err(OrtegeProtocolError::MalformedMessage(format!(
                "usedNonces returned {} bytes",
                result.len()
            ))
            .into());
        }
        Ok(!U256::from_big_endian(&result[..32]).is_zero())
    }

    #[instrument(err, skip(self, message, attestation), fields(chain = %self.chain))]
    async fn receive_message(&self, message: &Bytes, attestation: &Bytes) -> ChainResult<H256> {
        let tx = TransactionRequest::new()
            .from(self.signer)
            .to(self.message_transmitter)
            .data(encode_call(
                RECEIVE_MESSAGE,
                &[
                    Token::Bytes(message.to_vec()),
                    Token::Bytes(attestation.to_vec()),
                ],
            ));
        let pending = self
            .provider
            .send_transaction(tx, None)
            .await
            .map_err(provider_error)?;
        Ok(pending.tx_hash())
    }

    #[instrument(err, ret, skip(self), fields(chain = %self.chain))]
    async fn transaction_status(&self, tx_hash: H256) -> ChainResult<TxStatus> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(provider_error)?;
        if let Some(receipt) = receipt {
            return Ok(match receipt.status.map(|status| status.as_u64()) {
                Some(1) => TxStatus::Confirmed,
                _ => TxStatus::Reverted,
            });
        }
        let known = self
            .provider
            .get_transaction(tx_hash)
            .await
            .map_err(provider_error)?;
        Ok(if known.is_some() {
            TxStatus::Pending
        } else {
            TxStatus::Unknown
        })
    }

    #[instrument(err, skip(self), fields(chain = %self.chain))]
    async fn signer_balance(&self) -> ChainResult<U256> {
        self.provider
            .get_balance(self.signer, None)
            .await
            .map_err(provider_error)
    }
}
