//! Scripted collaborators for driving the relayer in tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use ethers::abi::{self, Token};
use ethers::types::{Bytes, H160, H256, U256};

use ortege_core::{BridgedMessage, ChainName, ChainResult, CircleMessage};

use crate::attestation::{AttestationError, AttestationService, AttestationStatus};
use crate::chain::{CircleChainClient, MessageSentLog, TxStatus};
use crate::clock::Clock;

pub fn circle_message(source_domain: u32, destination_domain: u32, nonce: u64) -> CircleMessage {
    CircleMessage {
        version: 0,
        source_domain,
        destination_domain,
        nonce,
        sender: H256::repeat_byte(0x11),
        recipient: H256::repeat_byte(0x22),
        destination_caller: H256::zero(),
        body: nonce.to_be_bytes().to_vec(),
    }
}

pub fn bridged_message(origin: &str, destination: &str, nonce: u64) -> BridgedMessage {
    let decoded = circle_message(0, 1, nonce);
    BridgedMessage::from_circle_message(
        origin.into(),
        destination.into(),
        H256::from_low_u64_be(nonce),
        &decoded.to_vec(),
        &decoded,
    )
}

/// A `MessageSent` log for `message`, emitted by transaction `tx` in `block`.
pub fn message_sent_log(tx: u64, block: u64, message: &CircleMessage) -> MessageSentLog {
    MessageSentLog {
        tx_hash: H256::from_low_u64_be(tx),
        block_number: block,
        log_index: 0,
        data: abi::encode(&[Token::Bytes(message.to_vec())]).into(),
    }
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl Default for ManualClock {
    fn default() -> Self {
        Self(Mutex::new(start_time()))
    }
}

impl ManualClock {
    pub fn advance(&self, by: chrono::Duration) {
        *self.0.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Attestation service answering from per-message scripts. Messages without
/// a script, or whose script ran out, are pending.
#[derive(Debug, Default)]
pub struct ScriptedAttestations {
    scripts: Mutex<HashMap<H256, VecDeque<Result<AttestationStatus, AttestationError>>>>,
    requests: Mutex<u32>,
}

impl ScriptedAttestations {
    pub fn script(
        &self,
        message_hash: H256,
        responses: impl IntoIterator<Item = Result<AttestationStatus, AttestationError>>,
    ) {
        self.scripts
            .lock()
            .unwrap()
            .entry(message_hash)
            .or_default()
            .extend(responses);
    }

    /// Pending `pending` times, then complete.
    pub fn attest_after(&self, message_hash: H256, pending: usize) {
        let responses = std::iter::repeat_with(|| Ok(AttestationStatus::Pending))
            .take(pending)
            .chain([Ok(AttestationStatus::Complete(Bytes::from(vec![0xa7; 65])))]);
        self.script(message_hash, responses);
    }

    pub fn requests(&self) -> u32 {
        *self.requests.lock().unwrap()
    }
}

#[async_trait]
impl AttestationService for ScriptedAttestations {
    async fn attestation(&self, message_hash: H256) -> Result<AttestationStatus, AttestationError> {
        *self.requests.lock().unwrap() += 1;
        self.scripts
            .lock()
            .unwrap()
            .get_mut(&message_hash)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(AttestationStatus::Pending))
    }
}

/// In-memory chain: holds `MessageSent` logs for the correlator and plays the
/// message transmitter for submissions.
#[derive(Debug)]
pub struct MockChain {
    chain: ChainName,
    pub latest_block: Mutex<u64>,
    pub logs: Mutex<Vec<MessageSentLog>>,
    /// Used nonce keys of received messages
    pub received: Mutex<HashSet<H256>>,
    /// Every `(message, attestation)` sent to the transmitter
    pub submissions: Mutex<Vec<(Bytes, Bytes)>>,
    /// Scripted results of the next submissions; success once empty
    pub submit_results: Mutex<VecDeque<ChainResult<()>>>,
    /// Scripted statuses of the next status queries; confirmed once empty
    pub tx_statuses: Mutex<VecDeque<TxStatus>>,
    /// Whether a successful submission marks the message as received
    pub deliver_on_submit: Mutex<bool>,
    pub balance: U256,
}

impl MockChain {
    pub fn new(chain: &str) -> Self {
        Self {
            chain: chain.into(),
            latest_block: Mutex::new(0),
            logs: Mutex::default(),
            received: Mutex::default(),
            submissions: Mutex::default(),
            submit_results: Mutex::default(),
            tx_statuses: Mutex::default(),
            deliver_on_submit: Mutex::new(true),
            balance: U256::exp10(18) * U256::from(3),
        }
    }

    /// Add a log in a new block.
    pub fn emit(&self, log: MessageSentLog) {
        let mut latest = self.latest_block.lock().unwrap();
        *latest = (*latest).max(log.block_number);
        self.logs.lock().unwrap().push(log);
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }
}

#[async_trait]
impl CircleChainClient for MockChain {
    fn chain(&self) -> &ChainName {
        &self.chain
    }

    fn signer(&self) -> H160 {
        H160::repeat_byte(0x5e)
    }

    async fn latest_block(&self) -> ChainResult<u64> {
        Ok(*self.latest_block.lock().unwrap())
    }

    async fn message_sent_logs(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> ChainResult<Vec<MessageSentLog>> {
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|log| (from_block..=to_block).contains(&log.block_number))
            .cloned()
            .collect())
    }

    async fn is_message_received(&self, used_nonce_key: H256) -> ChainResult<bool> {
        Ok(self.received.lock().unwrap().contains(&used_nonce_key))
    }

    async fn receive_message(&self, message: &Bytes, attestation: &Bytes) -> ChainResult<H256> {
        if let Some(Err(err)) = self.submit_results.lock().unwrap().pop_front() {
            return Err(err);
        }
        let mut submissions = self.submissions.lock().unwrap();
        submissions.push((message.clone(), attestation.clone()));
        if *self.deliver_on_submit.lock().unwrap() {
            if let Ok(decoded) = CircleMessage::decode(message) {
                self.received
                    .lock()
                    .unwrap()
                    .insert(decoded.used_nonce_key());
            }
        }
        Ok(H256::from_low_u64_be(0xf000 + submissions.len() as u64))
    }

    async fn transaction_status(&self, _tx_hash: H256) -> ChainResult<TxStatus> {
        Ok(self
            .tx_statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(TxStatus::Confirmed))
    }

    async fn signer_balance(&self) -> ChainResult<U256> {
        Ok(self.balance)
    }
}
