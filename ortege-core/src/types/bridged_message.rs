use std::fmt::{Display, Formatter};

use ethers_core::types::Bytes;
use serde::{Deserialize, Serialize};

use crate::{utils::keccak256, ChainName, OrtegeProtocolError, H256};

/// Length of the fixed header of a Circle message, before the body.
pub const CIRCLE_MESSAGE_HEADER_LEN: usize = 4 + 4 + 4 + 8 + 32 + 32 + 32;

/// A message emitted by Circle's MessageTransmitter.
///
/// Layout: version (u32) | source domain (u32) | destination domain (u32) |
/// nonce (u64) | sender (bytes32) | recipient (bytes32) |
/// destination caller (bytes32) | body
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CircleMessage {
    /// Message format version
    pub version: u32,
    /// Circle domain of the chain the message was sent from
    pub source_domain: u32,
    /// Circle domain of the chain the message is delivered to
    pub destination_domain: u32,
    /// Nonce assigned by the source MessageTransmitter
    pub nonce: u64,
    /// Sender on the source chain
    pub sender: H256,
    /// Recipient on the destination chain
    pub recipient: H256,
    /// Caller allowed to deliver the message, zero if anyone may
    pub destination_caller: H256,
    /// Application payload
    pub body: Vec<u8>,
}

impl CircleMessage {
    /// Decode a raw message.
    pub fn decode(raw: &[u8]) -> Result<Self, OrtegeProtocolError> {
        if raw.len() < CIRCLE_MESSAGE_HEADER_LEN {
            return Err(OrtegeProtocolError::MalformedMessage(format!(
                "message is {} bytes, header alone is {CIRCLE_MESSAGE_HEADER_LEN}",
                raw.len()
            )));
        }
        let u32_at = |at: usize| {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(&raw[at..at + 4]);
            u32::from_be_bytes(buf)
        };
        let mut nonce = [0u8; 8];
        nonce.copy_from_slice(&raw[12..20]);
        Ok(Self {
            version: u32_at(0),
            source_domain: u32_at(4),
            destination_domain: u32_at(8),
            nonce: u64::from_be_bytes(nonce),
            sender: H256::from_slice(&raw[20..52]),
            recipient: H256::from_slice(&raw[52..84]),
            destination_caller: H256::from_slice(&raw[84..116]),
            body: raw[CIRCLE_MESSAGE_HEADER_LEN..].to_vec(),
        })
    }

    /// Encode back to the on-chain layout.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CIRCLE_MESSAGE_HEADER_LEN + self.body.len());
        out.extend_from_slice(&self.version.to_be_bytes());
        out.extend_from_slice(&self.source_domain.to_be_bytes());
        out.extend_from_slice(&self.destination_domain.to_be_bytes());
        out.extend_from_slice(&self.nonce.to_be_bytes());
        out.extend_from_slice(self.sender.as_bytes());
        out.extend_from_slice(self.recipient.as_bytes());
        out.extend_from_slice(self.destination_caller.as_bytes());
        out.extend_from_slice(&self.body);
        out
    }

    /// Key of this message in the destination transmitter's used nonces.
    pub fn used_nonce_key(&self) -> H256 {
        used_nonce_key(self.source_domain, self.nonce)
    }
}

/// Key under which the destination MessageTransmitter records a nonce as
/// used: keccak256(source domain || nonce).
pub fn used_nonce_key(source_domain: u32, nonce: u64) -> H256 {
    let mut packed = [0u8; 12];
    packed[..4].copy_from_slice(&source_domain.to_be_bytes());
    packed[4..].copy_from_slice(&nonce.to_be_bytes());
    keccak256(packed)
}

/// Identity of a bridged message: where it was found and which nonce it
/// carries. Two sightings with the same identity are the same message.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageIdentity {
    /// Chain whose bridge adapter emitted the message
    pub origin: ChainName,
    /// Transaction that emitted the message
    pub source_tx_hash: H256,
    /// Circle nonce of the message
    pub nonce: u64,
}

impl Display for MessageIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{:?}:{}", self.origin, self.source_tx_hash, self.nonce)
    }
}

/// A message that left a watched chain through its bridge adapter and needs
/// an attestation delivered on the destination chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgedMessage {
    /// Chain the message was sent from
    pub origin: ChainName,
    /// Chain the message is delivered to
    pub destination: ChainName,
    /// Transaction on the origin chain that emitted the message
    pub source_tx_hash: H256,
    /// Circle nonce
    pub nonce: u64,
    /// Circle domain of the origin chain
    pub source_domain: u32,
    /// Circle domain of the destination chain
    pub destination_domain: u32,
    /// keccak256 of the raw message, the key attestations are requested by
    pub message_hash: H256,
    /// The raw message as emitted on chain
    pub message: Bytes,
}

impl BridgedMessage {
    /// Build from a decoded message. The origin and destination chain names
    /// are resolved by the caller from the message's Circle domains.
    pub fn from_circle_message(
        origin: ChainName,
        destination: ChainName,
        source_tx_hash: H256,
        raw: &[u8],
        decoded: &CircleMessage,
    ) -> Self {
        Self {
            origin,
            destination,
            source_tx_hash,
            nonce: decoded.nonce,
            source_domain: decoded.source_domain,
            destination_domain: decoded.destination_domain,
            message_hash: keccak256(raw),
            message: Bytes::from(raw.to_vec()),
        }
    }

    /// The deduplication key of this message.
    pub fn identity(&self) -> MessageIdentity {
        MessageIdentity {
            origin: self.origin.clone(),
            source_tx_hash: self.source_tx_hash,
            nonce: self.nonce,
        }
    }

    /// Key of this message in the destination transmitter's used nonces.
    pub fn used_nonce_key(&self) -> H256 {
        used_nonce_key(self.source_domain, self.nonce)
    }
}
