use std::collections::BTreeMap;
use std::sync::Arc;

use prometheus::IntCounterVec;
use tracing::{debug, instrument, warn};

use ortege_core::{BridgedMessage, ChainName, ChainResult, CircleMessage};

use crate::chain::{decode_message_sent, CircleChainClient, MessageSentLog};

/// Finds messages sent through the bridge adapter of one watched chain.
#[derive(Debug)]
pub struct MessageCorrelator {
    origin: ChainName,
    client: Arc<dyn CircleChainClient>,
    domain_chains: BTreeMap<u32, ChainName>,
    chunk_size: u64,
    parse_failures: IntCounterVec,
}

impl MessageCorrelator {
    /// Correlator for the chain `client` talks to. `domain_chains` resolves
    /// Circle domains to chain names; messages to other domains are ignored.
    pub fn new(
        client: Arc<dyn CircleChainClient>,
        domain_chains: BTreeMap<u32, ChainName>,
        chunk_size: u64,
        parse_failures: IntCounterVec,
    ) -> Self {
        Self {
            origin: client.chain().clone(),
            client,
            domain_chains,
            chunk_size: chunk_size.max(1),
            parse_failures,
        }
    }

    /// Messages sent from block `cursor` onwards, at most one chunk of blocks
    /// at a time, and the cursor to continue from.
    #[instrument(skip(self), fields(origin = %self.origin))]
    pub async fn find_candidates(&self, cursor: u64) -> ChainResult<(Vec<BridgedMessage>, u64)> {
        let latest = self.client.latest_block().await?;
        if cursor > latest {
            return Ok((Vec::new(), cursor));
        }
        let to = latest.min(cursor.saturating_add(self.chunk_size - 1));

        let logs = self.client.message_sent_logs(cursor, to).await?;
        let messages: Vec<_> = logs
            .iter()
            .filter_map(|log| self.parse_log(log))
            .collect();
        debug!(from = cursor, to, logs = logs.len(), messages = messages.len(), "Correlated messages");
        Ok((messages, to + 1))
    }

    fn parse_log(&self, log: &MessageSentLog) -> Option<BridgedMessage> {
        let parsed = decode_message_sent(&log.data)
            .and_then(|raw| CircleMessage::decode(&raw).map(|decoded| (raw, decoded)));
        let (raw, decoded) = match parsed {
            Ok(parsed) => parsed,
            Err(error) => {
                warn!(tx_hash = ?log.tx_hash, log_index = log.log_index, %error, "Skipping unparseable MessageSent log");
                self.parse_failures
                    .with_label_values(&[self.origin.as_str()])
                    .inc();
                return None;
            }
        };

        if self.domain_chains.get(&decoded.source_domain) != Some(&self.origin) {
            warn!(
                tx_hash = ?log.tx_hash,
                source_domain = decoded.source_domain,
                "Skipping message whose source domain is not this chain's"
            );
            self.parse_failures
                .with_label_values(&[self.origin.as_str()])
                .inc();
            return None;
        }
        let Some(destination) = self.domain_chains.get(&decoded.destination_domain) else {
            debug!(
                tx_hash = ?log.tx_hash,
                destination_domain = decoded.destination_domain,
                "Skipping message to a domain that is not relayed to"
            );
            return None;
        };

        Some(BridgedMessage::from_circle_message(
            self.origin.clone(),
            destination.clone(),
            log.tx_hash,
            &raw,
            &decoded,
        ))
    }
}

#[cfg(test)]
mod test {
    use ethers::abi::{self, Token};
    use ethers::types::{Bytes, H256};
    use maplit::btreemap;
    use mockall::predicate::eq;
    use ortege_base::dummy_metrics;

    use super::*;
    use crate::chain::MockCircleChainClient;
    use crate::test_utils::circle_message;

    fn log(tx: u64, data: Vec<u8>) -> MessageSentLog {
        MessageSentLog {
            tx_hash: H256::from_low_u64_be(tx),
            block_number: 100,
            log_index: tx,
            data: Bytes::from(data),
        }
    }

    fn wrapped(raw: Vec<u8>) -> Vec<u8> {
        abi::encode(&[Token::Bytes(raw)])
    }

    fn mock_chain(latest: u64) -> MockCircleChainClient {
        let mut client = MockCircleChainClient::new();
        client.expect_chain().return_const(ChainName::from("ethereum"));
        client.expect_latest_block().returning(move || Ok(latest));
        client
    }

    fn correlator(client: MockCircleChainClient, chunk_size: u64) -> (MessageCorrelator, IntCounterVec) {
        let failures = dummy_metrics("relayer").unwrap().parse_failures();
        let correlator = MessageCorrelator::new(
            Arc::new(client),
            btreemap! { 0 => "ethereum".into(), 1 => "avalanche".into() },
            chunk_size,
            failures.clone(),
        );
        (correlator, failures)
    }

    #[tokio::test]
    async fn malformed_logs_are_skipped_and_counted() {
        let mut client = mock_chain(150);
        client
            .expect_message_sent_logs()
            .with(eq(100), eq(150))
            .returning(|_, _| {
                Ok(vec![
                    log(1, wrapped(circle_message(0, 1, 7).to_vec())),
                    log(2, vec![0xff; 3]),
                    log(3, wrapped(vec![0; 10])),
                    log(4, wrapped(circle_message(0, 1, 8).to_vec())),
                ])
            });
        let (correlator, failures) = correlator(client, 1_000);

        let (messages, cursor) = correlator.find_candidates(100).await.unwrap();
        assert_eq!(cursor, 151);
        let nonces: Vec<_> = messages.iter().map(|m| m.nonce).collect();
        assert_eq!(nonces, vec![7, 8]);
        assert_eq!(messages[0].destination.as_str(), "avalanche");
        assert_eq!(messages[0].source_tx_hash, H256::from_low_u64_be(1));
        assert_eq!(failures.with_label_values(&["ethereum"]).get(), 2);
    }

    #[tokio::test]
    async fn foreign_domains_are_not_relayed() {
        let mut client = mock_chain(10);
        client.expect_message_sent_logs().returning(|_, _| {
            Ok(vec![
                // to a domain nobody relays to
                log(1, wrapped(circle_message(0, 5, 1).to_vec())),
                // claims to come from avalanche
                log(2, wrapped(circle_message(1, 0, 2).to_vec())),
            ])
        });
        let (correlator, failures) = correlator(client, 1_000);

        let (messages, _) = correlator.find_candidates(0).await.unwrap();
        assert!(messages.is_empty());
        assert_eq!(failures.with_label_values(&["ethereum"]).get(), 1);
    }

    #[tokio::test]
    async fn scans_at_most_one_chunk() {
        let mut client = mock_chain(10_000);
        client
            .expect_message_sent_logs()
            .with(eq(500), eq(999))
            .times(1)
            .returning(|_, _| Ok(vec![]));
        let (correlator, _) = correlator(client, 500);
        assert_eq!(correlator.find_candidates(500).await.unwrap().1, 1_000);
    }

    #[tokio::test]
    async fn cursor_past_head_waits_for_new_blocks() {
        let mut client = mock_chain(41);
        client.expect_message_sent_logs().never();
        let (correlator, _) = correlator(client, 500);
        let (messages, cursor) = correlator.find_candidates(42).await.unwrap();
        assert!(messages.is_empty());
        assert_eq!(cursor, 42);
    }
}
