use std::time::Duration;

use async_trait::async_trait;
use ethers::types::{Bytes, H256};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{instrument, trace};
use url::Url;

use super::{AttestationError, AttestationService, AttestationStatus};

#[derive(Debug, Deserialize)]
struct AttestationResponse {
    status: String,
    attestation: Option<String>,
}

/// Client of Circle's attestation API (Iris).
#[derive(Debug, Clone)]
pub struct CircleAttestationClient {
    client: Client,
    base_url: Url,
}

impl CircleAttestationClient {
    /// Client for the API at `base_url`, e.g. `https://iris-api.circle.com`.
    pub fn new(mut base_url: Url, request_timeout: Duration) -> Result<Self, AttestationError> {
        // `Url::join` replaces the last segment of a path without a trailing slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self { client, base_url })
    }

    fn attestation_url(&self, message_hash: H256) -> Result<Url, AttestationError> {
        self.base_url
            .join(&format!("attestations/{message_hash:?}"))
            .map_err(|err| AttestationError::Malformed(err.to_string()))
    }
}

fn parse_response(body: AttestationResponse) -> Result<AttestationStatus, AttestationError> {
    match body.status.as_str() {
        "complete" => {
            let attestation = body
                .attestation
                .ok_or_else(|| AttestationError::Malformed("complete without attestation".into()))?;
            let bytes = attestation
                .parse::<Bytes>()
                .map_err(|err| AttestationError::Malformed(err.to_string()))?;
            if bytes.is_empty() {
                return Err(AttestationError::Malformed("empty attestation".into()));
            }
            Ok(AttestationStatus::Complete(bytes))
        }
        "pending_confirmations" | "pending" => Ok(AttestationStatus::Pending),
        other => Err(AttestationError::Malformed(format!("unknown status `{other}`"))),
    }
}

#[async_trait]
impl AttestationService for CircleAttestationClient {
    #[instrument(err, skip(self))]
    async fn attestation(&self, message_hash: H256) -> Result<AttestationStatus, AttestationError> {
        let url = self.attestation_url(message_hash)?;
        let response = self.client.get(url).send().await?;
        let status = response.status();
        trace!(%status, "Attestation service responded");

        match status {
            // the service does not know messages it has not observed yet
            StatusCode::NOT_FOUND => Ok(AttestationStatus::Pending),
            status if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS => {
                Err(AttestationError::Server(status.as_u16()))
            }
            status if !status.is_success() => Err(AttestationError::Rejected(status.as_u16())),
            _ => parse_response(response.json::<AttestationResponse>().await?),
        }
    }
}
