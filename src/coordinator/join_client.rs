//! Outbound client for `POST /join`

use crate::common::{peer_url, Error, JoinRequest, Result};
use reqwest::StatusCode;
use std::time::Duration;

pub struct JoinClient {
    client: reqwest::Client,
}

impl JoinClient {
    /// `timeout` bounds connect plus response for each attempt.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Ask `leader` to add this node. Only `202 Accepted` counts as success.
    pub async fn join(&self, leader: &str, request: &JoinRequest) -> Result<()> {
        let url = format!("{}/join", peer_url(leader));
        tracing::debug!("POST {} body={}", url, request.encode());

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(request.encode())
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::ACCEPTED {
            return Ok(());
        }

        let reason = response.text().await.unwrap_or_default();
        Err(Error::JoinRejected {
            leader: leader.to_string(),
            status: status.as_u16(),
            reason,
        })
    }
}
