use reqwest::Client;
use tracing::info;

use super::error::PipelineError;

/// Source of the published checksum for an archive.
#[async_trait::async_trait]
pub trait ChecksumOracle: Send + Sync {
    async fn expected_checksum(&self, checksum_source_url: &str) -> Result<String, PipelineError>;
}

/// Fetches the checksum over HTTP. The response body is the checksum
/// itself, trimmed of surrounding whitespace.
#[derive(Debug, Clone)]
pub struct HttpOracle {
    client: Client,
    user_agent: String,
}

impl HttpOracle {
    pub fn new(client: Client, user_agent: impl Into<String>) -> Self {
        Self {
            client,
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait::async_trait]
impl ChecksumOracle for HttpOracle {
    async fn expected_checksum(&self, checksum_source_url: &str) -> Result<String, PipelineError> {
        let res = self
            .client
            .get(checksum_source_url)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| PipelineError::network(e, checksum_source_url))?;

        let status = res.status();
        if !status.is_success() {
            return Err(PipelineError::HttpStatus {
                url: checksum_source_url.to_string(),
                status,
            });
        }

        let body = res
            .text()
            .await
            .map_err(|e| PipelineError::network(e, checksum_source_url))?;

        let checksum = body.trim().to_string();
        info!(%checksum, "expected checksum");
        Ok(checksum)
    }
}

/// Oracle answering with a value known up front.
#[derive(Debug, Clone)]
pub struct FixedOracle(pub String);

#[async_trait::async_trait]
impl ChecksumOracle for FixedOracle {
    async fn expected_checksum(&self, _checksum_source_url: &str) -> Result<String, PipelineError> {
        Ok(self.0.clone())
    }
}
