use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::PayloadFetcher;
use crate::config::Config;
use crate::error::{LinesError, Result};
use crate::types::SourceId;

/// Fetches live payloads over HTTP with a per-request timeout
pub struct HttpFetcher {
    client: reqwest::Client,
    config: Config,
}

impl HttpFetcher {
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }
}

/// The request URL may carry the odds API key, so it never reaches error text
fn without_url(err: reqwest::Error) -> LinesError {
    LinesError::from(err.without_url())
}

#[async_trait]
impl PayloadFetcher for HttpFetcher {
    #[instrument(skip(self), fields(source = %source))]
    async fn fetch(&self, source: SourceId) -> Result<Vec<u8>> {
        let url = self.config.url_for(source)?;
        debug!("GET {}", source);
        let resp = self
            .client
            .get(&url)
            .header(USER_AGENT, self.config.http.user_agent.as_str())
            .send()
            .await
            .map_err(without_url)?;

        if source == SourceId::OddsApi {
            if let Some(remaining) = resp.headers().get("x-requests-remaining") {
                info!(
                    "odds_api requests remaining: {}",
                    remaining.to_str().unwrap_or("?")
                );
            }
        }

        let status = resp.status();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = resp.bytes().await.map_err(without_url)?.to_vec();
        if !status.is_success() {
            return Err(LinesError::unavailable(
                source.as_str(),
                format!("HTTP {} ({} bytes)", status.as_u16(), bytes.len()),
            ));
        }
        info!(
            "Fetched {} bytes from {} ({})",
            bytes.len(),
            source,
            content_type
        );
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connection_error_does_not_expose_api_key() {
        let mut config = Config::default();
        config.odds_api.base_url = "http://127.0.0.1:1".to_string();
        config.odds_api.api_key = Some("SECRETKEY123".to_string());
        config.http.timeout_seconds = 2;

        let fetcher = HttpFetcher::from_config(&config).unwrap();
        let err = fetcher.fetch(SourceId::OddsApi).await.unwrap_err();
        let text = format!("{} {:?}", err, err);
        assert!(!text.contains("SECRETKEY123"), "key leaked: {}", text);
    }
}
