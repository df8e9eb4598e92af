use std::time::Duration;

use bytes::BytesMut;
use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use stitch_logging::stitch_debug;
use url::Url;

use crate::relay::PROXY_PATH;
use crate::{FailureKind, FetchError, FetchOutput};

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    /// Whole-request limit. Video bodies can be large, so none by default.
    pub request_timeout: Option<Duration>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: None,
        }
    }
}

#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Retrieve the full body of `url`.
    async fn fetch(&self, url: &str) -> Result<FetchOutput, FetchError>;
}

/// Fetches sources through the relay endpoint rather than from the origin directly.
#[derive(Debug, Clone)]
pub struct RelayFetcher {
    relay_base: Url,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct RelayErrorBody {
    error: String,
}

impl RelayFetcher {
    pub fn new(relay_base: Url, settings: FetchSettings) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder().connect_timeout(settings.connect_timeout);
        if let Some(timeout) = settings.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self { relay_base, client })
    }

    /// The relay URL that serves `target`.
    pub fn proxied_url(&self, target: &str) -> Result<Url, FetchError> {
        let mut proxied = self
            .relay_base
            .join(PROXY_PATH)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;
        proxied.query_pairs_mut().append_pair("url", target);
        Ok(proxied)
    }
}

#[async_trait::async_trait]
impl Fetcher for RelayFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchOutput, FetchError> {
        Url::parse(url).map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;
        let proxied = self.proxied_url(url)?;
        stitch_debug!("relay fetch {} via {}", url, proxied);

        let response = self
            .client
            .get(proxied)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            let message = serde_json::from_slice::<RelayErrorBody>(&body)
                .map(|body| body.error)
                .unwrap_or_else(|_| status.to_string());
            return Err(FetchError::new(
                FailureKind::HttpStatus(status.as_u16()),
                message,
            ));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let mut bytes = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            bytes.extend_from_slice(&chunk);
        }

        Ok(FetchOutput {
            bytes: bytes.freeze(),
            content_type,
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}
