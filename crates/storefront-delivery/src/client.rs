//! HTTP transport for resource fetches

use crate::{DeliveryConfig, DeliveryError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Raw byte fetch capability used by every resource kind
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch the body at `url`. One call is one attempt; retries happen above.
    async fn fetch(&self, url: &str) -> Result<Bytes>;
}

/// Configuration for the HTTP transport
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Enable compression
    pub compression: bool,
    /// User agent
    pub user_agent: String,
    /// Headers added to every request
    pub headers: Vec<(String, String)>,
    /// Base URL that relative resource URLs are joined onto
    pub base_url: Option<Url>,
}

impl From<&DeliveryConfig> for ClientConfig {
    fn from(config: &DeliveryConfig) -> Self {
        Self {
            timeout: config.fetch_timeout,
            connect_timeout: config.http.connect_timeout,
            compression: config.http.compression,
            user_agent: config.http.user_agent.clone(),
            headers: config.http.headers.clone(),
            base_url: None,
        }
    }
}

impl ClientConfig {
    /// Resolve relative URLs against `base`
    pub fn with_base_url(mut self, base: &str) -> Result<Self> {
        self.base_url = Some(Url::parse(base)?);
        Ok(self)
    }
}

/// `reqwest`-backed transport
pub struct HttpTransport {
    client: Client,
    config: ClientConfig,
}

impl HttpTransport {
    /// Create a new HTTP transport
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent);

        if config.compression {
            builder = builder.gzip(true).brotli(true);
        }

        let client = builder
            .build()
            .map_err(|e| DeliveryError::Configuration(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn resolve(&self, url: &str) -> Result<Url> {
        match Url::parse(url) {
            Ok(absolute) => Ok(absolute),
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.config.base_url {
                Some(base) => Ok(base.join(url)?),
                None => Err(DeliveryError::InvalidUrl(format!(
                    "relative URL without base: {}",
                    url
                ))),
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn handle_response(&self, response: Response) -> Result<Bytes> {
        let status = response.status();

        if status.is_success() {
            return response.bytes().await.map_err(|e| e.into());
        }

        Err(DeliveryError::Http {
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        let url = self.resolve(url)?;
        debug!("Fetching: {}", url);

        let mut request = self.client.get(url);
        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DeliveryError::Timeout(self.config.timeout.as_millis() as u64)
            } else {
                e.into()
            }
        })?;
        self.handle_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_url_needs_base() {
        let transport = HttpTransport::new(ClientConfig::from(&DeliveryConfig::default())).unwrap();
        assert!(matches!(
            transport.resolve("/img/a.png"),
            Err(DeliveryError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_relative_url_joined_onto_base() {
        let config = ClientConfig::from(&DeliveryConfig::default())
            .with_base_url("https://shop.example/")
            .unwrap();
        let transport = HttpTransport::new(config).unwrap();
        let url = transport.resolve("/img/a.png").unwrap();
        assert_eq!(url.as_str(), "https://shop.example/img/a.png");
    }
}
