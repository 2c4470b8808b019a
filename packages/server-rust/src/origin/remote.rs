//! HTTP originals and sibling-node queries.

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode, Url};

use super::FetchError;
use crate::cluster::{CACHE_DESTINATION_HEADER, CACHE_ONLY_HEADER};

/// Headers attached when asking a sibling node for a cached rendition.
#[derive(Debug, Clone, Copy)]
pub struct PeerQuery<'a> {
    /// Where the sibling should look in the shared cache.
    pub cache_key: &'a str,
    pub webp: bool,
}

/// Shared HTTP client for origin fetches and peer lookups.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct RemoteOrigin {
    client: Client,
    scheme: String,
}

impl RemoteOrigin {
    /// Builds the client with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new(scheme: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("rendition/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            scheme: scheme.into(),
        })
    }

    /// `{scheme}://{host_and_path}`.
    #[must_use]
    pub fn url_for(&self, host_and_path: &str) -> String {
        format!("{}://{}", self.scheme, host_and_path.trim_start_matches('/'))
    }

    /// GETs `url` and returns the body of a `200 OK` answer.
    ///
    /// # Errors
    ///
    /// [`FetchError::InvalidUrl`] for an unparseable URL,
    /// [`FetchError::Transport`] for connection problems and timeouts, and
    /// [`FetchError::Status`] for any status other than 200.
    pub async fn get(&self, url: &str, peer: Option<PeerQuery<'_>>) -> Result<Bytes, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl {
            url: url.to_string(),
        })?;

        let mut request = self.client.get(parsed);
        if let Some(peer) = peer {
            request = request
                .header(CACHE_ONLY_HEADER, "true")
                .header(CACHE_DESTINATION_HEADER, peer.cache_key);
            if peer.webp {
                request = request.header(ACCEPT, "image/webp");
            }
        }

        let transport = |source| FetchError::Transport {
            url: url.to_string(),
            source,
        };
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }
        response.bytes().await.map_err(transport)
    }
}
