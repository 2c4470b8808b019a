use bytes::Bytes;
use rendition_core::RequestContext;
use tracing::debug;

use crate::origin::{PeerQuery, RemoteOrigin};

#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    #[error("cache-only requests are not forwarded")]
    PeerOnly,
    #[error("no sibling nodes configured")]
    NoPeers,
    #[error("no sibling has {key}")]
    Exhausted { key: String },
}

/// Asks sibling nodes, in configuration order, for a cached rendition.
#[derive(Debug, Clone)]
pub struct PeerFallback {
    nodes: Vec<String>,
    remote: RemoteOrigin,
}

impl PeerFallback {
    #[must_use]
    pub fn new(nodes: Vec<String>, remote: RemoteOrigin) -> Self {
        Self { nodes, remote }
    }

    #[must_use]
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// Returns the first non-empty `200 OK` body any sibling sends back.
    ///
    /// # Errors
    ///
    /// [`PeerError::PeerOnly`] if `ctx` itself came from a sibling,
    /// [`PeerError::NoPeers`] without siblings, and
    /// [`PeerError::Exhausted`] when every sibling missed.
    pub async fn query(&self, ctx: &RequestContext) -> Result<Bytes, PeerError> {
        if ctx.peer_only() {
            return Err(PeerError::PeerOnly);
        }
        if self.nodes.is_empty() {
            return Err(PeerError::NoPeers);
        }

        let query = PeerQuery {
            cache_key: ctx.cache_key(),
            webp: ctx.wants_webp(),
        };
        for node in &self.nodes {
            let url = self
                .remote
                .url_for(&format!("{}{}", node.trim_end_matches('/'), ctx.request_uri()));
            match self.remote.get(&url, Some(query)).await {
                Ok(bytes) if !bytes.is_empty() => {
                    debug!(node, key = ctx.cache_key(), "sibling hit");
                    return Ok(bytes);
                }
                Ok(_) => debug!(node, "sibling answered with an empty body"),
                Err(err) => debug!(node, error = %err, "sibling miss"),
            }
        }

        Err(PeerError::Exhausted {
            key: ctx.cache_key().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use rendition_core::{ImageRequest, KeyLayout, Size, StorageKind};

    use super::*;
    use crate::cluster::CACHE_ONLY_HEADER;

    fn remote() -> RemoteOrigin {
        RemoteOrigin::new("http", Duration::from_secs(2)).unwrap()
    }

    async fn node(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr.to_string()
    }

    fn request(peer_only: bool) -> RequestContext {
        let mut req = ImageRequest::new("images", StorageKind::Local, "media/a.jpg", Size::new(5, 5));
        req.peer_only = peer_only;
        RequestContext::new(req, &KeyLayout::filesystem("/cache"))
    }

    #[tokio::test]
    async fn peer_only_requests_are_never_forwarded() {
        let peers = PeerFallback::new(vec!["127.0.0.1:1".into()], remote());
        assert!(matches!(
            peers.query(&request(true)).await,
            Err(PeerError::PeerOnly)
        ));
    }

    #[tokio::test]
    async fn no_nodes_configured() {
        let peers = PeerFallback::new(Vec::new(), remote());
        assert!(matches!(
            peers.query(&request(false)).await,
            Err(PeerError::NoPeers)
        ));
    }

    #[tokio::test]
    async fn first_non_empty_answer_wins() {
        let missing = node(Router::new()).await;
        let empty = node(Router::new().route("/images/loc/5x5/media/a.jpg", get(|| async { "" }))).await;
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let good = node(Router::new().route(
            "/images/loc/5x5/media/a.jpg",
            get(move |headers: HeaderMap| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if headers.contains_key(CACHE_ONLY_HEADER) {
                        (StatusCode::OK, "cached")
                    } else {
                        (StatusCode::BAD_REQUEST, "")
                    }
                }
            }),
        ))
        .await;
        let unused_hits = Arc::new(AtomicUsize::new(0));
        let unused_counter = Arc::clone(&unused_hits);
        let unused = node(Router::new().route(
            "/images/loc/5x5/media/a.jpg",
            get(move || {
                unused_counter.fetch_add(1, Ordering::SeqCst);
                async { "late" }
            }),
        ))
        .await;

        let peers = PeerFallback::new(vec![missing, empty, good, unused], remote());
        let got = peers.query(&request(false)).await.unwrap();
        assert_eq!(&got[..], b"cached");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(unused_hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn all_misses_exhaust() {
        let missing = node(Router::new()).await;
        let peers = PeerFallback::new(vec![missing], remote());
        let err = peers.query(&request(false)).await.unwrap_err();
        assert!(matches!(err, PeerError::Exhausted { key } if key == "/cache/media/a_5x5.jpg"));
        assert_eq!(peers.nodes().len(), 1);
    }
}
