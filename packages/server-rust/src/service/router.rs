//! First-match-wins routing on compiled regular expressions.
//!
//! Image URLs carry their parameters in the path (`/{mark}/{storage}/{size}/{path}`),
//! which does not fit axum's segment router. [`RouteTable`] tries each
//! pattern in registration order, stores the named captures in the request
//! extensions as a [`RouteMatch`], and hands the request to that route's
//! service. Unmatched requests get a 404.

use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use regex::Regex;
use tower::util::BoxCloneSyncService;
use tower::{Service, ServiceExt};

type RouteService = BoxCloneSyncService<Request, Response, Infallible>;

/// Named captures of the pattern that matched the request path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteMatch {
    captures: HashMap<String, String>,
}

impl RouteMatch {
    fn from_captures(pattern: &Regex, captures: &regex::Captures<'_>) -> Self {
        let captures = pattern
            .capture_names()
            .flatten()
            .filter_map(|name| {
                captures
                    .name(name)
                    .map(|m| (name.to_string(), m.as_str().to_string()))
            })
            .collect();
        Self { captures }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.captures.insert(name.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.captures.get(name).map(String::as_str)
    }
}

#[derive(Clone)]
struct Route {
    pattern: Regex,
    service: RouteService,
}

// ---------------------------------------------------------------------------
// RouteTable
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct RouteTable {
    routes: Arc<Vec<Route>>,
}

impl RouteTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a route. Earlier routes take precedence.
    #[must_use]
    pub fn route<S>(mut self, pattern: Regex, service: S) -> Self
    where
        S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
        S::Future: Send + 'static,
    {
        Arc::make_mut(&mut self.routes).push(Route {
            pattern,
            service: BoxCloneSyncService::new(service),
        });
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Service<Request> for RouteTable {
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Route services are driven with `oneshot`, which polls them itself.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let matched = self.routes.iter().find_map(|route| {
            route
                .pattern
                .captures(req.uri().path())
                .map(|caps| (RouteMatch::from_captures(&route.pattern, &caps), route.service.clone()))
        });

        match matched {
            Some((route_match, service)) => {
                req.extensions_mut().insert(route_match);
                Box::pin(service.oneshot(req))
            }
            None => Box::pin(async { Ok(StatusCode::NOT_FOUND.into_response()) }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
