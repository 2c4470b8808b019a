//! Admission gate for image processing.
//!
//! Caps the number of image requests processed concurrently. Unlike load
//! shedding, callers over the limit wait for a permit instead of being
//! rejected; waiters are served in arrival order.
//!
//! The permit is shared through the request extensions as an
//! [`AdmissionPermit`]. Work that outlives the request future, such as a
//! transform on a blocking thread, keeps a clone so the slot stays taken
//! until that work ends.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::http::Request;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tower::{Layer, Service};

// ---------------------------------------------------------------------------
// AdmissionGate
// ---------------------------------------------------------------------------

/// Counting semaphore shared by every image request.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl AdmissionGate {
    /// Gate admitting at most `capacity` requests at once.
    ///
    /// Capacity is clamped to `1..=Semaphore::MAX_PERMITS`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits not currently held.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Waits for a permit. The slot is released when the last clone of the
    /// permit drops.
    ///
    /// Returns `None` only if the gate was closed, which never happens while
    /// the gate is alive.
    pub async fn acquire(&self) -> Option<AdmissionPermit> {
        let permit = Arc::clone(&self.semaphore).acquire_owned().await.ok()?;
        Some(AdmissionPermit(Arc::new(permit)))
    }

    #[must_use]
    pub fn layer(&self) -> AdmissionLayer {
        AdmissionLayer { gate: self.clone() }
    }
}

/// One admitted request's slot. Clones share it.
#[derive(Debug, Clone)]
pub struct AdmissionPermit(#[allow(dead_code)] Arc<OwnedSemaphorePermit>);

// ---------------------------------------------------------------------------
// AdmissionLayer
// ---------------------------------------------------------------------------

/// Tower layer holding a gate permit for the whole inner call and handing
/// a clone to the inner service.
#[derive(Debug, Clone)]
pub struct AdmissionLayer {
    gate: AdmissionGate,
}

impl<S> Layer<S> for AdmissionLayer {
    type Service = AdmissionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AdmissionService {
            inner,
            gate: self.gate.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// AdmissionService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AdmissionService<S> {
    inner: S,
    gate: AdmissionGate,
}

impl<S, B> Service<Request<B>> for AdmissionService<S>
where
    S: Service<Request<B>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<S::Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        // Keep the instance that was polled ready; leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let gate = self.gate.clone();

        Box::pin(async move {
            let permit = gate.acquire().await;
            if let Some(permit) = &permit {
                req.extensions_mut().insert(permit.clone());
            }
            let result = inner.call(req).await;
            drop(permit);
            result
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
