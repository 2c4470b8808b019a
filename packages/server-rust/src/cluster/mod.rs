//! Sibling-node cooperation.
//!
//! Nodes share rendition caches over plain HTTP. A node that misses its
//! own cache asks each configured sibling for the same URI with
//! [`CACHE_ONLY_HEADER`] set. The sibling answers strictly from its cache,
//! reading the key passed in [`CACHE_DESTINATION_HEADER`], and never asks
//! further siblings. That keeps fallback to a single hop.

mod peers;

pub use peers::{PeerError, PeerFallback};

/// Marks a request that must be answered from the cache alone.
pub const CACHE_ONLY_HEADER: &str = "x-cache-only";

/// Cache key the answering node should read.
pub const CACHE_DESTINATION_HEADER: &str = "x-cache-destination";
