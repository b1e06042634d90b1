//! Shared layer token allocator.
//!
//! Wraps the [`Ledger`] in a `tokio::sync::Mutex`. Requests with a
//! `max_wait_time` give up waiting for the lock after that long and receive
//! a failed result instead of blocking.

use crate::AllocatorError;
use crate::ledger::{AllocatorStats, LayerUsage, Ledger};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use storyweave_config::AllocatorConfig;
use storyweave_core::{AllocationRequest, AllocationResult, MemoryLayer};
use tokio::sync::Mutex;

/// The layer token allocator. Construct once and share via `Arc`.
#[derive(Debug)]
pub struct LayerTokenAllocator {
    config: AllocatorConfig,
    ledger: Mutex<Ledger>,
    /// Requests that timed out before reaching the ledger.
    timed_out: AtomicU64,
}

impl LayerTokenAllocator {
    /// Create an allocator, failing fast on an invalid configuration.
    pub fn new(config: AllocatorConfig) -> Result<Self, AllocatorError> {
        let ledger = Ledger::from_config(&config)?;
        tracing::debug!(
            available = ledger.available(),
            mode = ?config.allocation_mode,
            strategy = %config.overflow_strategy,
            "Layer token allocator ready"
        );
        Ok(Self {
            config,
            ledger: Mutex::new(ledger),
            timed_out: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Allocatable tokens: `max_tokens - buffer_tokens`.
    pub fn available(&self) -> usize {
        self.config.available()
    }

    /// Request tokens for a layer.
    ///
    /// Never errors: overflow, invalid requests and lock timeouts all come
    /// back as a failed [`AllocationResult`] with an `error_message`.
    pub async fn allocate(&self, request: AllocationRequest) -> AllocationResult {
        let started = Instant::now();

        let mut ledger = match request.max_wait_time {
            Some(wait) => match tokio::time::timeout(wait, self.ledger.lock()).await {
                Ok(guard) => guard,
                Err(_) => {
                    self.timed_out.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        layer = %request.layer,
                        requested = request.requested_tokens,
                        waited_ms = wait.as_millis() as u64,
                        "Allocation timed out waiting for the ledger"
                    );
                    return AllocationResult::failed(format!(
                        "Timed out after {wait:?} waiting to allocate {} tokens for {} layer",
                        request.requested_tokens, request.layer
                    ))
                    .with_wait_time(started.elapsed());
                }
            },
            None => self.ledger.lock().await,
        };

        ledger.allocate(&request).with_wait_time(started.elapsed())
    }

    /// Return tokens from a layer to the pool. Borrowed tokens are repaid
    /// first. Returns the number of tokens actually released.
    pub async fn release(&self, layer: MemoryLayer, tokens: usize) -> usize {
        let released = self.ledger.lock().await.release(layer, tokens);
        tracing::debug!(layer = %layer, released, "Released tokens");
        released
    }

    /// Snapshot of every layer's balance.
    pub async fn layer_usage(&self) -> BTreeMap<MemoryLayer, LayerUsage> {
        self.ledger.lock().await.layers().clone()
    }

    /// Unallocated tokens in the pool.
    pub async fn remaining(&self) -> usize {
        self.ledger.lock().await.remaining()
    }

    pub async fn stats(&self) -> AllocatorStats {
        let mut stats = self.ledger.lock().await.stats().clone();
        let timed_out = self.timed_out.load(Ordering::Relaxed);
        stats.timed_out_requests = timed_out;
        stats.total_requests += timed_out;
        stats
    }

    /// Drop every allocation and zero the statistics.
    pub async fn reset(&self) {
        let mut ledger = self.ledger.lock().await;
        ledger.reset();
        self.timed_out.store(0, Ordering::Relaxed);
        drop(ledger);
        tracing::info!("Allocator reset");
    }
}
