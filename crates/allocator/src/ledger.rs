//! The token ledger: per-layer balances and the overflow strategies.
//!
//! The ledger is plain data with no locking. [`crate::LayerTokenAllocator`]
//! owns it behind a mutex so every mutation, including reallocation
//! rollback, happens inside one critical section.
//!
//! Invariant: `Σ allocated ≤ available + Σ borrowed` after every call.

use serde::Serialize;
use std::collections::BTreeMap;
use storyweave_config::{AllocatorConfig, ConfigError};
use storyweave_core::{
    AllocationMode, AllocationRequest, AllocationResult, MemoryLayer, OverflowStrategy,
};

const MIN_PRIORITY: u8 = 1;
const MAX_PRIORITY: u8 = 10;

/// Requests at or above this priority may reclaim tokens in dynamic mode
/// even under `Reject` or `Truncate`.
pub const HIGH_PRIORITY: u8 = 8;

/// Share of the request a high-priority caller is guaranteed, in percent.
const GUARANTEED_SHARE_PERCENT: usize = 80;

/// Balance of a single layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LayerUsage {
    pub allocated: usize,
    /// Portion of `allocated` taken beyond the pool; repaid first on release.
    pub borrowed: usize,
    /// Highest priority granted to this layer; 0 when empty.
    pub claim_priority: u8,
}

/// Running allocator statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AllocatorStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub tokens_granted: u64,
    pub truncated_requests: u64,
    pub rejected_requests: u64,
    pub timed_out_requests: u64,
    pub tokens_borrowed: u64,
    pub tokens_reclaimed: u64,
}

impl AllocatorStats {
    /// Fraction of requests that succeeded (0.0 when none were made).
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.successful_requests as f64 / self.total_requests as f64
    }
}

#[derive(Debug, Clone)]
pub struct Ledger {
    available: usize,
    mode: AllocationMode,
    strategy: OverflowStrategy,
    caps: BTreeMap<MemoryLayer, usize>,
    layers: BTreeMap<MemoryLayer, LayerUsage>,
    stats: AllocatorStats,
}

impl Ledger {
    /// Build an empty ledger, validating `config` first.
    pub fn from_config(config: &AllocatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            available: config.available(),
            mode: config.allocation_mode,
            strategy: config.overflow_strategy,
            caps: config.layer_caps()?,
            layers: empty_layers(),
            stats: AllocatorStats::default(),
        })
    }

    pub fn available(&self) -> usize {
        self.available
    }

    pub fn total_allocated(&self) -> usize {
        self.layers.values().map(|u| u.allocated).sum()
    }

    pub fn total_borrowed(&self) -> usize {
        self.layers.values().map(|u| u.borrowed).sum()
    }

    /// Unallocated tokens in the pool.
    pub fn remaining(&self) -> usize {
        self.available.saturating_sub(self.total_allocated())
    }

    pub fn usage(&self, layer: MemoryLayer) -> LayerUsage {
        self.layers.get(&layer).copied().unwrap_or_default()
    }

    pub fn layers(&self) -> &BTreeMap<MemoryLayer, LayerUsage> {
        &self.layers
    }

    pub fn stats(&self) -> &AllocatorStats {
        &self.stats
    }

    pub fn reset(&mut self) {
        self.layers = empty_layers();
        self.stats = AllocatorStats::default();
    }

    /// Tokens `layer` can take right now without any overflow handling.
    fn headroom(&self, layer: MemoryLayer) -> usize {
        let pool = self.remaining();
        match (self.mode, self.caps.get(&layer)) {
            (AllocationMode::Static, Some(cap)) => {
                pool.min(cap.saturating_sub(self.usage(layer).allocated))
            }
            _ => pool,
        }
    }

    pub fn allocate(&mut self, request: &AllocationRequest) -> AllocationResult {
        self.stats.total_requests += 1;

        if let Err(message) = validate_request(request) {
            return self.reject(request, message);
        }

        let requested = request.requested_tokens;
        let headroom = self.headroom(request.layer);
        if headroom >= requested {
            self.commit(request, requested, 0);
            return AllocationResult::granted(requested);
        }

        if self.mode == AllocationMode::Dynamic
            && request.priority >= HIGH_PRIORITY
            && matches!(self.strategy, OverflowStrategy::Reject | OverflowStrategy::Truncate)
            && let Some(result) = self.guarantee_high_priority(request)
        {
            return result;
        }

        match self.strategy {
            OverflowStrategy::Reject => {
                let message = overflow_message(request, headroom);
                self.reject(request, message)
            }
            OverflowStrategy::Truncate if request.can_be_truncated => {
                self.commit(request, headroom, 0);
                self.stats.truncated_requests += 1;
                tracing::debug!(
                    layer = %request.layer,
                    requested,
                    granted = headroom,
                    "Allocation truncated"
                );
                AllocationResult::truncated_to(headroom)
            }
            OverflowStrategy::Truncate => {
                let message = format!(
                    "{}; request cannot be truncated",
                    overflow_message(request, headroom)
                );
                self.reject(request, message)
            }
            OverflowStrategy::Reallocate => self.reallocate(request, headroom),
            OverflowStrategy::Borrow => self.borrow(request, headroom),
        }
    }

    /// Return up to `tokens` from `layer` to the pool, repaying borrowed
    /// tokens first. Returns how many tokens were released.
    pub fn release(&mut self, layer: MemoryLayer, tokens: usize) -> usize {
        let usage = self.layers.entry(layer).or_default();
        let released = tokens.min(usage.allocated);
        usage.allocated -= released;
        usage.borrowed -= usage.borrowed.min(released);
        if usage.allocated == 0 {
            usage.claim_priority = 0;
        }
        released
    }

    fn commit(&mut self, request: &AllocationRequest, tokens: usize, borrowed: usize) {
        let usage = self.layers.entry(request.layer).or_default();
        usage.allocated += tokens;
        usage.borrowed += borrowed;
        if tokens > 0 {
            usage.claim_priority = usage.claim_priority.max(request.priority);
        }
        self.stats.successful_requests += 1;
        self.stats.tokens_granted += tokens as u64;
        self.stats.tokens_borrowed += borrowed as u64;
    }

    fn reject(&mut self, request: &AllocationRequest, message: String) -> AllocationResult {
        self.stats.rejected_requests += 1;
        tracing::warn!(
            layer = %request.layer,
            requested = request.requested_tokens,
            priority = request.priority,
            "Allocation rejected: {message}"
        );
        AllocationResult::failed(message)
    }

    /// Tokens that must be freed so `target` fits, accounting for any
    /// over-allocation left by borrowing.
    fn deficit(&self, layer: MemoryLayer, target: usize) -> usize {
        let overshoot = self.total_allocated().saturating_sub(self.available);
        target.saturating_sub(self.headroom(layer)) + overshoot
    }

    /// Take up to `needed` tokens from layers whose claim is below
    /// `priority` and that owe nothing. Lowest claims are drained first.
    fn reclaim(
        &mut self,
        layer: MemoryLayer,
        priority: u8,
        needed: usize,
    ) -> Vec<(MemoryLayer, usize)> {
        let mut victims: Vec<(MemoryLayer, LayerUsage)> = self
            .layers
            .iter()
            .filter(|(l, u)| {
                **l != layer && u.claim_priority < priority && u.borrowed == 0 && u.allocated > 0
            })
            .map(|(l, u)| (*l, *u))
            .collect();
        victims.sort_by_key(|(l, u)| (u.claim_priority, *l));

        let mut taken = Vec::new();
        let mut left = needed;
        for (victim, usage) in victims {
            if left == 0 {
                break;
            }
            let take = usage.allocated.min(left);
            if let Some(u) = self.layers.get_mut(&victim) {
                u.allocated -= take;
            }
            taken.push((victim, take));
            left -= take;
        }
        taken
    }

    fn restore(&mut self, taken: &[(MemoryLayer, usize)]) {
        for (layer, tokens) in taken {
            self.layers.entry(*layer).or_default().allocated += tokens;
        }
    }

    fn reallocate(&mut self, request: &AllocationRequest, headroom: usize) -> AllocationResult {
        if self.mode != AllocationMode::Dynamic {
            let message = format!(
                "{}; reallocation requires dynamic allocation mode",
                overflow_message(request, headroom)
            );
            return self.reject(request, message);
        }

        let requested = request.requested_tokens;
        let needed = self.deficit(request.layer, requested);
        let taken = self.reclaim(request.layer, request.priority, needed);
        let freed: usize = taken.iter().map(|(_, t)| t).sum();

        if self.headroom(request.layer) < requested {
            self.restore(&taken);
            let message = format!(
                "{}; could only free {freed} of {needed} tokens from lower-priority layers",
                overflow_message(request, headroom)
            );
            return self.reject(request, message);
        }

        self.stats.tokens_reclaimed += freed as u64;
        self.commit(request, requested, 0);
        tracing::info!(
            layer = %request.layer,
            requested,
            reclaimed = freed,
            "Reallocated tokens from lower-priority layers"
        );
        AllocationResult::granted(requested)
    }

    fn borrow(&mut self, request: &AllocationRequest, headroom: usize) -> AllocationResult {
        if self.mode != AllocationMode::Dynamic {
            let message = format!(
                "{}; borrowing requires dynamic allocation mode",
                overflow_message(request, headroom)
            );
            return self.reject(request, message);
        }

        let requested = request.requested_tokens;
        let excess = requested - headroom;
        self.commit(request, requested, excess);
        tracing::info!(
            layer = %request.layer,
            requested,
            borrowed = excess,
            "Borrowed tokens beyond the pool"
        );
        AllocationResult::borrowed(requested, excess)
    }

    /// Reclaim from lower-priority layers until at least the guaranteed
    /// share fits. Rolls back and returns `None` when it cannot.
    fn guarantee_high_priority(&mut self, request: &AllocationRequest) -> Option<AllocationResult> {
        let requested = request.requested_tokens;
        let guaranteed = (requested * GUARANTEED_SHARE_PERCENT).div_ceil(100);

        let needed = self.deficit(request.layer, requested);
        let taken = self.reclaim(request.layer, request.priority, needed);
        let headroom = self.headroom(request.layer);
        let granted = headroom.min(requested);
        if taken.is_empty()
            || headroom < guaranteed
            || (granted < requested && !request.can_be_truncated)
        {
            self.restore(&taken);
            return None;
        }

        let freed: usize = taken.iter().map(|(_, t)| t).sum();
        self.stats.tokens_reclaimed += freed as u64;
        self.commit(request, granted, 0);
        tracing::info!(
            layer = %request.layer,
            requested,
            granted,
            reclaimed = freed,
            "High-priority request reclaimed tokens"
        );

        if granted < requested {
            self.stats.truncated_requests += 1;
            Some(AllocationResult::truncated_to(granted))
        } else {
            Some(AllocationResult::granted(granted))
        }
    }
}

fn empty_layers() -> BTreeMap<MemoryLayer, LayerUsage> {
    MemoryLayer::ALL
        .into_iter()
        .map(|layer| (layer, LayerUsage::default()))
        .collect()
}

fn validate_request(request: &AllocationRequest) -> Result<(), String> {
    if request.requested_tokens == 0 {
        return Err("requested_tokens must be greater than 0".into());
    }
    if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&request.priority) {
        return Err(format!(
            "priority must be between {MIN_PRIORITY} and {MAX_PRIORITY}, got {}",
            request.priority
        ));
    }
    Ok(())
}

fn overflow_message(request: &AllocationRequest, headroom: usize) -> String {
    format!(
        "Requested {} tokens for {} layer but only {} available (overflow of {} tokens)",
        request.requested_tokens,
        request.layer,
        headroom,
        request.requested_tokens.saturating_sub(headroom)
    )
}
