//! Memory layers and the request/result types of the layer token allocator.

use crate::error::UnknownVariant;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// A named partition of the token economy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryLayer {
    /// The current scene / chapter being produced.
    Working,
    /// Prior chapters and recent events.
    Episodic,
    /// World and character knowledge.
    Semantic,
    /// Story-wide summaries and themes.
    LongTerm,
}

impl MemoryLayer {
    pub const ALL: [MemoryLayer; 4] = [
        MemoryLayer::Working,
        MemoryLayer::Episodic,
        MemoryLayer::Semantic,
        MemoryLayer::LongTerm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Working => "working",
            Self::Episodic => "episodic",
            Self::Semantic => "semantic",
            Self::LongTerm => "long_term",
        }
    }
}

impl fmt::Display for MemoryLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryLayer {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        MemoryLayer::ALL
            .into_iter()
            .find(|l| l.as_str() == normalized)
            .ok_or_else(|| UnknownVariant::new("memory layer", s))
    }
}

/// Whether tokens may move between layers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMode {
    /// Layers never give up tokens to each other.
    Static,
    /// Reallocation and borrowing between layers are allowed.
    #[default]
    Dynamic,
}

impl FromStr for AllocationMode {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(Self::Static),
            "dynamic" => Ok(Self::Dynamic),
            _ => Err(UnknownVariant::new("allocation mode", s)),
        }
    }
}

/// Policy applied when a request exceeds the remaining pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowStrategy {
    Reject,
    #[default]
    Truncate,
    Reallocate,
    Borrow,
}

impl OverflowStrategy {
    /// Strategies that move tokens across layers and therefore need dynamic mode.
    pub fn requires_dynamic(&self) -> bool {
        matches!(self, Self::Reallocate | Self::Borrow)
    }
}

impl fmt::Display for OverflowStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Reject => "reject",
            Self::Truncate => "truncate",
            Self::Reallocate => "reallocate",
            Self::Borrow => "borrow",
        };
        f.write_str(s)
    }
}

impl FromStr for OverflowStrategy {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "truncate" => Ok(Self::Truncate),
            "reallocate" => Ok(Self::Reallocate),
            "borrow" => Ok(Self::Borrow),
            _ => Err(UnknownVariant::new("overflow strategy", s)),
        }
    }
}

/// A request for tokens in one memory layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub layer: MemoryLayer,
    /// Must be greater than zero.
    pub requested_tokens: usize,
    /// 1 (lowest) to 10 (highest).
    #[serde(default = "default_request_priority")]
    pub priority: u8,
    #[serde(default = "default_true")]
    pub can_be_truncated: bool,
    /// Soft timeout for acquiring the ledger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_wait_time: Option<Duration>,
}

fn default_request_priority() -> u8 {
    5
}

fn default_true() -> bool {
    true
}

impl AllocationRequest {
    pub fn new(layer: MemoryLayer, requested_tokens: usize) -> Self {
        Self {
            layer,
            requested_tokens,
            priority: default_request_priority(),
            can_be_truncated: true,
            max_wait_time: None,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn truncatable(mut self, allowed: bool) -> Self {
        self.can_be_truncated = allowed;
        self
    }

    pub fn with_max_wait(mut self, wait: Duration) -> Self {
        self.max_wait_time = Some(wait);
        self
    }
}

/// Outcome of an allocation attempt. Overflow is data, never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub success: bool,
    /// Between 0 and the requested amount.
    pub granted_tokens: usize,
    pub truncated: bool,
    /// Portion of the grant taken beyond the available pool.
    pub borrowed_tokens: usize,
    /// Time spent waiting for the ledger.
    pub wait_time: Duration,
    /// Set if and only if `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AllocationResult {
    pub fn granted(tokens: usize) -> Self {
        Self {
            success: true,
            granted_tokens: tokens,
            truncated: false,
            borrowed_tokens: 0,
            wait_time: Duration::ZERO,
            error_message: None,
        }
    }

    pub fn truncated_to(tokens: usize) -> Self {
        Self {
            truncated: true,
            ..Self::granted(tokens)
        }
    }

    pub fn borrowed(tokens: usize, borrowed: usize) -> Self {
        Self {
            borrowed_tokens: borrowed,
            ..Self::granted(tokens)
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            granted_tokens: 0,
            truncated: false,
            borrowed_tokens: 0,
            wait_time: Duration::ZERO,
            error_message: Some(message.into()),
        }
    }

    pub fn with_wait_time(mut self, wait: Duration) -> Self {
        self.wait_time = wait;
        self
    }
}
