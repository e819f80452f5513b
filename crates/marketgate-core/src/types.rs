//! Core types shared across the gateway.
//!
//! # Overview
//!
//! ## Served Payloads
//! - [`MarketView`]: one market as returned by `GET /api/market/{id}`
//! - [`MarketPage`]: a page of markets with the collection total
//! - [`TopMarkets`]: the top-N open markets by pool size
//!
//! ## Response Metadata
//! - [`CacheStatus`]: which tier produced a response, rendered into `X-Cache`
//! - [`Environment`]: strict (production) versus permissive deployments
//!
//! Pool sizes and timestamps are `uint256` on chain and are carried as decimal
//! strings so they never lose precision through `f64`.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// A single market, flattened from the contract getters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketView {
    pub id: u64,
    pub question: String,
    pub yes_pool: String,
    pub no_pool: String,
    pub status: u8,
    pub outcome: bool,
    pub close_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin: Option<MarketAdminFlags>,
}

impl MarketView {
    /// Whether the market is still accepting positions.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == 0
    }

    /// Sum of both pools. Unparseable pool strings count as zero.
    #[must_use]
    pub fn total_pool(&self) -> U256 {
        let yes = U256::from_str(&self.yes_pool).unwrap_or_default();
        let no = U256::from_str(&self.no_pool).unwrap_or_default();
        yes.saturating_add(no)
    }
}

/// Opaque admin getters, passed through as read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketAdminFlags {
    pub paused: bool,
    pub dispute_used: bool,
    pub dispute_active: bool,
}

/// One page of markets in ascending id order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketPage {
    pub items: Vec<MarketView>,
    pub total: u64,
}

impl MarketPage {
    #[must_use]
    pub fn empty() -> Self {
        Self { items: Vec::new(), total: 0 }
    }
}

/// Top open markets ordered by total pool, largest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopMarkets {
    pub items: Vec<MarketView>,
}

/// Which tier produced a response.
///
/// ```
/// use marketgate_core::types::CacheStatus;
///
/// assert_eq!(CacheStatus::MemoryFresh.to_string(), "memory:fresh");
/// assert_eq!(CacheStatus::Fallback.to_string(), "fallback");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheStatus {
    /// In-process entry within its TTL.
    MemoryFresh,
    /// In-process entry past its TTL but inside the stale window.
    MemoryStale,
    /// Served from the distributed tier.
    Redis,
    /// Computed from upstream reads for this request.
    Miss,
    /// Degraded answer: stale data after an upstream failure, or a placeholder.
    Fallback,
}

impl CacheStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MemoryFresh => "memory:fresh",
            Self::MemoryStale => "memory:stale",
            Self::Redis => "redis",
            Self::Miss => "miss",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment environment.
///
/// Production is strict: a missing RPC configuration is an error. Everything else is
/// permissive and answers with empty placeholders instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    #[default]
    Development,
    Local,
    Test,
}

impl Environment {
    #[must_use]
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Development => "development",
            Self::Local => "local",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
