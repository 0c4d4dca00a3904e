//! Harvest log and log-based APR
//!
//! Fixed-capacity ring buffer of `{timestamp, total managed assets}`
//! snapshots written after every successful harvest. Harvests closer
//! together than the log cadence are coalesced into the tail entry so a
//! burst of rapid harvests does not skew the annualised figures.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::math::{PERCENT_DIVISOR, SECONDS_PER_YEAR};

/// Entries kept before the oldest is overwritten
pub const HARVEST_LOG_CAPACITY: usize = 100;

/// Default minimum spacing between log entries (seconds)
pub const DEFAULT_LOG_CADENCE: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestLogEntry {
    pub timestamp: u64,
    pub total_managed_assets: U256,
}

/// What `record` did with a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogWrite {
    Appended,
    Coalesced,
}

#[derive(Debug, Clone)]
pub struct HarvestLog {
    entries: VecDeque<HarvestLogEntry>,
    capacity: usize,
    cadence: u64,
}

impl Default for HarvestLog {
    fn default() -> Self {
        Self::new(HARVEST_LOG_CAPACITY, DEFAULT_LOG_CADENCE)
    }
}

impl HarvestLog {
    pub fn new(capacity: usize, cadence: u64) -> Self {
        let capacity = capacity.max(2);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            cadence,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn cadence(&self) -> u64 {
        self.cadence
    }

    pub fn set_cadence(&mut self, seconds: u64) {
        self.cadence = seconds;
    }

    pub fn latest(&self) -> Option<&HarvestLogEntry> {
        self.entries.back()
    }

    /// Oldest first
    pub fn entries(&self) -> impl Iterator<Item = &HarvestLogEntry> {
        self.entries.iter()
    }

    /// Store a post-harvest snapshot
    ///
    /// A snapshot less than one cadence after the tail (or not after it at
    /// all) refreshes the tail's assets in place. The tail keeps its
    /// timestamp, so a steady stream of quick harvests still appends once
    /// per cadence.
    pub fn record(&mut self, timestamp: u64, total_managed_assets: U256) -> LogWrite {
        if let Some(tail) = self.entries.back_mut() {
            let elapsed = timestamp.saturating_sub(tail.timestamp);
            if timestamp <= tail.timestamp || elapsed < self.cadence {
                tail.total_managed_assets = total_managed_assets;
                return LogWrite::Coalesced;
            }
        }

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(HarvestLogEntry {
            timestamp,
            total_managed_assets,
        });
        LogWrite::Appended
    }

    /// Mean annualised return in bps over the most recent `n` intervals
    ///
    /// `n` counts intervals between consecutive entries, so it reads the
    /// last `n + 1` entries. A single harvest interval is then `n = 1`
    /// rather than a degenerate one-entry window. Uses whatever history
    /// exists when fewer than `n` intervals are logged; returns 0 with
    /// fewer than two entries. Drawdowns count as negative returns.
    pub fn average_apr_across_last_n_harvests(&self, n: usize) -> i128 {
        if self.entries.len() < 2 || n == 0 {
            return 0;
        }

        let mut sum: i128 = 0;
        let mut counted: i128 = 0;
        for i in (1..self.entries.len()).rev().take(n) {
            if let Some(apr) = interval_apr_bps(&self.entries[i - 1], &self.entries[i]) {
                sum = sum.saturating_add(apr);
                counted += 1;
            }
        }

        if counted == 0 {
            0
        } else {
            sum / counted
        }
    }
}

/// Annualised return between two snapshots, in bps
///
/// `None` when the interval has no duration or starts from zero assets.
pub fn interval_apr_bps(prev: &HarvestLogEntry, cur: &HarvestLogEntry) -> Option<i128> {
    let elapsed = cur.timestamp.checked_sub(prev.timestamp)?;
    if elapsed == 0 || prev.total_managed_assets.is_zero() {
        return None;
    }

    let (delta, negative) = if cur.total_managed_assets >= prev.total_managed_assets {
        (cur.total_managed_assets - prev.total_managed_assets, false)
    } else {
        (prev.total_managed_assets - cur.total_managed_assets, true)
    };

    let numerator = delta
        .checked_mul(U256::from(PERCENT_DIVISOR))?
        .checked_mul(U256::from(SECONDS_PER_YEAR))?;
    let denominator = prev.total_managed_assets.checked_mul(U256::from(elapsed))?;
    let magnitude = numerator / denominator;

    let magnitude = u128::try_from(magnitude)
        .ok()
        .and_then(|m| i128::try_from(m).ok())
        .unwrap_or(i128::MAX);

    Some(if negative { -magnitude } else { magnitude })
}
