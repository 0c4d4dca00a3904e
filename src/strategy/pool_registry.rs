//! Registry of the farm pools currently in use
//!
//! A bounded arena: at most `MAX_POOLS` entries, unique pool ids,
//! allocation weights summing to at most 100%. Entries are addressed by
//! index (for removal) or by pool id (for everything else).

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, VaultError};
use crate::math::PERCENT_DIVISOR;
use crate::tokens::format_route;

/// Maximum number of pools the strategy may use at once
pub const MAX_POOLS: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolEntry {
    pub pool_id: u64,

    /// Reward token first, base asset last
    pub route: Vec<Address>,

    /// Share of freshly deployed capital sent to this pool
    pub allocation_bps: u16,

    /// Principal the strategy believes it has staked here
    pub tracked_balance: U256,
}

impl PoolEntry {
    /// Token claimed from this pool
    pub fn reward_token(&self) -> Address {
        self.route[0]
    }
}

#[derive(Debug, Clone, Default)]
pub struct PoolRegistry {
    entries: Vec<PoolEntry>,
}

/// A route must be non-empty and end in the base asset
pub fn validate_route(route: &[Address], base: Address) -> Result<()> {
    match route.last() {
        None => Err(VaultError::InvalidRoute("route is empty".to_string())),
        Some(last) if *last != base => Err(VaultError::InvalidRoute(format!(
            "{} does not end in the base asset",
            format_route(route)
        ))),
        Some(_) => Ok(()),
    }
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PoolEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&PoolEntry> {
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut PoolEntry> {
        self.entries.get_mut(index)
    }

    pub fn position(&self, pool_id: u64) -> Option<usize> {
        self.entries.iter().position(|e| e.pool_id == pool_id)
    }

    pub fn find(&self, pool_id: u64) -> Option<&PoolEntry> {
        self.entries.iter().find(|e| e.pool_id == pool_id)
    }

    pub fn find_mut(&mut self, pool_id: u64) -> Option<&mut PoolEntry> {
        self.entries.iter_mut().find(|e| e.pool_id == pool_id)
    }

    pub fn contains(&self, pool_id: u64) -> bool {
        self.position(pool_id).is_some()
    }

    /// Sum of allocation weights in bps
    pub fn total_allocation_bps(&self) -> u32 {
        self.entries.iter().map(|e| e.allocation_bps as u32).sum()
    }

    /// Sum of tracked principal across pools
    pub fn total_tracked(&self) -> U256 {
        self.entries
            .iter()
            .fold(U256::ZERO, |acc, e| acc + e.tracked_balance)
    }

    /// Check an add before any side effect happens
    pub fn check_add(&self, pool_id: u64, route: &[Address], base: Address) -> Result<()> {
        if self.entries.len() >= MAX_POOLS {
            return Err(VaultError::PoolCapExceeded(MAX_POOLS));
        }
        if self.contains(pool_id) {
            return Err(VaultError::DuplicatePool(pool_id));
        }
        validate_route(route, base)
    }

    pub fn add(&mut self, pool_id: u64, route: Vec<Address>, base: Address) -> Result<&PoolEntry> {
        self.check_add(pool_id, &route, base)?;
        self.entries.push(PoolEntry {
            pool_id,
            route,
            allocation_bps: 0,
            tracked_balance: U256::ZERO,
        });
        Ok(&self.entries[self.entries.len() - 1])
    }

    /// Remove by index, keeping the order of the remaining entries
    pub fn remove(&mut self, index: usize) -> Result<PoolEntry> {
        if index >= self.entries.len() {
            return Err(VaultError::IndexOutOfRange {
                index,
                len: self.entries.len(),
            });
        }
        Ok(self.entries.remove(index))
    }

    pub fn set_route(&mut self, pool_id: u64, route: Vec<Address>, base: Address) -> Result<()> {
        validate_route(&route, base)?;
        let entry = self.find_mut(pool_id).ok_or(VaultError::UnknownPool(pool_id))?;
        entry.route = route;
        Ok(())
    }

    /// Set one pool's weight, rejecting a total above 100%
    pub fn set_allocation(&mut self, pool_id: u64, bps: u16) -> Result<()> {
        let current = self
            .find(pool_id)
            .map(|e| e.allocation_bps as u32)
            .ok_or(VaultError::UnknownPool(pool_id))?;
        let total = self.total_allocation_bps() - current + bps as u32;
        if total > PERCENT_DIVISOR {
            return Err(VaultError::AllocationOverflow(total));
        }
        if let Some(entry) = self.find_mut(pool_id) {
            entry.allocation_bps = bps;
        }
        Ok(())
    }

    /// Replace every weight at once (all-or-nothing)
    pub fn set_allocations(&mut self, weights: &[(u64, u16)]) -> Result<()> {
        let total: u32 = weights.iter().map(|(_, bps)| *bps as u32).sum();
        if total > PERCENT_DIVISOR {
            return Err(VaultError::AllocationOverflow(total));
        }
        for (pool_id, _) in weights {
            if !self.contains(*pool_id) {
                return Err(VaultError::UnknownPool(*pool_id));
            }
        }
        for entry in &mut self.entries {
            entry.allocation_bps = weights
                .iter()
                .find(|(id, _)| *id == entry.pool_id)
                .map(|(_, bps)| *bps)
                .unwrap_or(0);
        }
        Ok(())
    }
}
