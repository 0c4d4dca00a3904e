//! In-memory MasterChef-style farm
//!
//! Every pool takes the same stake token and streams its own reward token
//! at a fixed annual rate per staked unit. Rewards accrue against the
//! injected clock, so tests drive time explicitly.

use alloy_primitives::{Address, U256};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::adapters::Farm;
use crate::clock::Clock;
use crate::errors::ExternalError;
use crate::math::{unit, PERCENT_DIVISOR, SECONDS_PER_YEAR};
use crate::tokens::{symbol_of, TokenBank};

#[derive(Debug, Clone, Default)]
struct Position {
    staked: U256,
    accrued: U256,
    last_update: u64,
}

#[derive(Debug)]
struct SimPool {
    reward_token: Address,

    /// Reward base units per stake base unit per year, scaled by 1e18
    rate_wad: U256,

    positions: HashMap<Address, Position>,
}

#[derive(Debug, Default)]
struct FarmState {
    pools: BTreeMap<u64, SimPool>,
    failing_claims: HashSet<u64>,
    jitter: Option<(u16, StdRng)>,
}

/// Shared-state farm; clones are handles to the same pools
#[derive(Clone)]
pub struct SimFarm {
    address: Address,
    stake_token: Address,
    bank: TokenBank,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<FarmState>>,
}

impl std::fmt::Debug for SimFarm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimFarm")
            .field("address", &self.address)
            .field("stake_token", &self.stake_token)
            .finish()
    }
}

fn accrue(position: &mut Position, rate_wad: U256, now: u64) {
    let elapsed = now.saturating_sub(position.last_update);
    if elapsed > 0 && !position.staked.is_zero() {
        let earned = position
            .staked
            .saturating_mul(rate_wad)
            .saturating_mul(U256::from(elapsed))
            / (unit(18) * U256::from(SECONDS_PER_YEAR));
        position.accrued += earned;
    }
    position.last_update = position.last_update.max(now);
}

impl SimFarm {
    pub fn new(address: Address, stake_token: Address, bank: TokenBank, clock: Arc<dyn Clock>) -> Self {
        Self {
            address,
            stake_token,
            bank,
            clock,
            state: Arc::new(Mutex::new(FarmState::default())),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Register (or replace the emission of) a pool
    pub fn add_pool(&self, pool_id: u64, reward_token: Address, rate_wad: U256) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .pools
            .entry(pool_id)
            .and_modify(|pool| {
                pool.reward_token = reward_token;
                pool.rate_wad = rate_wad;
            })
            .or_insert_with(|| SimPool {
                reward_token,
                rate_wad,
                positions: HashMap::new(),
            });
        debug!("Farm pool #{} emits {} at rate {}", pool_id, symbol_of(&reward_token), rate_wad);
    }

    /// Make claims on a pool revert until cleared
    pub fn set_claim_failing(&self, pool_id: u64, failing: bool) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if failing {
            state.failing_claims.insert(pool_id);
        } else {
            state.failing_claims.remove(&pool_id);
        }
    }

    /// Scale every claim by a random factor in `[1 - bps, 1 + bps]`
    pub fn with_jitter(self, bps: u16, seed: u64) -> Self {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.jitter = if bps == 0 {
                None
            } else {
                Some((bps.min(PERCENT_DIVISOR as u16), StdRng::seed_from_u64(seed)))
            };
        }
        self
    }
}

impl Farm for SimFarm {
    fn stake_token(&self) -> Address {
        self.stake_token
    }

    fn reward_token(&self, pool_id: u64) -> Result<Address, ExternalError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .pools
            .get(&pool_id)
            .map(|pool| pool.reward_token)
            .ok_or(ExternalError::UnknownPool(pool_id))
    }

    fn deposit(&mut self, pool_id: u64, owner: Address, amount: U256) -> Result<(), ExternalError> {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let pool = state
            .pools
            .get_mut(&pool_id)
            .ok_or(ExternalError::UnknownPool(pool_id))?;
        self.bank.transfer(self.stake_token, owner, self.address, amount)?;

        let rate = pool.rate_wad;
        let position = pool.positions.entry(owner).or_insert_with(|| Position {
            last_update: now,
            ..Position::default()
        });
        accrue(position, rate, now);
        position.staked += amount;
        Ok(())
    }

    fn withdraw(&mut self, pool_id: u64, owner: Address, amount: U256) -> Result<(), ExternalError> {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let pool = state
            .pools
            .get_mut(&pool_id)
            .ok_or(ExternalError::UnknownPool(pool_id))?;
        let rate = pool.rate_wad;
        let position = pool.positions.entry(owner).or_default();
        if position.staked < amount {
            return Err(ExternalError::InsufficientBalance {
                token: format!("staked {}", symbol_of(&self.stake_token)),
                available: position.staked,
                required: amount,
            });
        }
        accrue(position, rate, now);
        self.bank.transfer(self.stake_token, self.address, owner, amount)?;
        position.staked -= amount;
        Ok(())
    }

    fn claim(&mut self, pool_id: u64, owner: Address) -> Result<U256, ExternalError> {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.failing_claims.contains(&pool_id) {
            return Err(ExternalError::Reverted(format!("claim on pool {} reverted", pool_id)));
        }
        let FarmState { pools, jitter, .. } = &mut *state;
        let pool = pools.get_mut(&pool_id).ok_or(ExternalError::UnknownPool(pool_id))?;
        let rate = pool.rate_wad;
        let reward_token = pool.reward_token;
        let Some(position) = pool.positions.get_mut(&owner) else {
            return Ok(U256::ZERO);
        };
        accrue(position, rate, now);

        let mut amount = std::mem::take(&mut position.accrued);
        if let Some((bps, rng)) = jitter.as_mut() {
            let spread = rng.gen_range(0..=(*bps as u32 * 2));
            let factor = PERCENT_DIVISOR - *bps as u32 + spread;
            amount = amount * U256::from(factor) / U256::from(PERCENT_DIVISOR);
        }
        if !amount.is_zero() {
            self.bank.mint(reward_token, owner, amount);
        }
        Ok(amount)
    }

    fn pending_rewards(&self, pool_id: u64, owner: Address) -> U256 {
        let now = self.clock.now();
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .pools
            .get(&pool_id)
            .and_then(|pool| {
                pool.positions.get(&owner).map(|position| {
                    let mut preview = position.clone();
                    accrue(&mut preview, pool.rate_wad, now);
                    preview.accrued
                })
            })
            .unwrap_or(U256::ZERO)
    }

    fn staked(&self, pool_id: u64, owner: Address) -> U256 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .pools
            .get(&pool_id)
            .and_then(|pool| pool.positions.get(&owner))
            .map(|position| position.staked)
            .unwrap_or(U256::ZERO)
    }
}
