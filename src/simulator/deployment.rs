//! Wire a full vault + strategy deployment from a `Config`

use alloy_primitives::{address, Address, U256};
use eyre::Result;
use std::sync::Arc;
use tracing::{debug, info};

use super::{SimFarm, SimRouter, SimWrapper};
use crate::clock::ManualClock;
use crate::config::Config;
use crate::math::PERCENT_DIVISOR;
use crate::strategy::{
    BasisPointFeeRouter, CompoundingStrategy, Roles, StrategistPayee, StrategyParams,
};
use crate::tokens::{token_by_symbol, TokenBank, XBOO};
use crate::vault::{Vault, VaultConfig};

pub type SimStrategy = CompoundingStrategy<SimFarm, SimWrapper, SimRouter, BasisPointFeeRouter>;

// ============================================
// WELL-KNOWN ACTORS
// ============================================

pub const VAULT_ADDRESS: Address = address!("000000000000000000000000000000000000BA17");
pub const STRATEGY_ADDRESS: Address = address!("00000000000000000000000000000000000057A7");
pub const FARM_ADDRESS: Address = address!("000000000000000000000000000000000000FA53");
pub const OWNER: Address = address!("0000000000000000000000000000000000000AD1");
pub const KEEPER: Address = address!("000000000000000000000000000000000000C0DE");
pub const TREASURY: Address = address!("0000000000000000000000000000000000007EA5");

/// Simulated start time (2023-11-14)
pub const GENESIS: u64 = 1_700_000_000;

/// Strategist payout address by index
pub fn strategist_address(index: usize) -> Address {
    Address::with_last_byte(0x20u8.wrapping_add(index as u8))
}

/// Depositor address by index
pub fn depositor_address(index: usize) -> Address {
    Address::with_last_byte(0x40u8.wrapping_add(index as u8))
}

/// USD price to WAD
fn price_wad(usd: f64) -> U256 {
    U256::from((usd * 1e18).round() as u128)
}

/// Everything the keeper needs to drive one simulated deployment
pub struct Deployment {
    pub bank: TokenBank,
    pub clock: ManualClock,
    pub farm: SimFarm,
    pub wrapper: SimWrapper,
    pub router: SimRouter,
    pub vault: Vault<SimStrategy>,
    pub depositors: Vec<(String, Address)>,
}

impl Deployment {
    pub fn build(config: &Config) -> Result<Self> {
        config.validate()?;

        let base = token_by_symbol(&config.base_token)
            .ok_or_else(|| eyre::eyre!("Unknown base token '{}'", config.base_token))?;
        let bank = TokenBank::new();
        let clock = ManualClock::new(GENESIS);

        // Market
        let router = SimRouter::new(bank.clone(), config.swap_fee_bps);
        for (symbol, usd) in &config.prices_usd {
            let token = token_by_symbol(symbol)
                .ok_or_else(|| eyre::eyre!("Unknown token symbol '{}'", symbol))?;
            router.set_price(token.address, token.decimals, price_wad(*usd));
        }

        // Base is wrapped before it is staked
        let wrapper = SimWrapper::new(base.address, XBOO, bank.clone());

        // Farm: the APR is on staked value, so convert it into reward units per stake unit
        let farm = SimFarm::new(FARM_ADDRESS, XBOO, bank.clone(), Arc::new(clock.clone()))
            .with_jitter(config.reward_jitter_bps, config.rng_seed);
        let base_price = config.prices_usd.get(base.symbol).copied().unwrap_or(0.0);
        for pool in &config.pools {
            let reward_symbol = pool
                .route
                .first()
                .ok_or_else(|| eyre::eyre!("Pool {} has an empty route", pool.pool_id))?;
            let reward = token_by_symbol(reward_symbol)
                .ok_or_else(|| eyre::eyre!("Unknown token symbol '{}'", reward_symbol))?;
            let reward_price = config.prices_usd.get(reward_symbol).copied().unwrap_or(0.0);
            if reward_price <= 0.0 {
                return Err(eyre::eyre!("No usable price for {}", reward_symbol));
            }
            let apr = pool.reward_apr_bps as f64 / PERCENT_DIVISOR as f64;
            let rate = apr * base_price / reward_price
                * 10f64.powi(reward.decimals as i32 - base.decimals as i32 + 18);
            farm.add_pool(pool.pool_id, reward.address, U256::from(rate.round() as u128));
        }

        // Strategy
        let strategists: Vec<Address> = (0..config.strategist_weights.len())
            .map(strategist_address)
            .collect();
        let payees = config
            .strategist_weights
            .iter()
            .enumerate()
            .map(|(i, weight)| StrategistPayee {
                address: strategist_address(i),
                weight: *weight,
            })
            .collect();
        let fee_router = BasisPointFeeRouter::new(config.fee_split, TREASURY, payees);
        let params = StrategyParams {
            address: STRATEGY_ADDRESS,
            vault: VAULT_ADDRESS,
            want: base.address,
            roles: Roles {
                admins: vec![OWNER],
                strategists,
                keepers: vec![KEEPER],
            },
        };
        let mut strategy = CompoundingStrategy::new(
            params,
            bank.clone(),
            farm.clone(),
            wrapper.clone(),
            router.clone(),
            fee_router,
            Arc::new(clock.clone()),
        )?;
        for pool in &config.pools {
            let route = Config::resolve_route(&pool.route)?;
            strategy.add_used_pool(OWNER, pool.pool_id, route)?;
            strategy.set_allocation(OWNER, pool.pool_id, pool.allocation_bps)?;
        }
        strategy.update_harvest_log_cadence(OWNER, config.harvest_log_cadence_secs)?;
        strategy.set_harvest_gate(OWNER, config.harvest_gated)?;

        // Vault
        let vault_config = VaultConfig {
            address: VAULT_ADDRESS,
            owner: OWNER,
            want: base.address,
            decimals: base.decimals,
            treasury: TREASURY,
            tvl_cap: config.tvl_cap_units()?,
            deposit_fee_bps: config.deposit_fee_bps,
            withdraw_fee_bps: config.withdraw_fee_bps,
            approval_delay: config.approval_delay_secs,
        };
        let mut vault = Vault::new(vault_config, bank.clone(), Arc::new(clock.clone()))?;
        vault.initialize(OWNER, strategy)?;

        let depositors = config
            .depositors
            .iter()
            .enumerate()
            .map(|(i, d)| (d.label.clone(), depositor_address(i)))
            .collect();

        info!(
            "Deployment ready: {} pools, vault {:?}, strategy {:?}",
            config.pools.len(),
            VAULT_ADDRESS,
            STRATEGY_ADDRESS
        );
        Ok(Self {
            bank,
            clock,
            farm,
            wrapper,
            router,
            vault,
            depositors,
        })
    }

    /// Move simulated time forward, streaming the wrapper's yield over it
    pub fn advance(&self, config: &Config, seconds: u64) -> U256 {
        self.clock.advance(seconds);
        self.wrapper.stream_yield(config.wrapper_apr_bps, seconds)
    }

    /// Mint each configured depositor its amount and deposit it
    ///
    /// Returns `(label, shares minted)` per depositor.
    pub fn seed_depositors(&mut self, config: &Config) -> Result<Vec<(String, U256)>> {
        let want = self.vault.want();
        let amounts = config.deposit_units()?;
        let mut minted = Vec::with_capacity(amounts.len());
        for (index, (label, amount)) in amounts.into_iter().enumerate() {
            let who = depositor_address(index);
            self.bank.mint(want, who, amount);
            let shares = self.vault.deposit(who, amount)?;
            debug!("Seeded {} with {} -> {} shares", label, amount, shares);
            minted.push((label, shares));
        }
        Ok(minted)
    }
}
