//! Keeper configuration
//!
//! Describes the simulated deployment the `compounder` binary runs: vault
//! limits and fees, the strategy's pools and fee split, the simulated
//! market, and the depositors seeded at start-up.

use alloy_primitives::{Address, U256};
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::env;
use std::fs;
use std::path::Path;

use crate::math::{parse_units, PERCENT_DIVISOR};
use crate::strategy::{FeeSplit, MAX_POOLS};
use crate::tokens::{token_by_symbol, TokenCategory};
use crate::vault::MAX_FEE_BPS;

// ============================================
// POOLS & DEPOSITORS
// ============================================

/// A farm pool the strategy should use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub pool_id: u64,

    /// Token symbols, reward token first, base token last
    pub route: Vec<String>,

    pub allocation_bps: u16,

    /// Simulated reward emission, as an APR on staked value
    pub reward_apr_bps: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositorConfig {
    pub label: String,

    /// Whole tokens of the base asset
    pub amount: String,
}

// ============================================
// MAIN CONFIGURATION
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // ========== Vault ==========
    /// Symbol of the asset the vault accepts
    pub base_token: String,

    /// Whole tokens; unset means uncapped
    pub tvl_cap: Option<String>,

    pub deposit_fee_bps: u16,
    pub withdraw_fee_bps: u16,

    /// Wait between proposing and installing a new strategy
    pub approval_delay_secs: u64,

    // ========== Strategy ==========
    pub harvest_log_cadence_secs: u64,

    /// Only keepers may harvest when set
    pub harvest_gated: bool,

    // ========== Market Simulation ==========
    /// Swap fee charged per hop by the simulated router
    pub swap_fee_bps: u16,

    /// Random +/- spread applied to each reward claim
    pub reward_jitter_bps: u16,

    /// Yearly yield the xBOO bar earns for its holders
    pub wrapper_apr_bps: u16,

    pub rng_seed: u64,

    // ========== Keeper ==========
    /// Simulated seconds between harvests
    pub harvest_interval_secs: u64,

    /// Number of harvest ticks to run
    pub ticks: u64,

    /// Wall-clock pause between ticks (milliseconds)
    pub pace_ms: u64,

    /// Intervals averaged for the reported APR
    pub apr_window: usize,

    /// Append every harvest to `record_log_path` as JSON lines
    pub record_log: bool,
    pub record_log_path: String,

    /// Strategist payout weights, indexed by strategist
    pub strategist_weights: Vec<u32>,

    // ========== Tables ==========
    pub fee_split: FeeSplit,

    /// USD price per whole token, by symbol
    pub prices_usd: BTreeMap<String, f64>,

    pub pools: Vec<PoolConfig>,
    pub depositors: Vec<DepositorConfig>,
}

impl Config {
    /// Defaults overridden by environment variables (and a .env file)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            base_token: env::var("BASE_TOKEN").unwrap_or(defaults.base_token),
            tvl_cap: match env::var("TVL_CAP") {
                Ok(v) if v.eq_ignore_ascii_case("none") || v.is_empty() => None,
                Ok(v) => Some(v),
                Err(_) => defaults.tvl_cap,
            },
            deposit_fee_bps: env::var("DEPOSIT_FEE_BPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.deposit_fee_bps),
            withdraw_fee_bps: env::var("WITHDRAW_FEE_BPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.withdraw_fee_bps),
            approval_delay_secs: env::var("APPROVAL_DELAY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.approval_delay_secs),

            harvest_log_cadence_secs: env::var("HARVEST_LOG_CADENCE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.harvest_log_cadence_secs),
            harvest_gated: env::var("HARVEST_GATED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.harvest_gated),

            swap_fee_bps: env::var("SWAP_FEE_BPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.swap_fee_bps),
            reward_jitter_bps: env::var("REWARD_JITTER_BPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.reward_jitter_bps),
            wrapper_apr_bps: env::var("WRAPPER_APR_BPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.wrapper_apr_bps),
            rng_seed: env::var("RNG_SEED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.rng_seed),

            harvest_interval_secs: env::var("HARVEST_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.harvest_interval_secs),
            ticks: env::var("TICKS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.ticks),
            pace_ms: env::var("PACE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.pace_ms),
            apr_window: env::var("APR_WINDOW")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.apr_window),
            record_log: env::var("RECORD_LOG")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.record_log),
            record_log_path: env::var("RECORD_LOG_PATH").unwrap_or(defaults.record_log_path),

            fee_split: defaults.fee_split,
            strategist_weights: defaults.strategist_weights,
            prices_usd: defaults.prices_usd,
            pools: defaults.pools,
            depositors: defaults.depositors,
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    fn default_pools() -> Vec<PoolConfig> {
        let pool = |pool_id: u64, route: &[&str], allocation_bps: u16, reward_apr_bps: u32| PoolConfig {
            pool_id,
            route: route.iter().map(|s| s.to_string()).collect(),
            allocation_bps,
            reward_apr_bps,
        };
        vec![
            pool(21, &["HEC", "DAI", "WFTM", "BOO"], 3_000, 1_800),
            pool(11, &["LQDR", "WFTM", "BOO"], 3_000, 2_400),
            pool(35, &["gALCX", "WFTM", "BOO"], 2_000, 1_500),
            pool(34, &["SD", "USDC", "WFTM", "BOO"], 1_500, 3_000),
        ]
    }

    fn default_prices() -> BTreeMap<String, f64> {
        [
            ("BOO", 4.5),
            ("WFTM", 1.2),
            ("USDC", 1.0),
            ("DAI", 1.0),
            ("HEC", 12.0),
            ("LQDR", 3.5),
            ("gALCX", 180.0),
            ("SD", 1.6),
        ]
        .into_iter()
        .map(|(s, p)| (s.to_string(), p))
        .collect()
    }

    /// Resolve a list of symbols to addresses
    pub fn resolve_route(route: &[String]) -> Result<Vec<Address>> {
        route
            .iter()
            .map(|s| {
                token_by_symbol(s)
                    .map(|t| t.address)
                    .ok_or_else(|| eyre::eyre!("Unknown token symbol '{}'", s))
            })
            .collect()
    }

    pub fn base_decimals(&self) -> Result<u8> {
        token_by_symbol(&self.base_token)
            .map(|t| t.decimals)
            .ok_or_else(|| eyre::eyre!("Unknown base token '{}'", self.base_token))
    }

    /// TVL cap in base units
    pub fn tvl_cap_units(&self) -> Result<Option<U256>> {
        let decimals = self.base_decimals()?;
        self.tvl_cap
            .as_deref()
            .map(|cap| {
                parse_units(cap, decimals).ok_or_else(|| eyre::eyre!("Invalid TVL_CAP '{}'", cap))
            })
            .transpose()
    }

    /// Depositor amounts in base units
    pub fn deposit_units(&self) -> Result<Vec<(String, U256)>> {
        let decimals = self.base_decimals()?;
        self.depositors
            .iter()
            .map(|d| {
                parse_units(&d.amount, decimals)
                    .map(|amount| (d.label.clone(), amount))
                    .ok_or_else(|| eyre::eyre!("Invalid deposit amount '{}' for {}", d.amount, d.label))
            })
            .collect()
    }

    /// Validate the deployment description
    pub fn validate(&self) -> Result<()> {
        let base = token_by_symbol(&self.base_token)
            .ok_or_else(|| eyre::eyre!("Unknown base token '{}'", self.base_token))?;
        if base.category != TokenCategory::Base {
            return Err(eyre::eyre!("{} cannot be used as a vault asset", base.symbol));
        }

        if self.deposit_fee_bps > MAX_FEE_BPS || self.withdraw_fee_bps > MAX_FEE_BPS {
            return Err(eyre::eyre!(
                "Vault fees are capped at {} bps (deposit {}, withdraw {})",
                MAX_FEE_BPS,
                self.deposit_fee_bps,
                self.withdraw_fee_bps
            ));
        }
        if self.fee_split.total_bps() > PERCENT_DIVISOR {
            return Err(eyre::eyre!(
                "Harvest fee split totals {} bps (max {})",
                self.fee_split.total_bps(),
                PERCENT_DIVISOR
            ));
        }

        // Pools
        if self.pools.is_empty() {
            return Err(eyre::eyre!("At least one pool is required"));
        }
        if self.pools.len() > MAX_POOLS {
            return Err(eyre::eyre!("At most {} pools can be used", MAX_POOLS));
        }
        let mut seen = HashSet::new();
        let mut total_allocation: u32 = 0;
        for pool in &self.pools {
            if !seen.insert(pool.pool_id) {
                return Err(eyre::eyre!("Pool {} is listed twice", pool.pool_id));
            }
            let route = Self::resolve_route(&pool.route)?;
            if route.last() != Some(&base.address) {
                return Err(eyre::eyre!(
                    "Route for pool {} must end in {}",
                    pool.pool_id,
                    base.symbol
                ));
            }
            for symbol in &pool.route {
                match self.prices_usd.get(symbol) {
                    Some(price) if *price > 0.0 => {}
                    _ => return Err(eyre::eyre!("No usable price for {}", symbol)),
                }
            }
            total_allocation += pool.allocation_bps as u32;
        }
        if total_allocation > PERCENT_DIVISOR {
            return Err(eyre::eyre!(
                "Pool allocations total {} bps (max {})",
                total_allocation,
                PERCENT_DIVISOR
            ));
        }

        if self.wrapper_apr_bps as u32 > PERCENT_DIVISOR {
            return Err(eyre::eyre!(
                "Wrapper APR {} bps exceeds {}",
                self.wrapper_apr_bps,
                PERCENT_DIVISOR
            ));
        }

        // Keeper
        if self.harvest_interval_secs == 0 {
            return Err(eyre::eyre!("HARVEST_INTERVAL_SECS must be positive"));
        }
        let cap = self.tvl_cap_units()?;
        let deposits = self.deposit_units()?;
        if deposits.iter().any(|(_, amount)| amount.is_zero()) {
            return Err(eyre::eyre!("Depositor amounts must be positive"));
        }
        if let Some(cap) = cap {
            let total = deposits.iter().fold(U256::ZERO, |acc, (_, a)| acc + *a);
            if total > cap {
                return Err(eyre::eyre!("Seed deposits exceed the TVL cap"));
            }
        }

        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        let allocated: u32 = self.pools.iter().map(|p| p.allocation_bps as u32).sum();
        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║              COMPOUNDER - CONFIGURATION                    ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ VAULT                                                      ║");
        println!("║ • Asset:           {:^40} ║", self.base_token);
        println!(
            "║ • TVL Cap:         {:^40} ║",
            self.tvl_cap.as_deref().unwrap_or("uncapped")
        );
        println!("║ • Deposit Fee:     {:>37} bps ║", self.deposit_fee_bps);
        println!("║ • Withdraw Fee:    {:>37} bps ║", self.withdraw_fee_bps);
        println!("║ • Approval Delay:  {:>39}s ║", self.approval_delay_secs);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ STRATEGY                                                   ║");
        println!("║ • Pools:           {:^40} ║", self.pools.len());
        println!("║ • Allocated:       {:>37} bps ║", allocated);
        println!(
            "║ • Fee Split:       {:^40} ║",
            format!(
                "{}/{}/{} bps",
                self.fee_split.treasury_bps, self.fee_split.caller_bps, self.fee_split.strategist_bps
            )
        );
        println!("║ • xBOO Yield:      {:>37} bps ║", self.wrapper_apr_bps);
        println!(
            "║ • Harvest Gate:    {:^40} ║",
            if self.harvest_gated { "✓ Keepers only" } else { "✗ Open" }
        );
        for pool in &self.pools {
            println!(
                "║   #{:<4} {:<38} {:>5} bps ║",
                pool.pool_id,
                pool.route.join(" → "),
                pool.allocation_bps
            );
        }
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ KEEPER                                                     ║");
        println!("║ • Ticks:           {:^40} ║", self.ticks);
        println!("║ • Interval:        {:>39}s ║", self.harvest_interval_secs);
        println!("║ • Depositors:      {:^40} ║", self.depositors.len());
        println!(
            "║ • Harvest Log:     {:^40} ║",
            if self.record_log { self.record_log_path.as_str() } else { "✗ Disabled" }
        );
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_token: "BOO".to_string(),
            tvl_cap: Some("2500".to_string()),
            deposit_fee_bps: 0,
            withdraw_fee_bps: 10,
            approval_delay_secs: 86_400,
            harvest_log_cadence_secs: 3_600,
            harvest_gated: false,
            swap_fee_bps: 30,
            reward_jitter_bps: 500,
            wrapper_apr_bps: 400,
            rng_seed: 42,
            harvest_interval_secs: 21_600,
            ticks: 120,
            pace_ms: 25,
            apr_window: 12,
            record_log: false,
            record_log_path: "./logs/harvests.jsonl".to_string(),
            fee_split: FeeSplit::default(),
            strategist_weights: vec![100],
            prices_usd: Self::default_prices(),
            pools: Self::default_pools(),
            depositors: vec![
                DepositorConfig {
                    label: "alice".to_string(),
                    amount: "1200".to_string(),
                },
                DepositorConfig {
                    label: "bob".to_string(),
                    amount: "800".to_string(),
                },
                DepositorConfig {
                    label: "carol".to_string(),
                    amount: "250.5".to_string(),
                },
            ],
        }
    }
}

// ============================================
// HARVEST RECORD LOGGER
// ============================================

use chrono::{DateTime, Utc};
use std::io::Write;

/// One harvest as written to the JSON-lines record log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestRecord {
    pub timestamp: DateTime<Utc>,
    pub tick: u64,
    pub sim_time: u64,
    pub gross_profit: f64,
    pub caller_fee: f64,
    pub treasury_fee: f64,
    pub strategist_fee: f64,
    pub reinvested: f64,
    pub total_managed_assets: f64,
    pub price_per_share: f64,
    pub apr_bps: i64,
    pub failed_pools: usize,
}

impl HarvestRecord {
    /// Append this record to a file
    pub fn append_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        // Create parent directories if needed
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        let json = serde_json::to_string(self)?;
        writeln!(file, "{}", json)?;

        Ok(())
    }
}

// ============================================
// TESTS
// ============================================
