//! Fee routing for harvested profit
//!
//! The harvest engine hands the gross profit to a `FeeRouter` and pays out
//! whatever split comes back. A router error aborts the whole harvest.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, VaultError};
use crate::math::{bps_of, mul_div, PERCENT_DIVISOR};

/// Basis-point cuts of the gross harvest profit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    pub treasury_bps: u16,
    pub caller_bps: u16,
    pub strategist_bps: u16,
}

impl Default for FeeSplit {
    fn default() -> Self {
        // 4.5% total: 0.45% to the harvest caller, 1% to strategists
        Self {
            treasury_bps: 305,
            caller_bps: 45,
            strategist_bps: 100,
        }
    }
}

impl FeeSplit {
    pub fn total_bps(&self) -> u32 {
        self.treasury_bps as u32 + self.caller_bps as u32 + self.strategist_bps as u32
    }

    pub fn validate(&self) -> Result<()> {
        if self.total_bps() > PERCENT_DIVISOR {
            return Err(VaultError::FeeRouting(format!(
                "fee split totals {} bps",
                self.total_bps()
            )));
        }
        Ok(())
    }
}

/// Result of splitting a gross profit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProfitSplit {
    pub treasury: U256,
    pub caller: U256,
    pub strategist: U256,
    pub net: U256,
}

impl ProfitSplit {
    pub fn total_fees(&self) -> U256 {
        self.treasury + self.caller + self.strategist
    }
}

pub trait FeeRouter {
    fn split_profit(&self, gross: U256) -> Result<ProfitSplit>;

    /// Where the treasury cut goes
    fn treasury(&self) -> Address;

    /// How the strategist cut is shared out
    fn strategist_payouts(&self, amount: U256) -> Result<Vec<(Address, U256)>>;
}

/// Strategist receiving a weighted share of the strategist cut
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategistPayee {
    pub address: Address,
    pub weight: u32,
}

/// Default router: fixed bps cuts, strategist cut shared by weight
#[derive(Debug, Clone)]
pub struct BasisPointFeeRouter {
    split: FeeSplit,
    treasury: Address,
    strategists: Vec<StrategistPayee>,
}

impl BasisPointFeeRouter {
    pub fn new(split: FeeSplit, treasury: Address, strategists: Vec<StrategistPayee>) -> Self {
        Self {
            split,
            treasury,
            strategists,
        }
    }

    pub fn split(&self) -> FeeSplit {
        self.split
    }

    pub fn update_split(&mut self, split: FeeSplit) -> Result<()> {
        split.validate()?;
        self.split = split;
        Ok(())
    }
}

impl FeeRouter for BasisPointFeeRouter {
    fn split_profit(&self, gross: U256) -> Result<ProfitSplit> {
        self.split.validate()?;
        let treasury = bps_of(gross, self.split.treasury_bps)?;
        let caller = bps_of(gross, self.split.caller_bps)?;
        let strategist = bps_of(gross, self.split.strategist_bps)?;
        let net = gross - treasury - caller - strategist;
        Ok(ProfitSplit {
            treasury,
            caller,
            strategist,
            net,
        })
    }

    fn treasury(&self) -> Address {
        self.treasury
    }

    fn strategist_payouts(&self, amount: U256) -> Result<Vec<(Address, U256)>> {
        if amount.is_zero() {
            return Ok(Vec::new());
        }
        let total_weight: u64 = self.strategists.iter().map(|s| s.weight as u64).sum();
        if total_weight == 0 {
            // Nobody to pay: the cut goes to the treasury
            return Ok(vec![(self.treasury, amount)]);
        }

        let mut payouts = Vec::with_capacity(self.strategists.len());
        let mut paid = U256::ZERO;
        for payee in &self.strategists {
            let share = mul_div(amount, U256::from(payee.weight), U256::from(total_weight))?;
            paid += share;
            payouts.push((payee.address, share));
        }
        // Rounding dust to the first payee
        if let Some(first) = payouts.first_mut() {
            first.1 += amount - paid;
        }
        Ok(payouts)
    }
}
