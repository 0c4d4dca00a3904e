//! In-memory interest-bearing wrapper (xBOO bar)
//!
//! The wrapper's own address holds the underlying; its share token is
//! tracked in the bank under the same address. The exchange rate is
//! underlying held over shares outstanding, so anything paid into the bar
//! raises the value of every share.

use alloy_primitives::{Address, U256};
use tracing::debug;

use crate::adapters::InterestWrapper;
use crate::errors::ExternalError;
use crate::math::{PERCENT_DIVISOR, SECONDS_PER_YEAR};
use crate::tokens::{symbol_of, TokenBank};

/// Shared-state wrapper; clones see the same bar
#[derive(Debug, Clone)]
pub struct SimWrapper {
    underlying: Address,
    wrapped: Address,
    bank: TokenBank,
}

impl SimWrapper {
    /// `wrapped` is both the share token and the bar's address
    pub fn new(underlying: Address, wrapped: Address, bank: TokenBank) -> Self {
        Self {
            underlying,
            wrapped,
            bank,
        }
    }

    pub fn address(&self) -> Address {
        self.wrapped
    }

    /// Underlying locked in the bar
    pub fn reserves(&self) -> U256 {
        self.bank.balance_of(self.underlying, self.wrapped)
    }

    pub fn total_shares(&self) -> U256 {
        self.bank.total_supply(self.wrapped)
    }

    /// Pay underlying into the bar without minting shares
    pub fn distribute(&self, amount: U256) {
        self.bank.mint(self.underlying, self.wrapped, amount);
        debug!("Bar earned {} {}", amount, symbol_of(&self.underlying));
    }

    /// Grow reserves by `apr_bps` per year over `elapsed` seconds
    pub fn stream_yield(&self, apr_bps: u16, elapsed: u64) -> U256 {
        let earned = self
            .reserves()
            .saturating_mul(U256::from(apr_bps))
            .saturating_mul(U256::from(elapsed))
            / U256::from(PERCENT_DIVISOR as u64 * SECONDS_PER_YEAR);
        if !earned.is_zero() && !self.total_shares().is_zero() {
            self.distribute(earned);
            earned
        } else {
            U256::ZERO
        }
    }
}

impl InterestWrapper for SimWrapper {
    fn underlying(&self) -> Address {
        self.underlying
    }

    fn wrapped(&self) -> Address {
        self.wrapped
    }

    fn enter(&mut self, owner: Address, amount: U256) -> Result<U256, ExternalError> {
        if amount.is_zero() {
            return Ok(U256::ZERO);
        }
        let shares = self.to_shares(amount);
        if shares.is_zero() {
            return Err(ExternalError::Reverted(format!(
                "{} {} buys no shares",
                amount,
                symbol_of(&self.underlying)
            )));
        }
        self.bank.transfer(self.underlying, owner, self.wrapped, amount)?;
        self.bank.mint(self.wrapped, owner, shares);
        Ok(shares)
    }

    fn leave(&mut self, owner: Address, shares: U256) -> Result<U256, ExternalError> {
        if shares.is_zero() {
            return Ok(U256::ZERO);
        }
        let amount = self.to_underlying(shares);
        self.bank.burn(self.wrapped, owner, shares)?;
        self.bank.transfer(self.underlying, self.wrapped, owner, amount)?;
        Ok(amount)
    }

    fn to_underlying(&self, shares: U256) -> U256 {
        let supply = self.total_shares();
        if supply.is_zero() {
            return shares;
        }
        shares.saturating_mul(self.reserves()) / supply
    }

    fn to_shares(&self, amount: U256) -> U256 {
        let supply = self.total_shares();
        let reserves = self.reserves();
        if supply.is_zero() || reserves.is_zero() {
            return amount;
        }
        amount.saturating_mul(supply) / reserves
    }
}
