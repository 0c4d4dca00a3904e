//! Oracle-priced swap router
//!
//! Each hop converts at the ratio of the two tokens' WAD prices, adjusted for
//! decimals, less a flat per-hop fee. There is no pool depth or slippage.

use alloy_primitives::{Address, U256};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::adapters::SwapRouter;
use crate::errors::ExternalError;
use crate::math::{unit, PERCENT_DIVISOR};
use crate::tokens::{format_route, symbol_of, TokenBank};

#[derive(Debug, Clone)]
pub struct SimRouter {
    bank: TokenBank,
    fee_bps: u16,

    /// token -> (decimals, USD price scaled by 1e18)
    prices: Arc<RwLock<HashMap<Address, (u8, U256)>>>,

    /// Tokens whose hops revert
    failing: Arc<RwLock<HashSet<Address>>>,
}

impl SimRouter {
    pub fn new(bank: TokenBank, fee_bps: u16) -> Self {
        Self {
            bank,
            fee_bps: fee_bps.min(PERCENT_DIVISOR as u16),
            prices: Arc::new(RwLock::new(HashMap::new())),
            failing: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    pub fn set_price(&self, token: Address, decimals: u8, price_wad: U256) {
        let mut prices = self.prices.write().unwrap_or_else(|e| e.into_inner());
        prices.insert(token, (decimals, price_wad));
    }

    pub fn set_failing(&self, token: Address, failing: bool) {
        let mut set = self.failing.write().unwrap_or_else(|e| e.into_inner());
        if failing {
            set.insert(token);
        } else {
            set.remove(&token);
        }
    }

    fn hop(&self, amount_in: U256, from: Address, to: Address) -> Result<U256, ExternalError> {
        {
            let failing = self.failing.read().unwrap_or_else(|e| e.into_inner());
            if failing.contains(&from) || failing.contains(&to) {
                return Err(ExternalError::Reverted(format!(
                    "swap {} -> {} reverted",
                    symbol_of(&from),
                    symbol_of(&to)
                )));
            }
        }
        let prices = self.prices.read().unwrap_or_else(|e| e.into_inner());
        let no_liquidity = || ExternalError::NoLiquidity {
            from: symbol_of(&from),
            to: symbol_of(&to),
        };
        let (dec_from, p_from) = *prices.get(&from).ok_or_else(no_liquidity)?;
        let (dec_to, p_to) = *prices.get(&to).ok_or_else(no_liquidity)?;
        if p_to.is_zero() {
            return Err(no_liquidity());
        }

        let numerator = amount_in
            .checked_mul(p_from)
            .and_then(|v| v.checked_mul(unit(dec_to)))
            .ok_or_else(|| ExternalError::Reverted("swap amount overflow".to_string()))?;
        let gross = numerator / (p_to * unit(dec_from));
        Ok(gross * U256::from(PERCENT_DIVISOR - self.fee_bps as u32) / U256::from(PERCENT_DIVISOR))
    }
}

impl SwapRouter for SimRouter {
    fn swap_exact_tokens(
        &mut self,
        amount_in: U256,
        path: &[Address],
        recipient: Address,
    ) -> Result<U256, ExternalError> {
        if path.len() < 2 {
            return Ok(amount_in);
        }
        let amount_out = self.quote(amount_in, path)?;
        self.bank.burn(path[0], recipient, amount_in)?;
        if let Some(last) = path.last() {
            self.bank.mint(*last, recipient, amount_out);
        }
        debug!("Swapped {} via {} for {}", amount_in, format_route(path), amount_out);
        Ok(amount_out)
    }

    fn quote(&self, amount_in: U256, path: &[Address]) -> Result<U256, ExternalError> {
        path.windows(2)
            .try_fold(amount_in, |amount, hop| self.hop(amount, hop[0], hop[1]))
    }
}
