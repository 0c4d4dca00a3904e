//! Token definitions and the in-memory token book
//!
//! `TokenBank` stands in for the ERC-20 contracts the vault, strategy, farm
//! and router all talk to. It is shared by handle: cloning it gives another
//! view of the same balances, the way every contract on a chain sees the
//! same token state.

use alloy_primitives::{address, Address, U256};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::trace;

use crate::errors::ExternalError;

/// Represents a token the simulator knows about
#[derive(Debug, Clone)]
pub struct Token {
    pub symbol: &'static str,
    pub address: Address,
    pub decimals: u8,
    pub category: TokenCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCategory {
    /// Asset the vault accepts and accounts in
    Base,

    /// Routing hop (wrapped native, stables)
    Intermediate,

    /// Emitted by farm pools, swapped back to base on harvest
    Reward,

    /// Interest-bearing receipt for the base asset, staked into farm pools
    Wrapped,
}

// ============================================
// FANTOM TOKEN SET
// ============================================

pub const BOO: Address = address!("841FAD6EAe12c286d1Fd18d1d525DFfA75C7EFFE");
pub const XBOO: Address = address!("a48d959AE2E88f1dAA7D5F611E01908106dE7598");
pub const WFTM: Address = address!("21be370D5312f44cB42ce377BC9b8a0cEF1A4C83");
pub const USDC: Address = address!("04068DA6C83AFCFA0e13ba15A6696662335D5B75");
pub const DAI: Address = address!("8D11eC38a3EB5E956B052f67Da8Bdc9bef8Abf3E");
pub const HEC: Address = address!("5C4FDfc5233f935f20D2aDbA572F770c2E377Ab0");
pub const LQDR: Address = address!("10b620b2dbAC4Faa7D7FFD71Da486f5D44cd86f9");
pub const GALCX: Address = address!("70F9fd19f857411b089977E7916c05A0fc477Ac9");
pub const SD: Address = address!("412a13C109aC30f0dB80AD3Bd1DeFd5D0A6c0Ac6");

pub fn known_tokens() -> Vec<Token> {
    vec![
        Token { symbol: "BOO", address: BOO, decimals: 18, category: TokenCategory::Base },
        Token { symbol: "xBOO", address: XBOO, decimals: 18, category: TokenCategory::Wrapped },
        Token { symbol: "WFTM", address: WFTM, decimals: 18, category: TokenCategory::Intermediate },
        Token { symbol: "USDC", address: USDC, decimals: 6, category: TokenCategory::Intermediate },
        Token { symbol: "DAI", address: DAI, decimals: 18, category: TokenCategory::Intermediate },
        Token { symbol: "HEC", address: HEC, decimals: 9, category: TokenCategory::Reward },
        Token { symbol: "LQDR", address: LQDR, decimals: 18, category: TokenCategory::Reward },
        Token { symbol: "gALCX", address: GALCX, decimals: 18, category: TokenCategory::Reward },
        Token { symbol: "SD", address: SD, decimals: 18, category: TokenCategory::Reward },
    ]
}

lazy_static! {
    /// Symbol lookup for log output
    static ref SYMBOLS: HashMap<Address, &'static str> = known_tokens()
        .into_iter()
        .map(|t| (t.address, t.symbol))
        .collect();
}

/// Case-insensitive lookup by symbol
pub fn token_by_symbol(symbol: &str) -> Option<Token> {
    known_tokens()
        .into_iter()
        .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
}

/// Symbol for a known token, shortened hex otherwise
pub fn symbol_of(token: &Address) -> String {
    match SYMBOLS.get(token) {
        Some(symbol) => symbol.to_string(),
        None => format!("0x{}...", &format!("{:?}", token)[2..8]),
    }
}

/// Render a swap route as `A → B → C`
pub fn format_route(route: &[Address]) -> String {
    route.iter().map(symbol_of).collect::<Vec<_>>().join(" → ")
}

// ============================================
// TOKEN BANK
// ============================================

type Balances = HashMap<Address, HashMap<Address, U256>>;

/// Shared multi-token balance book
#[derive(Debug, Clone, Default)]
pub struct TokenBank {
    balances: Arc<RwLock<Balances>>,
}

impl TokenBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, token: Address, holder: Address) -> U256 {
        let balances = self.balances.read().unwrap_or_else(|e| e.into_inner());
        balances
            .get(&token)
            .and_then(|holders| holders.get(&holder))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    pub fn total_supply(&self, token: Address) -> U256 {
        let balances = self.balances.read().unwrap_or_else(|e| e.into_inner());
        balances
            .get(&token)
            .map(|holders| holders.values().fold(U256::ZERO, |acc, b| acc + *b))
            .unwrap_or(U256::ZERO)
    }

    pub fn mint(&self, token: Address, to: Address, amount: U256) {
        let mut balances = self.balances.write().unwrap_or_else(|e| e.into_inner());
        let entry = balances.entry(token).or_default().entry(to).or_insert(U256::ZERO);
        *entry += amount;
        trace!("mint {} {} to {:?}", amount, symbol_of(&token), to);
    }

    pub fn burn(&self, token: Address, from: Address, amount: U256) -> Result<(), ExternalError> {
        let mut balances = self.balances.write().unwrap_or_else(|e| e.into_inner());
        let holders = balances.entry(token).or_default();
        let available = holders.get(&from).copied().unwrap_or(U256::ZERO);
        if available < amount {
            return Err(ExternalError::InsufficientBalance {
                token: symbol_of(&token),
                available,
                required: amount,
            });
        }
        holders.insert(from, available - amount);
        Ok(())
    }

    pub fn transfer(
        &self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), ExternalError> {
        if amount.is_zero() || from == to {
            return Ok(());
        }
        let mut balances = self.balances.write().unwrap_or_else(|e| e.into_inner());
        let holders = balances.entry(token).or_default();
        let available = holders.get(&from).copied().unwrap_or(U256::ZERO);
        if available < amount {
            return Err(ExternalError::InsufficientBalance {
                token: symbol_of(&token),
                available,
                required: amount,
            });
        }
        holders.insert(from, available - amount);
        *holders.entry(to).or_insert(U256::ZERO) += amount;
        trace!("transfer {} {} {:?} -> {:?}", amount, symbol_of(&token), from, to);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: Address = address!("00000000000000000000000000000000000A11CE");
    const BOB: Address = address!("0000000000000000000000000000000000000B0B");

    #[test]
    fn test_symbol_lookup() {
        assert_eq!(symbol_of(&BOO), "BOO");
        assert!(symbol_of(&ALICE).starts_with("0x"));
        assert_eq!(format_route(&[HEC, DAI, WFTM, BOO]), "HEC → DAI → WFTM → BOO");
        assert_eq!(token_by_symbol("galcx").map(|t| t.address), Some(GALCX));
        assert_eq!(token_by_symbol("XBOO").map(|t| t.category), Some(TokenCategory::Wrapped));
        assert!(token_by_symbol("XYZ").is_none());
    }

    #[test]
    fn test_transfer_moves_balance() {
        let bank = TokenBank::new();
        bank.mint(BOO, ALICE, U256::from(100u64));
        bank.transfer(BOO, ALICE, BOB, U256::from(40u64)).unwrap();
        assert_eq!(bank.balance_of(BOO, ALICE), U256::from(60u64));
        assert_eq!(bank.balance_of(BOO, BOB), U256::from(40u64));
        assert_eq!(bank.total_supply(BOO), U256::from(100u64));
    }

    #[test]
    fn test_transfer_insufficient() {
        let bank = TokenBank::new();
        bank.mint(BOO, ALICE, U256::from(10u64));
        let err = bank.transfer(BOO, ALICE, BOB, U256::from(11u64)).unwrap_err();
        assert!(matches!(err, ExternalError::InsufficientBalance { .. }));
        assert_eq!(bank.balance_of(BOO, ALICE), U256::from(10u64));
    }

    #[test]
    fn test_clones_share_state() {
        let bank = TokenBank::new();
        let view = bank.clone();
        bank.mint(WFTM, BOB, U256::from(5u64));
        assert_eq!(view.balance_of(WFTM, BOB), U256::from(5u64));
        view.burn(WFTM, BOB, U256::from(5u64)).unwrap();
        assert!(bank.balance_of(WFTM, BOB).is_zero());
    }
}
