//! Share-accounting vault
//!
//! Users deposit the base asset and receive shares; a bound strategy does
//! the actual yield work. The vault only talks to it through the
//! `VaultStrategy` capability below.

mod ledger;

pub use ledger::{Vault, VaultConfig, WithdrawReceipt, DEFAULT_WITHDRAW_FEE_BPS, MAX_FEE_BPS};

use alloy_primitives::{Address, U256};

use crate::errors::Result;
use crate::lifecycle::LifecycleState;

/// What the vault needs from a strategy
pub trait VaultStrategy {
    /// Custody address of the strategy in the token bank
    fn address(&self) -> Address;

    /// Base asset the strategy manages
    fn want(&self) -> Address;

    /// Vault this strategy is bound to
    fn vault(&self) -> Address;

    fn status(&self) -> LifecycleState;

    /// Idle base plus tracked pool principal
    fn balance_of(&self) -> U256;

    /// Deploy whatever base the vault has forwarded
    fn deposit(&mut self, caller: Address) -> Result<()>;

    /// Send up to `amount` of base to the vault; returns what was sent
    fn withdraw(&mut self, caller: Address, amount: U256) -> Result<U256>;

    /// Terminal: return every unit of capital to the vault
    fn retire_strat(&mut self, caller: Address) -> Result<()>;
}
