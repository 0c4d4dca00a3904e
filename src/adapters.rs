//! External collaborator boundary
//!
//! The farm hosting the pools, the interest-bearing wrapper in front of it
//! and the swap router are opaque services. The strategy only relies on the
//! contracts below; `simulator` provides in-memory implementations.

use alloy_primitives::{Address, U256};

use crate::errors::ExternalError;

/// Staking farm with many reward pools keyed by id (MasterChef-style)
pub trait Farm {
    /// Token that must be staked into every pool
    fn stake_token(&self) -> Address;

    /// Token emitted by a pool
    fn reward_token(&self, pool_id: u64) -> Result<Address, ExternalError>;

    /// Move `amount` of the stake token from `owner` into the pool
    fn deposit(&mut self, pool_id: u64, owner: Address, amount: U256) -> Result<(), ExternalError>;

    /// Move `amount` of staked principal back to `owner`
    fn withdraw(&mut self, pool_id: u64, owner: Address, amount: U256) -> Result<(), ExternalError>;

    /// Pay all pending rewards to `owner`; returns the amount claimed
    fn claim(&mut self, pool_id: u64, owner: Address) -> Result<U256, ExternalError>;

    /// Rewards accrued but not yet claimed
    fn pending_rewards(&self, pool_id: u64, owner: Address) -> U256;

    /// Principal currently staked by `owner`
    fn staked(&self, pool_id: u64, owner: Address) -> U256;
}

/// Interest-bearing wrapper over the base asset (xBOO-style)
///
/// Shares are minted against deposited underlying and redeem for a growing
/// amount of it as the wrapper earns.
pub trait InterestWrapper {
    /// Asset accepted by `enter`
    fn underlying(&self) -> Address;

    /// Share token minted by `enter`
    fn wrapped(&self) -> Address;

    /// Lock `amount` of underlying held by `owner`; returns the shares minted
    fn enter(&mut self, owner: Address, amount: U256) -> Result<U256, ExternalError>;

    /// Burn `shares` held by `owner`; returns the underlying paid out
    fn leave(&mut self, owner: Address, shares: U256) -> Result<U256, ExternalError>;

    /// Underlying redeemable for `shares` at the current rate
    fn to_underlying(&self, shares: U256) -> U256;

    /// Shares `amount` of underlying buys at the current rate, rounded down
    fn to_shares(&self, amount: U256) -> U256;
}

/// Multi-hop swap service
pub trait SwapRouter {
    /// Swap exactly `amount_in` of `path[0]` held by `recipient` into the last
    /// token of `path`, credited to `recipient`. Returns the output amount.
    fn swap_exact_tokens(
        &mut self,
        amount_in: U256,
        path: &[Address],
        recipient: Address,
    ) -> Result<U256, ExternalError>;

    /// Output for `amount_in` along `path` without executing
    fn quote(&self, amount_in: U256, path: &[Address]) -> Result<U256, ExternalError>;
}
