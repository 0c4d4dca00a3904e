//! Vault ledger: shares, fees, TVL cap and strategy binding

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::errors::{Result, VaultError};
use crate::guard::ReentrancyGuard;
use crate::math::{bps_of, bps_of_up, mul_div, unit};
use crate::tokens::{symbol_of, TokenBank};

use super::VaultStrategy;

/// Upper bound for both deposit and withdrawal fees (10%)
pub const MAX_FEE_BPS: u16 = 1_000;

pub const DEFAULT_WITHDRAW_FEE_BPS: u16 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    pub address: Address,
    pub owner: Address,
    pub want: Address,
    pub decimals: u8,
    pub treasury: Address,

    /// `None` means uncapped
    pub tvl_cap: Option<U256>,

    pub deposit_fee_bps: u16,
    pub withdraw_fee_bps: u16,

    /// Seconds a proposed strategy must wait before it can be installed
    pub approval_delay: u64,
}

/// Outcome of a share redemption
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawReceipt {
    pub shares: U256,
    /// Base owed for the shares (or what the strategy could return)
    pub gross: U256,
    pub fee: U256,
    pub paid: U256,
}

struct StrategyCandidate<S> {
    strategy: S,
    proposed_at: u64,
}

pub struct Vault<S> {
    config: VaultConfig,
    bank: TokenBank,
    clock: Arc<dyn Clock>,
    guard: ReentrancyGuard,

    strategy: Option<S>,
    candidate: Option<StrategyCandidate<S>>,

    shares: HashMap<Address, U256>,
    total_supply: U256,
    cumulative_deposits: HashMap<Address, U256>,
    cumulative_withdrawals: HashMap<Address, U256>,
}

fn check_fee(bps: u16) -> Result<()> {
    if bps > MAX_FEE_BPS {
        return Err(VaultError::FeeTooHigh { bps, max: MAX_FEE_BPS });
    }
    Ok(())
}

impl<S: VaultStrategy> Vault<S> {
    pub fn new(config: VaultConfig, bank: TokenBank, clock: Arc<dyn Clock>) -> Result<Self> {
        check_fee(config.deposit_fee_bps)?;
        check_fee(config.withdraw_fee_bps)?;
        Ok(Self {
            config,
            bank,
            clock,
            guard: ReentrancyGuard::new(),
            strategy: None,
            candidate: None,
            shares: HashMap::new(),
            total_supply: U256::ZERO,
            cumulative_deposits: HashMap::new(),
            cumulative_withdrawals: HashMap::new(),
        })
    }

    // ========== Views ==========

    pub fn address(&self) -> Address {
        self.config.address
    }

    pub fn want(&self) -> Address {
        self.config.want
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn strategy(&self) -> Option<&S> {
        self.strategy.as_ref()
    }

    pub fn strategy_mut(&mut self) -> Option<&mut S> {
        self.strategy.as_mut()
    }

    pub fn reentrancy_guard(&self) -> ReentrancyGuard {
        self.guard.clone()
    }

    /// Share balance of a holder
    pub fn balance_of(&self, holder: Address) -> U256 {
        self.shares.get(&holder).copied().unwrap_or(U256::ZERO)
    }

    pub fn total_supply(&self) -> U256 {
        self.total_supply
    }

    /// Base asset held idle by the vault itself
    pub fn balance(&self) -> U256 {
        self.bank.balance_of(self.config.want, self.config.address)
    }

    pub fn available(&self) -> U256 {
        self.balance()
    }

    pub fn total_managed_assets(&self) -> U256 {
        let deployed = self
            .strategy
            .as_ref()
            .map(|s| s.balance_of())
            .unwrap_or(U256::ZERO);
        self.balance() + deployed
    }

    /// Managed assets per whole share, scaled to the asset's decimals
    pub fn price_per_full_share(&self) -> Result<U256> {
        let one = unit(self.config.decimals);
        if self.total_supply.is_zero() {
            return Ok(one);
        }
        mul_div(self.total_managed_assets(), one, self.total_supply)
    }

    pub fn cumulative_deposits(&self, user: Address) -> U256 {
        self.cumulative_deposits.get(&user).copied().unwrap_or(U256::ZERO)
    }

    pub fn cumulative_withdrawals(&self, user: Address) -> U256 {
        self.cumulative_withdrawals.get(&user).copied().unwrap_or(U256::ZERO)
    }

    /// Timestamp after which the proposed strategy can be installed
    pub fn candidate_ready_at(&self) -> Option<u64> {
        self.candidate
            .as_ref()
            .map(|c| c.proposed_at + self.config.approval_delay)
    }

    // ========== Strategy binding ==========

    fn only_owner(&self, caller: Address) -> Result<()> {
        if caller == self.config.owner {
            Ok(())
        } else {
            Err(VaultError::NotAuthorized)
        }
    }

    fn check_strategy(&self, strategy: &S) -> Result<()> {
        if strategy.want() != self.config.want {
            return Err(VaultError::StrategyMismatch(format!(
                "strategy wants {}, vault holds {}",
                symbol_of(&strategy.want()),
                symbol_of(&self.config.want)
            )));
        }
        if strategy.vault() != self.config.address {
            return Err(VaultError::StrategyMismatch(format!(
                "strategy is bound to vault {:?}",
                strategy.vault()
            )));
        }
        Ok(())
    }

    /// One-time binding of the first strategy
    pub fn initialize(&mut self, caller: Address, strategy: S) -> Result<()> {
        self.only_owner(caller)?;
        if self.strategy.is_some() {
            return Err(VaultError::AlreadyInitialized);
        }
        self.check_strategy(&strategy)?;
        info!("Vault initialized with strategy {:?}", strategy.address());
        self.strategy = Some(strategy);
        Ok(())
    }

    /// Record a replacement strategy; returns when it can be installed
    pub fn propose_strategy(&mut self, caller: Address, candidate: S) -> Result<u64> {
        self.only_owner(caller)?;
        self.check_strategy(&candidate)?;
        let proposed_at = self.clock.now();
        let ready_at = proposed_at + self.config.approval_delay;
        info!(
            "Strategy {:?} proposed, upgrade possible at {}",
            candidate.address(),
            ready_at
        );
        self.candidate = Some(StrategyCandidate {
            strategy: candidate,
            proposed_at,
        });
        Ok(ready_at)
    }

    /// Retire the current strategy and install the proposed one
    ///
    /// Returns the retired strategy, if there was one.
    pub fn upgrade_strategy(&mut self, caller: Address) -> Result<Option<S>> {
        self.only_owner(caller)?;
        let ready_at = self.candidate_ready_at().ok_or(VaultError::NoCandidate)?;
        let now = self.clock.now();
        if now < ready_at {
            return Err(VaultError::ApprovalDelayPending { ready_at, now });
        }
        let _scope = self.guard.enter()?;

        let vault = self.config.address;
        if let Some(current) = self.strategy.as_mut() {
            if !current.status().is_terminal() {
                current.retire_strat(vault)?;
            }
        }

        let candidate = self.candidate.take().ok_or(VaultError::NoCandidate)?;
        let retired = self.strategy.replace(candidate.strategy);
        self.earn_idle()?;
        info!("🔄 Strategy upgraded, managed assets {}", self.total_managed_assets());
        Ok(retired)
    }

    // ========== Deposits ==========

    /// Forward idle base to the strategy for deployment
    pub fn earn(&mut self) -> Result<U256> {
        let strategy = self.strategy.as_ref().ok_or(VaultError::NotInitialized)?;
        strategy.status().ensure_active()?;
        let _scope = self.guard.enter()?;
        self.earn_idle()
    }

    fn earn_idle(&mut self) -> Result<U256> {
        let idle = self.balance();
        let vault = self.config.address;
        let want = self.config.want;
        let Some(strategy) = self.strategy.as_mut() else {
            return Ok(U256::ZERO);
        };
        if idle.is_zero() || !strategy.status().is_active() {
            return Ok(U256::ZERO);
        }
        self.bank.transfer(want, vault, strategy.address(), idle)?;
        strategy.deposit(vault)?;
        debug!("Earned {} into strategy", idle);
        Ok(idle)
    }

    /// Deposit base asset; returns the shares minted
    pub fn deposit(&mut self, caller: Address, amount: U256) -> Result<U256> {
        if amount.is_zero() {
            return Err(VaultError::ZeroAmount);
        }
        let strategy = self.strategy.as_ref().ok_or(VaultError::NotInitialized)?;
        strategy.status().ensure_active()?;

        let before = self.total_managed_assets();
        if let Some(cap) = self.config.tvl_cap {
            let after = before.checked_add(amount).ok_or(VaultError::MathOverflow)?;
            if after > cap {
                return Err(VaultError::CapExceeded { cap });
            }
        }
        let _scope = self.guard.enter()?;

        let idle_before = self.balance();
        self.bank
            .transfer(self.config.want, caller, self.config.address, amount)?;
        let received = self.balance().saturating_sub(idle_before);

        // The deposit fee stays in the vault, accruing to existing holders
        let fee = bps_of(received, self.config.deposit_fee_bps)?;
        let net = received - fee;
        let minted = if self.total_supply.is_zero() {
            net
        } else {
            mul_div(net, self.total_supply, before)?
        };

        *self.shares.entry(caller).or_insert(U256::ZERO) += minted;
        self.total_supply += minted;
        *self.cumulative_deposits.entry(caller).or_insert(U256::ZERO) += received;

        self.earn_idle()?;
        info!(
            "Deposit {} {} from {:?} -> {} shares",
            received,
            symbol_of(&self.config.want),
            caller,
            minted
        );
        Ok(minted)
    }

    // ========== Withdrawals ==========

    /// Redeem shares for base asset; allowed in every lifecycle state
    pub fn withdraw(&mut self, caller: Address, shares: U256) -> Result<WithdrawReceipt> {
        if shares.is_zero() {
            return Err(VaultError::ZeroAmount);
        }
        let held = self.balance_of(caller);
        if shares > held {
            return Err(VaultError::InsufficientShares {
                available: held,
                requested: shares,
            });
        }
        let _scope = self.guard.enter()?;

        let owed = mul_div(self.total_managed_assets(), shares, self.total_supply)?;
        self.shares.insert(caller, held - shares);
        self.total_supply -= shares;

        let idle = self.balance();
        if owed > idle {
            let vault = self.config.address;
            if let Some(strategy) = self.strategy.as_mut() {
                if let Err(e) = strategy.withdraw(vault, owed - idle) {
                    // Nothing left the vault: restore the burned shares
                    self.shares.insert(caller, held);
                    self.total_supply += shares;
                    return Err(e);
                }
            }
        }

        let gross = owed.min(self.balance());
        if gross < owed {
            warn!("Withdrawal short: owed {}, paying out of {}", owed, gross);
        }
        let fee = bps_of_up(gross, self.config.withdraw_fee_bps)?;
        let paid = gross - fee;
        self.bank
            .transfer(self.config.want, self.config.address, self.config.treasury, fee)?;
        self.bank
            .transfer(self.config.want, self.config.address, caller, paid)?;
        *self.cumulative_withdrawals.entry(caller).or_insert(U256::ZERO) += paid;

        info!("Withdraw {} shares by {:?} -> {} paid, {} fee", shares, caller, paid, fee);
        Ok(WithdrawReceipt {
            shares,
            gross,
            fee,
            paid,
        })
    }

    pub fn withdraw_all(&mut self, caller: Address) -> Result<WithdrawReceipt> {
        self.withdraw(caller, self.balance_of(caller))
    }

    // ========== Admin ==========

    pub fn update_tvl_cap(&mut self, caller: Address, cap: U256) -> Result<()> {
        self.only_owner(caller)?;
        self.config.tvl_cap = Some(cap);
        info!("TVL cap set to {}", cap);
        Ok(())
    }

    pub fn remove_tvl_cap(&mut self, caller: Address) -> Result<()> {
        self.only_owner(caller)?;
        self.config.tvl_cap = None;
        info!("TVL cap removed");
        Ok(())
    }

    pub fn update_deposit_fee(&mut self, caller: Address, bps: u16) -> Result<()> {
        self.only_owner(caller)?;
        check_fee(bps)?;
        self.config.deposit_fee_bps = bps;
        Ok(())
    }

    pub fn update_withdraw_fee(&mut self, caller: Address, bps: u16) -> Result<()> {
        self.only_owner(caller)?;
        check_fee(bps)?;
        self.config.withdraw_fee_bps = bps;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::lifecycle::LifecycleState;
    use crate::tokens::{BOO, WFTM};
    use alloy_primitives::address;
    use std::sync::atomic::{AtomicBool, Ordering};

    const VAULT: Address = address!("000000000000000000000000000000000000BA17");
    const OWNER: Address = address!("0000000000000000000000000000000000000AD1");
    const TREASURY: Address = address!("0000000000000000000000000000000000007EA5");
    const ALICE: Address = address!("00000000000000000000000000000000000A11CE");
    const BOB: Address = address!("0000000000000000000000000000000000000B0B");
    const STRAT_A: Address = address!("000000000000000000000000000000000000000A");
    const STRAT_B: Address = address!("000000000000000000000000000000000000000B");

    /// Strategy that just holds whatever it is given
    struct HoldingStrategy {
        address: Address,
        want: Address,
        vault: Address,
        bank: TokenBank,
        status: LifecycleState,
        vault_guard: Option<ReentrancyGuard>,
        reentered: Arc<AtomicBool>,
    }

    impl HoldingStrategy {
        fn new(address: Address, bank: &TokenBank) -> Self {
            Self {
                address,
                want: BOO,
                vault: VAULT,
                bank: bank.clone(),
                status: LifecycleState::Active,
                vault_guard: None,
                reentered: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl VaultStrategy for HoldingStrategy {
        fn address(&self) -> Address {
            self.address
        }

        fn want(&self) -> Address {
            self.want
        }

        fn vault(&self) -> Address {
            self.vault
        }

        fn status(&self) -> LifecycleState {
            self.status
        }

        fn balance_of(&self) -> U256 {
            self.bank.balance_of(self.want, self.address)
        }

        fn deposit(&mut self, _caller: Address) -> Result<()> {
            if let Some(guard) = &self.vault_guard {
                if guard.enter().is_ok() {
                    self.reentered.store(true, Ordering::SeqCst);
                }
            }
            Ok(())
        }

        fn withdraw(&mut self, _caller: Address, amount: U256) -> Result<U256> {
            let sent = amount.min(self.balance_of());
            self.bank.transfer(self.want, self.address, self.vault, sent)?;
            Ok(sent)
        }

        fn retire_strat(&mut self, _caller: Address) -> Result<()> {
            let all = self.balance_of();
            self.bank.transfer(self.want, self.address, self.vault, all)?;
            self.status = LifecycleState::Retired;
            Ok(())
        }
    }

    fn tokens(n: u64) -> U256 {
        U256::from(n) * unit(18)
    }

    fn config() -> VaultConfig {
        VaultConfig {
            address: VAULT,
            owner: OWNER,
            want: BOO,
            decimals: 18,
            treasury: TREASURY,
            tvl_cap: None,
            deposit_fee_bps: 0,
            withdraw_fee_bps: DEFAULT_WITHDRAW_FEE_BPS,
            approval_delay: 3_600,
        }
    }

    fn setup() -> (TokenBank, ManualClock, Vault<HoldingStrategy>) {
        let bank = TokenBank::new();
        let clock = ManualClock::new(1_000);
        let mut vault = Vault::new(config(), bank.clone(), Arc::new(clock.clone())).unwrap();
        vault
            .initialize(OWNER, HoldingStrategy::new(STRAT_A, &bank))
            .unwrap();
        bank.mint(BOO, ALICE, tokens(1_000));
        bank.mint(BOO, BOB, tokens(1_000));
        (bank, clock, vault)
    }

    #[test]
    fn test_empty_vault_price_is_one() {
        let (_, _, vault) = setup();
        assert_eq!(vault.price_per_full_share().unwrap(), unit(18));
        assert!(vault.total_supply().is_zero());
    }

    #[test]
    fn test_first_deposit_mints_one_to_one() {
        let (bank, _, mut vault) = setup();
        let minted = vault.deposit(ALICE, tokens(100)).unwrap();
        assert_eq!(minted, tokens(100));
        assert_eq!(vault.price_per_full_share().unwrap(), unit(18));
        // Idle funds were forwarded to the strategy
        assert!(vault.balance().is_zero());
        assert_eq!(bank.balance_of(BOO, STRAT_A), tokens(100));
        assert_eq!(vault.total_managed_assets(), tokens(100));
        assert_eq!(vault.cumulative_deposits(ALICE), tokens(100));
    }

    #[test]
    fn test_second_depositor_after_growth() {
        let (bank, _, mut vault) = setup();
        vault.deposit(ALICE, tokens(100)).unwrap();
        // Harvest grew the position to 220
        bank.mint(BOO, STRAT_A, tokens(120));
        assert_eq!(vault.total_managed_assets(), tokens(220));

        let minted = vault.deposit(BOB, tokens(100)).unwrap();
        let expected = tokens(100) * tokens(100) / tokens(220);
        assert_eq!(minted, expected);
        // ≈ 45.45 shares
        assert!(minted > tokens(45) && minted < tokens(46));
    }

    #[test]
    fn test_withdraw_fee_ten_bps() {
        let (bank, _, mut vault) = setup();
        vault.deposit(ALICE, tokens(1)).unwrap();
        let receipt = vault.withdraw_all(ALICE).unwrap();

        assert_eq!(receipt.gross, tokens(1));
        assert_eq!(receipt.paid, unit(15) * U256::from(999u64));
        assert_eq!(receipt.fee, unit(15));
        assert_eq!(bank.balance_of(BOO, TREASURY), unit(15));
        assert_eq!(bank.balance_of(BOO, ALICE), tokens(999) + receipt.paid);
        assert!(vault.total_supply().is_zero());
    }

    #[test]
    fn test_withdraw_fee_rounds_up() {
        let (bank, _, mut vault) = setup();
        vault.deposit(ALICE, U256::from(1_001u64)).unwrap();
        let receipt = vault.withdraw_all(ALICE).unwrap();
        // 1001 * 10 / 10000 = 1.001 → 2
        assert_eq!(receipt.fee, U256::from(2u64));
        assert_eq!(receipt.paid, U256::from(999u64));
        assert_eq!(bank.balance_of(BOO, TREASURY), U256::from(2u64));
    }

    #[test]
    fn test_round_trip_costs_only_the_fee() {
        let (bank, _, mut vault) = setup();
        vault.deposit(BOB, tokens(500)).unwrap();
        let start = bank.balance_of(BOO, ALICE);

        vault.deposit(ALICE, tokens(300)).unwrap();
        let receipt = vault.withdraw_all(ALICE).unwrap();
        let end = bank.balance_of(BOO, ALICE);

        assert_eq!(start - end, receipt.fee);
        assert_eq!(receipt.fee, tokens(300) * U256::from(10u64) / U256::from(10_000u64));
    }

    #[test]
    fn test_partial_withdraw_pulls_from_strategy() {
        let (bank, _, mut vault) = setup();
        vault.deposit(ALICE, tokens(100)).unwrap();
        bank.mint(BOO, VAULT, tokens(10));

        let receipt = vault.withdraw(ALICE, tokens(50)).unwrap();
        // 110 managed, half the supply → 55 owed: 10 idle + 45 from strategy
        assert_eq!(receipt.gross, tokens(55));
        assert_eq!(bank.balance_of(BOO, STRAT_A), tokens(55));
        assert_eq!(vault.balance_of(ALICE), tokens(50));
        assert_eq!(
            vault.withdraw(ALICE, tokens(51)).unwrap_err(),
            VaultError::InsufficientShares {
                available: tokens(50),
                requested: tokens(51)
            }
        );
        assert_eq!(vault.withdraw(ALICE, U256::ZERO).unwrap_err(), VaultError::ZeroAmount);
    }

    #[test]
    fn test_paused_blocks_deposits_not_withdrawals() {
        let (_, _, mut vault) = setup();
        vault.deposit(ALICE, tokens(10)).unwrap();
        vault.strategy_mut().unwrap().status = LifecycleState::Paused;

        assert_eq!(vault.deposit(ALICE, tokens(1)).unwrap_err(), VaultError::Paused);
        vault.strategy_mut().unwrap().status = LifecycleState::Panicked;
        assert_eq!(vault.deposit(ALICE, tokens(1)).unwrap_err(), VaultError::Panicked);
        assert!(vault.withdraw_all(ALICE).is_ok());
    }

    #[test]
    fn test_initialize_rules() {
        let bank = TokenBank::new();
        let clock = ManualClock::new(0);
        let mut vault: Vault<HoldingStrategy> =
            Vault::new(config(), bank.clone(), Arc::new(clock)).unwrap();

        assert_eq!(vault.deposit(ALICE, tokens(1)).unwrap_err(), VaultError::NotInitialized);
        assert_eq!(
            vault.initialize(ALICE, HoldingStrategy::new(STRAT_A, &bank)),
            Err(VaultError::NotAuthorized)
        );

        let mut wrong_asset = HoldingStrategy::new(STRAT_A, &bank);
        wrong_asset.want = WFTM;
        assert!(matches!(
            vault.initialize(OWNER, wrong_asset),
            Err(VaultError::StrategyMismatch(_))
        ));

        vault.initialize(OWNER, HoldingStrategy::new(STRAT_A, &bank)).unwrap();
        assert_eq!(
            vault.initialize(OWNER, HoldingStrategy::new(STRAT_B, &bank)),
            Err(VaultError::AlreadyInitialized)
        );
    }

    #[test]
    fn test_tvl_cap() {
        let (_, _, mut vault) = setup();
        vault.update_tvl_cap(OWNER, tokens(150)).unwrap();
        vault.deposit(ALICE, tokens(100)).unwrap();
        assert_eq!(
            vault.deposit(BOB, tokens(51)).unwrap_err(),
            VaultError::CapExceeded { cap: tokens(150) }
        );
        vault.deposit(BOB, tokens(50)).unwrap();

        assert_eq!(vault.remove_tvl_cap(ALICE), Err(VaultError::NotAuthorized));
        vault.remove_tvl_cap(OWNER).unwrap();
        vault.deposit(BOB, tokens(500)).unwrap();
    }

    #[test]
    fn test_fee_limits() {
        let (_, _, mut vault) = setup();
        assert_eq!(
            vault.update_withdraw_fee(OWNER, 1_001),
            Err(VaultError::FeeTooHigh { bps: 1_001, max: MAX_FEE_BPS })
        );
        assert_eq!(vault.update_deposit_fee(BOB, 5), Err(VaultError::NotAuthorized));
        vault.update_withdraw_fee(OWNER, 0).unwrap();
        vault.update_deposit_fee(OWNER, 100).unwrap();

        let minted = vault.deposit(ALICE, tokens(100)).unwrap();
        // 1% stays in the vault and is forwarded with the rest
        assert_eq!(minted, tokens(99));
        assert_eq!(vault.total_managed_assets(), tokens(100));
    }

    #[test]
    fn test_strategy_upgrade_waits_for_delay() {
        let (bank, clock, mut vault) = setup();
        vault.deposit(ALICE, tokens(100)).unwrap();

        assert!(matches!(vault.upgrade_strategy(OWNER), Err(VaultError::NoCandidate)));
        let ready_at = vault
            .propose_strategy(OWNER, HoldingStrategy::new(STRAT_B, &bank))
            .unwrap();
        assert_eq!(ready_at, 1_000 + 3_600);
        assert!(matches!(
            vault.upgrade_strategy(OWNER),
            Err(VaultError::ApprovalDelayPending { ready_at: 4_600, now: 1_000 })
        ));

        clock.advance(3_600);
        let retired = vault.upgrade_strategy(OWNER).unwrap().unwrap();
        assert_eq!(retired.status(), LifecycleState::Retired);
        assert_eq!(vault.strategy().unwrap().address(), STRAT_B);
        assert_eq!(bank.balance_of(BOO, STRAT_B), tokens(100));
        assert!(bank.balance_of(BOO, STRAT_A).is_zero());
        assert_eq!(vault.total_managed_assets(), tokens(100));
    }

    #[test]
    fn test_strategy_callback_cannot_reenter() {
        let (_, _, mut vault) = setup();
        let guard = vault.reentrancy_guard();
        let reentered = {
            let strategy = vault.strategy_mut().unwrap();
            strategy.vault_guard = Some(guard);
            strategy.reentered.clone()
        };

        vault.deposit(ALICE, tokens(10)).unwrap();
        assert!(!reentered.load(Ordering::SeqCst));
        assert!(!vault.reentrancy_guard().is_entered());
    }
}
