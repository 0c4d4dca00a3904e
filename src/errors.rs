//! Error taxonomy for the vault and strategy engines
//!
//! Every failing call is rejected before any state change, except the two
//! designed exceptions: per-pool harvest isolation and panic's deferred
//! reconciliation.

use alloy_primitives::U256;
use thiserror::Error;

/// Failure reported by an external collaborator (farm, router, token book)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExternalError {
    #[error("insufficient {token} balance: have {available}, need {required}")]
    InsufficientBalance {
        token: String,
        available: U256,
        required: U256,
    },

    #[error("unknown pool id {0}")]
    UnknownPool(u64),

    #[error("no liquidity for hop {from} -> {to}")]
    NoLiquidity { from: String, to: String },

    #[error("call reverted: {0}")]
    Reverted(String),
}

/// Coarse classification used by callers that only care about the category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    State,
    ExternalFailure,
    AccountingDrift,
    FeeRoutingFailure,
    Authorization,
    Reentrancy,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    // ========== Validation ==========
    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("length mismatch: {ids} pool ids vs {amounts} amounts")]
    LengthMismatch { ids: usize, amounts: usize },

    #[error("pool {0} is already in use")]
    DuplicatePool(u64),

    #[error("pool {0} is not in use")]
    UnknownPool(u64),

    #[error("invalid route: {0}")]
    InvalidRoute(String),

    #[error("pool cap of {0} active pools reached")]
    PoolCapExceeded(usize),

    #[error("deposit would exceed TVL cap ({cap})")]
    CapExceeded { cap: U256 },

    #[error("allocations total {requested} exceed managed balance {available}")]
    AllocationExceedsBalance { requested: U256, available: U256 },

    #[error("allocation weights would total {0} bps (max 10000)")]
    AllocationOverflow(u32),

    #[error("fee of {bps} bps exceeds maximum of {max} bps")]
    FeeTooHigh { bps: u16, max: u16 },

    #[error("insufficient shares: have {available}, requested {requested}")]
    InsufficientShares { available: U256, requested: U256 },

    #[error("strategy does not match vault: {0}")]
    StrategyMismatch(String),

    #[error("arithmetic overflow")]
    MathOverflow,

    // ========== Lifecycle / state ==========
    #[error("strategy is paused")]
    Paused,

    #[error("strategy is panicked")]
    Panicked,

    #[error("strategy is retired")]
    Retired,

    #[error("invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("vault has no strategy bound")]
    NotInitialized,

    #[error("vault is already initialized")]
    AlreadyInitialized,

    #[error("no strategy candidate has been proposed")]
    NoCandidate,

    #[error("strategy upgrade not allowed before {ready_at} (now {now})")]
    ApprovalDelayPending { ready_at: u64, now: u64 },

    // ========== External ==========
    #[error("external call failed: {0}")]
    External(#[from] ExternalError),

    // ========== Accounting ==========
    #[error("internal accounting drift: cached {cached}, live {live}")]
    AccountingDrift { cached: U256, live: U256 },

    // ========== Fee routing ==========
    #[error("fee routing failed: {0}")]
    FeeRouting(String),

    // ========== Access / reentrancy ==========
    #[error("caller is not authorized")]
    NotAuthorized,

    #[error("reentrant call rejected")]
    Reentrancy,
}

impl VaultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::ZeroAmount
            | VaultError::IndexOutOfRange { .. }
            | VaultError::LengthMismatch { .. }
            | VaultError::DuplicatePool(_)
            | VaultError::UnknownPool(_)
            | VaultError::InvalidRoute(_)
            | VaultError::PoolCapExceeded(_)
            | VaultError::CapExceeded { .. }
            | VaultError::AllocationExceedsBalance { .. }
            | VaultError::AllocationOverflow(_)
            | VaultError::FeeTooHigh { .. }
            | VaultError::InsufficientShares { .. }
            | VaultError::StrategyMismatch(_)
            | VaultError::MathOverflow => ErrorKind::Validation,

            VaultError::Paused
            | VaultError::Panicked
            | VaultError::Retired
            | VaultError::InvalidTransition { .. }
            | VaultError::NotInitialized
            | VaultError::AlreadyInitialized
            | VaultError::NoCandidate
            | VaultError::ApprovalDelayPending { .. } => ErrorKind::State,

            VaultError::External(_) => ErrorKind::ExternalFailure,
            VaultError::AccountingDrift { .. } => ErrorKind::AccountingDrift,
            VaultError::FeeRouting(_) => ErrorKind::FeeRoutingFailure,
            VaultError::NotAuthorized => ErrorKind::Authorization,
            VaultError::Reentrancy => ErrorKind::Reentrancy,
        }
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;
