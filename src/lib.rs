//! Compounder: an auto-compounding yield vault
//!
//! ```text
//! depositors ──▶ Vault (shares) ──▶ CompoundingStrategy ──▶ Wrapper ──▶ Farm pools
//!                    ▲                    │ harvest
//!                    │                    ▼
//!                    └──── base asset ◀── SwapRouter ◀── rewards
//! ```
//!
//! The chain is simulated in-process (`simulator`), so the same engine
//! runs under the keeper binary and under unit tests.

pub mod adapters;
pub mod clock;
pub mod config;
pub mod errors;
pub mod guard;
pub mod lifecycle;
pub mod math;
pub mod simulator;
pub mod strategy;
pub mod tokens;
pub mod vault;
