//! Lifecycle state machine shared by Vault and Strategy
//!
//! The Strategy owns the state; the Vault only reads it through
//! `VaultStrategy::status()` to gate deposits.
//!
//! ```text
//!   Active ──pause──▶ Paused ──unpause──▶ Active
//!     │                 │
//!     └──panic──▶ Panicked ◀──panic──┘
//!                   │
//!                   └──unpause (after reconciliation)──▶ Active
//!
//!   any non-retired state ──retire──▶ Retired (terminal)
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::{Result, VaultError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LifecycleState {
    #[default]
    Active,
    Paused,
    Panicked,
    Retired,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Active => write!(f, "ACTIVE"),
            LifecycleState::Paused => write!(f, "PAUSED"),
            LifecycleState::Panicked => write!(f, "PANICKED"),
            LifecycleState::Retired => write!(f, "RETIRED"),
        }
    }
}

impl LifecycleState {
    /// Deposits and harvests need Active
    pub fn ensure_active(self) -> Result<()> {
        match self {
            LifecycleState::Active => Ok(()),
            LifecycleState::Paused => Err(VaultError::Paused),
            LifecycleState::Panicked => Err(VaultError::Panicked),
            LifecycleState::Retired => Err(VaultError::Retired),
        }
    }

    pub fn is_active(self) -> bool {
        self == LifecycleState::Active
    }

    pub fn is_terminal(self) -> bool {
        self == LifecycleState::Retired
    }
}

/// Holder of the current state with checked transitions
#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    state: LifecycleState,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    fn transition(&mut self, allowed: &[LifecycleState], to: LifecycleState) -> Result<LifecycleState> {
        if !allowed.contains(&self.state) {
            return Err(VaultError::InvalidTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        let from = self.state;
        self.state = to;
        Ok(from)
    }

    /// Active → Paused
    pub fn pause(&mut self) -> Result<LifecycleState> {
        self.transition(&[LifecycleState::Active], LifecycleState::Paused)
    }

    /// Paused | Panicked → Active; returns the state left
    pub fn unpause(&mut self) -> Result<LifecycleState> {
        self.transition(
            &[LifecycleState::Paused, LifecycleState::Panicked],
            LifecycleState::Active,
        )
    }

    /// Active | Paused → Panicked
    pub fn panic(&mut self) -> Result<LifecycleState> {
        self.transition(
            &[LifecycleState::Active, LifecycleState::Paused],
            LifecycleState::Panicked,
        )
    }

    /// Any non-retired state → Retired
    pub fn retire(&mut self) -> Result<LifecycleState> {
        self.transition(
            &[
                LifecycleState::Active,
                LifecycleState::Paused,
                LifecycleState::Panicked,
            ],
            LifecycleState::Retired,
        )
    }
}
