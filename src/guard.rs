//! Reentrancy guard
//!
//! One flag per Vault and per Strategy. The flag is set before the first
//! external call of a mutating operation and cleared when the returned
//! scope is dropped, so a nested entry (a collaborator calling back in)
//! is rejected instead of observing half-finished state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::errors::{Result, VaultError};

#[derive(Debug, Clone, Default)]
pub struct ReentrancyGuard {
    entered: Arc<AtomicBool>,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check-and-set the flag, failing with `Reentrancy` if already held
    pub fn enter(&self) -> Result<GuardScope> {
        if self
            .entered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(VaultError::Reentrancy);
        }
        Ok(GuardScope {
            entered: Arc::clone(&self.entered),
        })
    }

    pub fn is_entered(&self) -> bool {
        self.entered.load(Ordering::SeqCst)
    }
}

/// Held for the duration of a guarded call
#[derive(Debug)]
pub struct GuardScope {
    entered: Arc<AtomicBool>,
}

impl Drop for GuardScope {
    fn drop(&mut self) {
        self.entered.store(false, Ordering::SeqCst);
    }
}
