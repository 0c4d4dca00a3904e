//! In-memory stand-ins for the chain
//!
//! Responsible for:
//! - A MasterChef-style farm streaming rewards against a clock
//! - An xBOO-style interest-bearing wrapper in front of the farm
//! - An oracle-priced multi-hop swap router
//! - Wiring a complete vault + strategy deployment from `Config`

mod deployment;
mod farm;
mod router;
mod wrapper;

pub use deployment::*;
pub use farm::SimFarm;
pub use router::SimRouter;
pub use wrapper::SimWrapper;
