//! Yield strategy: pool registry, harvest engine, fee routing, harvest log

pub mod engine;
pub mod fees;
pub mod harvest_log;
pub mod pool_registry;

pub use engine::{
    CompoundingStrategy, HarvestReport, PoolHarvestOutcome, Roles, StrategyParams,
    ACCOUNTING_TOLERANCE,
};
pub use fees::{BasisPointFeeRouter, FeeRouter, FeeSplit, ProfitSplit, StrategistPayee};
pub use harvest_log::{HarvestLog, HarvestLogEntry, LogWrite, DEFAULT_LOG_CADENCE, HARVEST_LOG_CAPACITY};
pub use pool_registry::{PoolEntry, PoolRegistry, MAX_POOLS};
