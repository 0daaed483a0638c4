//! Query aggregation engine.
//!
//! [`Aggregator::search`] drives one request end to end: validation, cache
//! lookup, per-engine admission ([`budget`]), concurrent dispatch
//! ([`dispatch`]), normalization ([`normalize`]), cross-engine merge
//! ([`merge`]) and cache population.

pub mod budget;
pub mod cache;
pub mod dispatch;
pub mod merge;
pub mod normalize;
pub mod registry;
pub mod session;
pub mod stats;
mod urlkey;

pub use budget::{Admission, BudgetPolicy, BudgetSnapshot, Budgeter, Outcome, Permit};
pub use cache::{CacheError, CacheStore, MemoryCache};
pub use dispatch::{DispatchTarget, Dispatcher};
pub use merge::{merge, EngineGroup, MergePolicy, Merged};
pub use normalize::normalize;
pub use registry::{EngineRegistry, EngineSettings, RegisteredEngine, RegistryError};
pub use session::{cache_key, Aggregator, AggregatorSettings};
pub use stats::EngineStats;
pub use urlkey::identity_key;
