//! Shared types for the keyward co-signer service: the `Vault` entity,
//! task-kind taxonomy, configuration, validation helpers, metrics sink and
//! RNG injection points used by every other `keyward-*` crate.

pub mod config;
pub mod metrics;
pub mod requests;
pub mod rng;
pub mod task;
pub mod validate;
pub mod vault;

pub use config::Config;
pub use metrics::{Metrics, NoopMetrics, TracingMetrics};
pub use rng::RngSource;
pub use task::TaskKind;
pub use vault::{LibType, Vault};
