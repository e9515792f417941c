//! Device-statistics reconciliation engine.
//!
//! This crate keeps a persisted, hierarchical snapshot of each device's
//! statistics in step with what the device currently reports:
//!
//! - [`FlowRegistry`] / [`KnownIdRegistry`]: per-device identity registries
//! - [`classify`]: turns one multipart reply into a kind-tagged payload
//! - [`reconcile`] / [`sweep`]: per-kind delete-then-write routines
//! - [`CycleOrchestrator`]: pull, classify, reconcile and commit one cycle
//! - [`StatisticsManager`]: one orchestrator per connected device
//!
//! # Architecture
//!
//! 1. The orchestrator pulls one statistics kind from the device
//! 2. Replies are classified and grouped by kind in arrival order
//! 3. The first payload of each kind is reconciled as a full snapshot
//!    (sweep, then write); later payloads of that kind only write
//! 4. All ops of the cycle are committed as a single transaction
//!
//! # Example
//!
//! ```ignore
//! use ofstats::{CycleOrchestrator, DeviceState, InMemoryDataStore, ScriptedTransport, StatisticsConfig};
//! use ofstats_types::{NodeId, StatisticsKind};
//!
//! let node = NodeId::new("openflow:1")?;
//! let mut orch = CycleOrchestrator::new(
//!     DeviceState::synchronized(node, 4),
//!     Arc::new(ScriptedTransport::new()),
//!     Arc::new(InMemoryDataStore::new()),
//!     StatisticsConfig::default(),
//! );
//!
//! let clean = orch.run_cycle(StatisticsKind::Flow).await?;
//! ```

pub mod audit;
mod classifier;
mod config;
mod device;
mod error;
mod manager;
mod orchestrator;
mod reconciler;
mod registry;
mod store;
mod timing;
mod transport;

pub use classifier::{
    classify, partition, ClassifiedReplies, MultipartReply, MultipartReplyBody, StatisticsPayload,
};
pub use config::{StatisticsConfig, DEFAULT_POLL_INTERVAL_MS, DEFAULT_PULL_TIMEOUT_MS};
pub use device::{DeviceContext, DeviceRegistries, DeviceState};
pub use error::{Result, Severity, StatsError};
pub use manager::StatisticsManager;
pub use orchestrator::{CycleOrchestrator, CyclePhase, CycleReport, GatherSummary, KindOutcome};
pub use reconciler::{reconcile, sweep, ReconcileMode, ReconcileStats};
pub use registry::{FlowRegistry, FlowRegistryKey, KnownIdRegistry};
pub use store::{
    DataStore, InMemoryDataStore, InstancePath, PathSegment, StoredRecord, TxOp, WriteTransaction,
};
pub use timing::{EventTimeCounter, EventTiming};
pub use transport::{ScriptedPull, ScriptedTransport, StatisticsTransport};
