//! Per-device identity registries.
//!
//! Two flavors are provided:
//!
//! - [`FlowRegistry`]: content-addressed. Flow entries carry no device-assigned
//!   id, so one is derived from the flow's semantic key and remembered.
//! - [`KnownIdRegistry`]: set-membership. Groups and meters are numbered by
//!   the device; the registry only tracks which ids are believed to exist so
//!   that stale ones can be swept.
//!
//! Neither flavor ever creates entries as a side effect of a lookup.

mod flow;
mod known_ids;

pub use flow::{FlowRegistry, FlowRegistryKey};
pub use known_ids::KnownIdRegistry;
