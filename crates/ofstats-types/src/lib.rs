//! Common OpenFlow statistics types for device-state reconciliation.
//!
//! This crate provides the value types shared by the statistics engine and
//! its collaborators:
//!
//! - [`NodeId`], [`TableId`], [`FlowId`], [`GroupId`], [`MeterId`],
//!   [`NodeConnectorId`], [`QueueId`]: identifiers of device entities
//! - [`FlowMatch`]: a flow entry's match predicate
//! - [`StatisticsKind`]: the closed set of reconciled statistics kinds
//! - Normalized counter records ([`FlowStats`], [`GroupStats`], [`PortStats`], ...)

mod flow;
mod ids;
mod kind;
mod stats;

pub use flow::{FlowCounters, FlowMatch, FlowStats};
pub use ids::{FlowId, GroupId, MeterId, NodeConnectorId, NodeId, QueueId, TableId};
pub use kind::StatisticsKind;
pub use stats::{
    BucketCounter, GroupBucket, GroupDescription, GroupStats, GroupType, MeterBand,
    MeterBandCounter, MeterConfig, MeterStats, NodeDescription, PortCounters, PortStats,
    QueueStats, TableStats,
};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid node id: {0:?}")]
    InvalidNodeId(String),

    #[error("invalid table id: {0}")]
    InvalidTableId(String),

    #[error("invalid {kind} id: {value}")]
    InvalidNumericId { kind: &'static str, value: String },

    #[error("invalid node connector id: {0:?}")]
    InvalidConnectorId(String),

    #[error("unknown statistics kind: {0}")]
    InvalidStatisticsKind(String),

    #[error("unknown group type: {0}")]
    InvalidGroupType(String),
}
