//! Error types for statistics reconciliation.

use ofstats_types::{NodeId, StatisticsKind};
use thiserror::Error;

/// How far an error propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Dropped with a diagnostic; the cycle continues.
    Soft,
    /// Aborts the routine for one statistics kind; sibling kinds proceed.
    PerKind,
    /// Fails the whole cycle; nothing is applied.
    CycleFatal,
}

/// Errors raised while reconciling device statistics.
#[derive(Debug, Error)]
pub enum StatsError {
    /// Reply kind the engine does not reconcile (e.g. experimenter multiparts).
    #[error("Unsupported reply kind: {reply}")]
    UnsupportedReplyKind { reply: String },

    /// The device's base node has not been established in the store.
    #[error("Device {node} not ready for {kind} statistics: {reason}")]
    DeviceNotReady {
        node: NodeId,
        kind: StatisticsKind,
        reason: String,
    },

    /// The statistics pull itself failed.
    #[error("Transport failure pulling {kind} from {node}: {message}")]
    TransportFailure {
        node: NodeId,
        kind: StatisticsKind,
        message: String,
    },

    /// The accumulated transaction was rejected.
    #[error("Commit failed for {node}: {message}")]
    CommitFailure { node: NodeId, message: String },

    /// Registry lookup for a flow that was never resolved.
    #[error("Flow not registered: {key}")]
    FlowNotRegistered { key: String },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StatsError {
    /// Creates an unsupported reply error.
    pub fn unsupported(reply: impl Into<String>) -> Self {
        StatsError::UnsupportedReplyKind {
            reply: reply.into(),
        }
    }

    /// Creates a device-not-ready error.
    pub fn not_ready(node: &NodeId, kind: StatisticsKind, reason: impl Into<String>) -> Self {
        StatsError::DeviceNotReady {
            node: node.clone(),
            kind,
            reason: reason.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        StatsError::Config(message.into())
    }

    /// Returns how far this error propagates.
    pub fn severity(&self) -> Severity {
        match self {
            StatsError::UnsupportedReplyKind { .. } => Severity::Soft,
            StatsError::DeviceNotReady { .. } | StatsError::FlowNotRegistered { .. } => {
                Severity::PerKind
            }
            StatsError::TransportFailure { .. }
            | StatsError::CommitFailure { .. }
            | StatsError::Config(_)
            | StatsError::Io(_) => Severity::CycleFatal,
        }
    }

    /// Returns true if the error is recovered locally.
    pub fn is_soft(&self) -> bool {
        self.severity() == Severity::Soft
    }

    /// Returns true if the error fails the whole cycle.
    pub fn is_cycle_fatal(&self) -> bool {
        self.severity() == Severity::CycleFatal
    }
}

/// Result type for statistics operations.
pub type Result<T> = std::result::Result<T, StatsError>;
