//! The closed set of statistics kinds the engine reconciles.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Statistics kind carried alongside every normalized payload.
///
/// Drives dispatch both for the pre-snapshot sweep and for the write step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatisticsKind {
    Flow,
    Group,
    GroupDesc,
    Meter,
    MeterConfig,
    Table,
    Port,
    Queue,
    Description,
}

impl StatisticsKind {
    /// Returns every kind.
    pub fn all() -> &'static [StatisticsKind] {
        &[
            Self::Flow,
            Self::Group,
            Self::GroupDesc,
            Self::Meter,
            Self::MeterConfig,
            Self::Table,
            Self::Port,
            Self::Queue,
            Self::Description,
        ]
    }

    /// Returns the wire-style name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flow => "FLOW",
            Self::Group => "GROUP",
            Self::GroupDesc => "GROUP_DESC",
            Self::Meter => "METER",
            Self::MeterConfig => "METER_CONFIG",
            Self::Table => "TABLE",
            Self::Port => "PORT",
            Self::Queue => "QUEUE",
            Self::Description => "DESCRIPTION",
        }
    }

    /// Returns true if a full snapshot of this kind starts with a sweep.
    ///
    /// Tables, ports, queues and the description are addressed directly by
    /// device-reported ids and are overwritten in place.
    pub fn is_swept(&self) -> bool {
        matches!(
            self,
            Self::Flow | Self::Group | Self::GroupDesc | Self::Meter | Self::MeterConfig
        )
    }

    /// Returns true if this kind is configuration rather than counters.
    ///
    /// Configuration kinds are where new group/meter ids become known.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::GroupDesc | Self::MeterConfig)
    }
}

impl fmt::Display for StatisticsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatisticsKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace('-', "_");
        Self::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| ParseError::InvalidStatisticsKind(s.to_string()))
    }
}
