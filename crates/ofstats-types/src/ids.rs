//! Identifiers for devices and the entities they report statistics for.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stable identifier of a managed device (e.g. `openflow:1`).
///
/// # Examples
///
/// ```
/// use ofstats_types::NodeId;
///
/// let node: NodeId = "openflow:1".parse().unwrap();
/// assert_eq!(node.as_str(), "openflow:1");
/// assert!("".parse::<NodeId>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a node id, rejecting empty or whitespace-bearing values.
    pub fn new(id: impl Into<String>) -> Result<Self, ParseError> {
        let id = id.into();
        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return Err(ParseError::InvalidNodeId(id));
        }
        Ok(NodeId(id))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NodeId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeId::new(s)
    }
}

/// Flow table number (0-254; 255 is the OpenFlow "all tables" wildcard).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct TableId(u8);

impl TableId {
    /// Highest addressable table.
    pub const MAX: u8 = 254;

    /// Creates a table id.
    pub fn new(id: u8) -> Result<Self, ParseError> {
        if id <= Self::MAX {
            Ok(TableId(id))
        } else {
            Err(ParseError::InvalidTableId(id.to_string()))
        }
    }

    /// Returns the table number.
    pub const fn as_u8(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TableId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id: u8 = s
            .trim()
            .parse()
            .map_err(|_| ParseError::InvalidTableId(s.to_string()))?;
        TableId::new(id).map_err(|_| ParseError::InvalidTableId(s.to_string()))
    }
}

impl TryFrom<u8> for TableId {
    type Error = ParseError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        TableId::new(id)
    }
}

impl From<TableId> for u8 {
    fn from(table: TableId) -> u8 {
        table.0
    }
}

/// Identity assigned to a flow entry by the flow registry.
///
/// Devices do not number their flows, so this id is minted locally from the
/// flow's semantic key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowId(String);

impl FlowId {
    /// Wraps an already-derived flow id.
    pub fn new(id: impl Into<String>) -> Self {
        FlowId(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Numeric, device-assigned identifiers.
macro_rules! numeric_id {
    ($(#[$doc:meta])* $name:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Creates the id from its raw value.
            pub const fn new(id: u32) -> Self {
                $name(id)
            }

            /// Returns the raw value.
            pub const fn as_u32(&self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse()
                    .map($name)
                    .map_err(|_| ParseError::InvalidNumericId {
                        kind: $label,
                        value: s.to_string(),
                    })
            }
        }

        impl From<u32> for $name {
            fn from(id: u32) -> Self {
                $name(id)
            }
        }
    };
}

numeric_id!(
    /// Device-assigned group identifier.
    GroupId,
    "group"
);
numeric_id!(
    /// Device-assigned meter identifier.
    MeterId,
    "meter"
);
numeric_id!(
    /// Device-assigned queue identifier (scoped to a port).
    QueueId,
    "queue"
);

/// Port (node connector) identifier, e.g. `openflow:1:3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeConnectorId(String);

impl NodeConnectorId {
    /// Creates a connector id, rejecting empty values.
    pub fn new(id: impl Into<String>) -> Result<Self, ParseError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ParseError::InvalidConnectorId(id));
        }
        Ok(NodeConnectorId(id))
    }

    /// Builds the conventional `<node>:<port>` connector id.
    pub fn for_port(node: &NodeId, port_number: u32) -> Self {
        NodeConnectorId(format!("{}:{}", node, port_number))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeConnectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NodeConnectorId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeConnectorId::new(s)
    }
}
