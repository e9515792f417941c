//! Normalized statistics and configuration records for groups, meters,
//! tables, ports, queues and the device description.

use crate::{GroupId, MeterId, NodeConnectorId, ParseError, QueueId, TableId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Per-bucket counters of a group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketCounter {
    pub packet_count: u64,
    pub byte_count: u64,
}

/// Counters of one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupStats {
    pub group_id: GroupId,
    #[serde(default)]
    pub ref_count: u32,
    #[serde(default)]
    pub packet_count: u64,
    #[serde(default)]
    pub byte_count: u64,
    #[serde(default)]
    pub duration_sec: u32,
    #[serde(default)]
    pub buckets: Vec<BucketCounter>,
}

impl GroupStats {
    /// Creates a group record with the given packet/byte counters.
    pub fn new(group_id: GroupId, packet_count: u64, byte_count: u64) -> Self {
        Self {
            group_id,
            ref_count: 0,
            packet_count,
            byte_count,
            duration_sec: 0,
            buckets: Vec::new(),
        }
    }
}

/// OpenFlow group type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupType {
    #[default]
    All,
    Select,
    Indirect,
    FastFailover,
}

impl fmt::Display for GroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GroupType::All => "all",
            GroupType::Select => "select",
            GroupType::Indirect => "indirect",
            GroupType::FastFailover => "fastfailover",
        };
        f.write_str(s)
    }
}

impl FromStr for GroupType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" => Ok(GroupType::All),
            "select" => Ok(GroupType::Select),
            "indirect" => Ok(GroupType::Indirect),
            "fastfailover" | "fast-failover" | "ff" => Ok(GroupType::FastFailover),
            _ => Err(ParseError::InvalidGroupType(s.to_string())),
        }
    }
}

/// One bucket of a group description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupBucket {
    #[serde(default)]
    pub weight: u16,
    #[serde(default)]
    pub watch_port: Option<u32>,
    #[serde(default)]
    pub watch_group: Option<u32>,
    #[serde(default)]
    pub actions: Vec<String>,
}

/// Configuration of one group as reported by a group-description reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDescription {
    pub group_id: GroupId,
    #[serde(default)]
    pub group_type: GroupType,
    #[serde(default)]
    pub buckets: Vec<GroupBucket>,
}

impl GroupDescription {
    /// Creates a description with no buckets.
    pub fn new(group_id: GroupId, group_type: GroupType) -> Self {
        Self {
            group_id,
            group_type,
            buckets: Vec::new(),
        }
    }
}

/// Per-band counters of a meter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterBandCounter {
    pub packet_band_count: u64,
    pub byte_band_count: u64,
}

/// Counters of one meter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterStats {
    pub meter_id: MeterId,
    #[serde(default)]
    pub flow_count: u32,
    #[serde(default)]
    pub packet_in_count: u64,
    #[serde(default)]
    pub byte_in_count: u64,
    #[serde(default)]
    pub duration_sec: u32,
    #[serde(default)]
    pub bands: Vec<MeterBandCounter>,
}

impl MeterStats {
    /// Creates a meter record with the given input counters.
    pub fn new(meter_id: MeterId, packet_in_count: u64, byte_in_count: u64) -> Self {
        Self {
            meter_id,
            flow_count: 0,
            packet_in_count,
            byte_in_count,
            duration_sec: 0,
            bands: Vec::new(),
        }
    }
}

/// One band of a meter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MeterBand {
    Drop { rate: u32, burst_size: u32 },
    DscpRemark { rate: u32, burst_size: u32, prec_level: u8 },
    Experimenter { rate: u32, burst_size: u32, experimenter: u32 },
}

/// Configuration of one meter as reported by a meter-config reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterConfig {
    pub meter_id: MeterId,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub bands: Vec<MeterBand>,
}

impl MeterConfig {
    /// Creates a configuration with no bands.
    pub fn new(meter_id: MeterId) -> Self {
        Self {
            meter_id,
            flags: Vec::new(),
            bands: Vec::new(),
        }
    }
}

/// Counters of one flow table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    pub table_id: TableId,
    #[serde(default)]
    pub active_flows: u32,
    #[serde(default)]
    pub packets_looked_up: u64,
    #[serde(default)]
    pub packets_matched: u64,
}

/// Counters of one port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortStats {
    pub connector_id: NodeConnectorId,
    #[serde(flatten)]
    pub counters: PortCounters,
}

impl PortStats {
    /// Creates a port record with the given packet counters.
    pub fn new(connector_id: NodeConnectorId, rx_packets: u64, tx_packets: u64) -> Self {
        Self {
            connector_id,
            counters: PortCounters {
                rx_packets,
                tx_packets,
                ..PortCounters::default()
            },
        }
    }
}

/// Receive/transmit counters of a port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortCounters {
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_dropped: u64,
    pub tx_dropped: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
    pub collision_count: u64,
    pub duration_sec: u32,
}

/// Counters of one port queue.
///
/// Devices may report queue entries without a queue id; such entries cannot
/// be addressed and are skipped by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub connector_id: NodeConnectorId,
    #[serde(default)]
    pub queue_id: Option<QueueId>,
    #[serde(default)]
    pub tx_packets: u64,
    #[serde(default)]
    pub tx_bytes: u64,
    #[serde(default)]
    pub tx_errors: u64,
    #[serde(default)]
    pub duration_sec: u32,
}

impl QueueStats {
    /// Creates a queue record with the given transmit counters.
    pub fn new(connector_id: NodeConnectorId, queue_id: QueueId, tx_packets: u64) -> Self {
        Self {
            connector_id,
            queue_id: Some(queue_id),
            tx_packets,
            tx_bytes: 0,
            tx_errors: 0,
            duration_sec: 0,
        }
    }
}

/// Descriptive metadata of a device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeDescription {
    pub manufacturer: String,
    pub hardware: String,
    pub software: String,
    pub serial_number: String,
    pub datapath_description: String,
}
