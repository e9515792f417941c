//! Multipart reply shapes and their classification into per-kind payloads.

use crate::error::{Result, StatsError};
use ofstats_types::{
    FlowStats, GroupDescription, GroupStats, MeterConfig, MeterStats, NodeDescription, PortStats,
    QueueStats, StatisticsKind, TableStats,
};
use serde::{Deserialize, Serialize};

/// One logical multipart reply, already reassembled by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipartReply {
    #[serde(default)]
    pub xid: u32,
    pub body: MultipartReplyBody,
}

impl MultipartReply {
    pub fn new(xid: u32, body: MultipartReplyBody) -> Self {
        Self { xid, body }
    }
}

/// Decoded body of a multipart reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "entries", rename_all = "snake_case")]
pub enum MultipartReplyBody {
    Flow(Vec<FlowStats>),
    Group(Vec<GroupStats>),
    GroupDesc(Vec<GroupDescription>),
    Meter(Vec<MeterStats>),
    MeterConfig(Vec<MeterConfig>),
    Table(Vec<TableStats>),
    PortStats(Vec<PortStats>),
    Queue(Vec<QueueStats>),
    Desc(NodeDescription),
    Aggregate {
        packet_count: u64,
        byte_count: u64,
        flow_count: u32,
    },
    GroupFeatures,
    MeterFeatures,
    TableFeatures,
    PortDesc,
    Experimenter {
        experimenter: u32,
        exp_type: u32,
    },
}

impl MultipartReplyBody {
    /// Returns the reply's wire-style type name.
    pub fn type_name(&self) -> String {
        match self {
            MultipartReplyBody::Flow(_) => "FLOW".to_string(),
            MultipartReplyBody::Group(_) => "GROUP".to_string(),
            MultipartReplyBody::GroupDesc(_) => "GROUP_DESC".to_string(),
            MultipartReplyBody::Meter(_) => "METER".to_string(),
            MultipartReplyBody::MeterConfig(_) => "METER_CONFIG".to_string(),
            MultipartReplyBody::Table(_) => "TABLE".to_string(),
            MultipartReplyBody::PortStats(_) => "PORT_STATS".to_string(),
            MultipartReplyBody::Queue(_) => "QUEUE".to_string(),
            MultipartReplyBody::Desc(_) => "DESC".to_string(),
            MultipartReplyBody::Aggregate { .. } => "AGGREGATE".to_string(),
            MultipartReplyBody::GroupFeatures => "GROUP_FEATURES".to_string(),
            MultipartReplyBody::MeterFeatures => "METER_FEATURES".to_string(),
            MultipartReplyBody::TableFeatures => "TABLE_FEATURES".to_string(),
            MultipartReplyBody::PortDesc => "PORT_DESC".to_string(),
            MultipartReplyBody::Experimenter {
                experimenter,
                exp_type,
            } => format!("EXPERIMENTER({:#010x}/{})", experimenter, exp_type),
        }
    }
}

/// Normalized per-kind payload handed to the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatisticsPayload {
    Flow(Vec<FlowStats>),
    Group(Vec<GroupStats>),
    GroupDesc(Vec<GroupDescription>),
    Meter(Vec<MeterStats>),
    MeterConfig(Vec<MeterConfig>),
    Table(Vec<TableStats>),
    Port(Vec<PortStats>),
    Queue(Vec<QueueStats>),
    Description(NodeDescription),
}

impl StatisticsPayload {
    /// Returns the kind this payload reconciles.
    pub fn kind(&self) -> StatisticsKind {
        match self {
            StatisticsPayload::Flow(_) => StatisticsKind::Flow,
            StatisticsPayload::Group(_) => StatisticsKind::Group,
            StatisticsPayload::GroupDesc(_) => StatisticsKind::GroupDesc,
            StatisticsPayload::Meter(_) => StatisticsKind::Meter,
            StatisticsPayload::MeterConfig(_) => StatisticsKind::MeterConfig,
            StatisticsPayload::Table(_) => StatisticsKind::Table,
            StatisticsPayload::Port(_) => StatisticsKind::Port,
            StatisticsPayload::Queue(_) => StatisticsKind::Queue,
            StatisticsPayload::Description(_) => StatisticsKind::Description,
        }
    }

    /// Returns the number of entries carried.
    pub fn len(&self) -> usize {
        match self {
            StatisticsPayload::Flow(v) => v.len(),
            StatisticsPayload::Group(v) => v.len(),
            StatisticsPayload::GroupDesc(v) => v.len(),
            StatisticsPayload::Meter(v) => v.len(),
            StatisticsPayload::MeterConfig(v) => v.len(),
            StatisticsPayload::Table(v) => v.len(),
            StatisticsPayload::Port(v) => v.len(),
            StatisticsPayload::Queue(v) => v.len(),
            StatisticsPayload::Description(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unwraps a reply into its kind and normalized payload.
///
/// Fails with [`StatsError::UnsupportedReplyKind`] for replies the engine
/// does not reconcile. That error is soft: callers drop the reply and go on.
pub fn classify(reply: MultipartReply) -> Result<(StatisticsKind, StatisticsPayload)> {
    let payload = match reply.body {
        MultipartReplyBody::Flow(v) => StatisticsPayload::Flow(v),
        MultipartReplyBody::Group(v) => StatisticsPayload::Group(v),
        MultipartReplyBody::GroupDesc(v) => StatisticsPayload::GroupDesc(v),
        MultipartReplyBody::Meter(v) => StatisticsPayload::Meter(v),
        MultipartReplyBody::MeterConfig(v) => StatisticsPayload::MeterConfig(v),
        MultipartReplyBody::Table(v) => StatisticsPayload::Table(v),
        MultipartReplyBody::PortStats(v) => StatisticsPayload::Port(v),
        MultipartReplyBody::Queue(v) => StatisticsPayload::Queue(v),
        MultipartReplyBody::Desc(d) => StatisticsPayload::Description(d),
        other => return Err(StatsError::unsupported(other.type_name())),
    };
    Ok((payload.kind(), payload))
}

/// Replies of one cycle partitioned by kind.
#[derive(Debug, Default)]
pub struct ClassifiedReplies {
    /// Configuration kinds first, then counter kinds, each tier in order of
    /// first appearance. Payloads of a kind keep their arrival order.
    pub buckets: Vec<(StatisticsKind, Vec<StatisticsPayload>)>,
    /// Soft failures for replies that were dropped.
    pub dropped: Vec<StatsError>,
}

impl ClassifiedReplies {
    /// Returns the number of payloads across all kinds.
    pub fn payload_count(&self) -> usize {
        self.buckets.iter().map(|(_, payloads)| payloads.len()).sum()
    }
}

/// Classifies every reply, grouping payloads by kind.
///
/// A configuration sweep deletes whole group/meter subtrees, so configuration
/// kinds are ordered ahead of counters written in the same cycle.
pub fn partition(replies: Vec<MultipartReply>) -> ClassifiedReplies {
    let mut classified = ClassifiedReplies::default();

    for reply in replies {
        let xid = reply.xid;
        match classify(reply) {
            Ok((kind, payload)) => {
                match classified.buckets.iter_mut().find(|(k, _)| *k == kind) {
                    Some((_, payloads)) => payloads.push(payload),
                    None => classified.buckets.push((kind, vec![payload])),
                }
            }
            Err(e) => {
                log::warn!("Dropping reply xid {}: {}", xid, e);
                classified.dropped.push(e);
            }
        }
    }

    classified
        .buckets
        .sort_by_key(|(kind, _)| !kind.is_configuration());

    classified
}
