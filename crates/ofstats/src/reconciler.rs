//! Per-kind reconciliation routines.
//!
//! Each routine queues deletes and writes into the cycle's
//! [`WriteTransaction`]; nothing touches the store until the orchestrator
//! commits. Routines never suspend.

use crate::device::{DeviceContext, DeviceState};
use crate::error::{Result, StatsError};
use crate::classifier::StatisticsPayload;
use crate::registry::FlowRegistryKey;
use crate::store::{InstancePath, StoredRecord, WriteTransaction};
use log::{debug, trace, warn};
use ofstats_types::{
    FlowStats, GroupDescription, GroupStats, MeterConfig, MeterStats, NodeDescription, PortStats,
    QueueStats, StatisticsKind, TableStats,
};

/// How a payload relates to what is already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconcileMode {
    /// The payload is the complete state of its kind: sweep, then write.
    Full,
    /// The payload adds to a snapshot already swept this cycle: write only.
    Incremental,
}

/// Counts of what one routine queued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Delete ops queued by the sweep.
    pub deleted: usize,
    /// Write ops queued.
    pub written: usize,
    /// Reported entries that could not be addressed.
    pub skipped: usize,
    /// True if a full snapshot was written without its sweep.
    pub sweep_degraded: bool,
}

impl ReconcileStats {
    /// Adds another routine's counts to this one.
    pub fn merge(&mut self, other: ReconcileStats) {
        self.deleted += other.deleted;
        self.written += other.written;
        self.skipped += other.skipped;
        self.sweep_degraded |= other.sweep_degraded;
    }
}

fn ensure_ready(state: &DeviceState, kind: StatisticsKind) -> Result<()> {
    if state.node_ready {
        Ok(())
    } else {
        Err(StatsError::not_ready(
            &state.node_id,
            kind,
            "base node not established",
        ))
    }
}

/// Queues a sweep of every known entry of `kind` without a paired write.
///
/// Kinds that are addressed directly by device ids (tables, ports, queues,
/// the description) have nothing to sweep and queue no ops.
pub fn sweep(
    ctx: &mut DeviceContext,
    tx: &mut WriteTransaction,
    kind: StatisticsKind,
) -> Result<ReconcileStats> {
    ensure_ready(&ctx.state, kind)?;
    let deleted = sweep_kind(ctx, tx, kind)?;
    Ok(ReconcileStats {
        deleted,
        ..ReconcileStats::default()
    })
}

fn sweep_kind(
    ctx: &mut DeviceContext,
    tx: &mut WriteTransaction,
    kind: StatisticsKind,
) -> Result<usize> {
    let node = InstancePath::node(&ctx.state.node_id);
    let registries = &mut ctx.registries;
    let before = tx.len();

    match kind {
        StatisticsKind::Flow => {
            let tables = ctx.state.sweepable_tables().ok_or_else(|| {
                StatsError::not_ready(
                    &ctx.state.node_id,
                    kind,
                    "flow table range unknown until the device is synchronized",
                )
            })?;
            for table in tables {
                tx.delete(node.clone().table(table).flows());
            }
        }
        StatisticsKind::Group => {
            for id in registries.groups.iter() {
                tx.delete(node.clone().group(*id).statistics());
            }
        }
        StatisticsKind::GroupDesc => {
            for id in registries.groups.iter() {
                tx.delete(node.clone().group(*id));
            }
            registries.groups.clear();
        }
        StatisticsKind::Meter => {
            for id in registries.meters.iter() {
                tx.delete(node.clone().meter(*id).statistics());
            }
        }
        StatisticsKind::MeterConfig => {
            for id in registries.meters.iter() {
                tx.delete(node.clone().meter(*id));
            }
            registries.meters.clear();
        }
        StatisticsKind::Table
        | StatisticsKind::Port
        | StatisticsKind::Queue
        | StatisticsKind::Description => {
            trace!("No sweep for {} statistics", kind);
        }
    }

    Ok(tx.len() - before)
}

/// Reconciles one payload into the transaction.
///
/// Fails with [`StatsError::DeviceNotReady`] before queuing anything if the
/// device's base node is not established. A full flow snapshot on a device
/// whose table range is unknown is written without its sweep and reported
/// through [`ReconcileStats::sweep_degraded`].
pub fn reconcile(
    ctx: &mut DeviceContext,
    tx: &mut WriteTransaction,
    payload: StatisticsPayload,
    mode: ReconcileMode,
) -> Result<ReconcileStats> {
    let kind = payload.kind();
    ensure_ready(&ctx.state, kind)?;

    let mut stats = ReconcileStats::default();
    if mode == ReconcileMode::Full && kind.is_swept() {
        match sweep_kind(ctx, tx, kind) {
            Ok(deleted) => stats.deleted = deleted,
            Err(e) => {
                warn!("{}; writing {} snapshot without sweep", e, kind);
                stats.sweep_degraded = true;
            }
        }
    }

    let before = tx.len();
    match payload {
        StatisticsPayload::Flow(flows) => write_flows(ctx, tx, flows),
        StatisticsPayload::Group(groups) => write_group_stats(ctx, tx, groups),
        StatisticsPayload::GroupDesc(descs) => write_group_descs(ctx, tx, descs),
        StatisticsPayload::Meter(meters) => write_meter_stats(ctx, tx, meters),
        StatisticsPayload::MeterConfig(configs) => write_meter_configs(ctx, tx, configs),
        StatisticsPayload::Table(tables) => write_table_stats(ctx, tx, tables),
        StatisticsPayload::Port(ports) => write_port_stats(ctx, tx, ports),
        StatisticsPayload::Queue(queues) => stats.skipped = write_queue_stats(ctx, tx, queues),
        StatisticsPayload::Description(desc) => write_description(ctx, tx, desc),
    }
    stats.written = tx.len() - before;

    debug!(
        "Reconciled {} for {} ({:?}): {} deleted, {} written, {} skipped",
        kind, ctx.state.node_id, mode, stats.deleted, stats.written, stats.skipped
    );
    Ok(stats)
}

fn write_flows(ctx: &mut DeviceContext, tx: &mut WriteTransaction, flows: Vec<FlowStats>) {
    let node = InstancePath::node(&ctx.state.node_id);
    for flow in flows {
        let key = FlowRegistryKey::from_stats(&flow);
        let id = ctx.registries.flows.resolve(&key);
        let path = node.clone().table(flow.table_id).flows().flow(id.clone());
        tx.write(path, StoredRecord::Flow { id, stats: flow });
    }
}

fn write_group_stats(ctx: &mut DeviceContext, tx: &mut WriteTransaction, groups: Vec<GroupStats>) {
    let node = InstancePath::node(&ctx.state.node_id);
    for group in groups {
        if ctx.registries.groups.store(group.group_id) {
            debug!(
                "Group {} on {} reported statistics before its description",
                group.group_id, ctx.state.node_id
            );
        }
        let path = node.clone().group(group.group_id).statistics();
        tx.write(path, StoredRecord::GroupStatistics(group));
    }
}

fn write_group_descs(
    ctx: &mut DeviceContext,
    tx: &mut WriteTransaction,
    descs: Vec<GroupDescription>,
) {
    let node = InstancePath::node(&ctx.state.node_id);
    for desc in descs {
        let group = node.clone().group(desc.group_id);
        ctx.registries.groups.store(desc.group_id);
        tx.write(group.clone(), StoredRecord::GroupConfig(desc));
        tx.write(group.statistics(), StoredRecord::StatisticsPlaceholder);
    }
}

fn write_meter_stats(ctx: &mut DeviceContext, tx: &mut WriteTransaction, meters: Vec<MeterStats>) {
    let node = InstancePath::node(&ctx.state.node_id);
    for meter in meters {
        if ctx.registries.meters.store(meter.meter_id) {
            debug!(
                "Meter {} on {} reported statistics before its configuration",
                meter.meter_id, ctx.state.node_id
            );
        }
        let path = node.clone().meter(meter.meter_id).statistics();
        tx.write(path, StoredRecord::MeterStatistics(meter));
    }
}

fn write_meter_configs(
    ctx: &mut DeviceContext,
    tx: &mut WriteTransaction,
    configs: Vec<MeterConfig>,
) {
    let node = InstancePath::node(&ctx.state.node_id);
    for config in configs {
        let meter = node.clone().meter(config.meter_id);
        ctx.registries.meters.store(config.meter_id);
        tx.write(meter.clone(), StoredRecord::MeterConfig(config));
        tx.write(meter.statistics(), StoredRecord::StatisticsPlaceholder);
    }
}

fn write_table_stats(ctx: &DeviceContext, tx: &mut WriteTransaction, tables: Vec<TableStats>) {
    let node = InstancePath::node(&ctx.state.node_id);
    for table in tables {
        let path = node.clone().table(table.table_id).statistics();
        tx.write(path, StoredRecord::TableStatistics(table));
    }
}

fn write_port_stats(ctx: &DeviceContext, tx: &mut WriteTransaction, ports: Vec<PortStats>) {
    let node = InstancePath::node(&ctx.state.node_id);
    for port in ports {
        let path = node.clone().connector(port.connector_id.clone()).statistics();
        tx.write(path, StoredRecord::PortStatistics(port));
    }
}

/// Returns the number of entries skipped for lacking a queue id.
fn write_queue_stats(ctx: &DeviceContext, tx: &mut WriteTransaction, queues: Vec<QueueStats>) -> usize {
    let node = InstancePath::node(&ctx.state.node_id);
    let mut skipped = 0;
    for queue in queues {
        let Some(queue_id) = queue.queue_id else {
            debug!(
                "Skipping queue statistics without queue id on {}",
                queue.connector_id
            );
            skipped += 1;
            continue;
        };
        let path = node
            .clone()
            .connector(queue.connector_id.clone())
            .queue(queue_id)
            .statistics();
        tx.write(path, StoredRecord::QueueStatistics(queue));
    }
    skipped
}

fn write_description(ctx: &DeviceContext, tx: &mut WriteTransaction, desc: NodeDescription) {
    tx.write(
        InstancePath::node(&ctx.state.node_id),
        StoredRecord::NodeDescription(desc),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TxOp;
    use ofstats_types::{
        FlowMatch, GroupId, GroupType, MeterId, NodeConnectorId, NodeId, QueueId, TableId,
    };
    use pretty_assertions::assert_eq;

    fn node() -> NodeId {
        NodeId::new("openflow:1").unwrap()
    }

    fn ready_device(tables: u8) -> DeviceContext {
        DeviceContext::new(DeviceState::synchronized(node(), tables))
    }

    fn flow(table: u8, priority: u16, dst: &str, packets: u64) -> FlowStats {
        FlowStats::new(
            TableId::new(table).unwrap(),
            priority,
            FlowMatch::new().with("ipv4-destination", dst),
        )
        .with_counters(packets, packets * 64)
    }

    fn deletes(tx: &WriteTransaction) -> Vec<String> {
        tx.ops()
            .iter()
            .filter_map(|op| match op {
                TxOp::Delete(path) => Some(path.to_string()),
                TxOp::Write(..) => None,
            })
            .collect()
    }

    #[test]
    fn test_flow_full_sweeps_every_table() {
        let mut ctx = ready_device(2);
        let mut tx = WriteTransaction::new();

        let stats = reconcile(
            &mut ctx,
            &mut tx,
            StatisticsPayload::Flow(vec![flow(0, 100, "10.0.0.1/32", 5)]),
            ReconcileMode::Full,
        )
        .unwrap();

        assert_eq!(
            deletes(&tx),
            vec![
                "node[openflow:1]/table[0]/flows".to_string(),
                "node[openflow:1]/table[1]/flows".to_string(),
            ]
        );
        assert_eq!(stats.deleted, 2);
        assert_eq!(stats.written, 1);
        assert!(!stats.sweep_degraded);
        assert_eq!(ctx.registries.flows.len(), 1);
    }

    #[test]
    fn test_flow_incremental_never_sweeps() {
        let mut ctx = ready_device(2);
        let mut tx = WriteTransaction::new();

        let stats = reconcile(
            &mut ctx,
            &mut tx,
            StatisticsPayload::Flow(vec![flow(1, 10, "10.0.0.2/32", 1)]),
            ReconcileMode::Incremental,
        )
        .unwrap();

        assert!(deletes(&tx).is_empty());
        assert_eq!(stats.written, 1);
    }

    #[test]
    fn test_flow_sweep_degrades_without_table_count() {
        let mut state = DeviceState::synchronized(node(), 4);
        state.table_count = None;
        let mut ctx = DeviceContext::new(state);
        let mut tx = WriteTransaction::new();

        let stats = reconcile(
            &mut ctx,
            &mut tx,
            StatisticsPayload::Flow(vec![flow(0, 100, "10.0.0.1/32", 5)]),
            ReconcileMode::Full,
        )
        .unwrap();

        assert!(stats.sweep_degraded);
        assert_eq!(stats.deleted, 0);
        assert_eq!(stats.written, 1);

        let err = sweep(&mut ctx, &mut WriteTransaction::new(), StatisticsKind::Flow).unwrap_err();
        assert!(matches!(err, StatsError::DeviceNotReady { .. }));
    }

    #[test]
    fn test_not_ready_device_queues_nothing() {
        let mut ctx = DeviceContext::new(DeviceState::new(node()));
        let mut tx = WriteTransaction::new();

        let err = reconcile(
            &mut ctx,
            &mut tx,
            StatisticsPayload::Group(vec![GroupStats::new(GroupId::new(1), 1, 1)]),
            ReconcileMode::Full,
        )
        .unwrap_err();

        assert!(matches!(err, StatsError::DeviceNotReady { kind: StatisticsKind::Group, .. }));
        assert!(tx.is_empty());
        assert!(ctx.registries.groups.is_empty());
    }

    #[test]
    fn test_group_desc_full_prunes_registry() {
        let mut ctx = ready_device(1);
        for id in [1, 2, 3] {
            ctx.registries.groups.store(GroupId::new(id));
        }
        let mut tx = WriteTransaction::new();

        let descs = [1, 3]
            .into_iter()
            .map(|id| GroupDescription::new(GroupId::new(id), GroupType::All))
            .collect();
        let stats = reconcile(
            &mut ctx,
            &mut tx,
            StatisticsPayload::GroupDesc(descs),
            ReconcileMode::Full,
        )
        .unwrap();

        assert_eq!(stats.deleted, 3);
        assert_eq!(stats.written, 4);
        let known: Vec<u32> = ctx.registries.groups.iter().map(|g| g.as_u32()).collect();
        assert_eq!(known, vec![1, 3]);
    }

    #[test]
    fn test_group_stats_sweep_targets_statistics_only() {
        let mut ctx = ready_device(1);
        ctx.registries.groups.store(GroupId::new(2));
        let mut tx = WriteTransaction::new();

        reconcile(
            &mut ctx,
            &mut tx,
            StatisticsPayload::Group(vec![GroupStats::new(GroupId::new(1), 3, 192)]),
            ReconcileMode::Full,
        )
        .unwrap();

        assert_eq!(deletes(&tx), vec!["node[openflow:1]/group[2]/statistics".to_string()]);
        // Statistics for a group without a description still make it known.
        assert!(ctx.registries.groups.contains(&GroupId::new(1)));
        assert!(ctx.registries.groups.contains(&GroupId::new(2)));
    }

    #[test]
    fn test_meter_config_stores_ids() {
        let mut ctx = ready_device(1);
        let mut tx = WriteTransaction::new();

        reconcile(
            &mut ctx,
            &mut tx,
            StatisticsPayload::MeterConfig(vec![MeterConfig::new(MeterId::new(7))]),
            ReconcileMode::Incremental,
        )
        .unwrap();
        reconcile(
            &mut ctx,
            &mut tx,
            StatisticsPayload::Meter(vec![MeterStats::new(MeterId::new(7), 10, 1000)]),
            ReconcileMode::Full,
        )
        .unwrap();

        assert!(ctx.registries.meters.contains(&MeterId::new(7)));
        assert_eq!(deletes(&tx), vec!["node[openflow:1]/meter[7]/statistics".to_string()]);
    }

    #[test]
    fn test_queue_without_id_is_skipped() {
        let mut ctx = ready_device(1);
        let mut tx = WriteTransaction::new();
        let connector = NodeConnectorId::for_port(&node(), 1);

        let mut anonymous = QueueStats::new(connector.clone(), QueueId::new(0), 9);
        anonymous.queue_id = None;
        let queues = vec![QueueStats::new(connector, QueueId::new(1), 4), anonymous];

        let stats = reconcile(
            &mut ctx,
            &mut tx,
            StatisticsPayload::Queue(queues),
            ReconcileMode::Full,
        )
        .unwrap();

        assert_eq!(stats.written, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.deleted, 0);
        assert_eq!(
            tx.ops()[0].path().to_string(),
            "node[openflow:1]/port[openflow:1:1]/queue[1]/statistics"
        );
    }

    #[test]
    fn test_description_writes_node_record() {
        let mut ctx = ready_device(1);
        let mut tx = WriteTransaction::new();
        let desc = NodeDescription {
            manufacturer: "Nicira, Inc.".to_string(),
            ..NodeDescription::default()
        };

        reconcile(
            &mut ctx,
            &mut tx,
            StatisticsPayload::Description(desc.clone()),
            ReconcileMode::Full,
        )
        .unwrap();

        assert_eq!(
            tx.into_ops(),
            vec![TxOp::Write(
                InstancePath::node(&node()),
                StoredRecord::NodeDescription(desc)
            )]
        );
    }

    #[test]
    fn test_sweep_of_unswept_kind_is_noop() {
        let mut ctx = ready_device(1);
        let mut tx = WriteTransaction::new();
        for kind in [StatisticsKind::Table, StatisticsKind::Port, StatisticsKind::Queue] {
            assert_eq!(sweep(&mut ctx, &mut tx, kind).unwrap(), ReconcileStats::default());
        }
        assert!(tx.is_empty());
    }
}
