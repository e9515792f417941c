//! Per-device state consulted and owned by the reconciliation engine.

use crate::registry::{FlowRegistry, KnownIdRegistry};
use crate::timing::EventTimeCounter;
use ofstats_types::{GroupId, MeterId, NodeId, TableId};

/// Read-only facts about a device, maintained by its connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceState {
    /// Identifier of the device.
    pub node_id: NodeId,
    /// True once the initial device synchronization has completed.
    pub synchronized: bool,
    /// Number of flow tables the device reports supporting, if known.
    pub table_count: Option<u8>,
    /// True once the device's base node has been established in the store.
    pub node_ready: bool,
}

impl DeviceState {
    /// State of a freshly connected device: node not established, tables unknown.
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            synchronized: false,
            table_count: None,
            node_ready: false,
        }
    }

    /// State of a device that has completed synchronization.
    pub fn synchronized(node_id: NodeId, table_count: u8) -> Self {
        Self {
            node_id,
            synchronized: true,
            table_count: Some(table_count),
            node_ready: true,
        }
    }

    /// Returns the tables a flow sweep may clear.
    ///
    /// `None` while the device is unsynchronized or its table count is unknown;
    /// an undefined table range cannot be safely cleared.
    pub fn sweepable_tables(&self) -> Option<Vec<TableId>> {
        if !self.synchronized {
            return None;
        }
        let count = self.table_count?;
        Some(
            (0..count)
                .filter_map(|id| TableId::new(id).ok())
                .collect(),
        )
    }
}

/// Registries owned by one device's reconciliation sequence.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistries {
    pub flows: FlowRegistry,
    pub groups: KnownIdRegistry<GroupId>,
    pub meters: KnownIdRegistry<MeterId>,
}

/// Everything the engine keeps for one device.
///
/// Devices never share a context, so no locking is needed inside it.
#[derive(Debug)]
pub struct DeviceContext {
    pub state: DeviceState,
    pub registries: DeviceRegistries,
    pub timing: EventTimeCounter,
}

impl DeviceContext {
    pub fn new(state: DeviceState) -> Self {
        Self {
            state,
            registries: DeviceRegistries::default(),
            timing: EventTimeCounter::new(),
        }
    }

    /// Returns the device's node id.
    pub fn node_id(&self) -> &NodeId {
        &self.state.node_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn node() -> NodeId {
        NodeId::new("openflow:1").unwrap()
    }

    #[test]
    fn test_new_device_is_not_ready() {
        let state = DeviceState::new(node());
        assert!(!state.node_ready);
        assert!(state.sweepable_tables().is_none());
    }

    #[test]
    fn test_sweepable_tables() {
        let state = DeviceState::synchronized(node(), 3);
        let tables: Vec<u8> = state
            .sweepable_tables()
            .unwrap()
            .iter()
            .map(TableId::as_u8)
            .collect();
        assert_eq!(tables, vec![0, 1, 2]);
    }

    #[test]
    fn test_unsynchronized_device_has_no_sweep_range() {
        let mut state = DeviceState::synchronized(node(), 4);
        state.synchronized = false;
        assert!(state.sweepable_tables().is_none());

        state.synchronized = true;
        state.table_count = None;
        assert!(state.sweepable_tables().is_none());
    }
}
