//! Registry of per-device orchestrators.

use crate::config::StatisticsConfig;
use crate::device::DeviceState;
use crate::error::{Result, StatsError};
use crate::orchestrator::{CycleOrchestrator, GatherSummary};
use crate::reconciler::ReconcileStats;
use crate::store::DataStore;
use crate::transport::StatisticsTransport;
use log::{info, warn};
use ofstats_types::{NodeId, StatisticsKind};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

/// Owns one [`CycleOrchestrator`] per connected device.
///
/// Each orchestrator sits behind its own mutex, so cycles of one device are
/// serialized while different devices proceed concurrently.
pub struct StatisticsManager {
    devices: HashMap<NodeId, Arc<Mutex<CycleOrchestrator>>>,
    transport: Arc<dyn StatisticsTransport>,
    store: Arc<dyn DataStore>,
    config: StatisticsConfig,
}

impl StatisticsManager {
    pub fn new(
        transport: Arc<dyn StatisticsTransport>,
        store: Arc<dyn DataStore>,
        config: StatisticsConfig,
    ) -> Self {
        Self {
            devices: HashMap::new(),
            transport,
            store,
            config,
        }
    }

    /// Starts tracking a device.
    ///
    /// Returns false if the device was already tracked; its registries are kept.
    pub fn add_device(&mut self, state: DeviceState) -> bool {
        if self.devices.contains_key(&state.node_id) {
            warn!("Device {} already tracked", state.node_id);
            return false;
        }
        info!("Tracking statistics for {}", state.node_id);
        let node = state.node_id.clone();
        let orch = CycleOrchestrator::new(
            state,
            self.transport.clone(),
            self.store.clone(),
            self.config.clone(),
        );
        self.devices.insert(node, Arc::new(Mutex::new(orch)));
        true
    }

    /// Stops tracking a device, dropping its registries.
    pub fn remove_device(&mut self, node: &NodeId) -> bool {
        let removed = self.devices.remove(node).is_some();
        if removed {
            info!("Stopped tracking statistics for {}", node);
        }
        removed
    }

    /// Returns the orchestrator of a device.
    pub fn device(&self, node: &NodeId) -> Option<Arc<Mutex<CycleOrchestrator>>> {
        self.devices.get(node).cloned()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn tracked(&self, node: &NodeId, kind: StatisticsKind) -> Result<Arc<Mutex<CycleOrchestrator>>> {
        self.device(node)
            .ok_or_else(|| StatsError::not_ready(node, kind, "device not tracked"))
    }

    /// Runs one cycle of `kind` for a device.
    pub async fn run_cycle(&self, node: &NodeId, kind: StatisticsKind) -> Result<bool> {
        let orch = self.tracked(node, kind)?;
        let mut orch = orch.lock().await;
        orch.run_cycle(kind).await
    }

    /// Sweeps every stored entry of `kind` for a device.
    pub async fn clear_statistics_by_kind(
        &self,
        node: &NodeId,
        kind: StatisticsKind,
    ) -> Result<ReconcileStats> {
        let orch = self.tracked(node, kind)?;
        let mut orch = orch.lock().await;
        orch.clear_statistics_by_kind(kind).await
    }

    /// Runs one polling pass on every device concurrently.
    ///
    /// Results are sorted by node id.
    pub async fn gather_all(&self) -> Vec<(NodeId, GatherSummary)> {
        let mut tasks = JoinSet::new();
        for (node, orch) in &self.devices {
            let node = node.clone();
            let orch = Arc::clone(orch);
            tasks.spawn(async move {
                let summary = orch.lock().await.gather_dynamic_data().await;
                (node, summary)
            });
        }

        let mut results = Vec::with_capacity(self.devices.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => warn!("Polling task failed: {}", e),
            }
        }
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }
}
