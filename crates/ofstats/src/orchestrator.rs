//! Per-device reconciliation cycles.
//!
//! A cycle moves through
//! `REQUESTED -> COLLECTING -> CLASSIFYING -> RECONCILING -> COMMITTING -> DONE | FAILED`.
//! Only the pull suspends; classification and reconciliation run to
//! completion once started. All ops of a cycle are committed as one
//! transaction, and only if at least one kind reconciled.

use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::classifier::{partition, MultipartReply};
use crate::config::StatisticsConfig;
use crate::device::{DeviceContext, DeviceState};
use crate::error::{Result, StatsError};
use crate::reconciler::{self, ReconcileMode, ReconcileStats};
use crate::registry::FlowRegistryKey;
use crate::store::{DataStore, WriteTransaction};
use crate::transport::StatisticsTransport;
use log::{debug, info, warn};
use ofstats_types::{FlowId, NodeId, StatisticsKind};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Phase of a reconciliation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CyclePhase {
    Requested,
    Collecting,
    Classifying,
    Reconciling,
    Committing,
    Done,
    Failed,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CyclePhase::Requested => "REQUESTED",
            CyclePhase::Collecting => "COLLECTING",
            CyclePhase::Classifying => "CLASSIFYING",
            CyclePhase::Reconciling => "RECONCILING",
            CyclePhase::Committing => "COMMITTING",
            CyclePhase::Done => "DONE",
            CyclePhase::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Result of reconciling every payload of one kind in a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindOutcome {
    pub kind: StatisticsKind,
    /// Payloads of this kind in the reply list.
    pub payloads: usize,
    pub stats: ReconcileStats,
    /// Why the kind was aborted, if it was.
    pub error: Option<String>,
}

impl KindOutcome {
    fn new(kind: StatisticsKind, payloads: usize) -> Self {
        Self {
            kind,
            payloads,
            stats: ReconcileStats::default(),
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of one completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub request_id: u64,
    pub node_id: NodeId,
    /// Kind that was pulled; `None` for unsolicited replies.
    pub kind: Option<StatisticsKind>,
    pub phase: CyclePhase,
    pub outcomes: Vec<KindOutcome>,
    /// Replies dropped as unsupported.
    pub soft_failures: usize,
    pub committed: bool,
    pub ops_committed: usize,
}

impl CycleReport {
    /// Returns true if no reply was dropped and no kind aborted.
    pub fn is_clean(&self) -> bool {
        self.soft_failures == 0 && self.outcomes.iter().all(KindOutcome::succeeded)
    }

    /// Returns the outcome for a kind, if it appeared in the cycle.
    pub fn outcome(&self, kind: StatisticsKind) -> Option<&KindOutcome> {
        self.outcomes.iter().find(|o| o.kind == kind)
    }

    fn audit_outcome(&self) -> AuditOutcome {
        if self.is_clean() {
            AuditOutcome::Success
        } else {
            AuditOutcome::Partial
        }
    }
}

/// Result of one polling pass over the configured kinds.
#[derive(Debug, Default)]
pub struct GatherSummary {
    pub reports: Vec<CycleReport>,
    /// Kinds whose cycle failed outright, with the reason.
    pub failures: Vec<(StatisticsKind, String)>,
    /// True if polling is disabled and nothing was pulled.
    pub skipped: bool,
}

impl GatherSummary {
    /// Returns true if every cycle of the pass was clean.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.reports.iter().all(CycleReport::is_clean)
    }
}

/// Runs reconciliation cycles for one device.
///
/// Every operation takes `&mut self`, so cycles of one device are serialized
/// by construction. Devices get independent orchestrators.
pub struct CycleOrchestrator {
    device: DeviceContext,
    transport: Arc<dyn StatisticsTransport>,
    store: Arc<dyn DataStore>,
    config: StatisticsConfig,
    next_request_id: u64,
    phase: Option<CyclePhase>,
}

impl CycleOrchestrator {
    pub fn new(
        state: DeviceState,
        transport: Arc<dyn StatisticsTransport>,
        store: Arc<dyn DataStore>,
        config: StatisticsConfig,
    ) -> Self {
        Self {
            device: DeviceContext::new(state),
            transport,
            store,
            config,
            next_request_id: 0,
            phase: None,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        self.device.node_id()
    }

    pub fn device(&self) -> &DeviceContext {
        &self.device
    }

    /// Mutable access to the device facts maintained by its connection lifecycle.
    pub fn device_state_mut(&mut self) -> &mut DeviceState {
        &mut self.device.state
    }

    pub fn config(&self) -> &StatisticsConfig {
        &self.config
    }

    /// Phase reached by the most recent cycle, if any ran.
    pub fn phase(&self) -> Option<CyclePhase> {
        self.phase
    }

    fn enter(&mut self, phase: CyclePhase) {
        debug!("{}: cycle phase {}", self.device.node_id(), phase);
        self.phase = Some(phase);
    }

    fn next_request_id(&mut self) -> u64 {
        self.next_request_id += 1;
        self.next_request_id
    }

    /// Pulls one kind and reconciles the replies.
    ///
    /// Returns `true` if the cycle was clean, `false` if replies were dropped
    /// or kinds aborted, and an error if the pull or the commit failed.
    pub async fn run_cycle(&mut self, kind: StatisticsKind) -> Result<bool> {
        let report = self.run_cycle_report(kind).await?;
        Ok(report.is_clean())
    }

    /// Like [`run_cycle`](Self::run_cycle), returning the full report.
    pub async fn run_cycle_report(&mut self, kind: StatisticsKind) -> Result<CycleReport> {
        let request_id = self.next_request_id();
        self.device.timing.mark_start(kind);

        let result = self.pull_and_reconcile(request_id, kind).await;

        if let Some(elapsed) = self.device.timing.mark_end(kind) {
            debug!(
                "{}: {} cycle {} took {}ms",
                self.device.node_id(),
                kind,
                request_id,
                elapsed.as_millis()
            );
        }
        result
    }

    async fn pull_and_reconcile(
        &mut self,
        request_id: u64,
        kind: StatisticsKind,
    ) -> Result<CycleReport> {
        self.enter(CyclePhase::Requested);
        let node = self.device.node_id().clone();
        let transport = Arc::clone(&self.transport);
        let pull = transport.pull(&node, kind);

        self.enter(CyclePhase::Collecting);
        let replies = match tokio::time::timeout(self.config.pull_timeout(), pull).await {
            Ok(Ok(replies)) => replies,
            Ok(Err(message)) => return Err(self.fail_transport(request_id, kind, message)),
            Err(_) => {
                let message = format!(
                    "no reply within {}ms",
                    self.config.pull_timeout().as_millis()
                );
                return Err(self.fail_transport(request_id, kind, message));
            }
        };

        debug!(
            "{}: request {} collected {} {} replies",
            node,
            request_id,
            replies.len(),
            kind
        );
        self.reconcile_and_commit(request_id, Some(kind), replies).await
    }

    fn fail_transport(
        &mut self,
        request_id: u64,
        kind: StatisticsKind,
        message: String,
    ) -> StatsError {
        self.enter(CyclePhase::Failed);
        let err = StatsError::TransportFailure {
            node: self.device.node_id().clone(),
            kind,
            message,
        };
        warn!("Request {} failed: {}", request_id, err);
        audit_log!(AuditRecord::new(
            AuditCategory::CycleFailure,
            self.device.node_id().as_str(),
            "run_cycle"
        )
        .with_kind(kind.as_str())
        .with_request_id(request_id)
        .with_error(err.to_string()));
        err
    }

    /// Reconciles replies that did not come from a pull, such as a bulk
    /// update pushed by the device.
    pub async fn apply_replies(&mut self, replies: Vec<MultipartReply>) -> Result<CycleReport> {
        let request_id = self.next_request_id();
        self.reconcile_and_commit(request_id, None, replies).await
    }

    async fn reconcile_and_commit(
        &mut self,
        request_id: u64,
        kind: Option<StatisticsKind>,
        replies: Vec<MultipartReply>,
    ) -> Result<CycleReport> {
        self.enter(CyclePhase::Classifying);
        let classified = partition(replies);
        let soft_failures = classified.dropped.len();

        self.enter(CyclePhase::Reconciling);
        let registries_before = self.device.registries.clone();
        let mut tx = WriteTransaction::new();
        let mut outcomes = Vec::with_capacity(classified.buckets.len());

        for (bucket_kind, payloads) in classified.buckets {
            let mut outcome = KindOutcome::new(bucket_kind, payloads.len());
            let mark = tx.len();

            for (index, payload) in payloads.into_iter().enumerate() {
                let mode = if index == 0 {
                    ReconcileMode::Full
                } else {
                    ReconcileMode::Incremental
                };
                match reconciler::reconcile(&mut self.device, &mut tx, payload, mode) {
                    Ok(stats) => outcome.stats.merge(stats),
                    Err(e) => {
                        warn!("Aborting {} for request {}: {}", bucket_kind, request_id, e);
                        tx.truncate(mark);
                        outcome.stats = ReconcileStats::default();
                        outcome.error = Some(e.to_string());
                        break;
                    }
                }
            }
            outcomes.push(outcome);
        }

        let mut report = CycleReport {
            request_id,
            node_id: self.device.node_id().clone(),
            kind,
            phase: CyclePhase::Reconciling,
            outcomes,
            soft_failures,
            committed: false,
            ops_committed: 0,
        };

        if !report.outcomes.iter().any(KindOutcome::succeeded) {
            if !report.outcomes.is_empty() || soft_failures > 0 {
                warn!(
                    "{}: request {} reconciled no kind, nothing committed",
                    report.node_id, request_id
                );
            }
            self.enter(CyclePhase::Done);
            report.phase = CyclePhase::Done;
            return Ok(report);
        }

        self.enter(CyclePhase::Committing);
        let ops = tx.into_ops();
        let op_count = ops.len();
        if let Err(message) = self.store.commit(ops).await {
            self.device.registries = registries_before;
            self.enter(CyclePhase::Failed);
            let err = StatsError::CommitFailure {
                node: report.node_id.clone(),
                message,
            };
            warn!("Request {} failed: {}", request_id, err);
            let mut record = AuditRecord::new(
                AuditCategory::CycleFailure,
                report.node_id.as_str(),
                "commit",
            )
            .with_request_id(request_id)
            .with_error(err.to_string());
            if let Some(kind) = kind {
                record = record.with_kind(kind.as_str());
            }
            audit_log!(record);
            return Err(err);
        }

        self.enter(CyclePhase::Done);
        report.phase = CyclePhase::Done;
        report.committed = true;
        report.ops_committed = op_count;

        let mut record = AuditRecord::new(
            AuditCategory::CycleCommit,
            report.node_id.as_str(),
            if kind.is_some() { "run_cycle" } else { "apply_replies" },
        )
        .with_outcome(report.audit_outcome())
        .with_request_id(request_id)
        .with_details(serde_json::json!({
            "ops": op_count,
            "kinds": report.outcomes.iter().map(|o| o.kind.as_str()).collect::<Vec<_>>(),
            "soft_failures": soft_failures,
        }));
        if let Some(kind) = kind {
            record = record.with_kind(kind.as_str());
        }
        audit_log!(record);

        Ok(report)
    }

    /// Sweeps every stored entry of a kind without writing replacements.
    ///
    /// Used on device disconnect or cleanup. The sweep is committed on its
    /// own; a rejected commit restores the registries.
    pub async fn clear_statistics_by_kind(&mut self, kind: StatisticsKind) -> Result<ReconcileStats> {
        let registries_before = self.device.registries.clone();
        let mut tx = WriteTransaction::new();
        let stats = reconciler::sweep(&mut self.device, &mut tx, kind)?;
        let node = self.device.node_id().clone();

        if let Err(message) = self.store.commit(tx.into_ops()).await {
            self.device.registries = registries_before;
            let err = StatsError::CommitFailure { node, message };
            audit_log!(AuditRecord::new(
                AuditCategory::AdminClear,
                self.device.node_id().as_str(),
                "clear_statistics"
            )
            .with_kind(kind.as_str())
            .with_error(err.to_string()));
            return Err(err);
        }

        info!("{}: cleared {} statistics ({} deletes)", node, kind, stats.deleted);
        audit_log!(AuditRecord::new(AuditCategory::AdminClear, node.as_str(), "clear_statistics")
            .with_outcome(AuditOutcome::Success)
            .with_kind(kind.as_str())
            .with_details(serde_json::json!({ "deleted": stats.deleted })));
        Ok(stats)
    }

    /// Forgets a flow the device reported as removed.
    ///
    /// Returns the id it had been assigned, if any.
    pub fn on_flow_removed(&mut self, key: &FlowRegistryKey) -> Option<FlowId> {
        let removed = self.device.registries.flows.remove(key);
        match &removed {
            Some(id) => {
                debug!("{}: flow {} removed ({})", self.device.node_id(), id, key);
                audit_log!(AuditRecord::new(
                    AuditCategory::FlowRemoved,
                    self.device.node_id().as_str(),
                    "on_flow_removed"
                )
                .with_outcome(AuditOutcome::Success)
                .with_kind(StatisticsKind::Flow.as_str())
                .with_details(serde_json::json!({ "flow_id": id.as_str() })));
            }
            None => debug!("{}: removal of unregistered flow {}", self.device.node_id(), key),
        }
        removed
    }

    /// Runs one cycle per configured kind, in order.
    ///
    /// A failed kind does not stop the pass.
    pub async fn gather_dynamic_data(&mut self) -> GatherSummary {
        let mut summary = GatherSummary::default();
        if !self.config.polling_enabled {
            debug!("{}: statistics polling disabled", self.device.node_id());
            summary.skipped = true;
            return summary;
        }

        let kinds = self.config.kinds.clone();
        for kind in kinds {
            match self.run_cycle_report(kind).await {
                Ok(report) => summary.reports.push(report),
                Err(e) => summary.failures.push((kind, e.to_string())),
            }
        }
        summary
    }

    /// Repeats polling passes every poll interval until `shutdown` turns true.
    ///
    /// Returns the number of passes run.
    pub async fn poll_until(&mut self, mut shutdown: watch::Receiver<bool>) -> usize {
        let mut passes = 0;
        loop {
            if *shutdown.borrow() {
                break;
            }

            let summary = self.gather_dynamic_data().await;
            passes += 1;
            if !summary.is_clean() {
                warn!(
                    "{}: polling pass {} had {} failed kinds",
                    self.device.node_id(),
                    passes,
                    summary.failures.len()
                );
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("{}: polling stopped after {} passes", self.device.node_id(), passes);
        passes
    }
}
