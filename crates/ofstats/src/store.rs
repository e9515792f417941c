//! Hierarchical state store and the per-cycle write transaction.
//!
//! Every device owns a subtree rooted at its node id:
//!
//! ```text
//! node[openflow:1]
//! ├── table[0]/statistics
//! ├── table[0]/flows/flow[#UF$TABLE*0-...]
//! ├── group[1]                      group configuration
//! ├── group[1]/statistics
//! ├── meter[7], meter[7]/statistics
//! └── port[openflow:1:1]/statistics
//!     └── port[openflow:1:1]/queue[0]/statistics
//! ```
//!
//! Writes set the record at exactly one path. Deletes remove a path together
//! with everything beneath it.

use async_trait::async_trait;
use ofstats_types::{
    FlowId, FlowStats, GroupDescription, GroupId, GroupStats, MeterConfig, MeterId, MeterStats,
    NodeConnectorId, NodeDescription, NodeId, PortStats, QueueId, QueueStats, TableId, TableStats,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// One step below the device node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSegment {
    Table(TableId),
    Flows,
    Flow(FlowId),
    Group(GroupId),
    Meter(MeterId),
    Connector(NodeConnectorId),
    Queue(QueueId),
    Statistics,
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Table(id) => write!(f, "table[{}]", id),
            PathSegment::Flows => f.write_str("flows"),
            PathSegment::Flow(id) => write!(f, "flow[{}]", id),
            PathSegment::Group(id) => write!(f, "group[{}]", id),
            PathSegment::Meter(id) => write!(f, "meter[{}]", id),
            PathSegment::Connector(id) => write!(f, "port[{}]", id),
            PathSegment::Queue(id) => write!(f, "queue[{}]", id),
            PathSegment::Statistics => f.write_str("statistics"),
        }
    }
}

/// Absolute path of a record in the store.
///
/// # Example
///
/// ```
/// use ofstats::InstancePath;
/// use ofstats_types::{NodeId, TableId};
///
/// let node = NodeId::new("openflow:1").unwrap();
/// let path = InstancePath::node(&node).table(TableId::new(0).unwrap()).flows();
/// assert_eq!(path.to_string(), "node[openflow:1]/table[0]/flows");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstancePath {
    node: NodeId,
    segments: Vec<PathSegment>,
}

impl InstancePath {
    /// Path of the device node itself.
    pub fn node(node: &NodeId) -> Self {
        Self {
            node: node.clone(),
            segments: Vec::new(),
        }
    }

    fn child(mut self, segment: PathSegment) -> Self {
        self.segments.push(segment);
        self
    }

    pub fn table(self, id: TableId) -> Self {
        self.child(PathSegment::Table(id))
    }

    pub fn flows(self) -> Self {
        self.child(PathSegment::Flows)
    }

    pub fn flow(self, id: FlowId) -> Self {
        self.child(PathSegment::Flow(id))
    }

    pub fn group(self, id: GroupId) -> Self {
        self.child(PathSegment::Group(id))
    }

    pub fn meter(self, id: MeterId) -> Self {
        self.child(PathSegment::Meter(id))
    }

    pub fn connector(self, id: NodeConnectorId) -> Self {
        self.child(PathSegment::Connector(id))
    }

    pub fn queue(self, id: QueueId) -> Self {
        self.child(PathSegment::Queue(id))
    }

    pub fn statistics(self) -> Self {
        self.child(PathSegment::Statistics)
    }

    /// Returns the device this path belongs to.
    pub fn node_id(&self) -> &NodeId {
        &self.node
    }

    /// Returns the segments below the device node.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Returns true if `self` equals `ancestor` or lies beneath it.
    pub fn starts_with(&self, ancestor: &InstancePath) -> bool {
        self.node == ancestor.node && self.segments.starts_with(&ancestor.segments)
    }

    /// Returns the parent path, or `None` for a node path.
    pub fn parent(&self) -> Option<InstancePath> {
        if self.segments.is_empty() {
            return None;
        }
        let mut parent = self.clone();
        parent.segments.pop();
        Some(parent)
    }
}

impl fmt::Display for InstancePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node[{}]", self.node)?;
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

/// A record persisted at one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StoredRecord {
    Flow { id: FlowId, stats: FlowStats },
    GroupConfig(GroupDescription),
    GroupStatistics(GroupStats),
    MeterConfig(MeterConfig),
    MeterStatistics(MeterStats),
    /// Empty statistics container attached by a configuration write.
    StatisticsPlaceholder,
    TableStatistics(TableStats),
    PortStatistics(PortStats),
    QueueStatistics(QueueStats),
    NodeDescription(NodeDescription),
}

/// One queued store mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOp {
    /// Set the record at exactly this path.
    Write(InstancePath, StoredRecord),
    /// Remove this path and all descendants. Absent paths are a no-op.
    Delete(InstancePath),
}

impl TxOp {
    /// Returns the path this op targets.
    pub fn path(&self) -> &InstancePath {
        match self {
            TxOp::Write(path, _) | TxOp::Delete(path) => path,
        }
    }
}

/// Ordered, single-writer accumulator of ops for one reconciliation cycle.
#[derive(Debug, Default)]
pub struct WriteTransaction {
    ops: Vec<TxOp>,
}

impl WriteTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a write.
    pub fn write(&mut self, path: InstancePath, record: StoredRecord) {
        self.ops.push(TxOp::Write(path, record));
    }

    /// Queues a subtree delete.
    pub fn delete(&mut self, path: InstancePath) {
        self.ops.push(TxOp::Delete(path));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Returns the queued ops in order without consuming them.
    pub fn ops(&self) -> &[TxOp] {
        &self.ops
    }

    /// Drops every op queued after the first `len`.
    pub fn truncate(&mut self, len: usize) {
        self.ops.truncate(len);
    }

    /// Consumes the transaction, yielding its ops in order.
    pub fn into_ops(self) -> Vec<TxOp> {
        self.ops
    }
}

/// Transactional persistence of device state.
///
/// `commit` is all-or-nothing: either every op is applied in order or the
/// store is left untouched and an error message returned.
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn commit(&self, ops: Vec<TxOp>) -> std::result::Result<(), String>;
}

/// In-process [`DataStore`] backed by an ordered map.
#[derive(Debug, Default)]
pub struct InMemoryDataStore {
    records: RwLock<BTreeMap<InstancePath, StoredRecord>>,
    reject_commits: AtomicBool,
    commits: AtomicUsize,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent commits fail (or succeed again).
    pub fn set_reject_commits(&self, reject: bool) {
        self.reject_commits.store(reject, Ordering::SeqCst);
    }

    /// Returns the number of successful commits.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Returns the record at exactly this path.
    pub async fn get(&self, path: &InstancePath) -> Option<StoredRecord> {
        self.records.read().await.get(path).cloned()
    }

    /// Returns true if a record exists at exactly this path.
    pub async fn contains(&self, path: &InstancePath) -> bool {
        self.records.read().await.contains_key(path)
    }

    /// Returns every record strictly beneath `ancestor`.
    pub async fn descendants(&self, ancestor: &InstancePath) -> Vec<(InstancePath, StoredRecord)> {
        self.records
            .read()
            .await
            .range(ancestor.clone()..)
            .skip_while(|(path, _)| *path == ancestor)
            .take_while(|(path, _)| path.starts_with(ancestor))
            .map(|(path, record)| (path.clone(), record.clone()))
            .collect()
    }

    /// Returns records exactly one level beneath `parent`.
    pub async fn children(&self, parent: &InstancePath) -> Vec<(InstancePath, StoredRecord)> {
        let depth = parent.segments().len() + 1;
        self.descendants(parent)
            .await
            .into_iter()
            .filter(|(path, _)| path.segments().len() == depth)
            .collect()
    }

    /// Returns a copy of the whole store.
    pub async fn snapshot(&self) -> BTreeMap<InstancePath, StoredRecord> {
        self.records.read().await.clone()
    }

    /// Returns the store as a JSON object keyed by displayed path.
    pub async fn snapshot_json(&self) -> serde_json::Value {
        let records = self.records.read().await;
        let object: serde_json::Map<String, serde_json::Value> = records
            .iter()
            .map(|(path, record)| {
                let value = serde_json::to_value(record).unwrap_or(serde_json::Value::Null);
                (path.to_string(), value)
            })
            .collect();
        serde_json::Value::Object(object)
    }
}

/// Applies ops in order to a map.
fn apply_ops(records: &mut BTreeMap<InstancePath, StoredRecord>, ops: Vec<TxOp>) {
    for op in ops {
        match op {
            TxOp::Write(path, record) => {
                records.insert(path, record);
            }
            TxOp::Delete(path) => {
                let doomed: Vec<InstancePath> = records
                    .range(path.clone()..)
                    .take_while(|(candidate, _)| candidate.starts_with(&path))
                    .map(|(candidate, _)| candidate.clone())
                    .collect();
                for candidate in doomed {
                    records.remove(&candidate);
                }
            }
        }
    }
}

#[async_trait]
impl DataStore for InMemoryDataStore {
    async fn commit(&self, ops: Vec<TxOp>) -> std::result::Result<(), String> {
        if self.reject_commits.load(Ordering::SeqCst) {
            return Err(format!("store rejected transaction of {} ops", ops.len()));
        }

        let mut records = self.records.write().await;
        apply_ops(&mut records, ops);
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ofstats_types::FlowMatch;
    use pretty_assertions::assert_eq;

    fn node() -> NodeId {
        NodeId::new("openflow:1").unwrap()
    }

    fn table(id: u8) -> TableId {
        TableId::new(id).unwrap()
    }

    fn flow_record(id: &str) -> StoredRecord {
        StoredRecord::Flow {
            id: FlowId::new(id),
            stats: FlowStats::new(table(0), 100, FlowMatch::new()),
        }
    }

    #[test]
    fn test_path_display() {
        let path = InstancePath::node(&node())
            .table(table(3))
            .flows()
            .flow(FlowId::new("f1"));
        assert_eq!(path.to_string(), "node[openflow:1]/table[3]/flows/flow[f1]");

        let queue = InstancePath::node(&node())
            .connector(NodeConnectorId::for_port(&node(), 2))
            .queue(QueueId::new(0))
            .statistics();
        assert_eq!(
            queue.to_string(),
            "node[openflow:1]/port[openflow:1:2]/queue[0]/statistics"
        );
    }

    #[test]
    fn test_starts_with() {
        let flows = InstancePath::node(&node()).table(table(0)).flows();
        let flow = flows.clone().flow(FlowId::new("f1"));
        let other_table = InstancePath::node(&node()).table(table(1)).flows();

        assert!(flow.starts_with(&flows));
        assert!(flows.starts_with(&flows));
        assert!(!other_table.starts_with(&flows));
        assert_eq!(flow.parent(), Some(flows));
        assert!(InstancePath::node(&node()).parent().is_none());
    }

    #[test]
    fn test_transaction_accumulates_in_order() {
        let mut tx = WriteTransaction::new();
        let path = InstancePath::node(&node()).group(GroupId::new(1));

        tx.delete(path.clone());
        tx.write(path.clone(), StoredRecord::StatisticsPlaceholder);
        assert_eq!(tx.len(), 2);

        tx.truncate(1);
        let ops = tx.into_ops();
        assert_eq!(ops, vec![TxOp::Delete(path)]);
    }

    #[tokio::test]
    async fn test_delete_removes_subtree_only() {
        let store = InMemoryDataStore::new();
        let flows0 = InstancePath::node(&node()).table(table(0)).flows();
        let stats0 = InstancePath::node(&node()).table(table(0)).statistics();
        let flows1 = InstancePath::node(&node()).table(table(1)).flows();

        store
            .commit(vec![
                TxOp::Write(flows0.clone().flow(FlowId::new("a")), flow_record("a")),
                TxOp::Write(flows0.clone().flow(FlowId::new("b")), flow_record("b")),
                TxOp::Write(flows1.clone().flow(FlowId::new("c")), flow_record("c")),
                TxOp::Write(stats0.clone(), StoredRecord::StatisticsPlaceholder),
            ])
            .await
            .unwrap();

        store.commit(vec![TxOp::Delete(flows0.clone())]).await.unwrap();

        assert!(store.children(&flows0).await.is_empty());
        assert_eq!(store.children(&flows1).await.len(), 1);
        assert!(store.contains(&stats0).await);
    }

    #[tokio::test]
    async fn test_delete_absent_is_noop() {
        let store = InMemoryDataStore::new();
        let path = InstancePath::node(&node()).meter(MeterId::new(9));

        store.commit(vec![TxOp::Delete(path)]).await.unwrap();
        assert!(store.snapshot().await.is_empty());
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_rejected_commit_leaves_store_untouched() {
        let store = InMemoryDataStore::new();
        let path = InstancePath::node(&node()).group(GroupId::new(1));
        store
            .commit(vec![TxOp::Write(path.clone(), StoredRecord::StatisticsPlaceholder)])
            .await
            .unwrap();

        store.set_reject_commits(true);
        let result = store.commit(vec![TxOp::Delete(path.clone())]).await;

        assert!(result.is_err());
        assert!(store.contains(&path).await);
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_json_keys_by_path() {
        let store = InMemoryDataStore::new();
        let path = InstancePath::node(&node()).group(GroupId::new(4)).statistics();
        store
            .commit(vec![TxOp::Write(
                path,
                StoredRecord::GroupStatistics(GroupStats::new(GroupId::new(4), 10, 640)),
            )])
            .await
            .unwrap();

        let json = store.snapshot_json().await;
        let record = &json["node[openflow:1]/group[4]/statistics"];
        assert_eq!(record["type"], "group_statistics");
        assert_eq!(record["data"]["packet_count"], 10);
    }
}
