//! Statistics transport seam and a scripted implementation.

use crate::classifier::MultipartReply;
use crate::error::{Result, StatsError};
use async_trait::async_trait;
use ofstats_types::{NodeId, StatisticsKind};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use tokio::sync::Mutex;

/// Issues statistics requests to a device.
///
/// Implementations reassemble paginated wire fragments, so each returned
/// element is one complete logical reply. The future fails on transport or
/// protocol errors and may never resolve; callers bound it with a timeout.
#[async_trait]
pub trait StatisticsTransport: Send + Sync {
    async fn pull(
        &self,
        node: &NodeId,
        kind: StatisticsKind,
    ) -> std::result::Result<Vec<MultipartReply>, String>;
}

/// One scripted answer to a pull.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScriptedPull {
    pub replies: Vec<MultipartReply>,
    /// Fail the pull with this message instead of replying.
    pub error: Option<String>,
    /// Never resolve the pull.
    pub hang: bool,
}

impl ScriptedPull {
    pub fn replies(replies: Vec<MultipartReply>) -> Self {
        Self {
            replies,
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn hang() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }
}

/// Transport that answers pulls from per-kind queues.
///
/// A kind whose queue is empty answers with no replies.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<HashMap<StatisticsKind, VecDeque<ScriptedPull>>>,
    pulls: Mutex<Vec<(NodeId, StatisticsKind)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an answer for the next pull of `kind`.
    pub async fn push(&self, kind: StatisticsKind, pull: ScriptedPull) {
        self.script
            .lock()
            .await
            .entry(kind)
            .or_default()
            .push_back(pull);
    }

    /// Builds a transport from a YAML map of kind to answers.
    ///
    /// ```yaml
    /// FLOW:
    ///   - replies:
    ///       - xid: 1
    ///         body: { type: flow, entries: [] }
    ///   - error: connection reset
    /// ```
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let script: BTreeMap<StatisticsKind, Vec<ScriptedPull>> = serde_yaml::from_str(yaml)
            .map_err(|e| StatsError::config(format!("invalid reply script: {}", e)))?;
        let script = script
            .into_iter()
            .map(|(kind, pulls)| (kind, pulls.into_iter().collect()))
            .collect();
        Ok(Self {
            script: Mutex::new(script),
            pulls: Mutex::new(Vec::new()),
        })
    }

    /// Reads a reply script from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&contents)
    }

    /// Returns every pull issued so far, in order.
    pub async fn pulls(&self) -> Vec<(NodeId, StatisticsKind)> {
        self.pulls.lock().await.clone()
    }

    /// Returns the number of answers still queued across all kinds.
    pub async fn pending(&self) -> usize {
        self.script.lock().await.values().map(VecDeque::len).sum()
    }
}

#[async_trait]
impl StatisticsTransport for ScriptedTransport {
    async fn pull(
        &self,
        node: &NodeId,
        kind: StatisticsKind,
    ) -> std::result::Result<Vec<MultipartReply>, String> {
        self.pulls.lock().await.push((node.clone(), kind));

        let next = self
            .script
            .lock()
            .await
            .get_mut(&kind)
            .and_then(VecDeque::pop_front);

        match next {
            None => Ok(Vec::new()),
            Some(pull) if pull.hang => {
                std::future::pending::<()>().await;
                Ok(Vec::new())
            }
            Some(ScriptedPull {
                error: Some(message),
                ..
            }) => Err(message),
            Some(pull) => Ok(pull.replies),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::MultipartReplyBody;
    use pretty_assertions::assert_eq;

    fn node() -> NodeId {
        NodeId::new("openflow:1").unwrap()
    }

    #[tokio::test]
    async fn test_scripted_pulls_in_order() {
        let transport = ScriptedTransport::new();
        transport
            .push(
                StatisticsKind::Port,
                ScriptedPull::replies(vec![MultipartReply::new(
                    1,
                    MultipartReplyBody::PortStats(vec![]),
                )]),
            )
            .await;
        transport
            .push(StatisticsKind::Port, ScriptedPull::error("connection reset"))
            .await;

        assert_eq!(transport.pull(&node(), StatisticsKind::Port).await.unwrap().len(), 1);
        assert_eq!(
            transport.pull(&node(), StatisticsKind::Port).await.unwrap_err(),
            "connection reset"
        );
        assert!(transport.pull(&node(), StatisticsKind::Port).await.unwrap().is_empty());
        assert_eq!(transport.pulls().await.len(), 3);
        assert_eq!(transport.pending().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_pull_never_resolves() {
        let transport = ScriptedTransport::new();
        transport.push(StatisticsKind::Flow, ScriptedPull::hang()).await;

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            transport.pull(&node(), StatisticsKind::Flow),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_from_yaml() {
        let yaml = r#"
GROUP:
  - replies:
      - xid: 3
        body:
          type: group
          entries:
            - group_id: 1
              packet_count: 10
  - error: timeout
"#;
        let transport = ScriptedTransport::from_yaml_str(yaml).unwrap();
        assert_eq!(transport.pending().await, 2);

        let replies = transport.pull(&node(), StatisticsKind::Group).await.unwrap();
        assert_eq!(replies[0].xid, 3);
        assert!(transport.pull(&node(), StatisticsKind::Group).await.is_err());
    }

    #[test]
    fn test_from_yaml_rejects_unknown_kind() {
        assert!(ScriptedTransport::from_yaml_str("BOGUS: []").is_err());
    }
}
