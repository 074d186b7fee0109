//! Extension hooks for embedding the ranking engine in a pipeline.
//!
//! The engine stays storage-agnostic. Callers inject:
//! - a progress sink (liveness reporting for long jobs)
//! - a candidate store (snapshot at run start, one atomic reorder on commit)

use std::collections::HashMap;

use tokio::sync::RwLock;

use super::extract::apply_order;
use super::types::{CandidatePayload, GroupKey};

#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    #[error("{0}")]
    Message(String),
}

#[async_trait::async_trait]
pub trait ProgressSink: Send + Sync {
    /// `fraction_complete` is in `0.0..=1.0`.
    async fn report(&self, group: GroupKey, fraction_complete: f64) -> Result<(), ProgressError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgressSink;

#[async_trait::async_trait]
impl ProgressSink for NoopProgressSink {
    async fn report(&self, _group: GroupKey, _fraction_complete: f64) -> Result<(), ProgressError> {
        Ok(())
    }
}

/// Emits progress as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgressSink;

#[async_trait::async_trait]
impl ProgressSink for TracingProgressSink {
    async fn report(&self, group: GroupKey, fraction_complete: f64) -> Result<(), ProgressError> {
        tracing::info!(
            group = %group,
            fraction = fraction_complete,
            "Ranking progress"
        );
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no candidate list stored for {0}")]
    MissingGroup(GroupKey),
    #[error("{group} now holds {found} candidates but the ranking covered {expected}")]
    LengthMismatch {
        group: GroupKey,
        expected: usize,
        found: usize,
    },
    #[error("{0}")]
    Message(String),
}

/// Durable home of the lists being ranked.
#[async_trait::async_trait]
pub trait CandidateStore: Send + Sync {
    /// Copy of the group's current list.
    async fn snapshot(&self, group: GroupKey) -> Result<Vec<CandidatePayload>, StoreError>;

    /// Reorder the group's current list in one step: position `i` receives
    /// the candidate at snapshot index `order[i]`. Returns the committed list.
    ///
    /// Only positions change. Content other stages attached after the
    /// snapshot is kept. A list whose length changed since the snapshot is
    /// rejected with [`StoreError::LengthMismatch`].
    async fn commit(
        &self,
        group: GroupKey,
        order: &[usize],
    ) -> Result<Vec<CandidatePayload>, StoreError>;
}

/// In-process store. Readers never observe a half-written list.
#[derive(Debug, Default)]
pub struct MemoryStore {
    groups: RwLock<HashMap<GroupKey, Vec<CandidatePayload>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(group: GroupKey, candidates: Vec<CandidatePayload>) -> Self {
        let mut groups = HashMap::new();
        groups.insert(group, candidates);
        Self {
            groups: RwLock::new(groups),
        }
    }

    pub async fn insert(&self, group: GroupKey, candidates: Vec<CandidatePayload>) {
        self.groups.write().await.insert(group, candidates);
    }

    pub async fn get(&self, group: GroupKey) -> Option<Vec<CandidatePayload>> {
        self.groups.read().await.get(&group).cloned()
    }
}

#[async_trait::async_trait]
impl CandidateStore for MemoryStore {
    async fn snapshot(&self, group: GroupKey) -> Result<Vec<CandidatePayload>, StoreError> {
        self.groups
            .read()
            .await
            .get(&group)
            .cloned()
            .ok_or(StoreError::MissingGroup(group))
    }

    async fn commit(
        &self,
        group: GroupKey,
        order: &[usize],
    ) -> Result<Vec<CandidatePayload>, StoreError> {
        let mut groups = self.groups.write().await;
        let list = groups
            .get_mut(&group)
            .ok_or(StoreError::MissingGroup(group))?;
        if list.len() != order.len() {
            return Err(StoreError::LengthMismatch {
                group,
                expected: order.len(),
                found: list.len(),
            });
        }
        *list = apply_order(list, order);
        Ok(list.clone())
    }
}
