/// Store interfaces for the data this subsystem reads and writes.
///
/// Problems and test cases are owned by an external store and are read-only
/// here. Submissions are written only for fully accepted runs.
use crate::types::{Problem, SubmissionRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ProblemStore: Send + Sync {
    async fn get_problem(&self, problem_id: &str) -> StoreResult<Option<Problem>>;
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn record_submission(&self, record: &SubmissionRecord) -> StoreResult<()>;
    async fn get_submission(&self, id: &Uuid) -> StoreResult<Option<SubmissionRecord>>;
}

/// In-process store used by the CLI and by tests
#[derive(Default)]
pub struct MemoryStore {
    problems: RwLock<HashMap<String, Problem>>,
    submissions: RwLock<HashMap<Uuid, SubmissionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_problem(&self, problem: Problem) {
        self.problems.write().await.insert(problem.id.clone(), problem);
    }

    pub async fn submission_count(&self) -> usize {
        self.submissions.read().await.len()
    }
}

#[async_trait]
impl ProblemStore for MemoryStore {
    async fn get_problem(&self, problem_id: &str) -> StoreResult<Option<Problem>> {
        Ok(self.problems.read().await.get(problem_id).cloned())
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn record_submission(&self, record: &SubmissionRecord) -> StoreResult<()> {
        self.submissions
            .write()
            .await
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn get_submission(&self, id: &Uuid) -> StoreResult<Option<SubmissionRecord>> {
        Ok(self.submissions.read().await.get(id).cloned())
    }
}
