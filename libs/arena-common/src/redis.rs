use crate::store::{ProblemStore, StoreResult, SubmissionStore};
use crate::types::{Problem, SubmissionRecord};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult};
use uuid::Uuid;

/// Redis key semantics - defines only semantics, not runtime logic
/// Keeps the API, CLI and any external writer agreeing on where things live

pub const PROBLEM_PREFIX: &str = "arena:problem";
pub const SUBMISSION_PREFIX: &str = "arena:submission";
pub const ACCEPTED_PREFIX: &str = "arena:accepted";

/// Key holding a problem document (written by the external problem store)
pub fn problem_key(problem_id: &str) -> String {
    format!("{}:{}", PROBLEM_PREFIX, problem_id)
}

/// Key holding one accepted submission
pub fn submission_key(id: &Uuid) -> String {
    format!("{}:{}", SUBMISSION_PREFIX, id)
}

/// Set of accepted submission ids for a user/problem pair
pub fn accepted_key(user_id: &str, problem_id: &str) -> String {
    format!("{}:{}:{}", ACCEPTED_PREFIX, user_id, problem_id)
}

fn serialization_error(e: serde_json::Error) -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::TypeError, "serialization error", e.to_string()))
}

/// Load a problem document
pub async fn get_problem(
    conn: &mut ConnectionManager,
    problem_id: &str,
) -> RedisResult<Option<Problem>> {
    let payload: Option<String> = conn.get(problem_key(problem_id)).await?;

    match payload {
        Some(data) => {
            let problem: Problem = serde_json::from_str(&data).map_err(serialization_error)?;
            Ok(Some(problem))
        }
        None => Ok(None),
    }
}

/// MULTI/EXEC block writing the record and its index entry together, so
/// neither is ever visible without the other
fn submission_pipeline(record: &SubmissionRecord, payload: String) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .set(submission_key(&record.id), payload)
        .ignore()
        .sadd(
            accepted_key(&record.user_id, &record.problem_id),
            record.id.to_string(),
        )
        .ignore();
    pipe
}

/// Persist an accepted submission and index it under its user/problem pair
/// Submissions are durable - no TTL
pub async fn store_submission(
    conn: &mut ConnectionManager,
    record: &SubmissionRecord,
) -> RedisResult<()> {
    let payload = serde_json::to_string(record).map_err(serialization_error)?;

    let _: () = submission_pipeline(record, payload).query_async(conn).await?;

    Ok(())
}

/// Retrieve a stored submission
pub async fn get_submission(
    conn: &mut ConnectionManager,
    id: &Uuid,
) -> RedisResult<Option<SubmissionRecord>> {
    let payload: Option<String> = conn.get(submission_key(id)).await?;

    match payload {
        Some(data) => {
            let record: SubmissionRecord =
                serde_json::from_str(&data).map_err(serialization_error)?;
            Ok(Some(record))
        }
        None => Ok(None),
    }
}

/// Redis-backed implementation of both store interfaces
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn connect(redis_url: &str) -> RedisResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl ProblemStore for RedisStore {
    async fn get_problem(&self, problem_id: &str) -> StoreResult<Option<Problem>> {
        let mut conn = self.conn.clone();
        Ok(get_problem(&mut conn, problem_id).await?)
    }
}

#[async_trait]
impl SubmissionStore for RedisStore {
    async fn record_submission(&self, record: &SubmissionRecord) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        Ok(store_submission(&mut conn, record).await?)
    }

    async fn get_submission(&self, id: &Uuid) -> StoreResult<Option<SubmissionRecord>> {
        let mut conn = self.conn.clone();
        Ok(get_submission(&mut conn, id).await?)
    }
}
