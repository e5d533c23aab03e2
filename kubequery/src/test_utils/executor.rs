use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{ErrorKind, QueryResult};
use crate::execution::{ExecutionRequest, ExecutionSummary, QueryExecutor};
use crate::query_error;
use crate::resolve::credentials::ResolvedTls;

/// The non-secret parts of an [`ExecutionRequest`] seen by [`RecordingExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub sql: String,
    pub timeout: Duration,
    pub tls: Option<ResolvedTls>,
}

#[derive(Debug, Default)]
struct Inner {
    requests: Vec<RecordedRequest>,
    outcomes: VecDeque<QueryResult<ExecutionSummary>>,
}

/// [`QueryExecutor`] that records requests and replays scripted outcomes.
///
/// Without a scripted outcome every statement succeeds with one affected row.
#[derive(Debug, Clone, Default)]
pub struct RecordingExecutor {
    inner: Arc<Mutex<Inner>>,
}

impl RecordingExecutor {
    pub fn new() -> RecordingExecutor {
        RecordingExecutor::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub fn push_success(&self, summary: ExecutionSummary) {
        self.lock().outcomes.push_back(Ok(summary));
    }

    pub fn push_failure(&self, kind: ErrorKind, description: &'static str, detail: &str) {
        self.lock()
            .outcomes
            .push_back(Err(query_error!(kind, description, detail)));
    }

    pub fn invocations(&self) -> usize {
        self.lock().requests.len()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }
}

impl QueryExecutor for RecordingExecutor {
    async fn execute(&self, request: ExecutionRequest) -> QueryResult<ExecutionSummary> {
        let mut inner = self.lock();
        let outcome = inner
            .outcomes
            .pop_front()
            .unwrap_or_else(|| Ok(ExecutionSummary::new(&request.sql, &[1])));

        let ExecutionRequest {
            profile,
            sql,
            timeout,
        } = request;
        inner.requests.push(RecordedRequest {
            host: profile.host,
            port: profile.port,
            database: profile.database,
            user: profile.user,
            sql,
            timeout,
            tls: profile.tls,
        });

        outcome
    }
}
