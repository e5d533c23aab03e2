//! Glue between the reconciliation pass and the [`kube`] controller runtime.
//!
//! The runtime serializes passes per object, so the attempt counters below are
//! only ever touched by one pass per key at a time.

use futures::Stream;
use kube::ResourceExt;
use kube::runtime::controller::Action;
use kube::runtime::{WatchStreamExt, predicates, watcher};
use kubequery_config::shared::RetryConfig;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

use crate::bail;
use crate::error::{ErrorKind, QueryError};
use crate::execution::QueryExecutor;
use crate::k8s::K8sClient;
use crate::reconcile::{PassOutcome, Reconciler};
use crate::types::PostgresQuery;

/// Shared state handed to every reconciliation by the controller runtime.
#[derive(Debug)]
pub struct Context<C, E> {
    reconciler: Reconciler<C, E>,
    retry: RetryConfig,
    retry_connection_failures: bool,
    attempts: Mutex<HashMap<String, u32>>,
}

impl<C, E> Context<C, E> {
    pub fn new(
        reconciler: Reconciler<C, E>,
        retry: RetryConfig,
        retry_connection_failures: bool,
    ) -> Context<C, E> {
        Context {
            reconciler,
            retry,
            retry_connection_failures,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn reconciler(&self) -> &Reconciler<C, E> {
        &self.reconciler
    }

    /// Returns how many consecutive retries were scheduled for `key`.
    pub fn attempts(&self, key: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// Records one more retry for `key` and returns the attempt number, counting
    /// from zero.
    fn next_attempt(&self, key: &str) -> u32 {
        let mut attempts = self
            .attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let attempt = attempts.entry(key.to_string()).or_insert(0);
        let current = *attempt;
        *attempt = attempt.saturating_add(1);

        current
    }

    fn reset_attempts(&self, key: &str) {
        self.attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(key);
    }
}

/// Narrows a stream of observed queries to the ones whose `spec` changed.
///
/// Status writes bump the resource version but not `metadata.generation`, so
/// the status recorded by a pass does not start another one. A failed query is
/// therefore only evaluated again once it is edited.
pub fn spec_changes<S>(queries: S) -> impl Stream<Item = Result<PostgresQuery, watcher::Error>>
where
    S: Stream<Item = Result<PostgresQuery, watcher::Error>>,
{
    queries.predicate_filter(predicates::generation)
}

fn object_key(query: &PostgresQuery) -> String {
    format!(
        "{}/{}",
        query.namespace().unwrap_or_default(),
        query.name_any()
    )
}

/// Reconciles `query` and maps the pass outcome to a controller [`Action`].
///
/// Business failures are already recorded on the status and wait for the next
/// change. Only a [`ErrorKind::PersistenceError`] is returned, so that
/// [`error_policy`] requeues it.
pub async fn reconcile<C, E>(
    query: Arc<PostgresQuery>,
    ctx: Arc<Context<C, E>>,
) -> Result<Action, QueryError>
where
    C: K8sClient,
    E: QueryExecutor,
{
    let Some(namespace) = query.namespace() else {
        bail!(
            ErrorKind::ResolutionError,
            "Postgres query has no namespace",
            query.name_any()
        );
    };
    let name = query.name_any();
    let key = object_key(&query);

    let outcome = ctx.reconciler.reconcile(&namespace, &name).await?;

    match outcome {
        PassOutcome::Failed(ErrorKind::ConnectionError) if ctx.retry_connection_failures => {
            let attempt = ctx.next_attempt(&key);
            if attempt < ctx.retry.max_attempts {
                let delay = ctx.retry.delay_for_attempt(attempt);
                info!(%namespace, %name, attempt, ?delay, "requeueing after connection failure");

                return Ok(Action::requeue(delay));
            }

            warn!(%namespace, %name, attempt, "giving up on connection retries");
            Ok(Action::await_change())
        }
        _ => {
            ctx.reset_attempts(&key);
            Ok(Action::await_change())
        }
    }
}

/// Decides what to do after [`reconcile`] returned an error.
///
/// Persistence failures are retried with exponential backoff, the delay stays at
/// the configured maximum once reached. Anything else waits for the next change.
pub fn error_policy<C, E>(
    query: Arc<PostgresQuery>,
    err: &QueryError,
    ctx: Arc<Context<C, E>>,
) -> Action {
    let key = object_key(&query);

    if err.kind().is_terminal() {
        error!(%key, error = %err, "reconciliation failed");
        ctx.reset_attempts(&key);

        return Action::await_change();
    }

    let attempt = ctx.next_attempt(&key);
    let delay = ctx.retry.delay_for_attempt(attempt);
    warn!(%key, attempt, ?delay, error = %err, "requeueing after infrastructure failure");

    Action::requeue(delay)
}
