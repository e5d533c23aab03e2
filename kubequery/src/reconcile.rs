//! The reconciliation pass.
//!
//! A pass reads the declared query, resolves its SQL, fingerprints it, and then
//! either skips or resolves credentials, executes and records the outcome.
//! Business failures end up on the status, only a failure of the object store
//! itself is returned as an error.

use kubequery_config::shared::ExecutionConfig;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::bail;
use crate::error::{ErrorKind, QueryError, QueryResult};
use crate::execution::{ConnectionProfile, ExecutionRequest, QueryExecutor};
use crate::fingerprint::{ExecutionDecision, Fingerprint, decide};
use crate::k8s::K8sClient;
use crate::resolve::credentials::{ResolvedCredentials, resolve_credentials};
use crate::resolve::sql::resolve_sql;
use crate::status::{failed_status, project_status, succeeded_status};
use crate::types::{PostgresConnection, PostgresQuery, PostgresQuerySpec, PostgresQueryStatus};

/// How a reconciliation pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// The query no longer exists.
    NotFound,
    /// The statement already ran for the current fingerprint.
    Skipped,
    /// The statement ran and the success was recorded.
    Succeeded,
    /// The pass failed and the failure was recorded.
    Failed(ErrorKind),
}

/// Successful executions whose status write failed, keyed by `namespace/name`.
///
/// The next pass for the same fingerprint writes the stored status instead of
/// running the statement again.
type UnrecordedSuccesses = Arc<Mutex<HashMap<String, (Fingerprint, PostgresQueryStatus)>>>;

/// Runs reconciliation passes against a [`K8sClient`] and a [`QueryExecutor`].
#[derive(Debug, Clone)]
pub struct Reconciler<C, E> {
    client: C,
    executor: E,
    config: ExecutionConfig,
    unrecorded: UnrecordedSuccesses,
}

impl<C, E> Reconciler<C, E>
where
    C: K8sClient,
    E: QueryExecutor,
{
    pub fn new(client: C, executor: E, config: ExecutionConfig) -> Reconciler<C, E> {
        Reconciler {
            client,
            executor,
            config,
            unrecorded: Arc::default(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Runs one pass for the query `name` in `namespace`.
    ///
    /// The query is re-read so the pass always works on its latest version.
    pub async fn reconcile(&self, namespace: &str, name: &str) -> QueryResult<PassOutcome> {
        let span = info_span!("reconcile", %namespace, %name);

        async move {
            let query = match self.client.get_postgres_query(namespace, name).await {
                Ok(Some(query)) => query,
                Ok(None) => {
                    debug!("postgres query not found, nothing to do");
                    return Ok(PassOutcome::NotFound);
                }
                Err(err) => bail!(
                    ErrorKind::PersistenceError,
                    "Failed to get postgres query",
                    err
                ),
            };

            self.evaluate(namespace, name, &query).await
        }
        .instrument(span)
        .await
    }

    async fn evaluate(
        &self,
        namespace: &str,
        name: &str,
        query: &PostgresQuery,
    ) -> QueryResult<PassOutcome> {
        let spec = &query.spec;
        let key = format!("{namespace}/{name}");

        let sql = match resolve_sql(&self.client, namespace, spec).await {
            Ok(sql) => sql,
            Err(err) => return self.record_failure(query, err, None).await,
        };

        let fingerprint = Fingerprint::compute(&spec.connection, &sql);
        let unrecorded = self.take_unrecorded(&key, &fingerprint);
        if decide(query.status.as_ref(), &fingerprint) == ExecutionDecision::Skip {
            info!(
                fingerprint = fingerprint.short(),
                "statement already executed for this fingerprint, skipping"
            );
            return Ok(PassOutcome::Skipped);
        }

        if let Some(status) = unrecorded {
            info!(
                fingerprint = fingerprint.short(),
                "statement already executed, recording its status"
            );
            return self.record_success(&key, query, &fingerprint, status).await;
        }

        let credentials = match resolve_credentials(&self.client, namespace, &spec.connection).await {
            Ok(credentials) => credentials,
            Err(err) => return self.record_failure(query, err, Some(&fingerprint)).await,
        };

        let request = match self.execution_request(spec, sql, credentials) {
            Ok(request) => request,
            Err(err) => return self.record_failure(query, err, Some(&fingerprint)).await,
        };

        info!(
            fingerprint = fingerprint.short(),
            timeout = ?request.timeout,
            "executing statement"
        );

        match self.executor.execute(request).await {
            Ok(summary) => {
                info!(
                    fingerprint = fingerprint.short(),
                    result = %summary,
                    "statement executed"
                );
                let status = succeeded_status(&summary, &fingerprint);
                self.record_success(&key, query, &fingerprint, status).await
            }
            Err(err) => self.record_failure(query, err, Some(&fingerprint)).await,
        }
    }

    fn execution_request(
        &self,
        spec: &PostgresQuerySpec,
        sql: String,
        credentials: ResolvedCredentials,
    ) -> QueryResult<ExecutionRequest> {
        let profile = connection_profile(&spec.connection, credentials)?;
        let timeout = spec
            .options
            .as_ref()
            .and_then(|options| options.timeout_seconds)
            .filter(|seconds| *seconds > 0)
            .map(|seconds| Duration::from_secs(seconds as u64))
            .unwrap_or_else(|| self.config.default_timeout());

        Ok(ExecutionRequest {
            profile,
            sql,
            timeout,
        })
    }

    /// Writes a success status. When the write fails the status is kept so the
    /// retried pass records it without executing again.
    async fn record_success(
        &self,
        key: &str,
        query: &PostgresQuery,
        fingerprint: &Fingerprint,
        status: PostgresQueryStatus,
    ) -> QueryResult<PassOutcome> {
        if let Err(err) = project_status(&self.client, query, status.clone()).await {
            self.lock_unrecorded()
                .insert(key.to_string(), (fingerprint.clone(), status));

            return Err(err);
        }

        Ok(PassOutcome::Succeeded)
    }

    /// Removes the unrecorded success of `key`, returning its status only when it
    /// belongs to `fingerprint`.
    fn take_unrecorded(&self, key: &str, fingerprint: &Fingerprint) -> Option<PostgresQueryStatus> {
        match self.lock_unrecorded().remove(key) {
            Some((recorded, status)) if &recorded == fingerprint => Some(status),
            Some(_) => {
                debug!("dropping unrecorded success of an older fingerprint");
                None
            }
            None => None,
        }
    }

    fn lock_unrecorded(
        &self,
    ) -> MutexGuard<'_, HashMap<String, (Fingerprint, PostgresQueryStatus)>> {
        self.unrecorded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn record_failure(
        &self,
        query: &PostgresQuery,
        err: QueryError,
        fingerprint: Option<&Fingerprint>,
    ) -> QueryResult<PassOutcome> {
        warn!(
            kind = ?err.kind(),
            error = %err,
            "postgres query pass failed"
        );
        project_status(&self.client, query, failed_status(&err, fingerprint)).await?;

        Ok(PassOutcome::Failed(err.kind()))
    }
}

fn connection_profile(
    connection: &PostgresConnection,
    credentials: ResolvedCredentials,
) -> QueryResult<ConnectionProfile> {
    let port = match u16::try_from(connection.port) {
        Ok(port) if port > 0 => port,
        _ => bail!(
            ErrorKind::ConnectionError,
            "Invalid port",
            format!("{} is not a valid TCP port", connection.port)
        ),
    };

    Ok(ConnectionProfile {
        host: connection.host.clone(),
        port,
        database: connection.database.clone(),
        user: connection.user.clone(),
        password: credentials.password,
        tls: credentials.tls,
    })
}
