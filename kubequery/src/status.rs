//! Status projection.
//!
//! The outcome of a pass is flattened to the four observed fields here and only
//! here. Every write replaces all four fields.

use kube::ResourceExt;
use tracing::{debug, warn};

use crate::error::{ErrorKind, QueryError, QueryResult};
use crate::execution::ExecutionSummary;
use crate::fingerprint::Fingerprint;
use crate::k8s::K8sClient;
use crate::query_error;
use crate::types::{PostgresQuery, PostgresQueryStatus};

/// Status recorded after the statement for `fingerprint` ran successfully.
pub fn succeeded_status(summary: &ExecutionSummary, fingerprint: &Fingerprint) -> PostgresQueryStatus {
    PostgresQueryStatus {
        executed: true,
        error: String::new(),
        result: summary.to_string(),
        idempotency_hash: fingerprint.to_string(),
    }
}

/// Status recorded after a failed pass.
///
/// `fingerprint` is `None` when the failure happened before the SQL was
/// resolved, which leaves the hash empty.
pub fn failed_status(error: &QueryError, fingerprint: Option<&Fingerprint>) -> PostgresQueryStatus {
    PostgresQueryStatus {
        executed: false,
        error: error.status_message(),
        result: String::new(),
        idempotency_hash: fingerprint.map(Fingerprint::to_string).unwrap_or_default(),
    }
}

/// Writes `status` as the observed state of `query`.
///
/// Any failure of the write is a [`ErrorKind::PersistenceError`].
pub async fn project_status<C>(client: &C, query: &PostgresQuery, status: PostgresQueryStatus) -> QueryResult<()>
where
    C: K8sClient + ?Sized,
{
    if let Err(err) = client.replace_postgres_query_status(query, &status).await {
        warn!(name = %query.name_any(), error = %err, "failed to write postgres query status");

        return Err(query_error!(
            ErrorKind::PersistenceError,
            "Failed to write query status",
            err
        ));
    }

    debug!(
        name = %query.name_any(),
        executed = status.executed,
        failed = !status.error.is_empty(),
        "projected postgres query status"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bail;
    use crate::test_utils::k8s::MemoryK8sClient;
    use crate::test_utils::query::{test_connection, test_query, test_query_spec};

    fn fingerprint() -> Fingerprint {
        Fingerprint::compute(&test_connection(), "select 1")
    }

    fn connection_failure() -> QueryResult<()> {
        bail!(
            ErrorKind::ConnectionError,
            "PostgreSQL authentication failed",
            "SQLSTATE 28P01"
        );
    }

    #[test]
    fn success_records_the_summary_and_fingerprint() {
        let summary = ExecutionSummary::new("insert into t values (1), (2)", &[2]);

        let status = succeeded_status(&summary, &fingerprint());

        assert!(status.executed);
        assert_eq!(status.error, "");
        assert_eq!(status.result, "INSERT: 2 rows affected");
        assert_eq!(status.idempotency_hash, fingerprint().to_string());
    }

    #[test]
    fn failure_records_the_kind_and_clears_the_result() {
        let err = connection_failure().unwrap_err();

        let status = failed_status(&err, Some(&fingerprint()));

        assert!(!status.executed);
        assert!(status.error.starts_with("ConnectionError"));
        assert!(status.error.contains("SQLSTATE 28P01"));
        assert_eq!(status.result, "");
        assert_eq!(status.idempotency_hash, fingerprint().to_string());
    }

    #[test]
    fn failure_before_resolution_leaves_the_hash_empty() {
        let err = connection_failure().unwrap_err();

        let status = failed_status(&err, None);

        assert_eq!(status.idempotency_hash, "");
    }

    #[tokio::test]
    async fn projection_replaces_the_stored_status() {
        let client = MemoryK8sClient::new();
        let query = test_query("apps", "seed", test_query_spec("select 1"));
        client.insert_query(query.clone()).await;

        let status = succeeded_status(&ExecutionSummary::new("select 1", &[1]), &fingerprint());
        project_status(&client, &query, status.clone()).await.unwrap();

        assert_eq!(client.status_writes().await, vec![status]);
    }

    #[tokio::test]
    async fn write_failure_is_a_persistence_error() {
        let client = MemoryK8sClient::new();
        let query = test_query("apps", "seed", test_query_spec("select 1"));
        client.fail_status_writes(1).await;

        let err = project_status(&client, &query, PostgresQueryStatus::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PersistenceError);
        assert!(client.status_writes().await.is_empty());
    }
}
