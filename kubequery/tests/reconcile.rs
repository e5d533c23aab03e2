use kubequery::error::ErrorKind;
use kubequery::execution::ExecutionSummary;
use kubequery::fingerprint::Fingerprint;
use kubequery::reconcile::{PassOutcome, Reconciler};
use kubequery::test_utils::executor::RecordingExecutor;
use kubequery::test_utils::k8s::MemoryK8sClient;
use kubequery::test_utils::query::{
    config_map_ref, secret_ref, test_connection, test_query, test_query_spec,
};
use kubequery::types::{PostgresQuerySpec, PostgresSsl};
use kubequery_config::shared::ExecutionConfig;
use kubequery_telemetry::tracing::init_test_tracing;

const NAMESPACE: &str = "apps";
const NAME: &str = "seed-users";

async fn setup(spec: PostgresQuerySpec) -> Reconciler<MemoryK8sClient, RecordingExecutor> {
    let client = MemoryK8sClient::new();
    client
        .insert_secret(NAMESPACE, "db-creds", &[("password", "s3cret")])
        .await;
    client.insert_query(test_query(NAMESPACE, NAME, spec)).await;

    Reconciler::new(client, RecordingExecutor::new(), ExecutionConfig::default())
}

#[tokio::test(flavor = "multi_thread")]
async fn statement_runs_at_most_once_per_fingerprint() {
    init_test_tracing();

    let reconciler = setup(test_query_spec("insert into users values (1)")).await;

    let first = reconciler.reconcile(NAMESPACE, NAME).await.unwrap();
    let second = reconciler.reconcile(NAMESPACE, NAME).await.unwrap();

    assert_eq!(first, PassOutcome::Succeeded);
    assert_eq!(second, PassOutcome::Skipped);
    assert_eq!(reconciler.executor().invocations(), 1);

    // The skipped pass leaves the recorded status untouched.
    let statuses = reconciler.client().status_writes().await;
    assert_eq!(statuses.len(), 1);
    assert!(statuses[0].executed);
    assert_eq!(
        statuses[0].idempotency_hash,
        Fingerprint::compute(&test_connection(), "insert into users values (1)").to_string()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn editing_the_sql_runs_the_new_statement() {
    init_test_tracing();

    let reconciler = setup(test_query_spec("insert into users values (1)")).await;
    reconciler.reconcile(NAMESPACE, NAME).await.unwrap();

    let mut edited = reconciler.client().query(NAMESPACE, NAME).await.unwrap();
    edited.spec.sql = "insert into users values (2)".to_string();
    reconciler.client().insert_query(edited).await;

    let outcome = reconciler.reconcile(NAMESPACE, NAME).await.unwrap();

    assert_eq!(outcome, PassOutcome::Succeeded);
    let requests = reconciler.executor().requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].sql, "insert into users values (2)");
}

#[tokio::test(flavor = "multi_thread")]
async fn rotating_the_password_does_not_rerun() {
    init_test_tracing();

    let reconciler = setup(test_query_spec("insert into users values (1)")).await;
    reconciler.reconcile(NAMESPACE, NAME).await.unwrap();

    reconciler
        .client()
        .insert_secret(NAMESPACE, "db-creds", &[("password", "rotated")])
        .await;
    let outcome = reconciler.reconcile(NAMESPACE, NAME).await.unwrap();

    assert_eq!(outcome, PassOutcome::Skipped);
    assert_eq!(reconciler.executor().invocations(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_status_is_retried_on_the_next_pass() {
    init_test_tracing();

    let reconciler = setup(test_query_spec("insert into users values (1)")).await;
    reconciler.executor().push_failure(
        ErrorKind::ExecutionError,
        "PostgreSQL constraint violation",
        "SQLSTATE 23505",
    );

    let first = reconciler.reconcile(NAMESPACE, NAME).await.unwrap();
    let second = reconciler.reconcile(NAMESPACE, NAME).await.unwrap();

    assert_eq!(first, PassOutcome::Failed(ErrorKind::ExecutionError));
    assert_eq!(second, PassOutcome::Succeeded);
    assert_eq!(reconciler.executor().invocations(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn secret_sql_wins_over_config_map_and_inline() {
    init_test_tracing();

    let mut spec = test_query_spec("select 'inline'");
    spec.sql_secret_ref = Some(secret_ref("sql", "query"));
    spec.sql_config_map_ref = Some(config_map_ref("sql", "query"));
    let reconciler = setup(spec).await;
    reconciler
        .client()
        .insert_secret(NAMESPACE, "sql", &[("query", "select 'secret'")])
        .await;
    reconciler
        .client()
        .insert_config_map(NAMESPACE, "sql", &[("query", "select 'config'")])
        .await;

    reconciler.reconcile(NAMESPACE, NAME).await.unwrap();

    assert_eq!(reconciler.executor().requests()[0].sql, "select 'secret'");
}

#[tokio::test(flavor = "multi_thread")]
async fn config_map_sql_wins_over_inline() {
    init_test_tracing();

    let mut spec = test_query_spec("select 'inline'");
    spec.sql_config_map_ref = Some(config_map_ref("sql", "query"));
    let reconciler = setup(spec).await;
    reconciler
        .client()
        .insert_config_map(NAMESPACE, "sql", &[("query", "select 'config'")])
        .await;

    reconciler.reconcile(NAMESPACE, NAME).await.unwrap();

    assert_eq!(reconciler.executor().requests()[0].sql, "select 'config'");
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_sql_secret_leaves_the_fingerprint_unset() {
    init_test_tracing();

    let mut spec = test_query_spec("");
    spec.sql_secret_ref = Some(secret_ref("missing", "query"));
    let reconciler = setup(spec).await;

    let outcome = reconciler.reconcile(NAMESPACE, NAME).await.unwrap();

    assert_eq!(outcome, PassOutcome::Failed(ErrorKind::ResolutionError));
    assert_eq!(reconciler.executor().invocations(), 0);
    let statuses = reconciler.client().status_writes().await;
    assert!(!statuses[0].executed);
    assert!(statuses[0].error.starts_with("ResolutionError"));
    assert_eq!(statuses[0].idempotency_hash, "");
}

#[tokio::test(flavor = "multi_thread")]
async fn credential_failure_records_the_fingerprint() {
    init_test_tracing();

    let client = MemoryK8sClient::new();
    client
        .insert_query(test_query(NAMESPACE, NAME, test_query_spec("select 1")))
        .await;
    let reconciler = Reconciler::new(client, RecordingExecutor::new(), ExecutionConfig::default());

    let outcome = reconciler.reconcile(NAMESPACE, NAME).await.unwrap();

    assert_eq!(outcome, PassOutcome::Failed(ErrorKind::CredentialError));
    let statuses = reconciler.client().status_writes().await;
    assert_eq!(
        statuses[0].idempotency_hash,
        Fingerprint::compute(&test_connection(), "select 1").to_string()
    );
    assert!(!statuses[0].error.contains("s3cret"));
}

#[tokio::test(flavor = "multi_thread")]
async fn disabled_tls_ignores_a_missing_ca_secret() {
    init_test_tracing();

    let mut spec = test_query_spec("select 1");
    spec.connection.ssl = Some(PostgresSsl {
        mode: "disable".to_string(),
        ca_secret_ref: Some(secret_ref("missing-ca", "ca.crt")),
    });
    let reconciler = setup(spec).await;

    let outcome = reconciler.reconcile(NAMESPACE, NAME).await.unwrap();

    assert_eq!(outcome, PassOutcome::Succeeded);
    assert_eq!(reconciler.client().secret_reads("missing-ca").await, 0);
    assert!(reconciler.executor().requests()[0].tls.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn status_write_failure_is_surfaced_and_retried_without_executing() {
    init_test_tracing();

    let reconciler = setup(test_query_spec("select 1")).await;
    reconciler
        .executor()
        .push_success(ExecutionSummary::new("select 1", &[1]));
    reconciler.client().fail_status_writes(1).await;

    let err = reconciler.reconcile(NAMESPACE, NAME).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PersistenceError);
    assert!(reconciler.client().status_writes().await.is_empty());

    // The requeued pass records the earlier execution instead of repeating it.
    let outcome = reconciler.reconcile(NAMESPACE, NAME).await.unwrap();

    assert_eq!(outcome, PassOutcome::Succeeded);
    assert_eq!(reconciler.executor().invocations(), 1);
    assert!(reconciler.client().status_writes().await[0].executed);
}

#[tokio::test(flavor = "multi_thread")]
async fn stale_status_write_is_rejected() {
    init_test_tracing();

    let reconciler = setup(test_query_spec("select 1")).await;
    let stale = reconciler.client().query(NAMESPACE, NAME).await.unwrap();
    reconciler.reconcile(NAMESPACE, NAME).await.unwrap();

    // A write based on the version read before the first pass must not land.
    let err = kubequery::status::project_status(
        reconciler.client(),
        &stale,
        kubequery::types::PostgresQueryStatus::default(),
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PersistenceError);
}
