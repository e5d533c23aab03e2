use futures::StreamExt;
use kube::Api;
use kube::runtime::controller::{self, Controller};
use kube::runtime::{WatchStreamExt, reflector, watcher};
use kubequery::controller::{Context, error_policy, reconcile, spec_changes};
use kubequery::execution::postgres::PgQueryExecutor;
use kubequery::k8s::http::HttpK8sClient;
use kubequery::reconcile::Reconciler;
use kubequery::types::PostgresQuery;
use kubequery_config::shared::{ExecutionConfig, OperatorConfig, RetryConfig};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Starts the operator with the provided configuration.
///
/// Watches [`PostgresQuery`] objects and reconciles them until SIGTERM or
/// SIGINT is received. In-flight passes are allowed to finish before returning.
pub async fn start_operator_with_config(operator_config: OperatorConfig) -> anyhow::Result<()> {
    info!("starting kubequery operator");

    log_config(&operator_config);

    let k8s_client = HttpK8sClient::new().await?;
    let queries: Api<PostgresQuery> = match &operator_config.watch_namespace {
        Some(namespace) => Api::namespaced(k8s_client.client(), namespace),
        None => Api::all(k8s_client.client()),
    };

    let executor = PgQueryExecutor::new(&operator_config.execution);
    let reconciler = Reconciler::new(k8s_client, executor, operator_config.execution);
    let context = Arc::new(Context::new(
        reconciler,
        operator_config.retry,
        operator_config.retry_connection_failures,
    ));

    // Only spec edits start a pass, the status writes of a pass do not.
    let (reader, writer) = reflector::store();
    let observed = watcher(queries, watcher::Config::default())
        .default_backoff()
        .reflect(writer)
        .applied_objects();

    Controller::for_stream(spec_changes(observed), reader)
        .with_config(
            controller::Config::default().concurrency(operator_config.max_concurrent_reconciles),
        )
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((object, _)) => debug!(%object, "reconciled postgres query"),
                Err(err) => warn!(error = %err, "postgres query reconciliation failed"),
            }
        })
        .await;

    info!("kubequery operator stopped");

    Ok(())
}

fn log_config(config: &OperatorConfig) {
    debug!(
        instance_name = config.instance_name,
        watch_namespace = config.watch_namespace.as_deref().unwrap_or("*"),
        max_concurrent_reconciles = config.max_concurrent_reconciles,
        retry_connection_failures = config.retry_connection_failures,
        "operator config"
    );
    log_execution_config(&config.execution);
    log_retry_config(&config.retry);
}

fn log_execution_config(config: &ExecutionConfig) {
    debug!(
        default_timeout_secs = config.default_timeout_secs,
        cancel_grace_ms = config.cancel_grace_ms,
        "execution config"
    );
}

fn log_retry_config(config: &RetryConfig) {
    debug!(
        max_attempts = config.max_attempts,
        initial_delay_ms = config.initial_delay_ms,
        max_delay_ms = config.max_delay_ms,
        backoff_factor = config.backoff_factor,
        "retry config"
    );
}
