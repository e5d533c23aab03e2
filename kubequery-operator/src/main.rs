use crate::config::load_operator_config;
use crate::core::start_operator_with_config;
use kubequery::tls::install_crypto_provider_once;
use kubequery_config::shared::OperatorConfig;
use kubequery_telemetry::tracing::init_tracing;
use tracing::error;

mod config;
mod core;

fn main() -> anyhow::Result<()> {
    // Load operator config
    let operator_config = load_operator_config()?;

    // Initialize tracing with the instance name injected into every log entry
    let _log_flusher = init_tracing(
        env!("CARGO_BIN_NAME"),
        Some(operator_config.instance_name.clone()),
    )?;

    // Both the Kubernetes client and the Postgres sessions use rustls
    install_crypto_provider_once();

    // We start the runtime.
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(operator_config))?;

    Ok(())
}

async fn async_main(operator_config: OperatorConfig) -> anyhow::Result<()> {
    if let Err(err) = start_operator_with_config(operator_config).await {
        error!("an error occurred in the operator: {err}");

        return Err(err);
    }

    Ok(())
}
