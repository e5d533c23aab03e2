use kubequery_config::{Environment, EnvironmentError};
use std::io::Write;
use std::sync::OnceLock;
use std::{
    backtrace::{Backtrace, BacktraceStatus},
    panic::PanicHookInfo,
    sync::Once,
};
use thiserror::Error;
use tracing::subscriber::{SetGlobalDefaultError, set_global_default};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{self, InitError},
};
use tracing_log::{LogTracer, log_tracer::SetLoggerError};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, FmtSubscriber, Registry, fmt, layer::SubscriberExt};

/// JSON field name identifying the operator instance in logs.
const OPERATOR_KEY_IN_LOG: &str = "operator";

/// Errors that can occur during tracing initialization.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to build rolling file appender: {0}")]
    InitAppender(#[from] InitError),

    #[error("failed to init log tracer: {0}")]
    InitLogTracer(#[from] SetLoggerError),

    #[error("failed to set global default subscriber: {0}")]
    SetGlobalDefault(#[from] SetGlobalDefaultError),

    #[error("failed to read the environment: {0}")]
    Environment(#[from] EnvironmentError),
}

/// Log flusher handle for ensuring logs are written before shutdown.
///
/// Production mode returns a [`WorkerGuard`] that must be kept alive to ensure
/// logs are flushed. Development mode doesn't require flushing.
#[must_use]
pub enum LogFlusher {
    Flusher(WorkerGuard),
    NullFlusher,
}

static INIT_TEST_TRACING: Once = Once::new();

/// Initializes tracing for test environments.
///
/// Call once at the beginning of tests. Set `ENABLE_TRACING=1` to view tracing output:
/// ```bash
/// ENABLE_TRACING=1 cargo test test_name
/// ```
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        if std::env::var("ENABLE_TRACING").is_ok() {
            // Without an explicit environment we would default to prod and log to files.
            Environment::Dev.set();
            let _log_flusher =
                init_tracing("test", None).expect("Failed to initialize tracing for tests");
        }
    });
}

static OPERATOR_INSTANCE: OnceLock<String> = OnceLock::new();

/// Sets the operator instance name injected into all JSON log entries.
pub fn set_global_operator_instance(instance: String) {
    let _ = OPERATOR_INSTANCE.set(instance);
}

/// Returns the operator instance name, if one was set.
pub fn get_global_operator_instance() -> Option<&'static str> {
    OPERATOR_INSTANCE.get().map(|s| s.as_str())
}

/// Writer wrapper that injects the operator field into JSON log entries.
struct OperatorInjectingWriter<W> {
    inner: W,
}

impl<W> OperatorInjectingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W> Write for OperatorInjectingWriter<W>
where
    W: Write,
{
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Some(instance) = get_global_operator_instance()
            && let Some(output) = inject_operator_field(buf, instance)
        {
            // Report the original length, callers only know about `buf`.
            return match self.inner.write(output.as_bytes()) {
                Ok(_) => Ok(buf.len()),
                Err(e) => Err(e),
            };
        }

        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Returns `buf` with an `operator` field added, or `None` when `buf` is not a
/// JSON object or already carries the field.
fn inject_operator_field(buf: &[u8], instance: &str) -> Option<String> {
    let json_str = std::str::from_utf8(buf).ok()?;
    let serde_json::Value::Object(mut map) = serde_json::from_str::<serde_json::Value>(json_str).ok()? else {
        return None;
    };

    if map.contains_key(OPERATOR_KEY_IN_LOG) {
        return None;
    }

    map.insert(
        OPERATOR_KEY_IN_LOG.to_string(),
        serde_json::Value::String(instance.to_string()),
    );
    let modified = serde_json::to_string(&map).ok()?;

    if json_str.ends_with('\n') {
        Some(format!("{modified}\n"))
    } else {
        Some(modified)
    }
}

/// Initializes tracing for the application.
///
/// Production environments log JSON to rotating files, development logs to the
/// console. When `operator_instance` is given it is injected into every JSON entry.
pub fn init_tracing(
    app_name: &str,
    operator_instance: Option<String>,
) -> Result<LogFlusher, TracingError> {
    if let Some(instance) = operator_instance {
        set_global_operator_instance(instance);
    }

    // Route records emitted through the `log` crate (e.g. by tokio-postgres) into tracing.
    LogTracer::init()?;

    let is_prod = Environment::load()?.is_prod();

    // Default to `info` when `RUST_LOG` is not set.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_flusher = if is_prod {
        configure_prod_tracing(filter, app_name)?
    } else {
        configure_dev_tracing(filter)?
    };

    set_tracing_panic_hook();

    Ok(log_flusher)
}

fn configure_prod_tracing(filter: EnvFilter, app_name: &str) -> Result<LogFlusher, TracingError> {
    let file_appender = rolling::Builder::new()
        .filename_prefix(app_name)
        .filename_suffix("log")
        .rotation(rolling::Rotation::DAILY)
        .max_log_files(5)
        .build("logs")?;

    let (file_appender, guard) = tracing_appender::non_blocking(file_appender);

    let format = fmt::format()
        .with_level(true)
        .with_ansi(false)
        .with_target(false);

    let subscriber = Registry::default().with(filter).with(
        fmt::layer()
            .event_format(format)
            .with_writer(move || OperatorInjectingWriter::new(file_appender.make_writer()))
            .json()
            .with_current_span(true)
            .with_span_list(true),
    );

    set_global_default(subscriber)?;

    Ok(LogFlusher::Flusher(guard))
}

fn configure_dev_tracing(filter: EnvFilter) -> Result<LogFlusher, TracingError> {
    let format = fmt::format()
        .with_level(true)
        .with_ansi(true)
        .pretty()
        .with_line_number(false)
        .with_file(false)
        .with_target(true);

    let subscriber = FmtSubscriber::builder()
        .event_format(format)
        .with_env_filter(filter)
        .finish();

    set_global_default(subscriber)?;

    Ok(LogFlusher::NullFlusher)
}

/// Replaces the default panic hook, which only writes to stderr, with one that
/// also logs the panic through `tracing` before delegating to the previous hook.
fn set_tracing_panic_hook() {
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        panic_hook(info);
        prev_hook(info);
    }));
}

fn panic_hook(panic_info: &PanicHookInfo) {
    let backtrace = Backtrace::capture();
    let (backtrace, note) = match backtrace.status() {
        BacktraceStatus::Captured => (Some(backtrace), None),
        BacktraceStatus::Disabled => (
            None,
            Some("run with RUST_BACKTRACE=1 to display backtraces"),
        ),
        BacktraceStatus::Unsupported => {
            (None, Some("backtraces are not supported on this platform"))
        }
        _ => (None, Some("backtrace status is unknown")),
    };

    let payload = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    };

    let location = panic_info.location().map(|location| location.to_string());

    tracing::error!(
        panic.payload = payload,
        payload.location = location,
        panic.backtrace = backtrace.map(tracing::field::display),
        panic.note = note,
        "a panic occurred",
    );
}
