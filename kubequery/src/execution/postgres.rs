use kubequery_config::shared::ExecutionConfig;
use secrecy::ExposeSecret;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_postgres::config::SslMode;
use tokio_postgres::tls::MakeTlsConnect;
use tokio_postgres::{CancelToken, Client, Config, Connection, NoTls, SimpleQueryMessage, Socket};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{Instrument, debug, error, info, warn};

use crate::bail;
use crate::error::{ErrorKind, QueryResult, postgres_connect_error, postgres_execution_error};
use crate::execution::{ConnectionProfile, ExecutionRequest, ExecutionSummary, QueryExecutor};
use crate::tls::{TlsMode, build_client_config};

/// Application name reported to the server in `pg_stat_activity`.
const APPLICATION_NAME: &str = "kubequery";

/// Spawns a background task driving a Postgres connection until it terminates.
///
/// The returned handle is aborted when the owning [`PgSession`] is dropped.
fn spawn_postgres_connection<T>(connection: Connection<Socket, T::Stream>) -> JoinHandle<()>
where
    T: MakeTlsConnect<Socket>,
    T::Stream: Send + 'static,
{
    let span = tracing::Span::current();
    let task = async move {
        if let Err(e) = connection.await {
            error!("an error occurred during the Postgres connection: {}", e);
            return;
        }

        debug!("postgres connection terminated successfully")
    }
    .instrument(span);

    tokio::spawn(task)
}

/// TLS connector used both to open the session and to send a cancel request.
#[derive(Clone)]
enum Connector {
    NoTls,
    Rustls(MakeRustlsConnect),
}

impl Connector {
    fn for_profile(profile: &ConnectionProfile) -> QueryResult<(TlsMode, Connector)> {
        let Some(tls) = &profile.tls else {
            return Ok((TlsMode::Disable, Connector::NoTls));
        };

        let mode: TlsMode = tls.mode.parse()?;
        match build_client_config(mode, tls.trust_anchor.as_ref())? {
            Some(client_config) => Ok((mode, Connector::Rustls(MakeRustlsConnect::new(client_config)))),
            None => Ok((mode, Connector::NoTls)),
        }
    }
}

/// A single scoped Postgres session.
///
/// Dropping the session aborts the connection task, so the socket is released on
/// every exit path.
struct PgSession {
    client: Client,
    cancel_token: CancelToken,
    connector: Connector,
    connection_task: JoinHandle<()>,
}

impl PgSession {
    async fn connect(profile: &ConnectionProfile, mode: TlsMode, connector: Connector) -> QueryResult<PgSession> {
        let mut config = Config::new();
        config
            .host(profile.host.clone())
            .port(profile.port)
            .dbname(profile.database.clone())
            .user(profile.user.clone())
            .password(profile.password.expose_secret())
            .application_name(APPLICATION_NAME)
            // Certificate checks are done by the rustls verifier, tokio-postgres only
            // needs to know whether to negotiate TLS at all.
            .ssl_mode(match mode {
                TlsMode::Disable => SslMode::Disable,
                _ => SslMode::Require,
            });

        let (client, connection_task) = match &connector {
            Connector::NoTls => {
                let (client, connection) = config
                    .connect(NoTls)
                    .await
                    .map_err(postgres_connect_error)?;
                (client, spawn_postgres_connection::<NoTls>(connection))
            }
            Connector::Rustls(tls) => {
                let (client, connection) = config
                    .connect(tls.clone())
                    .await
                    .map_err(postgres_connect_error)?;
                (client, spawn_postgres_connection::<MakeRustlsConnect>(connection))
            }
        };

        debug!(
            host = %profile.host,
            port = profile.port,
            database = %profile.database,
            tls_mode = %mode,
            "opened postgres session"
        );

        Ok(PgSession {
            cancel_token: client.cancel_token(),
            client,
            connector,
            connection_task,
        })
    }

    /// Runs `sql` with the simple query protocol and returns the row count of
    /// every completed statement.
    async fn execute(&self, sql: &str) -> QueryResult<Vec<u64>> {
        let messages = self
            .client
            .simple_query(sql)
            .await
            .map_err(postgres_execution_error)?;

        let completed = messages
            .iter()
            .filter_map(|message| match message {
                SimpleQueryMessage::CommandComplete(rows) => Some(*rows),
                _ => None,
            })
            .collect();

        Ok(completed)
    }

    /// Asks the server to cancel the running statement, waiting at most `grace`.
    async fn cancel(&self, grace: Duration) {
        let cancel = async {
            match &self.connector {
                Connector::NoTls => self.cancel_token.cancel_query(NoTls).await,
                Connector::Rustls(tls) => self.cancel_token.cancel_query(tls.clone()).await,
            }
        };

        match time::timeout(grace, cancel).await {
            Ok(Ok(())) => info!("cancelled the running statement"),
            Ok(Err(err)) => warn!(error = %err, "failed to cancel the running statement"),
            Err(_) => warn!(?grace, "cancel request did not complete in time"),
        }
    }
}

impl Drop for PgSession {
    fn drop(&mut self) {
        self.connection_task.abort();
    }
}

/// [`QueryExecutor`] running statements against Postgres with tokio-postgres.
#[derive(Debug, Clone)]
pub struct PgQueryExecutor {
    cancel_grace: Duration,
}

impl PgQueryExecutor {
    pub fn new(config: &ExecutionConfig) -> PgQueryExecutor {
        PgQueryExecutor {
            cancel_grace: config.cancel_grace(),
        }
    }
}

impl QueryExecutor for PgQueryExecutor {
    async fn execute(&self, request: ExecutionRequest) -> QueryResult<ExecutionSummary> {
        let ExecutionRequest {
            profile,
            sql,
            timeout,
        } = request;

        let (mode, connector) = Connector::for_profile(&profile)?;

        // One deadline covers both connecting and executing.
        let deadline = Instant::now() + timeout;

        let session = match time::timeout_at(deadline, PgSession::connect(&profile, mode, connector)).await {
            Ok(session) => session?,
            Err(_) => bail!(
                ErrorKind::TimeoutError,
                "Connection timed out",
                format!("no session within {timeout:?}")
            ),
        };

        match time::timeout_at(deadline, session.execute(&sql)).await {
            Ok(completed) => Ok(ExecutionSummary::new(&sql, &completed?)),
            Err(_) => {
                session.cancel(self.cancel_grace).await;
                bail!(
                    ErrorKind::TimeoutError,
                    "Statement timed out",
                    format!("not completed within {timeout:?}")
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::credentials::ResolvedTls;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc;

    /// Request code of a `CancelRequest` message.
    const CANCEL_REQUEST_CODE: i32 = 80877102;
    const BACKEND_PID: i32 = 4242;
    const BACKEND_SECRET: i32 = 7;

    fn profile(port: u16, tls: Option<ResolvedTls>) -> ConnectionProfile {
        ConnectionProfile {
            host: "127.0.0.1".to_string(),
            port,
            database: "app".to_string(),
            user: "admin".to_string(),
            password: "s3cret".to_string().into(),
            tls,
        }
    }

    fn executor() -> PgQueryExecutor {
        PgQueryExecutor::new(&ExecutionConfig::default())
    }

    /// Binds a listener that accepts connections and never answers.
    async fn silent_server() -> (u16, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let task = tokio::spawn(async move {
            let mut sockets = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                sockets.push(socket);
            }
        });

        (port, task)
    }

    #[tokio::test]
    async fn unresponsive_server_times_out_within_the_window() {
        let (port, server) = silent_server().await;
        let request = ExecutionRequest {
            profile: profile(port, None),
            sql: "select pg_sleep(10)".to_string(),
            timeout: Duration::from_secs(1),
        };

        let started = std::time::Instant::now();
        let err = executor().execute(request).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TimeoutError);
        assert!(started.elapsed() < Duration::from_secs(3));
        server.abort();
    }

    /// Binds a listener speaking just enough of the Postgres protocol to open a
    /// session, then never answers a query. Cancel requests are reported on the
    /// returned channel as `(pid, secret)`.
    async fn stalling_server() -> (u16, mpsc::UnboundedReceiver<(i32, i32)>, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (cancel_tx, cancel_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve_stalling_session(socket, cancel_tx.clone()));
            }
        });

        (port, cancel_rx, task)
    }

    async fn serve_stalling_session(mut socket: TcpStream, cancel_tx: mpsc::UnboundedSender<(i32, i32)>) {
        let Ok(len) = socket.read_i32().await else {
            return;
        };
        let Ok(code) = socket.read_i32().await else {
            return;
        };

        if code == CANCEL_REQUEST_CODE {
            let pid = socket.read_i32().await.unwrap();
            let secret = socket.read_i32().await.unwrap();
            let _ = cancel_tx.send((pid, secret));
            return;
        }

        // Rest of the startup message: parameters.
        let mut parameters = vec![0u8; len as usize - 8];
        socket.read_exact(&mut parameters).await.unwrap();

        let mut reply = Vec::new();
        // AuthenticationOk
        reply.extend_from_slice(&[b'R', 0, 0, 0, 8, 0, 0, 0, 0]);
        // BackendKeyData
        reply.extend_from_slice(&[b'K', 0, 0, 0, 12]);
        reply.extend_from_slice(&BACKEND_PID.to_be_bytes());
        reply.extend_from_slice(&BACKEND_SECRET.to_be_bytes());
        // ReadyForQuery, idle
        reply.extend_from_slice(&[b'Z', 0, 0, 0, 5, b'I']);
        socket.write_all(&reply).await.unwrap();

        // Swallow the query and never answer it.
        let mut sink = [0u8; 1024];
        while let Ok(read) = socket.read(&mut sink).await {
            if read == 0 {
                return;
            }
        }
    }

    #[tokio::test]
    async fn slow_statement_times_out_and_is_cancelled() {
        let (port, mut cancels, server) = stalling_server().await;
        let request = ExecutionRequest {
            profile: profile(port, None),
            sql: "select pg_sleep(60)".to_string(),
            timeout: Duration::from_secs(1),
        };

        let started = std::time::Instant::now();
        let err = executor().execute(request).await.unwrap_err();
        let elapsed = started.elapsed();

        assert_eq!(err.kind(), ErrorKind::TimeoutError);
        assert_eq!(err.description(), "Statement timed out");
        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed < Duration::from_secs(3));

        let cancel = time::timeout(Duration::from_secs(1), cancels.recv())
            .await
            .unwrap();
        assert_eq!(cancel, Some((BACKEND_PID, BACKEND_SECRET)));
        server.abort();
    }

    #[tokio::test]
    async fn refused_connection_is_a_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let request = ExecutionRequest {
            profile: profile(port, None),
            sql: "select 1".to_string(),
            timeout: Duration::from_secs(5),
        };

        let err = executor().execute(request).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConnectionError);
    }

    #[tokio::test]
    async fn unknown_tls_mode_fails_before_connecting() {
        let request = ExecutionRequest {
            profile: profile(
                1,
                Some(ResolvedTls {
                    mode: "allow".to_string(),
                    trust_anchor: None,
                }),
            ),
            sql: "select 1".to_string(),
            timeout: Duration::from_secs(1),
        };

        let err = executor().execute(request).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConnectionError);
        assert_eq!(err.description(), "Unsupported ssl mode");
    }

    #[test]
    fn connection_profile_debug_redacts_the_password() {
        let rendered = format!("{:?}", profile(5432, None));

        assert!(!rendered.contains("s3cret"));
    }
}
