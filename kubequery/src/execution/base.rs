use secrecy::SecretString;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::error::QueryResult;
use crate::execution::ExecutionSummary;
use crate::resolve::credentials::ResolvedTls;

/// Everything needed to open a session, resolved for a single pass.
#[derive(Debug)]
pub struct ConnectionProfile {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: SecretString,
    /// `None` for a plaintext session.
    pub tls: Option<ResolvedTls>,
}

/// A resolved statement and its execution window.
///
/// Lives only for the duration of one pass. Its [`fmt::Debug`] output omits the
/// SQL text and the password.
pub struct ExecutionRequest {
    pub profile: ConnectionProfile,
    pub sql: String,
    pub timeout: Duration,
}

impl fmt::Debug for ExecutionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionRequest")
            .field("profile", &self.profile)
            .field("sql_len", &self.sql.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Runs a resolved statement against its target database.
///
/// Implementations must execute the statement at most once per call and release
/// the session on every exit path.
pub trait QueryExecutor {
    fn execute(
        &self,
        request: ExecutionRequest,
    ) -> impl Future<Output = QueryResult<ExecutionSummary>> + Send;
}
