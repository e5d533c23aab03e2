use std::error;
use std::fmt;

use tokio_postgres::error::SqlState;

/// Convenient result type for reconciliation operations using [`QueryError`].
pub type QueryResult<T> = Result<T, QueryError>;

/// Main error type of the reconciliation core.
///
/// A [`QueryError`] always carries an [`ErrorKind`] so callers can branch on the
/// failure class, a static description and optionally a dynamic detail. It is
/// only flattened to text by [`QueryError::status_message`] when the outcome is
/// written to the resource status.
#[derive(Debug, Clone)]
pub struct QueryError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    WithDescription(ErrorKind, &'static str),
    WithDescriptionAndDetail(ErrorKind, &'static str, String),
}

/// Failure classes of a reconciliation pass.
///
/// Every kind except [`ErrorKind::PersistenceError`] is a business failure: it is
/// recorded on the resource status and the pass ends without asking the
/// controller for a retry.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The SQL text could not be resolved from its secret or config map.
    ResolutionError,
    /// The password or CA certificate could not be read.
    CredentialError,
    /// The CA certificate material is not usable as a trust anchor.
    TrustMaterialError,
    /// The database could not be reached or rejected the session.
    ConnectionError,
    /// The execution window expired during connect or execute.
    TimeoutError,
    /// The database rejected the statement.
    ExecutionError,
    /// The declared/observed object store could not be read or written.
    PersistenceError,
}

impl ErrorKind {
    /// Returns `true` when the failure should be recorded on the status and left
    /// alone until the next change, `false` when the controller should retry.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ErrorKind::PersistenceError)
    }
}

impl QueryError {
    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => kind,
        }
    }

    /// Returns the static description of this error.
    pub fn description(&self) -> &'static str {
        match self.repr {
            ErrorRepr::WithDescription(_, desc)
            | ErrorRepr::WithDescriptionAndDetail(_, desc, _) => desc,
        }
    }

    /// Returns the detailed error information if available.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::WithDescriptionAndDetail(_, _, ref detail) => Some(detail.as_str()),
            ErrorRepr::WithDescription(..) => None,
        }
    }

    /// Renders the short diagnostic stored in `status.error`.
    pub fn status_message(&self) -> String {
        self.to_string()
    }
}

impl PartialEq for QueryError {
    fn eq(&self, other: &QueryError) -> bool {
        self.kind() == other.kind()
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self.repr {
            ErrorRepr::WithDescription(kind, desc) => {
                fmt::Debug::fmt(&kind, f)?;
                f.write_str(": ")?;
                desc.fmt(f)
            }
            ErrorRepr::WithDescriptionAndDetail(kind, desc, ref detail) => {
                fmt::Debug::fmt(&kind, f)?;
                f.write_str(": ")?;
                desc.fmt(f)?;
                f.write_str(" -> ")?;
                detail.fmt(f)
            }
        }
    }
}

impl error::Error for QueryError {}

/// Creates a [`QueryError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for QueryError {
    fn from((kind, desc): (ErrorKind, &'static str)) -> QueryError {
        QueryError {
            repr: ErrorRepr::WithDescription(kind, desc),
        }
    }
}

/// Creates a [`QueryError`] from an error kind, static description, and dynamic detail.
impl From<(ErrorKind, &'static str, String)> for QueryError {
    fn from((kind, desc, detail): (ErrorKind, &'static str, String)) -> QueryError {
        QueryError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, desc, detail),
        }
    }
}

/// Converts [`rustls::Error`] to [`QueryError`] with [`ErrorKind::TrustMaterialError`].
impl From<rustls::Error> for QueryError {
    fn from(err: rustls::Error) -> QueryError {
        QueryError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::TrustMaterialError,
                "TLS configuration failed",
                err.to_string(),
            ),
        }
    }
}

/// Classifies an error raised while establishing a Postgres session.
///
/// Server-reported errors are described by their SQLSTATE only. The server
/// message is never copied since it may echo statement text.
pub(crate) fn postgres_connect_error(err: tokio_postgres::Error) -> QueryError {
    match err.code() {
        Some(sqlstate) => QueryError::from((
            ErrorKind::ConnectionError,
            describe_connect_sql_state(sqlstate),
            format!("SQLSTATE {}", sqlstate.code()),
        )),
        None => QueryError::from((
            ErrorKind::ConnectionError,
            "PostgreSQL connection failed",
            err.to_string(),
        )),
    }
}

/// Classifies an error raised while executing the statement.
///
/// Any failure after the statement was sent is an [`ErrorKind::ExecutionError`],
/// including a dropped connection, since the statement may have been applied.
pub(crate) fn postgres_execution_error(err: tokio_postgres::Error) -> QueryError {
    match err.code() {
        Some(sqlstate) => QueryError::from((
            ErrorKind::ExecutionError,
            describe_execution_sql_state(sqlstate),
            format!("SQLSTATE {}", sqlstate.code()),
        )),
        None if err.is_closed() => QueryError::from((
            ErrorKind::ExecutionError,
            "PostgreSQL connection closed during execution",
        )),
        None => QueryError::from((
            ErrorKind::ExecutionError,
            "PostgreSQL statement failed",
            err.to_string(),
        )),
    }
}

fn describe_connect_sql_state(sqlstate: &SqlState) -> &'static str {
    match *sqlstate {
        SqlState::INVALID_AUTHORIZATION_SPECIFICATION | SqlState::INVALID_PASSWORD => {
            "PostgreSQL authentication failed"
        }
        SqlState::INVALID_CATALOG_NAME => "PostgreSQL database does not exist",
        SqlState::TOO_MANY_CONNECTIONS => "PostgreSQL has too many connections",
        SqlState::CANNOT_CONNECT_NOW => "PostgreSQL is not accepting connections",
        SqlState::ADMIN_SHUTDOWN | SqlState::CRASH_SHUTDOWN => "PostgreSQL is shutting down",
        SqlState::INSUFFICIENT_PRIVILEGE => "PostgreSQL connection not permitted",
        _ => "PostgreSQL rejected the connection",
    }
}

fn describe_execution_sql_state(sqlstate: &SqlState) -> &'static str {
    match *sqlstate {
        // Syntax and access errors (42xxx)
        SqlState::SYNTAX_ERROR | SqlState::SYNTAX_ERROR_OR_ACCESS_RULE_VIOLATION => {
            "PostgreSQL syntax error"
        }
        SqlState::INSUFFICIENT_PRIVILEGE => "PostgreSQL permission denied",
        SqlState::UNDEFINED_TABLE
        | SqlState::UNDEFINED_COLUMN
        | SqlState::UNDEFINED_FUNCTION
        | SqlState::UNDEFINED_SCHEMA
        | SqlState::UNDEFINED_OBJECT => "PostgreSQL object not found",
        SqlState::DUPLICATE_TABLE
        | SqlState::DUPLICATE_COLUMN
        | SqlState::DUPLICATE_SCHEMA
        | SqlState::DUPLICATE_OBJECT
        | SqlState::DUPLICATE_DATABASE
        | SqlState::DUPLICATE_FUNCTION => "PostgreSQL object already exists",

        // Data integrity violations (23xxx)
        SqlState::INTEGRITY_CONSTRAINT_VIOLATION
        | SqlState::NOT_NULL_VIOLATION
        | SqlState::FOREIGN_KEY_VIOLATION
        | SqlState::UNIQUE_VIOLATION
        | SqlState::CHECK_VIOLATION => "PostgreSQL constraint violation",

        // Data conversion errors (22xxx)
        SqlState::DATA_EXCEPTION
        | SqlState::INVALID_TEXT_REPRESENTATION
        | SqlState::INVALID_DATETIME_FORMAT
        | SqlState::NUMERIC_VALUE_OUT_OF_RANGE
        | SqlState::DIVISION_BY_ZERO => "PostgreSQL data error",

        // Transaction errors (40xxx, 25xxx)
        SqlState::T_R_SERIALIZATION_FAILURE | SqlState::T_R_DEADLOCK_DETECTED => {
            "PostgreSQL transaction aborted"
        }
        SqlState::ACTIVE_SQL_TRANSACTION
        | SqlState::NO_ACTIVE_SQL_TRANSACTION
        | SqlState::IN_FAILED_SQL_TRANSACTION => "PostgreSQL transaction state error",

        // Operator intervention errors (57xxx)
        SqlState::QUERY_CANCELED => "PostgreSQL query canceled",
        SqlState::ADMIN_SHUTDOWN | SqlState::CRASH_SHUTDOWN => "PostgreSQL shut down",
        SqlState::LOCK_NOT_AVAILABLE => "PostgreSQL lock not available",

        // Resource errors (53xxx)
        SqlState::DISK_FULL | SqlState::OUT_OF_MEMORY | SqlState::INSUFFICIENT_RESOURCES => {
            "PostgreSQL resource limitation"
        }

        // PL/pgSQL errors (P0xxx)
        SqlState::RAISE_EXCEPTION | SqlState::ASSERT_FAILURE => "PostgreSQL raised an exception",

        SqlState::FEATURE_NOT_SUPPORTED => "PostgreSQL feature not supported",
        _ => "PostgreSQL rejected the statement",
    }
}
