//! Idempotency fingerprints.
//!
//! A fingerprint is the hex SHA-256 of `host|port|database|user|sql`. It covers
//! the connection identity and the resolved SQL but not the password, so
//! rotating credentials does not re-run a statement.

use sha2::{Digest, Sha256};
use std::fmt;

use crate::types::{PostgresConnection, PostgresQueryStatus};

/// Fingerprint of a connection identity and a resolved SQL text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes the fingerprint of `connection` and `sql`.
    pub fn compute(connection: &PostgresConnection, sql: &str) -> Fingerprint {
        let canonical = format!(
            "{}|{}|{}|{}|{}",
            connection.host, connection.port, connection.database, connection.user, sql
        );
        let digest = Sha256::digest(canonical.as_bytes());

        Fingerprint(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a short prefix suitable for logs.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.0
    }
}

/// Outcome of comparing a new fingerprint with the last observed status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionDecision {
    /// The statement already ran successfully for this fingerprint.
    Skip,
    /// The statement must be executed.
    Proceed,
}

/// Decides whether a pass must execute.
///
/// Only a successful execution with the same fingerprint suppresses execution;
/// a failed attempt with a matching fingerprint is retried.
pub fn decide(status: Option<&PostgresQueryStatus>, fingerprint: &Fingerprint) -> ExecutionDecision {
    match status {
        Some(status) if status.executed && status.idempotency_hash == fingerprint.as_str() => {
            ExecutionDecision::Skip
        }
        _ => ExecutionDecision::Proceed,
    }
}
