use std::fmt;

/// Short description of what an executed statement did.
///
/// Stored in `status.result`; it never contains result rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionSummary {
    /// Leading keyword of the statement, upper-cased (e.g. `INSERT`).
    pub statement_kind: String,
    /// Number of statements completed by the server.
    pub statements: u64,
    /// Rows affected, summed over all completed statements.
    pub rows_affected: u64,
}

impl ExecutionSummary {
    /// Builds a summary for `sql` from the per-statement row counts reported by
    /// the server.
    pub fn new(sql: &str, completed: &[u64]) -> ExecutionSummary {
        ExecutionSummary {
            statement_kind: statement_kind(sql),
            statements: completed.len() as u64,
            rows_affected: completed.iter().sum(),
        }
    }
}

impl fmt::Display for ExecutionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.statements > 1 {
            write!(
                f,
                "{} statements: {} rows affected",
                self.statements, self.rows_affected
            )
        } else {
            write!(
                f,
                "{}: {} rows affected",
                self.statement_kind, self.rows_affected
            )
        }
    }
}

/// Returns the first keyword of `sql`, skipping whitespace and comments.
fn statement_kind(sql: &str) -> String {
    let mut rest = sql;
    loop {
        rest = rest.trim_start();
        if let Some(comment) = rest.strip_prefix("--") {
            rest = comment.split_once('\n').map_or("", |(_, tail)| tail);
        } else if let Some(comment) = rest.strip_prefix("/*") {
            rest = comment.split_once("*/").map_or("", |(_, tail)| tail);
        } else {
            break;
        }
    }

    let keyword: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();

    if keyword.is_empty() {
        "EMPTY".to_string()
    } else {
        keyword.to_ascii_uppercase()
    }
}
