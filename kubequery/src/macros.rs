//! Macros for query error handling.
//!
//! Provides convenience macros for creating and returning [`crate::error::QueryError`]
//! instances with less boilerplate.

/// Creates a [`crate::error::QueryError`] from error kind and description, with an
/// optional dynamic detail.
#[macro_export]
macro_rules! query_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::QueryError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::QueryError::from(($kind, $desc, $detail.to_string()))
    };
}

/// Creates and returns a [`crate::error::QueryError`] from the current function.
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return Err($crate::query_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return Err($crate::query_error!($kind, $desc, $detail))
    };
}
