//! Connection and execution engine.
//!
//! A pass opens one short-lived session per statement. Connecting and executing
//! share a single deadline; when it expires the in-flight statement is cancelled
//! on the server and the session is torn down.

mod base;
pub mod postgres;
mod summary;

pub use base::*;
pub use summary::*;
