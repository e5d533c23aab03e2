mod base;
mod execution;
mod operator;
mod retry;

pub use base::*;
pub use execution::*;
pub use operator::*;
pub use retry::*;
