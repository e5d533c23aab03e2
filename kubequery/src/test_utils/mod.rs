pub mod executor;
pub mod k8s;
pub mod query;
