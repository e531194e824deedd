pub mod service;
pub mod worker;

pub use service::MergeWorkflow;
pub use worker::{MergeWorker, WorkerStats};
