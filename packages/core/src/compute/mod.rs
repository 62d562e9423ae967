//! Compute orders and job listings

pub mod jobs;
pub mod reuse;

pub use jobs::{compute_jobs, ComputeJobMetaData};
pub use reuse::ComputeOrderHandler;
