//! Allocation-specific error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while allocating unassigned shards.
///
/// Per-node fan-out failures are not represented here as `Err` values; they
/// travel inside [`crate::fetch::NodesResponse::failures`] and only degrade
/// the result. An `Err` from the allocator aborts the current reroute.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum AllocationError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl AllocationError {
    /// Get the error type as a string for metrics labeling
    pub fn error_type(&self) -> &'static str {
        match self {
            AllocationError::Connection(_) => "connection",
            AllocationError::Transport(_) => "transport",
            AllocationError::Timeout(_) => "timeout",
        }
    }

    /// Connection failures are expected churn while nodes restart and are
    /// logged at a lower level than genuine fetch failures.
    pub fn is_connection(&self) -> bool {
        matches!(self, AllocationError::Connection(_))
    }
}

pub type Result<T> = std::result::Result<T, AllocationError>;
