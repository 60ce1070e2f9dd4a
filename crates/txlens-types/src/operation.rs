//! Operation tracking types and transient failure records.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Kind of logical operation competing for the virtualization pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Navigation,
    DataFetch,
    Layout,
    Render,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Navigation => "navigation",
            Self::DataFetch => "data_fetch",
            Self::Layout => "layout",
            Self::Render => "render",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a tracked operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Pending,
    Completed,
    Cancelled,
    Failed,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Snapshot of a tracked operation. Created on tracking request, terminal
/// after completion, cancellation, or timeout; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
    pub kind: OperationKind,
    pub status: OperationStatus,
    pub priority: u32,
    /// Milliseconds since tracker start when the operation was registered.
    pub started_at_ms: u64,
}

/// Transient record of failed network attempts for one URL. One per URL,
/// latest attempt wins, cleared on the first success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkFailureContext {
    pub url: String,
    pub method: String,
    pub attempts: u32,
    pub last_error: String,
    /// Milliseconds since client start when the failure was recorded.
    pub recorded_at_ms: u64,
    /// Backoff the client will wait before the next attempt, if any remain.
    pub retry_after: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_is_the_only_non_terminal_status() {
        assert!(!OperationStatus::Pending.is_terminal());
        assert!(OperationStatus::Completed.is_terminal());
        assert!(OperationStatus::Cancelled.is_terminal());
        assert!(OperationStatus::Failed.is_terminal());
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&OperationKind::DataFetch).unwrap();
        assert_eq!(json, "\"data_fetch\"");
    }

    #[test]
    fn operation_snapshot_round_trips() {
        let op = Operation {
            id: "jump_acct_1".to_string(),
            kind: OperationKind::Navigation,
            status: OperationStatus::Pending,
            priority: 5,
            started_at_ms: 120,
        };
        let json = serde_json::to_string(&op).unwrap();
        let back: Operation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, op);
    }
}
