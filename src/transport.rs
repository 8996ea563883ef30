//! Transport contract: the host application supplies an implementation;
//! this crate performs no network I/O of its own.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::operation::Operation;
use crate::sync::batch::SyncBatch;

/// One operation's outcome within a `SyncResult`.
#[derive(Debug, Clone)]
pub struct FailedOperation {
	pub id: String,
	pub error: String,
	pub retryable: bool,
}

/// A conflict the server detected against its own copy of an operation.
#[derive(Debug, Clone)]
pub struct ReportedConflict {
	pub id: String,
	pub remote_operation: Operation,
}

/// Response to a `send(batch)` call.
#[derive(Debug, Clone)]
pub struct SyncResult {
	pub success: bool,
	pub synced: Vec<String>,
	pub failed: Vec<FailedOperation>,
	pub conflicts: Vec<ReportedConflict>,
	pub server_timestamp: u64,
}

/// Implemented by the host application. `send` is the coordinator's only
/// suspension point into the network.
#[async_trait]
pub trait Transport: Send + Sync {
	async fn send(&self, batch: &SyncBatch) -> Result<SyncResult, TransportError>;
}


// vim: ts=4
