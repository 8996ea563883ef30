//! `SyncBatch`: transient grouping for transmission.

use crate::operation::{Operation, Priority};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
	Pending,
	Syncing,
	Completed,
	Retry,
	Failed,
}

#[derive(Debug, Clone)]
pub struct SyncBatch {
	pub id: String,
	pub operations: Vec<Operation>,
	pub total_size: u64,
	pub priority: Priority,
	pub compressed: bool,
	pub attempt_count: u32,
	pub status: BatchStatus,
}

impl SyncBatch {
	/// Assemble a batch from already-ordered candidates, honoring
	/// `max_batch_size`/`max_batch_bytes`. `candidates` must already be
	/// ordered by (priority, createdAt) —
	/// this is the queue's `nextBatchCandidates` contract.
	pub fn assemble(id: impl Into<String>, candidates: Vec<Operation>, max_bytes: u64) -> Self {
		let mut operations = Vec::new();
		let mut total_size = 0u64;
		for op in candidates {
			if total_size + op.bytes_size > max_bytes && !operations.is_empty() {
				break;
			}
			total_size += op.bytes_size;
			operations.push(op);
		}

		let priority = operations.iter().map(|op| op.priority).min().unwrap_or_default();

		SyncBatch {
			id: id.into(),
			operations,
			total_size,
			priority,
			compressed: false,
			attempt_count: 0,
			status: BatchStatus::Pending,
		}
	}

	pub fn is_empty(&self) -> bool {
		self.operations.is_empty()
	}

	pub fn operation_ids(&self) -> Vec<String> {
		self.operations.iter().map(|op| op.id.clone()).collect()
	}
}


// vim: ts=4
