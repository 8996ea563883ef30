//! `QueueStats`, returned by `EncryptedQueue::stats`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
	pub total: usize,
	pub pending: usize,
	pub syncing: usize,
	pub synced: usize,
	pub failed: usize,
	pub total_bytes: u64,
}

// vim: ts=4
