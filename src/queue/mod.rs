//! Encrypted operation queue: bounded capacity store, priority-ordered
//! dequeue, compaction, periodic flush.
//!
//! A bounded, tracked-state store with per-id status transitions, the way
//! a content-addressed chunk tracker would hold chunks — except the unit
//! here is an operation record, not a chunk.

pub mod stats;
pub mod storage;

pub use stats::QueueStats;
pub use storage::{PersistedRecord, RedbStorageAdapter, StorageAdapter};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::QueueConfig;
use crate::crypto::keys::KeySource;
use crate::crypto::OperationCrypto;
use crate::error::SyncError;
use crate::events::{Event, EventBus, QueueEvent};
use crate::logging::{debug, warn};
use crate::operation::{
	generate_operation_id, EnqueueRequest, Operation, OperationStatus, OperationType, Priority,
};

fn now_millis() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// The subset of an `Operation` that rides along in a persisted record's
/// `metadata_json` (everything but the plaintext `data`, which only the
/// ciphertext carries at rest).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedMetadata {
	#[serde(rename = "type")]
	op_type: OperationType,
	session_id: String,
	status: OperationStatus,
	priority: Priority,
	bytes_size: u64,
	created_at: u64,
	synced_at: Option<u64>,
	retry_count: u32,
	max_retries: u32,
	failed_count: u32,
	last_error: Option<String>,
	#[serde(default = "default_encryption_version")]
	encryption_version: Option<u8>,
}

fn default_encryption_version() -> Option<u8> {
	None
}

struct QueueState {
	records: HashMap<String, Operation>,
	last_d1_sync: u64,
}

/// Holds operations from `enqueue` through sync, enforces capacity,
/// surfaces work in priority order, and compacts aged `synced` entries.
pub struct EncryptedQueue {
	config: QueueConfig,
	crypto: Arc<OperationCrypto>,
	key_source: KeySource,
	events: Arc<EventBus>,
	state: Mutex<QueueState>,
}

impl EncryptedQueue {
	pub fn new(config: QueueConfig, crypto: Arc<OperationCrypto>, key_source: KeySource, events: Arc<EventBus>) -> Self {
		let last_d1_sync = now_millis();
		EncryptedQueue {
			config,
			crypto,
			key_source,
			events,
			state: Mutex::new(QueueState { records: HashMap::new(), last_d1_sync }),
		}
	}

	fn key_context(&self, session_id: &str) -> String {
		format!("queue:{}", session_id)
	}

	/// Assign an id, encrypt, and admit `req`. Triggers a compaction pass
	/// once projected bytes cross
	/// `compactionThreshold` of capacity, and always attempts one before
	/// failing with `QueueFull`.
	pub async fn enqueue(&self, req: EnqueueRequest) -> Result<String, SyncError> {
		let id = generate_operation_id();
		let created_at = now_millis();
		let max_retries = req.max_retries.unwrap_or(5);

		let mut op = Operation {
			id: id.clone(),
			op_type: req.op_type,
			session_id: req.session_id.clone(),
			status: OperationStatus::Pending,
			priority: req.priority,
			data: req.data,
			encrypted_data: None,
			encryption_version: crate::crypto::ENCRYPTION_VERSION,
			bytes_size: 0,
			created_at,
			synced_at: None,
			retry_count: 0,
			max_retries,
			failed_count: 0,
			last_error: None,
		};

		let context = self.key_context(&req.session_id);
		let frame = match self.crypto.encrypt_operation(&op, &self.key_source, &context).await {
			Ok(frame) => frame,
			Err(e) => {
				warn!("enqueue encryption failed for session {}: {}", req.session_id, e);
				self.events.emit(Event::Queue(QueueEvent::QueueError { message: e.to_string() }));
				return Err(SyncError::Crypto(e));
			}
		};

		op.bytes_size = frame.len() as u64;
		op.encrypted_data = Some(frame.into_bytes());

		{
			let mut state = self.state.lock();
			let projected_total = total_bytes(&state.records) + op.bytes_size;
			let crosses_compaction_threshold = self.config.max_local_capacity_bytes > 0
				&& projected_total as f64 / self.config.max_local_capacity_bytes as f64
					>= self.config.compaction_threshold;
			if crosses_compaction_threshold || projected_total > self.config.max_local_capacity_bytes {
				drop(state);
				self.compact_internal(now_millis());
				state = self.state.lock();
				let projected_total = total_bytes(&state.records) + op.bytes_size;
				if projected_total > self.config.max_local_capacity_bytes {
					warn!(
						"enqueue rejected: {} bytes would exceed capacity {}",
						projected_total, self.config.max_local_capacity_bytes
					);
					return Err(SyncError::QueueFull {
						attempted_bytes: projected_total,
						capacity: self.config.max_local_capacity_bytes,
					});
				}
			}
			state.records.insert(id.clone(), op);
		}

		debug!("enqueued operation {}", id);
		self.events.emit(Event::Queue(QueueEvent::OperationQueued { id: id.clone() }));
		Ok(id)
	}

	pub fn mark_syncing(&self, ids: &[String]) -> Result<(), SyncError> {
		let mut state = self.state.lock();
		for id in ids {
			let op = state
				.records
				.get(id)
				.ok_or_else(|| SyncError::IllegalTransition { message: format!("unknown operation {}", id) })?;
			if !op.status.can_transition_to(OperationStatus::Syncing, op.retry_count, op.max_retries) {
				return Err(SyncError::IllegalTransition {
					message: format!("cannot mark {} syncing from {:?}", id, op.status),
				});
			}
		}
		for id in ids {
			if let Some(op) = state.records.get_mut(id) {
				op.status = OperationStatus::Syncing;
			}
		}
		drop(state);
		self.events.emit(Event::Queue(QueueEvent::OperationSyncing { ids: ids.to_vec() }));
		Ok(())
	}

	pub fn mark_synced(&self, id: &str) -> Result<(), SyncError> {
		let mut state = self.state.lock();
		let op = state
			.records
			.get_mut(id)
			.ok_or_else(|| SyncError::IllegalTransition { message: format!("unknown operation {}", id) })?;
		if !op.status.can_transition_to(OperationStatus::Synced, op.retry_count, op.max_retries) {
			return Err(SyncError::IllegalTransition {
				message: format!("cannot mark {} synced from {:?}", id, op.status),
			});
		}
		op.status = OperationStatus::Synced;
		op.synced_at = Some(now_millis());
		drop(state);
		self.events.emit(Event::Queue(QueueEvent::OperationSynced { id: id.to_string() }));
		Ok(())
	}

	/// Mark an operation as failed. When `retryable` and the retry budget
	/// isn't exhausted, the operation returns to `pending`; otherwise it
	/// is left/terminated at `failed`.
	pub fn mark_failed(&self, id: &str, error: &str, retryable: bool) -> Result<(), SyncError> {
		let mut state = self.state.lock();
		let op = state
			.records
			.get_mut(id)
			.ok_or_else(|| SyncError::IllegalTransition { message: format!("unknown operation {}", id) })?;
		if !op.status.can_transition_to(OperationStatus::Failed, op.retry_count, op.max_retries) {
			return Err(SyncError::IllegalTransition {
				message: format!("cannot mark {} failed from {:?}", id, op.status),
			});
		}
		op.status = OperationStatus::Failed;
		op.failed_count += 1;
		op.last_error = Some(error.to_string());

		let retry_eligible = retryable && op.retry_count < op.max_retries;
		if retry_eligible {
			op.retry_count += 1;
			op.status = OperationStatus::Pending;
		}
		let attempt = op.retry_count;
		drop(state);

		if retry_eligible {
			self.events.emit(Event::Queue(QueueEvent::OperationRetry { id: id.to_string(), attempt }));
		} else {
			self.events.emit(Event::Queue(QueueEvent::OperationFailedMaxRetries { id: id.to_string() }));
		}
		Ok(())
	}

	/// Up to `max_count` `pending` operations totalling no more than
	/// `max_bytes`, ordered by `(priority, createdAt)`.
	pub fn next_batch_candidates(&self, max_count: usize, max_bytes: u64) -> Vec<Operation> {
		let state = self.state.lock();
		let mut pending: Vec<&Operation> =
			state.records.values().filter(|op| op.status == OperationStatus::Pending).collect();
		pending.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.created_at.cmp(&b.created_at)));

		let mut out = Vec::new();
		let mut total = 0u64;
		for op in pending {
			if out.len() >= max_count {
				break;
			}
			if total + op.bytes_size > max_bytes && !out.is_empty() {
				break;
			}
			total += op.bytes_size;
			out.push(op.clone());
		}
		out
	}

	pub fn get(&self, id: &str) -> Option<Operation> {
		self.state.lock().records.get(id).cloned()
	}

	pub fn delete(&self, id: &str) -> Option<Operation> {
		self.state.lock().records.remove(id)
	}

	pub fn stats(&self) -> QueueStats {
		let state = self.state.lock();
		let mut stats = QueueStats::default();
		for op in state.records.values() {
			stats.total += 1;
			stats.total_bytes += op.bytes_size;
			match op.status {
				OperationStatus::Pending => stats.pending += 1,
				OperationStatus::Syncing => stats.syncing += 1,
				OperationStatus::Synced => stats.synced += 1,
				OperationStatus::Failed => stats.failed += 1,
			}
		}
		stats
	}

	/// Remove `synced` entries older than `syncedCleanupAge`, never
	/// touching `pending`/`syncing`/`failed` regardless of age. Idempotent:
	/// a second consecutive call removes nothing further.
	pub fn compact(&self) -> usize {
		self.compact_internal(now_millis())
	}

	fn compact_internal(&self, now: u64) -> usize {
		let mut state = self.state.lock();
		let cutoff = self.config.synced_cleanup_age_ms;
		let before = state.records.len();
		let mut reclaimed = 0u64;
		state.records.retain(|_, op| {
			let keep = !(op.status == OperationStatus::Synced
				&& op.synced_at.map(|t| now.saturating_sub(t) >= cutoff).unwrap_or(false));
			if !keep {
				reclaimed += op.bytes_size;
			}
			keep
		});
		let removed = before - state.records.len();
		drop(state);
		if removed > 0 {
			debug!("compaction reclaimed {} bytes across {} entries", reclaimed, removed);
			self.events.emit(Event::Queue(QueueEvent::QueueCompacted { removed, reclaimed_bytes: reclaimed }));
		}
		removed
	}

	/// Serialize every record for a collaborator to persist. Does not
	/// itself call a `StorageAdapter` — the driver owns the cadence and
	/// the adapter instance.
	pub fn snapshot(&self) -> Vec<PersistedRecord> {
		let state = self.state.lock();
		build_snapshot(&state.records)
	}

	/// Checked on the driver's own tick. If at least `d1SyncInterval`
	/// milliseconds have elapsed since the last emission, resets the
	/// cadence clock and emits `Event::Queue(QueueEvent::D1Synced)`
	/// carrying the queue's current encrypted records, for a collaborator
	/// to persist — the queue never calls a `StorageAdapter` itself.
	/// Returns whether an emission happened.
	pub fn maybe_emit_d1_sync(&self, now: u64) -> bool {
		let records = {
			let mut state = self.state.lock();
			if now.saturating_sub(state.last_d1_sync) < self.config.d1_sync_interval_ms {
				return false;
			}
			state.last_d1_sync = now;
			build_snapshot(&state.records)
		};
		debug!("d1 sync emitting snapshot of {} records", records.len());
		self.events.emit(Event::Queue(QueueEvent::D1Synced { records }));
		true
	}

	/// Emit `Event::Queue(QueueEvent::Shutdown)`. The queue otherwise
	/// leaves its state untouched — it is the driver's responsibility to
	/// stop ticking it afterwards.
	pub fn shutdown(&self) {
		self.events.emit(Event::Queue(QueueEvent::Shutdown));
	}

	/// Restore from persisted records, decrypting each to repopulate
	/// `data`. Idempotent: an id already present is left untouched.
	pub async fn restore(&self, records: Vec<PersistedRecord>) -> Result<(), SyncError> {
		let mut legacy_count = 0usize;
		let mut restored = Vec::with_capacity(records.len());

		for record in records {
			{
				let state = self.state.lock();
				if state.records.contains_key(&record.id) {
					continue;
				}
			}

			let metadata: PersistedMetadata = serde_json::from_str(&record.metadata_json)
				.map_err(|e| SyncError::Storage { message: "decoding metadata".into(), source: Box::new(e) })?;

			let encryption_version = metadata.encryption_version.unwrap_or_else(|| {
				legacy_count += 1;
				1
			});

			let context = self.key_context(&metadata.session_id);
			let fields =
				self.crypto.decrypt_operation(&record.encrypted_data, &self.key_source, &context).await?;

			let op = Operation {
				id: record.id,
				op_type: fields.op_type,
				session_id: fields.session_id,
				status: metadata.status,
				priority: fields.priority,
				data: fields.data,
				encrypted_data: Some(record.encrypted_data),
				encryption_version,
				bytes_size: metadata.bytes_size,
				created_at: fields.created_at,
				synced_at: metadata.synced_at,
				retry_count: metadata.retry_count,
				max_retries: metadata.max_retries,
				failed_count: metadata.failed_count,
				last_error: metadata.last_error,
			};
			restored.push(op);
		}

		{
			let mut state = self.state.lock();
			for op in restored {
				state.records.entry(op.id.clone()).or_insert(op);
			}
		}

		if legacy_count > 0 {
			self.events
				.emit(Event::Queue(QueueEvent::LegacyRecordVersionAssumed { count: legacy_count }));
		}
		Ok(())
	}
}

fn total_bytes(records: &HashMap<String, Operation>) -> u64 {
	records.values().map(|op| op.bytes_size).sum()
}

fn build_snapshot(records: &HashMap<String, Operation>) -> Vec<PersistedRecord> {
	records
		.values()
		.map(|op| {
			let metadata = PersistedMetadata {
				op_type: op.op_type.clone(),
				session_id: op.session_id.clone(),
				status: op.status,
				priority: op.priority,
				bytes_size: op.bytes_size,
				created_at: op.created_at,
				synced_at: op.synced_at,
				retry_count: op.retry_count,
				max_retries: op.max_retries,
				failed_count: op.failed_count,
				last_error: op.last_error.clone(),
				encryption_version: Some(op.encryption_version),
			};
			PersistedRecord {
				id: op.id.clone(),
				encrypted_data: op.encrypted_data.clone().unwrap_or_default(),
				metadata_json: serde_json::to_string(&metadata).unwrap_or_default(),
			}
		})
		.collect()
}


// vim: ts=4
