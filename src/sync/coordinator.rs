//! Sync coordinator: network state machine + bandwidth profile + adaptive
//! batching + batch lifecycle, wired together.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::CoordinatorConfig;
use crate::error::SyncError;
use crate::events::{CoordinatorEvent, Event, EventBus};
use crate::logging::{debug, info, warn};
use crate::operation::Operation;
use crate::transport::SyncResult;

use super::bandwidth::{adaptive_batch_limits, BandwidthHistory, BandwidthProfile, BatchLimits};
use super::batch::{BatchStatus, SyncBatch};
use super::network::{NetworkState, NetworkStateMachine};

#[derive(Debug, Clone, Default)]
pub struct CoordinatorStats {
	pub total_syncs_attempted: u64,
	pub total_operations_synced: u64,
	pub failed_syncs: u64,
}

struct CoordinatorState {
	network: NetworkStateMachine,
	bandwidth_history: BandwidthHistory,
	current_profile: Option<BandwidthProfile>,
	limits: BatchLimits,
	batches: HashMap<String, SyncBatch>,
	current_batch_id: Option<String>,
	stats: CoordinatorStats,
}

pub struct SyncCoordinator {
	config: CoordinatorConfig,
	events: Arc<EventBus>,
	state: Mutex<CoordinatorState>,
}

impl SyncCoordinator {
	pub fn new(config: CoordinatorConfig, events: Arc<EventBus>) -> Self {
		let limits =
			BatchLimits { max_batch_size: config.max_batch_size, max_batch_bytes: config.max_batch_bytes };
		SyncCoordinator {
			config,
			events,
			state: Mutex::new(CoordinatorState {
				network: NetworkStateMachine::new(),
				bandwidth_history: BandwidthHistory::new(),
				current_profile: None,
				limits,
				batches: HashMap::new(),
				current_batch_id: None,
				stats: CoordinatorStats::default(),
			}),
		}
	}

	/// Drive the network state machine from an external signal. Emission
	/// is suppressed when the state doesn't actually change.
	pub fn set_network_state(&self, new_state: NetworkState, timestamp: u64) {
		let mut state = self.state.lock();
		if let Some(report) = state.network.set_state(new_state, timestamp) {
			if report.became_online {
				self.events.emit(Event::Coordinator(CoordinatorEvent::NetworkOnline));
			}
			if report.became_not_online {
				self.events.emit(Event::Coordinator(CoordinatorEvent::NetworkOffline));
			}
			if let Some(transition) = report.changed {
				info!("network state {} -> {}", transition.previous, transition.new);
				self.events.emit(Event::Coordinator(CoordinatorEvent::NetworkChanged {
					previous: transition.previous.to_string(),
					new: transition.new.to_string(),
					timestamp: transition.timestamp,
				}));
			}
		}
	}

	pub fn network_state(&self) -> NetworkState {
		self.state.lock().network.state()
	}

	/// Record a new bandwidth sample and, if `adaptive_batching` is
	/// enabled, recompute `max_batch_size`/`max_batch_bytes` from it.
	pub fn update_bandwidth_profile(&self, profile: BandwidthProfile) {
		let mut state = self.state.lock();
		if self.config.adaptive_batching {
			state.limits = adaptive_batch_limits(
				profile.speed_kbps,
				self.config.max_batch_size,
				self.config.max_batch_bytes,
			);
		}
		state.current_profile = Some(profile.clone());
		state.bandwidth_history.push(profile);
	}

	pub fn current_limits(&self) -> BatchLimits {
		self.state.lock().limits
	}

	pub fn current_profile(&self) -> Option<BandwidthProfile> {
		self.state.lock().current_profile.clone()
	}

	/// Assemble a batch from already-priority-ordered candidates honoring
	/// the current (possibly adapted) limits.
	pub fn create_sync_batch(&self, candidates: Vec<Operation>) -> String {
		let mut state = self.state.lock();
		let id = uuid::Uuid::new_v4().to_string();
		let max_bytes = state.limits.max_batch_bytes;
		let truncated: Vec<Operation> = candidates.into_iter().take(state.limits.max_batch_size).collect();
		let batch = SyncBatch::assemble(id.clone(), truncated, max_bytes);
		let operation_count = batch.operations.len();
		state.batches.insert(id.clone(), batch);
		self.events.emit(Event::Coordinator(CoordinatorEvent::BatchCreated {
			batch_id: id.clone(),
			operation_count,
		}));
		id
	}

	pub fn start_sync_batch(&self, id: &str) -> Result<(), SyncError> {
		let mut state = self.state.lock();
		let batch = state
			.batches
			.get_mut(id)
			.ok_or_else(|| SyncError::IllegalTransition { message: format!("unknown batch {}", id) })?;
		if batch.status != BatchStatus::Pending && batch.status != BatchStatus::Retry {
			return Err(SyncError::IllegalTransition {
				message: format!("cannot start batch {} from {:?}", id, batch.status),
			});
		}
		batch.status = BatchStatus::Syncing;
		state.current_batch_id = Some(id.to_string());
		state.stats.total_syncs_attempted += 1;
		self.events.emit(Event::Coordinator(CoordinatorEvent::BatchStarted { batch_id: id.to_string() }));
		Ok(())
	}

	pub fn update_progress(&self, id: &str, synced: usize, bytes: u64) {
		let state = self.state.lock();
		let profile = state.current_profile.clone();
		let batch = match state.batches.get(id) {
			Some(b) => b,
			None => return,
		};
		let remaining_bytes = batch.total_size.saturating_sub(bytes);
		let eta_ms = profile
			.map(|p| estimated_time_remaining_ms(remaining_bytes, p.speed_kbps, p.latency_ms))
			.unwrap_or(0);
		self.events.emit(Event::Coordinator(CoordinatorEvent::BatchProgress {
			batch_id: id.to_string(),
			synced,
			bytes,
			estimated_time_remaining_ms: eta_ms,
		}));
	}

	pub fn complete_sync_batch(&self, id: &str, result: &SyncResult) {
		let mut state = self.state.lock();
		if let Some(batch) = state.batches.get_mut(id) {
			batch.status = BatchStatus::Completed;
		}
		if result.success {
			state.stats.total_operations_synced += result.synced.len() as u64;
		}
		if state.current_batch_id.as_deref() == Some(id) {
			state.current_batch_id = None;
		}
		self.events.emit(Event::Coordinator(CoordinatorEvent::BatchCompleted {
			batch_id: id.to_string(),
			synced_count: result.synced.len(),
		}));
	}

	/// Retryable failures under the retry ceiling bump the attempt counter
	/// and emit a retry event; otherwise emit a failure event and count it.
	/// The driver schedules the actual retry delay — this only updates
	/// state and reports.
	pub fn fail_sync_batch(&self, id: &str, error: &str, retryable: bool) -> Result<(), SyncError> {
		let mut state = self.state.lock();
		let max_retries = self.config.max_retries;
		let batch = state
			.batches
			.get_mut(id)
			.ok_or_else(|| SyncError::IllegalTransition { message: format!("unknown batch {}", id) })?;

		if retryable && batch.attempt_count < max_retries {
			batch.attempt_count += 1;
			batch.status = BatchStatus::Retry;
			let attempt = batch.attempt_count;
			drop(state);
			debug!("batch {} failed ({}), retry attempt {}", id, error, attempt);
			self.events
				.emit(Event::Coordinator(CoordinatorEvent::BatchRetry { batch_id: id.to_string(), attempt }));
		} else {
			batch.status = BatchStatus::Failed;
			state.stats.failed_syncs += 1;
			if state.current_batch_id.as_deref() == Some(id) {
				state.current_batch_id = None;
			}
			drop(state);
			warn!("batch {} failed permanently: {}", id, error);
			self.events.emit(Event::Coordinator(CoordinatorEvent::BatchFailed {
				batch_id: id.to_string(),
				error: error.to_string(),
			}));
		}
		Ok(())
	}

	/// Cancel the pending batch before it starts. A batch already
	/// `syncing` must not be cancelled here — route failure through
	/// `fail_sync_batch` instead.
	pub fn clear(&self) {
		let mut state = self.state.lock();
		state.current_batch_id = None;
	}

	pub fn stats(&self) -> CoordinatorStats {
		self.state.lock().stats.clone()
	}

	pub fn retry_delay_ms(&self) -> u64 {
		self.config.retry_delay_ms
	}
}

/// `ceil((bytes*8/(speed_kbps*1024) + latency_ms/1000) * 1000)` ms. Used
/// for `estimateSyncTime`, a distinct calculation from `updateProgress`'s
/// own ETA formula below.
pub fn estimate_sync_time_ms(bytes: u64, speed_kbps: f64, latency_ms: f64) -> u64 {
	if speed_kbps <= 0.0 {
		return u64::MAX;
	}
	let transfer_seconds = (bytes as f64 * 8.0) / (speed_kbps * 1024.0);
	let total_seconds = transfer_seconds + latency_ms / 1000.0;
	(total_seconds * 1000.0).ceil() as u64
}

/// `(remainingBytes*8)/speedKbps + latencyMs`, the `updateProgress` ETA
/// formula from spec §4.5 — distinct from `estimate_sync_time_ms`, which
/// uses its own unit conversion and rounding.
pub fn estimated_time_remaining_ms(remaining_bytes: u64, speed_kbps: f64, latency_ms: f64) -> u64 {
	if speed_kbps <= 0.0 {
		return u64::MAX;
	}
	let transfer_ms = (remaining_bytes as f64 * 8.0) / speed_kbps;
	(transfer_ms + latency_ms).round() as u64
}


// vim: ts=4
