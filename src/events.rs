//! Typed event bus: synchronous publish/subscribe between the queue,
//! resolver, coordinator and any external observer.
//!
//! A single typed `Topic`/`Event` bus rather than one `Fn` trait per
//! concern, so a subscriber can filter by component without any handler
//! needing to know the others' payload shapes.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::conflict::ConflictType;
use crate::error::SyncError;
use crate::queue::storage::PersistedRecord;

/// Topics a subscriber can filter on. One variant per emitting component;
/// subscribing to `All` receives every event regardless of component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
	All,
	Queue,
	Coordinator,
	Resolver,
}

/// Queue-originated events.
#[derive(Debug, Clone)]
pub enum QueueEvent {
	OperationQueued { id: String },
	OperationSyncing { ids: Vec<String> },
	OperationSynced { id: String },
	OperationRetry { id: String, attempt: u32 },
	OperationFailedMaxRetries { id: String },
	QueueError { message: String },
	QueueCompacted { removed: usize, reclaimed_bytes: u64 },
	/// Periodic snapshot, emitted on the `d1SyncInterval` cadence, carrying
	/// the queue's current encrypted records for a collaborator to persist.
	/// The queue does not call a `StorageAdapter` itself.
	D1Synced { records: Vec<PersistedRecord> },
	Shutdown,
	/// A restored record was missing `encryptionVersion`; the queue
	/// assumed version 1 and flags it rather than accepting it silently.
	/// Fired once per restore call, not once per legacy record.
	LegacyRecordVersionAssumed { count: usize },
}

/// Coordinator-originated events: network state machine transitions and
/// batch lifecycle transitions.
#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
	NetworkOnline,
	NetworkOffline,
	NetworkChanged { previous: String, new: String, timestamp: u64 },
	BatchCreated { batch_id: String, operation_count: usize },
	BatchStarted { batch_id: String },
	BatchProgress { batch_id: String, synced: usize, bytes: u64, estimated_time_remaining_ms: u64 },
	BatchCompleted { batch_id: String, synced_count: usize },
	BatchRetry { batch_id: String, attempt: u32 },
	BatchFailed { batch_id: String, error: String },
}

/// Resolver-originated events.
#[derive(Debug, Clone)]
pub enum ResolverEvent {
	ConflictDetected { conflict_id: String, conflict_type: ConflictType },
	ConflictResolved { conflict_id: String },
	ConflictRetained { conflict_id: String },
}

#[derive(Debug, Clone)]
pub enum Event {
	Queue(QueueEvent),
	Coordinator(CoordinatorEvent),
	Resolver(ResolverEvent),
	Error(Arc<SyncError>),
}

impl Event {
	fn topic(&self) -> Topic {
		match self {
			Event::Queue(_) => Topic::Queue,
			Event::Coordinator(_) => Topic::Coordinator,
			Event::Resolver(_) => Topic::Resolver,
			Event::Error(_) => Topic::All,
		}
	}
}

pub type Handler = dyn Fn(&Event) + Send + Sync;

struct Subscription {
	topic: Topic,
	handler: Arc<Handler>,
}

/// Subscription handle. Dropping it does not unsubscribe; call
/// `EventBus::unsubscribe` explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

/// Synchronous, single-threaded-cooperative dispatch: `emit` invokes
/// every matching handler, in subscription order, on the
/// caller's thread of execution before returning. Slots are
/// `Vec<Option<Subscription>>` rather than removed in place, and `emit`
/// re-reads each slot under the lock immediately before calling it: a
/// slot unsubscribed before its turn is skipped for this dispatch, one
/// unsubscribed after its turn has no effect on the in-flight emit, and
/// a still-live later handler always fires regardless of what an
/// earlier handler did to other slots.
#[derive(Default)]
pub struct EventBus {
	inner: Mutex<EventBusState>,
}

#[derive(Default)]
struct EventBusState {
	subscriptions: Vec<Option<Subscription>>,
	next_id: u64,
}

impl EventBus {
	pub fn new() -> Self {
		EventBus::default()
	}

	/// Subscribe to `topic` (use `Topic::All` to receive every event).
	pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionId
	where
		F: Fn(&Event) + Send + Sync + 'static,
	{
		let mut state = self.inner.lock();
		let id = state.next_id;
		state.next_id += 1;
		state.subscriptions.push(Some(Subscription { topic, handler: Arc::new(handler) }));
		SubscriptionId(id)
	}

	/// Remove a subscription. Safe to call from inside a handler that is
	/// itself running as part of the current `emit`.
	pub fn unsubscribe(&self, id: SubscriptionId) {
		let mut state = self.inner.lock();
		// ids are assigned in push order starting at 0, so the id doubles
		// as the slot index as long as slots are never reordered.
		if let Some(slot) = state.subscriptions.get_mut(id.0 as usize) {
			*slot = None;
		}
	}

	/// Dispatch `event` to every handler subscribed to its topic or to
	/// `Topic::All`, in subscription order. The slot range is fixed at the
	/// start of `emit` (handlers subscribed mid-dispatch do not fire for
	/// this event), but each slot is re-read under the lock immediately
	/// before its handler runs, so unsubscribing a not-yet-called slot
	/// skips it while an already-called slot is unaffected.
	pub fn emit(&self, event: Event) {
		let topic = event.topic();
		let len = self.inner.lock().subscriptions.len();
		for index in 0..len {
			let handler = {
				let state = self.inner.lock();
				match state.subscriptions.get(index).and_then(|slot| slot.as_ref()) {
					Some(sub) if sub.topic == topic || sub.topic == Topic::All => sub.handler.clone(),
					_ => continue,
				}
			};
			handler(&event);
		}
	}
}


// vim: ts=4
