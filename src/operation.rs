//! Operation record & codec.
//!
//! Pure data module: the `Operation` record, priority ordering, status
//! transitions, and `generate_operation_id`. The canonical JSON subset used
//! by the crypto core lives here too, since it's a property of the record,
//! not of the cipher.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Mutation kind. Seven built-in types, plus `Custom` for any
/// implementation-extensible string, carried through losslessly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperationType {
	Create,
	Update,
	Delete,
	SessionUpdate,
	TreeUpdate,
	DataUpdate,
	PresenceUpdate,
	Custom(String),
}

impl OperationType {
	fn as_str(&self) -> &str {
		match self {
			OperationType::Create => "create",
			OperationType::Update => "update",
			OperationType::Delete => "delete",
			OperationType::SessionUpdate => "session_update",
			OperationType::TreeUpdate => "tree_update",
			OperationType::DataUpdate => "data_update",
			OperationType::PresenceUpdate => "presence_update",
			OperationType::Custom(s) => s.as_str(),
		}
	}

	fn from_str(s: &str) -> Self {
		match s {
			"create" => OperationType::Create,
			"update" => OperationType::Update,
			"delete" => OperationType::Delete,
			"session_update" => OperationType::SessionUpdate,
			"tree_update" => OperationType::TreeUpdate,
			"data_update" => OperationType::DataUpdate,
			"presence_update" => OperationType::PresenceUpdate,
			other => OperationType::Custom(other.to_string()),
		}
	}

	/// Whether this type represents a deletion, used by the conflict
	/// detector's type-pair classification.
	pub fn is_delete(&self) -> bool {
		matches!(self, OperationType::Delete)
	}
}

impl Serialize for OperationType {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_str(self.as_str())
	}
}

impl<'de> Deserialize<'de> for OperationType {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		Ok(OperationType::from_str(&s))
	}
}

impl std::fmt::Display for OperationType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

/// Transmission priority. Ordering is `High < Normal < Low` — the derived
/// `Ord` relies on declaration order matching that ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
	#[default]
	High,
	Normal,
	Low,
}

/// Lifecycle status. Transitions: `Pending -> Syncing -> {Synced, Failed}`,
/// with `Failed -> Pending` allowed only while `retry_count < max_retries`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
	Pending,
	Syncing,
	Synced,
	Failed,
}

impl OperationStatus {
	/// Whether `from -> to` is a legal transition.
	pub fn can_transition_to(self, to: OperationStatus, retry_count: u32, max_retries: u32) -> bool {
		use OperationStatus::*;
		match (self, to) {
			(Pending, Syncing) => true,
			(Syncing, Synced) | (Syncing, Failed) => true,
			(Failed, Pending) => retry_count < max_retries,
			_ => false,
		}
	}
}

fn default_encryption_version() -> u8 {
	1
}

fn default_max_retries() -> u32 {
	5
}

/// The unit of mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
	pub id: String,
	#[serde(rename = "type")]
	pub op_type: OperationType,
	pub session_id: String,
	pub status: OperationStatus,
	pub priority: Priority,
	pub data: HashMap<String, serde_json::Value>,
	pub encrypted_data: Option<Vec<u8>>,
	#[serde(default = "default_encryption_version")]
	pub encryption_version: u8,
	pub bytes_size: u64,
	pub created_at: u64,
	pub synced_at: Option<u64>,
	pub retry_count: u32,
	#[serde(default = "default_max_retries")]
	pub max_retries: u32,
	pub failed_count: u32,
	pub last_error: Option<String>,
}

/// Fields a producer supplies to `enqueue` — everything except id, status,
/// encrypted bytes and retry counters, which the queue assigns.
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
	pub op_type: OperationType,
	pub session_id: String,
	pub data: HashMap<String, serde_json::Value>,
	pub priority: Priority,
	pub max_retries: Option<u32>,
}

impl EnqueueRequest {
	pub fn new(op_type: OperationType, session_id: impl Into<String>) -> Self {
		EnqueueRequest {
			op_type,
			session_id: session_id.into(),
			data: HashMap::new(),
			priority: Priority::Normal,
			max_retries: None,
		}
	}

	pub fn with_data(mut self, data: HashMap<String, serde_json::Value>) -> Self {
		self.data = data;
		self
	}

	pub fn with_priority(mut self, priority: Priority) -> Self {
		self.priority = priority;
		self
	}
}

/// The canonical subset of an operation's fields that the crypto core
/// serializes to plaintext before encryption. Field order matters for
/// byte-stability across encrypt/decrypt round trips but not for the
/// authentication boundary (GCM authenticates the bytes actually produced).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalOperationFields {
	#[serde(rename = "type")]
	pub op_type: OperationType,
	pub session_id: String,
	pub data: HashMap<String, serde_json::Value>,
	pub priority: Priority,
	pub created_at: u64,
	pub encryption_version: u8,
}

impl From<&Operation> for CanonicalOperationFields {
	fn from(op: &Operation) -> Self {
		CanonicalOperationFields {
			op_type: op.op_type.clone(),
			session_id: op.session_id.clone(),
			data: op.data.clone(),
			priority: op.priority,
			created_at: op.created_at,
			encryption_version: op.encryption_version,
		}
	}
}

fn now_millis() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

fn to_base36(mut n: u64) -> String {
	const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
	if n == 0 {
		return "0".to_string();
	}
	let mut out = Vec::new();
	while n > 0 {
		out.push(ALPHABET[(n % 36) as usize]);
		n /= 36;
	}
	out.reverse();
	String::from_utf8(out).unwrap()
}

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generates an id in the `op_<base36-timestamp>_<base36-random>` format.
/// Monotonic only within this process: the "random" half is actually a
/// process-local counter mixed with a coarse time-derived seed, which gives
/// per-process uniqueness without pulling in a UUID and without requiring
/// any cross-process coordination.
pub fn generate_operation_id() -> String {
	let ts = now_millis();
	let seq = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
	let mixed = seq ^ (ts.rotate_left(17));
	format!("op_{}_{}", to_base36(ts), to_base36(mixed & 0xFFFF_FFFF))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn priority_ordering_is_high_normal_low() {
		assert!(Priority::High < Priority::Normal);
		assert!(Priority::Normal < Priority::Low);
	}

	#[test]
	fn generated_ids_are_unique_and_well_formed() {
		let a = generate_operation_id();
		let b = generate_operation_id();
		assert_ne!(a, b);
		assert!(a.starts_with("op_"));
		assert_eq!(a.split('_').count(), 3);
	}

	#[test]
	fn status_transitions_follow_lifecycle_rules() {
		use OperationStatus::*;
		assert!(Pending.can_transition_to(Syncing, 0, 5));
		assert!(Syncing.can_transition_to(Synced, 0, 5));
		assert!(Syncing.can_transition_to(Failed, 0, 5));
		assert!(!Pending.can_transition_to(Synced, 0, 5));
		assert!(Failed.can_transition_to(Pending, 2, 5));
		assert!(!Failed.can_transition_to(Pending, 5, 5));
	}

	#[test]
	fn custom_operation_type_round_trips() {
		let ty = OperationType::Custom("widget_moved".to_string());
		let json = serde_json::to_string(&ty).unwrap();
		assert_eq!(json, "\"widget_moved\"");
		let back: OperationType = serde_json::from_str(&json).unwrap();
		assert_eq!(back, ty);
	}

	#[test]
	fn builtin_operation_type_round_trips() {
		let json = serde_json::to_string(&OperationType::SessionUpdate).unwrap();
		assert_eq!(json, "\"session_update\"");
		let back: OperationType = serde_json::from_str(&json).unwrap();
		assert_eq!(back, OperationType::SessionUpdate);
	}
}

// vim: ts=4
