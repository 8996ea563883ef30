//! `ConflictResolver`: detection entry point, strategy dispatch, retention
//! cache and statistics.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use super::{
	conflicting_fields, detect_type, severity_for, similarity, Conflict, ConflictType, Resolution,
	ResolutionStrategy, Severity,
};
use crate::error::ResolverError;
use crate::events::{Event, EventBus, ResolverEvent};
use crate::logging::{debug, info};
use crate::operation::OperationType;

/// Moving-average window for resolution-time statistics.
const STATS_WINDOW: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct ResolverStats {
	pub resolved_by_type: HashMap<ConflictType, u64>,
	pub resolved_by_strategy: HashMap<ResolutionStrategy, u64>,
	pub resolved_count: u64,
	pub unresolved_count: u64,
	resolution_times_ms: VecDeque<u64>,
}

impl ResolverStats {
	fn record_resolution(&mut self, conflict_type: ConflictType, strategy: ResolutionStrategy, took_ms: u64) {
		*self.resolved_by_type.entry(conflict_type).or_insert(0) += 1;
		*self.resolved_by_strategy.entry(strategy).or_insert(0) += 1;
		self.resolved_count += 1;
		self.resolution_times_ms.push_back(took_ms);
		if self.resolution_times_ms.len() > STATS_WINDOW {
			self.resolution_times_ms.pop_front();
		}
	}

	fn record_unresolved(&mut self) {
		self.unresolved_count += 1;
	}

	/// Moving average resolution time over the last `STATS_WINDOW`
	/// resolutions, or `0` if none have happened yet.
	pub fn average_resolution_time_ms(&self) -> u64 {
		if self.resolution_times_ms.is_empty() {
			return 0;
		}
		let sum: u64 = self.resolution_times_ms.iter().sum();
		sum / self.resolution_times_ms.len() as u64
	}
}

/// Hashable key conflict-type enum needs `Hash` for the stats maps above.
impl std::hash::Hash for ConflictType {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		std::mem::discriminant(self).hash(state);
	}
}

impl std::hash::Hash for ResolutionStrategy {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		std::mem::discriminant(self).hash(state);
	}
}

/// Everything the resolver needs to know about one side of a conflict,
/// supplied by the caller (the coordinator, after a transport round trip).
pub struct ConflictInput<'a> {
	pub operation_id: &'a str,
	pub session_id_local: &'a str,
	pub session_id_remote: &'a str,
	pub local_type: &'a OperationType,
	pub remote_type: &'a OperationType,
	pub local_data: &'a HashMap<String, Value>,
	pub remote_data: &'a HashMap<String, Value>,
}

pub struct ConflictResolver {
	default_strategy: ResolutionStrategy,
	enable_auto_merge: bool,
	enable_local_wins: bool,
	merge_threshold: u8,
	max_conflict_cache_size: usize,
	events: Arc<EventBus>,
	state: Mutex<ResolverState>,
}

#[derive(Default)]
struct ResolverState {
	conflicts: VecDeque<Conflict>,
	stats: ResolverStats,
}

impl ConflictResolver {
	pub fn new(
		default_strategy: ResolutionStrategy,
		enable_auto_merge: bool,
		enable_local_wins: bool,
		merge_threshold: u8,
		max_conflict_cache_size: usize,
		events: Arc<EventBus>,
	) -> Self {
		ConflictResolver {
			default_strategy,
			enable_auto_merge,
			enable_local_wins,
			merge_threshold,
			max_conflict_cache_size,
			events,
			state: Mutex::new(ResolverState::default()),
		}
	}

	/// Detect a conflict between `input`'s two sides. Returns `Ok(None)`
	/// when the pair does not conflict (different sessions, both deletes).
	/// A detected conflict is attempted for auto-resolution immediately,
	/// before being retained.
	pub fn detect(
		&self,
		conflict_id: impl Into<String>,
		input: &ConflictInput<'_>,
		detected_at: u64,
	) -> Result<Option<Conflict>, ResolverError> {
		if input.session_id_local != input.session_id_remote {
			return Ok(None);
		}

		let conflict_type = match detect_type(input.local_type, input.remote_type) {
			Some(t) => t,
			None => return Ok(None),
		};

		let severity = severity_for(conflict_type, input.local_data, input.remote_data);

		let mut conflict = Conflict {
			id: conflict_id.into(),
			operation_id: input.operation_id.to_string(),
			session_id: input.session_id_local.to_string(),
			local_data: input.local_data.clone(),
			remote_data: input.remote_data.clone(),
			conflict_type,
			severity,
			detected_at,
			resolution: None,
		};

		let gate_open = severity == Severity::Low
			|| (conflict_type == ConflictType::UpdateUpdate
				&& similarity(input.local_data, input.remote_data) > self.merge_threshold);

		debug!("detected {:?} conflict on {} (severity {:?})", conflict_type, conflict.id, severity);
		self.events.emit(Event::Resolver(ResolverEvent::ConflictDetected {
			conflict_id: conflict.id.clone(),
			conflict_type,
		}));

		let mut state = self.state.lock();
		if gate_open {
			if let Ok(resolution) =
				self.apply_strategy(self.default_strategy, conflict_type, &conflict, detected_at)
			{
				conflict.resolution = Some(resolution);
				state.stats.record_resolution(conflict_type, self.default_strategy, 0);
				info!("auto-resolved conflict {} via {:?}", conflict.id, self.default_strategy);
			}
		}

		if conflict.resolution.is_none() {
			state.stats.record_unresolved();
		}

		self.retain(&mut state, conflict.clone());
		drop(state);

		if conflict.resolution.is_some() {
			self.events.emit(Event::Resolver(ResolverEvent::ConflictResolved {
				conflict_id: conflict.id.clone(),
			}));
		} else {
			self.events.emit(Event::Resolver(ResolverEvent::ConflictRetained {
				conflict_id: conflict.id.clone(),
			}));
		}

		Ok(Some(conflict))
	}

	/// Resolve an already-retained (or freshly detected) conflict under an
	/// explicit strategy, overriding the configured default.
	pub fn resolve(
		&self,
		conflict: &Conflict,
		strategy: ResolutionStrategy,
		resolved_at: u64,
	) -> Result<Resolution, ResolverError> {
		let resolution = self.apply_strategy(strategy, conflict.conflict_type, conflict, resolved_at)?;
		self.events.emit(Event::Resolver(ResolverEvent::ConflictResolved {
			conflict_id: conflict.id.clone(),
		}));
		Ok(resolution)
	}

	fn apply_strategy(
		&self,
		strategy: ResolutionStrategy,
		conflict_type: ConflictType,
		conflict: &Conflict,
		resolved_at: u64,
	) -> Result<Resolution, ResolverError> {
		match strategy {
			ResolutionStrategy::LocalWins => Ok(Resolution {
				strategy,
				resolved_data: conflict.local_data.clone(),
				resolved_at,
			}),
			ResolutionStrategy::RemoteWins => Ok(Resolution {
				strategy,
				resolved_data: conflict.remote_data.clone(),
				resolved_at,
			}),
			ResolutionStrategy::LastModified => {
				// No reliable remote modification timestamp: reduces to local-wins.
				Ok(Resolution {
					strategy,
					resolved_data: conflict.local_data.clone(),
					resolved_at,
				})
			}
			ResolutionStrategy::Merge => {
				if !self.enable_auto_merge || conflict_type != ConflictType::UpdateUpdate {
					return Ok(Resolution {
						strategy: ResolutionStrategy::LocalWins,
						resolved_data: conflict.local_data.clone(),
						resolved_at,
					});
				}
				let merged = merge_recursive(&conflict.local_data, &conflict.remote_data);
				Ok(Resolution { strategy, resolved_data: merged, resolved_at })
			}
			ResolutionStrategy::Manual => Err(ResolverError::ManualResolutionRequired),
		}
	}

	fn retain(&self, state: &mut ResolverState, conflict: Conflict) {
		state.conflicts.push_back(conflict);
		while state.conflicts.len() > self.max_conflict_cache_size {
			state.conflicts.pop_front();
		}
	}

	/// Keys whose values differ between the two sides of `conflict`.
	pub fn conflicting_fields(&self, conflict: &Conflict) -> Vec<String> {
		conflicting_fields(&conflict.local_data, &conflict.remote_data)
	}

	pub fn stats(&self) -> ResolverStats {
		self.state.lock().stats.clone()
	}

	pub fn retained_count(&self) -> usize {
		self.state.lock().conflicts.len()
	}

	/// Highest-severity unresolved conflicts, most severe first — for
	/// manual-resolution UIs.
	pub fn unresolved_by_severity(&self) -> Vec<Conflict> {
		let state = self.state.lock();
		let mut unresolved: Vec<Conflict> =
			state.conflicts.iter().filter(|c| !c.is_resolved()).cloned().collect();
		unresolved.sort_by(|a, b| b.severity.cmp(&a.severity));
		unresolved
	}

	pub fn enable_local_wins(&self) -> bool {
		self.enable_local_wins
	}
}

/// Recursive merge: start from local, copy remote-only keys, recurse into
/// nested objects present on both sides, local wins on scalar clashes.
fn merge_recursive(
	local: &HashMap<String, Value>,
	remote: &HashMap<String, Value>,
) -> HashMap<String, Value> {
	let mut result = local.clone();
	for (key, remote_value) in remote {
		match result.get(key) {
			None => {
				result.insert(key.clone(), remote_value.clone());
			}
			Some(local_value) => {
				if let (Value::Object(lo), Value::Object(ro)) = (local_value, remote_value) {
					let lo_map: HashMap<String, Value> =
						lo.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
					let ro_map: HashMap<String, Value> =
						ro.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
					let merged = merge_recursive(&lo_map, &ro_map);
					let merged_obj: serde_json::Map<String, Value> = merged.into_iter().collect();
					result.insert(key.clone(), Value::Object(merged_obj));
				}
				// scalar clash: local wins, keep existing value untouched
			}
		}
	}
	result
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::operation::OperationType;

	fn data(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
		pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
	}

	fn resolver() -> ConflictResolver {
		ConflictResolver::new(ResolutionStrategy::LastModified, true, true, 70, 1000, Arc::new(EventBus::new()))
	}

	#[test]
	fn different_sessions_do_not_conflict() {
		let r = resolver();
		let local = data(&[]);
		let remote = data(&[]);
		let input = ConflictInput {
			operation_id: "op1",
			session_id_local: "s1",
			session_id_remote: "s2",
			local_type: &OperationType::Update,
			remote_type: &OperationType::Update,
			local_data: &local,
			remote_data: &remote,
		};
		assert!(r.detect("c1", &input, 0).unwrap().is_none());
	}

	#[test]
	fn delete_update_conflict_stays_unresolved_until_explicit_strategy() {
		let r = resolver();
		let local = data(&[("value", serde_json::json!("a"))]);
		let remote = data(&[("value", serde_json::json!("b"))]);
		let input = ConflictInput {
			operation_id: "op1",
			session_id_local: "s1",
			session_id_remote: "s1",
			local_type: &OperationType::Delete,
			remote_type: &OperationType::Update,
			local_data: &local,
			remote_data: &remote,
		};
		let conflict = r.detect("c1", &input, 0).unwrap().unwrap();
		assert_eq!(conflict.conflict_type, ConflictType::DeleteUpdate);
		assert_eq!(conflict.severity, Severity::High);
		assert!(conflict.resolution.is_none());

		let resolution = r.resolve(&conflict, ResolutionStrategy::LocalWins, 1).unwrap();
		assert_eq!(resolution.resolved_data, conflict.local_data);
	}

	#[test]
	fn low_severity_update_update_auto_resolves_at_detection() {
		let r = resolver();
		let local = data(&[("value", serde_json::json!("test")), ("x", serde_json::json!(1))]);
		let remote = data(&[("value", serde_json::json!("test")), ("x", serde_json::json!(2))]);
		let input = ConflictInput {
			operation_id: "op1",
			session_id_local: "s1",
			session_id_remote: "s1",
			local_type: &OperationType::Update,
			remote_type: &OperationType::Update,
			local_data: &local,
			remote_data: &remote,
		};
		let conflict = r.detect("c1", &input, 0).unwrap().unwrap();
		assert_eq!(conflict.severity, Severity::Low);
		let resolution = conflict.resolution.expect("should auto-resolve");
		assert_eq!(resolution.strategy, ResolutionStrategy::LastModified);
		assert_eq!(resolution.resolved_data, local);
	}

	#[test]
	fn merge_copies_remote_only_keys_and_keeps_local_on_scalar_clash() {
		let local = data(&[("a", serde_json::json!(1)), ("shared", serde_json::json!("local"))]);
		let remote =
			data(&[("b", serde_json::json!(2)), ("shared", serde_json::json!("remote"))]);
		let merged = merge_recursive(&local, &remote);
		assert_eq!(merged.get("a"), Some(&serde_json::json!(1)));
		assert_eq!(merged.get("b"), Some(&serde_json::json!(2)));
		assert_eq!(merged.get("shared"), Some(&serde_json::json!("local")));
	}

	#[test]
	fn retention_drops_oldest_on_overflow() {
		let r = ConflictResolver::new(ResolutionStrategy::Manual, true, true, 70, 2, Arc::new(EventBus::new()));
		for i in 0..5u32 {
			let local = data(&[("v", serde_json::json!(i))]);
			let remote = data(&[("v", serde_json::json!(i + 100))]);
			let input = ConflictInput {
				operation_id: "op",
				session_id_local: "s1",
				session_id_remote: "s1",
				local_type: &OperationType::Delete,
				remote_type: &OperationType::Update,
				local_data: &local,
				remote_data: &remote,
			};
			r.detect(format!("c{}", i), &input, i as u64).unwrap();
		}
		assert_eq!(r.retained_count(), 2);
	}

	#[test]
	fn manual_strategy_yields_manual_resolution_required() {
		let r = resolver();
		let local = data(&[]);
		let remote = data(&[]);
		let conflict = Conflict {
			id: "c1".to_string(),
			operation_id: "op1".to_string(),
			session_id: "s1".to_string(),
			local_data: local,
			remote_data: remote,
			conflict_type: ConflictType::Concurrent,
			severity: Severity::Low,
			detected_at: 0,
			resolution: None,
		};
		let err = r.resolve(&conflict, ResolutionStrategy::Manual, 1).unwrap_err();
		assert_eq!(err, ResolverError::ManualResolutionRequired);
	}

	#[test]
	fn detect_emits_detected_then_resolved_for_an_auto_resolved_conflict() {
		let events = Arc::new(EventBus::new());
		let r = ConflictResolver::new(ResolutionStrategy::LastModified, true, true, 70, 1000, events.clone());
		let fired = Arc::new(Mutex::new(Vec::new()));
		let fired_clone = fired.clone();
		events.subscribe(crate::events::Topic::Resolver, move |event| {
			if let Event::Resolver(resolver_event) = event {
				let label = match resolver_event {
					ResolverEvent::ConflictDetected { .. } => "detected",
					ResolverEvent::ConflictResolved { .. } => "resolved",
					ResolverEvent::ConflictRetained { .. } => "retained",
				};
				fired_clone.lock().push(label);
			}
		});

		let local = data(&[("value", serde_json::json!("test")), ("x", serde_json::json!(1))]);
		let remote = data(&[("value", serde_json::json!("test")), ("x", serde_json::json!(2))]);
		let input = ConflictInput {
			operation_id: "op1",
			session_id_local: "s1",
			session_id_remote: "s1",
			local_type: &OperationType::Update,
			remote_type: &OperationType::Update,
			local_data: &local,
			remote_data: &remote,
		};
		let conflict = r.detect("c1", &input, 0).unwrap().unwrap();
		assert!(conflict.resolution.is_some());
		assert_eq!(*fired.lock(), vec!["detected", "resolved"]);
	}

	#[test]
	fn detect_emits_detected_then_retained_for_an_unresolved_conflict() {
		let events = Arc::new(EventBus::new());
		let r = ConflictResolver::new(ResolutionStrategy::Manual, true, true, 70, 1000, events.clone());
		let fired = Arc::new(Mutex::new(Vec::new()));
		let fired_clone = fired.clone();
		events.subscribe(crate::events::Topic::Resolver, move |event| {
			if let Event::Resolver(resolver_event) = event {
				let label = match resolver_event {
					ResolverEvent::ConflictDetected { .. } => "detected",
					ResolverEvent::ConflictResolved { .. } => "resolved",
					ResolverEvent::ConflictRetained { .. } => "retained",
				};
				fired_clone.lock().push(label);
			}
		});

		let local = data(&[("value", serde_json::json!("a"))]);
		let remote = data(&[("value", serde_json::json!("b"))]);
		let input = ConflictInput {
			operation_id: "op1",
			session_id_local: "s1",
			session_id_remote: "s1",
			local_type: &OperationType::Delete,
			remote_type: &OperationType::Update,
			local_data: &local,
			remote_data: &remote,
		};
		let conflict = r.detect("c1", &input, 0).unwrap().unwrap();
		assert!(conflict.resolution.is_none());
		assert_eq!(*fired.lock(), vec!["detected", "retained"]);
	}

	#[test]
	fn explicit_resolve_emits_resolved() {
		let events = Arc::new(EventBus::new());
		let r = ConflictResolver::new(ResolutionStrategy::Manual, true, true, 70, 1000, events.clone());
		let fired = Arc::new(std::sync::atomic::AtomicUsize::new(0));
		let fired_clone = fired.clone();
		events.subscribe(crate::events::Topic::Resolver, move |event| {
			if let Event::Resolver(ResolverEvent::ConflictResolved { .. }) = event {
				fired_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
			}
		});

		let local = data(&[("value", serde_json::json!("a"))]);
		let remote = data(&[("value", serde_json::json!("b"))]);
		let conflict = Conflict {
			id: "c1".to_string(),
			operation_id: "op1".to_string(),
			session_id: "s1".to_string(),
			local_data: local,
			remote_data: remote,
			conflict_type: ConflictType::Concurrent,
			severity: Severity::Low,
			detected_at: 0,
			resolution: None,
		};
		r.resolve(&conflict, ResolutionStrategy::LocalWins, 1).unwrap();
		assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 1);
	}
}

// vim: ts=4
