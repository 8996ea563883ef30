//! Network state machine.

use std::collections::VecDeque;

/// `unknown | online | poor | offline`, transitioned externally via
/// `setNetworkState` or by observed platform connectivity signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
	Unknown,
	Online,
	Poor,
	Offline,
}

impl NetworkState {
	fn label(self) -> &'static str {
		match self {
			NetworkState::Unknown => "unknown",
			NetworkState::Online => "online",
			NetworkState::Poor => "poor",
			NetworkState::Offline => "offline",
		}
	}
}

impl std::fmt::Display for NetworkState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.label())
	}
}

/// One recorded state transition, used for the bounded history ring.
#[derive(Debug, Clone)]
pub struct NetworkTransition {
	pub previous: NetworkState,
	pub new: NetworkState,
	pub timestamp: u64,
}

/// Bounded to the last 100 transitions.
const HISTORY_CAPACITY: usize = 100;

pub struct NetworkStateMachine {
	state: NetworkState,
	history: VecDeque<NetworkTransition>,
}

/// What, if anything, to report for a state change: whether `online` or
/// `offline` crossed a boundary. `changed` is always reported unless the
/// state didn't actually change.
pub struct TransitionReport {
	pub became_online: bool,
	pub became_not_online: bool,
	pub changed: Option<NetworkTransition>,
}

impl Default for NetworkStateMachine {
	fn default() -> Self {
		NetworkStateMachine { state: NetworkState::Unknown, history: VecDeque::new() }
	}
}

impl NetworkStateMachine {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn state(&self) -> NetworkState {
		self.state
	}

	pub fn history(&self) -> &VecDeque<NetworkTransition> {
		&self.history
	}

	/// Apply a new state. Returns `None` (no `changed` transition, no
	/// online/offline crossing) when `new == current` — emission is
	/// suppressed entirely in that case.
	pub fn set_state(&mut self, new: NetworkState, timestamp: u64) -> Option<TransitionReport> {
		if new == self.state {
			return None;
		}
		let previous = self.state;
		self.state = new;

		let transition = NetworkTransition { previous, new, timestamp };
		self.history.push_back(transition.clone());
		if self.history.len() > HISTORY_CAPACITY {
			self.history.pop_front();
		}

		Some(TransitionReport {
			became_online: previous != NetworkState::Online && new == NetworkState::Online,
			became_not_online: previous == NetworkState::Online && new != NetworkState::Online,
			changed: Some(transition),
		})
	}

	/// Map an `effectiveType` connectivity signal (`2g`/`slow-2g` → poor,
	/// anything else → online) to a state and apply it.
	pub fn set_from_effective_type(&mut self, effective_type: &str, timestamp: u64) -> Option<TransitionReport> {
		let state = match effective_type {
			"2g" | "slow-2g" => NetworkState::Poor,
			_ => NetworkState::Online,
		};
		self.set_state(state, timestamp)
	}
}


// vim: ts=4
