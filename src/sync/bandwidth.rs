//! Bandwidth profile derivation and adaptive batch sizing.

use std::collections::VecDeque;

/// Coarse network classification reported by the platform, if available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveType {
	Slow2g,
	TwoG,
	ThreeG,
	FourG,
	Unknown,
}

impl EffectiveType {
	fn baseline(self) -> (f64, f64) {
		// (speedKbps, latencyMs)
		match self {
			EffectiveType::Slow2g => (50.0, 2000.0),
			EffectiveType::TwoG => (150.0, 1000.0),
			EffectiveType::ThreeG => (750.0, 400.0),
			EffectiveType::FourG => (5000.0, 50.0),
			EffectiveType::Unknown => (750.0, 400.0),
		}
	}

	fn reliability(self) -> f64 {
		match self {
			EffectiveType::FourG => 0.95,
			EffectiveType::ThreeG => 0.85,
			_ => 0.70,
		}
	}

	fn label(self) -> &'static str {
		match self {
			EffectiveType::Slow2g => "slow-2g",
			EffectiveType::TwoG => "2g",
			EffectiveType::ThreeG => "3g",
			EffectiveType::FourG => "4g",
			EffectiveType::Unknown => "unknown",
		}
	}
}

/// A point-in-time bandwidth estimate.
#[derive(Debug, Clone)]
pub struct BandwidthProfile {
	pub speed_kbps: f64,
	pub latency_ms: f64,
	pub reliability: f64,
	pub effective_type: &'static str,
	pub timestamp: u64,
}

impl BandwidthProfile {
	/// Build a profile from platform connection metadata. `downlink` (in
	/// Mbps) and `rtt` (in ms), when present, override the `effectiveType`
	/// baseline.
	pub fn from_connection_metadata(
		effective_type: EffectiveType,
		downlink_mbps: Option<f64>,
		rtt_ms: Option<f64>,
		timestamp: u64,
	) -> Self {
		let (mut speed_kbps, mut latency_ms) = effective_type.baseline();
		if let Some(downlink) = downlink_mbps {
			speed_kbps = downlink * 1024.0;
		}
		if let Some(rtt) = rtt_ms {
			latency_ms = rtt;
		}
		BandwidthProfile {
			speed_kbps,
			latency_ms,
			reliability: effective_type.reliability(),
			effective_type: effective_type.label(),
			timestamp,
		}
	}
}

/// Bounded to the last 50 samples.
const HISTORY_CAPACITY: usize = 50;

#[derive(Default)]
pub struct BandwidthHistory {
	samples: VecDeque<BandwidthProfile>,
}

impl BandwidthHistory {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&mut self, profile: BandwidthProfile) {
		self.samples.push_back(profile);
		if self.samples.len() > HISTORY_CAPACITY {
			self.samples.pop_front();
		}
	}

	pub fn len(&self) -> usize {
		self.samples.len()
	}

	pub fn is_empty(&self) -> bool {
		self.samples.is_empty()
	}
}

/// Derived batch-size ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
	pub max_batch_size: usize,
	pub max_batch_bytes: u64,
}

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

/// Recompute batch limits from `speed_kbps` against the configured
/// defaults.
pub fn adaptive_batch_limits(speed_kbps: f64, default_size: usize, default_bytes: u64) -> BatchLimits {
	if speed_kbps < 512.0 {
		BatchLimits {
			max_batch_size: (default_size / 4).max(10),
			max_batch_bytes: (default_bytes / 4).max(512 * KIB),
		}
	} else if speed_kbps < 1024.0 {
		BatchLimits {
			max_batch_size: (default_size / 2).max(25),
			max_batch_bytes: (default_bytes / 2).max(MIB),
		}
	} else if speed_kbps > 5000.0 {
		BatchLimits {
			max_batch_size: (default_size * 2).min(500),
			max_batch_bytes: (default_bytes * 2).min(50 * MIB),
		}
	} else {
		BatchLimits { max_batch_size: default_size, max_batch_bytes: default_bytes }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn slow_connection_downshifts_to_quarter_with_floor() {
		let limits = adaptive_batch_limits(100.0, 100, 5 * MIB);
		assert!(limits.max_batch_size <= 25);
		assert!(limits.max_batch_bytes <= MIB);
		assert!(limits.max_batch_size >= 10);
	}

	#[test]
	fn fast_connection_doubles_with_ceiling() {
		let limits = adaptive_batch_limits(10_000.0, 100, 5 * MIB);
		assert_eq!(limits.max_batch_size, 200);
		assert_eq!(limits.max_batch_bytes, 10 * MIB);
	}

	#[test]
	fn mid_connection_uses_defaults() {
		let limits = adaptive_batch_limits(2000.0, 100, 5 * MIB);
		assert_eq!(limits.max_batch_size, 100);
		assert_eq!(limits.max_batch_bytes, 5 * MIB);
	}

	#[test]
	fn downlink_and_rtt_override_baseline() {
		let profile =
			BandwidthProfile::from_connection_metadata(EffectiveType::FourG, Some(2.0), Some(80.0), 0);
		assert_eq!(profile.speed_kbps, 2048.0);
		assert_eq!(profile.latency_ms, 80.0);
		assert_eq!(profile.reliability, 0.95);
	}

	#[test]
	fn history_bounded_to_fifty() {
		let mut history = BandwidthHistory::new();
		for i in 0..80 {
			history.push(BandwidthProfile::from_connection_metadata(
				EffectiveType::ThreeG,
				None,
				None,
				i,
			));
		}
		assert_eq!(history.len(), HISTORY_CAPACITY);
	}
}

// vim: ts=4
