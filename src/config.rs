#![allow(dead_code)]

//! Unified configuration for the offline sync subsystem.
//!
//! A single `Config` struct is the source of truth, consolidating the
//! queue/resolver/coordinator configuration surface plus the ambient
//! logging knobs. Priority chain:
//!
//! 1. Built-in defaults (`Config::default()`)
//! 2. Config file (TOML or JSON)
//! 3. Environment variables (`AEON_SYNC_*` prefix)
//! 4. Explicit overrides applied by the embedding application

use crate::conflict::ResolutionStrategy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration for queue, resolver and coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	pub queue: QueueConfig,
	pub resolver: ResolverConfig,
	pub coordinator: CoordinatorConfig,

	/// Log level (trace, debug, info, warn, error); read by `logging::init_tracing`
	/// only when `RUST_LOG` is unset.
	pub log_level: String,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			queue: QueueConfig::default(),
			resolver: ResolverConfig::default(),
			coordinator: CoordinatorConfig::default(),
			log_level: "info".to_string(),
		}
	}
}

impl Config {
	/// Load configuration from a TOML file, falling back to defaults for
	/// any field the file omits (via `#[serde(default)]`).
	pub fn from_toml_file(path: &Path) -> Result<Self, crate::error::SyncError> {
		let contents = std::fs::read_to_string(path).map_err(|e| crate::error::SyncError::Storage {
			message: format!("reading config file {}", path.display()),
			source: Box::new(e),
		})?;
		toml::from_str(&contents)
			.map_err(|e| crate::error::SyncError::InvalidConfig { message: e.to_string() })
	}

	/// Apply `AEON_SYNC_*` environment variable overrides on top of the
	/// current values. Unrecognized or unparsable variables are ignored —
	/// this is meant for ops-level tuning, not a strict schema.
	pub fn apply_env_overrides(&mut self) {
		if let Ok(v) = std::env::var("AEON_SYNC_MAX_LOCAL_CAPACITY_BYTES") {
			if let Ok(n) = v.parse() {
				self.queue.max_local_capacity_bytes = n;
			}
		}
		if let Ok(v) = std::env::var("AEON_SYNC_MAX_BATCH_SIZE") {
			if let Ok(n) = v.parse() {
				self.coordinator.max_batch_size = n;
			}
		}
		if let Ok(v) = std::env::var("AEON_SYNC_LOG_LEVEL") {
			self.log_level = v;
		}
	}
}

// ============================================================================
// QUEUE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum KeyDerivationSource {
	/// Derive the AES key from a UCAN-style signing key byte string.
	#[default]
	Ucan,
	/// Fall back to the session identifier as the derivation source.
	Session,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EncryptionConfig {
	pub enabled: bool,
	pub key_derivation: KeyDerivationSource,
}

impl Default for EncryptionConfig {
	fn default() -> Self {
		EncryptionConfig { enabled: true, key_derivation: KeyDerivationSource::Ucan }
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueueConfig {
	/// Byte ceiling on total encrypted bytes held by the queue.
	pub max_local_capacity_bytes: u64,

	/// Fraction of `max_local_capacity_bytes` that triggers a compaction pass.
	pub compaction_threshold: f64,

	/// Cadence, in milliseconds, of the periodic snapshot event (`d1:synced`).
	pub d1_sync_interval_ms: u64,

	/// Age, in milliseconds, past which a `synced` entry is eligible for
	/// compaction.
	pub synced_cleanup_age_ms: u64,

	/// Default retention for `synced` entries before producer-side deletion,
	/// independent of compaction.
	pub synced_retention_ms: u64,

	pub encryption: EncryptionConfig,
}

impl Default for QueueConfig {
	fn default() -> Self {
		QueueConfig {
			max_local_capacity_bytes: 50 * 1024 * 1024,
			compaction_threshold: 0.8,
			d1_sync_interval_ms: Duration::from_secs(5 * 60).as_millis() as u64,
			synced_cleanup_age_ms: Duration::from_secs(60 * 60).as_millis() as u64,
			synced_retention_ms: Duration::from_secs(60 * 60).as_millis() as u64,
			encryption: EncryptionConfig::default(),
		}
	}
}

// ============================================================================
// RESOLVER
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResolverConfig {
	pub default_strategy: ResolutionStrategy,
	pub enable_auto_merge: bool,
	pub enable_local_wins: bool,
	pub max_conflict_cache_size: usize,
	pub conflict_timeout_ms: u64,
	/// Similarity threshold (0-100) above which `update_update` conflicts
	/// may be auto-merged.
	pub merge_threshold: u8,
}

impl Default for ResolverConfig {
	fn default() -> Self {
		ResolverConfig {
			default_strategy: ResolutionStrategy::LastModified,
			enable_auto_merge: true,
			enable_local_wins: true,
			max_conflict_cache_size: 1000,
			conflict_timeout_ms: Duration::from_secs(300).as_millis() as u64,
			merge_threshold: 70,
		}
	}
}

// ============================================================================
// COORDINATOR
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CoordinatorConfig {
	pub max_batch_size: usize,
	pub max_batch_bytes: u64,
	pub batch_timeout_ms: u64,
	pub max_retries: u32,
	pub retry_delay_ms: u64,
	pub enable_compression: bool,
	pub enable_delta_sync: bool,
	pub adaptive_batching: bool,
}

impl Default for CoordinatorConfig {
	fn default() -> Self {
		CoordinatorConfig {
			max_batch_size: 100,
			max_batch_bytes: 5 * 1024 * 1024,
			batch_timeout_ms: Duration::from_secs(30).as_millis() as u64,
			max_retries: 5,
			retry_delay_ms: 1000,
			enable_compression: false,
			enable_delta_sync: false,
			adaptive_batching: true,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn config_default_matches_documented_constants() {
		let config = Config::default();
		assert_eq!(config.queue.max_local_capacity_bytes, 50 * 1024 * 1024);
		assert_eq!(config.queue.compaction_threshold, 0.8);
		assert_eq!(config.resolver.max_conflict_cache_size, 1000);
		assert_eq!(config.resolver.merge_threshold, 70);
		assert_eq!(config.coordinator.max_batch_size, 100);
		assert_eq!(config.coordinator.max_batch_bytes, 5 * 1024 * 1024);
		assert_eq!(config.coordinator.max_retries, 5);
	}

	#[test]
	fn config_round_trips_through_toml() {
		let config = Config::default();
		let text = toml::to_string(&config).expect("serialize");
		let back: Config = toml::from_str(&text).expect("deserialize");
		assert_eq!(config.queue.max_local_capacity_bytes, back.queue.max_local_capacity_bytes);
		assert_eq!(config.coordinator.max_batch_size, back.coordinator.max_batch_size);
	}

	#[test]
	fn partial_toml_falls_back_to_defaults() {
		let partial = "logLevel = \"debug\"\n";
		let config: Config = toml::from_str(partial).expect("deserialize");
		assert_eq!(config.log_level, "debug");
		assert_eq!(config.queue.max_local_capacity_bytes, QueueConfig::default().max_local_capacity_bytes);
	}

	#[test]
	fn env_overrides_apply() {
		std::env::set_var("AEON_SYNC_MAX_BATCH_SIZE", "7");
		let mut config = Config::default();
		config.apply_env_overrides();
		assert_eq!(config.coordinator.max_batch_size, 7);
		std::env::remove_var("AEON_SYNC_MAX_BATCH_SIZE");
	}
}

// vim: ts=4
