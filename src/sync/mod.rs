//! Sync coordinator: network state, bandwidth profile, adaptive batching
//! and batch lifecycle.
//!
//! A transfer-phase state machine and progress-reporting cadence,
//! generalized to the batch lifecycle of an operation queue rather than a
//! file transfer.

pub mod backoff;
pub mod bandwidth;
pub mod batch;
pub mod coordinator;
pub mod network;

pub use bandwidth::{BandwidthHistory, BandwidthProfile, EffectiveType};
pub use batch::{BatchStatus, SyncBatch};
pub use coordinator::{estimate_sync_time_ms, CoordinatorStats, SyncCoordinator};
pub use network::{NetworkState, NetworkStateMachine};

// vim: ts=4
