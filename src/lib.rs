//! # aeon-sync — offline-first collaborative operation queue and sync
//!
//! Embeddable core for an edge-deployed page runtime: an encrypted
//! operation queue, a conflict resolver and a sync coordinator, glued
//! together by a crypto core, an operation codec and a typed event bus.
//! The crate performs no network I/O or durable persistence of its own —
//! it is driven by a host-supplied [`transport::Transport`] and (for the
//! reference storage adapter) an on-disk `redb` database.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use aeon_sync::config::Config;
//! use aeon_sync::crypto::OperationCrypto;
//! use aeon_sync::crypto::keys::KeySource;
//! use aeon_sync::events::EventBus;
//! use aeon_sync::operation::{EnqueueRequest, OperationType};
//! use aeon_sync::queue::EncryptedQueue;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let events = Arc::new(EventBus::new());
//!     let crypto = Arc::new(OperationCrypto::new());
//!     let key_source = KeySource::Session { session_id: "s1".into() };
//!     let queue = EncryptedQueue::new(config.queue, crypto, key_source, events);
//!
//!     let id = queue.enqueue(EnqueueRequest::new(OperationType::Update, "s1")).await?;
//!     println!("queued {}", id);
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]
#![warn(dead_code)]

pub mod config;
pub mod conflict;
pub mod crypto;
pub mod error;
pub mod events;
pub mod logging;
pub mod operation;
pub mod queue;
pub mod sync;
pub mod transport;

pub use config::Config;
pub use conflict::{Conflict, ConflictResolver, ConflictType, ResolutionStrategy, Severity};
pub use crypto::OperationCrypto;
pub use error::{CryptoError, ResolverError, SyncError, TransportError};
pub use events::{Event, EventBus, Topic};
pub use operation::{EnqueueRequest, Operation, OperationStatus, OperationType, Priority};
pub use queue::{EncryptedQueue, QueueStats, StorageAdapter};
pub use sync::{NetworkState, SyncBatch, SyncCoordinator};
pub use transport::{SyncResult, Transport};

// vim: ts=4
