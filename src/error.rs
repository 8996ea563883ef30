//! Error taxonomy for the offline sync subsystem.
//!
//! Each domain gets its own enum with manual `Display`/`Error` impls, and
//! `SyncError` wraps them rather than flattening everything into one enum.

use std::error::Error;
use std::fmt;

/// Top-level error returned by queue, resolver and coordinator operations.
#[derive(Debug)]
pub enum SyncError {
	/// Queue: capacity exceeded after a compaction attempt.
	QueueFull { attempted_bytes: u64, capacity: u64 },

	/// Queue/coordinator: a status or batch transition that isn't legal
	/// from the current state. Non-retryable; state is left unchanged.
	IllegalTransition { message: String },

	/// Crypto core error (nested).
	Crypto(CryptoError),

	/// Transport-layer error (nested).
	Transport(TransportError),

	/// Resolver: informational, not a failure.
	Resolver(ResolverError),

	/// Storage adapter I/O error.
	Storage { message: String, source: Box<dyn Error + Send + Sync> },

	/// Invalid configuration value.
	InvalidConfig { message: String },

	/// Generic error message, used sparingly at integration seams.
	Other { message: String },
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::QueueFull { attempted_bytes, capacity } => write!(
				f,
				"queue full: {} bytes requested exceeds capacity of {} bytes",
				attempted_bytes, capacity
			),
			SyncError::IllegalTransition { message } => write!(f, "illegal transition: {}", message),
			SyncError::Crypto(e) => write!(f, "crypto error: {}", e),
			SyncError::Transport(e) => write!(f, "transport error: {}", e),
			SyncError::Resolver(e) => write!(f, "resolver: {}", e),
			SyncError::Storage { message, source } => {
				write!(f, "storage adapter error: {}: {}", message, source)
			}
			SyncError::InvalidConfig { message } => write!(f, "invalid configuration: {}", message),
			SyncError::Other { message } => write!(f, "{}", message),
		}
	}
}

impl Error for SyncError {}

impl From<CryptoError> for SyncError {
	fn from(e: CryptoError) -> Self {
		SyncError::Crypto(e)
	}
}

impl From<TransportError> for SyncError {
	fn from(e: TransportError) -> Self {
		SyncError::Transport(e)
	}
}

impl From<ResolverError> for SyncError {
	fn from(e: ResolverError) -> Self {
		SyncError::Resolver(e)
	}
}

/// Crypto core errors. All are non-retryable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
	/// The framing's version byte (or batch envelope `version` field)
	/// was not the one this crate understands.
	UnsupportedVersion { found: u8 },

	/// AES-GCM tag verification failed: wrong key, tampered ciphertext,
	/// or (for framing) corrupted bytes. Callers must not distinguish
	/// which of these occurred.
	AuthenticationFailed,

	/// The byte buffer is too short to contain a valid frame, or the
	/// batch envelope is missing a required field.
	MalformedFraming { message: String },

	/// HKDF expand failed (output length request out of range, or the
	/// derivation source was empty).
	KeyDerivationFailed { message: String },
}

impl fmt::Display for CryptoError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CryptoError::UnsupportedVersion { found } => {
				write!(f, "unsupported encryption version: {}", found)
			}
			CryptoError::AuthenticationFailed => write!(f, "authentication failed"),
			CryptoError::MalformedFraming { message } => write!(f, "malformed framing: {}", message),
			CryptoError::KeyDerivationFailed { message } => {
				write!(f, "key derivation failed: {}", message)
			}
		}
	}
}

impl Error for CryptoError {}

/// Transport-layer errors, as reported by the host's `Transport` impl.
/// Drives the retry/fail branch in the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
	/// Transient failure (timeout, connection reset). `failSyncBatch`
	/// treats these as retryable.
	Network { message: String },

	/// Non-retryable failure reported by the server (bad request,
	/// rejected batch, auth failure at the transport layer).
	Protocol { message: String },
}

impl TransportError {
	/// Whether the coordinator should treat this as retryable.
	pub fn retryable(&self) -> bool {
		matches!(self, TransportError::Network { .. })
	}
}

impl fmt::Display for TransportError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TransportError::Network { message } => write!(f, "network error: {}", message),
			TransportError::Protocol { message } => write!(f, "protocol error: {}", message),
		}
	}
}

impl Error for TransportError {}

/// Informational resolver outcomes — not failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverError {
	/// `detect` was called on operations that do not conflict.
	NoConflictDetected,

	/// The conflict requires a human; `resolve` was asked to auto-apply
	/// a strategy that cannot produce a resolution (`manual`, or a gate
	/// that wasn't met).
	ManualResolutionRequired,
}

impl fmt::Display for ResolverError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ResolverError::NoConflictDetected => write!(f, "no conflict detected"),
			ResolverError::ManualResolutionRequired => write!(f, "manual resolution required"),
		}
	}
}

impl Error for ResolverError {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn queue_full_display() {
		let err = SyncError::QueueFull { attempted_bytes: 100, capacity: 50 };
		assert!(err.to_string().contains("queue full"));
	}

	#[test]
	fn transport_error_retryable() {
		assert!(TransportError::Network { message: "timeout".into() }.retryable());
		assert!(!TransportError::Protocol { message: "bad request".into() }.retryable());
	}

	#[test]
	fn crypto_error_conversion() {
		let err: SyncError = CryptoError::AuthenticationFailed.into();
		assert!(matches!(err, SyncError::Crypto(CryptoError::AuthenticationFailed)));
	}
}

// vim: ts=4
