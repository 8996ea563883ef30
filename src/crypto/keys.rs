//! HKDF-SHA256 key derivation and the non-extractable key cache.

use dashmap::DashMap;
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::CryptoError;

const UCAN_SALT: &[u8] = b"aeon-pages-v1";
const SESSION_SALT: &[u8] = b"aeon-pages-session-v1";

/// Where the derivation secret comes from.
#[derive(Debug, Clone)]
pub enum KeySource {
	/// A UCAN-style signing key byte string, scoped by `user_id`.
	Ucan { secret: Vec<u8>, user_id: String },
	/// Fallback: the session identifier itself is the derivation secret.
	Session { session_id: String },
}

/// Cache key: `(userId, context)` for UCAN-derived keys,
/// `(sessionId, context)` for session-derived keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CacheKey {
	Ucan { user_id: String, context: String },
	Session { session_id: String, context: String },
}

/// A derived 256-bit AES-GCM key. Wrapped in `Zeroizing` so it is wiped on
/// drop; the cache is the only place the key material lives, approximating
/// "non-extractable" for primitives that don't support it natively.
pub type DerivedKey = Zeroizing<[u8; 32]>;

/// Process-wide cache of derived keys, keyed by `(derivation-source, userId,
/// context)`. A `DashMap` gives lock-free concurrent reads without needing
/// a single coarse mutex around key derivation.
#[derive(Default)]
pub struct KeyCache {
	entries: DashMap<CacheKey, DerivedKey>,
}

impl KeyCache {
	pub fn new() -> Self {
		KeyCache { entries: DashMap::new() }
	}

	/// Derive (or fetch the cached) key for `source` scoped to `context`.
	pub fn derive(&self, source: &KeySource, context: &str) -> Result<DerivedKey, CryptoError> {
		let cache_key = match source {
			KeySource::Ucan { user_id, .. } => {
				CacheKey::Ucan { user_id: user_id.clone(), context: context.to_string() }
			}
			KeySource::Session { session_id } => {
				CacheKey::Session { session_id: session_id.clone(), context: context.to_string() }
			}
		};

		if let Some(existing) = self.entries.get(&cache_key) {
			return Ok(existing.clone());
		}

		let key = derive_key(source, context)?;
		self.entries.insert(cache_key, key.clone());
		Ok(key)
	}

	/// Remove all keys scoped to `user_id` — called on logout.
	pub fn remove_user(&self, user_id: &str) {
		self.entries.retain(|k, _| !matches!(k, CacheKey::Ucan { user_id: u, .. } if u == user_id));
	}

	/// Remove all keys scoped to a session.
	pub fn remove_session(&self, session_id: &str) {
		self.entries
			.retain(|k, _| !matches!(k, CacheKey::Session { session_id: s, .. } if s == session_id));
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

fn derive_key(source: &KeySource, context: &str) -> Result<DerivedKey, CryptoError> {
	let (salt, secret, info) = match source {
		KeySource::Ucan { secret, .. } => {
			(UCAN_SALT, secret.as_slice(), format!("aeon-offline-operation:{}", context))
		}
		KeySource::Session { session_id } => {
			(SESSION_SALT, session_id.as_bytes(), format!("aeon-session-operation:{}", context))
		}
	};

	if secret.is_empty() {
		return Err(CryptoError::KeyDerivationFailed {
			message: "derivation secret must not be empty".to_string(),
		});
	}

	let hkdf = Hkdf::<Sha256>::new(Some(salt), secret);
	let mut okm = [0u8; 32];
	hkdf.expand(info.as_bytes(), &mut okm).map_err(|e| CryptoError::KeyDerivationFailed {
		message: format!("HKDF expand failed: {}", e),
	})?;

	Ok(Zeroizing::new(okm))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn same_source_and_context_yields_same_key() {
		let cache = KeyCache::new();
		let source = KeySource::Session { session_id: "s1".to_string() };
		let a = cache.derive(&source, "test").unwrap();
		let b = cache.derive(&source, "test").unwrap();
		assert_eq!(*a, *b);
		assert_eq!(cache.len(), 1);
	}

	#[test]
	fn different_context_yields_different_key() {
		let cache = KeyCache::new();
		let source = KeySource::Session { session_id: "s1".to_string() };
		let a = cache.derive(&source, "ctx-a").unwrap();
		let b = cache.derive(&source, "ctx-b").unwrap();
		assert_ne!(*a, *b);
	}

	#[test]
	fn ucan_and_session_sources_diverge() {
		let cache = KeyCache::new();
		let ucan = KeySource::Ucan { secret: b"same-bytes".to_vec(), user_id: "u1".to_string() };
		let session = KeySource::Session { session_id: "same-bytes".to_string() };
		let a = cache.derive(&ucan, "ctx").unwrap();
		let b = cache.derive(&session, "ctx").unwrap();
		assert_ne!(*a, *b, "distinct salts must produce distinct keys even with similar secrets");
	}

	#[test]
	fn remove_user_evicts_only_that_user() {
		let cache = KeyCache::new();
		cache.derive(&KeySource::Ucan { secret: b"k".to_vec(), user_id: "u1".to_string() }, "c").unwrap();
		cache.derive(&KeySource::Ucan { secret: b"k".to_vec(), user_id: "u2".to_string() }, "c").unwrap();
		cache.remove_user("u1");
		assert_eq!(cache.len(), 1);
	}
}

// vim: ts=4
