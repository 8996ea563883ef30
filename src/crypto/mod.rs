//! Crypto core: HKDF-SHA256 key derivation plus AES-256-GCM authenticated
//! encryption of individual operations and batched payloads.
//!
//! Suspension points only: this is modelled as `async fn` even though
//! AES-GCM and HKDF complete synchronously, so the rest of the crate can
//! treat crypto, storage and transport uniformly as the three places
//! execution may yield.

pub mod keys;

pub use keys::{DerivedKey, KeyCache, KeySource};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::CryptoError;
use crate::operation::{CanonicalOperationFields, Operation};

/// Current on-disk/wire encryption version.
pub const ENCRYPTION_VERSION: u8 = 1;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
/// Minimum valid frame: 1 version byte + 12 nonce bytes + 16 tag bytes,
/// with zero bytes of actual ciphertext. Anything shorter is rejected.
const MIN_FRAME_LEN: usize = 1 + NONCE_LEN + TAG_LEN;

/// `[version:1 byte | nonce:12 bytes | ciphertext+tag:N]`.
pub struct EncryptedFrame(Vec<u8>);

impl EncryptedFrame {
	pub fn into_bytes(self) -> Vec<u8> {
		self.0
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	/// Parse and validate framing without decrypting. Exposed so the queue
	/// can measure `bytes_size` without holding a key.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

/// The batch envelope: a structured value rather than a single byte frame
/// — `version` is a field, not a leading byte.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedBatchEnvelope {
	pub version: u8,
	#[serde(with = "base64_bytes")]
	pub nonce: Vec<u8>,
	#[serde(with = "base64_bytes")]
	pub ciphertext: Vec<u8>,
}

mod base64_bytes {
	use base64::engine::general_purpose::STANDARD;
	use base64::Engine;
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
		s.serialize_str(&STANDARD.encode(bytes))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
		let s = String::deserialize(d)?;
		STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
	}
}

/// Document encrypted for a batch transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPlaintext {
	pub operations: Vec<CanonicalOperationFields>,
	pub timestamp: u64,
	pub user_id: String,
}

/// Estimate the encrypted size of a JSON plaintext without performing the
/// encryption: `len(JSON) + 1 (version) + 12 (nonce) + 16 (tag) + 16 (slack)`.
pub fn estimate_encrypted_size(plaintext_json_len: usize) -> u64 {
	(plaintext_json_len + 1 + NONCE_LEN + TAG_LEN + 16) as u64
}

/// Encrypt/decrypt operations and batches under keys drawn from a shared
/// `KeyCache`.
pub struct OperationCrypto {
	cache: KeyCache,
}

impl Default for OperationCrypto {
	fn default() -> Self {
		Self::new()
	}
}

impl OperationCrypto {
	pub fn new() -> Self {
		OperationCrypto { cache: KeyCache::new() }
	}

	pub fn key_cache(&self) -> &KeyCache {
		&self.cache
	}

	/// Encrypt the canonical field subset of `op` under the key derived
	/// from `source` scoped to `context`.
	pub async fn encrypt_operation(
		&self,
		op: &Operation,
		source: &KeySource,
		context: &str,
	) -> Result<EncryptedFrame, CryptoError> {
		let key = self.cache.derive(source, context)?;
		let fields = CanonicalOperationFields::from(op);
		let plaintext = serde_json::to_vec(&fields).map_err(|e| CryptoError::MalformedFraming {
			message: format!("failed to serialize canonical fields: {}", e),
		})?;

		let cipher = Aes256Gcm::new_from_slice(key.as_slice()).map_err(|e| {
			CryptoError::KeyDerivationFailed { message: format!("invalid key length: {}", e) }
		})?;

		let mut nonce_bytes = [0u8; NONCE_LEN];
		rand::thread_rng().fill_bytes(&mut nonce_bytes);
		let nonce = Nonce::from_slice(&nonce_bytes);

		let ciphertext = cipher
			.encrypt(nonce, plaintext.as_slice())
			.map_err(|_| CryptoError::AuthenticationFailed)?;

		let mut framed = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
		framed.push(ENCRYPTION_VERSION);
		framed.extend_from_slice(&nonce_bytes);
		framed.extend_from_slice(&ciphertext);

		Ok(EncryptedFrame(framed))
	}

	/// Decrypt a frame produced by `encrypt_operation`, reversing the framing
	/// step by step and rejecting malformed/tampered input.
	pub async fn decrypt_operation(
		&self,
		frame: &[u8],
		source: &KeySource,
		context: &str,
	) -> Result<CanonicalOperationFields, CryptoError> {
		if frame.len() < MIN_FRAME_LEN {
			return Err(CryptoError::MalformedFraming {
				message: format!("frame is {} bytes, minimum is {}", frame.len(), MIN_FRAME_LEN),
			});
		}

		let version = frame[0];
		if version != ENCRYPTION_VERSION {
			return Err(CryptoError::UnsupportedVersion { found: version });
		}

		let nonce_bytes = &frame[1..1 + NONCE_LEN];
		let ciphertext = &frame[1 + NONCE_LEN..];

		let key = self.cache.derive(source, context)?;
		let cipher = Aes256Gcm::new_from_slice(key.as_slice()).map_err(|e| {
			CryptoError::KeyDerivationFailed { message: format!("invalid key length: {}", e) }
		})?;
		let nonce = Nonce::from_slice(nonce_bytes);

		let plaintext =
			cipher.decrypt(nonce, ciphertext).map_err(|_| CryptoError::AuthenticationFailed)?;

		serde_json::from_slice(&plaintext).map_err(|_| CryptoError::AuthenticationFailed)
	}

	/// Encrypt a batch document.
	pub async fn encrypt_batch(
		&self,
		plaintext: &BatchPlaintext,
		source: &KeySource,
		context: &str,
	) -> Result<EncryptedBatchEnvelope, CryptoError> {
		let key = self.cache.derive(source, context)?;
		let json = serde_json::to_vec(plaintext).map_err(|e| CryptoError::MalformedFraming {
			message: format!("failed to serialize batch plaintext: {}", e),
		})?;

		let cipher = Aes256Gcm::new_from_slice(key.as_slice()).map_err(|e| {
			CryptoError::KeyDerivationFailed { message: format!("invalid key length: {}", e) }
		})?;

		let mut nonce_bytes = [0u8; NONCE_LEN];
		rand::thread_rng().fill_bytes(&mut nonce_bytes);
		let nonce = Nonce::from_slice(&nonce_bytes);

		let ciphertext =
			cipher.encrypt(nonce, json.as_slice()).map_err(|_| CryptoError::AuthenticationFailed)?;

		Ok(EncryptedBatchEnvelope {
			version: ENCRYPTION_VERSION,
			nonce: nonce_bytes.to_vec(),
			ciphertext,
		})
	}

	/// Decrypt a batch envelope.
	pub async fn decrypt_batch(
		&self,
		envelope: &EncryptedBatchEnvelope,
		source: &KeySource,
		context: &str,
	) -> Result<BatchPlaintext, CryptoError> {
		if envelope.version != ENCRYPTION_VERSION {
			return Err(CryptoError::UnsupportedVersion { found: envelope.version });
		}
		if envelope.nonce.len() != NONCE_LEN {
			return Err(CryptoError::MalformedFraming {
				message: format!("nonce is {} bytes, expected {}", envelope.nonce.len(), NONCE_LEN),
			});
		}

		let key = self.cache.derive(source, context)?;
		let cipher = Aes256Gcm::new_from_slice(key.as_slice()).map_err(|e| {
			CryptoError::KeyDerivationFailed { message: format!("invalid key length: {}", e) }
		})?;
		let nonce = Nonce::from_slice(&envelope.nonce);

		let plaintext = cipher
			.decrypt(nonce, envelope.ciphertext.as_slice())
			.map_err(|_| CryptoError::AuthenticationFailed)?;

		serde_json::from_slice(&plaintext).map_err(|_| CryptoError::AuthenticationFailed)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::operation::{OperationStatus, OperationType, Priority};
	use std::collections::HashMap;

	fn sample_operation() -> Operation {
		let mut data = HashMap::new();
		data.insert("value".to_string(), serde_json::json!("x"));
		Operation {
			id: "op_1_1".to_string(),
			op_type: OperationType::Update,
			session_id: "s1".to_string(),
			status: OperationStatus::Pending,
			priority: Priority::Normal,
			data,
			encrypted_data: None,
			encryption_version: 1,
			bytes_size: 0,
			created_at: 1000,
			synced_at: None,
			retry_count: 0,
			max_retries: 5,
			failed_count: 0,
			last_error: None,
		}
	}

	fn session_source(session_id: &str) -> KeySource {
		KeySource::Session { session_id: session_id.to_string() }
	}

	#[tokio::test]
	async fn roundtrip_preserves_canonical_fields() {
		let crypto = OperationCrypto::new();
		let op = sample_operation();
		let source = session_source("s1");

		let frame = crypto.encrypt_operation(&op, &source, "test").await.unwrap();
		assert_eq!(frame.as_bytes()[0], ENCRYPTION_VERSION);
		assert!(frame.len() >= MIN_FRAME_LEN);

		let decrypted = crypto.decrypt_operation(frame.as_bytes(), &source, "test").await.unwrap();
		assert_eq!(decrypted, CanonicalOperationFields::from(&op));
	}

	#[tokio::test]
	async fn decrypting_with_wrong_key_fails_authentication() {
		let crypto = OperationCrypto::new();
		let op = sample_operation();
		let frame = crypto.encrypt_operation(&op, &session_source("s1"), "test").await.unwrap();

		let err = crypto
			.decrypt_operation(frame.as_bytes(), &session_source("s2"), "test")
			.await
			.unwrap_err();
		assert_eq!(err, CryptoError::AuthenticationFailed);
	}

	#[tokio::test]
	async fn successive_encryptions_are_distinct() {
		let crypto = OperationCrypto::new();
		let op = sample_operation();
		let source = session_source("s1");
		let a = crypto.encrypt_operation(&op, &source, "test").await.unwrap();
		let b = crypto.encrypt_operation(&op, &source, "test").await.unwrap();
		assert_ne!(a.as_bytes(), b.as_bytes());
	}

	#[tokio::test]
	async fn tampering_any_ciphertext_byte_breaks_authentication() {
		let crypto = OperationCrypto::new();
		let op = sample_operation();
		let source = session_source("s1");
		let frame = crypto.encrypt_operation(&op, &source, "test").await.unwrap();
		let mut bytes = frame.into_bytes();
		let last = bytes.len() - 1;
		bytes[last] ^= 0xFF;

		let err = crypto.decrypt_operation(&bytes, &source, "test").await.unwrap_err();
		assert_eq!(err, CryptoError::AuthenticationFailed);
	}

	#[tokio::test]
	async fn short_buffer_is_rejected_as_malformed() {
		let crypto = OperationCrypto::new();
		let source = session_source("s1");
		let err = crypto.decrypt_operation(&[1u8; 10], &source, "test").await.unwrap_err();
		assert!(matches!(err, CryptoError::MalformedFraming { .. }));
	}

	#[tokio::test]
	async fn wrong_version_byte_is_rejected() {
		let crypto = OperationCrypto::new();
		let op = sample_operation();
		let source = session_source("s1");
		let frame = crypto.encrypt_operation(&op, &source, "test").await.unwrap();
		let mut bytes = frame.into_bytes();
		bytes[0] = 2;
		let err = crypto.decrypt_operation(&bytes, &source, "test").await.unwrap_err();
		assert_eq!(err, CryptoError::UnsupportedVersion { found: 2 });
	}

	#[tokio::test]
	async fn batch_roundtrip() {
		let crypto = OperationCrypto::new();
		let op = sample_operation();
		let plaintext = BatchPlaintext {
			operations: vec![CanonicalOperationFields::from(&op)],
			timestamp: 1234,
			user_id: "u1".to_string(),
		};
		let source = session_source("s1");
		let envelope = crypto.encrypt_batch(&plaintext, &source, "batch").await.unwrap();
		assert_eq!(envelope.version, ENCRYPTION_VERSION);
		assert_eq!(envelope.nonce.len(), NONCE_LEN);

		let decrypted = crypto.decrypt_batch(&envelope, &source, "batch").await.unwrap();
		assert_eq!(decrypted.user_id, plaintext.user_id);
		assert_eq!(decrypted.operations.len(), 1);
	}

	#[test]
	fn size_estimate_accounts_for_framing_overhead() {
		let estimate = estimate_encrypted_size(100);
		assert_eq!(estimate, 100 + 1 + 12 + 16 + 16);
	}
}

// vim: ts=4
