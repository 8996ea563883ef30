//! `StorageAdapter` contract plus a `redb`-backed reference implementation
//! (a single `TableDefinition` holding bincode-encoded values).

use async_trait::async_trait;
use redb::{ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// One persisted queue entry: the encrypted bytes plus the metadata
/// needed to reconstruct status/retry bookkeeping on restore. Logically a
/// `(id, encrypted_bytes, metadata_json)` triple; a keyed table serves
/// that contract without needing an explicit length-prefixed encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedRecord {
	pub id: String,
	pub encrypted_data: Vec<u8>,
	pub metadata_json: String,
}

/// `snapshot`, `restore`, `delete` — modelled as `async fn` even where an
/// implementation (like the `redb` one below) completes synchronously
/// underneath, so the queue can treat storage as a suspension point
/// uniformly with crypto and transport.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
	async fn snapshot(&self, records: Vec<PersistedRecord>) -> Result<(), SyncError>;
	async fn restore(&self) -> Result<Vec<PersistedRecord>, SyncError>;
	async fn delete(&self, id: &str) -> Result<(), SyncError>;
}

const RECORDS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("queue_records");

fn storage_err(message: &str, source: impl std::error::Error + Send + Sync + 'static) -> SyncError {
	SyncError::Storage { message: message.to_string(), source: Box::new(source) }
}

/// Reference `StorageAdapter` over a single `redb` table keyed by
/// operation id, values bincode-encoded `(encrypted_data, metadata_json)`
/// pairs.
pub struct RedbStorageAdapter {
	db: redb::Database,
}

impl RedbStorageAdapter {
	pub fn open(path: &std::path::Path) -> Result<Self, SyncError> {
		let db = redb::Database::create(path).map_err(|e| storage_err("opening redb database", e))?;
		{
			let write_txn = db.begin_write().map_err(|e| storage_err("beginning write txn", e))?;
			{
				write_txn.open_table(RECORDS_TABLE).map_err(|e| storage_err("opening table", e))?;
			}
			write_txn.commit().map_err(|e| storage_err("committing table creation", e))?;
		}
		Ok(RedbStorageAdapter { db })
	}
}

#[async_trait]
impl StorageAdapter for RedbStorageAdapter {
	async fn snapshot(&self, records: Vec<PersistedRecord>) -> Result<(), SyncError> {
		let write_txn = self.db.begin_write().map_err(|e| storage_err("beginning write txn", e))?;
		{
			let mut table = write_txn.open_table(RECORDS_TABLE).map_err(|e| storage_err("opening table", e))?;
			for record in &records {
				let bytes = bincode::serialize(&(&record.encrypted_data, &record.metadata_json))
					.map_err(|e| storage_err("encoding record", e))?;
				table.insert(record.id.as_str(), bytes.as_slice()).map_err(|e| storage_err("inserting record", e))?;
			}
		}
		write_txn.commit().map_err(|e| storage_err("committing snapshot", e))?;
		Ok(())
	}

	async fn restore(&self) -> Result<Vec<PersistedRecord>, SyncError> {
		let read_txn = self.db.begin_read().map_err(|e| storage_err("beginning read txn", e))?;
		let table = read_txn.open_table(RECORDS_TABLE).map_err(|e| storage_err("opening table", e))?;

		let mut out = Vec::new();
		let mut iter = table.iter().map_err(|e| storage_err("iterating table", e))?;
		while let Some(entry) = iter.next() {
			let (key, value) = entry.map_err(|e| storage_err("reading entry", e))?;
			let id = key.value().to_string();
			let bytes = value.value().to_vec();
			let (encrypted_data, metadata_json): (Vec<u8>, String) =
				bincode::deserialize(&bytes).map_err(|e| storage_err("decoding record", e))?;
			out.push(PersistedRecord { id, encrypted_data, metadata_json });
		}
		Ok(out)
	}

	async fn delete(&self, id: &str) -> Result<(), SyncError> {
		let write_txn = self.db.begin_write().map_err(|e| storage_err("beginning write txn", e))?;
		{
			let mut table = write_txn.open_table(RECORDS_TABLE).map_err(|e| storage_err("opening table", e))?;
			table.remove(id).map_err(|e| storage_err("removing record", e))?;
		}
		write_txn.commit().map_err(|e| storage_err("committing delete", e))?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn record(id: &str) -> PersistedRecord {
		PersistedRecord {
			id: id.to_string(),
			encrypted_data: vec![1, 2, 3],
			metadata_json: "{}".to_string(),
		}
	}

	#[tokio::test]
	async fn snapshot_then_restore_round_trips() {
		let tmp = TempDir::new().unwrap();
		let adapter = RedbStorageAdapter::open(&tmp.path().join("queue.redb")).unwrap();
		adapter.snapshot(vec![record("a"), record("b")]).await.unwrap();

		let restored = adapter.restore().await.unwrap();
		assert_eq!(restored.len(), 2);
	}

	#[tokio::test]
	async fn delete_removes_a_single_record() {
		let tmp = TempDir::new().unwrap();
		let adapter = RedbStorageAdapter::open(&tmp.path().join("queue.redb")).unwrap();
		adapter.snapshot(vec![record("a"), record("b")]).await.unwrap();
		adapter.delete("a").await.unwrap();

		let restored = adapter.restore().await.unwrap();
		assert_eq!(restored.len(), 1);
		assert_eq!(restored[0].id, "b");
	}
}

// vim: ts=4
