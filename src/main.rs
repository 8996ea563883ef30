//! CLI demo: exercises the queue, resolver and coordinator against an
//! in-memory transport, wired the way a host application would.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use aeon_sync::config::Config;
use aeon_sync::conflict::resolver::ConflictInput;
use aeon_sync::conflict::ConflictResolver;
use aeon_sync::crypto::keys::KeySource;
use aeon_sync::crypto::OperationCrypto;
use aeon_sync::events::{Event, EventBus, Topic};
use aeon_sync::logging::{self, info};
use aeon_sync::operation::{EnqueueRequest, OperationType, Priority};
use aeon_sync::queue::EncryptedQueue;
use aeon_sync::sync::SyncCoordinator;

#[derive(Parser)]
#[command(name = "aeon-sync", about = "Offline-first operation queue and sync subsystem demo")]
struct Cli {
	/// Path to a TOML configuration file.
	#[arg(long)]
	config: Option<PathBuf>,

	/// Session id operations are scoped under.
	#[arg(long, default_value = "demo-session")]
	session: String,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Enqueue a single operation and print its resulting record.
	Enqueue {
		#[arg(long, default_value = "update")]
		op_type: String,
		#[arg(long, default_value = "normal")]
		priority: String,
		#[arg(long)]
		value: Option<String>,
	},
	/// Enqueue a few sample operations, assemble a batch, and print stats.
	Demo,
}

fn parse_operation_type(s: &str) -> OperationType {
	match s {
		"create" => OperationType::Create,
		"update" => OperationType::Update,
		"delete" => OperationType::Delete,
		"session_update" => OperationType::SessionUpdate,
		"tree_update" => OperationType::TreeUpdate,
		"data_update" => OperationType::DataUpdate,
		"presence_update" => OperationType::PresenceUpdate,
		other => OperationType::Custom(other.to_string()),
	}
}

fn parse_priority(s: &str) -> Priority {
	match s {
		"high" => Priority::High,
		"low" => Priority::Low,
		_ => Priority::Normal,
	}
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	logging::init_tracing();
	let cli = Cli::parse();

	let mut config = match &cli.config {
		Some(path) => Config::from_toml_file(path)?,
		None => Config::default(),
	};
	config.apply_env_overrides();

	let events = Arc::new(EventBus::new());
	events.subscribe(Topic::All, |event: &Event| {
		info!("event: {:?}", event);
	});

	let crypto = Arc::new(OperationCrypto::new());
	let key_source = KeySource::Session { session_id: cli.session.clone() };
	let queue =
		EncryptedQueue::new(config.queue.clone(), crypto, key_source, events.clone());
	let resolver = ConflictResolver::new(
		config.resolver.default_strategy,
		config.resolver.enable_auto_merge,
		config.resolver.enable_local_wins,
		config.resolver.merge_threshold,
		config.resolver.max_conflict_cache_size,
		events.clone(),
	);
	let coordinator = SyncCoordinator::new(config.coordinator.clone(), events.clone());

	match cli.command {
		Command::Enqueue { op_type, priority, value } => {
			let mut data = HashMap::new();
			if let Some(v) = value {
				data.insert("value".to_string(), serde_json::json!(v));
			}
			let req = EnqueueRequest::new(parse_operation_type(&op_type), cli.session.clone())
				.with_data(data)
				.with_priority(parse_priority(&priority));
			let id = queue.enqueue(req).await?;
			let op = queue.get(&id).expect("just-enqueued operation must be present");
			println!("enqueued {} ({} bytes, priority {:?})", op.id, op.bytes_size, op.priority);
		}
		Command::Demo => {
			for (op_type, priority, value) in [
				(OperationType::Update, Priority::High, "urgent-edit"),
				(OperationType::Update, Priority::Normal, "routine-edit"),
				(OperationType::PresenceUpdate, Priority::Low, "cursor-move"),
			] {
				let mut data = HashMap::new();
				data.insert("value".to_string(), serde_json::json!(value));
				let req = EnqueueRequest::new(op_type, cli.session.clone())
					.with_data(data)
					.with_priority(priority);
				queue.enqueue(req).await?;
			}

			let candidates = queue.next_batch_candidates(10, 1024 * 1024);
			let batch_id = coordinator.create_sync_batch(candidates);
			coordinator.start_sync_batch(&batch_id)?;

			let stats = queue.stats();
			println!(
				"queue: {} pending, {} syncing, {} bytes total",
				stats.pending, stats.syncing, stats.total_bytes
			);
			println!("assembled batch {}", batch_id);

			let mut local_data = HashMap::new();
			local_data.insert("value".to_string(), serde_json::json!("urgent-edit"));
			let mut remote_data = HashMap::new();
			remote_data.insert("value".to_string(), serde_json::json!("server-edit"));
			let input = ConflictInput {
				operation_id: "demo-op",
				session_id_local: &cli.session,
				session_id_remote: &cli.session,
				local_type: &OperationType::Update,
				remote_type: &OperationType::Update,
				local_data: &local_data,
				remote_data: &remote_data,
			};
			if let Some(conflict) = resolver.detect("demo-conflict", &input, 0)? {
				match &conflict.resolution {
					Some(resolution) => println!(
						"detected {:?} conflict, auto-resolved via {:?}",
						conflict.conflict_type, resolution.strategy
					),
					None => println!(
						"detected {:?} conflict (severity {:?}), awaiting manual resolution",
						conflict.conflict_type, conflict.severity
					),
				}
			}
		}
	}

	Ok(())
}

// vim: ts=4
