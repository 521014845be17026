//! Fusion Service - single-writer runtime around `FusionEngine`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   BatchEnvelope   ┌──────────────────────────┐
//! │ BatchSource  │ ────────────────► │      FusionService       │
//! └──────────────┘                   │  ┌────────────────────┐  │  Arc<Snapshot>  ┌────────────────┐
//! ┌──────────────┐   Command (mpsc)  │  │    FusionEngine    │  │ ──────────────► │ SnapshotReader │
//! │ FusionHandle │ ────────────────► │  └────────────────────┘  │     (watch)     └────────────────┘
//! └──────────────┘                   └──────────────────────────┘
//! ```
//!
//! The service task is the only writer. Every batch or command is applied
//! to completion, then a fresh snapshot is published. Readers never block
//! the writer. The loop ends once both the source and every handle are gone.

use std::sync::Arc;

use tacmap_env::{BatchEnvelope, BatchSource, FusionContext};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::engine::FusionEngine;
use crate::entity::GlobalId;
use crate::error::FusionError;
use crate::record::decode_batch;
use crate::report::IngestReport;
use crate::snapshot::Snapshot;

/// Operator actions routed to the writer task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Lock(GlobalId),
    Execute(GlobalId),
    LayerReady,
}

/// Configuration for the service loop.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Logical name used in logs (default: "tacmap-fusion")
    pub name: String,

    /// Command channel capacity (default: 64)
    pub command_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "tacmap-fusion".to_string(),
            command_capacity: 64,
        }
    }
}

/// Sends operator commands to a running service.
#[derive(Debug, Clone)]
pub struct FusionHandle {
    commands: mpsc::Sender<Command>,
}

impl FusionHandle {
    pub async fn send(&self, command: Command) -> Result<(), FusionError> {
        self.commands.send(command).await.map_err(|_| FusionError::ServiceClosed)
    }

    pub async fn lock(&self, id: GlobalId) -> Result<(), FusionError> {
        self.send(Command::Lock(id)).await
    }

    pub async fn execute(&self, id: GlobalId) -> Result<(), FusionError> {
        self.send(Command::Execute(id)).await
    }

    pub async fn mark_layer_ready(&self) -> Result<(), FusionError> {
        self.send(Command::LayerReady).await
    }
}

/// Read side: the latest published snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    rx: watch::Receiver<Arc<Snapshot>>,
}

impl SnapshotReader {
    pub fn latest(&self) -> Arc<Snapshot> {
        self.rx.borrow().clone()
    }

    /// Waits for the next published snapshot.
    pub async fn changed(&mut self) -> Result<Arc<Snapshot>, FusionError> {
        self.rx.changed().await.map_err(|_| FusionError::ServiceClosed)?;
        Ok(self.rx.borrow_and_update().clone())
    }

    /// Waits until a snapshot satisfies `predicate`.
    pub async fn wait_for<F>(&mut self, mut predicate: F) -> Result<Arc<Snapshot>, FusionError>
    where
        F: FnMut(&Snapshot) -> bool,
    {
        let snapshot = self
            .rx
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| FusionError::ServiceClosed)?;
        Ok(snapshot.clone())
    }
}

enum Event {
    Batch(Option<BatchEnvelope>),
    Command(Option<Command>),
}

/// The writer task.
///
/// Generic over the context and source, so the same loop runs against
/// tokio in production and the virtual clock in the simulator.
pub struct FusionService<Ctx, Src>
where
    Ctx: FusionContext,
    Src: BatchSource,
{
    pub context: Arc<Ctx>,
    pub source: Arc<Src>,
    pub config: ServiceConfig,
    engine: FusionEngine,
    commands: mpsc::Receiver<Command>,
    snapshots: watch::Sender<Arc<Snapshot>>,
    batches_received: u64,
    batches_rejected: u64,
}

impl<Ctx, Src> FusionService<Ctx, Src>
where
    Ctx: FusionContext,
    Src: BatchSource,
{
    /// Creates the service and its handle and reader.
    pub fn new(
        context: Arc<Ctx>,
        source: Arc<Src>,
        engine: FusionEngine,
        config: ServiceConfig,
    ) -> (Self, FusionHandle, SnapshotReader) {
        let (command_tx, command_rx) = mpsc::channel(config.command_capacity.max(1));
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(engine.snapshot()));

        let service = Self {
            context,
            source,
            config,
            engine,
            commands: command_rx,
            snapshots: snapshot_tx,
            batches_received: 0,
            batches_rejected: 0,
        };
        (service, FusionHandle { commands: command_tx }, SnapshotReader { rx: snapshot_rx })
    }

    pub fn engine(&self) -> &FusionEngine {
        &self.engine
    }

    pub fn batches_received(&self) -> u64 {
        self.batches_received
    }

    pub fn batches_rejected(&self) -> u64 {
        self.batches_rejected
    }

    /// Decodes and ingests one envelope.
    ///
    /// Returns `None` when the payload is not a JSON array of records.
    pub fn handle_envelope(&mut self, envelope: BatchEnvelope) -> Option<IngestReport> {
        self.batches_received += 1;
        let records = match decode_batch(&envelope.payload) {
            Ok(records) => records,
            Err(e) => {
                self.batches_rejected += 1;
                warn!(
                    "[{}] Dropping batch {} from {}: {}",
                    self.config.name, envelope.sequence, envelope.feed, e
                );
                return None;
            }
        };

        let lag_ms = self.context.now_ms().saturating_sub(envelope.received_ms);
        debug!(
            "[{}] Batch {} from {}: {} records, {} bytes, lag {}ms",
            self.config.name,
            envelope.sequence,
            envelope.feed,
            records.len(),
            envelope.size(),
            lag_ms
        );

        let report = self.engine.ingest(&records);
        self.publish();
        Some(report)
    }

    pub fn handle_command(&mut self, command: Command) {
        match command {
            Command::Lock(id) => {
                self.engine.lock(id);
            }
            Command::Execute(id) => {
                self.engine.execute(id);
            }
            Command::LayerReady => {
                self.engine.mark_layer_ready();
            }
        }
        debug!("[{}] Applied {:?}", self.config.name, command);
        self.publish();
    }

    fn publish(&self) {
        self.snapshots.send_replace(Arc::new(self.engine.snapshot()));
    }

    /// Runs until the source and all handles are closed, then returns the engine.
    pub async fn run(mut self) -> FusionEngine {
        info!("[{}] Fusion service started on source '{}'", self.config.name, self.source.name());

        let source = self.source.clone();
        let mut source_open = true;
        let mut commands_open = true;

        while source_open || commands_open {
            let event = tokio::select! {
                envelope = source.recv(), if source_open => Event::Batch(envelope),
                command = self.commands.recv(), if commands_open => Event::Command(command),
            };

            match event {
                Event::Batch(Some(envelope)) => {
                    self.handle_envelope(envelope);
                }
                Event::Batch(None) => {
                    debug!("[{}] Source closed", self.config.name);
                    source_open = false;
                }
                Event::Command(Some(command)) => self.handle_command(command),
                Event::Command(None) => {
                    debug!("[{}] Command channel closed", self.config.name);
                    commands_open = false;
                }
            }
        }

        info!(
            "[{}] Fusion service stopped: {} batches ({} rejected), {} entities",
            self.config.name,
            self.batches_received,
            self.batches_rejected,
            self.engine.store().len()
        );
        self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{encode_batch, Record};
    use tacmap_env::{ChannelSource, FeedId, WallClock};

    fn envelope(sequence: u64, records: &[Record]) -> BatchEnvelope {
        BatchEnvelope::new(FeedId(1), sequence, encode_batch(records), 0)
    }

    #[test]
    fn test_service_config_default() {
        let config = ServiceConfig::default();
        assert_eq!(config.name, "tacmap-fusion");
        assert_eq!(config.command_capacity, 64);
    }

    #[tokio::test]
    async fn test_service_applies_batches_and_commands() {
        let (tx, source) = ChannelSource::new("test", 16);
        let (service, handle, mut reader) = FusionService::new(
            WallClock::shared(),
            Arc::new(source),
            FusionEngine::with_defaults(),
            ServiceConfig::default(),
        );
        let task = tokio::spawn(service.run());

        tx.send(envelope(1, &[Record::hostile(9, 1.0, 1.0)])).await.unwrap();
        handle.lock(9).await.unwrap();

        let snapshot = reader.wait_for(|s| s.is_locked(9) && s.entity(9).is_some()).await.unwrap();
        assert_eq!(snapshot.entities.len(), 1);

        handle.execute(9).await.unwrap();
        let snapshot = reader.wait_for(|s| s.is_executed(9)).await.unwrap();
        assert!(snapshot.entity(9).is_none());

        drop(tx);
        drop(handle);
        let engine = task.await.unwrap();
        assert!(engine.is_executed(9));
    }

    #[tokio::test]
    async fn test_service_drops_non_array_payload() {
        let (tx, source) = ChannelSource::new("test", 4);
        let (service, handle, _reader) = FusionService::new(
            WallClock::shared(),
            Arc::new(source),
            FusionEngine::with_defaults(),
            ServiceConfig::default(),
        );
        let task = tokio::spawn(service.run());

        tx.send(BatchEnvelope::new(FeedId(2), 1, b"{\"opcode\":101}".to_vec(), 0)).await.unwrap();
        tx.send(envelope(2, &[Record::friendly(1, 0.0, 0.0)])).await.unwrap();
        drop(tx);
        drop(handle);

        let engine = task.await.unwrap();
        assert_eq!(engine.store().len(), 1);
        assert_eq!(engine.batch_count(), 1);
    }

    #[tokio::test]
    async fn test_handle_reports_closed_service() {
        let (_tx, source) = ChannelSource::new("test", 1);
        let (service, handle, _reader) = FusionService::new(
            WallClock::shared(),
            Arc::new(source),
            FusionEngine::with_defaults(),
            ServiceConfig::default(),
        );
        drop(service);
        assert_eq!(handle.lock(1).await, Err(FusionError::ServiceClosed));
    }
}
