//! Batch delivery abstraction between the transport and the fusion service.

use async_trait::async_trait;
use crate::types::BatchEnvelope;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// Abstraction for inbound record batches.
///
/// # Implementations
///
/// - **Production**: `ChannelSource`, fed by whatever IPC layer owns the socket
/// - **Simulation**: a scripted source that reorders/duplicates batches
///
/// ```text
/// Transport              BatchSource             FusionService
///   |-- push(batch) -------->|                          |
///   |                        |-- recv() -> envelope --->|
/// ```
#[async_trait]
pub trait BatchSource: Send + Sync + 'static {
    /// Receives the next batch.
    ///
    /// # Returns
    /// * `Some(envelope)` - A batch arrived
    /// * `None` - The source is exhausted or closed
    async fn recv(&self) -> Option<BatchEnvelope>;

    /// Short name used in log lines.
    fn name(&self) -> &str;
}

/// Channel-backed source: the transport side holds the `Sender`.
pub struct ChannelSource {
    name: String,
    rx: Mutex<mpsc::Receiver<BatchEnvelope>>,
}

impl ChannelSource {
    /// Creates a source plus the sender the transport pushes into.
    pub fn new(name: impl Into<String>, capacity: usize) -> (mpsc::Sender<BatchEnvelope>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        let source = Self {
            name: name.into(),
            rx: Mutex::new(rx),
        };
        (tx, source)
    }
}

#[async_trait]
impl BatchSource for ChannelSource {
    async fn recv(&self) -> Option<BatchEnvelope> {
        let mut rx = self.rx.lock().await;
        let envelope = rx.recv().await;
        if envelope.is_none() {
            debug!(source = %self.name, "batch channel closed");
        }
        envelope
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FeedId;

    #[tokio::test]
    async fn test_channel_source_delivers_in_order() {
        let (tx, source) = ChannelSource::new("ipc", 4);
        tx.send(BatchEnvelope::new(FeedId(1), 1, b"[]".to_vec(), 0)).await.unwrap();
        tx.send(BatchEnvelope::new(FeedId(1), 2, b"[]".to_vec(), 5)).await.unwrap();
        drop(tx);

        assert_eq!(source.recv().await.unwrap().sequence, 1);
        assert_eq!(source.recv().await.unwrap().sequence, 2);
        assert!(source.recv().await.is_none());
        assert_eq!(source.name(), "ipc");
    }
}
