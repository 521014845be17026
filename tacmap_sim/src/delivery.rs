//! Simulated feed delivery with fault injection.
//!
//! Batches are stamped with an emission time and delivered at emission time
//! plus a random delay, so a large jitter reorders them. Duplication and
//! corruption add extra envelopes; nothing is ever lost.

use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

use tacmap_core::Record;
use tacmap_env::{BatchEnvelope, BatchSource, FeedId};

use crate::context::SimContext;

/// Fault profile for one feed.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryConfig {
    /// Delivery delay standard deviation in milliseconds (0 = in order)
    pub jitter_ms: f64,

    /// Probability that a batch is delivered twice
    pub duplicate_rate: f64,

    /// Probability that a batch carries garbage alongside its records
    pub corrupt_rate: f64,
}

impl DeliveryConfig {
    /// Perfect feed: in order, exactly once, clean.
    pub fn in_order() -> Self {
        Self {
            jitter_ms: 0.0,
            duplicate_rate: 0.0,
            corrupt_rate: 0.0,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self::in_order()
    }
}

/// Counters kept by `ChaosDelivery`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub submitted: u64,
    pub delivered: u64,
    pub duplicated: u64,
    pub corrupted: u64,
    /// Delivered after a batch emitted later than it
    pub reordered: u64,
}

/// Scheduler that turns emitted batches into envelopes in arrival order.
pub struct ChaosDelivery {
    config: DeliveryConfig,
    rng: ChaCha8Rng,
    jitter: Option<Normal<f64>>,
    feed: FeedId,
    next_sequence: u64,
    in_flight: Vec<BatchEnvelope>,
    highest_delivered: Option<u64>,
    stats: DeliveryStats,
}

impl ChaosDelivery {
    pub fn new(seed: u64, feed: FeedId, config: DeliveryConfig) -> Self {
        let jitter = if config.jitter_ms > 0.0 {
            Normal::new(0.0, config.jitter_ms).ok()
        } else {
            None
        };
        Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
            jitter,
            feed,
            next_sequence: 0,
            in_flight: Vec::new(),
            highest_delivered: None,
            stats: DeliveryStats::default(),
        }
    }

    pub fn stats(&self) -> &DeliveryStats {
        &self.stats
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn delay_ms(&mut self) -> u64 {
        match &self.jitter {
            Some(normal) => normal.sample(&mut self.rng).abs().round() as u64,
            None => 0,
        }
    }

    /// Schedules one emitted batch.
    pub fn submit(&mut self, emitted_ms: u64, records: &[Record]) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.stats.submitted += 1;

        let mut elements: Vec<Value> = records.iter().filter_map(Record::to_value).collect();

        if self.rng.gen_bool(self.config.corrupt_rate.clamp(0.0, 1.0)) {
            self.stats.corrupted += 1;
            if self.rng.gen_bool(0.5) {
                elements.extend(garbage_elements());
            } else {
                // A separate undecodable envelope alongside the real one
                let payload = Value::Array(elements.clone()).to_string().into_bytes();
                let cut = payload.len() / 2;
                let delay = self.delay_ms();
                self.in_flight.push(BatchEnvelope::new(
                    self.feed,
                    sequence,
                    payload[..cut].to_vec(),
                    emitted_ms + delay,
                ));
            }
        }

        let payload = Value::Array(elements).to_string().into_bytes();

        if self.rng.gen_bool(self.config.duplicate_rate.clamp(0.0, 1.0)) {
            self.stats.duplicated += 1;
            let delay = self.delay_ms();
            self.in_flight
                .push(BatchEnvelope::new(self.feed, sequence, payload.clone(), emitted_ms + delay));
        }

        let delay = self.delay_ms();
        self.in_flight
            .push(BatchEnvelope::new(self.feed, sequence, payload, emitted_ms + delay));
    }

    /// Envelopes that have arrived by `now_ms`, in arrival order.
    pub fn drain_until(&mut self, now_ms: u64) -> Vec<BatchEnvelope> {
        let (mut arrived, pending): (Vec<_>, Vec<_>) =
            self.in_flight.drain(..).partition(|e| e.received_ms <= now_ms);
        self.in_flight = pending;

        arrived.sort_by_key(|e| (e.received_ms, e.sequence));
        for envelope in &arrived {
            self.stats.delivered += 1;
            match self.highest_delivered {
                Some(highest) if envelope.sequence < highest => self.stats.reordered += 1,
                Some(highest) => self.highest_delivered = Some(highest.max(envelope.sequence)),
                None => self.highest_delivered = Some(envelope.sequence),
            }
        }
        arrived
    }

    /// Everything still in flight, in arrival order.
    pub fn drain_all(&mut self) -> Vec<BatchEnvelope> {
        self.drain_until(u64::MAX)
    }

    /// Envelope for a batch that bypasses the fault profile.
    pub fn clean_envelope(&mut self, emitted_ms: u64, records: &[Record]) -> BatchEnvelope {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.stats.submitted += 1;
        self.stats.delivered += 1;
        BatchEnvelope::new(self.feed, sequence, tacmap_core::encode_batch(records), emitted_ms)
    }
}

/// Elements no well-behaved feed sends.
fn garbage_elements() -> Vec<Value> {
    vec![
        json!({"opcode": 150, "globalId": 1}),
        json!({"opcode": 101, "globalId": 7, "latitude": "north", "longitude": 0.0}),
        json!({"opcode": 104, "globalId": 8, "latitude": 123.0, "longitude": 0.0}),
        json!({"globalId": 9}),
    ]
}

/// A `BatchSource` that replays a fixed list of envelopes.
///
/// With a clock attached, virtual time follows each envelope's arrival.
pub struct ScriptedSource {
    name: String,
    queue: Mutex<VecDeque<BatchEnvelope>>,
    clock: Option<Arc<SimContext>>,
}

impl ScriptedSource {
    pub fn new(name: impl Into<String>, envelopes: Vec<BatchEnvelope>) -> Self {
        Self {
            name: name.into(),
            queue: Mutex::new(envelopes.into()),
            clock: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<SimContext>) -> Self {
        self.clock = Some(clock);
        self
    }
}

#[async_trait]
impl BatchSource for ScriptedSource {
    async fn recv(&self) -> Option<BatchEnvelope> {
        let envelope = self.queue.lock().await.pop_front()?;
        if let Some(clock) = &self.clock {
            clock.advance_to(envelope.received_ms * 1_000_000);
        }
        Some(envelope)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
