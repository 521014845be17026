//! TacMap Deterministic Simulation Harness
//!
//! Runs the fusion engine against a seeded ground truth and a hostile feed.
//!
//! # Core Principle: Two Engines, One Truth
//!
//! Every source of non-determinism is derived from a single 64-bit seed:
//! - **Time**: `SimContext` holds a virtual clock that only moves when told
//! - **Delivery**: `ChaosDelivery` delays, duplicates and corrupts batches
//! - **Physics**: `Oracle` flies the aircraft and emits opcode records
//!
//! A reference engine sees the oracle's batches in order. The engine under
//! test sees what the chaotic feed delivers. After a final full sync both
//! must publish the same snapshot.
//!
//! ```text
//!   Oracle ──records──► reference engine (in order, once)
//!     │
//!     └──► ChaosDelivery ──envelopes──► engine under test
//!                                            │
//!                      compare snapshots ◄───┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use tacmap_sim::{ScenarioRunner, ScenarioId};
//!
//! let result = ScenarioRunner::new(42).with_duration(30.0).run(ScenarioId::Reorder);
//! assert!(result.passed);
//! ```

mod context;
pub mod delivery;
pub mod exporter;
mod oracle;
pub mod runner;
pub mod scenarios;

pub use context::SimContext;
pub use delivery::{ChaosDelivery, DeliveryConfig, DeliveryStats, ScriptedSource};
pub use exporter::{SimEvent, SimExport, SimFrame, TruthPosition};
pub use oracle::{GroundTruthEntity, Oracle};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use scenarios::{ScenarioId, ScenarioSetup};
