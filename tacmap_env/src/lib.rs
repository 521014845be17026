//! TacMap Environment Abstraction Layer
//!
//! This crate keeps the fusion service independent of how record batches
//! reach it and of which clock drives it. The same service code runs in
//! **Production** (tokio, IPC-fed channel) and in the **Scenario Harness**
//! (virtual clock, scripted delivery).
//!
//! # Example
//!
//! ```ignore
//! use tacmap_env::{BatchSource, ChannelSource, FusionContext, WallClock};
//!
//! let ctx = WallClock::shared();
//! let (tx, source) = ChannelSource::new("ipc", 64);
//! // transport task pushes BatchEnvelopes into `tx`,
//! // the fusion service drains `source`.
//! ```

mod context;
mod source;
mod types;
mod wall_clock;

pub use context::FusionContext;
pub use source::{BatchSource, ChannelSource};
pub use types::{BatchEnvelope, FeedId};
pub use wall_clock::WallClock;
