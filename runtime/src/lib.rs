//! # Cartstream Runtime
//!
//! The imperative pieces that drive the functional core over time:
//!
//! - [`generator`]: virtual clock and batch generator that walk the cart
//!   state machine through a backfill window and then an indefinite live
//!   period
//! - [`retry`]: fixed-interval retry policy used by reconnect loops
//! - [`liveness`]: ping/pong bookkeeping shared by both ends of a connection
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   Event    ┌─────────────┐   text frame   ┌────────┐
//! │  EventGenerator  ├───────────>│  mpsc chan  ├───────────────>│ client │──> broker
//! │ (virtual clock)  │  (bounded) └─────────────┘                └────────┘
//! └──────────────────┘
//! ```
//!
//! The generator and the transport run as separate tasks joined by a bounded
//! channel, so a reconnect delay only ever blocks the producer path.

pub mod generator;
pub mod liveness;
pub mod retry;

pub use generator::{Batch, EventGenerator, GeneratorConfig, GeneratorError, Phase, drive};
pub use liveness::{Liveness, LivenessCheck};
pub use retry::{RetryPolicy, retry_with_policy};
