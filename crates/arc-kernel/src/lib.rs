//! Side-arc engine kernel: definition registry, state-machine stepper,
//! cross-loop progression, resolution cost model, looper-only verifier,
//! conflict-aware scheduler, and the `LoopEngine` facade tying them
//! together.
//!
//! The kernel is synchronous and single-threaded: one loop is active at a
//! time per engine instance, all transitions are pure functions of explicit
//! inputs, and the only non-determinism is the injectable random source
//! used by stochastic triggers. Engine instances share nothing.

pub mod engine;
pub mod error;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod progression;
pub mod registry;
pub mod resolution;
pub mod rng;
pub mod scheduler;
pub mod stepper;
pub mod verifier;

pub use engine::LoopEngine;
pub use error::{EngineError, ValidationReport};
pub use registry::{ArcQuery, ArcRegistry};
pub use resolution::{CostModel, DefaultCostModel};
pub use rng::{FixedRandom, RandomSource, SeededRandom};
pub use verifier::{LooperVerification, ObservationSources};
