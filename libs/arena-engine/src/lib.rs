//! Harness synthesis and result reconciliation.
//!
//! A request flows through the modules in this order:
//! `signature` + `inference` → `synth` → `engine` (sandbox dispatch) →
//! `evaluator` (console reconciliation) → `executor` (run/submit workflows).

pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod inference;
pub mod pool;
pub mod signature;
pub mod synth;

#[cfg(test)]
mod harness_tests;

pub use engine::{Dispatcher, HttpSandboxClient, PollPolicy, RetryPolicy, SandboxClient};
pub use error::{EngineError, SandboxError, SynthesisError};
pub use evaluator::Reconciler;
pub use executor::{Executor, RunRequest, SubmitRequest};
pub use pool::{PoolError, WorkerPool};
pub use synth::SynthesizerRegistry;
