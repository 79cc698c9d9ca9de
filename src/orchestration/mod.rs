//! Dual-pipeline orchestration.
//!
//! Runs the opaque reference implementation and the native candidate
//! scorers side by side, times both, and validates parity.

pub mod async_wrapper;
pub mod dual;
pub mod oracle;

pub use async_wrapper::AsyncOrchestrator;
pub use dual::{CandidatePipeline, DualOrchestrator, DualResult, FileResult, ListEvaluation};
pub use oracle::{InProcessOracle, ReferenceScorer, SubprocessOracle};
