//! Numerical parity validation between the reference and candidate
//! pipelines.

pub mod parity;

pub use parity::{DiscrepancyReport, MetricMap, ParityValidator, ValidationReport};
