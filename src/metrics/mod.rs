//! Metrics Module
//!
//! Handles metrics collection and Prometheus export.

pub mod collector;

pub use collector::{Metrics, MetricsSnapshot};
