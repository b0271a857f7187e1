//! Monitoring Module
//!
//! Latency and error tracking for the prediction path.

mod metrics;

pub use metrics::{HistogramBucket, MetricsSummary, PerformanceMetrics};
