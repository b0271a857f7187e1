//! Prediction latency metrics
//!
//! Rolling latency window plus lock-free counters. All window state sits
//! behind one `RwLock` so `record_latency` takes a single lock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Instant;

use serde::Serialize;

/// Histogram bucket for latency distribution
#[derive(Debug, Clone, Serialize)]
pub struct HistogramBucket {
    /// Upper bound of this bucket (in milliseconds)
    pub le: f64,
    pub count: u64,
}

const BUCKET_BOUNDS_MS: [f64; 9] = [1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0];

struct MetricsInner {
    latencies: VecDeque<f64>,
    histogram: Vec<HistogramBucket>,
}

/// Metrics collector shared by all requests
pub struct PerformanceMetrics {
    window_size: usize,
    inner: RwLock<MetricsInner>,
    total_requests: AtomicU64,
    total_errors: AtomicU64,
    start_time: Instant,
}

impl PerformanceMetrics {
    pub fn new(window_size: usize) -> Self {
        // Last bucket catches everything above 1s; serialized as null
        let mut histogram: Vec<HistogramBucket> = BUCKET_BOUNDS_MS
            .iter()
            .map(|&le| HistogramBucket { le, count: 0 })
            .collect();
        histogram.push(HistogramBucket { le: f64::INFINITY, count: 0 });

        Self {
            window_size,
            inner: RwLock::new(MetricsInner {
                latencies: VecDeque::with_capacity(window_size),
                histogram,
            }),
            total_requests: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a successful prediction's latency
    pub fn record_latency(&self, latency_ms: f64) {
        if let Ok(mut inner) = self.inner.write() {
            inner.latencies.push_back(latency_ms);
            if inner.latencies.len() > self.window_size {
                inner.latencies.pop_front();
            }
            if let Some(bucket) = inner.histogram.iter_mut().find(|b| latency_ms <= b.le) {
                bucket.count += 1;
            }
        }
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed prediction
    pub fn record_error(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg_latency(&self) -> f64 {
        self.inner
            .read()
            .map(|inner| {
                if inner.latencies.is_empty() {
                    0.0
                } else {
                    inner.latencies.iter().sum::<f64>() / inner.latencies.len() as f64
                }
            })
            .unwrap_or(0.0)
    }

    /// Percentile over the rolling window, via quickselect
    pub fn percentile_latency(&self, percentile: f64) -> f64 {
        self.inner
            .read()
            .map(|inner| {
                if inner.latencies.is_empty() {
                    return 0.0;
                }
                let mut data: Vec<f64> = inner.latencies.iter().copied().collect();
                let idx = ((percentile / 100.0) * (data.len() - 1) as f64) as usize;
                let idx = idx.min(data.len() - 1);
                data.select_nth_unstable_by(idx, |a, b| {
                    a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)
                });
                data[idx]
            })
            .unwrap_or(0.0)
    }

    pub fn error_rate(&self) -> f64 {
        let requests = self.total_requests.load(Ordering::Relaxed);
        let errors = self.total_errors.load(Ordering::Relaxed);
        if requests > 0 {
            errors as f64 / requests as f64
        } else {
            0.0
        }
    }

    pub fn histogram(&self) -> Vec<HistogramBucket> {
        self.inner
            .read()
            .map(|inner| inner.histogram.clone())
            .unwrap_or_default()
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn total_errors(&self) -> u64 {
        self.total_errors.load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_requests: self.total_requests(),
            total_errors: self.total_errors(),
            error_rate: self.error_rate(),
            avg_latency_ms: self.avg_latency(),
            p50_latency_ms: self.percentile_latency(50.0),
            p95_latency_ms: self.percentile_latency(95.0),
            p99_latency_ms: self.percentile_latency(99.0),
            uptime_secs: self.uptime_secs(),
        }
    }
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl std::fmt::Debug for PerformanceMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceMetrics")
            .field("window_size", &self.window_size)
            .field("total_requests", &self.total_requests())
            .field("total_errors", &self.total_errors())
            .finish()
    }
}

/// Point-in-time metrics, as served by `/stats`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub total_requests: u64,
    pub total_errors: u64,
    pub error_rate: f64,
    pub avg_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub uptime_secs: f64,
}
