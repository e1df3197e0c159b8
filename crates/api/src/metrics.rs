use orchestrator::RunStats;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[derive(Default)]
pub struct Metrics {
    // Counters
    total_requests: AtomicUsize,
    successful_requests: AtomicUsize,
    failed_requests: AtomicUsize,
    cache_hits: AtomicUsize,

    // Timing (in microseconds)
    total_research_time_us: AtomicU64,
    total_deep_research_time_us: AtomicU64,

    // Counts
    research_runs: AtomicUsize,
    deep_research_runs: AtomicUsize,
    total_pages_processed: AtomicUsize,
    total_entities_extracted: AtomicUsize,
    total_relationships_created: AtomicUsize,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_request(&self, success: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_research(&self, duration: Duration, stats: &RunStats) {
        self.total_research_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.research_runs.fetch_add(1, Ordering::Relaxed);
        self.total_pages_processed.fetch_add(stats.pages, Ordering::Relaxed);
        self.total_entities_extracted.fetch_add(stats.entities, Ordering::Relaxed);
        self.total_relationships_created.fetch_add(stats.relationships, Ordering::Relaxed);
    }

    pub fn record_deep_research(&self, duration: Duration, pages: usize) {
        self.total_deep_research_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.deep_research_runs.fetch_add(1, Ordering::Relaxed);
        self.total_pages_processed.fetch_add(pages, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            research_runs: self.research_runs.load(Ordering::Relaxed),
            deep_research_runs: self.deep_research_runs.load(Ordering::Relaxed),
            avg_research_time_ms: avg_time_ms(&self.total_research_time_us, &self.research_runs),
            avg_deep_research_time_ms: avg_time_ms(
                &self.total_deep_research_time_us,
                &self.deep_research_runs,
            ),
            total_pages_processed: self.total_pages_processed.load(Ordering::Relaxed),
            total_entities_extracted: self.total_entities_extracted.load(Ordering::Relaxed),
            total_relationships_created: self.total_relationships_created.load(Ordering::Relaxed),
        }
    }
}

fn avg_time_ms(total_us: &AtomicU64, count: &AtomicUsize) -> f64 {
    let total = total_us.load(Ordering::Relaxed) as f64;
    let cnt = count.load(Ordering::Relaxed) as f64;
    if cnt > 0.0 {
        total / cnt / 1000.0 // Convert to ms
    } else {
        0.0
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub cache_hits: usize,
    pub research_runs: usize,
    pub deep_research_runs: usize,
    pub avg_research_time_ms: f64,
    pub avg_deep_research_time_ms: f64,
    pub total_pages_processed: usize,
    pub total_entities_extracted: usize,
    pub total_relationships_created: usize,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
