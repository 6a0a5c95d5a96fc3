use std::time::Duration;

use mdrag_core::types::PerformanceStats;

/// Running query latency counters.
#[derive(Debug, Default, Clone)]
pub struct QueryMetrics {
    count: u64,
    total_ms: f64,
    last_ms: f64,
}

impl QueryMetrics {
    pub fn record(&mut self, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        self.count += 1;
        self.total_ms += ms;
        self.last_ms = ms;
    }

    pub fn average_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_ms / self.count as f64
        }
    }

    /// `meets_latency_target` holds when the average is strictly below
    /// `target_ms`.
    pub fn snapshot(&self, target_ms: f64) -> PerformanceStats {
        let avg = self.average_ms();
        PerformanceStats {
            query_count: self.count,
            avg_query_time_ms: avg,
            last_query_time_ms: self.last_ms,
            meets_latency_target: avg < target_ms,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_and_resets() {
        let mut m = QueryMetrics::default();
        assert!(m.snapshot(500.0).meets_latency_target);
        m.record(Duration::from_millis(100));
        m.record(Duration::from_millis(300));
        let s = m.snapshot(500.0);
        assert_eq!(s.query_count, 2);
        assert!((s.avg_query_time_ms - 200.0).abs() < 1e-6);
        assert!((s.last_query_time_ms - 300.0).abs() < 1e-6);
        assert!(s.meets_latency_target);
        assert!(!m.snapshot(200.0).meets_latency_target);
        m.reset();
        assert_eq!(m.snapshot(500.0).query_count, 0);
    }
}
