//! Frame timing and periodic diagnostics.

use std::time::Duration;

use terrane_world::FrameStats;
use tracing::info;

/// Frames between diagnostic reports.
pub const REPORT_INTERVAL: u64 = 60;

/// Accumulates per-frame figures and reports them every [`REPORT_INTERVAL`] frames.
#[derive(Debug, Default)]
pub struct FrameTimer {
    frames: u64,
    window_frames: u32,
    total: Duration,
    worst: Duration,
    triangles: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    pending: usize,
}

/// Summary of one reporting window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowReport {
    pub frame: u64,
    pub triangles_per_frame: u64,
    pub average_ms: f64,
    pub worst_ms: f64,
    pub hit_rate: f64,
    pub evictions: u64,
    pub pending: usize,
}

impl FrameTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a frame; returns the window report when one is due.
    pub fn record(&mut self, elapsed: Duration, stats: &FrameStats) -> Option<WindowReport> {
        self.frames += 1;
        self.window_frames += 1;
        self.total += elapsed;
        self.worst = self.worst.max(elapsed);
        self.triangles += stats.triangles;
        self.hits += stats.cache_hits;
        self.misses += stats.cache_misses;
        self.evictions += stats.evictions;
        self.pending = stats.patches_pending;

        if self.frames % REPORT_INTERVAL != 0 {
            return None;
        }

        let lookups = self.hits + self.misses;
        let report = WindowReport {
            frame: self.frames,
            triangles_per_frame: self.triangles / u64::from(self.window_frames),
            average_ms: self.total.as_secs_f64() * 1000.0 / f64::from(self.window_frames),
            worst_ms: self.worst.as_secs_f64() * 1000.0,
            hit_rate: if lookups == 0 { 1.0 } else { self.hits as f64 / lookups as f64 },
            evictions: self.evictions,
            pending: self.pending,
        };
        info!(
            frame = report.frame,
            triangles = report.triangles_per_frame,
            avg_ms = format_args!("{:.2}", report.average_ms),
            worst_ms = format_args!("{:.2}", report.worst_ms),
            hit_rate = format_args!("{:.3}", report.hit_rate),
            evictions = report.evictions,
            pending = report.pending,
            "frame stats"
        );

        *self = Self {
            frames: self.frames,
            ..Self::default()
        };
        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_every_interval() {
        let mut timer = FrameTimer::new();
        let stats = FrameStats {
            triangles: 1000,
            cache_hits: 3,
            cache_misses: 1,
            ..FrameStats::default()
        };

        for i in 1..REPORT_INTERVAL {
            let elapsed = Duration::from_millis(if i == 10 { 40 } else { 10 });
            assert!(timer.record(elapsed, &stats).is_none());
        }
        let report = timer.record(Duration::from_millis(10), &stats).unwrap();
        assert_eq!(report.frame, REPORT_INTERVAL);
        assert_eq!(report.triangles_per_frame, 1000);
        assert!((report.worst_ms - 40.0).abs() < 1e-9);
        assert!((report.average_ms - 10.5).abs() < 1e-9);
        assert!((report.hit_rate - 0.75).abs() < 1e-12);

        // Next window starts fresh.
        for _ in 1..REPORT_INTERVAL {
            timer.record(Duration::from_millis(5), &FrameStats::default());
        }
        let report = timer.record(Duration::from_millis(5), &FrameStats::default()).unwrap();
        assert_eq!(report.frame, 2 * REPORT_INTERVAL);
        assert_eq!(report.triangles_per_frame, 0);
        assert!((report.worst_ms - 5.0).abs() < 1e-9);
    }
}
