//! Step throughput monitor
//!
//! Step durations are recorded after every completed step. Once per window
//! interval the monitor closes a window, turns its frame count into a
//! throughput figure and updates the rolling averages the controller reads
//! when deciding whether to move to the GPU.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::adaptive::PerformanceThresholds;
use crate::backend::BackendKind;

/// Rolling performance figures reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PerformanceStats {
    /// Average steps per second over the recent windows
    pub avg_fps: f64,
    /// Average step duration over the recent frames, in milliseconds
    pub avg_frame_time_ms: f64,
    pub mode: BackendKind,
}

/// Records step timings and aggregates them into fixed wall-clock windows
#[derive(Debug, Clone)]
pub struct PerformanceMonitor {
    window_interval: Duration,
    window_count: usize,
    frame_history: usize,
    min_fps: f64,
    fps_history: VecDeque<f64>,
    frame_times: VecDeque<Duration>,
    window_start: Instant,
    frames_in_window: u32,
    avg_fps: f64,
    avg_frame_time: Duration,
    slow_windows: u32,
}

impl PerformanceMonitor {
    pub fn new(thresholds: &PerformanceThresholds) -> Self {
        Self::starting_at(thresholds, Instant::now())
    }

    /// A monitor whose first window opens at `now`
    pub fn starting_at(thresholds: &PerformanceThresholds, now: Instant) -> Self {
        Self {
            window_interval: thresholds.window_interval(),
            window_count: thresholds.window_count.max(1),
            frame_history: thresholds.frame_history.max(1),
            min_fps: thresholds.min_cpu_fps,
            fps_history: VecDeque::new(),
            frame_times: VecDeque::new(),
            window_start: now,
            frames_in_window: 0,
            avg_fps: 0.0,
            avg_frame_time: Duration::ZERO,
            slow_windows: 0,
        }
    }

    pub fn record_frame(&mut self, frame_time: Duration) {
        self.record_frame_at(frame_time, Instant::now());
    }

    /// Record one completed step that took `frame_time`, observed at `now`
    pub fn record_frame_at(&mut self, frame_time: Duration, now: Instant) {
        if self.frame_times.len() == self.frame_history {
            self.frame_times.pop_front();
        }
        self.frame_times.push_back(frame_time);
        self.frames_in_window += 1;

        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= self.window_interval {
            self.close_window(elapsed, now);
        }
    }

    fn close_window(&mut self, elapsed: Duration, now: Instant) {
        let fps = f64::from(self.frames_in_window) / elapsed.as_secs_f64();
        if self.fps_history.len() == self.window_count {
            self.fps_history.pop_front();
        }
        self.fps_history.push_back(fps);
        self.frames_in_window = 0;
        self.window_start = now;

        if fps < self.min_fps {
            self.slow_windows += 1;
        } else {
            self.slow_windows = 0;
        }

        self.avg_fps = self.fps_history.iter().sum::<f64>() / self.fps_history.len() as f64;
        let total: Duration = self.frame_times.iter().sum();
        self.avg_frame_time = total / self.frame_times.len() as u32;

        tracing::trace!(
            fps,
            avg_fps = self.avg_fps,
            slow_windows = self.slow_windows,
            "performance window closed"
        );
    }

    /// Number of windows closed since the last reset (at most the window count)
    pub fn windows(&self) -> usize {
        self.fps_history.len()
    }

    pub fn consecutive_slow_windows(&self) -> u32 {
        self.slow_windows
    }

    pub fn avg_fps(&self) -> f64 {
        self.avg_fps
    }

    pub fn avg_frame_time(&self) -> Duration {
        self.avg_frame_time
    }

    /// True once the rolling throughput has stayed below the minimum for
    /// `min_windows` consecutive windows
    pub fn should_switch_to_gpu(&self, min_windows: u32) -> bool {
        self.slow_windows >= min_windows.max(1) && self.avg_fps < self.min_fps
    }

    pub fn reset(&mut self) {
        self.reset_at(Instant::now());
    }

    /// Drop all history; the next window opens at `now`
    pub fn reset_at(&mut self, now: Instant) {
        self.fps_history.clear();
        self.frame_times.clear();
        self.window_start = now;
        self.frames_in_window = 0;
        self.avg_fps = 0.0;
        self.avg_frame_time = Duration::ZERO;
        self.slow_windows = 0;
    }

    pub fn stats(&self, mode: BackendKind) -> PerformanceStats {
        PerformanceStats {
            avg_fps: self.avg_fps,
            avg_frame_time_ms: self.avg_frame_time.as_secs_f64() * 1000.0,
            mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> PerformanceThresholds {
        PerformanceThresholds::default()
    }

    /// Feed `frames` evenly spaced steps over one second starting at `start`
    fn run_window(monitor: &mut PerformanceMonitor, start: Instant, frames: u32) -> Instant {
        for i in 1..=frames {
            let at = start + Duration::from_secs(1) * i / frames;
            monitor.record_frame_at(Duration::from_millis(2), at);
        }
        start + Duration::from_secs(1)
    }

    #[test]
    fn no_window_before_interval() {
        let start = Instant::now();
        let mut monitor = PerformanceMonitor::starting_at(&thresholds(), start);
        monitor.record_frame_at(Duration::from_millis(5), start + Duration::from_millis(500));
        assert_eq!(monitor.windows(), 0);
        assert_eq!(monitor.avg_fps(), 0.0);
    }

    #[test]
    fn window_computes_fps_and_frame_time() {
        let start = Instant::now();
        let mut monitor = PerformanceMonitor::starting_at(&thresholds(), start);
        run_window(&mut monitor, start, 60);

        assert_eq!(monitor.windows(), 1);
        assert!((monitor.avg_fps() - 60.0).abs() < 1e-6);
        assert_eq!(monitor.avg_frame_time(), Duration::from_millis(2));
        assert_eq!(monitor.consecutive_slow_windows(), 0);
    }

    #[test]
    fn slow_windows_trigger_switch() {
        let start = Instant::now();
        let mut monitor = PerformanceMonitor::starting_at(&thresholds(), start);
        let mut t = start;
        for _ in 0..2 {
            t = run_window(&mut monitor, t, 10);
        }
        assert!(!monitor.should_switch_to_gpu(3));
        run_window(&mut monitor, t, 10);
        assert_eq!(monitor.consecutive_slow_windows(), 3);
        assert!(monitor.should_switch_to_gpu(3));
    }

    #[test]
    fn fast_window_breaks_the_streak() {
        let start = Instant::now();
        let mut monitor = PerformanceMonitor::starting_at(&thresholds(), start);
        let mut t = start;
        t = run_window(&mut monitor, t, 10);
        t = run_window(&mut monitor, t, 10);
        t = run_window(&mut monitor, t, 100);
        run_window(&mut monitor, t, 10);
        assert_eq!(monitor.consecutive_slow_windows(), 1);
        assert!(!monitor.should_switch_to_gpu(3));
    }

    #[test]
    fn history_is_bounded() {
        let start = Instant::now();
        let mut monitor = PerformanceMonitor::starting_at(&thresholds(), start);
        let mut t = start;
        for _ in 0..8 {
            t = run_window(&mut monitor, t, 20);
        }
        assert_eq!(monitor.windows(), 5);
    }

    #[test]
    fn reset_clears_history() {
        let start = Instant::now();
        let mut monitor = PerformanceMonitor::starting_at(&thresholds(), start);
        let t = run_window(&mut monitor, start, 10);
        monitor.reset_at(t);

        assert_eq!(monitor.windows(), 0);
        assert_eq!(monitor.consecutive_slow_windows(), 0);
        let stats = monitor.stats(BackendKind::Cpu);
        assert_eq!(stats.avg_fps, 0.0);
        assert_eq!(stats.avg_frame_time_ms, 0.0);
        assert_eq!(stats.mode, BackendKind::Cpu);
    }
}
