//! Transfer progress tracking
//!
//! [`DownloadProgress`] holds the byte counters of one transfer and a
//! [`SpeedEstimator`] fed at a fixed sampling interval. The estimator only
//! publishes a speed once its ring is full, so early, noisy values never reach
//! the listener.

use crate::types::DownloadStatus;
use std::collections::VecDeque;
use std::time::Duration;

/// Default ring capacity
pub const DEFAULT_SPEED_SAMPLES: usize = 9;

/// Decay of the moving average
const ALPHA: f64 = 0.5;

/// Exponentially weighted moving average over a fixed ring of speed samples
#[derive(Debug, Clone)]
pub struct SpeedEstimator {
    capacity: usize,
    /// Newest first
    samples: VecDeque<f64>,
}

impl SpeedEstimator {
    /// Estimator publishing once `capacity` samples exist
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    /// Record one bytes-per-second sample, dropping the oldest when full
    pub fn push(&mut self, bytes_per_second: f64) {
        self.samples.push_front(bytes_per_second);
        while self.samples.len() > self.capacity {
            self.samples.pop_back();
        }
    }

    /// Number of samples currently held
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no sample was recorded yet
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Forget all samples
    pub fn reset(&mut self) {
        self.samples.clear();
    }

    /// Smoothed speed in bytes per second
    ///
    /// `None` until the ring is full, and `None` when the average is not
    /// positive: that means indeterminate, not stalled.
    pub fn estimate(&self) -> Option<f64> {
        if self.samples.len() < self.capacity {
            return None;
        }

        let mut total_weight = 0.0;
        let mut speed = 0.0;
        for (i, sample) in self.samples.iter().enumerate() {
            let weight = ALPHA * (1.0 - ALPHA).powi(i as i32);
            total_weight += weight;
            speed += weight * sample;
        }
        // Unallocated weight goes to the oldest sample
        if let Some(oldest) = self.samples.back() {
            speed += (1.0 - total_weight) * oldest;
        }

        (speed > 0.0).then_some(speed)
    }
}

impl Default for SpeedEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_SPEED_SAMPLES)
    }
}

/// Progress of one transfer
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    /// Bytes written so far
    pub completed_bytes: u64,
    /// Expected size in bytes (0 when unknown)
    pub total_bytes: u64,
    previous_completed: u64,
    estimator: SpeedEstimator,
}

impl DownloadProgress {
    /// Progress starting at `completed_bytes` of `total_bytes`
    pub fn new(completed_bytes: u64, total_bytes: u64, speed_samples: usize) -> Self {
        Self {
            completed_bytes,
            total_bytes,
            previous_completed: completed_bytes,
            estimator: SpeedEstimator::new(speed_samples),
        }
    }

    /// Update the byte counters from a transport report
    pub fn update(&mut self, completed_bytes: u64, total_bytes: u64) {
        // A restarted transfer begins again below the previous sample
        if completed_bytes < self.previous_completed {
            self.previous_completed = completed_bytes;
            self.estimator.reset();
        }
        self.completed_bytes = completed_bytes;
        if total_bytes > 0 {
            self.total_bytes = total_bytes;
        }
    }

    /// Record the bytes received since the previous sample
    ///
    /// Skipped while nothing was received or the total is unknown.
    pub fn record_sample(&mut self, interval: Duration) {
        if self.completed_bytes == 0 || self.total_bytes == 0 {
            return;
        }
        let secs = interval.as_secs_f64();
        if secs <= 0.0 {
            return;
        }
        let delta = self.completed_bytes.saturating_sub(self.previous_completed);
        self.estimator.push(delta as f64 / secs);
        self.previous_completed = self.completed_bytes;
    }

    /// Smoothed speed in bytes per second
    pub fn speed(&self) -> Option<f64> {
        self.estimator.estimate()
    }

    /// Estimated time until completion, undefined without a speed
    pub fn remaining_time(&self) -> Option<Duration> {
        let speed = self.speed()?;
        let remaining = self.total_bytes.saturating_sub(self.completed_bytes) as f64;
        Some(Duration::from_secs_f64(remaining / speed))
    }

    /// Completed fraction in `0.0..=1.0`
    pub fn fraction_completed(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.completed_bytes as f64 / self.total_bytes as f64).min(1.0)
    }

    /// Two-line human readable status for `status`
    pub fn description(&self, status: DownloadStatus) -> String {
        match status {
            DownloadStatus::Queued => format!("{}\nQueued", self.size_and_percent()),
            DownloadStatus::Downloading => {
                let detail = match (self.speed(), self.remaining_time()) {
                    (Some(speed), Some(remaining)) => format!(
                        "{}/s - {} remaining",
                        format_bytes(speed as u64),
                        format_duration(remaining)
                    ),
                    _ => "Estimating speed and remaining time".to_string(),
                };
                format!("{}\n{}", self.size_and_percent(), detail)
            }
            DownloadStatus::Paused => format!("{}\nPaused", self.size_and_percent()),
            DownloadStatus::Errored => format!("{}\nDownload Error", self.size()),
        }
    }

    fn size(&self) -> String {
        format!(
            "{} of {}",
            format_bytes(self.completed_bytes),
            format_bytes(self.total_bytes)
        )
    }

    fn size_and_percent(&self) -> String {
        format!(
            "{} - {:.0}%",
            self.size(),
            self.fraction_completed() * 100.0
        )
    }
}

/// Decimal byte count, e.g. "1.5 MB"
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["KB", "MB", "GB", "TB", "PB"];

    if bytes < 1000 {
        return format!("{} bytes", bytes);
    }
    let mut value = bytes as f64 / 1000.0;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Short duration, e.g. "1 hr 5 min" or "42 sec"
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{} hr {} min", hours, minutes)
    } else if minutes > 0 {
        format!("{} min {} sec", minutes, seconds)
    } else {
        format!("{} sec", seconds)
    }
}
