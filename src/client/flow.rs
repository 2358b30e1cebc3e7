use std::collections::VecDeque;
use std::time::{Duration, Instant};

// measurement interval for the throughput history
const INTERVAL: Duration = Duration::from_secs(2);
// EWMA weight of the newest throughput and rtt samples
const EWMA_ALPHA: f64 = 0.2;
// recent/older throughput ratio below which we assume congestion
const COLLAPSE_RATIO: f64 = 0.7;
// number of throughput samples on each side of the collapse comparison
const COLLAPSE_SAMPLES: usize = 3;
const METRICS_CAP: usize = 10;
const EXHAUSTIONS_CAP: usize = 3;

/// Adaptive controller for the advertised receive window of one channel.
///
/// The controller tries to keep the window close to twice the estimated bandwidth-delay
/// product: large enough to sustain the observed throughput, small enough that one channel
/// cannot buffer unbounded data inside the connection. The window grows like a TCP congestion
/// window (exponential slow start up to `ssthresh`, then linear) and shrinks multiplicatively
/// when the measured throughput collapses or when the sender keeps slamming into window
/// exhaustion faster and faster.
///
/// The controller only advises; the channel owns the protocol-level window arithmetic. It
/// reports `remaining` (the unconsumed advertised window) to [`on_data()`][Self::on_data] and
/// asks [`take_adjust()`][Self::take_adjust] how many bytes of window to advertise next.
#[derive(Debug)]
pub(crate) struct WindowController {
    window_min: f64,
    window_max: f64,
    target: f64,
    last_advertised: usize,
    ssthresh: f64,
    in_slow_start: bool,
    bw_est: f64,
    rtt_est: f64,
    interval_start: Instant,
    bytes_in_interval: u64,
    metrics: VecDeque<f64>,
    exhaustions: VecDeque<Instant>,
    awaiting_rtt_since: Option<Instant>,
}

impl WindowController {
    pub fn new(initial_window: usize, window_min: usize, window_max: usize, now: Instant) -> Self {
        let window_min = window_min as f64;
        let window_max = window_max as f64;
        let target = (initial_window as f64).clamp(window_min, window_max);
        WindowController {
            window_min,
            window_max,
            target,
            last_advertised: initial_window,
            ssthresh: window_max,
            in_slow_start: true,
            bw_est: 0.0,
            rtt_est: 0.0,
            interval_start: now,
            bytes_in_interval: 0,
            metrics: VecDeque::with_capacity(METRICS_CAP),
            exhaustions: VecDeque::with_capacity(EXHAUSTIONS_CAP),
            awaiting_rtt_since: None,
        }
    }

    /// Account for `len` received bytes; `remaining` is the unconsumed window after them.
    pub fn on_data(&mut self, len: usize, remaining: usize, now: Instant) {
        self.bytes_in_interval += len as u64;

        if let Some(adjust_at) = self.awaiting_rtt_since.take() {
            let sample = now.duration_since(adjust_at).as_secs_f64();
            self.rtt_est = if self.rtt_est == 0.0 {
                sample
            } else {
                EWMA_ALPHA * sample + (1.0 - EWMA_ALPHA) * self.rtt_est
            };
        }

        if remaining == 0 {
            if self.exhaustions.len() == EXHAUSTIONS_CAP {
                self.exhaustions.pop_front();
            }
            self.exhaustions.push_back(now);
        }

        self.advance_interval(now);
    }

    /// Return the window increment to advertise now, if one is due.
    ///
    /// An adjustment is due once the unconsumed window falls below half of the last
    /// advertisement. The increment tops the window back up to the current target; after a
    /// congestion backoff the target can sit below the unconsumed window, in which case nothing
    /// is advertised and the window simply drains.
    pub fn take_adjust(&mut self, remaining: usize, now: Instant) -> Option<usize> {
        self.advance_interval(now);

        if remaining > self.last_advertised / 2 {
            return None
        }

        let target = self.target as usize;
        if target <= remaining {
            return None
        }

        let adjust = target - remaining;
        self.last_advertised = target;
        self.awaiting_rtt_since = Some(now);
        Some(adjust)
    }

    fn advance_interval(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.interval_start);
        if elapsed < INTERVAL {
            return
        }

        let throughput = self.bytes_in_interval as f64 / elapsed.as_secs_f64();
        if self.metrics.len() == METRICS_CAP {
            self.metrics.pop_front();
        }
        self.metrics.push_back(throughput);
        self.bw_est = EWMA_ALPHA * throughput + (1.0 - EWMA_ALPHA) * self.bw_est;

        // a congestion verdict always wins over slow start growth
        if self.detect_congestion(now) {
            self.ssthresh = f64::max(self.target / 2.0, self.window_min);
            self.in_slow_start = false;
            self.target = f64::max(self.target * 0.75, self.window_min);
        } else if self.bytes_in_interval > 0 {
            if self.in_slow_start {
                self.target *= 2.0;
                if self.target >= self.ssthresh {
                    self.target = self.ssthresh;
                    self.in_slow_start = false;
                }
            } else {
                self.target += f64::max(self.target * 0.1, 1024.0);
            }

            let bdp = self.bw_est * self.rtt_est;
            if bdp > 0.0 {
                self.target = f64::min(self.target, f64::max(4.0 * bdp, self.window_min));
            }
            self.target = self.target.clamp(self.window_min, self.window_max);
        }

        self.bytes_in_interval = 0;
        self.interval_start = now;
    }

    fn detect_congestion(&self, now: Instant) -> bool {
        // (a) measured throughput collapsed against the older samples
        if self.metrics.len() >= 2 * COLLAPSE_SAMPLES {
            let recent = self.metrics.iter().rev().take(COLLAPSE_SAMPLES);
            let older = self.metrics.iter().rev().skip(COLLAPSE_SAMPLES).take(COLLAPSE_SAMPLES);
            let recent_mean = recent.sum::<f64>() / COLLAPSE_SAMPLES as f64;
            let older_mean = older.sum::<f64>() / COLLAPSE_SAMPLES as f64;
            if older_mean > 0.0 && recent_mean / older_mean < COLLAPSE_RATIO {
                return true
            }
        }

        // (b) window exhaustions arrive with shrinking gaps and the newest is fresh
        if self.exhaustions.len() == 3 {
            let gap_1 = self.exhaustions[1].duration_since(self.exhaustions[0]);
            let gap_2 = self.exhaustions[2].duration_since(self.exhaustions[1]);
            if gap_2 < gap_1 && now.duration_since(self.exhaustions[2]) < Duration::from_secs(1) {
                return true
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KIB: usize = 1024;

    fn controller(initial: usize) -> (WindowController, Instant) {
        let now = Instant::now();
        (WindowController::new(initial, 64 * KIB, 16 * 1024 * KIB, now), now)
    }

    #[test]
    fn test_no_adjust_above_threshold() {
        let (mut ctrl, now) = controller(1000 * KIB);
        // consumed less than half of the advertisement
        ctrl.on_data(100 * KIB, 900 * KIB, now);
        assert_eq!(ctrl.take_adjust(900 * KIB, now), None);
    }

    #[test]
    fn test_adjust_refills_to_target() {
        let (mut ctrl, now) = controller(1000 * KIB);
        ctrl.on_data(600 * KIB, 400 * KIB, now);
        let adjust = ctrl.take_adjust(400 * KIB, now).unwrap();
        assert_eq!(adjust, 600 * KIB);
    }

    #[test]
    fn test_slow_start_doubles_window() {
        let (mut ctrl, t0) = controller(256 * KIB);

        // one busy interval with no congestion signal doubles the target
        ctrl.on_data(200 * KIB, 56 * KIB, t0 + Duration::from_secs(3));
        let adjust = ctrl.take_adjust(56 * KIB, t0 + Duration::from_secs(3)).unwrap();
        assert_eq!(adjust + 56 * KIB, 512 * KIB);
    }

    #[test]
    fn test_window_bounds() {
        let (mut ctrl, t0) = controller(256 * KIB);

        // many busy intervals in slow start; the target must never exceed the maximum
        let mut now = t0;
        for _ in 0..20 {
            now += Duration::from_secs(3);
            ctrl.on_data(100 * KIB, 0, now);
        }
        let adjust = ctrl.take_adjust(0, now).unwrap();
        assert!(adjust <= 16 * 1024 * KIB);
    }

    #[test]
    fn test_throughput_collapse_shrinks_window() {
        let (mut ctrl, t0) = controller(1024 * KIB);
        let mut now = t0;

        // several intervals of steady throughput
        for _ in 0..4 {
            now += Duration::from_secs(3);
            ctrl.on_data(3000 * KIB, 512 * KIB, now);
        }
        let target_before = ctrl.target;

        // throughput collapses to a fraction of the earlier intervals
        for _ in 0..3 {
            now += Duration::from_secs(3);
            ctrl.on_data(100 * KIB, 512 * KIB, now);
        }
        assert!(ctrl.target < target_before);
        assert!(!ctrl.in_slow_start);
    }

    #[test]
    fn test_accelerating_exhaustion_shrinks_window() {
        let (mut ctrl, t0) = controller(1024 * KIB);

        // exhaustions arrive with shrinking gaps; the last one lands together with the
        // interval boundary, so the congestion check sees it as fresh
        ctrl.on_data(100 * KIB, 0, t0 + Duration::from_millis(100));
        ctrl.on_data(100 * KIB, 0, t0 + Duration::from_millis(1600));
        ctrl.on_data(100 * KIB, 0, t0 + Duration::from_millis(2500));

        assert!(ctrl.target < 1024.0 * KIB as f64);
        assert!(!ctrl.in_slow_start);
    }

    #[test]
    fn test_congestion_backoff_respects_minimum() {
        let (mut ctrl, t0) = controller(64 * KIB);
        let mut now = t0;

        for i in 0..10 {
            now += Duration::from_millis(2100 - 100 * i);
            ctrl.on_data(KIB, 0, now);
        }
        assert!(ctrl.target >= 64.0 * KIB as f64);
    }

    #[test]
    fn test_rtt_estimate_updates() {
        let (mut ctrl, t0) = controller(1000 * KIB);

        ctrl.on_data(600 * KIB, 400 * KIB, t0);
        let _ = ctrl.take_adjust(400 * KIB, t0).unwrap();
        ctrl.on_data(10 * KIB, 990 * KIB, t0 + Duration::from_millis(50));
        assert!(ctrl.rtt_est > 0.0);
        assert!(ctrl.rtt_est < 0.1);
    }
}
