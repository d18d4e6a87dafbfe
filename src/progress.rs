use std::time::{Duration, Instant};

use human_repr::{HumanCount, HumanDuration, HumanThroughput};

pub const BAR_WIDTH: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Download,
    Transcode,
    Upload,
}

impl Phase {
    pub fn title(&self) -> &'static str {
        match self {
            Phase::Download => "Downloading...",
            Phase::Transcode => "Encoding...",
            Phase::Upload => "Uploading...",
        }
    }
}

/// Raw progress as producers report it. Transfers count bytes; the encoder
/// reports its own percent/eta from the media timestamp it has reached.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    Transfer { phase: Phase, current: u64, total: u64 },
    Encode { percent: f64, eta: Option<Duration>, speed: Option<f64> },
}

impl ProgressEvent {
    pub fn phase(&self) -> Phase {
        match self {
            ProgressEvent::Transfer { phase, .. } => *phase,
            ProgressEvent::Encode { .. } => Phase::Transcode,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProgressSample {
    pub phase: Phase,
    pub percent: f64,
    pub eta: Option<Duration>,
    /// Bytes per second for transfers, realtime multiple for encoding.
    pub speed: Option<f64>,
    pub transferred: Option<(u64, u64)>,
    pub elapsed: Duration,
}

impl ProgressSample {
    fn is_terminal(&self) -> bool {
        self.percent >= 100.0
    }

    pub fn render(&self) -> String {
        let mut lines = vec![
            String::from(self.phase.title()),
            format!("Progress: {:.2}%", self.percent),
            format!("[{}]", progress_bar(self.percent)),
        ];
        if let Some((current, total)) = self.transferred {
            lines.push(format!("Size: {} of {}", current.human_count_bytes(), total.human_count_bytes()));
        }
        match (self.phase, self.speed) {
            (Phase::Transcode, Some(speed)) => lines.push(format!("Speed: {:.2}x", speed)),
            (_, Some(speed)) => lines.push(format!("Speed: {}", speed.human_throughput_bytes())),
            (_, None) => (),
        }
        lines.push(format!("ETA: {}", match self.eta {
            Some(eta) => eta.as_secs_f64().human_duration().to_string(),
            None => String::from("-"),
        }));
        lines.push(format!("Elapsed: {}", self.elapsed.as_secs_f64().human_duration()));
        lines.join("\n")
    }
}

pub fn progress_bar(percent: f64) -> String {
    let filled = ((percent.clamp(0.0, 100.0) / 100.0) * BAR_WIDTH as f64).floor() as usize;
    let filled = filled.min(BAR_WIDTH);
    format!("{}{}", "█".repeat(filled), "░".repeat(BAR_WIDTH - filled))
}

struct PhaseState {
    phase: Phase,
    started: Instant,
    last_emit: Option<Instant>,
    pending: Option<ProgressSample>,
}

/// Turns a stream of raw events into at most one rendered update per
/// interval per phase. The first sample of a phase and any 100% sample are
/// always emitted, and [`ProgressTracker::finish`] flushes a held-back sample.
pub struct ProgressTracker {
    interval: Duration,
    state: Option<PhaseState>,
}

impl ProgressTracker {
    pub fn new(interval: Duration) -> Self {
        ProgressTracker {
            interval,
            state: None,
        }
    }

    pub fn begin(&mut self, phase: Phase, now: Instant) {
        self.state = Some(PhaseState {
            phase,
            started: now,
            last_emit: None,
            pending: None,
        });
    }

    pub fn observe(&mut self, event: ProgressEvent, now: Instant) -> Option<String> {
        let phase = event.phase();
        if self.state.as_ref().is_none_or(|s| s.phase != phase) {
            self.begin(phase, now);
        }
        let interval = self.interval;
        let state = self.state.as_mut()?;
        let sample = sample_from_event(event, now.saturating_duration_since(state.started));

        let due = match state.last_emit {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= interval,
        };
        if due || sample.is_terminal() {
            state.last_emit = Some(now);
            state.pending = None;
            Some(sample.render())
        } else {
            state.pending = Some(sample);
            None
        }
    }

    /// Ends the current phase, returning the last sample if it was held back.
    pub fn finish(&mut self) -> Option<String> {
        self.state.take()
            .and_then(|state| state.pending)
            .map(|sample| sample.render())
    }
}

fn sample_from_event(event: ProgressEvent, elapsed: Duration) -> ProgressSample {
    match event {
        ProgressEvent::Transfer { phase, current, total } => {
            let percent = match total {
                0 => 0.0,
                _ => (current as f64 / total as f64) * 100.0,
            };
            let secs = elapsed.as_secs_f64();
            let speed = match secs > 0.0 {
                true => Some(current as f64 / secs),
                false => None,
            };
            let eta = speed
                .filter(|s| *s > 0.0)
                .map(|s| Duration::from_secs_f64(total.saturating_sub(current) as f64 / s));
            ProgressSample {
                phase,
                percent,
                eta,
                speed,
                transferred: Some((current, total)),
                elapsed,
            }
        },
        ProgressEvent::Encode { percent, eta, speed } => ProgressSample {
            phase: Phase::Transcode,
            percent,
            eta,
            speed,
            transferred: None,
            elapsed,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(percent: f64) -> ProgressEvent {
        ProgressEvent::Encode { percent, eta: None, speed: None }
    }

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0.0), "░░░░░░░░░░");
        assert_eq!(progress_bar(42.5), "████░░░░░░");
        assert_eq!(progress_bar(100.0), "██████████");
        assert_eq!(progress_bar(250.0), "██████████");
        assert_eq!(progress_bar(-3.0), "░░░░░░░░░░");
    }

    #[test]
    fn test_throttles_within_interval() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::new(Duration::from_secs(5));
        tracker.begin(Phase::Transcode, start);
        assert!(tracker.observe(encode(1.0), start).is_some());
        let mut emitted = 0;
        for i in 1..50u64 {
            if tracker.observe(encode(1.0 + i as f64), start + Duration::from_millis(i * 90)).is_some() {
                emitted += 1;
            }
        }
        assert_eq!(emitted, 0);
        assert!(tracker.observe(encode(60.0), start + Duration::from_secs(5)).is_some());
        assert!(tracker.observe(encode(61.0), start + Duration::from_secs(6)).is_none());
    }

    #[test]
    fn test_terminal_sample_always_emitted() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::new(Duration::from_secs(5));
        assert!(tracker.observe(encode(10.0), start).is_some());
        let text = tracker.observe(encode(100.0), start + Duration::from_millis(10)).unwrap();
        assert!(text.contains("Progress: 100.00%"));
    }

    #[test]
    fn test_finish_flushes_held_back_sample() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::new(Duration::from_secs(5));
        let transfer = |current| ProgressEvent::Transfer { phase: Phase::Upload, current, total: 400 };
        assert!(tracker.observe(transfer(100), start).is_some());
        assert!(tracker.observe(transfer(300), start + Duration::from_secs(1)).is_none());
        let text = tracker.finish().unwrap();
        assert!(text.starts_with("Uploading..."));
        assert!(text.contains("Progress: 75.00%"));
        assert!(tracker.finish().is_none());
    }

    #[test]
    fn test_phases_throttle_independently() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::new(Duration::from_secs(5));
        let download = ProgressEvent::Transfer { phase: Phase::Download, current: 1, total: 10 };
        assert!(tracker.observe(download, start).is_some());
        assert!(tracker.observe(encode(3.0), start + Duration::from_millis(1)).is_some());
    }

    #[test]
    fn test_lower_percent_is_rendered() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::new(Duration::from_secs(5));
        assert!(tracker.observe(encode(50.0), start).is_some());
        let text = tracker.observe(encode(40.0), start + Duration::from_secs(5)).unwrap();
        assert!(text.contains("Progress: 40.00%"));
    }

    #[test]
    fn test_transfer_rendering() {
        let sample = sample_from_event(
            ProgressEvent::Transfer { phase: Phase::Download, current: 512, total: 1024 },
            Duration::from_secs(2),
        );
        assert_eq!(sample.percent, 50.0);
        assert_eq!(sample.speed, Some(256.0));
        assert_eq!(sample.eta, Some(Duration::from_secs(2)));
        let text = sample.render();
        assert!(text.starts_with("Downloading...\nProgress: 50.00%\n[█████░░░░░]\nSize: "));
        assert!(text.contains("Speed: "));
        assert!(text.contains("ETA: "));
        assert!(text.contains("Elapsed: "));
    }

    #[test]
    fn test_zero_elapsed_has_no_eta() {
        let sample = sample_from_event(
            ProgressEvent::Transfer { phase: Phase::Upload, current: 0, total: 0 },
            Duration::ZERO,
        );
        assert_eq!(sample.percent, 0.0);
        assert_eq!(sample.eta, None);
        assert!(sample.render().contains("ETA: -"));
    }
}
