//! Progress aggregation for one upload session.
//!
//! The [`ProgressReporter`] turns the uploader's raw stream of percentages
//! into rate-limited report lines at three independent cadences:
//!
//! - **percent**: one line whenever the displayed progress advances by a
//!   whole step (1% by default);
//! - **detailed**: at most one line per `detailed_interval` with elapsed time
//!   and, once progress is above zero, a linear ETA;
//! - **summary**: at most one line per `summary_interval`.
//!
//! Lines are delivered to a [`ProgressHandler`]; [`LogProgress`] writes them
//! through `tracing`.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::error::ConfigurationError;
use crate::event::UploadEvent;
use crate::uploader::EventSink;

/// Cadence settings for the reporter. Intervals are whole seconds in config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Cadence {
    /// Progress step (in percent) between percent-cadence lines.
    pub percent_step: f64,
    #[serde(rename = "detailed_interval_secs", with = "secs")]
    pub detailed_interval: Duration,
    #[serde(rename = "summary_interval_secs", with = "secs")]
    pub summary_interval: Duration,
}

impl Default for Cadence {
    fn default() -> Self {
        Self {
            percent_step: 1.0,
            detailed_interval: Duration::from_secs(10),
            summary_interval: Duration::from_secs(60),
        }
    }
}

impl Cadence {
    /// Reject steps that would suppress or garble percent lines.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !self.percent_step.is_finite() || self.percent_step < 0.0 {
            return Err(ConfigurationError::ConfigFile(format!(
                "reporter.percent_step must be a finite, non-negative number, got {}",
                self.percent_step
            )));
        }
        Ok(())
    }

    /// Same cadence with an unusable percent step replaced by the default.
    fn sanitized(mut self) -> Self {
        if let Err(e) = self.validate() {
            tracing::warn!("{}, using {}", e, Self::default().percent_step);
            self.percent_step = Self::default().percent_step;
        }
        self
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

/// Mutable timing and percentage state of an active session.
#[derive(Debug, Clone)]
pub struct ProgressState {
    pub start_time: Instant,
    pub last_displayed_progress: f64,
    pub last_detailed_time: Instant,
    pub last_summary_time: Instant,
    pub current_progress: f64,
    pub total_chunks: Option<u64>,
}

impl ProgressState {
    fn new(now: Instant) -> Self {
        Self {
            start_time: now,
            last_displayed_progress: 0.0,
            last_detailed_time: now,
            last_summary_time: now,
            current_progress: 0.0,
            total_chunks: None,
        }
    }
}

#[derive(Debug, Clone)]
enum Phase {
    Idle,
    Active(ProgressState),
    Terminal,
}

/// A line produced by the reporter.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Preparing,
    PageStarted { page: Option<u32> },
    PageFinished { page: Option<u32> },
    ChunksPlanned { total: u64 },
    Progress { percentage: f64, elapsed: Duration },
    Detailed { percentage: f64, elapsed: Duration, remaining: Option<Duration> },
    Summary { percentage: f64, elapsed: Duration },
    Completed { elapsed: Duration },
    Failed { message: String },
}

impl Report {
    pub fn is_error(&self) -> bool {
        matches!(self, Report::Failed { .. })
    }
}

struct Page(Option<u32>);

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(n) => write!(f, "{}", n),
            None => f.write_str("unknown"),
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Report::Preparing => write!(f, "[prepare] preparing upload..."),
            Report::PageStarted { page } => write!(f, "[page] uploading page {}...", Page(*page)),
            Report::PageFinished { page } => write!(f, "[page] page {} uploaded", Page(*page)),
            Report::ChunksPlanned { total } => write!(f, "[chunks] {} chunks to upload", total),
            Report::Progress { percentage, elapsed } => write!(
                f,
                "[progress] {:.2}%, elapsed {:.1}s",
                percentage,
                elapsed.as_secs_f64()
            ),
            Report::Detailed { percentage, elapsed, remaining: Some(remaining) } => write!(
                f,
                "[detail] {:.2}%, elapsed {:.1}s, remaining ~{:.1}s",
                percentage,
                elapsed.as_secs_f64(),
                remaining.as_secs_f64()
            ),
            Report::Detailed { percentage, elapsed, remaining: None } => write!(
                f,
                "[detail] {:.2}%, elapsed {:.1}s",
                percentage,
                elapsed.as_secs_f64()
            ),
            Report::Summary { percentage, elapsed } => write!(
                f,
                "[summary] {:.2}%, elapsed {:.1}s",
                percentage,
                elapsed.as_secs_f64()
            ),
            Report::Completed { elapsed } => write!(
                f,
                "[done] upload complete, total {:.1}s",
                elapsed.as_secs_f64()
            ),
            Report::Failed { message } => write!(f, "[failed] upload failed: {}", message),
        }
    }
}

/// Trait for receiving report lines. Implement this to integrate with
/// progress bars or other status displays.
pub trait ProgressHandler {
    fn on_report(&mut self, report: &Report);
}

/// Writes every report line through `tracing`.
#[derive(Debug, Default)]
pub struct LogProgress;

impl ProgressHandler for LogProgress {
    fn on_report(&mut self, report: &Report) {
        match report {
            Report::Failed { .. } => tracing::error!("{}", report),
            Report::ChunksPlanned { .. } => tracing::debug!("{}", report),
            _ => tracing::info!("{}", report),
        }
    }
}

impl ProgressHandler for Vec<Report> {
    fn on_report(&mut self, report: &Report) {
        self.push(report.clone());
    }
}

impl<A: ProgressHandler, B: ProgressHandler> ProgressHandler for (A, B) {
    fn on_report(&mut self, report: &Report) {
        self.0.on_report(report);
        self.1.on_report(report);
    }
}

impl<H: ProgressHandler> ProgressHandler for Option<H> {
    fn on_report(&mut self, report: &Report) {
        if let Some(h) = self {
            h.on_report(report);
        }
    }
}

/// Aggregates upload events for one session into report lines.
pub struct ProgressReporter<H = LogProgress, C = SystemClock> {
    handler: H,
    clock: C,
    cadence: Cadence,
    phase: Phase,
}

impl<H: ProgressHandler, C: Clock> ProgressReporter<H, C> {
    pub fn new(handler: H, clock: C, cadence: Cadence) -> Self {
        Self {
            handler,
            clock,
            cadence: cadence.sanitized(),
            phase: Phase::Idle,
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// State of the active session, if one is running.
    pub fn state(&self) -> Option<&ProgressState> {
        match &self.phase {
            Phase::Active(state) => Some(state),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.phase, Phase::Active(_))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, Phase::Terminal)
    }

    /// Time since the session started, if it is active.
    pub fn elapsed(&self) -> Option<Duration> {
        self.state()
            .map(|s| self.clock.now().saturating_duration_since(s.start_time))
    }

    /// Begin a new session. Resets all cadence timestamps to now.
    pub fn on_session_start(&mut self) {
        self.phase = Phase::Active(ProgressState::new(self.clock.now()));
    }

    /// Dispatch a single event to its handler.
    pub fn handle(&mut self, event: UploadEvent) {
        if !self.is_active() {
            tracing::debug!(kind = %event.kind(), "dropping event outside an active session");
            return;
        }
        match event {
            UploadEvent::PreUpload => self.on_pre_upload(),
            UploadEvent::PrePage { page_number } => self.on_pre_page(page_number),
            UploadEvent::AfterPage { page_number } => self.on_after_page(page_number),
            UploadEvent::PreChunk { total_chunks } => self.on_pre_chunk(total_chunks),
            UploadEvent::AfterChunk { percentage } => self.on_after_chunk(percentage),
            UploadEvent::Completed => self.on_completed(),
            UploadEvent::Failed { error } => self.on_failed(error.as_deref()),
        }
    }

    pub fn on_pre_upload(&mut self) {
        if self.is_active() {
            self.handler.on_report(&Report::Preparing);
        }
    }

    pub fn on_pre_page(&mut self, page_number: Option<u32>) {
        if self.is_active() {
            self.handler.on_report(&Report::PageStarted { page: page_number });
        }
    }

    pub fn on_after_page(&mut self, page_number: Option<u32>) {
        if self.is_active() {
            self.handler.on_report(&Report::PageFinished { page: page_number });
        }
    }

    pub fn on_pre_chunk(&mut self, total: Option<u64>) {
        let Phase::Active(state) = &mut self.phase else {
            return;
        };
        if let Some(total) = total {
            state.total_chunks = Some(total);
            self.handler.on_report(&Report::ChunksPlanned { total });
        }
    }

    pub fn on_after_chunk(&mut self, percentage: Option<f64>) {
        let Phase::Active(state) = &mut self.phase else {
            return;
        };
        let Some(percentage) = percentage.filter(|p| !p.is_nan()) else {
            return;
        };
        let now = self.clock.now();
        let current = percentage.clamp(0.0, 100.0);
        if current < state.current_progress {
            tracing::debug!(
                from = state.current_progress,
                to = current,
                "upload progress went backwards"
            );
        }
        state.current_progress = current;
        let elapsed = now.saturating_duration_since(state.start_time);

        if crossed_step(state.last_displayed_progress, current, self.cadence.percent_step) {
            self.handler.on_report(&Report::Progress { percentage: current, elapsed });
            state.last_displayed_progress = current;
        }

        if now.saturating_duration_since(state.last_detailed_time) >= self.cadence.detailed_interval {
            self.handler.on_report(&Report::Detailed {
                percentage: current,
                elapsed,
                remaining: estimate_remaining(elapsed, current),
            });
            state.last_detailed_time = now;
        }

        if now.saturating_duration_since(state.last_summary_time) >= self.cadence.summary_interval {
            self.handler.on_report(&Report::Summary { percentage: current, elapsed });
            state.last_summary_time = now;
        }
    }

    pub fn on_completed(&mut self) {
        if let Some(elapsed) = self.elapsed() {
            self.phase = Phase::Terminal;
            self.handler.on_report(&Report::Completed { elapsed });
        }
    }

    pub fn on_failed(&mut self, error_message: Option<&str>) {
        if self.is_active() {
            self.phase = Phase::Terminal;
            let message = error_message.unwrap_or("unknown error").to_string();
            self.handler.on_report(&Report::Failed { message });
        }
    }
}

impl<H: ProgressHandler, C: Clock> EventSink for ProgressReporter<H, C> {
    fn emit(&mut self, event: UploadEvent) {
        self.handle(event);
    }
}

/// True when `current` sits at least one whole step above `last`.
fn crossed_step(last: f64, current: f64, step: f64) -> bool {
    if step <= 0.0 {
        return current > last;
    }
    (current / step).floor() > (last / step).floor()
}

/// Linear ETA: total = elapsed / fraction done. `None` while nothing is
/// done, or when the estimate does not fit in a `Duration`.
pub fn estimate_remaining(elapsed: Duration, percentage: f64) -> Option<Duration> {
    if percentage <= 0.0 {
        return None;
    }
    let elapsed_secs = elapsed.as_secs_f64();
    let total = elapsed_secs / (percentage / 100.0);
    Duration::try_from_secs_f64((total - elapsed_secs).max(0.0)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn reporter() -> (ProgressReporter<Vec<Report>, ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        let mut r = ProgressReporter::new(Vec::new(), clock.clone(), Cadence::default());
        r.on_session_start();
        (r, clock)
    }

    fn count(reports: &[Report], pred: impl Fn(&Report) -> bool) -> usize {
        reports.iter().filter(|&r| pred(r)).count()
    }

    fn is_progress(r: &Report) -> bool {
        matches!(r, Report::Progress { .. })
    }

    fn is_detailed(r: &Report) -> bool {
        matches!(r, Report::Detailed { .. })
    }

    fn is_summary(r: &Report) -> bool {
        matches!(r, Report::Summary { .. })
    }

    #[test]
    fn percent_lines_within_one_second() {
        let (mut r, clock) = reporter();
        for p in [0.5, 1.2, 1.9, 2.0] {
            clock.advance(Duration::from_millis(100));
            r.on_after_chunk(Some(p));
        }
        let percentages: Vec<f64> = r
            .handler()
            .iter()
            .filter_map(|rep| match rep {
                Report::Progress { percentage, .. } => Some(*percentage),
                _ => None,
            })
            .collect();
        assert_eq!(percentages, vec![1.2, 2.0]);
        assert_eq!(r.state().unwrap().last_displayed_progress, 2.0);
        assert_eq!(r.handler().len(), 2);
    }

    #[test]
    fn zero_progress_detailed_lines_have_no_eta() {
        let (mut r, clock) = reporter();
        for _ in 0..10 {
            clock.advance(Duration::from_secs(11));
            r.on_after_chunk(Some(0.0));
        }
        let detailed: Vec<&Report> = r.handler().iter().filter(|rep| is_detailed(rep)).collect();
        assert_eq!(detailed.len(), 10);
        assert!(detailed
            .iter()
            .all(|rep| matches!(rep, Report::Detailed { remaining: None, .. })));
        assert_eq!(count(r.handler(), is_progress), 0);
    }

    #[test]
    fn burst_yields_at_most_one_detailed_line() {
        let (mut r, clock) = reporter();
        clock.advance(Duration::from_secs(10));
        for i in 0..1000 {
            clock.advance(Duration::from_micros(900));
            r.on_after_chunk(Some(i as f64 * 0.005));
        }
        assert_eq!(count(r.handler(), is_detailed), 1);
        // 0.0 .. 4.995: crosses 1, 2, 3, 4
        assert_eq!(count(r.handler(), is_progress), 4);
        assert_eq!(count(r.handler(), is_summary), 0);
    }

    #[test]
    fn detailed_line_reports_linear_eta() {
        let (mut r, clock) = reporter();
        clock.advance(Duration::from_secs(20));
        r.on_after_chunk(Some(25.0));
        let detailed = r.handler().iter().find(|rep| is_detailed(rep)).cloned().unwrap();
        assert_eq!(
            detailed,
            Report::Detailed {
                percentage: 25.0,
                elapsed: Duration::from_secs(20),
                remaining: Some(Duration::from_secs(60)),
            }
        );
    }

    #[test]
    fn summary_at_most_once_per_minute() {
        let (mut r, clock) = reporter();
        for i in 0..300 {
            clock.advance(Duration::from_secs(1));
            r.on_after_chunk(Some(i as f64 / 10.0));
        }
        assert_eq!(count(r.handler(), is_summary), 5);
        assert_eq!(count(r.handler(), is_detailed), 30);
    }

    #[test]
    fn cadences_are_independent() {
        let (mut r, clock) = reporter();
        clock.advance(Duration::from_secs(60));
        r.on_after_chunk(Some(50.0));
        assert_eq!(count(r.handler(), is_progress), 1);
        assert_eq!(count(r.handler(), is_detailed), 1);
        assert_eq!(count(r.handler(), is_summary), 1);
    }

    #[test]
    fn missing_page_number_is_unknown() {
        let (mut r, _clock) = reporter();
        r.handle(UploadEvent::PrePage { page_number: None });
        r.handle(UploadEvent::AfterPage { page_number: Some(2) });
        let lines: Vec<String> = r.handler().iter().map(|rep| rep.to_string()).collect();
        assert_eq!(lines[0], "[page] uploading page unknown...");
        assert_eq!(lines[1], "[page] page 2 uploaded");
    }

    #[test]
    fn failed_without_message_uses_placeholder() {
        let (mut r, _clock) = reporter();
        r.handle(UploadEvent::Failed { error: None });
        assert_eq!(
            r.handler().last(),
            Some(&Report::Failed { message: "unknown error".to_string() })
        );
        assert!(r.is_terminal());
    }

    #[test]
    fn terminal_session_ignores_further_events() {
        let (mut r, clock) = reporter();
        r.on_after_chunk(Some(10.0));
        clock.advance(Duration::from_secs(5));
        r.handle(UploadEvent::Completed);
        let before = r.handler().len();
        assert!(r.state().is_none());

        clock.advance(Duration::from_secs(120));
        r.handle(UploadEvent::AfterChunk { percentage: Some(90.0) });
        r.handle(UploadEvent::PrePage { page_number: Some(2) });
        r.handle(UploadEvent::Failed { error: Some("late".into()) });
        r.on_completed();
        assert_eq!(r.handler().len(), before);
        assert_eq!(
            r.handler().last(),
            Some(&Report::Completed { elapsed: Duration::from_secs(5) })
        );
    }

    #[test]
    fn events_before_session_start_are_dropped() {
        let mut r = ProgressReporter::new(Vec::new(), ManualClock::new(), Cadence::default());
        r.handle(UploadEvent::PreUpload);
        r.handle(UploadEvent::AfterChunk { percentage: Some(50.0) });
        r.on_completed();
        assert!(r.handler().is_empty());
        assert!(!r.is_terminal());
    }

    #[test]
    fn regression_keeps_baseline_and_does_not_panic() {
        let (mut r, clock) = reporter();
        r.on_after_chunk(Some(40.0));
        r.on_after_chunk(Some(12.0));
        r.on_after_chunk(Some(40.5));
        assert_eq!(count(r.handler(), is_progress), 1);
        assert_eq!(r.state().unwrap().last_displayed_progress, 40.0);
        assert_eq!(r.state().unwrap().current_progress, 40.5);
        r.on_after_chunk(Some(41.0));
        assert_eq!(count(r.handler(), is_progress), 2);

        clock.advance(Duration::from_secs(10));
        r.on_after_chunk(Some(3.0));
        assert!(r.handler().iter().any(|rep| matches!(
            rep,
            Report::Detailed { percentage, remaining: Some(_), .. } if *percentage == 3.0
        )));
    }

    #[test]
    fn out_of_range_and_nan_percentages() {
        let (mut r, _clock) = reporter();
        r.on_after_chunk(Some(f64::NAN));
        r.on_after_chunk(None);
        assert!(r.handler().is_empty());
        r.on_after_chunk(Some(150.0));
        assert_eq!(r.state().unwrap().current_progress, 100.0);
        r.on_after_chunk(Some(-3.0));
        assert_eq!(r.state().unwrap().current_progress, 0.0);
    }

    #[test]
    fn pre_chunk_records_total() {
        let (mut r, _clock) = reporter();
        r.handle(UploadEvent::PreChunk { total_chunks: None });
        assert_eq!(r.state().unwrap().total_chunks, None);
        r.handle(UploadEvent::PreChunk { total_chunks: Some(64) });
        assert_eq!(r.state().unwrap().total_chunks, Some(64));
        assert_eq!(r.handler(), &vec![Report::ChunksPlanned { total: 64 }]);
    }

    #[test]
    fn session_restart_resets_state() {
        let (mut r, clock) = reporter();
        r.on_after_chunk(Some(80.0));
        r.on_failed(Some("network"));
        clock.advance(Duration::from_secs(30));
        r.on_session_start();
        let state = r.state().unwrap();
        assert_eq!(state.last_displayed_progress, 0.0);
        assert_eq!(state.start_time, clock.now());
        assert_eq!(r.elapsed(), Some(Duration::ZERO));
    }

    #[test]
    fn custom_step() {
        let clock = ManualClock::new();
        let cadence = Cadence { percent_step: 10.0, ..Cadence::default() };
        let mut r = ProgressReporter::new(Vec::new(), clock, cadence);
        r.on_session_start();
        for p in 0..=100 {
            r.on_after_chunk(Some(p as f64));
        }
        assert_eq!(count(r.handler(), is_progress), 10);
    }

    #[test]
    fn unusable_step_falls_back_to_default() {
        for step in [f64::NAN, f64::INFINITY, -5.0] {
            let cadence = Cadence { percent_step: step, ..Cadence::default() };
            assert!(cadence.validate().is_err());
            let mut r = ProgressReporter::new(Vec::new(), ManualClock::new(), cadence);
            r.on_session_start();
            for p in [0.5, 1.2, 2.0, 3.5] {
                r.on_after_chunk(Some(p));
            }
            assert_eq!(count(r.handler(), is_progress), 3);
        }
        assert!(Cadence::default().validate().is_ok());
    }

    #[test]
    fn estimate_remaining_edges() {
        assert_eq!(estimate_remaining(Duration::from_secs(10), 0.0), None);
        assert_eq!(
            estimate_remaining(Duration::from_secs(10), 100.0),
            Some(Duration::ZERO)
        );
        assert_eq!(
            estimate_remaining(Duration::from_secs(10), 50.0),
            Some(Duration::from_secs(10))
        );
        assert_eq!(estimate_remaining(Duration::from_secs(10), 1e-20), None);
        assert_eq!(estimate_remaining(Duration::from_secs(10), f64::MIN_POSITIVE), None);
    }

    #[test]
    fn tiny_percentage_detailed_line_has_no_eta() {
        for tiny in [1e-20, f64::MIN_POSITIVE] {
            let (mut r, clock) = reporter();
            clock.advance(Duration::from_secs(10));
            r.on_after_chunk(Some(tiny));
            assert_eq!(
                r.handler(),
                &vec![Report::Detailed {
                    percentage: tiny,
                    elapsed: Duration::from_secs(10),
                    remaining: None,
                }]
            );
        }
    }

    proptest! {
        #[test]
        fn percent_lines_match_whole_steps_crossed(
            steps in proptest::collection::vec(0.0f64..0.99, 1..400)
        ) {
            let (mut r, _clock) = reporter();
            let mut p = 0.0f64;
            for s in steps {
                p = (p + s).min(100.0);
                r.on_after_chunk(Some(p));
            }
            let mut last_line = 0.0f64;
            for rep in r.handler() {
                if let Report::Progress { percentage, .. } = rep {
                    prop_assert!(*percentage >= last_line);
                    last_line = *percentage;
                }
            }
            let expected = p.floor() as usize;
            prop_assert_eq!(count(r.handler(), is_progress), expected);
        }
    }
}
