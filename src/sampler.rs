//! Frame sampling loop: paces the classifier at the video's frame rate and
//! feeds derived gestures into the debouncer.
//!
//! The loop is cooperative. Each call to [`SamplingLoop::cycle`] processes at
//! most one frame and returns; the driver (the daemon's pipeline thread)
//! reschedules the next cycle. `stop()` flips the phase, which the next cycle
//! observes at its top, so cancellation has at most one cycle of latency and
//! no cycle is ever interrupted mid-flight.

use std::time::Duration;

use log::warn;

use crate::classifier::{ClassifierAdapter, GestureModel};
use crate::debounce::{Intent, IntentEmitter};
use crate::error::GestureError;
use crate::gestures::{GestureLabel, LabelMap, derive_gesture};
use crate::video::VideoSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Starting,
    Running,
    Stopped,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

/// Pacing hook for the readiness poll. The daemon sleeps; tests count calls.
pub trait Pacer {
    fn wait(&mut self, d: Duration);
}

pub struct SleepPacer;

impl Pacer for SleepPacer {
    fn wait(&mut self, d: Duration) {
        std::thread::sleep(d);
    }
}

/// Tunables lifted from the active profile's `[thresholds]` table.
#[derive(Debug, Clone)]
pub struct SamplerSettings {
    pub min_confidence: f32,
    pub debounce_ms: u64,
    pub ready_poll_ms: u64,
    /// 0 = poll forever.
    pub ready_max_attempts: u32,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            min_confidence: 0.70,
            debounce_ms: 1000,
            ready_poll_ms: 100,
            ready_max_attempts: 300,
        }
    }
}

pub struct SamplingLoop<V: VideoSource, M: GestureModel> {
    video: V,
    classifier: ClassifierAdapter<M>,
    emitter: IntentEmitter,
    labels: LabelMap,
    settings: SamplerSettings,
    phase: Phase,
    last_video_time_ms: Option<u64>,
    gesture: GestureLabel,
}

impl<V: VideoSource, M: GestureModel> SamplingLoop<V, M> {
    pub fn new(video: V, classifier: ClassifierAdapter<M>, labels: LabelMap, settings: SamplerSettings) -> Self {
        let emitter = IntentEmitter::new(settings.debounce_ms);
        Self {
            video,
            classifier,
            emitter,
            labels,
            settings,
            phase: Phase::Idle,
            last_video_time_ms: None,
            gesture: GestureLabel::Unknown,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Most recent derived gesture, for on-screen feedback.
    pub fn gesture(&self) -> GestureLabel {
        self.gesture
    }

    /// Bring the loop up: load the model once, start the video source and
    /// poll until it reports real dimensions, then enter Running.
    ///
    /// A no-op when already Running. Model load failure and readiness-poll
    /// exhaustion both leave the loop in Idle so a later retry is possible;
    /// neither ever transitions to Running.
    pub fn start(&mut self, pacer: &mut impl Pacer) -> Result<(), GestureError> {
        if self.phase == Phase::Running {
            return Ok(());
        }
        self.phase = Phase::Starting;

        if let Err(e) = self.classifier.initialize() {
            self.phase = Phase::Idle;
            return Err(e);
        }
        self.video.start();

        let mut attempts: u32 = 0;
        loop {
            let (w, h) = self.video.dimensions();
            if w > 0 && h > 0 {
                break;
            }
            attempts += 1;
            if self.settings.ready_max_attempts != 0 && attempts >= self.settings.ready_max_attempts {
                self.phase = Phase::Idle;
                return Err(GestureError::VideoNotReady(attempts));
            }
            pacer.wait(Duration::from_millis(self.settings.ready_poll_ms));
        }

        self.last_video_time_ms = None;
        self.phase = Phase::Running;
        Ok(())
    }

    /// One sampling cycle: fetch → classify → derive → debounce.
    ///
    /// Returns an intent when this frame's gesture got through the debouncer.
    /// Cycles are skipped without touching gesture state when the loop is not
    /// Running, the video has no dimensions yet, or the playback clock has
    /// not advanced since the previous cycle. A per-frame classification
    /// error is logged and skipped the same way, so the scheduling chain
    /// never breaks.
    pub fn cycle(&mut self, now_ms: u64, answer_selected: bool) -> Option<Intent> {
        if self.phase != Phase::Running {
            return None;
        }
        let (w, h) = self.video.dimensions();
        if w == 0 || h == 0 {
            return None;
        }
        let video_time = self.video.current_time_ms();
        if self.last_video_time_ms == Some(video_time) {
            return None;
        }
        self.last_video_time_ms = Some(video_time);

        let result = match self.classifier.classify(self.video.frame(), now_ms) {
            Ok(Some(result)) => result,
            // timestamp had not advanced; nothing to derive
            Ok(None) => return None,
            Err(e) => {
                warn!("classification failed, keeping previous gesture: {e}");
                return None;
            }
        };

        self.gesture = derive_gesture(&result, &self.labels, self.settings.min_confidence);
        self.emitter.offer(self.gesture, now_ms, answer_selected)
    }

    /// Feed a gesture straight into the debouncer, bypassing the camera.
    /// Same suppression rules as the sampled path.
    pub fn inject(&mut self, gesture: GestureLabel, now_ms: u64, answer_selected: bool) -> Option<Intent> {
        self.gesture = gesture;
        self.emitter.offer(gesture, now_ms, answer_selected)
    }

    /// Cooperative stop. Safe to call in any phase, including before the loop
    /// ever reached Running.
    pub fn stop(&mut self) {
        if self.phase == Phase::Running {
            self.phase = Phase::Stopped;
        }
    }

    /// Apply a hot-reloaded profile. The debounce slot is cleared since the
    /// window length may have changed.
    pub fn retune(&mut self, labels: LabelMap, settings: SamplerSettings) {
        self.emitter = IntentEmitter::new(settings.debounce_ms);
        self.labels = labels;
        self.settings = settings;
    }

    /// Forget per-session detection state when a new quiz begins.
    pub fn reset_session(&mut self) {
        self.emitter.reset();
        self.gesture = GestureLabel::Unknown;
    }

    /// Tear the pipeline down: stop sampling, then release the model, then
    /// the video source. Order matters; disposing the model first would race
    /// an in-flight classification against released resources.
    pub fn shutdown(&mut self) {
        self.stop();
        self.classifier.dispose();
        self.video.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::gestures::{Candidate, ClassifierFrameResult};
    use crate::video::Frame;

    struct FakeVideo {
        ready_after_polls: u32,
        polls: Cell<u32>,
        time_ms: Cell<u64>,
        frame: Frame,
    }

    impl FakeVideo {
        fn ready() -> Self {
            Self::ready_after(0)
        }

        fn ready_after(polls: u32) -> Self {
            Self {
                ready_after_polls: polls,
                polls: Cell::new(0),
                time_ms: Cell::new(0),
                frame: Frame::default(),
            }
        }

        fn never_ready() -> Self {
            Self::ready_after(u32::MAX)
        }

        fn set_time(&self, t: u64) {
            self.time_ms.set(t);
        }
    }

    impl VideoSource for FakeVideo {
        fn dimensions(&self) -> (u32, u32) {
            let n = self.polls.get();
            self.polls.set(n.saturating_add(1));
            if n >= self.ready_after_polls { (640, 480) } else { (0, 0) }
        }

        fn current_time_ms(&self) -> u64 {
            self.time_ms.get()
        }

        fn frame(&self) -> &Frame {
            &self.frame
        }

        fn start(&mut self) {}
        fn stop(&mut self) {}
    }

    struct FakeModel {
        label: &'static str,
        score: f32,
        recognize_calls: u32,
        fail_on_call: Option<u32>,
    }

    impl FakeModel {
        fn steady(label: &'static str, score: f32) -> Self {
            Self {
                label,
                score,
                recognize_calls: 0,
                fail_on_call: None,
            }
        }
    }

    impl GestureModel for FakeModel {
        fn load(&mut self) -> Result<(), GestureError> {
            Ok(())
        }

        fn set_mode(&mut self, _mode: crate::classifier::RunningMode) -> Result<(), GestureError> {
            Ok(())
        }

        fn recognize(
            &mut self,
            _frame: &Frame,
            _timestamp_ms: u64,
        ) -> Result<ClassifierFrameResult, GestureError> {
            self.recognize_calls += 1;
            if self.fail_on_call == Some(self.recognize_calls) {
                return Err(GestureError::Classification("decode error".to_string()));
            }
            Ok(ClassifierFrameResult {
                candidates: vec![Candidate {
                    label: self.label.to_string(),
                    score: self.score,
                }],
            })
        }

        fn close(&mut self) {}
    }

    struct CountingPacer(u32);

    impl Pacer for CountingPacer {
        fn wait(&mut self, _d: Duration) {
            self.0 += 1;
        }
    }

    fn make_loop(video: FakeVideo, model: FakeModel) -> SamplingLoop<FakeVideo, FakeModel> {
        SamplingLoop::new(
            video,
            ClassifierAdapter::new(model),
            LabelMap::default(),
            SamplerSettings {
                ready_max_attempts: 5,
                ..SamplerSettings::default()
            },
        )
    }

    fn started_loop(video: FakeVideo, model: FakeModel) -> SamplingLoop<FakeVideo, FakeModel> {
        let mut lp = make_loop(video, model);
        lp.start(&mut CountingPacer(0)).unwrap();
        lp
    }

    #[test]
    fn start_waits_for_video_dimensions() {
        let mut lp = make_loop(FakeVideo::ready_after(3), FakeModel::steady("Thumb_Up", 0.9));
        let mut pacer = CountingPacer(0);
        lp.start(&mut pacer).unwrap();
        assert_eq!(lp.phase(), Phase::Running);
        assert_eq!(pacer.0, 3);
    }

    #[test]
    fn start_is_idempotent_while_running() {
        let mut lp = started_loop(FakeVideo::ready(), FakeModel::steady("Thumb_Up", 0.9));
        let mut pacer = CountingPacer(0);
        lp.start(&mut pacer).unwrap();
        assert_eq!(lp.phase(), Phase::Running);
        assert_eq!(pacer.0, 0);
    }

    #[test]
    fn video_never_ready_is_terminal_and_stop_stays_safe() {
        let mut lp = make_loop(FakeVideo::never_ready(), FakeModel::steady("Thumb_Up", 0.9));
        let err = lp.start(&mut CountingPacer(0)).unwrap_err();
        assert!(matches!(err, GestureError::VideoNotReady(5)));
        assert_ne!(lp.phase(), Phase::Running);
        lp.stop();
        assert_ne!(lp.phase(), Phase::Running);
        assert_eq!(lp.cycle(0, false), None);
    }

    #[test]
    fn model_load_failure_leaves_loop_idle() {
        struct BrokenModel;
        impl GestureModel for BrokenModel {
            fn load(&mut self) -> Result<(), GestureError> {
                Err(GestureError::ModelLoad("assets unreachable".to_string()))
            }
            fn set_mode(&mut self, _m: crate::classifier::RunningMode) -> Result<(), GestureError> {
                Ok(())
            }
            fn recognize(
                &mut self,
                _f: &Frame,
                _t: u64,
            ) -> Result<ClassifierFrameResult, GestureError> {
                unreachable!()
            }
            fn close(&mut self) {}
        }

        let mut lp = SamplingLoop::new(
            FakeVideo::ready(),
            ClassifierAdapter::new(BrokenModel),
            LabelMap::default(),
            SamplerSettings::default(),
        );
        assert!(matches!(
            lp.start(&mut CountingPacer(0)),
            Err(GestureError::ModelLoad(_))
        ));
        assert_eq!(lp.phase(), Phase::Idle);
    }

    #[test]
    fn unchanged_playback_time_skips_classification() {
        let mut lp = started_loop(FakeVideo::ready(), FakeModel::steady("Thumb_Up", 0.9));
        lp.video.set_time(40);
        lp.cycle(100, false);
        lp.cycle(116, false);
        lp.cycle(132, false);
        assert_eq!(lp.classifier_calls(), 1);
        lp.video.set_time(80);
        lp.cycle(148, false);
        assert_eq!(lp.classifier_calls(), 2);
    }

    #[test]
    fn held_gesture_emits_once_per_window() {
        // 5 seconds of Closed_Fist at ~60Hz: one intent per 1000ms window
        let mut lp = started_loop(FakeVideo::ready(), FakeModel::steady("Closed_Fist", 0.9));
        let mut emitted = 0;
        let mut t = 0;
        while t < 5000 {
            lp.video.set_time(t);
            if lp.cycle(t, false).is_some() {
                emitted += 1;
            }
            t += 16;
        }
        assert_eq!(emitted, 5);
    }

    #[test]
    fn classification_error_keeps_previous_gesture_and_loop_alive() {
        let mut lp = started_loop(
            FakeVideo::ready(),
            FakeModel {
                fail_on_call: Some(10),
                ..FakeModel::steady("Open_Palm", 0.9)
            },
        );
        for (i, t) in (0u64..).step_by(16).take(100).enumerate() {
            lp.video.set_time(t + 1);
            lp.cycle(t + 1, false);
            if i + 1 == 10 {
                // the failing frame leaves frame 9's derivation in place
                assert_eq!(lp.gesture(), GestureLabel::Three);
            }
        }
        assert_eq!(lp.phase(), Phase::Running);
        assert_eq!(lp.classifier_calls(), 100);
        assert_eq!(lp.gesture(), GestureLabel::Three);
    }

    #[test]
    fn stop_halts_cycles_cooperatively() {
        let mut lp = started_loop(FakeVideo::ready(), FakeModel::steady("Closed_Fist", 0.9));
        lp.video.set_time(16);
        assert!(lp.cycle(16, false).is_some());
        lp.stop();
        assert_eq!(lp.phase(), Phase::Stopped);
        lp.video.set_time(32);
        assert_eq!(lp.cycle(32, false), None);
        assert_eq!(lp.classifier_calls(), 1);
    }

    #[test]
    fn advance_gate_follows_selection_flag() {
        let mut lp = started_loop(FakeVideo::ready(), FakeModel::steady("Thumb_Up", 0.9));
        lp.video.set_time(16);
        assert_eq!(lp.cycle(16, false), None);
        // window expired, answer now selected
        lp.video.set_time(1100);
        assert_eq!(lp.cycle(1100, true), Some(Intent::Advance));
    }

    #[test]
    fn inject_uses_the_same_debounce_path() {
        let mut lp = make_loop(FakeVideo::never_ready(), FakeModel::steady("Thumb_Up", 0.9));
        assert_eq!(lp.inject(GestureLabel::Two, 0, false), Some(Intent::SelectOption(1)));
        assert_eq!(lp.inject(GestureLabel::Two, 500, false), None);
        assert_eq!(lp.inject(GestureLabel::Two, 1000, false), Some(Intent::SelectOption(1)));
        assert_eq!(lp.gesture(), GestureLabel::Two);
    }

    impl SamplingLoop<FakeVideo, FakeModel> {
        fn classifier_calls(&self) -> u32 {
            self.classifier.model_ref().recognize_calls
        }
    }
}
