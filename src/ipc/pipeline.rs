//! The daemon's gesture pipeline thread.
//!
//! Owns the sampling loop end to end: builds the video source and model from
//! the active profile, runs the loop at the configured cadence, dispatches
//! emitted intents into the shared quiz session, and publishes the current
//! gesture for status reporting. Without a configured replay source the
//! thread still runs, serving manually injected gestures through the same
//! debounce path.

use anyhow::Result;
use log::{debug, info, warn};
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
        mpsc::Receiver,
    },
    thread,
    time::Duration,
};

use super::dispatch::{self, SharedSession};
use super::runtime::epoch_ms;
use crate::classifier::ClassifierAdapter;
use crate::config::Profile;
use crate::debounce::Intent;
use crate::error::GestureError;
use crate::gestures::GestureLabel;
use crate::replay::{ReplayScript, ScriptedModel};
use crate::sampler::{Phase, SamplingLoop, SleepPacer};
use crate::video::SyntheticSource;

/// State shared between the pipeline thread and the IPC handlers. Every
/// field has a single writer: the daemon main loop writes `profile` and the
/// dirty flags, IPC handlers write `session`, the pipeline writes `gesture`
/// and `phase`.
#[derive(Clone)]
pub struct PipelineShared {
    pub profile: Arc<Mutex<Profile>>,
    pub profile_dirty: Arc<AtomicBool>,
    pub session: SharedSession,
    pub session_reset: Arc<AtomicBool>,
    pub gesture: Arc<Mutex<GestureLabel>>,
    pub phase: Arc<Mutex<Phase>>,
}

impl PipelineShared {
    pub fn new(profile: Profile) -> Self {
        Self {
            profile: Arc::new(Mutex::new(profile)),
            profile_dirty: Arc::new(AtomicBool::new(false)),
            session: Arc::new(Mutex::new(None)),
            session_reset: Arc::new(AtomicBool::new(false)),
            gesture: Arc::new(Mutex::new(GestureLabel::Unknown)),
            phase: Arc::new(Mutex::new(Phase::Idle)),
        }
    }
}

pub fn run_pipeline(
    shared: PipelineShared,
    rx_inject: Receiver<GestureLabel>,
    stop: Arc<AtomicBool>,
) -> Result<()> {
    let (labels, settings, source, mut frame_interval_ms) = {
        let p = shared.profile.lock().unwrap();
        (
            p.label_map()?,
            p.sampler_settings(),
            p.source.clone(),
            p.thresholds.frame_interval_ms,
        )
    };

    let script = match &source.replay {
        Some(path) => match ReplayScript::load(path) {
            Ok(script) => {
                info!("replaying gesture script {}", path.display());
                Some(script)
            }
            Err(e) => {
                warn!("failed to load replay script, pipeline stays idle: {e}");
                None
            }
        },
        None => None,
    };
    let have_source = script.is_some();

    let video = SyntheticSource::new(source.warmup_ms, frame_interval_ms);
    let model = ScriptedModel::new(script.unwrap_or_else(|| ReplayScript { events: vec![] }));
    let mut sampler = SamplingLoop::new(video, ClassifierAdapter::new(model), labels, settings);

    if have_source {
        match sampler.start(&mut SleepPacer) {
            Ok(()) => info!("sampling loop running"),
            Err(e @ GestureError::ModelLoad(_)) => {
                // fatal for gesture input only; answer/next keep working
                warn!("gesture input unavailable: {e}");
            }
            Err(e) => warn!("sampling loop did not start: {e}"),
        }
    } else {
        info!("no gesture source configured; serving injected gestures only");
    }
    *shared.phase.lock().unwrap() = sampler.phase();

    loop {
        if stop.load(Ordering::SeqCst) {
            break;
        }

        if shared.profile_dirty.swap(false, Ordering::SeqCst) {
            let p = shared.profile.lock().unwrap();
            match p.label_map() {
                Ok(labels) => {
                    sampler.retune(labels, p.sampler_settings());
                    frame_interval_ms = p.thresholds.frame_interval_ms;
                    info!("pipeline retuned from profile");
                }
                // load-time validation makes this unreachable in practice
                Err(e) => warn!("keeping previous tuning: {e}"),
            }
        }
        if shared.session_reset.swap(false, Ordering::SeqCst) {
            sampler.reset_session();
        }

        let now_ms = epoch_ms();
        while let Ok(gesture) = rx_inject.try_recv() {
            let selected = dispatch::answer_selected(&shared.session);
            if let Some(intent) = sampler.inject(gesture, now_ms, selected) {
                handle_intent(intent, &shared.session, now_ms);
            }
        }

        let selected = dispatch::answer_selected(&shared.session);
        if let Some(intent) = sampler.cycle(now_ms, selected) {
            handle_intent(intent, &shared.session, now_ms);
        }

        *shared.gesture.lock().unwrap() = sampler.gesture();
        *shared.phase.lock().unwrap() = sampler.phase();

        thread::sleep(Duration::from_millis(frame_interval_ms));
    }

    // stop sampling, release the model, then the video source
    sampler.shutdown();
    *shared.phase.lock().unwrap() = sampler.phase();
    Ok(())
}

fn handle_intent(intent: Intent, session: &SharedSession, now_ms: u64) {
    match dispatch::apply_intent(intent, session, now_ms) {
        Ok(msg) => info!("[gesture] {msg}"),
        // dropped silently from the user's point of view
        Err(e) => debug!("gesture intent dropped: {e}"),
    }
}
