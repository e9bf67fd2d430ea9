//! Scripted classifier backend. Plays a TOML timeline of classifier results
//! against the synthetic video source, so the full pipeline can run without a
//! camera or model assets.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

use crate::classifier::{GestureModel, RunningMode};
use crate::error::GestureError;
use crate::gestures::{Candidate, ClassifierFrameResult};
use crate::video::Frame;

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayEvent {
    pub at_ms: u64,
    pub label: String,
    pub score: f32,
}

/// A timeline of scripted classifier outputs. Each event holds from its
/// `at_ms` until the next event; before the first event there are no hands.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayScript {
    #[serde(default)]
    pub events: Vec<ReplayEvent>,
}

impl ReplayScript {
    pub fn load(path: &Path) -> Result<Self> {
        let txt = fs::read_to_string(path)
            .with_context(|| format!("failed to read replay script {}", path.display()))?;
        let mut script: ReplayScript = toml::from_str(&txt)
            .with_context(|| format!("failed to parse replay script {}", path.display()))?;
        for ev in &script.events {
            if !(0.0..=1.0).contains(&ev.score) {
                return Err(anyhow!(
                    "replay event at {}ms has score {} outside [0,1]",
                    ev.at_ms,
                    ev.score
                ));
            }
        }
        script.events.sort_by_key(|e| e.at_ms);
        Ok(script)
    }

    fn result_at(&self, timestamp_ms: u64) -> ClassifierFrameResult {
        let active = self
            .events
            .iter()
            .take_while(|e| e.at_ms <= timestamp_ms)
            .last();
        match active {
            Some(ev) => ClassifierFrameResult {
                candidates: vec![Candidate {
                    label: ev.label.clone(),
                    score: ev.score,
                }],
            },
            None => ClassifierFrameResult::default(),
        }
    }
}

pub struct ScriptedModel {
    script: ReplayScript,
    loaded: bool,
    mode: RunningMode,
}

impl ScriptedModel {
    pub fn new(script: ReplayScript) -> Self {
        Self {
            script,
            loaded: false,
            mode: RunningMode::Image,
        }
    }
}

impl GestureModel for ScriptedModel {
    fn load(&mut self) -> Result<(), GestureError> {
        self.loaded = true;
        Ok(())
    }

    fn set_mode(&mut self, mode: RunningMode) -> Result<(), GestureError> {
        self.mode = mode;
        Ok(())
    }

    fn recognize(
        &mut self,
        _frame: &Frame,
        timestamp_ms: u64,
    ) -> Result<ClassifierFrameResult, GestureError> {
        if !self.loaded {
            return Err(GestureError::Classification(
                "scripted model not loaded".to_string(),
            ));
        }
        if self.mode != RunningMode::Video {
            return Err(GestureError::Classification(
                "scripted model not in video mode".to_string(),
            ));
        }
        Ok(self.script.result_at(timestamp_ms))
    }

    fn close(&mut self) {
        self.loaded = false;
    }
}
