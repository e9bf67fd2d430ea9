//! Gesture classifier adapter: owns the pretrained model's lifecycle and
//! shields the sampling loop from its contract quirks (one-time IMAGE→VIDEO
//! mode switch, strictly increasing timestamps).

use log::debug;

use crate::error::GestureError;
use crate::gestures::ClassifierFrameResult;
use crate::video::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunningMode {
    Image,
    Video,
}

/// The pretrained frame-classification model behind the adapter.
///
/// `recognize` must only be called after `load` succeeded and `set_mode`
/// switched the model into [`RunningMode::Video`]; the adapter enforces both.
pub trait GestureModel {
    fn load(&mut self) -> Result<(), GestureError>;
    fn set_mode(&mut self, mode: RunningMode) -> Result<(), GestureError>;
    fn recognize(
        &mut self,
        frame: &Frame,
        timestamp_ms: u64,
    ) -> Result<ClassifierFrameResult, GestureError>;
    /// Release model resources. Must tolerate being called before `load`.
    fn close(&mut self);
}

pub struct ClassifierAdapter<M: GestureModel> {
    model: M,
    initialized: bool,
    mode: RunningMode,
    last_timestamp_ms: Option<u64>,
}

impl<M: GestureModel> ClassifierAdapter<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            initialized: false,
            mode: RunningMode::Image,
            last_timestamp_ms: None,
        }
    }

    /// Load model assets. Idempotent; a failure leaves the adapter
    /// uninitialized so a later retry is possible.
    pub fn initialize(&mut self) -> Result<(), GestureError> {
        if self.initialized {
            return Ok(());
        }
        self.model.load()?;
        self.initialized = true;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Classify one frame. Returns `Ok(None)` when the frame was skipped
    /// because its timestamp had not advanced past the previous call; the
    /// caller must leave its gesture state untouched in that case.
    pub fn classify(
        &mut self,
        frame: &Frame,
        timestamp_ms: u64,
    ) -> Result<Option<ClassifierFrameResult>, GestureError> {
        if !self.initialized {
            return Err(GestureError::Classification(
                "classifier not initialized".to_string(),
            ));
        }
        if self.mode == RunningMode::Image {
            // one-time transition; must complete before the first
            // classification in streaming mode
            self.model.set_mode(RunningMode::Video)?;
            self.mode = RunningMode::Video;
        }
        if let Some(last) = self.last_timestamp_ms {
            if timestamp_ms <= last {
                debug!("skipping frame: timestamp {timestamp_ms} has not advanced past {last}");
                return Ok(None);
            }
        }
        self.last_timestamp_ms = Some(timestamp_ms);
        self.model.recognize(frame, timestamp_ms).map(Some)
    }

    #[cfg(test)]
    pub(crate) fn model_ref(&self) -> &M {
        &self.model
    }

    /// Release model resources. Safe to call before `initialize` and safe to
    /// call twice.
    pub fn dispose(&mut self) {
        self.model.close();
        self.initialized = false;
        self.mode = RunningMode::Image;
        self.last_timestamp_ms = None;
    }
}
