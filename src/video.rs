//! Video source boundary & camera discovery.

use std::fs;
use std::time::Instant;

/// One decoded video frame. The source owns the backing buffer; callers only
/// ever borrow it for the duration of a classification call.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// A live video stream. Read-only except for the lifecycle calls; dimensions
/// are (0, 0) until the stream is ready.
pub trait VideoSource {
    fn dimensions(&self) -> (u32, u32);
    /// Playback clock in milliseconds. Advances once per decoded frame, so an
    /// unchanged value means the current frame was already seen.
    fn current_time_ms(&self) -> u64;
    fn frame(&self) -> &Frame;
    fn start(&mut self);
    fn stop(&mut self);
}

/// Wall-clock driven stand-in for a camera stream. Reports no dimensions
/// during a configurable warmup, then advances its playback clock at a fixed
/// frame interval. Used by the replay pipeline and demos.
#[derive(Debug)]
pub struct SyntheticSource {
    warmup_ms: u64,
    frame_interval_ms: u64,
    started_at: Option<Instant>,
    frame: Frame,
}

impl SyntheticSource {
    pub fn new(warmup_ms: u64, frame_interval_ms: u64) -> Self {
        Self {
            warmup_ms,
            frame_interval_ms: frame_interval_ms.max(1),
            started_at: None,
            frame: Frame {
                width: 640,
                height: 480,
                data: Vec::new(),
            },
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.started_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }

    fn ready(&self) -> bool {
        self.started_at.is_some() && self.elapsed_ms() >= self.warmup_ms
    }
}

impl VideoSource for SyntheticSource {
    fn dimensions(&self) -> (u32, u32) {
        if self.ready() {
            (self.frame.width, self.frame.height)
        } else {
            (0, 0)
        }
    }

    fn current_time_ms(&self) -> u64 {
        if !self.ready() {
            return 0;
        }
        // quantized to whole frames
        let playing = self.elapsed_ms() - self.warmup_ms;
        playing - playing % self.frame_interval_ms
    }

    fn frame(&self) -> &Frame {
        &self.frame
    }

    fn start(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
    }

    fn stop(&mut self) {
        self.started_at = None;
    }
}

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
}

/// List V4L capture nodes. Informational only (doctor report, pipeline
/// startup logging); frame acquisition always goes through [`VideoSource`].
pub fn discover_cameras() -> Vec<DeviceInfo> {
    let mut out = vec![];
    if let Ok(rd) = fs::read_dir("/dev") {
        for e in rd.flatten() {
            let p = e.path();
            if p.file_name()
                .and_then(|s| s.to_str())
                .map(|s| s.starts_with("video"))
                .unwrap_or(false)
            {
                out.push(DeviceInfo {
                    path: p.display().to_string(),
                });
            }
        }
    }
    out.sort_by(|a, b| a.path.cmp(&b.path));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_source_not_ready_before_start() {
        let src = SyntheticSource::new(0, 16);
        assert_eq!(src.dimensions(), (0, 0));
        assert_eq!(src.current_time_ms(), 0);
    }

    #[test]
    fn synthetic_source_ready_after_zero_warmup() {
        let mut src = SyntheticSource::new(0, 16);
        src.start();
        assert_eq!(src.dimensions(), (640, 480));
    }

    #[test]
    fn stop_resets_readiness() {
        let mut src = SyntheticSource::new(0, 16);
        src.start();
        src.stop();
        assert_eq!(src.dimensions(), (0, 0));
    }
}
