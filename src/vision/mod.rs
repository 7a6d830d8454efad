//! Vision detection pipeline wiring.
//!
//! A producer task pushes captured frames into a two-slot queue and blocks
//! when the detector falls behind, so no captured frame is lost. The detector
//! task publishes each verdict into a single-slot mailbox; an unread verdict
//! is replaced by the newer one, so the aggregator only ever sees the latest
//! detection state.

mod replay;

pub use replay::{ScriptedCamera, ScriptedDetector, VisionScript};

use crate::clock::Sleeper;
use crate::event::{DetectionEvent, Source};
use crate::queue::{MailboxSender, QueueReceiver, QueueSender};
use crate::supervisor::RunFlag;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Frames the producer may run ahead of the detector.
pub const FRAME_QUEUE_CAPACITY: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb565,
    Grayscale,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb565 => 2,
            PixelFormat::Grayscale => 1,
        }
    }
}

/// Captured image handed from camera to detector without modification.
#[derive(Debug, Clone)]
pub struct Frame {
    pub sequence: u64,
    pub width: u16,
    pub height: u16,
    pub format: PixelFormat,
    pub data: Arc<[u8]>,
}

/// Camera driver.
pub trait FrameSource: Send {
    fn capture(&mut self) -> Result<Frame>;
}

/// Object detector run on each frame.
pub trait FrameDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<bool>;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn capture(&mut self) -> Result<Frame> {
        (**self).capture()
    }
}

impl<T: FrameDetector + ?Sized> FrameDetector for Box<T> {
    fn detect(&mut self, frame: &Frame) -> Result<bool> {
        (**self).detect(frame)
    }
}

/// Producer task body. Capture failures are logged and retried after the
/// frame interval.
pub fn run_frame_producer<F, S>(
    mut source: F,
    frames: QueueSender<Frame>,
    interval: Duration,
    mut sleeper: S,
    run: RunFlag,
) where
    F: FrameSource,
    S: Sleeper,
{
    while run.is_running() {
        match source.capture() {
            Ok(frame) => {
                if frames.push(frame).is_err() {
                    debug!("frame queue closed; camera task exiting");
                    return;
                }
            }
            Err(err) => warn!("frame capture failed: {err:#}"),
        }
        sleeper.sleep(interval);
    }
}

/// Detector task body. Runs until the producer side of `frames` is gone.
pub fn run_frame_detector<D>(
    mut detector: D,
    frames: QueueReceiver<Frame>,
    results: MailboxSender<DetectionEvent>,
) where
    D: FrameDetector,
{
    while let Some(frame) = frames.recv() {
        let detected = match detector.detect(&frame) {
            Ok(detected) => detected,
            Err(err) => {
                warn!(sequence = frame.sequence, "detector failed: {err:#}");
                continue;
            }
        };
        if detected {
            info!(sequence = frame.sequence, "vision target detected");
        }
        let event = DetectionEvent {
            source: Source::Vision,
            detected,
        };
        if results.push(event).is_err() {
            debug!("vision result mailbox closed; detector task exiting");
            return;
        }
    }
    if results.superseded() > 0 {
        debug!(
            superseded = results.superseded(),
            "vision verdicts replaced before the notifier read them"
        );
    }
}
