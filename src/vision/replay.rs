//! Scripted camera and detector for running the pipeline without hardware.

use super::{Frame, FrameDetector, FrameSource, PixelFormat};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;

fn default_dimension() -> u16 {
    240
}

/// Per-frame detector verdicts, replayed in a loop.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VisionScript {
    #[serde(default = "default_dimension")]
    pub width: u16,
    #[serde(default = "default_dimension")]
    pub height: u16,
    pub frames: Vec<bool>,
}

impl VisionScript {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read vision script {}", path.display()))?;
        let script: VisionScript = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse vision script {}", path.display()))?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<()> {
        if self.frames.is_empty() {
            bail!("vision script has no frames");
        }
        if self.width == 0 || self.height == 0 {
            bail!("vision script frame size must be non-zero");
        }
        Ok(())
    }

    fn verdict(&self, sequence: u64) -> bool {
        self.frames[(sequence % self.frames.len() as u64) as usize]
    }
}

/// Produces blank RGB565 frames numbered from zero.
pub struct ScriptedCamera {
    script: Arc<VisionScript>,
    next: u64,
    blank: Arc<[u8]>,
}

impl ScriptedCamera {
    pub fn new(script: Arc<VisionScript>) -> Self {
        let bytes = usize::from(script.width)
            * usize::from(script.height)
            * PixelFormat::Rgb565.bytes_per_pixel();
        Self {
            blank: Arc::from(vec![0u8; bytes]),
            script,
            next: 0,
        }
    }
}

impl FrameSource for ScriptedCamera {
    fn capture(&mut self) -> Result<Frame> {
        let sequence = self.next;
        self.next += 1;
        Ok(Frame {
            sequence,
            width: self.script.width,
            height: self.script.height,
            format: PixelFormat::Rgb565,
            data: self.blank.clone(),
        })
    }
}

/// Looks up the scripted verdict for each frame's sequence number.
pub struct ScriptedDetector {
    script: Arc<VisionScript>,
}

impl ScriptedDetector {
    pub fn new(script: Arc<VisionScript>) -> Self {
        Self { script }
    }
}

impl FrameDetector for ScriptedDetector {
    fn detect(&mut self, frame: &Frame) -> Result<bool> {
        if frame.width != self.script.width || frame.height != self.script.height {
            bail!(
                "frame {} is {}x{}, script expects {}x{}",
                frame.sequence,
                frame.width,
                frame.height,
                self.script.width,
                self.script.height
            );
        }
        let expected =
            usize::from(frame.width) * usize::from(frame.height) * frame.format.bytes_per_pixel();
        if frame.data.len() != expected {
            bail!(
                "frame {} carries {} bytes, expected {expected}",
                frame.sequence,
                frame.data.len()
            );
        }
        Ok(self.script.verdict(frame.sequence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(frames: Vec<bool>) -> Arc<VisionScript> {
        Arc::new(VisionScript {
            width: 4,
            height: 2,
            frames,
        })
    }

    #[test]
    fn camera_frames_match_script_geometry() {
        let mut camera = ScriptedCamera::new(script(vec![true]));
        let frame = camera.capture().unwrap();
        assert_eq!(frame.sequence, 0);
        assert_eq!(frame.data.len(), 4 * 2 * 2);
        assert_eq!(
            frame.data.len(),
            4 * 2 * frame.format.bytes_per_pixel()
        );
        assert_eq!(camera.capture().unwrap().sequence, 1);
    }

    #[test]
    fn detector_cycles_through_verdicts() {
        let shared = script(vec![false, true, false]);
        let mut camera = ScriptedCamera::new(shared.clone());
        let mut detector = ScriptedDetector::new(shared);
        let verdicts: Vec<bool> = (0..5)
            .map(|_| detector.detect(&camera.capture().unwrap()).unwrap())
            .collect();
        assert_eq!(verdicts, vec![false, true, false, false, true]);
    }

    #[test]
    fn detector_rejects_truncated_frame() {
        let shared = script(vec![true]);
        let mut frame = ScriptedCamera::new(shared.clone()).capture().unwrap();
        frame.data = Arc::from(vec![0u8; 3]);
        let err = ScriptedDetector::new(shared).detect(&frame).unwrap_err();
        assert!(err.to_string().contains("carries 3 bytes"));
    }

    #[test]
    fn script_parses_with_default_geometry() {
        let parsed: VisionScript = serde_json::from_str(r#"{"frames":[true,false]}"#).unwrap();
        assert_eq!((parsed.width, parsed.height), (240, 240));
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn empty_script_is_rejected() {
        let parsed: VisionScript = serde_json::from_str(r#"{"frames":[]}"#).unwrap();
        assert!(parsed.validate().is_err());
    }
}
