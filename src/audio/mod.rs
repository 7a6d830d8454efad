//! Audio classification pipeline.
//!
//! Feature slices arrive incrementally from an external frontend and are
//! appended to a fixed-length window. Whenever new slices show up the whole
//! window is handed to an inference engine, the int8 output tensor is
//! dequantized with the engine's own scale/zero-point, and a positive event is
//! emitted when the arg-max category is the target label and its score clears
//! the confidence threshold.

/// Default width of one feature slice (spectrogram bins).
pub const DEFAULT_SLICE_SIZE: usize = 40;

/// Default number of slices in a window.
pub const DEFAULT_SLICE_COUNT: usize = 49;

/// Default spacing between consecutive slices.
pub const DEFAULT_SLICE_STRIDE_MS: i64 = 20;

/// Capacity of the audio detection queue. Producers block when it is full.
pub const DETECTION_QUEUE_CAPACITY: usize = 10;

mod classifier;
mod engine;
mod replay;
#[cfg(test)]
mod tests;
mod window;

pub use classifier::{
    arg_max, dequantize, run_audio_task, AudioClassifier, ClassifierSettings, CycleOutcome,
};
pub use engine::{InferenceEngine, LinearEngine, LinearModel, QuantParams};
pub use replay::ReplaySliceSource;
pub use window::{FeatureLayout, FeatureProvider, FeatureWindow, SliceFeatureProvider, SliceSource};
