use super::engine::{InferenceEngine, QuantParams};
use super::window::{FeatureLayout, FeatureProvider, FeatureWindow};
use crate::clock::{Clock, Sleeper};
use crate::event::{DetectionEvent, Source};
use crate::queue::QueueSender;
use crate::supervisor::RunFlag;
use anyhow::{bail, Result};
use std::fmt::Write as _;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Labels and decision policy for the audio classifier.
#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    /// Category names in model output order.
    pub labels: Vec<String>,
    pub target_label: String,
    /// The target score must be strictly greater than this.
    pub threshold: f32,
}

/// Result of one scheduling cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// The feature provider failed; retried next cycle.
    FeatureError,
    /// No new slices, so inference was skipped.
    Stale,
    /// The engine reported failure; no decision this cycle.
    InferenceError,
    Classified {
        top_index: usize,
        score: f32,
        detected: bool,
    },
}

impl CycleOutcome {
    pub fn detected(&self) -> bool {
        matches!(self, CycleOutcome::Classified { detected: true, .. })
    }
}

/// Dequantize every raw output with the tensor's affine parameters.
pub fn dequantize(raw: &[i8], quant: QuantParams) -> Vec<f32> {
    raw.iter().map(|value| quant.dequantize(*value)).collect()
}

/// Index and value of the highest score. The first index wins ties.
pub fn arg_max(scores: &[f32]) -> Option<(usize, f32)> {
    if scores.is_empty() {
        return None;
    }
    let mut best = 0usize;
    let mut best_score = f32::MIN;
    for (idx, score) in scores.iter().copied().enumerate() {
        if score > best_score {
            best = idx;
            best_score = score;
        }
    }
    Some((best, scores[best]))
}

/// Owns the feature window, the inference engine and the audio cursor.
///
/// Nothing here is shared: the task that drives [`step`](Self::step) is the
/// only one touching the engine's scratch memory.
pub struct AudioClassifier<P, E, C> {
    provider: P,
    engine: E,
    clock: C,
    window: FeatureWindow,
    labels: Vec<String>,
    target_label: String,
    threshold: f32,
    previous_time: i64,
}

impl<P, E, C> AudioClassifier<P, E, C>
where
    P: FeatureProvider,
    E: InferenceEngine,
    C: Clock,
{
    /// Check the engine's tensor shapes against the window and labels.
    pub fn new(
        provider: P,
        engine: E,
        clock: C,
        layout: FeatureLayout,
        settings: ClassifierSettings,
    ) -> Result<Self> {
        if engine.input_len() != layout.element_count() {
            bail!(
                "bad input tensor parameters: model expects {} values, feature window holds {} ({} slices x {})",
                engine.input_len(),
                layout.element_count(),
                layout.slice_count,
                layout.slice_size
            );
        }
        if engine.output_len() != settings.labels.len() {
            bail!(
                "model produces {} scores but {} labels are configured",
                engine.output_len(),
                settings.labels.len()
            );
        }
        if !settings.labels.iter().any(|l| *l == settings.target_label) {
            bail!(
                "target label '{}' is not one of [{}]",
                settings.target_label,
                settings.labels.join(", ")
            );
        }
        if !settings.threshold.is_finite() {
            bail!("confidence threshold must be finite");
        }
        debug!(
            input_len = engine.input_len(),
            categories = engine.output_len(),
            "audio classifier ready"
        );
        Ok(Self {
            provider,
            engine,
            clock,
            window: FeatureWindow::new(layout),
            labels: settings.labels,
            target_label: settings.target_label,
            threshold: settings.threshold,
            previous_time: 0,
        })
    }

    pub fn previous_time(&self) -> i64 {
        self.previous_time
    }

    pub fn window(&self) -> &FeatureWindow {
        &self.window
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Run one cycle from the stored cursor and advance it.
    pub fn step(&mut self) -> CycleOutcome {
        let (outcome, updated) = self.classify_cycle(self.previous_time);
        self.previous_time = updated;
        outcome
    }

    /// Run one cycle for the audio after `previous_time`, returning the outcome
    /// and the cursor for the next cycle.
    ///
    /// The cursor advances to the current audio timestamp whenever features
    /// were populated, including stale and failed-inference cycles. A feature
    /// failure returns `previous_time` unchanged.
    pub fn classify_cycle(&mut self, previous_time: i64) -> (CycleOutcome, i64) {
        let current_time = self.clock.now().as_millis() as i64;
        let new_slices = match self
            .provider
            .populate(&mut self.window, previous_time, current_time)
        {
            Ok(count) => count,
            Err(err) => {
                warn!("feature generation failed: {err:#}");
                return (CycleOutcome::FeatureError, previous_time);
            }
        };
        if new_slices == 0 {
            return (CycleOutcome::Stale, current_time);
        }

        let input = self.engine.input_mut();
        if input.len() != self.window.len() {
            warn!(
                expected = self.window.len(),
                actual = input.len(),
                "engine input buffer changed size; skipping cycle"
            );
            return (CycleOutcome::InferenceError, current_time);
        }
        input.copy_from_slice(self.window.as_slice());

        if let Err(err) = self.engine.invoke() {
            warn!("inference failed: {err:#}");
            return (CycleOutcome::InferenceError, current_time);
        }

        let scores = dequantize(self.engine.output(), self.engine.output_quant());
        let Some((top_index, score)) = arg_max(&scores) else {
            warn!("inference produced an empty output tensor");
            return (CycleOutcome::InferenceError, current_time);
        };
        debug!("scores: {}", format_scores(&self.labels, &scores, top_index));

        let top_label = self.labels.get(top_index).map(String::as_str);
        let detected = top_label == Some(self.target_label.as_str()) && score > self.threshold;
        (
            CycleOutcome::Classified {
                top_index,
                score,
                detected,
            },
            current_time,
        )
    }
}

/// `silence: 0.02  [meow: 0.90]  purr: 0.08` with the winner bracketed.
fn format_scores(labels: &[String], scores: &[f32], top_index: usize) -> String {
    let mut line = String::new();
    for (idx, (label, score)) in labels.iter().zip(scores).enumerate() {
        if idx > 0 {
            line.push_str("  ");
        }
        if idx == top_index {
            let _ = write!(line, "[{label}: {score:.2}]");
        } else {
            let _ = write!(line, "{label}: {score:.2}");
        }
    }
    line
}

/// Audio task body: classify, publish positives, sleep, repeat.
///
/// Only positive detections are published; a quiet cycle sends nothing.
pub fn run_audio_task<P, E, C, S>(
    mut classifier: AudioClassifier<P, E, C>,
    events: QueueSender<DetectionEvent>,
    interval: Duration,
    mut sleeper: S,
    run: RunFlag,
) where
    P: FeatureProvider,
    E: InferenceEngine,
    C: Clock,
    S: Sleeper,
{
    while run.is_running() {
        if let CycleOutcome::Classified {
            top_index,
            score,
            detected: true,
        } = classifier.step()
        {
            info!(
                label = classifier
                    .labels()
                    .get(top_index)
                    .map_or("?", String::as_str),
                score = f64::from(score),
                "audio target detected"
            );
            if events.push(DetectionEvent::positive(Source::Audio)).is_err() {
                debug!("audio detection queue closed; audio task exiting");
                return;
            }
        }
        sleeper.sleep(interval);
    }
}
