use super::{
    arg_max, dequantize, run_audio_task, AudioClassifier, ClassifierSettings, CycleOutcome,
    FeatureLayout, FeatureProvider, FeatureWindow, InferenceEngine, QuantParams,
};
use crate::clock::{Clock, ManualClock, Sleeper};
use crate::event::{DetectionEvent, Source};
use crate::queue::bounded_queue;
use crate::supervisor::RunFlag;
use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::time::Duration;

const LAYOUT: FeatureLayout = FeatureLayout {
    slice_size: 2,
    slice_count: 3,
    stride_ms: 20,
};

const LABELS: [&str; 4] = ["silence", "unknown", "meow", "purr"];
const MEOW: usize = 2;

/// Replies with a scripted slice count per call and writes a marker slice.
struct ScriptedProvider {
    replies: VecDeque<Result<usize>>,
    marker: i8,
    calls: Vec<(i64, i64)>,
}

impl ScriptedProvider {
    fn new(replies: Vec<Result<usize>>) -> Self {
        Self {
            replies: replies.into(),
            marker: 0,
            calls: Vec::new(),
        }
    }
}

impl FeatureProvider for ScriptedProvider {
    fn populate(&mut self, window: &mut FeatureWindow, previous: i64, current: i64) -> Result<usize> {
        self.calls.push((previous, current));
        let reply = self.replies.pop_front().unwrap_or(Ok(1))?;
        for _ in 0..reply {
            self.marker += 1;
            window.append_slices(&[self.marker; 2])?;
        }
        Ok(reply)
    }
}

/// Returns a fixed raw output tensor and remembers what it was fed.
struct FixedEngine {
    input: Vec<i8>,
    output: Vec<i8>,
    quant: QuantParams,
    invocations: usize,
    last_input: Vec<i8>,
    fail: bool,
}

impl FixedEngine {
    fn new(output: Vec<i8>, quant: QuantParams) -> Self {
        Self {
            input: vec![0; LAYOUT.element_count()],
            output,
            quant,
            invocations: 0,
            last_input: Vec::new(),
            fail: false,
        }
    }

    /// Unit-scale engine whose raw outputs are hundredths of a score.
    fn percent(scores: [i8; 4]) -> Self {
        Self::new(
            scores.to_vec(),
            QuantParams {
                scale: 0.01,
                zero_point: 0,
            },
        )
    }
}

impl InferenceEngine for FixedEngine {
    fn input_len(&self) -> usize {
        self.input.len()
    }

    fn output_len(&self) -> usize {
        self.output.len()
    }

    fn input_mut(&mut self) -> &mut [i8] {
        &mut self.input
    }

    fn invoke(&mut self) -> Result<()> {
        self.invocations += 1;
        if self.fail {
            return Err(anyhow!("interpreter not ready"));
        }
        self.last_input = self.input.clone();
        Ok(())
    }

    fn output(&self) -> &[i8] {
        &self.output
    }

    fn output_quant(&self) -> QuantParams {
        self.quant
    }
}

fn settings(threshold: f32) -> ClassifierSettings {
    ClassifierSettings {
        labels: LABELS.iter().map(|l| l.to_string()).collect(),
        target_label: "meow".to_string(),
        threshold,
    }
}

fn classifier(
    provider: ScriptedProvider,
    engine: FixedEngine,
    clock: ManualClock,
) -> AudioClassifier<ScriptedProvider, FixedEngine, ManualClock> {
    AudioClassifier::new(provider, engine, clock, LAYOUT, settings(0.85)).unwrap()
}

#[test]
fn arg_max_prefers_first_of_tied_scores() {
    assert_eq!(arg_max(&[0.2, 0.9, 0.9]), Some((1, 0.9)));
}

#[test]
fn arg_max_of_empty_scores_is_none() {
    assert_eq!(arg_max(&[]), None);
}

#[test]
fn dequantize_uses_supplied_parameters() {
    let quant = QuantParams {
        scale: 0.5,
        zero_point: 2,
    };
    assert_eq!(dequantize(&[2, 4, -2], quant), vec![0.0, 1.0, -2.0]);
}

#[test]
fn score_equal_to_threshold_is_not_a_detection() {
    let mut output = vec![0i8; 4];
    output[MEOW] = 1;
    let exact = FixedEngine::new(
        output.clone(),
        QuantParams {
            scale: 0.85,
            zero_point: 0,
        },
    );
    let mut audio = classifier(ScriptedProvider::new(vec![Ok(1)]), exact, ManualClock::new());
    let outcome = audio.step();
    assert_eq!(
        outcome,
        CycleOutcome::Classified {
            top_index: MEOW,
            score: 0.85,
            detected: false
        }
    );

    let above = FixedEngine::new(
        output,
        QuantParams {
            scale: 0.85 + f32::EPSILON,
            zero_point: 0,
        },
    );
    let mut audio = classifier(ScriptedProvider::new(vec![Ok(1)]), above, ManualClock::new());
    assert!(audio.step().detected());
}

#[test]
fn confident_meow_is_detected() {
    let engine = FixedEngine::percent([2, 3, 90, 5]);
    let mut audio = classifier(ScriptedProvider::new(vec![Ok(3)]), engine, ManualClock::new());
    let outcome = audio.step();
    assert!(outcome.detected(), "got {outcome:?}");
}

#[test]
fn confident_other_label_is_not_detected() {
    let engine = FixedEngine::percent([2, 95, 1, 2]);
    let mut audio = classifier(ScriptedProvider::new(vec![Ok(1)]), engine, ManualClock::new());
    match audio.step() {
        CycleOutcome::Classified {
            top_index,
            detected,
            ..
        } => {
            assert_eq!(top_index, 1);
            assert!(!detected);
        }
        other => panic!("expected classification, got {other:?}"),
    }
}

#[test]
fn decision_follows_engine_quantization_metadata() {
    // Same raw tensor, different per-model scale and zero point.
    let raw = vec![-128i8, -128, 100, -128];
    let confident = FixedEngine::new(
        raw.clone(),
        QuantParams {
            scale: 1.0 / 256.0,
            zero_point: -128,
        },
    );
    let timid = FixedEngine::new(
        raw,
        QuantParams {
            scale: 1.0 / 512.0,
            zero_point: -128,
        },
    );
    let mut a = classifier(ScriptedProvider::new(vec![Ok(1)]), confident, ManualClock::new());
    let mut b = classifier(ScriptedProvider::new(vec![Ok(1)]), timid, ManualClock::new());
    assert!(a.step().detected());
    assert!(!b.step().detected());
}

#[test]
fn stale_cycle_skips_inference_and_advances_cursor() {
    let clock = ManualClock::new();
    clock.set(Duration::from_millis(400));
    let engine = FixedEngine::percent([0, 0, 99, 0]);
    let mut audio = classifier(ScriptedProvider::new(vec![Ok(0)]), engine, clock);

    let (outcome, updated) = audio.classify_cycle(380);
    assert_eq!(outcome, CycleOutcome::Stale);
    assert_eq!(updated, 400);
    assert_eq!(audio.engine().invocations, 0);
}

#[test]
fn feature_failure_keeps_cursor_and_skips_inference() {
    let clock = ManualClock::new();
    clock.set(Duration::from_millis(1_000));
    let engine = FixedEngine::percent([0, 0, 99, 0]);
    let provider = ScriptedProvider::new(vec![Err(anyhow!("ring buffer empty"))]);
    let mut audio = classifier(provider, engine, clock);

    let (outcome, updated) = audio.classify_cycle(960);
    assert_eq!(outcome, CycleOutcome::FeatureError);
    assert_eq!(updated, 960);
    assert_eq!(audio.engine().invocations, 0);
}

#[test]
fn inference_failure_is_local_and_advances_cursor() {
    let clock = ManualClock::new();
    clock.set(Duration::from_millis(60));
    let mut engine = FixedEngine::percent([0, 0, 99, 0]);
    engine.fail = true;
    let mut audio = classifier(ScriptedProvider::new(vec![Ok(1)]), engine, clock);

    assert_eq!(audio.step(), CycleOutcome::InferenceError);
    assert_eq!(audio.previous_time(), 60);
}

#[test]
fn step_passes_cursor_between_cycles() {
    let clock = ManualClock::new();
    let engine = FixedEngine::percent([50, 0, 0, 0]);
    let provider = ScriptedProvider::new(vec![Ok(3), Ok(0), Ok(1)]);
    let mut audio = classifier(provider, engine, clock.clone());

    clock.set(Duration::from_millis(100));
    audio.step();
    clock.set(Duration::from_millis(110));
    audio.step();
    clock.set(Duration::from_millis(130));
    audio.step();
    assert_eq!(audio.provider().calls, vec![(0, 100), (100, 110), (110, 130)]);
}

#[test]
fn whole_window_is_copied_into_engine_input() {
    let engine = FixedEngine::percent([50, 0, 0, 0]);
    let mut audio = classifier(ScriptedProvider::new(vec![Ok(3), Ok(1)]), engine, ManualClock::new());
    audio.step();
    assert_eq!(audio.engine().last_input, vec![1, 1, 2, 2, 3, 3]);
    audio.step();
    assert_eq!(audio.engine().last_input, vec![2, 2, 3, 3, 4, 4]);
    assert_eq!(audio.window().as_slice(), audio.engine().last_input.as_slice());
}

#[test]
fn constructor_rejects_mismatched_input_tensor() {
    let mut engine = FixedEngine::percent([0; 4]);
    engine.input.push(0);
    let result = AudioClassifier::new(
        ScriptedProvider::new(Vec::new()),
        engine,
        ManualClock::new(),
        LAYOUT,
        settings(0.85),
    );
    let err = result.err().expect("input length mismatch must fail");
    assert!(err.to_string().contains("bad input tensor parameters"));
}

#[test]
fn constructor_rejects_label_count_mismatch() {
    let engine = FixedEngine::new(vec![0; 3], QuantParams { scale: 1.0, zero_point: 0 });
    let result = AudioClassifier::new(
        ScriptedProvider::new(Vec::new()),
        engine,
        ManualClock::new(),
        LAYOUT,
        settings(0.85),
    );
    assert!(result.is_err());
}

#[test]
fn constructor_rejects_unknown_target_label() {
    let mut cfg = settings(0.85);
    cfg.target_label = "bark".to_string();
    let result = AudioClassifier::new(
        ScriptedProvider::new(Vec::new()),
        FixedEngine::percent([0; 4]),
        ManualClock::new(),
        LAYOUT,
        cfg,
    );
    assert!(result.is_err());
}

/// Advances the shared clock on each sleep and stops the task after `budget` cycles.
struct SteppingSleeper {
    clock: ManualClock,
    run: RunFlag,
    budget: usize,
    slept: usize,
}

impl Sleeper for SteppingSleeper {
    fn sleep(&mut self, duration: Duration) {
        self.clock.advance(duration);
        self.slept += 1;
        if self.slept >= self.budget {
            self.run.stop();
        }
    }
}

#[test]
fn audio_task_publishes_only_positive_events() {
    let clock = ManualClock::new();
    let run = RunFlag::new();
    // Cycle 1 detects, cycle 2 is stale, cycle 3 detects again.
    let provider = ScriptedProvider::new(vec![Ok(3), Ok(0), Ok(1)]);
    let engine = FixedEngine::percent([1, 1, 97, 1]);
    let audio = classifier(provider, engine, clock.clone());
    let (tx, rx) = bounded_queue(10);
    let sleeper = SteppingSleeper {
        clock: clock.clone(),
        run: run.clone(),
        budget: 3,
        slept: 0,
    };

    run_audio_task(audio, tx, Duration::from_millis(20), sleeper, run);

    let events: Vec<DetectionEvent> = std::iter::from_fn(|| rx.recv()).collect();
    assert_eq!(events, vec![DetectionEvent::positive(Source::Audio); 2]);
    assert_eq!(clock.now(), Duration::from_millis(60));
}
