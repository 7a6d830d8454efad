//! Device startup: connectivity bootstrap, pipeline construction and task
//! wiring.
//!
//! The startup path runs exactly once. It either reaches steady state (all
//! sensing and notification tasks spawned, the supervisor sealed) or restarts
//! the device.

pub mod logging;

pub use logging::init_tracing;

use crate::audio::{
    run_audio_task, AudioClassifier, FeatureProvider, InferenceEngine, LinearEngine,
    ReplaySliceSource, SliceFeatureProvider, DETECTION_QUEUE_CAPACITY,
};
use crate::clock::{Clock, MonotonicClock, Sleeper, ThreadSleeper};
use crate::config::{AppConfig, NotifyMode};
use crate::connectivity::{connect_or_restart, HostDevice, HostNetwork, HostStorage};
use crate::event::{DetectionEvent, Source};
use crate::notify::{NotificationSink, Notifier};
use crate::queue::{bounded_queue, mailbox, QueueReceiver};
use crate::supervisor::{RunFlag, TaskSpec, TaskSupervisor};
use crate::vision::{
    run_frame_detector, run_frame_producer, FrameDetector, FrameSource, ScriptedCamera,
    ScriptedDetector, VisionScript, FRAME_QUEUE_CAPACITY,
};
use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const CAMERA_TASK: TaskSpec = TaskSpec::new("camera", 64 * 1024);
pub const VISION_DETECTOR_TASK: TaskSpec = TaskSpec::new("vision-detector", 128 * 1024);
pub const AUDIO_TASK: TaskSpec = TaskSpec::new("audio", 256 * 1024);
// HTTP + TLS on the calling thread needs more headroom than the sensing loops.
pub const VISION_NOTIFIER_TASK: TaskSpec = TaskSpec::new("vision-notifier", 512 * 1024);
pub const AUDIO_NOTIFIER_TASK: TaskSpec = TaskSpec::new("audio-notifier", 512 * 1024);
pub const SHARED_NOTIFIER_TASK: TaskSpec = TaskSpec::new("notifier", 512 * 1024);

/// Camera driver plus frame detector.
pub struct VisionPipeline {
    pub camera: Box<dyn FrameSource>,
    pub detector: Box<dyn FrameDetector>,
    pub frame_interval: Duration,
}

pub type DynAudioClassifier<C> =
    AudioClassifier<Box<dyn FeatureProvider>, Box<dyn InferenceEngine>, C>;

pub struct AudioPipeline<C> {
    pub classifier: DynAudioClassifier<C>,
    pub classify_interval: Duration,
}

/// Sensing pipelines enabled for this run. At least one must be present.
pub struct Pipelines<C> {
    pub vision: Option<VisionPipeline>,
    pub audio: Option<AudioPipeline<C>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifySettings {
    pub mode: NotifyMode,
    pub cooldown: Duration,
}

/// Bootstrap connectivity, then run the detector until every task exits.
///
/// An exhausted retry budget restarts the process. Storage and hostname
/// failures are returned to the caller.
pub fn run_device(config: &AppConfig) -> Result<()> {
    let mut storage = HostStorage::new(&config.state_dir);
    let mut network = HostNetwork::for_url(&config.notify_url, config.notify_timeout())?;
    let waits = connect_or_restart(
        &mut storage,
        &mut network,
        &mut ThreadSleeper,
        &mut HostDevice,
        &config.credentials(),
        &config.hostname,
        config.retry_policy(),
    )?;
    info!(waits, boot = storage.boot_count(), "bootstrap complete");

    let clock = MonotonicClock::new();
    let pipelines = build_pipelines(config, clock)?;
    let settings = NotifySettings {
        mode: config.notify_mode,
        cooldown: config.cooldown(),
    };
    let run = RunFlag::new();
    let mut supervisor = TaskSupervisor::new();
    start_pipelines(
        &mut supervisor,
        pipelines,
        settings,
        clock,
        ThreadSleeper,
        || build_sink(config),
        &run,
    )?;
    supervisor.seal();
    supervisor.wait();
    Ok(())
}

#[cfg(feature = "http-notify")]
fn build_sink(config: &AppConfig) -> Result<crate::notify::HttpNotifier> {
    crate::notify::HttpNotifier::new(&config.notify_url, config.notify_timeout())
}

#[cfg(not(feature = "http-notify"))]
fn build_sink(_config: &AppConfig) -> Result<crate::notify::LogNotifier> {
    Ok(crate::notify::LogNotifier)
}

/// Load the replay inputs named on the command line.
pub fn build_pipelines<C: Clock>(config: &AppConfig, clock: C) -> Result<Pipelines<C>> {
    let vision = match &config.vision_script {
        Some(path) => {
            let script = Arc::new(VisionScript::load(path)?);
            info!(frames = script.frames.len(), "vision pipeline enabled");
            Some(VisionPipeline {
                camera: Box::new(ScriptedCamera::new(Arc::clone(&script))),
                detector: Box::new(ScriptedDetector::new(script)),
                frame_interval: config.frame_interval(),
            })
        }
        None => None,
    };

    let audio = match (&config.audio_model, &config.audio_slices) {
        (Some(model), Some(slices)) => {
            let layout = config.feature_layout();
            let engine = LinearEngine::load(model)?;
            let labels = engine.labels().to_vec();
            let source = ReplaySliceSource::load(slices, layout.slice_size, layout.stride_ms)?;
            info!(
                slices = source.len(),
                labels = labels.len(),
                target = %config.target_label,
                "audio pipeline enabled"
            );
            let provider: Box<dyn FeatureProvider> = Box::new(SliceFeatureProvider::new(source));
            let engine: Box<dyn InferenceEngine> = Box::new(engine);
            let classifier = AudioClassifier::new(
                provider,
                engine,
                clock,
                layout,
                config.classifier_settings(labels),
            )?;
            Some(AudioPipeline {
                classifier,
                classify_interval: config.classify_interval(),
            })
        }
        _ => None,
    };

    Ok(Pipelines { vision, audio })
}

/// Create the queues and spawn every sensing and notification task.
///
/// `make_sink` is called once per notifier task.
pub fn start_pipelines<C, S, K, F>(
    supervisor: &mut TaskSupervisor,
    pipelines: Pipelines<C>,
    settings: NotifySettings,
    clock: C,
    sleeper: S,
    mut make_sink: F,
    run: &RunFlag,
) -> Result<()>
where
    C: Clock + Clone + 'static,
    S: Sleeper + Clone + 'static,
    K: NotificationSink + 'static,
    F: FnMut() -> Result<K>,
{
    if pipelines.vision.is_none() && pipelines.audio.is_none() {
        bail!("no sensing pipeline configured (use --vision-script or --audio-model with --audio-slices)");
    }

    let mut detections: Vec<(Source, QueueReceiver<DetectionEvent>)> = Vec::new();

    if let Some(vision) = pipelines.vision {
        let VisionPipeline {
            camera,
            detector,
            frame_interval,
        } = vision;
        let (frame_tx, frame_rx) = bounded_queue(FRAME_QUEUE_CAPACITY);
        let (result_tx, result_rx) = mailbox();
        let camera_sleeper = sleeper.clone();
        let camera_run = run.clone();
        supervisor.spawn(CAMERA_TASK, move || {
            run_frame_producer(camera, frame_tx, frame_interval, camera_sleeper, camera_run)
        })?;
        supervisor.spawn(VISION_DETECTOR_TASK, move || {
            run_frame_detector(detector, frame_rx, result_tx)
        })?;
        detections.push((Source::Vision, result_rx));
    }

    if let Some(audio) = pipelines.audio {
        let AudioPipeline {
            classifier,
            classify_interval,
        } = audio;
        let (event_tx, event_rx) = bounded_queue(DETECTION_QUEUE_CAPACITY);
        let audio_sleeper = sleeper.clone();
        let audio_run = run.clone();
        supervisor.spawn(AUDIO_TASK, move || {
            run_audio_task(classifier, event_tx, classify_interval, audio_sleeper, audio_run)
        })?;
        detections.push((Source::Audio, event_rx));
    }

    match settings.mode {
        NotifyMode::PerChannel => {
            for (source, events) in detections {
                let spec = match source {
                    Source::Vision => VISION_NOTIFIER_TASK,
                    Source::Audio => AUDIO_NOTIFIER_TASK,
                };
                let mut notifier =
                    Notifier::new(source.label(), settings.cooldown, make_sink()?, clock.clone());
                supervisor.spawn(spec, move || notifier.run(events))?;
            }
        }
        NotifyMode::Shared => {
            let queues: Vec<_> = detections.into_iter().map(|(_, events)| events).collect();
            let mut notifier = Notifier::new("shared", settings.cooldown, make_sink()?, clock);
            supervisor.spawn(SHARED_NOTIFIER_TASK, move || notifier.run_shared(&queues))?;
        }
    }

    Ok(())
}
