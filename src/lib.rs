//! Cat detector: camera and microphone pipelines feeding a cooldown-gated
//! webhook notifier, started behind a bounded network bootstrap.

pub mod app;
pub mod audio;
pub mod clock;
pub mod config;
pub mod connectivity;
pub mod event;
pub mod notify;
pub mod queue;
pub mod supervisor;
pub mod vision;

pub use app::{init_tracing, run_device};
pub use config::AppConfig;
pub use event::{DetectionEvent, Source};
