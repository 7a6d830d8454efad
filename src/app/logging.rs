use crate::config::AppConfig;
use std::io;
use std::sync::OnceLock;
use tracing_subscriber::fmt::time::UtcTime;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Install the process-wide tracing subscriber. Later calls are no-ops, as is
/// any call with `--no-logs`.
pub fn init_tracing(config: &AppConfig) {
    if config.no_logs {
        return;
    }

    let level = config.log_level.as_tracing();
    let json = config.log_json;
    let _ = TRACING_INIT.get_or_init(|| {
        let builder = tracing_subscriber::fmt()
            .with_timer(UtcTime::rfc_3339())
            .with_max_level(level)
            .with_thread_names(true)
            .with_writer(io::stderr);
        if json {
            let subscriber = builder
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .finish();
            let _ = tracing::subscriber::set_global_default(subscriber);
        } else {
            let _ = tracing::subscriber::set_global_default(builder.finish());
        }
    });
}
