use std::backtrace::Backtrace;
use std::path::Path;

use tracing::error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FILE_NAME: &str = "eq_alert.log";

fn default_filter(debug: bool) -> &'static str {
    if debug {
        "debug,grammers_mtsender=info,grammers_session=info,rumqttc=info"
    } else {
        "info"
    }
}

/// Install the global subscriber: stdout plus an append-only log file.
///
/// `RUST_LOG` takes precedence over the `debug` flag. The returned guard
/// flushes the file writer when dropped and must live as long as the process.
pub fn init(debug: bool, log_dir: &Path) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE_NAME);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(debug)));

    let initialized = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_thread_names(true))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_names(true)
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .try_init();

    if let Err(e) = initialized {
        eprintln!("Failed to initialize logging: {}", e);
    }

    guard
}

/// Route panics through the subscriber with a captured backtrace, then
/// continue with the default hook.
pub fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let backtrace = Backtrace::force_capture();
        error!("Unhandled panic: {}\n{}", info, backtrace);
        default_hook(info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_raises_verbosity() {
        assert!(default_filter(true).starts_with("debug"));
        assert_eq!(default_filter(false), "info");
    }
}
