use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_DIR: &str = "logs";
const DEFAULT_DIRECTIVE: &str = "catalog_ingest=info";

/// Console output plus a daily-rolling JSON file under `logs/`.
///
/// `RUST_LOG` overrides the default filter. Keep the returned guard alive for
/// the life of the process so buffered file output is flushed on exit.
pub fn init_logging() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    if let Err(e) = fs::create_dir_all(LOG_DIR) {
        eprintln!("Could not create {LOG_DIR}/ ({e}); logging to console only");
        let console_layer = fmt::layer().with_writer(std::io::stdout);
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .try_init();
        return None;
    }

    let file_appender = tracing_appender::rolling::daily(LOG_DIR, "ingest.log");
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);
    let console_layer = fmt::layer().with_writer(std::io::stdout);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init();

    Some(guard)
}
