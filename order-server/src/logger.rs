//! Logging Infrastructure
//!
//! `RUST_LOG` filters (default `order_server=info,tower_http=info`); output is
//! plain text or JSON, to stdout or a daily rolling file.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "order_server=info,tower_http=info";

/// Initialize the global subscriber
///
/// Keep the returned guard alive for the life of the process when logging to
/// a file; dropping it flushes and stops the writer thread.
pub fn init_logger(json: bool, log_dir: Option<&str>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if let Some(dir) = log_dir
        && Path::new(dir).is_dir()
    {
        let file_appender = tracing_appender::rolling::daily(dir, "order-server");
        let (writer, guard) = tracing_appender::non_blocking(file_appender);
        let builder = builder.with_writer(writer).with_ansi(false);
        if json {
            builder.json().init();
        } else {
            builder.init();
        }
        return Some(guard);
    }

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    None
}
