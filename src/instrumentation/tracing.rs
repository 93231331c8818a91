//! Tracing subscriber wiring, grounded on
//! `services/log-collector/src/instrumentation/tracing.rs`: an `EnvFilter`
//! gate, a human-readable layer and a JSON layer sharing one non-blocking
//! rolling-file writer, and an `ErrorLayer` so `anyhow::Error` contexts carry
//! spantraces.

use std::panic;

use tracing::error;
use tracing_appender::rolling;
use tracing_error::ErrorLayer;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*, registry::Registry};

pub fn init_tracing() {
    let file_appender = rolling::daily("./logs", "threatlens-core.log");
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);
    // Leaked intentionally: the writer must outlive `init_tracing`'s caller,
    // and this is called exactly once at process start.
    Box::leak(Box::new(guard));

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_ansi(true)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let json_layer = fmt::layer()
        .json()
        .with_ansi(false)
        .with_writer(non_blocking_writer)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let error_layer = ErrorLayer::default();

    let subscriber = Registry::default()
        .with(filter)
        .with(fmt_layer)
        .with(json_layer)
        .with(error_layer);

    tracing::subscriber::set_global_default(subscriber)
        .expect("failed to set global tracing subscriber");
}

pub fn init_panic_handler() {
    panic::set_hook(Box::new(|panic_info| {
        let msg = match panic_info.payload().downcast_ref::<&str>() {
            Some(s) => *s,
            None => "unknown panic",
        };

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());

        error!(message = %msg, location = %location, "threatlens-core panicked");
    }));
}
