use std::io;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Warn,
    Info,
    Debug,
}

/// Install the stderr subscriber. Safe to call more than once; later
/// calls are no-ops.
pub fn init(level: Level) {
    let max_level = match level {
        Level::Warn => tracing::Level::WARN,
        Level::Info => tracing::Level::INFO,
        Level::Debug => tracing::Level::DEBUG,
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}
