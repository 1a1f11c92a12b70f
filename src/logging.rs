//! Tracing subscriber setup for the binary.

use tracing::Level;

/// Install a stderr fmt subscriber. Repeated calls are ignored.
pub fn init_logging(level: Level) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
