//! Tracing subscriber setup for the `profiling` feature
//!
//! With the feature on, spawn, despawn, migration and query construction
//! open `info_span!`s. Install one of the subscribers below to collect them:
//!
//! ```ignore
//! let _guard = chunk_ecs::profiling::init_json_file("trace.json")?;
//! let mut world = World::new();
//! world.spawn((Position(0.0),))?;
//! ```
//!
//! Profile in release mode; use `RUST_LOG=chunk_ecs=trace` to see migrations.

use std::fs::File;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Human-readable events to stderr, filtered by `RUST_LOG`
///
/// Returns false if a global subscriber was already installed.
pub fn init_tracing() -> bool {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter())
        .try_init()
        .is_ok()
}

/// JSON events and span closings written to `path` off the hot thread
///
/// Keep the guard alive until profiling ends; dropping it flushes the file.
pub fn init_json_file(path: impl AsRef<Path>) -> std::io::Result<WorkerGuard> {
    let file = File::create(path)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    let layer = tracing_subscriber::fmt::layer()
        .json()
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .with_writer(non_blocking);

    if tracing_subscriber::registry()
        .with(layer)
        .with(env_filter())
        .try_init()
        .is_err()
    {
        tracing::warn!("global subscriber already set; trace file stays empty");
    }
    Ok(guard)
}
