//! Console logging for the demo.
//!
//! The library emits `tracing` events (worker lifecycle, admission blocking,
//! lock timeouts and rollbacks); this module installs the subscriber that
//! prints them. Verbosity follows `RUST_LOG` and defaults to `info`, e.g.
//!
//! ```bash
//! RUST_LOG=corral=debug,info cargo run -p corral-demo -- --scenario pool
//! ```

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_telemetry() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_names(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true)
                .compact(),
        )
        .try_init()?;
    Ok(())
}
