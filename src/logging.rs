//! Global logging setup for the viewer binary.

use std::{env, panic};

use tracing_subscriber::{
    fmt::{self, time::uptime},
    prelude::*,
    EnvFilter,
    Registry,
};

/// Install a compact stdout `tracing` subscriber. `default_filter` comes from
/// the engine config; `RUST_LOG` directives are appended so they win.
pub fn init_logging(default_filter: &str) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let format = fmt::format()
        .compact()
        .with_timer(uptime())
        .with_line_number(true);
    let stdout_log = fmt::layer().event_format(format);

    let mut filter = default_filter.to_owned();
    if let Ok(env_filter) = env::var(EnvFilter::DEFAULT_ENV) {
        filter.push(',');
        filter.push_str(&env_filter);
    }

    let subscriber = Registry::default()
        .with(EnvFilter::new(filter))
        .with(stdout_log);
    tracing::subscriber::set_global_default(subscriber)?;

    // Panic messages go through the log too, then to whatever hook was there
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        tracing::error!("{}", info);
        previous(info);
    }));
    tracing::trace!("installed panic hook");
    Ok(())
}
