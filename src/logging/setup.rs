// SPDX-License-Identifier: GPL-3.0-only
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Build the level filter: `RUST_LOG` wins, then the configured level, then `info`
pub fn build_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize tracing subscriber with configuration
pub fn setup_logging(log_level: &str, json: bool) -> anyhow::Result<()> {
    let (pretty, structured) = if json {
        (None, Some(fmt::layer().json().with_target(true).with_current_span(false)))
    } else {
        (
            Some(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            ),
            None,
        )
    };

    tracing_subscriber::registry()
        .with(build_filter(log_level))
        .with(pretty)
        .with(structured)
        .try_init()?;

    Ok(())
}
