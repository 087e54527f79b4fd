use anyhow::{Error, Result};
use once_cell::sync::OnceCell;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Installs the global subscriber once.
///
/// JSON output is the default; `RUST_LOG_FORMAT` set to anything other than
/// `json` switches to the human-readable formatter. `RUST_LOG` filters.
///
/// # Errors
/// Returns an error when another subscriber was already installed.
pub fn init() -> Result<()> {
    TRACING_INIT.get_or_try_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::default().add_directive(Level::INFO.into()));

        let registry = tracing_subscriber::registry().with(filter);
        let installed = if use_json() {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .flatten_event(true)
                        .with_current_span(true)
                        .with_target(false),
                )
                .try_init()
        } else {
            registry.with(fmt::layer().with_target(false)).try_init()
        };
        installed.map_err(|e| Error::msg(e.to_string()))
    })?;
    Ok(())
}

fn use_json() -> bool {
    std::env::var("RUST_LOG_FORMAT").map_or(true, |v| v.eq_ignore_ascii_case("json"))
}
