//! Tracing subscriber setup for the server binary.
//!
//! Library code only emits events; the binary decides where they go.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Maps `-v` occurrences to a default filter directive.
pub fn verbosity_to_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info,tower_http=info",
        1 => "debug,ort=info",
        _ => "trace",
    }
}

/// Installs the global fmt subscriber. `RUST_LOG` overrides `verbosity`.
pub fn init_tracing(verbosity: u8) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(verbosity_to_filter(verbosity))?,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels_parse() {
        for verbosity in 0..4 {
            let directive = verbosity_to_filter(verbosity);
            assert!(EnvFilter::try_new(directive).is_ok(), "{directive}");
        }
        assert_eq!(verbosity_to_filter(5), "trace");
    }
}
