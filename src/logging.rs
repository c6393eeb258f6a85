//! Tracing subscriber setup for the binaries.
//!
//! Output goes to stderr so batch runs can pipe the summary printed on
//! stdout. The level defaults to `info` and `RUST_LOG` overrides it.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter used when `RUST_LOG` is unset or unparsable
pub const DEFAULT_FILTER: &str = "info";

/// `RUST_LOG` if set, `DEFAULT_FILTER` otherwise
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. `verbose` lowers the default level to
/// `debug`. A second call is a no-op.
pub fn init_logging(verbose: bool) {
    let filter = if verbose && std::env::var_os(EnvFilter::DEFAULT_ENV).is_none() {
        EnvFilter::new("debug")
    } else {
        env_filter()
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let _ = tracing_subscriber::registry().with(filter).with(stderr_layer).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init_logging(false);
        init_logging(true);
        tracing::info!("logging initialised");
    }
}
