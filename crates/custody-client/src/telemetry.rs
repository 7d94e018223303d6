//! Log output for processes embedding the client.

use custody_types::{CustodyError, Result};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Install the global subscriber. `json` switches to one JSON object per line.
///
/// # Errors
/// Returns [`CustodyError::Configuration`] if a global subscriber is
/// already installed.
pub fn init_tracing(json: bool) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()
    };
    installed.map_err(|e| CustodyError::Configuration(format!("tracing: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_an_error() {
        // The first call may race other tests; only the second must fail.
        let _ = init_tracing(false);
        let err = init_tracing(true).unwrap_err();
        assert!(matches!(err, CustodyError::Configuration(_)));
    }
}
