use tracing_subscriber::EnvFilter;

use crate::error::{ServiceError, ServiceResult};

/// Install the process-wide tracing subscriber.
///
/// `level` is the default directive when `RUST_LOG` is unset; `json` switches
/// the console formatter to structured JSON lines for log shippers. Calling
/// this twice returns a configuration error, it never panics.
pub fn init_logging(level: &str, json: bool) -> ServiceResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let result = if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };

    result.map_err(|e| ServiceError::config_error(format!("failed to install subscriber: {e}")))
}
