use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::config::{LoggingConfig, default_filter};

/// Installs a `fmt` subscriber for the process.
///
/// `RUST_LOG` wins over the configured directive. Returns `false` when a
/// global subscriber was already installed.
pub fn init_tracing(config: &LoggingConfig) -> bool {
	let mut rejected = None;
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
		EnvFilter::try_new(&config.filter).unwrap_or_else(|err| {
			rejected = Some(err.to_string());
			EnvFilter::new(default_filter())
		})
	});

	let installed = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init().is_ok();
	if installed && let Some(error) = rejected {
		warn!(filter = %config.filter, %error, "invalid log filter, falling back to default");
	}
	installed
}
