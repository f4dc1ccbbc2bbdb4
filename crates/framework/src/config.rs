//! Framework configuration, read from TOML.
//!
//! ```toml
//! uuid = "6f1c2a9e-3b7d-4c55-9a0e-2d4b8f6c1e37"
//!
//! [logging]
//! filter = "tether_component=debug,info"
//!
//! [properties]
//! "app.name" = "demo"
//! "app.workers" = 4
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tether_filter::Properties;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("failed to read {}: {source}", path.display())]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("invalid config: {0}")]
	Parse(#[from] toml::de::Error),
	#[error("invalid framework uuid: {0}")]
	Uuid(#[from] uuid::Error),
}

/// Top-level framework configuration. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FrameworkConfig {
	/// Framework instance id. Generated when absent.
	pub uuid: Option<String>,
	pub logging: LoggingConfig,
	/// Framework properties, visible to every bundle context.
	pub properties: Properties,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
	/// `tracing_subscriber::EnvFilter` directive, used when `RUST_LOG` is unset.
	pub filter: String,
}

impl Default for LoggingConfig {
	fn default() -> Self {
		Self {
			filter: default_filter().to_string(),
		}
	}
}

pub(crate) fn default_filter() -> &'static str {
	"info"
}

impl FrameworkConfig {
	pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(text)?)
	}

	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
			path: path.to_path_buf(),
			source,
		})?;
		Self::from_toml_str(&text)
	}

	/// The configured uuid, or a fresh v4 one.
	///
	/// # Errors
	///
	/// [`ConfigError::Uuid`] when the configured value does not parse.
	pub fn resolve_uuid(&self) -> Result<Uuid, ConfigError> {
		match self.uuid.as_deref().map(str::trim) {
			Some(text) if !text.is_empty() => Ok(Uuid::parse_str(text)?),
			_ => Ok(Uuid::new_v4()),
		}
	}
}
