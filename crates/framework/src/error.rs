use tether_component::ComponentError;
use tether_registry::RegistryError;
use tether_resolver::ResolveError;

use crate::config::ConfigError;
use crate::framework::TrackerId;

#[derive(Debug, thiserror::Error)]
pub enum FrameworkError {
	#[error(transparent)]
	Registry(#[from] RegistryError),
	#[error(transparent)]
	Component(#[from] ComponentError),
	#[error(transparent)]
	Resolve(#[from] ResolveError),
	#[error(transparent)]
	Config(#[from] ConfigError),
	#[error("unknown tracker {0}")]
	UnknownTracker(TrackerId),
	/// The framework was shut down.
	#[error("framework is stopped")]
	Stopped,
}
