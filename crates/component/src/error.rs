use tether_registry::RegistryError;
use thiserror::Error;

use crate::ids::{ComponentId, DependencyId};
use crate::state::Stage;

/// Error returned by a lifecycle or dependency callback.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum ComponentError {
	/// A lifecycle callback failed. Only logged by the state machine; kept
	/// as a type so the log line and tests agree on the wording.
	#[error("component {component}: {stage} failed: {source}")]
	Lifecycle {
		component: String,
		stage: Stage,
		#[source]
		source: BoxError,
	},
	#[error("unknown component {0}")]
	UnknownComponent(ComponentId),
	#[error("unknown dependency {0}")]
	UnknownDependency(DependencyId),
	#[error("component {0} is already managed")]
	AlreadyManaged(ComponentId),
	#[error(transparent)]
	Registry(#[from] RegistryError),
}
