use tether_filter::FilterError;

/// Errors returned by registry and tracker operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
	/// A required argument was missing or malformed.
	#[error("illegal argument: {0}")]
	IllegalArgument(String),
	/// The operation does not fit the current lifecycle state.
	#[error("illegal state: {0}")]
	IllegalState(String),
	#[error("not found: {0}")]
	NotFound(String),
	#[error(transparent)]
	Filter(#[from] FilterError),
}
