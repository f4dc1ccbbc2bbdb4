use std::fmt;

/// Lifecycle state of a [`Component`](crate::Component).
///
/// ```text
/// Inactive -> WaitingForRequired -> Initializing -> InstantiatedAndWaitingForRequired
///          -> Injecting -> TrackingOptional
/// TrackingOptional -> Stopping -> InstantiatedAndWaitingForRequired
/// InstantiatedAndWaitingForRequired -> Deinitializing -> Inactive
/// ```
///
/// `TrackingOptional` is the active state: every required dependency is
/// bound and `start` has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ComponentState {
	#[default]
	Inactive,
	/// Dependencies are tracked but `init` has not run.
	WaitingForRequired,
	Initializing,
	/// `init` has run; waiting for required dependencies before `start`.
	InstantiatedAndWaitingForRequired,
	Deinitializing,
	Injecting,
	TrackingOptional,
	Stopping,
	/// Stopped around a callback of a suspend-strategy dependency.
	Suspended,
}

impl ComponentState {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Inactive => "INACTIVE",
			Self::WaitingForRequired => "WAITING_FOR_REQUIRED",
			Self::Initializing => "INITIALIZING",
			Self::InstantiatedAndWaitingForRequired => "INSTANTIATED_AND_WAITING_FOR_REQUIRED",
			Self::Deinitializing => "DEINITIALIZING",
			Self::Injecting => "INJECTING",
			Self::TrackingOptional => "TRACKING_OPTIONAL",
			Self::Stopping => "STOPPING",
			Self::Suspended => "SUSPENDED",
		}
	}

	pub fn is_active(self) -> bool {
		self == Self::TrackingOptional
	}

	/// Waiting on required dependencies, either before or after `init`.
	pub fn is_waiting(self) -> bool {
		matches!(self, Self::WaitingForRequired | Self::InstantiatedAndWaitingForRequired)
	}

	/// Next state given whether the component is enabled and all of its
	/// required dependencies are bound. Returns `self` when settled.
	pub(crate) fn next(self, enabled: bool, resolved: bool) -> Self {
		match self {
			Self::Inactive if enabled => Self::WaitingForRequired,
			Self::WaitingForRequired if !enabled => Self::Inactive,
			Self::WaitingForRequired if resolved => Self::Initializing,
			Self::Initializing => Self::InstantiatedAndWaitingForRequired,
			Self::Deinitializing => Self::Inactive,
			Self::InstantiatedAndWaitingForRequired if !enabled => Self::Deinitializing,
			Self::InstantiatedAndWaitingForRequired if resolved => Self::Injecting,
			Self::Injecting => Self::TrackingOptional,
			Self::Stopping => Self::InstantiatedAndWaitingForRequired,
			Self::TrackingOptional if !(enabled && resolved) => Self::Stopping,
			other => other,
		}
	}
}

impl fmt::Display for ComponentState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Lifecycle callback being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
	Init,
	Start,
	Stop,
	Deinit,
}

impl fmt::Display for Stage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Init => "init",
			Self::Start => "start",
			Self::Stop => "stop",
			Self::Deinit => "deinit",
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_enabled_and_resolved_walks_up_to_active() {
		let mut state = ComponentState::Inactive;
		let mut seen = vec![state];
		loop {
			let next = state.next(true, true);
			if next == state {
				break;
			}
			state = next;
			seen.push(state);
		}
		assert_eq!(
			seen,
			vec![
				ComponentState::Inactive,
				ComponentState::WaitingForRequired,
				ComponentState::Initializing,
				ComponentState::InstantiatedAndWaitingForRequired,
				ComponentState::Injecting,
				ComponentState::TrackingOptional,
			]
		);
	}

	#[test]
	fn test_unresolved_settles_in_waiting_states() {
		assert_eq!(ComponentState::WaitingForRequired.next(true, false), ComponentState::WaitingForRequired);
		assert_eq!(
			ComponentState::InstantiatedAndWaitingForRequired.next(true, false),
			ComponentState::InstantiatedAndWaitingForRequired
		);
		assert_eq!(ComponentState::TrackingOptional.next(true, false), ComponentState::Stopping);
		assert_eq!(ComponentState::Stopping.next(true, false), ComponentState::InstantiatedAndWaitingForRequired);
	}

	#[test]
	fn test_disabled_walks_down_to_inactive() {
		assert_eq!(ComponentState::TrackingOptional.next(false, true), ComponentState::Stopping);
		assert_eq!(
			ComponentState::InstantiatedAndWaitingForRequired.next(false, true),
			ComponentState::Deinitializing
		);
		assert_eq!(ComponentState::Deinitializing.next(false, true), ComponentState::Inactive);
		assert_eq!(ComponentState::WaitingForRequired.next(false, false), ComponentState::Inactive);
		assert_eq!(ComponentState::Inactive.next(false, false), ComponentState::Inactive);
	}
}
