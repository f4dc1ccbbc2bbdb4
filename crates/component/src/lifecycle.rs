//! Component lifecycle callbacks.

use std::fmt;
use std::sync::Arc;

use crate::error::BoxError;

/// Callbacks run by the component state machine.
///
/// `init` runs once required dependencies are first bound, `start` when the
/// component becomes active, `stop` when a required dependency goes away or
/// the component is disabled, and `deinit` on the way back to inactive. All
/// default to doing nothing.
///
/// A returned error is logged and the component moves on as if the callback
/// had succeeded; it is not retried.
pub trait Lifecycle: Send + Sync {
	fn init(&self) -> Result<(), BoxError> {
		Ok(())
	}

	fn start(&self) -> Result<(), BoxError> {
		Ok(())
	}

	fn stop(&self) -> Result<(), BoxError> {
		Ok(())
	}

	fn deinit(&self) -> Result<(), BoxError> {
		Ok(())
	}
}

impl Lifecycle for () {}

impl<L: Lifecycle + ?Sized> Lifecycle for Arc<L> {
	fn init(&self) -> Result<(), BoxError> {
		(**self).init()
	}

	fn start(&self) -> Result<(), BoxError> {
		(**self).start()
	}

	fn stop(&self) -> Result<(), BoxError> {
		(**self).stop()
	}

	fn deinit(&self) -> Result<(), BoxError> {
		(**self).deinit()
	}
}

type StageFn = Arc<dyn Fn() -> Result<(), BoxError> + Send + Sync>;

/// [`Lifecycle`] assembled from closures.
#[derive(Clone, Default)]
pub struct Callbacks {
	init: Option<StageFn>,
	start: Option<StageFn>,
	stop: Option<StageFn>,
	deinit: Option<StageFn>,
}

impl Callbacks {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn on_init(mut self, f: impl Fn() -> Result<(), BoxError> + Send + Sync + 'static) -> Self {
		self.init = Some(Arc::new(f));
		self
	}

	pub fn on_start(mut self, f: impl Fn() -> Result<(), BoxError> + Send + Sync + 'static) -> Self {
		self.start = Some(Arc::new(f));
		self
	}

	pub fn on_stop(mut self, f: impl Fn() -> Result<(), BoxError> + Send + Sync + 'static) -> Self {
		self.stop = Some(Arc::new(f));
		self
	}

	pub fn on_deinit(mut self, f: impl Fn() -> Result<(), BoxError> + Send + Sync + 'static) -> Self {
		self.deinit = Some(Arc::new(f));
		self
	}
}

fn run(stage: Option<&StageFn>) -> Result<(), BoxError> {
	stage.map_or(Ok(()), |f| f())
}

impl Lifecycle for Callbacks {
	fn init(&self) -> Result<(), BoxError> {
		run(self.init.as_ref())
	}

	fn start(&self) -> Result<(), BoxError> {
		run(self.start.as_ref())
	}

	fn stop(&self) -> Result<(), BoxError> {
		run(self.stop.as_ref())
	}

	fn deinit(&self) -> Result<(), BoxError> {
		run(self.deinit.as_ref())
	}
}

impl fmt::Debug for Callbacks {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Callbacks")
			.field("init", &self.init.is_some())
			.field("start", &self.start.is_some())
			.field("stop", &self.stop.is_some())
			.field("deinit", &self.deinit.is_some())
			.finish()
	}
}
