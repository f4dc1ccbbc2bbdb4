use std::sync::Arc;

use parking_lot::Mutex;
use tether_component::{Callbacks, Component, ComponentState, ServiceDependency};
use tether_filter::Properties;
use tether_framework::{FRAMEWORK_UUID, Framework, FrameworkConfig};
use tether_registry::{BundleId, ServiceSource, TrackerOptions};

const LOGGER: BundleId = BundleId(1);
const GREETER: BundleId = BundleId(2);
const CLIENT: BundleId = BundleId(3);

/// A greeter component publishes its service only while a logger is
/// registered; a client tracker sees it come and go.
#[test]
fn greeter_follows_logger_through_a_config_loaded_framework() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("framework.toml");
	std::fs::write(
		&path,
		"uuid = \"0d6b0c8e-9a61-4d3a-8f57-4f7f3b1f6a20\"\n[properties]\n\"greeting\" = \"hello\"\n",
	)
	.unwrap();
	let framework = Framework::new(FrameworkConfig::load(&path).unwrap()).unwrap();
	assert_eq!(
		framework.property(FRAMEWORK_UUID).and_then(|v| v.as_str()),
		Some("0d6b0c8e-9a61-4d3a-8f57-4f7f3b1f6a20")
	);

	let logger = framework.bundle_context(LOGGER);
	let greeter = framework.bundle_context(GREETER);
	let client = framework.bundle_context(CLIENT);

	let seen = Arc::new(Mutex::new(Vec::new()));
	let (added, removed) = (Arc::clone(&seen), Arc::clone(&seen));
	client
		.track_services(
			TrackerOptions::new()
				.service("Greeter")
				.on_add(move |svc| added.lock().push(format!("+{}", svc.get::<String>().map_or("?", String::as_str))))
				.on_remove(move |_| removed.lock().push("-".to_string())),
		)
		.unwrap();

	let greeting = greeter
		.property("greeting")
		.and_then(|v| v.as_str())
		.unwrap_or_default()
		.to_string();
	let component = greeter
		.create_component(
			Component::builder("greeter")
				.dependency(ServiceDependency::new("Logger").required(true))
				.provide("Greeter", Properties::new(), ServiceSource::plain(greeting))
				.lifecycle(Callbacks::new()),
		)
		.unwrap();
	assert_eq!(greeter.component_state(component), Some(ComponentState::WaitingForRequired));

	let log = logger.register_service("Logger", Properties::new(), ()).unwrap();
	assert_eq!(greeter.component_state(component), Some(ComponentState::TrackingOptional));
	assert_eq!(*seen.lock(), vec!["+hello".to_string()]);

	logger.unregister_service(log).unwrap();
	assert_eq!(*seen.lock(), vec!["+hello".to_string(), "-".to_string()]);

	framework.shutdown();
	assert_eq!(framework.registry().service_count(), 0);
}
