//! Platform services: engine discovery failures and diagnostic sinks.

use std::sync::{Arc, Mutex};

use tengra::{DiagnosticSink, EngineConfig, Error, Flavor, Platform};

#[test]
fn missing_engine_library_is_a_distinct_fatal_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::new().dir(dir.path());
    let err = Platform::load(config).unwrap_err();

    match err {
        Error::EngineUnavailable { path, .. } => {
            // The search path picked the cpu subdirectory.
            assert!(path.starts_with(dir.path().join("cpu")));
        }
        other => panic!("expected EngineUnavailable, got {other:?}"),
    }
}

#[test]
fn engine_unavailable_carries_no_status_code() {
    let dir = tempfile::tempdir().unwrap();
    let err = Platform::load(EngineConfig::new().dir(dir.path())).unwrap_err();
    // Deployment defects are not graph/session statuses.
    assert_eq!(err.code(), None);
}

#[test]
fn gpu_flavor_searches_the_gpu_subdirectory() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::new().flavor(Flavor::Gpu).dir(dir.path());
    let err = Platform::load(config).unwrap_err();
    match err {
        Error::EngineUnavailable { path, .. } => {
            assert!(path.starts_with(dir.path().join("gpu")));
        }
        other => panic!("expected EngineUnavailable, got {other:?}"),
    }
}

struct CaptureSink(Arc<Mutex<Vec<String>>>);

impl DiagnosticSink for CaptureSink {
    fn log(&self, message: &str) {
        self.0.lock().unwrap().push(message.to_string());
    }
}

#[test]
fn diagnostics_route_through_the_configured_sink() {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let platform = Platform::reference().with_sink(CaptureSink(captured.clone()));

    platform.log("marshaling check");

    let messages = captured.lock().unwrap();
    assert_eq!(messages.as_slice(), ["marshaling check"]);
}

#[test]
fn reference_engine_version_is_logged_and_queryable() {
    let platform = Platform::reference();
    assert!(!platform.engine_version().is_empty());
}
