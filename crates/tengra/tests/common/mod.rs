//! Shared helpers for integration tests against the reference engine.

use tengra::{Graph, NullSink, Platform, Session, SessionOptions};

/// A platform over the in-process reference engine, with platform
/// diagnostics silenced and `tracing` routed to the test writer.
pub fn platform() -> Platform {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .with_test_writer()
        .try_init();
    Platform::reference().with_sink(NullSink)
}

/// A session with default options.
pub fn session(graph: &Graph) -> Session {
    Session::new(graph, &SessionOptions::new()).expect("session creation failed")
}
