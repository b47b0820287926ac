//! Execution sessions over a graph.

use std::sync::Arc;

use tengra_abi::{RawOperation, RawOutput, RawSession, RawTensor};
use tracing::debug;

use crate::error::Result;
use crate::graph::{Graph, GraphHandle};
use crate::platform::Platform;
use crate::runner::Runner;
use crate::status::{Status, StatusGuard};
use crate::tensor::Tensor;

/// Opaque engine-defined session configuration.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    config: Vec<u8>,
}

impl SessionOptions {
    pub fn new() -> SessionOptions {
        SessionOptions::default()
    }

    /// Attaches an engine-defined configuration blob.
    pub fn config_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.config = bytes;
        self
    }

    fn as_bytes(&self) -> &[u8] {
        &self.config
    }
}

/// A live execution context bound to one graph.
///
/// The session keeps a counted reference to the graph handle, so the
/// graph cannot be released out from under it. Concurrent `run`s
/// through separate runners are safe; the engine serializes or
/// parallelizes internally.
pub struct Session {
    platform: Platform,
    graph: Arc<GraphHandle>,
    raw: *mut RawSession,
}

unsafe impl Send for Session {}
unsafe impl Sync for Session {}

impl Session {
    /// Binds a new execution context to `graph`.
    ///
    /// # Errors
    /// Fails with `FailedPrecondition` when the graph has no operations.
    pub fn new(graph: &Graph, options: &SessionOptions) -> Result<Session> {
        let handle = graph.handle().clone();
        let bytes = options.as_bytes();
        let raw = {
            let guard = StatusGuard::new(handle.engine());
            let raw = unsafe {
                (handle.engine().api().session_new)(
                    handle.raw(),
                    if bytes.is_empty() {
                        std::ptr::null()
                    } else {
                        bytes.as_ptr()
                    },
                    bytes.len(),
                    guard.ptr(),
                )
            };
            guard.check()?;
            raw
        };
        if raw.is_null() {
            return Err(Status::internal("engine returned no session handle").into());
        }
        debug!(target: "tengra", "session created");
        Ok(Session {
            platform: graph.platform().clone(),
            graph: handle,
            raw,
        })
    }

    /// A fresh single-use runner for one logical execution.
    pub fn runner(&self) -> Runner<'_> {
        Runner::new(self)
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub(crate) fn graph_handle(&self) -> &Arc<GraphHandle> {
        &self.graph
    }

    /// The low-level array-based submission path. On success the
    /// returned raw tensors are engine-owned and exactly `outputs.len()`
    /// long.
    pub(crate) fn run_raw(
        &self,
        inputs: &[RawOutput],
        input_values: &[*mut RawTensor],
        outputs: &[RawOutput],
        targets: &[*mut RawOperation],
    ) -> Result<Vec<*mut RawTensor>> {
        let mut output_values: Vec<*mut RawTensor> = vec![std::ptr::null_mut(); outputs.len()];
        let guard = StatusGuard::new(self.graph.engine());
        unsafe {
            (self.graph.engine().api().session_run)(
                self.raw,
                inputs.as_ptr(),
                input_values.as_ptr(),
                inputs.len() as i32,
                outputs.as_ptr(),
                output_values.as_mut_ptr(),
                outputs.len() as i32,
                targets.as_ptr(),
                targets.len() as i32,
                guard.ptr(),
            )
        };
        guard.check()?;
        Ok(output_values)
    }

    pub(crate) fn wrap_results(&self, raw: Vec<*mut RawTensor>) -> Result<Vec<Tensor>> {
        raw.into_iter()
            .map(|ptr| Tensor::from_engine_raw(self.graph.engine(), ptr))
            .collect()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        unsafe { (self.graph.engine().api().session_delete)(self.raw) };
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Code, NullSink, Platform};

    #[test]
    fn empty_graph_is_a_failed_precondition() {
        let platform = Platform::reference().with_sink(NullSink);
        let graph = Graph::new(&platform);
        let err = Session::new(&graph, &SessionOptions::new()).unwrap_err();
        assert_eq!(err.code(), Some(Code::FailedPrecondition));
    }

    #[test]
    fn graph_can_be_dropped_before_session() {
        let platform = Platform::reference().with_sink(NullSink);
        let graph = Graph::new(&platform);
        let a = graph.const_scalar(2i32).unwrap();
        let b = graph.const_scalar(3i32).unwrap();
        let sum = graph.add(&a, &b).unwrap();
        let session = Session::new(&graph, &SessionOptions::new()).unwrap();
        drop(graph);

        // The session's counted reference keeps the native graph alive.
        let result = session.runner().run_output(&sum).unwrap();
        assert_eq!(result.scalar::<i32>().unwrap(), 5);
    }
}
