//! Execution sessions.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::eval::Eval;
use crate::graph::{GraphCore, PortRef};
use crate::value::Value;

/// The boxed ABI session object. Holds the graph core alive and the
/// run-to-run variable store.
pub(crate) struct SessionCell {
    core: Arc<GraphCore>,
    vars: Mutex<HashMap<String, Value>>,
}

impl SessionCell {
    pub fn new(core: Arc<GraphCore>) -> Result<Box<Self>> {
        if core.state.lock().ops.is_empty() {
            return Err(EngineError::failed_precondition(
                "cannot create a session over an empty graph",
            ));
        }
        Ok(Box::new(SessionCell {
            core,
            vars: Mutex::new(HashMap::new()),
        }))
    }

    pub fn core(&self) -> &Arc<GraphCore> {
        &self.core
    }

    /// One atomic request: feeds in, targets executed, fetches out in
    /// request order. Raw operation pointers have already been turned
    /// into ports/ids by the ABI layer, but are re-validated here under
    /// the graph lock.
    pub fn run(
        &self,
        feeds: Vec<(PortRef, Value)>,
        fetches: &[PortRef],
        targets: &[usize],
    ) -> Result<Vec<Value>> {
        let state = self.core.state.lock();
        debug!(
            feeds = feeds.len(),
            fetches = fetches.len(),
            targets = targets.len(),
            "session run"
        );

        let mut feed_map: HashMap<PortRef, Value> = HashMap::with_capacity(feeds.len());
        for (port, value) in feeds {
            state.port_dtype(port)?;
            if feed_map.insert(port, value).is_some() {
                let name = state.node(port.op)?.name.clone();
                return Err(EngineError::invalid_argument(format!(
                    "duplicate feed for '{name}:{}'",
                    port.index
                )));
            }
        }
        for &port in fetches {
            state.port_dtype(port)?;
        }
        for &target in targets {
            state.node(target)?;
        }

        let mut eval = Eval::new(&state, &self.vars, feed_map);
        for &target in targets {
            eval.execute(target)?;
        }
        fetches.iter().map(|&port| eval.output(port)).collect()
    }
}
