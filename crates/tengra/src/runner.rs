//! The single-use execution builder.

use std::collections::HashSet;

use tengra_abi::{RawOperation, RawOutput, RawTensor};
use tracing::debug;

use crate::error::Result;
use crate::graph::{parse_output_name, Operation, Output};
use crate::session::Session;
use crate::status::Status;
use crate::tensor::Tensor;

/// An output addressed either by typed reference or by `"name:k"`
/// string, resolved against the session's graph at run time.
#[derive(Clone, Debug)]
pub enum OutputSpec {
    Output(Output),
    Name(String),
}

impl From<Output> for OutputSpec {
    fn from(output: Output) -> Self {
        OutputSpec::Output(output)
    }
}

impl From<&Output> for OutputSpec {
    fn from(output: &Output) -> Self {
        OutputSpec::Output(output.clone())
    }
}

impl From<&str> for OutputSpec {
    fn from(name: &str) -> Self {
        OutputSpec::Name(name.to_string())
    }
}

impl From<String> for OutputSpec {
    fn from(name: String) -> Self {
        OutputSpec::Name(name)
    }
}

/// A target operation addressed by handle or by name.
#[derive(Clone, Debug)]
pub enum TargetSpec {
    Operation(Operation),
    Name(String),
}

impl From<Operation> for TargetSpec {
    fn from(operation: Operation) -> Self {
        TargetSpec::Operation(operation)
    }
}

impl From<&Operation> for TargetSpec {
    fn from(operation: &Operation) -> Self {
        TargetSpec::Operation(operation.clone())
    }
}

impl From<&str> for TargetSpec {
    fn from(name: &str) -> Self {
        TargetSpec::Name(name.to_string())
    }
}

impl From<String> for TargetSpec {
    fn from(name: String) -> Self {
        TargetSpec::Name(name)
    }
}

/// Assembles one atomic execution request: feeds, fetches and targets.
///
/// Accumulation is infallible; every resolution and validation happens
/// in [`run`], the single submission point. `run` consumes the runner,
/// so a runner is single-use by construction — obtain a fresh one from
/// [`Session::runner`] for the next execution.
///
/// [`run`]: Runner::run
pub struct Runner<'s> {
    session: &'s Session,
    inputs: Vec<(OutputSpec, Tensor)>,
    fetches: Vec<OutputSpec>,
    targets: Vec<TargetSpec>,
}

impl<'s> Runner<'s> {
    pub(crate) fn new(session: &'s Session) -> Runner<'s> {
        Runner {
            session,
            inputs: Vec::new(),
            fetches: Vec::new(),
            targets: Vec::new(),
        }
    }

    /// Feeds `tensor` into an input slot. Feeding the same slot twice
    /// fails the run with `InvalidArgument`.
    ///
    /// The tensor is held by the runner and released when the runner
    /// completes, which keeps it immutable for the duration of the run.
    pub fn add_input(mut self, spec: impl Into<OutputSpec>, tensor: Tensor) -> Self {
        self.inputs.push((spec.into(), tensor));
        self
    }

    /// Requests an output. Results come back in fetch-call order,
    /// regardless of graph order.
    pub fn fetch(mut self, spec: impl Into<OutputSpec>) -> Self {
        self.fetches.push(spec.into());
        self
    }

    /// Adds an operation to execute for its side effects only; targets
    /// contribute nothing to the result sequence.
    pub fn add_target(mut self, spec: impl Into<TargetSpec>) -> Self {
        self.targets.push(spec.into());
        self
    }

    fn resolve_output(&self, spec: &OutputSpec) -> Result<Output> {
        match spec {
            OutputSpec::Output(output) => Ok(output.clone()),
            OutputSpec::Name(name) => {
                let (op_name, index) = parse_output_name(name)?;
                let operation = self.lookup(op_name)?;
                let num = operation.num_outputs();
                if index as usize >= num {
                    return Err(Status::out_of_range(format!(
                        "operation '{op_name}' has {num} outputs, index {index} is out of range"
                    ))
                    .into());
                }
                Ok(operation.output(index as usize))
            }
        }
    }

    fn resolve_target(&self, spec: &TargetSpec) -> Result<Operation> {
        match spec {
            TargetSpec::Operation(operation) => Ok(operation.clone()),
            TargetSpec::Name(name) => self.lookup(name),
        }
    }

    fn lookup(&self, name: &str) -> Result<Operation> {
        crate::graph::lookup_in_handle(self.session.graph_handle(), name)
            .ok_or_else(|| Status::not_found(format!("no operation named '{name}'")).into())
    }

    /// Submits the request atomically and returns the fetched tensors,
    /// engine-owned, aligned with fetch order.
    pub fn run(self) -> Result<Vec<Tensor>> {
        let mut raw_inputs = Vec::with_capacity(self.inputs.len());
        let mut seen = HashSet::new();
        for (spec, _) in &self.inputs {
            let output = self.resolve_output(spec)?;
            let raw = output.to_raw();
            if !seen.insert((raw.operation as usize, raw.index)) {
                return Err(Status::invalid_argument(format!(
                    "duplicate input for '{}:{}'",
                    output.operation().name(),
                    output.index()
                ))
                .into());
            }
            raw_inputs.push(raw);
        }
        let input_values: Vec<*mut RawTensor> =
            self.inputs.iter().map(|(_, t)| t.raw()).collect();

        let raw_fetches: Vec<RawOutput> = self
            .fetches
            .iter()
            .map(|spec| self.resolve_output(spec).map(|o| o.to_raw()))
            .collect::<Result<_>>()?;

        let raw_targets: Vec<*mut RawOperation> = self
            .targets
            .iter()
            .map(|spec| self.resolve_target(spec).map(|op| op.raw()))
            .collect::<Result<_>>()?;

        debug!(
            target: "tengra",
            inputs = raw_inputs.len(),
            fetches = raw_fetches.len(),
            targets = raw_targets.len(),
            "submitting run"
        );

        let results =
            self.session
                .run_raw(&raw_inputs, &input_values, &raw_fetches, &raw_targets)?;
        // Input tensors stay alive in `self` until here, then drop:
        // caller-owned feeds are released only after the engine returned.
        self.session.wrap_results(results)
    }

    /// Fetches a single output and runs, returning just its tensor.
    pub fn run_output(self, spec: impl Into<OutputSpec>) -> Result<Tensor> {
        let mut results = self.fetch(spec).run()?;
        results
            .pop()
            .ok_or_else(|| Status::internal("run returned no result for the fetch").into())
    }
}

impl std::fmt::Debug for Runner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("inputs", &self.inputs.len())
            .field("fetches", &self.fetches.len())
            .field("targets", &self.targets.len())
            .finish()
    }
}
