//! Graph construction and operation lookup.

use std::ffi::CString;
use std::sync::Arc;

use tengra_abi::{RawGraph, RawOperation, RawOutput};

use crate::dtype::{DataType, TensorType};
use crate::error::Result;
use crate::platform::{Engine, Platform};
use crate::status::{Status, StatusGuard};
use crate::tensor::Tensor;

/// Owns (or borrows, for While subgraphs) a native graph handle.
///
/// Sessions and operation handles keep an `Arc` to this, so the native
/// graph outlives every dependent object no matter what drop order the
/// caller picks.
pub(crate) struct GraphHandle {
    engine: Arc<Engine>,
    raw: *mut RawGraph,
    owned: bool,
}

// Handle reads are lock-free on the engine side; structural mutation of
// one graph from two threads at once is the caller's to serialize, as
// with any native graph API.
unsafe impl Send for GraphHandle {}
unsafe impl Sync for GraphHandle {}

impl GraphHandle {
    pub(crate) fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub(crate) fn raw(&self) -> *mut RawGraph {
        self.raw
    }
}

impl Drop for GraphHandle {
    fn drop(&mut self) {
        if self.owned {
            unsafe { (self.engine.api().graph_delete)(self.raw) };
        }
    }
}

/// A named directed graph of operations.
pub struct Graph {
    platform: Platform,
    inner: Arc<GraphHandle>,
}

/// A finished operation node. Cheap to clone; keeps its graph alive.
#[derive(Clone)]
pub struct Operation {
    graph: Arc<GraphHandle>,
    raw: *mut RawOperation,
}

// Operation metadata is immutable once the node is finished.
unsafe impl Send for Operation {}
unsafe impl Sync for Operation {}

impl Operation {
    fn read_str(&self, ptr: *const std::os::raw::c_char) -> String {
        if ptr.is_null() {
            String::new()
        } else {
            unsafe { std::ffi::CStr::from_ptr(ptr) }
                .to_string_lossy()
                .into_owned()
        }
    }

    pub fn name(&self) -> String {
        let ptr = unsafe { (self.graph.engine().api().operation_name)(self.raw) };
        self.read_str(ptr)
    }

    pub fn op_type(&self) -> String {
        let ptr = unsafe { (self.graph.engine().api().operation_op_type)(self.raw) };
        self.read_str(ptr)
    }

    pub fn num_outputs(&self) -> usize {
        unsafe { (self.graph.engine().api().operation_num_outputs)(self.raw) }.max(0) as usize
    }

    /// Output slot `index`. Slot validity is checked when the output is
    /// used, not here, so optimistic chaining stays cheap.
    pub fn output(&self, index: usize) -> Output {
        Output {
            operation: self.clone(),
            index: index as i32,
        }
    }

    pub fn output_dtype(&self, index: usize) -> Result<DataType> {
        let tag = unsafe {
            (self.graph.engine().api().operation_output_dtype)(self.raw, index as i32)
        };
        DataType::from_raw(tag)
    }

    /// The recorded shape of an output, when the engine knows it.
    pub fn output_shape(&self, index: usize) -> Option<Vec<i64>> {
        let api = self.graph.engine().api();
        let rank = unsafe {
            (api.operation_output_shape)(self.raw, index as i32, std::ptr::null_mut(), 0)
        };
        if rank < 0 {
            return None;
        }
        let mut dims = vec![0i64; rank as usize];
        unsafe {
            (api.operation_output_shape)(self.raw, index as i32, dims.as_mut_ptr(), rank)
        };
        Some(dims)
    }

    pub(crate) fn raw(&self) -> *mut RawOperation {
        self.raw
    }
}

impl PartialEq for Operation {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.raw, other.raw)
    }
}

impl Eq for Operation {}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name())
            .field("op_type", &self.op_type())
            .finish()
    }
}

/// One tensor-producing slot of an operation: `(operation, index)`.
#[derive(Clone, Debug)]
pub struct Output {
    operation: Operation,
    index: i32,
}

impl Output {
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn index(&self) -> usize {
        self.index.max(0) as usize
    }

    pub fn dtype(&self) -> Result<DataType> {
        self.operation.output_dtype(self.index())
    }

    pub(crate) fn to_raw(&self) -> RawOutput {
        RawOutput {
            operation: self.operation.raw,
            index: self.index,
        }
    }
}

impl PartialEq for Output {
    fn eq(&self, other: &Self) -> bool {
        self.operation == other.operation && self.index == other.index
    }
}

impl Eq for Output {}

/// Parses `"name"` / `"name:k"` addressing.
pub(crate) fn parse_output_name(spec: &str) -> Result<(&str, i32)> {
    match spec.rsplit_once(':') {
        None => Ok((spec, 0)),
        Some((name, index)) => {
            let index: i32 = index.parse().map_err(|_| {
                Status::invalid_argument(format!("invalid output index in '{spec}'"))
            })?;
            if index < 0 {
                return Err(
                    Status::invalid_argument(format!("negative output index in '{spec}'")).into(),
                );
            }
            Ok((name, index))
        }
    }
}

fn cstring(value: &str, what: &str) -> std::result::Result<CString, Status> {
    CString::new(value)
        .map_err(|_| Status::invalid_argument(format!("{what} contains a NUL byte")))
}

/// Name lookup against a bare graph handle (used by runners, whose
/// graph value may already be dropped).
pub(crate) fn lookup_in_handle(handle: &Arc<GraphHandle>, name: &str) -> Option<Operation> {
    let cname = CString::new(name).ok()?;
    let raw =
        unsafe { (handle.engine().api().graph_operation_by_name)(handle.raw(), cname.as_ptr()) };
    if raw.is_null() {
        None
    } else {
        Some(Operation {
            graph: handle.clone(),
            raw,
        })
    }
}

impl Graph {
    /// Creates an empty graph on the platform's engine.
    pub fn new(platform: &Platform) -> Graph {
        let engine = platform.engine().clone();
        let raw = unsafe { (engine.api().graph_new)() };
        Graph {
            platform: platform.clone(),
            inner: Arc::new(GraphHandle {
                engine,
                raw,
                owned: true,
            }),
        }
    }

    /// Wraps an engine-owned subgraph handle (While construction).
    fn borrowed(platform: &Platform, raw: *mut RawGraph) -> Graph {
        Graph {
            platform: platform.clone(),
            inner: Arc::new(GraphHandle {
                engine: platform.engine().clone(),
                raw,
                owned: false,
            }),
        }
    }

    pub(crate) fn handle(&self) -> &Arc<GraphHandle> {
        &self.inner
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn operation_count(&self) -> usize {
        unsafe { (self.inner.engine.api().graph_num_operations)(self.inner.raw) }.max(0) as usize
    }

    /// Looks up an operation by name. Absence is not an error, so
    /// callers can probe optimistically.
    pub fn operation(&self, name: &str) -> Option<Operation> {
        lookup_in_handle(&self.inner, name)
    }

    /// Resolves `"name"` / `"name:k"` to a typed output reference.
    pub fn output(&self, spec: &str) -> Result<Output> {
        let (name, index) = parse_output_name(spec)?;
        let operation = self
            .operation(name)
            .ok_or_else(|| Status::not_found(format!("no operation named '{name}'")))?;
        if (index as usize) >= operation.num_outputs() {
            return Err(Status::out_of_range(format!(
                "operation '{name}' has {} outputs, index {index} is out of range",
                operation.num_outputs()
            ))
            .into());
        }
        Ok(operation.output(index as usize))
    }

    /// Serializes the graph into an opaque byte buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let api = self.inner.engine.api();
        let guard = StatusGuard::new(&self.inner.engine);
        let buffer = unsafe { (api.graph_export)(self.inner.raw, guard.ptr()) };
        guard.check()?;
        let bytes = unsafe {
            crate::mem::borrow_bytes((api.buffer_data)(buffer), (api.buffer_len)(buffer))
        }
        .to_vec();
        unsafe { (api.buffer_delete)(buffer) };
        Ok(bytes)
    }

    /// Merges a serialized graph, namespacing imported names under
    /// `prefix` when given. Name collisions fail with `AlreadyExists`
    /// and leave this graph untouched; sessions already built over it
    /// are unaffected either way.
    pub fn import(&self, bytes: &[u8], prefix: Option<&str>) -> Result<()> {
        let cprefix = match prefix {
            Some(p) => Some(cstring(p, "import prefix")?),
            None => None,
        };
        let guard = StatusGuard::new(&self.inner.engine);
        unsafe {
            (self.inner.engine.api().graph_import)(
                self.inner.raw,
                bytes.as_ptr(),
                bytes.len(),
                cprefix.as_ref().map_or(std::ptr::null(), |c| c.as_ptr()),
                guard.ptr(),
            )
        };
        guard.check()?;
        Ok(())
    }

    /// Starts a low-level operation description. Pass `None` as the
    /// name for an engine-generated unique one.
    pub fn new_operation(&self, op_type: &str, name: Option<&str>) -> Result<OpDescription> {
        let c_op_type = cstring(op_type, "op type")?;
        let c_name = match name {
            Some(n) => Some(cstring(n, "operation name")?),
            None => None,
        };
        let raw = unsafe {
            (self.inner.engine.api().desc_new)(
                self.inner.raw,
                c_op_type.as_ptr(),
                c_name.as_ref().map_or(std::ptr::null(), |c| c.as_ptr()),
            )
        };
        Ok(OpDescription {
            graph: self.inner.clone(),
            raw: Some(raw),
            deferred: None,
        })
    }

    // -- operation helpers ----------------------------------------------

    /// Declares a graph input of the given type.
    pub fn placeholder(&self, dtype: DataType) -> Result<Output> {
        self.new_operation("Placeholder", None)?
            .set_attr_type("dtype", dtype)
            .finish()
            .map(|op| op.output(0))
    }

    /// Declares a named graph input, optionally with a declared shape
    /// (-1 dims unknown). Fails with `InvalidArgument` when `name`
    /// collides with an existing operation.
    pub fn placeholder_named(
        &self,
        dtype: DataType,
        shape: Option<&[i64]>,
        name: &str,
    ) -> Result<Output> {
        let mut desc = self
            .new_operation("Placeholder", Some(name))?
            .set_attr_type("dtype", dtype);
        if let Some(dims) = shape {
            desc = desc.set_attr_shape("shape", Some(dims));
        }
        desc.finish().map(|op| op.output(0))
    }

    /// Embeds a constant. The tensor is copied; the caller keeps it.
    pub fn constant(&self, value: &Tensor) -> Result<Output> {
        self.constant_impl(value, None)
    }

    pub fn constant_named(&self, value: &Tensor, name: &str) -> Result<Output> {
        self.constant_impl(value, Some(name))
    }

    fn constant_impl(&self, value: &Tensor, name: Option<&str>) -> Result<Output> {
        self.new_operation("Const", name)?
            .set_attr_tensor("value", value)
            .set_attr_type("dtype", value.dtype())
            .finish()
            .map(|op| op.output(0))
    }

    /// Scalar constant convenience.
    pub fn const_scalar<T: TensorType>(&self, value: T) -> Result<Output> {
        let tensor = Tensor::from_scalar(&self.platform, value)?;
        self.constant(&tensor)
    }

    fn binary_op(&self, op_type: &str, a: &Output, b: &Output) -> Result<Output> {
        self.new_operation(op_type, None)?
            .add_input(a)
            .add_input(b)
            .finish()
            .map(|op| op.output(0))
    }

    pub fn add(&self, a: &Output, b: &Output) -> Result<Output> {
        self.binary_op("Add", a, b)
    }

    pub fn sub(&self, a: &Output, b: &Output) -> Result<Output> {
        self.binary_op("Sub", a, b)
    }

    pub fn mul(&self, a: &Output, b: &Output) -> Result<Output> {
        self.binary_op("Mul", a, b)
    }

    pub fn div(&self, a: &Output, b: &Output) -> Result<Output> {
        self.binary_op("Div", a, b)
    }

    pub fn less(&self, a: &Output, b: &Output) -> Result<Output> {
        self.binary_op("Less", a, b)
    }

    /// Sums any number of same-typed inputs.
    pub fn add_n(&self, inputs: &[Output]) -> Result<Output> {
        self.new_operation("AddN", None)?
            .add_input_list(inputs)
            .finish()
            .map(|op| op.output(0))
    }

    fn unary_op(&self, op_type: &str, value: &Output) -> Result<Output> {
        self.new_operation(op_type, None)?
            .add_input(value)
            .finish()
            .map(|op| op.output(0))
    }

    pub fn neg(&self, value: &Output) -> Result<Output> {
        self.unary_op("Neg", value)
    }

    pub fn abs(&self, value: &Output) -> Result<Output> {
        self.unary_op("Abs", value)
    }

    pub fn identity(&self, value: &Output) -> Result<Output> {
        self.unary_op("Identity", value)
    }

    /// The runtime shape of a value, as an Int64 vector.
    pub fn shape_of(&self, value: &Output) -> Result<Output> {
        self.unary_op("Shape", value)
    }

    /// Splits `value` along `axis` into `num_split` equal parts,
    /// producing one output per part.
    pub fn split(
        &self,
        axis: &Output,
        value: &Output,
        num_split: i64,
        name: Option<&str>,
    ) -> Result<Operation> {
        self.new_operation("Split", name)?
            .add_input(axis)
            .add_input(value)
            .set_attr_int("num_split", num_split)
            .finish()
    }

    /// An operation that fails the run when `condition` is false.
    pub fn assert_that(&self, condition: &Output, data: &[Output]) -> Result<Operation> {
        self.new_operation("Assert", None)?
            .add_input(condition)
            .add_input_list(data)
            .finish()
    }

    /// A do-nothing operation carrying control dependencies.
    pub fn no_op(&self, control_deps: &[Operation]) -> Result<Operation> {
        let mut desc = self.new_operation("NoOp", None)?;
        for dep in control_deps {
            desc = desc.add_control_input(dep);
        }
        desc.finish()
    }

    /// Declares a mutable variable initialized from `initial_value`.
    ///
    /// Run the returned [`Variable::initializer`] as a target once
    /// before the first read.
    pub fn variable(&self, initial_value: &Output, name: &str) -> Result<Variable> {
        let dtype = initial_value.dtype()?;
        let handle = self
            .new_operation("Variable", Some(name))?
            .set_attr_type("dtype", dtype)
            .finish()?;
        let value = handle.output(0);
        let initializer = self
            .new_operation("Assign", None)?
            .add_input(&value)
            .add_input(initial_value)
            .finish()?;
        Ok(Variable {
            handle,
            initializer,
            value,
        })
    }

    /// Builds the operation that stores `value` into `variable` when it
    /// executes. Useful as a run target.
    pub fn assign(&self, variable: &Variable, value: &Output) -> Result<Operation> {
        self.new_operation("Assign", None)?
            .add_input(&variable.value)
            .add_input(value)
            .finish()
    }

    /// Builds a while loop over `inputs`.
    ///
    /// The builder receives the engine-created condition and body
    /// subgraphs with one input per loop variable, and returns the
    /// condition output plus one body output per loop variable. The
    /// loop's own outputs (the final loop-variable values) are
    /// returned, arity-matched to `inputs`.
    pub fn while_loop<F>(&self, inputs: &[Output], name: Option<&str>, build: F) -> Result<Vec<Output>>
    where
        F: FnOnce(&WhileSubgraphs) -> Result<WhileSpec>,
    {
        let api = self.inner.engine.api();
        let raw_inputs: Vec<RawOutput> = inputs.iter().map(Output::to_raw).collect();

        let guard = StatusGuard::new(&self.inner.engine);
        let params = unsafe {
            (api.while_begin)(
                self.inner.raw,
                raw_inputs.as_ptr(),
                raw_inputs.len() as i32,
                guard.ptr(),
            )
        };
        guard.check()?;

        // Both input arrays are engine-allocated, `n` long, and live
        // until finish/abort consumes the params.
        let n = inputs.len();
        let (cond_graph, body_graph, cond_ports, body_ports) = unsafe {
            (
                Graph::borrowed(&self.platform, (*params).cond_graph),
                Graph::borrowed(&self.platform, (*params).body_graph),
                std::slice::from_raw_parts((*params).cond_inputs, n),
                std::slice::from_raw_parts((*params).body_inputs, n),
            )
        };
        let wrap = |graph: &Graph, ports: &[RawOutput]| -> Vec<Output> {
            ports
                .iter()
                .map(|raw| Output {
                    operation: Operation {
                        graph: graph.inner.clone(),
                        raw: raw.operation,
                    },
                    index: raw.index,
                })
                .collect()
        };
        let subgraphs = WhileSubgraphs {
            cond_inputs: wrap(&cond_graph, cond_ports),
            body_inputs: wrap(&body_graph, body_ports),
            cond_graph,
            body_graph,
        };

        let spec = match build(&subgraphs) {
            Ok(spec) => spec,
            Err(e) => {
                unsafe { (api.while_abort)(params) };
                return Err(e);
            }
        };
        if spec.body_outputs.len() != n {
            unsafe { (api.while_abort)(params) };
            return Err(Status::invalid_argument(format!(
                "while body produced {} outputs for {n} loop variables",
                spec.body_outputs.len()
            ))
            .into());
        }
        let c_name = match name {
            Some(value) => match cstring(value, "loop name") {
                Ok(c) => Some(c),
                Err(e) => {
                    unsafe { (api.while_abort)(params) };
                    return Err(e.into());
                }
            },
            None => None,
        };

        let mut loop_outputs = vec![RawOutput::null(); n];
        let finish_guard = StatusGuard::new(&self.inner.engine);
        unsafe {
            (*params).cond_output = spec.cond_output.to_raw();
            for (i, output) in spec.body_outputs.iter().enumerate() {
                *(*params).body_outputs.add(i) = output.to_raw();
            }
            (*params).name = c_name.as_ref().map_or(std::ptr::null(), |c| c.as_ptr());
            (api.while_finish)(params, finish_guard.ptr(), loop_outputs.as_mut_ptr());
        }
        finish_guard.check()?;

        Ok(loop_outputs
            .into_iter()
            .map(|raw| Output {
                operation: Operation {
                    graph: self.inner.clone(),
                    raw: raw.operation,
                },
                index: raw.index,
            })
            .collect())
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("operations", &self.operation_count())
            .finish()
    }
}

/// A variable: its holder operation, its initializer and the output
/// carrying the current value.
#[derive(Clone, Debug)]
pub struct Variable {
    pub handle: Operation,
    pub initializer: Operation,
    pub value: Output,
}

/// The two subgraphs of a while loop under construction.
pub struct WhileSubgraphs {
    pub cond_graph: Graph,
    pub cond_inputs: Vec<Output>,
    pub body_graph: Graph,
    pub body_inputs: Vec<Output>,
}

/// What the while builder must produce: the Bool condition output and
/// one body output per loop variable.
pub struct WhileSpec {
    pub cond_output: Output,
    pub body_outputs: Vec<Output>,
}

/// Low-level fluent operation builder.
///
/// Accumulates inputs and attributes, then [`finish`] validates and
/// appends the node. Construction-time failures (a NUL in an attribute
/// name, an unknown op type, an input from a foreign graph) surface at
/// `finish`, so chains stay uninterrupted.
///
/// [`finish`]: OpDescription::finish
pub struct OpDescription {
    graph: Arc<GraphHandle>,
    raw: Option<*mut tengra_abi::RawOpDescription>,
    deferred: Option<Status>,
}

impl OpDescription {
    fn raw(&self) -> *mut tengra_abi::RawOpDescription {
        // Present until finish consumes self.
        self.raw.unwrap_or(std::ptr::null_mut())
    }

    fn defer(&mut self, status: Status) {
        if self.deferred.is_none() {
            self.deferred = Some(status);
        }
    }

    pub fn add_input(self, output: &Output) -> Self {
        unsafe { (self.graph.engine().api().desc_add_input)(self.raw(), output.to_raw()) };
        self
    }

    pub fn add_input_list(self, outputs: &[Output]) -> Self {
        let raw: Vec<RawOutput> = outputs.iter().map(Output::to_raw).collect();
        unsafe {
            (self.graph.engine().api().desc_add_input_list)(
                self.raw(),
                raw.as_ptr(),
                raw.len() as i32,
            )
        };
        self
    }

    pub fn add_control_input(self, operation: &Operation) -> Self {
        unsafe {
            (self.graph.engine().api().desc_add_control_input)(self.raw(), operation.raw())
        };
        self
    }

    pub fn set_attr_type(mut self, attr: &str, dtype: DataType) -> Self {
        match cstring(attr, "attribute name") {
            Ok(c) => unsafe {
                (self.graph.engine().api().desc_set_attr_type)(self.raw(), c.as_ptr(), dtype.to_raw())
            },
            Err(s) => self.defer(s),
        }
        self
    }

    pub fn set_attr_int(mut self, attr: &str, value: i64) -> Self {
        match cstring(attr, "attribute name") {
            Ok(c) => unsafe {
                (self.graph.engine().api().desc_set_attr_int)(self.raw(), c.as_ptr(), value)
            },
            Err(s) => self.defer(s),
        }
        self
    }

    /// `None` records an unknown shape.
    pub fn set_attr_shape(mut self, attr: &str, dims: Option<&[i64]>) -> Self {
        match cstring(attr, "attribute name") {
            Ok(c) => unsafe {
                let (ptr, len) = match dims {
                    Some(dims) => (dims.as_ptr(), dims.len() as i32),
                    None => (std::ptr::null(), -1),
                };
                (self.graph.engine().api().desc_set_attr_shape)(self.raw(), c.as_ptr(), ptr, len)
            },
            Err(s) => self.defer(s),
        }
        self
    }

    /// The engine copies the tensor; the caller keeps ownership.
    pub fn set_attr_tensor(mut self, attr: &str, value: &Tensor) -> Self {
        match cstring(attr, "attribute name") {
            Ok(c) => {
                let result = {
                    let guard = StatusGuard::new(self.graph.engine());
                    unsafe {
                        (self.graph.engine().api().desc_set_attr_tensor)(
                            self.raw(),
                            c.as_ptr(),
                            value.raw(),
                            guard.ptr(),
                        )
                    };
                    guard.check()
                };
                if let Err(status) = result {
                    self.defer(status);
                }
            }
            Err(s) => self.defer(s),
        }
        self
    }

    /// Validates and appends the operation. Consumes the description
    /// either way.
    pub fn finish(mut self) -> Result<Operation> {
        let raw = self.raw.take().unwrap_or(std::ptr::null_mut());
        let guard = StatusGuard::new(self.graph.engine());
        let op = unsafe { (self.graph.engine().api().desc_finish)(raw, guard.ptr()) };
        guard.check()?;
        if let Some(status) = self.deferred.take() {
            return Err(status.into());
        }
        if op.is_null() {
            return Err(Status::internal("engine returned no operation handle").into());
        }
        Ok(Operation {
            graph: self.graph.clone(),
            raw: op,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Code, NullSink, Platform};

    fn graph() -> Graph {
        Graph::new(&Platform::reference().with_sink(NullSink))
    }

    #[test]
    fn parse_bare_and_indexed_names() {
        assert_eq!(parse_output_name("feed").unwrap(), ("feed", 0));
        assert_eq!(parse_output_name("Split:1").unwrap(), ("Split", 1));
        assert!(parse_output_name("feed:x").is_err());
        assert!(parse_output_name("feed:-2").is_err());
    }

    #[test]
    fn lookup_is_optimistic() {
        let g = graph();
        assert!(g.operation("missing").is_none());
        g.placeholder_named(DataType::Int32, None, "feed").unwrap();
        let op = g.operation("feed").unwrap();
        assert_eq!(op.op_type(), "Placeholder");
        assert_eq!(op.num_outputs(), 1);
        assert_eq!(op.output_dtype(0).unwrap(), DataType::Int32);
    }

    #[test]
    fn placeholder_name_collision_is_invalid_argument() {
        let g = graph();
        g.placeholder_named(DataType::Int32, None, "feed").unwrap();
        let err = g
            .placeholder_named(DataType::Int32, None, "feed")
            .unwrap_err();
        assert_eq!(err.code(), Some(Code::InvalidArgument));
    }

    #[test]
    fn auto_names_are_unique() {
        let g = graph();
        let a = g.placeholder(DataType::Int32).unwrap();
        let b = g.placeholder(DataType::Int32).unwrap();
        assert_ne!(a.operation().name(), b.operation().name());
    }

    #[test]
    fn constant_records_shape_metadata() {
        let g = graph();
        let p = g.platform().clone();
        let t = crate::Tensor::from_vec(&p, vec![1i32, 2, 3, 4], &[2, 2]).unwrap();
        let c = g.constant(&t).unwrap();
        assert_eq!(c.operation().output_shape(0), Some(vec![2, 2]));
        assert_eq!(c.dtype().unwrap(), DataType::Int32);
    }

    #[test]
    fn output_spec_bounds_are_checked() {
        let g = graph();
        g.placeholder_named(DataType::Int32, None, "feed").unwrap();
        assert_eq!(g.output("feed").unwrap().index(), 0);
        let err = g.output("feed:3").unwrap_err();
        assert_eq!(err.code(), Some(Code::OutOfRange));
        let err = g.output("ghost").unwrap_err();
        assert_eq!(err.code(), Some(Code::NotFound));
    }

    #[test]
    fn unknown_op_type_fails_at_finish() {
        let g = graph();
        let err = g
            .new_operation("Frobnicate", None)
            .unwrap()
            .finish()
            .unwrap_err();
        assert_eq!(err.code(), Some(Code::NotFound));
    }
}
