//! The engine's C-ABI entry points.
//!
//! Every boxed cell created here is destroyed by exactly one matching
//! delete entry point. Raw handles are trusted the way a C API trusts
//! them: null checks and graph-membership checks where cheap, undefined
//! behavior on wilder misuse.

use std::collections::HashSet;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::sync::Arc;

use tengra_abi::{
    EngineApi, RawBuffer, RawGraph, RawOpDescription, RawOperation, RawOutput, RawSession,
    RawStatus, RawTensor, RawWhileParams, ABI_VERSION,
};

use crate::error::{EngineError, Result};
use crate::graph::{self, Attrs, GraphCell, GraphCore, OpNode, PortRef, WhileData};
use crate::session::SessionCell;
use crate::value::{TensorCell, Value};

static VERSION: &[u8] = b"tengra reference engine 0.1.0\0";

/// The function table handed to bindings.
static API: EngineApi = EngineApi {
    abi_version: ABI_VERSION,
    engine_version: c_engine_version,
    status_new: c_status_new,
    status_delete: c_status_delete,
    status_code: c_status_code,
    status_message: c_status_message,
    tensor_alloc: c_tensor_alloc,
    tensor_data: c_tensor_data,
    tensor_byte_size: c_tensor_byte_size,
    tensor_dtype: c_tensor_dtype,
    tensor_num_dims: c_tensor_num_dims,
    tensor_dim: c_tensor_dim,
    tensor_delete: c_tensor_delete,
    buffer_data: c_buffer_data,
    buffer_len: c_buffer_len,
    buffer_delete: c_buffer_delete,
    graph_new: c_graph_new,
    graph_delete: c_graph_delete,
    graph_num_operations: c_graph_num_operations,
    graph_operation_by_name: c_graph_operation_by_name,
    graph_export: c_graph_export,
    graph_import: c_graph_import,
    operation_name: c_operation_name,
    operation_op_type: c_operation_op_type,
    operation_num_outputs: c_operation_num_outputs,
    operation_output_dtype: c_operation_output_dtype,
    operation_output_shape: c_operation_output_shape,
    desc_new: c_desc_new,
    desc_set_attr_type: c_desc_set_attr_type,
    desc_set_attr_int: c_desc_set_attr_int,
    desc_set_attr_shape: c_desc_set_attr_shape,
    desc_set_attr_tensor: c_desc_set_attr_tensor,
    desc_add_input: c_desc_add_input,
    desc_add_input_list: c_desc_add_input_list,
    desc_add_control_input: c_desc_add_control_input,
    desc_finish: c_desc_finish,
    while_begin: c_while_begin,
    while_finish: c_while_finish,
    while_abort: c_while_abort,
    session_new: c_session_new,
    session_delete: c_session_delete,
    session_run: c_session_run,
};

/// In-process access to the engine's function table.
pub fn engine_api() -> &'static EngineApi {
    &API
}

/// The standard engine entry point, exported so this crate can also be
/// built as a shared-library engine.
#[no_mangle]
pub extern "C" fn tengra_engine_api() -> *const EngineApi {
    &API
}

// ---------------------------------------------------------------------
// status
// ---------------------------------------------------------------------

struct StatusCell {
    code: i32,
    message: CString,
}

impl StatusCell {
    fn set_ok(&mut self) {
        self.code = tengra_abi::code::OK;
        self.message = CString::default();
    }

    fn set_error(&mut self, error: EngineError) {
        self.code = error.code;
        // Interior NULs cannot cross the boundary; drop them.
        let cleaned: Vec<u8> = error
            .message
            .into_bytes()
            .into_iter()
            .filter(|&b| b != 0)
            .collect();
        self.message = CString::new(cleaned).unwrap_or_default();
    }
}

unsafe fn status_cell<'a>(status: *mut RawStatus) -> Option<&'a mut StatusCell> {
    (status as *mut StatusCell).as_mut()
}

/// Writes a result into a status out-parameter, yielding the value.
unsafe fn report<T>(status: *mut RawStatus, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => {
            if let Some(cell) = status_cell(status) {
                cell.set_ok();
            }
            Some(value)
        }
        Err(error) => {
            if let Some(cell) = status_cell(status) {
                cell.set_error(error);
            }
            None
        }
    }
}

unsafe extern "C" fn c_engine_version() -> *const c_char {
    VERSION.as_ptr() as *const c_char
}

unsafe extern "C" fn c_status_new() -> *mut RawStatus {
    Box::into_raw(Box::new(StatusCell {
        code: tengra_abi::code::OK,
        message: CString::default(),
    })) as *mut RawStatus
}

unsafe extern "C" fn c_status_delete(status: *mut RawStatus) {
    if !status.is_null() {
        drop(Box::from_raw(status as *mut StatusCell));
    }
}

unsafe extern "C" fn c_status_code(status: *const RawStatus) -> i32 {
    (status as *const StatusCell)
        .as_ref()
        .map_or(tengra_abi::code::INTERNAL, |cell| cell.code)
}

unsafe extern "C" fn c_status_message(status: *const RawStatus) -> *const c_char {
    (status as *const StatusCell)
        .as_ref()
        .map_or(std::ptr::null(), |cell| cell.message.as_ptr())
}

// ---------------------------------------------------------------------
// tensor
// ---------------------------------------------------------------------

unsafe fn tensor_ref<'a>(tensor: *const RawTensor) -> &'a TensorCell {
    &*(tensor as *const TensorCell)
}

unsafe extern "C" fn c_tensor_alloc(
    dtype: i32,
    dims: *const i64,
    ndims: i32,
    byte_len: usize,
) -> *mut RawTensor {
    let dims = if dims.is_null() || ndims <= 0 {
        Vec::new()
    } else {
        std::slice::from_raw_parts(dims, ndims as usize).to_vec()
    };
    Box::into_raw(TensorCell::zeroed(dtype, dims, byte_len)) as *mut RawTensor
}

unsafe extern "C" fn c_tensor_data(tensor: *mut RawTensor) -> *mut c_void {
    let cell = &mut *(tensor as *mut TensorCell);
    cell.value.bytes.as_mut_ptr() as *mut c_void
}

unsafe extern "C" fn c_tensor_byte_size(tensor: *const RawTensor) -> usize {
    tensor_ref(tensor).value.bytes.len()
}

unsafe extern "C" fn c_tensor_dtype(tensor: *const RawTensor) -> i32 {
    tensor_ref(tensor).value.dtype
}

unsafe extern "C" fn c_tensor_num_dims(tensor: *const RawTensor) -> i32 {
    tensor_ref(tensor).value.dims.len() as i32
}

unsafe extern "C" fn c_tensor_dim(tensor: *const RawTensor, index: i32) -> i64 {
    tensor_ref(tensor)
        .value
        .dims
        .get(index.max(0) as usize)
        .copied()
        .unwrap_or(0)
}

unsafe extern "C" fn c_tensor_delete(tensor: *mut RawTensor) {
    if !tensor.is_null() {
        drop(Box::from_raw(tensor as *mut TensorCell));
    }
}

// ---------------------------------------------------------------------
// buffer
// ---------------------------------------------------------------------

struct BufferCell {
    bytes: Vec<u8>,
}

unsafe extern "C" fn c_buffer_data(buffer: *const RawBuffer) -> *const u8 {
    (*(buffer as *const BufferCell)).bytes.as_ptr()
}

unsafe extern "C" fn c_buffer_len(buffer: *const RawBuffer) -> usize {
    (*(buffer as *const BufferCell)).bytes.len()
}

unsafe extern "C" fn c_buffer_delete(buffer: *mut RawBuffer) {
    if !buffer.is_null() {
        drop(Box::from_raw(buffer as *mut BufferCell));
    }
}

// ---------------------------------------------------------------------
// graph
// ---------------------------------------------------------------------

unsafe fn graph_ref<'a>(graph: *mut RawGraph) -> &'a GraphCell {
    &*(graph as *const GraphCell)
}

unsafe fn opt_str<'a>(ptr: *const c_char) -> Result<Option<&'a str>> {
    if ptr.is_null() {
        return Ok(None);
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map(Some)
        .map_err(|_| EngineError::invalid_argument("string argument is not valid UTF-8"))
}

unsafe fn required_str<'a>(ptr: *const c_char, what: &str) -> Result<&'a str> {
    opt_str(ptr)?
        .filter(|s| !s.is_empty())
        .ok_or_else(|| EngineError::invalid_argument(format!("{what} must be a non-empty string")))
}

unsafe extern "C" fn c_graph_new() -> *mut RawGraph {
    Box::into_raw(GraphCell::new()) as *mut RawGraph
}

unsafe extern "C" fn c_graph_delete(graph: *mut RawGraph) {
    if !graph.is_null() {
        drop(Box::from_raw(graph as *mut GraphCell));
    }
}

unsafe extern "C" fn c_graph_num_operations(graph: *mut RawGraph) -> i32 {
    graph_ref(graph).core.state.lock().ops.len() as i32
}

unsafe extern "C" fn c_graph_operation_by_name(
    graph: *mut RawGraph,
    name: *const c_char,
) -> *mut RawOperation {
    let Ok(Some(name)) = opt_str(name) else {
        return std::ptr::null_mut();
    };
    let state = graph_ref(graph).core.state.lock();
    match state.by_name.get(name) {
        Some(&id) => state.ops[id].as_ref() as *const OpNode as *mut RawOperation,
        None => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn c_graph_export(graph: *mut RawGraph, status: *mut RawStatus) -> *mut RawBuffer {
    let result = graph::export(&graph_ref(graph).core.state.lock());
    match report(status, result) {
        Some(bytes) => Box::into_raw(Box::new(BufferCell { bytes })) as *mut RawBuffer,
        None => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn c_graph_import(
    graph: *mut RawGraph,
    data: *const u8,
    len: usize,
    prefix: *const c_char,
    status: *mut RawStatus,
) {
    let result = (|| {
        if data.is_null() && len > 0 {
            return Err(EngineError::invalid_argument("null graph buffer"));
        }
        let bytes = if len == 0 {
            &[][..]
        } else {
            std::slice::from_raw_parts(data, len)
        };
        let prefix = opt_str(prefix)?;
        graph::import(&mut graph_ref(graph).core.state.lock(), bytes, prefix)
    })();
    report(status, result);
}

// ---------------------------------------------------------------------
// operation metadata
// ---------------------------------------------------------------------

unsafe fn op_node<'a>(operation: *const RawOperation) -> &'a OpNode {
    &*(operation as *const OpNode)
}

unsafe extern "C" fn c_operation_name(operation: *const RawOperation) -> *const c_char {
    op_node(operation).c_name.as_ptr()
}

unsafe extern "C" fn c_operation_op_type(operation: *const RawOperation) -> *const c_char {
    op_node(operation).c_op_type.as_ptr()
}

unsafe extern "C" fn c_operation_num_outputs(operation: *const RawOperation) -> i32 {
    op_node(operation).outputs.len() as i32
}

unsafe extern "C" fn c_operation_output_dtype(operation: *const RawOperation, index: i32) -> i32 {
    op_node(operation)
        .outputs
        .get(index.max(0) as usize)
        .map_or(0, |info| info.dtype)
}

unsafe extern "C" fn c_operation_output_shape(
    operation: *const RawOperation,
    index: i32,
    dims: *mut i64,
    max_dims: i32,
) -> i32 {
    let node = op_node(operation);
    let Some(info) = node.outputs.get(index.max(0) as usize) else {
        return -1;
    };
    match &info.shape {
        Some(shape) => {
            if !dims.is_null() && max_dims > 0 {
                let n = shape.len().min(max_dims as usize);
                std::ptr::copy_nonoverlapping(shape.as_ptr(), dims, n);
            }
            shape.len() as i32
        }
        None => -1,
    }
}

// ---------------------------------------------------------------------
// operation construction
// ---------------------------------------------------------------------

struct DescCell {
    core: Arc<GraphCore>,
    op_type: String,
    name: Option<String>,
    inputs: Vec<RawOutput>,
    control_inputs: Vec<*const RawOperation>,
    attrs: Attrs,
    /// First failure recorded during construction; surfaced by finish.
    deferred: Option<EngineError>,
}

unsafe fn desc_cell<'a>(desc: *mut RawOpDescription) -> &'a mut DescCell {
    &mut *(desc as *mut DescCell)
}

unsafe extern "C" fn c_desc_new(
    graph: *mut RawGraph,
    op_type: *const c_char,
    name: *const c_char,
) -> *mut RawOpDescription {
    let mut deferred = None;
    let op_type = match required_str(op_type, "op type") {
        Ok(s) => s.to_string(),
        Err(e) => {
            deferred = Some(e);
            String::new()
        }
    };
    let name = match opt_str(name) {
        Ok(s) => s.map(str::to_string),
        Err(e) => {
            deferred = deferred.or(Some(e));
            None
        }
    };
    Box::into_raw(Box::new(DescCell {
        core: graph_ref(graph).core.clone(),
        op_type,
        name,
        inputs: Vec::new(),
        control_inputs: Vec::new(),
        attrs: Attrs::default(),
        deferred,
    })) as *mut RawOpDescription
}

unsafe extern "C" fn c_desc_set_attr_type(
    desc: *mut RawOpDescription,
    _attr: *const c_char,
    dtype: i32,
) {
    desc_cell(desc).attrs.dtype = Some(dtype);
}

unsafe extern "C" fn c_desc_set_attr_int(
    desc: *mut RawOpDescription,
    attr: *const c_char,
    value: i64,
) {
    let cell = desc_cell(desc);
    match opt_str(attr) {
        Ok(Some(attr)) => {
            cell.attrs.ints.insert(attr.to_string(), value);
        }
        Ok(None) => {
            cell.deferred = cell
                .deferred
                .take()
                .or_else(|| Some(EngineError::invalid_argument("null attribute name")));
        }
        Err(e) => cell.deferred = cell.deferred.take().or(Some(e)),
    }
}

unsafe extern "C" fn c_desc_set_attr_shape(
    desc: *mut RawOpDescription,
    _attr: *const c_char,
    dims: *const i64,
    ndims: i32,
) {
    let cell = desc_cell(desc);
    if ndims < 0 || (dims.is_null() && ndims > 0) {
        cell.attrs.shape = None;
    } else {
        cell.attrs.shape = Some(std::slice::from_raw_parts(dims, ndims as usize).to_vec());
    }
}

unsafe extern "C" fn c_desc_set_attr_tensor(
    desc: *mut RawOpDescription,
    _attr: *const c_char,
    tensor: *const RawTensor,
    status: *mut RawStatus,
) {
    let cell = desc_cell(desc);
    let result = if tensor.is_null() {
        Err(EngineError::invalid_argument("null tensor attribute"))
    } else {
        // Copy, so the caller keeps ownership of its tensor.
        cell.attrs.tensor = Some(tensor_ref(tensor).value.clone());
        Ok(())
    };
    report(status, result);
}

unsafe extern "C" fn c_desc_add_input(desc: *mut RawOpDescription, input: RawOutput) {
    desc_cell(desc).inputs.push(input);
}

unsafe extern "C" fn c_desc_add_input_list(
    desc: *mut RawOpDescription,
    inputs: *const RawOutput,
    ninputs: i32,
) {
    if inputs.is_null() || ninputs <= 0 {
        return;
    }
    desc_cell(desc)
        .inputs
        .extend_from_slice(std::slice::from_raw_parts(inputs, ninputs as usize));
}

unsafe extern "C" fn c_desc_add_control_input(
    desc: *mut RawOpDescription,
    operation: *const RawOperation,
) {
    desc_cell(desc).control_inputs.push(operation);
}

unsafe extern "C" fn c_desc_finish(
    desc: *mut RawOpDescription,
    status: *mut RawStatus,
) -> *mut RawOperation {
    // finish consumes the description, success or not.
    let cell = Box::from_raw(desc as *mut DescCell);
    let result = (|| -> Result<*mut OpNode> {
        if let Some(error) = cell.deferred {
            return Err(error);
        }
        let mut state = cell.core.state.lock();
        state.check_mutable()?;

        let mut inputs = Vec::with_capacity(cell.inputs.len());
        for raw in &cell.inputs {
            let id = state.resolve_node_ptr(raw.operation as *const OpNode)?;
            inputs.push(PortRef {
                op: id,
                index: raw.index,
            });
        }
        let mut control_inputs = Vec::with_capacity(cell.control_inputs.len());
        for &raw in &cell.control_inputs {
            control_inputs.push(state.resolve_node_ptr(raw as *const OpNode)?);
        }

        let name = state.resolve_name(cell.name.as_deref(), &cell.op_type)?;
        let outputs = graph::infer_outputs(&state, &cell.op_type, &cell.attrs, &inputs)?;
        state.add_node(
            name,
            cell.op_type,
            inputs,
            control_inputs,
            cell.attrs,
            outputs,
            None,
        )
    })();
    report(status, result)
        .map(|ptr| ptr as *mut RawOperation)
        .unwrap_or(std::ptr::null_mut())
}

// ---------------------------------------------------------------------
// while loops
// ---------------------------------------------------------------------

#[repr(C)]
struct WhileParamsCell {
    raw: RawWhileParams,
    parent: Arc<GraphCore>,
    cond_cell: *mut GraphCell,
    body_cell: *mut GraphCell,
    parent_inputs: Vec<PortRef>,
    cond_inputs: Vec<RawOutput>,
    body_inputs: Vec<RawOutput>,
    body_outputs: Vec<RawOutput>,
    cond_input_ports: Vec<PortRef>,
    body_input_ports: Vec<PortRef>,
}

/// Builds a fresh subgraph holding one placeholder per loop variable.
fn loop_subgraph(dtypes: &[i32]) -> Result<(*mut GraphCell, Vec<RawOutput>, Vec<PortRef>)> {
    let cell = GraphCell::new();
    let mut outputs = Vec::with_capacity(dtypes.len());
    let mut ports = Vec::with_capacity(dtypes.len());
    {
        let mut state = cell.core.state.lock();
        for (i, &dt) in dtypes.iter().enumerate() {
            let attrs = Attrs {
                dtype: Some(dt),
                ..Attrs::default()
            };
            let infos = graph::infer_outputs(&state, "Placeholder", &attrs, &[])?;
            let ptr = state.add_node(
                format!("while_input_{i}"),
                "Placeholder".to_string(),
                Vec::new(),
                Vec::new(),
                attrs,
                infos,
                None,
            )?;
            outputs.push(RawOutput {
                operation: ptr as *mut RawOperation,
                index: 0,
            });
            ports.push(PortRef { op: i, index: 0 });
        }
    }
    Ok((Box::into_raw(cell), outputs, ports))
}

unsafe extern "C" fn c_while_begin(
    graph: *mut RawGraph,
    inputs: *const RawOutput,
    ninputs: i32,
    status: *mut RawStatus,
) -> *mut RawWhileParams {
    let result = (|| -> Result<*mut RawWhileParams> {
        if ninputs <= 0 || inputs.is_null() {
            return Err(EngineError::invalid_argument(
                "a while loop needs at least one loop variable",
            ));
        }
        let parent = graph_ref(graph).core.clone();
        let raw_inputs = std::slice::from_raw_parts(inputs, ninputs as usize);

        let (parent_inputs, dtypes) = {
            let state = parent.state.lock();
            state.check_mutable()?;
            let mut ports = Vec::with_capacity(raw_inputs.len());
            let mut dtypes = Vec::with_capacity(raw_inputs.len());
            for raw in raw_inputs {
                let id = state.resolve_node_ptr(raw.operation as *const OpNode)?;
                let port = PortRef {
                    op: id,
                    index: raw.index,
                };
                dtypes.push(state.port_dtype(port)?);
                ports.push(port);
            }
            (ports, dtypes)
        };

        let (cond_cell, cond_inputs, cond_input_ports) = loop_subgraph(&dtypes)?;
        let (body_cell, body_inputs, body_input_ports) = match loop_subgraph(&dtypes) {
            Ok(parts) => parts,
            Err(e) => {
                drop(Box::from_raw(cond_cell));
                return Err(e);
            }
        };

        let mut boxed = Box::new(WhileParamsCell {
            raw: RawWhileParams {
                ninputs,
                cond_graph: cond_cell as *mut RawGraph,
                cond_inputs: std::ptr::null(),
                cond_output: RawOutput::null(),
                body_graph: body_cell as *mut RawGraph,
                body_inputs: std::ptr::null(),
                body_outputs: std::ptr::null_mut(),
                name: std::ptr::null(),
            },
            parent,
            cond_cell,
            body_cell,
            parent_inputs,
            cond_inputs,
            body_inputs,
            body_outputs: vec![RawOutput::null(); ninputs as usize],
            cond_input_ports,
            body_input_ports,
        });
        boxed.raw.cond_inputs = boxed.cond_inputs.as_ptr();
        boxed.raw.body_inputs = boxed.body_inputs.as_ptr();
        boxed.raw.body_outputs = boxed.body_outputs.as_mut_ptr();
        Ok(Box::into_raw(boxed) as *mut RawWhileParams)
    })();
    report(status, result).unwrap_or(std::ptr::null_mut())
}

/// Resolves a caller-written output against a subgraph.
unsafe fn resolve_in(core: &GraphCore, raw: RawOutput, what: &str) -> Result<(PortRef, i32)> {
    if raw.operation.is_null() {
        return Err(EngineError::invalid_argument(format!("{what} was not set")));
    }
    let state = core.state.lock();
    let id = state.resolve_node_ptr(raw.operation as *const OpNode)?;
    let port = PortRef {
        op: id,
        index: raw.index,
    };
    let dtype = state.port_dtype(port)?;
    Ok((port, dtype))
}

unsafe extern "C" fn c_while_finish(
    params: *mut RawWhileParams,
    status: *mut RawStatus,
    outputs: *mut RawOutput,
) {
    let cell = Box::from_raw(params as *mut WhileParamsCell);
    let cond_core = (*cell.cond_cell).core.clone();
    let body_core = (*cell.body_cell).core.clone();

    let result = (|| -> Result<Vec<RawOutput>> {
        let n = cell.ninputs();
        let (cond_output, cond_dtype) =
            resolve_in(&cond_core, cell.raw.cond_output, "the condition output")?;
        if cond_dtype != tengra_abi::dtype::BOOL {
            return Err(EngineError::invalid_argument(
                "the while condition output must be Bool",
            ));
        }

        let mut body_outputs = Vec::with_capacity(n);
        {
            let parent_state = cell.parent.state.lock();
            for (i, &raw) in cell.body_outputs.iter().enumerate() {
                let (port, dtype) = resolve_in(&body_core, raw, "a body output")?;
                let expected = parent_state.port_dtype(cell.parent_inputs[i])?;
                if dtype != expected {
                    return Err(EngineError::invalid_argument(format!(
                        "body output {i} dtype does not match its loop variable"
                    )));
                }
                body_outputs.push(port);
            }
        }

        let name = opt_str(cell.raw.name)?.map(str::to_string);

        cond_core.state.lock().finalized = true;
        body_core.state.lock().finalized = true;

        let mut state = cell.parent.state.lock();
        state.check_mutable()?;
        let name = state.resolve_name(name.as_deref(), "While")?;
        let infos = graph::while_outputs(&state, &cell.parent_inputs)?;
        let ptr = state.add_node(
            name,
            "While".to_string(),
            cell.parent_inputs.clone(),
            Vec::new(),
            Attrs::default(),
            infos,
            Some(WhileData {
                cond: cond_core.clone(),
                cond_inputs: cell.cond_input_ports.clone(),
                cond_output,
                body: body_core.clone(),
                body_inputs: cell.body_input_ports.clone(),
                body_outputs,
            }),
        )?;
        Ok((0..n)
            .map(|i| RawOutput {
                operation: ptr as *mut RawOperation,
                index: i as i32,
            })
            .collect())
    })();

    // The subgraph handles are consumed either way.
    drop(Box::from_raw(cell.cond_cell));
    drop(Box::from_raw(cell.body_cell));

    if let Some(loop_outputs) = report(status, result) {
        if !outputs.is_null() {
            std::ptr::copy_nonoverlapping(loop_outputs.as_ptr(), outputs, loop_outputs.len());
        }
    }
}

impl WhileParamsCell {
    fn ninputs(&self) -> usize {
        self.raw.ninputs.max(0) as usize
    }
}

unsafe extern "C" fn c_while_abort(params: *mut RawWhileParams) {
    if params.is_null() {
        return;
    }
    let cell = Box::from_raw(params as *mut WhileParamsCell);
    drop(Box::from_raw(cell.cond_cell));
    drop(Box::from_raw(cell.body_cell));
}

// ---------------------------------------------------------------------
// session
// ---------------------------------------------------------------------

unsafe fn session_ref<'a>(session: *mut RawSession) -> &'a SessionCell {
    &*(session as *const SessionCell)
}

unsafe extern "C" fn c_session_new(
    graph: *mut RawGraph,
    _options: *const u8,
    _options_len: usize,
    status: *mut RawStatus,
) -> *mut RawSession {
    let result = SessionCell::new(graph_ref(graph).core.clone());
    report(status, result)
        .map(|cell| Box::into_raw(cell) as *mut RawSession)
        .unwrap_or(std::ptr::null_mut())
}

unsafe extern "C" fn c_session_delete(session: *mut RawSession) {
    if !session.is_null() {
        drop(Box::from_raw(session as *mut SessionCell));
    }
}

#[allow(clippy::too_many_arguments)]
unsafe extern "C" fn c_session_run(
    session: *mut RawSession,
    inputs: *const RawOutput,
    input_values: *const *mut RawTensor,
    ninputs: i32,
    outputs: *const RawOutput,
    output_values: *mut *mut RawTensor,
    noutputs: i32,
    targets: *const *mut RawOperation,
    ntargets: i32,
    status: *mut RawStatus,
) {
    let cell = session_ref(session);
    let result = (|| -> Result<Vec<Value>> {
        let (feeds, fetch_ports, target_ids) = {
            let state = cell.core().state.lock();

            let mut feeds = Vec::with_capacity(ninputs.max(0) as usize);
            for i in 0..ninputs.max(0) as usize {
                let raw = *inputs.add(i);
                let id = state.resolve_node_ptr(raw.operation as *const OpNode)?;
                let tensor = *input_values.add(i);
                if tensor.is_null() {
                    return Err(EngineError::invalid_argument("null input tensor"));
                }
                feeds.push((
                    PortRef {
                        op: id,
                        index: raw.index,
                    },
                    tensor_ref(tensor).value.clone(),
                ));
            }

            let mut fetch_ports = Vec::with_capacity(noutputs.max(0) as usize);
            for i in 0..noutputs.max(0) as usize {
                let raw = *outputs.add(i);
                let id = state.resolve_node_ptr(raw.operation as *const OpNode)?;
                fetch_ports.push(PortRef {
                    op: id,
                    index: raw.index,
                });
            }

            let mut target_ids = Vec::with_capacity(ntargets.max(0) as usize);
            let mut seen = HashSet::new();
            for i in 0..ntargets.max(0) as usize {
                let id = state.resolve_node_ptr(*targets.add(i) as *const OpNode)?;
                if seen.insert(id) {
                    target_ids.push(id);
                }
            }
            (feeds, fetch_ports, target_ids)
        };
        cell.run(feeds, &fetch_ports, &target_ids)
    })();

    if let Some(values) = report(status, result) {
        for (i, value) in values.into_iter().enumerate() {
            *output_values.add(i) = Box::into_raw(TensorCell::new(value)) as *mut RawTensor;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_table_reports_abi_version() {
        assert_eq!(engine_api().abi_version, ABI_VERSION);
    }

    #[test]
    fn version_string_is_nul_terminated() {
        let version = unsafe { CStr::from_ptr(c_engine_version()) };
        assert!(version.to_str().unwrap().contains("reference engine"));
    }
}
