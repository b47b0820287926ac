//! C-ABI surface shared between the tengra binding and engine implementations.
//!
//! An engine — whether a shared library discovered at runtime or the
//! in-process reference engine — exposes exactly one symbol,
//! [`ENTRY_SYMBOL`], returning a pointer to a versioned [`EngineApi`]
//! function table. Everything else crosses the boundary through that table:
//! opaque handles in, opaque handles out, every fallible call paired with a
//! status out-parameter.
//!
//! Ownership rules at this boundary:
//!
//! - Every handle returned by a `*_new` / `*_alloc` / `graph_export` entry
//!   must be released through the matching `*_delete` entry exactly once.
//! - `desc_finish` consumes the description handle whether or not it
//!   succeeds.
//! - `while_finish` and `while_abort` consume the while-params handle and
//!   the two subgraph handles it exposes; the caller must not pass those
//!   subgraphs to `graph_delete`.
//! - Tensors passed as run inputs or attribute values stay owned by the
//!   caller; the engine copies what it needs before returning.

pub mod strings;

use std::os::raw::{c_char, c_void};

/// Version of this function-table layout. An engine built against a
/// different version must be rejected at load time.
pub const ABI_VERSION: u32 = 1;

/// The single symbol an engine shared library exports.
pub const ENTRY_SYMBOL: &[u8] = b"tengra_engine_api";

/// Signature of the [`ENTRY_SYMBOL`] export.
pub type EntryFn = unsafe extern "C" fn() -> *const EngineApi;

/// Status code tags carried by `RawStatus` handles.
///
/// The numbering is part of the ABI; out-of-range values decode as a
/// catch-all "unknown" on the binding side.
pub mod code {
    pub const OK: i32 = 0;
    pub const CANCELLED: i32 = 1;
    pub const UNKNOWN: i32 = 2;
    pub const INVALID_ARGUMENT: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const ALREADY_EXISTS: i32 = 5;
    pub const PERMISSION_DENIED: i32 = 6;
    pub const RESOURCE_EXHAUSTED: i32 = 7;
    pub const FAILED_PRECONDITION: i32 = 8;
    pub const ABORTED: i32 = 9;
    pub const OUT_OF_RANGE: i32 = 10;
    pub const UNIMPLEMENTED: i32 = 11;
    pub const INTERNAL: i32 = 12;
    pub const UNAVAILABLE: i32 = 13;
    pub const DATA_LOSS: i32 = 14;
    pub const UNAUTHENTICATED: i32 = 15;
}

/// Element type tags carried by tensors and `dtype` attributes.
pub mod dtype {
    pub const FLOAT32: i32 = 1;
    pub const FLOAT64: i32 = 2;
    pub const INT8: i32 = 3;
    pub const INT16: i32 = 4;
    pub const INT32: i32 = 5;
    pub const INT64: i32 = 6;
    pub const UINT8: i32 = 7;
    pub const BOOL: i32 = 8;
    pub const STRING: i32 = 9;
}

macro_rules! opaque_handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[repr(C)]
        pub struct $name {
            _private: [u8; 0],
        }
    };
}

opaque_handle!(
    /// Engine-side status cell: a code plus a NUL-terminated message.
    RawStatus
);
opaque_handle!(
    /// Engine-allocated tensor: dtype, dims and a byte buffer.
    RawTensor
);
opaque_handle!(
    /// A graph of named operations under construction or execution.
    RawGraph
);
opaque_handle!(
    /// A finished operation node. Valid for the lifetime of its graph.
    RawOperation
);
opaque_handle!(
    /// An operation under construction; consumed by `desc_finish`.
    RawOpDescription
);
opaque_handle!(
    /// A live execution context bound to one graph.
    RawSession
);
opaque_handle!(
    /// An engine-owned byte buffer (serialized graphs).
    RawBuffer
);

/// One tensor-producing slot of an operation.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct RawOutput {
    pub operation: *mut RawOperation,
    pub index: i32,
}

impl RawOutput {
    pub fn null() -> Self {
        RawOutput {
            operation: std::ptr::null_mut(),
            index: 0,
        }
    }
}

/// While-loop construction state, created by `while_begin`.
///
/// The engine fills `cond_graph`, `body_graph` and the two input arrays
/// (each `ninputs` long). The caller builds the condition in `cond_graph`
/// and the body in `body_graph`, then sets `cond_output`, writes all
/// `ninputs` entries of `body_outputs`, optionally sets `name` (NUL
/// terminated, copied during `while_finish`), and calls `while_finish`.
/// `while_abort` discards everything instead.
#[repr(C)]
pub struct RawWhileParams {
    pub ninputs: i32,
    pub cond_graph: *mut RawGraph,
    pub cond_inputs: *const RawOutput,
    pub cond_output: RawOutput,
    pub body_graph: *mut RawGraph,
    pub body_inputs: *const RawOutput,
    pub body_outputs: *mut RawOutput,
    pub name: *const c_char,
}

/// The engine function table.
///
/// All pointers are non-null for the lifetime of the engine. Calls are
/// thread-safe after the table has been obtained, except where a handle's
/// own contract says otherwise (a graph must not be structurally mutated
/// from two threads at once).
#[repr(C)]
pub struct EngineApi {
    /// Must equal [`ABI_VERSION`].
    pub abi_version: u32,

    /// Static, NUL-terminated engine version string.
    pub engine_version: unsafe extern "C" fn() -> *const c_char,

    // -- status ----------------------------------------------------------
    pub status_new: unsafe extern "C" fn() -> *mut RawStatus,
    pub status_delete: unsafe extern "C" fn(status: *mut RawStatus),
    pub status_code: unsafe extern "C" fn(status: *const RawStatus) -> i32,
    pub status_message: unsafe extern "C" fn(status: *const RawStatus) -> *const c_char,

    // -- tensor ----------------------------------------------------------
    /// Allocates a zero-filled tensor buffer. Returns null on exhaustion.
    pub tensor_alloc:
        unsafe extern "C" fn(dtype: i32, dims: *const i64, ndims: i32, byte_len: usize)
            -> *mut RawTensor,
    pub tensor_data: unsafe extern "C" fn(tensor: *mut RawTensor) -> *mut c_void,
    pub tensor_byte_size: unsafe extern "C" fn(tensor: *const RawTensor) -> usize,
    pub tensor_dtype: unsafe extern "C" fn(tensor: *const RawTensor) -> i32,
    pub tensor_num_dims: unsafe extern "C" fn(tensor: *const RawTensor) -> i32,
    pub tensor_dim: unsafe extern "C" fn(tensor: *const RawTensor, index: i32) -> i64,
    pub tensor_delete: unsafe extern "C" fn(tensor: *mut RawTensor),

    // -- buffer ----------------------------------------------------------
    pub buffer_data: unsafe extern "C" fn(buffer: *const RawBuffer) -> *const u8,
    pub buffer_len: unsafe extern "C" fn(buffer: *const RawBuffer) -> usize,
    pub buffer_delete: unsafe extern "C" fn(buffer: *mut RawBuffer),

    // -- graph -----------------------------------------------------------
    pub graph_new: unsafe extern "C" fn() -> *mut RawGraph,
    pub graph_delete: unsafe extern "C" fn(graph: *mut RawGraph),
    pub graph_num_operations: unsafe extern "C" fn(graph: *mut RawGraph) -> i32,
    /// Returns null when no operation carries `name`; never touches status.
    pub graph_operation_by_name:
        unsafe extern "C" fn(graph: *mut RawGraph, name: *const c_char) -> *mut RawOperation,
    /// Serializes the graph into an engine-owned buffer.
    pub graph_export:
        unsafe extern "C" fn(graph: *mut RawGraph, status: *mut RawStatus) -> *mut RawBuffer,
    /// Merges a serialized graph, namespacing names under `prefix` when it
    /// is non-null and non-empty. Name collisions leave the graph untouched.
    pub graph_import: unsafe extern "C" fn(
        graph: *mut RawGraph,
        data: *const u8,
        len: usize,
        prefix: *const c_char,
        status: *mut RawStatus,
    ),

    // -- operation metadata ---------------------------------------------
    pub operation_name: unsafe extern "C" fn(operation: *const RawOperation) -> *const c_char,
    pub operation_op_type: unsafe extern "C" fn(operation: *const RawOperation) -> *const c_char,
    pub operation_num_outputs: unsafe extern "C" fn(operation: *const RawOperation) -> i32,
    pub operation_output_dtype:
        unsafe extern "C" fn(operation: *const RawOperation, index: i32) -> i32,
    /// Writes up to `max_dims` dims; returns the rank, or -1 when unknown.
    pub operation_output_shape: unsafe extern "C" fn(
        operation: *const RawOperation,
        index: i32,
        dims: *mut i64,
        max_dims: i32,
    ) -> i32,

    // -- operation construction -----------------------------------------
    /// `name` may be null or empty for an auto-generated unique name.
    pub desc_new: unsafe extern "C" fn(
        graph: *mut RawGraph,
        op_type: *const c_char,
        name: *const c_char,
    ) -> *mut RawOpDescription,
    pub desc_set_attr_type:
        unsafe extern "C" fn(desc: *mut RawOpDescription, attr: *const c_char, dtype: i32),
    pub desc_set_attr_int:
        unsafe extern "C" fn(desc: *mut RawOpDescription, attr: *const c_char, value: i64),
    pub desc_set_attr_shape: unsafe extern "C" fn(
        desc: *mut RawOpDescription,
        attr: *const c_char,
        dims: *const i64,
        ndims: i32,
    ),
    /// The engine copies the tensor; the caller keeps ownership.
    pub desc_set_attr_tensor: unsafe extern "C" fn(
        desc: *mut RawOpDescription,
        attr: *const c_char,
        tensor: *const RawTensor,
        status: *mut RawStatus,
    ),
    pub desc_add_input: unsafe extern "C" fn(desc: *mut RawOpDescription, input: RawOutput),
    pub desc_add_input_list: unsafe extern "C" fn(
        desc: *mut RawOpDescription,
        inputs: *const RawOutput,
        ninputs: i32,
    ),
    pub desc_add_control_input:
        unsafe extern "C" fn(desc: *mut RawOpDescription, operation: *const RawOperation),
    /// Consumes `desc`. Returns null with status set on failure.
    pub desc_finish: unsafe extern "C" fn(
        desc: *mut RawOpDescription,
        status: *mut RawStatus,
    ) -> *mut RawOperation,

    // -- while loops -----------------------------------------------------
    pub while_begin: unsafe extern "C" fn(
        graph: *mut RawGraph,
        inputs: *const RawOutput,
        ninputs: i32,
        status: *mut RawStatus,
    ) -> *mut RawWhileParams,
    /// Consumes `params`. Writes `ninputs` loop outputs on success.
    pub while_finish: unsafe extern "C" fn(
        params: *mut RawWhileParams,
        status: *mut RawStatus,
        outputs: *mut RawOutput,
    ),
    pub while_abort: unsafe extern "C" fn(params: *mut RawWhileParams),

    // -- session ---------------------------------------------------------
    /// `options` is an engine-defined opaque configuration blob (may be
    /// null when `options_len` is zero).
    pub session_new: unsafe extern "C" fn(
        graph: *mut RawGraph,
        options: *const u8,
        options_len: usize,
        status: *mut RawStatus,
    ) -> *mut RawSession,
    pub session_delete: unsafe extern "C" fn(session: *mut RawSession),
    /// Submits one atomic request. On success writes `noutputs` fresh
    /// engine-owned tensors into `output_values`; on failure writes
    /// nothing and sets status.
    pub session_run: unsafe extern "C" fn(
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
    ),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_output_is_ffi_sized() {
        // One pointer plus one i32, padded to pointer alignment.
        assert_eq!(
            std::mem::size_of::<RawOutput>(),
            2 * std::mem::size_of::<usize>()
        );
    }

    #[test]
    fn null_output_is_null() {
        assert!(RawOutput::null().operation.is_null());
    }
}
