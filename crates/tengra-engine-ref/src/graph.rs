//! Graph storage and operation construction.
//!
//! A graph is an append-only list of boxed operation nodes plus a name
//! table. Boxing gives every node a stable address, and that address is
//! the `RawOperation` handle handed across the ABI. Nodes are immutable
//! once finished, so handle reads never need the graph lock.

use std::collections::HashMap;
use std::ffi::CString;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tengra_abi::dtype;

use crate::error::{EngineError, Result};
use crate::value::Value;

/// One tensor-producing slot, by node id and output index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub(crate) struct PortRef {
    pub op: usize,
    pub index: i32,
}

#[derive(Debug, Clone)]
pub(crate) struct PortInfo {
    pub dtype: i32,
    pub shape: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Attrs {
    pub dtype: Option<i32>,
    pub ints: HashMap<String, i64>,
    pub shape: Option<Vec<i64>>,
    pub tensor: Option<Value>,
}

/// Condition/body subgraphs of a finished While node. The cores are
/// shared with the cells that were exposed during construction and stay
/// alive for as long as the node does.
#[derive(Clone)]
pub(crate) struct WhileData {
    pub cond: Arc<GraphCore>,
    pub cond_inputs: Vec<PortRef>,
    pub cond_output: PortRef,
    pub body: Arc<GraphCore>,
    pub body_inputs: Vec<PortRef>,
    pub body_outputs: Vec<PortRef>,
}

pub(crate) struct OpNode {
    pub id: usize,
    pub name: String,
    pub c_name: CString,
    pub op_type: String,
    pub c_op_type: CString,
    pub inputs: Vec<PortRef>,
    pub control_inputs: Vec<usize>,
    pub attrs: Attrs,
    pub outputs: Vec<PortInfo>,
    pub while_data: Option<WhileData>,
}

#[derive(Default)]
pub(crate) struct GraphState {
    pub ops: Vec<Box<OpNode>>,
    pub by_name: HashMap<String, usize>,
    pub finalized: bool,
}

/// Shared graph core. Sessions and While nodes hold counted references,
/// so deleting the caller's graph handle never invalidates them.
#[derive(Default)]
pub(crate) struct GraphCore {
    pub state: Mutex<GraphState>,
}

/// The boxed ABI graph object.
pub(crate) struct GraphCell {
    pub core: Arc<GraphCore>,
}

impl GraphCell {
    pub fn new() -> Box<Self> {
        Box::new(GraphCell {
            core: Arc::new(GraphCore::default()),
        })
    }
}

impl GraphState {
    pub fn check_mutable(&self) -> Result<()> {
        if self.finalized {
            Err(EngineError::failed_precondition(
                "graph is finalized and can no longer be modified",
            ))
        } else {
            Ok(())
        }
    }

    /// Picks the final operation name: an explicit name must be unused,
    /// an absent one auto-uniquifies from the op type.
    pub fn resolve_name(&self, requested: Option<&str>, op_type: &str) -> Result<String> {
        match requested {
            Some(name) if !name.is_empty() => {
                if self.by_name.contains_key(name) {
                    Err(EngineError::invalid_argument(format!(
                        "duplicate operation name '{name}'"
                    )))
                } else {
                    Ok(name.to_string())
                }
            }
            _ => {
                if !self.by_name.contains_key(op_type) {
                    return Ok(op_type.to_string());
                }
                let mut n = 1usize;
                loop {
                    let candidate = format!("{op_type}_{n}");
                    if !self.by_name.contains_key(&candidate) {
                        return Ok(candidate);
                    }
                    n += 1;
                }
            }
        }
    }

    pub fn node(&self, id: usize) -> Result<&OpNode> {
        self.ops
            .get(id)
            .map(|b| b.as_ref())
            .ok_or_else(|| EngineError::internal(format!("operation id {id} out of range")))
    }

    pub fn port_dtype(&self, port: PortRef) -> Result<i32> {
        let node = self.node(port.op)?;
        node.outputs
            .get(port.index.max(0) as usize)
            .filter(|_| port.index >= 0)
            .map(|info| info.dtype)
            .ok_or_else(|| {
                EngineError::invalid_argument(format!(
                    "operation '{}' has no output slot {}",
                    node.name, port.index
                ))
            })
    }

    /// Appends a finished node and returns its stable address.
    #[allow(clippy::too_many_arguments)]
    pub fn add_node(
        &mut self,
        name: String,
        op_type: String,
        inputs: Vec<PortRef>,
        control_inputs: Vec<usize>,
        attrs: Attrs,
        outputs: Vec<PortInfo>,
        while_data: Option<WhileData>,
    ) -> Result<*mut OpNode> {
        let c_name = CString::new(name.clone())
            .map_err(|_| EngineError::invalid_argument("operation name contains a NUL byte"))?;
        let c_op_type = CString::new(op_type.clone())
            .map_err(|_| EngineError::invalid_argument("op type contains a NUL byte"))?;
        let id = self.ops.len();
        let mut node = Box::new(OpNode {
            id,
            name: name.clone(),
            c_name,
            op_type,
            c_op_type,
            inputs,
            control_inputs,
            attrs,
            outputs,
            while_data,
        });
        let ptr: *mut OpNode = node.as_mut();
        self.ops.push(node);
        self.by_name.insert(name, id);
        Ok(ptr)
    }

    /// Verifies that a node address belongs to this graph and returns its id.
    pub fn resolve_node_ptr(&self, ptr: *const OpNode) -> Result<usize> {
        if ptr.is_null() {
            return Err(EngineError::invalid_argument("null operation handle"));
        }
        // The id is read from the node itself, then checked against the
        // graph so a handle from another graph cannot alias in.
        let id = unsafe { (*ptr).id };
        match self.ops.get(id) {
            Some(node) if std::ptr::eq(node.as_ref(), ptr) => Ok(id),
            _ => Err(EngineError::invalid_argument(
                "operation handle does not belong to this graph",
            )),
        }
    }
}

/// Output arity, dtypes and construction-time validation per op type.
pub(crate) fn infer_outputs(
    state: &GraphState,
    op_type: &str,
    attrs: &Attrs,
    inputs: &[PortRef],
) -> Result<Vec<PortInfo>> {
    let arity = |expected: usize| -> Result<()> {
        if inputs.len() != expected {
            Err(EngineError::invalid_argument(format!(
                "op type '{op_type}' expects {expected} inputs, got {}",
                inputs.len()
            )))
        } else {
            Ok(())
        }
    };
    let same_dtype_inputs = || -> Result<i32> {
        let first = state.port_dtype(inputs[0])?;
        for &port in &inputs[1..] {
            if state.port_dtype(port)? != first {
                return Err(EngineError::invalid_argument(format!(
                    "op type '{op_type}' requires matching input dtypes"
                )));
            }
        }
        Ok(first)
    };

    match op_type {
        "Placeholder" | "Variable" => {
            arity(0)?;
            let dt = attrs.dtype.ok_or_else(|| {
                EngineError::invalid_argument(format!("op type '{op_type}' requires a dtype attr"))
            })?;
            Ok(vec![PortInfo {
                dtype: dt,
                shape: attrs.shape.clone(),
            }])
        }
        "Const" => {
            arity(0)?;
            let value = attrs.tensor.as_ref().ok_or_else(|| {
                EngineError::invalid_argument("Const requires a 'value' tensor attr")
            })?;
            Ok(vec![PortInfo {
                dtype: value.dtype,
                shape: Some(value.dims.clone()),
            }])
        }
        "Identity" | "Neg" | "Abs" => {
            arity(1)?;
            Ok(vec![PortInfo {
                dtype: state.port_dtype(inputs[0])?,
                shape: None,
            }])
        }
        "Add" | "Sub" | "Mul" | "Div" => {
            arity(2)?;
            Ok(vec![PortInfo {
                dtype: same_dtype_inputs()?,
                shape: None,
            }])
        }
        "AddN" => {
            if inputs.is_empty() {
                return Err(EngineError::invalid_argument(
                    "AddN expects at least one input",
                ));
            }
            Ok(vec![PortInfo {
                dtype: same_dtype_inputs()?,
                shape: None,
            }])
        }
        "Less" => {
            arity(2)?;
            same_dtype_inputs()?;
            Ok(vec![PortInfo {
                dtype: dtype::BOOL,
                shape: None,
            }])
        }
        "Shape" => {
            arity(1)?;
            state.port_dtype(inputs[0])?;
            Ok(vec![PortInfo {
                dtype: dtype::INT64,
                shape: None,
            }])
        }
        "Split" => {
            arity(2)?;
            let num_split = attrs.ints.get("num_split").copied().unwrap_or(0);
            if num_split < 1 {
                return Err(EngineError::invalid_argument(
                    "Split requires a positive 'num_split' attr",
                ));
            }
            let dt = state.port_dtype(inputs[1])?;
            Ok(vec![
                PortInfo {
                    dtype: dt,
                    shape: None,
                };
                num_split as usize
            ])
        }
        "Assign" => {
            arity(2)?;
            let var = state.node(inputs[0].op)?;
            if var.op_type != "Variable" {
                return Err(EngineError::invalid_argument(
                    "Assign expects a Variable output as its first input",
                ));
            }
            Ok(vec![PortInfo {
                dtype: state.port_dtype(inputs[1])?,
                shape: None,
            }])
        }
        "Assert" => {
            if inputs.is_empty() {
                return Err(EngineError::invalid_argument(
                    "Assert expects a condition input",
                ));
            }
            if state.port_dtype(inputs[0])? != dtype::BOOL {
                return Err(EngineError::invalid_argument(
                    "Assert condition must be Bool",
                ));
            }
            Ok(Vec::new())
        }
        "NoOp" => {
            arity(0)?;
            Ok(Vec::new())
        }
        "While" => Err(EngineError::invalid_argument(
            "While operations are built through the while construction calls",
        )),
        other => Err(EngineError::not_found(format!(
            "op type '{other}' is not registered",
        ))),
    }
}

// ---------------------------------------------------------------------
// Serialization
//
// The exported byte buffer is opaque to callers; this is its shape.
// ---------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
pub(crate) struct GraphDef {
    ops: Vec<OpDef>,
}

#[derive(Serialize, Deserialize)]
struct OpDef {
    name: String,
    op_type: String,
    inputs: Vec<PortRef>,
    control_inputs: Vec<usize>,
    dtype: Option<i32>,
    ints: Vec<(String, i64)>,
    shape: Option<Vec<i64>>,
    tensor: Option<Value>,
    while_def: Option<WhileDef>,
}

#[derive(Serialize, Deserialize)]
struct WhileDef {
    cond: GraphDef,
    cond_inputs: Vec<PortRef>,
    cond_output: PortRef,
    body: GraphDef,
    body_inputs: Vec<PortRef>,
    body_outputs: Vec<PortRef>,
}

pub(crate) fn export(state: &GraphState) -> Result<Vec<u8>> {
    let def = graph_def(state);
    bincode::serialize(&def)
        .map_err(|e| EngineError::internal(format!("graph serialization failed: {e}")))
}

fn graph_def(state: &GraphState) -> GraphDef {
    GraphDef {
        ops: state
            .ops
            .iter()
            .map(|node| OpDef {
                name: node.name.clone(),
                op_type: node.op_type.clone(),
                inputs: node.inputs.clone(),
                control_inputs: node.control_inputs.clone(),
                dtype: node.attrs.dtype,
                ints: node
                    .attrs
                    .ints
                    .iter()
                    .map(|(k, v)| (k.clone(), *v))
                    .collect(),
                shape: node.attrs.shape.clone(),
                tensor: node.attrs.tensor.clone(),
                while_def: node.while_data.as_ref().map(|wd| WhileDef {
                    cond: graph_def(&wd.cond.state.lock()),
                    cond_inputs: wd.cond_inputs.clone(),
                    cond_output: wd.cond_output,
                    body: graph_def(&wd.body.state.lock()),
                    body_inputs: wd.body_inputs.clone(),
                    body_outputs: wd.body_outputs.clone(),
                }),
            })
            .collect(),
    }
}

/// Merges a serialized graph into `state`, namespacing names under
/// `prefix` when given. Collisions fail with `AlreadyExists` before
/// anything is inserted.
pub(crate) fn import(state: &mut GraphState, data: &[u8], prefix: Option<&str>) -> Result<()> {
    state.check_mutable()?;
    let def: GraphDef = bincode::deserialize(data)
        .map_err(|e| EngineError::invalid_argument(format!("malformed serialized graph: {e}")))?;
    import_def(state, def, prefix)
}

fn import_def(state: &mut GraphState, def: GraphDef, prefix: Option<&str>) -> Result<()> {
    let mut incoming = std::collections::HashSet::new();
    for op in &def.ops {
        let name = prefixed(prefix, &op.name);
        if state.by_name.contains_key(&name) || !incoming.insert(name.clone()) {
            return Err(EngineError::already_exists(format!(
                "operation '{name}' already exists in the target graph"
            )));
        }
    }

    let base = state.ops.len();
    for op in def.ops {
        let name = prefixed(prefix, &op.name);
        let inputs: Vec<PortRef> = op
            .inputs
            .iter()
            .map(|p| PortRef {
                op: p.op + base,
                index: p.index,
            })
            .collect();
        let control_inputs: Vec<usize> = op.control_inputs.iter().map(|c| c + base).collect();
        let attrs = Attrs {
            dtype: op.dtype,
            ints: op.ints.into_iter().collect(),
            shape: op.shape,
            tensor: op.tensor,
        };
        let while_data = match op.while_def {
            Some(wd) => Some(WhileData {
                cond: core_from_def(wd.cond)?,
                cond_inputs: wd.cond_inputs,
                cond_output: wd.cond_output,
                body: core_from_def(wd.body)?,
                body_inputs: wd.body_inputs,
                body_outputs: wd.body_outputs,
            }),
            None => None,
        };
        let outputs = if op.op_type == "While" {
            while_outputs(state, &inputs)?
        } else {
            infer_outputs(state, &op.op_type, &attrs, &inputs)?
        };
        state.add_node(
            name,
            op.op_type,
            inputs,
            control_inputs,
            attrs,
            outputs,
            while_data,
        )?;
    }
    Ok(())
}

/// A While node produces one output per loop variable, dtype-matched to
/// its inputs.
pub(crate) fn while_outputs(state: &GraphState, inputs: &[PortRef]) -> Result<Vec<PortInfo>> {
    inputs
        .iter()
        .map(|&port| {
            Ok(PortInfo {
                dtype: state.port_dtype(port)?,
                shape: None,
            })
        })
        .collect()
}

fn core_from_def(def: GraphDef) -> Result<Arc<GraphCore>> {
    let core = Arc::new(GraphCore::default());
    {
        let mut state = core.state.lock();
        import_def(&mut state, def, None)?;
        state.finalized = true;
    }
    Ok(core)
}

fn prefixed(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(p) if !p.is_empty() => format!("{p}/{name}"),
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placeholder_attrs(dt: i32) -> Attrs {
        Attrs {
            dtype: Some(dt),
            ..Attrs::default()
        }
    }

    #[test]
    fn auto_names_uniquify() {
        let mut state = GraphState::default();
        for expected in ["Placeholder", "Placeholder_1", "Placeholder_2"] {
            let name = state.resolve_name(None, "Placeholder").unwrap();
            assert_eq!(name, expected);
            let outputs =
                infer_outputs(&state, "Placeholder", &placeholder_attrs(dtype::INT32), &[])
                    .unwrap();
            state
                .add_node(
                    name,
                    "Placeholder".into(),
                    vec![],
                    vec![],
                    placeholder_attrs(dtype::INT32),
                    outputs,
                    None,
                )
                .unwrap();
        }
    }

    #[test]
    fn explicit_duplicate_name_is_rejected() {
        let mut state = GraphState::default();
        let name = state.resolve_name(Some("feed"), "Placeholder").unwrap();
        let outputs =
            infer_outputs(&state, "Placeholder", &placeholder_attrs(dtype::INT32), &[]).unwrap();
        state
            .add_node(
                name,
                "Placeholder".into(),
                vec![],
                vec![],
                placeholder_attrs(dtype::INT32),
                outputs,
                None,
            )
            .unwrap();

        let err = state.resolve_name(Some("feed"), "Placeholder").unwrap_err();
        assert_eq!(err.code, tengra_abi::code::INVALID_ARGUMENT);
    }

    #[test]
    fn unknown_op_type_is_not_found() {
        let state = GraphState::default();
        let err = infer_outputs(&state, "Frobnicate", &Attrs::default(), &[]).unwrap_err();
        assert_eq!(err.code, tengra_abi::code::NOT_FOUND);
    }

    #[test]
    fn import_round_trip_with_prefix() {
        let mut state = GraphState::default();
        let attrs = Attrs {
            tensor: Some(Value::from_typed(dtype::INT32, vec![], &[3i32])),
            ..Attrs::default()
        };
        let outputs = infer_outputs(&state, "Const", &attrs, &[]).unwrap();
        state
            .add_node(
                "scalar".into(),
                "Const".into(),
                vec![],
                vec![],
                attrs,
                outputs,
                None,
            )
            .unwrap();
        let bytes = export(&state).unwrap();

        let mut target = GraphState::default();
        import(&mut target, &bytes, Some("imported")).unwrap();
        assert!(target.by_name.contains_key("imported/scalar"));
        assert!(!target.by_name.contains_key("scalar"));

        // A second unprefixed import into the same graph collides with
        // nothing, but importing twice under one prefix does.
        let err = import(&mut target, &bytes, Some("imported")).unwrap_err();
        assert_eq!(err.code, tengra_abi::code::ALREADY_EXISTS);
    }
}
