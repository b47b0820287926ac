//! Demand-driven graph evaluation.
//!
//! A run evaluates exactly the operations reachable from its fetches and
//! targets, memoizing per-port values for the duration of the request.
//! Feeds override an operation's own value: a fed port never triggers
//! evaluation of its producer. Control inputs execute before the node
//! that declares them.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tengra_abi::dtype;

use crate::error::{EngineError, Result};
use crate::graph::{GraphCore, GraphState, OpNode, PortRef, WhileData};
use crate::value::Value;

pub(crate) struct Eval<'g> {
    state: &'g GraphState,
    vars: &'g Mutex<HashMap<String, Value>>,
    feeds: HashMap<PortRef, Value>,
    memo: HashMap<PortRef, Value>,
    executed: HashSet<usize>,
}

impl<'g> Eval<'g> {
    pub fn new(
        state: &'g GraphState,
        vars: &'g Mutex<HashMap<String, Value>>,
        feeds: HashMap<PortRef, Value>,
    ) -> Self {
        Eval {
            state,
            vars,
            feeds,
            memo: HashMap::new(),
            executed: HashSet::new(),
        }
    }

    pub fn output(&mut self, port: PortRef) -> Result<Value> {
        if let Some(value) = self.feeds.get(&port) {
            return Ok(value.clone());
        }
        if let Some(value) = self.memo.get(&port) {
            return Ok(value.clone());
        }
        self.execute(port.op)?;
        self.memo.get(&port).cloned().ok_or_else(|| {
            let name = self
                .state
                .node(port.op)
                .map(|n| n.name.clone())
                .unwrap_or_default();
            EngineError::invalid_argument(format!(
                "operation '{name}' produced no value for output slot {}",
                port.index
            ))
        })
    }

    /// Ensures an operation has run (for targets and control inputs).
    pub fn execute(&mut self, id: usize) -> Result<()> {
        if self.executed.contains(&id) {
            return Ok(());
        }
        // The graph is append-only and inputs always reference earlier
        // nodes, so this recursion cannot cycle.
        self.executed.insert(id);

        let node = self.state.node(id)?;
        for &dep in &node.control_inputs {
            self.execute(dep)?;
        }
        let outputs = self.compute(node)?;
        for (index, value) in outputs.into_iter().enumerate() {
            self.memo.insert(
                PortRef {
                    op: id,
                    index: index as i32,
                },
                value,
            );
        }
        Ok(())
    }

    fn inputs(&mut self, node: &OpNode) -> Result<Vec<Value>> {
        node.inputs
            .iter()
            .map(|&port| self.output(port))
            .collect()
    }

    fn compute(&mut self, node: &OpNode) -> Result<Vec<Value>> {
        match node.op_type.as_str() {
            "Const" => {
                let value = node.attrs.tensor.clone().ok_or_else(|| {
                    EngineError::internal(format!("Const '{}' has no value", node.name))
                })?;
                Ok(vec![value])
            }
            "Placeholder" => {
                // Reached only when the port was not fed.
                Err(EngineError::invalid_argument(format!(
                    "placeholder '{}' was not fed",
                    node.name
                )))
            }
            "Identity" => Ok(self.inputs(node)?),
            "Add" | "Sub" | "Mul" | "Div" => {
                let inputs = self.inputs(node)?;
                let op = BinOp::from_name(&node.op_type);
                Ok(vec![binary_elementwise(op, &inputs[0], &inputs[1])?])
            }
            "AddN" => {
                let inputs = self.inputs(node)?;
                let mut acc = inputs[0].clone();
                for value in &inputs[1..] {
                    acc = binary_elementwise(BinOp::Add, &acc, value)?;
                }
                Ok(vec![acc])
            }
            "Neg" => {
                let inputs = self.inputs(node)?;
                Ok(vec![negate(&inputs[0])?])
            }
            "Abs" => {
                let inputs = self.inputs(node)?;
                Ok(vec![absolute(&inputs[0])?])
            }
            "Less" => {
                let inputs = self.inputs(node)?;
                Ok(vec![less_than(&inputs[0], &inputs[1])?])
            }
            "Shape" => {
                let inputs = self.inputs(node)?;
                let dims = inputs[0].dims.clone();
                let rank = dims.len() as i64;
                Ok(vec![Value::from_typed(dtype::INT64, vec![rank], &dims)])
            }
            "Split" => {
                let inputs = self.inputs(node)?;
                split(node, &inputs[0], &inputs[1])
            }
            "Assert" => {
                let condition = self.output(node.inputs[0])?;
                if condition.bool_all_true()? {
                    Ok(Vec::new())
                } else {
                    Err(EngineError::invalid_argument(format!(
                        "assertion '{}' failed",
                        node.name
                    )))
                }
            }
            "NoOp" => Ok(Vec::new()),
            "Variable" => {
                let value = self.vars.lock().get(&node.name).cloned();
                value.map(|v| vec![v]).ok_or_else(|| {
                    EngineError::failed_precondition(format!(
                        "variable '{}' has not been initialized",
                        node.name
                    ))
                })
            }
            "Assign" => {
                let variable = self.state.node(node.inputs[0].op)?;
                let value = self.output(node.inputs[1])?;
                self.vars
                    .lock()
                    .insert(variable.name.clone(), value.clone());
                Ok(vec![value])
            }
            "While" => {
                let data = node.while_data.as_ref().ok_or_else(|| {
                    EngineError::internal(format!("While '{}' has no subgraphs", node.name))
                })?;
                let loop_vars = self.inputs(node)?;
                self.run_while(data, loop_vars)
            }
            other => Err(EngineError::unimplemented(format!(
                "op type '{other}' is not executable by this engine"
            ))),
        }
    }

    fn run_while(&mut self, data: &WhileData, mut loop_vars: Vec<Value>) -> Result<Vec<Value>> {
        loop {
            let condition = eval_subgraph(
                &data.cond,
                self.vars,
                &data.cond_inputs,
                &loop_vars,
                &[data.cond_output],
            )?;
            let proceed = condition
                .first()
                .ok_or_else(|| EngineError::internal("While condition produced no value"))?
                .bool_all_true()?;
            if !proceed {
                return Ok(loop_vars);
            }
            loop_vars = eval_subgraph(
                &data.body,
                self.vars,
                &data.body_inputs,
                &loop_vars,
                &data.body_outputs,
            )?;
        }
    }
}

/// Evaluates `fetches` in a subgraph with its loop inputs fed.
fn eval_subgraph(
    core: &GraphCore,
    vars: &Mutex<HashMap<String, Value>>,
    input_ports: &[PortRef],
    input_values: &[Value],
    fetches: &[PortRef],
) -> Result<Vec<Value>> {
    let feeds: HashMap<PortRef, Value> = input_ports
        .iter()
        .copied()
        .zip(input_values.iter().cloned())
        .collect();
    let state = core.state.lock();
    let mut eval = Eval::new(&state, vars, feeds);
    fetches.iter().map(|&port| eval.output(port)).collect()
}

// ---------------------------------------------------------------------
// Elementwise kernels
//
// Same-shape operands or a one-element broadcast on either side; the
// interpreter exists to exercise the protocol, not to be a math library.
// ---------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    fn from_name(name: &str) -> BinOp {
        match name {
            "Sub" => BinOp::Sub,
            "Mul" => BinOp::Mul,
            "Div" => BinOp::Div,
            _ => BinOp::Add,
        }
    }
}

fn broadcast_dims(a: &Value, b: &Value) -> Result<Vec<i64>> {
    if a.dims == b.dims {
        Ok(a.dims.clone())
    } else if a.is_scalar_like() {
        Ok(b.dims.clone())
    } else if b.is_scalar_like() {
        Ok(a.dims.clone())
    } else {
        Err(EngineError::invalid_argument(format!(
            "incompatible shapes {:?} and {:?}",
            a.dims, b.dims
        )))
    }
}

fn pick<T: Copy>(values: &[T], i: usize) -> T {
    if values.len() == 1 {
        values[0]
    } else {
        values[i]
    }
}

fn binary_vec<T>(op: BinOp, a: &Value, b: &Value, integer: bool) -> Result<Value>
where
    T: bytemuck::Pod
        + Copy
        + PartialEq
        + Default
        + std::ops::Add<Output = T>
        + std::ops::Sub<Output = T>
        + std::ops::Mul<Output = T>
        + std::ops::Div<Output = T>,
{
    let dims = broadcast_dims(a, b)?;
    let av = a.typed::<T>()?;
    let bv = b.typed::<T>()?;
    let n = av.len().max(bv.len());
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let x = pick(&av, i);
        let y = pick(&bv, i);
        out.push(match op {
            BinOp::Add => x + y,
            BinOp::Sub => x - y,
            BinOp::Mul => x * y,
            BinOp::Div => {
                if integer && y == T::default() {
                    return Err(EngineError::invalid_argument("integer division by zero"));
                }
                x / y
            }
        });
    }
    Ok(Value::from_typed(a.dtype, dims, &out))
}

fn binary_elementwise(op: BinOp, a: &Value, b: &Value) -> Result<Value> {
    if a.dtype != b.dtype {
        return Err(EngineError::invalid_argument(
            "binary op operands must share a dtype",
        ));
    }
    match a.dtype {
        dtype::INT32 => binary_vec::<i32>(op, a, b, true),
        dtype::INT64 => binary_vec::<i64>(op, a, b, true),
        dtype::FLOAT32 => binary_vec::<f32>(op, a, b, false),
        dtype::FLOAT64 => binary_vec::<f64>(op, a, b, false),
        other => Err(EngineError::unimplemented(format!(
            "arithmetic is not implemented for dtype tag {other}"
        ))),
    }
}

fn map_value<T, F>(v: &Value, f: F) -> Result<Value>
where
    T: bytemuck::Pod,
    F: Fn(T) -> T,
{
    let mapped: Vec<T> = v.typed::<T>()?.into_iter().map(f).collect();
    Ok(Value::from_typed(v.dtype, v.dims.clone(), &mapped))
}

fn negate(v: &Value) -> Result<Value> {
    match v.dtype {
        dtype::INT32 => map_value::<i32, _>(v, |x| x.wrapping_neg()),
        dtype::INT64 => map_value::<i64, _>(v, |x| x.wrapping_neg()),
        dtype::FLOAT32 => map_value::<f32, _>(v, |x| -x),
        dtype::FLOAT64 => map_value::<f64, _>(v, |x| -x),
        other => Err(EngineError::unimplemented(format!(
            "Neg is not implemented for dtype tag {other}"
        ))),
    }
}

fn absolute(v: &Value) -> Result<Value> {
    match v.dtype {
        dtype::INT32 => map_value::<i32, _>(v, |x| x.wrapping_abs()),
        dtype::INT64 => map_value::<i64, _>(v, |x| x.wrapping_abs()),
        dtype::FLOAT32 => map_value::<f32, _>(v, |x| x.abs()),
        dtype::FLOAT64 => map_value::<f64, _>(v, |x| x.abs()),
        other => Err(EngineError::unimplemented(format!(
            "Abs is not implemented for dtype tag {other}"
        ))),
    }
}

fn less_vec<T>(a: &Value, b: &Value) -> Result<Value>
where
    T: bytemuck::Pod + Copy + PartialOrd,
{
    let dims = broadcast_dims(a, b)?;
    let av = a.typed::<T>()?;
    let bv = b.typed::<T>()?;
    let n = av.len().max(bv.len());
    let out: Vec<u8> = (0..n)
        .map(|i| u8::from(pick(&av, i) < pick(&bv, i)))
        .collect();
    Ok(Value::new(dtype::BOOL, dims, out))
}

fn less_than(a: &Value, b: &Value) -> Result<Value> {
    if a.dtype != b.dtype {
        return Err(EngineError::invalid_argument(
            "Less operands must share a dtype",
        ));
    }
    match a.dtype {
        dtype::INT32 => less_vec::<i32>(a, b),
        dtype::INT64 => less_vec::<i64>(a, b),
        dtype::FLOAT32 => less_vec::<f32>(a, b),
        dtype::FLOAT64 => less_vec::<f64>(a, b),
        other => Err(EngineError::unimplemented(format!(
            "Less is not implemented for dtype tag {other}"
        ))),
    }
}

fn split(node: &OpNode, axis: &Value, value: &Value) -> Result<Vec<Value>> {
    let axis = axis.as_i64_scalar()?;
    if axis != 0 {
        return Err(EngineError::unimplemented(
            "Split supports axis 0 only",
        ));
    }
    let num_split = node.attrs.ints.get("num_split").copied().unwrap_or(0);
    if num_split < 1 {
        return Err(EngineError::invalid_argument(
            "Split requires a positive 'num_split' attr",
        ));
    }
    if Value::elem_width(value.dtype).is_none() {
        return Err(EngineError::unimplemented(
            "Split is not implemented for variable-width dtypes",
        ));
    }
    let leading = match value.dims.first() {
        Some(&d) if d > 0 => d,
        _ => {
            return Err(EngineError::invalid_argument(
                "Split input must have a non-empty leading dimension",
            ))
        }
    };
    if leading % num_split != 0 {
        return Err(EngineError::invalid_argument(format!(
            "leading dimension {leading} is not divisible by num_split {num_split}"
        )));
    }

    let chunk_rows = leading / num_split;
    let row_bytes = value.bytes.len() / leading as usize;
    let chunk_bytes = row_bytes * chunk_rows as usize;
    let mut dims = value.dims.clone();
    dims[0] = chunk_rows;

    Ok((0..num_split as usize)
        .map(|i| {
            Value::new(
                value.dtype,
                dims.clone(),
                value.bytes[i * chunk_bytes..(i + 1) * chunk_bytes].to_vec(),
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int32(dims: Vec<i64>, values: &[i32]) -> Value {
        Value::from_typed(dtype::INT32, dims, values)
    }

    #[test]
    fn scalar_broadcast() {
        let a = int32(vec![2, 2], &[1, 2, 3, 4]);
        let b = int32(vec![], &[10]);
        let out = binary_elementwise(BinOp::Mul, &a, &b).unwrap();
        assert_eq!(out.dims, vec![2, 2]);
        assert_eq!(out.typed::<i32>().unwrap(), vec![10, 20, 30, 40]);
    }

    #[test]
    fn shape_mismatch_is_invalid_argument() {
        let a = int32(vec![2], &[1, 2]);
        let b = int32(vec![3], &[1, 2, 3]);
        let err = binary_elementwise(BinOp::Add, &a, &b).unwrap_err();
        assert_eq!(err.code, tengra_abi::code::INVALID_ARGUMENT);
    }

    #[test]
    fn integer_division_by_zero_fails() {
        let a = int32(vec![], &[1]);
        let b = int32(vec![], &[0]);
        let err = binary_elementwise(BinOp::Div, &a, &b).unwrap_err();
        assert_eq!(err.code, tengra_abi::code::INVALID_ARGUMENT);
    }

    #[test]
    fn less_produces_bool() {
        let a = int32(vec![2], &[1, 5]);
        let b = int32(vec![2], &[3, 3]);
        let out = less_than(&a, &b).unwrap();
        assert_eq!(out.dtype, dtype::BOOL);
        assert_eq!(out.bytes, vec![1, 0]);
    }
}
