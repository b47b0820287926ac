//! End-to-end tests of the runner protocol.

mod common;

use common::{platform, session};
use tengra::{ArrayData, Code, DataType, Graph, Ownership, Tensor, WhileSpec};

#[test]
fn constant_add_and_mul_on_one_session() {
    let p = platform();
    let g = Graph::new(&p);
    let a = g.const_scalar(2i32).unwrap();
    let b = g.const_scalar(3i32).unwrap();
    let sum = g.add(&a, &b).unwrap();
    let product = g.mul(&a, &b).unwrap();

    let s = session(&g);
    let result = s.runner().run_output(&sum).unwrap();
    assert_eq!(result.dtype(), DataType::Int32);
    assert_eq!(result.shape(), &[] as &[i64]);
    assert_eq!(result.scalar::<i32>().unwrap(), 5);
    assert_eq!(result.ownership(), Ownership::EngineOwned);

    // A separate runner on the same session.
    let result = s.runner().run_output(&product).unwrap();
    assert_eq!(result.scalar::<i32>().unwrap(), 6);
}

#[test]
fn results_follow_fetch_order_not_graph_order() {
    let p = platform();
    let g = Graph::new(&p);
    let first = g.const_scalar(10i32).unwrap();
    let second = g.const_scalar(20i32).unwrap();

    // Fetch the later-built output first.
    let results = s_run(&g, |runner| runner.fetch(&second).fetch(&first));
    assert_eq!(results[0].scalar::<i32>().unwrap(), 20);
    assert_eq!(results[1].scalar::<i32>().unwrap(), 10);

    let results = s_run(&g, |runner| runner.fetch(&first).fetch(&second));
    assert_eq!(results[0].scalar::<i32>().unwrap(), 10);
    assert_eq!(results[1].scalar::<i32>().unwrap(), 20);
}

fn s_run<F>(graph: &Graph, build: F) -> Vec<Tensor>
where
    F: for<'s> FnOnce(tengra::Runner<'s>) -> tengra::Runner<'s>,
{
    let s = session(graph);
    build(s.runner()).run().unwrap()
}

#[test]
fn placeholders_feed_values_per_run() {
    let p = platform();
    let g = Graph::new(&p);
    let a = g.placeholder(DataType::Int32).unwrap();
    let b = g.placeholder(DataType::Int32).unwrap();
    let sum = g.add(&a, &b).unwrap();
    let product = g.mul(&a, &b).unwrap();

    let s = session(&g);
    let result = s
        .runner()
        .add_input(&a, Tensor::from_scalar(&p, 3i32).unwrap())
        .add_input(&b, Tensor::from_scalar(&p, 2i32).unwrap())
        .run_output(&sum)
        .unwrap();
    assert_eq!(result.scalar::<i32>().unwrap(), 5);

    let result = s
        .runner()
        .add_input(&a, Tensor::from_scalar(&p, 3i32).unwrap())
        .add_input(&b, Tensor::from_scalar(&p, 2i32).unwrap())
        .run_output(&product)
        .unwrap();
    assert_eq!(result.scalar::<i32>().unwrap(), 6);
}

#[test]
fn unsupported_kernel_dtypes_report_unimplemented() {
    let p = platform();
    let g = Graph::new(&p);
    let a = g.placeholder(DataType::Int16).unwrap();
    let b = g.placeholder(DataType::Int16).unwrap();
    let sum = g.add(&a, &b).unwrap();

    let s = session(&g);
    let err = s
        .runner()
        .add_input(&a, Tensor::from_scalar(&p, 3i16).unwrap())
        .add_input(&b, Tensor::from_scalar(&p, 2i16).unwrap())
        .run_output(&sum)
        .unwrap_err();
    // The engine's code must come back untouched.
    assert_eq!(err.code(), Some(Code::Unimplemented));
}

#[test]
fn multidimensional_values_round_trip_through_a_run() {
    let p = platform();
    let g = Graph::new(&p);
    let input = g.placeholder(DataType::Int32).unwrap();
    let doubled = g.mul(&input, &g.const_scalar(2i32).unwrap()).unwrap();

    let value = ArrayData::seq(vec![
        ArrayData::seq(vec![ArrayData::of(&[0i32, 1]), ArrayData::of(&[2, 3])]),
        ArrayData::seq(vec![ArrayData::of(&[4, 5]), ArrayData::of(&[6, 7])]),
    ]);
    let fed = Tensor::from_array_data(&p, &value).unwrap();

    let s = session(&g);
    let result = s.runner().add_input(&input, fed).run_output(&doubled).unwrap();
    assert_eq!(result.shape(), &[2, 2, 2]);
    assert_eq!(
        result.to_vec::<i32>().unwrap(),
        vec![0, 2, 4, 6, 8, 10, 12, 14]
    );

    let expected = ArrayData::seq(vec![
        ArrayData::seq(vec![ArrayData::of(&[0i32, 2]), ArrayData::of(&[4, 6])]),
        ArrayData::seq(vec![ArrayData::of(&[8, 10]), ArrayData::of(&[12, 14])]),
    ]);
    assert_eq!(result.to_array_data::<i32>().unwrap(), expected);
}

#[test]
fn split_outputs_resolve_by_colon_index() {
    let p = platform();
    let g = Graph::new(&p);
    let axis = g.const_scalar(0i32).unwrap();
    let values = g
        .constant(&Tensor::from_vec(&p, vec![1i32, 2, 3, 4], &[4]).unwrap())
        .unwrap();
    let split = g.split(&axis, &values, 2, Some("Split")).unwrap();
    assert_eq!(split.num_outputs(), 2);
    g.add(&split.output(0), &split.output(1)).unwrap();

    let s = session(&g);
    let fetched = s.runner().fetch("Split:1").run().unwrap();
    assert_eq!(fetched[0].to_vec::<i32>().unwrap(), vec![3, 4]);

    // Feed both split outputs by colon-indexed name and read the sum.
    let t0 = Tensor::from_vec(&p, vec![4i32, 3, 2, 1], &[2]).unwrap();
    let t1 = Tensor::from_vec(&p, vec![4i32, 3, 2, 1], &[2]).unwrap();
    let result = s
        .runner()
        .add_input("Split:0", t0)
        .add_input("Split:1", t1)
        .run_output("Add")
        .unwrap();
    assert_eq!(result.to_vec::<i32>().unwrap(), vec![8, 6, 4, 2]);
}

#[test]
fn target_only_runs_return_nothing_but_take_effect() {
    let p = platform();
    let g = Graph::new(&p);
    let initial = g.const_scalar(5i32).unwrap();
    let var = g.variable(&initial, "counter").unwrap();
    let bump = g.add(&var.value, &g.const_scalar(1i32).unwrap()).unwrap();
    let update = g.assign(&var, &bump).unwrap();

    let s = session(&g);

    // Initialization: targets only, empty result sequence.
    let results = s.runner().add_target(&var.initializer).run().unwrap();
    assert!(results.is_empty());

    let value = s.runner().run_output(&var.value).unwrap();
    assert_eq!(value.scalar::<i32>().unwrap(), 5);

    // The update's effect is visible to a later, separate fetch.
    let results = s.runner().add_target(&update).run().unwrap();
    assert!(results.is_empty());
    let value = s.runner().run_output(&var.value).unwrap();
    assert_eq!(value.scalar::<i32>().unwrap(), 6);
}

#[test]
fn uninitialized_variable_is_a_failed_precondition() {
    let p = platform();
    let g = Graph::new(&p);
    let initial = g.const_scalar(1i32).unwrap();
    let var = g.variable(&initial, "lonely").unwrap();

    let s = session(&g);
    let err = s.runner().run_output(&var.value).unwrap_err();
    assert_eq!(err.code(), Some(Code::FailedPrecondition));
}

#[test]
fn assertion_failure_propagates_through_control_inputs() {
    let p = platform();
    let g = Graph::new(&p);
    let flag = g
        .placeholder_named(DataType::Bool, None, "boolean")
        .unwrap();
    let check = g.assert_that(&flag, &[]).unwrap();
    let gate = g.no_op(&[check]).unwrap();

    let s = session(&g);

    let results = s
        .runner()
        .add_input(&flag, Tensor::from_scalar(&p, true).unwrap())
        .add_target(&gate)
        .run()
        .unwrap();
    assert!(results.is_empty());

    let err = s
        .runner()
        .add_input(&flag, Tensor::from_scalar(&p, false).unwrap())
        .add_target(&gate)
        .run()
        .unwrap_err();
    assert_eq!(err.code(), Some(Code::InvalidArgument));
}

#[test]
fn duplicate_feeds_for_one_slot_are_rejected() {
    let p = platform();
    let g = Graph::new(&p);
    let x = g.placeholder(DataType::Int32).unwrap();
    let out = g.add(&x, &g.const_scalar(1i32).unwrap()).unwrap();

    let s = session(&g);
    let err = s
        .runner()
        .add_input(&x, Tensor::from_scalar(&p, 1i32).unwrap())
        .add_input(&x, Tensor::from_scalar(&p, 2i32).unwrap())
        .run_output(&out)
        .unwrap_err();
    assert_eq!(err.code(), Some(Code::InvalidArgument));
}

#[test]
fn unresolvable_names_fail_with_not_found() {
    let p = platform();
    let g = Graph::new(&p);
    g.const_scalar(1i32).unwrap();

    let s = session(&g);
    let err = s.runner().fetch("ghost").run().unwrap_err();
    assert_eq!(err.code(), Some(Code::NotFound));

    let err = s.runner().add_target("ghost").run().unwrap_err();
    assert_eq!(err.code(), Some(Code::NotFound));
}

#[test]
fn unfed_placeholder_fails_the_run() {
    let p = platform();
    let g = Graph::new(&p);
    let x = g.placeholder(DataType::Int32).unwrap();
    let out = g.add(&x, &g.const_scalar(1i32).unwrap()).unwrap();

    let s = session(&g);
    let err = s.runner().run_output(&out).unwrap_err();
    assert_eq!(err.code(), Some(Code::InvalidArgument));
}

#[test]
fn while_loop_runs_to_termination() {
    let p = platform();
    let g = Graph::new(&p);
    let p0 = g.placeholder(DataType::Int32).unwrap();
    let p1 = g.placeholder(DataType::Int32).unwrap();

    // while (v0 < v1) { v0 = v0 + v1 + 1 }
    let outputs = g
        .while_loop(&[p0.clone(), p1.clone()], Some("Simple11"), |subgraphs| {
            let cond = subgraphs
                .cond_graph
                .less(&subgraphs.cond_inputs[0], &subgraphs.cond_inputs[1])?;
            let body = &subgraphs.body_graph;
            let step = body.add(&subgraphs.body_inputs[0], &subgraphs.body_inputs[1])?;
            let bumped = body.add(&step, &body.const_scalar(1i32)?)?;
            Ok(WhileSpec {
                cond_output: cond,
                body_outputs: vec![bumped, subgraphs.body_inputs[1].clone()],
            })
        })
        .unwrap();
    assert_eq!(outputs.len(), 2);

    let s = session(&g);
    let results = s
        .runner()
        .add_input(&p0, Tensor::from_scalar(&p, -9i32).unwrap())
        .add_input(&p1, Tensor::from_scalar(&p, 2i32).unwrap())
        .fetch(&outputs[0])
        .fetch(&outputs[1])
        .run()
        .unwrap();
    assert_eq!(results[0].scalar::<i32>().unwrap(), 3);
    assert_eq!(results[1].scalar::<i32>().unwrap(), 2);
}

#[test]
fn string_tensors_pass_through_the_engine_intact() {
    let p = platform();
    let g = Graph::new(&p);
    let input = g.placeholder(DataType::String).unwrap();
    let forwarded = g.identity(&input).unwrap();

    let elements: Vec<&[u8]> = vec![b"alpha", b"with\0nul", b""];
    let fed = Tensor::from_byte_strings(&p, &elements, &[3]).unwrap();

    let s = session(&g);
    let result = s.runner().add_input(&input, fed).run_output(&forwarded).unwrap();
    assert_eq!(result.dtype(), DataType::String);
    assert_eq!(result.to_byte_strings().unwrap(), elements);
}

#[test]
fn runs_on_one_session_are_independent() {
    let p = platform();
    let g = Graph::new(&p);
    let x = g.placeholder(DataType::Float64).unwrap();
    let half = g
        .div(&x, &g.const_scalar(2.0f64).unwrap())
        .unwrap();

    let s = session(&g);
    for value in [1.0f64, 8.0, -3.5] {
        let result = s
            .runner()
            .add_input(&x, Tensor::from_scalar(&p, value).unwrap())
            .run_output(&half)
            .unwrap();
        assert_eq!(result.scalar::<f64>().unwrap(), value / 2.0);
    }
}
