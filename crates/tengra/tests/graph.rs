//! Graph construction, import and low-level description tests.

mod common;

use common::{platform, session};
use tengra::{Code, DataType, Graph, Tensor};

#[test]
fn import_under_a_prefix_namespaces_every_operation() {
    let p = platform();

    // Build a graph with two named nodes and serialize it.
    let source = Graph::new(&p);
    source
        .placeholder_named(DataType::Int32, None, "feed")
        .unwrap();
    source
        .constant_named(&Tensor::from_scalar(&p, 3i32).unwrap(), "scalar")
        .unwrap();
    let bytes = source.to_bytes().unwrap();

    // Import it into a fresh graph under a prefix.
    let target = Graph::new(&p);
    target.import(&bytes, Some("imported")).unwrap();

    let scalar = target.operation("imported/scalar");
    assert!(scalar.is_some());
    assert!(target.operation("imported/feed").is_some());
    assert!(target.operation("scalar").is_none());
    assert!(target.operation("feed").is_none());

    // Imported nodes connect to new nodes without trouble.
    let feed = target.output("imported/feed").unwrap();
    let scalar = target.output("imported/scalar").unwrap();
    let sum = target.add(&feed, &scalar).unwrap();

    let s = session(&target);
    let result = s
        .runner()
        .add_input(&feed, Tensor::from_scalar(&p, 4i32).unwrap())
        .run_output(&sum)
        .unwrap();
    assert_eq!(result.scalar::<i32>().unwrap(), 7);
}

#[test]
fn unprefixed_import_collision_is_already_exists() {
    let p = platform();
    let source = Graph::new(&p);
    source
        .constant_named(&Tensor::from_scalar(&p, 1i32).unwrap(), "scalar")
        .unwrap();
    let bytes = source.to_bytes().unwrap();

    let target = Graph::new(&p);
    target.import(&bytes, None).unwrap();
    assert!(target.operation("scalar").is_some());

    let before = target.operation_count();
    let err = target.import(&bytes, None).unwrap_err();
    assert_eq!(err.code(), Some(Code::AlreadyExists));
    // A rejected import leaves the graph untouched.
    assert_eq!(target.operation_count(), before);
}

#[test]
fn imported_graphs_execute() {
    let p = platform();
    let source = Graph::new(&p);
    let two = source.const_scalar(2i32).unwrap();
    let three = source.const_scalar(3i32).unwrap();
    let sum = source.add(&two, &three).unwrap();
    let sum_name = sum.operation().name();
    let bytes = source.to_bytes().unwrap();

    let target = Graph::new(&p);
    target.import(&bytes, Some("m")).unwrap();
    let s = session(&target);
    let result = s.runner().run_output(format!("m/{sum_name}")).unwrap();
    assert_eq!(result.scalar::<i32>().unwrap(), 5);
}

#[test]
fn construction_type_mismatch_surfaces_at_finish() {
    let p = platform();
    let g = Graph::new(&p);
    let int_value = g.const_scalar(1i32).unwrap();
    let float_value = g.const_scalar(1.0f32).unwrap();
    let err = g.add(&int_value, &float_value).unwrap_err();
    assert_eq!(err.code(), Some(Code::InvalidArgument));
}

#[test]
fn low_level_descriptions_build_working_operations() {
    let p = platform();
    let g = Graph::new(&p);

    // The long-hand equivalent of the placeholder/const helpers.
    let feed = g
        .new_operation("Placeholder", Some("feed"))
        .unwrap()
        .set_attr_type("dtype", DataType::Int32)
        .finish()
        .unwrap();
    let two = g
        .new_operation("Const", Some("two"))
        .unwrap()
        .set_attr_tensor("value", &Tensor::from_scalar(&p, 2i32).unwrap())
        .set_attr_type("dtype", DataType::Int32)
        .finish()
        .unwrap();
    let sum = g
        .new_operation("AddN", Some("add"))
        .unwrap()
        .add_input_list(&[feed.output(0), two.output(0)])
        .finish()
        .unwrap();

    let s = session(&g);
    let result = s
        .runner()
        .add_input(&feed.output(0), Tensor::from_scalar(&p, 3i32).unwrap())
        .run_output(&sum.output(0))
        .unwrap();
    assert_eq!(result.scalar::<i32>().unwrap(), 5);
}

#[test]
fn foreign_graph_inputs_are_rejected() {
    let p = platform();
    let g1 = Graph::new(&p);
    let g2 = Graph::new(&p);
    let foreign = g1.const_scalar(1i32).unwrap();
    let local = g2.const_scalar(2i32).unwrap();
    let err = g2.add(&local, &foreign).unwrap_err();
    assert_eq!(err.code(), Some(Code::InvalidArgument));
}

#[test]
fn while_builder_failure_aborts_cleanly() {
    let p = platform();
    let g = Graph::new(&p);
    let x = g.placeholder(DataType::Int32).unwrap();
    let before = g.operation_count();

    let err = g
        .while_loop(&[x.clone()], None, |_subgraphs| {
            Err(tengra::Status::invalid_argument("builder bailed").into())
        })
        .unwrap_err();
    assert_eq!(err.code(), Some(Code::InvalidArgument));
    // No While node was installed and the graph keeps working.
    assert_eq!(g.operation_count(), before);

    let doubled = g.mul(&x, &g.const_scalar(2i32).unwrap()).unwrap();
    let s = session(&g);
    let result = s
        .runner()
        .add_input(&x, Tensor::from_scalar(&p, 4i32).unwrap())
        .run_output(&doubled)
        .unwrap();
    assert_eq!(result.scalar::<i32>().unwrap(), 8);
}

#[test]
fn while_body_arity_must_match_inputs() {
    let p = platform();
    let g = Graph::new(&p);
    let x = g.placeholder(DataType::Int32).unwrap();

    let err = g
        .while_loop(&[x], None, |subgraphs| {
            let cond = subgraphs.cond_graph.less(
                &subgraphs.cond_inputs[0],
                &subgraphs.cond_graph.const_scalar(10i32)?,
            )?;
            Ok(tengra::WhileSpec {
                cond_output: cond,
                body_outputs: vec![], // wrong arity
            })
        })
        .unwrap_err();
    assert_eq!(err.code(), Some(Code::InvalidArgument));
}

#[test]
fn shape_op_reports_runtime_shape() {
    let p = platform();
    let g = Graph::new(&p);
    let value = g
        .constant(&Tensor::from_vec(&p, vec![1i64, 2, 3, 4, 5, 6], &[2, 3]).unwrap())
        .unwrap();
    let shape = g.shape_of(&value).unwrap();

    let s = session(&g);
    let result = s.runner().run_output(&shape).unwrap();
    assert_eq!(result.dtype(), DataType::Int64);
    assert_eq!(result.to_vec::<i64>().unwrap(), vec![2, 3]);
}

#[test]
fn unary_helpers_compute() {
    let p = platform();
    let g = Graph::new(&p);
    let v = g
        .constant(&Tensor::from_vec(&p, vec![-2i32, 3], &[2]).unwrap())
        .unwrap();
    let negated = g.neg(&v).unwrap();
    let magnitudes = g.abs(&v).unwrap();
    let difference = g.sub(&v, &v).unwrap();

    let s = session(&g);
    let results = s
        .runner()
        .fetch(&negated)
        .fetch(&magnitudes)
        .fetch(&difference)
        .run()
        .unwrap();
    assert_eq!(results[0].to_vec::<i32>().unwrap(), vec![2, -3]);
    assert_eq!(results[1].to_vec::<i32>().unwrap(), vec![2, 3]);
    assert_eq!(results[2].to_vec::<i32>().unwrap(), vec![0, 0]);
}

#[test]
fn add_n_folds_many_inputs() {
    let p = platform();
    let g = Graph::new(&p);
    let inputs: Vec<_> = (1..=4)
        .map(|i| g.const_scalar(i as i32).unwrap())
        .collect();
    let total = g.add_n(&inputs).unwrap();

    let s = session(&g);
    let result = s.runner().run_output(&total).unwrap();
    assert_eq!(result.scalar::<i32>().unwrap(), 10);
}
