extern crate adagrad_op as ag;
extern crate ndarray;

use ag::ndarray_ext::{self, ArrayRng};
use ag::op::Place;
use ag::{NdArray, OpDesc, OpError, OpRegistry, Scope};
use approx::assert_abs_diff_eq;
use ndarray::array;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn registry() -> OpRegistry<f32> {
    init_logger();
    OpRegistry::with_builtin_ops().unwrap()
}

fn adagrad_desc(param_out: &str, moment_out: &str) -> OpDesc {
    OpDesc::new("adagrad")
        .set_input("param", "w")
        .set_input("grad", "g")
        .set_input("moment", "m")
        .set_input("learning_rate", "lr")
        .set_output("param_out", param_out)
        .set_output("moment_out", moment_out)
        .set_attr("epsilon", 1e-6f32)
}

fn scope_with(w: NdArray<f32>, g: NdArray<f32>, m: NdArray<f32>, lr: f32) -> Scope<f32> {
    let mut scope = Scope::new();
    scope.set("w", w);
    scope.set("g", g);
    scope.set("m", m);
    scope.set("lr", ndarray::arr1(&[lr]));
    scope
}

#[test]
fn test_update_into_new_outputs() {
    let registry = registry();
    let mut scope = scope_with(
        array![1.0].into_dyn(),
        array![2.0].into_dyn(),
        array![0.0].into_dyn(),
        0.1,
    );
    let op = registry.create_op(&adagrad_desc("w_out", "m_out")).unwrap();
    op.run(&mut scope, Place::Cpu).unwrap();

    assert_eq!(scope.to_owned("m_out").unwrap(), array![4.0].into_dyn());
    let w_out = scope.to_owned("w_out").unwrap();
    assert_abs_diff_eq!(w_out, array![1.0 - 0.1 * 2.0 / (2.0 + 1e-6)].into_dyn(), epsilon = 1e-7);
    assert_abs_diff_eq!(w_out, array![0.9].into_dyn(), epsilon = 1e-6);

    // inputs are only read
    assert_eq!(scope.to_owned("w").unwrap(), array![1.0].into_dyn());
    assert_eq!(scope.to_owned("m").unwrap(), array![0.0].into_dyn());
}

#[test]
fn test_zero_grad_leaves_param() {
    let registry = registry();
    let mut scope = scope_with(
        array![[3.0, -1.5]].into_dyn(),
        ndarray_ext::zeros(&[1, 2]),
        ndarray_ext::zeros(&[1, 2]),
        0.1,
    );
    let op = registry.create_op(&adagrad_desc("w", "m")).unwrap();
    op.run(&mut scope, Place::Cpu).unwrap();
    assert_eq!(scope.to_owned("w").unwrap(), array![[3.0, -1.5]].into_dyn());
    assert_eq!(scope.to_owned("m").unwrap(), ndarray_ext::zeros::<f32>(&[1, 2]));
}

#[test]
fn test_in_place_matches_distinct_buffers() {
    let registry = registry();
    let rng = ArrayRng::<f32>::default();
    let w = rng.standard_normal(&[3, 4]);
    let g = rng.standard_normal(&[3, 4]);
    let m = rng.uniform(&[3, 4], 0., 2.);

    let mut distinct = scope_with(w.clone(), g.clone(), m.clone(), 0.05);
    registry
        .create_op(&adagrad_desc("w_out", "m_out"))
        .unwrap()
        .run(&mut distinct, Place::Cpu)
        .unwrap();

    for (param_out, moment_out) in [("w", "m"), ("w", "m_out"), ("w_out", "m")] {
        let mut scope = scope_with(w.clone(), g.clone(), m.clone(), 0.05);
        registry
            .create_op(&adagrad_desc(param_out, moment_out))
            .unwrap()
            .run(&mut scope, Place::Cpu)
            .unwrap();
        assert_eq!(
            scope.to_owned(param_out).unwrap(),
            distinct.to_owned("w_out").unwrap()
        );
        assert_eq!(
            scope.to_owned(moment_out).unwrap(),
            distinct.to_owned("m_out").unwrap()
        );
    }
}

#[test]
fn test_accumulator_is_monotonic() {
    let registry = registry();
    let rng = ArrayRng::<f32>::default();
    let mut scope = scope_with(
        rng.standard_normal(&[5, 2]),
        ndarray_ext::zeros(&[5, 2]),
        ndarray_ext::zeros(&[5, 2]),
        0.01,
    );
    let op = registry.create_op(&adagrad_desc("w", "m")).unwrap();
    for _ in 0..20 {
        scope.set("g", rng.normal(&[5, 2], 0., 3.));
        let before = scope.to_owned("m").unwrap();
        op.run(&mut scope, Place::Cpu).unwrap();
        let after = scope.to_owned("m").unwrap();
        ndarray::Zip::from(&before)
            .and(&after)
            .for_each(|&b, &a| assert!(a >= b, "{} < {}", a, b));
    }
}

#[test]
fn test_learning_rate_ranks() {
    let registry = registry();
    let op = registry.create_op(&adagrad_desc("w", "m")).unwrap();
    for lr in [ndarray_ext::from_scalar(0.1f32), array![[0.1f32]].into_dyn()] {
        let mut scope = scope_with(
            array![1.0].into_dyn(),
            array![2.0].into_dyn(),
            array![0.0].into_dyn(),
            0.1,
        );
        scope.set("lr", lr);
        op.run(&mut scope, Place::Cpu).unwrap();
        assert_abs_diff_eq!(
            scope.to_owned("w").unwrap(),
            array![0.9].into_dyn(),
            epsilon = 1e-6
        );
    }
}

#[test]
fn test_rejection_leaves_outputs_untouched() {
    let registry = registry();
    let mut scope = scope_with(
        ndarray_ext::zeros(&[4, 4]),
        ndarray_ext::zeros(&[4, 5]),
        ndarray_ext::zeros(&[4, 4]),
        0.1,
    );
    scope.set("w_out", array![7.0f32, 7.0]);
    let op = registry.create_op(&adagrad_desc("w_out", "m_out")).unwrap();
    match op.run(&mut scope, Place::Cpu) {
        Err(OpError::ShapeMismatch(_)) => {}
        other => panic!("expected ShapeMismatch, got {:?}", other),
    }
    assert_eq!(scope.to_owned("w_out").unwrap(), array![7.0, 7.0].into_dyn());
    assert!(!scope.contains("m_out"));

    // several learning rates
    scope.set("g", ndarray_ext::zeros(&[4, 4]));
    scope.set("lr", array![0.1f32, 0.2]);
    match op.run(&mut scope, Place::Cpu) {
        Err(OpError::ShapeMismatch(_)) => {}
        other => panic!("expected ShapeMismatch, got {:?}", other),
    }
    assert_eq!(scope.to_owned("w_out").unwrap(), array![7.0, 7.0].into_dyn());
}

#[test]
fn test_missing_slot_at_runtime() {
    let registry = registry();
    let mut scope = scope_with(
        array![1.0].into_dyn(),
        array![2.0].into_dyn(),
        array![0.0].into_dyn(),
        0.1,
    );
    let mut desc = adagrad_desc("w_out", "m_out");
    desc.inputs.remove("moment");
    let op = registry.create_op(&desc).unwrap();
    assert_eq!(
        op.run(&mut scope, Place::Cpu).unwrap_err(),
        OpError::MissingSlot {
            op: "adagrad".to_string(),
            slot: "moment".to_string()
        }
    );

    // bound, but to a variable the scope doesn't have
    let desc = adagrad_desc("w_out", "m_out").set_input("grad", "nowhere");
    let op = registry.create_op(&desc).unwrap();
    match op.run(&mut scope, Place::Cpu) {
        Err(OpError::MissingSlot { slot, .. }) => assert_eq!(slot, "grad"),
        other => panic!("expected MissingSlot, got {:?}", other),
    }
    assert!(!scope.contains("w_out"));
    assert!(!scope.contains("m_out"));
}

#[test]
fn test_outputs_are_reshaped() {
    let registry = registry();
    let mut scope = scope_with(
        ndarray_ext::zeros(&[2, 2]),
        ndarray_ext::zeros(&[2, 2]),
        ndarray_ext::zeros(&[2, 2]),
        0.1,
    );
    scope.set("w_out", array![1.0f32, 2.0, 3.0]);
    let op = registry.create_op(&adagrad_desc("w_out", "m_out")).unwrap();
    op.run(&mut scope, Place::Cpu).unwrap();
    assert_eq!(scope.to_owned("w_out").unwrap().shape(), &[2, 2]);
    assert_eq!(scope.to_owned("m_out").unwrap().shape(), &[2, 2]);
}

#[test]
fn test_no_kernel_for_gpu() {
    let registry = registry();
    let mut scope = scope_with(
        array![1.0].into_dyn(),
        array![2.0].into_dyn(),
        array![0.0].into_dyn(),
        0.1,
    );
    let op = registry.create_op(&adagrad_desc("w_out", "m_out")).unwrap();
    match op.run(&mut scope, Place::Gpu(0)) {
        Err(OpError::KernelNotFound { op, key }) => {
            assert_eq!(op, "adagrad");
            assert_eq!(key, ag::KernelKey::new(ag::DataType::Fp32, Place::Gpu(0)));
        }
        other => panic!("expected KernelNotFound, got {:?}", other),
    }
    assert!(!scope.contains("w_out"));
}

#[test]
fn test_output_aliasing_read_only_input() {
    let registry = registry();
    let mut scope = scope_with(
        array![1.0].into_dyn(),
        array![2.0].into_dyn(),
        array![0.0].into_dyn(),
        0.1,
    );
    for (param_out, moment_out) in [("g", "m"), ("lr", "m"), ("w", "g"), ("w", "w")] {
        let op = registry
            .create_op(&adagrad_desc(param_out, moment_out))
            .unwrap();
        match op.run(&mut scope, Place::Cpu) {
            Err(OpError::BorrowConflict(_)) => {}
            other => panic!(
                "expected BorrowConflict for ({}, {}), got {:?}",
                param_out, moment_out, other
            ),
        }
    }
    assert_eq!(scope.to_owned("w").unwrap(), array![1.0].into_dyn());
    assert_eq!(scope.to_owned("g").unwrap(), array![2.0].into_dyn());
    assert_eq!(scope.to_owned("m").unwrap(), array![0.0].into_dyn());
    assert_eq!(scope.to_owned("lr").unwrap(), array![0.1].into_dyn());
}

#[test]
fn test_alias_conflict_keeps_existing_outputs() {
    let registry = registry();
    let mut scope = scope_with(
        array![1.0].into_dyn(),
        array![2.0].into_dyn(),
        array![0.0].into_dyn(),
        0.1,
    );
    // wrong shape, so it would be reallocated if the run went ahead
    scope.set("w_out", array![7.0f32, 7.0, 7.0]);
    for moment_out in ["g", "lr", "w_out"] {
        let op = registry
            .create_op(&adagrad_desc("w_out", moment_out))
            .unwrap();
        match op.run(&mut scope, Place::Cpu) {
            Err(OpError::BorrowConflict(_)) => {}
            other => panic!("expected BorrowConflict for {}, got {:?}", moment_out, other),
        }
        assert_eq!(
            scope.to_owned("w_out").unwrap(),
            array![7.0, 7.0, 7.0].into_dyn()
        );
    }
    assert_eq!(scope.to_owned("g").unwrap(), array![2.0].into_dyn());
    assert_eq!(scope.to_owned("lr").unwrap(), array![0.1].into_dyn());

    // `moment_out` shares the variable of `param`, which is not its partner
    scope.set("m_out", array![5.0f32, 5.0]);
    let op = registry.create_op(&adagrad_desc("m_out", "w")).unwrap();
    assert!(matches!(
        op.run(&mut scope, Place::Cpu),
        Err(OpError::BorrowConflict(_))
    ));
    assert_eq!(scope.to_owned("m_out").unwrap(), array![5.0, 5.0].into_dyn());
    assert_eq!(scope.to_owned("w").unwrap(), array![1.0].into_dyn());
}

#[test]
fn test_desc_from_json() {
    let registry = registry();
    let desc = OpDesc::from_json(
        r#"{
            "type": "adagrad",
            "inputs": {
                "param": "fc.w",
                "grad": "fc.w@GRAD",
                "moment": "fc.w@MOMENT",
                "learning_rate": "lr"
            },
            "outputs": {"param_out": "fc.w", "moment_out": "fc.w@MOMENT"},
            "attrs": {"epsilon": 1e-6}
        }"#,
    )
    .unwrap();
    assert_eq!(OpDesc::from_json(&desc.to_json().unwrap()).unwrap(), desc);

    let mut scope = Scope::new();
    scope.set("fc.w", array![1.0f32, 1.0]);
    scope.set("fc.w@GRAD", array![2.0f32, 0.0]);
    scope.set("fc.w@MOMENT", array![0.0f32, 0.0]);
    scope.set("lr", ndarray::arr0(0.1f32));
    let op = registry.create_op(&desc).unwrap();
    assert_eq!(op.op_type(), "adagrad");
    op.run(&mut scope, Place::Cpu).unwrap();
    assert_abs_diff_eq!(
        scope.to_owned("fc.w").unwrap(),
        array![0.9, 1.0].into_dyn(),
        epsilon = 1e-6
    );
    assert_eq!(
        scope.to_owned("fc.w@MOMENT").unwrap(),
        array![4.0, 0.0].into_dyn()
    );

    assert!(matches!(
        OpDesc::from_json(r#"{"inputs": {}}"#),
        Err(OpError::Config(_))
    ));
}
