extern crate relax;

use clap::Command;
use indoc::indoc;
use relax::analysis::is_well_formed;
use relax::analysis::well_formed;
use relax::default_arguments;
use relax::ir::BindingBlock;
use relax::ir::Call;
use relax::ir::DataType;
use relax::ir::Function;
use relax::ir::GlobalVar;
use relax::ir::IRModule;
use relax::ir::If;
use relax::ir::Op;
use relax::ir::PrimExpr;
use relax::ir::SeqExpr;
use relax::ir::StructInfo;
use relax::ir::Var;
use relax::ir::VarBinding;
use relax::tester::Tester;
use relax::transform;
use relax::DefaultTransformDispatch;
use relax::Passes;
use relax::TransformOptions;
use std::panic::Location;

fn tensor() -> StructInfo {
    StructInfo::tensor(vec![PrimExpr::from(4i64)], DataType::float32())
}

/// `lv1 = add(multiply(x, y), y)` with the multiply bound to `lv0`.
fn multiply_add() -> IRModule {
    let x = Var::new("x", Some(tensor()));
    let y = Var::new("y", Some(tensor()));
    let lv0 = Var::dataflow("lv0", None);
    let lv1 = Var::dataflow("lv1", None);
    let gv = Var::new("gv", None);
    let multiply = Call::new(
        Op::new("relax.multiply"),
        vec![x.clone().into(), y.clone().into()],
    );
    let add = Call::new(Op::new("relax.add"), vec![lv0.clone().into(), y.clone().into()]);
    let block = BindingBlock::dataflow(vec![
        VarBinding::new(lv0, multiply.into()).into(),
        VarBinding::new(lv1.clone(), add.into()).into(),
        VarBinding::new(gv.clone(), lv1.into()).into(),
    ]);
    let body = SeqExpr::new(vec![block], gv.into());
    let mut module = IRModule::new();
    module.add("main", Function::new(vec![x, y], body.into(), None));
    module
}

#[test]
fn test_fma_rewrite() {
    Tester::init_tracing();
    let module = multiply_add();
    let expected = indoc! {"
    dataflow {
      %lv0: Tensor([4], float32) = relax.multiply(%x, %y)
      %lv1: Tensor([4], float32) = relax.ewise_fma(%x, %y, %y)
      %gv: Tensor([4], float32) = %lv1
      output(%gv)
    }
    %gv
    "};
    let (new_module, actual) = Tester::transform(vec!["--fma-rewrite"], &module);
    Tester::check_lines_contain(&actual, expected, Location::caller());
    Tester::verify(&new_module);
}

#[test]
fn test_pipeline_runs_passes_in_order() {
    Tester::init_tracing();
    let module = multiply_add();
    let arguments = vec![
        "--fma-rewrite",
        "--print-ir-before-all",
        "--explicit-memory-rewrite",
    ];
    let expected = indoc! {"
    fn @main(%x: Tensor([4], float32), %y: Tensor([4], float32)) -> Object {
      %lv0: Tensor([4], float32) = relax.multiply(%x, %y)
      %lv1: Tensor([4], float32) = relax.ewise_fma(%x, %y, %y)
      %gv: Tensor([4], float32) = %lv1
      %gv
    }
    "};
    let (new_module, actual) = Tester::transform(arguments, &module);
    Tester::check_lines_contain(&actual, expected, Location::caller());
    assert!(!actual.contains("dataflow"));
    Tester::verify(&new_module);
}

#[test]
fn test_normalize_fills_struct_info() {
    let module = multiply_add();
    let (_, actual) = Tester::transform(vec!["--normalize"], &module);
    let expected = indoc! {"
    %lv0: Tensor([4], float32) = relax.multiply(%x, %y)
    %lv1: Tensor([4], float32) = relax.add(%lv0, %y)
    "};
    Tester::check_lines_contain(&actual, expected, Location::caller());
}

#[test]
fn test_options_from_command_line() {
    let args = vec!["relax", "--debug", "--normalize", "--print-ir-before-all"];
    let passes = Passes::from_convert_vec(args.clone());
    assert_eq!(passes.to_string(), "normalize");

    let cli = Command::new("relax")
        .args(default_arguments())
        .arg(clap::Arg::new("debug").long("debug").action(clap::ArgAction::SetTrue));
    let matches = cli.get_matches_from(args);
    let options = TransformOptions::from_args(matches, passes);
    assert!(options.print_ir_before_all());
    assert_eq!(options.passes().vec().len(), 1);

    let result = transform::<DefaultTransformDispatch>(&multiply_add(), &options).unwrap();
    assert!(result.is_changed().is_some());
}

#[test]
fn test_well_formed_module() {
    let x = Var::new("x", Some(tensor()));
    let helper = Function::new(vec![x.clone()], SeqExpr::new(vec![], x.into()).into(), None);
    let mut module = IRModule::new();
    let helper_var = module.add("helper", helper);

    let a = Var::new("a", Some(tensor()));
    let b = Var::new("b", None);
    let call = Call::new(helper_var, vec![a.clone().into()]);
    let block = BindingBlock::new(vec![VarBinding::new(b.clone(), call.into()).into()]);
    let main = Function::new(vec![a.clone()], SeqExpr::new(vec![block], b.into()).into(), None);
    module.add("main", main);
    assert!(is_well_formed(&module));

    let c = Var::new("c", None);
    let missing = Call::new(GlobalVar::new("missing"), vec![a.clone().into()]);
    let block = BindingBlock::new(vec![VarBinding::new(c.clone(), missing.into()).into()]);
    let broken = Function::new(vec![a], SeqExpr::new(vec![block], c.into()).into(), None);
    module.add("broken", broken);
    let err = well_formed(&module).unwrap_err();
    assert_eq!(err.to_string(), "GlobalVar @missing is not defined");
}

#[test]
fn test_if_inside_dataflow_block_is_rejected() {
    let cond = Var::new("cond", None);
    let x = Var::new("x", None);
    let lv = Var::dataflow("lv", None);
    let gv = Var::new("gv", None);
    let branch = If::new(cond.clone().into(), x.clone().into(), x.clone().into());
    let block = BindingBlock::dataflow(vec![
        VarBinding::new(lv.clone(), branch.into()).into(),
        VarBinding::new(gv.clone(), lv.into()).into(),
    ]);
    let body = SeqExpr::new(vec![block], gv.into());
    let mut module = IRModule::new();
    module.add("main", Function::new(vec![cond, x], body.into(), None));
    let err = well_formed(&module).unwrap_err();
    assert_eq!(err.to_string(), "If is not allowed inside a DataflowBlock");
}
