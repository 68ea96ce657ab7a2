extern crate relax;

use indoc::indoc;
use relax::analysis::structural_equal;
use relax::builder::infer_elementwise;
use relax::builder::BlockBuilder;
use relax::builder::OpRegistry;
use relax::extension::MutatorHandlers;
use relax::extension::VisitorHandlers;
use relax::functor::ExprKind;
use relax::ir::BindingBlock;
use relax::ir::Call;
use relax::ir::DataType;
use relax::ir::Expr;
use relax::ir::Function;
use relax::ir::IRModule;
use relax::ir::Op;
use relax::ir::PrimExpr;
use relax::ir::SeqExpr;
use relax::ir::StructInfo;
use relax::ir::SymVar;
use relax::ir::Tuple;
use relax::ir::TupleGetItem;
use relax::ir::Var;
use relax::ir::VarBinding;
use relax::mutator;
use relax::mutator::ExprMutator;
use relax::mutator::MutatorState;
use relax::tester::Tester;
use relax::visitor::ExprVisitor;
use std::panic::Location;
use std::sync::Arc;

fn tensor() -> StructInfo {
    let n = SymVar::int64("n");
    StructInfo::tensor(vec![PrimExpr::from(&n)], DataType::float32())
}

fn elementwise_state() -> MutatorState {
    let registry = OpRegistry::new()
        .with("relax.add", infer_elementwise)
        .with("relax.multiply", infer_elementwise);
    MutatorState::with_builder(BlockBuilder::with_inference(Arc::new(registry)))
}

/// `y = add(x, x)` then `z = multiply(y, y)` in one dataflow block with
/// output `z`.
fn add_then_multiply() -> Function {
    let sinfo = tensor();
    let x = Var::new("x", Some(sinfo.clone()));
    let y = Var::dataflow("y", Some(sinfo.clone()));
    let z = Var::new("z", Some(sinfo.clone()));
    let add = Call::new(Op::new("relax.add"), vec![x.clone().into(), x.clone().into()])
        .with_struct_info(sinfo.clone());
    let multiply = Call::new(
        Op::new("relax.multiply"),
        vec![y.clone().into(), y.clone().into()],
    )
    .with_struct_info(sinfo.clone());
    let block = BindingBlock::dataflow(vec![
        VarBinding::new(y, add.into()).into(),
        VarBinding::new(z.clone(), multiply.into()).into(),
    ]);
    let body = SeqExpr::new(vec![block], z.into());
    Function::new(vec![x], body.into(), None)
}

fn print(func: &Function) -> (IRModule, String) {
    let mut module = IRModule::new();
    module.add("main", func.clone());
    let actual = module.to_string();
    (module, actual)
}

#[test]
fn test_rewrite_add_to_multiply() {
    Tester::init_tracing();
    let func = add_then_multiply();
    let mut mutator = MutatorHandlers::<()>::new()
        .rewrite_post_order(ExprKind::Call, |_, expr| {
            let call = expr.as_call().unwrap();
            if !call.is_op("relax.add") {
                return Ok(expr.clone());
            }
            let new_call = Call::new(Op::new("relax.multiply"), call.args.clone());
            Ok(new_call.into())
        })
        .build_with((), elementwise_state())
        .unwrap();
    let result = mutator.visit_expr(&func.clone().into()).unwrap();
    let new_func = result.as_function().unwrap();

    let old_seq = func.body.as_seq_expr().unwrap();
    let new_seq = new_func.body.as_seq_expr().unwrap();
    assert_eq!(new_seq.blocks.len(), old_seq.blocks.len());
    let (old_block, new_block) = (&old_seq.blocks[0], &new_seq.blocks[0]);
    assert!(new_block.is_dataflow());
    assert_eq!(new_block.bindings.len(), old_block.bindings.len());
    assert_eq!(new_block.outputs().len(), 1);
    assert_eq!(new_block.outputs()[0].vid, old_block.outputs()[0].vid);

    let old_y = old_block.bindings[0].var();
    let new_y = new_block.bindings[0].var();
    assert_eq!(new_y.vid, old_y.vid);
    assert_eq!(new_y.struct_info, old_y.struct_info);
    assert!(new_block.bindings[1].same_as(&old_block.bindings[1]));

    let expected = indoc! {"
    module {
      fn @main(%x: Tensor([n], float32)) -> Tensor([n], float32) {
        dataflow {
          %y: Tensor([n], float32) = relax.multiply(%x, %x)
          %z: Tensor([n], float32) = relax.multiply(%y, %y)
          output(%z)
        }
        %z
      }
    }
    "};
    let (module, actual) = print(new_func);
    Tester::check_lines_exact(&actual, expected, Location::caller());
    Tester::verify(&module);
}

#[test]
fn test_identity_hooks_are_a_fixed_point() {
    let sinfo = tensor();
    let x = Var::new("x", Some(sinfo.clone()));
    let t = Var::new("t", Some(StructInfo::Tuple(vec![sinfo.clone(), sinfo.clone()])));
    let e = Var::new("e", Some(sinfo.clone()));
    let func = add_then_multiply();
    let block = BindingBlock::new(vec![
        VarBinding::new(t.clone(), Tuple::new(vec![x.clone().into(), x.clone().into()]).into())
            .into(),
        VarBinding::new(e.clone(), TupleGetItem::new(t.into(), 1).into()).into(),
    ]);
    let body = SeqExpr::new(vec![block], e.into());
    let other = Function::new(vec![x], body.into(), None);

    let mut handlers = MutatorHandlers::<()>::new();
    for kind in ExprKind::ALL {
        handlers = handlers.rewrite_post_order(kind, |_, expr| Ok(expr.clone()));
    }
    let mut mutator = handlers.build_with((), elementwise_state()).unwrap();
    for func in [func, other] {
        let expr: Expr = func.into();
        let result = mutator.visit_expr(&expr).unwrap();
        assert!(structural_equal(&result, &expr));
        assert!(result.same_as(&expr));
    }
}

#[test]
fn test_post_order_hook_sees_rewritten_children() {
    let func = add_then_multiply();
    let mut mutator = MutatorHandlers::<Vec<String>>::new()
        .visit(ExprKind::Op, |_, expr| match expr {
            Expr::Op(op) if op.name == "relax.add" => Ok(Op::new("relax.multiply").into()),
            _ => Ok(expr.clone()),
        })
        .rewrite_post_order(ExprKind::Call, |m, expr| {
            let call = expr.as_call().unwrap();
            m.data.push(call.op.to_string());
            Ok(expr.clone())
        })
        .build_with(vec![], elementwise_state())
        .unwrap();
    mutator.visit_expr(&func.into()).unwrap();
    assert_eq!(mutator.into_data(), vec!["relax.multiply", "relax.multiply"]);
}

#[test]
fn test_override_and_post_order_are_exclusive() {
    let result = MutatorHandlers::<()>::new()
        .visit(ExprKind::Call, |m, expr| mutator::default_visit(m, expr))
        .rewrite_post_order(ExprKind::Call, |_, expr| Ok(expr.clone()))
        .build(());
    let err = result.err().unwrap();
    assert_eq!(
        err.to_string(),
        "cannot supply both `visit_call_` and `rewrite_call_post_order` for Call"
    );
}

#[test]
fn test_strict_visitor_reports_missing_handler() {
    let func: Expr = add_then_multiply().into();
    let mut visitor = VisitorHandlers::<usize>::new()
        .visit(ExprKind::Function, |v, expr| {
            v.data += 1;
            relax::visitor::default_visit(v, expr)
        })
        .strict()
        .build(0)
        .unwrap();
    let err = visitor.visit_expr(&func).unwrap_err();
    assert_eq!(err.to_string(), "handler `visit_var_def_` is not implemented");
    assert_eq!(visitor.data, 1);

    let mut lenient = VisitorHandlers::<usize>::new()
        .visit(ExprKind::Call, |v, expr| {
            v.data += 1;
            relax::visitor::default_visit(v, expr)
        })
        .build(0)
        .unwrap();
    lenient.visit_expr(&func).unwrap();
    assert_eq!(lenient.into_data(), 2);
}
