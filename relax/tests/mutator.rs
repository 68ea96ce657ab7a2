extern crate relax;

use anyhow::Result;
use indoc::indoc;
use relax::ir::BindingBlock;
use relax::ir::Call;
use relax::ir::Expr;
use relax::ir::Function;
use relax::ir::If;
use relax::ir::IRModule;
use relax::ir::Op;
use relax::ir::SeqExpr;
use relax::ir::Var;
use relax::ir::VarBinding;
use relax::mutator;
use relax::mutator::ExprMutator;
use relax::mutator::MutatorState;
use relax::tester::Tester;
use std::panic::Location;

fn negative(arg: &Var) -> Expr {
    Call::new(Op::new("relax.negative"), vec![arg.clone().into()]).into()
}

fn print(func: &Expr) -> String {
    let mut module = IRModule::new();
    module.add("main", func.as_function().unwrap().clone());
    module.to_string()
}

/// Remaps `from` to `to` when it reaches the binding of a variable called
/// `trigger`.
struct RemapAt {
    state: MutatorState,
    trigger: &'static str,
    from: Var,
    to: Var,
}

impl ExprMutator for RemapAt {
    fn state(&mut self) -> &mut MutatorState {
        &mut self.state
    }
    fn visit_var_binding_(&mut self, binding: &VarBinding) -> Result<()> {
        if binding.var.name_hint() == self.trigger {
            let (from, to) = (self.from.clone(), self.to.clone());
            self.set_var_remap(&from.vid, to);
        }
        mutator::walk_var_binding(self, binding)
    }
}

#[test]
fn test_remap_ends_with_branch_scope() {
    Tester::init_tracing();
    let x = Var::new("x", None);
    let y = Var::new("y", None);
    let cond = Var::new("cond", None);
    let (a, b, c, d, r) = (
        Var::new("a", None),
        Var::new("b", None),
        Var::new("c", None),
        Var::new("d", None),
        Var::new("r", None),
    );
    let true_block = BindingBlock::new(vec![
        VarBinding::new(a, negative(&x)).into(),
        VarBinding::new(b.clone(), negative(&x)).into(),
    ]);
    let false_block = BindingBlock::new(vec![VarBinding::new(c.clone(), negative(&x)).into()]);
    let branch = If::new(
        cond.clone().into(),
        SeqExpr::new(vec![true_block], b.into()).into(),
        SeqExpr::new(vec![false_block], c.into()).into(),
    );
    let block = BindingBlock::new(vec![
        VarBinding::new(r, branch.into()).into(),
        VarBinding::new(d.clone(), negative(&x)).into(),
    ]);
    let body = SeqExpr::new(vec![block], d.into());
    let func: Expr = Function::new(vec![x.clone(), y.clone(), cond], body.into(), None).into();

    let mut mutator = RemapAt {
        state: MutatorState::new(),
        trigger: "a",
        from: x,
        to: y,
    };
    let new_func = mutator.visit_expr(&func).unwrap();
    assert!(mutator.state.var_remap.is_empty());
    assert_eq!(mutator.state.builder.block_depth(), 0);

    let expected = indoc! {"
    %a: Object = relax.negative(%y)
    %b: Object = relax.negative(%y)
    %c: Object = relax.negative(%x)
    %d: Object = relax.negative(%x)
    "};
    let actual = print(&new_func);
    Tester::check_lines_contain(&actual, expected, Location::caller());
}

/// Replaces uses of a variable that is bound to another variable by that
/// other variable.
#[derive(Default)]
struct ForwardAliases {
    state: MutatorState,
}

impl ExprMutator for ForwardAliases {
    fn state(&mut self) -> &mut MutatorState {
        &mut self.state
    }
    fn visit_var_(&mut self, op: &Var) -> Result<Expr> {
        let var = mutator::walk_var(self, op)?;
        let bound = var.as_var().and_then(|var| self.lookup_binding(var));
        match bound {
            Some(Expr::Var(alias)) => Ok(alias.into()),
            _ => Ok(var),
        }
    }
}

#[test]
fn test_lookup_binding_sees_earlier_bindings() {
    Tester::init_tracing();
    let x = Var::new("x", None);
    let (a, b, c) = (Var::new("a", None), Var::new("b", None), Var::new("c", None));
    let block = BindingBlock::new(vec![
        VarBinding::new(a.clone(), negative(&x)).into(),
        VarBinding::new(b.clone(), a.into()).into(),
        VarBinding::new(c.clone(), negative(&b)).into(),
    ]);
    let body = SeqExpr::new(vec![block], c.into());
    let func: Expr = Function::new(vec![x], body.into(), None).into();

    let new_func = ForwardAliases::default().visit_expr(&func).unwrap();
    let expected = indoc! {"
    %a: Object = relax.negative(%x)
    %b: Object = %a
    %c: Object = relax.negative(%a)
    "};
    let actual = print(&new_func);
    Tester::check_lines_contain(&actual, expected, Location::caller());
}

/// Turns every regular variable definition into a dataflow variable.
#[derive(Default)]
struct MakeDataflow {
    state: MutatorState,
}

impl ExprMutator for MakeDataflow {
    fn state(&mut self) -> &mut MutatorState {
        &mut self.state
    }
    fn visit_var_def_(&mut self, var: &Var) -> Result<Var> {
        let new_var = Var::with_id(var.vid.clone(), var.struct_info.clone(), true);
        self.set_var_remap(&var.vid, new_var.clone());
        Ok(new_var)
    }
}

#[test]
fn test_dataflow_var_outside_dataflow_block_is_rejected() {
    let x = Var::new("x", None);
    let y = Var::new("y", None);
    let block = BindingBlock::new(vec![VarBinding::new(y.clone(), negative(&x)).into()]);
    let body = SeqExpr::new(vec![block], y.into());
    let func: Expr = Function::new(vec![x], body.into(), None).into();

    let mut mutator = MakeDataflow::default();
    let err = mutator.visit_expr(&func).unwrap_err();
    assert_eq!(
        err.to_string(),
        "dataflow var %y cannot be bound outside a dataflow block"
    );
    assert_eq!(mutator.state.builder.block_depth(), 0);
}

/// Moves every `relax.negative` call into a binding of its own.
#[derive(Default)]
struct HoistNegative {
    state: MutatorState,
}

impl ExprMutator for HoistNegative {
    fn state(&mut self) -> &mut MutatorState {
        &mut self.state
    }
    fn visit_call_(&mut self, op: &Call) -> Result<Expr> {
        let new_call = mutator::walk_call(self, op)?;
        match new_call.as_call() {
            Some(call) if call.is_op("relax.negative") => {
                let var = self.builder().emit(new_call.clone(), "hoisted")?;
                Ok(var.into())
            }
            _ => Ok(new_call),
        }
    }
}

#[test]
fn test_bindings_emitted_in_branch_become_its_prologue() {
    Tester::init_tracing();
    let x = Var::new("x", None);
    let cond = Var::new("cond", None);
    let r = Var::new("r", None);
    let branch = If::new(cond.clone().into(), negative(&x), x.clone().into());
    let block = BindingBlock::new(vec![VarBinding::new(r.clone(), branch.into()).into()]);
    let body = SeqExpr::new(vec![block], r.into());
    let func: Expr = Function::new(vec![x, cond], body.into(), None).into();

    let mut mutator = HoistNegative::default();
    let new_func = mutator.visit_expr(&func).unwrap();
    assert_eq!(mutator.state.builder.block_depth(), 0);

    let expected = indoc! {"
    %r: Object = if %cond {
      %hoisted: Object = relax.negative(%x)
      %hoisted
    } else {
      %x
    }
    "};
    let actual = print(&new_func);
    Tester::check_lines_contain(&actual, expected, Location::caller());

    let mut module = IRModule::new();
    module.add("main", new_func.as_function().unwrap().clone());
    Tester::verify(&module);
}

#[test]
fn test_remap_ends_with_nested_function() {
    Tester::init_tracing();
    let x = Var::new("x", None);
    let z = Var::new("z", None);
    let w = Var::new("w", None);
    let (a, b, f, d) = (
        Var::new("a", None),
        Var::new("b", None),
        Var::new("f", None),
        Var::new("d", None),
    );
    let inner_block = BindingBlock::new(vec![
        VarBinding::new(a, negative(&x)).into(),
        VarBinding::new(b.clone(), negative(&x)).into(),
    ]);
    let inner_body = SeqExpr::new(vec![inner_block], b.into());
    let inner = Function::new(vec![w], inner_body.into(), None);
    let block = BindingBlock::new(vec![
        VarBinding::new(f, inner.into()).into(),
        VarBinding::new(d.clone(), negative(&x)).into(),
    ]);
    let body = SeqExpr::new(vec![block], d.into());
    let func: Expr = Function::new(vec![x.clone(), z.clone()], body.into(), None).into();

    let mut mutator = RemapAt {
        state: MutatorState::new(),
        trigger: "a",
        from: x,
        to: z,
    };
    let new_func = mutator.visit_expr(&func).unwrap();
    assert!(mutator.state.var_remap.is_empty());

    let expected = indoc! {"
    %a: Object = relax.negative(%z)
    %b: Object = relax.negative(%z)
    %d: Object = relax.negative(%x)
    "};
    let actual = print(&new_func);
    Tester::check_lines_contain(&actual, expected, Location::caller());
}
