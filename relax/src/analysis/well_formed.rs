use crate::ir::BindingBlock;
use crate::ir::Call;
use crate::ir::Expr;
use crate::ir::Function;
use crate::ir::GlobalVar;
use crate::ir::IRModule;
use crate::ir::Id;
use crate::ir::If;
use crate::ir::MatchCast;
use crate::ir::PrimExpr;
use crate::ir::StructInfo;
use crate::ir::SymVar;
use crate::ir::Tuple;
use crate::ir::Var;
use crate::visitor;
use crate::visitor::ExprVisitor;
use anyhow::Result;
use std::collections::HashSet;
use tracing::debug;

/// Check that `module` is well formed.
///
/// The checks are:
///
/// - global variables refer to functions of the module,
/// - variables are defined before they are used and defined only once,
/// - dataflow variables are defined and used only inside their dataflow
///   block,
/// - call arguments and tuple fields are leaves or tuples of leaves,
/// - a [SeqExpr](crate::ir::SeqExpr) only occurs as the body of a function or
///   a branch of an if,
/// - symbolic variables are defined by the struct info of a parameter or by
///   a match cast before they are used,
/// - dataflow blocks contain no if.
///
/// Variables bound inside a branch of an if or inside a nested function are
/// not visible after it.
pub fn well_formed(module: &IRModule) -> Result<()> {
    for (_, func) in module.functions() {
        let mut checker = WellFormedChecker::new(module);
        checker.visit_expr(&func.clone().into())?;
    }
    Ok(())
}

pub fn is_well_formed(module: &IRModule) -> bool {
    match well_formed(module) {
        Ok(()) => true,
        Err(err) => {
            debug!("module is not well formed: {err}");
            false
        }
    }
}

struct WellFormedChecker<'a> {
    module: &'a IRModule,
    var_set: HashSet<Id>,
    dataflow_var_set: HashSet<Id>,
    sym_vars: HashSet<SymVar>,
    in_dataflow_block: bool,
}

/// Whether `expr` may appear as a call argument or tuple field.
fn is_leaf_or_tuple(expr: &Expr) -> bool {
    match expr {
        Expr::Tuple(tuple) => tuple.fields.iter().all(is_leaf_or_tuple),
        Expr::Function(_)
        | Expr::Call(_)
        | Expr::SeqExpr(_)
        | Expr::If(_)
        | Expr::TupleGetItem(_) => false,
        _ => true,
    }
}

impl<'a> WellFormedChecker<'a> {
    fn new(module: &'a IRModule) -> Self {
        WellFormedChecker {
            module,
            var_set: HashSet::new(),
            dataflow_var_set: HashSet::new(),
            sym_vars: HashSet::new(),
            in_dataflow_block: false,
        }
    }
    /// Visit a function body or branch, the only places a SeqExpr may be.
    fn visit_body(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::SeqExpr(seq) => self.visit_seq_expr_(seq),
            _ => self.visit_expr(expr),
        }
    }
    /// Parameters and bindings of `op` are not visible after it.
    fn visit_function_scope(&mut self, op: &Function) -> Result<()> {
        for param in &op.params {
            if let Some(struct_info) = &param.struct_info {
                self.define_sym_vars(struct_info);
            }
            self.visit_var_def(param)?;
        }
        self.visit_body(&op.body)?;
        self.visit_type(&op.ret_struct_info)
    }
    fn define_sym_vars(&mut self, struct_info: &StructInfo) {
        self.sym_vars.extend(struct_info.sym_vars());
    }
    fn check_anf(&self, exprs: &[Expr], what: &str) -> Result<()> {
        for expr in exprs {
            if !is_leaf_or_tuple(expr) {
                return Err(anyhow::anyhow!(
                    "{what} must be in A-normal form, found {}: {expr}",
                    expr.kind()
                ));
            }
        }
        Ok(())
    }
}

impl ExprVisitor for WellFormedChecker<'_> {
    fn visit_expr(&mut self, expr: &Expr) -> Result<()> {
        if let Expr::SeqExpr(_) = expr {
            return Err(anyhow::anyhow!(
                "SeqExpr only allowed as the body of a Function or a branch of an If"
            ));
        }
        visitor::dispatch_expr(self, expr)
    }
    fn visit_global_var_(&mut self, op: &GlobalVar) -> Result<()> {
        if !self.module.contains(&op.name_hint) {
            return Err(anyhow::anyhow!("GlobalVar @{} is not defined", op.name_hint));
        }
        Ok(())
    }
    fn visit_var_(&mut self, op: &Var) -> Result<()> {
        if !self.var_set.contains(&op.vid) {
            return Err(anyhow::anyhow!("Var {op} is not defined"));
        }
        Ok(())
    }
    fn visit_dataflow_var_(&mut self, op: &Var) -> Result<()> {
        if !self.in_dataflow_block {
            return Err(anyhow::anyhow!(
                "DataflowVar {op} is used outside a DataflowBlock"
            ));
        }
        if !self.dataflow_var_set.contains(&op.vid) {
            return Err(anyhow::anyhow!("DataflowVar {op} is not defined"));
        }
        Ok(())
    }
    fn visit_function_(&mut self, op: &Function) -> Result<()> {
        let previous = self.var_set.clone();
        let result = self.visit_function_scope(op);
        self.var_set = previous;
        result
    }
    fn visit_call_(&mut self, op: &Call) -> Result<()> {
        self.check_anf(&op.args, "Call arguments")?;
        visitor::walk_call(self, op)
    }
    fn visit_tuple_(&mut self, op: &Tuple) -> Result<()> {
        self.check_anf(&op.fields, "Tuple fields")?;
        visitor::walk_tuple(self, op)
    }
    fn visit_if_(&mut self, op: &If) -> Result<()> {
        if self.in_dataflow_block {
            return Err(anyhow::anyhow!("If is not allowed inside a DataflowBlock"));
        }
        self.visit_expr(&op.cond)?;
        let previous = self.var_set.clone();
        self.visit_body(&op.true_branch)?;
        self.var_set = previous.clone();
        self.visit_body(&op.false_branch)?;
        self.var_set = previous;
        Ok(())
    }
    fn visit_match_cast_(&mut self, binding: &MatchCast) -> Result<()> {
        self.visit_expr(&binding.value)?;
        self.define_sym_vars(&binding.struct_info);
        self.visit_var_def(&binding.var)
    }
    fn visit_dataflow_block_(&mut self, block: &BindingBlock) -> Result<()> {
        self.in_dataflow_block = true;
        let result = visitor::walk_binding_block(self, block);
        self.in_dataflow_block = false;
        self.dataflow_var_set.clear();
        result
    }
    fn visit_var_def_(&mut self, var: &Var) -> Result<()> {
        if !self.var_set.insert(var.vid.clone()) {
            return Err(anyhow::anyhow!("Var {var} is defined more than once"));
        }
        Ok(())
    }
    fn visit_dataflow_var_def_(&mut self, var: &Var) -> Result<()> {
        if !self.in_dataflow_block {
            return Err(anyhow::anyhow!(
                "DataflowVar {var} is defined outside a DataflowBlock"
            ));
        }
        if !self.dataflow_var_set.insert(var.vid.clone()) {
            return Err(anyhow::anyhow!("DataflowVar {var} is defined more than once"));
        }
        Ok(())
    }
    fn visit_type(&mut self, struct_info: &StructInfo) -> Result<()> {
        for sym_var in struct_info.sym_vars() {
            if !self.sym_vars.contains(&sym_var) {
                return Err(anyhow::anyhow!(
                    "symbolic var {} in {struct_info} is not defined",
                    sym_var.name()
                ));
            }
        }
        Ok(())
    }
    fn visit_prim_expr(&mut self, expr: &PrimExpr) -> Result<()> {
        let mut used = vec![];
        expr.collect_sym_vars(&mut used);
        for sym_var in used {
            if !self.sym_vars.contains(&sym_var) {
                return Err(anyhow::anyhow!(
                    "symbolic var {} in {expr} is not defined",
                    sym_var.name()
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::DataType;
    use crate::ir::Op;
    use crate::ir::SeqExpr;
    use crate::ir::ShapeExpr;
    use crate::ir::VarBinding;

    fn module_with(func: Function) -> IRModule {
        let mut module = IRModule::new();
        module.add("main", func);
        module
    }

    #[test]
    fn test_dataflow_var_used_after_block() {
        let x = Var::new("x", None);
        let lv = Var::dataflow("lv", None);
        let call = Call::new(Op::new("relax.neg"), vec![x.clone().into()]);
        let block = BindingBlock::dataflow(vec![VarBinding::new(lv.clone(), call.into()).into()]);
        let body = SeqExpr::new(vec![block], lv.into());
        let module = module_with(Function::new(vec![x], body.into(), None));
        let err = well_formed(&module).unwrap_err();
        assert_eq!(
            err.to_string(),
            "DataflowVar %lv is used outside a DataflowBlock"
        );
        assert!(!is_well_formed(&module));
    }

    #[test]
    fn test_nested_call_is_not_anf() {
        let x = Var::new("x", None);
        let inner = Call::new(Op::new("relax.neg"), vec![x.clone().into()]);
        let outer = Call::new(Op::new("relax.neg"), vec![inner.into()]);
        let body = SeqExpr::new(vec![], outer.into());
        let module = module_with(Function::new(vec![x], body.into(), None));
        let err = well_formed(&module).unwrap_err();
        assert!(err.to_string().starts_with("Call arguments must be in A-normal form"));
    }

    #[test]
    fn test_nested_function_params_are_local() {
        let x = Var::new("x", None);
        let y = Var::new("y", None);
        let f = Var::new("f", None);
        let z = Var::new("z", None);
        let inner_body = SeqExpr::new(vec![], y.clone().into());
        let inner = Function::new(vec![y.clone()], inner_body.into(), None);
        let block = BindingBlock::new(vec![
            VarBinding::new(f, inner.into()).into(),
            VarBinding::new(z.clone(), y.into()).into(),
        ]);
        let body = SeqExpr::new(vec![block], z.into());
        let module = module_with(Function::new(vec![x], body.into(), None));
        let err = well_formed(&module).unwrap_err();
        assert_eq!(err.to_string(), "Var %y is not defined");
    }

    #[test]
    fn test_sym_vars_come_from_params() {
        let n = SymVar::int64("n");
        let m = SymVar::int64("m");
        let x = Var::new(
            "x",
            Some(StructInfo::tensor(vec![PrimExpr::from(&n)], DataType::float32())),
        );
        let defined = SeqExpr::new(vec![], ShapeExpr::new(vec![PrimExpr::from(&n)]).into());
        let module = module_with(Function::new(vec![x.clone()], defined.into(), None));
        well_formed(&module).unwrap();

        let undefined = SeqExpr::new(vec![], ShapeExpr::new(vec![PrimExpr::from(&m)]).into());
        let module = module_with(Function::new(vec![x], undefined.into(), None));
        assert!(well_formed(&module).is_err());
    }
}
