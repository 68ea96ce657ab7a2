use crate::ir::Call;
use crate::ir::Expr;
use crate::ir::IRModule;
use crate::ir::Op;
use crate::mutator;
use crate::mutator::ExprMutator;
use crate::mutator::MutatorState;
use crate::transform::apply_to_functions;
use crate::transform::pass_state;
use crate::transform::Pass;
use crate::transform::RewriteResult;
use anyhow::Result;
use tracing::debug;

struct FmaRewriter {
    state: MutatorState,
}

impl FmaRewriter {
    /// The operands of `expr` when it is a binary call to `op_name`.
    fn binary_operands<'a>(call: &'a Call, op_name: &str) -> Option<(&'a Expr, &'a Expr)> {
        if !call.is_op(op_name) || call.args.len() != 2 {
            return None;
        }
        Some((&call.args[0], &call.args[1]))
    }
}

impl ExprMutator for FmaRewriter {
    fn state(&mut self) -> &mut MutatorState {
        &mut self.state
    }
    fn visit_call_(&mut self, op: &Call) -> Result<Expr> {
        let new_expr = mutator::walk_call(self, op)?;
        let call = match new_expr.as_call() {
            Some(call) => call.clone(),
            None => return Ok(new_expr),
        };
        let (lhs, addend) = match FmaRewriter::binary_operands(&call, "relax.add") {
            Some(operands) => operands,
            None => return Ok(new_expr),
        };
        let product = match lhs.as_var().and_then(|var| self.lookup_binding(var)) {
            Some(value) => value,
            None => return Ok(new_expr),
        };
        let (a, b) = match product
            .as_call()
            .and_then(|product| FmaRewriter::binary_operands(product, "relax.multiply"))
        {
            Some(operands) => operands,
            None => return Ok(new_expr),
        };
        debug!("fusing {lhs} into ewise_fma");
        let fma = Call::new(
            Op::new("relax.ewise_fma"),
            vec![a.clone(), b.clone(), addend.clone()],
        )
        .with_span(call.span.clone());
        let fma: Expr = match &call.struct_info {
            Some(struct_info) => fma.with_struct_info(struct_info.clone()).into(),
            None => fma.into(),
        };
        Ok(fma)
    }
}

/// Replace `add(multiply(a, b), c)` by `ewise_fma(a, b, c)`.
///
/// The multiply must be bound to a variable earlier in the same function.
/// The multiply binding itself is kept; it is dead when nothing else uses it.
pub struct FmaRewrite;

impl Pass for FmaRewrite {
    const NAME: &'static str = "fma-rewrite";
    fn convert(module: &IRModule) -> Result<RewriteResult> {
        apply_to_functions(module, || FmaRewriter {
            state: pass_state(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::BindingBlock;
    use crate::ir::DataType;
    use crate::ir::Function;
    use crate::ir::PrimExpr;
    use crate::ir::SeqExpr;
    use crate::ir::StructInfo;
    use crate::ir::Var;
    use crate::ir::VarBinding;

    #[test]
    fn test_multiply_add_is_fused() {
        let sinfo = StructInfo::tensor(vec![PrimExpr::from(4i64)], DataType::float32());
        let x = Var::new("x", Some(sinfo.clone()));
        let y = Var::new("y", Some(sinfo.clone()));
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

        let result = FmaRewrite::convert(&module).unwrap();
        let new_module = result.is_changed().unwrap();
        let printed = new_module.to_string();
        assert!(printed.contains("relax.ewise_fma(%x, %y, %y)"), "{printed}");
        assert!(!printed.contains("relax.add"), "{printed}");
    }

    #[test]
    fn test_plain_add_is_unchanged() {
        let sinfo = StructInfo::tensor(vec![PrimExpr::from(4i64)], DataType::float32());
        let x = Var::new("x", Some(sinfo.clone()));
        let lv = Var::new("lv", Some(sinfo.clone()));
        let add = Call::new(Op::new("relax.add"), vec![x.clone().into(), x.clone().into()])
            .with_struct_info(sinfo);
        let block = BindingBlock::new(vec![VarBinding::new(lv.clone(), add.into()).into()]);
        let body = SeqExpr::new(vec![block], lv.into());
        let mut module = IRModule::new();
        module.add("main", Function::new(vec![x], body.into(), None));
        let result = FmaRewrite::convert(&module).unwrap();
        assert!(result.is_changed().is_none());
    }
}
