use crate::ir::BindingBlock;
use crate::ir::Call;
use crate::ir::IRModule;
use crate::ir::Op;
use crate::ir::StructInfo;
use crate::ir::Var;
use crate::ir::VarBinding;
use crate::mutator;
use crate::mutator::ExprMutator;
use crate::mutator::MutatorState;
use crate::transform::apply_to_functions;
use crate::transform::pass_state;
use crate::transform::Pass;
use crate::transform::RewriteResult;
use anyhow::Result;
use tracing::debug;

const CALL_DPS: &str = "relax.call_dps";
const ALLOC_TENSOR: &str = "relax.builtin.alloc_tensor";

struct ExplicitMemoryRewriter {
    state: MutatorState,
}

impl ExplicitMemoryRewriter {
    /// Lower `out = call_dps(shape, func, (args...))` to an allocation
    /// followed by a call that writes into it.
    fn lower_call_dps(&mut self, binding: &VarBinding, call: &Call) -> Result<()> {
        let shape = self.visit_expr(&call.args[0])?;
        let func = self.visit_expr(&call.args[1])?;
        let packed = self.visit_expr(&call.args[2])?;
        let mut args = match packed.as_tuple() {
            Some(tuple) => tuple.fields.clone(),
            None => vec![packed],
        };
        let out_struct_info = call
            .sinfo_args
            .first()
            .or(binding.var.struct_info.as_ref())
            .cloned()
            .unwrap_or(StructInfo::Object);
        let alloc = Call::with_attrs(
            Op::new(ALLOC_TENSOR),
            vec![shape],
            None,
            vec![out_struct_info.clone()],
        )
        .with_struct_info(out_struct_info.clone());
        let alloc = self.builder().emit(alloc.into(), "alloc")?;
        debug!("lowering {} into {alloc}", binding.var);
        args.push(alloc.clone().into());
        self.builder().emit(Call::new(func, args).into(), "call")?;

        let var = self.visit_var_def(&binding.var)?;
        let var = self.with_shape_and_type(&var, Some(&out_struct_info));
        if !var.same_as(&binding.var) {
            self.set_var_remap(&binding.var.vid, var.clone());
        }
        let binding = VarBinding::new(var, alloc.into()).with_span(binding.span.clone());
        self.builder().emit_normalized(binding.into())
    }
}

impl ExprMutator for ExplicitMemoryRewriter {
    fn state(&mut self) -> &mut MutatorState {
        &mut self.state
    }
    /// Dataflow blocks become regular blocks since the lowered calls have
    /// side effects.
    fn visit_dataflow_block_(&mut self, block: &BindingBlock) -> Result<BindingBlock> {
        mutator::walk_binding_block(self, block)
    }
    fn visit_dataflow_var_def_(&mut self, var: &Var) -> Result<Var> {
        let new_var =
            Var::with_id(var.vid.clone(), var.struct_info.clone(), false).with_span(var.span.clone());
        self.set_var_remap(&var.vid, new_var.clone());
        Ok(new_var)
    }
    fn visit_var_binding_(&mut self, binding: &VarBinding) -> Result<()> {
        match binding.value.as_call() {
            Some(call) if call.is_op(CALL_DPS) && call.args.len() == 3 => {
                self.lower_call_dps(binding, call)
            }
            _ => mutator::walk_var_binding(self, binding),
        }
    }
}

/// Make the memory of destination-passing calls explicit.
///
/// Every `call_dps` is replaced by an `alloc_tensor` for its output and a
/// call that receives the allocation as its last argument. Dataflow blocks
/// are turned into regular blocks and their dataflow variables into regular
/// variables.
pub struct ExplicitMemoryRewrite;

impl Pass for ExplicitMemoryRewrite {
    const NAME: &'static str = "explicit-memory-rewrite";
    fn convert(module: &IRModule) -> Result<RewriteResult> {
        apply_to_functions(module, || ExplicitMemoryRewriter {
            state: pass_state(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::well_formed;
    use crate::ir::DataType;
    use crate::ir::ExternFunc;
    use crate::ir::Function;
    use crate::ir::PrimExpr;
    use crate::ir::SeqExpr;
    use crate::ir::ShapeExpr;
    use crate::ir::Tuple;
    use indoc::indoc;

    #[test]
    fn test_call_dps_is_lowered() {
        let sinfo = StructInfo::tensor(vec![PrimExpr::from(2i64)], DataType::float32());
        let x = Var::new("x", Some(sinfo.clone()));
        let lv = Var::dataflow("lv", None);
        let gv = Var::new("gv", None);
        let call = Call::with_attrs(
            Op::new(CALL_DPS),
            vec![
                ShapeExpr::new(vec![PrimExpr::from(2i64)]).into(),
                ExternFunc::new("exp").into(),
                Tuple::new(vec![x.clone().into()]).into(),
            ],
            None,
            vec![sinfo.clone()],
        );
        let block = BindingBlock::dataflow(vec![
            VarBinding::new(lv.clone(), call.into()).into(),
            VarBinding::new(gv.clone(), lv.into()).into(),
        ]);
        let body = SeqExpr::new(vec![block], gv.into());
        let mut module = IRModule::new();
        module.add("main", Function::new(vec![x], body.into(), None));

        let result = ExplicitMemoryRewrite::convert(&module).unwrap();
        let new_module = result.is_changed().unwrap();
        let expected = indoc! {"
        module {
          fn @main(%x: Tensor([2], float32)) -> Object {
            %alloc: Tensor([2], float32) = relax.builtin.alloc_tensor(shape(2), sinfo_args=[Tensor([2], float32)])
            %call: Object = extern(\"exp\")(%x, %alloc)
            %lv: Tensor([2], float32) = %alloc
            %gv: Tensor([2], float32) = %lv
            %gv
          }
        }"};
        assert_eq!(new_module.to_string(), expected);
        well_formed(new_module).unwrap();
    }
}
