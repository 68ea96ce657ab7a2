use crate::ir::Binding;
use crate::ir::BindingBlock;
use crate::ir::Expr;
use crate::ir::Id;
use crate::ir::Var;
use std::collections::HashMap;

/// Whether `lhs` and `rhs` are equal up to the identity of their variables.
///
/// Variables match when they are defined at the same position (a parameter
/// or the left-hand side of a binding) with equal struct info; free
/// variables only match themselves. Other nodes are compared by kind and
/// content.
pub fn structural_equal(lhs: &Expr, rhs: &Expr) -> bool {
    StructuralEqual::default().expr(lhs, rhs)
}

#[derive(Default)]
struct StructuralEqual {
    /// Variables of `lhs` mapped to the variables of `rhs` they correspond to.
    var_map: HashMap<Id, Id>,
}

impl StructuralEqual {
    fn var_def(&mut self, lhs: &Var, rhs: &Var) -> bool {
        if lhs.dataflow != rhs.dataflow || lhs.struct_info != rhs.struct_info {
            return false;
        }
        self.var_map.insert(lhs.vid.clone(), rhs.vid.clone());
        true
    }
    fn var_use(&self, lhs: &Var, rhs: &Var) -> bool {
        if lhs.dataflow != rhs.dataflow {
            return false;
        }
        match self.var_map.get(&lhs.vid) {
            Some(vid) => *vid == rhs.vid,
            None => lhs.vid == rhs.vid,
        }
    }
    fn exprs(&mut self, lhs: &[Expr], rhs: &[Expr]) -> bool {
        lhs.len() == rhs.len() && lhs.iter().zip(rhs).all(|(l, r)| self.expr(l, r))
    }
    fn binding(&mut self, lhs: &Binding, rhs: &Binding) -> bool {
        match (lhs, rhs) {
            (Binding::VarBinding(l), Binding::VarBinding(r)) => {
                self.expr(&l.value, &r.value) && self.var_def(&l.var, &r.var)
            }
            (Binding::MatchCast(l), Binding::MatchCast(r)) => {
                l.struct_info == r.struct_info
                    && self.expr(&l.value, &r.value)
                    && self.var_def(&l.var, &r.var)
            }
            _ => false,
        }
    }
    fn block(&mut self, lhs: &BindingBlock, rhs: &BindingBlock) -> bool {
        lhs.kind == rhs.kind
            && lhs.bindings.len() == rhs.bindings.len()
            && lhs
                .bindings
                .iter()
                .zip(&rhs.bindings)
                .all(|(l, r)| self.binding(l, r))
    }
    fn expr(&mut self, lhs: &Expr, rhs: &Expr) -> bool {
        if lhs.same_as(rhs) {
            return true;
        }
        match (lhs, rhs) {
            (Expr::Constant(l), Expr::Constant(r)) => {
                l.values == r.values && l.shape == r.shape && l.dtype == r.dtype
            }
            (Expr::Tuple(l), Expr::Tuple(r)) => self.exprs(&l.fields, &r.fields),
            (Expr::Var(l), Expr::Var(r)) => self.var_use(l, r),
            (Expr::ShapeExpr(l), Expr::ShapeExpr(r)) => l.values == r.values,
            (Expr::RuntimeDepShape(_), Expr::RuntimeDepShape(_)) => true,
            (Expr::ExternFunc(l), Expr::ExternFunc(r)) => l.global_symbol == r.global_symbol,
            (Expr::GlobalVar(l), Expr::GlobalVar(r)) => l.name_hint == r.name_hint,
            (Expr::Function(l), Expr::Function(r)) => {
                l.params.len() == r.params.len()
                    && l.params
                        .iter()
                        .zip(&r.params)
                        .all(|(lp, rp)| self.var_def(lp, rp))
                    && l.ret_struct_info == r.ret_struct_info
                    && l.attrs == r.attrs
                    && self.expr(&l.body, &r.body)
            }
            (Expr::Call(l), Expr::Call(r)) => {
                l.attrs == r.attrs
                    && l.sinfo_args == r.sinfo_args
                    && self.expr(&l.op, &r.op)
                    && self.exprs(&l.args, &r.args)
            }
            (Expr::SeqExpr(l), Expr::SeqExpr(r)) => {
                l.blocks.len() == r.blocks.len()
                    && l.blocks
                        .iter()
                        .zip(&r.blocks)
                        .all(|(lb, rb)| self.block(lb, rb))
                    && self.expr(&l.body, &r.body)
            }
            (Expr::If(l), Expr::If(r)) => {
                self.expr(&l.cond, &r.cond)
                    && self.expr(&l.true_branch, &r.true_branch)
                    && self.expr(&l.false_branch, &r.false_branch)
            }
            (Expr::Op(l), Expr::Op(r)) => l.name == r.name,
            (Expr::TupleGetItem(l), Expr::TupleGetItem(r)) => {
                l.index == r.index && self.expr(&l.tuple, &r.tuple)
            }
            (Expr::PrimValue(l), Expr::PrimValue(r)) => l.value == r.value && l.dtype == r.dtype,
            (Expr::StringImm(l), Expr::StringImm(r)) => l.value == r.value,
            (Expr::DataTypeImm(l), Expr::DataTypeImm(r)) => l.value == r.value,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Call;
    use crate::ir::Function;
    use crate::ir::Op;
    use crate::ir::SeqExpr;
    use crate::ir::VarBinding;

    fn negate_twice() -> Expr {
        let x = Var::new("x", None);
        let y = Var::new("y", None);
        let first = Call::new(Op::new("relax.neg"), vec![x.clone().into()]);
        let second = Call::new(Op::new("relax.neg"), vec![y.clone().into()]);
        let z = Var::new("z", None);
        let block = BindingBlock::new(vec![
            VarBinding::new(y, first.into()).into(),
            VarBinding::new(z.clone(), second.into()).into(),
        ]);
        Function::new(vec![x], SeqExpr::new(vec![block], z.into()).into(), None).into()
    }

    #[test]
    fn test_alpha_equivalence() {
        let lhs = negate_twice();
        let rhs = negate_twice();
        assert!(!lhs.same_as(&rhs));
        assert!(structural_equal(&lhs, &rhs));
    }

    #[test]
    fn test_free_vars_only_match_themselves() {
        let a: Expr = Var::new("a", None).into();
        let b: Expr = Var::new("a", None).into();
        assert!(structural_equal(&a, &a));
        assert!(!structural_equal(&a, &b));
    }
}
