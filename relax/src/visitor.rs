//! Read-only traversal.
//!
//! [ExprVisitor] walks an expression tree depth-first. Each handler defaults
//! to the matching `walk_*` function, which visits the children; an
//! implementation overrides the handlers it cares about and calls the walk
//! function itself when it still wants the recursion.

use crate::functor::match_expr_kind;
use crate::ir::Binding;
use crate::ir::BindingBlock;
use crate::ir::Call;
use crate::ir::Constant;
use crate::ir::DataTypeImm;
use crate::ir::Expr;
use crate::ir::ExternFunc;
use crate::ir::Function;
use crate::ir::GlobalVar;
use crate::ir::If;
use crate::ir::MatchCast;
use crate::ir::Op;
use crate::ir::PrimExpr;
use crate::ir::PrimValue;
use crate::ir::RuntimeDepShape;
use crate::ir::SeqExpr;
use crate::ir::ShapeExpr;
use crate::ir::Span;
use crate::ir::StringImm;
use crate::ir::StructInfo;
use crate::ir::Tuple;
use crate::ir::TupleGetItem;
use crate::ir::Var;
use crate::ir::VarBinding;
use anyhow::Result;

pub trait ExprVisitor {
    fn visit_expr(&mut self, expr: &Expr) -> Result<()> {
        dispatch_expr(self, expr)
    }

    fn visit_constant_(&mut self, op: &Constant) -> Result<()> {
        walk_constant(self, op)
    }
    fn visit_tuple_(&mut self, op: &Tuple) -> Result<()> {
        walk_tuple(self, op)
    }
    fn visit_var_(&mut self, op: &Var) -> Result<()> {
        walk_var(self, op)
    }
    fn visit_dataflow_var_(&mut self, op: &Var) -> Result<()> {
        walk_var(self, op)
    }
    fn visit_shape_expr_(&mut self, op: &ShapeExpr) -> Result<()> {
        walk_shape_expr(self, op)
    }
    fn visit_runtime_dep_shape_(&mut self, op: &RuntimeDepShape) -> Result<()> {
        walk_runtime_dep_shape(self, op)
    }
    fn visit_extern_func_(&mut self, op: &ExternFunc) -> Result<()> {
        walk_extern_func(self, op)
    }
    fn visit_global_var_(&mut self, op: &GlobalVar) -> Result<()> {
        walk_global_var(self, op)
    }
    fn visit_function_(&mut self, op: &Function) -> Result<()> {
        walk_function(self, op)
    }
    fn visit_call_(&mut self, op: &Call) -> Result<()> {
        walk_call(self, op)
    }
    fn visit_seq_expr_(&mut self, op: &SeqExpr) -> Result<()> {
        walk_seq_expr(self, op)
    }
    fn visit_if_(&mut self, op: &If) -> Result<()> {
        walk_if(self, op)
    }
    fn visit_op_(&mut self, op: &Op) -> Result<()> {
        walk_op(self, op)
    }
    fn visit_tuple_getitem_(&mut self, op: &TupleGetItem) -> Result<()> {
        walk_tuple_getitem(self, op)
    }
    fn visit_prim_value_(&mut self, op: &PrimValue) -> Result<()> {
        walk_prim_value(self, op)
    }
    fn visit_string_imm_(&mut self, op: &StringImm) -> Result<()> {
        walk_string_imm(self, op)
    }
    fn visit_data_type_imm_(&mut self, op: &DataTypeImm) -> Result<()> {
        walk_data_type_imm(self, op)
    }

    fn visit_binding(&mut self, binding: &Binding) -> Result<()> {
        dispatch_binding(self, binding)
    }
    fn visit_var_binding_(&mut self, binding: &VarBinding) -> Result<()> {
        walk_var_binding(self, binding)
    }
    fn visit_match_cast_(&mut self, binding: &MatchCast) -> Result<()> {
        walk_match_cast(self, binding)
    }

    fn visit_binding_block(&mut self, block: &BindingBlock) -> Result<()> {
        dispatch_binding_block(self, block)
    }
    fn visit_binding_block_(&mut self, block: &BindingBlock) -> Result<()> {
        walk_binding_block(self, block)
    }
    fn visit_dataflow_block_(&mut self, block: &BindingBlock) -> Result<()> {
        walk_binding_block(self, block)
    }

    /// Visit a variable at its definition site.
    fn visit_var_def(&mut self, var: &Var) -> Result<()> {
        dispatch_var_def(self, var)
    }
    fn visit_var_def_(&mut self, var: &Var) -> Result<()> {
        walk_var_def(self, var)
    }
    fn visit_dataflow_var_def_(&mut self, var: &Var) -> Result<()> {
        walk_var_def(self, var)
    }

    fn visit_type(&mut self, _struct_info: &StructInfo) -> Result<()> {
        Ok(())
    }
    fn visit_span(&mut self, _span: &Span) -> Result<()> {
        Ok(())
    }
    fn visit_prim_expr(&mut self, _expr: &PrimExpr) -> Result<()> {
        Ok(())
    }
}

pub fn dispatch_expr<V: ExprVisitor + ?Sized>(visitor: &mut V, expr: &Expr) -> Result<()> {
    match_expr_kind!(visitor, expr)
}

pub fn dispatch_binding<V: ExprVisitor + ?Sized>(visitor: &mut V, binding: &Binding) -> Result<()> {
    match binding {
        Binding::VarBinding(binding) => visitor.visit_var_binding_(binding),
        Binding::MatchCast(binding) => visitor.visit_match_cast_(binding),
    }
}

pub fn dispatch_binding_block<V: ExprVisitor + ?Sized>(
    visitor: &mut V,
    block: &BindingBlock,
) -> Result<()> {
    if block.is_dataflow() {
        visitor.visit_dataflow_block_(block)
    } else {
        visitor.visit_binding_block_(block)
    }
}

pub fn dispatch_var_def<V: ExprVisitor + ?Sized>(visitor: &mut V, var: &Var) -> Result<()> {
    if var.is_dataflow() {
        visitor.visit_dataflow_var_def_(var)
    } else {
        visitor.visit_var_def_(var)
    }
}

/// Run the default walk for the kind of `expr`, bypassing the handler.
///
/// Useful in handlers that intercept [ExprVisitor::visit_expr].
pub fn default_visit<V: ExprVisitor + ?Sized>(visitor: &mut V, expr: &Expr) -> Result<()> {
    match expr {
        Expr::Constant(op) => walk_constant(visitor, op),
        Expr::Tuple(op) => walk_tuple(visitor, op),
        Expr::Var(op) => walk_var(visitor, op),
        Expr::ShapeExpr(op) => walk_shape_expr(visitor, op),
        Expr::RuntimeDepShape(op) => walk_runtime_dep_shape(visitor, op),
        Expr::ExternFunc(op) => walk_extern_func(visitor, op),
        Expr::GlobalVar(op) => walk_global_var(visitor, op),
        Expr::Function(op) => walk_function(visitor, op),
        Expr::Call(op) => walk_call(visitor, op),
        Expr::SeqExpr(op) => walk_seq_expr(visitor, op),
        Expr::If(op) => walk_if(visitor, op),
        Expr::Op(op) => walk_op(visitor, op),
        Expr::TupleGetItem(op) => walk_tuple_getitem(visitor, op),
        Expr::PrimValue(op) => walk_prim_value(visitor, op),
        Expr::StringImm(op) => walk_string_imm(visitor, op),
        Expr::DataTypeImm(op) => walk_data_type_imm(visitor, op),
    }
}

fn walk_span<V: ExprVisitor + ?Sized>(visitor: &mut V, span: Option<&Span>) -> Result<()> {
    match span {
        Some(span) => visitor.visit_span(span),
        None => Ok(()),
    }
}

pub fn walk_constant<V: ExprVisitor + ?Sized>(visitor: &mut V, op: &Constant) -> Result<()> {
    walk_span(visitor, op.span.as_ref())
}

pub fn walk_tuple<V: ExprVisitor + ?Sized>(visitor: &mut V, op: &Tuple) -> Result<()> {
    walk_span(visitor, op.span.as_ref())?;
    for field in &op.fields {
        visitor.visit_expr(field)?;
    }
    Ok(())
}

pub fn walk_var<V: ExprVisitor + ?Sized>(visitor: &mut V, op: &Var) -> Result<()> {
    walk_span(visitor, op.span.as_ref())
}

pub fn walk_shape_expr<V: ExprVisitor + ?Sized>(visitor: &mut V, op: &ShapeExpr) -> Result<()> {
    walk_span(visitor, op.span.as_ref())?;
    for value in &op.values {
        visitor.visit_prim_expr(value)?;
    }
    Ok(())
}

pub fn walk_runtime_dep_shape<V: ExprVisitor + ?Sized>(
    visitor: &mut V,
    op: &RuntimeDepShape,
) -> Result<()> {
    walk_span(visitor, op.span.as_ref())
}

pub fn walk_extern_func<V: ExprVisitor + ?Sized>(visitor: &mut V, op: &ExternFunc) -> Result<()> {
    walk_span(visitor, op.span.as_ref())
}

pub fn walk_global_var<V: ExprVisitor + ?Sized>(visitor: &mut V, op: &GlobalVar) -> Result<()> {
    walk_span(visitor, op.span.as_ref())
}

pub fn walk_function<V: ExprVisitor + ?Sized>(visitor: &mut V, op: &Function) -> Result<()> {
    walk_span(visitor, op.span.as_ref())?;
    for param in &op.params {
        visitor.visit_var_def(param)?;
    }
    visitor.visit_expr(&op.body)?;
    visitor.visit_type(&op.ret_struct_info)
}

pub fn walk_call<V: ExprVisitor + ?Sized>(visitor: &mut V, op: &Call) -> Result<()> {
    walk_span(visitor, op.span.as_ref())?;
    visitor.visit_expr(&op.op)?;
    for sinfo_arg in &op.sinfo_args {
        visitor.visit_type(sinfo_arg)?;
    }
    for arg in &op.args {
        visitor.visit_expr(arg)?;
    }
    Ok(())
}

pub fn walk_seq_expr<V: ExprVisitor + ?Sized>(visitor: &mut V, op: &SeqExpr) -> Result<()> {
    walk_span(visitor, op.span.as_ref())?;
    for block in &op.blocks {
        visitor.visit_binding_block(block)?;
    }
    visitor.visit_expr(&op.body)
}

pub fn walk_if<V: ExprVisitor + ?Sized>(visitor: &mut V, op: &If) -> Result<()> {
    walk_span(visitor, op.span.as_ref())?;
    visitor.visit_expr(&op.cond)?;
    visitor.visit_expr(&op.true_branch)?;
    visitor.visit_expr(&op.false_branch)
}

pub fn walk_op<V: ExprVisitor + ?Sized>(visitor: &mut V, op: &Op) -> Result<()> {
    walk_span(visitor, op.span.as_ref())
}

pub fn walk_tuple_getitem<V: ExprVisitor + ?Sized>(
    visitor: &mut V,
    op: &TupleGetItem,
) -> Result<()> {
    walk_span(visitor, op.span.as_ref())?;
    visitor.visit_expr(&op.tuple)
}

pub fn walk_prim_value<V: ExprVisitor + ?Sized>(visitor: &mut V, op: &PrimValue) -> Result<()> {
    walk_span(visitor, op.span.as_ref())?;
    visitor.visit_prim_expr(&op.value)
}

pub fn walk_string_imm<V: ExprVisitor + ?Sized>(visitor: &mut V, op: &StringImm) -> Result<()> {
    walk_span(visitor, op.span.as_ref())
}

pub fn walk_data_type_imm<V: ExprVisitor + ?Sized>(
    visitor: &mut V,
    op: &DataTypeImm,
) -> Result<()> {
    walk_span(visitor, op.span.as_ref())
}

pub fn walk_var_binding<V: ExprVisitor + ?Sized>(
    visitor: &mut V,
    binding: &VarBinding,
) -> Result<()> {
    visitor.visit_expr(&binding.value)?;
    visitor.visit_var_def(&binding.var)
}

pub fn walk_match_cast<V: ExprVisitor + ?Sized>(visitor: &mut V, binding: &MatchCast) -> Result<()> {
    visitor.visit_expr(&binding.value)?;
    visitor.visit_type(&binding.struct_info)?;
    visitor.visit_var_def(&binding.var)
}

pub fn walk_binding_block<V: ExprVisitor + ?Sized>(
    visitor: &mut V,
    block: &BindingBlock,
) -> Result<()> {
    for binding in &block.bindings {
        visitor.visit_binding(binding)?;
    }
    Ok(())
}

pub fn walk_var_def<V: ExprVisitor + ?Sized>(visitor: &mut V, var: &Var) -> Result<()> {
    walk_span(visitor, var.span.as_ref())
}

struct PostOrderVisitor<F: FnMut(&Expr)> {
    callback: F,
}

impl<F: FnMut(&Expr)> ExprVisitor for PostOrderVisitor<F> {
    fn visit_expr(&mut self, expr: &Expr) -> Result<()> {
        dispatch_expr(self, expr)?;
        (self.callback)(expr);
        Ok(())
    }
}

/// Call `callback` on every expression under `expr`, children first.
pub fn post_order_visit<F: FnMut(&Expr)>(expr: &Expr, callback: F) -> Result<()> {
    PostOrderVisitor { callback }.visit_expr(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::DataType;
    use crate::ir::PrimExpr;
    use crate::ir::SymVar;

    #[derive(Default)]
    struct VarCollector {
        uses: Vec<String>,
        defs: Vec<String>,
    }

    impl ExprVisitor for VarCollector {
        fn visit_var_(&mut self, op: &Var) -> Result<()> {
            self.uses.push(op.to_string());
            Ok(())
        }
        fn visit_dataflow_var_(&mut self, op: &Var) -> Result<()> {
            self.uses.push(op.to_string());
            Ok(())
        }
        fn visit_var_def_(&mut self, var: &Var) -> Result<()> {
            self.defs.push(var.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_uses_and_defs() {
        let x = Var::new("x", None);
        let lv = Var::dataflow("lv", None);
        let gv = Var::new("gv", None);
        let add = Call::new(Op::new("relax.add"), vec![x.clone().into(), x.clone().into()]);
        let block = BindingBlock::dataflow(vec![
            VarBinding::new(lv.clone(), add.into()).into(),
            VarBinding::new(gv.clone(), lv.into()).into(),
        ]);
        let body = SeqExpr::new(vec![block], gv.into());
        let func = Function::new(vec![x], body.into(), None);
        let mut collector = VarCollector::default();
        collector.visit_expr(&func.into()).unwrap();
        assert_eq!(collector.uses, vec!["%x", "%x", "%lv", "%gv"]);
        // Dataflow definitions use the default handler.
        assert_eq!(collector.defs, vec!["%x", "%gv"]);
    }

    #[test]
    fn test_post_order() {
        let n = SymVar::int64("n");
        let shape = ShapeExpr::new(vec![PrimExpr::from(&n)]);
        let value = PrimValue::new(PrimExpr::from(&n) * 2, DataType::int64());
        let tuple = Tuple::new(vec![shape.into(), value.into()]);
        let item = TupleGetItem::new(tuple.into(), 0);
        let mut kinds = vec![];
        post_order_visit(&item.into(), |expr| kinds.push(expr.kind().name())).unwrap();
        assert_eq!(
            kinds,
            vec!["ShapeExpr", "PrimValue", "Tuple", "TupleGetItem"]
        );
    }
}
