//! Rewriting traversal.
//!
//! [ExprMutator] rebuilds an expression bottom-up. Handlers return the new
//! expression; when none of a node's children changed the walk returns the
//! original node, so an unchanged tree comes back as the very same object.
//!
//! Bindings are not returned but re-emitted into the mutator's
//! [BlockBuilder]. A handler can therefore emit extra bindings before the
//! one being rewritten, and a variable whose struct info changed is recorded
//! in the [VarRemap] so that later uses refer to the new variable.

use crate::builder::BlockBuilder;
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
use crate::ir::Id;
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
use std::collections::HashMap;
use tracing::trace;

/// Replacement variables keyed by the [Id] of the variable they replace.
///
/// Entries are scoped: [VarRemap::pop_scope] undoes every insertion made
/// since the matching [VarRemap::push_scope].
#[derive(Debug, Default)]
pub struct VarRemap {
    map: HashMap<Id, Var>,
    scopes: Vec<Vec<(Id, Option<Var>)>>,
}

impl VarRemap {
    pub fn new() -> VarRemap {
        VarRemap::default()
    }
    pub fn get(&self, vid: &Id) -> Option<&Var> {
        self.map.get(vid)
    }
    pub fn insert(&mut self, vid: Id, var: Var) {
        let previous = self.map.insert(vid.clone(), var);
        if let Some(scope) = self.scopes.last_mut() {
            scope.push((vid, previous));
        }
    }
    pub fn push_scope(&mut self) {
        self.scopes.push(vec![]);
    }
    pub fn pop_scope(&mut self) -> Result<()> {
        let scope = self
            .scopes
            .pop()
            .ok_or_else(|| anyhow::anyhow!("pop_scope called without a matching push_scope"))?;
        for (vid, previous) in scope.into_iter().rev() {
            match previous {
                Some(var) => self.map.insert(vid, var),
                None => self.map.remove(&vid),
            };
        }
        Ok(())
    }
    pub fn len(&self) -> usize {
        self.map.len()
    }
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// State every mutator carries.
#[derive(Default)]
pub struct MutatorState {
    pub builder: BlockBuilder,
    pub var_remap: VarRemap,
}

impl MutatorState {
    pub fn new() -> MutatorState {
        MutatorState::default()
    }
    pub fn with_builder(builder: BlockBuilder) -> MutatorState {
        MutatorState {
            builder,
            var_remap: VarRemap::new(),
        }
    }
}

pub trait ExprMutator {
    fn state(&mut self) -> &mut MutatorState;

    fn builder(&mut self) -> &mut BlockBuilder {
        &mut self.state().builder
    }
    /// Rewrite `expr` and normalize the result.
    fn visit_expr(&mut self, expr: &Expr) -> Result<Expr> {
        let new_expr = dispatch_expr(self, expr)?;
        self.builder().normalize(&new_expr)
    }

    fn visit_constant_(&mut self, op: &Constant) -> Result<Expr> {
        walk_constant(self, op)
    }
    fn visit_tuple_(&mut self, op: &Tuple) -> Result<Expr> {
        walk_tuple(self, op)
    }
    fn visit_var_(&mut self, op: &Var) -> Result<Expr> {
        walk_var(self, op)
    }
    fn visit_dataflow_var_(&mut self, op: &Var) -> Result<Expr> {
        walk_var(self, op)
    }
    fn visit_shape_expr_(&mut self, op: &ShapeExpr) -> Result<Expr> {
        walk_shape_expr(self, op)
    }
    fn visit_runtime_dep_shape_(&mut self, op: &RuntimeDepShape) -> Result<Expr> {
        walk_runtime_dep_shape(self, op)
    }
    fn visit_extern_func_(&mut self, op: &ExternFunc) -> Result<Expr> {
        walk_extern_func(self, op)
    }
    fn visit_global_var_(&mut self, op: &GlobalVar) -> Result<Expr> {
        walk_global_var(self, op)
    }
    fn visit_function_(&mut self, op: &Function) -> Result<Expr> {
        walk_function(self, op)
    }
    fn visit_call_(&mut self, op: &Call) -> Result<Expr> {
        walk_call(self, op)
    }
    fn visit_seq_expr_(&mut self, op: &SeqExpr) -> Result<Expr> {
        walk_seq_expr(self, op)
    }
    fn visit_if_(&mut self, op: &If) -> Result<Expr> {
        walk_if(self, op)
    }
    fn visit_op_(&mut self, op: &Op) -> Result<Expr> {
        walk_op(self, op)
    }
    fn visit_tuple_getitem_(&mut self, op: &TupleGetItem) -> Result<Expr> {
        walk_tuple_getitem(self, op)
    }
    fn visit_prim_value_(&mut self, op: &PrimValue) -> Result<Expr> {
        walk_prim_value(self, op)
    }
    fn visit_string_imm_(&mut self, op: &StringImm) -> Result<Expr> {
        walk_string_imm(self, op)
    }
    fn visit_data_type_imm_(&mut self, op: &DataTypeImm) -> Result<Expr> {
        walk_data_type_imm(self, op)
    }

    /// Rewrite `binding` and emit the result into the builder.
    fn visit_binding(&mut self, binding: &Binding) -> Result<()> {
        dispatch_binding(self, binding)
    }
    fn visit_var_binding_(&mut self, binding: &VarBinding) -> Result<()> {
        walk_var_binding(self, binding)
    }
    fn visit_match_cast_(&mut self, binding: &MatchCast) -> Result<()> {
        walk_match_cast(self, binding)
    }

    fn visit_binding_block(&mut self, block: &BindingBlock) -> Result<BindingBlock> {
        dispatch_binding_block(self, block)
    }
    fn visit_binding_block_(&mut self, block: &BindingBlock) -> Result<BindingBlock> {
        walk_binding_block(self, block)
    }
    fn visit_dataflow_block_(&mut self, block: &BindingBlock) -> Result<BindingBlock> {
        walk_dataflow_block(self, block)
    }

    fn visit_var_def(&mut self, var: &Var) -> Result<Var> {
        dispatch_var_def(self, var)
    }
    fn visit_var_def_(&mut self, var: &Var) -> Result<Var> {
        walk_var_def(self, var)
    }
    fn visit_dataflow_var_def_(&mut self, var: &Var) -> Result<Var> {
        walk_var_def(self, var)
    }

    fn visit_type(&mut self, struct_info: &StructInfo) -> Result<StructInfo> {
        Ok(struct_info.clone())
    }
    /// Spans are only observed; a rewrite keeps the span of the node it
    /// replaces.
    fn visit_span(&mut self, _span: &Span) -> Result<()> {
        Ok(())
    }
    fn visit_prim_expr(&mut self, expr: &PrimExpr) -> Result<PrimExpr> {
        Ok(expr.clone())
    }

    /// Make later uses of the variable `vid` refer to `var` instead.
    fn set_var_remap(&mut self, vid: &Id, var: Var) {
        trace!("remap {} to {var}", vid.name_hint());
        self.state().var_remap.insert(vid.clone(), var);
    }
    fn get_var_remap(&mut self, vid: &Id) -> Option<Var> {
        self.state().var_remap.get(vid).cloned()
    }
    /// Rewrite `expr` in a scope of its own; bindings emitted while doing so
    /// end up in a [SeqExpr] around the result.
    fn visit_with_new_scope(&mut self, expr: &Expr) -> Result<Expr> {
        with_new_scope(self, expr, &[])
    }
    /// Value bound to `var` in the output built so far.
    fn lookup_binding(&mut self, var: &Var) -> Option<Expr> {
        self.builder().lookup_binding(var)
    }
    /// `var` with its struct info replaced by `struct_info`.
    ///
    /// Returns `var` itself when there is nothing to change.
    fn with_shape_and_type(&mut self, var: &Var, struct_info: Option<&StructInfo>) -> Var {
        match struct_info {
            Some(struct_info) if var.struct_info.as_ref() != Some(struct_info) => {
                var.clone().with_struct_info(struct_info.clone())
            }
            _ => var.clone(),
        }
    }
}

pub fn dispatch_expr<M: ExprMutator + ?Sized>(mutator: &mut M, expr: &Expr) -> Result<Expr> {
    match_expr_kind!(mutator, expr)
}

pub fn dispatch_binding<M: ExprMutator + ?Sized>(
    mutator: &mut M,
    binding: &Binding,
) -> Result<()> {
    match binding {
        Binding::VarBinding(binding) => mutator.visit_var_binding_(binding),
        Binding::MatchCast(binding) => mutator.visit_match_cast_(binding),
    }
}

pub fn dispatch_binding_block<M: ExprMutator + ?Sized>(
    mutator: &mut M,
    block: &BindingBlock,
) -> Result<BindingBlock> {
    if block.is_dataflow() {
        mutator.visit_dataflow_block_(block)
    } else {
        mutator.visit_binding_block_(block)
    }
}

pub fn dispatch_var_def<M: ExprMutator + ?Sized>(mutator: &mut M, var: &Var) -> Result<Var> {
    if var.is_dataflow() {
        mutator.visit_dataflow_var_def_(var)
    } else {
        mutator.visit_var_def_(var)
    }
}

/// Run the default walk for the kind of `expr`, bypassing the handler.
pub fn default_visit<M: ExprMutator + ?Sized>(mutator: &mut M, expr: &Expr) -> Result<Expr> {
    match expr {
        Expr::Constant(op) => walk_constant(mutator, op),
        Expr::Tuple(op) => walk_tuple(mutator, op),
        Expr::Var(op) => walk_var(mutator, op),
        Expr::ShapeExpr(op) => walk_shape_expr(mutator, op),
        Expr::RuntimeDepShape(op) => walk_runtime_dep_shape(mutator, op),
        Expr::ExternFunc(op) => walk_extern_func(mutator, op),
        Expr::GlobalVar(op) => walk_global_var(mutator, op),
        Expr::Function(op) => walk_function(mutator, op),
        Expr::Call(op) => walk_call(mutator, op),
        Expr::SeqExpr(op) => walk_seq_expr(mutator, op),
        Expr::If(op) => walk_if(mutator, op),
        Expr::Op(op) => walk_op(mutator, op),
        Expr::TupleGetItem(op) => walk_tuple_getitem(mutator, op),
        Expr::PrimValue(op) => walk_prim_value(mutator, op),
        Expr::StringImm(op) => walk_string_imm(mutator, op),
        Expr::DataTypeImm(op) => walk_data_type_imm(mutator, op),
    }
}

/// Rewrite `expr` in a new scope whose parameters are `params`.
///
/// Remaps made inside the scope are dropped when it ends.
pub fn with_new_scope<M: ExprMutator + ?Sized>(
    mutator: &mut M,
    expr: &Expr,
    params: &[Var],
) -> Result<Expr> {
    mutator.state().var_remap.push_scope();
    mutator.builder().begin_scope(params);
    mutator.builder().begin_binding_block();
    let visited = mutator.visit_expr(expr);
    let prologue = mutator.builder().end_block();
    let scope = mutator.builder().end_scope();
    let remap = mutator.state().var_remap.pop_scope();
    let visited = visited?;
    let prologue = prologue?;
    scope?;
    remap?;
    if prologue.bindings.is_empty() {
        Ok(visited)
    } else {
        let seq = SeqExpr::new(vec![prologue], visited);
        mutator.builder().normalize(&seq.into())
    }
}

/// Rewrite every expression in `exprs`; the flag is set when none changed.
fn visit_exprs<M: ExprMutator + ?Sized>(
    mutator: &mut M,
    exprs: &[Expr],
) -> Result<(Vec<Expr>, bool)> {
    let mut unchanged = true;
    let mut new_exprs = Vec::with_capacity(exprs.len());
    for expr in exprs {
        let new_expr = mutator.visit_expr(expr)?;
        unchanged &= new_expr.same_as(expr);
        new_exprs.push(new_expr);
    }
    Ok((new_exprs, unchanged))
}

fn walk_span<M: ExprMutator + ?Sized>(mutator: &mut M, span: Option<&Span>) -> Result<()> {
    match span {
        Some(span) => mutator.visit_span(span),
        None => Ok(()),
    }
}

pub fn walk_constant<M: ExprMutator + ?Sized>(mutator: &mut M, op: &Constant) -> Result<Expr> {
    walk_span(mutator, op.span.as_ref())?;
    Ok(op.clone().into())
}

pub fn walk_tuple<M: ExprMutator + ?Sized>(mutator: &mut M, op: &Tuple) -> Result<Expr> {
    walk_span(mutator, op.span.as_ref())?;
    let (fields, unchanged) = visit_exprs(mutator, &op.fields)?;
    if unchanged {
        return Ok(op.clone().into());
    }
    Ok(Tuple::new(fields).with_span(op.span.clone()).into())
}

pub fn walk_var<M: ExprMutator + ?Sized>(mutator: &mut M, op: &Var) -> Result<Expr> {
    walk_span(mutator, op.span.as_ref())?;
    match mutator.get_var_remap(&op.vid) {
        Some(var) => Ok(var.into()),
        None => Ok(op.clone().into()),
    }
}

pub fn walk_shape_expr<M: ExprMutator + ?Sized>(mutator: &mut M, op: &ShapeExpr) -> Result<Expr> {
    walk_span(mutator, op.span.as_ref())?;
    let values = op
        .values
        .iter()
        .map(|value| mutator.visit_prim_expr(value))
        .collect::<Result<Vec<PrimExpr>>>()?;
    if values == op.values {
        return Ok(op.clone().into());
    }
    Ok(ShapeExpr::new(values).with_span(op.span.clone()).into())
}

pub fn walk_runtime_dep_shape<M: ExprMutator + ?Sized>(
    mutator: &mut M,
    op: &RuntimeDepShape,
) -> Result<Expr> {
    walk_span(mutator, op.span.as_ref())?;
    Ok(op.clone().into())
}

pub fn walk_extern_func<M: ExprMutator + ?Sized>(
    mutator: &mut M,
    op: &ExternFunc,
) -> Result<Expr> {
    walk_span(mutator, op.span.as_ref())?;
    Ok(op.clone().into())
}

pub fn walk_global_var<M: ExprMutator + ?Sized>(mutator: &mut M, op: &GlobalVar) -> Result<Expr> {
    walk_span(mutator, op.span.as_ref())?;
    Ok(op.clone().into())
}

pub fn walk_function<M: ExprMutator + ?Sized>(mutator: &mut M, op: &Function) -> Result<Expr> {
    walk_span(mutator, op.span.as_ref())?;
    mutator.state().var_remap.push_scope();
    let result = walk_function_in_scope(mutator, op);
    let remap = mutator.state().var_remap.pop_scope();
    let result = result?;
    remap?;
    Ok(result)
}

fn walk_function_in_scope<M: ExprMutator + ?Sized>(
    mutator: &mut M,
    op: &Function,
) -> Result<Expr> {
    let mut unchanged = true;
    let mut params = Vec::with_capacity(op.params.len());
    for param in &op.params {
        let new_param = mutator.visit_var_def(param)?;
        unchanged &= new_param.same_as(param);
        params.push(new_param);
    }
    let ret_struct_info = mutator.visit_type(&op.ret_struct_info)?;
    let body = with_new_scope(mutator, &op.body, &params)?;
    if unchanged && ret_struct_info == op.ret_struct_info && body.same_as(&op.body) {
        return Ok(op.clone().into());
    }
    let func = Function::with_attrs(params, body, Some(ret_struct_info), op.attrs.clone());
    Ok(func.with_span(op.span.clone()).into())
}

pub fn walk_call<M: ExprMutator + ?Sized>(mutator: &mut M, op: &Call) -> Result<Expr> {
    walk_span(mutator, op.span.as_ref())?;
    let callee = mutator.visit_expr(&op.op)?;
    let sinfo_args = op
        .sinfo_args
        .iter()
        .map(|sinfo_arg| mutator.visit_type(sinfo_arg))
        .collect::<Result<Vec<StructInfo>>>()?;
    let (args, args_unchanged) = visit_exprs(mutator, &op.args)?;
    if args_unchanged && callee.same_as(&op.op) && sinfo_args == op.sinfo_args {
        return Ok(op.clone().into());
    }
    let call = Call::with_attrs(callee, args, op.attrs.clone(), sinfo_args);
    Ok(call.with_span(op.span.clone()).into())
}

pub fn walk_seq_expr<M: ExprMutator + ?Sized>(mutator: &mut M, op: &SeqExpr) -> Result<Expr> {
    walk_span(mutator, op.span.as_ref())?;
    let mut unchanged = true;
    let mut blocks = Vec::with_capacity(op.blocks.len());
    for block in &op.blocks {
        let new_block = mutator.visit_binding_block(block)?;
        unchanged &= new_block.same_as(block);
        if !new_block.bindings.is_empty() {
            blocks.push(new_block);
        }
    }
    mutator.builder().begin_binding_block();
    let body = mutator.visit_expr(&op.body);
    let prologue = mutator.builder().end_block();
    let body = body?;
    let prologue = prologue?;
    if !prologue.bindings.is_empty() {
        blocks.push(prologue);
        unchanged = false;
    }
    if unchanged && body.same_as(&op.body) {
        return Ok(op.clone().into());
    }
    Ok(SeqExpr::new(blocks, body).with_span(op.span.clone()).into())
}

pub fn walk_if<M: ExprMutator + ?Sized>(mutator: &mut M, op: &If) -> Result<Expr> {
    walk_span(mutator, op.span.as_ref())?;
    let cond = mutator.visit_expr(&op.cond)?;
    let true_branch = mutator.visit_with_new_scope(&op.true_branch)?;
    let false_branch = mutator.visit_with_new_scope(&op.false_branch)?;
    if cond.same_as(&op.cond)
        && true_branch.same_as(&op.true_branch)
        && false_branch.same_as(&op.false_branch)
    {
        return Ok(op.clone().into());
    }
    let node = If::new(cond, true_branch, false_branch);
    Ok(node.with_span(op.span.clone()).into())
}

pub fn walk_op<M: ExprMutator + ?Sized>(mutator: &mut M, op: &Op) -> Result<Expr> {
    walk_span(mutator, op.span.as_ref())?;
    Ok(op.clone().into())
}

pub fn walk_tuple_getitem<M: ExprMutator + ?Sized>(
    mutator: &mut M,
    op: &TupleGetItem,
) -> Result<Expr> {
    walk_span(mutator, op.span.as_ref())?;
    let tuple = mutator.visit_expr(&op.tuple)?;
    if tuple.same_as(&op.tuple) {
        return Ok(op.clone().into());
    }
    let item = TupleGetItem::new(tuple, op.index);
    Ok(item.with_span(op.span.clone()).into())
}

pub fn walk_prim_value<M: ExprMutator + ?Sized>(mutator: &mut M, op: &PrimValue) -> Result<Expr> {
    walk_span(mutator, op.span.as_ref())?;
    let value = mutator.visit_prim_expr(&op.value)?;
    if value == op.value {
        return Ok(op.clone().into());
    }
    Ok(PrimValue::new(value, op.dtype).with_span(op.span.clone()).into())
}

pub fn walk_string_imm<M: ExprMutator + ?Sized>(mutator: &mut M, op: &StringImm) -> Result<Expr> {
    walk_span(mutator, op.span.as_ref())?;
    Ok(op.clone().into())
}

pub fn walk_data_type_imm<M: ExprMutator + ?Sized>(
    mutator: &mut M,
    op: &DataTypeImm,
) -> Result<Expr> {
    walk_span(mutator, op.span.as_ref())?;
    Ok(op.clone().into())
}

/// Rewrite the value and the variable of `binding` and emit the result.
///
/// An unchanged binding is emitted as it is. Otherwise the variable takes
/// the struct info of the new value and, if that gives a new variable, later
/// uses are remapped to it.
pub fn walk_var_binding<M: ExprMutator + ?Sized>(
    mutator: &mut M,
    binding: &VarBinding,
) -> Result<()> {
    let new_value = mutator.visit_expr(&binding.value)?;
    let new_var = mutator.visit_var_def(&binding.var)?;
    if new_var.same_as(&binding.var) && new_value.same_as(&binding.value) {
        return mutator
            .builder()
            .emit_normalized(Binding::VarBinding(binding.clone()));
    }
    let new_var = mutator.with_shape_and_type(&new_var, new_value.struct_info());
    if !new_var.same_as(&binding.var) {
        mutator.set_var_remap(&binding.var.vid, new_var.clone());
    }
    let new_binding = VarBinding::new(new_var, new_value).with_span(binding.span.clone());
    mutator.builder().emit_normalized(new_binding.into())
}

pub fn walk_match_cast<M: ExprMutator + ?Sized>(
    mutator: &mut M,
    binding: &MatchCast,
) -> Result<()> {
    let new_value = mutator.visit_expr(&binding.value)?;
    let new_struct_info = mutator.visit_type(&binding.struct_info)?;
    let new_var = mutator.visit_var_def(&binding.var)?;
    if new_var.same_as(&binding.var)
        && new_value.same_as(&binding.value)
        && new_struct_info == binding.struct_info
    {
        return mutator
            .builder()
            .emit_normalized(Binding::MatchCast(binding.clone()));
    }
    let new_var = mutator.with_shape_and_type(&new_var, Some(&new_struct_info));
    if !new_var.same_as(&binding.var) {
        mutator.set_var_remap(&binding.var.vid, new_var.clone());
    }
    let new_binding =
        MatchCast::new(new_var, new_value, new_struct_info).with_span(binding.span.clone());
    mutator.builder().emit_normalized(new_binding.into())
}

pub fn walk_binding_block<M: ExprMutator + ?Sized>(
    mutator: &mut M,
    block: &BindingBlock,
) -> Result<BindingBlock> {
    mutator.builder().begin_binding_block();
    finish_block(mutator, block)
}

pub fn walk_dataflow_block<M: ExprMutator + ?Sized>(
    mutator: &mut M,
    block: &BindingBlock,
) -> Result<BindingBlock> {
    mutator.builder().begin_dataflow_block();
    finish_block(mutator, block)
}

/// Visit the bindings of `block` into the block the builder has open and
/// close it.
fn finish_block<M: ExprMutator + ?Sized>(
    mutator: &mut M,
    block: &BindingBlock,
) -> Result<BindingBlock> {
    let mut visited = Ok(());
    for binding in &block.bindings {
        visited = mutator.visit_binding(binding);
        if visited.is_err() {
            break;
        }
    }
    let new_block = mutator.builder().end_block();
    visited?;
    let new_block = new_block?;
    let unchanged = new_block.kind == block.kind
        && new_block.bindings.len() == block.bindings.len()
        && new_block
            .bindings
            .iter()
            .zip(&block.bindings)
            .all(|(new, old)| new.same_as(old));
    if unchanged {
        return Ok(block.clone());
    }
    Ok(new_block.with_span(block.span.clone()))
}

/// Rewrite the struct info of a variable definition.
///
/// A changed struct info gives a new variable with the same [Id], and later
/// uses are remapped to it.
pub fn walk_var_def<M: ExprMutator + ?Sized>(mutator: &mut M, var: &Var) -> Result<Var> {
    walk_span(mutator, var.span.as_ref())?;
    let struct_info = match &var.struct_info {
        Some(struct_info) => struct_info,
        None => return Ok(var.clone()),
    };
    let new_struct_info = mutator.visit_type(struct_info)?;
    if new_struct_info == *struct_info {
        return Ok(var.clone());
    }
    let new_var = Var::with_id(var.vid.clone(), Some(new_struct_info), var.dataflow)
        .with_span(var.span.clone());
    mutator.set_var_remap(&var.vid, new_var.clone());
    Ok(new_var)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::infer_elementwise;
    use crate::builder::OpRegistry;
    use crate::ir::DataType;
    use crate::ir::SymVar;
    use std::sync::Arc;

    #[derive(Default)]
    struct Identity {
        state: MutatorState,
    }

    impl ExprMutator for Identity {
        fn state(&mut self) -> &mut MutatorState {
            &mut self.state
        }
    }

    struct AddToMultiply {
        state: MutatorState,
    }

    impl ExprMutator for AddToMultiply {
        fn state(&mut self) -> &mut MutatorState {
            &mut self.state
        }
        fn visit_op_(&mut self, op: &Op) -> Result<Expr> {
            if op.name == "relax.add" {
                return Ok(Op::new("relax.multiply").into());
            }
            Ok(op.clone().into())
        }
    }

    fn sample_function() -> Function {
        let n = SymVar::int64("n");
        let sinfo = StructInfo::tensor(vec![PrimExpr::from(&n)], DataType::float32());
        let x = Var::new("x", Some(sinfo.clone()));
        let lv = Var::dataflow("lv", Some(sinfo.clone()));
        let gv = Var::new("gv", Some(sinfo.clone()));
        let add = Call::new(Op::new("relax.add"), vec![x.clone().into(), x.clone().into()])
            .with_struct_info(sinfo);
        let block = BindingBlock::dataflow(vec![
            VarBinding::new(lv.clone(), add.into()).into(),
            VarBinding::new(gv.clone(), lv.into()).into(),
        ]);
        let body = SeqExpr::new(vec![block], gv.into());
        Function::new(vec![x], body.into(), None)
    }

    #[test]
    fn test_identity_returns_same_node() {
        let func: Expr = sample_function().into();
        let mut mutator = Identity::default();
        let result = mutator.visit_expr(&func).unwrap();
        assert!(result.same_as(&func));
        assert_eq!(mutator.state.builder.block_depth(), 0);
        assert!(mutator.state.var_remap.is_empty());
    }

    #[test]
    fn test_changed_binding_keeps_unchanged_siblings() {
        let func = sample_function();
        let mut registry = OpRegistry::new();
        registry.register("relax.multiply", infer_elementwise);
        let builder = BlockBuilder::with_inference(Arc::new(registry));
        let mut mutator = AddToMultiply {
            state: MutatorState::with_builder(builder),
        };
        let result = mutator.visit_expr(&func.clone().into()).unwrap();
        let new_func = result.as_function().unwrap();
        assert!(!new_func.same_as(&func));
        assert!(new_func.params[0].same_as(&func.params[0]));
        let old_block = &func.body.as_seq_expr().unwrap().blocks[0];
        let new_block = &new_func.body.as_seq_expr().unwrap().blocks[0];
        assert!(new_block.is_dataflow());
        let call = new_block.bindings[0].value().as_call().unwrap();
        assert!(call.is_op("relax.multiply"));
        assert!(new_block.bindings[0].var().same_as(old_block.bindings[0].var()));
        assert!(new_block.bindings[1].same_as(&old_block.bindings[1]));
    }

    #[test]
    fn test_var_remap_scopes() {
        let x = Var::new("x", None);
        let y = Var::new("y", None);
        let z = Var::new("z", None);
        let mut remap = VarRemap::new();
        remap.insert(x.vid.clone(), y.clone());
        remap.push_scope();
        remap.insert(x.vid.clone(), z.clone());
        remap.insert(y.vid.clone(), z.clone());
        assert!(remap.get(&x.vid).unwrap().same_as(&z));
        remap.pop_scope().unwrap();
        assert!(remap.get(&x.vid).unwrap().same_as(&y));
        assert!(remap.get(&y.vid).is_none());
        assert!(remap.pop_scope().is_err());
    }

    #[test]
    fn test_with_shape_and_type() {
        let x = Var::new("x", Some(StructInfo::Object));
        let mut mutator = Identity::default();
        assert!(mutator.with_shape_and_type(&x, None).same_as(&x));
        let same = mutator.with_shape_and_type(&x, Some(&StructInfo::Object));
        assert!(same.same_as(&x));
        let prim = StructInfo::Prim(DataType::int64());
        let changed = mutator.with_shape_and_type(&x, Some(&prim));
        assert!(!changed.same_as(&x));
        assert_eq!(changed.vid, x.vid);
        assert_eq!(changed.struct_info, Some(prim));
    }
}
