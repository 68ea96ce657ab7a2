//! Visitors and mutators composed from closures.
//!
//! Code that is not a Rust type implementing [ExprVisitor] or [ExprMutator],
//! for example a pass assembled at runtime, supplies handlers for the slots it
//! cares about and leaves the rest to the engine defaults:
//!
//! ```
//! use relax::extension::VisitorHandlers;
//! use relax::functor::ExprKind;
//! use relax::ir::Call;
//! use relax::ir::Expr;
//! use relax::ir::Op;
//! use relax::ir::Var;
//! use relax::visitor::default_visit;
//! use relax::visitor::ExprVisitor;
//!
//! let mut visitor = VisitorHandlers::<usize>::new()
//!     .visit(ExprKind::Call, |v, expr| {
//!         v.data += 1;
//!         default_visit(v, expr)
//!     })
//!     .build(0)
//!     .unwrap();
//! let x = Var::new("x", None);
//! let call: Expr = Call::new(Op::new("relax.neg"), vec![x.into()]).into();
//! visitor.visit_expr(&call).unwrap();
//! assert_eq!(visitor.data, 1);
//! ```
//!
//! Handlers receive the composed instance, so they reach their own state
//! through `data` and re-enter the traversal through the trait methods.
//!
//! Post-order hooks exist for expression kinds only. Bindings, blocks and
//! variable definitions are emitted into the builder rather than returned,
//! so a mutator that wants to change them supplies a handler for that slot
//! instead.

use crate::builder::BlockBuilder;
use crate::functor::unimplemented_handler;
use crate::functor::BindingKind;
use crate::functor::BlockKind;
use crate::functor::ExprKind;
use crate::functor::VarDefKind;
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
use crate::mutator;
use crate::mutator::ExprMutator;
use crate::mutator::MutatorState;
use crate::visitor;
use crate::visitor::ExprVisitor;
use anyhow::Result;
use std::rc::Rc;

pub type VisitFn<S, T> = Rc<dyn Fn(&mut ComposedVisitor<S>, &T) -> Result<()>>;
pub type MutateFn<S, T, R> = Rc<dyn Fn(&mut ComposedMutator<S>, &T) -> Result<R>>;

fn empty_table<F>() -> [Option<F>; ExprKind::COUNT] {
    std::array::from_fn(|_| None)
}

/// Handler table for a [ComposedVisitor].
pub struct VisitorHandlers<S> {
    visit_expr: Option<VisitFn<S, Expr>>,
    exprs: [Option<VisitFn<S, Expr>>; ExprKind::COUNT],
    visit_binding: Option<VisitFn<S, Binding>>,
    visit_var_binding_: Option<VisitFn<S, VarBinding>>,
    visit_match_cast_: Option<VisitFn<S, MatchCast>>,
    visit_binding_block: Option<VisitFn<S, BindingBlock>>,
    visit_binding_block_: Option<VisitFn<S, BindingBlock>>,
    visit_dataflow_block_: Option<VisitFn<S, BindingBlock>>,
    visit_var_def: Option<VisitFn<S, Var>>,
    visit_var_def_: Option<VisitFn<S, Var>>,
    visit_dataflow_var_def_: Option<VisitFn<S, Var>>,
    visit_type: Option<VisitFn<S, StructInfo>>,
    visit_span: Option<VisitFn<S, Span>>,
    strict: bool,
}

impl<S> Default for VisitorHandlers<S> {
    fn default() -> Self {
        VisitorHandlers {
            visit_expr: None,
            exprs: empty_table(),
            visit_binding: None,
            visit_var_binding_: None,
            visit_match_cast_: None,
            visit_binding_block: None,
            visit_binding_block_: None,
            visit_dataflow_block_: None,
            visit_var_def: None,
            visit_var_def_: None,
            visit_dataflow_var_def_: None,
            visit_type: None,
            visit_span: None,
            strict: false,
        }
    }
}

impl<S> VisitorHandlers<S> {
    pub fn new() -> Self {
        Self::default()
    }
    /// Replace the generic entry point; use [visitor::dispatch_expr] inside
    /// `f` to continue with the per-kind handlers.
    pub fn visit_expr<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ComposedVisitor<S>, &Expr) -> Result<()> + 'static,
    {
        self.visit_expr = Some(Rc::new(f));
        self
    }
    /// Handler for the expressions of `kind`.
    pub fn visit<F>(mut self, kind: ExprKind, f: F) -> Self
    where
        F: Fn(&mut ComposedVisitor<S>, &Expr) -> Result<()> + 'static,
    {
        self.exprs[kind.index()] = Some(Rc::new(f));
        self
    }
    pub fn visit_binding<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ComposedVisitor<S>, &Binding) -> Result<()> + 'static,
    {
        self.visit_binding = Some(Rc::new(f));
        self
    }
    pub fn visit_var_binding_<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ComposedVisitor<S>, &VarBinding) -> Result<()> + 'static,
    {
        self.visit_var_binding_ = Some(Rc::new(f));
        self
    }
    pub fn visit_match_cast_<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ComposedVisitor<S>, &MatchCast) -> Result<()> + 'static,
    {
        self.visit_match_cast_ = Some(Rc::new(f));
        self
    }
    pub fn visit_binding_block<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ComposedVisitor<S>, &BindingBlock) -> Result<()> + 'static,
    {
        self.visit_binding_block = Some(Rc::new(f));
        self
    }
    pub fn visit_binding_block_<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ComposedVisitor<S>, &BindingBlock) -> Result<()> + 'static,
    {
        self.visit_binding_block_ = Some(Rc::new(f));
        self
    }
    pub fn visit_dataflow_block_<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ComposedVisitor<S>, &BindingBlock) -> Result<()> + 'static,
    {
        self.visit_dataflow_block_ = Some(Rc::new(f));
        self
    }
    pub fn visit_var_def<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ComposedVisitor<S>, &Var) -> Result<()> + 'static,
    {
        self.visit_var_def = Some(Rc::new(f));
        self
    }
    pub fn visit_var_def_<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ComposedVisitor<S>, &Var) -> Result<()> + 'static,
    {
        self.visit_var_def_ = Some(Rc::new(f));
        self
    }
    pub fn visit_dataflow_var_def_<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ComposedVisitor<S>, &Var) -> Result<()> + 'static,
    {
        self.visit_dataflow_var_def_ = Some(Rc::new(f));
        self
    }
    pub fn visit_type<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ComposedVisitor<S>, &StructInfo) -> Result<()> + 'static,
    {
        self.visit_type = Some(Rc::new(f));
        self
    }
    pub fn visit_span<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ComposedVisitor<S>, &Span) -> Result<()> + 'static,
    {
        self.visit_span = Some(Rc::new(f));
        self
    }
    /// Fail on per-kind handlers that were not supplied instead of
    /// recursing.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }
    pub fn build(self, data: S) -> Result<ComposedVisitor<S>> {
        Ok(ComposedVisitor {
            data,
            handlers: Rc::new(self),
        })
    }
}

/// Visitor running the handlers of a [VisitorHandlers] table.
pub struct ComposedVisitor<S> {
    pub data: S,
    handlers: Rc<VisitorHandlers<S>>,
}

impl<S> ComposedVisitor<S> {
    pub fn into_data(self) -> S {
        self.data
    }
    fn expr_slot<T>(
        &mut self,
        kind: ExprKind,
        op: &T,
        default: fn(&mut Self, &T) -> Result<()>,
    ) -> Result<()>
    where
        T: Clone + Into<Expr>,
    {
        match self.handlers.exprs[kind.index()].clone() {
            Some(f) => f(self, &op.clone().into()),
            None if self.handlers.strict => Err(unimplemented_handler(kind.handler_name())),
            None => default(self, op),
        }
    }
    /// Run `handler`, or `default` when it is missing. `handler_name` is set
    /// for per-kind slots, which fail instead in strict mode.
    fn slot<T>(
        &mut self,
        handler: Option<VisitFn<S, T>>,
        handler_name: Option<&str>,
        node: &T,
        default: fn(&mut Self, &T) -> Result<()>,
    ) -> Result<()> {
        match (handler, handler_name) {
            (Some(f), _) => f(self, node),
            (None, Some(name)) if self.handlers.strict => Err(unimplemented_handler(name)),
            (None, _) => default(self, node),
        }
    }
}

impl<S> ExprVisitor for ComposedVisitor<S> {
    fn visit_expr(&mut self, expr: &Expr) -> Result<()> {
        let handler = self.handlers.visit_expr.clone();
        self.slot(handler, None, expr, visitor::dispatch_expr)
    }

    fn visit_constant_(&mut self, op: &Constant) -> Result<()> {
        self.expr_slot(ExprKind::Constant, op, visitor::walk_constant)
    }
    fn visit_tuple_(&mut self, op: &Tuple) -> Result<()> {
        self.expr_slot(ExprKind::Tuple, op, visitor::walk_tuple)
    }
    fn visit_var_(&mut self, op: &Var) -> Result<()> {
        self.expr_slot(ExprKind::Var, op, visitor::walk_var)
    }
    fn visit_dataflow_var_(&mut self, op: &Var) -> Result<()> {
        self.expr_slot(ExprKind::DataflowVar, op, visitor::walk_var)
    }
    fn visit_shape_expr_(&mut self, op: &ShapeExpr) -> Result<()> {
        self.expr_slot(ExprKind::ShapeExpr, op, visitor::walk_shape_expr)
    }
    fn visit_runtime_dep_shape_(&mut self, op: &RuntimeDepShape) -> Result<()> {
        self.expr_slot(ExprKind::RuntimeDepShape, op, visitor::walk_runtime_dep_shape)
    }
    fn visit_extern_func_(&mut self, op: &ExternFunc) -> Result<()> {
        self.expr_slot(ExprKind::ExternFunc, op, visitor::walk_extern_func)
    }
    fn visit_global_var_(&mut self, op: &GlobalVar) -> Result<()> {
        self.expr_slot(ExprKind::GlobalVar, op, visitor::walk_global_var)
    }
    fn visit_function_(&mut self, op: &Function) -> Result<()> {
        self.expr_slot(ExprKind::Function, op, visitor::walk_function)
    }
    fn visit_call_(&mut self, op: &Call) -> Result<()> {
        self.expr_slot(ExprKind::Call, op, visitor::walk_call)
    }
    fn visit_seq_expr_(&mut self, op: &SeqExpr) -> Result<()> {
        self.expr_slot(ExprKind::SeqExpr, op, visitor::walk_seq_expr)
    }
    fn visit_if_(&mut self, op: &If) -> Result<()> {
        self.expr_slot(ExprKind::If, op, visitor::walk_if)
    }
    fn visit_op_(&mut self, op: &Op) -> Result<()> {
        self.expr_slot(ExprKind::Op, op, visitor::walk_op)
    }
    fn visit_tuple_getitem_(&mut self, op: &TupleGetItem) -> Result<()> {
        self.expr_slot(ExprKind::TupleGetItem, op, visitor::walk_tuple_getitem)
    }
    fn visit_prim_value_(&mut self, op: &PrimValue) -> Result<()> {
        self.expr_slot(ExprKind::PrimValue, op, visitor::walk_prim_value)
    }
    fn visit_string_imm_(&mut self, op: &StringImm) -> Result<()> {
        self.expr_slot(ExprKind::StringImm, op, visitor::walk_string_imm)
    }
    fn visit_data_type_imm_(&mut self, op: &DataTypeImm) -> Result<()> {
        self.expr_slot(ExprKind::DataTypeImm, op, visitor::walk_data_type_imm)
    }

    fn visit_binding(&mut self, binding: &Binding) -> Result<()> {
        let handler = self.handlers.visit_binding.clone();
        self.slot(handler, None, binding, visitor::dispatch_binding)
    }
    fn visit_var_binding_(&mut self, binding: &VarBinding) -> Result<()> {
        let handler = self.handlers.visit_var_binding_.clone();
        let name = BindingKind::VarBinding.handler_name();
        self.slot(handler, Some(name), binding, visitor::walk_var_binding)
    }
    fn visit_match_cast_(&mut self, binding: &MatchCast) -> Result<()> {
        let handler = self.handlers.visit_match_cast_.clone();
        let name = BindingKind::MatchCast.handler_name();
        self.slot(handler, Some(name), binding, visitor::walk_match_cast)
    }

    fn visit_binding_block(&mut self, block: &BindingBlock) -> Result<()> {
        let handler = self.handlers.visit_binding_block.clone();
        self.slot(handler, None, block, visitor::dispatch_binding_block)
    }
    fn visit_binding_block_(&mut self, block: &BindingBlock) -> Result<()> {
        let handler = self.handlers.visit_binding_block_.clone();
        let name = BlockKind::Binding.handler_name();
        self.slot(handler, Some(name), block, visitor::walk_binding_block)
    }
    fn visit_dataflow_block_(&mut self, block: &BindingBlock) -> Result<()> {
        let handler = self.handlers.visit_dataflow_block_.clone();
        let name = BlockKind::Dataflow.handler_name();
        self.slot(handler, Some(name), block, visitor::walk_binding_block)
    }

    fn visit_var_def(&mut self, var: &Var) -> Result<()> {
        let handler = self.handlers.visit_var_def.clone();
        self.slot(handler, None, var, visitor::dispatch_var_def)
    }
    fn visit_var_def_(&mut self, var: &Var) -> Result<()> {
        let handler = self.handlers.visit_var_def_.clone();
        let name = VarDefKind::Var.handler_name();
        self.slot(handler, Some(name), var, visitor::walk_var_def)
    }
    fn visit_dataflow_var_def_(&mut self, var: &Var) -> Result<()> {
        let handler = self.handlers.visit_dataflow_var_def_.clone();
        let name = VarDefKind::DataflowVar.handler_name();
        self.slot(handler, Some(name), var, visitor::walk_var_def)
    }

    fn visit_type(&mut self, struct_info: &StructInfo) -> Result<()> {
        match self.handlers.visit_type.clone() {
            Some(f) => f(self, struct_info),
            None => Ok(()),
        }
    }
    fn visit_span(&mut self, span: &Span) -> Result<()> {
        match self.handlers.visit_span.clone() {
            Some(f) => f(self, span),
            None => Ok(()),
        }
    }
}

/// Handler table for a [ComposedMutator].
///
/// Every expression kind takes either a handler, which replaces the default
/// walk, or a post-order hook, which runs on the node after the default walk
/// rebuilt it from its visited children.
pub struct MutatorHandlers<S> {
    visit_expr: Option<MutateFn<S, Expr, Expr>>,
    exprs: [Option<MutateFn<S, Expr, Expr>>; ExprKind::COUNT],
    post_orders: [Option<MutateFn<S, Expr, Expr>>; ExprKind::COUNT],
    visit_binding: Option<MutateFn<S, Binding, ()>>,
    visit_var_binding_: Option<MutateFn<S, VarBinding, ()>>,
    visit_match_cast_: Option<MutateFn<S, MatchCast, ()>>,
    visit_binding_block: Option<MutateFn<S, BindingBlock, BindingBlock>>,
    visit_binding_block_: Option<MutateFn<S, BindingBlock, BindingBlock>>,
    visit_dataflow_block_: Option<MutateFn<S, BindingBlock, BindingBlock>>,
    visit_var_def: Option<MutateFn<S, Var, Var>>,
    visit_var_def_: Option<MutateFn<S, Var, Var>>,
    visit_dataflow_var_def_: Option<MutateFn<S, Var, Var>>,
    visit_type: Option<MutateFn<S, StructInfo, StructInfo>>,
    visit_span: Option<MutateFn<S, Span, ()>>,
    strict: bool,
}

impl<S> Default for MutatorHandlers<S> {
    fn default() -> Self {
        MutatorHandlers {
            visit_expr: None,
            exprs: empty_table(),
            post_orders: empty_table(),
            visit_binding: None,
            visit_var_binding_: None,
            visit_match_cast_: None,
            visit_binding_block: None,
            visit_binding_block_: None,
            visit_dataflow_block_: None,
            visit_var_def: None,
            visit_var_def_: None,
            visit_dataflow_var_def_: None,
            visit_type: None,
            visit_span: None,
            strict: false,
        }
    }
}

impl<S> MutatorHandlers<S> {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn visit_expr<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ComposedMutator<S>, &Expr) -> Result<Expr> + 'static,
    {
        self.visit_expr = Some(Rc::new(f));
        self
    }
    pub fn visit<F>(mut self, kind: ExprKind, f: F) -> Self
    where
        F: Fn(&mut ComposedMutator<S>, &Expr) -> Result<Expr> + 'static,
    {
        self.exprs[kind.index()] = Some(Rc::new(f));
        self
    }
    /// Hook called with the node of `kind` after its children were rewritten.
    pub fn rewrite_post_order<F>(mut self, kind: ExprKind, f: F) -> Self
    where
        F: Fn(&mut ComposedMutator<S>, &Expr) -> Result<Expr> + 'static,
    {
        self.post_orders[kind.index()] = Some(Rc::new(f));
        self
    }
    pub fn visit_binding<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ComposedMutator<S>, &Binding) -> Result<()> + 'static,
    {
        self.visit_binding = Some(Rc::new(f));
        self
    }
    pub fn visit_var_binding_<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ComposedMutator<S>, &VarBinding) -> Result<()> + 'static,
    {
        self.visit_var_binding_ = Some(Rc::new(f));
        self
    }
    pub fn visit_match_cast_<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ComposedMutator<S>, &MatchCast) -> Result<()> + 'static,
    {
        self.visit_match_cast_ = Some(Rc::new(f));
        self
    }
    pub fn visit_binding_block<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ComposedMutator<S>, &BindingBlock) -> Result<BindingBlock> + 'static,
    {
        self.visit_binding_block = Some(Rc::new(f));
        self
    }
    pub fn visit_binding_block_<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ComposedMutator<S>, &BindingBlock) -> Result<BindingBlock> + 'static,
    {
        self.visit_binding_block_ = Some(Rc::new(f));
        self
    }
    pub fn visit_dataflow_block_<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ComposedMutator<S>, &BindingBlock) -> Result<BindingBlock> + 'static,
    {
        self.visit_dataflow_block_ = Some(Rc::new(f));
        self
    }
    pub fn visit_var_def<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ComposedMutator<S>, &Var) -> Result<Var> + 'static,
    {
        self.visit_var_def = Some(Rc::new(f));
        self
    }
    pub fn visit_var_def_<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ComposedMutator<S>, &Var) -> Result<Var> + 'static,
    {
        self.visit_var_def_ = Some(Rc::new(f));
        self
    }
    pub fn visit_dataflow_var_def_<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ComposedMutator<S>, &Var) -> Result<Var> + 'static,
    {
        self.visit_dataflow_var_def_ = Some(Rc::new(f));
        self
    }
    pub fn visit_type<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ComposedMutator<S>, &StructInfo) -> Result<StructInfo> + 'static,
    {
        self.visit_type = Some(Rc::new(f));
        self
    }
    pub fn visit_span<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ComposedMutator<S>, &Span) -> Result<()> + 'static,
    {
        self.visit_span = Some(Rc::new(f));
        self
    }
    /// Fail on per-kind handlers that were not supplied instead of
    /// recursing. Post-order hooks still default to the identity.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }
    pub fn build(self, data: S) -> Result<ComposedMutator<S>> {
        self.build_with(data, MutatorState::new())
    }
    /// Build with a given state, for example one whose [BlockBuilder] knows
    /// the inference rules of the operators in use.
    pub fn build_with(self, data: S, state: MutatorState) -> Result<ComposedMutator<S>> {
        let mut slots = Vec::with_capacity(ExprKind::COUNT);
        for kind in ExprKind::ALL {
            let slot = match (&self.exprs[kind.index()], &self.post_orders[kind.index()]) {
                (Some(_), Some(_)) => anyhow::bail!(
                    "cannot supply both `{}` and `{}` for {kind}",
                    kind.handler_name(),
                    kind.post_order_name()
                ),
                (Some(f), None) => ExprSlot::Override(f.clone()),
                (None, Some(f)) => ExprSlot::PostOrder(f.clone()),
                (None, None) => ExprSlot::Unset,
            };
            slots.push(slot);
        }
        Ok(ComposedMutator {
            data,
            state,
            slots: Rc::new(slots),
            handlers: Rc::new(self),
        })
    }
}

/// What runs for one expression kind.
enum ExprSlot<S> {
    Unset,
    Override(MutateFn<S, Expr, Expr>),
    PostOrder(MutateFn<S, Expr, Expr>),
}

impl<S> Clone for ExprSlot<S> {
    fn clone(&self) -> Self {
        match self {
            ExprSlot::Unset => ExprSlot::Unset,
            ExprSlot::Override(f) => ExprSlot::Override(f.clone()),
            ExprSlot::PostOrder(f) => ExprSlot::PostOrder(f.clone()),
        }
    }
}

/// Mutator running the handlers of a [MutatorHandlers] table.
pub struct ComposedMutator<S> {
    pub data: S,
    state: MutatorState,
    slots: Rc<Vec<ExprSlot<S>>>,
    handlers: Rc<MutatorHandlers<S>>,
}

impl<S> ComposedMutator<S> {
    pub fn into_data(self) -> S {
        self.data
    }
    fn expr_slot<T>(
        &mut self,
        kind: ExprKind,
        op: &T,
        default: fn(&mut Self, &T) -> Result<Expr>,
    ) -> Result<Expr>
    where
        T: Clone + Into<Expr>,
    {
        match self.slots[kind.index()].clone() {
            ExprSlot::Override(f) => f(self, &op.clone().into()),
            ExprSlot::PostOrder(f) => {
                let rebuilt = default(self, op)?;
                let rebuilt = self.builder().normalize(&rebuilt)?;
                f(self, &rebuilt)
            }
            ExprSlot::Unset if self.handlers.strict => {
                Err(unimplemented_handler(kind.handler_name()))
            }
            ExprSlot::Unset => default(self, op),
        }
    }
    fn slot<T, R>(
        &mut self,
        handler: Option<MutateFn<S, T, R>>,
        handler_name: Option<&str>,
        node: &T,
        default: fn(&mut Self, &T) -> Result<R>,
    ) -> Result<R> {
        match (handler, handler_name) {
            (Some(f), _) => f(self, node),
            (None, Some(name)) if self.handlers.strict => Err(unimplemented_handler(name)),
            (None, _) => default(self, node),
        }
    }
}

fn dispatch_and_normalize<S>(mutator: &mut ComposedMutator<S>, expr: &Expr) -> Result<Expr> {
    let new_expr = mutator::dispatch_expr(mutator, expr)?;
    mutator.builder().normalize(&new_expr)
}

impl<S> ExprMutator for ComposedMutator<S> {
    fn state(&mut self) -> &mut MutatorState {
        &mut self.state
    }
    fn builder(&mut self) -> &mut BlockBuilder {
        &mut self.state.builder
    }
    fn visit_expr(&mut self, expr: &Expr) -> Result<Expr> {
        let handler = self.handlers.visit_expr.clone();
        self.slot(handler, None, expr, dispatch_and_normalize)
    }

    fn visit_constant_(&mut self, op: &Constant) -> Result<Expr> {
        self.expr_slot(ExprKind::Constant, op, mutator::walk_constant)
    }
    fn visit_tuple_(&mut self, op: &Tuple) -> Result<Expr> {
        self.expr_slot(ExprKind::Tuple, op, mutator::walk_tuple)
    }
    fn visit_var_(&mut self, op: &Var) -> Result<Expr> {
        self.expr_slot(ExprKind::Var, op, mutator::walk_var)
    }
    fn visit_dataflow_var_(&mut self, op: &Var) -> Result<Expr> {
        self.expr_slot(ExprKind::DataflowVar, op, mutator::walk_var)
    }
    fn visit_shape_expr_(&mut self, op: &ShapeExpr) -> Result<Expr> {
        self.expr_slot(ExprKind::ShapeExpr, op, mutator::walk_shape_expr)
    }
    fn visit_runtime_dep_shape_(&mut self, op: &RuntimeDepShape) -> Result<Expr> {
        self.expr_slot(ExprKind::RuntimeDepShape, op, mutator::walk_runtime_dep_shape)
    }
    fn visit_extern_func_(&mut self, op: &ExternFunc) -> Result<Expr> {
        self.expr_slot(ExprKind::ExternFunc, op, mutator::walk_extern_func)
    }
    fn visit_global_var_(&mut self, op: &GlobalVar) -> Result<Expr> {
        self.expr_slot(ExprKind::GlobalVar, op, mutator::walk_global_var)
    }
    fn visit_function_(&mut self, op: &Function) -> Result<Expr> {
        self.expr_slot(ExprKind::Function, op, mutator::walk_function)
    }
    fn visit_call_(&mut self, op: &Call) -> Result<Expr> {
        self.expr_slot(ExprKind::Call, op, mutator::walk_call)
    }
    fn visit_seq_expr_(&mut self, op: &SeqExpr) -> Result<Expr> {
        self.expr_slot(ExprKind::SeqExpr, op, mutator::walk_seq_expr)
    }
    fn visit_if_(&mut self, op: &If) -> Result<Expr> {
        self.expr_slot(ExprKind::If, op, mutator::walk_if)
    }
    fn visit_op_(&mut self, op: &Op) -> Result<Expr> {
        self.expr_slot(ExprKind::Op, op, mutator::walk_op)
    }
    fn visit_tuple_getitem_(&mut self, op: &TupleGetItem) -> Result<Expr> {
        self.expr_slot(ExprKind::TupleGetItem, op, mutator::walk_tuple_getitem)
    }
    fn visit_prim_value_(&mut self, op: &PrimValue) -> Result<Expr> {
        self.expr_slot(ExprKind::PrimValue, op, mutator::walk_prim_value)
    }
    fn visit_string_imm_(&mut self, op: &StringImm) -> Result<Expr> {
        self.expr_slot(ExprKind::StringImm, op, mutator::walk_string_imm)
    }
    fn visit_data_type_imm_(&mut self, op: &DataTypeImm) -> Result<Expr> {
        self.expr_slot(ExprKind::DataTypeImm, op, mutator::walk_data_type_imm)
    }

    fn visit_binding(&mut self, binding: &Binding) -> Result<()> {
        let handler = self.handlers.visit_binding.clone();
        self.slot(handler, None, binding, mutator::dispatch_binding)
    }
    fn visit_var_binding_(&mut self, binding: &VarBinding) -> Result<()> {
        let handler = self.handlers.visit_var_binding_.clone();
        let name = BindingKind::VarBinding.handler_name();
        self.slot(handler, Some(name), binding, mutator::walk_var_binding)
    }
    fn visit_match_cast_(&mut self, binding: &MatchCast) -> Result<()> {
        let handler = self.handlers.visit_match_cast_.clone();
        let name = BindingKind::MatchCast.handler_name();
        self.slot(handler, Some(name), binding, mutator::walk_match_cast)
    }

    fn visit_binding_block(&mut self, block: &BindingBlock) -> Result<BindingBlock> {
        let handler = self.handlers.visit_binding_block.clone();
        self.slot(handler, None, block, mutator::dispatch_binding_block)
    }
    fn visit_binding_block_(&mut self, block: &BindingBlock) -> Result<BindingBlock> {
        let handler = self.handlers.visit_binding_block_.clone();
        let name = BlockKind::Binding.handler_name();
        self.slot(handler, Some(name), block, mutator::walk_binding_block)
    }
    fn visit_dataflow_block_(&mut self, block: &BindingBlock) -> Result<BindingBlock> {
        let handler = self.handlers.visit_dataflow_block_.clone();
        let name = BlockKind::Dataflow.handler_name();
        self.slot(handler, Some(name), block, mutator::walk_dataflow_block)
    }

    fn visit_var_def(&mut self, var: &Var) -> Result<Var> {
        let handler = self.handlers.visit_var_def.clone();
        self.slot(handler, None, var, mutator::dispatch_var_def)
    }
    fn visit_var_def_(&mut self, var: &Var) -> Result<Var> {
        let handler = self.handlers.visit_var_def_.clone();
        let name = VarDefKind::Var.handler_name();
        self.slot(handler, Some(name), var, mutator::walk_var_def)
    }
    fn visit_dataflow_var_def_(&mut self, var: &Var) -> Result<Var> {
        let handler = self.handlers.visit_dataflow_var_def_.clone();
        let name = VarDefKind::DataflowVar.handler_name();
        self.slot(handler, Some(name), var, mutator::walk_var_def)
    }

    fn visit_type(&mut self, struct_info: &StructInfo) -> Result<StructInfo> {
        match self.handlers.visit_type.clone() {
            Some(f) => f(self, struct_info),
            None => Ok(struct_info.clone()),
        }
    }
    fn visit_span(&mut self, span: &Span) -> Result<()> {
        match self.handlers.visit_span.clone() {
            Some(f) => f(self, span),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::DataType;
    use crate::ir::Literal;

    #[test]
    fn test_override_and_post_order_conflict() {
        let err = MutatorHandlers::<()>::new()
            .visit(ExprKind::Call, |m, expr| mutator::default_visit(m, expr))
            .rewrite_post_order(ExprKind::Call, |_, expr| Ok(expr.clone()))
            .build(())
            .err()
            .unwrap();
        assert_eq!(
            err.to_string(),
            "cannot supply both `visit_call_` and `rewrite_call_post_order` for Call"
        );
    }

    #[test]
    fn test_strict_visitor() {
        let constant: Expr = Constant::scalar(Literal::Int(1), DataType::int64()).into();
        let tuple: Expr = Tuple::new(vec![constant]).into();
        let mut visitor = VisitorHandlers::new()
            .visit(ExprKind::Tuple, |v, expr| visitor::default_visit(v, expr))
            .strict()
            .build(())
            .unwrap();
        let err = visitor.visit_expr(&tuple).unwrap_err();
        assert_eq!(err.to_string(), "handler `visit_constant_` is not implemented");
    }

    #[test]
    fn test_strict_mutator_keeps_identity_post_order() {
        let constant: Expr = Constant::scalar(Literal::Int(1), DataType::int64()).into();
        let mut mutator = MutatorHandlers::<i32>::new()
            .rewrite_post_order(ExprKind::Constant, |m, expr| {
                m.data += 1;
                Ok(expr.clone())
            })
            .strict()
            .build(0)
            .unwrap();
        let result = mutator.visit_expr(&constant).unwrap();
        assert!(result.same_as(&constant));
        assert_eq!(mutator.into_data(), 1);
    }

    #[test]
    fn test_mutator_sees_spans() {
        let span = Span::new("model.py", 3, 7);
        let constant = Constant::scalar(Literal::Int(1), DataType::int64());
        let constant: Expr = constant.with_span(Some(span.clone())).into();
        let tuple: Expr = crate::ir::Tuple::new(vec![constant]).into();
        let mut mutator = MutatorHandlers::<Vec<Span>>::new()
            .visit_span(|m, span| {
                m.data.push(span.clone());
                Ok(())
            })
            .build(vec![])
            .unwrap();
        mutator.visit_expr(&tuple).unwrap();
        assert_eq!(mutator.into_data(), vec![span]);
    }
}
