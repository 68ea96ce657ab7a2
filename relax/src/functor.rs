//! Node kinds and the generic dispatcher.
//!
//! Every traversal in this crate selects a handler by matching on the node's
//! enum tag. The match is exhaustive, so adding a node kind fails to compile
//! until every engine handles it.

use crate::ir::Call;
use crate::ir::Constant;
use crate::ir::DataTypeImm;
use crate::ir::Expr;
use crate::ir::ExternFunc;
use crate::ir::Function;
use crate::ir::GlobalVar;
use crate::ir::If;
use crate::ir::Op;
use crate::ir::PrimValue;
use crate::ir::RuntimeDepShape;
use crate::ir::SeqExpr;
use crate::ir::ShapeExpr;
use crate::ir::StringImm;
use crate::ir::Tuple;
use crate::ir::TupleGetItem;
use crate::ir::Var;
use anyhow::Result;
use std::fmt;
use std::fmt::Display;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExprKind {
    Constant,
    Tuple,
    Var,
    DataflowVar,
    ShapeExpr,
    RuntimeDepShape,
    ExternFunc,
    GlobalVar,
    Function,
    Call,
    SeqExpr,
    If,
    Op,
    TupleGetItem,
    PrimValue,
    StringImm,
    DataTypeImm,
}

impl ExprKind {
    pub const COUNT: usize = 17;
    pub const ALL: [ExprKind; ExprKind::COUNT] = [
        ExprKind::Constant,
        ExprKind::Tuple,
        ExprKind::Var,
        ExprKind::DataflowVar,
        ExprKind::ShapeExpr,
        ExprKind::RuntimeDepShape,
        ExprKind::ExternFunc,
        ExprKind::GlobalVar,
        ExprKind::Function,
        ExprKind::Call,
        ExprKind::SeqExpr,
        ExprKind::If,
        ExprKind::Op,
        ExprKind::TupleGetItem,
        ExprKind::PrimValue,
        ExprKind::StringImm,
        ExprKind::DataTypeImm,
    ];
    /// Position of this kind in [ExprKind::ALL], used to index handler tables.
    pub fn index(self) -> usize {
        self as usize
    }
    pub fn name(self) -> &'static str {
        match self {
            ExprKind::Constant => "Constant",
            ExprKind::Tuple => "Tuple",
            ExprKind::Var => "Var",
            ExprKind::DataflowVar => "DataflowVar",
            ExprKind::ShapeExpr => "ShapeExpr",
            ExprKind::RuntimeDepShape => "RuntimeDepShape",
            ExprKind::ExternFunc => "ExternFunc",
            ExprKind::GlobalVar => "GlobalVar",
            ExprKind::Function => "Function",
            ExprKind::Call => "Call",
            ExprKind::SeqExpr => "SeqExpr",
            ExprKind::If => "If",
            ExprKind::Op => "Op",
            ExprKind::TupleGetItem => "TupleGetItem",
            ExprKind::PrimValue => "PrimValue",
            ExprKind::StringImm => "StringImm",
            ExprKind::DataTypeImm => "DataTypeImm",
        }
    }
    /// Name of the per-kind handler, for example `visit_call_`.
    pub fn handler_name(self) -> &'static str {
        match self {
            ExprKind::Constant => "visit_constant_",
            ExprKind::Tuple => "visit_tuple_",
            ExprKind::Var => "visit_var_",
            ExprKind::DataflowVar => "visit_dataflow_var_",
            ExprKind::ShapeExpr => "visit_shape_expr_",
            ExprKind::RuntimeDepShape => "visit_runtime_dep_shape_",
            ExprKind::ExternFunc => "visit_extern_func_",
            ExprKind::GlobalVar => "visit_global_var_",
            ExprKind::Function => "visit_function_",
            ExprKind::Call => "visit_call_",
            ExprKind::SeqExpr => "visit_seq_expr_",
            ExprKind::If => "visit_if_",
            ExprKind::Op => "visit_op_",
            ExprKind::TupleGetItem => "visit_tuple_getitem_",
            ExprKind::PrimValue => "visit_prim_value_",
            ExprKind::StringImm => "visit_string_imm_",
            ExprKind::DataTypeImm => "visit_data_type_imm_",
        }
    }
    /// Name of the post-order rewrite hook, for example `rewrite_call_post_order`.
    pub fn post_order_name(self) -> &'static str {
        match self {
            ExprKind::Constant => "rewrite_constant_post_order",
            ExprKind::Tuple => "rewrite_tuple_post_order",
            ExprKind::Var => "rewrite_var_post_order",
            ExprKind::DataflowVar => "rewrite_dataflow_var_post_order",
            ExprKind::ShapeExpr => "rewrite_shape_expr_post_order",
            ExprKind::RuntimeDepShape => "rewrite_runtime_dep_shape_post_order",
            ExprKind::ExternFunc => "rewrite_extern_func_post_order",
            ExprKind::GlobalVar => "rewrite_global_var_post_order",
            ExprKind::Function => "rewrite_function_post_order",
            ExprKind::Call => "rewrite_call_post_order",
            ExprKind::SeqExpr => "rewrite_seq_expr_post_order",
            ExprKind::If => "rewrite_if_post_order",
            ExprKind::Op => "rewrite_op_post_order",
            ExprKind::TupleGetItem => "rewrite_tuple_getitem_post_order",
            ExprKind::PrimValue => "rewrite_prim_value_post_order",
            ExprKind::StringImm => "rewrite_string_imm_post_order",
            ExprKind::DataTypeImm => "rewrite_data_type_imm_post_order",
        }
    }
}

impl Display for ExprKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindingKind {
    VarBinding,
    MatchCast,
}

impl BindingKind {
    pub const COUNT: usize = 2;
    pub const ALL: [BindingKind; BindingKind::COUNT] =
        [BindingKind::VarBinding, BindingKind::MatchCast];
    pub fn handler_name(self) -> &'static str {
        match self {
            BindingKind::VarBinding => "visit_var_binding_",
            BindingKind::MatchCast => "visit_match_cast_",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Binding,
    Dataflow,
}

impl BlockKind {
    pub const COUNT: usize = 2;
    pub const ALL: [BlockKind; BlockKind::COUNT] = [BlockKind::Binding, BlockKind::Dataflow];
    pub fn handler_name(self) -> &'static str {
        match self {
            BlockKind::Binding => "visit_binding_block_",
            BlockKind::Dataflow => "visit_dataflow_block_",
        }
    }
}

/// Kind of a variable definition site (binding left-hand side or parameter).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VarDefKind {
    Var,
    DataflowVar,
}

impl VarDefKind {
    pub const COUNT: usize = 2;
    pub const ALL: [VarDefKind; VarDefKind::COUNT] = [VarDefKind::Var, VarDefKind::DataflowVar];
    pub fn of(var: &Var) -> VarDefKind {
        if var.is_dataflow() {
            VarDefKind::DataflowVar
        } else {
            VarDefKind::Var
        }
    }
    pub fn handler_name(self) -> &'static str {
        match self {
            VarDefKind::Var => "visit_var_def_",
            VarDefKind::DataflowVar => "visit_dataflow_var_def_",
        }
    }
}

/// Error raised when a handler is invoked that nobody supplied.
pub fn unimplemented_handler(handler_name: &str) -> anyhow::Error {
    anyhow::anyhow!("handler `{handler_name}` is not implemented")
}

/// Call `$visitor.visit_<kind>_(node)` for the kind of `$expr`.
macro_rules! match_expr_kind {
    ($visitor:ident, $expr:expr) => {
        match $expr {
            $crate::ir::Expr::Constant(op) => $visitor.visit_constant_(op),
            $crate::ir::Expr::Tuple(op) => $visitor.visit_tuple_(op),
            $crate::ir::Expr::Var(op) if op.is_dataflow() => $visitor.visit_dataflow_var_(op),
            $crate::ir::Expr::Var(op) => $visitor.visit_var_(op),
            $crate::ir::Expr::ShapeExpr(op) => $visitor.visit_shape_expr_(op),
            $crate::ir::Expr::RuntimeDepShape(op) => $visitor.visit_runtime_dep_shape_(op),
            $crate::ir::Expr::ExternFunc(op) => $visitor.visit_extern_func_(op),
            $crate::ir::Expr::GlobalVar(op) => $visitor.visit_global_var_(op),
            $crate::ir::Expr::Function(op) => $visitor.visit_function_(op),
            $crate::ir::Expr::Call(op) => $visitor.visit_call_(op),
            $crate::ir::Expr::SeqExpr(op) => $visitor.visit_seq_expr_(op),
            $crate::ir::Expr::If(op) => $visitor.visit_if_(op),
            $crate::ir::Expr::Op(op) => $visitor.visit_op_(op),
            $crate::ir::Expr::TupleGetItem(op) => $visitor.visit_tuple_getitem_(op),
            $crate::ir::Expr::PrimValue(op) => $visitor.visit_prim_value_(op),
            $crate::ir::Expr::StringImm(op) => $visitor.visit_string_imm_(op),
            $crate::ir::Expr::DataTypeImm(op) => $visitor.visit_data_type_imm_(op),
        }
    };
}

pub(crate) use match_expr_kind;

/// Functor over expressions with an arbitrary result type.
///
/// Unlike [ExprVisitor](crate::visitor::ExprVisitor) and
/// [ExprMutator](crate::mutator::ExprMutator), there is no sensible default
/// per kind: every handler that is reached must be implemented, otherwise
/// [ExprFunctor::visit_expr_default_] returns an error naming the handler.
pub trait ExprFunctor {
    type Output;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output> {
        dispatch_expr(self, expr)
    }
    fn visit_constant_(&mut self, _op: &Constant) -> Result<Self::Output> {
        self.visit_expr_default_(ExprKind::Constant)
    }
    fn visit_tuple_(&mut self, _op: &Tuple) -> Result<Self::Output> {
        self.visit_expr_default_(ExprKind::Tuple)
    }
    fn visit_var_(&mut self, _op: &Var) -> Result<Self::Output> {
        self.visit_expr_default_(ExprKind::Var)
    }
    fn visit_dataflow_var_(&mut self, _op: &Var) -> Result<Self::Output> {
        self.visit_expr_default_(ExprKind::DataflowVar)
    }
    fn visit_shape_expr_(&mut self, _op: &ShapeExpr) -> Result<Self::Output> {
        self.visit_expr_default_(ExprKind::ShapeExpr)
    }
    fn visit_runtime_dep_shape_(&mut self, _op: &RuntimeDepShape) -> Result<Self::Output> {
        self.visit_expr_default_(ExprKind::RuntimeDepShape)
    }
    fn visit_extern_func_(&mut self, _op: &ExternFunc) -> Result<Self::Output> {
        self.visit_expr_default_(ExprKind::ExternFunc)
    }
    fn visit_global_var_(&mut self, _op: &GlobalVar) -> Result<Self::Output> {
        self.visit_expr_default_(ExprKind::GlobalVar)
    }
    fn visit_function_(&mut self, _op: &Function) -> Result<Self::Output> {
        self.visit_expr_default_(ExprKind::Function)
    }
    fn visit_call_(&mut self, _op: &Call) -> Result<Self::Output> {
        self.visit_expr_default_(ExprKind::Call)
    }
    fn visit_seq_expr_(&mut self, _op: &SeqExpr) -> Result<Self::Output> {
        self.visit_expr_default_(ExprKind::SeqExpr)
    }
    fn visit_if_(&mut self, _op: &If) -> Result<Self::Output> {
        self.visit_expr_default_(ExprKind::If)
    }
    fn visit_op_(&mut self, _op: &Op) -> Result<Self::Output> {
        self.visit_expr_default_(ExprKind::Op)
    }
    fn visit_tuple_getitem_(&mut self, _op: &TupleGetItem) -> Result<Self::Output> {
        self.visit_expr_default_(ExprKind::TupleGetItem)
    }
    fn visit_prim_value_(&mut self, _op: &PrimValue) -> Result<Self::Output> {
        self.visit_expr_default_(ExprKind::PrimValue)
    }
    fn visit_string_imm_(&mut self, _op: &StringImm) -> Result<Self::Output> {
        self.visit_expr_default_(ExprKind::StringImm)
    }
    fn visit_data_type_imm_(&mut self, _op: &DataTypeImm) -> Result<Self::Output> {
        self.visit_expr_default_(ExprKind::DataTypeImm)
    }
    /// Fallback for handlers that were not implemented.
    fn visit_expr_default_(&mut self, kind: ExprKind) -> Result<Self::Output> {
        Err(unimplemented_handler(kind.handler_name()))
    }
}

/// Dispatch `expr` to the handler of its kind.
///
/// Implementations that override [ExprFunctor::visit_expr] use this to
/// continue with the regular dispatch.
pub fn dispatch_expr<F: ExprFunctor + ?Sized>(functor: &mut F, expr: &Expr) -> Result<F::Output> {
    match_expr_kind!(functor, expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::DataType;
    use crate::ir::Literal;

    struct CallCounter;

    impl ExprFunctor for CallCounter {
        type Output = usize;
        fn visit_call_(&mut self, op: &Call) -> Result<usize> {
            let mut count = 1;
            for arg in &op.args {
                count += self.visit_expr(arg)?;
            }
            Ok(count)
        }
        fn visit_var_(&mut self, _op: &Var) -> Result<usize> {
            Ok(0)
        }
    }

    #[test]
    fn test_kind_tables_are_consistent() {
        for (i, kind) in ExprKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
            assert!(kind.handler_name().starts_with("visit_"));
            assert!(kind.post_order_name().ends_with("_post_order"));
        }
    }

    #[test]
    fn test_missing_handler_is_an_error() {
        let x = Var::new("x", None);
        let inner = Call::new(Op::new("relax.neg"), vec![x.clone().into()]);
        let outer = Call::new(Op::new("relax.neg"), vec![inner.into()]);
        let count = CallCounter.visit_expr(&outer.into()).unwrap();
        assert_eq!(count, 2);

        let constant = Constant::scalar(Literal::Int(1), DataType::int64());
        let call = Call::new(Op::new("relax.neg"), vec![constant.into()]);
        let err = CallCounter.visit_expr(&call.into()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "handler `visit_constant_` is not implemented"
        );
    }
}
