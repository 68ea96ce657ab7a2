//! Intermediate representation (IR) for the dataflow dialect.
//!
//! Programs are [Function]s whose bodies are [SeqExpr]s: an ordered list of
//! [BindingBlock]s followed by a result expression. Nodes are immutable and
//! reference counted, so a rewrite creates new nodes while sharing every
//! subtree that did not change. Variables are identified by their [Id], not
//! by their name or by pointer.

mod attrs;
mod binding;
mod dtype;
mod expr;
mod id;
mod module;
mod prim_expr;
mod printer;
mod span;
mod struct_info;

pub use attrs::AttrValue;
pub use attrs::Attrs;
pub use binding::Binding;
pub use binding::BindingBlock;
pub use binding::BindingBlockNode;
pub use binding::MatchCast;
pub use binding::MatchCastNode;
pub use binding::VarBinding;
pub use binding::VarBindingNode;
pub use dtype::DataType;
pub use expr::Call;
pub use expr::CallNode;
pub use expr::Constant;
pub use expr::ConstantNode;
pub use expr::DataTypeImm;
pub use expr::DataTypeImmNode;
pub use expr::Expr;
pub use expr::ExternFunc;
pub use expr::ExternFuncNode;
pub use expr::Function;
pub use expr::FunctionNode;
pub use expr::GlobalVar;
pub use expr::GlobalVarNode;
pub use expr::If;
pub use expr::IfNode;
pub use expr::Literal;
pub use expr::Op;
pub use expr::OpNode;
pub use expr::PrimValue;
pub use expr::PrimValueNode;
pub use expr::RuntimeDepShape;
pub use expr::RuntimeDepShapeNode;
pub use expr::SeqExpr;
pub use expr::SeqExprNode;
pub use expr::ShapeExpr;
pub use expr::ShapeExprNode;
pub use expr::StringImm;
pub use expr::StringImmNode;
pub use expr::Tuple;
pub use expr::TupleGetItem;
pub use expr::TupleGetItemNode;
pub use expr::TupleNode;
pub use expr::Var;
pub use expr::VarNode;
pub use id::Id;
pub use module::IRModule;
pub use prim_expr::PrimExpr;
pub use prim_expr::SymVar;
pub use printer::Printer;
pub use span::Span;
pub use struct_info::StructInfo;
pub use struct_info::UNKNOWN_NDIM;

pub fn spaces(indent: i32) -> String {
    "  ".repeat(indent.max(0) as usize)
}

#[test]
fn test_spaces() {
    assert_eq!(spaces(0), "");
    assert_eq!(spaces(2), "    ");
    assert_eq!(spaces(-1), "");
}
