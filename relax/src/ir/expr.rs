use crate::functor::ExprKind;
use crate::ir::Attrs;
use crate::ir::BindingBlock;
use crate::ir::DataType;
use crate::ir::Id;
use crate::ir::PrimExpr;
use crate::ir::Printer;
use crate::ir::Span;
use crate::ir::StructInfo;
use crate::ir::UNKNOWN_NDIM;
use anyhow::Result;
use std::fmt;
use std::fmt::Display;
use std::ops::Deref;
use std::sync::Arc;

/// Expression of the IR.
///
/// A closed set of node kinds. `Var` covers both variables and dataflow
/// variables; [Expr::kind] tells them apart.
#[derive(Clone, Debug)]
pub enum Expr {
    Constant(Constant),
    Tuple(Tuple),
    Var(Var),
    ShapeExpr(ShapeExpr),
    RuntimeDepShape(RuntimeDepShape),
    ExternFunc(ExternFunc),
    GlobalVar(GlobalVar),
    Function(Function),
    Call(Call),
    SeqExpr(SeqExpr),
    If(If),
    Op(Op),
    TupleGetItem(TupleGetItem),
    PrimValue(PrimValue),
    StringImm(StringImm),
    DataTypeImm(DataTypeImm),
}

/// Declare a cheap, immutable handle to a node.
macro_rules! node_handle {
    ($(#[$meta:meta])* $handle:ident, $node:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug)]
        pub struct $handle(Arc<$node>);

        impl $handle {
            fn from_node(node: $node) -> $handle {
                $handle(Arc::new(node))
            }
            fn into_node(self) -> $node {
                Arc::try_unwrap(self.0).unwrap_or_else(|node| (*node).clone())
            }
            /// Whether both handles refer to the same node.
            pub fn same_as(&self, other: &$handle) -> bool {
                Arc::ptr_eq(&self.0, &other.0)
            }
            pub fn with_span(self, span: Option<Span>) -> $handle {
                let mut node = self.into_node();
                node.span = span;
                $handle::from_node(node)
            }
            pub fn with_struct_info(self, struct_info: StructInfo) -> $handle {
                let mut node = self.into_node();
                node.struct_info = Some(struct_info);
                $handle::from_node(node)
            }
        }

        impl Deref for $handle {
            type Target = $node;
            fn deref(&self) -> &$node {
                &self.0
            }
        }

        impl From<$handle> for Expr {
            fn from(handle: $handle) -> Expr {
                Expr::$handle(handle)
            }
        }
    };
}

/// Run `$body` with `$node` bound to the handle inside any variant.
macro_rules! each_node {
    ($expr:expr, $node:ident => $body:expr) => {
        match $expr {
            Expr::Constant($node) => $body,
            Expr::Tuple($node) => $body,
            Expr::Var($node) => $body,
            Expr::ShapeExpr($node) => $body,
            Expr::RuntimeDepShape($node) => $body,
            Expr::ExternFunc($node) => $body,
            Expr::GlobalVar($node) => $body,
            Expr::Function($node) => $body,
            Expr::Call($node) => $body,
            Expr::SeqExpr($node) => $body,
            Expr::If($node) => $body,
            Expr::Op($node) => $body,
            Expr::TupleGetItem($node) => $body,
            Expr::PrimValue($node) => $body,
            Expr::StringImm($node) => $body,
            Expr::DataTypeImm($node) => $body,
        }
    };
}

impl Expr {
    pub fn kind(&self) -> ExprKind {
        match self {
            Expr::Constant(_) => ExprKind::Constant,
            Expr::Tuple(_) => ExprKind::Tuple,
            Expr::Var(var) if var.is_dataflow() => ExprKind::DataflowVar,
            Expr::Var(_) => ExprKind::Var,
            Expr::ShapeExpr(_) => ExprKind::ShapeExpr,
            Expr::RuntimeDepShape(_) => ExprKind::RuntimeDepShape,
            Expr::ExternFunc(_) => ExprKind::ExternFunc,
            Expr::GlobalVar(_) => ExprKind::GlobalVar,
            Expr::Function(_) => ExprKind::Function,
            Expr::Call(_) => ExprKind::Call,
            Expr::SeqExpr(_) => ExprKind::SeqExpr,
            Expr::If(_) => ExprKind::If,
            Expr::Op(_) => ExprKind::Op,
            Expr::TupleGetItem(_) => ExprKind::TupleGetItem,
            Expr::PrimValue(_) => ExprKind::PrimValue,
            Expr::StringImm(_) => ExprKind::StringImm,
            Expr::DataTypeImm(_) => ExprKind::DataTypeImm,
        }
    }
    pub fn span(&self) -> Option<&Span> {
        each_node!(self, node => node.span.as_ref())
    }
    pub fn struct_info(&self) -> Option<&StructInfo> {
        each_node!(self, node => node.struct_info.as_ref())
    }
    fn node_ptr(&self) -> *const () {
        each_node!(self, node => Arc::as_ptr(&node.0) as *const ())
    }
    /// Whether both expressions are the same node (not merely equal).
    pub fn same_as(&self, other: &Expr) -> bool {
        std::ptr::eq(self.node_ptr(), other.node_ptr())
    }
    /// Copy of this expression carrying `struct_info`.
    ///
    /// For variables the copy keeps the [Id], so it still denotes the same
    /// binding.
    pub fn with_struct_info(&self, struct_info: StructInfo) -> Expr {
        each_node!(self.clone(), node => node.with_struct_info(struct_info).into())
    }
    pub fn as_var(&self) -> Option<&Var> {
        match self {
            Expr::Var(var) => Some(var),
            _ => None,
        }
    }
    pub fn as_call(&self) -> Option<&Call> {
        match self {
            Expr::Call(call) => Some(call),
            _ => None,
        }
    }
    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Expr::Function(func) => Some(func),
            _ => None,
        }
    }
    pub fn as_seq_expr(&self) -> Option<&SeqExpr> {
        match self {
            Expr::SeqExpr(seq) => Some(seq),
            _ => None,
        }
    }
    pub fn as_tuple(&self) -> Option<&Tuple> {
        match self {
            Expr::Tuple(tuple) => Some(tuple),
            _ => None,
        }
    }
    pub fn as_if(&self) -> Option<&If> {
        match self {
            Expr::If(node) => Some(node),
            _ => None,
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = Printer::new().print(self).map_err(|_| fmt::Error)?;
        write!(f, "{text}")
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bool(value) => write!(f, "{value}"),
            Literal::Int(value) => write!(f, "{value}"),
            Literal::Float(value) => write!(f, "{value:?}"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConstantNode {
    /// Elements in row-major order.
    pub values: Vec<Literal>,
    pub shape: Vec<i64>,
    pub dtype: DataType,
    pub span: Option<Span>,
    pub struct_info: Option<StructInfo>,
}

node_handle!(
    /// Constant tensor; a scalar is a tensor of rank zero.
    Constant,
    ConstantNode
);

impl Constant {
    pub fn scalar(value: Literal, dtype: DataType) -> Constant {
        Constant::from_node(ConstantNode {
            values: vec![value],
            shape: vec![],
            dtype,
            span: None,
            struct_info: Some(StructInfo::tensor(vec![], dtype)),
        })
    }
    pub fn tensor(values: Vec<Literal>, shape: Vec<i64>, dtype: DataType) -> Result<Constant> {
        let expected: i64 = shape.iter().product();
        if expected != values.len() as i64 {
            return Err(anyhow::anyhow!(
                "constant of shape {shape:?} needs {expected} values, got {}",
                values.len()
            ));
        }
        let dims = shape.iter().map(|dim| PrimExpr::Int(*dim)).collect();
        Ok(Constant::from_node(ConstantNode {
            values,
            shape,
            dtype,
            span: None,
            struct_info: Some(StructInfo::tensor(dims, dtype)),
        }))
    }
}

#[derive(Clone, Debug)]
pub struct TupleNode {
    pub fields: Vec<Expr>,
    pub span: Option<Span>,
    pub struct_info: Option<StructInfo>,
}

node_handle!(Tuple, TupleNode);

impl Tuple {
    pub fn new(fields: Vec<Expr>) -> Tuple {
        let struct_info = fields
            .iter()
            .map(|field| field.struct_info().cloned())
            .collect::<Option<Vec<StructInfo>>>()
            .map(StructInfo::Tuple);
        Tuple::from_node(TupleNode {
            fields,
            span: None,
            struct_info,
        })
    }
}

#[derive(Clone, Debug)]
pub struct VarNode {
    pub vid: Id,
    /// Whether this is a dataflow variable, local to its dataflow block.
    pub dataflow: bool,
    pub span: Option<Span>,
    pub struct_info: Option<StructInfo>,
}

node_handle!(
    /// Variable, either a regular one or a dataflow variable.
    ///
    /// Every use of a variable shares the node of its definition; rewrites
    /// that change the struct info create a new node with the same [Id].
    Var,
    VarNode
);

impl Var {
    pub fn new(name_hint: &str, struct_info: Option<StructInfo>) -> Var {
        Var::with_id(Id::fresh(name_hint), struct_info, false)
    }
    pub fn dataflow(name_hint: &str, struct_info: Option<StructInfo>) -> Var {
        Var::with_id(Id::fresh(name_hint), struct_info, true)
    }
    pub fn with_id(vid: Id, struct_info: Option<StructInfo>, dataflow: bool) -> Var {
        Var::from_node(VarNode {
            vid,
            dataflow,
            span: None,
            struct_info,
        })
    }
    pub fn name_hint(&self) -> &str {
        self.vid.name_hint()
    }
    pub fn is_dataflow(&self) -> bool {
        self.dataflow
    }
}

impl Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.name_hint())
    }
}

#[derive(Clone, Debug)]
pub struct ShapeExprNode {
    pub values: Vec<PrimExpr>,
    pub span: Option<Span>,
    pub struct_info: Option<StructInfo>,
}

node_handle!(ShapeExpr, ShapeExprNode);

impl ShapeExpr {
    pub fn new(values: Vec<PrimExpr>) -> ShapeExpr {
        let struct_info = Some(StructInfo::shape(values.clone()));
        ShapeExpr::from_node(ShapeExprNode {
            values,
            span: None,
            struct_info,
        })
    }
}

#[derive(Clone, Debug)]
pub struct RuntimeDepShapeNode {
    pub span: Option<Span>,
    pub struct_info: Option<StructInfo>,
}

node_handle!(
    /// Shape that is only known once the program runs.
    RuntimeDepShape,
    RuntimeDepShapeNode
);

impl RuntimeDepShape {
    pub fn new() -> RuntimeDepShape {
        RuntimeDepShape::from_node(RuntimeDepShapeNode {
            span: None,
            struct_info: Some(StructInfo::Shape {
                values: None,
                ndim: UNKNOWN_NDIM,
            }),
        })
    }
}

impl Default for RuntimeDepShape {
    fn default() -> Self {
        RuntimeDepShape::new()
    }
}

#[derive(Clone, Debug)]
pub struct ExternFuncNode {
    pub global_symbol: String,
    pub span: Option<Span>,
    pub struct_info: Option<StructInfo>,
}

node_handle!(ExternFunc, ExternFuncNode);

impl ExternFunc {
    pub fn new(global_symbol: &str) -> ExternFunc {
        ExternFunc::from_node(ExternFuncNode {
            global_symbol: global_symbol.to_string(),
            span: None,
            struct_info: Some(StructInfo::opaque_func(StructInfo::Object)),
        })
    }
}

#[derive(Clone, Debug)]
pub struct GlobalVarNode {
    pub name_hint: String,
    pub span: Option<Span>,
    pub struct_info: Option<StructInfo>,
}

node_handle!(
    /// Reference to a function of the enclosing [IRModule](crate::ir::IRModule).
    GlobalVar,
    GlobalVarNode
);

impl GlobalVar {
    pub fn new(name_hint: &str) -> GlobalVar {
        GlobalVar::from_node(GlobalVarNode {
            name_hint: name_hint.to_string(),
            span: None,
            struct_info: None,
        })
    }
}

#[derive(Clone, Debug)]
pub struct FunctionNode {
    pub params: Vec<Var>,
    pub body: Expr,
    pub ret_struct_info: StructInfo,
    pub attrs: Attrs,
    pub span: Option<Span>,
    pub struct_info: Option<StructInfo>,
}

node_handle!(Function, FunctionNode);

impl Function {
    /// Create a function. Without `ret_struct_info` the return struct info
    /// is taken from the body.
    pub fn new(params: Vec<Var>, body: Expr, ret_struct_info: Option<StructInfo>) -> Function {
        Function::with_attrs(params, body, ret_struct_info, Attrs::new())
    }
    pub fn with_attrs(
        params: Vec<Var>,
        body: Expr,
        ret_struct_info: Option<StructInfo>,
        attrs: Attrs,
    ) -> Function {
        let ret_struct_info = ret_struct_info
            .or_else(|| body.struct_info().cloned())
            .unwrap_or(StructInfo::Object);
        let param_struct_info = params
            .iter()
            .map(|param| param.struct_info.clone().unwrap_or(StructInfo::Object))
            .collect();
        let struct_info = StructInfo::func(param_struct_info, ret_struct_info.clone());
        Function::from_node(FunctionNode {
            params,
            body,
            ret_struct_info,
            attrs,
            span: None,
            struct_info: Some(struct_info),
        })
    }
}

impl Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Expr::Function(self.clone()))
    }
}

#[derive(Clone, Debug)]
pub struct CallNode {
    pub op: Expr,
    pub args: Vec<Expr>,
    pub attrs: Option<Attrs>,
    /// Struct info arguments for operators whose result cannot be deduced
    /// from the arguments alone.
    pub sinfo_args: Vec<StructInfo>,
    pub span: Option<Span>,
    pub struct_info: Option<StructInfo>,
}

node_handle!(Call, CallNode);

impl Call {
    pub fn new(op: impl Into<Expr>, args: Vec<Expr>) -> Call {
        Call::with_attrs(op, args, None, vec![])
    }
    pub fn with_attrs(
        op: impl Into<Expr>,
        args: Vec<Expr>,
        attrs: Option<Attrs>,
        sinfo_args: Vec<StructInfo>,
    ) -> Call {
        Call::from_node(CallNode {
            op: op.into(),
            args,
            attrs,
            sinfo_args,
            span: None,
            struct_info: None,
        })
    }
    /// Whether the callee is the operator called `name`.
    pub fn is_op(&self, name: &str) -> bool {
        matches!(&self.op, Expr::Op(op) if op.name == name)
    }
}

impl Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Expr::Call(self.clone()))
    }
}

#[derive(Clone, Debug)]
pub struct SeqExprNode {
    pub blocks: Vec<BindingBlock>,
    pub body: Expr,
    pub span: Option<Span>,
    pub struct_info: Option<StructInfo>,
}

node_handle!(
    /// Binding blocks followed by the expression they scope.
    SeqExpr,
    SeqExprNode
);

impl SeqExpr {
    pub fn new(blocks: Vec<BindingBlock>, body: Expr) -> SeqExpr {
        let struct_info = body.struct_info().cloned();
        SeqExpr::from_node(SeqExprNode {
            blocks,
            body,
            span: None,
            struct_info,
        })
    }
}

#[derive(Clone, Debug)]
pub struct IfNode {
    pub cond: Expr,
    pub true_branch: Expr,
    pub false_branch: Expr,
    pub span: Option<Span>,
    pub struct_info: Option<StructInfo>,
}

node_handle!(If, IfNode);

impl If {
    pub fn new(cond: Expr, true_branch: Expr, false_branch: Expr) -> If {
        If::from_node(IfNode {
            cond,
            true_branch,
            false_branch,
            span: None,
            struct_info: None,
        })
    }
}

#[derive(Clone, Debug)]
pub struct OpNode {
    pub name: String,
    pub span: Option<Span>,
    pub struct_info: Option<StructInfo>,
}

node_handle!(
    /// Primitive operator such as `relax.add`.
    Op,
    OpNode
);

impl Op {
    pub fn new(name: &str) -> Op {
        Op::from_node(OpNode {
            name: name.to_string(),
            span: None,
            struct_info: None,
        })
    }
}

#[derive(Clone, Debug)]
pub struct TupleGetItemNode {
    pub tuple: Expr,
    pub index: usize,
    pub span: Option<Span>,
    pub struct_info: Option<StructInfo>,
}

node_handle!(TupleGetItem, TupleGetItemNode);

impl TupleGetItem {
    pub fn new(tuple: Expr, index: usize) -> TupleGetItem {
        let struct_info = match tuple.struct_info() {
            Some(StructInfo::Tuple(fields)) => fields.get(index).cloned(),
            _ => None,
        };
        TupleGetItem::from_node(TupleGetItemNode {
            tuple,
            index,
            span: None,
            struct_info,
        })
    }
}

#[derive(Clone, Debug)]
pub struct PrimValueNode {
    pub value: PrimExpr,
    pub dtype: DataType,
    pub span: Option<Span>,
    pub struct_info: Option<StructInfo>,
}

node_handle!(PrimValue, PrimValueNode);

impl PrimValue {
    pub fn new(value: PrimExpr, dtype: DataType) -> PrimValue {
        PrimValue::from_node(PrimValueNode {
            value,
            dtype,
            span: None,
            struct_info: Some(StructInfo::Prim(dtype)),
        })
    }
    pub fn int64(value: impl Into<PrimExpr>) -> PrimValue {
        PrimValue::new(value.into(), DataType::int64())
    }
}

#[derive(Clone, Debug)]
pub struct StringImmNode {
    pub value: String,
    pub span: Option<Span>,
    pub struct_info: Option<StructInfo>,
}

node_handle!(StringImm, StringImmNode);

impl StringImm {
    pub fn new(value: &str) -> StringImm {
        StringImm::from_node(StringImmNode {
            value: value.to_string(),
            span: None,
            struct_info: Some(StructInfo::Object),
        })
    }
}

#[derive(Clone, Debug)]
pub struct DataTypeImmNode {
    pub value: DataType,
    pub span: Option<Span>,
    pub struct_info: Option<StructInfo>,
}

node_handle!(DataTypeImm, DataTypeImmNode);

impl DataTypeImm {
    pub fn new(value: DataType) -> DataTypeImm {
        DataTypeImm::from_node(DataTypeImmNode {
            value,
            span: None,
            struct_info: Some(StructInfo::Object),
        })
    }
}

#[test]
fn test_kind_tells_dataflow_vars_apart() {
    let x: Expr = Var::new("x", None).into();
    let lv: Expr = Var::dataflow("lv", None).into();
    assert_eq!(x.kind(), ExprKind::Var);
    assert_eq!(lv.kind(), ExprKind::DataflowVar);
}

#[test]
fn test_with_struct_info_keeps_var_identity() {
    let x = Var::new("x", None);
    let expr: Expr = x.clone().into();
    let annotated = expr.with_struct_info(StructInfo::Object);
    assert!(!annotated.same_as(&expr));
    let annotated = annotated.as_var().unwrap();
    assert_eq!(annotated.vid, x.vid);
    assert_eq!(annotated.struct_info, Some(StructInfo::Object));
}

#[test]
fn test_derived_struct_info() {
    let scalar = Constant::scalar(Literal::Float(1.0), DataType::float32());
    let tuple = Tuple::new(vec![scalar.clone().into(), PrimValue::int64(2).into()]);
    let item = TupleGetItem::new(tuple.clone().into(), 1);
    assert_eq!(
        item.struct_info,
        Some(StructInfo::Prim(DataType::int64()))
    );
    let unknown = Tuple::new(vec![Var::new("x", None).into()]);
    assert!(unknown.struct_info.is_none());
    assert!(Constant::tensor(vec![Literal::Int(1)], vec![2], DataType::int64()).is_err());
}
