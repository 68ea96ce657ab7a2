use crate::functor::BindingKind;
use crate::functor::BlockKind;
use crate::ir::Expr;
use crate::ir::Printer;
use crate::ir::Span;
use crate::ir::StructInfo;
use crate::ir::Var;
use std::fmt;
use std::fmt::Display;
use std::ops::Deref;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct VarBindingNode {
    pub var: Var,
    pub value: Expr,
    pub span: Option<Span>,
}

/// `var = value`.
#[derive(Clone, Debug)]
pub struct VarBinding(Arc<VarBindingNode>);

impl VarBinding {
    pub fn new(var: Var, value: Expr) -> VarBinding {
        VarBinding(Arc::new(VarBindingNode {
            var,
            value,
            span: None,
        }))
    }
    pub fn with_span(self, span: Option<Span>) -> VarBinding {
        let mut node = Arc::try_unwrap(self.0).unwrap_or_else(|node| (*node).clone());
        node.span = span;
        VarBinding(Arc::new(node))
    }
    pub fn same_as(&self, other: &VarBinding) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for VarBinding {
    type Target = VarBindingNode;
    fn deref(&self) -> &VarBindingNode {
        &self.0
    }
}

#[derive(Clone, Debug)]
pub struct MatchCastNode {
    pub var: Var,
    pub value: Expr,
    /// Struct info that `value` is asserted to have when the program runs.
    pub struct_info: StructInfo,
    pub span: Option<Span>,
}

/// Bind `var` to `value` reinterpreted under `struct_info`.
///
/// The assertion is only checked at runtime. Symbolic variables that appear
/// in `struct_info` for the first time are defined by the match.
#[derive(Clone, Debug)]
pub struct MatchCast(Arc<MatchCastNode>);

impl MatchCast {
    pub fn new(var: Var, value: Expr, struct_info: StructInfo) -> MatchCast {
        MatchCast(Arc::new(MatchCastNode {
            var,
            value,
            struct_info,
            span: None,
        }))
    }
    pub fn with_span(self, span: Option<Span>) -> MatchCast {
        let mut node = Arc::try_unwrap(self.0).unwrap_or_else(|node| (*node).clone());
        node.span = span;
        MatchCast(Arc::new(node))
    }
    pub fn same_as(&self, other: &MatchCast) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for MatchCast {
    type Target = MatchCastNode;
    fn deref(&self) -> &MatchCastNode {
        &self.0
    }
}

#[derive(Clone, Debug)]
pub enum Binding {
    VarBinding(VarBinding),
    MatchCast(MatchCast),
}

impl Binding {
    pub fn kind(&self) -> BindingKind {
        match self {
            Binding::VarBinding(_) => BindingKind::VarBinding,
            Binding::MatchCast(_) => BindingKind::MatchCast,
        }
    }
    /// The variable defined by this binding.
    pub fn var(&self) -> &Var {
        match self {
            Binding::VarBinding(binding) => &binding.var,
            Binding::MatchCast(binding) => &binding.var,
        }
    }
    pub fn value(&self) -> &Expr {
        match self {
            Binding::VarBinding(binding) => &binding.value,
            Binding::MatchCast(binding) => &binding.value,
        }
    }
    pub fn span(&self) -> Option<&Span> {
        match self {
            Binding::VarBinding(binding) => binding.span.as_ref(),
            Binding::MatchCast(binding) => binding.span.as_ref(),
        }
    }
    pub fn same_as(&self, other: &Binding) -> bool {
        match (self, other) {
            (Binding::VarBinding(a), Binding::VarBinding(b)) => a.same_as(b),
            (Binding::MatchCast(a), Binding::MatchCast(b)) => a.same_as(b),
            _ => false,
        }
    }
}

impl From<VarBinding> for Binding {
    fn from(binding: VarBinding) -> Self {
        Binding::VarBinding(binding)
    }
}

impl From<MatchCast> for Binding {
    fn from(binding: MatchCast) -> Self {
        Binding::MatchCast(binding)
    }
}

impl Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = Printer::new().binding(self).map_err(|_| fmt::Error)?;
        write!(f, "{text}")
    }
}

#[derive(Clone, Debug)]
pub struct BindingBlockNode {
    pub bindings: Vec<Binding>,
    pub kind: BlockKind,
    pub span: Option<Span>,
}

/// Ordered list of bindings.
///
/// In a dataflow block every binding is free of side effects. Dataflow
/// variables defined in it are local to the block; the other variables it
/// binds are the block's outputs.
#[derive(Clone, Debug)]
pub struct BindingBlock(Arc<BindingBlockNode>);

impl BindingBlock {
    pub fn new(bindings: Vec<Binding>) -> BindingBlock {
        BindingBlock::with_kind(bindings, BlockKind::Binding)
    }
    pub fn dataflow(bindings: Vec<Binding>) -> BindingBlock {
        BindingBlock::with_kind(bindings, BlockKind::Dataflow)
    }
    pub fn with_kind(bindings: Vec<Binding>, kind: BlockKind) -> BindingBlock {
        BindingBlock(Arc::new(BindingBlockNode {
            bindings,
            kind,
            span: None,
        }))
    }
    pub fn with_span(self, span: Option<Span>) -> BindingBlock {
        let mut node = Arc::try_unwrap(self.0).unwrap_or_else(|node| (*node).clone());
        node.span = span;
        BindingBlock(Arc::new(node))
    }
    pub fn is_dataflow(&self) -> bool {
        self.kind == BlockKind::Dataflow
    }
    pub fn same_as(&self, other: &BindingBlock) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
    /// Variables of this block that are visible after it.
    pub fn outputs(&self) -> Vec<&Var> {
        self.bindings
            .iter()
            .map(|binding| binding.var())
            .filter(|var| !var.is_dataflow())
            .collect()
    }
}

impl Deref for BindingBlock {
    type Target = BindingBlockNode;
    fn deref(&self) -> &BindingBlockNode {
        &self.0
    }
}

impl Display for BindingBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = Printer::new().block(self).map_err(|_| fmt::Error)?;
        write!(f, "{text}")
    }
}

#[test]
fn test_outputs_skip_dataflow_vars() {
    let x = Var::new("x", None);
    let lv = Var::dataflow("lv", None);
    let gv = Var::new("gv", None);
    let block = BindingBlock::dataflow(vec![
        VarBinding::new(lv.clone(), x.clone().into()).into(),
        VarBinding::new(gv.clone(), lv.clone().into()).into(),
    ]);
    let outputs = block.outputs();
    assert_eq!(outputs.len(), 1);
    assert!(outputs[0].same_as(&gv));
}
