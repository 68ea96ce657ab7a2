use crate::ir::DataType;
use std::fmt;
use std::fmt::Display;
use std::hash::Hash;
use std::hash::Hasher;
use std::ops::Add;
use std::ops::Mul;
use std::ops::Sub;
use std::sync::Arc;

#[derive(Debug)]
pub struct SymVarNode {
    pub name: String,
    pub dtype: DataType,
}

/// Symbolic integer variable used in shapes, such as `n` in `Tensor([n, 4])`.
///
/// Symbolic variables are compared by identity: two variables named `n` are
/// different unless they are the same object.
#[derive(Clone, Debug)]
pub struct SymVar(Arc<SymVarNode>);

impl SymVar {
    pub fn new(name: &str, dtype: DataType) -> SymVar {
        SymVar(Arc::new(SymVarNode {
            name: name.to_string(),
            dtype,
        }))
    }
    pub fn int64(name: &str) -> SymVar {
        SymVar::new(name, DataType::int64())
    }
    pub fn name(&self) -> &str {
        &self.0.name
    }
    pub fn dtype(&self) -> DataType {
        self.0.dtype
    }
}

impl PartialEq for SymVar {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for SymVar {}

impl Hash for SymVar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

/// Integer arithmetic over literals and symbolic variables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PrimExpr {
    Int(i64),
    Var(SymVar),
    Add(Box<PrimExpr>, Box<PrimExpr>),
    Sub(Box<PrimExpr>, Box<PrimExpr>),
    Mul(Box<PrimExpr>, Box<PrimExpr>),
    FloorDiv(Box<PrimExpr>, Box<PrimExpr>),
    FloorMod(Box<PrimExpr>, Box<PrimExpr>),
}

impl PrimExpr {
    pub fn floordiv(self, rhs: impl Into<PrimExpr>) -> PrimExpr {
        PrimExpr::FloorDiv(Box::new(self), Box::new(rhs.into()))
    }
    pub fn floormod(self, rhs: impl Into<PrimExpr>) -> PrimExpr {
        PrimExpr::FloorMod(Box::new(self), Box::new(rhs.into()))
    }
    fn operands(&self) -> Option<(&PrimExpr, &PrimExpr, &'static str)> {
        match self {
            PrimExpr::Int(_) | PrimExpr::Var(_) => None,
            PrimExpr::Add(lhs, rhs) => Some((lhs, rhs, "+")),
            PrimExpr::Sub(lhs, rhs) => Some((lhs, rhs, "-")),
            PrimExpr::Mul(lhs, rhs) => Some((lhs, rhs, "*")),
            PrimExpr::FloorDiv(lhs, rhs) => Some((lhs, rhs, "//")),
            PrimExpr::FloorMod(lhs, rhs) => Some((lhs, rhs, "%")),
        }
    }
    /// Push every symbolic variable occurring in this expression to `out`.
    pub fn collect_sym_vars(&self, out: &mut Vec<SymVar>) {
        match self {
            PrimExpr::Int(_) => (),
            PrimExpr::Var(var) => {
                if !out.contains(var) {
                    out.push(var.clone());
                }
            }
            _ => {
                if let Some((lhs, rhs, _)) = self.operands() {
                    lhs.collect_sym_vars(out);
                    rhs.collect_sym_vars(out);
                }
            }
        }
    }
    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.operands().is_some() {
            write!(f, "({self})")
        } else {
            write!(f, "{self}")
        }
    }
}

impl From<i64> for PrimExpr {
    fn from(value: i64) -> Self {
        PrimExpr::Int(value)
    }
}

impl From<SymVar> for PrimExpr {
    fn from(var: SymVar) -> Self {
        PrimExpr::Var(var)
    }
}

impl From<&SymVar> for PrimExpr {
    fn from(var: &SymVar) -> Self {
        PrimExpr::Var(var.clone())
    }
}

macro_rules! binary_op {
    ($trait:ident, $method:ident, $variant:ident) => {
        impl $trait<PrimExpr> for PrimExpr {
            type Output = PrimExpr;
            fn $method(self, rhs: PrimExpr) -> PrimExpr {
                PrimExpr::$variant(Box::new(self), Box::new(rhs))
            }
        }

        impl $trait<i64> for PrimExpr {
            type Output = PrimExpr;
            fn $method(self, rhs: i64) -> PrimExpr {
                PrimExpr::$variant(Box::new(self), Box::new(PrimExpr::Int(rhs)))
            }
        }
    };
}

binary_op!(Add, add, Add);
binary_op!(Sub, sub, Sub);
binary_op!(Mul, mul, Mul);

impl Display for PrimExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimExpr::Int(value) => write!(f, "{value}"),
            PrimExpr::Var(var) => write!(f, "{}", var.name()),
            _ => match self.operands() {
                Some((lhs, rhs, op)) => {
                    lhs.fmt_operand(f)?;
                    write!(f, " {op} ")?;
                    rhs.fmt_operand(f)
                }
                None => Ok(()),
            },
        }
    }
}

#[test]
fn test_display_nests_with_parentheses() {
    let n = SymVar::int64("n");
    let expr = (PrimExpr::from(&n) + 1) * 2;
    assert_eq!(expr.to_string(), "(n + 1) * 2");
    assert_eq!(PrimExpr::from(&n).floordiv(4i64).to_string(), "n // 4");
}

#[test]
fn test_sym_vars_compare_by_identity() {
    let a = SymVar::int64("n");
    let b = SymVar::int64("n");
    assert_ne!(a, b);
    let mut vars = vec![];
    (PrimExpr::from(&a) * PrimExpr::from(&b) + PrimExpr::from(&a)).collect_sym_vars(&mut vars);
    assert_eq!(vars, vec![a, b]);
}
