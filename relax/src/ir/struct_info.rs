use crate::ir::DataType;
use crate::ir::PrimExpr;
use crate::ir::SymVar;
use std::fmt;
use std::fmt::Display;

/// Rank of a tensor or shape whose rank is not known.
pub const UNKNOWN_NDIM: i64 = -1;

/// Shape, dtype and type information attached to an expression.
///
/// Struct info is a plain value: comparing two of them is structural, except
/// for the symbolic variables inside shapes which compare by identity.
#[derive(Clone, Debug, PartialEq)]
pub enum StructInfo {
    Object,
    Prim(DataType),
    Shape {
        values: Option<Vec<PrimExpr>>,
        ndim: i64,
    },
    Tensor {
        shape: Option<Vec<PrimExpr>>,
        dtype: DataType,
        ndim: i64,
    },
    Tuple(Vec<StructInfo>),
    Func {
        params: Option<Vec<StructInfo>>,
        ret: Box<StructInfo>,
    },
}

impl StructInfo {
    pub fn tensor(shape: Vec<PrimExpr>, dtype: DataType) -> StructInfo {
        let ndim = shape.len() as i64;
        StructInfo::Tensor {
            shape: Some(shape),
            dtype,
            ndim,
        }
    }
    pub fn tensor_with_ndim(ndim: i64, dtype: DataType) -> StructInfo {
        StructInfo::Tensor {
            shape: None,
            dtype,
            ndim,
        }
    }
    pub fn shape(values: Vec<PrimExpr>) -> StructInfo {
        let ndim = values.len() as i64;
        StructInfo::Shape {
            values: Some(values),
            ndim,
        }
    }
    pub fn func(params: Vec<StructInfo>, ret: StructInfo) -> StructInfo {
        StructInfo::Func {
            params: Some(params),
            ret: Box::new(ret),
        }
    }
    /// Function whose parameters are unknown, such as an external function.
    pub fn opaque_func(ret: StructInfo) -> StructInfo {
        StructInfo::Func {
            params: None,
            ret: Box::new(ret),
        }
    }
    /// Symbolic variables used in the shapes of this struct info.
    pub fn sym_vars(&self) -> Vec<SymVar> {
        let mut out = vec![];
        self.collect_sym_vars(&mut out);
        out
    }
    fn collect_sym_vars(&self, out: &mut Vec<SymVar>) {
        match self {
            StructInfo::Object | StructInfo::Prim(_) => (),
            StructInfo::Shape { values, .. } => {
                for value in values.iter().flatten() {
                    value.collect_sym_vars(out);
                }
            }
            StructInfo::Tensor { shape, .. } => {
                for dim in shape.iter().flatten() {
                    dim.collect_sym_vars(out);
                }
            }
            StructInfo::Tuple(fields) => {
                for field in fields {
                    field.collect_sym_vars(out);
                }
            }
            StructInfo::Func { params, ret } => {
                for param in params.iter().flatten() {
                    param.collect_sym_vars(out);
                }
                ret.collect_sym_vars(out);
            }
        }
    }
}

fn join<T: Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<String>>()
        .join(", ")
}

impl Display for StructInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructInfo::Object => write!(f, "Object"),
            StructInfo::Prim(dtype) => write!(f, "Prim({dtype})"),
            StructInfo::Shape {
                values: Some(values),
                ..
            } => write!(f, "Shape([{}])", join(values)),
            StructInfo::Shape { values: None, ndim } => {
                if *ndim == UNKNOWN_NDIM {
                    write!(f, "Shape")
                } else {
                    write!(f, "Shape(ndim={ndim})")
                }
            }
            StructInfo::Tensor { shape, dtype, ndim } => {
                let mut parts = vec![];
                match shape {
                    Some(shape) => parts.push(format!("[{}]", join(shape))),
                    None if *ndim != UNKNOWN_NDIM => parts.push(format!("ndim={ndim}")),
                    None => (),
                }
                if !dtype.is_void() {
                    parts.push(dtype.to_string());
                }
                if parts.is_empty() {
                    write!(f, "Tensor")
                } else {
                    write!(f, "Tensor({})", parts.join(", "))
                }
            }
            StructInfo::Tuple(fields) => write!(f, "Tuple({})", join(fields)),
            StructInfo::Func { params, ret } => match params {
                Some(params) => write!(f, "Func([{}], {ret})", join(params)),
                None => write!(f, "Func({ret})"),
            },
        }
    }
}

#[test]
fn test_display() {
    let n = SymVar::int64("n");
    let tensor = StructInfo::tensor(vec![PrimExpr::from(&n), 4.into()], DataType::float32());
    assert_eq!(tensor.to_string(), "Tensor([n, 4], float32)");
    let unknown = StructInfo::tensor_with_ndim(UNKNOWN_NDIM, DataType::Void);
    assert_eq!(unknown.to_string(), "Tensor");
    let func = StructInfo::func(vec![tensor.clone()], StructInfo::Tuple(vec![]));
    assert_eq!(func.to_string(), "Func([Tensor([n, 4], float32)], Tuple())");
    assert_eq!(tensor.sym_vars(), vec![n]);
}
