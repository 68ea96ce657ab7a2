use std::fmt;
use std::fmt::Display;

/// Element type of tensors and primitive values.
///
/// `Void` stands for an unknown element type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    Int(u8),
    UInt(u8),
    Float(u8),
    Bool,
    Handle,
    Void,
}

impl DataType {
    pub fn int64() -> DataType {
        DataType::Int(64)
    }
    pub fn int32() -> DataType {
        DataType::Int(32)
    }
    pub fn float32() -> DataType {
        DataType::Float(32)
    }
    pub fn float16() -> DataType {
        DataType::Float(16)
    }
    pub fn is_void(&self) -> bool {
        matches!(self, DataType::Void)
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int(bits) => write!(f, "int{bits}"),
            DataType::UInt(bits) => write!(f, "uint{bits}"),
            DataType::Float(bits) => write!(f, "float{bits}"),
            DataType::Bool => write!(f, "bool"),
            DataType::Handle => write!(f, "handle"),
            DataType::Void => write!(f, "void"),
        }
    }
}

#[test]
fn test_display() {
    assert_eq!(DataType::float32().to_string(), "float32");
    assert_eq!(DataType::UInt(8).to_string(), "uint8");
    assert!(DataType::Void.is_void());
}
