use crate::ir::DataType;
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Display;

#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    DataType(DataType),
    Ints(Vec<i64>),
}

impl Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(value) => write!(f, "{value}"),
            AttrValue::Int(value) => write!(f, "{value}"),
            AttrValue::Float(value) => write!(f, "{value:?}"),
            AttrValue::Str(value) => write!(f, "\"{value}\""),
            AttrValue::DataType(value) => write!(f, "{value}"),
            AttrValue::Ints(values) => {
                let values = values
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<String>>()
                    .join(", ");
                write!(f, "[{values}]")
            }
        }
    }
}

/// Attributes of a function or call, kept sorted by key.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Attrs {
    values: BTreeMap<String, AttrValue>,
}

impl Attrs {
    pub fn new() -> Attrs {
        Attrs::default()
    }
    pub fn with(mut self, key: &str, value: AttrValue) -> Attrs {
        self.insert(key, value);
        self
    }
    pub fn insert(&mut self, key: &str, value: AttrValue) {
        self.values.insert(key.to_string(), value);
    }
    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.values.get(key)
    }
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttrValue)> {
        self.values.iter()
    }
}

impl Display for Attrs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self
            .iter()
            .map(|(key, value)| format!("{key} = {value}"))
            .collect::<Vec<String>>()
            .join(", ");
        write!(f, "{{{values}}}")
    }
}

#[test]
fn test_display_is_sorted() {
    let attrs = Attrs::new()
        .with("global_symbol", AttrValue::Str("main".to_string()))
        .with("axis", AttrValue::Int(1));
    assert_eq!(attrs.to_string(), "{axis = 1, global_symbol = \"main\"}");
}
