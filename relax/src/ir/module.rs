use crate::ir::spaces;
use crate::ir::Function;
use crate::ir::GlobalVar;
use crate::ir::Printer;
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Display;

/// Set of functions addressable through [GlobalVar]s, ordered by name.
#[derive(Clone, Debug, Default)]
pub struct IRModule {
    functions: BTreeMap<String, (GlobalVar, Function)>,
}

impl IRModule {
    pub fn new() -> IRModule {
        IRModule::default()
    }
    /// Add `func` under `name` and return the global variable referring to it.
    pub fn add(&mut self, name: &str, func: Function) -> GlobalVar {
        let global_var = GlobalVar::new(name);
        self.insert(global_var.clone(), func);
        global_var
    }
    /// Insert or replace the function of `global_var`.
    pub fn insert(&mut self, global_var: GlobalVar, func: Function) {
        self.functions
            .insert(global_var.name_hint.clone(), (global_var, func));
    }
    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.get(name).map(|(_, func)| func)
    }
    pub fn global_var(&self, name: &str) -> Option<&GlobalVar> {
        self.functions.get(name).map(|(global_var, _)| global_var)
    }
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
    pub fn functions(&self) -> impl Iterator<Item = (&GlobalVar, &Function)> {
        self.functions
            .values()
            .map(|(global_var, func)| (global_var, func))
    }
    pub fn len(&self) -> usize {
        self.functions.len()
    }
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl Display for IRModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {{")?;
        for (global_var, func) in self.functions() {
            let text = Printer::with_indent(1)
                .function(func, Some(&global_var.name_hint))
                .map_err(|_| fmt::Error)?;
            writeln!(f, "{}{text}", spaces(1))?;
        }
        write!(f, "}}")
    }
}
