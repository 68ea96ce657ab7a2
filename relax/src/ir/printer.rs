//! Debug printer for the IR.
//!
//! The output is meant for logs and tests; there is no parser for it.

use crate::functor::ExprFunctor;
use crate::ir::spaces;
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

pub struct Printer {
    indent: i32,
}

impl Default for Printer {
    fn default() -> Self {
        Printer::new()
    }
}

impl Printer {
    pub fn new() -> Printer {
        Printer { indent: 0 }
    }
    pub fn with_indent(indent: i32) -> Printer {
        Printer { indent }
    }
    pub fn print(&mut self, expr: &Expr) -> Result<String> {
        self.visit_expr(expr)
    }
    fn var_def(var: &Var) -> String {
        match &var.struct_info {
            Some(struct_info) => format!("{var}: {struct_info}"),
            None => var.to_string(),
        }
    }
    fn list(&mut self, exprs: &[Expr]) -> Result<Vec<String>> {
        exprs.iter().map(|expr| self.visit_expr(expr)).collect()
    }
    /// Print `expr` between braces, one level deeper than the current line.
    fn braced(&mut self, expr: &Expr) -> Result<String> {
        if let Expr::SeqExpr(seq) = expr {
            return self.visit_seq_expr_(seq);
        }
        self.indent += 1;
        let inner = self.visit_expr(expr);
        self.indent -= 1;
        Ok(format!(
            "{{\n{}{}\n{}}}",
            spaces(self.indent + 1),
            inner?,
            spaces(self.indent)
        ))
    }
    /// Print a binding without indentation or newline.
    pub fn binding(&mut self, binding: &Binding) -> Result<String> {
        let var = Printer::var_def(binding.var());
        match binding {
            Binding::VarBinding(binding) => {
                let value = self.visit_expr(&binding.value)?;
                Ok(format!("{var} = {value}"))
            }
            Binding::MatchCast(binding) => {
                let value = self.visit_expr(&binding.value)?;
                Ok(format!(
                    "{var} = match_cast({value}, {})",
                    binding.struct_info
                ))
            }
        }
    }
    /// Print a block as indented lines, without a trailing newline.
    pub fn block(&mut self, block: &BindingBlock) -> Result<String> {
        let pad = spaces(self.indent);
        let mut lines = vec![];
        if !block.is_dataflow() {
            for binding in &block.bindings {
                lines.push(format!("{pad}{}", self.binding(binding)?));
            }
            return Ok(lines.join("\n"));
        }
        lines.push(format!("{pad}dataflow {{"));
        self.indent += 1;
        let inner = spaces(self.indent);
        for binding in &block.bindings {
            let line = self.binding(binding);
            lines.push(format!("{inner}{}", line?));
        }
        let outputs = block
            .outputs()
            .iter()
            .map(|var| var.to_string())
            .collect::<Vec<String>>();
        if !outputs.is_empty() {
            lines.push(format!("{inner}output({})", outputs.join(", ")));
        }
        self.indent -= 1;
        lines.push(format!("{pad}}}"));
        Ok(lines.join("\n"))
    }
    /// Print a function; `name` is set for functions inside a module.
    pub fn function(&mut self, func: &Function, name: Option<&str>) -> Result<String> {
        let params = func
            .params
            .iter()
            .map(Printer::var_def)
            .collect::<Vec<String>>()
            .join(", ");
        let name = match name {
            Some(name) => format!(" @{name}"),
            None => "".to_string(),
        };
        let attrs = if func.attrs.is_empty() {
            "".to_string()
        } else {
            format!(" attrs {}", func.attrs)
        };
        let body = self.braced(&func.body)?;
        Ok(format!(
            "fn{name}({params}) -> {}{attrs} {body}",
            func.ret_struct_info
        ))
    }
}

impl ExprFunctor for Printer {
    type Output = String;

    fn visit_constant_(&mut self, op: &Constant) -> Result<String> {
        if op.shape.is_empty() {
            let value = op
                .values
                .first()
                .map(|value| value.to_string())
                .unwrap_or_default();
            return Ok(format!("const({value}, {})", op.dtype));
        }
        let shape = op
            .shape
            .iter()
            .map(|dim| dim.to_string())
            .collect::<Vec<String>>()
            .join("x");
        Ok(format!("const(<{shape}x{}>)", op.dtype))
    }
    fn visit_tuple_(&mut self, op: &Tuple) -> Result<String> {
        let fields = self.list(&op.fields)?;
        if fields.len() == 1 {
            Ok(format!("({},)", fields[0]))
        } else {
            Ok(format!("({})", fields.join(", ")))
        }
    }
    fn visit_var_(&mut self, op: &Var) -> Result<String> {
        Ok(op.to_string())
    }
    fn visit_dataflow_var_(&mut self, op: &Var) -> Result<String> {
        Ok(op.to_string())
    }
    fn visit_shape_expr_(&mut self, op: &ShapeExpr) -> Result<String> {
        let values = op
            .values
            .iter()
            .map(|value| value.to_string())
            .collect::<Vec<String>>();
        Ok(format!("shape({})", values.join(", ")))
    }
    fn visit_runtime_dep_shape_(&mut self, _op: &RuntimeDepShape) -> Result<String> {
        Ok("runtime_dep_shape()".to_string())
    }
    fn visit_extern_func_(&mut self, op: &ExternFunc) -> Result<String> {
        Ok(format!("extern(\"{}\")", op.global_symbol))
    }
    fn visit_global_var_(&mut self, op: &GlobalVar) -> Result<String> {
        Ok(format!("@{}", op.name_hint))
    }
    fn visit_function_(&mut self, op: &Function) -> Result<String> {
        self.function(op, None)
    }
    fn visit_call_(&mut self, op: &Call) -> Result<String> {
        let callee = self.visit_expr(&op.op)?;
        let mut args = self.list(&op.args)?;
        if !op.sinfo_args.is_empty() {
            let sinfo_args = op
                .sinfo_args
                .iter()
                .map(|sinfo| sinfo.to_string())
                .collect::<Vec<String>>();
            args.push(format!("sinfo_args=[{}]", sinfo_args.join(", ")));
        }
        let mut text = format!("{callee}({})", args.join(", "));
        if let Some(attrs) = &op.attrs {
            if !attrs.is_empty() {
                text.push_str(&format!(" {attrs}"));
            }
        }
        Ok(text)
    }
    fn visit_seq_expr_(&mut self, op: &SeqExpr) -> Result<String> {
        self.indent += 1;
        let mut lines = vec![];
        for block in &op.blocks {
            if !block.bindings.is_empty() {
                lines.push(self.block(block)?);
            }
        }
        let body = self.visit_expr(&op.body)?;
        lines.push(format!("{}{body}", spaces(self.indent)));
        self.indent -= 1;
        Ok(format!("{{\n{}\n{}}}", lines.join("\n"), spaces(self.indent)))
    }
    fn visit_if_(&mut self, op: &If) -> Result<String> {
        let cond = self.visit_expr(&op.cond)?;
        let true_branch = self.braced(&op.true_branch)?;
        let false_branch = self.braced(&op.false_branch)?;
        Ok(format!("if {cond} {true_branch} else {false_branch}"))
    }
    fn visit_op_(&mut self, op: &Op) -> Result<String> {
        Ok(op.name.clone())
    }
    fn visit_tuple_getitem_(&mut self, op: &TupleGetItem) -> Result<String> {
        let tuple = self.visit_expr(&op.tuple)?;
        Ok(format!("{tuple}[{}]", op.index))
    }
    fn visit_prim_value_(&mut self, op: &PrimValue) -> Result<String> {
        Ok(format!("prim({})", op.value))
    }
    fn visit_string_imm_(&mut self, op: &StringImm) -> Result<String> {
        Ok(format!("{:?}", op.value))
    }
    fn visit_data_type_imm_(&mut self, op: &DataTypeImm) -> Result<String> {
        Ok(format!("dtype({})", op.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::DataType;
    use crate::ir::PrimExpr;
    use crate::ir::StructInfo;
    use crate::ir::SymVar;
    use crate::ir::VarBinding;
    use indoc::indoc;

    #[test]
    fn test_print_function() {
        let n = SymVar::int64("n");
        let sinfo = StructInfo::tensor(vec![PrimExpr::from(&n)], DataType::float32());
        let x = Var::new("x", Some(sinfo.clone()));
        let lv = Var::dataflow("lv", Some(sinfo.clone()));
        let gv = Var::new("gv", Some(sinfo.clone()));
        let add = Call::new(Op::new("relax.add"), vec![x.clone().into(), x.clone().into()]);
        let block = BindingBlock::dataflow(vec![
            VarBinding::new(lv.clone(), add.into()).into(),
            VarBinding::new(gv.clone(), lv.into()).into(),
        ]);
        let body = SeqExpr::new(vec![block], gv.into());
        let func = Function::new(vec![x], body.into(), None);
        let expected = indoc! {"
        fn(%x: Tensor([n], float32)) -> Tensor([n], float32) {
          dataflow {
            %lv: Tensor([n], float32) = relax.add(%x, %x)
            %gv: Tensor([n], float32) = %lv
            output(%gv)
          }
          %gv
        }"};
        assert_eq!(func.to_string(), expected);
    }

    #[test]
    fn test_print_if_with_plain_branches() {
        let cond = Var::new("cond", None);
        let node = If::new(
            cond.into(),
            StringImm::new("yes").into(),
            Tuple::new(vec![PrimValue::int64(1).into()]).into(),
        );
        let expected = indoc! {"
        if %cond {
          \"yes\"
        } else {
          (prim(1),)
        }"};
        assert_eq!(Expr::If(node).to_string(), expected);
    }
}
