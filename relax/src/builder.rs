//! Block builder: the accumulator that collects emitted bindings.
//!
//! Front-ends use the builder to construct IR incrementally and the
//! [ExprMutator](crate::mutator::ExprMutator) uses it to collect the bindings
//! of the block being rewritten. The builder also normalizes expressions by
//! filling in missing struct info through an [InferStructInfo]
//! implementation.

use crate::ir::spaces;
use crate::ir::Binding;
use crate::ir::BindingBlock;
use crate::ir::Call;
use crate::ir::DataType;
use crate::ir::Expr;
use crate::ir::Id;
use crate::ir::MatchCast;
use crate::ir::StructInfo;
use crate::ir::Var;
use crate::ir::VarBinding;
use crate::ir::UNKNOWN_NDIM;
use crate::shared::Shared;
use crate::shared::SharedExt;
use anyhow::Result;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use tracing::trace;
use tracing::warn;

/// Hands out unique names for emitted variables.
///
/// The first request for a hint returns the hint itself; later requests add
/// a counter (`lv`, `lv1`, `lv2`, ...).
#[derive(Debug, Default)]
pub struct NameTable {
    counts: HashMap<String, usize>,
}

impl NameTable {
    pub fn new() -> NameTable {
        NameTable::default()
    }
    pub fn unique_name(&mut self, hint: &str) -> String {
        let count = self.counts.entry(hint.to_string()).or_insert(0);
        let name = if *count == 0 {
            hint.to_string()
        } else {
            format!("{hint}{count}")
        };
        *count += 1;
        name
    }
}

/// Struct info deduction for calls.
///
/// Operator semantics live outside this crate; the builder only needs a way
/// to ask what a call returns.
pub trait InferStructInfo {
    fn infer_call(&self, call: &Call) -> Result<StructInfo>;
}

pub type InferFn = Arc<dyn Fn(&Call) -> Result<StructInfo> + Send + Sync>;

/// Table from operator name to inference rule.
///
/// Calls to operators without a rule fall back to the return struct info of
/// the callee, then to the first struct info argument, then to
/// [StructInfo::Object].
#[derive(Clone, Default)]
pub struct OpRegistry {
    rules: HashMap<String, InferFn>,
}

impl OpRegistry {
    pub fn new() -> OpRegistry {
        OpRegistry::default()
    }
    pub fn register<F>(&mut self, op_name: &str, rule: F)
    where
        F: Fn(&Call) -> Result<StructInfo> + Send + Sync + 'static,
    {
        self.rules.insert(op_name.to_string(), Arc::new(rule));
    }
    /// Builder-style [OpRegistry::register].
    pub fn with<F>(mut self, op_name: &str, rule: F) -> OpRegistry
    where
        F: Fn(&Call) -> Result<StructInfo> + Send + Sync + 'static,
    {
        self.register(op_name, rule);
        self
    }
    pub fn contains(&self, op_name: &str) -> bool {
        self.rules.contains_key(op_name)
    }
}

impl InferStructInfo for OpRegistry {
    fn infer_call(&self, call: &Call) -> Result<StructInfo> {
        if let Expr::Op(op) = &call.op {
            if let Some(rule) = self.rules.get(&op.name) {
                return rule(call);
            }
        }
        if let Some(StructInfo::Func { ret, .. }) = call.op.struct_info() {
            return Ok((**ret).clone());
        }
        if let Some(first) = call.sinfo_args.first() {
            return Ok(first.clone());
        }
        Ok(StructInfo::Object)
    }
}

/// Inference rule for elementwise operators over tensors of one dtype.
///
/// The result keeps the shape when all arguments agree on it and only the
/// rank otherwise.
pub fn infer_elementwise(call: &Call) -> Result<StructInfo> {
    let mut dtype: Option<DataType> = None;
    let mut shape: Option<Option<Vec<_>>> = None;
    let mut ndim = UNKNOWN_NDIM;
    for arg in &call.args {
        let (arg_shape, arg_dtype, arg_ndim) = match arg.struct_info() {
            Some(StructInfo::Tensor { shape, dtype, ndim }) => (shape, dtype, ndim),
            Some(other) => {
                return Err(anyhow::anyhow!(
                    "{} expects tensor arguments, got {other}",
                    call.op
                ))
            }
            None => return Ok(StructInfo::Object),
        };
        match dtype {
            Some(dtype) if dtype != *arg_dtype => {
                return Err(anyhow::anyhow!(
                    "{} got mismatching dtypes {dtype} and {arg_dtype}",
                    call.op
                ))
            }
            _ => dtype = Some(*arg_dtype),
        }
        shape = match shape {
            None => Some(arg_shape.clone()),
            Some(known) if known == *arg_shape => Some(known),
            Some(_) => Some(None),
        };
        ndim = ndim.max(*arg_ndim);
    }
    let dtype = dtype.ok_or_else(|| anyhow::anyhow!("{} expects arguments", call.op))?;
    Ok(match shape.flatten() {
        Some(shape) => StructInfo::tensor(shape, dtype),
        None => StructInfo::tensor_with_ndim(ndim, dtype),
    })
}

struct BlockFrame {
    bindings: Vec<Binding>,
    dataflow: bool,
}

/// Accumulator of bindings for the blocks under construction.
///
/// Blocks nest: [BlockBuilder::begin_binding_block] and
/// [BlockBuilder::begin_dataflow_block] push a frame, and
/// [BlockBuilder::end_block] pops it and returns the finished block.
pub struct BlockBuilder {
    name_table: Shared<NameTable>,
    inference: Arc<dyn InferStructInfo>,
    blocks: Vec<BlockFrame>,
    /// Parameters of the enclosing function scopes.
    scopes: Vec<HashSet<Id>>,
    bindings: HashMap<Id, Expr>,
}

impl Default for BlockBuilder {
    fn default() -> Self {
        BlockBuilder::new()
    }
}

impl BlockBuilder {
    pub fn new() -> BlockBuilder {
        BlockBuilder::with_inference(Arc::new(OpRegistry::new()))
    }
    pub fn with_inference(inference: Arc<dyn InferStructInfo>) -> BlockBuilder {
        BlockBuilder {
            name_table: Shared::new(NameTable::new().into()),
            inference,
            blocks: vec![],
            scopes: vec![],
            bindings: HashMap::new(),
        }
    }
    /// Share `name_table` with other builders so that names stay unique
    /// across all of them.
    pub fn with_name_table(mut self, name_table: Shared<NameTable>) -> BlockBuilder {
        self.name_table = name_table;
        self
    }
    pub fn name_table(&self) -> Shared<NameTable> {
        self.name_table.clone()
    }
    pub fn begin_binding_block(&mut self) {
        debug!("{}begin binding block", spaces(self.blocks.len() as i32));
        self.blocks.push(BlockFrame {
            bindings: vec![],
            dataflow: false,
        });
    }
    pub fn begin_dataflow_block(&mut self) {
        debug!("{}begin dataflow block", spaces(self.blocks.len() as i32));
        self.blocks.push(BlockFrame {
            bindings: vec![],
            dataflow: true,
        });
    }
    pub fn end_block(&mut self) -> Result<BindingBlock> {
        let frame = self
            .blocks
            .pop()
            .ok_or_else(|| anyhow::anyhow!("end_block called while no block is being built"))?;
        debug!(
            "{}end block with {} binding(s)",
            spaces(self.blocks.len() as i32),
            frame.bindings.len()
        );
        Ok(if frame.dataflow {
            BindingBlock::dataflow(frame.bindings)
        } else {
            BindingBlock::new(frame.bindings)
        })
    }
    /// Whether the innermost block under construction is a dataflow block.
    pub fn current_block_is_dataflow(&self) -> bool {
        self.blocks.last().map(|frame| frame.dataflow).unwrap_or(false)
    }
    /// Number of blocks under construction.
    pub fn block_depth(&self) -> usize {
        self.blocks.len()
    }
    fn open_block_is_dataflow(&self, caller: &str) -> Result<bool> {
        match self.blocks.last() {
            Some(frame) => Ok(frame.dataflow),
            None => Err(anyhow::anyhow!("{caller} called while no block is being built")),
        }
    }
    /// Enter the scope of a function body or branch with the given parameters.
    pub fn begin_scope(&mut self, params: &[Var]) {
        let params = params.iter().map(|param| param.vid.clone()).collect();
        self.scopes.push(params);
    }
    pub fn end_scope(&mut self) -> Result<()> {
        match self.scopes.pop() {
            Some(_) => Ok(()),
            None => Err(anyhow::anyhow!("end_scope called without a matching begin_scope")),
        }
    }
    fn fresh_var(&self, name_hint: &str, struct_info: Option<StructInfo>, dataflow: bool) -> Var {
        let hint = match name_hint {
            "" if dataflow => "lv",
            "" => "gv",
            hint => hint,
        };
        let name = self.name_table.wr().unique_name(hint);
        if dataflow {
            Var::dataflow(&name, struct_info)
        } else {
            Var::new(&name, struct_info)
        }
    }
    /// Bind `expr` to a fresh variable in the current block.
    ///
    /// Inside a dataflow block the variable is a dataflow variable. An empty
    /// `name_hint` picks `lv` or `gv`.
    pub fn emit(&mut self, expr: Expr, name_hint: &str) -> Result<Var> {
        let dataflow = self.open_block_is_dataflow("emit")?;
        let value = self.normalize(&expr)?;
        let var = self.fresh_var(name_hint, value.struct_info().cloned(), dataflow);
        self.emit_normalized(VarBinding::new(var.clone(), value).into())?;
        Ok(var)
    }
    /// Bind `expr` to a fresh variable that is an output of the current
    /// dataflow block.
    pub fn emit_output(&mut self, expr: Expr, name_hint: &str) -> Result<Var> {
        if !self.current_block_is_dataflow() {
            return Err(anyhow::anyhow!(
                "emit_output is only allowed inside a dataflow block"
            ));
        }
        let value = self.normalize(&expr)?;
        let var = self.fresh_var(name_hint, value.struct_info().cloned(), false);
        self.emit_normalized(VarBinding::new(var.clone(), value).into())?;
        Ok(var)
    }
    pub fn emit_match_cast(
        &mut self,
        value: Expr,
        struct_info: StructInfo,
        name_hint: &str,
    ) -> Result<Var> {
        let dataflow = self.open_block_is_dataflow("emit_match_cast")?;
        let value = self.normalize(&value)?;
        let var = self.fresh_var(name_hint, Some(struct_info.clone()), dataflow);
        self.emit_normalized(MatchCast::new(var.clone(), value, struct_info).into())?;
        Ok(var)
    }
    /// Append a binding whose value is already normalized.
    ///
    /// Every [VarBinding] is recorded for [BlockBuilder::lookup_binding].
    /// The record is kept for the lifetime of the builder, which is one pass
    /// over one function when the builder belongs to a pass.
    pub fn emit_normalized(&mut self, binding: Binding) -> Result<()> {
        let indent = spaces(self.blocks.len() as i32);
        let frame = self.blocks.last_mut().ok_or_else(|| {
            anyhow::anyhow!("cannot emit {}: no block is being built", binding.var())
        })?;
        let var = binding.var();
        if var.is_dataflow() && !frame.dataflow {
            return Err(anyhow::anyhow!(
                "dataflow var {var} cannot be bound outside a dataflow block"
            ));
        }
        if self.scopes.iter().any(|params| params.contains(&var.vid)) {
            return Err(anyhow::anyhow!("parameter {var} cannot be bound again"));
        }
        trace!("{indent}emit {binding}");
        if let Binding::VarBinding(var_binding) = &binding {
            self.bindings
                .insert(var_binding.var.vid.clone(), var_binding.value.clone());
        }
        frame.bindings.push(binding);
        Ok(())
    }
    /// Value most recently bound to `var`, if any.
    ///
    /// Parameters and match-cast variables have no bound value.
    pub fn lookup_binding(&self, var: &Var) -> Option<Expr> {
        self.bindings.get(&var.vid).cloned()
    }
    /// Fill in the struct info of `expr` when it is missing.
    ///
    /// Only composite expressions are filled in; leaves such as variables,
    /// operators and global variables are returned as they are.
    pub fn normalize(&self, expr: &Expr) -> Result<Expr> {
        if expr.struct_info().is_some() {
            return Ok(expr.clone());
        }
        match expr {
            Expr::Call(_)
            | Expr::If(_)
            | Expr::Tuple(_)
            | Expr::TupleGetItem(_)
            | Expr::SeqExpr(_)
            | Expr::Function(_) => {
                let struct_info = self.infer_struct_info(expr)?;
                Ok(expr.with_struct_info(struct_info))
            }
            _ => Ok(expr.clone()),
        }
    }
    pub fn infer_struct_info(&self, expr: &Expr) -> Result<StructInfo> {
        let of = |expr: &Expr| expr.struct_info().cloned().unwrap_or(StructInfo::Object);
        Ok(match expr {
            Expr::Call(call) => self.inference.infer_call(call)?,
            Expr::Tuple(tuple) => StructInfo::Tuple(tuple.fields.iter().map(of).collect()),
            Expr::TupleGetItem(item) => match item.tuple.struct_info() {
                Some(StructInfo::Tuple(fields)) => {
                    fields.get(item.index).cloned().ok_or_else(|| {
                        anyhow::anyhow!(
                            "index {} is out of range for a tuple of {} fields",
                            item.index,
                            fields.len()
                        )
                    })?
                }
                _ => StructInfo::Object,
            },
            Expr::If(node) => {
                let true_struct_info = of(&node.true_branch);
                if true_struct_info == of(&node.false_branch) {
                    true_struct_info
                } else {
                    StructInfo::Object
                }
            }
            Expr::SeqExpr(seq) => of(&seq.body),
            Expr::Function(func) => {
                let params = func
                    .params
                    .iter()
                    .map(|param| param.struct_info.clone().unwrap_or(StructInfo::Object))
                    .collect();
                StructInfo::func(params, func.ret_struct_info.clone())
            }
            other => of(other),
        })
    }
}

impl Drop for BlockBuilder {
    fn drop(&mut self) {
        if !self.blocks.is_empty() {
            warn!(
                "BlockBuilder dropped with {} unfinished block(s)",
                self.blocks.len()
            );
        }
    }
}
