//! Passes over modules.
//!
//! A pass is a mutator applied to every function of an [IRModule]. Passes
//! are selected by name (e.g., `--fma-rewrite`) so that command-line
//! front-ends can hand their flags straight to [transform].

use crate::builder::infer_elementwise;
use crate::builder::BlockBuilder;
use crate::builder::OpRegistry;
use crate::ir::spaces;
use crate::ir::Expr;
use crate::ir::IRModule;
use crate::mutator::ExprMutator;
use crate::mutator::MutatorState;
use anyhow::Result;
use clap::Arg;
use clap::ArgAction;
use clap::ArgMatches;
use std::env::ArgsOs;
use std::fmt;
use std::fmt::Display;
use std::sync::Arc;
use tracing::debug;
use tracing::info;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::Level;

mod explicit_memory;
mod fma_rewrite;
mod normalize;

pub use explicit_memory::ExplicitMemoryRewrite;
pub use fma_rewrite::FmaRewrite;
pub use normalize::Normalize;

/// Whether a pass changed the module.
#[derive(Debug)]
pub enum RewriteResult {
    Changed(IRModule),
    Unchanged,
}

impl RewriteResult {
    pub fn is_changed(&self) -> Option<&IRModule> {
        match self {
            RewriteResult::Changed(module) => Some(module),
            RewriteResult::Unchanged => None,
        }
    }
}

/// A transformation of a whole module.
///
/// Modules are immutable, so a pass that changes something returns the new
/// module in [RewriteResult::Changed].
pub trait Pass {
    const NAME: &'static str;
    fn convert(module: &IRModule) -> Result<RewriteResult>;
}

/// Inference rules for the operators that the default passes create or
/// look at.
pub fn default_registry() -> OpRegistry {
    OpRegistry::new()
        .with("relax.add", infer_elementwise)
        .with("relax.multiply", infer_elementwise)
        .with("relax.ewise_fma", infer_elementwise)
}

/// Mutator state whose builder knows [default_registry].
pub(crate) fn pass_state() -> MutatorState {
    let builder = BlockBuilder::with_inference(Arc::new(default_registry()));
    MutatorState::with_builder(builder)
}

/// Rewrite every function of `module` with a fresh mutator from
/// `make_mutator`.
///
/// Functions that come back as the same node are left alone, so the result
/// is [RewriteResult::Unchanged] when no function changed.
pub fn apply_to_functions<M, F>(module: &IRModule, mut make_mutator: F) -> Result<RewriteResult>
where
    M: ExprMutator,
    F: FnMut() -> M,
{
    let mut new_module = module.clone();
    let mut changed = false;
    for (global_var, func) in module.functions() {
        let mut mutator = make_mutator();
        let expr: Expr = func.clone().into();
        let new_expr = mutator.visit_expr(&expr)?;
        if new_expr.same_as(&expr) {
            debug!("{}@{} unchanged", spaces(1), global_var.name_hint);
            continue;
        }
        let new_func = new_expr.as_function().cloned().ok_or_else(|| {
            anyhow::anyhow!(
                "rewriting @{} gave a {} instead of a Function",
                global_var.name_hint,
                new_expr.kind()
            )
        })?;
        debug!("{}@{} changed", spaces(1), global_var.name_hint);
        new_module.insert(global_var.clone(), new_func);
        changed = true;
    }
    if changed {
        Ok(RewriteResult::Changed(new_module))
    } else {
        Ok(RewriteResult::Unchanged)
    }
}

/// A transformation pass (e.g., `--fma-rewrite`).
#[derive(Clone, Debug, PartialEq)]
pub struct SinglePass {
    pass: String,
}

impl Display for SinglePass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pass)
    }
}

impl SinglePass {
    pub fn new(pass: &str) -> SinglePass {
        let pass = pass.strip_prefix("--").unwrap_or(pass);
        SinglePass {
            pass: pass.to_string(),
        }
    }
    pub fn name(&self) -> &str {
        &self.pass
    }
}

/// A collection of [SinglePass]es.
#[derive(Clone, Debug, Default)]
pub struct Passes {
    passes: Vec<SinglePass>,
}

impl Display for Passes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.passes
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<String>>()
                .join(" ")
        )
    }
}

/// Flags that look like passes but configure the pipeline instead.
const OPTION_FLAGS: [&str; 2] = ["--print-ir-before-all", "--debug"];

impl Passes {
    pub fn from_vec(passes: Vec<&str>) -> Passes {
        Passes {
            passes: passes.iter().map(|p| SinglePass::new(p)).collect(),
        }
    }
    /// Extract the passes (arguments starting with `--`) from `args`.
    pub fn from_convert_vec(args: Vec<&str>) -> Passes {
        let passes = args
            .into_iter()
            .filter(|arg| arg.starts_with("--") && !OPTION_FLAGS.contains(arg))
            .collect();
        Passes::from_vec(passes)
    }
    /// Extract the passes from the arguments of the current process.
    pub fn from_convert_args(args: ArgsOs) -> Passes {
        let args = args
            .map(|arg| arg.to_string_lossy().to_string())
            .collect::<Vec<String>>();
        Passes::from_convert_vec(args.iter().map(|arg| arg.as_str()).collect())
    }
    pub fn vec(&self) -> &Vec<SinglePass> {
        &self.passes
    }
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}

/// Passes plus the options that control how they run.
#[derive(Clone, Debug, Default)]
pub struct TransformOptions {
    passes: Passes,
    print_ir_before_all: bool,
}

impl TransformOptions {
    pub fn from_passes(passes: Passes) -> TransformOptions {
        TransformOptions {
            passes,
            print_ir_before_all: false,
        }
    }
    /// Options from parsed command-line arguments that include
    /// [default_arguments].
    pub fn from_args(matches: ArgMatches, passes: Passes) -> TransformOptions {
        let print_ir_before_all = matches
            .try_get_one::<bool>("print-ir-before-all")
            .ok()
            .flatten()
            .copied()
            .unwrap_or(false);
        TransformOptions {
            passes,
            print_ir_before_all,
        }
    }
    pub fn passes(&self) -> &Passes {
        &self.passes
    }
    pub fn print_ir_before_all(&self) -> bool {
        self.print_ir_before_all
    }
    pub fn set_print_ir_before_all(&mut self, print_ir_before_all: bool) {
        self.print_ir_before_all = print_ir_before_all;
    }
}

/// Interface to add custom passes to the pipeline.
pub trait TransformDispatch {
    fn dispatch(module: &IRModule, pass: &SinglePass) -> Result<RewriteResult>;
}

/// Default implementation of [TransformDispatch].
///
/// This default implementation knows only the passes of this crate.
pub struct DefaultTransformDispatch;

impl TransformDispatch for DefaultTransformDispatch {
    fn dispatch(module: &IRModule, pass: &SinglePass) -> Result<RewriteResult> {
        match pass.name() {
            Normalize::NAME => Normalize::convert(module),
            FmaRewrite::NAME => FmaRewrite::convert(module),
            ExplicitMemoryRewrite::NAME => ExplicitMemoryRewrite::convert(module),
            _ => Err(anyhow::anyhow!("Unknown pass: {}", pass)),
        }
    }
}

/// Install a global `fmt` subscriber that logs up to `level`.
///
/// Output goes through the test writer so that `cargo test` captures the IR
/// dumps of passing tests. Fails when a global subscriber is already set.
pub fn init_subscriber(level: Level) -> Result<(), SetGlobalDefaultError> {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .with_test_writer()
        .finish();
    tracing::subscriber::set_global_default(subscriber)
}

/// clap flags for the passes that [DefaultTransformDispatch] knows, plus
/// `--print-ir-before-all`.
///
/// Each pass flag is spelled like the pass name, so one command line feeds
/// both clap and [Passes::from_convert_vec]. Logging flags are left to the
/// caller.
pub fn default_arguments() -> Vec<Arg> {
    vec![
        Arg::new("normalize")
            .long("normalize")
            .help("Fill in missing struct info")
            .action(ArgAction::SetTrue),
        Arg::new("fma-rewrite")
            .long("fma-rewrite")
            .help("Fuse a multiply followed by an add into ewise_fma")
            .action(ArgAction::SetTrue),
        Arg::new("explicit-memory-rewrite")
            .long("explicit-memory-rewrite")
            .help("Turn call_dps into explicit tensor allocations")
            .action(ArgAction::SetTrue),
        Arg::new("print-ir-before-all")
            .long("print-ir-before-all")
            .help("Print the IR before each pass")
            .action(ArgAction::SetTrue),
    ]
}

/// Run the passes of `options` on `module`, in order.
///
/// Each pass sees the module produced by the pass before it. The result is
/// [RewriteResult::Changed] when at least one pass changed something.
pub fn transform<T: TransformDispatch>(
    module: &IRModule,
    options: &TransformOptions,
) -> Result<RewriteResult> {
    let mut current = module.clone();
    let mut changed = false;
    for pass in options.passes().vec() {
        if options.print_ir_before_all() {
            info!("// ----- // IR Dump Before {pass} //----- //\n{current}\n\n");
        }
        debug!("Running pass {pass}");
        if let RewriteResult::Changed(new_module) = T::dispatch(&current, pass)? {
            current = new_module;
            changed = true;
        }
    }
    if changed {
        Ok(RewriteResult::Changed(current))
    } else {
        Ok(RewriteResult::Unchanged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Command;

    #[test]
    fn test_passes_from_args() {
        let args = vec!["relax", "--fma-rewrite", "--print-ir-before-all", "--normalize"];
        let passes = Passes::from_convert_vec(args.clone());
        assert_eq!(passes.to_string(), "fma-rewrite normalize");

        let matches = Command::new("relax")
            .args(default_arguments())
            .get_matches_from(args);
        assert!(matches.get_flag("fma-rewrite"));
        let options = TransformOptions::from_args(matches, passes);
        assert!(options.print_ir_before_all());
    }

    #[test]
    fn test_unknown_pass() {
        let options = TransformOptions::from_passes(Passes::from_vec(vec!["--inline"]));
        let err = transform::<DefaultTransformDispatch>(&IRModule::new(), &options).unwrap_err();
        assert_eq!(err.to_string(), "Unknown pass: inline");
    }
}
