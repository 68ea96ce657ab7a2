use crate::ir::IRModule;
use crate::mutator::ExprMutator;
use crate::mutator::MutatorState;
use crate::transform::apply_to_functions;
use crate::transform::pass_state;
use crate::transform::Pass;
use crate::transform::RewriteResult;
use anyhow::Result;

/// Mutator that only normalizes, which fills in missing struct info.
struct Normalizer {
    state: MutatorState,
}

impl ExprMutator for Normalizer {
    fn state(&mut self) -> &mut MutatorState {
        &mut self.state
    }
}

/// Fill in the struct info that front-ends left out.
pub struct Normalize;

impl Pass for Normalize {
    const NAME: &'static str = "normalize";
    fn convert(module: &IRModule) -> Result<RewriteResult> {
        apply_to_functions(module, || Normalizer {
            state: pass_state(),
        })
    }
}
