//! Analyses over the IR.

mod structural_equal;
mod well_formed;

pub use structural_equal::structural_equal;
pub use well_formed::is_well_formed;
pub use well_formed::well_formed;
