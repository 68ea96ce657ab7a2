//! Traversal and rewriting for Relax, a dataflow IR for machine-learning
//! compilers.
//!
//! Programs are [ir::Function]s collected in an [ir::IRModule]. A function
//! body is a [ir::SeqExpr]: binding blocks followed by a result. Bindings in
//! a dataflow block are pure, and the variables they define are local to
//! the block unless they are emitted as outputs.
//!
//! The crate is built around three traversals:
//!
//! - [functor::ExprFunctor] dispatches on the kind of an expression and lets
//!   the implementor choose the result type. Every handler has to be
//!   written.
//! - [visitor::ExprVisitor] walks a tree for its side effects. All handlers
//!   have defaults that recurse into the children.
//! - [mutator::ExprMutator] rebuilds a tree. Bindings are re-emitted into a
//!   [builder::BlockBuilder], which fills in struct info and keeps track of
//!   the bindings seen so far. Unchanged subtrees come back as the very same
//!   nodes.
//!
//! [extension] composes visitors and mutators from closures, for callers that
//! would rather not declare a type. [analysis] contains well-formedness and
//! structural equality checks. [transform] turns mutators into passes over a
//! module and runs them by name, for example:
//!
//! ```
//! use relax::ir::IRModule;
//! use relax::transform;
//! use relax::DefaultTransformDispatch;
//! use relax::Passes;
//! use relax::TransformOptions;
//!
//! let passes = Passes::from_convert_vec(vec!["relax", "--fma-rewrite"]);
//! let options = TransformOptions::from_passes(passes);
//! let result = transform::<DefaultTransformDispatch>(&IRModule::new(), &options).unwrap();
//! assert!(result.is_changed().is_none());
//! ```

pub mod analysis;
pub mod builder;
pub mod extension;
pub mod functor;
pub mod ir;
pub mod mutator;
pub mod shared;
#[cfg(feature = "test-utils")]
pub mod tester;
pub mod transform;
pub mod visitor;

pub use transform::default_arguments;
pub use transform::init_subscriber;
pub use transform::transform;
pub use transform::DefaultTransformDispatch;
pub use transform::Passes;
pub use transform::RewriteResult;
pub use transform::SinglePass;
pub use transform::TransformDispatch;
pub use transform::TransformOptions;
