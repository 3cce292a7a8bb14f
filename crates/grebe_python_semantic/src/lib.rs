//! Def-use and use-def chains for Python modules.
//!
//! Given a parsed module, [`DefUseChains`] computes, for every binding site
//! and every value-producing expression, a definition record listing the
//! expressions that consume it, plus the ordered list of definitions each
//! lexical scope introduces. [`UseDefChains`] is the transposed view, and
//! [`Ancestors`] tracks node parentage for downstream passes.
//!
//! ```
//! use grebe_python_semantic::{DefUseChains, NodeKey};
//! use ruff_python_ast as ast;
//! use ruff_python_parser::{parse, Mode};
//! use ruff_source_file::SourceFileBuilder;
//!
//! let source = "from b import c, d; c()";
//! let parsed = parse(source, Mode::Module.into()).unwrap();
//! let ast::Mod::Module(module) = parsed.into_syntax() else {
//!     unreachable!();
//! };
//! let mut chains = DefUseChains::new(SourceFileBuilder::new("demo.py", source).finish());
//! chains.visit_module(&module);
//! assert_eq!(
//!     chains.dump_chains(NodeKey::from_module(&module)),
//!     ["c -> (c -> (Call -> ()))", "d -> ()"],
//! );
//! ```

mod ancestors;
mod builder;
mod builtins;
mod definition;
mod diagnostic;
mod locals;
mod node_key;
mod scope;
mod use_def;

pub use ancestors::Ancestors;
pub use builder::DefUseChains;
pub use definition::{Def, DefId, DefKind, Defs};
pub use diagnostic::Diagnostic;
pub use node_key::{NodeKey, NodeKind};
pub use use_def::UseDefChains;
