use indexmap::IndexMap;
use ruff_python_ast::{self as ast, name::Name};
use rustc_hash::FxBuildHasher;

use crate::definition::DefSet;
use crate::node_key::NodeKey;

/// One level of the definition map stack: the reaching definitions per name
/// at some point in control flow. Insertion-ordered, because merge and drain
/// order is observable through the rendered chains.
pub(crate) type DefLayer = IndexMap<Name, DefSet, FxBuildHasher>;

/// ID of a definition layer in the analyzer's arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct LayerId(u32);

impl LayerId {
    fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Append-only arena of definition layers.
///
/// The live definition stack and every deferred-function snapshot hold
/// `LayerId`s into this arena, so a snapshot observes later mutations of the
/// layers it captured. That sharing is what lets a deferred body resolve
/// names against the enclosing scope's final state, and lets a `global`
/// store performed during a deferred body land in the very module base layer
/// the post-analysis checks inspect.
#[derive(Debug, Default)]
pub(crate) struct Layers {
    layers: Vec<DefLayer>,
}

impl Layers {
    pub(crate) fn alloc(&mut self) -> LayerId {
        let id = LayerId(u32::try_from(self.layers.len()).expect("layer arena overflow"));
        self.layers.push(DefLayer::default());
        id
    }

    pub(crate) fn alloc_clone(&mut self, of: LayerId) -> LayerId {
        let copy = self.layers[of.as_usize()].clone();
        let id = LayerId(u32::try_from(self.layers.len()).expect("layer arena overflow"));
        self.layers.push(copy);
        id
    }

    pub(crate) fn get(&self, id: LayerId) -> &DefLayer {
        &self.layers[id.as_usize()]
    }

    pub(crate) fn get_mut(&mut self, id: LayerId) -> &mut DefLayer {
        &mut self.layers[id.as_usize()]
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ScopeKind {
    Module,
    Function,
    Lambda,
    Class,
    Comprehension,
}

/// A frame of the scope stack.
#[derive(Copy, Clone, Debug)]
pub(crate) struct ScopeInfo {
    pub(crate) key: NodeKey,
    pub(crate) kind: ScopeKind,
}

/// Reference to a node that introduces a scope, used to run the local-name
/// pre-pass on scope entry.
#[derive(Copy, Clone, Debug)]
pub(crate) enum ScopeNode<'ast> {
    Module(&'ast ast::ModModule),
    Function(&'ast ast::StmtFunctionDef),
    Class(&'ast ast::StmtClassDef),
    Lambda(&'ast ast::ExprLambda),
    ListComp(&'ast ast::ExprListComp),
    SetComp(&'ast ast::ExprSetComp),
    DictComp(&'ast ast::ExprDictComp),
    Generator(&'ast ast::ExprGenerator),
}
