use indexmap::IndexMap;
use itertools::Itertools;
use rustc_hash::FxBuildHasher;

use crate::builder::DefUseChains;
use crate::definition::DefId;
use crate::node_key::{NodeKey, NodeKind};

/// The transposed view of a [`DefUseChains`] result: for every use site,
/// the definitions that reach it.
///
/// Name nodes appear even when nothing reaches them, so "no reaching defs"
/// is observable. Builtin defs participate like any other.
pub struct UseDefChains<'b, 'ast> {
    analyzer: &'b DefUseChains<'ast>,
    chains: IndexMap<NodeKey, Vec<DefId>, FxBuildHasher>,
}

impl<'b, 'ast> UseDefChains<'b, 'ast> {
    pub fn new(analyzer: &'b DefUseChains<'ast>) -> Self {
        let mut chains: IndexMap<NodeKey, Vec<DefId>, FxBuildHasher> = IndexMap::default();
        for (&key, &def) in analyzer.chains() {
            if key.kind() == NodeKind::Name {
                chains.entry(key).or_default();
            }
            for user in analyzer.def(def).users() {
                if let Some(user_key) = analyzer.def(user).node() {
                    chains.entry(user_key).or_default().push(def);
                }
            }
        }
        for (_, def) in analyzer.builtin_defs() {
            for user in analyzer.def(def).users() {
                if let Some(user_key) = analyzer.def(user).node() {
                    chains.entry(user_key).or_default().push(def);
                }
            }
        }
        Self { analyzer, chains }
    }

    /// Map from each use-site node to the defs reaching it.
    pub fn chains(&self) -> &IndexMap<NodeKey, Vec<DefId>, FxBuildHasher> {
        &self.chains
    }

    pub fn defs_for(&self, use_site: NodeKey) -> &[DefId] {
        self.chains.get(&use_site).map_or(&[], Vec::as_slice)
    }
}

impl std::fmt::Display for UseDefChains<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut entries: Vec<(String, String)> = self
            .chains
            .iter()
            .map(|(key, defs)| {
                let use_name = self.analyzer.def(self.analyzer.chains()[key]).name();
                let def_names = defs
                    .iter()
                    .map(|&def| self.analyzer.def(def).name())
                    .sorted()
                    .join(", ");
                (use_name.to_string(), format!("{use_name} <- {{{def_names}}}"))
            })
            .collect();
        entries.sort();
        f.write_str(&entries.into_iter().map(|(_, entry)| entry).join(", "))
    }
}
