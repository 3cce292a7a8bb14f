use indexmap::IndexSet;
use ruff_python_ast::name::Name;
use ruff_text_size::TextRange;
use rustc_hash::FxBuildHasher;

use crate::node_key::{NodeKey, NodeKind};

/// ID of a [`Def`] in the analyzer's arena.
///
/// The def-use graph is cyclic (a loop body can make a definition one of its
/// own users), so defs reference each other by id rather than by ownership.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefId(u32);

impl DefId {
    pub(crate) fn from_usize(index: usize) -> Self {
        Self(u32::try_from(index).expect("fewer than 2^32 definitions per module"))
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

pub(crate) type DefSet = IndexSet<DefId, FxBuildHasher>;

/// What a definition record stands for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DefKind {
    /// A name binding: assignment target, parameter, loop or `with` target,
    /// handler or pattern name, named-expression target.
    Name(Name),
    /// A `def` (sync or async).
    Function(Name),
    /// A `class`.
    Class(Name),
    /// An import alias; the name is the one actually bound (the as-name, the
    /// root segment of a dotted import, or `*`).
    Alias(Name),
    /// One of the interpreter's builtin names, seeded before analysis.
    Builtin(&'static str),
    /// The implicit `__class__` cell installed in class bodies.
    ClassCell,
    /// Any other value-producing node, identified by its kind tag.
    Node(NodeKind),
}

/// A node of the def-use graph: either a binding site or a value-producing
/// expression, together with the ordered set of defs consuming its value.
#[derive(Debug)]
pub struct Def {
    kind: DefKind,
    node: Option<NodeKey>,
    range: TextRange,
    users: DefSet,
}

impl Def {
    /// The name this definition binds, or its node-kind tag when it binds
    /// nothing (used for display).
    pub fn name(&self) -> &str {
        match &self.kind {
            DefKind::Name(name)
            | DefKind::Function(name)
            | DefKind::Class(name)
            | DefKind::Alias(name) => name.as_str(),
            DefKind::Builtin(name) => name,
            DefKind::ClassCell => "__class__",
            DefKind::Node(kind) => kind.as_str(),
        }
    }

    pub fn kind(&self) -> &DefKind {
        &self.kind
    }

    /// Key of the AST node this def wraps; `None` for synthetic defs
    /// (builtins, `__class__`).
    pub fn node(&self) -> Option<NodeKey> {
        self.node
    }

    pub fn range(&self) -> TextRange {
        self.range
    }

    /// The defs holding a reference to this one, in insertion order.
    pub fn users(&self) -> impl ExactSizeIterator<Item = DefId> + '_ {
        self.users.iter().copied()
    }
}

/// Append-only arena of definition records.
#[derive(Debug, Default)]
pub struct Defs {
    defs: Vec<Def>,
}

impl Defs {
    pub(crate) fn alloc(&mut self, kind: DefKind, node: Option<NodeKey>, range: TextRange) -> DefId {
        let id = DefId::from_usize(self.defs.len());
        self.defs.push(Def {
            kind,
            node,
            range,
            users: DefSet::default(),
        });
        id
    }

    pub(crate) fn add_user(&mut self, def: DefId, user: DefId) {
        self.defs[def.as_usize()].users.insert(user);
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Render one definition chain, following users depth-first. A def
    /// reached again on its own path prints as a back-reference `(#N)` where
    /// `N` is its position on that path.
    pub fn render(&self, def: DefId) -> String {
        let mut path = Vec::new();
        self.render_onto(def, &mut path)
    }

    fn render_onto(&self, def: DefId, path: &mut Vec<DefId>) -> String {
        if let Some(position) = path.iter().position(|&ancestor| ancestor == def) {
            return format!("(#{position})");
        }
        path.push(def);
        let record = &self[def];
        let mut users = Vec::with_capacity(record.users.len());
        for &user in &record.users {
            users.push(self.render_onto(user, path));
        }
        path.pop();
        format!("{} -> ({})", record.name(), users.join(", "))
    }
}

impl std::ops::Index<DefId> for Defs {
    type Output = Def;

    fn index(&self, id: DefId) -> &Def {
        &self.defs[id.as_usize()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name_def(defs: &mut Defs, name: &str) -> DefId {
        defs.alloc(DefKind::Name(Name::new(name)), None, TextRange::default())
    }

    #[test]
    fn render_follows_users() {
        let mut defs = Defs::default();
        let a = name_def(&mut defs, "a");
        let use_a = name_def(&mut defs, "a");
        let binop = defs.alloc(DefKind::Node(NodeKind::BinOp), None, TextRange::default());
        defs.add_user(a, use_a);
        defs.add_user(use_a, binop);
        assert_eq!(defs.render(a), "a -> (a -> (BinOp -> ()))");
    }

    #[test]
    fn render_breaks_cycles_with_back_references() {
        let mut defs = Defs::default();
        let a = name_def(&mut defs, "a");
        let b = name_def(&mut defs, "a");
        defs.add_user(a, b);
        defs.add_user(b, b);
        assert_eq!(defs.render(a), "a -> (a -> ((#1)))");
    }

    #[test]
    fn users_deduplicate_but_keep_order() {
        let mut defs = Defs::default();
        let a = name_def(&mut defs, "a");
        let first = name_def(&mut defs, "x");
        let second = name_def(&mut defs, "y");
        defs.add_user(a, first);
        defs.add_user(a, second);
        defs.add_user(a, first);
        let users: Vec<DefId> = defs[a].users().collect();
        assert_eq!(users, [first, second]);
    }
}
