//! Flow-sensitive def-use chain construction.
//!
//! [`DefUseChains`] walks one module and records, for every binding and every
//! value-producing expression, a definition record whose users are the
//! expressions consuming that value. Control flow is modeled with a stack of
//! definition layers: each scope owns a base layer, and every branch arm
//! (`if`/`else`, loop bodies, `try` blocks, handlers, `match` cases) pushes a
//! copy that is merged back when the arm closes. Loop bodies run twice so
//! definitions made late in the body reach uses earlier in it; uses that stay
//! unresolved during the first pass are parked in an undef frame and patched
//! up (or reported) once the body has been seen whole.
//!
//! Function and lambda bodies are not analyzed where they appear. Their
//! declaration installs the name and evaluates defaults, annotations, and
//! decorators in the enclosing scope, then parks the body together with a
//! snapshot of the scope stack; the queue is drained after the module body,
//! so forward references resolve against the enclosing scope's final state.
//! Class bodies, by contrast, execute eagerly at their definition site.

use indexmap::IndexMap;
use ruff_python_ast::{self as ast, name::Name, Expr, ExprContext, Stmt};
use ruff_source_file::{PositionEncoding, SourceFile};
use ruff_text_size::{Ranged, TextRange};
use rustc_hash::{FxBuildHasher, FxHashSet};
use smallvec::SmallVec;

use crate::builtins::BUILTIN_NAMES;
use crate::definition::{Def, DefId, DefKind, DefSet, Defs};
use crate::diagnostic::Diagnostic;
use crate::locals::collect_locals;
use crate::node_key::{NodeKey, NodeKind};
use crate::scope::{DefLayer, LayerId, Layers, ScopeInfo, ScopeKind, ScopeNode};

/// Definitions reaching one use site.
type Reaching = SmallVec<[DefId; 4]>;

/// Uses that could not be resolved inside a loop body, keyed by name, each
/// with the star-import defs that partially covered it.
type UndefFrame = IndexMap<Name, Vec<(DefId, Vec<DefId>)>, FxBuildHasher>;

#[derive(Copy, Clone, PartialEq, Eq)]
enum Step {
    Declaration,
    Definition,
}

#[derive(Copy, Clone)]
enum DeferredNode<'ast> {
    Function(&'ast ast::StmtFunctionDef),
    Lambda(&'ast ast::ExprLambda),
}

/// A function or lambda body parked until the module body has been walked,
/// with the scope stack captured at its declaration site. Layers are shared
/// with the live analysis through the arena, so the body observes the
/// enclosing scopes' final state.
#[derive(Clone)]
struct Deferred<'ast> {
    node: DeferredNode<'ast>,
    definitions: Vec<LayerId>,
    scopes: Vec<ScopeInfo>,
    scope_depths: Vec<i32>,
    precomputed_locals: Vec<FxHashSet<Name>>,
}

/// Def-use chain analyzer for one module.
///
/// After [`visit_module`](Self::visit_module) the results are read through
/// [`chains`](Self::chains) (node → def), [`locals`](Self::locals)
/// (scope node → defs introduced there), and
/// [`diagnostics`](Self::diagnostics).
pub struct DefUseChains<'ast> {
    source: SourceFile,

    defs: Defs,
    chains: IndexMap<NodeKey, DefId, FxBuildHasher>,
    locals: IndexMap<NodeKey, Vec<DefId>, FxBuildHasher>,
    builtins: IndexMap<&'static str, DefId, FxBuildHasher>,
    diagnostics: Vec<Diagnostic>,
    module: Option<NodeKey>,

    layers: Layers,
    deferred: Vec<Deferred<'ast>>,
    /// The definition layer stack. The bottom `-scope_depths[0]` layers
    /// belong to the module scope, and so on upward.
    definitions: Vec<LayerId>,
    scopes: Vec<ScopeInfo>,
    /// Layer count per scope frame, counted negatively: `-1` for a scope
    /// with just its base layer, one less per active branch layer.
    scope_depths: Vec<i32>,
    globals: Vec<FxHashSet<Name>>,
    precomputed_locals: Vec<FxHashSet<Name>>,
    undefs: Vec<UndefFrame>,
    breaks: Vec<DefLayer>,
    continues: Vec<DefLayer>,
    /// Non-zero after an unconditional transfer; definition writes are
    /// suppressed until the enclosing block unwinds.
    deadcode: u32,
}

impl<'ast> DefUseChains<'ast> {
    pub fn new(source: SourceFile) -> Self {
        let mut defs = Defs::default();
        let mut builtins = IndexMap::default();
        for &name in BUILTIN_NAMES {
            let def = defs.alloc(DefKind::Builtin(name), None, TextRange::default());
            builtins.insert(name, def);
        }
        Self {
            source,
            defs,
            chains: IndexMap::default(),
            locals: IndexMap::default(),
            builtins,
            diagnostics: Vec::new(),
            module: None,
            layers: Layers::default(),
            deferred: Vec::new(),
            definitions: Vec::new(),
            scopes: Vec::new(),
            scope_depths: Vec::new(),
            globals: Vec::new(),
            precomputed_locals: Vec::new(),
            undefs: Vec::new(),
            breaks: Vec::new(),
            continues: Vec::new(),
            deadcode: 0,
        }
    }

    //
    // Results
    //

    pub fn defs(&self) -> &Defs {
        &self.defs
    }

    pub fn def(&self, id: DefId) -> &Def {
        &self.defs[id]
    }

    /// Map from every tracked node to its definition record.
    pub fn chains(&self) -> &IndexMap<NodeKey, DefId, FxBuildHasher> {
        &self.chains
    }

    /// Map from each scope node to the defs introduced locally, in first
    /// appearance order, deduplicated.
    pub fn locals(&self) -> &IndexMap<NodeKey, Vec<DefId>, FxBuildHasher> {
        &self.locals
    }

    pub fn local_defs(&self, scope: NodeKey) -> &[DefId] {
        self.locals.get(&scope).map_or(&[], Vec::as_slice)
    }

    pub fn builtin_defs(&self) -> impl Iterator<Item = (&'static str, DefId)> + '_ {
        self.builtins.iter().map(|(&name, &def)| (name, def))
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn source(&self) -> &SourceFile {
        &self.source
    }

    /// Key of the analyzed module, once visited.
    pub fn module(&self) -> Option<NodeKey> {
        self.module
    }

    /// Sorted names of the defs local to `scope`; mirrors `locals()` from
    /// the analyzed program's point of view.
    pub fn dump_definitions(&self, scope: NodeKey, ignore_builtins: bool) -> Vec<String> {
        let mut names: Vec<String> = if !ignore_builtins && Some(scope) == self.module {
            let builtin_ids: FxHashSet<DefId> = self.builtins.values().copied().collect();
            self.local_defs(scope)
                .iter()
                .filter(|def| !builtin_ids.contains(def))
                .map(|&def| self.defs[def].name().to_string())
                .collect()
        } else {
            self.local_defs(scope)
                .iter()
                .map(|&def| self.defs[def].name().to_string())
                .collect()
        };
        names.sort();
        names
    }

    /// One rendered chain per def local to `scope`.
    pub fn dump_chains(&self, scope: NodeKey) -> Vec<String> {
        self.local_defs(scope)
            .iter()
            .map(|&def| self.defs.render(def))
            .collect()
    }

    //
    // Scope and layer machinery
    //

    fn enter_scope(&mut self, info: ScopeInfo, node: ScopeNode<'ast>) {
        tracing::trace!("entering {:?} scope", info.kind);
        self.scopes.push(info);
        self.scope_depths.push(-1);
        let layer = self.layers.alloc();
        self.definitions.push(layer);
        self.globals.push(FxHashSet::default());
        self.precomputed_locals.push(collect_locals(node));
    }

    fn exit_scope(&mut self) {
        self.precomputed_locals.pop();
        self.globals.pop();
        self.definitions.pop();
        self.scope_depths.pop();
        let info = self.scopes.pop();
        tracing::trace!("left {:?} scope", info.map(|info| info.kind));
    }

    fn top_layer(&self) -> LayerId {
        *self
            .definitions
            .last()
            .expect("the definition stack always holds the current scope's base layer")
    }

    fn push_layer(&mut self, layer: LayerId) {
        self.definitions.push(layer);
        *self
            .scope_depths
            .last_mut()
            .expect("a scope frame is always active") -= 1;
    }

    fn pop_layer(&mut self) -> LayerId {
        *self
            .scope_depths
            .last_mut()
            .expect("a scope frame is always active") += 1;
        self.definitions
            .pop()
            .expect("pop_layer pairs with push_layer")
    }

    /// Open a branch context seeded with the current reaching definitions.
    fn push_copy_layer(&mut self) -> LayerId {
        let copy = self.layers.alloc_clone(self.top_layer());
        self.push_layer(copy);
        copy
    }

    /// Open a branch context seeded empty.
    fn push_empty_layer(&mut self) -> LayerId {
        let layer = self.layers.alloc();
        self.push_layer(layer);
        layer
    }

    fn is_global(&self, name: &Name) -> bool {
        self.globals.iter().any(|globals| globals.contains(name))
    }

    fn set_definition(&mut self, name: Name, defs: DefSet) {
        if self.deadcode > 0 {
            return;
        }
        let top = self.top_layer();
        self.layers.get_mut(top).insert(name, defs);
    }

    fn set_definition_one(&mut self, name: Name, def: DefId) {
        let mut set = DefSet::default();
        set.insert(def);
        self.set_definition(name, set);
    }

    fn extend_definition(&mut self, name: Name, defs: impl IntoIterator<Item = DefId>) {
        if self.deadcode > 0 {
            return;
        }
        let top = self.top_layer();
        self.layers
            .get_mut(top)
            .entry(name)
            .or_default()
            .extend(defs);
    }

    fn extend_global(&mut self, name: Name, defs: impl IntoIterator<Item = DefId>) {
        if self.deadcode > 0 {
            return;
        }
        let base = self.definitions[0];
        self.layers
            .get_mut(base)
            .entry(name)
            .or_default()
            .extend(defs);
    }

    /// Store under a `global`-declared name: the def lands in the module
    /// base layer and, on first appearance, in the module's locals.
    fn set_or_extend_global(&mut self, name: Name, def: DefId) {
        if self.deadcode > 0 {
            return;
        }
        let base = self.definitions[0];
        if !self.layers.get(base).contains_key(&name) {
            let module = self.module.expect("module scope is entered first");
            let entry = self.locals.entry(module).or_default();
            if !entry.contains(&def) {
                entry.push(def);
            }
        }
        self.layers
            .get_mut(base)
            .entry(name)
            .or_default()
            .extend([def]);
    }

    /// Union every entry of an arena layer into the current top layer.
    fn extend_from_layer(&mut self, layer: LayerId) {
        let entries: Vec<(Name, Vec<DefId>)> = self
            .layers
            .get(layer)
            .iter()
            .map(|(name, set)| (name.clone(), set.iter().copied().collect()))
            .collect();
        for (name, defs) in entries {
            self.extend_definition(name, defs);
        }
    }

    fn extend_from_carrier(&mut self, carrier: DefLayer) {
        for (name, set) in carrier {
            self.extend_definition(name, set);
        }
    }

    /// Close an `if`-style pair of branch layers: names bound in both arms
    /// replace the outer entry with the union of the two, names bound in one
    /// arm only are added to whatever reached the branch.
    fn merge_branch_layers(&mut self, body: LayerId, orelse: LayerId) {
        let body_entries: Vec<(Name, Vec<DefId>)> = self
            .layers
            .get(body)
            .iter()
            .map(|(name, set)| (name.clone(), set.iter().copied().collect()))
            .collect();
        for (name, defs) in body_entries {
            if let Some(orelse_set) = self.layers.get(orelse).get(&name) {
                let mut union: DefSet = defs.into_iter().collect();
                union.extend(orelse_set.iter().copied());
                self.set_definition(name, union);
            } else {
                self.extend_definition(name, defs);
            }
        }
        let orelse_entries: Vec<(Name, Vec<DefId>)> = self
            .layers
            .get(orelse)
            .iter()
            .filter(|(name, _)| !self.layers.get(body).contains_key(*name))
            .map(|(name, set)| (name.clone(), set.iter().copied().collect()))
            .collect();
        for (name, defs) in orelse_entries {
            self.extend_definition(name, defs);
        }
    }

    fn add_local(&mut self, def: DefId) {
        let scope = self
            .scopes
            .last()
            .expect("a scope frame is always active")
            .key;
        let entry = self.locals.entry(scope).or_default();
        if !entry.contains(&def) {
            entry.push(def);
        }
    }

    //
    // Definition records
    //

    fn existing_or_new(
        &mut self,
        key: NodeKey,
        kind: impl FnOnce() -> DefKind,
        range: TextRange,
    ) -> DefId {
        if let Some(&def) = self.chains.get(&key) {
            def
        } else {
            let def = self.defs.alloc(kind(), Some(key), range);
            self.chains.insert(key, def);
            def
        }
    }

    fn unbound_identifier(&mut self, name: &Name, range: TextRange) {
        let location = self
            .source
            .to_source_code()
            .source_location(range.start(), PositionEncoding::Utf8);
        tracing::debug!("unbound identifier `{name}`");
        self.diagnostics.push(Diagnostic {
            name: name.clone(),
            filename: self.source.name().to_string(),
            line: location.line,
            column: location.character_offset.to_zero_indexed(),
        });
    }

    //
    // Name resolution
    //

    /// The layers to search for `name`, most relevant first, honoring the
    /// `global` keyword, the class-scope skip, and the read-before-assign
    /// rule. Empty when the lookup is known to be invalid.
    fn candidate_layers(&self, name: &Name) -> Vec<LayerId> {
        let mut searched = Vec::new();
        if self.is_global(name) {
            let module_layers = (-self.scope_depths[0]) as usize;
            searched.extend(&self.definitions[..module_layers]);
            return searched;
        }

        let end = self.definitions.len();
        let innermost = *self.scopes.last().expect("a scope frame is always active");
        let innermost_depth = *self
            .scope_depths
            .last()
            .expect("a scope frame is always active");
        let inner_low = end - (-innermost_depth) as usize;
        let inner_layers = &self.definitions[inner_low..end];

        let precomputed = self
            .precomputed_locals
            .last()
            .expect("a scope frame is always active");
        if self.invalid_name_lookup(name, innermost.kind, precomputed, inner_layers) {
            return searched;
        }
        searched.extend(inner_layers.iter().rev());

        // Walk the enclosing scopes outward. Class scopes are invisible to
        // nested lookups; the module frame always remains reachable.
        let mut level = innermost_depth as isize;
        for index in (0..self.scopes.len() - 1).rev() {
            let scope = self.scopes[index];
            let depth = self.scope_depths[index] as isize;
            if scope.kind != ScopeKind::Class {
                let high = (end as isize + level) as usize;
                let low = (end as isize + level + depth) as usize;
                let outer_layers = &self.definitions[low..high];
                if self.invalid_name_lookup(
                    name,
                    innermost.kind,
                    &self.precomputed_locals[index],
                    outer_layers,
                ) {
                    searched.clear();
                    break;
                }
                searched.extend(outer_layers.iter().rev());
            }
            level += depth;
        }
        searched
    }

    /// The read-before-assign check: `name` is statically known to be local
    /// to the frame owning `layers` but no binding for it (nor a `*`
    /// wildcard) has reached any of them. At class scope a module-level
    /// binding rescues the lookup.
    fn invalid_name_lookup(
        &self,
        name: &Name,
        base_kind: ScopeKind,
        precomputed: &FxHashSet<Name>,
        layers: &[LayerId],
    ) -> bool {
        if !precomputed.contains(name) {
            return false;
        }
        let star = Name::new_static("*");
        let is_local = layers.iter().any(|&layer| {
            let layer = self.layers.get(layer);
            layer.contains_key(name) || layer.contains_key(&star)
        });
        if base_kind == ScopeKind::Class {
            let module_layers = (-self.scope_depths[0]) as usize;
            let is_module_global = self.definitions[..module_layers].iter().any(|&layer| {
                let layer = self.layers.get(layer);
                layer.contains_key(name) || layer.contains_key(&star)
            });
            !is_local && !is_module_global
        } else {
            !is_local
        }
    }

    /// Resolve a use of `name` at `key`/`range` to its reaching defs.
    ///
    /// Star-import wildcards met on the way compose additively: an explicit
    /// binding still wins, but the wildcard defs are prepended to the
    /// answer. When nothing binds the name, a fresh def is created for the
    /// use site; inside a loop body it is parked in the undef frame for the
    /// post-body fix-up, otherwise an unbound-identifier diagnostic is
    /// emitted (unless `quiet`).
    fn lookup(&mut self, name: &Name, key: NodeKey, range: TextRange, quiet: bool) -> Reaching {
        let star = Name::new_static("*");
        let mut stars: Vec<DefId> = Vec::new();
        for layer in self.candidate_layers(name) {
            let layer = self.layers.get(layer);
            if let Some(set) = layer.get(name) {
                let mut reaching: Reaching = stars.into_iter().collect();
                reaching.extend(set.iter().copied());
                return reaching;
            }
            if let Some(wildcards) = layer.get(&star) {
                stars.extend(wildcards.iter().copied());
            }
        }

        let def = self.existing_or_new(key, || DefKind::Name(name.clone()), range);
        if let Some(frame) = self.undefs.last_mut() {
            frame
                .entry(name.clone())
                .or_default()
                .push((def, stars.clone()));
        }
        if stars.is_empty() {
            if self.undefs.is_empty() && !quiet {
                self.unbound_identifier(name, range);
            }
            smallvec::smallvec![def]
        } else {
            let mut reaching: Reaching = stars.into_iter().collect();
            reaching.push(def);
            reaching
        }
    }

    //
    // Statement traversal
    //

    /// Walk a statement list, suppressing definition writes after an
    /// unconditional transfer.
    fn process_body(&mut self, stmts: &'ast [Stmt]) {
        let mut deadcode = false;
        for stmt in stmts {
            if !deadcode && matches!(stmt, Stmt::Break(_) | Stmt::Continue(_) | Stmt::Raise(_)) {
                deadcode = true;
                self.deadcode += 1;
            }
            self.visit_stmt(stmt);
        }
        if deadcode {
            self.deadcode -= 1;
        }
    }

    /// Resolve the uses parked during a loop body: names the body ended up
    /// defining retroactively adopt the parked uses, the rest are reported
    /// (unless a star wildcard could have covered them).
    fn process_undefs(&mut self) {
        let frame = self.undefs.pop().expect("undef frame is active in loops");
        let top = self.top_layer();
        for (name, undefs) in frame {
            let new_defs: Option<Vec<DefId>> = self
                .layers
                .get(top)
                .get(&name)
                .map(|set| set.iter().copied().collect());
            if let Some(new_defs) = new_defs {
                for &new_def in &new_defs {
                    for (undef, _) in &undefs {
                        let users: Vec<DefId> = self.defs[*undef].users().collect();
                        for user in users {
                            self.defs.add_user(new_def, user);
                        }
                    }
                }
            } else {
                for (undef, stars) in &undefs {
                    if stars.is_empty() {
                        let range = self.defs[*undef].range();
                        self.unbound_identifier(&name, range);
                    }
                }
            }
        }
    }

    /// Analyze a whole module. The resulting tables remain on `self`.
    pub fn visit_module(&mut self, module: &'ast ast::ModModule) {
        let key = NodeKey::from_module(module);
        self.module = Some(key);
        self.enter_scope(
            ScopeInfo {
                key,
                kind: ScopeKind::Module,
            },
            ScopeNode::Module(module),
        );

        let base = self.top_layer();
        let layer = self.layers.get_mut(base);
        for (&name, &def) in &self.builtins {
            let mut set = DefSet::default();
            set.insert(def);
            layer.insert(Name::new(name), set);
        }

        self.process_body(&module.body);
        self.drain_deferred();
        self.module_sanity_check();
        self.exit_scope();

        debug_assert!(self.definitions.is_empty(), "definition stack must drain");
        debug_assert!(self.scopes.is_empty(), "scope stack must drain");
        debug_assert!(self.scope_depths.is_empty(), "depth stack must drain");
        debug_assert!(self.globals.is_empty(), "globals stack must drain");
        debug_assert!(
            self.precomputed_locals.is_empty(),
            "precomputed-locals stack must drain"
        );
        debug_assert!(self.undefs.is_empty(), "undef frames must drain");
        debug_assert_eq!(self.deadcode, 0, "deadcode depth must unwind");
    }

    /// Analyze the parked function and lambda bodies, FIFO. Bodies deferred
    /// while draining (nested functions) are picked up by the same loop.
    fn drain_deferred(&mut self) {
        let mut index = 0;
        while index < self.deferred.len() {
            let item = self.deferred[index].clone();
            index += 1;
            tracing::trace!("analyzing deferred body {index}");

            let definitions = std::mem::replace(&mut self.definitions, item.definitions);
            let scopes = std::mem::replace(&mut self.scopes, item.scopes);
            let scope_depths = std::mem::replace(&mut self.scope_depths, item.scope_depths);
            let precomputed =
                std::mem::replace(&mut self.precomputed_locals, item.precomputed_locals);

            match item.node {
                DeferredNode::Function(function) => {
                    self.visit_function_def(function, Step::Definition);
                }
                DeferredNode::Lambda(lambda) => {
                    self.visit_lambda(lambda, Step::Definition);
                }
            }

            self.definitions = definitions;
            self.scopes = scopes;
            self.scope_depths = scope_depths;
            self.precomputed_locals = precomputed;
        }
        self.deferred.clear();
    }

    /// Cheap self-check that no local name leaked past the module's base
    /// layer: every module-local must be present there, and the base layer
    /// holds exactly the local heads plus the non-overloaded builtins.
    fn module_sanity_check(&self) {
        #[cfg(debug_assertions)]
        {
            let module = self.module.expect("module scope is entered first");
            let base = self.layers.get(self.definitions[0]);
            let mut heads: FxHashSet<&str> = FxHashSet::default();
            let mut overloaded_builtins: FxHashSet<&str> = FxHashSet::default();
            for &def in self.local_defs(module) {
                let name = self.defs[def].name();
                if self.builtins.contains_key(name) {
                    overloaded_builtins.insert(name);
                }
                debug_assert!(
                    base.contains_key(&Name::new(name)),
                    "module-local `{name}` missing from the base layer"
                );
                heads.insert(name);
            }
            debug_assert_eq!(
                base.len(),
                heads.len() + self.builtins.len() - overloaded_builtins.len(),
                "module base layer holds unexpected entries"
            );
        }
    }

    fn visit_stmt(&mut self, stmt: &'ast Stmt) {
        match stmt {
            Stmt::FunctionDef(function) => self.visit_function_def(function, Step::Declaration),
            Stmt::ClassDef(class) => self.visit_class_def(class),
            Stmt::Return(ast::StmtReturn { value, .. }) => {
                if let Some(value) = value {
                    self.visit_expr(value);
                }
            }
            Stmt::Delete(ast::StmtDelete { targets, .. }) => {
                for target in targets {
                    self.visit_expr(target);
                }
            }
            Stmt::Assign(ast::StmtAssign { targets, value, .. }) => {
                // The def-to-target link is implicit through the store
                // context of each target.
                self.visit_expr(value);
                for target in targets {
                    self.visit_expr(target);
                }
            }
            Stmt::AugAssign(node) => self.visit_aug_assign(node),
            Stmt::AnnAssign(ast::StmtAnnAssign {
                target,
                annotation,
                value,
                ..
            }) => {
                let value_def = value.as_deref().map(|value| self.visit_expr(value));
                let annotation_def = self.visit_expr(annotation);
                let target_def = self.visit_expr(target);
                self.defs.add_user(target_def, annotation_def);
                if let Some(value_def) = value_def {
                    self.defs.add_user(value_def, target_def);
                }
            }
            Stmt::TypeAlias(node) => {
                let pushed = self.push_type_params(node.type_params.as_deref());
                self.visit_expr(&node.value);
                if pushed {
                    self.pop_layer();
                }
                self.visit_expr(&node.name);
            }
            Stmt::For(node) => self.visit_for(node),
            Stmt::While(node) => self.visit_while(node),
            Stmt::If(node) => {
                self.visit_expr(&node.test);
                self.visit_if_arms(&node.body, &node.elif_else_clauses);
            }
            Stmt::With(ast::StmtWith { items, body, .. }) => {
                for item in items {
                    self.visit_with_item(item);
                }
                self.process_body(body);
            }
            Stmt::Match(node) => self.visit_match(node),
            Stmt::Raise(ast::StmtRaise { exc, cause, .. }) => {
                if let Some(exc) = exc {
                    self.visit_expr(exc);
                }
                if let Some(cause) = cause {
                    self.visit_expr(cause);
                }
            }
            Stmt::Try(node) => self.visit_try(node),
            Stmt::Assert(ast::StmtAssert { test, msg, .. }) => {
                self.visit_expr(test);
                if let Some(msg) = msg {
                    self.visit_expr(msg);
                }
            }
            Stmt::Import(node) => {
                for alias in &node.names {
                    let bound = match &alias.asname {
                        Some(asname) => Name::new(asname.as_str()),
                        None => Name::new(
                            alias
                                .name
                                .as_str()
                                .split('.')
                                .next()
                                .unwrap_or(alias.name.as_str()),
                        ),
                    };
                    let key = NodeKey::from_alias(alias);
                    let def =
                        self.existing_or_new(key, || DefKind::Alias(bound.clone()), alias.range());
                    self.set_definition_one(bound, def);
                    self.add_local(def);
                }
            }
            Stmt::ImportFrom(node) => {
                for alias in &node.names {
                    let bound = match &alias.asname {
                        Some(asname) => Name::new(asname.as_str()),
                        None => Name::new(alias.name.as_str()),
                    };
                    let key = NodeKey::from_alias(alias);
                    let def =
                        self.existing_or_new(key, || DefKind::Alias(bound.clone()), alias.range());
                    self.set_definition_one(bound, def);
                    self.add_local(def);
                }
            }
            Stmt::Global(node) => {
                let frame = self
                    .globals
                    .last_mut()
                    .expect("a scope frame is always active");
                for name in &node.names {
                    frame.insert(Name::new(name.as_str()));
                }
            }
            Stmt::Nonlocal(node) => self.visit_nonlocal(node),
            Stmt::Expr(ast::StmtExpr { value, .. }) => {
                self.visit_expr(value);
            }
            Stmt::Break(_) => self.visit_break(),
            Stmt::Continue(_) => self.visit_continue(),
            Stmt::Pass(_) | Stmt::IpyEscapeCommand(_) => {}
        }
    }

    /// Drain the current layer into the innermost loop's `break` carrier;
    /// the definitions apply only at the loop merge, not to the statements
    /// that follow inside the body.
    fn visit_break(&mut self) {
        if self.breaks.is_empty() {
            return;
        }
        let top = self.top_layer();
        let drained = std::mem::take(self.layers.get_mut(top));
        let carrier = self.breaks.last_mut().expect("checked non-empty");
        for (name, set) in drained {
            carrier.entry(name).or_default().extend(set);
        }
    }

    fn visit_continue(&mut self) {
        if self.continues.is_empty() {
            return;
        }
        let top = self.top_layer();
        let drained = std::mem::take(self.layers.get_mut(top));
        let carrier = self.continues.last_mut().expect("checked non-empty");
        for (name, set) in drained {
            carrier.entry(name).or_default().extend(set);
        }
    }

    /// `if`/`elif`/`else`, as nested two-way branches: each `elif` becomes
    /// an `if` living inside the previous branch's else-arm.
    fn visit_if_arms(&mut self, body: &'ast [Stmt], rest: &'ast [ast::ElifElseClause]) {
        let body_layer = self.push_copy_layer();
        self.process_body(body);
        self.pop_layer();

        let orelse_layer = self.push_copy_layer();
        if let Some((clause, tail)) = rest.split_first() {
            if let Some(test) = &clause.test {
                self.visit_expr(test);
                self.visit_if_arms(&clause.body, tail);
            } else {
                self.process_body(&clause.body);
            }
        }
        self.pop_layer();

        self.merge_branch_layers(body_layer, orelse_layer);
    }

    fn visit_for(&mut self, node: &'ast ast::StmtFor) {
        self.visit_expr(&node.iter);

        self.breaks.push(DefLayer::default());
        self.continues.push(DefLayer::default());
        self.undefs.push(UndefFrame::default());

        let body_layer = self.push_copy_layer();
        self.visit_expr(&node.target);
        self.process_body(&node.body);
        self.process_undefs();

        let continue_defs = self.continues.pop().expect("pushed above");
        self.extend_from_carrier(continue_defs);
        self.continues.push(DefLayer::default());

        // Second pass so definitions made in the body reach uses earlier in
        // it; the chain lattice saturates after this one extra round.
        self.visit_expr(&node.target);
        self.process_body(&node.body);

        let orelse_layer = self.push_empty_layer();
        self.process_body(&node.orelse);
        self.pop_layer();
        self.pop_layer();

        let break_defs = self.breaks.pop().expect("pushed above");
        let continue_defs = self.continues.pop().expect("pushed above");

        self.extend_from_layer(orelse_layer);
        self.extend_from_carrier(continue_defs);
        self.extend_from_carrier(break_defs);
        self.extend_from_layer(body_layer);
    }

    fn visit_while(&mut self, node: &'ast ast::StmtWhile) {
        // One throwaway pass over the `else` suite first: a while loop may
        // complete without running its body, so names bound only there must
        // be resolvable against the pre-loop state.
        self.push_copy_layer();
        self.undefs.push(UndefFrame::default());
        self.breaks.push(DefLayer::default());
        self.continues.push(DefLayer::default());
        self.process_body(&node.orelse);
        self.pop_layer();

        let body_layer = self.push_copy_layer();
        self.visit_expr(&node.test);
        self.process_body(&node.body);
        self.process_undefs();

        let continue_defs = self.continues.pop().expect("pushed above");
        self.extend_from_carrier(continue_defs);
        self.continues.push(DefLayer::default());

        // Second pass, as in `for`.
        self.visit_expr(&node.test);
        self.process_body(&node.body);

        // The test is evaluated once more on the way out.
        self.visit_expr(&node.test);

        let orelse_layer = self.push_copy_layer();
        self.process_body(&node.orelse);
        self.pop_layer();
        self.pop_layer();

        let break_defs = self.breaks.pop().expect("pushed above");
        let continue_defs = self.continues.pop().expect("pushed above");

        self.extend_from_carrier(continue_defs);
        self.extend_from_carrier(break_defs);
        self.extend_from_layer(orelse_layer);
        self.extend_from_layer(body_layer);
    }

    fn visit_try(&mut self, node: &'ast ast::StmtTry) {
        // Body and `else` share one layer treated as possibly-fallible:
        // every definition made there is merged back additively, since any
        // statement may have raised before completing.
        let failsafe_layer = self.push_copy_layer();
        self.process_body(&node.body);
        self.process_body(&node.orelse);
        self.pop_layer();
        self.extend_from_layer(failsafe_layer);

        for handler in &node.handlers {
            let handler_layer = self.push_empty_layer();
            self.visit_except_handler(handler);
            self.pop_layer();
            self.extend_from_layer(handler_layer);
        }

        self.process_body(&node.finalbody);
    }

    fn visit_except_handler(&mut self, handler: &'ast ast::ExceptHandler) {
        let ast::ExceptHandler::ExceptHandler(handler) = handler;
        if let Some(type_) = &handler.type_ {
            self.visit_expr(type_);
        }
        if let Some(name) = &handler.name {
            let key = NodeKey::from_identifier(name);
            let bound = Name::new(name.as_str());
            let def = self.existing_or_new(key, || DefKind::Name(bound.clone()), name.range());
            self.bind_name(bound, def);
        }
        self.process_body(&handler.body);
    }

    fn visit_match(&mut self, node: &'ast ast::StmtMatch) {
        self.visit_expr(&node.subject);
        let mut case_layers = Vec::with_capacity(node.cases.len());
        for case in &node.cases {
            let layer = self.push_copy_layer();
            self.visit_pattern(&case.pattern);
            if let Some(guard) = &case.guard {
                self.visit_expr(guard);
            }
            self.process_body(&case.body);
            self.pop_layer();
            case_layers.push(layer);
        }
        for layer in case_layers {
            self.extend_from_layer(layer);
        }
    }

    fn visit_pattern(&mut self, pattern: &'ast ast::Pattern) {
        match pattern {
            ast::Pattern::MatchValue(match_value) => {
                self.visit_expr(&match_value.value);
            }
            ast::Pattern::MatchSingleton(_) => {}
            ast::Pattern::MatchSequence(match_sequence) => {
                for pattern in &match_sequence.patterns {
                    self.visit_pattern(pattern);
                }
            }
            ast::Pattern::MatchMapping(match_mapping) => {
                for key in &match_mapping.keys {
                    self.visit_expr(key);
                }
                for pattern in &match_mapping.patterns {
                    self.visit_pattern(pattern);
                }
                if let Some(rest) = &match_mapping.rest {
                    self.bind_pattern_name(rest);
                }
            }
            ast::Pattern::MatchClass(match_class) => {
                self.visit_expr(&match_class.cls);
                for pattern in &match_class.arguments.patterns {
                    self.visit_pattern(pattern);
                }
                for keyword in &match_class.arguments.keywords {
                    self.visit_pattern(&keyword.pattern);
                }
            }
            ast::Pattern::MatchStar(match_star) => {
                if let Some(name) = &match_star.name {
                    self.bind_pattern_name(name);
                }
            }
            ast::Pattern::MatchAs(match_as) => {
                if let Some(pattern) = &match_as.pattern {
                    self.visit_pattern(pattern);
                }
                if let Some(name) = &match_as.name {
                    self.bind_pattern_name(name);
                }
            }
            ast::Pattern::MatchOr(match_or) => {
                for pattern in &match_or.patterns {
                    self.visit_pattern(pattern);
                }
            }
        }
    }

    fn bind_pattern_name(&mut self, identifier: &ast::Identifier) {
        let key = NodeKey::from_identifier(identifier);
        let bound = Name::new(identifier.as_str());
        let def = self.existing_or_new(key, || DefKind::Name(bound.clone()), identifier.range());
        self.bind_name(bound, def);
    }

    fn visit_nonlocal(&mut self, node: &'ast ast::StmtNonlocal) {
        for identifier in &node.names {
            let name = Name::new(identifier.as_str());
            // Alias the nearest enclosing binding into the current layer,
            // whichever scope it lives in.
            let mut found = None;
            for &layer in self.definitions[..self.definitions.len() - 1].iter().rev() {
                if let Some(set) = self.layers.get(layer).get(&name) {
                    found = Some(set.clone());
                    break;
                }
            }
            match found {
                Some(set) => self.set_definition(name, set),
                None => self.unbound_identifier(&name, node.range()),
            }
        }
    }

    fn visit_aug_assign(&mut self, node: &'ast ast::StmtAugAssign) {
        let value_def = self.visit_expr(&node.value);
        match &*node.target {
            Expr::Name(target) => {
                // The target is read first; the same record then becomes the
                // new definition of the name.
                let target_def = self.visit_name_load(target);
                self.defs.add_user(value_def, target_def);
                let name = target.id.clone();
                if self.is_global(&name) {
                    self.extend_global(name, [target_def]);
                } else {
                    let key = NodeKey::from_expr(&node.target);
                    let reaching = self.lookup(&name, key, target.range(), true);
                    let from_star = reaching
                        .iter()
                        .any(|&def| self.defs[def].name() == "*");
                    self.set_definition_one(name, target_def);
                    // A target fed only by a wildcard becomes the canonical
                    // definition point of the name.
                    if from_star {
                        self.add_local(target_def);
                    }
                }
            }
            _ => {
                let target_def = self.visit_expr(&node.target);
                self.defs.add_user(target_def, value_def);
            }
        }
    }

    fn visit_function_def(&mut self, node: &'ast ast::StmtFunctionDef, step: Step) {
        let key = NodeKey::from_stmt_function(node);
        match step {
            Step::Declaration => {
                let def = self.existing_or_new(
                    key,
                    || DefKind::Function(Name::new(node.name.as_str())),
                    node.range(),
                );
                self.add_local(def);

                let pushed_type_params = self.push_type_params(node.type_params.as_deref());

                for parameter in node
                    .parameters
                    .posonlyargs
                    .iter()
                    .chain(&node.parameters.args)
                {
                    if let Some(annotation) = &parameter.parameter.annotation {
                        self.visit_expr(annotation);
                    }
                }
                if let Some(vararg) = &node.parameters.vararg {
                    if let Some(annotation) = &vararg.annotation {
                        self.visit_expr(annotation);
                    }
                }
                for parameter in &node.parameters.kwonlyargs {
                    if let Some(annotation) = &parameter.parameter.annotation {
                        self.visit_expr(annotation);
                    }
                }
                if let Some(kwarg) = &node.parameters.kwarg {
                    if let Some(annotation) = &kwarg.annotation {
                        self.visit_expr(annotation);
                    }
                }

                // Defaults are evaluated at declaration time and keep the
                // function object alive, hence the user link.
                for parameter in &node.parameters.kwonlyargs {
                    if let Some(default) = &parameter.default {
                        let default_def = self.visit_expr(default);
                        self.defs.add_user(default_def, def);
                    }
                }
                for parameter in node
                    .parameters
                    .posonlyargs
                    .iter()
                    .chain(&node.parameters.args)
                {
                    if let Some(default) = &parameter.default {
                        let default_def = self.visit_expr(default);
                        self.defs.add_user(default_def, def);
                    }
                }

                for decorator in &node.decorator_list {
                    self.visit_expr(&decorator.expression);
                }
                if let Some(returns) = &node.returns {
                    self.visit_expr(returns);
                }

                self.set_definition_one(Name::new(node.name.as_str()), def);
                self.defer(DeferredNode::Function(node));

                if pushed_type_params {
                    self.pop_layer();
                }
            }
            Step::Definition => {
                self.enter_scope(
                    ScopeInfo {
                        key,
                        kind: ScopeKind::Function,
                    },
                    ScopeNode::Function(node),
                );
                self.visit_parameters(&node.parameters);
                self.process_body(&node.body);
                self.exit_scope();
            }
        }
    }

    fn visit_lambda(&mut self, node: &'ast ast::ExprLambda, step: Step) -> DefId {
        let key = NodeKey::new(NodeKind::Lambda, node.range());
        match step {
            Step::Declaration => {
                let def = self.existing_or_new(key, || DefKind::Node(NodeKind::Lambda), node.range());
                if let Some(parameters) = &node.parameters {
                    for parameter in &parameters.kwonlyargs {
                        if let Some(default) = &parameter.default {
                            let default_def = self.visit_expr(default);
                            self.defs.add_user(default_def, def);
                        }
                    }
                    for parameter in parameters.posonlyargs.iter().chain(&parameters.args) {
                        if let Some(default) = &parameter.default {
                            let default_def = self.visit_expr(default);
                            self.defs.add_user(default_def, def);
                        }
                    }
                }
                self.defer(DeferredNode::Lambda(node));
                def
            }
            Step::Definition => {
                let def = self.chains[&key];
                self.enter_scope(
                    ScopeInfo {
                        key,
                        kind: ScopeKind::Lambda,
                    },
                    ScopeNode::Lambda(node),
                );
                if let Some(parameters) = &node.parameters {
                    self.visit_parameters(parameters);
                }
                let body_def = self.visit_expr(&node.body);
                self.defs.add_user(body_def, def);
                self.exit_scope();
                def
            }
        }
    }

    fn visit_parameters(&mut self, parameters: &'ast ast::Parameters) {
        for parameter in parameters.posonlyargs.iter().chain(&parameters.args) {
            self.visit_parameter(&parameter.parameter);
        }
        if let Some(vararg) = &parameters.vararg {
            self.visit_parameter(vararg);
        }
        for parameter in &parameters.kwonlyargs {
            self.visit_parameter(&parameter.parameter);
        }
        if let Some(kwarg) = &parameters.kwarg {
            self.visit_parameter(kwarg);
        }
    }

    /// Bind one parameter in the scope being entered. The annotation was
    /// already evaluated in the enclosing scope at declaration time.
    fn visit_parameter(&mut self, parameter: &'ast ast::Parameter) {
        let key = NodeKey::from_parameter(parameter);
        let bound = Name::new(parameter.name.as_str());
        let def = self.existing_or_new(key, || DefKind::Name(bound.clone()), parameter.range());
        self.bind_name(bound, def);
    }

    fn visit_class_def(&mut self, node: &'ast ast::StmtClassDef) {
        let key = NodeKey::from_stmt_class(node);
        let def = self.existing_or_new(
            key,
            || DefKind::Class(Name::new(node.name.as_str())),
            node.range(),
        );
        self.add_local(def);

        let pushed_type_params = self.push_type_params(node.type_params.as_deref());

        if let Some(arguments) = &node.arguments {
            for base in &arguments.args {
                let base_def = self.visit_expr(base);
                self.defs.add_user(base_def, def);
            }
            for keyword in &arguments.keywords {
                let keyword_def = self.visit_expr(&keyword.value);
                self.defs.add_user(keyword_def, def);
            }
        }
        for decorator in &node.decorator_list {
            let decorator_def = self.visit_expr(&decorator.expression);
            self.defs.add_user(decorator_def, def);
        }

        // Class bodies run eagerly at definition time, in their own scope
        // seeded with the implicit `__class__` cell.
        self.enter_scope(
            ScopeInfo {
                key,
                kind: ScopeKind::Class,
            },
            ScopeNode::Class(node),
        );
        let class_cell = self
            .defs
            .alloc(DefKind::ClassCell, None, TextRange::default());
        self.set_definition_one(Name::new_static("__class__"), class_cell);
        self.process_body(&node.body);
        self.exit_scope();

        if pushed_type_params {
            self.pop_layer();
        }

        self.set_definition_one(Name::new(node.name.as_str()), def);
    }

    /// PEP 695 type parameters: bound in an extra definition layer that
    /// stays active for the declaration-time visits and, through the
    /// deferred snapshot, for the deferred body. Returns whether a layer
    /// was pushed.
    fn push_type_params(&mut self, type_params: Option<&'ast ast::TypeParams>) -> bool {
        let Some(type_params) = type_params else {
            return false;
        };
        self.push_empty_layer();
        for type_param in &type_params.type_params {
            match type_param {
                ast::TypeParam::TypeVar(type_var) => {
                    let key = NodeKey::new(NodeKind::TypeParam, type_var.range);
                    let bound = Name::new(type_var.name.as_str());
                    let def =
                        self.existing_or_new(key, || DefKind::Name(bound.clone()), type_var.range);
                    self.set_definition_one(bound, def);
                    if let Some(bound_expr) = &type_var.bound {
                        self.visit_expr(bound_expr);
                    }
                    if let Some(default) = &type_var.default {
                        self.visit_expr(default);
                    }
                }
                ast::TypeParam::ParamSpec(param_spec) => {
                    let key = NodeKey::new(NodeKind::TypeParam, param_spec.range);
                    let bound = Name::new(param_spec.name.as_str());
                    let def = self
                        .existing_or_new(key, || DefKind::Name(bound.clone()), param_spec.range);
                    self.set_definition_one(bound, def);
                    if let Some(default) = &param_spec.default {
                        self.visit_expr(default);
                    }
                }
                ast::TypeParam::TypeVarTuple(type_var_tuple) => {
                    let key = NodeKey::new(NodeKind::TypeParam, type_var_tuple.range);
                    let bound = Name::new(type_var_tuple.name.as_str());
                    let def = self.existing_or_new(
                        key,
                        || DefKind::Name(bound.clone()),
                        type_var_tuple.range,
                    );
                    self.set_definition_one(bound, def);
                    if let Some(default) = &type_var_tuple.default {
                        self.visit_expr(default);
                    }
                }
            }
        }
        true
    }

    fn defer(&mut self, node: DeferredNode<'ast>) {
        self.deferred.push(Deferred {
            node,
            definitions: self.definitions.clone(),
            scopes: self.scopes.clone(),
            scope_depths: self.scope_depths.clone(),
            precomputed_locals: self.precomputed_locals.clone(),
        });
    }

    fn visit_with_item(&mut self, item: &'ast ast::WithItem) -> DefId {
        let key = NodeKey::from_with_item(item);
        let def = self.existing_or_new(key, || DefKind::Node(NodeKind::WithItem), item.range());
        let context_def = self.visit_expr(&item.context_expr);
        self.defs.add_user(context_def, def);
        if let Some(vars) = &item.optional_vars {
            self.visit_expr(vars);
        }
        def
    }

    fn visit_comprehension(&mut self, comprehension: &'ast ast::Comprehension) -> DefId {
        let key = NodeKey::from_comprehension(comprehension);
        let def = self.existing_or_new(
            key,
            || DefKind::Node(NodeKind::Comprehension),
            comprehension.range(),
        );
        let iter_def = self.visit_expr(&comprehension.iter);
        self.defs.add_user(iter_def, def);
        self.visit_expr(&comprehension.target);
        for if_clause in &comprehension.ifs {
            let if_def = self.visit_expr(if_clause);
            self.defs.add_user(if_def, def);
        }
        def
    }

    //
    // Name stores and loads
    //

    fn bind_name(&mut self, name: Name, def: DefId) {
        if self.is_global(&name) {
            self.set_or_extend_global(name, def);
        } else {
            self.set_definition_one(name, def);
            self.add_local(def);
        }
    }

    fn visit_name_store(&mut self, node: &'ast ast::ExprName) -> DefId {
        let key = NodeKey::new(NodeKind::Name, node.range());
        let def = self.existing_or_new(key, || DefKind::Name(node.id.clone()), node.range());
        self.bind_name(node.id.clone(), def);
        def
    }

    fn visit_name_load(&mut self, node: &'ast ast::ExprName) -> DefId {
        let key = NodeKey::new(NodeKind::Name, node.range());
        let existing = self.chains.get(&key).copied();
        let def = existing.unwrap_or_else(|| {
            self.defs
                .alloc(DefKind::Name(node.id.clone()), Some(key), node.range())
        });
        let reaching = self.lookup(&node.id, key, node.range(), false);
        for reached in reaching {
            self.defs.add_user(reached, def);
        }
        if existing.is_none() {
            self.chains.insert(key, def);
        }
        // A `del` drops the binding at runtime; its effect on the reaching
        // set is not modeled.
        def
    }

    /// A store-context list or tuple: recurse into the targets. The
    /// collection node itself gets a def with no users.
    fn visit_destructured(&mut self, key: NodeKey, kind: NodeKind, range: TextRange, elts: &'ast [Expr]) -> DefId {
        let def = self.existing_or_new(key, || DefKind::Node(kind), range);
        for elt in elts {
            match elt {
                Expr::Starred(starred) => {
                    self.visit_expr(&starred.value);
                }
                _ => {
                    self.visit_expr(elt);
                }
            }
        }
        def
    }

    //
    // Expression traversal
    //

    fn visit_expr(&mut self, expr: &'ast Expr) -> DefId {
        let key = NodeKey::from_expr(expr);
        let range = expr.range();
        match expr {
            Expr::Name(name) => match name.ctx {
                ExprContext::Store => self.visit_name_store(name),
                ExprContext::Load | ExprContext::Del | ExprContext::Invalid => {
                    self.visit_name_load(name)
                }
            },
            Expr::BoolOp(node) => {
                let def = self.existing_or_new(key, || DefKind::Node(NodeKind::BoolOp), range);
                for value in &node.values {
                    let value_def = self.visit_expr(value);
                    self.defs.add_user(value_def, def);
                }
                def
            }
            Expr::Named(node) => {
                let def = self.existing_or_new(key, || DefKind::Node(NodeKind::NamedExpr), range);
                let value_def = self.visit_expr(&node.value);
                self.defs.add_user(value_def, def);
                self.visit_expr(&node.target);
                def
            }
            Expr::BinOp(node) => {
                let def = self.existing_or_new(key, || DefKind::Node(NodeKind::BinOp), range);
                let left_def = self.visit_expr(&node.left);
                self.defs.add_user(left_def, def);
                let right_def = self.visit_expr(&node.right);
                self.defs.add_user(right_def, def);
                def
            }
            Expr::UnaryOp(node) => {
                let def = self.existing_or_new(key, || DefKind::Node(NodeKind::UnaryOp), range);
                let operand_def = self.visit_expr(&node.operand);
                self.defs.add_user(operand_def, def);
                def
            }
            Expr::Lambda(node) => self.visit_lambda(node, Step::Declaration),
            Expr::If(node) => {
                let def = self.existing_or_new(key, || DefKind::Node(NodeKind::IfExp), range);
                let test_def = self.visit_expr(&node.test);
                self.defs.add_user(test_def, def);
                let body_def = self.visit_expr(&node.body);
                self.defs.add_user(body_def, def);
                let orelse_def = self.visit_expr(&node.orelse);
                self.defs.add_user(orelse_def, def);
                def
            }
            Expr::Dict(node) => {
                let def = self.existing_or_new(key, || DefKind::Node(NodeKind::Dict), range);
                for item in &node.items {
                    if let Some(dict_key) = &item.key {
                        let key_def = self.visit_expr(dict_key);
                        self.defs.add_user(key_def, def);
                    }
                }
                for item in &node.items {
                    let value_def = self.visit_expr(&item.value);
                    self.defs.add_user(value_def, def);
                }
                def
            }
            Expr::Set(node) => {
                let def = self.existing_or_new(key, || DefKind::Node(NodeKind::Set), range);
                for elt in &node.elts {
                    let elt_def = self.visit_expr(elt);
                    self.defs.add_user(elt_def, def);
                }
                def
            }
            Expr::ListComp(node) => {
                let def = self.existing_or_new(key, || DefKind::Node(NodeKind::ListComp), range);
                self.enter_scope(
                    ScopeInfo {
                        key,
                        kind: ScopeKind::Comprehension,
                    },
                    ScopeNode::ListComp(node),
                );
                for comprehension in &node.generators {
                    let comp_def = self.visit_comprehension(comprehension);
                    self.defs.add_user(comp_def, def);
                }
                let elt_def = self.visit_expr(&node.elt);
                self.defs.add_user(elt_def, def);
                self.exit_scope();
                def
            }
            Expr::SetComp(node) => {
                let def = self.existing_or_new(key, || DefKind::Node(NodeKind::SetComp), range);
                self.enter_scope(
                    ScopeInfo {
                        key,
                        kind: ScopeKind::Comprehension,
                    },
                    ScopeNode::SetComp(node),
                );
                for comprehension in &node.generators {
                    let comp_def = self.visit_comprehension(comprehension);
                    self.defs.add_user(comp_def, def);
                }
                let elt_def = self.visit_expr(&node.elt);
                self.defs.add_user(elt_def, def);
                self.exit_scope();
                def
            }
            Expr::DictComp(node) => {
                let def = self.existing_or_new(key, || DefKind::Node(NodeKind::DictComp), range);
                self.enter_scope(
                    ScopeInfo {
                        key,
                        kind: ScopeKind::Comprehension,
                    },
                    ScopeNode::DictComp(node),
                );
                for comprehension in &node.generators {
                    let comp_def = self.visit_comprehension(comprehension);
                    self.defs.add_user(comp_def, def);
                }
                let key_def = self.visit_expr(&node.key);
                self.defs.add_user(key_def, def);
                let value_def = self.visit_expr(&node.value);
                self.defs.add_user(value_def, def);
                self.exit_scope();
                def
            }
            Expr::Generator(node) => {
                let def =
                    self.existing_or_new(key, || DefKind::Node(NodeKind::GeneratorExp), range);
                self.enter_scope(
                    ScopeInfo {
                        key,
                        kind: ScopeKind::Comprehension,
                    },
                    ScopeNode::Generator(node),
                );
                for comprehension in &node.generators {
                    let comp_def = self.visit_comprehension(comprehension);
                    self.defs.add_user(comp_def, def);
                }
                let elt_def = self.visit_expr(&node.elt);
                self.defs.add_user(elt_def, def);
                self.exit_scope();
                def
            }
            Expr::Await(node) => {
                let def = self.existing_or_new(key, || DefKind::Node(NodeKind::Await), range);
                let value_def = self.visit_expr(&node.value);
                self.defs.add_user(value_def, def);
                def
            }
            Expr::Yield(node) => {
                let def = self.existing_or_new(key, || DefKind::Node(NodeKind::Yield), range);
                if let Some(value) = &node.value {
                    let value_def = self.visit_expr(value);
                    self.defs.add_user(value_def, def);
                }
                def
            }
            Expr::YieldFrom(node) => {
                let def = self.existing_or_new(key, || DefKind::Node(NodeKind::YieldFrom), range);
                let value_def = self.visit_expr(&node.value);
                self.defs.add_user(value_def, def);
                def
            }
            Expr::Compare(node) => {
                let def = self.existing_or_new(key, || DefKind::Node(NodeKind::Compare), range);
                let left_def = self.visit_expr(&node.left);
                self.defs.add_user(left_def, def);
                for comparator in &node.comparators {
                    let comparator_def = self.visit_expr(comparator);
                    self.defs.add_user(comparator_def, def);
                }
                def
            }
            Expr::Call(node) => {
                let def = self.existing_or_new(key, || DefKind::Node(NodeKind::Call), range);
                let func_def = self.visit_expr(&node.func);
                self.defs.add_user(func_def, def);
                for arg in &node.arguments.args {
                    let arg_def = self.visit_expr(arg);
                    self.defs.add_user(arg_def, def);
                }
                for keyword in &node.arguments.keywords {
                    let keyword_def = self.visit_expr(&keyword.value);
                    self.defs.add_user(keyword_def, def);
                }
                def
            }
            Expr::FString(node) => {
                let def = self.existing_or_new(key, || DefKind::Node(NodeKind::JoinedStr), range);
                for interpolation in node.value.elements().filter_map(|e| e.as_interpolation()) {
                    let expr_def = self.visit_expr(&interpolation.expression);
                    self.defs.add_user(expr_def, def);
                    if let Some(format_spec) = &interpolation.format_spec {
                        for nested in format_spec.elements.interpolations() {
                            let nested_def = self.visit_expr(&nested.expression);
                            self.defs.add_user(nested_def, def);
                        }
                    }
                }
                def
            }
            Expr::TString(node) => {
                let def = self.existing_or_new(key, || DefKind::Node(NodeKind::TemplateStr), range);
                for interpolation in node.value.elements().filter_map(|e| e.as_interpolation()) {
                    let expr_def = self.visit_expr(&interpolation.expression);
                    self.defs.add_user(expr_def, def);
                    if let Some(format_spec) = &interpolation.format_spec {
                        for nested in format_spec.elements.interpolations() {
                            let nested_def = self.visit_expr(&nested.expression);
                            self.defs.add_user(nested_def, def);
                        }
                    }
                }
                def
            }
            Expr::StringLiteral(_)
            | Expr::BytesLiteral(_)
            | Expr::NumberLiteral(_)
            | Expr::BooleanLiteral(_)
            | Expr::NoneLiteral(_)
            | Expr::EllipsisLiteral(_) => {
                self.existing_or_new(key, || DefKind::Node(NodeKind::Constant), range)
            }
            Expr::Attribute(node) => {
                let def = self.existing_or_new(key, || DefKind::Node(NodeKind::Attribute), range);
                let value_def = self.visit_expr(&node.value);
                self.defs.add_user(value_def, def);
                def
            }
            Expr::Subscript(node) => {
                let def = self.existing_or_new(key, || DefKind::Node(NodeKind::Subscript), range);
                let value_def = self.visit_expr(&node.value);
                self.defs.add_user(value_def, def);
                let slice_def = self.visit_expr(&node.slice);
                self.defs.add_user(slice_def, def);
                def
            }
            Expr::Starred(node) => {
                let def = self.existing_or_new(key, || DefKind::Node(NodeKind::Starred), range);
                let value_def = self.visit_expr(&node.value);
                self.defs.add_user(value_def, def);
                def
            }
            Expr::List(node) => {
                if matches!(node.ctx, ExprContext::Store) {
                    self.visit_destructured(key, NodeKind::List, range, &node.elts)
                } else {
                    let def = self.existing_or_new(key, || DefKind::Node(NodeKind::List), range);
                    for elt in &node.elts {
                        let elt_def = self.visit_expr(elt);
                        self.defs.add_user(elt_def, def);
                    }
                    def
                }
            }
            Expr::Tuple(node) => {
                if matches!(node.ctx, ExprContext::Store) {
                    self.visit_destructured(key, NodeKind::Tuple, range, &node.elts)
                } else {
                    let def = self.existing_or_new(key, || DefKind::Node(NodeKind::Tuple), range);
                    for elt in &node.elts {
                        let elt_def = self.visit_expr(elt);
                        self.defs.add_user(elt_def, def);
                    }
                    def
                }
            }
            Expr::Slice(node) => {
                let def = self.existing_or_new(key, || DefKind::Node(NodeKind::Slice), range);
                if let Some(lower) = &node.lower {
                    let lower_def = self.visit_expr(lower);
                    self.defs.add_user(lower_def, def);
                }
                if let Some(upper) = &node.upper {
                    let upper_def = self.visit_expr(upper);
                    self.defs.add_user(upper_def, def);
                }
                if let Some(step) = &node.step {
                    let step_def = self.visit_expr(step);
                    self.defs.add_user(step_def, def);
                }
                def
            }
            Expr::IpyEscapeCommand(_) => {
                self.existing_or_new(key, || DefKind::Node(NodeKind::IpyEscapeCommand), range)
            }
        }
    }
}

impl NodeKey {
    fn from_stmt_function(node: &ast::StmtFunctionDef) -> Self {
        Self::new(NodeKind::FunctionDef, node.range())
    }

    fn from_stmt_class(node: &ast::StmtClassDef) -> Self {
        Self::new(NodeKind::ClassDef, node.range())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruff_python_parser::{parse, Mode};
    use ruff_source_file::SourceFileBuilder;

    struct TestCase {
        module: ast::ModModule,
        source: SourceFile,
    }

    fn test_case(source: &str) -> TestCase {
        let parsed = parse(source, Mode::Module.into()).expect("test source must parse");
        let ast::Mod::Module(module) = parsed.into_syntax() else {
            unreachable!("parsed with Mode::Module");
        };
        TestCase {
            module,
            source: SourceFileBuilder::new("<unknown>", source).finish(),
        }
    }

    fn analyzed(case: &TestCase) -> DefUseChains<'_> {
        let mut chains = DefUseChains::new(case.source.clone());
        chains.visit_module(&case.module);
        chains
    }

    #[test]
    fn stacks_drain_after_analysis() {
        let case = test_case("a = 1\nfor i in [a]:\n with open(i) as f:\n  pass");
        let chains = analyzed(&case);
        assert!(chains.definitions.is_empty());
        assert!(chains.scopes.is_empty());
        assert!(chains.scope_depths.is_empty());
        assert!(chains.globals.is_empty());
        assert!(chains.precomputed_locals.is_empty());
        assert!(chains.undefs.is_empty());
        assert!(chains.breaks.is_empty());
        assert!(chains.continues.is_empty());
        assert_eq!(chains.deadcode, 0);
    }

    #[test]
    fn builtin_uses_resolve_without_diagnostics() {
        let case = test_case("print(len([]))");
        let chains = analyzed(&case);
        assert!(chains.diagnostics().is_empty());
        let print_def = chains.builtins["print"];
        assert_eq!(chains.def(print_def).users().len(), 1);
    }

    #[test]
    fn overloading_a_builtin_shadows_it() {
        let case = test_case("print = 1\nprint");
        let chains = analyzed(&case);
        assert!(chains.diagnostics().is_empty());
        let print_def = chains.builtins["print"];
        assert_eq!(chains.def(print_def).users().len(), 0);
        let module = chains.module().expect("module visited");
        assert_eq!(chains.dump_chains(module), ["print -> (print -> ())"]);
    }

    #[test]
    fn stores_after_a_transfer_bind_nothing() {
        let case = test_case("i = 8\nwhile 1:\n break\n i = 3\ni");
        let chains = analyzed(&case);
        let module = chains.module().expect("module visited");
        // The dead store still shows up as a local, with no users.
        assert_eq!(
            chains.dump_chains(module),
            ["i -> (i -> ())", "i -> ()"]
        );
    }

    #[test]
    fn deferred_bodies_see_the_final_module_state() {
        let case = test_case("def f(): return later\nlater = 1");
        let chains = analyzed(&case);
        assert!(chains.diagnostics().is_empty());
        let module = chains.module().expect("module visited");
        assert_eq!(
            chains.dump_definitions(module, true),
            ["f", "later"]
        );
    }

    #[test]
    fn mutually_recursive_functions_resolve() {
        let case = test_case("def even(n): return n == 0 or odd(n - 1)\ndef odd(n): return n != 0 and even(n - 1)");
        let chains = analyzed(&case);
        assert!(chains.diagnostics().is_empty());
    }
}
