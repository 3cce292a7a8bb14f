//! The defined-but-unused report: module-scope and function-scope locals
//! whose definition records ended up with no users.

use colored::Colorize;
use ruff_python_ast::visitor::{walk_stmt, Visitor};
use ruff_python_ast::{self as ast, Stmt};
use ruff_source_file::{PositionEncoding, SourceFile};
use rustc_hash::FxHashSet;

use grebe_python_semantic::{Ancestors, DefKind, DefUseChains, NodeKey};

pub(crate) fn report_unused(
    filename: &str,
    source_file: &SourceFile,
    module: &ast::ModModule,
    ancestors: &Ancestors,
    chains: &DefUseChains,
) {
    // `from __future__ import ...` aliases are directives, not bindings
    // anyone is expected to read.
    let future_imports: FxHashSet<NodeKey> = module
        .body
        .iter()
        .filter(|stmt| {
            matches!(
                stmt,
                Stmt::ImportFrom(import) if import.module.as_deref() == Some("__future__")
            )
        })
        .map(NodeKey::from_stmt)
        .collect();

    if !filename.ends_with("__init__.py") {
        if let Some(module_key) = chains.module() {
            report_scope(
                source_file,
                chains,
                ancestors,
                &future_imports,
                module_key,
                true,
            );
        }
    }

    let mut collector = FunctionCollector::default();
    for stmt in &module.body {
        collector.visit_stmt(stmt);
    }
    for function in collector.functions {
        report_scope(
            source_file,
            chains,
            ancestors,
            &future_imports,
            function,
            false,
        );
    }
}

#[allow(clippy::print_stdout)]
fn report_scope(
    source_file: &SourceFile,
    chains: &DefUseChains,
    ancestors: &Ancestors,
    future_imports: &FxHashSet<NodeKey>,
    scope: NodeKey,
    module_level: bool,
) {
    for &def_id in chains.local_defs(scope) {
        let def = chains.def(def_id);
        if def.users().len() > 0 {
            continue;
        }
        let name = def.name();
        if name.starts_with('_') {
            continue;
        }
        // At module level, functions, classes, and plain assignments form
        // the module's public surface; only dead imports are worth flagging.
        if module_level
            && matches!(
                def.kind(),
                DefKind::Function(_) | DefKind::Class(_) | DefKind::Name(_)
            )
        {
            continue;
        }

        // Anchor aliases on their import statement.
        let location_key = match def.kind() {
            DefKind::Alias(_) => def.node().and_then(|key| ancestors.parent_stmt(key)),
            _ => def.node(),
        };
        if let Some(key) = location_key {
            if future_imports.contains(&key) {
                continue;
            }
        }

        let range = location_key.map_or(def.range(), NodeKey::range);
        let location = source_file
            .to_source_code()
            .source_location(range.start(), PositionEncoding::Utf8);
        println!(
            "{} '{}' is defined but not used at {}:{}:{}",
            "W:".yellow(),
            name,
            source_file.name(),
            location.line,
            location.character_offset.to_zero_indexed()
        );
    }
}

#[derive(Default)]
struct FunctionCollector {
    functions: Vec<NodeKey>,
}

impl<'a> Visitor<'a> for FunctionCollector {
    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        if matches!(stmt, Stmt::FunctionDef(_)) {
            self.functions.push(NodeKey::from_stmt(stmt));
        }
        walk_stmt(self, stmt);
    }
}
