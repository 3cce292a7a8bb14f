use ruff_python_ast::visitor::{walk_expr, walk_stmt, Visitor};
use ruff_python_ast::{self as ast, Expr, Stmt};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::node_key::NodeKey;

type Path = SmallVec<[NodeKey; 8]>;

/// Maps every node to the chain of nodes from the module root down to its
/// parent. Downstream passes use it to anchor findings on enclosing
/// statements (an import alias reports at its `import` statement, for
/// instance).
#[derive(Debug, Default)]
pub struct Ancestors {
    parents: FxHashMap<NodeKey, Path>,
    current: Path,
}

impl Ancestors {
    pub fn visit_module(&mut self, module: &ast::ModModule) {
        let key = NodeKey::from_module(module);
        self.parents.insert(key, self.current.clone());
        self.current.push(key);
        for stmt in &module.body {
            self.visit_stmt(stmt);
        }
        self.current.pop();
    }

    fn record(&mut self, key: NodeKey) {
        self.parents.insert(key, self.current.clone());
    }

    /// The immediate parent of `node`.
    pub fn parent(&self, node: NodeKey) -> Option<NodeKey> {
        self.parents.get(&node)?.last().copied()
    }

    /// The chain of ancestors of `node`, root first.
    pub fn parents(&self, node: NodeKey) -> Option<&[NodeKey]> {
        self.parents.get(&node).map(|path| path.as_slice())
    }

    /// The closest enclosing statement of `node`.
    pub fn parent_stmt(&self, node: NodeKey) -> Option<NodeKey> {
        self.parents
            .get(&node)?
            .iter()
            .rev()
            .find(|ancestor| ancestor.kind().is_statement())
            .copied()
    }
}

impl<'a> Visitor<'a> for Ancestors {
    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        let key = NodeKey::from_stmt(stmt);
        self.record(key);
        self.current.push(key);
        walk_stmt(self, stmt);
        self.current.pop();
    }

    fn visit_expr(&mut self, expr: &'a Expr) {
        let key = NodeKey::from_expr(expr);
        self.record(key);
        self.current.push(key);
        walk_expr(self, expr);
        self.current.pop();
    }

    fn visit_alias(&mut self, alias: &'a ast::Alias) {
        self.record(NodeKey::from_alias(alias));
    }

    fn visit_parameter(&mut self, parameter: &'a ast::Parameter) {
        let key = NodeKey::from_parameter(parameter);
        self.record(key);
        self.current.push(key);
        if let Some(annotation) = &parameter.annotation {
            self.visit_expr(annotation);
        }
        self.current.pop();
    }

    fn visit_except_handler(&mut self, handler: &'a ast::ExceptHandler) {
        let ast::ExceptHandler::ExceptHandler(handler) = handler;
        if let Some(type_) = &handler.type_ {
            self.visit_expr(type_);
        }
        for stmt in &handler.body {
            self.visit_stmt(stmt);
        }
    }

    fn visit_with_item(&mut self, item: &'a ast::WithItem) {
        let key = NodeKey::from_with_item(item);
        self.record(key);
        self.current.push(key);
        self.visit_expr(&item.context_expr);
        if let Some(vars) = &item.optional_vars {
            self.visit_expr(vars);
        }
        self.current.pop();
    }

    fn visit_comprehension(&mut self, comprehension: &'a ast::Comprehension) {
        let key = NodeKey::from_comprehension(comprehension);
        self.record(key);
        self.current.push(key);
        self.visit_expr(&comprehension.target);
        self.visit_expr(&comprehension.iter);
        for if_clause in &comprehension.ifs {
            self.visit_expr(if_clause);
        }
        self.current.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_key::NodeKind;
    use ruff_python_parser::{parse, Mode};

    #[test]
    fn alias_parent_is_the_import_statement() {
        let source = "from __future__ import annotations";
        let parsed = parse(source, Mode::Module.into()).expect("test source must parse");
        let ast::Mod::Module(module) = parsed.into_syntax() else {
            unreachable!("parsed with Mode::Module");
        };
        let mut ancestors = Ancestors::default();
        ancestors.visit_module(&module);

        let Stmt::ImportFrom(import) = &module.body[0] else {
            unreachable!("single import statement");
        };
        let alias_key = NodeKey::from_alias(&import.names[0]);
        let parent = ancestors.parent_stmt(alias_key).expect("alias is recorded");
        assert_eq!(parent.kind(), NodeKind::ImportFrom);
        assert_eq!(parent, NodeKey::from_stmt(&module.body[0]));
    }

    #[test]
    fn expression_ancestry_reaches_the_module() {
        let source = "def foo(x): return x + 1";
        let parsed = parse(source, Mode::Module.into()).expect("test source must parse");
        let ast::Mod::Module(module) = parsed.into_syntax() else {
            unreachable!("parsed with Mode::Module");
        };
        let mut ancestors = Ancestors::default();
        ancestors.visit_module(&module);

        let Stmt::FunctionDef(function) = &module.body[0] else {
            unreachable!("single function statement");
        };
        let Stmt::Return(ret) = &function.body[0] else {
            unreachable!("single return statement");
        };
        let binop_key = NodeKey::from_expr(ret.value.as_deref().expect("return has a value"));
        let kinds: Vec<NodeKind> = ancestors
            .parents(binop_key)
            .expect("binop is recorded")
            .iter()
            .map(|key| key.kind())
            .collect();
        assert_eq!(
            kinds,
            [NodeKind::Module, NodeKind::FunctionDef, NodeKind::Return]
        );
    }
}
