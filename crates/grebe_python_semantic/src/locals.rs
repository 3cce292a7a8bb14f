use bitflags::bitflags;
use indexmap::IndexMap;
use ruff_python_ast::{self as ast, name::Name, Expr, ExprContext, Stmt};
use rustc_hash::{FxBuildHasher, FxHashSet};

use crate::scope::ScopeNode;

bitflags! {
    /// How a name is bound inside the scope under scan.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    struct BindingFlags: u8 {
        const ASSIGNED = 1 << 0;
        const IMPORTED = 1 << 1;
        const NONLOCAL = 1 << 2;
        const GLOBAL   = 1 << 3;
    }
}

/// Compute the set of names local to a scope: every name bound somewhere
/// inside it (assignment, loop/`with`/handler/pattern target, import,
/// nested `def`/`class` name), minus names declared `nonlocal` or `global`.
///
/// The scan does not descend into nested functions, classes, lambdas, or
/// comprehensions; it only records their names. The result feeds the
/// read-before-assign rule of the name resolver.
pub(crate) fn collect_locals(scope: ScopeNode) -> FxHashSet<Name> {
    let mut collector = LocalsCollector::default();
    match scope {
        ScopeNode::Module(module) => collector.body(&module.body),
        ScopeNode::Function(function) => {
            for decorator in &function.decorator_list {
                collector.expr(&decorator.expression);
            }
            collector.parameters(&function.parameters);
            if let Some(returns) = &function.returns {
                collector.expr(returns);
            }
            collector.body(&function.body);
        }
        ScopeNode::Class(class) => {
            for decorator in &class.decorator_list {
                collector.expr(&decorator.expression);
            }
            if let Some(arguments) = &class.arguments {
                for base in &arguments.args {
                    collector.expr(base);
                }
                for keyword in &arguments.keywords {
                    collector.expr(&keyword.value);
                }
            }
            collector.body(&class.body);
        }
        ScopeNode::Lambda(lambda) => {
            if let Some(parameters) = &lambda.parameters {
                collector.parameters(parameters);
            }
            collector.expr(&lambda.body);
        }
        ScopeNode::ListComp(comp) => {
            collector.generators(&comp.generators);
            collector.expr(&comp.elt);
        }
        ScopeNode::SetComp(comp) => {
            collector.generators(&comp.generators);
            collector.expr(&comp.elt);
        }
        ScopeNode::DictComp(comp) => {
            collector.generators(&comp.generators);
            collector.expr(&comp.key);
            collector.expr(&comp.value);
        }
        ScopeNode::Generator(comp) => {
            collector.generators(&comp.generators);
            collector.expr(&comp.elt);
        }
    }
    collector.finish()
}

#[derive(Default)]
struct LocalsCollector {
    bindings: IndexMap<Name, BindingFlags, FxBuildHasher>,
}

impl LocalsCollector {
    fn bind(&mut self, name: Name, flags: BindingFlags) {
        *self.bindings.entry(name).or_insert(BindingFlags::empty()) |= flags;
    }

    fn bind_identifier(&mut self, identifier: &ast::Identifier, flags: BindingFlags) {
        self.bind(Name::new(identifier.as_str()), flags);
    }

    fn finish(self) -> FxHashSet<Name> {
        self.bindings
            .into_iter()
            .filter(|(_, flags)| {
                flags.intersects(BindingFlags::ASSIGNED | BindingFlags::IMPORTED)
                    && !flags.intersects(BindingFlags::NONLOCAL | BindingFlags::GLOBAL)
            })
            .map(|(name, _)| name)
            .collect()
    }

    fn body(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn parameters(&mut self, parameters: &ast::Parameters) {
        // Parameter names are bound on scope entry before any statement
        // runs, so they never trigger the read-before-assign rule and are
        // not recorded. Annotations and defaults can hide named
        // expressions, though.
        for parameter in parameters.posonlyargs.iter().chain(&parameters.args) {
            if let Some(annotation) = &parameter.parameter.annotation {
                self.expr(annotation);
            }
            if let Some(default) = &parameter.default {
                self.expr(default);
            }
        }
        if let Some(vararg) = &parameters.vararg {
            if let Some(annotation) = &vararg.annotation {
                self.expr(annotation);
            }
        }
        for parameter in &parameters.kwonlyargs {
            if let Some(annotation) = &parameter.parameter.annotation {
                self.expr(annotation);
            }
            if let Some(default) = &parameter.default {
                self.expr(default);
            }
        }
        if let Some(kwarg) = &parameters.kwarg {
            if let Some(annotation) = &kwarg.annotation {
                self.expr(annotation);
            }
        }
    }

    fn generators(&mut self, generators: &[ast::Comprehension]) {
        for generator in generators {
            self.expr(&generator.target);
            self.expr(&generator.iter);
            for if_clause in &generator.ifs {
                self.expr(if_clause);
            }
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            // Nested scopes contribute their name and nothing else.
            Stmt::FunctionDef(function) => {
                self.bind_identifier(&function.name, BindingFlags::ASSIGNED);
            }
            Stmt::ClassDef(class) => {
                self.bind_identifier(&class.name, BindingFlags::ASSIGNED);
            }
            Stmt::Global(global) => {
                for name in &global.names {
                    self.bind_identifier(name, BindingFlags::GLOBAL);
                }
            }
            Stmt::Nonlocal(nonlocal) => {
                for name in &nonlocal.names {
                    self.bind_identifier(name, BindingFlags::NONLOCAL);
                }
            }
            Stmt::Import(import) => {
                for alias in &import.names {
                    let bound = match &alias.asname {
                        Some(asname) => asname.as_str(),
                        None => alias
                            .name
                            .as_str()
                            .split('.')
                            .next()
                            .unwrap_or(alias.name.as_str()),
                    };
                    self.bind(Name::new(bound), BindingFlags::IMPORTED);
                }
            }
            Stmt::ImportFrom(import) => {
                for alias in &import.names {
                    let bound = match &alias.asname {
                        Some(asname) => asname.as_str(),
                        None => alias.name.as_str(),
                    };
                    self.bind(Name::new(bound), BindingFlags::IMPORTED);
                }
            }
            Stmt::Return(ast::StmtReturn { value, .. }) => {
                if let Some(value) = value {
                    self.expr(value);
                }
            }
            Stmt::Delete(ast::StmtDelete { targets, .. }) => {
                for target in targets {
                    self.expr(target);
                }
            }
            Stmt::Assign(ast::StmtAssign { targets, value, .. }) => {
                for target in targets {
                    self.expr(target);
                }
                self.expr(value);
            }
            Stmt::AugAssign(ast::StmtAugAssign { target, value, .. }) => {
                self.expr(target);
                self.expr(value);
            }
            Stmt::AnnAssign(ast::StmtAnnAssign {
                target,
                annotation,
                value,
                ..
            }) => {
                self.expr(target);
                self.expr(annotation);
                if let Some(value) = value {
                    self.expr(value);
                }
            }
            Stmt::TypeAlias(ast::StmtTypeAlias { name, value, .. }) => {
                self.expr(name);
                self.expr(value);
            }
            Stmt::For(ast::StmtFor {
                target,
                iter,
                body,
                orelse,
                ..
            }) => {
                self.expr(target);
                self.expr(iter);
                self.body(body);
                self.body(orelse);
            }
            Stmt::While(ast::StmtWhile {
                test, body, orelse, ..
            }) => {
                self.expr(test);
                self.body(body);
                self.body(orelse);
            }
            Stmt::If(ast::StmtIf {
                test,
                body,
                elif_else_clauses,
                ..
            }) => {
                self.expr(test);
                self.body(body);
                for clause in elif_else_clauses {
                    if let Some(test) = &clause.test {
                        self.expr(test);
                    }
                    self.body(&clause.body);
                }
            }
            Stmt::With(ast::StmtWith { items, body, .. }) => {
                for item in items {
                    self.expr(&item.context_expr);
                    if let Some(vars) = &item.optional_vars {
                        self.expr(vars);
                    }
                }
                self.body(body);
            }
            Stmt::Match(ast::StmtMatch { subject, cases, .. }) => {
                self.expr(subject);
                for case in cases {
                    self.pattern(&case.pattern);
                    if let Some(guard) = &case.guard {
                        self.expr(guard);
                    }
                    self.body(&case.body);
                }
            }
            Stmt::Raise(ast::StmtRaise { exc, cause, .. }) => {
                if let Some(exc) = exc {
                    self.expr(exc);
                }
                if let Some(cause) = cause {
                    self.expr(cause);
                }
            }
            Stmt::Try(ast::StmtTry {
                body,
                handlers,
                orelse,
                finalbody,
                ..
            }) => {
                self.body(body);
                for handler in handlers {
                    let ast::ExceptHandler::ExceptHandler(handler) = handler;
                    if let Some(type_) = &handler.type_ {
                        self.expr(type_);
                    }
                    if let Some(name) = &handler.name {
                        self.bind_identifier(name, BindingFlags::ASSIGNED);
                    }
                    self.body(&handler.body);
                }
                self.body(orelse);
                self.body(finalbody);
            }
            Stmt::Assert(ast::StmtAssert { test, msg, .. }) => {
                self.expr(test);
                if let Some(msg) = msg {
                    self.expr(msg);
                }
            }
            Stmt::Expr(ast::StmtExpr { value, .. }) => self.expr(value),
            Stmt::Pass(_) | Stmt::Break(_) | Stmt::Continue(_) | Stmt::IpyEscapeCommand(_) => {}
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Name(name) => {
                if matches!(name.ctx, ExprContext::Store) {
                    self.bind(name.id.clone(), BindingFlags::ASSIGNED);
                }
            }
            // Nested scopes are opaque to the enclosing scope's locals.
            Expr::Lambda(_)
            | Expr::ListComp(_)
            | Expr::SetComp(_)
            | Expr::DictComp(_)
            | Expr::Generator(_) => {}
            Expr::Named(ast::ExprNamed { target, value, .. }) => {
                self.expr(target);
                self.expr(value);
            }
            Expr::BoolOp(ast::ExprBoolOp { values, .. }) => {
                for value in values {
                    self.expr(value);
                }
            }
            Expr::BinOp(ast::ExprBinOp { left, right, .. }) => {
                self.expr(left);
                self.expr(right);
            }
            Expr::UnaryOp(ast::ExprUnaryOp { operand, .. }) => self.expr(operand),
            Expr::If(ast::ExprIf {
                test, body, orelse, ..
            }) => {
                self.expr(test);
                self.expr(body);
                self.expr(orelse);
            }
            Expr::Dict(ast::ExprDict { items, .. }) => {
                for item in items {
                    if let Some(key) = &item.key {
                        self.expr(key);
                    }
                    self.expr(&item.value);
                }
            }
            Expr::Set(ast::ExprSet { elts, .. }) => {
                for elt in elts {
                    self.expr(elt);
                }
            }
            Expr::Await(ast::ExprAwait { value, .. })
            | Expr::YieldFrom(ast::ExprYieldFrom { value, .. })
            | Expr::Starred(ast::ExprStarred { value, .. })
            | Expr::Attribute(ast::ExprAttribute { value, .. }) => self.expr(value),
            Expr::Yield(ast::ExprYield { value, .. }) => {
                if let Some(value) = value {
                    self.expr(value);
                }
            }
            Expr::Compare(ast::ExprCompare {
                left, comparators, ..
            }) => {
                self.expr(left);
                for comparator in comparators {
                    self.expr(comparator);
                }
            }
            Expr::Call(ast::ExprCall {
                func, arguments, ..
            }) => {
                self.expr(func);
                for arg in &arguments.args {
                    self.expr(arg);
                }
                for keyword in &arguments.keywords {
                    self.expr(&keyword.value);
                }
            }
            Expr::FString(fstring) => {
                for interpolation in fstring.value.elements().filter_map(|e| e.as_interpolation())
                {
                    self.expr(&interpolation.expression);
                }
            }
            Expr::TString(tstring) => {
                for interpolation in tstring.value.elements().filter_map(|e| e.as_interpolation())
                {
                    self.expr(&interpolation.expression);
                }
            }
            Expr::Subscript(ast::ExprSubscript { value, slice, .. }) => {
                self.expr(value);
                self.expr(slice);
            }
            Expr::List(ast::ExprList { elts, .. }) | Expr::Tuple(ast::ExprTuple { elts, .. }) => {
                for elt in elts {
                    self.expr(elt);
                }
            }
            Expr::Slice(ast::ExprSlice {
                lower, upper, step, ..
            }) => {
                for bound in [lower, upper, step].into_iter().flatten() {
                    self.expr(bound);
                }
            }
            Expr::StringLiteral(_)
            | Expr::BytesLiteral(_)
            | Expr::NumberLiteral(_)
            | Expr::BooleanLiteral(_)
            | Expr::NoneLiteral(_)
            | Expr::EllipsisLiteral(_)
            | Expr::IpyEscapeCommand(_) => {}
        }
    }

    fn pattern(&mut self, pattern: &ast::Pattern) {
        match pattern {
            ast::Pattern::MatchValue(match_value) => self.expr(&match_value.value),
            ast::Pattern::MatchSingleton(_) => {}
            ast::Pattern::MatchSequence(match_sequence) => {
                for pattern in &match_sequence.patterns {
                    self.pattern(pattern);
                }
            }
            ast::Pattern::MatchMapping(match_mapping) => {
                for key in &match_mapping.keys {
                    self.expr(key);
                }
                for pattern in &match_mapping.patterns {
                    self.pattern(pattern);
                }
                if let Some(rest) = &match_mapping.rest {
                    self.bind_identifier(rest, BindingFlags::ASSIGNED);
                }
            }
            ast::Pattern::MatchClass(match_class) => {
                self.expr(&match_class.cls);
                for pattern in &match_class.arguments.patterns {
                    self.pattern(pattern);
                }
                for keyword in &match_class.arguments.keywords {
                    self.pattern(&keyword.pattern);
                }
            }
            ast::Pattern::MatchStar(match_star) => {
                if let Some(name) = &match_star.name {
                    self.bind_identifier(name, BindingFlags::ASSIGNED);
                }
            }
            ast::Pattern::MatchAs(match_as) => {
                if let Some(pattern) = &match_as.pattern {
                    self.pattern(pattern);
                }
                if let Some(name) = &match_as.name {
                    self.bind_identifier(name, BindingFlags::ASSIGNED);
                }
            }
            ast::Pattern::MatchOr(match_or) => {
                for pattern in &match_or.patterns {
                    self.pattern(pattern);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruff_python_parser::{parse, Mode};

    fn module_locals(source: &str) -> Vec<String> {
        let parsed = parse(source, Mode::Module.into()).expect("test source must parse");
        let ast::Mod::Module(module) = parsed.into_syntax() else {
            unreachable!("parsed with Mode::Module");
        };
        let mut names: Vec<String> = collect_locals(ScopeNode::Module(&module))
            .into_iter()
            .map(|name| name.to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn assignments_and_targets() {
        assert_eq!(
            module_locals("a = 1\nfor i in x: pass\nwith open(f) as g: pass"),
            ["a", "g", "i"]
        );
    }

    #[test]
    fn imports_bind_root_or_asname() {
        assert_eq!(
            module_locals("import os.path\nimport numpy as np\nfrom a import b as c, d"),
            ["c", "d", "np", "os"]
        );
    }

    #[test]
    fn nested_scopes_contribute_only_their_name() {
        assert_eq!(
            module_locals("def f():\n x = 1\nclass C:\n y = 2\ng = lambda: (z := 3)"),
            ["C", "f", "g"]
        );
    }

    #[test]
    fn global_names_are_excluded() {
        assert_eq!(module_locals("global a\na = 1\nb = 2"), ["b"]);
    }

    #[test]
    fn handler_and_walrus_names() {
        assert_eq!(
            module_locals("try: pass\nexcept ValueError as e: pass\nif (n := 1): pass"),
            ["e", "n"]
        );
    }

    #[test]
    fn comprehensions_are_opaque() {
        assert_eq!(module_locals("b = [i for i in range(3)]"), ["b"]);
    }
}
