//! Inverse-chain tests: every `(def, user)` edge must appear as a
//! `(use, def)` entry in the transposed table.

use grebe_python_semantic::{DefUseChains, NodeKey, UseDefChains};
use pretty_assertions::assert_eq;
use ruff_python_ast as ast;
use ruff_python_parser::{parse, Mode};
use ruff_source_file::SourceFileBuilder;

fn with_analysis(source: &str, f: impl FnOnce(&ast::ModModule, &DefUseChains)) {
    let parsed = parse(source, Mode::Module.into()).expect("test source must parse");
    let ast::Mod::Module(module) = parsed.into_syntax() else {
        unreachable!("parsed with Mode::Module");
    };
    let mut chains = DefUseChains::new(SourceFileBuilder::new("<unknown>", source).finish());
    chains.visit_module(&module);
    assert!(
        chains.diagnostics().is_empty(),
        "unexpected diagnostics: {:?}",
        chains.diagnostics()
    );
    f(&module, &chains);
}

fn check_use_defs(source: &str, expected: &str) {
    with_analysis(source, |_, chains| {
        let use_defs = UseDefChains::new(chains);
        assert_eq!(use_defs.to_string(), expected);
    });
}

#[test]
fn simple_expression() {
    check_use_defs("a = 1; a", "a <- {a}, a <- {}");
}

#[test]
fn call() {
    check_use_defs(
        "from foo import bar; bar(1, 2)",
        "Call <- {Constant, Constant, bar}, bar <- {bar}",
    );
}

#[test]
fn every_edge_round_trips() {
    with_analysis(
        "a = 1\nb = a + 2\nfor i in [a, b]:\n c = i\nprint(c)",
        |_, chains| {
            let use_defs = UseDefChains::new(chains);
            for (&key, &def) in chains.chains() {
                let _ = key;
                for user in chains.def(def).users() {
                    let user_key = chains
                        .def(user)
                        .node()
                        .expect("users are always chain-registered nodes");
                    assert!(
                        use_defs.defs_for(user_key).contains(&def),
                        "edge {def:?} -> {user:?} missing from the inverse table"
                    );
                }
            }
        },
    );
}

#[test]
fn name_uses_without_defs_still_appear() {
    // Store-context names have no reaching defs; the inverse table lists
    // them with an empty entry rather than omitting them.
    with_analysis("x = 1", |module, chains| {
        let use_defs = UseDefChains::new(chains);
        let ast::Stmt::Assign(assign) = &module.body[0] else {
            unreachable!("single assignment");
        };
        let target_key = NodeKey::from_expr(&assign.targets[0]);
        assert!(use_defs.chains().contains_key(&target_key));
        assert!(use_defs.defs_for(target_key).is_empty());
    });
}
