//! `grebe` — report unbound identifiers and defined-but-unused locals in
//! Python modules.

#![allow(clippy::print_stdout)]

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use ruff_python_ast as ast;
use ruff_python_parser::Mode;
use ruff_source_file::SourceFileBuilder;

use grebe_python_semantic::{Ancestors, DefUseChains};

mod unused;

#[derive(Debug, Parser)]
#[command(
    name = "grebe",
    about = "Report unbound identifiers and unused locals in Python modules.",
    version
)]
struct Args {
    /// Python files to analyze. Reads from stdin when omitted.
    files: Vec<PathBuf>,
}

fn main() -> Result<()> {
    setup_tracing();
    let args = Args::parse();

    if args.files.is_empty() {
        let mut source = String::new();
        std::io::stdin()
            .read_to_string(&mut source)
            .context("failed to read from stdin")?;
        check_source("<stdin>", &source)?;
    } else {
        for path in &args.files {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read `{}`", path.display()))?;
            check_source(&path.to_string_lossy(), &source)?;
        }
    }

    Ok(())
}

fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}

fn check_source(filename: &str, source: &str) -> Result<()> {
    tracing::debug!("checking {filename}");
    let parsed = ruff_python_parser::parse(source, Mode::Module.into())
        .map_err(|err| anyhow::anyhow!("{filename}: {err}"))?;
    let module = match parsed.into_syntax() {
        ast::Mod::Module(module) => module,
        _ => unreachable!("Mode::Module always produces a module"),
    };

    let mut ancestors = Ancestors::default();
    ancestors.visit_module(&module);

    let source_file = SourceFileBuilder::new(filename, source).finish();
    let mut chains = DefUseChains::new(source_file.clone());
    chains.visit_module(&module);

    for diagnostic in chains.diagnostics() {
        println!(
            "{} unbound identifier '{}' at {}:{}:{}",
            "W:".yellow(),
            diagnostic.name,
            diagnostic.filename,
            diagnostic.line,
            diagnostic.column
        );
    }

    unused::report_unused(filename, &source_file, &module, &ancestors, &chains);
    Ok(())
}
