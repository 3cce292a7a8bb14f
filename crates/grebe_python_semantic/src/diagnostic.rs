use ruff_python_ast::name::Name;
use ruff_source_file::OneIndexed;
use thiserror::Error;

/// A name use the resolver could not bind.
///
/// Line numbers are 1-based, columns are 0-based UTF-8 offsets, matching the
/// positions the interpreter reports for the corresponding `NameError`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("W: unbound identifier '{name}' at {filename}:{line}:{column}")]
pub struct Diagnostic {
    pub name: Name,
    pub filename: String,
    pub line: OneIndexed,
    pub column: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_like_a_lint_warning() {
        let diagnostic = Diagnostic {
            name: Name::new("cos"),
            filename: "foo.py".to_string(),
            line: OneIndexed::from_zero_indexed(2),
            column: 4,
        };
        assert_eq!(
            diagnostic.to_string(),
            "W: unbound identifier 'cos' at foo.py:3:4"
        );
    }
}
