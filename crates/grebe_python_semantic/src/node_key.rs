use ruff_python_ast::{self as ast, Expr, Stmt};
use ruff_text_size::{Ranged, TextRange};

/// Kind tag for the AST nodes the analyzer tracks.
///
/// Besides discriminating [`NodeKey`]s, the tag is the display name used for
/// definitions that wrap an unnamed, value-producing node (`a + b` renders as
/// `BinOp`, a call as `Call`, and so on).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Module,

    // Statements
    FunctionDef,
    ClassDef,
    Return,
    Delete,
    TypeAlias,
    Assign,
    AugAssign,
    AnnAssign,
    For,
    While,
    If,
    With,
    Match,
    Raise,
    Try,
    Assert,
    Import,
    ImportFrom,
    Global,
    Nonlocal,
    StmtExpr,
    Pass,
    Break,
    Continue,
    IpyEscapeCommand,

    // Expressions
    BoolOp,
    NamedExpr,
    BinOp,
    UnaryOp,
    Lambda,
    IfExp,
    Dict,
    Set,
    ListComp,
    SetComp,
    DictComp,
    GeneratorExp,
    Await,
    Yield,
    YieldFrom,
    Compare,
    Call,
    JoinedStr,
    TemplateStr,
    Constant,
    Attribute,
    Subscript,
    Starred,
    Name,
    List,
    Tuple,
    Slice,

    // Auxiliary nodes
    Alias,
    Parameter,
    Comprehension,
    WithItem,
    TypeParam,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Module => "Module",
            NodeKind::FunctionDef => "FunctionDef",
            NodeKind::ClassDef => "ClassDef",
            NodeKind::Return => "Return",
            NodeKind::Delete => "Delete",
            NodeKind::TypeAlias => "TypeAlias",
            NodeKind::Assign => "Assign",
            NodeKind::AugAssign => "AugAssign",
            NodeKind::AnnAssign => "AnnAssign",
            NodeKind::For => "For",
            NodeKind::While => "While",
            NodeKind::If => "If",
            NodeKind::With => "With",
            NodeKind::Match => "Match",
            NodeKind::Raise => "Raise",
            NodeKind::Try => "Try",
            NodeKind::Assert => "Assert",
            NodeKind::Import => "Import",
            NodeKind::ImportFrom => "ImportFrom",
            NodeKind::Global => "Global",
            NodeKind::Nonlocal => "Nonlocal",
            NodeKind::StmtExpr => "Expr",
            NodeKind::Pass => "Pass",
            NodeKind::Break => "Break",
            NodeKind::Continue => "Continue",
            NodeKind::IpyEscapeCommand => "IpyEscapeCommand",
            NodeKind::BoolOp => "BoolOp",
            NodeKind::NamedExpr => "NamedExpr",
            NodeKind::BinOp => "BinOp",
            NodeKind::UnaryOp => "UnaryOp",
            NodeKind::Lambda => "Lambda",
            NodeKind::IfExp => "IfExp",
            NodeKind::Dict => "Dict",
            NodeKind::Set => "Set",
            NodeKind::ListComp => "ListComp",
            NodeKind::SetComp => "SetComp",
            NodeKind::DictComp => "DictComp",
            NodeKind::GeneratorExp => "GeneratorExp",
            NodeKind::Await => "Await",
            NodeKind::Yield => "Yield",
            NodeKind::YieldFrom => "YieldFrom",
            NodeKind::Compare => "Compare",
            NodeKind::Call => "Call",
            NodeKind::JoinedStr => "JoinedStr",
            NodeKind::TemplateStr => "TemplateStr",
            NodeKind::Constant => "Constant",
            NodeKind::Attribute => "Attribute",
            NodeKind::Subscript => "Subscript",
            NodeKind::Starred => "Starred",
            NodeKind::Name => "Name",
            NodeKind::List => "List",
            NodeKind::Tuple => "Tuple",
            NodeKind::Slice => "Slice",
            NodeKind::Alias => "alias",
            NodeKind::Parameter => "arg",
            NodeKind::Comprehension => "comprehension",
            NodeKind::WithItem => "withitem",
            NodeKind::TypeParam => "TypeParam",
        }
    }

    pub const fn is_statement(self) -> bool {
        matches!(
            self,
            NodeKind::FunctionDef
                | NodeKind::ClassDef
                | NodeKind::Return
                | NodeKind::Delete
                | NodeKind::TypeAlias
                | NodeKind::Assign
                | NodeKind::AugAssign
                | NodeKind::AnnAssign
                | NodeKind::For
                | NodeKind::While
                | NodeKind::If
                | NodeKind::With
                | NodeKind::Match
                | NodeKind::Raise
                | NodeKind::Try
                | NodeKind::Assert
                | NodeKind::Import
                | NodeKind::ImportFrom
                | NodeKind::Global
                | NodeKind::Nonlocal
                | NodeKind::StmtExpr
                | NodeKind::Pass
                | NodeKind::Break
                | NodeKind::Continue
                | NodeKind::IpyEscapeCommand
        )
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compact key identifying a node of the analyzed module.
///
/// A node is identified by its kind and its source range; within one
/// successfully parsed module no two distinct nodes share both. Unlike a
/// pointer, the key stays meaningful after the analysis returns, so it can
/// serve as the key type of the public chain tables.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeKey {
    kind: NodeKind,
    range: TextRange,
}

impl NodeKey {
    pub(crate) fn new(kind: NodeKind, range: TextRange) -> Self {
        Self { kind, range }
    }

    pub fn kind(self) -> NodeKind {
        self.kind
    }

    pub fn range(self) -> TextRange {
        self.range
    }

    pub fn from_module(module: &ast::ModModule) -> Self {
        Self::new(NodeKind::Module, module.range())
    }

    pub fn from_stmt(stmt: &Stmt) -> Self {
        let kind = match stmt {
            Stmt::FunctionDef(_) => NodeKind::FunctionDef,
            Stmt::ClassDef(_) => NodeKind::ClassDef,
            Stmt::Return(_) => NodeKind::Return,
            Stmt::Delete(_) => NodeKind::Delete,
            Stmt::TypeAlias(_) => NodeKind::TypeAlias,
            Stmt::Assign(_) => NodeKind::Assign,
            Stmt::AugAssign(_) => NodeKind::AugAssign,
            Stmt::AnnAssign(_) => NodeKind::AnnAssign,
            Stmt::For(_) => NodeKind::For,
            Stmt::While(_) => NodeKind::While,
            Stmt::If(_) => NodeKind::If,
            Stmt::With(_) => NodeKind::With,
            Stmt::Match(_) => NodeKind::Match,
            Stmt::Raise(_) => NodeKind::Raise,
            Stmt::Try(_) => NodeKind::Try,
            Stmt::Assert(_) => NodeKind::Assert,
            Stmt::Import(_) => NodeKind::Import,
            Stmt::ImportFrom(_) => NodeKind::ImportFrom,
            Stmt::Global(_) => NodeKind::Global,
            Stmt::Nonlocal(_) => NodeKind::Nonlocal,
            Stmt::Expr(_) => NodeKind::StmtExpr,
            Stmt::Pass(_) => NodeKind::Pass,
            Stmt::Break(_) => NodeKind::Break,
            Stmt::Continue(_) => NodeKind::Continue,
            Stmt::IpyEscapeCommand(_) => NodeKind::IpyEscapeCommand,
        };
        Self::new(kind, stmt.range())
    }

    pub fn from_expr(expr: &Expr) -> Self {
        let kind = match expr {
            Expr::BoolOp(_) => NodeKind::BoolOp,
            Expr::Named(_) => NodeKind::NamedExpr,
            Expr::BinOp(_) => NodeKind::BinOp,
            Expr::UnaryOp(_) => NodeKind::UnaryOp,
            Expr::Lambda(_) => NodeKind::Lambda,
            Expr::If(_) => NodeKind::IfExp,
            Expr::Dict(_) => NodeKind::Dict,
            Expr::Set(_) => NodeKind::Set,
            Expr::ListComp(_) => NodeKind::ListComp,
            Expr::SetComp(_) => NodeKind::SetComp,
            Expr::DictComp(_) => NodeKind::DictComp,
            Expr::Generator(_) => NodeKind::GeneratorExp,
            Expr::Await(_) => NodeKind::Await,
            Expr::Yield(_) => NodeKind::Yield,
            Expr::YieldFrom(_) => NodeKind::YieldFrom,
            Expr::Compare(_) => NodeKind::Compare,
            Expr::Call(_) => NodeKind::Call,
            Expr::FString(_) => NodeKind::JoinedStr,
            Expr::TString(_) => NodeKind::TemplateStr,
            Expr::StringLiteral(_)
            | Expr::BytesLiteral(_)
            | Expr::NumberLiteral(_)
            | Expr::BooleanLiteral(_)
            | Expr::NoneLiteral(_)
            | Expr::EllipsisLiteral(_) => NodeKind::Constant,
            Expr::Attribute(_) => NodeKind::Attribute,
            Expr::Subscript(_) => NodeKind::Subscript,
            Expr::Starred(_) => NodeKind::Starred,
            Expr::Name(_) => NodeKind::Name,
            Expr::List(_) => NodeKind::List,
            Expr::Tuple(_) => NodeKind::Tuple,
            Expr::Slice(_) => NodeKind::Slice,
            Expr::IpyEscapeCommand(_) => NodeKind::IpyEscapeCommand,
        };
        Self::new(kind, expr.range())
    }

    pub fn from_alias(alias: &ast::Alias) -> Self {
        Self::new(NodeKind::Alias, alias.range())
    }

    pub fn from_parameter(parameter: &ast::Parameter) -> Self {
        Self::new(NodeKind::Parameter, parameter.range())
    }

    pub fn from_comprehension(comprehension: &ast::Comprehension) -> Self {
        Self::new(NodeKind::Comprehension, comprehension.range())
    }

    pub fn from_with_item(item: &ast::WithItem) -> Self {
        Self::new(NodeKind::WithItem, item.range())
    }

    /// Key for the binding introduced by an identifier that is not an
    /// expression of its own: `except ... as e`, match captures, keyword
    /// parameters of patterns.
    pub fn from_identifier(identifier: &ast::Identifier) -> Self {
        Self::new(NodeKind::Name, identifier.range())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruff_text_size::TextSize;

    #[test]
    fn keys_distinguish_kind_and_range() {
        let range = TextRange::new(TextSize::from(0), TextSize::from(5));
        let a = NodeKey::new(NodeKind::Name, range);
        let b = NodeKey::new(NodeKind::BinOp, range);
        let c = NodeKey::new(NodeKind::Name, TextRange::new(TextSize::from(1), TextSize::from(5)));
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, NodeKey::new(NodeKind::Name, range));
    }

    #[test]
    fn display_matches_python_node_names() {
        assert_eq!(NodeKind::NamedExpr.to_string(), "NamedExpr");
        assert_eq!(NodeKind::IfExp.to_string(), "IfExp");
        assert_eq!(NodeKind::Comprehension.to_string(), "comprehension");
    }
}
