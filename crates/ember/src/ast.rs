//! Surface AST produced by the parser and consumed by the normalizer.

/// An expression in the surface syntax.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Expr {
    Number(i32),
    /// Plain symbol literal, e.g. `:spot`.
    Symbol(String),
    /// Compound symbol literal with argument payload, e.g. `:pair 2 3`.
    Compound { symbol: String, args: Vec<Expr> },
    Str(String),
    Var(String),
    /// Application by juxtaposition, e.g. `make-adder 22`.
    Apply { head: Box<Expr>, args: Vec<Expr> },
    /// Anonymous function, e.g. `val (x y) = add x y`. Named function
    /// bindings desugar to a `Binding` whose value is a `Lambda`.
    Lambda { params: Vec<String>, body: Box<Expr> },
    Block(Block),
    Match {
        subject: Box<Expr>,
        branches: Vec<MatchArm>,
    },
    /// Module expression: a record of named bindings.
    Module { bindings: Vec<Binding> },
    /// Qualified lookup, e.g. `geometry.area`.
    FieldAccess { object: Box<Expr>, field: String },
}

/// A sequence of bindings ending in a result expression.
///
/// A program is an implicit block. When source text ends with a binding
/// rather than an expression, the parser supplies the last bound name as the
/// result.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub bindings: Vec<Binding>,
    pub result: Box<Expr>,
    /// False when the parser supplied the result from the last binding;
    /// lets the REPL tell binding-only entries from expressions.
    pub has_explicit_result: bool,
}

/// One `val name = expr` binding.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Binding {
    pub name: String,
    pub value: Expr,
}

/// One `pattern -> expr` branch of a match expression.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub body: Expr,
}

/// A match pattern.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Pattern {
    Number(i32),
    Symbol(String),
    Compound { symbol: String, args: Vec<Pattern> },
    /// Binds the matched sub-value to a name in the branch body.
    Var(String),
    /// Matches anything without binding a usable name.
    Wildcard,
}
