//! Error taxonomy for the compilation pipeline and the VM.
//!
//! There is no recovery inside the pipeline: the first error aborts the stage
//! that produced it and is reported at the public boundary (`run`,
//! `Program::compile`, `Program::execute`). The VM does not restart after a
//! trap.

use thiserror::Error;

/// Error produced while tokenizing or parsing source text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Unexpected token
    #[error("unexpected token '{found}' at line {line}, expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: String,
        line: u32,
    },

    /// Unexpected end of input
    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEof { expected: String },

    /// Unrecognized character sequence
    #[error("unrecognized token '{text}' at line {line}")]
    LexerError { text: String, line: u32 },

    /// Number literal outside the 28-bit signed payload range
    #[error("number literal '{literal}' is out of range at line {line}")]
    NumberOutOfRange { literal: String, line: u32 },

    /// Invalid escape sequence in a string literal
    #[error("invalid escape sequence '\\{sequence}' at line {line}")]
    InvalidEscape { sequence: char, line: u32 },

    /// Empty program or block
    #[error("empty {what}")]
    Empty { what: &'static str },
}

/// Compile-time error from normalization or code generation.
///
/// `Code*` variants are user-visible mistakes; `Internal` marks a violated
/// compiler invariant and always indicates a bug in the pipeline itself.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    /// A name that no enclosing scope binds.
    #[error("unknown name '{0}'")]
    UnknownName(String),

    /// A compound symbol or module field count exceeded the header encoding.
    #[error("too many fields in '{symbol}': {count} (max {max})")]
    TooManyFields {
        symbol: String,
        count: usize,
        max: usize,
    },

    /// Violated invariant in normalization or codegen. Always a pipeline bug
    /// (partial application of a closure, unknown variable at codegen,
    /// exceeded register limit, ...).
    #[error("internal compiler error: {0}")]
    Internal(String),
}

impl CompileError {
    /// Convenience constructor for `Internal` with a formatted message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Fatal runtime error. Halts the VM with a diagnostic; execution cannot be
/// resumed afterwards.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeTrap {
    /// No branch of a match expression matched the subject.
    #[error("no pattern matched the subject value")]
    UnmatchedPattern,

    /// `gen_ap`/`part_ap` on a value that is neither a function nor a closure.
    #[error("value of type '{tag}' is not callable")]
    NotCallable { tag: &'static str },

    /// Arithmetic or comparison on a non-number operand.
    #[error("'{op}' expects numbers, got '{tag}'")]
    NumberExpected { op: &'static str, tag: &'static str },

    /// Logical primitive on a value that is not the `true`/`false` symbol.
    #[error("'{op}' expects a boolean symbol, got '{tag}'")]
    BooleanExpected { op: &'static str, tag: &'static str },

    /// Integer division by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// Qualified lookup named a field the module does not carry.
    #[error("module has no field '{field}'")]
    UnknownField { field: String },

    /// Qualified lookup on a value that is not a module.
    #[error("value of type '{tag}' is not a module")]
    NotAModule { tag: &'static str },

    /// Instruction pointer or decoded address outside the loaded program.
    #[error("instruction address {0} out of bounds")]
    BadAddress(u32),

    /// A result value that cannot be decoded for the host.
    #[error("cannot decode value with tag '{tag}'")]
    Undecodable { tag: &'static str },
}

/// Top-level error type returned by the public API.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmberError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Trap(#[from] RuntimeTrap),

    /// A compiled-program byte stream that could not be decoded.
    #[error("invalid program image: {0}")]
    InvalidImage(String),
}
