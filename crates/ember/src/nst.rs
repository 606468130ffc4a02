//! Normalized intermediate representation (NST).
//!
//! The normalizer lowers the surface AST into A-normal form: every
//! non-trivial sub-expression is bound to a name, so an expression is either
//! a `Let` introducing one atom or a final atom. Variable references carry a
//! scope classification decided during normalization; the code generator
//! never re-derives scoping.

use crate::consts::ConstAddr;
use crate::intern::SymbolId;

/// An expression in A-normal form.
#[derive(Debug, Clone, PartialEq)]
pub enum NstExpr {
    Let {
        var: String,
        atom: NstAtom,
        body: Box<NstExpr>,
    },
    Atom(NstAtom),
}

/// Scope classification of a variable reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    /// Bound by a `Let` in the current function scope.
    Local,
    /// A formal parameter of the current function.
    Param,
    /// An outer-scope name that must be captured at closure-build time.
    DynamicFree,
    /// An outer-scope name bound to a compile-time constant; materialized
    /// in place instead of captured.
    ConstantFree,
    /// A lambda body naming its own binding. Rewritten by the recursion
    /// resolver; never reaches the code generator.
    Recursive,
}

/// A classified variable reference.
#[derive(Debug, Clone, PartialEq)]
pub struct NstVar {
    pub name: String,
    pub kind: VarKind,
}

impl NstVar {
    pub fn new(name: impl Into<String>, kind: VarKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Primitive operator recognized in application head position.
///
/// Each operator is also recognized under a word spelling (`add`, `sub`, ...)
/// so primitives read like ordinary applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum PrimOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Gt,
    Eq,
    And,
    Or,
    Not,
}

impl PrimOp {
    /// Resolves an application head name to a primitive, if it is one.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "+" | "add" => Some(Self::Add),
            "-" | "sub" => Some(Self::Sub),
            "*" | "mul" => Some(Self::Mul),
            "/" | "div" => Some(Self::Div),
            "<" | "lt" => Some(Self::Lt),
            ">" | "gt" => Some(Self::Gt),
            "==" | "eq" => Some(Self::Eq),
            "&&" => Some(Self::And),
            "||" => Some(Self::Or),
            "!" | "not" => Some(Self::Not),
            _ => None,
        }
    }

    /// Number of operands the primitive takes.
    pub fn arity(self) -> usize {
        match self {
            Self::Not => 1,
            _ => 2,
        }
    }
}

/// A lambda atom: classified free variables, formal parameters, and a body
/// normalized in its own scope.
#[derive(Debug, Clone, PartialEq)]
pub struct LambdaAtom {
    /// Captured names in declaration order; closure slots follow this order.
    pub free_vars: Vec<String>,
    pub params: Vec<String>,
    pub body: Box<NstExpr>,
    /// True when the body (or a nested lambda) references the name of a
    /// lambda binding still being established. Such a lambda will gain
    /// captures during recursion resolution, so it is not a compile-time
    /// constant even when `free_vars` is still empty.
    pub has_recursive_refs: bool,
}

/// A match-branch atom; its body is compiled exactly like a lambda whose
/// parameters are the branch's matched variables.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchAtom {
    pub free_vars: Vec<String>,
    /// Names bound by the branch pattern, in capture-slot order. Wildcards
    /// occupy a slot under the name `_`.
    pub matched_vars: Vec<String>,
    pub body: Box<NstExpr>,
}

/// An atomic computation. Every atom's operands are already names.
#[derive(Debug, Clone, PartialEq)]
pub enum NstAtom {
    Number(i32),
    PlainSymbol(SymbolId),
    /// A compound symbol backed by a const-table cell. `slot_fills` lists
    /// the dynamic payload slots to patch into a writable heap copy; an
    /// empty list means the constant cell is used directly.
    CompoundSymbol {
        addr: ConstAddr,
        slot_fills: Vec<(usize, NstVar)>,
    },
    Str(ConstAddr),
    PrimOp {
        op: PrimOp,
        args: Vec<NstVar>,
    },
    Var(NstVar),
    Lambda(LambdaAtom),
    /// Saturated application.
    FunAp {
        fun: NstVar,
        args: Vec<NstVar>,
    },
    /// Partial application of a statically known function.
    PartAp {
        fun: NstVar,
        args: Vec<NstVar>,
    },
    Match {
        /// Maximum matched-variable count across branches; sizes the
        /// capture register window.
        max_captures: usize,
        subject: NstVar,
        pattern_addr: ConstAddr,
        branches: Vec<BranchAtom>,
    },
    /// A module record: a writable compound symbol of (field-symbol, value)
    /// pairs, built from a const-table template like a dynamic compound.
    Module {
        addr: ConstAddr,
        slot_fills: Vec<(usize, NstVar)>,
    },
    /// Qualified lookup `mod.name`; `field` names a local holding the
    /// field's plain symbol.
    ModuleLookup {
        module: NstVar,
        field: NstVar,
    },
}
