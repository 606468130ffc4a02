//! Ember: a small expression-oriented functional language.
//!
//! The crate is the end-to-end core: a lexer/parser for the surface syntax,
//! a normalizer lowering the AST into A-normal form with classified free
//! variables, a code generator targeting a 32-register virtual machine, an
//! assembler packing three-address code into 32-bit instruction words, and
//! the register VM itself with heap-allocated closures and const-table
//! pattern matching.
//!
//! The usual entry points are [`run`] for one-shot evaluation, [`Program`]
//! for compile-once/run-later, and [`ReplSession`] for interactive use:
//!
//! ```
//! use ember::{run, Value};
//!
//! assert_eq!(run(":sym 2 3").unwrap().to_string(), ":sym 2 3");
//! assert_eq!(run("val n = 20\nmul n 2").unwrap(), Value::Number(40));
//! ```

mod assemble;
mod ast;
mod codegen;
mod consts;
mod error;
mod intern;
mod lexer;
mod normalize;
mod nst;
mod parser;
mod repl;
mod resolve;
mod run;
mod tac;
mod value;
mod vm;

pub use crate::{
    error::{CompileError, EmberError, ParseError, RuntimeTrap},
    repl::ReplSession,
    run::{run, Program},
    value::Value,
};
