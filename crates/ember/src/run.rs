//! Public interface for compiling and running Ember code.
//!
//! `run()` is the one-shot path: parse, normalize, generate code, assemble,
//! execute, decode. [`Program`] is the compiled artifact in between — hosts
//! can compile once, serialize the image, and execute it later (or
//! elsewhere).

use tracing::debug;

use crate::assemble::assemble;
use crate::codegen::generate;
use crate::error::EmberError;
use crate::normalize::normalize;
use crate::parser::parse;
use crate::value::{Value, Word};
use crate::vm::Machine;

/// A compiled Ember program: packed instructions, the const-table word
/// stream, and the symbol-name table (instruction stream and tables are
/// read-only from here on).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Program {
    instructions: Vec<u32>,
    consts: Vec<Word>,
    symbols: Vec<String>,
}

impl Program {
    /// Compiles source text through the full pipeline.
    ///
    /// # Errors
    ///
    /// Returns the first parse or compile error; there is no recovery.
    pub fn compile(source: &str) -> Result<Self, EmberError> {
        let block = parse(source)?;
        let normalized = normalize(&block)?;
        let mut consts = normalized.consts;
        let functions = generate(&normalized.expr, &mut consts)?;
        let assembled = assemble(&functions)?;
        debug!(
            instructions = assembled.instructions.len(),
            const_words = consts.words().len(),
            "compiled program"
        );
        Ok(Self {
            instructions: assembled.instructions,
            consts: consts.into_words(),
            symbols: normalized.symbols.into_names(),
        })
    }

    /// Runs the program on a fresh VM and decodes the result.
    ///
    /// # Errors
    ///
    /// Returns the trap that halted the VM, if any.
    pub fn execute(&self) -> Result<Value, EmberError> {
        let mut machine = Machine::new(&self.instructions, &self.consts, &self.symbols);
        let word = machine.run()?;
        debug!(peak_frames = machine.peak_frames(), "execution finished");
        Ok(machine.decode_value(word)?)
    }

    /// Serializes the compiled image to bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        postcard::to_allocvec(self).expect("program image serialization cannot fail")
    }

    /// Restores a compiled image produced by [`Program::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns `EmberError::InvalidImage` when the bytes are not a valid
    /// image.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EmberError> {
        postcard::from_bytes(bytes).map_err(|e| EmberError::InvalidImage(e.to_string()))
    }

    /// The packed instruction words.
    #[must_use]
    pub fn instructions(&self) -> &[u32] {
        &self.instructions
    }
}

/// Compiles and runs a source program, returning its decoded result value.
///
/// # Example
/// ```
/// use ember::{run, Value};
///
/// let value = run("val a = 4\nval b = 7\nadd a b").unwrap();
/// assert_eq!(value, Value::Number(11));
/// ```
pub fn run(source: &str) -> Result<Value, EmberError> {
    Program::compile(source)?.execute()
}
