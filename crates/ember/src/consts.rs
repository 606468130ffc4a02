//! Const-table encoder.
//!
//! The const-table is a contiguous read-only sequence of words built at
//! compile time and addressed by word offset. It holds compound-symbol cells
//! (header plus payload words), string cells (header plus packed character
//! words), and match-data cells (branch-count header plus one pattern root
//! word per branch). Whole cells are deduplicated on insertion, so encoding
//! the same literal twice at different source sites yields the same address.

use ahash::AHashMap;

use crate::error::CompileError;
use crate::intern::SymbolId;
use crate::value::{Tag, Word, MAX_COMPOUND_ARITY, NUMBER_MAX, NUMBER_MIN};

/// Word offset into the const-table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ConstAddr(u32);

impl ConstAddr {
    #[inline]
    pub fn from_index(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Raw offset for embedding in a word payload or immediate.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Compile-time constant tree, the encoder's input.
///
/// Produced by the normalizer for static compound symbols, dynamic-slot
/// templates (dynamic slots appear as `Number(0)` placeholders) and match
/// patterns.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Number(i32),
    Symbol(SymbolId),
    Compound {
        symbol: SymbolId,
        fields: Vec<ConstValue>,
    },
    /// Pattern capture variable; the slot indexes the branch's capture window.
    MatchVar(u32),
}

/// Builder for the const-table word stream.
#[derive(Debug, Clone, Default)]
pub struct ConstTable {
    words: Vec<Word>,
    /// Maps encoded cell contents to their address for deduplication.
    cells: AHashMap<Vec<Word>, ConstAddr>,
}

impl ConstTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a cell, reusing an existing identical cell's address.
    fn add_cell(&mut self, cell: Vec<Word>) -> ConstAddr {
        if let Some(&addr) = self.cells.get(&cell) {
            return addr;
        }
        let addr = ConstAddr(u32::try_from(self.words.len()).expect("const-table address overflow"));
        self.words.extend_from_slice(&cell);
        self.cells.insert(cell, addr);
        addr
    }

    /// Encodes one constant as a single payload word, appending nested
    /// compound cells as needed.
    fn encode_value(&mut self, value: &ConstValue) -> Result<Word, CompileError> {
        match value {
            ConstValue::Number(n) => {
                if !(NUMBER_MIN..=NUMBER_MAX).contains(n) {
                    return Err(CompileError::internal(format!("number {n} exceeds 28-bit payload")));
                }
                Ok(Word::number(*n))
            }
            ConstValue::Symbol(id) => Ok(Word::plain_symbol(*id)),
            ConstValue::Compound { symbol, fields } => {
                let addr = self.add_compound(*symbol, fields)?;
                Ok(Word::compound_symbol(addr.raw()))
            }
            ConstValue::MatchVar(slot) => Ok(Word::match_var(*slot)),
        }
    }

    /// Encodes a compound-symbol cell: a `(symbol id, arity)` header followed
    /// by one tagged payload word per field. Nested compound fields are
    /// encoded as their own cells first and referenced by address.
    pub fn add_compound(&mut self, symbol: SymbolId, fields: &[ConstValue]) -> Result<ConstAddr, CompileError> {
        if fields.len() > MAX_COMPOUND_ARITY {
            return Err(CompileError::internal(format!(
                "compound symbol arity {} exceeds header encoding",
                fields.len()
            )));
        }
        let mut cell = Vec::with_capacity(1 + fields.len());
        cell.push(Word::symbol_header(symbol, fields.len()));
        for field in fields {
            let word = self.encode_value(field)?;
            cell.push(word);
        }
        Ok(self.add_cell(cell))
    }

    /// Encodes a string cell: a byte-length header followed by the UTF-8
    /// bytes packed four per word, little-endian within each word.
    pub fn add_string(&mut self, text: &str) -> ConstAddr {
        let bytes = text.as_bytes();
        let mut cell = Vec::with_capacity(1 + bytes.len().div_ceil(4));
        cell.push(Word::string_header(bytes.len()));
        for chunk in bytes.chunks(4) {
            let mut packed = [0u8; 4];
            packed[..chunk.len()].copy_from_slice(chunk);
            cell.push(Word::from_raw(u32::from_le_bytes(packed)));
        }
        self.add_cell(cell)
    }

    /// Encodes a single-word constant cell (used for number literals that do
    /// not fit in an instruction immediate).
    pub fn add_number_cell(&mut self, value: i32) -> ConstAddr {
        self.add_cell(vec![Word::number(value)])
    }

    /// Encodes a match-data cell: a branch-count header followed by one
    /// pattern root word per branch.
    pub fn add_match_data(&mut self, roots: &[ConstValue]) -> Result<ConstAddr, CompileError> {
        let mut cell = Vec::with_capacity(1 + roots.len());
        cell.push(Word::match_header(roots.len() as u32));
        for root in roots {
            let word = self.encode_value(root)?;
            cell.push(word);
        }
        Ok(self.add_cell(cell))
    }

    /// Returns the encoded word stream.
    #[inline]
    pub fn words(&self) -> &[Word] {
        &self.words
    }

    /// Consumes the builder and returns the word stream.
    pub fn into_words(self) -> Vec<Word> {
        self.words
    }
}

/// Decodes the string cell at `addr` back into a `String`.
///
/// # Panics
///
/// Panics if `addr` does not point at a string-header cell; addresses come
/// from `Str`-tagged words the encoder produced.
pub fn decode_string(words: &[Word], addr: ConstAddr) -> String {
    let header = words[addr.index()];
    debug_assert_eq!(header.tag(), Tag::StringHeader);
    let len = header.payload() as usize;
    let mut bytes = Vec::with_capacity(len);
    for i in 0..len.div_ceil(4) {
        bytes.extend_from_slice(&words[addr.index() + 1 + i].raw().to_le_bytes());
    }
    bytes.truncate(len);
    String::from_utf8(bytes).expect("string cell holds invalid UTF-8")
}
