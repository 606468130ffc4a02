//! Tagged machine words and the public decoded value type.
//!
//! Every runtime value is one 32-bit word: the top 4 bits carry a [`Tag`],
//! the bottom 28 bits a payload. Numbers are signed 28-bit integers stored in
//! two's complement; every other tag's payload is an index into the
//! const-table, the instruction stream, or the heap. Equality on values is
//! bitwise, which is why `Word` derives `PartialEq` directly.

use std::fmt;

use crate::intern::SymbolId;

/// Number of payload bits in a word.
pub const PAYLOAD_BITS: u32 = 28;

/// Mask selecting the payload bits of a word.
pub const PAYLOAD_MASK: u32 = (1 << PAYLOAD_BITS) - 1;

/// Smallest representable number (signed 28-bit).
pub const NUMBER_MIN: i32 = -(1 << 27);

/// Largest representable number (signed 28-bit).
pub const NUMBER_MAX: i32 = (1 << 27) - 1;

/// Value tag stored in the top 4 bits of a word.
///
/// The first eight tags can appear in registers; the header tags only ever
/// appear inside const-table cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::FromRepr)]
#[strum(serialize_all = "kebab-case")]
#[repr(u8)]
pub enum Tag {
    /// Signed 28-bit integer, payload is the two's complement value.
    Number = 0,
    /// Plain symbol, payload is its [`SymbolId`].
    PlainSymbol = 1,
    /// Read-only compound symbol, payload is a const-table word address.
    CompoundSymbol = 2,
    /// Writable compound symbol copy, payload is a heap word address.
    HeapSymbol = 3,
    /// Static function, payload is an instruction-stream offset.
    Function = 4,
    /// Closure record, payload is a heap word address.
    Closure = 5,
    /// String, payload is the const-table address of its header cell.
    Str = 6,
    /// Match-data cell reference; produced by `load_addr` as the pattern
    /// operand of `match` and never escapes as a program value.
    MatchData = 7,
    /// Pattern capture variable, payload is the capture slot index.
    MatchVar = 8,
    /// Match-data cell header, payload is the branch count.
    MatchHeader = 9,
    /// Compound-symbol cell header, payload packs `(symbol id, arity)`.
    SymbolHeader = 10,
    /// String cell header, payload is the byte length.
    StringHeader = 11,
}

/// Bits of a [`Tag::SymbolHeader`] payload used for the arity.
///
/// The remaining 16 payload bits carry the symbol id, so a compound symbol
/// can have at most 4095 fields and a program at most 65535 distinct symbols.
pub const SYMBOL_HEADER_ARITY_BITS: u32 = 12;

/// Maximum arity encodable in a compound-symbol header.
pub const MAX_COMPOUND_ARITY: usize = (1 << SYMBOL_HEADER_ARITY_BITS) - 1;

/// One tagged machine word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct Word(u32);

impl Word {
    fn pack(tag: Tag, payload: u32) -> Self {
        debug_assert!(payload <= PAYLOAD_MASK, "payload {payload} exceeds 28 bits");
        Self(((tag as u32) << PAYLOAD_BITS) | (payload & PAYLOAD_MASK))
    }

    /// Builds a number word. The value must be in `NUMBER_MIN..=NUMBER_MAX`;
    /// out-of-range literals are rejected earlier by the parser and encoder.
    pub fn number(value: i32) -> Self {
        debug_assert!((NUMBER_MIN..=NUMBER_MAX).contains(&value));
        Self::pack(Tag::Number, (value as u32) & PAYLOAD_MASK)
    }

    pub fn plain_symbol(symbol: SymbolId) -> Self {
        Self::pack(Tag::PlainSymbol, symbol.index() as u32)
    }

    pub fn compound_symbol(addr: u32) -> Self {
        Self::pack(Tag::CompoundSymbol, addr)
    }

    pub fn heap_symbol(addr: u32) -> Self {
        Self::pack(Tag::HeapSymbol, addr)
    }

    pub fn function(addr: u32) -> Self {
        Self::pack(Tag::Function, addr)
    }

    pub fn closure(addr: u32) -> Self {
        Self::pack(Tag::Closure, addr)
    }

    pub fn string(addr: u32) -> Self {
        Self::pack(Tag::Str, addr)
    }

    pub fn match_data(addr: u32) -> Self {
        Self::pack(Tag::MatchData, addr)
    }

    pub fn match_var(slot: u32) -> Self {
        Self::pack(Tag::MatchVar, slot)
    }

    pub fn match_header(branches: u32) -> Self {
        Self::pack(Tag::MatchHeader, branches)
    }

    pub fn symbol_header(symbol: SymbolId, arity: usize) -> Self {
        debug_assert!(arity <= MAX_COMPOUND_ARITY);
        let payload = ((symbol.index() as u32) << SYMBOL_HEADER_ARITY_BITS) | arity as u32;
        Self::pack(Tag::SymbolHeader, payload)
    }

    pub fn string_header(byte_len: usize) -> Self {
        Self::pack(Tag::StringHeader, byte_len as u32)
    }

    /// Wraps raw bits without tagging; used for the character words of string
    /// cells, which carry packed bytes rather than tagged values.
    pub fn from_raw(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the raw 32 bits.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Returns the word's tag.
    ///
    /// # Panics
    ///
    /// Panics on the four unassigned tag encodings, which no part of the
    /// pipeline ever constructs.
    #[inline]
    pub fn tag(self) -> Tag {
        Tag::from_repr((self.0 >> PAYLOAD_BITS) as u8).expect("invalid tag bits in word")
    }

    /// Returns the 28-bit payload.
    #[inline]
    pub fn payload(self) -> u32 {
        self.0 & PAYLOAD_MASK
    }

    /// Sign-extends the payload into an `i32`. Only meaningful for numbers.
    #[inline]
    pub fn number_value(self) -> i32 {
        ((self.payload() << 4) as i32) >> 4
    }

    /// Splits a `SymbolHeader` payload into `(symbol id, arity)`.
    pub fn symbol_header_parts(self) -> (SymbolId, usize) {
        debug_assert_eq!(self.tag(), Tag::SymbolHeader);
        let payload = self.payload();
        let symbol = SymbolId::from_index(payload >> SYMBOL_HEADER_ARITY_BITS);
        let arity = (payload & ((1 << SYMBOL_HEADER_ARITY_BITS) - 1)) as usize;
        (symbol, arity)
    }

    /// Name of this word's tag for diagnostics.
    pub fn tag_name(self) -> &'static str {
        match self.tag() {
            Tag::Number => "number",
            Tag::PlainSymbol => "plain-symbol",
            Tag::CompoundSymbol => "compound-symbol",
            Tag::HeapSymbol => "heap-compound-symbol",
            Tag::Function => "function",
            Tag::Closure => "closure",
            Tag::Str => "string",
            Tag::MatchData => "match-data",
            Tag::MatchVar => "match-var",
            Tag::MatchHeader => "match-header",
            Tag::SymbolHeader => "data-symbol-header",
            Tag::StringHeader => "string-header",
        }
    }
}

/// Decoded program result handed back to the host.
///
/// This is the public face of a [`Word`]: const-table and heap indirections
/// are resolved, symbols carry their names, compound symbols their decoded
/// fields.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Value {
    Number(i32),
    Symbol(String),
    Compound { symbol: String, fields: Vec<Value> },
    Str(String),
    /// A static function value; the payload is its instruction address.
    Function(u32),
    /// A closure value; the payload is its heap address.
    Closure(u32),
}

impl Value {
    /// Convenience constructor for a plain symbol value.
    pub fn symbol(name: impl Into<String>) -> Self {
        Self::Symbol(name.into())
    }

    /// Convenience constructor for a compound symbol value.
    pub fn compound(symbol: impl Into<String>, fields: Vec<Value>) -> Self {
        Self::Compound {
            symbol: symbol.into(),
            fields,
        }
    }

    fn fmt_nested(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compound { fields, .. } if !fields.is_empty() => write!(f, "({self})"),
            _ => write!(f, "{self}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Symbol(s) => write!(f, ":{s}"),
            Self::Compound { symbol, fields } => {
                write!(f, ":{symbol}")?;
                for field in fields {
                    write!(f, " ")?;
                    field.fmt_nested(f)?;
                }
                Ok(())
            }
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Function(addr) => write!(f, "<function @{addr}>"),
            Self::Closure(addr) => write!(f, "<closure @{addr}>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_round_trip() {
        for n in [0, 1, -1, 4815, -4815, NUMBER_MIN, NUMBER_MAX] {
            let word = Word::number(n);
            assert_eq!(word.tag(), Tag::Number);
            assert_eq!(word.number_value(), n, "round trip failed for {n}");
        }
    }

    #[test]
    fn test_negative_number_payload_masked() {
        let word = Word::number(-1);
        assert_eq!(word.payload(), PAYLOAD_MASK);
        assert_eq!(word.raw() >> PAYLOAD_BITS, Tag::Number as u32);
    }

    #[test]
    fn test_symbol_header_parts() {
        let word = Word::symbol_header(SymbolId::from_index(7), 3);
        assert_eq!(word.tag(), Tag::SymbolHeader);
        let (symbol, arity) = word.symbol_header_parts();
        assert_eq!(symbol.index(), 7);
        assert_eq!(arity, 3);
    }

    #[test]
    fn test_bitwise_equality() {
        assert_eq!(Word::number(3), Word::number(3));
        assert_ne!(Word::number(3), Word::plain_symbol(SymbolId::from_index(3)));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Number(42).to_string(), "42");
        assert_eq!(Value::symbol("spot").to_string(), ":spot");
        let nested = Value::compound(
            "pair",
            vec![Value::compound("pair", vec![Value::Number(1)]), Value::Number(2)],
        );
        assert_eq!(nested.to_string(), ":pair (:pair 1) 2");
    }
}
