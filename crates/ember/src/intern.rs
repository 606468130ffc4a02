//! Symbol-name and arity tables maintained during normalization and codegen.
//!
//! Both maps are monotonic: names are only ever added, never removed. The
//! symbol table assigns dense integer ids in first-seen order, with ids 0 and
//! 1 reserved for the `false`/`true` booleans so comparison results can be
//! produced without a lookup.

use ahash::AHashMap;

use self::well_known::{SYM_FALSE, SYM_MODULE, SYM_TRUE};

/// Index into the symbol-name table.
///
/// Uses `u32` to match the 28-bit word payloads symbol ids are stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct SymbolId(u32);

impl SymbolId {
    /// Creates a `SymbolId` from a raw index value.
    ///
    /// Used by the VM and const-table decoder to reconstruct ids from word
    /// payloads. The caller is responsible for ensuring the index is valid.
    #[inline]
    pub fn from_index(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index value.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Pre-interned symbols with fixed ids.
///
/// These are assigned in `SymbolTable::new()`; the boolean ids double as the
/// truth values produced by the comparison and logical primitives.
pub mod well_known {
    use super::SymbolId;

    pub const SYM_FALSE: SymbolId = SymbolId(0);
    pub const SYM_TRUE: SymbolId = SymbolId(1);
    /// Header symbol of module records; not reachable from source syntax.
    pub const SYM_MODULE: SymbolId = SymbolId(2);
}

/// Interner assigning dense ids to source symbol names in first-seen order.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    map: AHashMap<String, SymbolId>,
    names: Vec<String>,
}

impl SymbolTable {
    /// Creates a symbol table with the reserved entries pre-interned.
    pub fn new() -> Self {
        let mut table = Self {
            map: AHashMap::new(),
            names: Vec::new(),
        };
        // Order must match the well_known constants. The intern() call is
        // separated from debug_assert_eq! because the assert is removed in
        // release builds.
        let id = table.intern("false");
        debug_assert_eq!(id, SYM_FALSE);
        let id = table.intern("true");
        debug_assert_eq!(id, SYM_TRUE);
        let id = table.intern("$module");
        debug_assert_eq!(id, SYM_MODULE);
        table
    }

    /// Interns a symbol name, returning its id.
    ///
    /// Interning the same name twice returns the same id.
    pub fn intern(&mut self, name: &str) -> SymbolId {
        *self.map.entry(name.to_owned()).or_insert_with(|| {
            let id = SymbolId(u32::try_from(self.names.len()).expect("SymbolId overflow"));
            self.names.push(name.to_owned());
            id
        })
    }

    /// Looks up a symbol name by id.
    ///
    /// # Panics
    ///
    /// Panics if the id is not from this table.
    #[inline]
    pub fn name(&self, id: SymbolId) -> &str {
        &self.names[id.index()]
    }

    /// Number of interned symbols, including the reserved entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Consumes the table and returns the name storage, indexed by id.
    pub fn into_names(self) -> Vec<String> {
        self.names
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

/// A lambda's arity: captured free variables and formal parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Arity {
    /// Number of captured free variables.
    pub captures: usize,
    /// Number of formal parameters.
    pub params: usize,
}

/// Maps names known to refer to lambdas to their arity.
///
/// Queried when normalizing a function application to decide saturation.
/// The map is monotonic and keyed by source name; re-binding a name to a
/// lambda of a different shape overwrites the entry (last writer wins), and
/// unknown names simply fall back to the generic-apply path.
#[derive(Debug, Clone, Default)]
pub struct ArityTable {
    map: AHashMap<String, Arity>,
}

impl ArityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the arity of a lambda bound under `name`.
    pub fn record(&mut self, name: &str, arity: Arity) {
        self.map.insert(name.to_owned(), arity);
    }

    /// Returns the recorded arity for `name`, if any.
    pub fn lookup(&self, name: &str) -> Option<Arity> {
        self.map.get(name).copied()
    }

    /// Adds capture slots to an existing entry.
    ///
    /// Called by the recursion resolver when it augments a lambda's free-var
    /// list with its own name.
    pub fn add_captures(&mut self, name: &str, extra: usize) {
        if let Some(arity) = self.map.get_mut(name) {
            arity.captures += extra;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_ids() {
        let table = SymbolTable::new();
        assert_eq!(table.name(SYM_FALSE), "false");
        assert_eq!(table.name(SYM_TRUE), "true");
        assert_eq!(table.name(SYM_MODULE), "$module");
    }

    #[test]
    fn test_intern_dedup() {
        let mut table = SymbolTable::new();
        let a = table.intern("spot");
        let b = table.intern("spot");
        assert_eq!(a, b);
        assert_eq!(table.name(a), "spot");
    }

    #[test]
    fn test_first_seen_order() {
        let mut table = SymbolTable::new();
        let a = table.intern("alpha");
        let b = table.intern("beta");
        assert!(a.index() < b.index());
    }

    #[test]
    fn test_arity_table() {
        let mut arities = ArityTable::new();
        arities.record("f", Arity { captures: 0, params: 2 });
        assert_eq!(arities.lookup("f"), Some(Arity { captures: 0, params: 2 }));
        arities.add_captures("f", 1);
        assert_eq!(arities.lookup("f"), Some(Arity { captures: 1, params: 2 }));
        assert_eq!(arities.lookup("g"), None);
    }
}
