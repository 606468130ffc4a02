//! Pattern-match engine: walks const-table match-data cells against a
//! subject value.
//!
//! A match-data cell is a branch-count header followed by one pattern root
//! word per branch. Atomic pattern words match by bitwise equality;
//! `match-var` words match anything and record a capture; compound pattern
//! cells match compound subjects (const or heap) with the same symbol id and
//! arity whose payload slots all match recursively.

use super::heap::Heap;
use crate::intern::SymbolId;
use crate::value::{Tag, Word};

/// Result of a successful dispatch: the first matching branch index and the
/// capture-slot writes it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchHit {
    pub branch: usize,
    /// `(slot, value)` pairs in pattern order.
    pub captures: Vec<(usize, Word)>,
}

/// Tries each branch of the match-data cell at `pattern_addr` in order.
pub fn dispatch(consts: &[Word], heap: &Heap, pattern_addr: usize, subject: Word) -> Option<MatchHit> {
    let header = consts[pattern_addr];
    debug_assert_eq!(header.tag(), Tag::MatchHeader);
    let branches = header.payload() as usize;
    for branch in 0..branches {
        let root = consts[pattern_addr + 1 + branch];
        let mut captures = Vec::new();
        if match_pattern(consts, heap, root, subject, &mut captures) {
            return Some(MatchHit { branch, captures });
        }
    }
    None
}

fn match_pattern(consts: &[Word], heap: &Heap, pattern: Word, subject: Word, captures: &mut Vec<(usize, Word)>) -> bool {
    match pattern.tag() {
        Tag::MatchVar => {
            captures.push((pattern.payload() as usize, subject));
            true
        }
        Tag::CompoundSymbol => {
            let pattern_addr = pattern.payload() as usize;
            let (symbol, arity) = consts[pattern_addr].symbol_header_parts();
            let Some(subject_fields) = SubjectFields::of(consts, heap, subject) else {
                return false;
            };
            if subject_fields.symbol != symbol || subject_fields.arity != arity {
                return false;
            }
            (0..arity).all(|i| {
                let child_pattern = consts[pattern_addr + 1 + i];
                let child_subject = subject_fields.field(consts, heap, i);
                match_pattern(consts, heap, child_pattern, child_subject, captures)
            })
        }
        // Numbers and plain symbols match by bitwise equality.
        _ => pattern == subject,
    }
}

/// Accessor for the payload of a compound subject, wherever it lives.
struct SubjectFields {
    symbol: SymbolId,
    arity: usize,
    addr: usize,
    on_heap: bool,
}

impl SubjectFields {
    fn of(consts: &[Word], heap: &Heap, subject: Word) -> Option<Self> {
        let (header, addr, on_heap) = match subject.tag() {
            Tag::CompoundSymbol => {
                let addr = subject.payload() as usize;
                (consts[addr], addr, false)
            }
            Tag::HeapSymbol => {
                let addr = subject.payload() as usize;
                (heap.get(addr as u32), addr, true)
            }
            _ => return None,
        };
        let (symbol, arity) = header.symbol_header_parts();
        Some(Self {
            symbol,
            arity,
            addr,
            on_heap,
        })
    }

    fn field(&self, consts: &[Word], heap: &Heap, index: usize) -> Word {
        if self.on_heap {
            heap.get((self.addr + 1 + index) as u32)
        } else {
            consts[self.addr + 1 + index]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{ConstTable, ConstValue};
    use crate::intern::SymbolTable;

    fn setup() -> (SymbolTable, ConstTable) {
        (SymbolTable::new(), ConstTable::new())
    }

    #[test]
    fn test_literal_branches_first_match_wins() {
        let (_, mut consts) = setup();
        let addr = consts
            .add_match_data(&[
                ConstValue::Number(1),
                ConstValue::Number(2),
                ConstValue::MatchVar(0),
            ])
            .unwrap();
        let heap = Heap::new();
        let words = consts.words();

        let hit = dispatch(words, &heap, addr.index(), Word::number(2)).unwrap();
        assert_eq!(hit.branch, 1);
        assert!(hit.captures.is_empty());

        // the variable branch catches everything else
        let hit = dispatch(words, &heap, addr.index(), Word::number(7)).unwrap();
        assert_eq!(hit.branch, 2);
        assert_eq!(hit.captures, vec![(0, Word::number(7))]);
    }

    #[test]
    fn test_compound_pattern_with_captures() {
        let (mut symbols, mut consts) = setup();
        let pair = symbols.intern("pair");
        let addr = consts
            .add_match_data(&[ConstValue::Compound {
                symbol: pair,
                fields: vec![ConstValue::MatchVar(0), ConstValue::MatchVar(1)],
            }])
            .unwrap();
        let subject_addr = consts
            .add_compound(pair, &[ConstValue::Number(4), ConstValue::Number(9)])
            .unwrap();
        let heap = Heap::new();

        let subject = Word::compound_symbol(subject_addr.raw());
        let hit = dispatch(consts.words(), &heap, addr.index(), subject).unwrap();
        assert_eq!(hit.branch, 0);
        assert_eq!(hit.captures, vec![(0, Word::number(4)), (1, Word::number(9))]);
    }

    #[test]
    fn test_arity_and_symbol_must_agree() {
        let (mut symbols, mut consts) = setup();
        let pair = symbols.intern("pair");
        let triple = symbols.intern("triple");
        let addr = consts
            .add_match_data(&[ConstValue::Compound {
                symbol: pair,
                fields: vec![ConstValue::MatchVar(0), ConstValue::MatchVar(1)],
            }])
            .unwrap();
        let wrong_symbol = consts
            .add_compound(triple, &[ConstValue::Number(1), ConstValue::Number(2)])
            .unwrap();
        let wrong_arity = consts.add_compound(pair, &[ConstValue::Number(1)]).unwrap();
        let heap = Heap::new();

        assert!(dispatch(consts.words(), &heap, addr.index(), Word::compound_symbol(wrong_symbol.raw())).is_none());
        assert!(dispatch(consts.words(), &heap, addr.index(), Word::compound_symbol(wrong_arity.raw())).is_none());
        assert!(dispatch(consts.words(), &heap, addr.index(), Word::number(3)).is_none());
    }

    #[test]
    fn test_heap_subject_matches() {
        let (mut symbols, mut consts) = setup();
        let pair = symbols.intern("pair");
        let addr = consts
            .add_match_data(&[ConstValue::Compound {
                symbol: pair,
                fields: vec![ConstValue::Number(1), ConstValue::MatchVar(0)],
            }])
            .unwrap();
        let mut heap = Heap::new();
        let block = [Word::symbol_header(pair, 2), Word::number(1), Word::number(5)];
        let subject = Word::heap_symbol(heap.alloc(&block));

        let hit = dispatch(consts.words(), &heap, addr.index(), subject).unwrap();
        assert_eq!(hit.captures, vec![(0, Word::number(5))]);
    }

    #[test]
    fn test_nested_compound_pattern() {
        let (mut symbols, mut consts) = setup();
        let cons = symbols.intern("cons");
        let nil = symbols.intern("nil");
        // pattern: :cons x (:cons y _)
        let addr = consts
            .add_match_data(&[ConstValue::Compound {
                symbol: cons,
                fields: vec![
                    ConstValue::MatchVar(0),
                    ConstValue::Compound {
                        symbol: cons,
                        fields: vec![ConstValue::MatchVar(1), ConstValue::MatchVar(2)],
                    },
                ],
            }])
            .unwrap();
        // subject: :cons 1 (:cons 2 :nil)
        let tail = consts
            .add_compound(cons, &[ConstValue::Number(2), ConstValue::Symbol(nil)])
            .unwrap();
        let subject_addr = consts
            .add_compound(
                cons,
                &[ConstValue::Number(1), ConstValue::Compound {
                    symbol: cons,
                    fields: vec![ConstValue::Number(2), ConstValue::Symbol(nil)],
                }],
            )
            .unwrap();
        let heap = Heap::new();
        let hit = dispatch(consts.words(), &heap, addr.index(), Word::compound_symbol(subject_addr.raw())).unwrap();
        assert_eq!(hit.captures.len(), 3);
        assert_eq!(hit.captures[0], (0, Word::number(1)));
        assert_eq!(hit.captures[1], (1, Word::number(2)));
        assert_eq!(hit.captures[2], (2, Word::plain_symbol(nil)));
        // the nested subject cell was deduplicated with `tail`
        assert_eq!(hit.captures[2].1, consts.words()[tail.index() + 2]);
    }
}
