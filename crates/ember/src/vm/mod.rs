//! Register virtual machine.
//!
//! Executes the assembled instruction stream with a stack of call frames,
//! each holding a bank of 32 tagged-word registers. Arguments (and closure
//! captures, before a `make_cl`) are staged in a side buffer by `set_arg`;
//! a call copies the callee's captured values into registers `0..f-1` and
//! the staged arguments into `f..f+n-1`, matching the code generator's
//! frame layout.
//!
//! The generic-apply path (`gen_ap`/`tail_gen_ap`) reads the callee's
//! `fun_header` to decide saturation: an under-saturated application builds
//! a wider partial-application closure, an over-saturated one runs the
//! saturated call and re-applies its result to the leftover arguments.

pub mod heap;
pub mod matching;

use tracing::trace;

use crate::consts::{decode_string, ConstAddr};
use crate::error::RuntimeTrap;
use crate::intern::{
    well_known::{SYM_FALSE, SYM_MODULE, SYM_TRUE},
    SymbolId,
};
use crate::tac::{decode, Opcode, Reg, NUM_REGISTERS};
use crate::value::{Tag, Value, Word};
use heap::Heap;

/// What to do with a frame's result when it returns.
#[derive(Debug)]
enum ReturnAction {
    /// Top frame: the value is the program result.
    Halt,
    /// Write the value into the caller's register.
    Store { reg: Reg },
    /// Over-saturated apply: re-apply the value to the leftover arguments,
    /// then perform the wrapped action.
    Reapply {
        pending: Vec<Word>,
        then: Box<ReturnAction>,
    },
}

#[derive(Debug)]
struct Frame {
    regs: [Word; NUM_REGISTERS as usize],
    return_ip: usize,
    action: ReturnAction,
}

impl Frame {
    fn new(return_ip: usize, action: ReturnAction) -> Self {
        Self {
            regs: [Word::default(); NUM_REGISTERS as usize],
            return_ip,
            action,
        }
    }
}

/// The virtual machine over one assembled program.
#[derive(Debug)]
pub struct Machine<'a> {
    instructions: &'a [u32],
    consts: &'a [Word],
    symbols: &'a [String],
    heap: Heap,
    frames: Vec<Frame>,
    /// Argument staging area written by `set_arg`.
    staged: [Word; NUM_REGISTERS as usize],
    ip: usize,
    result: Option<Word>,
    peak_frames: usize,
}

impl<'a> Machine<'a> {
    pub fn new(instructions: &'a [u32], consts: &'a [Word], symbols: &'a [String]) -> Self {
        Self {
            instructions,
            consts,
            symbols,
            heap: Heap::new(),
            frames: Vec::new(),
            staged: [Word::default(); NUM_REGISTERS as usize],
            ip: 0,
            result: None,
            peak_frames: 0,
        }
    }

    fn regs(&mut self) -> &mut [Word; NUM_REGISTERS as usize] {
        &mut self.frames.last_mut().expect("no active frame").regs
    }

    fn reg(&self, reg: Reg) -> Word {
        self.frames.last().expect("no active frame").regs[reg as usize]
    }

    /// Runs the program from the entry function and returns the result word.
    pub fn run(&mut self) -> Result<Word, RuntimeTrap> {
        // function 0 starts at address 0; skip its fun_header
        self.frames.push(Frame::new(0, ReturnAction::Halt));
        self.peak_frames = 1;
        self.ip = 1;
        loop {
            let word = *self
                .instructions
                .get(self.ip)
                .ok_or(RuntimeTrap::BadAddress(self.ip as u32))?;
            let instr = decode(word);
            trace!(ip = self.ip, op = %instr.op, "dispatch");
            self.ip += 1;
            self.step(instr)?;
            if let Some(result) = self.result {
                return Ok(result);
            }
        }
    }

    fn step(&mut self, instr: crate::tac::Instr) -> Result<(), RuntimeTrap> {
        match instr.op {
            Opcode::Ret => {
                let value = self.reg(instr.r0);
                self.do_return(value)?;
            }
            Opcode::LoadI => {
                self.regs()[instr.r0 as usize] = Word::number(instr.imm as i32);
            }
            Opcode::LoadAddr => {
                self.regs()[instr.r0 as usize] = Word::match_data(instr.imm);
            }
            Opcode::LoadPs => {
                self.regs()[instr.r0 as usize] = Word::plain_symbol(SymbolId::from_index(instr.imm));
            }
            Opcode::LoadCs => {
                self.regs()[instr.r0 as usize] = Word::compound_symbol(instr.imm);
            }
            Opcode::LoadC => {
                let cell = self.consts[instr.imm as usize];
                // a string cell is referenced by address; plain cells hold
                // the value itself
                let value = if cell.tag() == Tag::StringHeader {
                    Word::string(instr.imm)
                } else {
                    cell
                };
                self.regs()[instr.r0 as usize] = value;
            }
            Opcode::LoadF => {
                self.regs()[instr.r0 as usize] = Word::function(instr.imm);
            }
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => {
                let result = self.arith(instr.op, instr.r1, instr.r2)?;
                self.regs()[instr.r0 as usize] = result;
            }
            Opcode::Lt | Opcode::Gt => {
                let op: &'static str = instr.op.into();
                let a = self.number_operand(op, instr.r1)?;
                let b = self.number_operand(op, instr.r2)?;
                let truth = if instr.op == Opcode::Lt { a < b } else { a > b };
                self.regs()[instr.r0 as usize] = bool_word(truth);
            }
            Opcode::Eq => {
                // equality on values is bitwise
                let truth = self.reg(instr.r1) == self.reg(instr.r2);
                self.regs()[instr.r0 as usize] = bool_word(truth);
            }
            Opcode::And | Opcode::Or => {
                let op: &'static str = instr.op.into();
                let a = self.bool_operand(op, instr.r1)?;
                let b = self.bool_operand(op, instr.r2)?;
                let truth = if instr.op == Opcode::And { a && b } else { a || b };
                self.regs()[instr.r0 as usize] = bool_word(truth);
            }
            Opcode::Not => {
                let a = self.bool_operand("!", instr.r1)?;
                self.regs()[instr.r0 as usize] = bool_word(!a);
            }
            Opcode::Move => {
                self.regs()[instr.r0 as usize] = self.reg(instr.r1);
            }
            Opcode::SetArg => {
                self.staged[instr.r0 as usize] = self.reg(instr.r1);
            }
            Opcode::Call => {
                let target = self.reg(instr.r1);
                if target.tag() != Tag::Function {
                    return Err(RuntimeTrap::NotCallable {
                        tag: target.tag_name(),
                    });
                }
                let args = self.take_staged(instr.r2);
                self.enter(
                    target.payload() as usize,
                    &[],
                    &args,
                    self.ip,
                    ReturnAction::Store { reg: instr.r0 },
                )?;
            }
            Opcode::TailCall => {
                let target = self.reg(instr.r0);
                if target.tag() != Tag::Function {
                    return Err(RuntimeTrap::NotCallable {
                        tag: target.tag_name(),
                    });
                }
                let args = self.take_staged(instr.r1);
                let frame = self.frames.pop().expect("tail call with no frame");
                self.enter(target.payload() as usize, &[], &args, frame.return_ip, frame.action)?;
            }
            Opcode::GenAp => {
                let fun = self.reg(instr.r1);
                let args = self.take_staged(instr.r2);
                self.apply(fun, args, self.ip, ReturnAction::Store { reg: instr.r0 })?;
            }
            Opcode::TailGenAp => {
                let fun = self.reg(instr.r0);
                let args = self.take_staged(instr.r1);
                let frame = self.frames.pop().expect("tail apply with no frame");
                self.apply(fun, args, frame.return_ip, frame.action)?;
            }
            Opcode::PartAp => {
                let target = self.reg(instr.r1);
                if target.tag() != Tag::Function {
                    return Err(RuntimeTrap::NotCallable {
                        tag: target.tag_name(),
                    });
                }
                let mut block = Vec::with_capacity(1 + instr.r2 as usize);
                block.push(target);
                block.extend_from_slice(&self.staged[..instr.r2 as usize]);
                let addr = self.heap.alloc(&block);
                self.regs()[instr.r0 as usize] = Word::closure(addr);
            }
            Opcode::MakeCl => {
                let code = self.reg(instr.r1);
                let mut block = Vec::with_capacity(1 + instr.r2 as usize);
                block.push(code);
                block.extend_from_slice(&self.staged[..instr.r2 as usize]);
                let addr = self.heap.alloc(&block);
                self.regs()[instr.r0 as usize] = Word::closure(addr);
            }
            Opcode::SetClVal => {
                let closure = self.reg(instr.r0);
                debug_assert_eq!(closure.tag(), Tag::Closure);
                let value = self.reg(instr.r1);
                self.heap.set(closure.payload() + 1 + u32::from(instr.r2), value);
            }
            Opcode::CopySym => {
                let template = instr.imm as usize;
                let (_, arity) = self.consts[template].symbol_header_parts();
                let block: Vec<Word> = self.consts[template..=template + arity].to_vec();
                let addr = self.heap.alloc(&block);
                self.regs()[instr.r0 as usize] = Word::heap_symbol(addr);
            }
            Opcode::SetSymField => {
                let sym = self.reg(instr.r0);
                debug_assert_eq!(sym.tag(), Tag::HeapSymbol);
                let value = self.reg(instr.r1);
                self.heap.set(sym.payload() + 1 + u32::from(instr.ext), value);
            }
            Opcode::Jmp => {
                self.ip += instr.imm as usize;
            }
            Opcode::Match => {
                let subject = self.reg(instr.r0);
                let pattern = self.reg(instr.r1);
                debug_assert_eq!(pattern.tag(), Tag::MatchData);
                let pattern_addr = pattern.payload() as usize;
                let hit = matching::dispatch(self.consts, &self.heap, pattern_addr, subject)
                    .ok_or(RuntimeTrap::UnmatchedPattern)?;
                let base = instr.r2 as usize;
                for (slot, value) in &hit.captures {
                    self.regs()[base + slot] = *value;
                }
                // land on the selected entry of the following jump table
                self.ip += hit.branch;
            }
            Opcode::ModLookup => {
                let value = self.module_lookup(instr.r1, instr.r2)?;
                self.regs()[instr.r0 as usize] = value;
            }
            Opcode::FunHeader => {
                // only reachable by falling into a function body
                return Err(RuntimeTrap::BadAddress(self.ip as u32 - 1));
            }
        }
        Ok(())
    }

    // ========================================================================
    // Calls and returns
    // ========================================================================

    fn take_staged(&mut self, count: u8) -> Vec<Word> {
        self.staged[..count as usize].to_vec()
    }

    /// Pushes a frame for the function at `code_addr`, placing `stored`
    /// (captures and pre-applied arguments) at registers 0.. and `args`
    /// after them.
    fn enter(
        &mut self,
        code_addr: usize,
        stored: &[Word],
        args: &[Word],
        return_ip: usize,
        action: ReturnAction,
    ) -> Result<(), RuntimeTrap> {
        let mut frame = Frame::new(return_ip, action);
        frame.regs[..stored.len()].copy_from_slice(stored);
        frame.regs[stored.len()..stored.len() + args.len()].copy_from_slice(args);
        self.frames.push(frame);
        self.peak_frames = self.peak_frames.max(self.frames.len());
        self.ip = code_addr + 1; // skip the fun_header
        Ok(())
    }

    /// Generic apply: dispatch on the callee's tag and saturation.
    fn apply(&mut self, fun: Word, args: Vec<Word>, return_ip: usize, action: ReturnAction) -> Result<(), RuntimeTrap> {
        let (code_addr, stored) = match fun.tag() {
            Tag::Function => (fun.payload() as usize, Vec::new()),
            Tag::Closure => {
                let addr = fun.payload();
                let len = self.heap.block_len(addr);
                let code = self.heap.get(addr);
                (code.payload() as usize, self.heap.slice(addr + 1, len - 1).to_vec())
            }
            _ => {
                return Err(RuntimeTrap::NotCallable { tag: fun.tag_name() });
            }
        };
        let header = decode(
            *self
                .instructions
                .get(code_addr)
                .ok_or(RuntimeTrap::BadAddress(code_addr as u32))?,
        );
        if header.op != Opcode::FunHeader {
            return Err(RuntimeTrap::BadAddress(code_addr as u32));
        }
        let needed = header.r0 as usize + header.imm as usize;
        let remaining = needed.saturating_sub(stored.len());

        use std::cmp::Ordering;
        match args.len().cmp(&remaining) {
            Ordering::Equal => self.enter(code_addr, &stored, &args, return_ip, action),
            Ordering::Less => {
                // under-saturated: widen the partial-application record
                let mut block = Vec::with_capacity(1 + stored.len() + args.len());
                block.push(Word::function(code_addr as u32));
                block.extend_from_slice(&stored);
                block.extend_from_slice(&args);
                let addr = self.heap.alloc(&block);
                self.ip = return_ip;
                self.deliver(action, Word::closure(addr))
            }
            Ordering::Greater => {
                // over-saturated: run the saturated call, then re-apply its
                // result to the leftovers
                let pending = args[remaining..].to_vec();
                self.enter(
                    code_addr,
                    &stored,
                    &args[..remaining],
                    return_ip,
                    ReturnAction::Reapply {
                        pending,
                        then: Box::new(action),
                    },
                )
            }
        }
    }

    fn do_return(&mut self, value: Word) -> Result<(), RuntimeTrap> {
        let frame = self.frames.pop().expect("return with no frame");
        self.ip = frame.return_ip;
        self.deliver(frame.action, value)
    }

    /// Hands a finished value to its destination. The producing frame (if
    /// any) has already been popped, so the top frame is the consumer.
    fn deliver(&mut self, action: ReturnAction, value: Word) -> Result<(), RuntimeTrap> {
        match action {
            ReturnAction::Halt => {
                self.result = Some(value);
                Ok(())
            }
            ReturnAction::Store { reg } => {
                self.regs()[reg as usize] = value;
                Ok(())
            }
            ReturnAction::Reapply { pending, then } => self.apply(value, pending, self.ip, *then),
        }
    }

    // ========================================================================
    // Operand helpers
    // ========================================================================

    fn arith(&mut self, op: Opcode, lhs: Reg, rhs: Reg) -> Result<Word, RuntimeTrap> {
        let name: &'static str = op.into();
        let a = self.number_operand(name, lhs)?;
        let b = self.number_operand(name, rhs)?;
        let value = match op {
            Opcode::Add => a.wrapping_add(b),
            Opcode::Sub => a.wrapping_sub(b),
            Opcode::Mul => a.wrapping_mul(b),
            Opcode::Div => {
                if b == 0 {
                    return Err(RuntimeTrap::DivisionByZero);
                }
                a.wrapping_div(b)
            }
            _ => unreachable!("arith called with non-arithmetic opcode"),
        };
        // arithmetic lives in the 28-bit payload domain
        Ok(Word::number(truncate_payload(value)))
    }

    fn number_operand(&self, op: &'static str, reg: Reg) -> Result<i32, RuntimeTrap> {
        let word = self.reg(reg);
        if word.tag() != Tag::Number {
            return Err(RuntimeTrap::NumberExpected {
                op,
                tag: word.tag_name(),
            });
        }
        Ok(word.number_value())
    }

    fn bool_operand(&self, op: &'static str, reg: Reg) -> Result<bool, RuntimeTrap> {
        let word = self.reg(reg);
        if word.tag() == Tag::PlainSymbol {
            if word.payload() == SYM_TRUE.index() as u32 {
                return Ok(true);
            }
            if word.payload() == SYM_FALSE.index() as u32 {
                return Ok(false);
            }
        }
        Err(RuntimeTrap::BooleanExpected {
            op,
            tag: word.tag_name(),
        })
    }

    /// Scans a module record's (field-symbol, value) pairs.
    fn module_lookup(&self, module_reg: Reg, field_reg: Reg) -> Result<Word, RuntimeTrap> {
        let module = self.reg(module_reg);
        let field = self.reg(field_reg);
        let (header, read): (Word, Box<dyn Fn(usize) -> Word + '_>) = match module.tag() {
            Tag::HeapSymbol => {
                let addr = module.payload();
                (self.heap.get(addr), Box::new(move |i| self.heap.get(addr + i as u32)))
            }
            Tag::CompoundSymbol => {
                let addr = module.payload() as usize;
                (self.consts[addr], Box::new(move |i| self.consts[addr + i]))
            }
            _ => {
                return Err(RuntimeTrap::NotAModule {
                    tag: module.tag_name(),
                })
            }
        };
        let (symbol, arity) = header.symbol_header_parts();
        if symbol != SYM_MODULE {
            return Err(RuntimeTrap::NotAModule {
                tag: module.tag_name(),
            });
        }
        for i in (0..arity).step_by(2) {
            if read(1 + i) == field {
                return Ok(read(1 + i + 1));
            }
        }
        Err(RuntimeTrap::UnknownField {
            field: self
                .symbols
                .get(field.payload() as usize)
                .cloned()
                .unwrap_or_else(|| format!("#{}", field.payload())),
        })
    }

    // ========================================================================
    // Result decoding
    // ========================================================================

    /// Decodes a result word into the public value type.
    pub fn decode_value(&self, word: Word) -> Result<Value, RuntimeTrap> {
        match word.tag() {
            Tag::Number => Ok(Value::Number(word.number_value())),
            Tag::PlainSymbol => Ok(Value::Symbol(self.symbol_name(word.payload()))),
            Tag::CompoundSymbol => {
                let addr = word.payload() as usize;
                let (symbol, arity) = self.consts[addr].symbol_header_parts();
                let fields = (0..arity)
                    .map(|i| self.decode_value(self.consts[addr + 1 + i]))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Compound {
                    symbol: self.symbol_name(symbol.index() as u32),
                    fields,
                })
            }
            Tag::HeapSymbol => {
                let addr = word.payload();
                let (symbol, arity) = self.heap.get(addr).symbol_header_parts();
                let fields = (0..arity)
                    .map(|i| self.decode_value(self.heap.get(addr + 1 + i as u32)))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Compound {
                    symbol: self.symbol_name(symbol.index() as u32),
                    fields,
                })
            }
            Tag::Str => Ok(Value::Str(decode_string(
                self.consts,
                ConstAddr::from_index(word.payload()),
            ))),
            Tag::Function => Ok(Value::Function(word.payload())),
            Tag::Closure => Ok(Value::Closure(word.payload())),
            _ => Err(RuntimeTrap::Undecodable {
                tag: word.tag_name(),
            }),
        }
    }

    fn symbol_name(&self, id: u32) -> String {
        self.symbols
            .get(id as usize)
            .cloned()
            .unwrap_or_else(|| format!("#{id}"))
    }

    /// Deepest call stack seen during the run; tail calls keep this flat.
    pub fn peak_frames(&self) -> usize {
        self.peak_frames
    }
}

/// `false`/`true` as the reserved plain symbols.
fn bool_word(truth: bool) -> Word {
    Word::plain_symbol(if truth { SYM_TRUE } else { SYM_FALSE })
}

/// Sign-truncates an `i32` into the 28-bit payload domain.
fn truncate_payload(value: i32) -> i32 {
    (value << 4) >> 4
}
