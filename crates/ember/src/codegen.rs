//! Code generator: NST to three-address code.
//!
//! Each function gets a bank of 32 virtual registers. Captured values occupy
//! indices `0..f-1`, parameters `f..f+p-1`, and allocation is monotonic from
//! there; running out of registers is a compile error. When a function
//! contains match expressions, the top of the bank is reserved as the
//! capture window, sized by the largest branch capture count.
//!
//! The generator tracks three things per frame beyond the name-to-register
//! maps: which registers hold statically known function addresses (callable
//! with `call` instead of `gen_ap`), the compile-time constant bound to each
//! name (so constant free variables can be materialized in inner frames),
//! and the self-reference slot of recursive closures.

use ahash::{AHashMap, AHashSet};
use tracing::debug;

use crate::consts::{ConstAddr, ConstTable};
use crate::error::CompileError;
use crate::intern::SymbolId;
use crate::nst::{BranchAtom, LambdaAtom, NstAtom, NstExpr, NstVar, PrimOp, VarKind};
use crate::tac::{FuncId, Opcode, Reg, Tac, MAX_IMMEDIATE, NUM_REGISTERS};

/// Compiles a normalized program into per-function TAC listings.
///
/// Function 0 is the entry point. Big number literals are spilled into
/// `consts` as single-word cells, which is why the table is still mutable
/// here.
pub fn generate(expr: &NstExpr, consts: &mut ConstTable) -> Result<Vec<Vec<Tac>>, CompileError> {
    let mut generator = Generator {
        consts,
        functions: Vec::new(),
        scopes: Vec::new(),
    };
    let entry = generator.compile_function(&[], &[], expr)?;
    debug_assert_eq!(entry.index(), 0);
    let functions: Vec<Vec<Tac>> = generator
        .functions
        .into_iter()
        .map(|f| f.expect("every reserved function slot is filled"))
        .collect();
    debug!(functions = functions.len(), "code generation complete");
    Ok(functions)
}

/// A compile-time constant a name is bound to, driving local emission
/// decisions for constant free variables.
#[derive(Debug, Clone, Copy, PartialEq)]
enum CtConst {
    Number(i32),
    Symbol(SymbolId),
    Compound(ConstAddr),
    Lambda(FuncId),
}

/// Per-function compilation state.
#[derive(Debug, Default)]
struct FrameScope {
    code: Vec<Tac>,
    next_reg: u8,
    /// One past the highest allocatable register; the registers above it
    /// form the match capture window.
    reg_limit: u8,
    params: AHashMap<String, Reg>,
    free_vars: AHashMap<String, Reg>,
    locals: AHashMap<String, Reg>,
    /// Registers holding a statically known function address.
    direct_call: AHashSet<Reg>,
    constants: AHashMap<String, CtConst>,
}

struct Generator<'a> {
    consts: &'a mut ConstTable,
    /// Reserved slots filled as each function finishes compiling.
    functions: Vec<Option<Vec<Tac>>>,
    scopes: Vec<FrameScope>,
}

impl Generator<'_> {
    fn scope(&mut self) -> &mut FrameScope {
        self.scopes.last_mut().expect("scope stack is never empty during emission")
    }

    fn emit(&mut self, tac: Tac) {
        self.scope().code.push(tac);
    }

    fn alloc_reg(&mut self) -> Result<Reg, CompileError> {
        let scope = self.scope();
        if scope.next_reg >= scope.reg_limit {
            return Err(CompileError::internal(format!(
                "register limit exceeded ({} available)",
                scope.reg_limit
            )));
        }
        let reg = scope.next_reg;
        scope.next_reg += 1;
        Ok(reg)
    }

    /// Register holding an already-classified variable.
    fn reg_of(&mut self, var: &NstVar) -> Result<Reg, CompileError> {
        let scope = self.scope();
        let reg = match var.kind {
            VarKind::Param => scope.params.get(&var.name),
            VarKind::Local => scope.locals.get(&var.name),
            VarKind::DynamicFree => scope.free_vars.get(&var.name),
            VarKind::ConstantFree | VarKind::Recursive => None,
        };
        reg.copied()
            .ok_or_else(|| CompileError::internal(format!("no register for variable '{}'", var.name)))
    }

    /// Register to capture `name` from when building a closure in the
    /// current frame.
    fn capture_reg(&mut self, name: &str) -> Result<Reg, CompileError> {
        let scope = self.scope();
        scope
            .locals
            .get(name)
            .or_else(|| scope.params.get(name))
            .or_else(|| scope.free_vars.get(name))
            .copied()
            .ok_or_else(|| CompileError::internal(format!("no register to capture '{name}' from")))
    }

    /// Finds the compile-time constant a constant free variable refers to,
    /// searching enclosing frames innermost first.
    fn find_outer_constant(&self, name: &str) -> Result<CtConst, CompileError> {
        for scope in self.scopes.iter().rev().skip(1) {
            if let Some(ct) = scope.constants.get(name) {
                return Ok(*ct);
            }
        }
        Err(CompileError::internal(format!(
            "constant free variable '{name}' has no recorded constant"
        )))
    }

    // ========================================================================
    // Function compilation
    // ========================================================================

    fn compile_function(
        &mut self,
        free_vars: &[String],
        params: &[String],
        body: &NstExpr,
    ) -> Result<FuncId, CompileError> {
        let id = FuncId::new(self.functions.len());
        self.functions.push(None);

        let fixed = free_vars.len() + params.len();
        let reserve = max_match_captures(body);
        let reg_limit = (NUM_REGISTERS as usize)
            .checked_sub(reserve)
            .filter(|limit| fixed <= *limit)
            .ok_or_else(|| {
                CompileError::internal(format!(
                    "register limit exceeded: {fixed} fixed + {reserve} capture registers"
                ))
            })? as u8;

        let mut scope = FrameScope {
            next_reg: fixed as u8,
            reg_limit,
            ..FrameScope::default()
        };
        for (i, name) in free_vars.iter().enumerate() {
            scope.free_vars.insert(name.clone(), i as Reg);
        }
        for (i, name) in params.iter().enumerate() {
            scope.params.insert(name.clone(), (free_vars.len() + i) as Reg);
        }
        scope.code.push(Tac::FunHeader {
            params: params.len() as u8,
            captures: free_vars.len() as u8,
        });
        self.scopes.push(scope);

        let result = self.compile_expr(body, true)?;
        if let Some(reg) = result {
            self.emit(Tac::Ret { src: reg });
        }

        let scope = self.scopes.pop().expect("function scope pushed above");
        self.functions[id.index()] = Some(scope.code);
        Ok(id)
    }

    /// Compiles a let chain. Returns the register holding the result value,
    /// or `None` when the final atom completed the frame with a tail call.
    fn compile_expr(&mut self, expr: &NstExpr, tail: bool) -> Result<Option<Reg>, CompileError> {
        let mut cur = expr;
        loop {
            match cur {
                NstExpr::Let { var, atom, body } => {
                    let reg = self.alloc_reg()?;
                    self.scope().locals.insert(var.clone(), reg);
                    self.emit_atom(atom, reg, Some(var), false)?;
                    cur = body;
                }
                NstExpr::Atom(atom) => {
                    let reg = self.alloc_reg()?;
                    let completed = self.emit_atom(atom, reg, None, tail)?;
                    return Ok(if completed { None } else { Some(reg) });
                }
            }
        }
    }

    // ========================================================================
    // Atom emission
    // ========================================================================

    /// Emits the code for one atom into `dst`. `let_name` is set when the
    /// atom is the right-hand side of a let binding. Returns true when the
    /// atom completed the frame via a tail call.
    fn emit_atom(
        &mut self,
        atom: &NstAtom,
        dst: Reg,
        let_name: Option<&str>,
        tail: bool,
    ) -> Result<bool, CompileError> {
        match atom {
            NstAtom::Number(n) => {
                self.emit_number(dst, *n);
                self.note_constant(let_name, CtConst::Number(*n), dst);
                Ok(false)
            }
            NstAtom::PlainSymbol(symbol) => {
                self.emit(Tac::LoadSymbol { dst, symbol: *symbol });
                self.note_constant(let_name, CtConst::Symbol(*symbol), dst);
                Ok(false)
            }
            NstAtom::CompoundSymbol { addr, slot_fills } => {
                self.emit_compound(dst, *addr, slot_fills)?;
                if slot_fills.is_empty() {
                    self.note_constant(let_name, CtConst::Compound(*addr), dst);
                }
                Ok(false)
            }
            NstAtom::Module { addr, slot_fills } => {
                // Modules are always writable heap records, even when every
                // field happens to be constant.
                self.emit(Tac::CopySym { dst, addr: *addr });
                self.emit_slot_fills(dst, slot_fills)?;
                Ok(false)
            }
            NstAtom::Str(addr) => {
                self.emit(Tac::LoadCell { dst, addr: *addr });
                Ok(false)
            }
            NstAtom::PrimOp { op, args } => {
                self.emit_prim(*op, args, dst)?;
                Ok(false)
            }
            NstAtom::Var(var) => {
                self.emit_var(var, dst, let_name)?;
                Ok(false)
            }
            NstAtom::Lambda(lambda) => {
                self.emit_lambda(lambda, dst, let_name)?;
                Ok(false)
            }
            NstAtom::FunAp { fun, args } => {
                let fun_reg = self.reg_of(fun)?;
                self.stage_args(args)?;
                let nargs = args.len() as u8;
                let direct = self.scope().direct_call.contains(&fun_reg);
                let call = match (direct, tail) {
                    (true, false) => Tac::Call { dst, fun: fun_reg, args: nargs },
                    (true, true) => Tac::TailCall { fun: fun_reg, args: nargs },
                    (false, false) => Tac::GenAp { dst, fun: fun_reg, args: nargs },
                    (false, true) => Tac::TailGenAp { fun: fun_reg, args: nargs },
                };
                self.emit(call);
                Ok(tail)
            }
            NstAtom::PartAp { fun, args } => {
                let fun_reg = self.reg_of(fun)?;
                self.stage_args(args)?;
                self.emit(Tac::PartAp {
                    dst,
                    fun: fun_reg,
                    args: args.len() as u8,
                });
                Ok(false)
            }
            NstAtom::Match {
                max_captures,
                subject,
                pattern_addr,
                branches,
            } => {
                self.emit_match(*max_captures, subject, *pattern_addr, branches, dst, tail)?;
                Ok(tail)
            }
            NstAtom::ModuleLookup { module, field } => {
                let module_reg = self.reg_of(module)?;
                let field_reg = self.reg_of(field)?;
                self.emit(Tac::ModLookup {
                    dst,
                    module: module_reg,
                    field: field_reg,
                });
                Ok(false)
            }
        }
    }

    fn emit_number(&mut self, dst: Reg, value: i32) {
        if value >= 0 && (value as u32) <= MAX_IMMEDIATE {
            self.emit(Tac::LoadNumber {
                dst,
                value: value as u32,
            });
        } else {
            // Negative or oversized literals are spilled to a constant cell.
            let addr = self.consts.add_number_cell(value);
            self.emit(Tac::LoadCell { dst, addr });
        }
    }

    fn emit_compound(&mut self, dst: Reg, addr: ConstAddr, slot_fills: &[(usize, NstVar)]) -> Result<(), CompileError> {
        if slot_fills.is_empty() {
            self.emit(Tac::LoadCompound { dst, addr });
            return Ok(());
        }
        self.emit(Tac::CopySym { dst, addr });
        self.emit_slot_fills(dst, slot_fills)
    }

    fn emit_slot_fills(&mut self, dst: Reg, slot_fills: &[(usize, NstVar)]) -> Result<(), CompileError> {
        for (slot, var) in slot_fills {
            if *slot > u16::MAX as usize || *slot >= (1 << 11) {
                return Err(CompileError::internal(format!(
                    "payload slot {slot} exceeds set_sym_field encoding"
                )));
            }
            let value = self.reg_of(var)?;
            self.emit(Tac::SetSymField {
                sym: dst,
                value,
                slot: *slot as u16,
            });
        }
        Ok(())
    }

    fn emit_prim(&mut self, op: PrimOp, args: &[NstVar], dst: Reg) -> Result<(), CompileError> {
        if op == PrimOp::Not {
            let src = self.reg_of(&args[0])?;
            self.emit(Tac::Not { dst, src });
            return Ok(());
        }
        let opcode = match op {
            PrimOp::Add => Opcode::Add,
            PrimOp::Sub => Opcode::Sub,
            PrimOp::Mul => Opcode::Mul,
            PrimOp::Div => Opcode::Div,
            PrimOp::Lt => Opcode::Lt,
            PrimOp::Gt => Opcode::Gt,
            PrimOp::Eq => Opcode::Eq,
            PrimOp::And => Opcode::And,
            PrimOp::Or => Opcode::Or,
            PrimOp::Not => unreachable!("handled above"),
        };
        let lhs = self.reg_of(&args[0])?;
        let rhs = self.reg_of(&args[1])?;
        self.emit(Tac::Binary { op: opcode, dst, lhs, rhs });
        Ok(())
    }

    fn emit_var(&mut self, var: &NstVar, dst: Reg, let_name: Option<&str>) -> Result<(), CompileError> {
        match var.kind {
            VarKind::Param | VarKind::Local | VarKind::DynamicFree => {
                let src = self.reg_of(var)?;
                self.emit(Tac::Move { dst, src });
                Ok(())
            }
            VarKind::ConstantFree => {
                // Materialize the outer scope's constant in this frame.
                let ct = self.find_outer_constant(&var.name)?;
                match ct {
                    CtConst::Number(n) => self.emit_number(dst, n),
                    CtConst::Symbol(symbol) => self.emit(Tac::LoadSymbol { dst, symbol }),
                    CtConst::Compound(addr) => self.emit(Tac::LoadCompound { dst, addr }),
                    CtConst::Lambda(func) => {
                        self.emit(Tac::LoadFunction { dst, func });
                        if let_name.is_none() {
                            // The function escapes as a value; box it.
                            self.emit(Tac::MakeCl {
                                dst,
                                fun: dst,
                                captures: 0,
                            });
                        }
                    }
                }
                self.note_constant(let_name, ct, dst);
                Ok(())
            }
            VarKind::Recursive => Err(CompileError::internal(format!(
                "unresolved recursive reference '{}' reached codegen",
                var.name
            ))),
        }
    }

    fn emit_lambda(&mut self, lambda: &LambdaAtom, dst: Reg, let_name: Option<&str>) -> Result<(), CompileError> {
        let func = self.compile_function(&lambda.free_vars, &lambda.params, &lambda.body)?;

        if lambda.free_vars.is_empty() {
            self.emit(Tac::LoadFunction { dst, func });
            if let_name.is_some() {
                self.note_constant(let_name, CtConst::Lambda(func), dst);
            } else {
                // The lambda escapes as a value; box it as a zero-capture
                // closure.
                self.emit(Tac::MakeCl {
                    dst,
                    fun: dst,
                    captures: 0,
                });
            }
            return Ok(());
        }

        // The self-reference slot is the position of the lambda's own name
        // in its free list; it is staged with a placeholder and patched
        // after allocation.
        let self_slot = let_name.and_then(|name| lambda.free_vars.iter().position(|f| f == name));
        let count = lambda.free_vars.len();
        for (i, free) in lambda.free_vars.iter().enumerate() {
            let src = if Some(i) == self_slot { dst } else { self.capture_reg(free)? };
            self.emit(Tac::SetArg {
                index: i as u8,
                src,
                remaining: if i + 1 == count { count as u8 } else { 0 },
            });
        }
        self.emit(Tac::LoadFunction { dst, func });
        self.emit(Tac::MakeCl {
            dst,
            fun: dst,
            captures: count as u8,
        });
        if let Some(slot) = self_slot {
            self.emit(Tac::SetClVal {
                closure: dst,
                value: dst,
                slot: slot as u8,
            });
        }
        Ok(())
    }

    fn stage_args(&mut self, args: &[NstVar]) -> Result<(), CompileError> {
        let count = args.len();
        for (i, arg) in args.iter().enumerate() {
            let src = self.reg_of(arg)?;
            self.emit(Tac::SetArg {
                index: i as u8,
                src,
                remaining: (count - 1 - i) as u8,
            });
        }
        Ok(())
    }

    /// Records the constant bound by a let and flags direct-callable
    /// registers (statically known function addresses).
    fn note_constant(&mut self, let_name: Option<&str>, ct: CtConst, reg: Reg) {
        let Some(name) = let_name else { return };
        self.scope().constants.insert(name.to_owned(), ct);
        if matches!(ct, CtConst::Lambda(_)) {
            self.scope().direct_call.insert(reg);
        }
    }

    // ========================================================================
    // Match lowering
    // ========================================================================

    fn emit_match(
        &mut self,
        max_captures: usize,
        subject: &NstVar,
        pattern_addr: ConstAddr,
        branches: &[BranchAtom],
        dst: Reg,
        tail: bool,
    ) -> Result<(), CompileError> {
        let capture_start = if max_captures == 0 {
            NUM_REGISTERS - 1
        } else {
            NUM_REGISTERS - max_captures as u8
        };

        // Branch callables are materialized before the dispatch sequence.
        struct BranchCall {
            fun_reg: Reg,
            direct: bool,
        }
        let mut calls = Vec::with_capacity(branches.len());
        for branch in branches {
            let func = self.compile_function(&branch.free_vars, &branch.matched_vars, &branch.body)?;
            let reg = self.alloc_reg()?;
            if branch.free_vars.is_empty() {
                self.emit(Tac::LoadFunction { dst: reg, func });
                self.scope().direct_call.insert(reg);
                calls.push(BranchCall {
                    fun_reg: reg,
                    direct: true,
                });
            } else {
                let count = branch.free_vars.len();
                for (i, free) in branch.free_vars.iter().enumerate() {
                    let src = self.capture_reg(free)?;
                    self.emit(Tac::SetArg {
                        index: i as u8,
                        src,
                        remaining: if i + 1 == count { count as u8 } else { 0 },
                    });
                }
                self.emit(Tac::LoadFunction { dst: reg, func });
                self.emit(Tac::MakeCl {
                    dst: reg,
                    fun: reg,
                    captures: count as u8,
                });
                calls.push(BranchCall {
                    fun_reg: reg,
                    direct: false,
                });
            }
        }

        let pattern_reg = self.alloc_reg()?;
        self.emit(Tac::LoadAddr {
            dst: pattern_reg,
            addr: pattern_addr,
        });
        let subject_reg = self.reg_of(subject)?;
        self.emit(Tac::Match {
            subject: subject_reg,
            pattern: pattern_reg,
            capture_start,
        });

        // Branch invocation blocks are built separately so the jump table
        // can be laid out from their exact lengths.
        let mut blocks: Vec<Vec<Tac>> = Vec::with_capacity(branches.len());
        for (branch, call) in branches.iter().zip(&calls) {
            let mut code = Vec::new();
            let matched = branch.matched_vars.len();
            for j in 0..matched {
                code.push(Tac::SetArg {
                    index: j as u8,
                    src: capture_start + j as u8,
                    remaining: (matched - 1 - j) as u8,
                });
            }
            code.push(match (call.direct, tail) {
                (true, false) => Tac::Call {
                    dst,
                    fun: call.fun_reg,
                    args: matched as u8,
                },
                (true, true) => Tac::TailCall {
                    fun: call.fun_reg,
                    args: matched as u8,
                },
                (false, false) => Tac::GenAp {
                    dst,
                    fun: call.fun_reg,
                    args: matched as u8,
                },
                (false, true) => Tac::TailGenAp {
                    fun: call.fun_reg,
                    args: matched as u8,
                },
            });
            blocks.push(code);
        }

        // Jump table: entry i lands exactly at block i's first instruction.
        let n = blocks.len();
        let block_lens: Vec<usize> = blocks
            .iter()
            .enumerate()
            .map(|(i, b)| b.len() + usize::from(i + 1 < n))
            .collect();
        for i in 0..n {
            let skip = (n - 1 - i) + block_lens[..i].iter().sum::<usize>();
            self.emit(Tac::Jmp { skip: skip as u32 });
        }
        let total: usize = block_lens.iter().sum();
        let mut emitted = 0;
        for (i, block) in blocks.into_iter().enumerate() {
            emitted += block.len();
            for tac in block {
                self.emit(tac);
            }
            if i + 1 < n {
                let skip = total - emitted - 1;
                self.emit(Tac::Jmp { skip: skip as u32 });
                emitted += 1;
            }
        }
        Ok(())
    }
}

/// Largest capture window any match in this function body needs. Nested
/// lambda and branch bodies are separate functions and do not count.
fn max_match_captures(expr: &NstExpr) -> usize {
    let mut max = 0;
    let mut cur = expr;
    loop {
        let atom = match cur {
            NstExpr::Let { atom, body, .. } => {
                cur = body;
                atom
            }
            NstExpr::Atom(atom) => {
                if let NstAtom::Match { max_captures, .. } = atom {
                    max = max.max(*max_captures);
                }
                return max;
            }
        };
        if let NstAtom::Match { max_captures, .. } = atom {
            max = max.max(*max_captures);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use crate::parser::parse;

    fn compile(source: &str) -> (Vec<Vec<Tac>>, ConstTable) {
        let mut normalized = normalize(&parse(source).unwrap()).unwrap();
        let functions = generate(&normalized.expr, &mut normalized.consts).unwrap();
        (functions, normalized.consts)
    }

    #[test]
    fn test_entry_function_shape() {
        let (functions, _) = compile("4815");
        assert_eq!(functions.len(), 1);
        assert_eq!(
            functions[0],
            vec![
                Tac::FunHeader { params: 0, captures: 0 },
                Tac::LoadNumber { dst: 0, value: 4815 },
                Tac::Ret { src: 0 },
            ]
        );
    }

    #[test]
    fn test_negative_literal_spilled_to_cell() {
        let (functions, consts) = compile("-3");
        assert!(matches!(functions[0][1], Tac::LoadCell { .. }));
        let Tac::LoadCell { addr, .. } = functions[0][1] else { unreachable!() };
        assert_eq!(consts.words()[addr.index()].number_value(), -3);
    }

    #[test]
    fn test_captures_precede_params() {
        // `g` captures `x` (reg 0) and takes `y` (reg 1)
        let source = "val f (x) = { val g (y) = add x y\ng 5 }\nf 2";
        let (functions, _) = compile(source);
        // function layout: 0 = entry, 1 = f, 2 = g
        let g = &functions[2];
        assert_eq!(g[0], Tac::FunHeader { params: 1, captures: 1 });
        assert!(g.contains(&Tac::Binary {
            op: Opcode::Add,
            dst: 2,
            lhs: 0,
            rhs: 1
        }));
    }

    #[test]
    fn test_direct_call_for_known_function() {
        let source = "val id (x) = x\nid 7";
        let (functions, _) = compile(source);
        let entry = &functions[0];
        assert!(
            entry.iter().any(|t| matches!(t, Tac::TailCall { .. })),
            "saturated call to a known function in tail position should be a tail call: {entry:?}"
        );
        assert!(!entry.iter().any(|t| matches!(t, Tac::GenAp { .. } | Tac::TailGenAp { .. })));
    }

    #[test]
    fn test_closure_call_uses_gen_ap() {
        let source = "val make (x) = { val (y) = add x y }\nval f = make 1\nf 2";
        let (functions, _) = compile(source);
        let entry = &functions[0];
        assert!(entry.iter().any(|t| matches!(t, Tac::TailGenAp { .. })));
    }

    #[test]
    fn test_recursive_closure_gets_self_slot() {
        let source = "val loop (n) = loop n\nloop";
        let (functions, _) = compile(source);
        let entry = &functions[0];
        let make = entry.iter().position(|t| matches!(t, Tac::MakeCl { .. })).unwrap();
        assert_eq!(
            entry[make + 1],
            Tac::SetClVal {
                closure: 0,
                value: 0,
                slot: 0
            }
        );
    }

    #[test]
    fn test_match_jump_table_layout() {
        let source = "val n = 1\nval r = match n with\n  0 -> 10\n  _ -> 20\nend\nr";
        let (functions, _) = compile(source);
        let entry = &functions[0];
        let match_pos = entry.iter().position(|t| matches!(t, Tac::Match { .. })).unwrap();
        // two jump-table entries follow the match
        let Tac::Jmp { skip: skip0 } = entry[match_pos + 1] else {
            panic!("expected jump table after match: {entry:?}");
        };
        let Tac::Jmp { skip: skip1 } = entry[match_pos + 2] else {
            panic!("expected second jump-table entry");
        };
        // entry 0 skips the remaining table entry; entry 1 additionally
        // skips branch 0's block (call + trailing jmp)
        assert_eq!(skip0, 1);
        assert_eq!(skip1, 2);
        let table_end = match_pos + 3;
        // branch 0 captures nothing: its block is a bare call, then a jump
        // over branch 1's block
        assert!(matches!(entry[table_end], Tac::Call { args: 0, .. }));
        assert_eq!(entry[table_end + 1], Tac::Jmp { skip: 2 });
        // branch 1 stages its wildcard capture from the window top
        assert!(matches!(
            entry[table_end + 2],
            Tac::SetArg {
                index: 0,
                src: 31,
                ..
            }
        ));
        assert!(matches!(entry[table_end + 3], Tac::Call { args: 1, .. }));
    }

    #[test]
    fn test_match_capture_window_at_bank_top() {
        let source = "val p = :pair 1 2\nmatch p with\n  :pair a b -> add a b\nend";
        let (functions, _) = compile(source);
        let entry = &functions[0];
        let Tac::Match { capture_start, .. } = entry
            .iter()
            .find(|t| matches!(t, Tac::Match { .. }))
            .cloned()
            .unwrap()
        else {
            unreachable!()
        };
        assert_eq!(capture_start, NUM_REGISTERS - 2);
    }

    #[test]
    fn test_constant_free_var_materialized() {
        let source = "val c = 10\nval f (x) = add x c\nf 1";
        let (functions, _) = compile(source);
        let f = &functions[1];
        // `c` is loaded as an immediate inside f, not captured
        assert_eq!(f[0], Tac::FunHeader { params: 1, captures: 0 });
        assert!(f.contains(&Tac::LoadNumber { dst: 1, value: 10 }));
    }

    #[test]
    fn test_dynamic_compound_fill_sequence() {
        let source = "val a = 7\n:pair a 2";
        let (functions, _) = compile(source);
        let entry = &functions[0];
        let copy = entry.iter().position(|t| matches!(t, Tac::CopySym { .. })).unwrap();
        assert_eq!(
            entry[copy + 1],
            Tac::SetSymField {
                sym: 1,
                value: 0,
                slot: 0
            }
        );
    }
}
