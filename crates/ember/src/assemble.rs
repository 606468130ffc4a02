//! Assembler: per-function TAC listings to a flat instruction stream.
//!
//! Two passes. The first flattens the function list by concatenation and
//! records each function's absolute word offset (every TAC packs into
//! exactly one 32-bit word, so offsets fall out of the listing lengths).
//! The second encodes each instruction, substituting function indices with
//! absolute addresses.

use tracing::debug;

use crate::error::CompileError;
use crate::tac::{encode_ri, encode_rri, encode_rrr, Opcode, Tac, MAX_IMMEDIATE};

/// A fully assembled program: packed instruction words plus the resolved
/// per-function entry addresses (function 0 first).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Assembled {
    pub instructions: Vec<u32>,
    pub function_addrs: Vec<u32>,
}

/// Packs a program. Fails when the program outgrows the 21-bit address
/// space of the instruction format.
pub fn assemble(functions: &[Vec<Tac>]) -> Result<Assembled, CompileError> {
    // Pass 1: function addresses by running offset.
    let mut function_addrs = Vec::with_capacity(functions.len());
    let mut offset: usize = 0;
    for function in functions {
        function_addrs.push(offset as u32);
        offset += function.len();
    }
    if offset > MAX_IMMEDIATE as usize {
        return Err(CompileError::internal(format!(
            "program of {offset} words exceeds the 21-bit address space"
        )));
    }

    // Pass 2: encode.
    let mut instructions = Vec::with_capacity(offset);
    for function in functions {
        for tac in function {
            instructions.push(encode(tac, &function_addrs)?);
        }
    }
    debug!(words = instructions.len(), functions = functions.len(), "assembly complete");
    Ok(Assembled {
        instructions,
        function_addrs,
    })
}

fn encode(tac: &Tac, function_addrs: &[u32]) -> Result<u32, CompileError> {
    let check_imm = |imm: u32, what: &str| -> Result<u32, CompileError> {
        if imm > MAX_IMMEDIATE {
            return Err(CompileError::internal(format!("{what} {imm} exceeds the 21-bit immediate")));
        }
        Ok(imm)
    };
    Ok(match *tac {
        Tac::FunHeader { params, captures } => encode_ri(Opcode::FunHeader, params, u32::from(captures)),
        Tac::Ret { src } => encode_rrr(Opcode::Ret, src, 0, 0),
        Tac::LoadNumber { dst, value } => encode_ri(Opcode::LoadI, dst, check_imm(value, "number immediate")?),
        Tac::LoadAddr { dst, addr } => encode_ri(Opcode::LoadAddr, dst, check_imm(addr.raw(), "const address")?),
        Tac::LoadSymbol { dst, symbol } => {
            encode_ri(Opcode::LoadPs, dst, check_imm(symbol.index() as u32, "symbol id")?)
        }
        Tac::LoadCompound { dst, addr } => encode_ri(Opcode::LoadCs, dst, check_imm(addr.raw(), "const address")?),
        Tac::LoadCell { dst, addr } => encode_ri(Opcode::LoadC, dst, check_imm(addr.raw(), "const address")?),
        Tac::LoadFunction { dst, func } => encode_ri(Opcode::LoadF, dst, function_addrs[func.index()]),
        Tac::Binary { op, dst, lhs, rhs } => encode_rrr(op, dst, lhs, rhs),
        Tac::Not { dst, src } => encode_rrr(Opcode::Not, dst, src, 0),
        Tac::Move { dst, src } => encode_rrr(Opcode::Move, dst, src, 0),
        Tac::Call { dst, fun, args } => encode_rrr(Opcode::Call, dst, fun, args),
        Tac::GenAp { dst, fun, args } => encode_rrr(Opcode::GenAp, dst, fun, args),
        Tac::TailCall { fun, args } => encode_rrr(Opcode::TailCall, fun, args, 0),
        Tac::TailGenAp { fun, args } => encode_rrr(Opcode::TailGenAp, fun, args, 0),
        Tac::PartAp { dst, fun, args } => encode_rrr(Opcode::PartAp, dst, fun, args),
        Tac::Jmp { skip } => encode_ri(Opcode::Jmp, 0, check_imm(skip, "jump offset")?),
        Tac::Match {
            subject,
            pattern,
            capture_start,
        } => encode_rrr(Opcode::Match, subject, pattern, capture_start),
        Tac::SetArg { index, src, remaining } => encode_rrr(Opcode::SetArg, index, src, remaining),
        Tac::SetClVal { closure, value, slot } => encode_rrr(Opcode::SetClVal, closure, value, slot),
        Tac::MakeCl { dst, fun, captures } => encode_rrr(Opcode::MakeCl, dst, fun, captures),
        Tac::CopySym { dst, addr } => encode_ri(Opcode::CopySym, dst, check_imm(addr.raw(), "const address")?),
        Tac::SetSymField { sym, value, slot } => encode_rri(Opcode::SetSymField, sym, value, slot),
        Tac::ModLookup { dst, module, field } => encode_rrr(Opcode::ModLookup, dst, module, field),
    })
}
