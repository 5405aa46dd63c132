//! Text rendering of decoded instructions for trace logs

use crate::types::*;
use std::fmt::Write;

/// Render an operand with the channels selected by `mask`
pub fn operand_to_str(op: &Operand, mask: u8) -> String {
    if !op.is_present() {
        return String::new();
    }

    let mut out = String::new();
    if op.flags.contains(OperandFlags::NEGATIVE) {
        out.push('-');
    }
    if op.flags.contains(OperandFlags::ABSOLUTE) {
        out.push_str("abs(");
    }

    let prefix = if op.flags.contains(OperandFlags::GPI) { "gpi" } else { op.bank.prefix() };
    let _ = write!(out, "{}{}", prefix, op.num);

    if mask != 0 && op.bank != RegisterBank::Predicate {
        out.push('.');
        for (i, channel) in op.swizzle.iter().enumerate() {
            if mask & (1 << i) != 0 {
                out.push(channel.as_char());
            }
        }
    }

    if op.flags.contains(OperandFlags::ABSOLUTE) {
        out.push(')');
    }
    out
}

/// One line describing `inst`, used by decode tracing
pub fn instruction_to_str(inst: &Instruction) -> String {
    let mut out = format!("{:04}: {}{}", inst.pc, inst.predicate.as_str(), inst.opcode.mnemonic());

    if inst.repeat_count > 1 {
        let _ = write!(out, ".rpt{}", inst.repeat_count);
    }
    if inst.dest.is_present() {
        let _ = write!(out, ".{}", inst.dest.dtype.suffix());
    }

    let operands = [
        (&inst.dest, inst.dest_mask),
        (&inst.src0, inst.src_masks[0]),
        (&inst.src1, inst.src_masks[1]),
        (&inst.src2, inst.src_masks[2]),
    ];
    for (op, mask) in operands {
        if op.is_present() {
            out.push(' ');
            out.push_str(&operand_to_str(op, mask));
        }
    }

    match &inst.detail {
        Detail::Skipped { reason } => {
            let _ = write!(out, " ; skipped: {}", reason);
        }
        Detail::ConditionalMove { compare } => {
            let _ = write!(out, " ; {} 0", compare.operator());
        }
        Detail::Bitwise { immediate: Some(imm), .. } => {
            let _ = write!(out, " #{:#x}", imm);
        }
        Detail::Branch { target: Some(target), link } => {
            let _ = write!(out, " #{}{}", target, if *link { " link" } else { "" });
        }
        Detail::Test { alu_op, zero, sign } => {
            let _ = write!(out, " ; {} {:?}/{:?}", alu_op.mnemonic(), zero, sign);
        }
        Detail::Sample { dim, lod_mode, .. } => {
            let _ = write!(out, " ; {}d lod{}", dim, lod_mode);
        }
        _ => {}
    }
    out
}
