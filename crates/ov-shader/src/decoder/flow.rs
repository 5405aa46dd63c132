//! Flow control and control-word decoders

use super::matcher::Fields;
use super::DecodeContext;
use crate::types::*;

pub fn nop(ctx: &mut DecodeContext, _: &Fields) -> Result<Instruction, String> {
    Ok(ctx.instruction(Opcode::Nop))
}

pub fn phas(ctx: &mut DecodeContext, _: &Fields) -> Result<Instruction, String> {
    Ok(ctx.instruction(Opcode::Phas))
}

pub fn spec(ctx: &mut DecodeContext, _: &Fields) -> Result<Instruction, String> {
    Ok(ctx.instruction(Opcode::Spec))
}

/// Families the translator recognises but does not implement
pub fn unsupported(_: &mut DecodeContext, _: &Fields) -> Result<Instruction, String> {
    Err("instruction family not supported".into())
}

pub fn kill(ctx: &mut DecodeContext, f: &Fields) -> Result<Instruction, String> {
    let mut inst = ctx.instruction(Opcode::Kill);
    inst.predicate = ShortPredicate::from(f.u8('p')).into();
    Ok(inst)
}

/// Width of the branch offset field
const BRANCH_OFFSET_BITS: u32 = 20;

/// Sign-extend the branch offset field
fn branch_offset(raw: u32) -> i32 {
    let shift = 32 - BRANCH_OFFSET_BITS;
    ((raw << shift) as i32) >> shift
}

pub fn br(ctx: &mut DecodeContext, f: &Fields) -> Result<Instruction, String> {
    if f.bit('r') {
        return Err("indirect branches are not supported".into());
    }

    let target = i64::from(ctx.pc) + i64::from(branch_offset(f.u32('o')));

    let mut inst = ctx.instruction(Opcode::Br);
    inst.predicate = ExtPredicate::from(f.u8('p'));
    inst.detail = Detail::Branch {
        target: u32::try_from(target).ok(),
        link: f.bit('a'),
    };
    Ok(inst)
}

/// Per-repeat increments for one operand slot
///
/// In increment mode the byte is a signed step, in swizzle mode it holds
/// four 2-bit register offsets.
fn slot_increments(swizzle_mode: bool, value: u8) -> [i32; MAX_REPEATS] {
    let mut out = [0; MAX_REPEATS];
    for (j, inc) in out.iter_mut().enumerate() {
        *inc = if swizzle_mode {
            i32::from((value >> (2 * j)) & 0x3)
        } else {
            j as i32 * i32::from(value as i8)
        };
    }
    out
}

pub fn smlsi(ctx: &mut DecodeContext, f: &Fields) -> Result<Instruction, String> {
    let mut increments = [[0; MAX_REPEATS]; 4];
    increments[OperandSlot::Src0 as usize] = slot_increments(f.bit('r'), f.u8('a'));
    increments[OperandSlot::Src1 as usize] = slot_increments(f.bit('c'), f.u8('b'));
    increments[OperandSlot::Src2 as usize] = slot_increments(f.bit('i'), f.u8('f'));
    increments[OperandSlot::Dest as usize] = slot_increments(f.bit('d'), f.u8('e'));

    ctx.set_increments(increments);

    let mut inst = ctx.instruction(Opcode::Smlsi);
    inst.detail = Detail::Smlsi { increments };
    Ok(inst)
}

#[cfg(test)]
mod tests {
    use super::super::tests::{assemble, pattern};
    use super::super::{decode_instruction, decode_program};
    use super::*;

    #[test]
    fn test_branch_offset_sign_extension() {
        assert_eq!(branch_offset(3), 3);
        assert_eq!(branch_offset(0xFFFFF), -1);
        assert_eq!(branch_offset(0x80000), -(1 << 19));
    }

    #[test]
    fn test_branch_target() {
        let nop = assemble(pattern("NOP"), &[]);
        let back = assemble(pattern("BR"), &[('o', 0xFFFFE), ('p', 1)]);
        let program = decode_program(&[nop, nop, nop, back], false).unwrap();
        assert_eq!(program[3].opcode, Opcode::Br);
        assert_eq!(program[3].predicate, ExtPredicate::P0);
        assert_eq!(program[3].detail, Detail::Branch { target: Some(1), link: false });

        let before_start = assemble(pattern("BR"), &[('o', 0xFFFFF)]);
        let program = decode_program(&[before_start], false).unwrap();
        assert_eq!(program[0].detail, Detail::Branch { target: None, link: false });
    }

    #[test]
    fn test_kill_predicate() {
        let word = assemble(pattern("KILL"), &[('p', 3)]);
        let mut ctx = DecodeContext::new(false);
        let inst = decode_instruction(&mut ctx, word);
        assert_eq!(inst.opcode, Opcode::Kill);
        assert_eq!(inst.predicate, ExtPredicate::NegP0);
    }

    #[test]
    fn test_smlsi_updates_context() {
        let word = assemble(pattern("SMLSI"), &[('e', 2), ('a', 0xFF), ('c', 1), ('b', 0b11_10_01_00)]);
        let mut ctx = DecodeContext::new(false);
        let inst = decode_instruction(&mut ctx, word);
        assert_eq!(inst.opcode, Opcode::Smlsi);

        let increments = ctx.increments();
        assert_eq!(increments[OperandSlot::Dest as usize], [0, 2, 4, 6]);
        assert_eq!(increments[OperandSlot::Src0 as usize], [0, -1, -2, -3]);
        assert_eq!(increments[OperandSlot::Src1 as usize], [0, 1, 2, 3]);
        assert_eq!(increments[OperandSlot::Src2 as usize], [0, 0, 0, 0]);
    }
}
