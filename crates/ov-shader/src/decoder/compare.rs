//! Test instruction decoders (VTST, VTSTMSK)

use super::helpers::*;
use super::matcher::Fields;
use super::{repeat_count, DecodeContext};
use crate::types::*;

use crate::types::Opcode::*;

const F16_TEST_OPS: [Option<Opcode>; 16] = [
    None,
    None,
    Some(Vf16Add),
    Some(Vf16Frc),
    Some(Vrcp),
    Some(Vrsq),
    Some(Vlog),
    Some(Vexp),
    Some(Vf16Dp),
    Some(Vf16Min),
    Some(Vf16Max),
    Some(Vf16Dsx),
    Some(Vf16Dsy),
    Some(Vf16Mul),
    Some(Vf16Sub),
    None,
];

const F32_TEST_OPS: [Option<Opcode>; 16] = [
    None,
    None,
    Some(Vadd),
    Some(Vfrc),
    Some(Vrcp),
    Some(Vrsq),
    Some(Vlog),
    Some(Vexp),
    Some(Vdp),
    Some(Vmin),
    Some(Vmax),
    Some(Vdsx),
    Some(Vdsy),
    Some(Vmul),
    Some(Vsub),
    None,
];

const INT_TEST_OPS: [Option<Opcode>; 16] = [
    None,
    None,
    None,
    None,
    None,
    None,
    Some(Iadd16),
    Some(Isub16),
    Some(Imul16),
    Some(Iaddu16),
    Some(Isubu16),
    Some(Imulu16),
    Some(Iadd32),
    Some(Iaddu32),
    Some(Isub32),
    Some(Isubu32),
];

const BYTE_TEST_OPS: [Option<Opcode>; 16] = [
    Some(Iadd8),
    Some(Isub8),
    Some(Iaddu8),
    Some(Isubu8),
    Some(Imul8),
    Some(Fpmul8),
    Some(Imulu8),
    Some(Fpadd8),
    Some(Fpsub8),
    None,
    None,
    None,
    None,
    None,
    None,
    None,
];

const BITWISE_TEST_OPS: [Option<Opcode>; 16] = [
    Some(And),
    Some(Or),
    Some(Xor),
    Some(Shl),
    Some(Shr),
    Some(Rol),
    None,
    Some(Asr),
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
];

/// Resolve the ALU operation a test applies before comparing, with its load type
pub fn decode_test_op(alu_sel: u8, alu_op: u8, prec: bool) -> Result<(Opcode, DataType), String> {
    let index = (alu_op & 0xF) as usize;
    let op = match alu_sel & 0x3 {
        0 if prec => F32_TEST_OPS[index],
        0 => F16_TEST_OPS[index],
        1 => INT_TEST_OPS[index],
        2 => BYTE_TEST_OPS[index],
        _ => BITWISE_TEST_OPS[index],
    };
    let op = op.ok_or_else(|| format!("unsupported comparison {} {}", alu_sel, alu_op))?;

    let dtype = match alu_sel & 0x3 {
        0 if prec => DataType::F32,
        0 => DataType::F16,
        2 => DataType::Uint8,
        3 => DataType::Uint32,
        _ => match op {
            Iaddu32 | Isubu32 => DataType::Uint32,
            Iadd32 | Isub32 => DataType::Int32,
            Iadd16 | Isub16 | Imul16 => DataType::Int16,
            _ => DataType::Uint16,
        },
    };
    Ok((op, dtype))
}

fn decode_condition(zero: u8, sign: u8) -> Result<(ZeroTest, SignTest), String> {
    let zero = ZeroTest::from_bits(zero).ok_or_else(|| format!("invalid zero test {}", zero))?;
    let sign = SignTest::from_bits(sign).ok_or_else(|| format!("invalid sign test {}", sign))?;
    Ok((zero, sign))
}

/// Channel tested by VTST, one bit per `chan_cc`
const CHANNEL_MASKS: [u8; 4] = [0b0001, 0b0010, 0b0100, 0b1000];

pub fn vtst(ctx: &mut DecodeContext, f: &Fields) -> Result<Instruction, String> {
    let alu_sel = f.u8('l');
    let (alu_op, dtype) = decode_test_op(alu_sel, f.u8('u'), f.bit('a'))?;
    let (zero, sign) = decode_condition(f.u8('z'), f.u8('i'))?;

    let chan_cc = f.u8('h') as usize;
    let load_mask = *CHANNEL_MASKS
        .get(chan_cc)
        .ok_or_else(|| format!("unsupported test channel {}", chan_cc))?;

    let double_regs = alu_sel == 0;
    let reg_bits = if double_regs { 8 } else { 7 };

    let mut inst = ctx.instruction(Opcode::Vtst);
    inst.predicate = ExtPredicate::from(f.u8('p'));
    inst.src1 = decode_src12(f.u32('j'), f.u8('k'), f.bit('c'), double_regs, reg_bits, ctx.secondary);
    inst.src2 = decode_src12(f.u32('q'), f.u8('f'), f.bit('e'), double_regs, reg_bits, ctx.secondary);
    inst.src1.dtype = dtype;
    inst.src2.dtype = dtype;
    if f.bit('v') && double_regs {
        inst.src2.swizzle = [SwizzleChannel::X; 4];
    }
    inst.src1.flags.set(OperandFlags::NEGATIVE, f.bit('r'));

    inst.dest = Operand {
        bank: RegisterBank::Predicate,
        num: f.u32('n'),
        ..Default::default()
    };
    inst.dest_mask = 0b0001;
    inst.src_masks = [0, load_mask, load_mask];
    inst.detail = Detail::Test { alu_op, zero, sign };

    let multiplier = if double_regs { [2; 4] } else { [1; 4] };
    ctx.apply_repeat(&mut inst, repeat_count(f.u8('t')), RepeatMode::Slmsi, multiplier);
    Ok(inst)
}

pub fn vtstmsk(ctx: &mut DecodeContext, f: &Fields) -> Result<Instruction, String> {
    let alu_sel = f.u8('l');
    let (alu_op, dtype) = decode_test_op(alu_sel, f.u8('g'), f.bit('e'))?;
    let (zero, sign) = decode_condition(f.u8('z'), f.u8('i'))?;

    let store_type = match f.u8('a') {
        0 => DataType::Uint8,
        1 => DataType::F16,
        2 => DataType::F32,
        other => return Err(format!("invalid test mask type {}", other)),
    };
    if !f.bit('w') {
        return Err("test mask without write-back".into());
    }

    let double_regs = alu_sel == 0;

    let mut inst = ctx.instruction(Opcode::Vtstmsk);
    inst.predicate = ExtPredicate::from(f.u8('p'));
    inst.src1 = decode_src12(f.u32('h'), f.u8('n'), f.bit('r'), double_regs, 8, ctx.secondary);
    inst.src2 = decode_src12(f.u32('j'), f.u8('k'), f.bit('c'), double_regs, 8, ctx.secondary);
    inst.dest = decode_dest(f.u32('f'), f.u8('b'), f.bit('d'), double_regs, 8, ctx.secondary);
    inst.src1.dtype = dtype;
    inst.src2.dtype = dtype;
    inst.dest.dtype = store_type;
    if f.bit('v') {
        inst.src2.swizzle = [SwizzleChannel::X; 4];
    }
    inst.src1.flags.set(OperandFlags::NEGATIVE, f.bit('t'));

    inst.dest_mask = 0b1111;
    inst.src_masks = [0, 0b1111, 0b1111];
    inst.detail = Detail::Test { alu_op, zero, sign };

    let multiplier = if double_regs { [2; 4] } else { [1; 4] };
    ctx.apply_repeat(&mut inst, repeat_count(f.u8('u')), RepeatMode::Slmsi, multiplier);
    Ok(inst)
}

#[cfg(test)]
mod tests {
    use super::super::tests::{assemble, pattern};
    use super::super::decode_instruction;
    use super::*;

    #[test]
    fn test_op_tables() {
        assert_eq!(decode_test_op(0, 14, true), Ok((Vsub, DataType::F32)));
        assert_eq!(decode_test_op(0, 2, false), Ok((Vf16Add, DataType::F16)));
        assert_eq!(decode_test_op(1, 12, false), Ok((Iadd32, DataType::Int32)));
        assert_eq!(decode_test_op(1, 9, false), Ok((Iaddu16, DataType::Uint16)));
        assert_eq!(decode_test_op(2, 5, false), Ok((Fpmul8, DataType::Uint8)));
        assert_eq!(decode_test_op(3, 7, false), Ok((Asr, DataType::Uint32)));
        assert!(decode_test_op(3, 6, false).is_err());
        assert!(decode_test_op(0, 0, true).is_err());
    }

    #[test]
    fn test_vtst_writes_predicate() {
        let word = assemble(
            pattern("VTST"),
            &[('a', 1), ('u', 14), ('z', 1), ('i', 1), ('h', 2), ('n', 3)],
        );
        let mut ctx = DecodeContext::new(false);
        let inst = decode_instruction(&mut ctx, word);
        assert_eq!(inst.opcode, Opcode::Vtst);
        assert_eq!(inst.dest.bank, RegisterBank::Predicate);
        assert_eq!(inst.dest.num, 3);
        assert_eq!(inst.src_masks[1], 0b0100);
        assert_eq!(
            inst.detail,
            Detail::Test { alu_op: Vsub, zero: ZeroTest::Zero, sign: SignTest::LessThan }
        );
    }

    #[test]
    fn test_vtst_rejects_bad_channel() {
        let word = assemble(pattern("VTST"), &[('a', 1), ('u', 2), ('h', 5)]);
        let mut ctx = DecodeContext::new(false);
        assert!(decode_instruction(&mut ctx, word).is_skipped());
    }

    #[test]
    fn test_vtstmsk_store_type() {
        let word = assemble(pattern("VTSTMSK"), &[('e', 1), ('g', 2), ('a', 0), ('w', 1)]);
        let mut ctx = DecodeContext::new(false);
        let inst = decode_instruction(&mut ctx, word);
        assert_eq!(inst.opcode, Opcode::Vtstmsk);
        assert_eq!(inst.dest.dtype, DataType::Uint8);

        let bad = assemble(pattern("VTSTMSK"), &[('e', 1), ('g', 2), ('a', 3), ('w', 1)]);
        assert!(decode_instruction(&mut ctx, bad).is_skipped());
    }
}
