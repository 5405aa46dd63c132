//! Integer family decoders: bitwise ops and the 8/16/32-bit multiply-adds

use super::helpers::*;
use super::matcher::Fields;
use super::{repeat_count, DecodeContext};
use crate::types::*;

/// Integer operands address single registers
const SINGLE_MULTIPLIER: [i32; 4] = [1; 4];

fn decode_int_operands(ctx: &DecodeContext, inst: &mut Instruction, f: &Fields) {
    inst.dest = decode_dest(f.u32('q'), f.u8('D'), f.bit('d'), false, 7, ctx.secondary);
    inst.src0 = decode_src0(f.u32('u'), f.u8('k'), false, false, 7, ctx.secondary);
}

//=============================================================================
// BITWISE
//=============================================================================

pub fn vbw(ctx: &mut DecodeContext, f: &Fields) -> Result<Instruction, String> {
    let op2 = f.bit('a');
    let opcode = match f.u8('o') {
        0b010 if op2 => Opcode::Or,
        0b010 => Opcode::And,
        0b011 => Opcode::Xor,
        0b100 if op2 => Opcode::Rol,
        0b100 => Opcode::Shl,
        0b101 if op2 => Opcode::Asr,
        0b101 => Opcode::Shr,
        other => return Err(format!("unknown bitwise op {:#05b}", other)),
    };

    let mut inst = ctx.instruction(opcode);
    inst.predicate = ExtPredicate::from(f.u8('p'));
    inst.dest = decode_dest(f.u32('j'), f.u8('k'), f.bit('d'), false, 7, ctx.secondary);
    inst.src1 = decode_src12(f.u32('q'), f.u8('f'), f.bit('c'), false, 7, ctx.secondary);
    inst.src2 = decode_src12(f.u32('u'), f.u8('g'), f.bit('x'), false, 7, ctx.secondary);
    inst.dest.dtype = DataType::Uint32;
    inst.src1.dtype = DataType::Uint32;
    inst.src2.dtype = DataType::Uint32;

    let immediate = (f.bit('x') && inst.src2.bank == RegisterBank::Immediate).then(|| {
        let value = f.u32('u') | (f.u32('l') << 7) | (f.u32('h') << 14);
        if f.bit('i') {
            !value
        } else {
            value
        }
    });

    inst.dest_mask = 0b0001;
    inst.src_masks = [0, 0b0001, 0b0001];
    inst.detail = Detail::Bitwise {
        immediate,
        rotate: f.u8('t'),
    };
    ctx.apply_repeat(&mut inst, repeat_count(f.u8('m')), RepeatMode::Slmsi, SINGLE_MULTIPLIER);
    Ok(inst)
}

//=============================================================================
// INTEGER MULTIPLY-ADD
//=============================================================================

pub fn i8mad(ctx: &mut DecodeContext, f: &Fields) -> Result<Instruction, String> {
    let mut inst = ctx.instruction(Opcode::Ima8);
    inst.predicate = ShortPredicate::from(f.u8('p')).into();
    decode_int_operands(ctx, &mut inst, f);
    inst.src1 = decode_src12(f.u32('v'), f.u8('F'), f.bit('r'), false, 7, ctx.secondary);
    inst.src2 = decode_src12(f.u32('w'), f.u8('G'), f.bit('b'), false, 7, ctx.secondary);
    inst.dest.dtype = DataType::Uint8;
    inst.src0.dtype = DataType::Uint8;
    inst.src1.dtype = DataType::Uint8;
    inst.src2.dtype = DataType::Uint8;

    // Colour selectors replace RGB with the alpha channel
    let alpha = [SwizzleChannel::W, SwizzleChannel::W, SwizzleChannel::W, SwizzleChannel::W];
    if f.bit('x') {
        inst.src1.swizzle = alpha;
    }
    if f.bit('y') {
        inst.src2.swizzle = alpha;
    }

    let modifiers = ['C', 'c', 'm', 'O', 'N', 'M'];
    if modifiers.iter().any(|&c| f.bit(c)) {
        return Err("per-component modifiers are not supported".into());
    }

    inst.dest_mask = 0b1111;
    inst.src_masks = [0b1111; 3];
    inst.detail = Detail::ByteMad {
        csel0: f.u8('a'),
        asel0: f.bit('A'),
        negate_add: f.bit('g'),
    };
    ctx.apply_repeat(&mut inst, repeat_count(f.u8('o')), RepeatMode::Slmsi, SINGLE_MULTIPLIER);
    Ok(inst)
}

pub fn i16mad(ctx: &mut DecodeContext, f: &Fields) -> Result<Instruction, String> {
    let mode = f.u8('m');
    let signed = mode >= 2;
    let dtype = if signed { DataType::Int16 } else { DataType::Uint16 };
    let byte_type = if signed { DataType::Int8 } else { DataType::Uint8 };

    let mut inst = ctx.instruction(Opcode::Ima16);
    inst.predicate = ShortPredicate::from(f.u8('p')).into();
    decode_int_operands(ctx, &mut inst, f);
    inst.src1 = decode_src12(f.u32('v'), f.u8('S'), f.bit('r'), false, 7, ctx.secondary);
    inst.src2 = decode_src12(f.u32('w'), f.u8('T'), f.bit('b'), false, 7, ctx.secondary);
    inst.dest.dtype = dtype;
    inst.src0.dtype = dtype;
    inst.src1.dtype = dtype;
    inst.src2.dtype = dtype;

    let mut src1_mask = 0b01;
    let mut src2_mask = 0b01;
    match f.u8('f') {
        0 => {}
        1 => {
            inst.src1.dtype = byte_type;
            if f.bit('h') {
                src1_mask = 0b10;
            }
        }
        other => return Err(format!("unsupported src1 format {}", other)),
    }
    match f.u8('t') {
        0 => {}
        1 => {
            inst.src2.dtype = byte_type;
            if f.bit('H') {
                src2_mask = 0b10;
            }
        }
        other => return Err(format!("unsupported src2 format {}", other)),
    }

    inst.src0.flags.set(OperandFlags::ABSOLUTE, f.bit('a'));

    inst.dest_mask = 0b0011;
    inst.src_masks = [0b0011, src1_mask, src2_mask];
    inst.detail = Detail::ShortMad { negate_add: f.bit('g') };
    ctx.apply_repeat(&mut inst, repeat_count(f.u8('o')), RepeatMode::Slmsi, SINGLE_MULTIPLIER);
    Ok(inst)
}

pub fn i32mad(ctx: &mut DecodeContext, f: &Fields) -> Result<Instruction, String> {
    let signed = f.bit('g');
    let wide = if signed { DataType::Int32 } else { DataType::Uint32 };
    let narrow = if signed { DataType::Int16 } else { DataType::Uint16 };
    let src2_wide = f.u8('y') == 2;

    let mut inst = ctx.instruction(Opcode::Imad);
    inst.predicate = ShortPredicate::from(f.u8('p')).into();
    decode_int_operands(ctx, &mut inst, f);
    inst.src1 = decode_src12(f.u32('v'), f.u8('S'), f.bit('r'), false, 7, ctx.secondary);
    inst.src2 = decode_src12(f.u32('w'), f.u8('T'), f.bit('b'), false, 7, ctx.secondary);
    inst.dest.dtype = wide;
    inst.src0.dtype = narrow;
    inst.src1.dtype = narrow;
    inst.src2.dtype = if src2_wide { wide } else { narrow };

    let half = |high: bool| if high { 0b10 } else { 0b01 };
    inst.dest_mask = 0b0001;
    inst.src_masks = [
        half(f.bit('h')),
        half(f.bit('i')),
        if src2_wide { 0b01 } else { half(f.bit('j')) },
    ];
    ctx.apply_repeat(&mut inst, repeat_count(f.u8('o')), RepeatMode::Slmsi, SINGLE_MULTIPLIER);
    Ok(inst)
}

#[cfg(test)]
mod tests {
    use super::super::decode_instruction;
    use super::super::tests::{assemble, pattern};
    use super::*;

    fn decode(name: &str, fields: &[(char, u64)]) -> Instruction {
        let mut ctx = DecodeContext::new(false);
        decode_instruction(&mut ctx, assemble(pattern(name), fields))
    }

    #[test]
    fn test_vbw_immediate() {
        let inst = decode(
            "VBW",
            &[('o', 0b010), ('a', 1), ('x', 1), ('g', 2), ('u', 0x05), ('l', 1), ('h', 0)],
        );
        assert_eq!(inst.opcode, Opcode::Or);
        assert_eq!(inst.src2.bank, RegisterBank::Immediate);
        assert_eq!(inst.detail, Detail::Bitwise { immediate: Some(0x85), rotate: 0 });
    }

    #[test]
    fn test_vbw_inverted_immediate() {
        let inst = decode("VBW", &[('o', 0b010), ('x', 1), ('g', 2), ('i', 1)]);
        assert_eq!(inst.opcode, Opcode::And);
        assert_eq!(inst.detail, Detail::Bitwise { immediate: Some(u32::MAX), rotate: 0 });
    }

    #[test]
    fn test_vbw_register_source() {
        let inst = decode("VBW", &[('o', 0b101), ('a', 1), ('u', 3)]);
        assert_eq!(inst.opcode, Opcode::Asr);
        assert_eq!(inst.src2.bank, RegisterBank::Temp);
        assert_eq!(inst.detail, Detail::Bitwise { immediate: None, rotate: 0 });
    }

    #[test]
    fn test_i16mad_byte_sources() {
        let inst = decode("I16MAD", &[('m', 2), ('f', 1), ('h', 1)]);
        assert_eq!(inst.opcode, Opcode::Ima16);
        assert_eq!(inst.dest.dtype, DataType::Int16);
        assert_eq!(inst.src1.dtype, DataType::Int8);
        assert_eq!(inst.src_masks, [0b0011, 0b10, 0b01]);
    }

    #[test]
    fn test_i32mad_types() {
        let inst = decode("I32MAD", &[('g', 0), ('y', 2), ('h', 1)]);
        assert_eq!(inst.opcode, Opcode::Imad);
        assert_eq!(inst.dest.dtype, DataType::Uint32);
        assert_eq!(inst.src0.dtype, DataType::Uint16);
        assert_eq!(inst.src2.dtype, DataType::Uint32);
        assert_eq!(inst.src_masks[0], 0b10);
    }

    #[test]
    fn test_i8mad_alpha_select() {
        let inst = decode("I8MAD", &[('x', 1), ('a', 2), ('A', 1)]);
        assert_eq!(inst.opcode, Opcode::Ima8);
        assert_eq!(inst.src1.swizzle, [SwizzleChannel::W; 4]);
        assert_eq!(inst.detail, Detail::ByteMad { csel0: 2, asel0: true, negate_add: false });
    }
}
