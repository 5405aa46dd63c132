//! Vector float family decoders: moves, MADs, dot products, two-source
//! vector ops, complex ops and pack conversions

use super::helpers::*;
use super::matcher::Fields;
use super::{repeat_count, DecodeContext};
use crate::types::SwizzleChannel::{W, X, Y, Z};
use crate::types::*;

/// Repeat multiplier of operands in register pairs
const DOUBLE_MULTIPLIER: [i32; 4] = [2; 4];

fn multiplier_for(dtype: DataType) -> [i32; 4] {
    if matches!(dtype, DataType::F16 | DataType::F32) {
        DOUBLE_MULTIPLIER
    } else {
        [1; 4]
    }
}

fn set_types(inst: &mut Instruction, dtype: DataType) {
    inst.dest.dtype = dtype;
    inst.src0.dtype = dtype;
    inst.src1.dtype = dtype;
    inst.src2.dtype = dtype;
}

//=============================================================================
// MOVES
//=============================================================================

pub fn vmov(ctx: &mut DecodeContext, f: &Fields) -> Result<Instruction, String> {
    let opcode = match f.u8('m') {
        0 => Opcode::Vmov,
        1 => Opcode::Vmovc,
        2 => Opcode::Vmovcu8,
        other => return Err(format!("invalid move type {}", other)),
    };

    let dtype = DataType::from(f.u8('o'));
    let double_regs = matches!(dtype, DataType::C10 | DataType::F16 | DataType::F32);
    let reg_bits = if double_regs { 7 } else { 6 };

    let mut inst = ctx.instruction(opcode);
    inst.predicate = ExtPredicate::from(f.u8('p'));
    inst.dest = decode_dest(f.u32('j'), f.u8('l'), f.bit('d'), double_regs, reg_bits, ctx.secondary);
    inst.src1 = decode_src12(f.u32('u'), f.u8('f'), f.bit('c'), double_regs, reg_bits, ctx.secondary);
    inst.src1.swizzle = decode_vec34_swizzle(f.u8('w'), false, SwizzleKind::Vec4);
    inst.src1.dtype = dtype;
    inst.dest.dtype = dtype;
    inst.dest_mask = decode_move_mask(f.u8('h'), dtype == DataType::F16);

    if opcode != Opcode::Vmov {
        let compare = CompareMethod::from((f.u8('t') << 1) | f.u8('i'));
        inst.src0 = decode_src0(f.u32('q'), f.u8('k'), f.bit('e'), double_regs, reg_bits, ctx.secondary);
        inst.src2 = decode_src12(f.u32('v'), f.u8('g'), f.bit('b'), double_regs, reg_bits, ctx.secondary);
        inst.src0.dtype = if opcode == Opcode::Vmovcu8 { DataType::Uint8 } else { dtype };
        inst.src2.dtype = dtype;
        if f.bit('r') {
            inst.src0.swizzle = inst.src1.swizzle;
        }
        inst.src2.swizzle = inst.src1.swizzle;
        inst.detail = Detail::ConditionalMove { compare };
    }

    inst.src_masks = [inst.dest_mask; 3];
    ctx.apply_repeat(&mut inst, repeat_count(f.u8('a')), RepeatMode::Slmsi, multiplier_for(dtype));
    Ok(inst)
}

//=============================================================================
// MULTIPLY-ADD AND DOT PRODUCT
//=============================================================================

pub fn vmad(ctx: &mut DecodeContext, f: &Fields) -> Result<Instruction, String> {
    let kind = if f.bit('o') { SwizzleKind::Vec4 } else { SwizzleKind::Vec3 };

    let mut inst = ctx.instruction(Opcode::Vmad);
    inst.predicate = ExtPredicate::from(f.u8('p'));
    inst.dest = decode_dest(f.u32('m'), f.u8('k'), f.bit('d'), true, 7, ctx.secondary);
    inst.src1 = decode_src12(f.u32('B'), f.u8('j'), f.bit('r'), true, 7, ctx.secondary);
    inst.src0 = decode_gpi(f.u32('l'));
    inst.src2 = decode_gpi(f.u32('v'));
    set_types(&mut inst, DataType::F32);

    inst.src1.swizzle = decode_vec34_swizzle(f.u8('A'), f.bit('y'), kind);
    inst.src0.swizzle = decode_vec34_swizzle(f.u8('q'), f.bit('z'), kind);
    inst.src2.swizzle = decode_vec34_swizzle(f.u8('u'), f.bit('g'), kind);

    inst.src1.flags.set(OperandFlags::ABSOLUTE, f.bit('b'));
    inst.src1.flags.set(OperandFlags::NEGATIVE, f.bit('c'));
    inst.src0.flags.set(OperandFlags::ABSOLUTE, f.bit('a'));
    inst.src0.flags.set(OperandFlags::NEGATIVE, f.bit('x'));
    inst.src2.flags.set(OperandFlags::ABSOLUTE, f.bit('h'));
    inst.src2.flags.set(OperandFlags::NEGATIVE, f.bit('f'));

    inst.dest_mask = f.u8('w') & 0xF;
    inst.src_masks = [inst.dest_mask; 3];
    ctx.apply_repeat(&mut inst, repeat_count(f.u8('t')), RepeatMode::from(f.u8('i')), DOUBLE_MULTIPLIER);
    Ok(inst)
}

const VMAD2_SRC0_SWIZZLES: [Swizzle4; 8] = [
    [X, X, X, X],
    [Y, Y, Y, Y],
    [Z, Z, Z, Z],
    [W, W, W, W],
    [X, Y, Z, W],
    [Y, Z, X, W],
    [X, Y, W, W],
    [Z, W, X, Y],
];

const VMAD2_SRC1_SWIZZLES: [Swizzle4; 8] = [
    [X, X, X, X],
    [Y, Y, Y, Y],
    [Z, Z, Z, Z],
    [W, W, W, W],
    [X, Y, Z, W],
    [X, Y, Y, Z],
    [Y, Y, W, W],
    [W, Y, Z, W],
];

const VMAD2_SRC2_SWIZZLES: [Swizzle4; 8] = [
    [X, X, X, X],
    [Y, Y, Y, Y],
    [Z, Z, Z, Z],
    [W, W, W, W],
    [X, Y, Z, W],
    [X, Z, W, W],
    [X, X, Y, Z],
    [X, Y, Z, Z],
];

pub fn vmad2(ctx: &mut DecodeContext, f: &Fields) -> Result<Instruction, String> {
    let f16 = f.bit('d');
    let dtype = if f16 { DataType::F16 } else { DataType::F32 };
    let opcode = if f16 { Opcode::Vf16Mad } else { Opcode::Vmad };

    let mut inst = ctx.instruction(opcode);
    inst.predicate = ShortPredicate::from(f.u8('p')).into();
    inst.dest = decode_dest(f.u32('h'), f.u8('t'), false, true, 7, ctx.secondary);
    inst.src0 = decode_src0(f.u32('l'), f.u8('k'), false, true, 7, ctx.secondary);
    inst.src1 = decode_src12(f.u32('q'), f.u8('f'), f.bit('b'), true, 7, ctx.secondary);
    inst.src2 = decode_src12(f.u32('u'), f.u8('g'), f.bit('a'), true, 7, ctx.secondary);
    set_types(&mut inst, dtype);

    let src0_swiz = (f.u8('j') | (f.u8('r') << 2)) as usize;
    let src1_swiz = (f.u8('z') | (f.u8('i') << 2)) as usize;
    inst.src0.swizzle = VMAD2_SRC0_SWIZZLES[src0_swiz & 7];
    inst.src1.swizzle = VMAD2_SRC1_SWIZZLES[src1_swiz & 7];
    inst.src2.swizzle = VMAD2_SRC2_SWIZZLES[f.u8('w') as usize & 7];

    inst.src0.flags.set(OperandFlags::ABSOLUTE, f.bit('c'));
    inst.src1.flags = decode_modifier(f.u8('m'));
    inst.src2.flags = decode_modifier(f.u8('o'));

    inst.dest_mask = decode_write_mask(inst.dest.bank, f.u8('e'), f16);
    inst.src_masks = [inst.dest_mask; 3];
    Ok(inst)
}

pub fn vdp(ctx: &mut DecodeContext, f: &Fields) -> Result<Instruction, String> {
    let vec4 = f.bit('o');
    let kind = if vec4 { SwizzleKind::Vec4 } else { SwizzleKind::Vec3 };
    let src_mask = if vec4 { 0b1111 } else { 0b0111 };

    let mut inst = ctx.instruction(Opcode::Vdp);
    inst.predicate = ExtPredicate::from(f.u8('p'));
    inst.dest = decode_dest(f.u32('j'), f.u8('t'), f.bit('d'), true, 7, ctx.secondary);
    inst.src1 = decode_src12(f.u32('u'), f.u8('k'), f.bit('r'), true, 7, ctx.secondary);
    inst.src2 = decode_gpi(f.u32('h'));
    inst.src2.swizzle = decode_vec34_swizzle(f.u8('z'), false, kind);
    set_types(&mut inst, DataType::F32);

    inst.src1.swizzle = [
        SwizzleChannel::from(f.u8('x')),
        SwizzleChannel::from(f.u8('y')),
        SwizzleChannel::from(f.u8('q')),
        SwizzleChannel::from(f.u8('m')),
    ];
    inst.src1.flags.set(OperandFlags::NEGATIVE, f.bit('b'));
    inst.src1.flags.set(OperandFlags::ABSOLUTE, f.bit('f'));
    inst.src2.flags.set(OperandFlags::ABSOLUTE, f.bit('g'));

    inst.dest_mask = f.u8('w') & 0xF;
    inst.src_masks = [0, src_mask, src_mask];
    inst.detail = Detail::Dot { rotate_mask: true };
    ctx.apply_repeat(&mut inst, repeat_count(f.u8('a')), RepeatMode::from(f.u8('i')), DOUBLE_MULTIPLIER);
    Ok(inst)
}

//=============================================================================
// TWO-SOURCE VECTOR OPS
//=============================================================================

const VNMAD_F32_OPS: [Opcode; 8] = [
    Opcode::Vmul,
    Opcode::Vadd,
    Opcode::Vfrc,
    Opcode::Vdsx,
    Opcode::Vdsy,
    Opcode::Vmin,
    Opcode::Vmax,
    Opcode::Vdp,
];

const VNMAD_F16_OPS: [Opcode; 8] = [
    Opcode::Vf16Mul,
    Opcode::Vf16Add,
    Opcode::Vf16Frc,
    Opcode::Vf16Dsx,
    Opcode::Vf16Dsy,
    Opcode::Vf16Min,
    Opcode::Vf16Max,
    Opcode::Vf16Dp,
];

/// Bit of the word selecting the 32-bit variant of the vector op family
const VNMAD_F32_BIT: u64 = 1 << 59;

pub fn vnmad(ctx: &mut DecodeContext, f: &Fields) -> Result<Instruction, String> {
    let is_f32 = ctx.word & VNMAD_F32_BIT != 0;
    let op = f.u8('g') as usize & 7;
    let opcode = if is_f32 { VNMAD_F32_OPS[op] } else { VNMAD_F16_OPS[op] };
    let dtype = if is_f32 { DataType::F32 } else { DataType::F16 };

    let mut inst = ctx.instruction(opcode);
    inst.predicate = ExtPredicate::from(f.u8('p'));
    inst.dest = decode_dest(f.u32('f'), f.u8('t'), f.bit('d'), true, 7, ctx.secondary);
    inst.src1 = decode_src12(f.u32('h'), f.u8('k'), f.bit('b'), true, 7, ctx.secondary);
    inst.src2 = decode_src12(f.u32('j'), f.u8('l'), f.bit('a'), true, 7, ctx.secondary);
    inst.dest.dtype = dtype;
    inst.src1.dtype = dtype;
    inst.src2.dtype = dtype;

    inst.src1.flags = decode_modifier(f.u8('m'));
    if f.u8('o') == 1 {
        inst.src2.flags = OperandFlags::ABSOLUTE;
    }

    let src1_swizzle = f.u32('z') | (f.u32('i') << 7) | (f.u32('c') << 9) | (f.u32('r') << 10);
    inst.src1.swizzle = decode_swizzle4(src1_swizzle);
    inst.src2.swizzle = decode_vec34_swizzle(f.u8('w'), false, SwizzleKind::Vec4);

    inst.dest_mask = f.u8('e') & 0xF;
    let dot = matches!(opcode, Opcode::Vdp | Opcode::Vf16Dp);
    let src_mask = if dot { 0b1111 } else { inst.dest_mask };
    inst.src_masks = [0, src_mask, src_mask];
    if dot {
        inst.detail = Detail::Dot { rotate_mask: false };
    }
    Ok(inst)
}

//=============================================================================
// COMPLEX OPS
//=============================================================================

const VCOMP_OPS: [Opcode; 4] = [Opcode::Vrcp, Opcode::Vrsq, Opcode::Vlog, Opcode::Vexp];
const VCOMP_TYPES: [DataType; 4] = [DataType::F32, DataType::F16, DataType::C10, DataType::Unk];

pub fn vcomp(ctx: &mut DecodeContext, f: &Fields) -> Result<Instruction, String> {
    let src_type = VCOMP_TYPES[f.u8('c') as usize & 3];
    let dest_type = VCOMP_TYPES[f.u8('d') as usize & 3];
    if src_type == DataType::Unk || dest_type == DataType::Unk {
        return Err("unknown complex op data type".into());
    }

    let mut inst = ctx.instruction(VCOMP_OPS[f.u8('b') as usize & 3]);
    inst.predicate = ExtPredicate::from(f.u8('p'));
    inst.dest = decode_dest(f.u32('g'), f.u8('t'), f.bit('e'), true, 8, ctx.secondary);
    inst.src1 = decode_src12(f.u32('h'), f.u8('k'), f.bit('r'), true, 8, ctx.secondary);
    inst.src1.flags = decode_modifier(f.u8('m'));
    inst.src1.dtype = src_type;
    inst.dest.dtype = dest_type;

    inst.dest_mask = f.u8('w') & 0xF;
    inst.src_masks = [0, 1 << (f.u8('f') & 3), 0];
    ctx.apply_repeat(&mut inst, repeat_count(f.u8('a')), RepeatMode::Slmsi, multiplier_for(src_type));
    Ok(inst)
}

//=============================================================================
// PACK / UNPACK
//=============================================================================

const PACK_TYPES: [DataType; 8] = [
    DataType::Uint8,
    DataType::Int8,
    DataType::O8,
    DataType::Uint16,
    DataType::Int16,
    DataType::F16,
    DataType::F32,
    DataType::C10,
];

pub fn vpck(ctx: &mut DecodeContext, f: &Fields) -> Result<Instruction, String> {
    let src_format = PACK_TYPES[f.u8('f') as usize & 7];
    let dest_format = PACK_TYPES[f.u8('t') as usize & 7];

    // C10 only converts from and to float formats
    if (dest_format == DataType::C10 && !src_format.is_float())
        || (src_format == DataType::C10 && !dest_format.is_float())
    {
        return Err(format!(
            "invalid conversion {} -> {}",
            src_format.suffix(),
            dest_format.suffix()
        ));
    }

    let mut inst = ctx.instruction(Opcode::Vpck);
    inst.predicate = ExtPredicate::from(f.u8('p'));
    inst.dest = decode_dest(f.u32('g'), f.u8('b'), f.bit('d'), false, 7, ctx.secondary);
    inst.dest.dtype = dest_format;

    let src_float = src_format.is_float();
    let src1_num = if src_float {
        f.u32('q')
    } else {
        // Integer sources address single registers, the low bit is borrowed
        f.u32('v') | (f.u32('q') << 1)
    };
    inst.src1 = decode_src12(src1_num, f.u8('k'), f.bit('r'), src_float, 7, ctx.secondary);
    inst.src1.dtype = src_format;

    let comp0 = if src_format == DataType::F32 {
        f.u8('x') | ((f.u8('v') & 1) << 1)
    } else {
        f.u8('x') | ((f.u8('w') & 1) << 1)
    };
    inst.src1.swizzle = [
        SwizzleChannel::from(comp0),
        SwizzleChannel::from(f.u8('i')),
        SwizzleChannel::from(f.u8('j')),
        SwizzleChannel::from(f.u8('o')),
    ];

    let dest_mask = f.u8('m') & 0xF;
    let split = src_format == DataType::F32 && mask_component_count(dest_mask) > 1;
    if src_format == DataType::F32 {
        inst.src2 = decode_src12(f.u32('w'), f.u8('l'), f.bit('c'), true, 7, ctx.secondary);
        inst.src2.dtype = src_format;
        inst.src2.swizzle = inst.src1.swizzle;
    }

    inst.dest_mask = dest_mask;
    inst.src_masks = [0, dest_mask, if split { dest_mask } else { 0 }];
    inst.detail = Detail::Pack {
        src_format,
        dest_format,
        scale: f.bit('h'),
        split,
    };
    ctx.apply_repeat(&mut inst, repeat_count(f.u8('a')), RepeatMode::Slmsi, multiplier_for(src_format));
    Ok(inst)
}
