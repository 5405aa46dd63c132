//! Texture sample decoder (SMP)

use super::helpers::*;
use super::matcher::Fields;
use super::DecodeContext;
use crate::types::*;

/// Destination format selected by the `fconv` field
const SAMPLE_DEST_TYPES: [Option<DataType>; 4] = [
    Some(DataType::F32),
    None,
    Some(DataType::F16),
    Some(DataType::F32),
];

pub fn smp(ctx: &mut DecodeContext, f: &Fields) -> Result<Instruction, String> {
    let dim = f.u8('d') + 1;
    if dim > 3 {
        return Err(format!("unsupported sample dimension {}", dim));
    }

    let lod_mode = f.u8('l');
    if lod_mode == 1 {
        return Err("LOD bias sampling is not supported".into());
    }

    let sb_mode = f.u8('b');
    if sb_mode == 2 {
        return Err(format!("unsupported sample buffer mode {}", sb_mode));
    }

    let dest_type = SAMPLE_DEST_TYPES[f.u8('f') as usize & 0x3]
        .ok_or_else(|| "unknown sample conversion type".to_string())?;

    let mut inst = ctx.instruction(Opcode::Smp);
    inst.predicate = ExtPredicate::from(f.u8('p'));

    inst.dest = Operand {
        bank: if f.bit('t') { RegisterBank::PrimAttr } else { RegisterBank::Temp },
        num: f.u32('o'),
        dtype: dest_type,
        ..Default::default()
    };

    inst.src0 = decode_src0(f.u32('q'), f.u8('k'), f.bit('r'), true, 7, ctx.secondary);
    inst.src0.dtype = match f.u8('g') {
        0 => DataType::F32,
        1 => DataType::F16,
        _ => DataType::C10,
    };
    inst.src0.swizzle = SWIZZLE_XYZW;

    // src1 addresses the sampler by its resource index
    inst.src1 = decode_src12(f.u32('u'), f.u8('i'), f.bit('c'), true, 7, ctx.secondary);
    inst.src1.swizzle = SWIZZLE_XYZW;

    if lod_mode != 0 {
        inst.src2 = decode_src12(f.u32('v'), f.u8('j'), f.bit('e'), true, 7, ctx.secondary);
        inst.src2.dtype = inst.src0.dtype;
        inst.src2.swizzle = SWIZZLE_XYZW;
    }

    let coord_mask = match dim {
        1 => 0b0001,
        2 => 0b0011,
        _ => 0b0111,
    };
    inst.dest_mask = 0b1111;
    inst.src_masks = [coord_mask, 0, if lod_mode == 2 { 0b0001 } else { coord_mask }];
    inst.detail = Detail::Sample { dim, lod_mode, sb_mode };
    Ok(inst)
}
