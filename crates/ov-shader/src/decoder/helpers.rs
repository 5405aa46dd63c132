//! Operand, swizzle and mask decoding tables

use crate::types::*;
use ov_core::shader_warn;

use crate::types::SwizzleChannel::{Half as H, One as C1, Two as C2, Undefined as U, W, X, Y, Z, Zero as C0};

//=============================================================================
// REGISTER DECODING
//=============================================================================

/// Flag selecting the global bank out of a special register number
const SPECIAL_GLOBAL_FLAG: u32 = 0x40;

/// Move the top temporaries onto the fp-internal bank they alias
fn check_reg_internal(op: &mut Operand, double_regs: bool, reg_bits: u8) {
    let temps = if double_regs { 8 } else { 4 };
    let limit = (1u32 << reg_bits).saturating_sub(temps);

    if op.bank == RegisterBank::Temp && op.num >= limit {
        op.num -= limit;
        if double_regs {
            op.num >>= 1;
        }
        op.bank = RegisterBank::FpInternal;
    }
}

fn fixup_reg_special(op: &mut Operand) {
    if op.num & SPECIAL_GLOBAL_FLAG != 0 {
        op.num &= !SPECIAL_GLOBAL_FLAG;
        op.bank = RegisterBank::Global;
    } else {
        op.bank = RegisterBank::FpConstant;
    }
}

fn double_reg(num: u32, bank: RegisterBank) -> u32 {
    if bank != RegisterBank::Special && bank != RegisterBank::Immediate {
        (num << 1) & 0xFF
    } else {
        num
    }
}

fn finalize_register(op: &mut Operand, double_regs: bool, reg_bits: u8, secondary: bool) {
    check_reg_internal(op, double_regs, reg_bits);

    if op.bank == RegisterBank::Special {
        fixup_reg_special(op);
    }

    // The secondary program computes into secondary attributes
    if secondary
        && !matches!(
            op.bank,
            RegisterBank::FpInternal
                | RegisterBank::FpConstant
                | RegisterBank::Immediate
                | RegisterBank::Invalid
        )
    {
        op.bank = RegisterBank::SecAttr;
    }
}

fn decode_dest_bank(bank: u8, ext: bool) -> RegisterBank {
    match (bank & 0x3, ext) {
        (3, _) => RegisterBank::Indexed1,
        (0, false) => RegisterBank::Temp,
        (1, false) => RegisterBank::Output,
        (2, false) => RegisterBank::PrimAttr,
        (0, true) => RegisterBank::SecAttr,
        (1, true) => RegisterBank::Special,
        (2, true) => RegisterBank::Index,
        _ => RegisterBank::Invalid,
    }
}

fn decode_src0_bank(bank: u8, ext: bool) -> RegisterBank {
    match (bank, ext) {
        (0, false) => RegisterBank::Temp,
        (1, false) => RegisterBank::PrimAttr,
        (0, true) => RegisterBank::Output,
        (1, true) => RegisterBank::SecAttr,
        _ => {
            shader_warn!("Invalid src0 bank {} (ext {})", bank, ext);
            RegisterBank::Invalid
        }
    }
}

fn decode_src12_bank(bank: u8, ext: bool) -> RegisterBank {
    match (bank & 0x3, ext) {
        (0, false) => RegisterBank::Temp,
        (1, false) => RegisterBank::Output,
        (2, false) => RegisterBank::PrimAttr,
        (3, false) => RegisterBank::SecAttr,
        (0, true) => RegisterBank::Indexed1,
        (1, true) => RegisterBank::Special,
        (2, true) => RegisterBank::Immediate,
        _ => RegisterBank::Indexed2,
    }
}

fn build_operand(num: u32, bank: RegisterBank, double_regs: bool, reg_bits: u8, secondary: bool) -> Operand {
    let mut op = Operand {
        bank,
        num,
        ..Default::default()
    };
    if double_regs {
        op.num = double_reg(op.num, op.bank);
    }
    finalize_register(&mut op, double_regs, reg_bits, secondary);
    op
}

/// Decode a destination operand
pub fn decode_dest(num: u32, bank: u8, ext: bool, double_regs: bool, reg_bits: u8, secondary: bool) -> Operand {
    build_operand(num, decode_dest_bank(bank, ext), double_regs, reg_bits, secondary)
}

/// Decode a src0 operand (one-bit bank selector)
pub fn decode_src0(num: u32, bank: u8, ext: bool, double_regs: bool, reg_bits: u8, secondary: bool) -> Operand {
    build_operand(num, decode_src0_bank(bank, ext), double_regs, reg_bits, secondary)
}

/// Decode a src1 or src2 operand
pub fn decode_src12(num: u32, bank: u8, ext: bool, double_regs: bool, reg_bits: u8, secondary: bool) -> Operand {
    build_operand(num, decode_src12_bank(bank, ext), double_regs, reg_bits, secondary)
}

/// A general purpose internal register operand
pub fn decode_gpi(num: u32) -> Operand {
    Operand {
        bank: RegisterBank::FpInternal,
        num,
        flags: OperandFlags::GPI,
        ..Default::default()
    }
}

//=============================================================================
// SWIZZLE DECODING
//=============================================================================

/// Shape of a vec3/vec4 table lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwizzleKind {
    Scalar,
    Vec3,
    Vec4,
}

/// Four 3-bit channel selectors, X in the low bits
pub fn decode_swizzle4(encoded: u32) -> Swizzle4 {
    [
        SwizzleChannel::from((encoded & 0x7) as u8),
        SwizzleChannel::from(((encoded >> 3) & 0x7) as u8),
        SwizzleChannel::from(((encoded >> 6) & 0x7) as u8),
        SwizzleChannel::from(((encoded >> 9) & 0x7) as u8),
    ]
}

const VEC4_STD: [Swizzle4; 16] = [
    [X, X, X, X],
    [Y, Y, Y, Y],
    [Z, Z, Z, Z],
    [W, W, W, W],
    [X, Y, Z, W],
    [Y, Z, W, W],
    [X, Y, Z, Z],
    [X, X, Y, Z],
    [X, Y, X, Y],
    [X, Y, W, Z],
    [Z, X, Y, W],
    [Z, W, Z, W],
    [Y, Z, X, Z],
    [X, X, Y, Y],
    [X, Z, W, W],
    [X, Y, Z, C1],
];

const VEC4_EXT: [Swizzle4; 16] = [
    [Y, Z, X, W],
    [Z, W, X, Y],
    [X, Z, W, Y],
    [Y, Y, W, W],
    [W, Y, Z, W],
    [W, Z, W, Z],
    [X, Y, Z, X],
    [Z, Z, W, W],
    [X, W, Z, X],
    [Y, Y, Y, X],
    [Y, Y, Y, Z],
    [X, Z, Y, W],
    [X, X, X, Y],
    [Z, Y, X, W],
    [Y, Y, Z, Z],
    [Z, Z, Z, Y],
];

const VEC3_STD: [Swizzle3; 16] = [
    [X, X, X],
    [Y, Y, Y],
    [Z, Z, Z],
    [W, W, W],
    [X, Y, Z],
    [Y, Z, W],
    [X, X, Y],
    [X, Y, X],
    [Y, Y, X],
    [Y, Y, Z],
    [Z, X, Y],
    [X, Z, Y],
    [Y, Z, X],
    [Z, Y, X],
    [Z, Z, Y],
    [X, Y, C1],
];

const VEC3_EXT: [Swizzle3; 16] = [
    [X, Y, Y],
    [Y, X, Y],
    [X, X, Z],
    [Y, X, X],
    [X, Y, C0],
    [X, C1, C0],
    [C0, C0, C0],
    [C1, C1, C1],
    [H, H, H],
    [C2, C2, C2],
    [X, C0, C0],
    [U, U, U],
    [U, U, U],
    [U, U, U],
    [U, U, U],
    [U, U, U],
];

const SCALAR_STD: [Swizzle4; 16] = [
    [X, X, X, X],
    [Y, Y, Y, Y],
    [Z, Z, Z, Z],
    [W, W, W, W],
    [C0, C0, C0, C0],
    [C1, C1, C1, C1],
    [C2, C2, C2, C2],
    [H, H, H, H],
    SWIZZLE_UNDEFINED,
    SWIZZLE_UNDEFINED,
    SWIZZLE_UNDEFINED,
    SWIZZLE_UNDEFINED,
    SWIZZLE_UNDEFINED,
    SWIZZLE_UNDEFINED,
    SWIZZLE_UNDEFINED,
    SWIZZLE_UNDEFINED,
];

fn log_if_undefined(sw: Swizzle4, encoding: u8) -> Swizzle4 {
    if sw.contains(&SwizzleChannel::Undefined) {
        shader_warn!("Undefined swizzle encoding {:#x}", encoding);
    }
    sw
}

/// Decode the shared vec3/vec4/scalar swizzle tables
pub fn decode_vec34_swizzle(swizzle: u8, extended: bool, kind: SwizzleKind) -> Swizzle4 {
    let index = (swizzle & 0xF) as usize;
    let sw = match (kind, extended) {
        (SwizzleKind::Scalar, false) => SCALAR_STD[index],
        (SwizzleKind::Scalar, true) => SWIZZLE_UNDEFINED,
        (SwizzleKind::Vec3, false) => to_swizzle4(VEC3_STD[index]),
        (SwizzleKind::Vec3, true) => to_swizzle4(VEC3_EXT[index]),
        (SwizzleKind::Vec4, false) => VEC4_STD[index],
        (SwizzleKind::Vec4, true) => VEC4_EXT[index],
    };
    log_if_undefined(sw, swizzle)
}

const DUAL_VEC4_STD: [Swizzle4; 16] = [
    [X, X, X, X],
    [Y, Y, Y, Y],
    [Z, Z, Z, Z],
    [W, W, W, W],
    [X, Y, Z, W],
    [Y, Z, W, W],
    [X, Y, Z, Z],
    [X, X, Y, Z],
    [X, Y, X, Y],
    [X, Y, W, Z],
    [Z, X, Y, W],
    [Z, W, Z, W],
    [C0, C0, C0, C0],
    [H, H, H, H],
    [C1, C1, C1, C1],
    [C2, C2, C2, C2],
];

const DUAL_VEC4_EXT: [Swizzle4; 16] = [
    [Y, Z, X, W],
    [Z, W, X, Y],
    [X, Z, W, Y],
    [Y, Y, W, W],
    [W, Y, Z, W],
    [W, Z, W, Z],
    [X, Y, Z, X],
    [Z, Z, W, W],
    [X, W, Z, X],
    [Y, Y, Y, X],
    [Y, Y, Y, Z],
    [Z, W, Z, W],
    [Y, Z, X, Z],
    [X, X, Y, Y],
    [X, Z, W, W],
    [X, Y, Z, C1],
];

const DUAL_VEC3_STD: [Swizzle3; 16] = [
    [X, X, X],
    [Y, Y, Y],
    [Z, Z, Z],
    [W, W, W],
    [X, Y, Z],
    [Y, Z, W],
    [X, X, Y],
    [X, Y, X],
    [Y, Y, X],
    [Y, Y, Z],
    [Z, X, Y],
    [X, Z, Y],
    [C0, C0, C0],
    [H, H, H],
    [C1, C1, C1],
    [C2, C2, C2],
];

const DUAL_VEC3_EXT: [Swizzle3; 16] = [
    [X, Y, Y],
    [Y, X, Y],
    [X, X, Z],
    [Y, X, X],
    [X, Y, C0],
    [X, C1, C0],
    [X, Z, Y],
    [Y, Z, X],
    [Z, Y, X],
    [Z, Z, Y],
    [X, Y, C1],
    [U, U, U],
    [U, U, U],
    [U, U, U],
    [U, U, U],
    [U, U, U],
];

/// Dual-issue instructions use their own swizzle tables
pub fn decode_dual_swizzle(swizzle: u8, extended: bool, vec4: bool) -> Swizzle4 {
    let index = (swizzle & 0xF) as usize;
    let sw = match (vec4, extended) {
        (true, false) => DUAL_VEC4_STD[index],
        (true, true) => DUAL_VEC4_EXT[index],
        (false, false) => to_swizzle4(DUAL_VEC3_STD[index]),
        (false, true) => to_swizzle4(DUAL_VEC3_EXT[index]),
    };
    log_if_undefined(sw, swizzle)
}

//=============================================================================
// MASKS AND MODIFIERS
//=============================================================================

/// Adjust an encoded write mask to the register layout of the destination
pub fn decode_write_mask(bank: RegisterBank, mask: u8, f16: bool) -> u8 {
    let mask = mask & 0xF;
    let f16_native = !matches!(
        bank,
        RegisterBank::PrimAttr
            | RegisterBank::SecAttr
            | RegisterBank::Output
            | RegisterBank::FpInternal
            | RegisterBank::Temp
    );

    if bank == RegisterBank::FpInternal || (f16 && f16_native) {
        return mask;
    }

    if f16 {
        let mut out = 0;
        if mask & 0b0001 != 0 {
            out |= 0b0011;
        }
        if mask & 0b0100 != 0 {
            out |= 0b1100;
        }
        out
    } else {
        // F32 through unified store registers is limited to two channels
        mask & 0b0011
    }
}

/// Write mask of a move: F16 channels pair up, everything else is used as is
pub fn decode_move_mask(mask: u8, f16: bool) -> u8 {
    let mask = mask & 0xF;
    if !f16 {
        return mask;
    }

    let mut out = 0;
    if mask & 0b0001 != 0 {
        out |= 0b0011;
    }
    if mask & 0b0100 != 0 {
        out |= 0b1100;
    }
    out
}

/// Two-bit source modifier
pub fn decode_modifier(modifier: u8) -> OperandFlags {
    match modifier & 0x3 {
        1 => OperandFlags::NEGATIVE,
        2 => OperandFlags::ABSOLUTE,
        3 => OperandFlags::NEGATIVE | OperandFlags::ABSOLUTE,
        _ => OperandFlags::empty(),
    }
}

/// Number of channels enabled in a write mask
pub fn mask_component_count(mask: u8) -> u32 {
    (mask & 0xF).count_ones()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec34_tables() {
        assert_eq!(decode_vec34_swizzle(1, false, SwizzleKind::Vec4), [Y, Y, Y, Y]);
        assert_eq!(decode_vec34_swizzle(0b0100, false, SwizzleKind::Vec4), SWIZZLE_XYZW);
        assert_eq!(decode_vec34_swizzle(15, false, SwizzleKind::Vec4), [X, Y, Z, C1]);
        assert_eq!(decode_vec34_swizzle(13, true, SwizzleKind::Vec4), [Z, Y, X, W]);
        assert_eq!(decode_vec34_swizzle(5, false, SwizzleKind::Vec3), [Y, Z, W, X]);
        assert_eq!(decode_vec34_swizzle(8, true, SwizzleKind::Vec3), [H, H, H, X]);
        assert_eq!(decode_vec34_swizzle(7, false, SwizzleKind::Scalar), [H, H, H, H]);
    }

    #[test]
    fn test_undefined_swizzles_do_not_panic() {
        assert_eq!(decode_vec34_swizzle(3, true, SwizzleKind::Scalar), SWIZZLE_UNDEFINED);
        assert_eq!(decode_vec34_swizzle(12, false, SwizzleKind::Scalar), SWIZZLE_UNDEFINED);
        assert_eq!(decode_vec34_swizzle(11, true, SwizzleKind::Vec3)[0], U);
        assert_eq!(decode_dual_swizzle(15, true, false)[1], U);
    }

    #[test]
    fn test_dual_tables() {
        assert_eq!(decode_dual_swizzle(12, false, true), [C0, C0, C0, C0]);
        assert_eq!(decode_dual_swizzle(4, false, false), [X, Y, Z, X]);
        assert_eq!(decode_dual_swizzle(6, true, false), [X, Z, Y, X]);
    }

    #[test]
    fn test_swizzle4() {
        let encoded = 3 | (2 << 3) | (1 << 6) | (4 << 9);
        assert_eq!(decode_swizzle4(encoded), [W, Z, Y, C0]);
    }

    #[test]
    fn test_dest_decode_with_internal_alias() {
        // 6-bit doubled: 62 * 2 = 124 lands on the internal registers above 120
        let op = decode_dest(62, 0, false, true, 7, false);
        assert_eq!(op.bank, RegisterBank::FpInternal);
        assert_eq!(op.num, 2);

        let op = decode_dest(3, 1, false, true, 7, false);
        assert_eq!(op.bank, RegisterBank::Output);
        assert_eq!(op.num, 6);

        let op = decode_dest(60, 0, false, false, 6, false);
        assert_eq!(op.bank, RegisterBank::FpInternal);
        assert_eq!(op.num, 0);
    }

    #[test]
    fn test_special_and_secondary_banks() {
        let op = decode_src12(0x41, 1, true, false, 7, false);
        assert_eq!(op.bank, RegisterBank::Global);
        assert_eq!(op.num, 1);

        let op = decode_src12(0x05, 1, true, false, 7, false);
        assert_eq!(op.bank, RegisterBank::FpConstant);

        let op = decode_src12(4, 0, false, false, 7, true);
        assert_eq!(op.bank, RegisterBank::SecAttr);

        let op = decode_src12(9, 2, true, false, 7, true);
        assert_eq!(op.bank, RegisterBank::Immediate);
        assert_eq!(op.num, 9);
    }

    #[test]
    fn test_write_mask() {
        assert_eq!(decode_write_mask(RegisterBank::Temp, 0b1111, false), 0b0011);
        assert_eq!(decode_write_mask(RegisterBank::Temp, 0b0101, true), 0b1111);
        assert_eq!(decode_write_mask(RegisterBank::Temp, 0b0001, true), 0b0011);
        assert_eq!(decode_write_mask(RegisterBank::FpInternal, 0b1010, false), 0b1010);
        assert_eq!(decode_write_mask(RegisterBank::Indexed1, 0b1010, true), 0b1010);
        assert_eq!(decode_move_mask(0b1111, false), 0b1111);
        assert_eq!(decode_move_mask(0b0100, true), 0b1100);
    }

    #[test]
    fn test_modifiers() {
        assert_eq!(decode_modifier(0), OperandFlags::empty());
        assert_eq!(decode_modifier(1), OperandFlags::NEGATIVE);
        assert_eq!(decode_modifier(3), OperandFlags::NEGATIVE | OperandFlags::ABSOLUTE);
    }
}
