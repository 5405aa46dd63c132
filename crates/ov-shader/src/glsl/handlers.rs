//! GLSL emitters, one per opcode family
//!
//! Every handler emits one repetition of an instruction into the
//! [`EmitContext`]. [`emit`] is the only call site: it looks the handler up
//! by family and runs it once per repeat.

use super::EmitContext;
use crate::resolver::{construct, literal, mask_count, scalar_type, selected, vector_type};
use crate::types::*;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Emits one repetition of an instruction
pub type Handler = fn(&mut EmitContext<'_>, &Instruction, usize) -> Result<(), String>;

static HANDLERS: Lazy<HashMap<OpcodeFamily, Handler>> = Lazy::new(|| {
    let mut table: HashMap<OpcodeFamily, Handler> = HashMap::new();
    table.insert(OpcodeFamily::Move, emit_move);
    table.insert(OpcodeFamily::FloatMad, emit_float_mad);
    table.insert(OpcodeFamily::FloatVector, emit_float_vector);
    table.insert(OpcodeFamily::Complex, emit_complex);
    table.insert(OpcodeFamily::Pack, emit_pack);
    table.insert(OpcodeFamily::Bitwise, emit_bitwise);
    table.insert(OpcodeFamily::IntegerMad, emit_integer_mad);
    table.insert(OpcodeFamily::Test, emit_test);
    table.insert(OpcodeFamily::TestMask, emit_test_mask);
    table.insert(OpcodeFamily::Sample, emit_sample);
    table.insert(OpcodeFamily::Branch, emit_branch);
    table.insert(OpcodeFamily::Kill, emit_kill);
    table.insert(OpcodeFamily::Misc, emit_nothing);
    table
});

/// Statements implementing `inst`, all repeats included
///
/// Any failing repeat fails the whole instruction, nothing partial is kept.
pub fn emit(ctx: &mut EmitContext<'_>, inst: &Instruction) -> Result<Vec<String>, String> {
    let handler = HANDLERS
        .get(&inst.family())
        .ok_or_else(|| format!("no handler for {:?}", inst.family()))?;

    ctx.lines.clear();
    for repeat in 0..usize::from(inst.repeat_count.max(1)) {
        if let Err(e) = handler(ctx, inst, repeat) {
            ctx.lines.clear();
            return Err(e);
        }
    }
    Ok(std::mem::take(&mut ctx.lines))
}

//=============================================================================
// SHARED EXPRESSION BUILDING
//=============================================================================

/// `expr` widened to `count` components of `dtype`
fn replicate(expr: String, dtype: DataType, count: usize) -> String {
    if count <= 1 {
        expr
    } else {
        format!("{}({})", vector_type(dtype, count), expr)
    }
}

/// Zero of `dtype` with `count` components
fn zero(dtype: DataType, count: usize) -> String {
    replicate(literal(0, dtype), dtype, count)
}

/// Rotate a 4-bit write mask left by `n`
fn rotate_mask(mask: u8, n: usize) -> u8 {
    let mut m = mask & 0xF;
    for _ in 0..n {
        m = ((m << 1) | (m >> 3)) & 0xF;
    }
    m
}

/// Opcodes that read only their first ALU source
fn unary(opcode: Opcode) -> bool {
    matches!(
        opcode,
        Opcode::Vdsx
            | Opcode::Vf16Dsx
            | Opcode::Vdsy
            | Opcode::Vf16Dsy
            | Opcode::Vrcp
            | Opcode::Vrsq
            | Opcode::Vlog
            | Opcode::Vexp
    )
}

/// Arithmetic of a two-source ALU operation on already loaded operands
fn alu_expr(
    stage: ShaderStage,
    opcode: Opcode,
    ops: (&Operand, &Operand),
    a: &str,
    b: &str,
    mask: u8,
) -> Result<String, String> {
    use Opcode::*;

    let derivative = |func: &str| {
        if stage == ShaderStage::Fragment {
            Ok(format!("{}({})", func, a))
        } else {
            Err(format!("{} is only available in fragment programs", opcode.mnemonic()))
        }
    };

    Ok(match opcode {
        Vadd | Vf16Add | Iadd8 | Iaddu8 | Fpadd8 | Iadd16 | Iaddu16 | Iadd32 | Iaddu32 => {
            format!("{} + {}", a, b)
        }
        op if op.is_sub() => format!("{} - {}", a, b),
        Vmul | Vf16Mul | Imul8 | Imulu8 | Fpmul8 | Imul16 | Imulu16 => format!("{} * {}", a, b),
        Vmin | Vf16Min => format!("min({}, {})", a, b),
        Vmax | Vf16Max => format!("max({}, {})", a, b),
        Vfrc | Vf16Frc => {
            // src1 - floor(src2), fract when both name the same channels
            if ops.0.is_same(ops.1, mask) {
                format!("fract({})", a)
            } else {
                format!("{} - floor({})", a, b)
            }
        }
        Vdsx | Vf16Dsx => derivative("dFdx")?,
        Vdsy | Vf16Dsy => derivative("dFdy")?,
        Vdp | Vf16Dp => format!("dot({}, {})", a, b),
        Vrcp => format!("1.0 / {}", a),
        Vrsq => format!("inversesqrt({})", a),
        Vlog => format!("log2({})", a),
        Vexp => format!("exp2({})", a),
        And => format!("{} & {}", a, b),
        Or => format!("{} | {}", a, b),
        Xor => format!("{} ^ {}", a, b),
        Shl => format!("{} << {}", a, b),
        Shr => format!("{} >> {}", a, b),
        Asr => format!("uint(int({}) >> int({}))", a, b),
        Rol => return Err("bitwise rotate is not supported".into()),
        other => return Err(format!("{} is not an ALU operation", other.mnemonic())),
    })
}

//=============================================================================
// MOVES
//=============================================================================

fn emit_move(ctx: &mut EmitContext<'_>, inst: &Instruction, r: usize) -> Result<(), String> {
    let mask = inst.dest_mask;
    let src1 = ctx.load(&inst.src1, mask, inst.repeat_offset(r, OperandSlot::Src1))?;

    let value = match inst.detail {
        Detail::ConditionalMove { compare } => {
            let cond = ctx.load(&inst.src0, mask, inst.repeat_offset(r, OperandSlot::Src0))?;
            let src2 = ctx.load(&inst.src2, mask, inst.repeat_offset(r, OperandSlot::Src2))?;
            ctx.select(compare, (&cond, inst.src0.dtype), &src1, &src2, inst.dest.dtype, mask_count(mask))
        }
        _ => src1,
    };

    ctx.store(&inst.dest, &value, mask, inst.repeat_offset(r, OperandSlot::Dest))
}

impl EmitContext<'_> {
    /// `cond <compare> 0 ? a : b`, componentwise for vectors
    fn select(
        &self,
        compare: CompareMethod,
        (cond, cond_type): (&str, DataType),
        a: &str,
        b: &str,
        value_type: DataType,
        count: usize,
    ) -> String {
        if count == 1 {
            return format!("({} {} {}) ? {} : {}", cond, compare.operator(), literal(0, cond_type), a, b);
        }

        let test = format!("{}({}, {})", compare.function(), cond, zero(cond_type, count));
        if value_type.is_float() || self.features.contains(FeatureFlags::INTEGER_MIXING) {
            return format!("mix({}, {}, {})", b, a, test);
        }

        let parts = (0..count)
            .map(|i| {
                let c = ['x', 'y', 'z', 'w'][i];
                format!("({}).{} ? ({}).{} : ({}).{}", test, c, a, c, b, c)
            })
            .collect();
        construct(value_type, parts)
    }
}

//=============================================================================
// FLOAT ARITHMETIC
//=============================================================================

fn emit_float_mad(ctx: &mut EmitContext<'_>, inst: &Instruction, r: usize) -> Result<(), String> {
    let mask = inst.dest_mask;
    let a = ctx.load(&inst.src0, mask, inst.repeat_offset(r, OperandSlot::Src0))?;
    let b = ctx.load(&inst.src1, mask, inst.repeat_offset(r, OperandSlot::Src1))?;
    let c = ctx.load(&inst.src2, mask, inst.repeat_offset(r, OperandSlot::Src2))?;
    let value = format!("fma({}, {}, {})", a, b, c);
    ctx.store(&inst.dest, &value, mask, inst.repeat_offset(r, OperandSlot::Dest))
}

fn emit_float_vector(ctx: &mut EmitContext<'_>, inst: &Instruction, r: usize) -> Result<(), String> {
    if let Detail::Dot { rotate_mask: rotating } = inst.detail {
        let dest_mask = if rotating { rotate_mask(inst.dest_mask, r) } else { inst.dest_mask };
        let a = ctx.load(&inst.src1, inst.src_masks[1], inst.repeat_offset(r, OperandSlot::Src1))?;
        let b = ctx.load(&inst.src2, inst.src_masks[2], inst.repeat_offset(r, OperandSlot::Src2))?;
        let value = replicate(format!("dot({}, {})", a, b), inst.dest.dtype, mask_count(dest_mask));
        return ctx.store(&inst.dest, &value, dest_mask, inst.repeat_offset(r, OperandSlot::Dest));
    }

    let mask = inst.dest_mask;
    let a = ctx.load(&inst.src1, mask, inst.repeat_offset(r, OperandSlot::Src1))?;
    let b = if unary(inst.opcode) {
        String::new()
    } else {
        ctx.load(&inst.src2, mask, inst.repeat_offset(r, OperandSlot::Src2))?
    };
    let value = alu_expr(ctx.stage, inst.opcode, (&inst.src1, &inst.src2), &a, &b, mask)?;
    ctx.store(&inst.dest, &value, mask, inst.repeat_offset(r, OperandSlot::Dest))
}

fn emit_complex(ctx: &mut EmitContext<'_>, inst: &Instruction, r: usize) -> Result<(), String> {
    let a = ctx.load(&inst.src1, inst.src_masks[1], inst.repeat_offset(r, OperandSlot::Src1))?;
    let expr = alu_expr(ctx.stage, inst.opcode, (&inst.src1, &inst.src2), &a, "", inst.src_masks[1])?;
    let value = replicate(expr, inst.dest.dtype, mask_count(inst.dest_mask));
    ctx.store(&inst.dest, &value, inst.dest_mask, inst.repeat_offset(r, OperandSlot::Dest))
}

//=============================================================================
// PACK / UNPACK
//=============================================================================

/// Largest value of an integer format, as a float literal
fn format_max(dtype: DataType) -> &'static str {
    match dtype {
        DataType::Uint8 | DataType::O8 => "255.0",
        DataType::Int8 => "127.0",
        DataType::Uint16 => "65535.0",
        DataType::Int16 => "32767.0",
        DataType::Uint32 => "4294967295.0",
        DataType::Int32 => "2147483647.0",
        _ => "1.0",
    }
}

/// Convert `src` between pack formats, normalising when `scale` is set
fn convert(src: String, from: DataType, to: DataType, scale: bool, count: usize) -> String {
    let target = vector_type(to, count);
    match (from.is_float(), to.is_float()) {
        (true, true) => src,
        (true, false) if scale => {
            let (lo, hi) = if to.is_signed() { ("-1.0", "1.0") } else { ("0.0", "1.0") };
            format!("{}(round(clamp({}, {}, {}) * {}))", target, src, lo, hi, format_max(to))
        }
        (true, false) => format!("{}({})", target, src),
        (false, true) if scale => format!("{}({}) / {}", target, src, format_max(from)),
        (false, true) => format!("{}({})", target, src),
        (false, false) if scalar_type(from) == scalar_type(to) => src,
        (false, false) => format!("{}({})", target, src),
    }
}

fn emit_pack(ctx: &mut EmitContext<'_>, inst: &Instruction, r: usize) -> Result<(), String> {
    let Detail::Pack { src_format, dest_format, scale, split } = inst.detail else {
        return Err("pack instruction without formats".into());
    };
    let mask = inst.dest_mask;

    let src = if split {
        // Four 32-bit channels come from two register pairs
        let mut lo = inst.src1;
        let mut hi = inst.src2;
        lo.swizzle = SWIZZLE_XYZW;
        hi.swizzle = SWIZZLE_XYZW;
        let a = ctx.load(&lo, 0b0011, inst.repeat_offset(r, OperandSlot::Src1))?;
        let b = ctx.load(&hi, 0b0011, inst.repeat_offset(r, OperandSlot::Src2))?;
        let swizzle = selected(mask)
            .map(|i| inst.src1.swizzle[i].component().map(|c| ['x', 'y', 'z', 'w'][c as usize]))
            .collect::<Option<String>>()
            .ok_or_else(|| "constant channel in split pack source".to_string())?;
        format!("vec4({}, {}).{}", a, b, swizzle)
    } else {
        ctx.load(&inst.src1, mask, inst.repeat_offset(r, OperandSlot::Src1))?
    };

    let value = convert(src, src_format, dest_format, scale, mask_count(mask));
    ctx.store(&inst.dest, &value, mask, inst.repeat_offset(r, OperandSlot::Dest))
}

//=============================================================================
// INTEGER
//=============================================================================

fn emit_bitwise(ctx: &mut EmitContext<'_>, inst: &Instruction, r: usize) -> Result<(), String> {
    let Detail::Bitwise { immediate, rotate } = inst.detail else {
        return Err("bitwise instruction without operand detail".into());
    };
    if rotate != 0 || inst.opcode == Opcode::Rol {
        return Err("bitwise rotate is not supported".into());
    }

    let dest_offset = inst.repeat_offset(r, OperandSlot::Dest);
    let src1_offset = inst.repeat_offset(r, OperandSlot::Src1);

    // x | 0, x ^ 0 and x & ~0 are plain moves of the raw bits
    let identity = matches!(
        (inst.opcode, immediate),
        (Opcode::Or | Opcode::Xor, Some(0)) | (Opcode::And, Some(u32::MAX))
    );
    if identity {
        if inst.dest.is_same(&inst.src1, 0b0001) && dest_offset == src1_offset {
            return Ok(());
        }
        let mut dest = inst.dest;
        let mut src = inst.src1;
        dest.dtype = DataType::F32;
        src.dtype = DataType::F32;
        let value = ctx.load(&src, 0b0001, src1_offset)?;
        return ctx.store(&dest, &value, 0b0001, dest_offset);
    }

    let a = ctx.load(&inst.src1, 0b0001, src1_offset)?;
    let b = match immediate {
        Some(imm) => format!("{}u", imm),
        None => ctx.load(&inst.src2, 0b0001, inst.repeat_offset(r, OperandSlot::Src2))?,
    };
    let value = alu_expr(ctx.stage, inst.opcode, (&inst.src1, &inst.src2), &a, &b, 0b0001)?;
    ctx.store(&inst.dest, &value, 0b0001, dest_offset)
}

fn emit_integer_mad(ctx: &mut EmitContext<'_>, inst: &Instruction, r: usize) -> Result<(), String> {
    let off = |slot| inst.repeat_offset(r, slot);

    let value = match inst.detail {
        Detail::ByteMad { csel0, asel0, negate_add } => {
            let mut src0 = inst.src0;
            src0.swizzle = SWIZZLE_XYZW;
            let a = ctx.load(&inst.src1, 0b1111, off(OperandSlot::Src1))?;
            let b = ctx.load(&inst.src2, 0b1111, off(OperandSlot::Src2))?;
            let c = ctx.load(&src0, 0b1111, off(OperandSlot::Src0))?;

            let add = if csel0 == 0 && !asel0 {
                c
            } else {
                let rgb = match csel0 {
                    0 => format!("({}).xyz", c),
                    1 => format!("({}).xyz", a),
                    2 => format!("({}).www", c),
                    _ => format!("({}).www", a),
                };
                let alpha = if asel0 { format!("({}).w", a) } else { format!("({}).w", c) };
                format!("uvec4({}, {})", rgb, alpha)
            };
            format!("{} * {} {} {}", a, b, if negate_add { "-" } else { "+" }, add)
        }
        Detail::ShortMad { negate_add } => {
            let mut src0 = inst.src0;
            src0.swizzle = SWIZZLE_XYZW;
            let a = ctx.load(&src0, 0b0011, off(OperandSlot::Src0))?;
            let b = ctx.load(&inst.src1, inst.src_masks[1], off(OperandSlot::Src1))?;
            let c = ctx.load(&inst.src2, inst.src_masks[2], off(OperandSlot::Src2))?;
            let pair = vector_type(inst.dest.dtype, 2);
            format!("{} * {}({}) {} {}({})", a, pair, b, if negate_add { "-" } else { "+" }, pair, c)
        }
        _ => {
            let a = ctx.load(&inst.src0, inst.src_masks[0], off(OperandSlot::Src0))?;
            let b = ctx.load(&inst.src1, inst.src_masks[1], off(OperandSlot::Src1))?;
            let c = ctx.load(&inst.src2, inst.src_masks[2], off(OperandSlot::Src2))?;
            format!("{} * {} + {}", a, b, c)
        }
    };

    ctx.store(&inst.dest, &value, inst.dest_mask, off(OperandSlot::Dest))
}

//=============================================================================
// TESTS
//=============================================================================

/// Comparison against zero, `None` when the test always passes
fn compare_operator(zero: ZeroTest, sign: SignTest) -> Option<&'static str> {
    const OPS: [[&str; 3]; 2] = [["!=", "<", ">"], ["==", "<=", ">="]];
    if zero == ZeroTest::Always && sign == SignTest::None {
        return None;
    }
    let include_equal = usize::from(zero == ZeroTest::Zero);
    Some(OPS[include_equal][sign as usize])
}

fn compare_function(op: &str) -> &'static str {
    match op {
        "==" => "equal",
        "!=" => "notEqual",
        "<" => "lessThan",
        "<=" => "lessThanEqual",
        ">" => "greaterThan",
        _ => "greaterThanEqual",
    }
}

fn emit_test(ctx: &mut EmitContext<'_>, inst: &Instruction, r: usize) -> Result<(), String> {
    let Detail::Test { alu_op, zero: zero_test, sign } = inst.detail else {
        return Err("test instruction without condition".into());
    };

    let mask = inst.src_masks[1];
    let a = ctx.load(&inst.src1, mask, inst.repeat_offset(r, OperandSlot::Src1))?;
    let b = ctx.load(&inst.src2, mask, inst.repeat_offset(r, OperandSlot::Src2))?;

    let value = match compare_operator(zero_test, sign) {
        None => "true".to_string(),
        Some(op) if alu_op.is_sub() => format!("{} {} {}", a, op, b),
        Some(op) => {
            let expr = alu_expr(ctx.stage, alu_op, (&inst.src1, &inst.src2), &a, &b, mask)?;
            format!("({}) {} {}", expr, op, literal(0, inst.src1.dtype))
        }
    };

    ctx.store(&inst.dest, &value, 0b0001, inst.repeat_offset(r, OperandSlot::Dest))
}

fn emit_test_mask(ctx: &mut EmitContext<'_>, inst: &Instruction, r: usize) -> Result<(), String> {
    let Detail::Test { alu_op, zero: zero_test, sign } = inst.detail else {
        return Err("test instruction without condition".into());
    };

    let dtype = inst.src1.dtype;
    let a = ctx.load(&inst.src1, 0b1111, inst.repeat_offset(r, OperandSlot::Src1))?;
    let b = ctx.load(&inst.src2, 0b1111, inst.repeat_offset(r, OperandSlot::Src2))?;

    let cmp = match compare_operator(zero_test, sign) {
        None => "bvec4(true)".to_string(),
        Some(op) if alu_op.is_sub() => format!("{}({}, {})", compare_function(op), a, b),
        Some(op) => {
            let mut expr = alu_expr(ctx.stage, alu_op, (&inst.src1, &inst.src2), &a, &b, 0b1111)?;
            if matches!(alu_op, Opcode::Vdp | Opcode::Vf16Dp) {
                expr = replicate(expr, dtype, 4);
            }
            format!("{}({}, {})", compare_function(op), expr, zero(dtype, 4))
        }
    };

    let value = if inst.dest.dtype == DataType::Uint8 {
        format!("uvec4({}) * 255u", cmp)
    } else {
        format!("vec4({})", cmp)
    };
    ctx.store(&inst.dest, &value, inst.dest_mask, inst.repeat_offset(r, OperandSlot::Dest))
}

//=============================================================================
// TEXTURES
//=============================================================================

fn emit_sample(ctx: &mut EmitContext<'_>, inst: &Instruction, r: usize) -> Result<(), String> {
    let Detail::Sample { dim, lod_mode, .. } = inst.detail else {
        return Err("sample instruction without mode".into());
    };
    let sampler = ctx
        .resolver
        .sampler(inst.src1.num)
        .map(|s| s.name.clone())
        .ok_or_else(|| format!("no sampler at resource index {}", inst.src1.num))?;

    let coord_mask = inst.src_masks[0];
    let mut coord = ctx.load(&inst.src0, coord_mask, inst.repeat_offset(r, OperandSlot::Src0))?;
    if dim == 1 {
        coord = format!("vec2({}, 0.0)", coord);
    }

    let src2_offset = inst.repeat_offset(r, OperandSlot::Src2);
    let value = match lod_mode {
        0 => format!("texture({}, {})", sampler, coord),
        2 => {
            let lod = ctx.load(&inst.src2, 0b0001, src2_offset)?;
            format!("textureLod({}, {}, {})", sampler, coord, lod)
        }
        3 => {
            // dy follows dx in the register file
            let count = mask_count(coord_mask) as u32;
            let stride = count.div_ceil(inst.src2.dtype.per_register()) as i32;
            let mut dx = ctx.load(&inst.src2, coord_mask, src2_offset)?;
            let mut dy = ctx.load(&inst.src2, coord_mask, src2_offset + stride)?;
            if dim == 1 {
                dx = format!("vec2({}, 0.0)", dx);
                dy = format!("vec2({}, 0.0)", dy);
            }
            format!("textureGrad({}, {}, {}, {})", sampler, coord, dx, dy)
        }
        other => return Err(format!("unsupported LOD mode {}", other)),
    };

    ctx.store(&inst.dest, &value, 0b1111, inst.repeat_offset(r, OperandSlot::Dest))
}

//=============================================================================
// FLOW CONTROL
//=============================================================================

fn emit_branch(ctx: &mut EmitContext<'_>, inst: &Instruction, _r: usize) -> Result<(), String> {
    let Detail::Branch { target, link } = inst.detail else {
        return Err("branch without target".into());
    };
    if link {
        return Err("subroutine calls are not supported".into());
    }
    let target = target.ok_or_else(|| "branch target out of range".to_string())?;
    ctx.lines.push(format!("pc = {}u;", target));
    ctx.lines.push("continue;".to_string());
    Ok(())
}

fn emit_kill(ctx: &mut EmitContext<'_>, _inst: &Instruction, _r: usize) -> Result<(), String> {
    if ctx.stage != ShaderStage::Fragment {
        return Err("KILL outside a fragment program".into());
    }
    ctx.lines.push("discard;".to_string());
    Ok(())
}

fn emit_nothing(_ctx: &mut EmitContext<'_>, _inst: &Instruction, _r: usize) -> Result<(), String> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_operators() {
        assert_eq!(compare_operator(ZeroTest::Always, SignTest::None), None);
        assert_eq!(compare_operator(ZeroTest::Zero, SignTest::None), Some("=="));
        assert_eq!(compare_operator(ZeroTest::NonZero, SignTest::None), Some("!="));
        assert_eq!(compare_operator(ZeroTest::Zero, SignTest::LessThan), Some("<="));
        assert_eq!(compare_operator(ZeroTest::NonZero, SignTest::GreaterThan), Some(">"));
        assert_eq!(compare_operator(ZeroTest::Always, SignTest::LessThan), Some("<"));
        assert_eq!(compare_function(">="), "greaterThanEqual");
    }

    #[test]
    fn test_rotate_mask() {
        assert_eq!(rotate_mask(0b0001, 0), 0b0001);
        assert_eq!(rotate_mask(0b0001, 1), 0b0010);
        assert_eq!(rotate_mask(0b1000, 1), 0b0001);
        assert_eq!(rotate_mask(0b0011, 3), 0b1001);
    }

    #[test]
    fn test_pack_conversions() {
        assert_eq!(
            convert("x".into(), DataType::F32, DataType::Uint8, true, 2),
            "uvec2(round(clamp(x, 0.0, 1.0) * 255.0))"
        );
        assert_eq!(
            convert("x".into(), DataType::Int16, DataType::F32, true, 1),
            "float(x) / 32767.0"
        );
        assert_eq!(convert("x".into(), DataType::F16, DataType::F32, true, 4), "x");
        assert_eq!(convert("x".into(), DataType::Uint8, DataType::Uint16, false, 1), "x");
        assert_eq!(convert("x".into(), DataType::Int8, DataType::Uint8, false, 3), "uvec3(x)");
    }

    #[test]
    fn test_alu_expressions() {
        let a = Operand { bank: RegisterBank::Temp, num: 0, ..Default::default() };
        let b = Operand { bank: RegisterBank::Temp, num: 4, ..Default::default() };
        let frag = ShaderStage::Fragment;
        assert_eq!(alu_expr(frag, Opcode::Vfrc, (&a, &a), "r0", "r0", 0b1111).unwrap(), "fract(r0)");
        assert_eq!(alu_expr(frag, Opcode::Vfrc, (&a, &b), "r0", "r1", 0b1111).unwrap(), "r0 - floor(r1)");
        assert_eq!(alu_expr(frag, Opcode::Isub16, (&a, &b), "x", "y", 1).unwrap(), "x - y");
        assert_eq!(alu_expr(frag, Opcode::Asr, (&a, &b), "x", "y", 1).unwrap(), "uint(int(x) >> int(y))");
        assert!(alu_expr(frag, Opcode::Rol, (&a, &b), "x", "y", 1).is_err());
        assert!(alu_expr(ShaderStage::Vertex, Opcode::Vdsx, (&a, &b), "x", "", 1).is_err());
    }
}
