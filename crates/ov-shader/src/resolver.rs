//! Operand and register-bank resolution
//!
//! Every USSE register bank is modelled as a flat array of 32-bit registers.
//! A [`BankLayout`] carves that array into named logical registers, each
//! backed by one GLSL float variable (`float`, `vecN` or a `vec4` array).
//! Typed loads and stores reinterpret that float storage: 32-bit integers go
//! through `floatBitsTo*`, halves through `unpackHalf2x16`, and 8/16-bit
//! integers through `bitfieldExtract`.

use crate::gxp::{GxpProgram, ParameterCategory};
use crate::types::*;
use ov_core::{shader_debug, shader_warn};
use std::collections::HashSet;

const COMPONENTS: [char; 4] = ['x', 'y', 'z', 'w'];

/// Registers allocated on demand share this granularity
pub const CHUNK_SIZE: u32 = 4;

//=============================================================================
// LOGICAL REGISTERS
//=============================================================================

/// Where a logical register gets its initial value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterSource {
    /// Zero-initialised local
    Local,
    /// Vertex attribute at a GLSL input location
    Attribute { location: u32, dtype: DataType },
    /// Uniform parameter read from the uniform block
    Uniform,
    /// Constant from the literal table
    Literal(u32),
    /// Interpolated fragment input
    Varying { location: u32 },
}

/// A named variable covering `width` registers starting at flat index `base`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalRegister {
    pub name: String,
    pub base: u32,
    pub width: u32,
    pub source: RegisterSource,
}

impl LogicalRegister {
    pub fn end(&self) -> u32 {
        self.base + self.width
    }

    pub fn contains(&self, index: u32) -> bool {
        index >= self.base && index < self.end()
    }

    /// GLSL declaration type, `None` for array-backed registers
    pub fn glsl_type(&self) -> Option<&'static str> {
        match self.width {
            1 => Some("float"),
            2 => Some("vec2"),
            3 => Some("vec3"),
            4 => Some("vec4"),
            _ => None,
        }
    }

    /// Number of `vec4` elements in an array-backed register
    pub fn array_len(&self) -> u32 {
        self.width.div_ceil(4)
    }

    /// GLSL declaration without initialiser, e.g. `vec4 r0` or `vec4 m[3]`
    pub fn declaration(&self) -> String {
        match self.glsl_type() {
            Some(ty) => format!("{} {}", ty, self.name),
            None => format!("vec4 {}[{}]", self.name, self.array_len()),
        }
    }

    /// Zero value matching [`declaration`](Self::declaration)
    pub fn zero_value(&self) -> String {
        match self.glsl_type() {
            Some("float") => "0.0".to_string(),
            Some(ty) => format!("{}(0.0)", ty),
            None => format!("vec4[{}]({})", self.array_len(), vec!["vec4(0.0)"; self.array_len() as usize].join(", ")),
        }
    }

    /// Expression naming the 32-bit register at `offset` inside this variable
    pub fn element(&self, offset: u32) -> String {
        if self.width == 1 {
            self.name.clone()
        } else if self.width <= 4 {
            format!("{}.{}", self.name, COMPONENTS[offset as usize])
        } else {
            format!("{}[{}].{}", self.name, offset / 4, COMPONENTS[(offset % 4) as usize])
        }
    }
}

struct LazyAlloc {
    prefix: &'static str,
    limit: u32,
}

/// Ordered logical registers of one bank
pub struct BankLayout {
    bank: RegisterBank,
    regs: Vec<LogicalRegister>,
    lazy: Option<LazyAlloc>,
}

impl BankLayout {
    /// A bank holding only explicitly inserted registers
    pub fn new(bank: RegisterBank) -> Self {
        Self {
            bank,
            regs: Vec::new(),
            lazy: None,
        }
    }

    /// A bank that allocates `{prefix}{n}` chunks for indices below `limit`
    pub fn lazy(bank: RegisterBank, prefix: &'static str, limit: u32) -> Self {
        Self {
            bank,
            regs: Vec::new(),
            lazy: Some(LazyAlloc { prefix, limit }),
        }
    }

    pub fn bank(&self) -> RegisterBank {
        self.bank
    }

    pub fn registers(&self) -> &[LogicalRegister] {
        &self.regs
    }

    /// Insert a register, refusing empty or overlapping ranges
    pub fn insert(&mut self, reg: LogicalRegister) -> bool {
        if reg.width == 0 || self.regs.iter().any(|r| r.base < reg.end() && reg.base < r.end()) {
            shader_warn!(
                "{:?}: register {} [{}, {}) overlaps an existing one",
                self.bank,
                reg.name,
                reg.base,
                reg.end()
            );
            return false;
        }
        let at = self.regs.partition_point(|r| r.base < reg.base);
        self.regs.insert(at, reg);
        true
    }

    /// Locate the register containing flat index `index`
    ///
    /// Returns the register and the component offset of `index` inside it.
    /// The index does not need to be aligned to the register width.
    pub fn find_reg_at(&self, index: u32) -> Option<(&LogicalRegister, u32)> {
        let at = self.regs.partition_point(|r| r.end() <= index);
        self.regs
            .get(at)
            .filter(|r| r.contains(index))
            .map(|r| (r, index - r.base))
    }

    /// Like [`find_reg_at`](Self::find_reg_at), allocating a chunk on lazy banks
    pub fn locate(&mut self, index: u32, source: RegisterSource) -> Option<(&LogicalRegister, u32)> {
        if self.find_reg_at(index).is_none() {
            self.allocate(index, source)?;
        }
        self.find_reg_at(index)
    }

    fn allocate(&mut self, index: u32, source: RegisterSource) -> Option<()> {
        let lazy = self.lazy.as_ref()?;
        if index >= lazy.limit {
            return None;
        }

        let chunk = index / CHUNK_SIZE;
        let mut start = chunk * CHUNK_SIZE;
        let mut end = start + CHUNK_SIZE;
        for r in &self.regs {
            if r.end() <= index {
                start = start.max(r.end());
            } else if r.base > index {
                end = end.min(r.base);
            }
        }

        let name = if start % CHUNK_SIZE == 0 && end - start == CHUNK_SIZE {
            format!("{}{}", lazy.prefix, chunk)
        } else {
            format!("{}{}_{}", lazy.prefix, chunk, start % CHUNK_SIZE)
        };
        let reg = LogicalRegister {
            name,
            base: start,
            width: end - start,
            source,
        };
        shader_debug!("{:?}: allocated {} at [{}, {})", self.bank, reg.name, reg.base, reg.end());
        self.insert(reg).then_some(())
    }
}

//=============================================================================
// SAMPLERS
//=============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerBinding {
    pub name: String,
    pub resource_index: u32,
    pub cube: bool,
}

//=============================================================================
// RESOLVER
//=============================================================================

/// Bank layouts and typed access for one program
pub struct Resolver {
    pub stage: ShaderStage,
    pub primary_attrs: BankLayout,
    pub secondary_attrs: BankLayout,
    pub outputs: BankLayout,
    pub temps: BankLayout,
    pub internals: BankLayout,
    pub samplers: Vec<SamplerBinding>,
}

/// Hands out GLSL names, suffixing repeats with a counter
#[derive(Debug, Default)]
struct UniqueNames {
    used: HashSet<String>,
}

impl UniqueNames {
    fn claim(&mut self, name: String) -> String {
        let mut candidate = name.clone();
        let mut n = 1;
        while !self.used.insert(candidate.clone()) {
            n += 1;
            candidate = format!("{}_{}", name, n);
        }
        candidate
    }
}

/// Per-stage name prefix used for GLSL resources
pub fn stage_prefix(stage: ShaderStage) -> &'static str {
    match stage {
        ShaderStage::Vertex => "vert",
        ShaderStage::Fragment => "frag",
    }
}

impl Resolver {
    /// Build the bank layouts from the program's parameter and literal tables
    pub fn new(program: &GxpProgram) -> Self {
        let stage = program.stage;
        let mut primary_attrs = match stage {
            ShaderStage::Vertex => BankLayout::lazy(RegisterBank::PrimAttr, "pa", 256),
            ShaderStage::Fragment => BankLayout::lazy(RegisterBank::PrimAttr, "in", 256),
        };
        let mut secondary_attrs = BankLayout::lazy(RegisterBank::SecAttr, "sa", 1024);

        if stage == ShaderStage::Vertex {
            for param in program.parameters_of(ParameterCategory::Attribute) {
                let base = program.parameter_offset(param);
                let location = base / CHUNK_SIZE;
                primary_attrs.insert(LogicalRegister {
                    name: format!("in{}", location),
                    base,
                    width: param.register_width().min(CHUNK_SIZE),
                    source: RegisterSource::Attribute {
                        location,
                        dtype: param.ptype.data_type(),
                    },
                });
            }
        }

        let mut names = UniqueNames::default();
        for param in program.parameters_of(ParameterCategory::Uniform) {
            secondary_attrs.insert(LogicalRegister {
                name: names.claim(format!("u_{}", param.sanitized_name())),
                base: program.parameter_offset(param),
                width: param.register_width(),
                source: RegisterSource::Uniform,
            });
        }

        for literal in &program.literals {
            secondary_attrs.insert(LogicalRegister {
                name: format!("lit{}", literal.sa_index),
                base: literal.sa_index,
                width: 1,
                source: RegisterSource::Literal(literal.data),
            });
        }

        let prefix = stage_prefix(stage);
        let samplers = program
            .parameters_of(ParameterCategory::Sampler)
            .map(|p| SamplerBinding {
                name: names.claim(format!("{}Tex_{}", prefix, p.sanitized_name())),
                resource_index: p.resource_index.max(0) as u32,
                cube: p.is_sampler_cube(),
            })
            .collect();

        Self {
            stage,
            primary_attrs,
            secondary_attrs,
            outputs: BankLayout::lazy(RegisterBank::Output, "out", 256),
            temps: BankLayout::lazy(RegisterBank::Temp, "r", 256),
            internals: BankLayout::lazy(RegisterBank::FpInternal, "fpi", 64),
            samplers,
        }
    }

    pub fn sampler(&self, resource_index: u32) -> Option<&SamplerBinding> {
        self.samplers.iter().find(|s| s.resource_index == resource_index)
    }

    fn layout_mut(&mut self, bank: RegisterBank) -> Option<&mut BankLayout> {
        match bank {
            RegisterBank::PrimAttr => Some(&mut self.primary_attrs),
            RegisterBank::SecAttr => Some(&mut self.secondary_attrs),
            RegisterBank::Output => Some(&mut self.outputs),
            RegisterBank::Temp => Some(&mut self.temps),
            RegisterBank::FpInternal => Some(&mut self.internals),
            _ => None,
        }
    }

    fn lazy_source(&self, bank: RegisterBank, index: u32) -> RegisterSource {
        match (bank, self.stage) {
            (RegisterBank::PrimAttr, ShaderStage::Fragment) => RegisterSource::Varying {
                location: index / CHUNK_SIZE,
            },
            (RegisterBank::SecAttr, _) => RegisterSource::Uniform,
            _ => RegisterSource::Local,
        }
    }

    /// Storage element holding `flat` in `bank`, allocating on demand
    fn element(&mut self, bank: RegisterBank, flat: u32) -> Option<String> {
        let source = self.lazy_source(bank, flat);
        let layout = self.layout_mut(bank)?;
        match layout.locate(flat, source) {
            Some((reg, offset)) => Some(reg.element(offset)),
            None => {
                shader_warn!("{:?} register {} is out of range", bank, flat);
                None
            }
        }
    }

    /// First flat register of an operand at a repeat offset
    fn operand_base(op: &Operand, repeat_offset: i32) -> Option<u32> {
        let num = i64::from(op.num) + i64::from(repeat_offset);
        let base = if op.bank == RegisterBank::FpInternal { num * CHUNK_SIZE as i64 } else { num };
        u32::try_from(base).ok()
    }

    /// Flat register and sub-register slot of channel `comp`
    fn channel_location(op: &Operand, base: u32, comp: u32) -> (u32, u32) {
        let per_reg = op.dtype.per_register();
        (base + comp / per_reg, comp % per_reg)
    }

    //=========================================================================
    // LOADS
    //=========================================================================

    /// Load the channels of `op` selected by `mask` as a GLSL expression
    ///
    /// The result has one component per set mask bit and the operand's data
    /// type. `None` when the bank has no backing storage or the register is
    /// out of range; callers skip the instruction.
    pub fn load(&mut self, op: &Operand, mask: u8, repeat_offset: i32) -> Option<String> {
        let count = mask_count(mask);
        if count == 0 {
            return None;
        }

        let expr = match op.bank {
            RegisterBank::Immediate => Some(Self::load_immediate(op, mask)),
            RegisterBank::Predicate => {
                let num = i64::from(op.num) + i64::from(repeat_offset);
                (0..4).contains(&num).then(|| format!("p{}", num))
            }
            bank if bank.is_storage() => self.load_storage(op, mask, repeat_offset),
            bank => {
                shader_warn!("Unsupported load from {:?} bank", bank);
                None
            }
        }?;

        Some(apply_modifiers(expr, op))
    }

    fn load_immediate(op: &Operand, mask: u8) -> String {
        let dtype = op.dtype;
        let imm = literal(op.num, dtype);
        let parts: Vec<String> = selected(mask)
            .map(|i| match op.swizzle[i].constant() {
                Some(c) => constant_literal(c, dtype),
                None => imm.clone(),
            })
            .collect();
        construct(dtype, parts)
    }

    fn load_storage(&mut self, op: &Operand, mask: u8, repeat_offset: i32) -> Option<String> {
        let base = Self::operand_base(op, repeat_offset)?;

        // 32-bit types read straight out of one variable when possible
        if op.dtype.bits() == 32 {
            if let Some(direct) = self.load_direct(op, mask, base) {
                return Some(direct);
            }
        }

        let mut parts = Vec::new();
        for i in selected(mask) {
            let channel = op.swizzle[i];
            if let Some(c) = channel.constant() {
                parts.push(constant_literal(c, op.dtype));
                continue;
            }
            let Some(comp) = channel.component() else {
                shader_warn!("Undefined swizzle channel in load from {:?}{}", op.bank, op.num);
                return None;
            };
            let (flat, slot) = Self::channel_location(op, base, comp);
            let elem = self.element(op.bank, flat)?;
            parts.push(read_component(&elem, slot, op.dtype));
        }
        Some(construct(op.dtype, parts))
    }

    /// Swizzle of a single variable, e.g. `r0.xy` or `in0`
    fn load_direct(&mut self, op: &Operand, mask: u8, base: u32) -> Option<String> {
        let mut name = None;
        let mut offsets = Vec::new();
        for i in selected(mask) {
            let comp = op.swizzle[i].component()?;
            let flat = base + comp;
            let source = self.lazy_source(op.bank, flat);
            let layout = self.layout_mut(op.bank)?;
            let (reg, offset) = layout.locate(flat, source)?;
            if reg.width > 4 {
                return None;
            }
            match &name {
                None => name = Some((reg.name.clone(), reg.width)),
                Some((n, _)) if *n == reg.name => {}
                Some(_) => return None,
            }
            offsets.push(offset);
        }
        let (name, width) = name?;

        let identity = offsets.len() as u32 == width && offsets.iter().enumerate().all(|(i, &o)| o == i as u32);
        let expr = if width == 1 || identity {
            name
        } else {
            let swizzle: String = offsets.iter().map(|&o| COMPONENTS[o as usize]).collect();
            format!("{}.{}", name, swizzle)
        };

        Some(match op.dtype {
            DataType::Int32 => format!("floatBitsToInt({})", expr),
            DataType::Uint32 => format!("floatBitsToUint({})", expr),
            _ => expr,
        })
    }

    //=========================================================================
    // STORES
    //=========================================================================

    /// Statements writing `value` into the channels of `op` selected by `mask`
    ///
    /// `value` must have one component per set mask bit and the operand's
    /// data type.
    pub fn store(&mut self, op: &Operand, value: &str, mask: u8, repeat_offset: i32) -> Option<Vec<String>> {
        let count = mask_count(mask);
        if count == 0 {
            return Some(Vec::new());
        }

        match op.bank {
            RegisterBank::Predicate => {
                let num = i64::from(op.num) + i64::from(repeat_offset);
                (0..4).contains(&num).then(|| vec![format!("p{} = {};", num, value)])
            }
            bank if bank.is_storage() => self.store_storage(op, value, mask, repeat_offset),
            bank => {
                shader_warn!("Unsupported store to {:?} bank", bank);
                None
            }
        }
    }

    fn store_storage(&mut self, op: &Operand, value: &str, mask: u8, repeat_offset: i32) -> Option<Vec<String>> {
        let base = Self::operand_base(op, repeat_offset)?;

        if op.dtype.bits() == 32 {
            if let Some(direct) = self.store_direct(op, value, mask, base) {
                return Some(vec![direct]);
            }
        }

        let count = mask_count(mask);
        let mut lines = Vec::new();
        let scalar = if count == 1 {
            value.to_string()
        } else {
            lines.push("{".to_string());
            lines.push(format!("    {} tmp = {};", vector_type(op.dtype, count), value));
            String::new()
        };

        for (k, i) in selected(mask).enumerate() {
            let (flat, slot) = Self::channel_location(op, base, i as u32);
            let elem = self.element(op.bank, flat)?;
            let v = if count == 1 { scalar.clone() } else { format!("tmp.{}", COMPONENTS[k]) };
            let stmt = write_component(&elem, slot, op.dtype, &v);
            lines.push(if count == 1 { stmt } else { format!("    {}", stmt) });
        }

        if count > 1 {
            lines.push("}".to_string());
        }
        Some(lines)
    }

    /// Single assignment when every channel lands in the same variable
    fn store_direct(&mut self, op: &Operand, value: &str, mask: u8, base: u32) -> Option<String> {
        let mut name = None;
        let mut offsets = Vec::new();
        for i in selected(mask) {
            let flat = base + i as u32;
            let source = self.lazy_source(op.bank, flat);
            let layout = self.layout_mut(op.bank)?;
            let (reg, offset) = layout.locate(flat, source)?;
            if reg.width > 4 {
                return None;
            }
            match &name {
                None => name = Some((reg.name.clone(), reg.width)),
                Some((n, _)) if *n == reg.name => {}
                Some(_) => return None,
            }
            offsets.push(offset);
        }
        let (name, width) = name?;

        let identity = offsets.len() as u32 == width && offsets.iter().enumerate().all(|(i, &o)| o == i as u32);
        let target = if width == 1 || identity {
            name
        } else {
            let swizzle: String = offsets.iter().map(|&o| COMPONENTS[o as usize]).collect();
            format!("{}.{}", name, swizzle)
        };

        let value = match op.dtype {
            DataType::Int32 => format!("intBitsToFloat({})", value),
            DataType::Uint32 => format!("uintBitsToFloat({})", value),
            _ => value.to_string(),
        };
        Some(format!("{} = {};", target, value))
    }
}

//=============================================================================
// EXPRESSION HELPERS
//=============================================================================

/// Indices of the set bits of a 4-bit mask, in order
pub fn selected(mask: u8) -> impl Iterator<Item = usize> {
    (0..4).filter(move |i| mask & (1 << i) != 0)
}

pub fn mask_count(mask: u8) -> usize {
    (mask & 0xF).count_ones() as usize
}

/// Scalar GLSL type of a data type
pub fn scalar_type(dtype: DataType) -> &'static str {
    if dtype.is_float() || dtype == DataType::Unk {
        "float"
    } else if dtype.is_signed() {
        "int"
    } else {
        "uint"
    }
}

/// Vector (or scalar, for one component) GLSL type of a data type
pub fn vector_type(dtype: DataType, count: usize) -> String {
    if count <= 1 {
        return scalar_type(dtype).to_string();
    }
    let prefix = match scalar_type(dtype) {
        "int" => "i",
        "uint" => "u",
        _ => "",
    };
    format!("{}vec{}", prefix, count)
}

/// Build a scalar or vector from per-component expressions
pub fn construct(dtype: DataType, parts: Vec<String>) -> String {
    if parts.len() == 1 {
        parts.into_iter().next().unwrap_or_default()
    } else {
        format!("{}({})", vector_type(dtype, parts.len()), parts.join(", "))
    }
}

/// Literal for an immediate register value
pub fn literal(value: u32, dtype: DataType) -> String {
    match scalar_type(dtype) {
        "float" => format!("{}.0", value),
        "uint" => format!("{}u", value),
        _ => format!("{}", value as i32),
    }
}

fn constant_literal(c: f32, dtype: DataType) -> String {
    match scalar_type(dtype) {
        "float" => format!("{:?}", c),
        "uint" => format!("{}u", c as u32),
        _ => format!("{}", c as i32),
    }
}

fn read_component(elem: &str, slot: u32, dtype: DataType) -> String {
    match dtype {
        DataType::F32 | DataType::Unk => elem.to_string(),
        DataType::Int32 => format!("floatBitsToInt({})", elem),
        DataType::Uint32 => format!("floatBitsToUint({})", elem),
        DataType::F16 | DataType::C10 => {
            format!("unpackHalf2x16(floatBitsToUint({})).{}", elem, COMPONENTS[slot as usize])
        }
        DataType::Int16 | DataType::Int8 => {
            format!("bitfieldExtract(floatBitsToInt({}), {}, {})", elem, slot * dtype.bits(), dtype.bits())
        }
        DataType::Uint16 | DataType::Uint8 | DataType::O8 => {
            format!("bitfieldExtract(floatBitsToUint({}), {}, {})", elem, slot * dtype.bits(), dtype.bits())
        }
    }
}

fn write_component(elem: &str, slot: u32, dtype: DataType, value: &str) -> String {
    match dtype {
        DataType::F32 | DataType::Unk => format!("{} = {};", elem, value),
        DataType::Int32 => format!("{} = intBitsToFloat({});", elem, value),
        DataType::Uint32 => format!("{} = uintBitsToFloat({});", elem, value),
        DataType::F16 | DataType::C10 => format!(
            "{0} = uintBitsToFloat(bitfieldInsert(floatBitsToUint({0}), packHalf2x16(vec2({1}, 0.0)), {2}, 16));",
            elem,
            value,
            slot * 16
        ),
        _ => format!(
            "{0} = uintBitsToFloat(bitfieldInsert(floatBitsToUint({0}), uint({1}), {2}, {3}));",
            elem,
            value,
            slot * dtype.bits(),
            dtype.bits()
        ),
    }
}

fn apply_modifiers(expr: String, op: &Operand) -> String {
    let mut expr = expr;
    if op.flags.contains(OperandFlags::ABSOLUTE) && !op.dtype.is_unsigned() {
        expr = format!("abs({})", expr);
    }
    if op.flags.contains(OperandFlags::NEGATIVE) {
        expr = if op.bank == RegisterBank::Predicate {
            format!("!{}", expr)
        } else if op.dtype.is_unsigned() {
            shader_warn!("Ignoring negation of unsigned operand");
            expr
        } else if expr.contains(' ') {
            format!("-({})", expr)
        } else {
            format!("-{}", expr)
        };
    }
    expr
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gxp::builder::{build_program, TestParam, TestProgram};

    fn op(bank: RegisterBank, num: u32, dtype: DataType) -> Operand {
        Operand { bank, num, dtype, ..Default::default() }
    }

    fn vertex_resolver(params: Vec<TestParam>) -> Resolver {
        let blob = build_program(&TestProgram { params, containers: vec![(14, 0)], ..Default::default() });
        Resolver::new(&GxpProgram::parse(&blob).unwrap())
    }

    fn reg(name: &str, base: u32, width: u32) -> LogicalRegister {
        LogicalRegister { name: name.into(), base, width, source: RegisterSource::Local }
    }

    #[test]
    fn test_find_reg_at_unaligned() {
        let mut layout = BankLayout::new(RegisterBank::SecAttr);
        assert!(layout.insert(reg("a", 0, 2)));
        assert!(layout.insert(reg("b", 2, 3)));
        assert!(layout.insert(reg("m", 8, 8)));

        let (r, off) = layout.find_reg_at(3).unwrap();
        assert_eq!((r.name.as_str(), off), ("b", 1));
        let (r, off) = layout.find_reg_at(13).unwrap();
        assert_eq!((r.name.as_str(), off), ("m", 5));
        assert_eq!(r.element(off), "m[1].y");
    }

    #[test]
    fn test_find_reg_at_out_of_range() {
        let mut layout = BankLayout::new(RegisterBank::SecAttr);
        layout.insert(reg("a", 0, 2));
        layout.insert(reg("m", 8, 4));
        assert!(layout.find_reg_at(5).is_none());
        assert!(layout.find_reg_at(12).is_none());
        assert!(layout.find_reg_at(u32::MAX).is_none());
    }

    #[test]
    fn test_insert_rejects_overlap() {
        let mut layout = BankLayout::new(RegisterBank::SecAttr);
        assert!(layout.insert(reg("a", 4, 4)));
        assert!(!layout.insert(reg("b", 6, 1)));
        assert!(!layout.insert(reg("c", 0, 0)));
    }

    #[test]
    fn test_lazy_chunks_fill_gaps() {
        let mut layout = BankLayout::lazy(RegisterBank::SecAttr, "sa", 64);
        layout.insert(reg("u", 1, 2));

        let (r, off) = layout.locate(0, RegisterSource::Uniform).unwrap();
        assert_eq!((r.name.as_str(), r.base, r.width, off), ("sa0_0", 0, 1, 0));
        let (r, _) = layout.locate(3, RegisterSource::Uniform).unwrap();
        assert_eq!((r.name.as_str(), r.base, r.width), ("sa0_3", 3, 1));
        let (r, _) = layout.locate(9, RegisterSource::Uniform).unwrap();
        assert_eq!((r.name.as_str(), r.base, r.width), ("sa2", 8, 4));
        assert!(layout.locate(64, RegisterSource::Uniform).is_none());
    }

    #[test]
    fn test_load_attribute_direct() {
        let mut resolver = vertex_resolver(vec![TestParam::attribute("aPos", 0)]);
        let pa = op(RegisterBank::PrimAttr, 0, DataType::F32);
        assert_eq!(resolver.load(&pa, 0b1111, 0).unwrap(), "in0");
        assert_eq!(resolver.load(&pa, 0b0011, 0).unwrap(), "in0.xy");

        let mut swizzled = pa;
        swizzled.swizzle = [SwizzleChannel::W, SwizzleChannel::One, SwizzleChannel::X, SwizzleChannel::X];
        assert_eq!(resolver.load(&swizzled, 0b0111, 0).unwrap(), "vec3(in0.w, 1.0, in0.x)");
    }

    #[test]
    fn test_load_typed() {
        let mut resolver = vertex_resolver(vec![]);
        let temp = op(RegisterBank::Temp, 2, DataType::Uint32);
        assert_eq!(resolver.load(&temp, 0b0001, 0).unwrap(), "floatBitsToUint(r0.z)");

        let half = op(RegisterBank::Temp, 4, DataType::F16);
        assert_eq!(
            resolver.load(&half, 0b0011, 0).unwrap(),
            "vec2(unpackHalf2x16(floatBitsToUint(r1.x)).x, unpackHalf2x16(floatBitsToUint(r1.x)).y)"
        );

        let byte = op(RegisterBank::Temp, 0, DataType::Uint8);
        let mut byte_w = byte;
        byte_w.swizzle[0] = SwizzleChannel::W;
        assert_eq!(resolver.load(&byte_w, 0b0001, 0).unwrap(), "bitfieldExtract(floatBitsToUint(r0.x), 24, 8)");
    }

    #[test]
    fn test_load_modifiers_and_repeats() {
        let mut resolver = vertex_resolver(vec![]);
        let mut temp = op(RegisterBank::Temp, 0, DataType::F32);
        temp.flags = OperandFlags::ABSOLUTE | OperandFlags::NEGATIVE;
        assert_eq!(resolver.load(&temp, 0b0001, 4).unwrap(), "-abs(r1.x)");

        let fpi = op(RegisterBank::FpInternal, 1, DataType::F32);
        assert_eq!(resolver.load(&fpi, 0b1111, 1).unwrap(), "fpi2");
    }

    #[test]
    fn test_load_immediate_and_unbacked() {
        let mut resolver = vertex_resolver(vec![]);
        let imm = op(RegisterBank::Immediate, 7, DataType::Uint32);
        assert_eq!(resolver.load(&imm, 0b0001, 0).unwrap(), "7u");
        let fimm = op(RegisterBank::Immediate, 2, DataType::F32);
        assert_eq!(resolver.load(&fimm, 0b0011, 0).unwrap(), "vec2(2.0, 2.0)");

        let constant = op(RegisterBank::FpConstant, 3, DataType::F32);
        assert!(resolver.load(&constant, 0b0001, 0).is_none());
    }

    #[test]
    fn test_store_direct_and_typed() {
        let mut resolver = vertex_resolver(vec![]);
        let out = op(RegisterBank::Output, 0, DataType::F32);
        assert_eq!(resolver.store(&out, "in0", 0b1111, 0).unwrap(), vec!["out0 = in0;"]);
        assert_eq!(resolver.store(&out, "v", 0b0110, 0).unwrap(), vec!["out0.yz = v;"]);

        let temp = op(RegisterBank::Temp, 1, DataType::Int32);
        assert_eq!(resolver.store(&temp, "x", 0b0001, 0).unwrap(), vec!["r0.y = intBitsToFloat(x);"]);

        let half = op(RegisterBank::Temp, 0, DataType::F16);
        let lines = resolver.store(&half, "h", 0b0011, 0).unwrap();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[1], "    vec2 tmp = h;");
        assert!(lines[3].contains("packHalf2x16(vec2(tmp.y, 0.0)), 16, 16)"));

        let pred = op(RegisterBank::Predicate, 2, DataType::F32);
        assert_eq!(resolver.store(&pred, "a < b", 0b0001, 0).unwrap(), vec!["p2 = a < b;"]);
    }

    #[test]
    fn test_uniform_and_literal_layout() {
        let blob = build_program(&TestProgram {
            params: vec![TestParam::uniform("tint", 0, 4), TestParam::sampler("diffuse", 2)],
            literals: vec![(4, 0x3F80_0000)],
            containers: vec![(14, 0), (16, 0)],
            ..Default::default()
        });
        let mut resolver = Resolver::new(&GxpProgram::parse(&blob).unwrap());
        let names: Vec<&str> = resolver.secondary_attrs.registers().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["u_tint", "lit4"]);
        assert_eq!(resolver.sampler(2).unwrap().name, "vertTex_diffuse");

        let sa = op(RegisterBank::SecAttr, 4, DataType::F32);
        assert_eq!(resolver.load(&sa, 0b0001, 0).unwrap(), "lit4");
    }

    #[test]
    fn test_uniform_names_do_not_collide() {
        let blob = build_program(&TestProgram {
            params: vec![
                TestParam::uniform("p0", 0, 1),
                TestParam::uniform("m.x", 1, 1),
                TestParam::uniform("m_x", 2, 1),
                TestParam::uniform("lights[2].color", 4, 4),
            ],
            containers: vec![(14, 0)],
            ..Default::default()
        });
        let resolver = Resolver::new(&GxpProgram::parse(&blob).unwrap());
        let names: Vec<&str> = resolver.secondary_attrs.registers().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["u_p0", "u_m_x", "u_m_x_2", "u_lights_2_color"]);
        assert!(names.iter().all(|n| !n.contains("__")));
    }
}
