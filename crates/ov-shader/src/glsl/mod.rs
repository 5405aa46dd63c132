//! GLSL code generation
//!
//! [`GlslGenerator`] turns a parsed program into GLSL 4.50 source. Every
//! USSE register bank is backed by module-scope float variables laid out by
//! the [`Resolver`]; the generated `main` fills them from the pipeline
//! inputs, runs the secondary program and then the primary program, and
//! finally copies the output bank to the pipeline outputs.
//!
//! Instruction bodies are generated first because they allocate registers.
//! Declarations are written afterwards from the final bank layouts.

pub mod handlers;
pub mod writer;

pub use writer::CodeWriter;

use crate::decoder;
use crate::disasm;
use crate::gxp::GxpProgram;
use crate::resolver::{stage_prefix, LogicalRegister, RegisterSource, Resolver, CHUNK_SIZE};
use crate::types::*;
use ov_core::error::{DecodeError, ShaderError};
use ov_core::{shader_debug, shader_error};
use std::collections::BTreeSet;

const GLSL_VERSION: &str = "#version 450";

const COMPONENTS: [char; 4] = ['x', 'y', 'z', 'w'];

/// First texture unit used by vertex program samplers
const VERTEX_SAMPLER_BASE: u32 = 16;

/// Texture unit of the colour attachment when it is read through a sampler
const COLOR_ATTACHMENT_UNIT: u32 = 32;

/// Value of an attribute whose location has no buffer bound
const UNBOUND_ATTRIBUTE: &str = "vec4(0.0, 0.0, 0.0, 1.0)";

//=============================================================================
// EMIT CONTEXT
//=============================================================================

/// State handed to the per-family handlers
pub struct EmitContext<'a> {
    resolver: &'a mut Resolver,
    stage: ShaderStage,
    features: FeatureFlags,
    lines: Vec<String>,
}

impl<'a> EmitContext<'a> {
    pub fn new(resolver: &'a mut Resolver, stage: ShaderStage, features: FeatureFlags) -> Self {
        Self {
            resolver,
            stage,
            features,
            lines: Vec::new(),
        }
    }

    fn load(&mut self, op: &Operand, mask: u8, repeat_offset: i32) -> Result<String, String> {
        self.resolver
            .load(op, mask, repeat_offset)
            .ok_or_else(|| format!("cannot load {}", disasm::operand_to_str(op, mask)))
    }

    fn store(&mut self, op: &Operand, value: &str, mask: u8, repeat_offset: i32) -> Result<(), String> {
        let lines = self
            .resolver
            .store(op, value, mask, repeat_offset)
            .ok_or_else(|| format!("cannot store {}", disasm::operand_to_str(op, mask)))?;
        self.lines.extend(lines);
        Ok(())
    }
}

//=============================================================================
// GENERATOR
//=============================================================================

/// How a native-colour fragment program sees the current framebuffer colour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColorReadback {
    /// Read and written through an image inside an interlocked section
    Interlock,
    /// Fetched from a sampler bound to the attachment
    TextureFetch,
}

/// Translates one program into GLSL source
pub struct GlslGenerator<'a> {
    program: &'a GxpProgram,
    hints: Hints,
    features: FeatureFlags,
    resolver: Resolver,
}

impl<'a> GlslGenerator<'a> {
    pub fn new(program: &'a GxpProgram, hints: Hints, features: FeatureFlags) -> Self {
        Self {
            program,
            hints,
            features,
            resolver: Resolver::new(program),
        }
    }

    /// Generate the complete shader source
    pub fn generate(mut self) -> Result<String, ShaderError> {
        let secondary = decode(&self.program.secondary_words()?, true)?;
        let primary = decode(&self.program.primary_words()?, false)?;

        let secondary_fn = (!secondary.is_empty()).then(|| self.emit_function("secondary_program", &secondary));
        let primary_fn = self.emit_function("primary_program", &primary);

        if self.program.stage == ShaderStage::Fragment {
            // The epilogue reads the colour from o0 even if nothing wrote it
            let _ = self.resolver.outputs.locate(0, RegisterSource::Local);
        }

        let mut w = CodeWriter::new();
        self.write_header(&mut w);
        self.write_interface(&mut w);
        self.write_registers(&mut w);

        let has_secondary = secondary_fn.is_some();
        if let Some(f) = secondary_fn {
            w.append(f);
            w.blank();
        }
        w.append(primary_fn);
        w.blank();

        w.open("void main()");
        self.write_preload(&mut w);
        if has_secondary {
            w.line("secondary_program();");
        }
        w.line("primary_program();");
        self.write_epilogue(&mut w);
        w.close();

        let source = w.finish();
        shader_debug!(
            "Generated {:?} program: {} instructions, {} lines",
            self.program.stage,
            primary.len() + secondary.len(),
            source.lines().count()
        );
        Ok(source)
    }

    //=========================================================================
    // BODIES
    //=========================================================================

    fn emit_function(&mut self, name: &str, insts: &[Instruction]) -> CodeWriter {
        let mut w = CodeWriter::new();
        w.open(format!("void {}()", name));
        self.emit_body(&mut w, insts);
        w.close();
        w
    }

    /// Straight-line code, or a `pc` dispatch loop when the program branches
    fn emit_body(&mut self, w: &mut CodeWriter, insts: &[Instruction]) {
        let targets = branch_targets(insts);
        if targets.is_empty() {
            for inst in insts {
                self.emit_instruction(w, inst);
            }
            return;
        }

        w.line("uint pc = 0u;");
        w.open("while (true)");
        w.open("switch (pc)");
        let mut in_case = false;
        for inst in insts {
            if inst.pc == 0 || targets.contains(&inst.pc) {
                if in_case {
                    w.dedent();
                }
                w.line(format!("case {}u:", inst.pc));
                w.indent();
                in_case = true;
            }
            self.emit_instruction(w, inst);
        }
        if in_case {
            w.dedent();
        }
        // Falling off the end or jumping past it leaves the program
        w.line("default:");
        w.indent();
        w.line("return;");
        w.dedent();
        w.close();
        w.close();
    }

    /// Emit one instruction behind its predicate guard
    ///
    /// An instruction that cannot be translated becomes a comment and the
    /// rest of the program still gets generated.
    fn emit_instruction(&mut self, w: &mut CodeWriter, inst: &Instruction) {
        if let Detail::Skipped { reason } = &inst.detail {
            w.line(format!("// skipped: {}", reason));
            return;
        }

        let mut ctx = EmitContext::new(&mut self.resolver, self.program.stage, self.features);
        match handlers::emit(&mut ctx, inst) {
            Ok(lines) if lines.is_empty() => {}
            Ok(lines) => match inst.predicate.register() {
                Some((num, negated)) => {
                    w.open(format!("if ({}p{})", if negated { "!" } else { "" }, num));
                    w.lines(lines);
                    w.close();
                }
                None => w.lines(lines),
            },
            Err(reason) => {
                let text = disasm::instruction_to_str(inst);
                shader_error!("{}: {}", text, reason);
                w.line(format!("// skipped: {}: {}", text, reason));
            }
        }
    }

    //=========================================================================
    // DECLARATIONS
    //=========================================================================

    fn color_readback(&self) -> Option<ColorReadback> {
        if self.program.stage != ShaderStage::Fragment
            || !self.program.native_color
            || self.features.contains(FeatureFlags::DIRECT_FRAGCOLOR)
        {
            return None;
        }
        if self.features.contains(FeatureFlags::SHADER_INTERLOCK) {
            Some(ColorReadback::Interlock)
        } else if self.features.contains(FeatureFlags::TEXTURE_BARRIER) {
            Some(ColorReadback::TextureFetch)
        } else {
            None
        }
    }

    fn writes_mask(&self) -> bool {
        self.program.stage == ShaderStage::Fragment
            && self.hints.mask_update
            && self.features.contains(FeatureFlags::MASK_BIT)
    }

    fn attribute_bound(&self, location: u32) -> bool {
        location < 32 && self.hints.attribute_mask & (1 << location) != 0
    }

    fn write_header(&self, w: &mut CodeWriter) {
        w.line(GLSL_VERSION);
        if self.color_readback() == Some(ColorReadback::Interlock) {
            w.line("#extension GL_ARB_fragment_shader_interlock : require");
        }
        w.blank();
    }

    fn write_interface(&self, w: &mut CodeWriter) {
        let stage = self.program.stage;
        let prefix = stage_prefix(stage);

        match stage {
            ShaderStage::Vertex => {
                for reg in self.resolver.primary_attrs.registers() {
                    if let RegisterSource::Attribute { location, .. } = reg.source {
                        if self.attribute_bound(location) {
                            w.line(format!("layout(location = {0}) in vec4 attr{0};", location));
                        }
                    }
                }
                for (slot, _) in self.varying_outputs() {
                    w.line(format!("layout(location = {}) out vec4 v_out{};", slot - 1, slot));
                }
            }
            ShaderStage::Fragment => {
                for reg in self.resolver.primary_attrs.registers() {
                    if let RegisterSource::Varying { location } = reg.source {
                        w.line(format!("layout(location = {0}) in vec4 v_in{0};", location));
                    }
                }
                match self.color_readback() {
                    Some(ColorReadback::Interlock) => {
                        w.line("layout(pixel_interlock_ordered) in;");
                        w.line(format!(
                            "layout(binding = 0, {}) uniform coherent image2D f_colorAttachment;",
                            image_format(self.hints.color_format)
                        ));
                    }
                    Some(ColorReadback::TextureFetch) => {
                        w.line(format!(
                            "layout(binding = {}) uniform sampler2D f_colorAttachment;",
                            COLOR_ATTACHMENT_UNIT
                        ));
                        w.line("layout(location = 0) out vec4 out_color;");
                    }
                    None => w.line("layout(location = 0) out vec4 out_color;"),
                }
                if self.writes_mask() {
                    w.line("layout(location = 1) out float out_mask;");
                }
            }
        }

        let uniform_end = self
            .resolver
            .secondary_attrs
            .registers()
            .iter()
            .filter(|r| r.source == RegisterSource::Uniform)
            .map(LogicalRegister::end)
            .max();
        if let Some(end) = uniform_end {
            let (binding, block) = match stage {
                ShaderStage::Vertex => (0, "VertUniforms"),
                ShaderStage::Fragment => (1, "FragUniforms"),
            };
            w.open(format!("layout(std140, binding = {}) uniform {}", binding, block));
            w.line(format!("vec4 {}_uniforms[{}];", prefix, end.div_ceil(CHUNK_SIZE)));
            w.dedent();
            w.line("};");
        }

        for sampler in &self.resolver.samplers {
            let unit = match stage {
                ShaderStage::Vertex => VERTEX_SAMPLER_BASE + sampler.resource_index,
                ShaderStage::Fragment => sampler.resource_index,
            };
            let ty = if sampler.cube { "samplerCube" } else { "sampler2D" };
            w.line(format!("layout(binding = {}) uniform {} {};", unit, ty, sampler.name));
        }
        w.blank();
    }

    fn banks(&self) -> [&crate::resolver::BankLayout; 5] {
        [
            &self.resolver.primary_attrs,
            &self.resolver.secondary_attrs,
            &self.resolver.outputs,
            &self.resolver.temps,
            &self.resolver.internals,
        ]
    }

    fn write_registers(&self, w: &mut CodeWriter) {
        for p in 0..4 {
            w.line(format!("bool p{} = false;", p));
        }
        for bank in self.banks() {
            for reg in bank.registers() {
                w.line(format!("{} = {};", reg.declaration(), reg.zero_value()));
            }
        }
        w.blank();
    }

    /// Whole-chunk output registers past o0, with their varying slot
    fn varying_outputs(&self) -> impl Iterator<Item = (u32, &LogicalRegister)> {
        self.resolver
            .outputs
            .registers()
            .iter()
            .filter(|r| r.width == CHUNK_SIZE && r.base % CHUNK_SIZE == 0 && r.base >= CHUNK_SIZE)
            .map(|r| (r.base / CHUNK_SIZE, r))
    }

    /// Name of the full `vec4` register at o0, if there is one
    fn color_register(&self) -> Option<&LogicalRegister> {
        match self.resolver.outputs.find_reg_at(0) {
            Some((reg, 0)) if reg.width == CHUNK_SIZE => Some(reg),
            _ => None,
        }
    }

    //=========================================================================
    // PRELOAD AND EPILOGUE
    //=========================================================================

    fn write_preload(&self, w: &mut CodeWriter) {
        for reg in self.resolver.primary_attrs.registers() {
            match reg.source {
                RegisterSource::Attribute { location, dtype } => {
                    let src = if self.attribute_bound(location) {
                        format!("attr{}", location)
                    } else {
                        UNBOUND_ATTRIBUTE.to_string()
                    };
                    w.lines(attribute_preload(reg, &src, dtype));
                }
                RegisterSource::Varying { location } => {
                    w.lines(vector_preload(reg, |flat| format!("v_in{}.{}", location, COMPONENTS[(flat % 4) as usize])));
                }
                _ => {}
            }
        }

        let prefix = stage_prefix(self.program.stage);
        for reg in self.resolver.secondary_attrs.registers() {
            match reg.source {
                RegisterSource::Uniform => {
                    if reg.base % CHUNK_SIZE == 0 && reg.width % CHUNK_SIZE == 0 {
                        let first = reg.base / CHUNK_SIZE;
                        if reg.width == CHUNK_SIZE {
                            w.line(format!("{} = {}_uniforms[{}];", reg.name, prefix, first));
                        } else {
                            for i in 0..reg.array_len() {
                                w.line(format!("{}[{}] = {}_uniforms[{}];", reg.name, i, prefix, first + i));
                            }
                        }
                    } else {
                        w.lines(vector_preload(reg, |flat| {
                            format!("{}_uniforms[{}].{}", prefix, flat / 4, COMPONENTS[(flat % 4) as usize])
                        }));
                    }
                }
                RegisterSource::Literal(data) => {
                    w.line(format!("{} = uintBitsToFloat({:#010x}u);", reg.name, data));
                }
                _ => {}
            }
        }

        if let Some(readback) = self.color_readback() {
            match readback {
                ColorReadback::Interlock => {
                    w.line("beginInvocationInterlockARB();");
                    w.line("vec4 last_color = imageLoad(f_colorAttachment, ivec2(gl_FragCoord.xy));");
                }
                ColorReadback::TextureFetch => {
                    w.line("vec4 last_color = texelFetch(f_colorAttachment, ivec2(gl_FragCoord.xy), 0);");
                }
            }
            if let Some(reg) = self.color_register() {
                w.lines(pack_color(&reg.name, "last_color", self.hints.color_format));
            }
        }
    }

    fn write_epilogue(&self, w: &mut CodeWriter) {
        match self.program.stage {
            ShaderStage::Vertex => {
                match self.color_register() {
                    Some(reg) => w.line(format!("gl_Position = {};", reg.name)),
                    None => w.line("gl_Position = vec4(0.0, 0.0, 0.0, 1.0);"),
                }
                for (slot, reg) in self.varying_outputs() {
                    w.line(format!("v_out{} = {};", slot, reg.name));
                }
            }
            ShaderStage::Fragment => {
                let color = match self.color_register() {
                    Some(reg) => unpack_color(&reg.name, self.hints.color_format),
                    None => "vec4(0.0)".to_string(),
                };
                w.line(format!("vec4 result_color = {};", color));
                match self.color_readback() {
                    Some(ColorReadback::Interlock) => {
                        w.line("imageStore(f_colorAttachment, ivec2(gl_FragCoord.xy), result_color);");
                        w.line("endInvocationInterlockARB();");
                    }
                    _ => w.line("out_color = result_color;"),
                }
                if self.writes_mask() {
                    w.line("out_mask = result_color.a >= 0.5 ? 1.0 : 0.0;");
                }
            }
        }
    }
}

//=============================================================================
// HELPERS
//=============================================================================

fn decode(words: &[u64], secondary: bool) -> Result<Vec<Instruction>, DecodeError> {
    if words.is_empty() {
        return Ok(Vec::new());
    }
    decoder::decode_program(words, secondary)
}

/// Program counters that some branch jumps to
fn branch_targets(insts: &[Instruction]) -> BTreeSet<u32> {
    insts
        .iter()
        .filter_map(|inst| match inst.detail {
            Detail::Branch { target: Some(target), link: false } => Some(target),
            _ => None,
        })
        .collect()
}

/// Per-register assignments of a register from `source(flat_index)`
fn vector_preload(reg: &LogicalRegister, source: impl Fn(u32) -> String) -> Vec<String> {
    (0..reg.width)
        .map(|j| format!("{} = {};", reg.element(j), source(reg.base + j)))
        .collect()
}

/// Copy a `vec4` vertex attribute into its registers, packing narrow types
fn attribute_preload(reg: &LogicalRegister, src: &str, dtype: DataType) -> Vec<String> {
    if matches!(dtype, DataType::F32 | DataType::Unk) {
        if reg.width == CHUNK_SIZE {
            return vec![format!("{} = {};", reg.name, src)];
        }
        return (0..reg.width)
            .map(|j| format!("{} = {}.{};", reg.element(j), src, COMPONENTS[j as usize]))
            .collect();
    }

    (0..reg.width)
        .map(|j| format!("{} = {};", reg.element(j), pack_attribute(src, dtype, j)))
        .collect()
}

/// Register `index` of an attribute of `dtype`, built from the float input
fn pack_attribute(src: &str, dtype: DataType, index: u32) -> String {
    let per = dtype.per_register();
    let comps: Vec<char> = (index * per..(index + 1) * per)
        .filter(|&c| c < 4)
        .map(|c| COMPONENTS[c as usize])
        .collect();
    let Some(&first) = comps.first() else {
        return "0.0".to_string();
    };

    match dtype {
        DataType::F16 | DataType::C10 => {
            let second = comps.get(1).map(|c| format!("{}.{}", src, c)).unwrap_or_else(|| "0.0".into());
            format!("uintBitsToFloat(packHalf2x16(vec2({}.{}, {})))", src, first, second)
        }
        DataType::Int32 => format!("intBitsToFloat(int({}.{}))", src, first),
        DataType::Uint32 => format!("uintBitsToFloat(uint({}.{}))", src, first),
        _ => {
            let bits = dtype.bits();
            let mask = (1u32 << bits) - 1;
            let parts: Vec<String> = comps
                .iter()
                .enumerate()
                .map(|(k, c)| {
                    let raw = if dtype.is_signed() {
                        format!("uint(int({}.{}))", src, c)
                    } else {
                        format!("uint({}.{})", src, c)
                    };
                    let shift = k as u32 * bits;
                    if shift == 0 {
                        format!("({} & {:#x}u)", raw, mask)
                    } else {
                        format!("(({} & {:#x}u) << {})", raw, mask, shift)
                    }
                })
                .collect();
            format!("uintBitsToFloat({})", parts.join(" | "))
        }
    }
}

fn image_format(format: ColorFormat) -> &'static str {
    match format {
        ColorFormat::U8U8U8U8 => "rgba8",
        ColorFormat::F16F16F16F16 => "rgba16f",
        ColorFormat::F32F32F32F32 => "rgba32f",
    }
}

/// Colour stored in the output register, as a `vec4`
fn unpack_color(reg: &str, format: ColorFormat) -> String {
    match format {
        ColorFormat::U8U8U8U8 => format!("unpackUnorm4x8(floatBitsToUint({}.x))", reg),
        ColorFormat::F16F16F16F16 => format!(
            "vec4(unpackHalf2x16(floatBitsToUint({0}.x)), unpackHalf2x16(floatBitsToUint({0}.y)))",
            reg
        ),
        ColorFormat::F32F32F32F32 => reg.to_string(),
    }
}

/// Statements storing the `vec4` `color` into the output register
fn pack_color(reg: &str, color: &str, format: ColorFormat) -> Vec<String> {
    match format {
        ColorFormat::U8U8U8U8 => vec![format!("{}.x = uintBitsToFloat(packUnorm4x8({}));", reg, color)],
        ColorFormat::F16F16F16F16 => vec![
            format!("{}.x = uintBitsToFloat(packHalf2x16({}.xy));", reg, color),
            format!("{}.y = uintBitsToFloat(packHalf2x16({}.zw));", reg, color),
        ],
        ColorFormat::F32F32F32F32 => vec![format!("{} = {};", reg, color)],
    }
}

/// Translate a program with the given hints and renderer features
pub fn generate(program: &GxpProgram, hints: Hints, features: FeatureFlags) -> Result<String, ShaderError> {
    GlslGenerator::new(program, hints, features).generate()
}
