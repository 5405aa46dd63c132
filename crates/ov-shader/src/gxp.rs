//! GXP program container parsing
//!
//! A GXP blob carries the USSE primary and secondary programs together with
//! the parameter table (attributes, uniforms, samplers), the literal table
//! that preloads secondary-attribute constants, and the container table that
//! places uniform blocks in the secondary-attribute bank.
//!
//! Offsets inside the header are relative to the field that stores them.

use crate::decoder::{self, WORD_SIZE};
use crate::types::{DataType, ShaderStage};
use bytemuck::{Pod, Zeroable};
use ov_core::error::{DecodeError, ShaderError};
use ov_core::shader_warn;
use sha2::{Digest, Sha256};
use std::ops::Range;

/// Container magic, `"GXP\0"`
pub const GXP_MAGIC: [u8; 4] = *b"GXP\0";

/// Size of the fixed header, up to and including the container table offset
pub const HEADER_SIZE: usize = 0x98;

/// Container holding the literal table, with [`DATA_CONTAINER`] as fallback
pub const LITERAL_CONTAINER: u16 = 16;
pub const DATA_CONTAINER: u16 = 19;

mod offsets {
    pub const MAJOR_VERSION: usize = 0x04;
    pub const MINOR_VERSION: usize = 0x05;
    pub const SIZE: usize = 0x08;
    pub const TYPE: usize = 0x14;
    pub const PARAMETER_COUNT: usize = 0x24;
    pub const PARAMETERS: usize = 0x28;
    pub const PRIMARY_REG_COUNT: usize = 0x30;
    pub const SECONDARY_REG_COUNT: usize = 0x32;
    pub const TEMP_REG_COUNT1: usize = 0x34;
    pub const TEMP_REG_COUNT2: usize = 0x38;
    pub const PRIMARY_INSTR_COUNT: usize = 0x3C;
    pub const PRIMARY_PROGRAM: usize = 0x40;
    pub const SECONDARY_PROGRAM: usize = 0x48;
    pub const SECONDARY_PROGRAM_END: usize = 0x4C;
    pub const LITERALS_COUNT: usize = 0x70;
    pub const LITERALS: usize = 0x74;
    pub const CONTAINER_COUNT: usize = 0x90;
    pub const CONTAINERS: usize = 0x94;
}

//=============================================================================
// RAW RECORDS
//=============================================================================

/// On-disk parameter record
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct RawParameter {
    name_offset: i32,
    packed: u16,
    semantic: u16,
    array_size: u32,
    resource_index: i32,
}

/// On-disk container record
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct RawContainer {
    container_index: u16,
    unk02: u16,
    base_sa_offset: u16,
    max_resource_index: u16,
}

const PARAMETER_RECORD_SIZE: usize = std::mem::size_of::<RawParameter>();
const CONTAINER_RECORD_SIZE: usize = std::mem::size_of::<RawContainer>();
const LITERAL_RECORD_SIZE: usize = 8;

fn slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8], ShaderError> {
    let end = offset.checked_add(len).ok_or(ShaderError::Truncated {
        needed: usize::MAX,
        available: data.len(),
    })?;
    data.get(offset..end).ok_or(ShaderError::Truncated {
        needed: end,
        available: data.len(),
    })
}

fn read_u8(data: &[u8], offset: usize) -> Result<u8, ShaderError> {
    Ok(slice(data, offset, 1)?[0])
}

fn read_u16(data: &[u8], offset: usize) -> Result<u16, ShaderError> {
    let b = slice(data, offset, 2)?;
    Ok(u16::from_le_bytes([b[0], b[1]]))
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32, ShaderError> {
    let b = slice(data, offset, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Resolve an offset stored relative to its own field
fn relative(field: usize, value: u32) -> usize {
    field.wrapping_add(value as usize)
}

fn read_record<T: Pod>(data: &[u8], offset: usize) -> Result<T, ShaderError> {
    let bytes = slice(data, offset, std::mem::size_of::<T>())?;
    Ok(bytemuck::pod_read_unaligned(bytes))
}

fn read_cstr(data: &[u8], offset: usize) -> Result<String, ShaderError> {
    let tail = data.get(offset..).ok_or(ShaderError::Truncated {
        needed: offset,
        available: data.len(),
    })?;
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    Ok(String::from_utf8_lossy(&tail[..end]).into_owned())
}

//=============================================================================
// PARAMETERS
//=============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterCategory {
    Attribute,
    Uniform,
    Sampler,
    AuxiliarySurface,
    UniformBuffer,
    Unknown(u8),
}

impl From<u8> for ParameterCategory {
    fn from(v: u8) -> Self {
        match v {
            0 => ParameterCategory::Attribute,
            1 => ParameterCategory::Uniform,
            2 => ParameterCategory::Sampler,
            3 => ParameterCategory::AuxiliarySurface,
            4 => ParameterCategory::UniformBuffer,
            other => ParameterCategory::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterType {
    F32,
    F16,
    C10,
    U32,
    S32,
    U16,
    S16,
    U8,
    S8,
    Aggregate,
    Unknown(u8),
}

impl From<u8> for ParameterType {
    fn from(v: u8) -> Self {
        match v {
            0 => ParameterType::F32,
            1 => ParameterType::F16,
            2 => ParameterType::C10,
            3 => ParameterType::U32,
            4 => ParameterType::S32,
            5 => ParameterType::U16,
            6 => ParameterType::S16,
            7 => ParameterType::U8,
            8 => ParameterType::S8,
            9 => ParameterType::Aggregate,
            other => ParameterType::Unknown(other),
        }
    }
}

impl ParameterType {
    /// Register data type used to store the parameter
    pub const fn data_type(self) -> DataType {
        match self {
            Self::F16 => DataType::F16,
            Self::C10 => DataType::C10,
            Self::U32 => DataType::Uint32,
            Self::S32 => DataType::Int32,
            Self::U16 => DataType::Uint16,
            Self::S16 => DataType::Int16,
            Self::U8 => DataType::Uint8,
            Self::S8 => DataType::Int8,
            Self::F32 | Self::Aggregate | Self::Unknown(_) => DataType::F32,
        }
    }

    /// Size of one component in bytes
    pub const fn size(self) -> u32 {
        match self {
            Self::F16 | Self::C10 | Self::U16 | Self::S16 => 2,
            Self::U8 | Self::S8 => 1,
            _ => 4,
        }
    }
}

/// One entry of the parameter table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramParameter {
    pub name: String,
    pub category: ParameterCategory,
    pub ptype: ParameterType,
    pub component_count: u8,
    pub container_index: u8,
    pub semantic: u16,
    pub array_size: u32,
    pub resource_index: i32,
}

impl ProgramParameter {
    /// Name usable as a GLSL identifier
    ///
    /// Struct members and array subscripts collapse into underscores, so
    /// `lights[2].color` becomes `lights_2_color`.
    pub fn sanitized_name(&self) -> String {
        sanitize_identifier(&self.name)
    }

    /// Number of 32-bit registers one element occupies
    pub fn element_registers(&self) -> u32 {
        let size = self.ptype.size();
        let bytes = u32::from(self.component_count.max(1)) * size;
        let mut regs = bytes.div_ceil(4);
        if self.array_size > 1 && self.ptype.data_type().is_float() && self.component_count > 1 {
            regs = regs.next_multiple_of(2);
        }
        regs
    }

    /// Number of 32-bit registers the whole parameter occupies
    pub fn register_width(&self) -> u32 {
        self.element_registers() * self.array_size.max(1)
    }

    pub fn is_sampler_cube(&self) -> bool {
        (self.semantic >> 12) & 1 != 0
    }
}

/// Turn an arbitrary parameter name into an identifier fragment
///
/// Runs of characters that cannot appear in a GLSL identifier become one
/// underscore, and underscores at either end are dropped, so the result
/// never contains `__`. Callers prefix it before declaring anything.
pub fn sanitize_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if c.is_ascii_alphanumeric() { c } else { '_' };
        if c == '_' && (out.is_empty() || out.ends_with('_')) {
            continue;
        }
        out.push(c);
    }
    if out.ends_with('_') {
        out.pop();
    }
    if out.is_empty() {
        out.push_str("unnamed");
    }
    out
}

/// A uniform container placing parameters in the secondary-attribute bank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterContainer {
    pub index: u16,
    pub base_sa_offset: u16,
    pub max_resource_index: u16,
}

/// A constant preloaded into a secondary-attribute register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Literal {
    /// Flat secondary-attribute register index
    pub sa_index: u32,
    /// Raw 32-bit value
    pub data: u32,
}

//=============================================================================
// PROGRAM
//=============================================================================

/// A parsed GXP program
#[derive(Debug, Clone)]
pub struct GxpProgram {
    bytes: Vec<u8>,
    pub stage: ShaderStage,
    pub version: (u8, u8),
    pub native_color: bool,
    pub reg_format: bool,
    pub primary_reg_count: u16,
    pub secondary_reg_count: u16,
    pub temp_reg_count: u16,
    pub parameters: Vec<ProgramParameter>,
    pub containers: Vec<ParameterContainer>,
    pub literals: Vec<Literal>,
    primary: Range<usize>,
    secondary: Range<usize>,
}

impl GxpProgram {
    /// Parse a program blob
    pub fn parse(data: &[u8]) -> Result<Self, ShaderError> {
        let magic: [u8; 4] = slice(data, 0, 4)?.try_into().map_err(|_| ShaderError::Truncated {
            needed: 4,
            available: data.len(),
        })?;
        if magic != GXP_MAGIC {
            return Err(ShaderError::BadMagic(magic));
        }
        if data.len() < HEADER_SIZE {
            return Err(ShaderError::Truncated {
                needed: HEADER_SIZE,
                available: data.len(),
            });
        }

        let size = read_u32(data, offsets::SIZE)? as usize;
        if size > data.len() {
            return Err(ShaderError::Truncated {
                needed: size,
                available: data.len(),
            });
        }

        let type_byte = read_u8(data, offsets::TYPE)?;
        let stage = if type_byte & 1 != 0 { ShaderStage::Fragment } else { ShaderStage::Vertex };

        let containers = Self::parse_containers(data)?;
        let parameters = Self::parse_parameters(data)?;
        let literals = Self::parse_literals(data, &containers)?;

        let primary_start = relative(offsets::PRIMARY_PROGRAM, read_u32(data, offsets::PRIMARY_PROGRAM)?);
        let primary_count = read_u32(data, offsets::PRIMARY_INSTR_COUNT)? as usize;
        let primary = primary_start..primary_start.saturating_add(primary_count.saturating_mul(WORD_SIZE));

        let secondary_start = relative(offsets::SECONDARY_PROGRAM, read_u32(data, offsets::SECONDARY_PROGRAM)?);
        let secondary_end =
            relative(offsets::SECONDARY_PROGRAM_END, read_u32(data, offsets::SECONDARY_PROGRAM_END)?);
        let secondary = secondary_start..secondary_end.max(secondary_start);

        let temp1 = read_u16(data, offsets::TEMP_REG_COUNT1)?;
        let temp2 = read_u16(data, offsets::TEMP_REG_COUNT2)?;

        Ok(Self {
            bytes: data.to_vec(),
            stage,
            version: (read_u8(data, offsets::MAJOR_VERSION)?, read_u8(data, offsets::MINOR_VERSION)?),
            native_color: type_byte & 0x40 != 0,
            reg_format: type_byte & 0x80 != 0,
            primary_reg_count: read_u16(data, offsets::PRIMARY_REG_COUNT)?,
            secondary_reg_count: read_u16(data, offsets::SECONDARY_REG_COUNT)?,
            temp_reg_count: temp1.max(temp2),
            parameters,
            containers,
            literals,
            primary,
            secondary,
        })
    }

    fn parse_parameters(data: &[u8]) -> Result<Vec<ProgramParameter>, ShaderError> {
        let count = read_u32(data, offsets::PARAMETER_COUNT)? as usize;
        let base = relative(offsets::PARAMETERS, read_u32(data, offsets::PARAMETERS)?);

        let mut out = Vec::with_capacity(count.min(256));
        for i in 0..count {
            let offset = base + i * PARAMETER_RECORD_SIZE;
            let raw: RawParameter = read_record(data, offset)?;
            let name = read_cstr(data, offset.wrapping_add(raw.name_offset as isize as usize))?;
            out.push(ProgramParameter {
                name,
                category: ParameterCategory::from((raw.packed & 0xF) as u8),
                ptype: ParameterType::from(((raw.packed >> 4) & 0xF) as u8),
                component_count: ((raw.packed >> 8) & 0xF) as u8,
                container_index: ((raw.packed >> 12) & 0xF) as u8,
                semantic: raw.semantic,
                array_size: raw.array_size,
                resource_index: raw.resource_index,
            });
        }
        Ok(out)
    }

    fn parse_containers(data: &[u8]) -> Result<Vec<ParameterContainer>, ShaderError> {
        let count = read_u32(data, offsets::CONTAINER_COUNT)? as usize;
        let base = relative(offsets::CONTAINERS, read_u32(data, offsets::CONTAINERS)?);
        (0..count)
            .map(|i| {
                let raw: RawContainer = read_record(data, base + i * CONTAINER_RECORD_SIZE)?;
                Ok(ParameterContainer {
                    index: raw.container_index,
                    base_sa_offset: raw.base_sa_offset,
                    max_resource_index: raw.max_resource_index,
                })
            })
            .collect()
    }

    fn parse_literals(data: &[u8], containers: &[ParameterContainer]) -> Result<Vec<Literal>, ShaderError> {
        let count = read_u32(data, offsets::LITERALS_COUNT)? as usize;
        if count == 0 {
            return Ok(Vec::new());
        }

        let container = containers
            .iter()
            .find(|c| c.index == LITERAL_CONTAINER)
            .or_else(|| containers.iter().find(|c| c.index == DATA_CONTAINER));
        let Some(container) = container else {
            shader_warn!("No container for {} literals, skipping them", count);
            return Ok(Vec::new());
        };

        let base = relative(offsets::LITERALS, read_u32(data, offsets::LITERALS)?);
        (0..count)
            .map(|i| {
                let offset = base + i * LITERAL_RECORD_SIZE;
                Ok(Literal {
                    sa_index: u32::from(container.base_sa_offset) + read_u32(data, offset)?,
                    data: read_u32(data, offset + 4)?,
                })
            })
            .collect()
    }

    pub fn container(&self, index: u16) -> Option<&ParameterContainer> {
        self.containers.iter().find(|c| c.index == index)
    }

    /// Flat register index of an attribute or uniform parameter
    pub fn parameter_offset(&self, param: &ProgramParameter) -> u32 {
        let base = self
            .container(u16::from(param.container_index))
            .map(|c| u32::from(c.base_sa_offset))
            .unwrap_or(0);
        (base as i64 + i64::from(param.resource_index)).max(0) as u32
    }

    pub fn parameters_of(&self, category: ParameterCategory) -> impl Iterator<Item = &ProgramParameter> {
        self.parameters.iter().filter(move |p| p.category == category)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// SHA-256 of the whole blob
    pub fn hash(&self) -> [u8; 32] {
        Sha256::digest(&self.bytes).into()
    }

    fn words(&self, range: &Range<usize>) -> Result<Vec<u64>, DecodeError> {
        let code = self.bytes.get(range.clone()).ok_or(DecodeError::OutOfBounds {
            offset: range.start,
            len: range.len(),
            size: self.bytes.len(),
        })?;
        decoder::words_from_bytes(code)
    }

    /// Words of the primary (per-fragment or per-vertex) program
    pub fn primary_words(&self) -> Result<Vec<u64>, DecodeError> {
        self.words(&self.primary)
    }

    /// Words of the secondary (uniform setup) program, empty when absent
    pub fn secondary_words(&self) -> Result<Vec<u64>, DecodeError> {
        if self.secondary.is_empty() {
            return Ok(Vec::new());
        }
        self.words(&self.secondary)
    }
}

//=============================================================================
// TEST BLOB BUILDER
//=============================================================================


#[cfg(test)]
mod tests {
    use super::builder::*;
    use super::*;

    #[test]
    fn test_parse_header() {
        let blob = build_program(&TestProgram {
            fragment: true,
            native_color: true,
            primary: vec![0x1111, 0x2222],
            secondary: vec![0x3333],
            ..Default::default()
        });
        let program = GxpProgram::parse(&blob).unwrap();
        assert_eq!(program.stage, ShaderStage::Fragment);
        assert!(program.native_color);
        assert_eq!(program.version, (1, 4));
        assert_eq!(program.primary_words().unwrap(), vec![0x1111, 0x2222]);
        assert_eq!(program.secondary_words().unwrap(), vec![0x3333]);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(GxpProgram::parse(b"DXBC"), Err(ShaderError::BadMagic(_))));
        assert!(matches!(GxpProgram::parse(b"GXP\0\x01\x04"), Err(ShaderError::Truncated { .. })));

        let mut blob = build_program(&TestProgram { primary: vec![1], ..Default::default() });
        blob[offsets::SIZE..offsets::SIZE + 4].copy_from_slice(&0xFFFFu32.to_le_bytes());
        assert!(matches!(GxpProgram::parse(&blob), Err(ShaderError::Truncated { .. })));
    }

    #[test]
    fn test_primary_out_of_bounds() {
        let mut blob = build_program(&TestProgram { primary: vec![1], ..Default::default() });
        blob[offsets::PRIMARY_INSTR_COUNT..offsets::PRIMARY_INSTR_COUNT + 4]
            .copy_from_slice(&100u32.to_le_bytes());
        let program = GxpProgram::parse(&blob).unwrap();
        assert!(matches!(program.primary_words(), Err(DecodeError::OutOfBounds { .. })));
    }

    #[test]
    fn test_parameters() {
        let blob = build_program(&TestProgram {
            params: vec![
                TestParam::attribute("aPosition", 0),
                TestParam::uniform("lights[2].color", 4, 3),
                TestParam::sampler("tex", 1),
            ],
            containers: vec![(14, 8)],
            ..Default::default()
        });
        let program = GxpProgram::parse(&blob).unwrap();
        assert_eq!(program.parameters.len(), 3);

        let attr = &program.parameters[0];
        assert_eq!(attr.category, ParameterCategory::Attribute);
        assert_eq!(attr.name, "aPosition");
        assert_eq!(attr.register_width(), 4);

        let uniform = &program.parameters[1];
        assert_eq!(uniform.sanitized_name(), "lights_2_color");
        assert_eq!(uniform.register_width(), 3);
        assert_eq!(program.parameter_offset(uniform), 12);

        assert_eq!(program.parameters_of(ParameterCategory::Sampler).count(), 1);
    }

    #[test]
    fn test_literals_use_container_base() {
        let blob = build_program(&TestProgram {
            literals: vec![(2, 0x3F80_0000)],
            containers: vec![(LITERAL_CONTAINER, 32)],
            ..Default::default()
        });
        let program = GxpProgram::parse(&blob).unwrap();
        assert_eq!(program.literals, vec![Literal { sa_index: 34, data: 0x3F80_0000 }]);

        let orphan = build_program(&TestProgram { literals: vec![(2, 1)], ..Default::default() });
        assert!(GxpProgram::parse(&orphan).unwrap().literals.is_empty());
    }

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("a.b[3]"), "a_b_3");
        assert_eq!(sanitize_identifier("lights[2].color"), "lights_2_color");
        assert_eq!(sanitize_identifier("m__x"), "m_x");
        assert_eq!(sanitize_identifier("_private_"), "private");
        assert_eq!(sanitize_identifier("2d"), "2d");
        assert_eq!(sanitize_identifier("[]"), "unnamed");
    }

    #[test]
    fn test_element_registers() {
        let mut p = ProgramParameter {
            name: "m".into(),
            category: ParameterCategory::Uniform,
            ptype: ParameterType::F16,
            component_count: 3,
            container_index: 0,
            semantic: 0,
            array_size: 1,
            resource_index: 0,
        };
        assert_eq!(p.element_registers(), 2);
        p.ptype = ParameterType::U8;
        assert_eq!(p.element_registers(), 1);
        p.ptype = ParameterType::F32;
        p.array_size = 4;
        assert_eq!(p.register_width(), 16);
        p.component_count = 1;
        assert_eq!(p.register_width(), 4);
    }
}
