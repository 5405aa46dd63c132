//! USSE shader translation (GXP → GLSL)
//!
//! This crate translates PS Vita GPU programs into GLSL:
//! - `gxp`: the program container, parameter and literal tables
//! - `decoder`: 64-bit USSE instruction words into [`Instruction`]s
//! - `resolver`: register banks mapped onto named GLSL variables
//! - `glsl`: code generation, one handler per opcode family
//! - `cache`: memory and disk cache of translated programs
//! - `worker`: background translation into the cache

pub mod cache;
pub mod decoder;
pub mod disasm;
pub mod glsl;
pub mod gxp;
pub mod resolver;
pub mod types;
pub mod worker;

pub use cache::{CacheStats, ShaderCache};
pub use glsl::GlslGenerator;
pub use gxp::GxpProgram;
pub use types::*;
pub use worker::CompileWorker;

use ov_core::error::ShaderError;

/// Parse a GXP blob and translate it without caching
pub fn translate(blob: &[u8], hints: Hints, features: FeatureFlags) -> Result<String, ShaderError> {
    let program = GxpProgram::parse(blob)?;
    glsl::generate(&program, hints, features)
}
