//! Oxidized-Vita - PS Vita shader translator
//!
//! Translates GXP programs to GLSL through the shader cache.
//!
//! ```text
//! oxidized-vita [--config FILE] [--out DIR] [--no-cache] [--color u8|f16|f32]
//!               [--mask-update] [--attributes MASK] PROGRAM.gxp...
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use ov_core::config::Config;
use ov_core::logging;
use ov_shader::{ColorFormat, CompileWorker, CompiledShader, GxpProgram, Hints, ShaderCache, ShaderStage};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "oxidized-vita", about = "Translate PS Vita GXP programs to GLSL")]
struct Args {
    /// Configuration file (defaults to the platform config path)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write each translation to this directory instead of stdout
    #[arg(long, value_name = "DIR")]
    out: Option<PathBuf>,

    /// Keep translations in memory only
    #[arg(long, action = clap::ArgAction::SetTrue)]
    no_cache: bool,

    /// Colour surface format the fragment output is packed for
    #[arg(long, value_enum, default_value_t = ColorArg::U8)]
    color: ColorArg,

    /// The draw updates the stencil mask bit
    #[arg(long, action = clap::ArgAction::SetTrue)]
    mask_update: bool,

    /// Bitmask of bound vertex attribute locations, in hex
    #[arg(long, value_name = "MASK", value_parser = parse_hex_mask)]
    attributes: Option<u32>,

    /// GXP program files
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ColorArg {
    U8,
    F16,
    F32,
}

impl From<ColorArg> for ColorFormat {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::U8 => ColorFormat::U8U8U8U8,
            ColorArg::F16 => ColorFormat::F16F16F16F16,
            ColorArg::F32 => ColorFormat::F32F32F32F32,
        }
    }
}

fn parse_hex_mask(value: &str) -> Result<u32, String> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    u32::from_str_radix(digits, 16).map_err(|e| format!("bad attribute mask {:?}: {}", value, e))
}

impl Args {
    fn hints(&self) -> Hints {
        Hints {
            color_format: self.color.into(),
            mask_update: self.mask_update,
            attribute_mask: self.attributes.unwrap_or(Hints::default().attribute_mask),
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Config {
    let loaded = match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    loaded.unwrap_or_else(|e| {
        eprintln!("Failed to load configuration, using defaults: {}", e);
        Config::default()
    })
}

fn main() -> Result<()> {
    let args = Args::parse();
    let hints = args.hints();
    let mut config = load_config(args.config.as_ref());
    if args.no_cache {
        config.shader.cache_enabled = false;
    }

    logging::init(&config);
    tracing::info!("Starting Oxidized-Vita shader translator");

    let cache = Arc::new(ShaderCache::from_config(&config).context("opening the shader cache")?);

    let mut programs = Vec::with_capacity(args.inputs.len());
    for input in &args.inputs {
        let blob = std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
        let program = GxpProgram::parse(&blob).with_context(|| format!("parsing {}", input.display()))?;
        programs.push((input, Arc::new(program)));
    }

    if config.shader.async_compile {
        let worker = CompileWorker::spawn(Arc::clone(&cache)).context("starting the compile worker")?;
        for (_, program) in &programs {
            worker.submit(program, hints);
        }
        worker.shutdown();
    }

    let mut compiled = Vec::with_capacity(programs.len());
    for (input, program) in &programs {
        let shader = cache
            .get_or_compile(program, &hints)
            .with_context(|| format!("translating {}", input.display()))?;
        compiled.push((*input, shader));
    }

    // A vertex and a fragment program on one command line form a linked pair
    let key_of = |stage| compiled.iter().find(|(_, s)| s.stage == stage).map(|(_, s)| s.key);
    if let (Some(fragment), Some(vertex)) = (key_of(ShaderStage::Fragment), key_of(ShaderStage::Vertex)) {
        cache.record_pair(fragment, vertex);
    }
    cache.save_index().context("writing the shader cache index")?;

    let dump_dir = args
        .out
        .clone()
        .or_else(|| config.debug.dump_shaders.then(|| config.paths.shader_dump.clone()));
    for (input, shader) in &compiled {
        match &dump_dir {
            Some(dir) => {
                let path = dump(dir, shader)?;
                tracing::info!("{} -> {}", input.display(), path.display());
            }
            None => println!("// {}\n{}", input.display(), shader.source),
        }
    }

    let stats = cache.stats();
    tracing::info!(
        "Translated {} programs, {} memory hits, {} disk hits",
        stats.compiled,
        stats.memory_hits,
        stats.disk_hits
    );
    Ok(())
}

fn dump(dir: &Path, shader: &CompiledShader) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(format!("{}.{}", hex::encode(shader.key), shader.stage.extension()));
    std::fs::write(&path, &shader.source).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("oxidized-vita").chain(list.iter().copied()))
    }

    #[test]
    fn test_parse_args() {
        let parsed = args(&["--color", "f16", "--attributes", "0x3", "--mask-update", "a.gxp", "b.gxp"]).unwrap();
        let hints = parsed.hints();
        assert_eq!(hints.color_format, ColorFormat::F16F16F16F16);
        assert_eq!(hints.attribute_mask, 0x3);
        assert!(hints.mask_update);
        assert_eq!(parsed.inputs.len(), 2);

        let plain = args(&["a.gxp"]).unwrap();
        assert_eq!(plain.hints(), Hints::default());

        assert!(args(&[]).is_err());
        assert!(args(&["--color", "rgb", "a.gxp"]).is_err());
        assert!(args(&["--attributes", "zz", "a.gxp"]).is_err());
        assert!(args(&["--frobnicate", "a.gxp"]).is_err());
        assert!(args(&["a.gxp", "--out"]).is_err());
    }
}
