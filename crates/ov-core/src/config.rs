//! Configuration system for oxidized-vita

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub shader: ShaderConfig,
    pub kernel: KernelConfig,
    pub paths: PathConfig,
    pub debug: DebugConfig,
}

/// Shader translation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub backend: ShaderBackend,
    /// Persist translated shaders to the cache directory
    pub cache_enabled: bool,
    /// Translate on a background worker instead of the caller's thread
    pub async_compile: bool,
    /// Renderer can write the colour output directly instead of through a storage image
    pub direct_fragcolor: bool,
    pub support_shader_interlock: bool,
    pub support_texture_barrier: bool,
    pub use_mask_bit: bool,
}

/// Renderer backend the generated source is meant for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum ShaderBackend {
    #[default]
    OpenGl,
    Vulkan,
}

impl ShaderBackend {
    /// Short name used in cache file names
    pub fn short_name(&self) -> &'static str {
        match self {
            Self::OpenGl => "gl",
            Self::Vulkan => "vk",
        }
    }
}

/// Kernel emulation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Honour guest wait timeouts; when off, timed waits block until woken
    pub honour_timeouts: bool,
    /// Refuse to delete a primitive that still has waiting threads
    pub strict_delete: bool,
    pub default_thread_priority: u32,
}

/// Path configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub shader_cache: PathBuf,
    pub shader_dump: PathBuf,
}

/// Debug settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub log_level: LogLevel,
    pub log_to_file: bool,
    pub log_path: PathBuf,
    pub dump_shaders: bool,
    pub trace_shader_decode: bool,
    pub trace_kernel_sync: bool,
}

/// Logging level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

// Default implementations

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            backend: ShaderBackend::default(),
            cache_enabled: true,
            async_compile: false,
            direct_fragcolor: false,
            support_shader_interlock: false,
            support_texture_barrier: true,
            use_mask_bit: false,
        }
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            honour_timeouts: true,
            strict_delete: false,
            default_thread_priority: 160,
        }
    }
}

impl Default for PathConfig {
    fn default() -> Self {
        let base = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("oxidized-vita");

        Self {
            shader_cache: base.join("cache/shaders"),
            shader_dump: base.join("dump/shaders"),
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            log_to_file: false,
            log_path: PathBuf::from("oxidized-vita.log"),
            dump_shaders: false,
            trace_shader_decode: false,
            trace_kernel_sync: false,
        }
    }
}

impl Config {
    /// Load configuration from file, or create default if it doesn't exist
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from an explicit path, writing defaults when missing
    pub fn load_from(path: &std::path::Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            let config = Self::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the path to the configuration file
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("oxidized-vita")
            .join("config.toml")
    }
}
