//! Shader cache with disk persistence
//!
//! Translated programs are kept in memory for the lifetime of the cache and
//! written to the cache directory so later runs can skip translation. Each
//! entry is keyed by the SHA-256 of the program binary, the draw hints and
//! the renderer feature mask. The mask is also recorded in the index file; a
//! directory indexed with another mask or translator version is deleted on
//! open.

use crate::glsl;
use crate::gxp::GxpProgram;
use crate::types::*;
use ov_core::config::{Config, ShaderBackend};
use ov_core::error::ShaderError;
use ov_core::{cache_debug, cache_warn};
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Translator version, part of every cache file name and of the index header
pub const CACHE_VERSION: u32 = 1;

/// Index header: entry count, version, feature mask
const INDEX_HEADER_SIZE: usize = 16;
const INDEX_PAIR_SIZE: usize = 64;

/// Cache key of a program translated with `hints` for a renderer with `features`
pub fn cache_key(program: &GxpProgram, hints: &Hints, features: FeatureFlags) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(program.bytes());
    hasher.update(hints.to_bytes());
    hasher.update(features.bits().to_le_bytes());
    hasher.finalize().into()
}

/// Generated sources always run from the version line to the closing brace of `main`
fn is_complete(source: &str) -> bool {
    source.starts_with("#version") && source.ends_with("}\n")
}

/// Fragment and vertex keys of a program pair the renderer linked
pub type KeyPair = ([u8; 32], [u8; 32]);

/// Persistent shader cache, shareable between threads
pub struct ShaderCache {
    dir: Option<PathBuf>,
    backend: ShaderBackend,
    features: FeatureFlags,
    memory: RwLock<HashMap<[u8; 32], Arc<CompiledShader>>>,
    pairs: Mutex<Vec<KeyPair>>,
    compiled: AtomicU64,
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
}

impl ShaderCache {
    /// Open the cache in `dir`, creating it if needed
    ///
    /// An index written by another translator version or with another
    /// feature mask invalidates the whole directory.
    pub fn open<P: AsRef<Path>>(dir: P, backend: ShaderBackend, features: FeatureFlags) -> Result<Self, ShaderError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut cache = Self::in_memory(features);
        cache.backend = backend;

        let index_path = dir.join(index_name(backend));
        let pairs = match fs::read(&index_path) {
            Ok(data) => match parse_index(&data, features) {
                Ok(pairs) => pairs,
                Err(reason) => {
                    cache_warn!("Invalidating shader cache {:?}: {}", dir, reason);
                    fs::remove_dir_all(&dir)?;
                    fs::create_dir_all(&dir)?;
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        cache_debug!("Opened shader cache {:?} with {} program pairs", dir, pairs.len());
        *cache.pairs.get_mut() = pairs;
        cache.dir = Some(dir);
        Ok(cache)
    }

    /// A cache that never touches the disk
    pub fn in_memory(features: FeatureFlags) -> Self {
        Self {
            dir: None,
            backend: ShaderBackend::default(),
            features,
            memory: RwLock::new(HashMap::new()),
            pairs: Mutex::new(Vec::new()),
            compiled: AtomicU64::new(0),
            memory_hits: AtomicU64::new(0),
            disk_hits: AtomicU64::new(0),
        }
    }

    /// Build the cache described by the shader configuration
    pub fn from_config(config: &Config) -> Result<Self, ShaderError> {
        let features = FeatureFlags::from_config(&config.shader);
        if config.shader.cache_enabled {
            Self::open(&config.paths.shader_cache, config.shader.backend, features)
        } else {
            Ok(Self::in_memory(features))
        }
    }

    pub fn features(&self) -> FeatureFlags {
        self.features
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Look a program up without translating it
    pub fn lookup(&self, program: &GxpProgram, hints: &Hints) -> Option<Arc<CompiledShader>> {
        let key = self.key(program, hints);
        if let Some(shader) = self.memory.read().get(&key) {
            self.memory_hits.fetch_add(1, Ordering::Relaxed);
            return Some(Arc::clone(shader));
        }

        let path = self.file_path(&key, program.stage)?;
        let source = fs::read_to_string(&path).ok()?;
        if !is_complete(&source) {
            cache_warn!("Ignoring truncated cache file {:?}", path);
            return None;
        }
        let shader = Arc::new(CompiledShader {
            source,
            stage: program.stage,
            hash: program.hash(),
            key,
            hints: *hints,
        });
        self.disk_hits.fetch_add(1, Ordering::Relaxed);
        cache_debug!("Loaded {} from disk", hex::encode(key));
        Some(self.insert(shader))
    }

    /// Return the cached translation, translating on a miss
    pub fn get_or_compile(&self, program: &GxpProgram, hints: &Hints) -> Result<Arc<CompiledShader>, ShaderError> {
        if let Some(shader) = self.lookup(program, hints) {
            return Ok(shader);
        }

        // Translation runs without holding any cache lock
        let source = glsl::generate(program, *hints, self.features)?;
        self.compiled.fetch_add(1, Ordering::Relaxed);

        let key = self.key(program, hints);
        let shader = CompiledShader {
            source,
            stage: program.stage,
            hash: program.hash(),
            key,
            hints: *hints,
        };
        if let Err(e) = self.persist(&shader) {
            cache_warn!("Failed to write {} to the shader cache: {}", hex::encode(key), e);
        }
        Ok(self.insert(Arc::new(shader)))
    }

    pub fn key(&self, program: &GxpProgram, hints: &Hints) -> [u8; 32] {
        cache_key(program, hints, self.features)
    }

    /// Keep the first entry for a key if another thread got there first
    fn insert(&self, shader: Arc<CompiledShader>) -> Arc<CompiledShader> {
        let mut memory = self.memory.write();
        Arc::clone(memory.entry(shader.key).or_insert(shader))
    }

    fn file_path(&self, key: &[u8; 32], stage: ShaderStage) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?;
        Some(dir.join(format!("{}-{}.{}", CACHE_VERSION, hex::encode(key), stage.extension())))
    }

    fn persist(&self, shader: &CompiledShader) -> Result<(), ShaderError> {
        let (Some(dir), Some(path)) = (&self.dir, self.file_path(&shader.key, shader.stage)) else {
            return Ok(());
        };
        // Readers only ever see a missing file or a complete one
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(shader.source.as_bytes())?;
        file.persist(&path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Remember that a fragment and a vertex program were linked together
    pub fn record_pair(&self, fragment: [u8; 32], vertex: [u8; 32]) {
        let mut pairs = self.pairs.lock();
        if !pairs.contains(&(fragment, vertex)) {
            pairs.push((fragment, vertex));
        }
    }

    pub fn pairs(&self) -> Vec<KeyPair> {
        self.pairs.lock().clone()
    }

    /// Write the index file
    pub fn save_index(&self) -> Result<(), ShaderError> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let data = build_index(&self.pairs.lock(), self.features);
        fs::write(dir.join(index_name(self.backend)), data)?;
        Ok(())
    }

    /// Number of translations performed, cache hits excluded
    pub fn compiled_count(&self) -> u64 {
        self.compiled.load(Ordering::Relaxed)
    }

    /// Drop every entry, in memory and on disk
    pub fn clear(&self) -> Result<(), ShaderError> {
        self.memory.write().clear();
        self.pairs.lock().clear();

        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let prefix = format!("{}-", CACHE_VERSION);
        for entry in fs::read_dir(dir)?.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(&prefix) || name.starts_with("hashs-") {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        let memory = self.memory.read();
        let vertex_count = memory.values().filter(|s| s.stage == ShaderStage::Vertex).count();
        CacheStats {
            vertex_count,
            fragment_count: memory.len() - vertex_count,
            compiled: self.compiled_count(),
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub vertex_count: usize,
    pub fragment_count: usize,
    pub compiled: u64,
    pub memory_hits: u64,
    pub disk_hits: u64,
}

//=============================================================================
// INDEX FILE
//=============================================================================

fn index_name(backend: ShaderBackend) -> String {
    format!("hashs-{}.dat", backend.short_name())
}

fn build_index(pairs: &[KeyPair], features: FeatureFlags) -> Vec<u8> {
    let mut data = Vec::with_capacity(INDEX_HEADER_SIZE + pairs.len() * INDEX_PAIR_SIZE);
    data.extend_from_slice(&(pairs.len() as u64).to_le_bytes());
    data.extend_from_slice(&CACHE_VERSION.to_le_bytes());
    data.extend_from_slice(&features.bits().to_le_bytes());
    for (fragment, vertex) in pairs {
        data.extend_from_slice(fragment);
        data.extend_from_slice(vertex);
    }
    data
}

fn parse_index(data: &[u8], features: FeatureFlags) -> Result<Vec<KeyPair>, String> {
    if data.len() < INDEX_HEADER_SIZE {
        return Err(format!("index is {} bytes, header needs {}", data.len(), INDEX_HEADER_SIZE));
    }
    let (header, body) = data.split_at(INDEX_HEADER_SIZE);
    let count: u64 = bytemuck::pod_read_unaligned(&header[0..8]);
    let version: u32 = bytemuck::pod_read_unaligned(&header[8..12]);
    let mask: u32 = bytemuck::pod_read_unaligned(&header[12..16]);

    if version != CACHE_VERSION {
        return Err(format!("version {} does not match {}", version, CACHE_VERSION));
    }
    if mask != features.bits() {
        return Err(format!("feature mask {:#x} does not match {:#x}", mask, features.bits()));
    }
    let expected = usize::try_from(count)
        .ok()
        .and_then(|c| c.checked_mul(INDEX_PAIR_SIZE))
        .filter(|&len| len == body.len())
        .ok_or_else(|| format!("index lists {} pairs but holds {} bytes", count, body.len()))?;

    Ok(body[..expected]
        .chunks_exact(INDEX_PAIR_SIZE)
        .map(|pair| {
            let mut fragment = [0u8; 32];
            let mut vertex = [0u8; 32];
            fragment.copy_from_slice(&pair[..32]);
            vertex.copy_from_slice(&pair[32..]);
            (fragment, vertex)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::tests::{assemble, pattern};
    use crate::gxp::builder::{build_program, TestParam, TestProgram};
    use tempfile::TempDir;

    fn program(fragment: bool) -> GxpProgram {
        let vmov = assemble(
            pattern("VMOV"),
            &[('o', DataType::F32 as u64), ('w', 0b0100), ('h', 0b1111), ('l', 1), ('f', 2)],
        );
        let blob = build_program(&TestProgram {
            fragment,
            params: if fragment { vec![] } else { vec![TestParam::attribute("aPos", 0)] },
            primary: vec![vmov],
            ..Default::default()
        });
        GxpProgram::parse(&blob).unwrap()
    }

    #[test]
    fn test_compile_once() {
        let cache = ShaderCache::in_memory(FeatureFlags::empty());
        let vertex = program(false);

        let first = cache.get_or_compile(&vertex, &Hints::default()).unwrap();
        let second = cache.get_or_compile(&vertex, &Hints::default()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.compiled_count(), 1);

        // Different hints are a different entry
        let hints = Hints { attribute_mask: 0, ..Default::default() };
        let third = cache.get_or_compile(&vertex, &hints).unwrap();
        assert_ne!(first.key, third.key);
        assert_eq!(first.hash, third.hash);
        assert_eq!(cache.compiled_count(), 2);

        let stats = cache.stats();
        assert_eq!(stats.vertex_count, 2);
        assert_eq!(stats.memory_hits, 1);
    }

    #[test]
    fn test_disk_roundtrip() {
        let dir = TempDir::new().unwrap();
        let vertex = program(false);
        let hints = Hints::default();

        let source = {
            let cache = ShaderCache::open(dir.path(), ShaderBackend::OpenGl, FeatureFlags::empty()).unwrap();
            let shader = cache.get_or_compile(&vertex, &hints).unwrap();
            let file = dir.path().join(format!("1-{}.vert", hex::encode(shader.key)));
            assert!(file.exists());
            shader.source.clone()
        };

        let cache = ShaderCache::open(dir.path(), ShaderBackend::OpenGl, FeatureFlags::empty()).unwrap();
        let loaded = cache.get_or_compile(&vertex, &hints).unwrap();
        assert_eq!(loaded.source, source);
        assert_eq!(cache.compiled_count(), 0);
        assert_eq!(cache.stats().disk_hits, 1);
    }

    #[test]
    fn test_index_roundtrip() {
        let dir = TempDir::new().unwrap();
        let features = FeatureFlags::INTEGER_MIXING | FeatureFlags::MASK_BIT;
        {
            let cache = ShaderCache::open(dir.path(), ShaderBackend::Vulkan, features).unwrap();
            cache.record_pair([1; 32], [2; 32]);
            cache.record_pair([1; 32], [2; 32]);
            cache.record_pair([3; 32], [4; 32]);
            cache.save_index().unwrap();
        }

        let data = fs::read(dir.path().join("hashs-vk.dat")).unwrap();
        assert_eq!(data.len(), INDEX_HEADER_SIZE + 2 * INDEX_PAIR_SIZE);
        assert_eq!(&data[0..8], &2u64.to_le_bytes());

        let cache = ShaderCache::open(dir.path(), ShaderBackend::Vulkan, features).unwrap();
        assert_eq!(cache.pairs(), vec![([1; 32], [2; 32]), ([3; 32], [4; 32])]);
    }

    #[test]
    fn test_feature_mismatch_wipes_directory() {
        let dir = TempDir::new().unwrap();
        let fragment = program(true);
        {
            let cache = ShaderCache::open(dir.path(), ShaderBackend::OpenGl, FeatureFlags::empty()).unwrap();
            cache.get_or_compile(&fragment, &Hints::default()).unwrap();
            cache.record_pair([7; 32], [8; 32]);
            cache.save_index().unwrap();
        }
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);

        let cache = ShaderCache::open(dir.path(), ShaderBackend::OpenGl, FeatureFlags::TEXTURE_BARRIER).unwrap();
        assert!(cache.pairs().is_empty());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
        assert!(cache.lookup(&fragment, &Hints::default()).is_none());
    }

    #[test]
    fn test_parse_index_rejects_bad_headers() {
        let good = build_index(&[([9; 32], [9; 32])], FeatureFlags::empty());
        assert_eq!(parse_index(&good, FeatureFlags::empty()).unwrap().len(), 1);

        let mut old = good.clone();
        old[8..12].copy_from_slice(&(CACHE_VERSION + 1).to_le_bytes());
        assert!(parse_index(&old, FeatureFlags::empty()).is_err());

        assert!(parse_index(&good[..good.len() - 1], FeatureFlags::empty()).is_err());
        assert!(parse_index(&good[..4], FeatureFlags::empty()).is_err());
    }

    #[test]
    fn test_clear() {
        let dir = TempDir::new().unwrap();
        let cache = ShaderCache::open(dir.path(), ShaderBackend::OpenGl, FeatureFlags::empty()).unwrap();
        let vertex = program(false);
        cache.get_or_compile(&vertex, &Hints::default()).unwrap();
        cache.save_index().unwrap();

        cache.clear().unwrap();
        let stats = cache.stats();
        assert_eq!((stats.vertex_count, stats.fragment_count), (0, 0));
        assert_eq!(stats.compiled, 1);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unindexed_directory_is_keyed_by_features() {
        let dir = TempDir::new().unwrap();
        let fragment = program(true);
        let hints = Hints { mask_update: true, ..Default::default() };
        {
            let cache = ShaderCache::open(dir.path(), ShaderBackend::OpenGl, FeatureFlags::empty()).unwrap();
            let shader = cache.get_or_compile(&fragment, &hints).unwrap();
            assert!(!shader.source.contains("out_mask"));
        }

        let cache = ShaderCache::open(dir.path(), ShaderBackend::OpenGl, FeatureFlags::MASK_BIT).unwrap();
        let shader = cache.get_or_compile(&fragment, &hints).unwrap();
        assert_eq!(cache.compiled_count(), 1);
        assert_eq!(cache.stats().disk_hits, 0);
        assert!(shader.source.contains("out_mask"));
    }

    #[test]
    fn test_truncated_file_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let fragment = program(true);
        let hints = Hints::default();
        let cache = ShaderCache::open(dir.path(), ShaderBackend::OpenGl, FeatureFlags::empty()).unwrap();

        let key = cache.key(&fragment, &hints);
        let path = dir.path().join(format!("1-{}.frag", hex::encode(key)));
        fs::write(&path, "").unwrap();
        assert!(cache.lookup(&fragment, &hints).is_none());

        fs::write(&path, "#version 450\nvoid main() {\n").unwrap();
        let shader = cache.get_or_compile(&fragment, &hints).unwrap();
        assert_eq!(cache.compiled_count(), 1);
        assert!(is_complete(&shader.source));

        // The rewrite replaced the partial file
        assert_eq!(fs::read_to_string(&path).unwrap(), shader.source);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
