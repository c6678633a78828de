//! C3 — module cache. Five maps keyed by hex-encoded checksum, guarded by
//! a single mutex held only for the duration of a map operation — never
//! across a contract invocation, per the concurrency model.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use wasmer::Module;

use crate::analysis::{self, AnalysisReport};
use crate::checksum::Checksum;
use crate::errors::{VmError, VmResult};
use crate::size::Size;
use crate::wasm_backend::compile;

#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub supported_capabilities: HashSet<String>,
    pub memory_limit: Size,
    pub instance_memory_limit: Size,
}

impl Default for CacheOptions {
    fn default() -> Self {
        CacheOptions {
            supported_capabilities: HashSet::new(),
            memory_limit: Size::mebi(512),
            instance_memory_limit: Size::mebi(32),
        }
    }
}

/// Snapshot returned by `GetMetrics`; counters accumulate for the lifetime
/// of the `Cache`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
    pub hits_pinned_memory_cache: u32,
    pub hits_memory_cache: u32,
    pub hits_fs_cache: u32,
    pub misses: u32,
    pub elements_pinned_memory_cache: usize,
    pub elements_memory_cache: usize,
    pub size_pinned_memory_cache: usize,
    pub size_memory_cache: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PinnedMetric {
    pub hits: u32,
    pub size: usize,
}

struct CacheState {
    bytecode: HashMap<String, Vec<u8>>,
    compiled: HashMap<String, Module>,
    pinned: HashSet<String>,
    hits: HashMap<String, u32>,
    sizes: HashMap<String, usize>,
    misses: u32,
}

impl CacheState {
    fn new() -> Self {
        CacheState {
            bytecode: HashMap::new(),
            compiled: HashMap::new(),
            pinned: HashSet::new(),
            hits: HashMap::new(),
            sizes: HashMap::new(),
            misses: 0,
        }
    }
}

/// Process-wide module cache. Its mutex guards map operations only; a
/// contract invocation is never performed while it is held.
pub struct Cache {
    options: CacheOptions,
    state: Mutex<CacheState>,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache").field("options", &self.options).finish()
    }
}

impl Cache {
    pub fn new(options: CacheOptions) -> Self {
        tracing::info!(
            memory_limit = options.memory_limit.bytes(),
            "initializing module cache"
        );
        Cache { options, state: Mutex::new(CacheState::new()) }
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// `StoreCode(bytes, persist=true)` with full C4 validation.
    pub fn store_code(&self, wasm: &[u8], persist: bool) -> VmResult<Checksum> {
        self.store_code_impl(wasm, persist, true)
    }

    /// `StoreCodeUnchecked`: always persists, relaxes static validation to
    /// the single-memory check.
    pub fn store_code_unchecked(&self, wasm: &[u8]) -> VmResult<Checksum> {
        self.store_code_impl(wasm, true, false)
    }

    /// `SimulateStoreCode`: validates only, never inserts.
    pub fn simulate_store_code(&self, wasm: &[u8]) -> VmResult<Checksum> {
        if wasm.is_empty() {
            return Err(VmError::null_argument("wasm"));
        }
        let module = compile(wasm)?;
        let report = analysis::analyze(&module)?;
        self.check_required_capabilities(&report)?;
        Ok(Checksum::generate(wasm))
    }

    fn store_code_impl(&self, wasm: &[u8], persist: bool, full_validation: bool) -> VmResult<Checksum> {
        if wasm.is_empty() {
            return Err(VmError::null_argument("wasm"));
        }
        let module = compile(wasm)?;
        if full_validation {
            let report = analysis::analyze(&module)?;
            self.check_required_capabilities(&report)?;
        } else {
            analysis::check_memory_count(&module)?;
        }

        let checksum = Checksum::generate(wasm);
        let key = checksum.to_hex();

        if !persist {
            tracing::debug!(checksum = %checksum, "simulated store, discarding compiled module");
            return Ok(checksum);
        }

        let mut state = self.state.lock().unwrap();
        if state.compiled.contains_key(&key) {
            tracing::debug!(checksum = %checksum, "store_code: already cached");
            return Ok(checksum);
        }
        state.bytecode.insert(key.clone(), wasm.to_vec());
        state.compiled.insert(key, module);
        tracing::info!(checksum = %checksum, bytes = wasm.len(), "stored module");
        Ok(checksum)
    }

    pub fn get_code(&self, checksum: &Checksum) -> VmResult<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state
            .bytecode
            .get(&checksum.to_hex())
            .cloned()
            .ok_or_else(|| VmError::wasm_not_found(checksum.to_hex()))
    }

    pub fn remove_code(&self, checksum: &Checksum) -> VmResult<()> {
        let mut state = self.state.lock().unwrap();
        let key = checksum.to_hex();
        if state.compiled.remove(&key).is_none() {
            return Err(VmError::wasm_not_found(key));
        }
        state.bytecode.remove(&key);
        state.pinned.remove(&key);
        state.hits.remove(&key);
        state.sizes.remove(&key);
        tracing::info!(checksum = %checksum, "removed module");
        Ok(())
    }

    pub fn pin(&self, checksum: &Checksum) -> VmResult<()> {
        let mut state = self.state.lock().unwrap();
        let key = checksum.to_hex();
        let bytecode_len = state
            .bytecode
            .get(&key)
            .ok_or_else(|| VmError::wasm_not_found(key.clone()))?
            .len();
        if state.pinned.insert(key.clone()) {
            state.hits.insert(key.clone(), 0);
            state.sizes.insert(key, key_len_plus(&checksum.to_hex(), bytecode_len));
        }
        Ok(())
    }

    pub fn unpin(&self, checksum: &Checksum) -> VmResult<()> {
        let mut state = self.state.lock().unwrap();
        let key = checksum.to_hex();
        state.pinned.remove(&key);
        state.hits.remove(&key);
        state.sizes.remove(&key);
        Ok(())
    }

    /// Looks up the compiled module, bumping the hit counter if pinned.
    /// This is the lookup step C7 performs at the top of every entry-point
    /// call.
    pub fn get_instance_module(&self, checksum: &Checksum) -> VmResult<Module> {
        let mut state = self.state.lock().unwrap();
        let key = checksum.to_hex();
        match state.compiled.get(&key).cloned() {
            Some(module) => {
                if state.pinned.contains(&key) {
                    *state.hits.entry(key).or_insert(0) += 1;
                }
                Ok(module)
            }
            None => {
                state.misses += 1;
                Err(VmError::cache_miss(key))
            }
        }
    }

    pub fn get_pinned_metrics(&self) -> Vec<(Checksum, PinnedMetric)> {
        let state = self.state.lock().unwrap();
        state
            .pinned
            .iter()
            .map(|key| {
                let checksum = Checksum::from_slice(&hex::decode(key).unwrap()).unwrap();
                let metric = PinnedMetric {
                    hits: *state.hits.get(key).unwrap_or(&0),
                    size: *state.sizes.get(key).unwrap_or(&0),
                };
                (checksum, metric)
            })
            .collect()
    }

    pub fn get_metrics(&self) -> Metrics {
        let state = self.state.lock().unwrap();
        Metrics {
            hits_pinned_memory_cache: state.pinned.iter().filter_map(|k| state.hits.get(k)).sum(),
            hits_memory_cache: 0,
            hits_fs_cache: 0,
            misses: state.misses,
            elements_pinned_memory_cache: state.pinned.len(),
            elements_memory_cache: state.compiled.len(),
            size_pinned_memory_cache: state.pinned.iter().filter_map(|k| state.sizes.get(k)).sum(),
            size_memory_cache: state.bytecode.values().map(|b| b.len()).sum(),
        }
    }

    pub fn analyze(&self, checksum: &Checksum) -> VmResult<AnalysisReport> {
        let module = self.get_instance_module_no_hit(checksum)?;
        analysis::analyze(&module)
    }

    fn get_instance_module_no_hit(&self, checksum: &Checksum) -> VmResult<Module> {
        let state = self.state.lock().unwrap();
        state
            .compiled
            .get(&checksum.to_hex())
            .cloned()
            .ok_or_else(|| VmError::cache_miss(checksum.to_hex()))
    }

    /// Rejects a contract whose `required_capabilities` (§4.4) aren't a
    /// subset of what this host declared in `CacheOptions`, mirroring the
    /// reference VM's store-time capability check.
    fn check_required_capabilities(&self, report: &AnalysisReport) -> VmResult<()> {
        let missing: Vec<&str> = report
            .required_capabilities
            .iter()
            .filter(|c| !self.options.supported_capabilities.contains(c.as_str()))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(VmError::static_validation_error(format!(
                "Error during static Wasm validation: Wasm contract requires unsupported capabilities: {}",
                missing.join(", ")
            )))
        }
    }
}

fn key_len_plus(key: &str, bytecode_len: usize) -> usize {
    key.len() / 2 + bytecode_len
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_wasm() -> Vec<u8> {
        wat::parse_str(
            r#"(module
                (memory (export "memory") 1)
                (func (export "allocate") (param i32) (result i32) i32.const 1024)
                (func (export "deallocate") (param i32))
            )"#,
        )
        .unwrap()
    }

    #[test]
    fn store_then_get_code_round_trips() {
        let cache = Cache::new(CacheOptions::default());
        let wasm = minimal_wasm();
        let checksum = cache.store_code(&wasm, true).unwrap();
        assert_eq!(checksum, Checksum::generate(&wasm));
        let fetched = cache.get_code(&checksum).unwrap();
        assert_eq!(fetched, wasm);
    }

    #[test]
    fn store_code_is_idempotent() {
        let cache = Cache::new(CacheOptions::default());
        let wasm = minimal_wasm();
        let a = cache.store_code(&wasm, true).unwrap();
        let b = cache.store_code(&wasm, true).unwrap();
        assert_eq!(a, b);
        assert_eq!(cache.get_metrics().elements_memory_cache, 1);
    }

    #[test]
    fn remove_code_returns_cache_to_pre_store_state() {
        let cache = Cache::new(CacheOptions::default());
        let wasm = minimal_wasm();
        let checksum = cache.store_code(&wasm, true).unwrap();
        cache.remove_code(&checksum).unwrap();
        assert!(cache.get_code(&checksum).is_err());
        assert_eq!(cache.get_metrics().elements_memory_cache, 0);
    }

    #[test]
    fn remove_missing_code_fails() {
        let cache = Cache::new(CacheOptions::default());
        let checksum = Checksum::generate(b"nonexistent");
        assert!(cache.remove_code(&checksum).is_err());
    }

    #[test]
    fn pin_tracks_hits_and_unpin_clears() {
        let cache = Cache::new(CacheOptions::default());
        let wasm = minimal_wasm();
        let checksum = cache.store_code(&wasm, true).unwrap();
        cache.pin(&checksum).unwrap();
        for _ in 0..3 {
            cache.get_instance_module(&checksum).unwrap();
        }
        let metrics = cache.get_pinned_metrics();
        let (_, metric) = metrics.iter().find(|(c, _)| *c == checksum).unwrap();
        assert_eq!(metric.hits, 3);

        cache.unpin(&checksum).unwrap();
        assert!(cache.get_pinned_metrics().is_empty());
    }

    #[test]
    fn get_instance_module_missing_checksum_is_a_cache_miss() {
        let cache = Cache::new(CacheOptions::default());
        let checksum = Checksum::generate(b"nonexistent");
        let err = cache.get_instance_module(&checksum).unwrap_err();
        assert!(matches!(err, VmError::CacheMiss { .. }));
        assert_eq!(cache.get_metrics().misses, 1);
    }

    #[test]
    fn simulate_store_code_never_inserts() {
        let cache = Cache::new(CacheOptions::default());
        let wasm = minimal_wasm();
        let checksum = cache.simulate_store_code(&wasm).unwrap();
        assert!(cache.get_code(&checksum).is_err());
    }

    fn ibc_wasm() -> Vec<u8> {
        wat::parse_str(
            r#"(module
                (memory (export "memory") 1)
                (func (export "allocate") (param i32) (result i32) i32.const 1024)
                (func (export "deallocate") (param i32))
                (func (export "ibc_channel_open") (param i32 i32) (result i32) i32.const 0)
            )"#,
        )
        .unwrap()
    }

    #[test]
    fn store_code_rejects_unsupported_required_capabilities() {
        let cache = Cache::new(CacheOptions::default());
        let err = cache.store_code(&ibc_wasm(), true).unwrap_err();
        assert!(matches!(err, VmError::StaticValidationError { .. }));
        assert_eq!(cache.get_metrics().elements_memory_cache, 0);
    }

    #[test]
    fn store_code_accepts_contract_whose_capabilities_are_declared_supported() {
        let mut options = CacheOptions::default();
        options.supported_capabilities.insert("iterator".to_string());
        options.supported_capabilities.insert("stargate".to_string());
        let cache = Cache::new(options);
        assert!(cache.store_code(&ibc_wasm(), true).is_ok());
    }
}
