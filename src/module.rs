//! `CompiledModule`: shared ownership of one emitted native object (spec §3).
//!
//! Lifecycle: created by a cache-miss compile, destroyed only when every
//! shared reference drops, at which point the backend is asked to release
//! the module. No concurrent executor may dereference the entry point after
//! the last reference is dropped — that invariant is entirely carried by
//! `Arc<CompiledModule>`'s own drop-when-last-ref-drops semantics.

use crate::backend::{EntryAddress, JitBackend, ModuleInfo};
use std::sync::Arc;

/// Owns a backend module handle, its byte size (for cache weighting), and
/// its resolved entry-point address.
pub struct CompiledModule {
    info: ModuleInfo,
    entry: EntryAddress,
    backend: Arc<dyn JitBackend>,
}

impl CompiledModule {
    pub fn new(info: ModuleInfo, entry: EntryAddress, backend: Arc<dyn JitBackend>) -> Self {
        CompiledModule { info, entry, backend }
    }

    pub fn entry_point(&self) -> EntryAddress {
        self.entry
    }

    pub fn size_bytes(&self) -> usize {
        self.info.size_bytes
    }
}

impl Drop for CompiledModule {
    fn drop(&mut self) {
        if let Err(err) = self.backend.delete_compiled_module(&self.info) {
            // The backend callback runs after the last shared reference
            // drops; it must be safe to invoke up until backend teardown
            // (spec §5). A failure here cannot be propagated from `Drop`,
            // so it is logged rather than silently swallowed.
            log::warn!("failed to release compiled module {}: {err}", self.info.module_id);
        }
    }
}

/// A cache entry: a shared reference to a `CompiledModule` plus the weight
/// (bytes) it contributes to the cache's size budget (spec §3, §4.4).
#[derive(Clone)]
pub struct CompiledFunctionCacheEntry {
    module: Arc<CompiledModule>,
    weight: usize,
}

impl CompiledFunctionCacheEntry {
    pub fn new(module: Arc<CompiledModule>, weight: usize) -> Self {
        CompiledFunctionCacheEntry { module, weight }
    }

    pub fn module(&self) -> &Arc<CompiledModule> {
        &self.module
    }

    pub fn weight(&self) -> usize {
        self.weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JitError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingBackend {
        releases: AtomicUsize,
    }

    impl JitBackend for CountingBackend {
        fn compile(&self, _dag: &crate::compile_dag::CompileDag, _name: &str) -> Result<ModuleInfo, JitError> {
            unreachable!("not exercised by this test")
        }
        fn find_compiled_function(&self, _module: &ModuleInfo, _symbol_name: &str) -> Result<EntryAddress, JitError> {
            unreachable!("not exercised by this test")
        }
        fn delete_compiled_module(&self, _module: &ModuleInfo) -> Result<(), JitError> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn release_is_called_once_when_last_reference_drops() {
        let backend = Arc::new(CountingBackend::default());
        let module = Arc::new(CompiledModule::new(
            ModuleInfo { module_id: 1, size_bytes: 64 },
            0x1000,
            backend.clone(),
        ));
        let entry = CompiledFunctionCacheEntry::new(module.clone(), 64);
        drop(entry);
        assert_eq!(backend.releases.load(Ordering::SeqCst), 0, "one more reference is still alive");
        drop(module);
        assert_eq!(backend.releases.load(Ordering::SeqCst), 1);
    }
}
