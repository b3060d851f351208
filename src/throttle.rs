//! Compile orchestration (spec §4.4): the process-wide throttle counter,
//! wired up to the compiled-function cache and the codegen backend.

use crate::backend::JitBackend;
use crate::cache::CacheFactory;
use crate::compile_dag::{CompileDag, Fingerprint};
use crate::error::JitError;
use crate::module::{CompiledFunctionCacheEntry, CompiledModule};
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex};

/// Process-wide observation counts, one per fingerprint. Guarded by a
/// single mutex held only for a single increment-and-compare (spec §5,
/// §9 "Global throttle counter").
static THROTTLE_COUNTS: Lazy<Mutex<FxHashMap<Fingerprint, u64>>> = Lazy::new(|| Mutex::new(FxHashMap::default()));

/// Entry point for the rewriter (spec §4.4). Increments `dag`'s throttle
/// count; if it has not yet strictly exceeded `min_count_to_compile`,
/// returns `Ok(None)` (not an error — spec §7 "throttled compiles are not
/// errors"). Otherwise asks the cache (or, with no cache configured, the
/// backend directly) for a compiled module.
pub fn compile(
    dag: &CompileDag,
    min_count_to_compile: u32,
    backend: &Arc<dyn JitBackend>,
) -> Result<Option<CompiledFunctionCacheEntry>, JitError> {
    let fingerprint = dag.hash();

    {
        let mut counts = THROTTLE_COUNTS.lock().unwrap();
        let count = counts.entry(fingerprint).or_insert(0);
        *count += 1;
        if *count <= min_count_to_compile as u64 {
            log::trace!("throttling compile of {} (observation {})", dag.dump(), count);
            return Ok(None);
        }
    }

    let name = dag.dump();
    log::trace!("try to compile expression {name}");

    let entry = if let Some(cache) = CacheFactory::instance().try_get_cache() {
        let (entry, was_inserted) = cache.get_or_set(fingerprint, || produce(dag, &name, backend))?;
        if was_inserted {
            log::trace!(
                "put compiled expression {name} in cache; used cache size {} total cache size {}",
                cache.weight(),
                cache.max_size()
            );
        } else {
            log::trace!("got compiled expression {name} from cache");
        }
        entry
    } else {
        // Degenerate path (spec §4.4): no cache configured, compile inline
        // and hand back an unshared (but still reference-counted) module.
        produce(dag, &name, backend)?
    };

    log::trace!("use compiled expression {name}");
    Ok(Some(entry))
}

fn produce(dag: &CompileDag, name: &str, backend: &Arc<dyn JitBackend>) -> Result<CompiledFunctionCacheEntry, JitError> {
    let module_info = backend.compile(dag, name)?;
    let entry_address = backend.find_compiled_function(&module_info, name)?;
    let module = Arc::new(CompiledModule::new(module_info, entry_address, backend.clone()));
    Ok(CompiledFunctionCacheEntry::new(module, module_info.size_bytes))
}
