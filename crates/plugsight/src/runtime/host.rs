//! The isolated runtime context and its host contract.
//!
//! Every inspection run gets a fresh engine, store, and linker; nothing is
//! shared across runs. Plugin modules see exactly one import namespace,
//! `plugin_host`, plus the contents of their own bundle. All pointers are
//! offsets into the module's exported linear `memory`.
//!
//! Host functions:
//! - `log(level, ptr, len)`: plugin diagnostics, forwarded to the
//!   inspector's log (0 debug, 1 info, 2 warn, other error).
//! - `set_output(ptr, len) -> i32`: copies one output payload to the host.
//! - `resource_len(path_ptr, path_len) -> i32`: size of a bundle resource,
//!   -1 when absent.
//! - `resource_read(path_ptr, path_len, dst_ptr, dst_cap) -> i32`: copies a
//!   bundle resource into plugin memory; bytes copied, or -1 when absent or
//!   the destination is too small. Resources resolve against the bundle
//!   only, never the inspector's filesystem.
//! - `repository_new`, `repository_set_name`, `repository_load_rules`,
//!   `repository_done`: the registration surface, live only while a
//!   rule-registry module is being driven; outside that phase each
//!   returns -1.
//!
//! Out-of-range pointers and other ABI misuse record a host fault, which the
//! caller turns into a failure of the invocation being driven.

use std::collections::BTreeMap;
use std::sync::mpsc;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use wasmtime::{
    Caller, Engine, ExternType, Linker, Module, Store, StoreLimits, StoreLimitsBuilder, TypedFunc,
};

use crate::bundle::lookup_entry;
use crate::error::{Error, Result};

use super::registry::{parse_rules_resource, RegistryRecorder};

/// Import namespace every plugin module links against.
pub const HOST_NAMESPACE: &str = "plugin_host";

/// Export invoked exactly once on the entry-point module to enumerate its
/// extension descriptors.
pub const ENTRY_POINT_EXPORT: &str = "plugin_extensions";

/// Export that marks a module as a rule-registry provider.
pub const RULES_DEFINE_EXPORT: &str = "rules_define";

/// Resource ceilings for a single plugin invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceLimits {
    pub max_memory_mb: u32,
    pub max_cpu_ms: u32,
    pub max_timeout_ms: u32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_memory_mb: default_max_memory_mb(),
            max_cpu_ms: default_max_cpu_ms(),
            max_timeout_ms: default_max_timeout_ms(),
        }
    }
}

const fn default_max_memory_mb() -> u32 {
    64
}

const fn default_max_cpu_ms() -> u32 {
    100
}

const fn default_max_timeout_ms() -> u32 {
    5000
}

#[derive(Debug)]
pub(crate) struct HostState {
    resources: Arc<BTreeMap<String, Vec<u8>>>,
    output: Option<Vec<u8>>,
    host_fault: Option<String>,
    registry: Option<RegistryRecorder>,
    store_limits: StoreLimits,
}

impl HostState {
    fn new(resources: Arc<BTreeMap<String, Vec<u8>>>, max_memory_mb: u32) -> Self {
        let max_bytes = max_memory_bytes(max_memory_mb);
        let store_limits = StoreLimitsBuilder::new().memory_size(max_bytes).build();
        Self {
            resources,
            output: None,
            host_fault: None,
            registry: None,
            store_limits,
        }
    }

    pub(crate) fn take_output(&mut self) -> Option<Vec<u8>> {
        self.output.take()
    }

    pub(crate) fn host_fault(&self) -> Option<&str> {
        self.host_fault.as_deref()
    }

    pub(crate) fn begin_registration(&mut self) {
        self.registry = Some(RegistryRecorder::default());
    }

    pub(crate) fn finish_registration(&mut self) -> Option<RegistryRecorder> {
        self.registry.take()
    }
}

pub(crate) fn build_engine() -> Result<Engine> {
    let mut config = wasmtime::Config::new();
    config.consume_fuel(true);
    config.epoch_interruption(true);
    Engine::new(&config)
        .map_err(|e| Error::Internal(format!("failed to initialize wasm engine: {e}")))
}

pub(crate) fn build_linker(engine: &Engine) -> Result<Linker<HostState>> {
    let bind_failed =
        |name: &str, e: wasmtime::Error| Error::Internal(format!("failed to bind {name} hostcall: {e}"));

    let mut linker = Linker::new(engine);

    linker
        .func_wrap(
            HOST_NAMESPACE,
            "log",
            |mut caller: Caller<'_, HostState>, level: i32, ptr: i32, len: i32| {
                let Some(text) = read_plugin_string(&mut caller, ptr, len, "log message") else {
                    return;
                };
                match level {
                    0 => tracing::debug!("plugin: {text}"),
                    1 => tracing::info!("plugin: {text}"),
                    2 => tracing::warn!("plugin: {text}"),
                    _ => tracing::error!("plugin: {text}"),
                }
            },
        )
        .map_err(|e| bind_failed("log", e))?;

    linker
        .func_wrap(
            HOST_NAMESPACE,
            "set_output",
            |mut caller: Caller<'_, HostState>, ptr: i32, len: i32| -> i32 {
                let Some(bytes) = read_plugin_bytes(&mut caller, ptr, len, "output") else {
                    return -1;
                };
                caller.data_mut().output = Some(bytes);
                0
            },
        )
        .map_err(|e| bind_failed("set_output", e))?;

    linker
        .func_wrap(
            HOST_NAMESPACE,
            "resource_len",
            |mut caller: Caller<'_, HostState>, path_ptr: i32, path_len: i32| -> i32 {
                let Some(path) =
                    read_plugin_string(&mut caller, path_ptr, path_len, "resource path")
                else {
                    return -1;
                };
                let Some(size) = lookup_entry(&caller.data().resources, &path).map(<[u8]>::len)
                else {
                    return -1;
                };
                match i32::try_from(size) {
                    Ok(v) => v,
                    Err(_) => {
                        caller.data_mut().host_fault =
                            Some(format!("resource {path} exceeds addressable size"));
                        -1
                    }
                }
            },
        )
        .map_err(|e| bind_failed("resource_len", e))?;

    linker
        .func_wrap(
            HOST_NAMESPACE,
            "resource_read",
            |mut caller: Caller<'_, HostState>,
             path_ptr: i32,
             path_len: i32,
             dst_ptr: i32,
             dst_cap: i32|
             -> i32 {
                let Some(path) =
                    read_plugin_string(&mut caller, path_ptr, path_len, "resource path")
                else {
                    return -1;
                };
                let Some(bytes) =
                    lookup_entry(&caller.data().resources, &path).map(<[u8]>::to_vec)
                else {
                    return -1;
                };
                if dst_ptr < 0 || dst_cap < 0 {
                    caller.data_mut().host_fault =
                        Some("plugin passed negative resource destination".to_string());
                    return -1;
                }
                if bytes.len() > dst_cap as usize {
                    return -1;
                }
                let Some(memory) = caller.get_export("memory").and_then(|e| e.into_memory())
                else {
                    caller.data_mut().host_fault =
                        Some("wasm module did not export memory".to_string());
                    return -1;
                };
                let start = dst_ptr as usize;
                let Some(end) = start.checked_add(bytes.len()) else {
                    caller.data_mut().host_fault =
                        Some("plugin resource destination pointer overflow".to_string());
                    return -1;
                };
                let data = memory.data_mut(&mut caller);
                let size = data.len();
                if end > size {
                    caller.data_mut().host_fault = Some(format!(
                        "plugin resource destination [{start}, {end}) exceeds memory size {size}"
                    ));
                    return -1;
                }
                data[start..end].copy_from_slice(&bytes);
                i32::try_from(bytes.len()).unwrap_or(-1)
            },
        )
        .map_err(|e| bind_failed("resource_read", e))?;

    linker
        .func_wrap(
            HOST_NAMESPACE,
            "repository_new",
            |mut caller: Caller<'_, HostState>,
             key_ptr: i32,
             key_len: i32,
             lang_ptr: i32,
             lang_len: i32|
             -> i32 {
                let Some(key) =
                    read_plugin_string(&mut caller, key_ptr, key_len, "repository key")
                else {
                    return -1;
                };
                let Some(language) =
                    read_plugin_string(&mut caller, lang_ptr, lang_len, "repository language")
                else {
                    return -1;
                };
                match caller.data_mut().registry.as_mut() {
                    Some(registry) => registry.create_repository(key, language),
                    None => {
                        tracing::warn!("repository_new called outside rule-registry definition");
                        -1
                    }
                }
            },
        )
        .map_err(|e| bind_failed("repository_new", e))?;

    linker
        .func_wrap(
            HOST_NAMESPACE,
            "repository_set_name",
            |mut caller: Caller<'_, HostState>, handle: i32, ptr: i32, len: i32| -> i32 {
                let Some(name) = read_plugin_string(&mut caller, ptr, len, "repository name")
                else {
                    return -1;
                };
                let renamed = match caller.data_mut().registry.as_mut() {
                    Some(registry) => registry.set_name(handle, name),
                    None => {
                        tracing::warn!(
                            "repository_set_name called outside rule-registry definition"
                        );
                        return -1;
                    }
                };
                if renamed {
                    0
                } else {
                    caller.data_mut().host_fault =
                        Some(format!("invalid repository handle {handle}"));
                    -1
                }
            },
        )
        .map_err(|e| bind_failed("repository_set_name", e))?;

    linker
        .func_wrap(
            HOST_NAMESPACE,
            "repository_load_rules",
            |mut caller: Caller<'_, HostState>, handle: i32, path_ptr: i32, path_len: i32| -> i32 {
                let Some(path) =
                    read_plugin_string(&mut caller, path_ptr, path_len, "rules resource path")
                else {
                    return -1;
                };
                if caller.data().registry.is_none() {
                    tracing::warn!(
                        "repository_load_rules called outside rule-registry definition"
                    );
                    return -1;
                }

                let resource = lookup_entry(&caller.data().resources, &path).map(<[u8]>::to_vec);
                let Some(resource) = resource else {
                    // Absent resource data: the repository keeps zero rules
                    // and is annotated, never failed.
                    let noted = match caller.data_mut().registry.as_mut() {
                        Some(registry) => registry.note_missing_resource(handle, &path),
                        None => return -1,
                    };
                    if noted {
                        tracing::info!(
                            resource = %path,
                            "rule resource data absent; repository keeps zero rules"
                        );
                    } else {
                        caller.data_mut().host_fault =
                            Some(format!("invalid repository handle {handle}"));
                    }
                    return -1;
                };

                let rules = match parse_rules_resource(&resource) {
                    Ok(v) => v,
                    Err(reason) => {
                        caller.data_mut().host_fault =
                            Some(format!("malformed rules resource {path}: {reason}"));
                        return -1;
                    }
                };
                let count = rules.len();
                let loaded = match caller.data_mut().registry.as_mut() {
                    Some(registry) => registry.load_rules(handle, rules),
                    None => return -1,
                };
                if loaded {
                    i32::try_from(count).unwrap_or(i32::MAX)
                } else {
                    caller.data_mut().host_fault =
                        Some(format!("invalid repository handle {handle}"));
                    -1
                }
            },
        )
        .map_err(|e| bind_failed("repository_load_rules", e))?;

    linker
        .func_wrap(
            HOST_NAMESPACE,
            "repository_done",
            |mut caller: Caller<'_, HostState>, handle: i32| -> i32 {
                let committed = match caller.data_mut().registry.as_mut() {
                    Some(registry) => registry.commit(handle),
                    None => {
                        tracing::warn!("repository_done called outside rule-registry definition");
                        return -1;
                    }
                };
                if committed {
                    0
                } else {
                    caller.data_mut().host_fault =
                        Some(format!("invalid repository handle {handle}"));
                    -1
                }
            },
        )
        .map_err(|e| bind_failed("repository_done", e))?;

    Ok(linker)
}

pub(crate) fn compile_module(engine: &Engine, wasm_bytes: &[u8]) -> std::result::Result<Module, String> {
    Module::from_binary(engine, wasm_bytes).map_err(|e| format!("failed to compile wasm module: {e}"))
}

/// Structural contract check: the module must export linear `memory` and the
/// named function. Nothing is instantiated or run.
pub(crate) fn validate_module_exports(
    module: &Module,
    entry_export: &str,
) -> std::result::Result<(), String> {
    let mut has_memory = false;
    let mut has_entry = false;
    for export in module.exports() {
        match (export.name(), export.ty()) {
            ("memory", ExternType::Memory(_)) => has_memory = true,
            (name, ExternType::Func(_)) if name == entry_export => has_entry = true,
            _ => {}
        }
    }

    if !has_memory {
        return Err("module does not export memory".to_string());
    }
    if !has_entry {
        return Err(format!("module does not export {entry_export}"));
    }

    Ok(())
}

/// Rejects modules whose declared linear memory already exceeds the budget,
/// before any instantiation.
pub(crate) fn enforce_declared_memory(
    module: &Module,
    max_memory_mb: u32,
) -> std::result::Result<(), String> {
    let max_bytes = max_memory_bytes_u64(max_memory_mb);
    for export in module.exports() {
        if let ExternType::Memory(memory) = export.ty() {
            let page_size = memory.page_size();
            let declared_min_bytes = memory.minimum().saturating_mul(page_size);
            if declared_min_bytes > max_bytes {
                return Err(format!(
                    "module declares {declared_min_bytes} bytes of minimum linear memory, exceeding max_memory_mb={max_memory_mb}"
                ));
            }

            if let Some(declared_max_pages) = memory.maximum() {
                let declared_max_bytes = declared_max_pages.saturating_mul(page_size);
                if declared_max_bytes > max_bytes {
                    return Err(format!(
                        "module declares {declared_max_bytes} bytes of maximum linear memory, exceeding max_memory_mb={max_memory_mb}"
                    ));
                }
            }
        }
    }

    Ok(())
}

/// Instantiates a validated module in a fresh store with the run's resource
/// ceilings applied, and resolves its typed entry function.
pub(crate) fn instantiate_module(
    engine: &Engine,
    linker: &Linker<HostState>,
    module: &Module,
    resources: Arc<BTreeMap<String, Vec<u8>>>,
    entry_export: &str,
    limits: &ResourceLimits,
) -> std::result::Result<(Store<HostState>, TypedFunc<(), i32>), String> {
    let mut store = Store::new(engine, HostState::new(resources, limits.max_memory_mb));
    store.limiter(|state| &mut state.store_limits);
    let fuel = u64::from(limits.max_cpu_ms).saturating_mul(100_000);
    store
        .set_fuel(fuel)
        .map_err(|e| format!("failed to set wasm fuel limit: {e}"))?;
    store.set_epoch_deadline(1);

    let instance = linker
        .instantiate(&mut store, module)
        .map_err(|e| format!("instantiation trapped: {e}"))?;

    let func = instance
        .get_typed_func::<(), i32>(&mut store, entry_export)
        .map_err(|e| format!("export {entry_export} does not have the required signature: {e}"))?;

    Ok((store, func))
}

pub(crate) struct CallOutcome {
    pub status: std::result::Result<i32, String>,
    pub timed_out: bool,
}

/// Invokes a plugin function under the wall-clock watchdog. The watchdog
/// thread bumps the engine epoch when the deadline passes and is cancelled
/// as soon as the call returns, so fast calls never wait out the window.
pub(crate) fn call_with_deadline(
    engine: &Engine,
    store: &mut Store<HostState>,
    func: &TypedFunc<(), i32>,
    max_timeout_ms: u32,
) -> CallOutcome {
    let timeout_fired = Arc::new(AtomicBool::new(false));
    let timeout_fired_for_thread = Arc::clone(&timeout_fired);
    let timeout_duration = Duration::from_millis(u64::from(max_timeout_ms));
    let engine_for_thread = engine.clone();
    let (cancel_tx, cancel_rx) = mpsc::channel::<()>();
    let timeout_thread = std::thread::spawn(move || {
        if cancel_rx.recv_timeout(timeout_duration).is_err() {
            timeout_fired_for_thread.store(true, Ordering::SeqCst);
            engine_for_thread.increment_epoch();
        }
    });

    let status = func.call(&mut *store, ()).map_err(|e| e.to_string());
    let _ = cancel_tx.send(());
    let _ = timeout_thread.join();

    CallOutcome {
        status,
        timed_out: timeout_fired.load(Ordering::SeqCst),
    }
}

/// Whether a trap message indicates the CPU fuel budget ran out.
pub(crate) fn is_cpu_budget_trap(trap_text: &str) -> bool {
    trap_text.contains("all fuel consumed") || trap_text.contains("interrupt")
}

fn max_memory_bytes_u64(max_memory_mb: u32) -> u64 {
    u64::from(max_memory_mb).saturating_mul(1024 * 1024)
}

fn max_memory_bytes(max_memory_mb: u32) -> usize {
    usize::try_from(max_memory_bytes_u64(max_memory_mb)).unwrap_or(usize::MAX)
}

fn read_plugin_string(
    caller: &mut Caller<'_, HostState>,
    ptr: i32,
    len: i32,
    what: &'static str,
) -> Option<String> {
    let bytes = read_plugin_bytes(caller, ptr, len, what)?;
    match String::from_utf8(bytes) {
        Ok(s) => Some(s),
        Err(_) => {
            caller.data_mut().host_fault = Some(format!("plugin passed non-UTF8 {what}"));
            None
        }
    }
}

fn read_plugin_bytes(
    caller: &mut Caller<'_, HostState>,
    ptr: i32,
    len: i32,
    what: &'static str,
) -> Option<Vec<u8>> {
    let Some(memory) = caller.get_export("memory").and_then(|e| e.into_memory()) else {
        caller.data_mut().host_fault = Some("wasm module did not export memory".to_string());
        return None;
    };

    if ptr < 0 || len < 0 {
        caller.data_mut().host_fault =
            Some(format!("plugin passed negative {what} pointer/length"));
        return None;
    }

    let start = ptr as usize;
    let len = len as usize;
    let end = match start.checked_add(len) {
        Some(v) => v,
        None => {
            caller.data_mut().host_fault = Some(format!("plugin {what} pointer overflow"));
            return None;
        }
    };

    let data = memory.data(&*caller);
    let size = data.len();
    if end > size {
        caller.data_mut().host_fault = Some(format!(
            "plugin {what} range [{start}, {end}) exceeds memory size {size}"
        ));
        return None;
    }

    Some(data[start..end].to_vec())
}
