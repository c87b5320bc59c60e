//! Entry-point activation: instantiates the declared entry-point module and
//! invokes `plugin_extensions` exactly once to obtain the descriptor list.

use serde_json::Value;

use crate::bundle::BundleArchive;
use crate::error::{Error, Result};

use super::host::{
    call_with_deadline, compile_module, enforce_declared_memory, instantiate_module,
    is_cpu_budget_trap, validate_module_exports, HostState, ResourceLimits, ENTRY_POINT_EXPORT,
};

/// Runs the entry point and returns its descriptors in emission order.
///
/// The module must emit one JSON array through `set_output` and return 0.
/// Each failure mode maps to its own error kind so callers can tell a bundle
/// whose module is absent from one whose module cannot be constructed or
/// never yields a result.
pub(crate) fn enumerate_extensions(
    engine: &wasmtime::Engine,
    linker: &wasmtime::Linker<HostState>,
    archive: &BundleArchive,
    entry_path: &str,
    limits: &ResourceLimits,
) -> Result<Vec<Value>> {
    let construction_failed = |reason: String| Error::EntryPointConstructionFailed {
        path: archive.path().to_path_buf(),
        module: entry_path.to_string(),
        reason,
    };
    let enumeration_failed = |reason: String| Error::ExtensionEnumerationFailed {
        path: archive.path().to_path_buf(),
        module: entry_path.to_string(),
        reason,
    };

    let wasm_bytes = archive
        .read(entry_path)
        .ok_or_else(|| Error::EntryPointNotFound {
            path: archive.path().to_path_buf(),
            module: entry_path.to_string(),
        })?
        .to_vec();

    let module = compile_module(engine, &wasm_bytes).map_err(construction_failed)?;
    validate_module_exports(&module, ENTRY_POINT_EXPORT).map_err(construction_failed)?;
    enforce_declared_memory(&module, limits.max_memory_mb).map_err(construction_failed)?;
    let (mut store, func) = instantiate_module(
        engine,
        linker,
        &module,
        archive.entries(),
        ENTRY_POINT_EXPORT,
        limits,
    )
    .map_err(construction_failed)?;

    tracing::debug!(module = entry_path, "invoking plugin entry point");
    let outcome = call_with_deadline(engine, &mut store, &func, limits.max_timeout_ms);

    if let Some(fault) = store.data().host_fault() {
        return Err(enumeration_failed(format!("hostcall fault: {fault}")));
    }

    let status = match outcome.status {
        Ok(status) => status,
        Err(trap_text) => {
            if outcome.timed_out {
                return Err(Error::EntryPointTimeout {
                    path: archive.path().to_path_buf(),
                    module: entry_path.to_string(),
                    reason: format!("no result within {}ms", limits.max_timeout_ms),
                });
            }
            if is_cpu_budget_trap(&trap_text) {
                return Err(Error::EntryPointTimeout {
                    path: archive.path().to_path_buf(),
                    module: entry_path.to_string(),
                    reason: format!("CPU budget ({}ms) exhausted", limits.max_cpu_ms),
                });
            }
            return Err(enumeration_failed(format!("trapped: {trap_text}")));
        }
    };
    if status != 0 {
        return Err(enumeration_failed(format!(
            "returned non-zero status {status}"
        )));
    }

    let raw = store
        .data_mut()
        .take_output()
        .ok_or_else(|| {
            enumeration_failed("returned success without emitting a descriptor list".to_string())
        })?;
    let text = String::from_utf8(raw)
        .map_err(|_| enumeration_failed("emitted a non-UTF8 descriptor list".to_string()))?;
    let value: Value = serde_json::from_str(&text)
        .map_err(|e| enumeration_failed(format!("emitted invalid descriptor JSON: {e}")))?;

    match value {
        Value::Array(descriptors) => {
            tracing::debug!(count = descriptors.len(), "entry point enumerated descriptors");
            Ok(descriptors)
        }
        other => Err(enumeration_failed(format!(
            "descriptor list must be a JSON array, got {}",
            json_type_name(&other)
        ))),
    }
}

/// JSON value kind as it appears in reports and error messages.
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
