//! Rule-registry definition: drives a module's `rules_define` export against
//! a recording registration surface and collects the committed repositories.

use serde::Deserialize;

use crate::bundle::BundleArchive;
use crate::report::{Repository, Rule};

use super::host::{
    call_with_deadline, compile_module, enforce_declared_memory, instantiate_module,
    is_cpu_budget_trap, validate_module_exports, HostState, ResourceLimits, RULES_DEFINE_EXPORT,
};

/// Records repository registrations made through the `repository_*`
/// hostcalls. Handles are indices into creation order; only repositories
/// whose `repository_done` was observed survive into the report.
#[derive(Debug, Default)]
pub(crate) struct RegistryRecorder {
    repositories: Vec<RepositoryRecord>,
}

#[derive(Debug)]
struct RepositoryRecord {
    repository: Repository,
    committed: bool,
}

impl RegistryRecorder {
    pub(crate) fn create_repository(&mut self, key: String, language: String) -> i32 {
        let handle = i32::try_from(self.repositories.len()).unwrap_or(-1);
        if handle < 0 {
            return -1;
        }
        self.repositories.push(RepositoryRecord {
            repository: Repository {
                key,
                name: String::new(),
                language,
                rules: Vec::new(),
                note: None,
            },
            committed: false,
        });
        handle
    }

    pub(crate) fn set_name(&mut self, handle: i32, name: String) -> bool {
        match self.record_mut(handle) {
            Some(record) => {
                record.repository.name = name;
                true
            }
            None => false,
        }
    }

    pub(crate) fn load_rules(&mut self, handle: i32, rules: Vec<Rule>) -> bool {
        match self.record_mut(handle) {
            Some(record) => {
                record.repository.rules.extend(rules);
                true
            }
            None => false,
        }
    }

    pub(crate) fn note_missing_resource(&mut self, handle: i32, path: &str) -> bool {
        match self.record_mut(handle) {
            Some(record) => {
                record.repository.note = Some(format!("rule resource data absent: {path}"));
                true
            }
            None => false,
        }
    }

    pub(crate) fn commit(&mut self, handle: i32) -> bool {
        match self.record_mut(handle) {
            Some(record) => {
                record.committed = true;
                true
            }
            None => false,
        }
    }

    pub(crate) fn into_committed(self) -> Vec<Repository> {
        self.repositories
            .into_iter()
            .filter(|record| record.committed)
            .map(|record| record.repository)
            .collect()
    }

    fn record_mut(&mut self, handle: i32) -> Option<&mut RepositoryRecord> {
        let index = usize::try_from(handle).ok()?;
        self.repositories.get_mut(index)
    }
}

#[derive(Debug, Deserialize)]
struct RulesResource {
    #[serde(default)]
    rules: Vec<RuleResourceEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RuleResourceEntry {
    key: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    internal_key: String,
    #[serde(default = "default_severity")]
    severity: String,
}

fn default_severity() -> String {
    "MAJOR".to_string()
}

/// Parses a `*.rules.json` bundle resource. `key` is required per rule;
/// `name` and `internalKey` default to empty, `severity` to `MAJOR`.
pub(crate) fn parse_rules_resource(bytes: &[u8]) -> std::result::Result<Vec<Rule>, String> {
    let resource: RulesResource =
        serde_json::from_slice(bytes).map_err(|e| format!("invalid rules JSON: {e}"))?;
    Ok(resource
        .rules
        .into_iter()
        .map(|entry| Rule {
            key: entry.key,
            name: entry.name,
            internal_key: entry.internal_key,
            severity: entry.severity,
        })
        .collect())
}

/// Drives one rule-registry module to completion and returns its committed
/// repositories in creation order. Any failure is reported as a reason
/// string; the caller decides how it surfaces in the report.
pub(crate) fn define_rules(
    engine: &wasmtime::Engine,
    linker: &wasmtime::Linker<HostState>,
    archive: &BundleArchive,
    module_path: &str,
    limits: &ResourceLimits,
) -> std::result::Result<Vec<Repository>, String> {
    let wasm_bytes = archive
        .read(module_path)
        .ok_or_else(|| format!("module {module_path} absent from bundle"))?
        .to_vec();

    let module = compile_module(engine, &wasm_bytes)?;
    validate_module_exports(&module, RULES_DEFINE_EXPORT)?;
    enforce_declared_memory(&module, limits.max_memory_mb)?;

    let (mut store, func) = instantiate_module(
        engine,
        linker,
        &module,
        archive.entries(),
        RULES_DEFINE_EXPORT,
        limits,
    )?;

    store.data_mut().begin_registration();
    tracing::debug!(module = module_path, "driving rule-registry definition");
    let outcome = call_with_deadline(engine, &mut store, &func, limits.max_timeout_ms);

    if let Some(fault) = store.data().host_fault() {
        return Err(format!("hostcall fault: {fault}"));
    }

    let status = match outcome.status {
        Ok(status) => status,
        Err(trap_text) => {
            if outcome.timed_out {
                return Err(format!(
                    "definition produced no result within {}ms",
                    limits.max_timeout_ms
                ));
            }
            if is_cpu_budget_trap(&trap_text) {
                return Err(format!(
                    "definition exhausted its CPU budget ({}ms)",
                    limits.max_cpu_ms
                ));
            }
            return Err(format!("definition trapped: {trap_text}"));
        }
    };
    if status != 0 {
        return Err(format!("definition returned non-zero status {status}"));
    }

    let recorder = store
        .data_mut()
        .finish_registration()
        .unwrap_or_default();
    Ok(recorder.into_committed())
}
