//! Isolated wasm runtime for plugin modules: engine construction, the
//! `plugin_host` import surface, entry-point activation, and rule-registry
//! definition.

mod activator;
mod host;
mod registry;

pub use host::{ResourceLimits, ENTRY_POINT_EXPORT, HOST_NAMESPACE, RULES_DEFINE_EXPORT};

pub(crate) use activator::{enumerate_extensions, json_type_name};
pub(crate) use host::{build_engine, build_linker, HostState};
pub(crate) use registry::define_rules;
