//! Descriptor classification. Each descriptor the entry point emitted is
//! inspected by shape and dispatched to the matching report node; rule
//! registries are additionally driven to capture what they would register.

use serde_json::Value;

use crate::bundle::BundleArchive;
use crate::report::ExtensionNode;
use crate::runtime::{define_rules, json_type_name, HostState, ResourceLimits};

/// Classifies every descriptor in emission order. Classification never
/// fails the run: a descriptor that fits no known shape, or a registry
/// whose definition fails, becomes an `Unknown` node and inspection moves
/// on to the next descriptor.
pub(crate) fn classify_descriptors(
    engine: &wasmtime::Engine,
    linker: &wasmtime::Linker<HostState>,
    archive: &BundleArchive,
    descriptors: Vec<Value>,
    limits: &ResourceLimits,
) -> Vec<ExtensionNode> {
    descriptors
        .into_iter()
        .map(|descriptor| classify_descriptor(engine, linker, archive, descriptor, limits))
        .collect()
}

fn classify_descriptor(
    engine: &wasmtime::Engine,
    linker: &wasmtime::Linker<HostState>,
    archive: &BundleArchive,
    descriptor: Value,
    limits: &ResourceLimits,
) -> ExtensionNode {
    if let Some(node) = as_property_definition(&descriptor) {
        tracing::debug!("classified descriptor as a property definition");
        return node;
    }

    if let Value::String(module_path) = descriptor {
        if archive.contains(&module_path) {
            return match define_rules(engine, linker, archive, &module_path, limits) {
                Ok(repositories) => {
                    tracing::debug!(
                        module = %module_path,
                        repositories = repositories.len(),
                        "classified descriptor as a rules definition"
                    );
                    ExtensionNode::RulesDefinition {
                        class: module_path,
                        repositories,
                    }
                }
                Err(reason) => {
                    tracing::warn!(
                        module = %module_path,
                        reason = %reason,
                        "rule-registry definition failed; recording descriptor as unknown"
                    );
                    ExtensionNode::Unknown {
                        class: module_path,
                        error: Some(reason),
                    }
                }
            };
        }
        tracing::debug!(value = %module_path, "descriptor names no bundle module");
        return ExtensionNode::Unknown {
            class: "string".to_string(),
            error: None,
        };
    }

    tracing::debug!(kind = json_type_name(&descriptor), "descriptor shape not recognized");
    ExtensionNode::Unknown {
        class: json_type_name(&descriptor).to_string(),
        error: None,
    }
}

/// A property definition is an object carrying string `key` and
/// `defaultValue` fields. Extra fields are preserved nowhere; only the two
/// identifying fields reach the report.
fn as_property_definition(descriptor: &Value) -> Option<ExtensionNode> {
    let object = descriptor.as_object()?;
    let key = object.get("key")?.as_str()?;
    let default_value = object.get("defaultValue")?.as_str()?;
    Some(ExtensionNode::PropertyDefinition {
        class: "object".to_string(),
        key: key.to_string(),
        default_value: default_value.to_string(),
    })
}
