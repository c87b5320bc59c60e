use std::io::Write;
use std::path::PathBuf;

use plugsight::{
    default_report_path, BundleInspector, ExtensionNode, InspectorOptions, ResourceLimits,
};

use crate::ExitCode;

#[derive(Clone, Debug)]
pub struct InspectArgs {
    pub bundle: String,
    pub output: Option<String>,
    pub max_memory_mb: u32,
    pub max_cpu_ms: u32,
    pub timeout_ms: u32,
}

/// Inspects one bundle, writes the report file, and prints a summary of the
/// discovered extensions.
pub fn cmd_inspect(args: InspectArgs, stdout: &mut dyn Write, stderr: &mut dyn Write) -> ExitCode {
    let bundle_path = PathBuf::from(&args.bundle);
    let report_path = match &args.output {
        Some(path) => PathBuf::from(path),
        None => default_report_path(&bundle_path),
    };

    let inspector = BundleInspector::new(InspectorOptions {
        resources: ResourceLimits {
            max_memory_mb: args.max_memory_mb,
            max_cpu_ms: args.max_cpu_ms,
            max_timeout_ms: args.timeout_ms,
        },
    });

    let report = match inspector.inspect_to_file(&bundle_path, &report_path) {
        Ok(report) => report,
        Err(e) => {
            let _ = writeln!(stderr, "Error: {e}");
            return ExitCode::Failure;
        }
    };

    let _ = writeln!(stdout, "Bundle: {}", report.bundle_path);
    let _ = writeln!(stdout, "Report: {}", report_path.display());
    let _ = writeln!(stdout, "Manifest attributes: {}", report.manifest.len());
    let _ = writeln!(stdout, "Extensions:");
    for node in &report.extensions {
        match node {
            ExtensionNode::PropertyDefinition {
                key,
                default_value,
                ..
            } => {
                let _ = writeln!(stdout, "- property {key} (default {default_value:?})");
            }
            ExtensionNode::RulesDefinition {
                class,
                repositories,
            } => {
                let _ = writeln!(
                    stdout,
                    "- rules {class} ({} repositories)",
                    repositories.len()
                );
            }
            ExtensionNode::Unknown { class, error } => match error {
                Some(reason) => {
                    let _ = writeln!(stdout, "- unknown {class}: {reason}");
                }
                None => {
                    let _ = writeln!(stdout, "- unknown {class}");
                }
            },
        }
    }

    ExitCode::Ok
}
