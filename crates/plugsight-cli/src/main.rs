//! Plugsight CLI - Inspect packaged analyzer plugins
//!
//! Commands:
//! - plugsight inspect <bundle> [output] - Activate a plugin bundle in an
//!   isolated runtime and dump what it would contribute to a host

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use plugsight_cli::{cmd_inspect, InspectArgs};

#[derive(Parser)]
#[command(name = "plugsight")]
#[command(about = "Plugin bundle inspection CLI", long_about = None)]
struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect a plugin bundle and write its extension report
    Inspect {
        /// Path to the plugin bundle (zip)
        bundle: String,

        /// Report output path (defaults to the bundle path plus ".dump.json")
        output: Option<String>,

        /// Linear memory ceiling per plugin invocation, in MiB
        #[arg(long, default_value_t = 64)]
        max_memory_mb: u32,

        /// CPU budget per plugin invocation, in milliseconds
        #[arg(long, default_value_t = 100)]
        max_cpu_ms: u32,

        /// Wall-clock deadline per plugin invocation, in milliseconds
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u32,
    },
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            use clap::error::ErrorKind;
            if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                e.exit();
            }
            // Usage problems share the single failure exit code.
            println!("{e}");
            std::process::exit(1);
        }
    };

    // Initialize logging
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::filter::LevelFilter::from_level(
            log_level,
        ))
        .init();

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "plugsight starting");

    let code = match cli.command {
        Commands::Inspect {
            bundle,
            output,
            max_memory_mb,
            max_cpu_ms,
            timeout_ms,
        } => cmd_inspect(
            InspectArgs {
                bundle,
                output,
                max_memory_mb,
                max_cpu_ms,
                timeout_ms,
            },
            &mut std::io::stdout(),
            &mut std::io::stderr(),
        ),
    };

    std::process::exit(code.as_i32());
}
