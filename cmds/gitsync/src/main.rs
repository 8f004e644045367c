use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gitsync::{commands, telemetry};
use tracing::Level;

#[derive(Parser)]
#[command(name = "gitsync")]
#[command(about = "Create or update a manifest's object in a Kubernetes cluster", long_about = None)]
#[command(version)]
struct Cli {
	/// Log level (trace, debug, info, warn, error). Falls back to RUST_LOG, then info
	#[arg(long, global = true)]
	log_level: Option<Level>,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
enum Commands {
	/// Create the manifest's object, or update it if it already exists
	Sync(commands::sync::SyncArgs),

	/// Print the GitSync CustomResourceDefinition
	Crd(commands::crd::CrdArgs),
}

fn main() -> Result<()> {
	let cli = Cli::parse();

	// The cluster calls run one after another; a single worker is enough to
	// drive them and the OTLP exporter.
	let runtime = tokio::runtime::Builder::new_multi_thread()
		.worker_threads(1)
		.enable_all()
		.build()
		.context("creating tokio runtime")?;
	let _runtime_guard = runtime.enter();
	let _telemetry = telemetry::init(cli.log_level)?;

	let stdout = std::io::stdout().lock();

	match cli.command {
		Commands::Sync(args) => runtime.block_on(commands::sync::run(args, stdout)),
		Commands::Crd(args) => commands::crd::run(args, stdout),
	}
}
