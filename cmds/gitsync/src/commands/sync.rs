//! Sync command handler.
//!
//! Reads one manifest and creates or updates its object in the cluster.

use std::{io::Write, path::PathBuf};

use anyhow::{Context, Result};
use bon::Builder;
use clap::Args;
use tracing::instrument;

use crate::{
	k8s::{
		client::ClusterConnection,
		upsert::{UpsertEngine, Upserted},
	},
	manifest::{Manifest, DEFAULT_MANIFEST_PATH},
};

/// Namespace used when neither the manifest nor `--namespace` sets one.
pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Args)]
pub struct SyncArgs {
	/// (optional) path to the kubeconfig file. Defaults to $KUBECONFIG, then ~/.kube/config
	#[arg(long)]
	pub kubeconfig: Option<PathBuf>,

	/// Kubeconfig context to use instead of the current context
	#[arg(long)]
	pub context: Option<String>,

	/// Manifest file holding the object to create or update
	#[arg(short = 'f', long, default_value = DEFAULT_MANIFEST_PATH)]
	pub manifest: PathBuf,

	/// Namespace for namespaced objects whose manifest does not set one
	#[arg(short = 'n', long, default_value = DEFAULT_NAMESPACE)]
	pub namespace: String,
}

/// Options for a sync run.
#[derive(Debug, Clone, Builder)]
pub struct SyncOpts {
	/// Kubeconfig file; platform default resolution when unset.
	pub kubeconfig: Option<PathBuf>,
	/// Kubeconfig context; current context when unset.
	pub context: Option<String>,
	#[builder(default = PathBuf::from(DEFAULT_MANIFEST_PATH))]
	pub manifest: PathBuf,
	#[builder(default = DEFAULT_NAMESPACE.to_string())]
	pub namespace: String,
}

impl From<SyncArgs> for SyncOpts {
	fn from(args: SyncArgs) -> Self {
		Self {
			kubeconfig: args.kubeconfig,
			context: args.context,
			manifest: args.manifest,
			namespace: args.namespace,
		}
	}
}

/// Run the sync command.
pub async fn run<W: Write>(args: SyncArgs, writer: W) -> Result<()> {
	sync(None, args.into(), writer).await?;
	Ok(())
}

/// Create or update the manifest's object.
///
/// Connects first (unless a connection is supplied), then reads the manifest,
/// so a bad kubeconfig is reported before a bad manifest. Every failure is
/// returned as-is; nothing is retried.
#[instrument(skip_all, fields(manifest = %opts.manifest.display()))]
pub async fn sync<W: Write>(
	connection: Option<ClusterConnection>,
	opts: SyncOpts,
	mut writer: W,
) -> Result<Upserted> {
	let connection = match connection {
		Some(conn) => conn,
		None => {
			tracing::debug!("connecting to Kubernetes cluster");
			ClusterConnection::connect(opts.kubeconfig.as_deref(), opts.context.as_deref())
				.await
				.context("connecting to Kubernetes cluster")?
		}
	};
	tracing::debug!(
		cluster = %connection.cluster_identifier(),
		server_version = %connection.server_version().git_version,
		"connected to cluster"
	);

	let manifest = Manifest::load(&opts.manifest)
		.with_context(|| format!("loading manifest {}", opts.manifest.display()))?;

	let engine = UpsertEngine::new(connection.client().clone(), opts.namespace);
	let upserted = engine.upsert(&manifest).await.with_context(|| {
		format!("syncing {}/{}", manifest.gvk().kind, manifest.name())
	})?;

	tracing::info!(
		kind = %upserted.kind,
		name = %upserted.name,
		namespace = upserted.namespace.as_deref().unwrap_or(""),
		outcome = %upserted.outcome,
		"object synced"
	);
	writeln!(writer, "{upserted}")?;

	Ok(upserted)
}
