//! Kubernetes cluster connection management.

use std::{path::Path, time::Duration};

use k8s_openapi::apimachinery::pkg::version::Info;
use kube::{
	config::{KubeConfigOptions, Kubeconfig, KubeconfigError},
	Client, Config,
};
use thiserror::Error;
use tracing::instrument;

/// Default timeout for Kubernetes API requests.
const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur when connecting to a Kubernetes cluster.
#[derive(Debug, Error)]
pub enum ConnectionError {
	#[error("no context named `{0}` was found. Please check your kubeconfig")]
	ContextNotFound(String),

	#[error("kubeconfig has no current-context; use --context to select one")]
	NoCurrentContext,

	#[error("no kubeconfig found and not running inside a cluster")]
	NoConfig(#[source] KubeconfigError),

	#[error(transparent)]
	Kubeconfig(#[from] KubeconfigError),

	#[error(transparent)]
	Kube(#[from] kube::Error),
}

/// Represents a connection to a Kubernetes cluster.
///
/// Holds the kube client together with the server version fetched while
/// connecting, so an unreachable cluster fails before any manifest is read.
#[derive(Clone)]
pub struct ClusterConnection {
	client: Client,
	server_version: Info,
	/// Human-readable identifier for the cluster (context name or `in-cluster`).
	cluster_identifier: String,
}

impl std::fmt::Debug for ClusterConnection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ClusterConnection")
			.field("cluster_identifier", &self.cluster_identifier)
			.field("server_version", &self.server_version)
			.finish_non_exhaustive()
	}
}

impl ClusterConnection {
	/// Connect using a kubeconfig file.
	///
	/// With an explicit `kubeconfig_path` only that file is read. Without one,
	/// `$KUBECONFIG` and `~/.kube/config` are tried, and when neither exists the
	/// in-cluster service account is used.
	#[instrument(skip_all)]
	pub async fn connect(
		kubeconfig_path: Option<&Path>,
		context: Option<&str>,
	) -> Result<Self, ConnectionError> {
		if let Some(path) = kubeconfig_path {
			tracing::debug!(path = %path.display(), "reading kubeconfig");
			let kubeconfig = Kubeconfig::read_from(path)?;
			return Self::from_kubeconfig(kubeconfig, context).await;
		}

		match Kubeconfig::read() {
			Ok(kubeconfig) => Self::from_kubeconfig(kubeconfig, context).await,
			Err(e) if context.is_none() => match Config::incluster() {
				Ok(config) => Self::from_config(config, "in-cluster".to_string()).await,
				Err(incluster) => {
					tracing::debug!(error = %incluster, "in-cluster config not available");
					Err(ConnectionError::NoConfig(e))
				}
			},
			Err(e) => Err(e.into()),
		}
	}

	/// Connect using an already-loaded kubeconfig.
	///
	/// `context` selects a context by name; otherwise the kubeconfig's
	/// current-context is used.
	#[instrument(skip(kubeconfig))]
	pub async fn from_kubeconfig(
		kubeconfig: Kubeconfig,
		context: Option<&str>,
	) -> Result<Self, ConnectionError> {
		let context_name = select_context(&kubeconfig, context)?;
		tracing::debug!(context = %context_name, "using kubeconfig context");

		let config = Config::from_custom_kubeconfig(
			kubeconfig,
			&KubeConfigOptions {
				context: Some(context_name.clone()),
				..Default::default()
			},
		)
		.await?;

		Self::from_config(config, format!("context:{}", context_name)).await
	}

	async fn from_config(
		mut config: Config,
		cluster_identifier: String,
	) -> Result<Self, ConnectionError> {
		config.read_timeout = Some(DEFAULT_API_TIMEOUT);
		let client = Client::try_from(config)?;

		let server_version = client.apiserver_version().await?;

		Ok(Self {
			client,
			server_version,
			cluster_identifier,
		})
	}

	/// Get a reference to the underlying kube client.
	pub fn client(&self) -> &Client {
		&self.client
	}

	/// Get the server version.
	pub fn server_version(&self) -> &Info {
		&self.server_version
	}

	/// Get the cluster identifier (context name or `in-cluster`).
	pub fn cluster_identifier(&self) -> &str {
		&self.cluster_identifier
	}
}

/// Pick the context to connect with: the requested one if it exists,
/// else the kubeconfig's current-context.
fn select_context(
	kubeconfig: &Kubeconfig,
	requested: Option<&str>,
) -> Result<String, ConnectionError> {
	match requested {
		Some(name) => {
			if kubeconfig.contexts.iter().any(|c| c.name == name) {
				Ok(name.to_string())
			} else {
				Err(ConnectionError::ContextNotFound(name.to_string()))
			}
		}
		None => kubeconfig
			.current_context
			.clone()
			.filter(|c| !c.is_empty())
			.ok_or(ConnectionError::NoCurrentContext),
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use kube::config::NamedContext;

	use super::*;

	fn kubeconfig_with_contexts(names: &[&str], current: Option<&str>) -> Kubeconfig {
		Kubeconfig {
			contexts: names
				.iter()
				.map(|n| NamedContext {
					name: (*n).to_string(),
					context: None,
				})
				.collect(),
			current_context: current.map(str::to_string),
			..Default::default()
		}
	}

	#[test]
	fn test_select_requested_context() {
		let kubeconfig = kubeconfig_with_contexts(&["dev", "prod"], Some("dev"));

		assert_eq!(select_context(&kubeconfig, Some("prod")).unwrap(), "prod");
	}

	#[test]
	fn test_select_current_context() {
		let kubeconfig = kubeconfig_with_contexts(&["dev", "prod"], Some("dev"));

		assert_eq!(select_context(&kubeconfig, None).unwrap(), "dev");
	}

	#[test]
	fn test_select_missing_context() {
		let kubeconfig = kubeconfig_with_contexts(&["dev"], Some("dev"));

		assert_matches!(
			select_context(&kubeconfig, Some("staging")),
			Err(ConnectionError::ContextNotFound(name)) if name == "staging"
		);
	}

	#[tokio::test]
	async fn test_connect_without_current_context_errors() {
		let result = ClusterConnection::from_kubeconfig(Kubeconfig::default(), None).await;
		assert_matches!(result, Err(ConnectionError::NoCurrentContext));
	}

	#[tokio::test]
	async fn test_connect_missing_kubeconfig_file_errors() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("missing-config");

		let result = ClusterConnection::connect(Some(&path), None).await;
		assert_matches!(result, Err(ConnectionError::Kubeconfig(_)));
	}
}
