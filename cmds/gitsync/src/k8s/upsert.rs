//! Create-or-update of a single manifest.
//!
//! The object is looked up by name; "not found" selects create, an existing
//! object selects a full replace. Any other outcome of the lookup is an error.

use std::fmt;

use kube::{
	api::{Api, DynamicObject, PostParams},
	discovery::ApiResource,
	Client,
};
use thiserror::Error;
use tracing::instrument;

use super::{
	discovery::{self, DiscoveryError},
	ResourceScope,
};
use crate::manifest::{Manifest, ManifestError};

/// Errors that can occur during an upsert.
#[derive(Debug, Error)]
pub enum UpsertError {
	#[error("resolving resource type")]
	Discovery(#[from] DiscoveryError),

	#[error(transparent)]
	Manifest(#[from] ManifestError),

	#[error("looking up {kind}/{name}")]
	Lookup {
		kind: String,
		name: String,
		#[source]
		source: Box<kube::Error>,
	},

	#[error("creating {kind}/{name}")]
	Create {
		kind: String,
		name: String,
		#[source]
		source: Box<kube::Error>,
	},

	#[error("updating {kind}/{name}")]
	Update {
		kind: String,
		name: String,
		#[source]
		source: Box<kube::Error>,
	},
}

/// Which write the upsert performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
	Created,
	Updated,
}

impl fmt::Display for UpsertOutcome {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			UpsertOutcome::Created => write!(f, "created"),
			UpsertOutcome::Updated => write!(f, "updated"),
		}
	}
}

/// Result of a successful upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upserted {
	pub kind: String,
	pub name: String,
	/// Namespace written to, `None` for cluster-scoped kinds.
	pub namespace: Option<String>,
	pub outcome: UpsertOutcome,
	/// resourceVersion assigned by the server.
	pub resource_version: Option<String>,
}

impl fmt::Display for Upserted {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{} {}", self.kind, self.name, self.outcome)
	}
}

/// Engine for upserting manifests into a Kubernetes cluster.
pub struct UpsertEngine {
	client: Client,
	default_namespace: String,
}

impl UpsertEngine {
	/// Create a new upsert engine.
	///
	/// `default_namespace` is used for namespaced kinds whose manifest does not
	/// set `metadata.namespace`.
	pub fn new(client: Client, default_namespace: String) -> Self {
		Self {
			client,
			default_namespace,
		}
	}

	/// Create the manifest's object if it is absent, replace it if present.
	#[instrument(skip_all, fields(kind = %manifest.gvk().kind, name = %manifest.name()))]
	pub async fn upsert(&self, manifest: &Manifest) -> Result<Upserted, UpsertError> {
		let gvk = manifest.gvk();
		let name = manifest.name();

		let discovered = discovery::resolve(&self.client, gvk).await?;
		let namespace = target_namespace(
			manifest.namespace(),
			discovered.scope,
			&self.default_namespace,
		);
		tracing::debug!(
			plural = %discovered.api_resource.plural,
			namespace = namespace.as_deref().unwrap_or(""),
			"resolved target"
		);

		let api = self.dynamic_api(&discovered.api_resource, namespace.as_deref());

		// Cluster-scoped kinds carry no namespace, whatever the manifest says
		let mut object = manifest.to_dynamic_object()?;
		object.metadata.namespace.clone_from(&namespace);

		let existing = api
			.get_opt(name)
			.await
			.map_err(|e| UpsertError::Lookup {
				kind: gvk.kind.clone(),
				name: name.to_string(),
				source: Box::new(e),
			})?;

		let (outcome, written) = match existing {
			Some(live) => {
				// Replace against the revision just observed unless the manifest pins one
				if object.metadata.resource_version.is_none() {
					object.metadata.resource_version = live.metadata.resource_version;
				}
				tracing::debug!(
					resource_version = object.metadata.resource_version.as_deref().unwrap_or(""),
					"object exists, updating"
				);

				let written = api
					.replace(name, &PostParams::default(), &object)
					.await
					.map_err(|e| UpsertError::Update {
						kind: gvk.kind.clone(),
						name: name.to_string(),
						source: Box::new(e),
					})?;
				(UpsertOutcome::Updated, written)
			}
			None => {
				tracing::debug!("object not found, creating");

				let written = api
					.create(&PostParams::default(), &object)
					.await
					.map_err(|e| UpsertError::Create {
						kind: gvk.kind.clone(),
						name: name.to_string(),
						source: Box::new(e),
					})?;
				(UpsertOutcome::Created, written)
			}
		};

		Ok(Upserted {
			kind: gvk.kind.clone(),
			name: name.to_string(),
			namespace,
			outcome,
			resource_version: written.metadata.resource_version,
		})
	}

	/// Create a dynamic API for the given resource.
	fn dynamic_api(&self, ar: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
		match namespace {
			Some(ns) => Api::namespaced_with(self.client.clone(), ns, ar),
			None => Api::all_with(self.client.clone(), ar),
		}
	}
}

/// Namespace an object is written to.
///
/// Namespaced kinds use the manifest's own namespace, falling back to the
/// default. Cluster-scoped kinds have none.
fn target_namespace(
	manifest_namespace: Option<&str>,
	scope: ResourceScope,
	default_namespace: &str,
) -> Option<String> {
	match scope {
		ResourceScope::Namespaced => {
			Some(manifest_namespace.unwrap_or(default_namespace).to_string())
		}
		ResourceScope::ClusterWide => None,
	}
}
