//! Kubernetes API resource discovery.
//!
//! Maps a manifest's apiVersion and kind onto the API resource that serves
//! it: the plural name used in URL paths and whether it is namespaced.

use kube::{
	core::GroupVersionKind,
	discovery::{oneshot::pinned_kind, ApiCapabilities, ApiResource},
	Client, Discovery,
};
use thiserror::Error;
use tracing::instrument;

use super::ResourceScope;

/// Errors that can occur during API resource discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
	#[error("unknown resource type: {api_version}/{kind}")]
	UnknownResourceType { api_version: String, kind: String },

	#[error("failed to discover resource {api_version}/{kind}")]
	ResourceDiscovery {
		api_version: String,
		kind: String,
		#[source]
		source: Box<kube::Error>,
	},
}

/// Discovered API resource with its scope.
#[derive(Debug, Clone)]
pub struct DiscoveredResource {
	/// The kube ApiResource for making API calls.
	pub api_resource: ApiResource,
	/// Whether this resource is namespaced or cluster-wide.
	pub scope: ResourceScope,
}

impl DiscoveredResource {
	fn new(api_resource: ApiResource, capabilities: &ApiCapabilities) -> Self {
		Self {
			api_resource,
			scope: ResourceScope::from(&capabilities.scope),
		}
	}
}

/// Resolve a GroupVersionKind against the cluster's discovery API.
///
/// Uses the Aggregated Discovery API (K8s 1.26+), which needs two requests.
/// On older clusters, or when the kind is missing from the aggregated
/// document, only the single group version is queried.
#[instrument(skip(client), fields(api_version = %gvk.api_version(), kind = %gvk.kind))]
pub async fn resolve(
	client: &Client,
	gvk: &GroupVersionKind,
) -> Result<DiscoveredResource, DiscoveryError> {
	match Discovery::new(client.clone()).run_aggregated().await {
		Ok(discovery) => {
			if let Some((ar, caps)) = discovery.resolve_gvk(gvk) {
				tracing::debug!(plural = %ar.plural, "resolved via aggregated discovery");
				return Ok(DiscoveredResource::new(ar, &caps));
			}
			tracing::debug!("kind missing from aggregated discovery");
		}
		Err(e) => {
			tracing::debug!(error = %e, "aggregated discovery not available");
		}
	}

	match pinned_kind(client, gvk).await {
		Ok((ar, caps)) => {
			tracing::debug!(plural = %ar.plural, "resolved via group version discovery");
			Ok(DiscoveredResource::new(ar, &caps))
		}
		Err(e) if is_unknown(&e) => Err(DiscoveryError::UnknownResourceType {
			api_version: gvk.api_version(),
			kind: gvk.kind.clone(),
		}),
		Err(e) => Err(DiscoveryError::ResourceDiscovery {
			api_version: gvk.api_version(),
			kind: gvk.kind.clone(),
			source: Box::new(e),
		}),
	}
}

/// Whether a discovery failure means the group version or kind does not exist.
fn is_unknown(error: &kube::Error) -> bool {
	match error {
		kube::Error::Api(err) => err.code == 404,
		kube::Error::Discovery(_) => true,
		_ => false,
	}
}
