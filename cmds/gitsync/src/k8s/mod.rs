//! Kubernetes access for the upsert: connection, discovery, and the
//! create-or-update call itself.

pub mod client;
pub mod discovery;
pub mod upsert;

/// Kubernetes API resource scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceScope {
	/// Resource is namespaced (e.g., ConfigMap, GitSync).
	Namespaced,

	/// Resource is cluster-wide (e.g., Namespace, CustomResourceDefinition).
	ClusterWide,
}

impl From<&kube::discovery::Scope> for ResourceScope {
	fn from(scope: &kube::discovery::Scope) -> Self {
		match scope {
			kube::discovery::Scope::Namespaced => ResourceScope::Namespaced,
			kube::discovery::Scope::Cluster => ResourceScope::ClusterWide,
		}
	}
}
