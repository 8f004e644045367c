//! Mock Kubernetes API discovery types.

use std::collections::BTreeMap;

/// Discovery mode for the mock server.
#[derive(Debug, Clone, Copy, Default)]
pub enum DiscoveryMode {
	/// Support aggregated discovery (APIGroupDiscoveryList).
	#[default]
	Aggregated,
	/// Return 406 for aggregated discovery, forcing fallback to per-version endpoints.
	Legacy,
}

/// Resource types the mock server knows about, keyed by group version.
///
/// The core group is stored under `v1`, every other group under `group/version`.
pub struct MockDiscovery {
	pub resources: BTreeMap<String, Vec<MockApiResource>>,
}

impl Default for MockDiscovery {
	fn default() -> Self {
		Self {
			resources: BTreeMap::from([
				(
					"v1".to_string(),
					vec![
						MockApiResource::namespaced("configmaps", "ConfigMap"),
						MockApiResource::namespaced("secrets", "Secret"),
						MockApiResource::namespaced("services", "Service"),
						MockApiResource::cluster_scoped("namespaces", "Namespace"),
					],
				),
				(
					"apps/v1".to_string(),
					vec![MockApiResource::namespaced("deployments", "Deployment")],
				),
				(
					"gitsync.io/v1alpha1".to_string(),
					vec![MockApiResource::namespaced("gitsyncs", "GitSync")],
				),
			]),
		}
	}
}

impl MockDiscovery {
	/// Find the resource serving `kind` in `api_version`.
	pub fn find(&self, api_version: &str, kind: &str) -> Option<&MockApiResource> {
		self.resources
			.get(api_version)?
			.iter()
			.find(|r| r.kind == kind)
	}

	/// Group versions other than the core `v1`.
	pub fn groups(&self) -> impl Iterator<Item = (&str, &[MockApiResource])> {
		self.resources
			.iter()
			.filter(|(gv, _)| gv.contains('/'))
			.map(|(gv, rs)| (gv.as_str(), rs.as_slice()))
	}

	/// Resources of the core group.
	pub fn core(&self) -> &[MockApiResource] {
		self.resources.get("v1").map_or(&[], Vec::as_slice)
	}
}

/// A mock API resource definition.
pub struct MockApiResource {
	/// Plural resource name, as it appears in URL paths.
	pub name: String,
	pub kind: String,
	pub namespaced: bool,
	pub verbs: Vec<String>,
}

impl MockApiResource {
	pub fn namespaced(name: &str, kind: &str) -> Self {
		Self::new(name, kind, true)
	}

	pub fn cluster_scoped(name: &str, kind: &str) -> Self {
		Self::new(name, kind, false)
	}

	fn new(name: &str, kind: &str, namespaced: bool) -> Self {
		Self {
			name: name.to_string(),
			kind: kind.to_string(),
			namespaced,
			verbs: ["create", "delete", "get", "list", "patch", "update", "watch"]
				.into_iter()
				.map(String::from)
				.collect(),
		}
	}

	/// Collection path for this resource, e.g. `/apis/apps/v1/namespaces/default/deployments`.
	pub fn collection_path(&self, api_version: &str, namespace: Option<&str>) -> String {
		let prefix = if api_version.contains('/') {
			format!("/apis/{api_version}")
		} else {
			format!("/api/{api_version}")
		};
		match (self.namespaced, namespace) {
			(true, ns) => format!("{prefix}/namespaces/{}/{}", ns.unwrap_or("default"), self.name),
			(false, _) => format!("{prefix}/{}", self.name),
		}
	}

	pub(crate) fn scope(&self) -> &'static str {
		if self.namespaced {
			"Namespaced"
		} else {
			"Cluster"
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_collection_paths() {
		let discovery = MockDiscovery::default();

		let cm = discovery.find("v1", "ConfigMap").unwrap();
		assert_eq!(
			cm.collection_path("v1", Some("team-a")),
			"/api/v1/namespaces/team-a/configmaps"
		);

		let ns = discovery.find("v1", "Namespace").unwrap();
		assert_eq!(ns.collection_path("v1", Some("ignored")), "/api/v1/namespaces");

		let gs = discovery.find("gitsync.io/v1alpha1", "GitSync").unwrap();
		assert_eq!(
			gs.collection_path("gitsync.io/v1alpha1", None),
			"/apis/gitsync.io/v1alpha1/namespaces/default/gitsyncs"
		);
	}

	#[test]
	fn test_groups_excludes_core() {
		let discovery = MockDiscovery::default();
		let groups: Vec<_> = discovery.groups().map(|(gv, _)| gv).collect();

		assert_eq!(groups, vec!["apps/v1", "gitsync.io/v1alpha1"]);
		assert_eq!(discovery.core().len(), 4);
	}
}
