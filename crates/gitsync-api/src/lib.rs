//! GitSync custom resource definition.
//!
//! `GitSync` is the schema for the `gitsyncs` API. Desired and observed state
//! are placeholders: nothing reconciles them yet.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{CustomResource, CustomResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group of the GitSync resource.
pub const GROUP: &str = "gitsync.io";
/// Served and stored API version.
pub const VERSION: &str = "v1alpha1";
/// Resource kind.
pub const KIND: &str = "GitSync";

/// Desired state of a GitSync.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
	group = "gitsync.io",
	version = "v1alpha1",
	kind = "GitSync",
	plural = "gitsyncs",
	shortname = "gs",
	namespaced,
	status = "GitSyncStatus"
)]
pub struct GitSyncSpec {
	/// Example field. Nothing reads it yet.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub foo: Option<String>,
}

/// Observed state of a GitSync.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct GitSyncStatus {}

/// A list of GitSync objects, as returned by the list endpoint.
pub type GitSyncList = kube::core::ObjectList<GitSync>;

/// Generate the CustomResourceDefinition for GitSync.
pub fn crd() -> CustomResourceDefinition {
	GitSync::crd()
}

/// Render the CustomResourceDefinition as YAML, ready for `kubectl apply -f -`.
pub fn crd_yaml() -> Result<String, serde_yaml::Error> {
	serde_yaml::to_string(&crd())
}

#[cfg(test)]
mod tests {
	use indoc::indoc;
	use kube::Resource;

	use super::*;

	#[test]
	fn test_crd_identity() {
		let crd = crd();

		assert_eq!(crd.metadata.name.as_deref(), Some("gitsyncs.gitsync.io"));
		assert_eq!(crd.spec.group, GROUP);
		assert_eq!(crd.spec.scope, "Namespaced");
		assert_eq!(crd.spec.names.kind, KIND);
		assert_eq!(crd.spec.names.plural, "gitsyncs");
		assert_eq!(crd.spec.names.short_names, Some(vec!["gs".to_string()]));

		let [version] = crd.spec.versions.as_slice() else {
			panic!("expected exactly one version, got {}", crd.spec.versions.len());
		};
		assert_eq!(version.name, VERSION);
		assert!(version.served);
		assert!(version.storage);
		assert!(
			version
				.subresources
				.as_ref()
				.and_then(|s| s.status.as_ref())
				.is_some(),
			"status subresource should be enabled"
		);
	}

	#[test]
	fn test_crd_schema_has_foo() {
		let crd = serde_json::to_value(crd()).unwrap();

		let foo = crd
			.pointer("/spec/versions/0/schema/openAPIV3Schema/properties/spec/properties/foo")
			.expect("spec.foo should be in the schema");
		assert_eq!(foo["type"], "string");
	}

	#[test]
	fn test_crd_yaml() {
		let yaml = crd_yaml().unwrap();

		assert!(yaml.contains("kind: CustomResourceDefinition"));
		assert!(yaml.contains("name: gitsyncs.gitsync.io"));
	}

	#[test]
	fn test_resource_identity() {
		assert_eq!(GitSync::group(&()), GROUP);
		assert_eq!(GitSync::version(&()), VERSION);
		assert_eq!(GitSync::kind(&()), KIND);
		assert_eq!(GitSync::api_version(&()), "gitsync.io/v1alpha1");
	}

	#[test]
	fn test_empty_spec_serializes_as_empty_object() {
		let gs = GitSync::new("demo", GitSyncSpec::default());
		let value = serde_json::to_value(&gs).unwrap();

		assert_eq!(value["apiVersion"], "gitsync.io/v1alpha1");
		assert_eq!(value["kind"], "GitSync");
		assert_eq!(value["metadata"]["name"], "demo");
		assert_eq!(value["spec"], serde_json::json!({}));
	}

	#[test]
	fn test_deserialize_manifest() {
		let gs: GitSync = serde_yaml::from_str(indoc! {"
			apiVersion: gitsync.io/v1alpha1
			kind: GitSync
			metadata:
			  name: demo
			  namespace: team-a
			  resourceVersion: '42'
			  labels:
			    app: demo
			spec:
			  foo: bar
			status: {}
		"})
		.unwrap();

		assert_eq!(gs.metadata.name.as_deref(), Some("demo"));
		assert_eq!(gs.metadata.namespace.as_deref(), Some("team-a"));
		assert_eq!(gs.metadata.resource_version.as_deref(), Some("42"));
		assert_eq!(
			gs.metadata.labels.as_ref().and_then(|l| l.get("app")),
			Some(&"demo".to_string())
		);
		assert_eq!(gs.spec.foo.as_deref(), Some("bar"));
		assert_eq!(gs.status, Some(GitSyncStatus::default()));
	}

	#[test]
	fn test_deserialize_without_spec_fields() {
		let gs: GitSync = serde_json::from_value(serde_json::json!({
			"apiVersion": "gitsync.io/v1alpha1",
			"kind": "GitSync",
			"metadata": {"name": "bare"},
			"spec": {}
		}))
		.unwrap();

		assert_eq!(gs.spec, GitSyncSpec::default());
		assert_eq!(gs.status, None);
	}
}
