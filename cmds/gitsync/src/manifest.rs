//! Manifest loading.
//!
//! A manifest file holds exactly one Kubernetes object, written as YAML (or
//! JSON, which YAML accepts as-is).

use std::{
	fs,
	path::{Path, PathBuf},
};

use kube::{api::DynamicObject, core::GroupVersionKind};
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

/// Path read when no `--manifest` is given.
pub const DEFAULT_MANIFEST_PATH: &str = "./manifest.yaml";

#[derive(Debug, Error)]
pub enum ManifestError {
	#[error("reading manifest {}", path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("parsing manifest YAML")]
	Parse(#[source] serde_yaml::Error),

	#[error("manifest contains no object")]
	Empty,

	#[error("manifest contains {0} objects, expected exactly one")]
	MultipleDocuments(usize),

	#[error("manifest is not a mapping")]
	NotAnObject,

	#[error("manifest missing apiVersion or kind")]
	MissingApiVersionOrKind,

	#[error("manifest missing metadata.name")]
	MissingName,

	#[error("converting manifest to DynamicObject")]
	Conversion(#[source] serde_json::Error),
}

/// A decoded manifest together with the identity fields the upsert needs.
#[derive(Debug, Clone)]
pub struct Manifest {
	value: serde_json::Value,
	gvk: GroupVersionKind,
	name: String,
}

impl Manifest {
	/// Read and decode a manifest file.
	#[instrument(skip_all, fields(path = %path.display()))]
	pub fn load(path: &Path) -> Result<Self, ManifestError> {
		let content = fs::read_to_string(path).map_err(|source| ManifestError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		Self::from_yaml(&content)
	}

	/// Decode a manifest from YAML text.
	pub fn from_yaml(content: &str) -> Result<Self, ManifestError> {
		let mut documents = Vec::new();
		for document in serde_yaml::Deserializer::from_str(content) {
			let value = serde_json::Value::deserialize(document).map_err(ManifestError::Parse)?;
			// `---` separators and comment-only documents decode to null
			if !value.is_null() {
				documents.push(value);
			}
		}

		let value = match <[_; 1]>::try_from(documents) {
			Ok([value]) => value,
			Err(documents) if documents.is_empty() => return Err(ManifestError::Empty),
			Err(documents) => return Err(ManifestError::MultipleDocuments(documents.len())),
		};

		Self::from_value(value)
	}

	/// Wrap an already-decoded object.
	pub fn from_value(value: serde_json::Value) -> Result<Self, ManifestError> {
		if !value.is_object() {
			return Err(ManifestError::NotAnObject);
		}

		let gvk = gvk_from_manifest(&value).ok_or(ManifestError::MissingApiVersionOrKind)?;
		let name = value
			.pointer("/metadata/name")
			.and_then(|v| v.as_str())
			.filter(|n| !n.is_empty())
			.ok_or(ManifestError::MissingName)?
			.to_string();

		Ok(Self { value, gvk, name })
	}

	pub fn gvk(&self) -> &GroupVersionKind {
		&self.gvk
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// `metadata.namespace`, if the manifest pins one.
	pub fn namespace(&self) -> Option<&str> {
		self.value
			.pointer("/metadata/namespace")
			.and_then(|v| v.as_str())
			.filter(|ns| !ns.is_empty())
	}

	/// Convert into the dynamic object sent to the API server.
	pub fn to_dynamic_object(&self) -> Result<DynamicObject, ManifestError> {
		serde_json::from_value(self.value.clone()).map_err(ManifestError::Conversion)
	}
}

/// Extract a GroupVersionKind from a Kubernetes manifest.
pub fn gvk_from_manifest(manifest: &serde_json::Value) -> Option<GroupVersionKind> {
	let api_version = manifest.get("apiVersion")?.as_str()?;
	let kind = manifest.get("kind")?.as_str()?;
	gvk_from_api_version(api_version, kind)
}

/// Create a GroupVersionKind from an apiVersion string and kind.
///
/// `apps/v1` splits into group `apps` and version `v1`; a bare `v1` is the core group.
pub fn gvk_from_api_version(api_version: &str, kind: &str) -> Option<GroupVersionKind> {
	if api_version.is_empty() || kind.is_empty() {
		return None;
	}
	let (group, version) = match api_version.split_once('/') {
		Some((g, v)) => (g, v),
		None => ("", api_version),
	};
	Some(GroupVersionKind::gvk(group, version, kind))
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use indoc::indoc;

	use super::*;

	#[test]
	fn test_from_yaml_custom_resource() {
		let manifest = Manifest::from_yaml(indoc! {"
			apiVersion: gitsync.io/v1alpha1
			kind: GitSync
			metadata:
			  name: demo
			  namespace: team-a
			spec:
			  foo: bar
		"})
		.unwrap();

		assert_eq!(manifest.gvk().group, "gitsync.io");
		assert_eq!(manifest.gvk().version, "v1alpha1");
		assert_eq!(manifest.gvk().kind, "GitSync");
		assert_eq!(manifest.name(), "demo");
		assert_eq!(manifest.namespace(), Some("team-a"));

		let obj = manifest.to_dynamic_object().unwrap();
		assert_eq!(obj.metadata.resource_version, None);
		assert_eq!(obj.data["spec"]["foo"], "bar");
	}

	#[test]
	fn test_from_yaml_core_api_without_namespace() {
		let manifest = Manifest::from_yaml(indoc! {"
			---
			apiVersion: v1
			kind: ConfigMap
			metadata:
			  name: settings
			data:
			  key: value
		"})
		.unwrap();

		assert_eq!(manifest.gvk().group, "");
		assert_eq!(manifest.gvk().api_version(), "v1");
		assert_eq!(manifest.namespace(), None);
	}

	#[test]
	fn test_from_yaml_accepts_json() {
		let manifest = Manifest::from_yaml(
			r#"{"apiVersion": "v1", "kind": "Namespace", "metadata": {"name": "team-a"}}"#,
		)
		.unwrap();

		assert_eq!(manifest.gvk().kind, "Namespace");
		assert_eq!(manifest.name(), "team-a");
	}

	#[test]
	fn test_from_yaml_empty() {
		assert_matches!(Manifest::from_yaml(""), Err(ManifestError::Empty));
		assert_matches!(
			Manifest::from_yaml("# nothing here\n"),
			Err(ManifestError::Empty)
		);
	}

	#[test]
	fn test_from_yaml_multiple_documents() {
		let result = Manifest::from_yaml(indoc! {"
			apiVersion: v1
			kind: ConfigMap
			metadata:
			  name: a
			---
			apiVersion: v1
			kind: ConfigMap
			metadata:
			  name: b
		"});

		assert_matches!(result, Err(ManifestError::MultipleDocuments(2)));
	}

	#[test]
	fn test_from_yaml_invalid() {
		assert_matches!(
			Manifest::from_yaml("kind: [unterminated"),
			Err(ManifestError::Parse(_))
		);
	}

	#[test]
	fn test_from_yaml_not_a_mapping() {
		assert_matches!(
			Manifest::from_yaml("- a\n- b\n"),
			Err(ManifestError::NotAnObject)
		);
	}

	#[test]
	fn test_missing_identity() {
		assert_matches!(
			Manifest::from_yaml("kind: ConfigMap\nmetadata:\n  name: a\n"),
			Err(ManifestError::MissingApiVersionOrKind)
		);
		assert_matches!(
			Manifest::from_yaml("apiVersion: v1\nkind: ConfigMap\n"),
			Err(ManifestError::MissingName)
		);
		assert_matches!(
			Manifest::from_yaml("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: ''\n"),
			Err(ManifestError::MissingName)
		);
	}

	#[test]
	fn test_load_missing_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("manifest.yaml");

		assert_matches!(
			Manifest::load(&path),
			Err(ManifestError::Read { path: p, .. }) if p == path
		);
	}

	#[test]
	fn test_to_dynamic_object() {
		let manifest = Manifest::from_yaml(indoc! {"
			apiVersion: gitsync.io/v1alpha1
			kind: GitSync
			metadata:
			  name: demo
			  resourceVersion: '7'
			spec: {}
		"})
		.unwrap();

		let obj = manifest.to_dynamic_object().unwrap();
		assert_eq!(obj.metadata.name.as_deref(), Some("demo"));
		assert_eq!(obj.metadata.resource_version.as_deref(), Some("7"));
		assert_eq!(
			obj.types.as_ref().map(|t| t.api_version.as_str()),
			Some("gitsync.io/v1alpha1")
		);
		assert_eq!(obj.data["spec"], serde_json::json!({}));
	}

	#[test]
	fn test_gvk_from_api_version() {
		let gvk = gvk_from_api_version("apps/v1", "Deployment").unwrap();
		assert_eq!(gvk.group, "apps");
		assert_eq!(gvk.version, "v1");
		assert_eq!(gvk.api_version(), "apps/v1");

		assert!(gvk_from_api_version("", "Deployment").is_none());
		assert!(gvk_from_api_version("v1", "").is_none());
	}
}
