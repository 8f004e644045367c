//! In-memory object store behind the mock API server.
//!
//! Objects are keyed by `(collection_path, name)`. Every write bumps a
//! store-wide revision which becomes the object's `metadata.resourceVersion`.

use std::collections::HashMap;

use serde_json::{json, Value};

/// Why a store operation was rejected, mapped onto a Kubernetes `Status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
	NotFound,
	AlreadyExists,
	Conflict,
	NameMismatch,
	MissingName,
}

impl StoreError {
	pub fn code(&self) -> u16 {
		match self {
			StoreError::NotFound => 404,
			StoreError::AlreadyExists | StoreError::Conflict => 409,
			StoreError::NameMismatch => 400,
			StoreError::MissingName => 422,
		}
	}

	pub fn reason(&self) -> &'static str {
		match self {
			StoreError::NotFound => "NotFound",
			StoreError::AlreadyExists => "AlreadyExists",
			StoreError::Conflict => "Conflict",
			StoreError::NameMismatch => "BadRequest",
			StoreError::MissingName => "Invalid",
		}
	}

	fn message(&self, name: &str) -> String {
		match self {
			StoreError::NotFound => format!("\"{name}\" not found"),
			StoreError::AlreadyExists => format!("\"{name}\" already exists"),
			StoreError::Conflict => format!(
				"Operation cannot be fulfilled on \"{name}\": the object has been modified; \
				 please apply your changes to the latest version and try again"
			),
			StoreError::NameMismatch => {
				format!("the name of the object does not match the name on the URL ({name})")
			}
			StoreError::MissingName => "metadata.name: Required value".to_string(),
		}
	}

	/// Kubernetes `Status` body describing this error.
	pub fn status(&self, name: &str) -> Value {
		status_body(self.code(), self.reason(), &self.message(name))
	}
}

/// Build a failure `Status` body.
pub fn status_body(code: u16, reason: &str, message: &str) -> Value {
	json!({
		"kind": "Status",
		"apiVersion": "v1",
		"metadata": {},
		"status": "Failure",
		"message": message,
		"reason": reason,
		"code": code
	})
}

#[derive(Default)]
pub struct ObjectStore {
	objects: HashMap<(String, String), Value>,
	revision: u64,
}

impl ObjectStore {
	pub fn get(&self, collection: &str, name: &str) -> Option<&Value> {
		self.objects.get(&(collection.to_string(), name.to_string()))
	}

	pub fn list(&self, collection: &str) -> Vec<Value> {
		let mut items: Vec<_> = self
			.objects
			.iter()
			.filter(|((c, _), _)| c == collection)
			.map(|((_, name), v)| (name.clone(), v.clone()))
			.collect();
		items.sort_by(|(a, _), (b, _)| a.cmp(b));
		items.into_iter().map(|(_, v)| v).collect()
	}

	/// Insert an object unconditionally, as initial cluster state.
	pub fn seed(&mut self, collection: &str, name: &str, object: Value) {
		let object = self.stamp(collection, object, None);
		self.objects
			.insert((collection.to_string(), name.to_string()), object);
	}

	/// POST semantics: fails if an object with the same name exists.
	pub fn create(&mut self, collection: &str, object: Value) -> Result<Value, StoreError> {
		let name = object_name(&object).ok_or(StoreError::MissingName)?;
		let key = (collection.to_string(), name);
		if self.objects.contains_key(&key) {
			return Err(StoreError::AlreadyExists);
		}

		let object = self.stamp(collection, object, None);
		self.objects.insert(key, object.clone());
		Ok(object)
	}

	/// PUT semantics: the object must exist, and a resourceVersion in the body
	/// must match the stored one.
	pub fn replace(
		&mut self,
		collection: &str,
		name: &str,
		object: Value,
	) -> Result<Value, StoreError> {
		if object_name(&object).as_deref() != Some(name) {
			return Err(StoreError::NameMismatch);
		}

		let key = (collection.to_string(), name.to_string());
		let existing = self.objects.get(&key).ok_or(StoreError::NotFound)?;

		if let Some(requested) = resource_version(&object) {
			if Some(requested) != resource_version(existing) {
				return Err(StoreError::Conflict);
			}
		}

		let uid = existing.pointer("/metadata/uid").cloned();
		let object = self.stamp(collection, object, uid);
		self.objects.insert(key, object.clone());
		Ok(object)
	}

	fn stamp(&mut self, collection: &str, mut object: Value, uid: Option<Value>) -> Value {
		self.revision += 1;
		let revision = self.revision;

		if let Some(metadata) = object
			.as_object_mut()
			.map(|o| o.entry("metadata").or_insert_with(|| json!({})))
			.and_then(Value::as_object_mut)
		{
			metadata.insert("resourceVersion".into(), json!(revision.to_string()));
			metadata.insert(
				"uid".into(),
				uid.unwrap_or_else(|| json!(format!("mock-uid-{revision}"))),
			);
			if let Some(ns) = namespace_of(collection) {
				metadata.insert("namespace".into(), json!(ns));
			}
		}
		object
	}
}

fn object_name(object: &Value) -> Option<String> {
	object
		.pointer("/metadata/name")
		.and_then(Value::as_str)
		.filter(|n| !n.is_empty())
		.map(str::to_string)
}

fn resource_version(object: &Value) -> Option<&str> {
	object
		.pointer("/metadata/resourceVersion")
		.and_then(Value::as_str)
}

/// Namespace encoded in a namespaced collection path.
///
/// `/api/v1/namespaces/team-a/configmaps` -> `team-a`; `/api/v1/namespaces` -> none.
fn namespace_of(collection: &str) -> Option<&str> {
	let (_, rest) = collection.split_once("/namespaces/")?;
	let (ns, _) = rest.split_once('/')?;
	Some(ns)
}
