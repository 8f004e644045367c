//! HTTP-based mock Kubernetes server using wiremock.
//!
//! This is a real HTTP server, so it can be reached through an ordinary
//! kubeconfig and exercised by the same code paths as a live cluster.

use std::sync::{Arc, RwLock};

use bon::Builder;
use kube::config::{
	AuthInfo, Cluster, Context, Kubeconfig, NamedAuthInfo, NamedCluster, NamedContext,
};
use serde_json::{json, Value};
use tracing::{debug, trace};
use wiremock::{
	matchers::{header_regex, method, path, path_regex},
	Mock, MockServer, Request, ResponseTemplate,
};

use super::{
	discovery::{DiscoveryMode, MockApiResource, MockDiscovery},
	store::{status_body, ObjectStore},
};

/// Shared mutable object store.
pub type SharedStore = Arc<RwLock<ObjectStore>>;

/// Regex for every resource path under the core and named API groups.
const RESOURCE_PATHS: &str = r"^/api(s)?/.*";

/// A mock Kubernetes server exposed over HTTP.
#[derive(Builder)]
pub struct HttpMockK8sServer {
	#[builder(default)]
	discovery_mode: DiscoveryMode,
	/// Initial cluster state as raw manifests. API paths are derived from
	/// apiVersion/kind using the discovery data.
	#[builder(default)]
	resources: Vec<Value>,
	/// Object names for which every request is answered with 403 Forbidden.
	#[builder(default)]
	forbidden: Vec<String>,
	/// Group versions (e.g. `gitsync.io/v1alpha1`) whose discovery fails with
	/// 500. They are also left out of the aggregated discovery document.
	#[builder(default)]
	unavailable_group_versions: Vec<String>,
	/// Answer every POST and PUT with 500 while reads keep working.
	#[builder(default)]
	reject_writes: bool,
}

/// A running HTTP mock server instance.
pub struct RunningHttpMockK8sServer {
	server: MockServer,
	discovery: MockDiscovery,
	store: SharedStore,
}

impl HttpMockK8sServer {
	/// Start the mock server with all configured resources.
	pub async fn start(self) -> RunningHttpMockK8sServer {
		let server = MockServer::start().await;
		let discovery = MockDiscovery::default();

		debug!(uri = %server.uri(), "Started mock K8s server");

		let mut store = ObjectStore::default();
		store.seed(
			"/api/v1/namespaces",
			"default",
			json!({"apiVersion": "v1", "kind": "Namespace", "metadata": {"name": "default"}}),
		);
		for manifest in self.resources {
			if let Some((collection, name)) = collection_for_manifest(&manifest, &discovery) {
				trace!(collection = %collection, name = %name, "Registered resource");
				store.seed(&collection, &name, manifest);
			}
		}
		let store = Arc::new(RwLock::new(store));

		mount_version(&server).await;
		mount_failures(&server, &self.unavailable_group_versions, self.reject_writes).await;
		mount_discovery(
			&server,
			&discovery,
			self.discovery_mode,
			&self.unavailable_group_versions,
		)
		.await;
		mount_forbidden(&server, &self.forbidden).await;
		mount_resources(&server, &store).await;

		RunningHttpMockK8sServer {
			server,
			discovery,
			store,
		}
	}
}

/// Derive `(collection_path, name)` for a manifest using discovery data.
fn collection_for_manifest(
	manifest: &Value,
	discovery: &MockDiscovery,
) -> Option<(String, String)> {
	let api_version = manifest.get("apiVersion")?.as_str()?;
	let kind = manifest.get("kind")?.as_str()?;
	let name = manifest.pointer("/metadata/name")?.as_str()?.to_string();
	let namespace = manifest
		.pointer("/metadata/namespace")
		.and_then(Value::as_str);

	let resource = discovery.find(api_version, kind)?;
	Some((resource.collection_path(api_version, namespace), name))
}

impl RunningHttpMockK8sServer {
	/// Get the server's URI (e.g., "http://127.0.0.1:12345").
	pub fn uri(&self) -> String {
		self.server.uri()
	}

	/// Look up the stored state of an object by apiVersion, kind, namespace and name.
	pub fn object(
		&self,
		api_version: &str,
		kind: &str,
		namespace: Option<&str>,
		name: &str,
	) -> Option<Value> {
		let collection = self
			.discovery
			.find(api_version, kind)?
			.collection_path(api_version, namespace);
		self.store
			.read()
			.unwrap()
			.get(&collection, name)
			.cloned()
	}

	/// Requests that reached an object (not discovery), as `(method, path)`.
	pub async fn object_requests(&self) -> Vec<(String, String)> {
		let discovery_paths: Vec<String> = std::iter::once("/api/v1".to_string())
			.chain(self.discovery.groups().map(|(gv, _)| format!("/apis/{gv}")))
			.collect();

		self.server
			.received_requests()
			.await
			.unwrap_or_default()
			.into_iter()
			.map(|r| (r.method.as_str().to_string(), r.url.path().to_string()))
			.filter(|(_, p)| {
				p.starts_with("/api")
					&& p != "/api" && p != "/apis"
					&& !discovery_paths.contains(p)
			})
			.collect()
	}

	/// Create a Kubeconfig pointing to this mock server.
	pub fn kubeconfig(&self) -> Kubeconfig {
		self.kubeconfig_with_context("mock-context")
	}

	/// Create a Kubeconfig pointing to this mock server with a custom context name.
	pub fn kubeconfig_with_context(&self, context_name: &str) -> Kubeconfig {
		let cluster_name = "mock-cluster";
		let user_name = "mock-user";

		Kubeconfig {
			clusters: vec![NamedCluster {
				name: cluster_name.to_string(),
				cluster: Some(Cluster {
					server: Some(self.uri()),
					insecure_skip_tls_verify: Some(true),
					..Default::default()
				}),
			}],
			contexts: vec![NamedContext {
				name: context_name.to_string(),
				context: Some(Context {
					cluster: cluster_name.to_string(),
					user: Some(user_name.to_string()),
					namespace: Some("default".to_string()),
					..Default::default()
				}),
			}],
			auth_infos: vec![NamedAuthInfo {
				name: user_name.to_string(),
				auth_info: Some(AuthInfo::default()),
			}],
			current_context: Some(context_name.to_string()),
			..Default::default()
		}
	}
}

async fn mount_version(server: &MockServer) {
	Mock::given(method("GET"))
		.and(path("/version"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"major": "1",
			"minor": "31",
			"gitVersion": "v1.31.0",
			"gitCommit": "fake",
			"gitTreeState": "clean",
			"buildDate": "2024-08-13T00:00:00Z",
			"goVersion": "go1.22.5",
			"compiler": "gc",
			"platform": "linux/amd64"
		})))
		.mount(server)
		.await;
}

fn aggregated_resource(group: &str, version: &str, r: &MockApiResource) -> Value {
	json!({
		"resource": r.name,
		"responseKind": {
			"group": group,
			"version": version,
			"kind": r.kind
		},
		"scope": r.scope(),
		"verbs": r.verbs,
	})
}

fn legacy_resource_list(group_version: &str, rs: &[MockApiResource]) -> Value {
	let resources: Vec<_> = rs
		.iter()
		.map(|r| {
			json!({
				"name": r.name,
				"singularName": "",
				"namespaced": r.namespaced,
				"kind": r.kind,
				"verbs": r.verbs,
			})
		})
		.collect();

	json!({
		"kind": "APIResourceList",
		"apiVersion": "v1",
		"groupVersion": group_version,
		"resources": resources
	})
}

async fn mount_discovery(
	server: &MockServer,
	discovery: &MockDiscovery,
	mode: DiscoveryMode,
	unavailable: &[String],
) {
	// kube only parses the aggregated body when Content-Type names the aggregated format
	const AGGREGATED_DISCOVERY_CONTENT_TYPE: &str =
		"application/json;g=apidiscovery.k8s.io;v=v2;as=APIGroupDiscoveryList";

	match mode {
		DiscoveryMode::Aggregated => {
			let core: Vec<_> = discovery
				.core()
				.iter()
				.map(|r| aggregated_resource("", "v1", r))
				.collect();
			let core_body = json!({
				"kind": "APIGroupDiscoveryList",
				"apiVersion": "apidiscovery.k8s.io/v2",
				"items": [{
					"metadata": {"name": ""},
					"versions": [{"version": "v1", "resources": core, "freshness": "Current"}]
				}]
			});

			let groups: Vec<_> = discovery
				.groups()
				.filter(|(gv, _)| !unavailable.iter().any(|u| u == gv))
				.map(|(gv, rs)| {
					let (group, version) = gv.split_once('/').unwrap_or(("", gv));
					let resources: Vec<_> = rs
						.iter()
						.map(|r| aggregated_resource(group, version, r))
						.collect();
					json!({
						"metadata": {"name": group},
						"versions": [{"version": version, "resources": resources, "freshness": "Current"}]
					})
				})
				.collect();
			let apis_body = json!({
				"kind": "APIGroupDiscoveryList",
				"apiVersion": "apidiscovery.k8s.io/v2",
				"items": groups
			});

			for (route, body) in [("/api", core_body), ("/apis", apis_body)] {
				let body =
					serde_json::to_vec(&body).expect("serializing discovery JSON should never fail");
				Mock::given(method("GET"))
					.and(path(route))
					.and(header_regex("accept", "apidiscovery"))
					.respond_with(
						ResponseTemplate::new(200)
							.set_body_raw(body, AGGREGATED_DISCOVERY_CONTENT_TYPE),
					)
					.mount(server)
					.await;
			}
		}
		DiscoveryMode::Legacy => {
			for route in ["/api", "/apis"] {
				Mock::given(method("GET"))
					.and(path(route))
					.and(header_regex("accept", "apidiscovery"))
					.respond_with(ResponseTemplate::new(406))
					.mount(server)
					.await;
			}
		}
	}

	Mock::given(method("GET"))
		.and(path("/api"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"kind": "APIVersions",
			"versions": ["v1"],
			"serverAddressByClientCIDRs": []
		})))
		.mount(server)
		.await;

	let groups: Vec<_> = discovery
		.groups()
		.map(|(gv, _)| {
			let (group, version) = gv.split_once('/').unwrap_or(("", gv));
			json!({
				"name": group,
				"versions": [{"groupVersion": gv, "version": version}],
				"preferredVersion": {"groupVersion": gv, "version": version}
			})
		})
		.collect();

	Mock::given(method("GET"))
		.and(path("/apis"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"kind": "APIGroupList",
			"apiVersion": "v1",
			"groups": groups
		})))
		.mount(server)
		.await;

	Mock::given(method("GET"))
		.and(path("/api/v1"))
		.respond_with(
			ResponseTemplate::new(200).set_body_json(legacy_resource_list("v1", discovery.core())),
		)
		.mount(server)
		.await;

	for (gv, rs) in discovery.groups() {
		Mock::given(method("GET"))
			.and(path(format!("/apis/{gv}")))
			.respond_with(ResponseTemplate::new(200).set_body_json(legacy_resource_list(gv, rs)))
			.mount(server)
			.await;
	}
}

/// Mount the injected server-side failures ahead of the regular handlers.
async fn mount_failures(server: &MockServer, unavailable: &[String], reject_writes: bool) {
	for gv in unavailable {
		Mock::given(method("GET"))
			.and(path(format!("/apis/{gv}")))
			.respond_with(internal_error(&format!("discovery for {gv} is unavailable")))
			.with_priority(1)
			.mount(server)
			.await;
	}

	if reject_writes {
		for verb in ["POST", "PUT"] {
			Mock::given(method(verb))
				.and(path_regex(RESOURCE_PATHS))
				.respond_with(internal_error("writes are rejected"))
				.with_priority(1)
				.mount(server)
				.await;
		}
	}
}

fn internal_error(message: &str) -> ResponseTemplate {
	ResponseTemplate::new(500).set_body_json(status_body(500, "InternalError", message))
}

/// Answer every request for the given object names with 403.
async fn mount_forbidden(server: &MockServer, names: &[String]) {
	for name in names {
		let message = format!("access to \"{name}\" is forbidden");
		Mock::given(path_regex(forbidden_pattern(name)))
			.respond_with(
				ResponseTemplate::new(403).set_body_json(status_body(403, "Forbidden", &message)),
			)
			.with_priority(1)
			.mount(server)
			.await;
	}
}

/// Path pattern matching the object `name` in any collection.
fn forbidden_pattern(name: &str) -> String {
	format!(r"^/api(s)?/.*/{}$", regex::escape(name))
}

async fn mount_resources(server: &MockServer, store: &SharedStore) {
	let get_store = Arc::clone(store);
	let post_store = Arc::clone(store);
	let put_store = Arc::clone(store);

	// GET: a single object when the last segment names one, else a list
	Mock::given(method("GET"))
		.and(path_regex(RESOURCE_PATHS))
		.respond_with(move |req: &Request| {
			let store = get_store.read().unwrap();
			let (collection, name) = split_object_path(req.url.path());

			if let Some(object) = store.get(&collection, &name) {
				return ResponseTemplate::new(200).set_body_json(object);
			}

			let items = store.list(req.url.path().trim_end_matches('/'));
			if !items.is_empty() || name.is_empty() {
				return ResponseTemplate::new(200).set_body_json(json!({
					"kind": "List",
					"apiVersion": "v1",
					"metadata": {"resourceVersion": "1"},
					"items": items
				}));
			}

			ResponseTemplate::new(404).set_body_json(status_body(
				404,
				"NotFound",
				&format!("\"{name}\" not found"),
			))
		})
		.mount(server)
		.await;

	// POST: create into the collection named by the path
	Mock::given(method("POST"))
		.and(path_regex(RESOURCE_PATHS))
		.respond_with(move |req: &Request| {
			let collection = req.url.path().trim_end_matches('/');
			let body: Value = serde_json::from_slice(&req.body).unwrap_or(Value::Null);
			let name = body
				.pointer("/metadata/name")
				.and_then(Value::as_str)
				.unwrap_or_default()
				.to_string();

			match post_store.write().unwrap().create(collection, body) {
				Ok(created) => ResponseTemplate::new(201).set_body_json(created),
				Err(e) => ResponseTemplate::new(e.code()).set_body_json(e.status(&name)),
			}
		})
		.mount(server)
		.await;

	// PUT: replace an existing object
	Mock::given(method("PUT"))
		.and(path_regex(RESOURCE_PATHS))
		.respond_with(move |req: &Request| {
			let (collection, name) = split_object_path(req.url.path());
			let body: Value = serde_json::from_slice(&req.body).unwrap_or(Value::Null);

			match put_store.write().unwrap().replace(&collection, &name, body) {
				Ok(replaced) => ResponseTemplate::new(200).set_body_json(replaced),
				Err(e) => ResponseTemplate::new(e.code()).set_body_json(e.status(&name)),
			}
		})
		.mount(server)
		.await;
}

/// Split an object path into `(collection_path, name)`.
///
/// - `/api/v1/namespaces/default/configmaps/my-config` -> (`/api/v1/namespaces/default/configmaps`, `my-config`)
/// - `/api/v1/namespaces/my-ns` -> (`/api/v1/namespaces`, `my-ns`)
fn split_object_path(path: &str) -> (String, String) {
	let path = path.trim_end_matches('/');
	match path.rsplit_once('/') {
		Some((collection, name)) => (collection.to_string(), name.to_string()),
		None => (path.to_string(), String::new()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_split_object_path() {
		assert_eq!(
			split_object_path("/apis/gitsync.io/v1alpha1/namespaces/default/gitsyncs/demo"),
			(
				"/apis/gitsync.io/v1alpha1/namespaces/default/gitsyncs".to_string(),
				"demo".to_string()
			)
		);
		assert_eq!(
			split_object_path("/api/v1/namespaces/team-a/"),
			("/api/v1/namespaces".to_string(), "team-a".to_string())
		);
	}

	#[test]
	fn test_forbidden_pattern_matches_name_literally() {
		let re = regex::Regex::new(&forbidden_pattern("a.b")).unwrap();
		assert!(re.is_match("/api/v1/namespaces/default/configmaps/a.b"));
		assert!(!re.is_match("/api/v1/namespaces/default/configmaps/axb"));

		let re = regex::Regex::new(&forbidden_pattern("démo")).unwrap();
		assert!(re.is_match("/apis/gitsync.io/v1alpha1/namespaces/default/gitsyncs/démo"));

		let re = regex::Regex::new(&forbidden_pattern("<a")).unwrap();
		assert!(re.is_match("/api/v1/namespaces/default/configmaps/<a"));
	}

	#[test]
	fn test_collection_for_manifest() {
		let discovery = MockDiscovery::default();
		let manifest = json!({
			"apiVersion": "gitsync.io/v1alpha1",
			"kind": "GitSync",
			"metadata": {"name": "demo", "namespace": "team-a"}
		});

		assert_eq!(
			collection_for_manifest(&manifest, &discovery),
			Some((
				"/apis/gitsync.io/v1alpha1/namespaces/team-a/gitsyncs".to_string(),
				"demo".to_string()
			))
		);

		let unknown = json!({"apiVersion": "v1", "kind": "Widget", "metadata": {"name": "x"}});
		assert_eq!(collection_for_manifest(&unknown, &discovery), None);
	}
}
