//! Mock Kubernetes API server for testing.
//!
//! Provides an HTTP server that can be used with kubeconfig-based connections.
//! Objects live in an in-memory store with create (POST), read (GET) and
//! replace (PUT) semantics close enough to the real API server for upsert tests.

pub mod discovery;
pub mod http;
pub mod store;

pub use discovery::{DiscoveryMode, MockApiResource, MockDiscovery};
pub use http::{HttpMockK8sServer, RunningHttpMockK8sServer};
