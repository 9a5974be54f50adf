//! Server module: the transport-agnostic request host
//!
//! The host turns request paths, payloads and list parameters into
//! resource graph operations and projected documents. Wire formats are left
//! to the transport built on top of it.

pub mod host;

pub use host::{GraphHost, ItemResponse, ListResponse};
