//! HSDP Core
//!
//! Provider-independent machinery for driving cloud control-plane APIs from a
//! declarative host: call orchestration with retry and token refresh,
//! create-or-adopt, collection reconciliation, principal resolution, scoped
//! clients and the mapping of failures to host diagnostics.

pub mod adopt;
pub mod client;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod ports;
pub mod provider;
pub mod reconcile;
pub mod resource;
pub mod retry;
pub mod schema;
