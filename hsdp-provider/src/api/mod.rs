//! Typed remote operations per API family
//!
//! Each family is a thin borrowed view over a [`ServiceClient`] and the
//! operation's cancellation token. Operations return remote models; error
//! classification is left to callers.

pub mod cdl;
pub mod dicom;
pub mod docker;
pub mod iam;
pub mod notification;
pub mod s3creds;
pub mod stl;

use serde::Deserialize;

/// FHIR-style search envelope
#[derive(Debug, Clone, Deserialize)]
pub struct Bundle<T> {
    #[serde(default = "Vec::new")]
    pub entry: Vec<T>,
}

/// `/Thing/{id}` with the id percent-safe for a path segment
pub(crate) fn item_path(collection: &str, id: &str) -> String {
    format!("{}/{}", collection, encode_segment(id))
}

pub(crate) fn encode_segment(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}
