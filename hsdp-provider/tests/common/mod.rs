//! Shared fixtures: one mock server standing in for every HSDP family

#![allow(dead_code)]

use std::collections::HashMap;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hsdp_core::config::GlobalConfig;
use hsdp_core::diagnostics::{Diagnostics, Operation};
use hsdp_core::provider::Context;
use hsdp_core::resource::{Record, Value};
use hsdp_provider::HsdpMeta;

pub const TOKEN_PATH: &str = "/authorize/oauth2/token";

/// Start a server that already answers the token endpoint
pub async fn start() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok",
            "expires_in": 1800,
            "token_type": "Bearer"
        })))
        .named("token")
        .mount(&server)
        .await;
    server
}

/// Provider attributes pointing every family at `uri`, with immediate
/// retries
pub fn attributes(uri: &str) -> HashMap<String, Value> {
    let mut attrs = HashMap::new();
    for key in [
        "iam_url",
        "idm_url",
        "cdl_url",
        "stl_url",
        "docker_registry_url",
        "notification_url",
        "s3creds_url",
        "dicom_url",
    ] {
        attrs.insert(key.to_string(), Value::string(uri));
    }
    attrs.insert("username".to_string(), Value::string("ops@example.com"));
    attrs.insert("password".to_string(), Value::string("hunter2"));
    attrs.insert("oauth2_client_id".to_string(), Value::string("client"));
    attrs.insert("oauth2_password".to_string(), Value::string("secret"));
    attrs.insert("org_id".to_string(), Value::string("org-1"));
    attrs.insert("retry_max".to_string(), Value::Int(3));
    attrs.insert("retry_base_delay_ms".to_string(), Value::Int(0));
    attrs
}

pub fn meta(uri: &str) -> HsdpMeta {
    meta_with(attributes(uri))
}

pub fn meta_with(attrs: HashMap<String, Value>) -> HsdpMeta {
    let config = GlobalConfig::from_attributes_with_env(&attrs, |_| None).unwrap();
    HsdpMeta::new(config).unwrap()
}

/// Run one entry point with a fresh cancellation token
pub async fn apply(
    meta: &HsdpMeta,
    op: Operation,
    record: &mut Record,
    import_id: Option<&str>,
) -> Diagnostics {
    let cancel = CancellationToken::new();
    hsdp_provider::provider()
        .apply(op, Context::new(meta, &cancel), record, import_id)
        .await
}

pub async fn read_data_source(meta: &HsdpMeta, record: &mut Record) -> Diagnostics {
    let cancel = CancellationToken::new();
    hsdp_provider::provider()
        .read_data_source(Context::new(meta, &cancel), record)
        .await
}

pub fn summaries(diags: &Diagnostics) -> Vec<String> {
    diags.iter().map(|d| d.summary.clone()).collect()
}
