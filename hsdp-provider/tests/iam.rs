//! IAM resources against a mock identity service

mod common;

use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use hsdp_core::diagnostics::Operation;
use hsdp_core::resource::{Record, Value};

use common::{TOKEN_PATH, apply, meta, read_data_source, start, summaries};

fn role_record() -> Record {
    Record::new("hsdp_iam_role")
        .with_attribute("name", Value::string("READERS"))
        .with_attribute("description", Value::string("read only"))
        .with_attribute("managing_organization", Value::string("org-1"))
}

#[tokio::test]
async fn application_conflict_with_different_description_is_rejected() {
    let server = start().await;
    Mock::given(method("POST"))
        .and(path("/authorize/identity/Application"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "issue": [{ "details": { "text": "application exists" } }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/authorize/identity/Application"))
        .and(query_param("name", "TESTAPP"))
        .and(query_param("propositionId", "prop-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entry": [{
                "id": "app-1",
                "name": "TESTAPP",
                "description": "someone else's app",
                "propositionId": "prop-1"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let meta = meta(&server.uri());
    let mut record = Record::new("hsdp_iam_application")
        .with_attribute("name", Value::string("TESTAPP"))
        .with_attribute("description", Value::string("ours"))
        .with_attribute("proposition_id", Value::string("prop-1"));
    let diags = apply(&meta, Operation::Create, &mut record, None).await;

    assert!(diags.has_error());
    assert_eq!(
        summaries(&diags),
        vec!["existing application found but description mismatch"]
    );
    assert!(!record.exists());
}

#[tokio::test]
async fn application_conflict_with_equivalent_entity_is_adopted() {
    let server = start().await;
    Mock::given(method("POST"))
        .and(path("/authorize/identity/Application"))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/authorize/identity/Application"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entry": [{
                "id": "app-1",
                "name": "TESTAPP",
                "description": "ours",
                "propositionId": "prop-1",
                "globalReferenceId": "ref-1"
            }]
        })))
        .mount(&server)
        .await;

    let meta = meta(&server.uri());
    let mut record = Record::new("hsdp_iam_application")
        .with_attribute("name", Value::string("TESTAPP"))
        .with_attribute("description", Value::string("ours"))
        .with_attribute("proposition_id", Value::string("prop-1"));
    let diags = apply(&meta, Operation::Create, &mut record, None).await;

    assert!(diags.is_empty(), "{:?}", diags);
    assert_eq!(record.id(), "app-1");
    assert_eq!(record.get_str("global_reference_id"), Some("ref-1"));
    assert_eq!(record.prior().get("name"), Some(&Value::string("TESTAPP")));
}

#[tokio::test]
async fn unknown_permission_is_a_warning_and_role_is_created() {
    let server = start().await;
    Mock::given(method("POST"))
        .and(path("/authorize/identity/Role"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "role-1",
            "name": "READERS",
            "managingOrganization": "org-1"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/authorize/identity/Role/role-1/$assign-permission"))
        .and(body_string_contains("BOGUS"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/authorize/identity/Role/role-1/$assign-permission"))
        .and(body_string_contains("GROUP.READ"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let meta = meta(&server.uri());
    let mut record = role_record().with_attribute(
        "permissions",
        Value::string_set(["GROUP.READ", "BOGUS"]),
    );
    let diags = apply(&meta, Operation::Create, &mut record, None).await;

    assert!(!diags.has_error(), "{:?}", diags);
    assert_eq!(summaries(&diags), vec!["permission 'BOGUS' is invalid"]);
    assert_eq!(record.id(), "role-1");
}

#[tokio::test]
async fn forbidden_role_read_with_role_write_clears_identifier() {
    let server = start().await;
    Mock::given(method("GET"))
        .and(path("/authorize/identity/Role/role-1"))
        .respond_with(ResponseTemplate::new(403))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/authorize/oauth2/introspect"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "active": true,
            "sub": "user-1",
            "organizations": {
                "managingOrganization": "org-1",
                "organizationList": [
                    { "organizationId": "org-1", "permissions": ["ROLE.READ", "ROLE.WRITE"] }
                ]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let meta = meta(&server.uri());
    let mut record = role_record()
        .with_id("role-1")
        .with_attribute("permissions", Value::string_set(["GROUP.READ"]));
    let diags = apply(&meta, Operation::Read, &mut record, None).await;

    assert!(diags.is_empty(), "{:?}", diags);
    assert!(!record.exists());
}

#[tokio::test]
async fn forbidden_role_read_without_role_write_is_an_error() {
    let server = start().await;
    Mock::given(method("GET"))
        .and(path("/authorize/identity/Role/role-1"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/authorize/oauth2/introspect"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "active": true,
            "organizations": {
                "managingOrganization": "org-1",
                "organizationList": [
                    { "organizationId": "org-1", "permissions": ["ROLE.READ"] }
                ]
            }
        })))
        .mount(&server)
        .await;

    let meta = meta(&server.uri());
    let mut record = role_record()
        .with_id("role-1")
        .with_attribute("permissions", Value::string_set(["GROUP.READ"]));
    let diags = apply(&meta, Operation::Read, &mut record, None).await;

    assert!(diags.has_error());
    assert_eq!(record.id(), "role-1");
}

#[tokio::test]
async fn forbidden_call_refreshes_token_and_retries() {
    let server = start().await;
    Mock::given(method("GET"))
        .and(path("/authorize/identity/Role/role-1"))
        .respond_with(ResponseTemplate::new(403))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/authorize/identity/Role/role-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "role-1",
            "name": "READERS",
            "description": "read only",
            "managingOrganization": "org-1"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/authorize/identity/Permission"))
        .and(query_param("roleId", "role-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entry": [{ "name": "GROUP.READ" }, { "name": "USER.READ" }]
        })))
        .mount(&server)
        .await;

    let meta = meta(&server.uri());
    let mut record = role_record()
        .with_id("role-1")
        .with_attribute("permissions", Value::string_set(["GROUP.READ"]));
    let diags = apply(&meta, Operation::Read, &mut record, None).await;

    assert!(diags.is_empty(), "{:?}", diags);
    assert_eq!(
        record.get_strings("permissions"),
        vec!["GROUP.READ".to_string(), "USER.READ".to_string()]
    );

    // Initial exchange plus one refresh
    let token_requests = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == TOKEN_PATH)
        .count();
    assert_eq!(token_requests, 2);
}

#[tokio::test]
async fn forbidden_permission_listing_keeps_local_state() {
    let server = start().await;
    Mock::given(method("GET"))
        .and(path("/authorize/identity/Role/role-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "role-1",
            "name": "READERS"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/authorize/identity/Permission"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let meta = meta(&server.uri());
    let mut record = role_record()
        .with_id("role-1")
        .with_attribute("permissions", Value::string_set(["GROUP.READ"]));
    let diags = apply(&meta, Operation::Read, &mut record, None).await;

    assert!(!diags.has_error());
    assert_eq!(
        summaries(&diags),
        vec!["unable to read permissions (permission denied); using local state"]
    );
    assert_eq!(record.get_strings("permissions"), vec!["GROUP.READ".to_string()]);
}

#[tokio::test]
async fn role_update_touches_only_the_difference() {
    let server = start().await;
    Mock::given(method("POST"))
        .and(path("/authorize/identity/Role/role-1/$remove-permission"))
        .and(body_string_contains("USER.READ"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/authorize/identity/Role/role-1/$assign-permission"))
        .and(body_string_contains("GROUP.WRITE"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let meta = meta(&server.uri());
    let mut record = role_record()
        .with_id("role-1")
        .with_prior("permissions", Value::string_set(["GROUP.READ", "USER.READ"]))
        .with_attribute(
            "permissions",
            Value::string_set(["GROUP.READ", "GROUP.WRITE"]),
        );
    let diags = apply(&meta, Operation::Update, &mut record, None).await;

    // Removing an already-absent permission is silent
    assert!(diags.is_empty(), "{:?}", diags);
    assert_eq!(
        record.prior_strings("permissions"),
        vec!["GROUP.READ".to_string(), "GROUP.WRITE".to_string()]
    );
}

#[tokio::test]
async fn persistent_server_errors_stop_at_the_attempt_limit() {
    let server = start().await;
    Mock::given(method("GET"))
        .and(path("/authorize/identity/Application/app-1"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let meta = meta(&server.uri());
    let mut record = Record::new("hsdp_iam_application").with_id("app-1");
    let diags = apply(&meta, Operation::Read, &mut record, None).await;

    assert!(diags.has_error());
    assert_eq!(record.id(), "app-1");
}

#[tokio::test]
async fn read_of_a_deleted_entity_drifts_to_empty() {
    let server = start().await;
    Mock::given(method("GET"))
        .and(path("/authorize/identity/Application/app-1"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let meta = meta(&server.uri());
    let mut record = Record::new("hsdp_iam_application").with_id("app-1");
    let diags = apply(&meta, Operation::Read, &mut record, None).await;

    assert!(diags.is_empty());
    assert!(!record.exists());
}

#[tokio::test]
async fn import_of_a_missing_entity_fails() {
    let server = start().await;
    Mock::given(method("GET"))
        .and(path("/authorize/identity/Application/nope"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let meta = meta(&server.uri());
    let mut record = Record::new("hsdp_iam_application");
    let diags = apply(&meta, Operation::Import, &mut record, Some("nope")).await;

    assert_eq!(
        summaries(&diags),
        vec!["cannot import non-existent remote object"]
    );
    assert!(!record.exists());
}

#[tokio::test]
async fn import_reads_the_entity_into_the_record() {
    let server = start().await;
    Mock::given(method("GET"))
        .and(path("/authorize/identity/Application/app-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "app-1",
            "name": "TESTAPP",
            "description": "ours",
            "propositionId": "prop-1"
        })))
        .mount(&server)
        .await;

    let meta = meta(&server.uri());
    let mut record = Record::new("hsdp_iam_application");
    let diags = apply(&meta, Operation::Import, &mut record, Some("app-1")).await;

    assert!(diags.is_empty(), "{:?}", diags);
    assert_eq!(record.id(), "app-1");
    assert_eq!(record.get_str("proposition_id"), Some("prop-1"));
}

#[tokio::test]
async fn cancelled_operation_makes_no_calls() {
    let server = start().await;
    let meta = meta(&server.uri());
    let cancel = tokio_util::sync::CancellationToken::new();
    cancel.cancel();

    let mut record = Record::new("hsdp_iam_application").with_id("app-1");
    let diags = hsdp_provider::provider()
        .apply(
            Operation::Read,
            hsdp_core::provider::Context::new(&meta, &cancel),
            &mut record,
            None,
        )
        .await;

    assert_eq!(summaries(&diags), vec!["operation cancelled"]);
    assert_eq!(record.id(), "app-1");
}

#[tokio::test]
async fn introspection_data_source() {
    let server = start().await;
    Mock::given(method("POST"))
        .and(path("/authorize/oauth2/introspect"))
        .and(body_string_contains("token=tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "active": true,
            "username": "ops@example.com",
            "sub": "user-1",
            "client_id": "client",
            "organizations": {
                "managingOrganization": "org-1",
                "organizationList": [
                    { "organizationId": "org-1", "permissions": ["ROLE.WRITE"] }
                ]
            }
        })))
        .mount(&server)
        .await;

    let meta = meta(&server.uri());
    let mut record = Record::new("hsdp_iam_introspect");
    let diags = read_data_source(&meta, &mut record).await;

    assert!(diags.is_empty(), "{:?}", diags);
    assert_eq!(record.id(), "user-1");
    assert_eq!(record.get_str("managing_organization"), Some("org-1"));
    assert_eq!(record.get_items("organizations").len(), 1);
}

const GROUP_PATH: &str = "/authorize/identity/Group/grp-1";

fn group_record() -> Record {
    Record::new("hsdp_iam_group")
        .with_id("grp-1")
        .with_attribute("name", Value::string("OPS"))
        .with_attribute("description", Value::string("operators"))
        .with_attribute("managing_organization", Value::string("org-1"))
        .with_prior("name", Value::string("OPS"))
        .with_prior("description", Value::string("operators"))
        .with_prior("managing_organization", Value::string("org-1"))
}

#[tokio::test]
async fn group_update_reconciles_members_and_roles() {
    let server = start().await;
    Mock::given(method("PUT"))
        .and(path(GROUP_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}/$remove-members", GROUP_PATH)))
        .and(body_string_contains("\"u-1\""))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}/$add-members", GROUP_PATH)))
        .and(body_string_contains("\"u-3\""))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}/$remove-role", GROUP_PATH)))
        .and(body_string_contains("role-old"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}/$assign-role", GROUP_PATH)))
        .and(body_string_contains("role-new"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let meta = meta(&server.uri());
    let mut record = group_record()
        .with_prior("users", Value::string_set(["u-1", "u-2"]))
        .with_attribute("users", Value::string_set(["u-2", "u-3"]))
        .with_prior("roles", Value::string_set(["role-old"]))
        .with_attribute("roles", Value::string_set(["role-new"]));
    let diags = apply(&meta, Operation::Update, &mut record, None).await;

    assert!(diags.is_empty(), "{:?}", diags);
    assert_eq!(
        record.prior_strings("users"),
        vec!["u-2".to_string(), "u-3".to_string()]
    );

    let paths: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.url.path().to_string())
        .collect();
    let position = |suffix: &str| paths.iter().position(|p| p.ends_with(suffix)).unwrap();
    assert!(position("$remove-members") < position("$add-members"));
    assert!(position("$remove-role") < position("$assign-role"));
}

#[tokio::test]
async fn group_read_hides_members_managed_elsewhere() {
    let server = start().await;
    Mock::given(method("GET"))
        .and(path(GROUP_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "grp-1",
            "name": "OPS",
            "description": "operators",
            "managingOrganization": "org-1"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/authorize/identity/User"))
        .and(query_param("groupId", "grp-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entry": [{ "id": "u-1" }, { "id": "someone-else" }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/authorize/identity/Service"))
        .and(query_param("groupId", "grp-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "entry": [] })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/authorize/identity/Role"))
        .and(query_param("groupId", "grp-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entry": [{ "id": "role-1", "name": "READERS" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let meta = meta(&server.uri());
    // u-2 was removed remotely, someone-else was never managed here
    let mut record = group_record()
        .with_attribute("users", Value::string_set(["u-1", "u-2"]))
        .with_attribute("services", Value::string_set(["svc-1"]));
    let diags = apply(&meta, Operation::Read, &mut record, None).await;

    assert!(diags.is_empty(), "{:?}", diags);
    assert_eq!(record.get_strings("users"), vec!["u-1".to_string()]);
    assert!(record.get_strings("services").is_empty());
    assert_eq!(record.get_strings("roles"), vec!["role-1".to_string()]);
}

#[tokio::test]
async fn group_destroy_ignores_members_already_gone() {
    let server = start().await;
    Mock::given(method("POST"))
        .and(path(format!("{}/$remove-members", GROUP_PATH)))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}/$remove-role", GROUP_PATH)))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(GROUP_PATH))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let meta = meta(&server.uri());
    let mut record = group_record()
        .with_prior("users", Value::string_set(["u-1"]))
        .with_prior("roles", Value::string_set(["role-1"]));
    let diags = apply(&meta, Operation::Delete, &mut record, None).await;

    assert!(diags.is_empty(), "{:?}", diags);
    assert!(!record.exists());
}
