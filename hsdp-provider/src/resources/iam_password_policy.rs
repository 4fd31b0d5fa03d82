//! hsdp_iam_password_policy: the password policy of an organization
//!
//! The policy body is carried as a JSON document in `policy_json`. Server
//! managed keys are stripped and keys are sorted so that the stored string
//! converges between apply and refresh.

use serde_json::{Map, Value as Json};

use hsdp_core::client::ApiFamily;
use hsdp_core::diagnostics::Diagnostics;
use hsdp_core::error::{ProviderError, ProviderResult};
use hsdp_core::resource::Record;
use hsdp_core::schema::ResourceSchema;

use super::{base_schema, connect, organization_of, string_attr};
use crate::Ctx;
use crate::api::iam::IamApi;

resource_handler!(IamPasswordPolicy, "hsdp_iam_password_policy");

const SERVER_KEYS: [&str; 3] = ["id", "meta", "managingOrganization"];

fn schema() -> ResourceSchema {
    base_schema("hsdp_iam_password_policy")
        .with_description("IAM password policy")
        .attribute(string_attr("managing_organization").force_new())
        .attribute(
            string_attr("policy_json")
                .required()
                .with_description("Policy document (complexity, history, expiry)"),
        )
}

/// Parse the configured document, rejecting anything but a JSON object
fn desired_policy(record: &Record) -> ProviderResult<Map<String, Json>> {
    let text = record.get_string("policy_json");
    match serde_json::from_str::<Json>(&text) {
        Ok(Json::Object(map)) => Ok(map),
        Ok(_) => Err(ProviderError::validation("policy_json must be a JSON object")),
        Err(e) => Err(ProviderError::validation(format!(
            "policy_json is not valid JSON: {}",
            e
        ))),
    }
}

/// Remote body as the string stored in `policy_json`
fn canonical(body: &Json) -> String {
    let mut map = body.as_object().cloned().unwrap_or_default();
    for key in SERVER_KEYS {
        map.remove(key);
    }
    Json::Object(map).to_string()
}

async fn create(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let mut policy = desired_policy(record)?;
    let client = connect(ctx, record, ApiFamily::Iam, None).await?;
    let organization = organization_of(record, "managing_organization", &client)?;
    policy.insert(
        "managingOrganization".to_string(),
        Json::String(organization.clone()),
    );

    let body = IamApi::new(&client, ctx.cancel)
        .create_password_policy(Json::Object(policy))
        .await?;
    let id = body
        .get("id")
        .and_then(Json::as_str)
        .ok_or_else(|| ProviderError::Decode("password policy without id".to_string()))?;
    record.set_id(id);
    record.set_string("managing_organization", organization);
    record.set_string("policy_json", canonical(&body));
    Ok(Diagnostics::new())
}

async fn read(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let client = connect(ctx, record, ApiFamily::Iam, None).await?;
    let body = IamApi::new(&client, ctx.cancel)
        .get_password_policy(record.id())
        .await?;
    if let Some(organization) = body.get("managingOrganization").and_then(Json::as_str) {
        record.set_string("managing_organization", organization);
    }
    record.set_string("policy_json", canonical(&body));
    Ok(Diagnostics::new())
}

async fn update(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    if !record.has_change("policy_json") {
        return Ok(Diagnostics::new());
    }
    let mut policy = desired_policy(record)?;
    let client = connect(ctx, record, ApiFamily::Iam, None).await?;
    let iam = IamApi::new(&client, ctx.cancel);

    // The update carries the current version for optimistic locking
    let current = iam.get_password_policy(record.id()).await?;
    for key in SERVER_KEYS {
        if let Some(value) = current.get(key) {
            policy.insert(key.to_string(), value.clone());
        }
    }
    iam.update_password_policy(record.id(), Json::Object(policy))
        .await?;
    Ok(Diagnostics::new())
}

async fn delete(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let client = connect(ctx, record, ApiFamily::Iam, None).await?;
    IamApi::new(&client, ctx.cancel)
        .delete_password_policy(record.id())
        .await?;
    Ok(Diagnostics::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsdp_core::resource::Value;
    use serde_json::json;

    #[test]
    fn canonical_strips_server_keys_and_sorts() {
        let body = json!({
            "meta": { "version": "W/\"1\"" },
            "id": "pp-1",
            "managingOrganization": "org-1",
            "expiryPeriodInDays": 90,
            "complexity": { "minLength": 8 }
        });
        assert_eq!(
            canonical(&body),
            r#"{"complexity":{"minLength":8},"expiryPeriodInDays":90}"#
        );
    }

    #[test]
    fn policy_json_must_be_an_object() {
        let record = Record::new("hsdp_iam_password_policy")
            .with_attribute("policy_json", Value::string("[1,2]"));
        assert!(desired_policy(&record).is_err());

        let record = Record::new("hsdp_iam_password_policy")
            .with_attribute("policy_json", Value::string("{\"historyCount\": 5}"));
        assert_eq!(desired_policy(&record).unwrap()["historyCount"], json!(5));
    }
}
