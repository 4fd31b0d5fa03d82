//! hsdp_s3creds_policy: an access policy of the S3 credentials service

use hsdp_core::client::ApiFamily;
use hsdp_core::diagnostics::Diagnostics;
use hsdp_core::error::{ProviderError, ProviderResult};
use hsdp_core::resource::Record;
use hsdp_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

use super::{base_schema, connect, set_strings, string_attr, string_set_attr};
use crate::Ctx;
use crate::api::s3creds::{Policy, PolicyAllowed, PolicyConditions, S3CredsApi};

resource_handler!(S3CredsPolicy, "hsdp_s3creds_policy");

const ACTIONS: [&str; 4] = ["GET", "PUT", "LIST", "DELETE"];

fn schema() -> ResourceSchema {
    base_schema("hsdp_s3creds_policy")
        .with_description("S3 credentials access policy")
        .attribute(string_attr("product_key").required().force_new().sensitive())
        .attribute(string_set_attr("managing_organizations").required().force_new())
        .attribute(string_set_attr("groups").required().force_new())
        .attribute(string_set_attr("resources").required().force_new())
        .attribute(
            AttributeSchema::new(
                "actions",
                AttributeType::Set(Box::new(AttributeType::Enum(
                    ACTIONS.iter().map(|a| a.to_string()).collect(),
                ))),
            )
            .required()
            .force_new(),
        )
}

fn policy_id(record: &Record) -> ProviderResult<i64> {
    record
        .id()
        .parse()
        .map_err(|_| ProviderError::validation(format!("invalid policy id '{}'", record.id())))
}

async fn create(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let product_key = record.get_string("product_key");
    let client = connect(ctx, record, ApiFamily::S3Creds, None).await?;
    let policy = Policy {
        id: None,
        conditions: PolicyConditions {
            managing_organizations: record.get_strings("managing_organizations"),
            groups: record.get_strings("groups"),
        },
        allowed: PolicyAllowed {
            resources: record.get_strings("resources"),
            actions: record.get_strings("actions"),
        },
    };
    let created = S3CredsApi::new(&client, ctx.cancel, &product_key)
        .create_policy(&policy)
        .await?;
    let id = created
        .id
        .ok_or_else(|| ProviderError::Decode("policy without id".to_string()))?;
    record.set_id(id.to_string());
    Ok(Diagnostics::new())
}

async fn read(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let id = policy_id(record)?;
    let product_key = record.get_string("product_key");
    let client = connect(ctx, record, ApiFamily::S3Creds, None).await?;
    let policy = S3CredsApi::new(&client, ctx.cancel, &product_key)
        .get_policy(id)
        .await?
        .ok_or_else(|| ProviderError::not_found(format!("policy {}", id)))?;

    set_strings(
        record,
        "managing_organizations",
        policy.conditions.managing_organizations,
    );
    set_strings(record, "groups", policy.conditions.groups);
    set_strings(record, "resources", policy.allowed.resources);
    set_strings(record, "actions", policy.allowed.actions);
    Ok(Diagnostics::new())
}

async fn update(_ctx: Ctx<'_>, _record: &mut Record) -> ProviderResult<Diagnostics> {
    Ok(Diagnostics::new())
}

async fn delete(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let id = policy_id(record)?;
    let product_key = record.get_string("product_key");
    let client = connect(ctx, record, ApiFamily::S3Creds, None).await?;
    S3CredsApi::new(&client, ctx.cancel, &product_key)
        .delete_policy(id)
        .await?;
    Ok(Diagnostics::new())
}
