//! hsdp_s3creds_access: temporary object-store credentials
//!
//! The data source may log in with its own `username` and `password`; when
//! both are given they are used instead of the provider credentials.

use std::collections::HashMap;

use hsdp_core::client::ApiFamily;
use hsdp_core::config;
use hsdp_core::diagnostics::Diagnostics;
use hsdp_core::error::ProviderResult;
use hsdp_core::resource::{Record, Value};
use hsdp_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

use super::{base_schema, connect_with, string_attr};
use crate::Ctx;
use crate::api::s3creds::{Access, S3CredsApi};

data_source_handler!(S3CredsAccess, "hsdp_s3creds_access");

fn schema() -> ResourceSchema {
    base_schema("hsdp_s3creds_access")
        .with_description("Temporary S3 credentials")
        .attribute(string_attr("product_key").required().sensitive())
        .attribute(string_attr("username"))
        .attribute(string_attr("password").sensitive())
        .attribute(
            AttributeSchema::new(
                "access",
                AttributeType::List(Box::new(AttributeType::Block(vec![
                    AttributeSchema::new(
                        "allowed_resources",
                        AttributeType::List(Box::new(AttributeType::String)),
                    ),
                    AttributeSchema::new(
                        "actions",
                        AttributeType::List(Box::new(AttributeType::String)),
                    ),
                    string_attr("access_key").sensitive(),
                    string_attr("secret_key").sensitive(),
                    string_attr("session_token").sensitive(),
                    string_attr("expires"),
                    string_attr("bucket"),
                ]))),
            )
            .computed(),
        )
}

fn access_value(access: Access) -> Value {
    let strings = |items: Vec<String>| Value::List(items.into_iter().map(Value::String).collect());
    let credentials = access.credentials;
    Value::Map(HashMap::from([
        ("allowed_resources".to_string(), strings(access.allowed.resources)),
        ("actions".to_string(), strings(access.allowed.actions)),
        ("access_key".to_string(), Value::String(credentials.access_key)),
        ("secret_key".to_string(), Value::String(credentials.secret_key)),
        ("session_token".to_string(), Value::String(credentials.session_token)),
        ("expires".to_string(), Value::String(credentials.expires)),
        ("bucket".to_string(), Value::String(credentials.bucket)),
    ]))
}

async fn read(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let credentials = config::resolve_user_override(
        ctx.meta.config(),
        record.get_str("username"),
        record.get_str("password"),
    )?;
    let product_key = record.get_string("product_key");
    let client = connect_with(ctx, &credentials, ApiFamily::S3Creds, None).await?;
    let access = S3CredsApi::new(&client, ctx.cancel, &product_key)
        .access()
        .await?;

    record.set("access", Value::List(access.into_iter().map(access_value).collect()));
    record.set_id(uuid::Uuid::new_v4().to_string());
    Ok(Diagnostics::new())
}
