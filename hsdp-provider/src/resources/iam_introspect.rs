//! hsdp_iam_introspect: who the provider credentials act as, and with which
//! permissions in which organizations

use std::collections::HashMap;

use hsdp_core::client::ApiFamily;
use hsdp_core::diagnostics::Diagnostics;
use hsdp_core::error::{ProviderError, ProviderResult};
use hsdp_core::resource::{Record, Value};
use hsdp_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

use super::{base_schema, connect, string_attr};
use crate::Ctx;
use crate::api::iam::IamApi;

data_source_handler!(IamIntrospect, "hsdp_iam_introspect");

fn schema() -> ResourceSchema {
    base_schema("hsdp_iam_introspect")
        .with_description("Introspection of the provider's access token")
        .attribute(string_attr("username").computed())
        .attribute(string_attr("subject").computed())
        .attribute(string_attr("client_id").computed())
        .attribute(string_attr("managing_organization").computed())
        .attribute(
            AttributeSchema::new(
                "organizations",
                AttributeType::List(Box::new(AttributeType::Block(vec![
                    string_attr("organization_id"),
                    AttributeSchema::new(
                        "permissions",
                        AttributeType::Set(Box::new(AttributeType::String)),
                    ),
                ]))),
            )
            .computed(),
        )
}

async fn read(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let client = connect(ctx, record, ApiFamily::Iam, None).await?;
    let introspection = IamApi::new(&client, ctx.cancel).introspect().await?;
    if !introspection.active {
        return Err(ProviderError::AuthenticationFailed(
            "access token is not active".to_string(),
        ));
    }

    let organizations = introspection
        .organizations
        .organization_list
        .into_iter()
        .map(|org| {
            Value::Map(HashMap::from([
                ("organization_id".to_string(), Value::String(org.organization_id)),
                ("permissions".to_string(), Value::string_set(org.permissions)),
            ]))
        })
        .collect();

    record.set_id(introspection.sub.as_str());
    record.set_string("username", introspection.username);
    record.set_string("subject", introspection.sub);
    record.set_string("client_id", introspection.client_id);
    record.set_string(
        "managing_organization",
        introspection.organizations.managing_organization,
    );
    record.set("organizations", Value::List(organizations));
    Ok(Diagnostics::new())
}
