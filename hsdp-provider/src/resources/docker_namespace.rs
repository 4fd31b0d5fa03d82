//! hsdp_docker_namespace: a container registry namespace

use regex::Regex;

use hsdp_core::adopt::{ConflictPolicy, FieldCheck, adopt_on_conflict};
use hsdp_core::client::ApiFamily;
use hsdp_core::diagnostics::Diagnostics;
use hsdp_core::error::{ProviderError, ProviderResult};
use hsdp_core::resource::{Record, Value};
use hsdp_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

use super::{base_schema, connect, string_attr};
use crate::Ctx;
use crate::api::docker::DockerApi;

resource_handler!(DockerNamespace, "hsdp_docker_namespace");

const NAME_PATTERN: &str = r"^[a-z0-9]+(?:[._-][a-z0-9]+)*$";

fn schema() -> ResourceSchema {
    base_schema("hsdp_docker_namespace")
        .with_description("Container registry namespace")
        .attribute(string_attr("name").required().force_new())
        .attribute(
            AttributeSchema::new("is_public", AttributeType::Bool)
                .force_new()
                .with_default(Value::Bool(false)),
        )
        .attribute(AttributeSchema::new("num_repos", AttributeType::Int).computed())
}

fn validate_name(name: &str) -> ProviderResult<()> {
    let pattern = Regex::new(NAME_PATTERN).map_err(|e| ProviderError::validation(e.to_string()))?;
    if pattern.is_match(name) {
        Ok(())
    } else {
        Err(ProviderError::validation(format!(
            "namespace name '{}' must be lowercase alphanumerics separated by '.', '_' or '-'",
            name
        )))
    }
}

async fn create(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let name = record.get_string("name");
    validate_name(&name)?;
    let is_public = record.get_bool_or("is_public", false);
    let client = connect(ctx, record, ApiFamily::DockerRegistry, None).await?;
    let docker = DockerApi::new(&client, ctx.cancel);

    let created = docker.create_namespace(&name, is_public).await;
    let namespace = adopt_on_conflict(
        "namespace",
        ConflictPolicy::ConflictOnly,
        created,
        || docker.find_namespaces(&name),
        |existing| {
            FieldCheck::new()
                .field("is_public", &is_public, &existing.is_public)
                .finish()
        },
    )
    .await?
    .into_inner();

    record.set_id(namespace.id);
    record.set("num_repos", Value::Int(namespace.num_repos));
    Ok(Diagnostics::new())
}

async fn read(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let client = connect(ctx, record, ApiFamily::DockerRegistry, None).await?;
    let namespace = DockerApi::new(&client, ctx.cancel)
        .get_namespace(record.id())
        .await?;
    record.set_string("name", namespace.name);
    record.set("is_public", Value::Bool(namespace.is_public));
    record.set("num_repos", Value::Int(namespace.num_repos));
    Ok(Diagnostics::new())
}

async fn update(_ctx: Ctx<'_>, _record: &mut Record) -> ProviderResult<Diagnostics> {
    Ok(Diagnostics::new())
}

async fn delete(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let client = connect(ctx, record, ApiFamily::DockerRegistry, None).await?;
    DockerApi::new(&client, ctx.cancel)
        .delete_namespace(record.id())
        .await?;
    Ok(Diagnostics::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_names() {
        assert!(validate_name("team-a").is_ok());
        assert!(validate_name("team.a_b").is_ok());
        assert!(validate_name("Team").is_err());
        assert!(validate_name("-team").is_err());
        assert!(validate_name("").is_err());
    }
}
