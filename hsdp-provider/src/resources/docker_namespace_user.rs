//! hsdp_docker_namespace_user: a user's access to a registry namespace
//!
//! The record id is `<namespace_id>/<user_id>`.

use hsdp_core::client::ApiFamily;
use hsdp_core::diagnostics::Diagnostics;
use hsdp_core::error::{ProviderError, ProviderResult};
use hsdp_core::resource::{Record, Value};
use hsdp_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

use super::{base_schema, connect, string_attr};
use crate::Ctx;
use crate::api::docker::{DockerApi, NamespaceAccess};

resource_handler!(DockerNamespaceUser, "hsdp_docker_namespace_user");

const FLAGS: [&str; 4] = ["can_pull", "can_push", "can_delete", "is_admin"];

fn schema() -> ResourceSchema {
    let mut schema = base_schema("hsdp_docker_namespace_user")
        .with_description("Access of one user to a registry namespace")
        .attribute(string_attr("namespace_id").required().force_new())
        .attribute(string_attr("user_id").required().force_new());
    for flag in FLAGS {
        schema = schema.attribute(
            AttributeSchema::new(flag, AttributeType::Bool).with_default(Value::Bool(false)),
        );
    }
    schema
}

fn split_id(id: &str) -> ProviderResult<(String, String)> {
    match id.split_once('/') {
        Some((namespace, user)) if !namespace.is_empty() && !user.is_empty() => {
            Ok((namespace.to_string(), user.to_string()))
        }
        _ => Err(ProviderError::validation(format!(
            "'{}' is not of the form <namespace_id>/<user_id>",
            id
        ))),
    }
}

fn desired_access(record: &Record) -> NamespaceAccess {
    NamespaceAccess {
        can_pull: record.get_bool_or("can_pull", false),
        can_push: record.get_bool_or("can_push", false),
        can_delete: record.get_bool_or("can_delete", false),
        is_admin: record.get_bool_or("is_admin", false),
    }
}

async fn create(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let namespace_id = record.get_string("namespace_id");
    let user_id = record.get_string("user_id");
    let client = connect(ctx, record, ApiFamily::DockerRegistry, None).await?;
    let docker = DockerApi::new(&client, ctx.cancel);
    let access = desired_access(record);

    match docker.add_user(&namespace_id, &user_id, access).await {
        Ok(()) => {}
        // Already a member: converge its access instead
        Err(e) if e.status() == Some(409) => {
            docker
                .update_user_access(&namespace_id, &user_id, access)
                .await?;
        }
        Err(e) => return Err(e),
    }
    record.set_id(format!("{}/{}", namespace_id, user_id));
    Ok(Diagnostics::new())
}

async fn read(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let (namespace_id, user_id) = split_id(record.id())?;
    let client = connect(ctx, record, ApiFamily::DockerRegistry, None).await?;
    let user = DockerApi::new(&client, ctx.cancel)
        .get_user(&namespace_id, &user_id)
        .await?;

    record.set_string("namespace_id", namespace_id);
    record.set_string("user_id", user.user_id);
    let access = user.access;
    for (flag, value) in FLAGS.into_iter().zip([
        access.can_pull,
        access.can_push,
        access.can_delete,
        access.is_admin,
    ]) {
        record.set(flag, Value::Bool(value));
    }
    Ok(Diagnostics::new())
}

async fn update(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    if !record.has_changes(&FLAGS) {
        return Ok(Diagnostics::new());
    }
    let (namespace_id, user_id) = split_id(record.id())?;
    let client = connect(ctx, record, ApiFamily::DockerRegistry, None).await?;
    DockerApi::new(&client, ctx.cancel)
        .update_user_access(&namespace_id, &user_id, desired_access(record))
        .await?;
    Ok(Diagnostics::new())
}

async fn delete(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let (namespace_id, user_id) = split_id(record.id())?;
    let client = connect(ctx, record, ApiFamily::DockerRegistry, None).await?;
    match DockerApi::new(&client, ctx.cancel)
        .delete_user(&namespace_id, &user_id)
        .await
    {
        Ok(()) => Ok(Diagnostics::new()),
        Err(e) if e.is_not_found() => Ok(Diagnostics::new()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_carries_namespace_and_user() {
        assert_eq!(
            split_id("ns-1/u-1").unwrap(),
            ("ns-1".to_string(), "u-1".to_string())
        );
        assert!(split_id("ns-1").is_err());
        assert!(split_id("/u-1").is_err());
    }
}
