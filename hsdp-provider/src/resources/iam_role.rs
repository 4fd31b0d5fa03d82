//! hsdp_iam_role: a role and the permissions granted through it

use log::debug;

use hsdp_core::client::ApiFamily;
use hsdp_core::diagnostics::{Diagnostics, permission_read_fallback};
use hsdp_core::error::{ProviderError, ProviderResult};
use hsdp_core::reconcile::{ApplyOptions, Exact, reconcile};
use hsdp_core::resource::Record;
use hsdp_core::schema::ResourceSchema;

use super::{base_schema, connect, organization_of, set_strings, string_attr, string_set_attr};
use crate::Ctx;
use crate::api::iam::IamApi;

resource_handler!(IamRole, "hsdp_iam_role");

/// Holding this permission in the managing organization means a 403 on the
/// role can only be because the role is gone
const ROLE_WRITE: &str = "ROLE.WRITE";

/// Attempts for the role lookup; a 403 here is usually conclusive
const READ_ATTEMPTS: u32 = 2;

fn schema() -> ResourceSchema {
    base_schema("hsdp_iam_role")
        .with_description("IAM role")
        .attribute(string_attr("name").required().force_new())
        .attribute(string_attr("description").force_new())
        .attribute(string_attr("managing_organization").force_new())
        .attribute(string_set_attr("permissions").required())
}

async fn create(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let client = connect(ctx, record, ApiFamily::Iam, None).await?;
    let iam = IamApi::new(&client, ctx.cancel);
    let organization = organization_of(record, "managing_organization", &client)?;

    let role = iam
        .create_role(
            &record.get_string("name"),
            &record.get_string("description"),
            &organization,
        )
        .await?;
    record.set_id(role.id);
    record.set_string("managing_organization", organization);

    Ok(sync_permissions(&iam, record, &[]).await)
}

async fn read(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let client = connect(ctx, record, ApiFamily::Iam, None).await?;
    let iam = IamApi::new(&client, ctx.cancel);
    let id = record.id().to_string();

    let policy = client
        .retry_policy()
        .clone()
        .with_max_attempts(READ_ATTEMPTS);
    let role = match iam.get_role_with(&policy, &id).await {
        Ok(role) => role,
        Err(e) if e.status() == Some(403) => {
            let introspection = iam.introspect().await?;
            let organization = record
                .get_str("managing_organization")
                .unwrap_or(&introspection.organizations.managing_organization);
            if introspection.has_permission(organization, ROLE_WRITE) {
                debug!("403 on role {} while holding {}", id, ROLE_WRITE);
                return Err(ProviderError::PermissionMeansGone(format!("role {}", id)));
            }
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    record.set_string("name", role.name);
    record.set_string("description", role.description);
    if !role.managing_organization.is_empty() {
        record.set_string("managing_organization", role.managing_organization);
    }

    let mut diags = Diagnostics::new();
    match iam.role_permissions(&id).await {
        Ok(permissions) => set_strings(record, "permissions", permissions),
        Err(e) => diags.push(permission_read_fallback(e, "permissions")?),
    }
    Ok(diags)
}

async fn update(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let client = connect(ctx, record, ApiFamily::Iam, None).await?;
    let iam = IamApi::new(&client, ctx.cancel);
    let old = record.prior_strings("permissions");
    Ok(sync_permissions(&iam, record, &old).await)
}

async fn delete(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let client = connect(ctx, record, ApiFamily::Iam, None).await?;
    IamApi::new(&client, ctx.cancel)
        .delete_role(record.id())
        .await?;
    Ok(Diagnostics::new())
}

/// Unknown permissions come back as warnings; the rest of the batch still
/// applies
async fn sync_permissions(iam: &IamApi<'_>, record: &Record, old: &[String]) -> Diagnostics {
    let role_id = record.id();
    reconcile(
        old,
        &record.get_strings("permissions"),
        &Exact,
        ApplyOptions {
            permission_like: true,
        },
        move |p: String| async move { iam.remove_permission(role_id, &p).await },
        move |p: String| async move { iam.add_permission(role_id, &p).await },
    )
    .await
    .diagnostics(|p| p.clone())
}
