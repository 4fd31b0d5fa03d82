//! hsdp_iam_group: a group with user and service members and assigned roles
//!
//! Members are reconciled against the prior state; on read only the members
//! this record manages are kept, so members added elsewhere stay invisible.

use hsdp_core::client::ApiFamily;
use hsdp_core::diagnostics::{Diagnostics, permission_read_fallback};
use hsdp_core::error::ProviderResult;
use hsdp_core::reconcile::{ApplyOptions, Exact, intersect, reconcile};
use hsdp_core::resource::Record;
use hsdp_core::schema::ResourceSchema;

use super::{base_schema, connect, organization_of, set_strings, string_attr, string_set_attr};
use crate::Ctx;
use crate::api::iam::{IamApi, MemberKind};

resource_handler!(IamGroup, "hsdp_iam_group");

const MEMBERS: [(&str, MemberKind); 2] =
    [("users", MemberKind::User), ("services", MemberKind::Service)];

fn schema() -> ResourceSchema {
    base_schema("hsdp_iam_group")
        .with_description("IAM group")
        .attribute(string_attr("name").required().force_new())
        .attribute(string_attr("description"))
        .attribute(string_attr("managing_organization").force_new())
        .attribute(string_set_attr("users"))
        .attribute(string_set_attr("services"))
        .attribute(string_set_attr("roles"))
}

async fn create(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let client = connect(ctx, record, ApiFamily::Iam, None).await?;
    let iam = IamApi::new(&client, ctx.cancel);
    let organization = organization_of(record, "managing_organization", &client)?;

    let group = iam
        .create_group(
            &record.get_string("name"),
            &record.get_string("description"),
            &organization,
        )
        .await?;
    record.set_id(group.id);
    record.set_string("managing_organization", organization);

    Ok(sync_associations(&iam, record).await)
}

async fn read(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let client = connect(ctx, record, ApiFamily::Iam, None).await?;
    let iam = IamApi::new(&client, ctx.cancel);
    let id = record.id().to_string();

    let group = iam.get_group(&id).await?;
    record.set_string("name", group.name);
    record.set_string("description", group.description);
    if !group.managing_organization.is_empty() {
        record.set_string("managing_organization", group.managing_organization);
    }

    let mut diags = Diagnostics::new();
    for (key, kind) in MEMBERS {
        match iam.group_members(&id, kind).await {
            Ok(remote) => {
                let kept = intersect(&record.get_strings(key), &remote, &Exact);
                set_strings(record, key, kept);
            }
            Err(e) => diags.push(permission_read_fallback(e, key)?),
        }
    }

    match iam.group_roles(&id).await {
        Ok(roles) => set_strings(record, "roles", roles.into_iter().map(|r| r.id).collect()),
        Err(e) => diags.push(permission_read_fallback(e, "roles")?),
    }
    Ok(diags)
}

async fn update(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let client = connect(ctx, record, ApiFamily::Iam, None).await?;
    let iam = IamApi::new(&client, ctx.cancel);

    if record.has_change("description") {
        iam.update_group(record.id(), &record.get_string("description"))
            .await?;
    }
    Ok(sync_associations(&iam, record).await)
}

/// Remove every managed member and role, then the group itself
async fn delete(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let client = connect(ctx, record, ApiFamily::Iam, None).await?;
    let iam = IamApi::new(&client, ctx.cancel);
    let id = record.id().to_string();
    let group_id = id.as_str();
    let iam = &iam;

    let mut diags = Diagnostics::new();
    for (key, kind) in MEMBERS {
        let report = reconcile(
            &record.prior_strings(key),
            &[],
            &Exact,
            ApplyOptions::default(),
            move |member: String| async move { iam.remove_member(group_id, kind, &member).await },
            move |member: String| async move { iam.add_member(group_id, kind, &member).await },
        )
        .await;
        diags.extend(report.diagnostics(|m| format!("{} member {}", key, m)));
    }
    let report = reconcile(
        &record.prior_strings("roles"),
        &[],
        &Exact,
        ApplyOptions::default(),
        move |role: String| async move { iam.remove_role(group_id, &role).await },
        move |role: String| async move { iam.assign_role(group_id, &role).await },
    )
    .await;
    diags.extend(report.diagnostics(|r| format!("role {}", r)));
    if diags.has_error() {
        return Ok(diags);
    }

    iam.delete_group(group_id).await?;
    Ok(diags)
}

/// Bring members and roles from the prior state to the desired state
async fn sync_associations(iam: &IamApi<'_>, record: &Record) -> Diagnostics {
    let group_id = record.id();
    let mut diags = Diagnostics::new();

    for (key, kind) in MEMBERS {
        let report = reconcile(
            &record.prior_strings(key),
            &record.get_strings(key),
            &Exact,
            ApplyOptions::default(),
            move |member: String| async move { iam.remove_member(group_id, kind, &member).await },
            move |member: String| async move { iam.add_member(group_id, kind, &member).await },
        )
        .await;
        diags.extend(report.diagnostics(|m| format!("{} member {}", key, m)));
    }

    let report = reconcile(
        &record.prior_strings("roles"),
        &record.get_strings("roles"),
        &Exact,
        ApplyOptions::default(),
        move |role: String| async move { iam.remove_role(group_id, &role).await },
        move |role: String| async move { iam.assign_role(group_id, &role).await },
    )
    .await;
    diags.extend(report.diagnostics(|r| format!("role {}", r)));
    diags
}
