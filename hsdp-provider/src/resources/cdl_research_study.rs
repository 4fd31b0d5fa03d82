//! hsdp_cdl_research_study: a Clinical Data Lake research study and its
//! role grants
//!
//! A study that already exists under the same title and owner is adopted.
//! Its grants are revoked first so the configured `permission` blocks start
//! from an empty baseline. Studies cannot be deleted remotely.

use std::collections::HashMap;

use chrono::DateTime;

use hsdp_core::adopt::{ConflictPolicy, Creation, FieldCheck, adopt_on_conflict};
use hsdp_core::client::ApiFamily;
use hsdp_core::diagnostics::{Diagnostic, Diagnostics, permission_read_fallback};
use hsdp_core::error::{ProviderError, ProviderResult};
use hsdp_core::reconcile::{ApplyOptions, CollectionDelta, apply_delta, intersect, reconcile};
use hsdp_core::resource::{Record, Value};
use hsdp_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

use super::{base_schema, connect, string_attr};
use crate::Ctx;
use crate::api::cdl::{CdlApi, RoleRequest, Study};

resource_handler!(CdlResearchStudy, "hsdp_cdl_research_study");

fn schema() -> ResourceSchema {
    base_schema("hsdp_cdl_research_study")
        .with_description("Clinical Data Lake research study")
        .attribute(string_attr("cdl_endpoint").required().force_new())
        .attribute(string_attr("title").required().force_new())
        .attribute(string_attr("description"))
        .attribute(string_attr("ends_at"))
        .attribute(string_attr("study_owner").required().force_new())
        .attribute(
            AttributeSchema::new("data_protected_from_deletion", AttributeType::Bool)
                .with_default(Value::Bool(false)),
        )
        .attribute(AttributeSchema::new(
            "permission",
            AttributeType::Set(Box::new(AttributeType::Block(vec![
                string_attr("user_id").required(),
                string_attr("email"),
                string_attr("institution_id"),
                string_attr("role").required(),
            ]))),
        ))
}

fn same_grant(a: &RoleRequest, b: &RoleRequest) -> bool {
    a.equal_enough(b)
}

fn grants(items: &[Value]) -> Vec<RoleRequest> {
    items
        .iter()
        .filter_map(|item| match item {
            Value::Map(map) => {
                let field = |key: &str| {
                    map.get(key)
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                };
                Some(RoleRequest {
                    user_id: field("user_id"),
                    email: field("email"),
                    institution_id: field("institution_id"),
                    role: field("role"),
                })
            }
            _ => None,
        })
        .collect()
}

fn grant_value(grant: &RoleRequest) -> Value {
    Value::Map(HashMap::from([
        ("user_id".to_string(), Value::string(&grant.user_id)),
        ("email".to_string(), Value::string(&grant.email)),
        ("institution_id".to_string(), Value::string(&grant.institution_id)),
        ("role".to_string(), Value::string(&grant.role)),
    ]))
}

fn desired_study(record: &Record) -> ProviderResult<Study> {
    let ends_at = record.get_string("ends_at");
    if !ends_at.is_empty() && DateTime::parse_from_rfc3339(&ends_at).is_err() {
        return Err(ProviderError::validation(format!(
            "ends_at '{}' is not an RFC 3339 timestamp",
            ends_at
        )));
    }
    Ok(Study {
        id: record.id().to_string(),
        title: record.get_string("title"),
        description: record.get_string("description"),
        ends_at,
        study_owner: record.get_string("study_owner"),
        data_protected_from_deletion: record.get_bool_or("data_protected_from_deletion", false),
    })
}

async fn create(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let desired = desired_study(record)?;
    let endpoint = record.get_string("cdl_endpoint");
    let client = connect(ctx, record, ApiFamily::Cdl, Some(&endpoint)).await?;
    let cdl = CdlApi::new(&client, ctx.cancel);

    let created = cdl.create_study(&desired).await;
    let creation = adopt_on_conflict(
        "study",
        ConflictPolicy::ConflictOnly,
        created,
        || cdl.find_studies_by_title(&desired.title),
        |existing| {
            FieldCheck::new()
                .field("title", desired.title.as_str(), existing.title.as_str())
                .field(
                    "study owner",
                    desired.study_owner.as_str(),
                    existing.study_owner.as_str(),
                )
                .finish()
        },
    )
    .await?;

    let mut diags = Diagnostics::new();
    let study = match creation {
        Creation::Created(study) => study,
        Creation::Adopted(existing) => {
            if existing.differs_in_mutable_fields(&desired) {
                let update = Study {
                    id: existing.id.clone(),
                    ..desired.clone()
                };
                cdl.update_study(&update).await?;
            }
            diags.extend(prune_permissions(&cdl, &existing.id).await?);
            if diags.has_error() {
                record.set_id(existing.id);
                return Ok(diags);
            }
            existing
        }
    };
    record.set_id(study.id);

    diags.extend(sync_permissions(&cdl, record, &[]).await);
    Ok(diags)
}

/// Revoke every grant of an adopted study
async fn prune_permissions(cdl: &CdlApi<'_>, study_id: &str) -> ProviderResult<Diagnostics> {
    let existing = cdl.permissions(study_id).await?;
    let delta = CollectionDelta {
        to_add: Vec::new(),
        to_remove: existing,
    };
    let report = apply_delta(
        delta,
        ApplyOptions::default(),
        move |grant: RoleRequest| async move { cdl.revoke_permission(study_id, &grant).await },
        move |grant: RoleRequest| async move { cdl.grant_permission(study_id, &grant).await },
    )
    .await;
    Ok(report.diagnostics(describe))
}

async fn read(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let endpoint = record.get_string("cdl_endpoint");
    let client = connect(ctx, record, ApiFamily::Cdl, Some(&endpoint)).await?;
    let cdl = CdlApi::new(&client, ctx.cancel);
    let id = record.id().to_string();

    let study = cdl.get_study(&id).await?;
    record.set_string("title", study.title);
    record.set_string("description", study.description);
    record.set_string("ends_at", study.ends_at);
    record.set_string("study_owner", study.study_owner);
    record.set(
        "data_protected_from_deletion",
        Value::Bool(study.data_protected_from_deletion),
    );

    let mut diags = Diagnostics::new();
    match cdl.permissions(&id).await {
        Ok(remote) => {
            let recorded = grants(record.get_items("permission"));
            let kept = intersect(&recorded, &remote, &same_grant);
            record.set("permission", Value::Set(kept.iter().map(grant_value).collect()));
        }
        Err(e) => diags.push(permission_read_fallback(e, "study permissions")?),
    }
    Ok(diags)
}

async fn update(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let desired = desired_study(record)?;
    let endpoint = record.get_string("cdl_endpoint");
    let client = connect(ctx, record, ApiFamily::Cdl, Some(&endpoint)).await?;
    let cdl = CdlApi::new(&client, ctx.cancel);

    if record.has_changes(&["description", "ends_at", "data_protected_from_deletion"]) {
        cdl.update_study(&desired).await?;
    }
    let old = grants(record.prior().get("permission").map(Value::items).unwrap_or(&[]));
    Ok(sync_permissions(&cdl, record, &old).await)
}

async fn delete(_ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    Ok(Diagnostic::warning(format!(
        "research study {} cannot be deleted remotely and was only removed from state",
        record.id()
    ))
    .into())
}

async fn sync_permissions(cdl: &CdlApi<'_>, record: &Record, old: &[RoleRequest]) -> Diagnostics {
    let study_id = record.id();
    reconcile(
        old,
        &grants(record.get_items("permission")),
        &same_grant,
        ApplyOptions::default(),
        move |grant: RoleRequest| async move { cdl.revoke_permission(study_id, &grant).await },
        move |grant: RoleRequest| async move { cdl.grant_permission(study_id, &grant).await },
    )
    .await
    .diagnostics(describe)
}

fn describe(grant: &RoleRequest) -> String {
    format!("role {} for user {}", grant.role, grant.user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_blocks_become_role_requests() {
        let grant = RoleRequest {
            user_id: "u1".into(),
            email: "a@example.com".into(),
            institution_id: "inst".into(),
            role: "UPLOADER".into(),
        };
        let parsed = grants(&[grant_value(&grant), Value::string("ignored")]);
        assert_eq!(parsed, vec![grant]);
    }

    #[test]
    fn ends_at_must_be_rfc3339() {
        let record = Record::new("hsdp_cdl_research_study")
            .with_attribute("title", Value::string("t"))
            .with_attribute("ends_at", Value::string("next tuesday"));
        assert!(desired_study(&record).is_err());

        let record = record.with_attribute("ends_at", Value::string("2030-01-01T00:00:00Z"));
        assert!(desired_study(&record).is_ok());
    }
}
