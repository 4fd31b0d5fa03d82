//! hsdp_iam_application: an application under a proposition
//!
//! Applications cannot be deleted through IAM; destroy only forgets them.

use log::warn;

use hsdp_core::adopt::{ConflictPolicy, FieldCheck, adopt_on_conflict};
use hsdp_core::client::ApiFamily;
use hsdp_core::diagnostics::Diagnostics;
use hsdp_core::error::ProviderResult;
use hsdp_core::resource::Record;
use hsdp_core::schema::ResourceSchema;

use super::{base_schema, connect, string_attr};
use crate::Ctx;
use crate::api::iam::IamApi;

resource_handler!(IamApplication, "hsdp_iam_application");

fn schema() -> ResourceSchema {
    base_schema("hsdp_iam_application")
        .with_description("IAM application")
        .attribute(string_attr("name").required().force_new())
        .attribute(string_attr("description").force_new())
        .attribute(string_attr("proposition_id").required().force_new())
        .attribute(string_attr("global_reference_id").force_new())
}

async fn create(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let client = connect(ctx, record, ApiFamily::Iam, None).await?;
    let iam = IamApi::new(&client, ctx.cancel);

    let name = record.get_string("name");
    let description = record.get_string("description");
    let proposition_id = record.get_string("proposition_id");

    let created = iam
        .create_application(
            &name,
            &description,
            &proposition_id,
            &record.get_string("global_reference_id"),
        )
        .await;
    let application = adopt_on_conflict(
        "application",
        ConflictPolicy::ConflictOrBadRequest,
        created,
        || iam.find_applications(&name, &proposition_id),
        |existing| {
            FieldCheck::new()
                .field("description", description.as_str(), existing.description.as_str())
                .field(
                    "proposition id",
                    proposition_id.as_str(),
                    existing.proposition_id.as_str(),
                )
                .finish()
        },
    )
    .await?
    .into_inner();

    record.set_id(application.id);
    if !application.global_reference_id.is_empty() {
        record.set_string("global_reference_id", application.global_reference_id);
    }
    Ok(Diagnostics::new())
}

async fn read(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let client = connect(ctx, record, ApiFamily::Iam, None).await?;
    let application = IamApi::new(&client, ctx.cancel)
        .get_application(record.id())
        .await?;
    record.set_string("name", application.name);
    record.set_string("description", application.description);
    record.set_string("proposition_id", application.proposition_id);
    record.set_string("global_reference_id", application.global_reference_id);
    Ok(Diagnostics::new())
}

async fn update(_ctx: Ctx<'_>, _record: &mut Record) -> ProviderResult<Diagnostics> {
    // Every attribute forces replacement
    Ok(Diagnostics::new())
}

async fn delete(_ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    warn!(
        "IAM applications cannot be deleted; forgetting application {}",
        record.id()
    );
    Ok(Diagnostics::new())
}
