//! hsdp_cdl_data_type_definition: a Clinical Data Lake data-type definition

use log::warn;
use serde_json::Value as Json;

use hsdp_core::adopt::{ConflictPolicy, FieldCheck, adopt_on_conflict};
use hsdp_core::client::ApiFamily;
use hsdp_core::diagnostics::Diagnostics;
use hsdp_core::error::{ProviderError, ProviderResult};
use hsdp_core::resource::Record;
use hsdp_core::schema::ResourceSchema;

use super::{base_schema, connect, string_attr};
use crate::Ctx;
use crate::api::cdl::{CdlApi, DataTypeDefinition};

resource_handler!(CdlDataTypeDefinition, "hsdp_cdl_data_type_definition");

fn schema() -> ResourceSchema {
    base_schema("hsdp_cdl_data_type_definition")
        .with_description("Clinical Data Lake data-type definition")
        .attribute(string_attr("cdl_endpoint").required().force_new())
        .attribute(string_attr("name").required().force_new())
        .attribute(string_attr("description"))
        .attribute(
            string_attr("json_schema")
                .required()
                .with_description("JSON schema of the data type"),
        )
}

fn desired_definition(record: &Record) -> ProviderResult<DataTypeDefinition> {
    let json_schema = serde_json::from_str::<Json>(&record.get_string("json_schema"))
        .map_err(|e| ProviderError::validation(format!("json_schema is not valid JSON: {}", e)))?;
    Ok(DataTypeDefinition {
        id: record.id().to_string(),
        name: record.get_string("name"),
        description: record.get_string("description"),
        json_schema,
    })
}

async fn create(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let desired = desired_definition(record)?;
    let endpoint = record.get_string("cdl_endpoint");
    let client = connect(ctx, record, ApiFamily::Cdl, Some(&endpoint)).await?;
    let cdl = CdlApi::new(&client, ctx.cancel);

    let created = cdl.create_data_type_definition(&desired).await;
    let definition = adopt_on_conflict(
        "data type definition",
        ConflictPolicy::ConflictOrBadRequest,
        created,
        || cdl.find_data_type_definitions(&desired.name),
        |existing| {
            FieldCheck::new()
                .field("name", desired.name.as_str(), existing.name.as_str())
                .finish()
        },
    )
    .await?;

    let adopted = definition.is_adopted();
    let definition = definition.into_inner();
    record.set_id(&definition.id);
    if adopted && definition.description != desired.description {
        let update = DataTypeDefinition {
            id: definition.id,
            ..desired
        };
        cdl.update_data_type_definition(&update).await?;
    }
    Ok(Diagnostics::new())
}

async fn read(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let endpoint = record.get_string("cdl_endpoint");
    let client = connect(ctx, record, ApiFamily::Cdl, Some(&endpoint)).await?;
    let definition = CdlApi::new(&client, ctx.cancel)
        .get_data_type_definition(record.id())
        .await?;
    record.set_string("name", definition.name);
    record.set_string("description", definition.description);
    // Keep the configured text when it is the same document
    let configured = serde_json::from_str::<Json>(&record.get_string("json_schema")).ok();
    if configured.as_ref() != Some(&definition.json_schema) {
        record.set_string("json_schema", definition.json_schema.to_string());
    }
    Ok(Diagnostics::new())
}

async fn update(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    if !record.has_changes(&["description", "json_schema"]) {
        return Ok(Diagnostics::new());
    }
    let desired = desired_definition(record)?;
    let endpoint = record.get_string("cdl_endpoint");
    let client = connect(ctx, record, ApiFamily::Cdl, Some(&endpoint)).await?;
    CdlApi::new(&client, ctx.cancel)
        .update_data_type_definition(&desired)
        .await?;
    Ok(Diagnostics::new())
}

/// Data-type definitions are shared by every study of the lake; destroy
/// only forgets the definition
async fn delete(_ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    warn!(
        "data type definition {} is kept remotely and only removed from state",
        record.id()
    );
    Ok(Diagnostics::new())
}
