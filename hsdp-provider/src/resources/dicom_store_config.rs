//! hsdp_dicom_store_config: store service settings and FHIR store link of
//! an organization's DICOM store
//!
//! There is one configuration per organization, so the organization id is
//! the record id.

use log::info;

use hsdp_core::client::ApiFamily;
use hsdp_core::diagnostics::Diagnostics;
use hsdp_core::error::{ProviderError, ProviderResult};
use hsdp_core::resource::{Record, Value};
use hsdp_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::{base_schema, connect, string_attr};
use crate::Ctx;
use crate::api::dicom::{DicomApi, FhirStore, NetworkConnection, ScpConfig};

resource_handler!(DicomStoreConfig, "hsdp_dicom_store_config");

fn schema() -> ResourceSchema {
    base_schema("hsdp_dicom_store_config")
        .with_description("DICOM store configuration")
        .attribute(string_attr("config_url").required().force_new())
        .attribute(string_attr("organization_id").required().force_new())
        .attribute(string_attr("title"))
        .attribute(string_attr("description"))
        .attribute(AttributeSchema::new("unsecure_port", types::port_number()))
        .attribute(AttributeSchema::new(
            "fhir_store",
            AttributeType::Block(vec![string_attr("mpi_endpoint").required()]),
        ))
}

fn desired_scp(record: &Record) -> ProviderResult<ScpConfig> {
    let unsecure_network_connection = match record.get_int("unsecure_port") {
        Some(port) => Some(NetworkConnection {
            port: u16::try_from(port)
                .map_err(|_| ProviderError::validation(format!("invalid port {}", port)))?,
            ..Default::default()
        }),
        None => None,
    };
    Ok(ScpConfig {
        id: String::new(),
        title: record.get_string("title"),
        description: record.get_string("description"),
        unsecure_network_connection,
        secure_network_connection: None,
    })
}

fn desired_fhir_store(record: &Record) -> Option<FhirStore> {
    let block = record.get_block("fhir_store")?;
    let mpi_endpoint = block.get("mpi_endpoint").and_then(Value::as_str)?;
    Some(FhirStore {
        id: String::new(),
        mpi_endpoint: mpi_endpoint.to_string(),
    })
}

async fn apply(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<()> {
    let scp = desired_scp(record)?;
    let endpoint = record.get_string("config_url");
    let organization = record.get_string("organization_id");
    let client = connect(ctx, record, ApiFamily::DicomConfig, Some(&endpoint)).await?;
    let dicom = DicomApi::new(&client, ctx.cancel, &organization);

    dicom.set_scp_config(&scp).await?;
    if let Some(store) = desired_fhir_store(record) {
        dicom.set_fhir_store(&store).await?;
    }
    record.set_id(organization.as_str());
    Ok(())
}

async fn create(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    apply(ctx, record).await?;
    Ok(Diagnostics::new())
}

async fn read(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let endpoint = record.get_string("config_url");
    let organization = record.id().to_string();
    let client = connect(ctx, record, ApiFamily::DicomConfig, Some(&endpoint)).await?;
    let dicom = DicomApi::new(&client, ctx.cancel, &organization);

    let scp = dicom.get_scp_config().await?;
    record.set_string("organization_id", organization.as_str());
    record.set_string("title", scp.title);
    record.set_string("description", scp.description);
    match scp.unsecure_network_connection {
        Some(connection) if connection.port > 0 => {
            record.set("unsecure_port", Value::Int(i64::from(connection.port)));
        }
        _ => {
            record.remove("unsecure_port");
        }
    }

    if record.get_block("fhir_store").is_some() {
        let store = dicom.get_fhir_store().await?;
        record.set(
            "fhir_store",
            Value::List(vec![Value::Map(
                [("mpi_endpoint".to_string(), Value::string(store.mpi_endpoint))]
                    .into_iter()
                    .collect(),
            )]),
        );
    }
    Ok(Diagnostics::new())
}

async fn update(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    if record.has_changes(&["title", "description", "unsecure_port", "fhir_store"]) {
        apply(ctx, record).await?;
    }
    Ok(Diagnostics::new())
}

/// The organization keeps its store configuration
async fn delete(_ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    info!("forgetting DICOM store config of {}", record.id());
    Ok(Diagnostics::new())
}
