//! Resource and data-source handlers
//!
//! Each resource module defines a `schema()` function plus `create`, `read`,
//! `update` and `delete` async functions, and turns them into a handler with
//! [`resource_handler!`]. Data sources do the same with `schema()`, `read`
//! and [`data_source_handler!`].

use hsdp_core::client::{ApiFamily, ClientRequest, ScopedClient, acquire};
use hsdp_core::config::{self, Principal, ResolvedCredentials};
use hsdp_core::error::{ProviderError, ProviderResult};
use hsdp_core::resource::{Record, Value};
use hsdp_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use crate::Ctx;
use crate::client::ServiceClient;

/// Implement `ResourceHandler<HsdpMeta>` for a unit struct by delegating to
/// the enclosing module's `schema`, `create`, `read`, `update` and `delete`
macro_rules! resource_handler {
    ($handler:ident, $type_name:expr) => {
        pub struct $handler;

        impl hsdp_core::provider::ResourceHandler<crate::HsdpMeta> for $handler {
            fn name(&self) -> &'static str {
                $type_name
            }

            fn schema(&self) -> hsdp_core::schema::ResourceSchema {
                schema()
            }

            fn create<'a>(
                &'a self,
                ctx: crate::Ctx<'a>,
                record: &'a mut hsdp_core::resource::Record,
            ) -> hsdp_core::provider::BoxFuture<
                'a,
                hsdp_core::error::ProviderResult<hsdp_core::diagnostics::Diagnostics>,
            > {
                Box::pin(create(ctx, record))
            }

            fn read<'a>(
                &'a self,
                ctx: crate::Ctx<'a>,
                record: &'a mut hsdp_core::resource::Record,
            ) -> hsdp_core::provider::BoxFuture<
                'a,
                hsdp_core::error::ProviderResult<hsdp_core::diagnostics::Diagnostics>,
            > {
                Box::pin(read(ctx, record))
            }

            fn update<'a>(
                &'a self,
                ctx: crate::Ctx<'a>,
                record: &'a mut hsdp_core::resource::Record,
            ) -> hsdp_core::provider::BoxFuture<
                'a,
                hsdp_core::error::ProviderResult<hsdp_core::diagnostics::Diagnostics>,
            > {
                Box::pin(update(ctx, record))
            }

            fn delete<'a>(
                &'a self,
                ctx: crate::Ctx<'a>,
                record: &'a mut hsdp_core::resource::Record,
            ) -> hsdp_core::provider::BoxFuture<
                'a,
                hsdp_core::error::ProviderResult<hsdp_core::diagnostics::Diagnostics>,
            > {
                Box::pin(delete(ctx, record))
            }
        }
    };
}

/// Implement `DataSourceHandler<HsdpMeta>` by delegating to the enclosing
/// module's `schema` and `read`
macro_rules! data_source_handler {
    ($handler:ident, $type_name:expr) => {
        pub struct $handler;

        impl hsdp_core::provider::DataSourceHandler<crate::HsdpMeta> for $handler {
            fn name(&self) -> &'static str {
                $type_name
            }

            fn schema(&self) -> hsdp_core::schema::ResourceSchema {
                schema()
            }

            fn read<'a>(
                &'a self,
                ctx: crate::Ctx<'a>,
                record: &'a mut hsdp_core::resource::Record,
            ) -> hsdp_core::provider::BoxFuture<
                'a,
                hsdp_core::error::ProviderResult<hsdp_core::diagnostics::Diagnostics>,
            > {
                Box::pin(read(ctx, record))
            }
        }
    };
}

pub mod cdl_data_type_definition;
pub mod cdl_research_study;
pub mod dicom_store_config;
pub mod docker_namespace;
pub mod docker_namespace_user;
pub mod edge_firewall;
pub mod iam_application;
pub mod iam_group;
pub mod iam_introspect;
pub mod iam_password_policy;
pub mod iam_role;
pub mod notification_producer;
pub mod notification_subscriber;
pub mod s3creds_access;
pub mod s3creds_policy;

/// Schema with the attributes every resource shares
pub(crate) fn base_schema(resource_type: &str) -> ResourceSchema {
    ResourceSchema::new(resource_type).attribute(
        AttributeSchema::new("principal", types::principal_block())
            .with_description("Credential override for this resource only"),
    )
}

pub(crate) fn string_attr(name: &str) -> AttributeSchema {
    AttributeSchema::new(name, AttributeType::String)
}

pub(crate) fn string_set_attr(name: &str) -> AttributeSchema {
    AttributeSchema::new(name, types::string_set())
}

/// Acquire a client for the record's resolved credentials. `endpoint` is the
/// value of a family-specific endpoint attribute, if the resource has one.
pub(crate) async fn connect(
    ctx: Ctx<'_>,
    record: &Record,
    family: ApiFamily,
    endpoint: Option<&str>,
) -> ProviderResult<ScopedClient<ServiceClient>> {
    let principal = Principal::from_record(record);
    let credentials = config::resolve(ctx.meta.config(), principal.as_ref())?;
    connect_with(ctx, &credentials, family, endpoint).await
}

/// Acquire a client for already-resolved credentials
pub(crate) async fn connect_with(
    ctx: Ctx<'_>,
    credentials: &ResolvedCredentials,
    family: ApiFamily,
    endpoint: Option<&str>,
) -> ProviderResult<ScopedClient<ServiceClient>> {
    let request = ClientRequest::new(family, credentials).with_endpoint(endpoint);
    tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => Err(ProviderError::Cancelled),
        client = acquire(ctx.meta.factory(), request) => client,
    }
}

/// Write a list of strings as a set attribute
pub(crate) fn set_strings(record: &mut Record, key: &str, items: Vec<String>) {
    record.set(key, Value::string_set(items));
}

/// Organization a resource acts in: its own attribute, else the client's
/// token scope
pub(crate) fn organization_of(
    record: &Record,
    key: &str,
    client: &ServiceClient,
) -> ProviderResult<String> {
    record
        .get_str(key)
        .or(client.organization())
        .map(str::to_string)
        .ok_or_else(|| {
            ProviderError::validation(format!(
                "'{}' is required when no organization is configured",
                key
            ))
        })
}
