//! HSDP control-plane provider
//!
//! Concrete provider built on `hsdp-core`: authenticated API clients per
//! family, typed remote operations, and the resource and data-source
//! catalogue the host dispatches to.
//!
//! ## Module Structure
//!
//! - `auth` - OAuth token exchange
//! - `endpoints` - Endpoint inference and validation
//! - `client` - Authenticated per-family HTTP client and its factory
//! - `api` - Typed remote operations per API family
//! - `resources` - Resource and data-source handlers

pub mod api;
pub mod auth;
pub mod client;
pub mod endpoints;
pub mod resources;

use std::collections::HashMap;
use std::sync::Arc;

use hsdp_core::config::GlobalConfig;
use hsdp_core::error::ProviderResult;
use hsdp_core::provider::{Catalogue, Context};
use hsdp_core::resource::Value;

pub use client::{HsdpClientFactory, ServiceClient};

/// Provider-wide state handed to every entry point
pub struct HsdpMeta {
    config: Arc<GlobalConfig>,
    factory: HsdpClientFactory,
}

impl HsdpMeta {
    pub fn new(config: GlobalConfig) -> ProviderResult<Self> {
        let config = Arc::new(config);
        let factory = HsdpClientFactory::new(config.clone())?;
        Ok(Self { config, factory })
    }

    /// Build from the provider block, with environment fallbacks
    pub fn from_attributes(attributes: &HashMap<String, Value>) -> ProviderResult<Self> {
        Self::new(GlobalConfig::from_attributes(attributes)?)
    }

    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    pub fn factory(&self) -> &HsdpClientFactory {
        &self.factory
    }
}

/// Entry-point context of this provider
pub type Ctx<'a> = Context<'a, HsdpMeta>;

/// Every resource and data-source type this provider serves
pub fn provider() -> Catalogue<HsdpMeta> {
    use resources::*;

    Catalogue::new("hsdp")
        .with_resource(iam_group::IamGroup)
        .with_resource(iam_role::IamRole)
        .with_resource(iam_application::IamApplication)
        .with_resource(iam_password_policy::IamPasswordPolicy)
        .with_resource(cdl_research_study::CdlResearchStudy)
        .with_resource(cdl_data_type_definition::CdlDataTypeDefinition)
        .with_resource(dicom_store_config::DicomStoreConfig)
        .with_resource(docker_namespace::DockerNamespace)
        .with_resource(docker_namespace_user::DockerNamespaceUser)
        .with_resource(edge_firewall::EdgeAppFirewallExceptions)
        .with_resource(notification_producer::NotificationProducer)
        .with_resource(s3creds_policy::S3CredsPolicy)
        .with_data_source(s3creds_access::S3CredsAccess)
        .with_data_source(notification_subscriber::NotificationSubscriber)
        .with_data_source(iam_introspect::IamIntrospect)
}
