//! DICOM configuration: store service (SCP) settings and the FHIR store
//! link of an organization
//!
//! The configuration service answers 403 while a freshly issued token is
//! still propagating, so every call here runs under the permanent-marker
//! policy, which refreshes the token and tries again.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use hsdp_core::error::{ProviderError, ProviderResult, ResultExt};

use super::encode_segment;
use crate::client::{ApiRequest, ApiResponse, ServiceClient};

const API_VERSION: &str = "1";

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConnection {
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub host_name: String,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub disable_ipv6: bool,
    #[serde(default)]
    pub pdu_length: u32,
    #[serde(default)]
    pub artim_timeout: u32,
    #[serde(default)]
    pub association_idle_timeout: u32,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScpConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsecure_network_connection: Option<NetworkConnection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure_network_connection: Option<NetworkConnection>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FhirStore {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub mpi_endpoint: String,
}

pub struct DicomApi<'a> {
    client: &'a ServiceClient,
    cancel: &'a CancellationToken,
    organization_id: &'a str,
}

impl<'a> DicomApi<'a> {
    pub fn new(
        client: &'a ServiceClient,
        cancel: &'a CancellationToken,
        organization_id: &'a str,
    ) -> Self {
        Self {
            client,
            cancel,
            organization_id,
        }
    }

    fn path(&self, leaf: &str) -> String {
        format!(
            "/store/dicom/config/dicom/production/organizations/{}/{}",
            encode_segment(self.organization_id),
            leaf
        )
    }

    async fn send(&self, request: ApiRequest) -> ProviderResult<ApiResponse> {
        self.client
            .call_marked(
                self.cancel,
                request
                    .api_version(API_VERSION)
                    .header("organizationId", self.organization_id),
            )
            .await
    }

    pub async fn get_scp_config(&self) -> ProviderResult<ScpConfig> {
        self.send(ApiRequest::get(self.path("scpConfig")))
            .await
            .context("getSCPConfig")?
            .decode()
    }

    pub async fn set_scp_config(&self, config: &ScpConfig) -> ProviderResult<ScpConfig> {
        let body =
            serde_json::to_value(config).map_err(|e| ProviderError::Decode(e.to_string()))?;
        self.send(ApiRequest::post(self.path("scpConfig")).json(body))
            .await
            .context("setSCPConfig")?
            .decode()
    }

    pub async fn get_fhir_store(&self) -> ProviderResult<FhirStore> {
        self.send(ApiRequest::get(self.path("fhirStore")))
            .await
            .context("getFHIRStore")?
            .decode()
    }

    pub async fn set_fhir_store(&self, store: &FhirStore) -> ProviderResult<FhirStore> {
        let body =
            serde_json::to_value(store).map_err(|e| ProviderError::Decode(e.to_string()))?;
        self.send(ApiRequest::post(self.path("fhirStore")).json(body))
            .await
            .context("setFHIRStore")?
            .decode()
    }
}
