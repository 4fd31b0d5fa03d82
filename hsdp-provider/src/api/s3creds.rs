//! S3 credentials service: access grants and policies

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use hsdp_core::error::{ProviderResult, ResultExt};

use super::item_path;
use crate::client::{ApiRequest, ApiResponse, ServiceClient};

const POLICY: &str = "/core/credentials/Policy";
const ACCESS: &str = "/core/credentials/Access";
const PRODUCT_KEY_HEADER: &str = "X-Product-Key";

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PolicyConditions {
    #[serde(rename = "managingOrganizations", default)]
    pub managing_organizations: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PolicyAllowed {
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Policy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub conditions: PolicyConditions,
    pub allowed: PolicyAllowed,
}

/// Temporary object-store credentials
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub session_token: String,
    #[serde(default)]
    pub expires: String,
    #[serde(default)]
    pub bucket: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Access {
    #[serde(default)]
    pub allowed: PolicyAllowed,
    #[serde(default)]
    pub credentials: Credentials,
}

pub struct S3CredsApi<'a> {
    client: &'a ServiceClient,
    cancel: &'a CancellationToken,
    product_key: &'a str,
}

impl<'a> S3CredsApi<'a> {
    pub fn new(
        client: &'a ServiceClient,
        cancel: &'a CancellationToken,
        product_key: &'a str,
    ) -> Self {
        Self {
            client,
            cancel,
            product_key,
        }
    }

    async fn send(&self, request: ApiRequest) -> ProviderResult<ApiResponse> {
        self.client
            .call(
                self.cancel,
                request
                    .api_version("1")
                    .header(PRODUCT_KEY_HEADER, self.product_key),
            )
            .await
    }

    pub async fn create_policy(&self, policy: &Policy) -> ProviderResult<Policy> {
        let body = json!({
            "conditions": policy.conditions,
            "allowed": policy.allowed,
        });
        self.send(ApiRequest::post(POLICY).json(body))
            .await
            .context("createPolicy")?
            .decode()
    }

    pub async fn get_policy(&self, id: i64) -> ProviderResult<Option<Policy>> {
        let policies: Vec<Policy> = self
            .send(ApiRequest::get(POLICY).query("id", id.to_string()))
            .await?
            .decode()?;
        Ok(policies.into_iter().find(|p| p.id == Some(id)))
    }

    pub async fn delete_policy(&self, id: i64) -> ProviderResult<()> {
        self.send(ApiRequest::delete(item_path(POLICY, &id.to_string())))
            .await
            .context("deletePolicy")?;
        Ok(())
    }

    pub async fn access(&self) -> ProviderResult<Vec<Access>> {
        self.send(ApiRequest::get(ACCESS))
            .await
            .context("getAccess")?
            .decode()
    }
}
