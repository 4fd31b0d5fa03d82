//! Docker registry namespaces and namespace users

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use hsdp_core::error::{ProviderError, ProviderResult, ResultExt};

use super::{Bundle, item_path};
use crate::client::{ApiRequest, ApiResponse, ServiceClient};

const NAMESPACES: &str = "/namespaces";

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Namespace {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub num_repos: i64,
}

/// Access flags of a user in a namespace
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceAccess {
    #[serde(default)]
    pub can_pull: bool,
    #[serde(default)]
    pub can_push: bool,
    #[serde(default)]
    pub can_delete: bool,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceUser {
    pub user_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(flatten)]
    pub access: NamespaceAccess,
}

pub struct DockerApi<'a> {
    client: &'a ServiceClient,
    cancel: &'a CancellationToken,
}

impl<'a> DockerApi<'a> {
    pub fn new(client: &'a ServiceClient, cancel: &'a CancellationToken) -> Self {
        Self { client, cancel }
    }

    async fn send(&self, request: ApiRequest) -> ProviderResult<ApiResponse> {
        self.client.call(self.cancel, request).await
    }

    pub async fn create_namespace(&self, name: &str, is_public: bool) -> ProviderResult<Namespace> {
        self.send(
            ApiRequest::post(NAMESPACES).json(json!({ "name": name, "isPublic": is_public })),
        )
        .await
        .context("createNamespace")?
        .decode()
    }

    pub async fn get_namespace(&self, id: &str) -> ProviderResult<Namespace> {
        self.send(ApiRequest::get(item_path(NAMESPACES, id)))
            .await?
            .decode()
    }

    pub async fn find_namespaces(&self, name: &str) -> ProviderResult<Vec<Namespace>> {
        let bundle: Bundle<Namespace> = self
            .send(ApiRequest::get(NAMESPACES).query("name", name))
            .await?
            .decode()?;
        Ok(bundle.entry.into_iter().filter(|n| n.name == name).collect())
    }

    pub async fn delete_namespace(&self, id: &str) -> ProviderResult<()> {
        self.send(ApiRequest::delete(item_path(NAMESPACES, id)))
            .await?;
        Ok(())
    }

    fn user_path(namespace_id: &str, user_id: &str) -> String {
        item_path(&format!("{}/users", item_path(NAMESPACES, namespace_id)), user_id)
    }

    pub async fn add_user(
        &self,
        namespace_id: &str,
        user_id: &str,
        access: NamespaceAccess,
    ) -> ProviderResult<()> {
        let mut body = serde_json::to_value(access)
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        body["userId"] = json!(user_id);
        self.send(
            ApiRequest::post(format!("{}/users", item_path(NAMESPACES, namespace_id))).json(body),
        )
        .await
        .context("addNamespaceUser")?;
        Ok(())
    }

    pub async fn get_user(&self, namespace_id: &str, user_id: &str) -> ProviderResult<NamespaceUser> {
        self.send(ApiRequest::get(Self::user_path(namespace_id, user_id)))
            .await?
            .decode()
    }

    pub async fn update_user_access(
        &self,
        namespace_id: &str,
        user_id: &str,
        access: NamespaceAccess,
    ) -> ProviderResult<()> {
        let body = serde_json::to_value(access)
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        self.send(ApiRequest::put(Self::user_path(namespace_id, user_id)).json(body))
            .await
            .context("updateNamespaceUser")?;
        Ok(())
    }

    pub async fn delete_user(&self, namespace_id: &str, user_id: &str) -> ProviderResult<()> {
        self.send(ApiRequest::delete(Self::user_path(namespace_id, user_id)))
            .await?;
        Ok(())
    }
}
