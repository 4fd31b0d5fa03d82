//! Clinical Data Lake: research studies, their role grants, and data-type
//! definitions

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use hsdp_core::error::{ProviderError, ProviderResult, ResultExt};

use super::{Bundle, item_path};
use crate::client::{ApiRequest, ApiResponse, ServiceClient};

const STUDY: &str = "/Study";
const DATA_TYPE_DEFINITION: &str = "/DataTypeDefinition";
const API_VERSION: &str = "3";

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Study {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ends_at: String,
    #[serde(default)]
    pub study_owner: String,
    #[serde(default)]
    pub data_protected_from_deletion: bool,
}

impl Study {
    /// Fields an adopted study is brought in line with
    pub fn differs_in_mutable_fields(&self, other: &Study) -> bool {
        self.description != other.description
            || self.ends_at != other.ends_at
            || self.data_protected_from_deletion != other.data_protected_from_deletion
    }
}

/// One user's grant of one role in a study
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoleRequest {
    pub user_id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub institution_id: String,
    pub role: String,
}

impl RoleRequest {
    /// Same grant regardless of the contact address
    pub fn equal_enough(&self, other: &RoleRequest) -> bool {
        self.user_id == other.user_id
            && self.role == other.role
            && self.institution_id == other.institution_id
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleUser {
    user_id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    institution_id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RoleEntry {
    role: String,
    #[serde(default)]
    users: Vec<RoleUser>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PermissionList {
    #[serde(default)]
    role_list: Vec<RoleEntry>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DataTypeDefinition {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub json_schema: serde_json::Value,
}

pub struct CdlApi<'a> {
    client: &'a ServiceClient,
    cancel: &'a CancellationToken,
}

impl<'a> CdlApi<'a> {
    pub fn new(client: &'a ServiceClient, cancel: &'a CancellationToken) -> Self {
        Self { client, cancel }
    }

    async fn send(&self, request: ApiRequest) -> ProviderResult<ApiResponse> {
        self.client
            .call(self.cancel, request.api_version(API_VERSION))
            .await
    }

    // =========================================================================
    // Studies
    // =========================================================================

    pub async fn create_study(&self, study: &Study) -> ProviderResult<Study> {
        let body = serde_json::to_value(study)
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        self.send(ApiRequest::post(STUDY).json(body))
            .await
            .context("createStudy")?
            .decode()
    }

    pub async fn get_study(&self, id: &str) -> ProviderResult<Study> {
        self.send(ApiRequest::get(item_path(STUDY, id)))
            .await?
            .decode()
    }

    pub async fn find_studies_by_title(&self, title: &str) -> ProviderResult<Vec<Study>> {
        let bundle: Bundle<Study> = self
            .send(ApiRequest::get(STUDY).query("title", title))
            .await?
            .decode()?;
        Ok(bundle.entry.into_iter().filter(|s| s.title == title).collect())
    }

    pub async fn update_study(&self, study: &Study) -> ProviderResult<()> {
        let body = json!({
            "title": study.title,
            "description": study.description,
            "endsAt": study.ends_at,
            "dataProtectedFromDeletion": study.data_protected_from_deletion,
        });
        self.send(ApiRequest::put(item_path(STUDY, &study.id)).json(body))
            .await
            .context("updateStudy")?;
        Ok(())
    }

    /// Every (user, role) grant in the study
    pub async fn permissions(&self, study_id: &str) -> ProviderResult<Vec<RoleRequest>> {
        let path = format!("{}/$get-permissions", item_path(STUDY, study_id));
        let list: PermissionList = self.send(ApiRequest::get(path)).await?.decode()?;
        Ok(list
            .role_list
            .into_iter()
            .flat_map(|entry| {
                let role = entry.role;
                entry.users.into_iter().map(move |u| RoleRequest {
                    user_id: u.user_id,
                    email: u.email,
                    institution_id: u.institution_id,
                    role: role.clone(),
                })
            })
            .collect())
    }

    pub async fn grant_permission(&self, study_id: &str, request: &RoleRequest) -> ProviderResult<()> {
        self.permission_operation(study_id, "$grant", request).await
    }

    pub async fn revoke_permission(
        &self,
        study_id: &str,
        request: &RoleRequest,
    ) -> ProviderResult<()> {
        self.permission_operation(study_id, "$revoke", request)
            .await
    }

    async fn permission_operation(
        &self,
        study_id: &str,
        operation: &str,
        request: &RoleRequest,
    ) -> ProviderResult<()> {
        let path = format!("{}/{}", item_path(STUDY, study_id), operation);
        self.send(ApiRequest::post(path).json(json!({ "roleRequest": [request] })))
            .await?;
        Ok(())
    }

    // =========================================================================
    // Data-type definitions
    // =========================================================================

    pub async fn create_data_type_definition(
        &self,
        definition: &DataTypeDefinition,
    ) -> ProviderResult<DataTypeDefinition> {
        let body = serde_json::to_value(definition)
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        self.send(ApiRequest::post(DATA_TYPE_DEFINITION).json(body))
            .await
            .context("createDataTypeDefinition")?
            .decode()
    }

    pub async fn get_data_type_definition(&self, id: &str) -> ProviderResult<DataTypeDefinition> {
        self.send(ApiRequest::get(item_path(DATA_TYPE_DEFINITION, id)))
            .await?
            .decode()
    }

    pub async fn find_data_type_definitions(
        &self,
        name: &str,
    ) -> ProviderResult<Vec<DataTypeDefinition>> {
        let bundle: Bundle<DataTypeDefinition> = self
            .send(ApiRequest::get(DATA_TYPE_DEFINITION).query("name", name))
            .await?
            .decode()?;
        Ok(bundle.entry.into_iter().filter(|d| d.name == name).collect())
    }

    pub async fn update_data_type_definition(
        &self,
        definition: &DataTypeDefinition,
    ) -> ProviderResult<()> {
        let body = json!({
            "name": definition.name,
            "description": definition.description,
            "jsonSchema": definition.json_schema,
        });
        self.send(ApiRequest::put(item_path(DATA_TYPE_DEFINITION, &definition.id)).json(body))
            .await
            .context("updateDataTypeDefinition")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(user: &str, email: &str, role: &str) -> RoleRequest {
        RoleRequest {
            user_id: user.into(),
            email: email.into(),
            institution_id: "inst-1".into(),
            role: role.into(),
        }
    }

    #[test]
    fn equal_enough_ignores_email() {
        let a = grant("u1", "a@example.com", "STUDYMANAGER");
        let b = grant("u1", "b@example.com", "STUDYMANAGER");
        assert!(a.equal_enough(&b));
        assert!(!a.equal_enough(&grant("u1", "a@example.com", "UPLOADER")));
        let mut c = b.clone();
        c.institution_id = "inst-2".into();
        assert!(!a.equal_enough(&c));
    }

    #[test]
    fn permission_list_flattens_roles() {
        let list: PermissionList = serde_json::from_value(json!({
            "roleList": [
                { "role": "STUDYMANAGER", "users": [{ "userId": "u1", "email": "a@example.com" }] },
                { "role": "UPLOADER", "users": [{ "userId": "u1" }, { "userId": "u2" }] }
            ]
        }))
        .unwrap();
        let count: usize = list.role_list.iter().map(|r| r.users.len()).sum();
        assert_eq!(count, 3);
    }
}
