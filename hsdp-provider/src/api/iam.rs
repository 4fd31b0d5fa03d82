//! IAM identity API: groups, roles, applications, password policies and
//! token introspection

use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use hsdp_core::error::{ProviderResult, ResultExt};
use hsdp_core::retry::RetryPolicy;

use super::{Bundle, item_path};
use crate::client::{ApiRequest, ServiceClient};

const GROUP: &str = "/authorize/identity/Group";
const ROLE: &str = "/authorize/identity/Role";
const PERMISSION: &str = "/authorize/identity/Permission";
const APPLICATION: &str = "/authorize/identity/Application";
const PASSWORD_POLICY: &str = "/authorize/identity/PasswordPolicy";
const USER: &str = "/authorize/identity/User";
const SERVICE: &str = "/authorize/identity/Service";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    #[serde(default, alias = "groupName")]
    pub name: String,
    #[serde(default, alias = "groupDescription")]
    pub description: String,
    #[serde(default, alias = "orgId")]
    pub managing_organization: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub managing_organization: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub proposition_id: String,
    #[serde(default)]
    pub global_reference_id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Reference {
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct PermissionEntry {
    name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntrospectOrganization {
    pub organization_id: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntrospectOrganizations {
    #[serde(default)]
    pub managing_organization: String,
    #[serde(default)]
    pub organization_list: Vec<IntrospectOrganization>,
}

/// Token introspection result
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Introspection {
    pub active: bool,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub sub: String,
    #[serde(default, rename = "client_id")]
    pub client_id: String,
    #[serde(default)]
    pub organizations: IntrospectOrganizations,
}

impl Introspection {
    /// Whether the caller holds `permission` in `organization`
    pub fn has_permission(&self, organization: &str, permission: &str) -> bool {
        self.organizations
            .organization_list
            .iter()
            .filter(|o| o.organization_id == organization)
            .any(|o| o.permissions.iter().any(|p| p == permission))
    }
}

/// Group member kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    User,
    Service,
}

impl MemberKind {
    fn collection(&self) -> &'static str {
        match self {
            MemberKind::User => USER,
            MemberKind::Service => SERVICE,
        }
    }

    fn operations(&self) -> (&'static str, &'static str) {
        match self {
            MemberKind::User => ("$add-members", "$remove-members"),
            MemberKind::Service => ("$add-services", "$remove-services"),
        }
    }

    fn parameter(&self) -> &'static str {
        match self {
            MemberKind::User => "UserIDCollection",
            MemberKind::Service => "ServiceIDCollection",
        }
    }
}

pub struct IamApi<'a> {
    client: &'a ServiceClient,
    cancel: &'a CancellationToken,
}

impl<'a> IamApi<'a> {
    pub fn new(client: &'a ServiceClient, cancel: &'a CancellationToken) -> Self {
        Self { client, cancel }
    }

    async fn send(&self, request: ApiRequest) -> ProviderResult<crate::client::ApiResponse> {
        self.client.call(self.cancel, request).await
    }

    // =========================================================================
    // Groups
    // =========================================================================

    pub async fn create_group(
        &self,
        name: &str,
        description: &str,
        organization: &str,
    ) -> ProviderResult<Group> {
        let body = json!({
            "name": name,
            "description": description,
            "managingOrganization": organization,
        });
        self.send(ApiRequest::post(GROUP).api_version("1").json(body))
            .await
            .context("createGroup")?
            .decode()
    }

    pub async fn get_group(&self, id: &str) -> ProviderResult<Group> {
        self.send(ApiRequest::get(item_path(GROUP, id)).api_version("1"))
            .await?
            .decode()
    }

    pub async fn update_group(&self, id: &str, description: &str) -> ProviderResult<()> {
        let body = json!({ "description": description });
        self.send(ApiRequest::put(item_path(GROUP, id)).api_version("1").json(body))
            .await
            .context("updateGroup")?;
        Ok(())
    }

    pub async fn delete_group(&self, id: &str) -> ProviderResult<()> {
        self.send(ApiRequest::delete(item_path(GROUP, id)).api_version("1"))
            .await?;
        Ok(())
    }

    /// Ids of the group's members of one kind
    pub async fn group_members(&self, group_id: &str, kind: MemberKind) -> ProviderResult<Vec<String>> {
        let bundle: Bundle<Reference> = self
            .send(
                ApiRequest::get(kind.collection())
                    .api_version("1")
                    .query("groupId", group_id),
            )
            .await?
            .decode()?;
        Ok(bundle.entry.into_iter().map(|r| r.id).collect())
    }

    pub async fn add_member(&self, group_id: &str, kind: MemberKind, id: &str) -> ProviderResult<()> {
        self.member_operation(group_id, kind, kind.operations().0, id)
            .await
    }

    pub async fn remove_member(
        &self,
        group_id: &str,
        kind: MemberKind,
        id: &str,
    ) -> ProviderResult<()> {
        self.member_operation(group_id, kind, kind.operations().1, id)
            .await
    }

    async fn member_operation(
        &self,
        group_id: &str,
        kind: MemberKind,
        operation: &str,
        id: &str,
    ) -> ProviderResult<()> {
        let body = json!({
            "resourceType": "Parameters",
            "parameter": [{
                "name": kind.parameter(),
                "references": [{ "reference": id }],
            }],
        });
        let path = format!("{}/{}", item_path(GROUP, group_id), operation);
        self.send(ApiRequest::post(path).api_version("1").json(body))
            .await?;
        Ok(())
    }

    pub async fn group_roles(&self, group_id: &str) -> ProviderResult<Vec<Role>> {
        let bundle: Bundle<Role> = self
            .send(
                ApiRequest::get(ROLE)
                    .api_version("1")
                    .query("groupId", group_id),
            )
            .await?
            .decode()?;
        Ok(bundle.entry)
    }

    pub async fn assign_role(&self, group_id: &str, role_id: &str) -> ProviderResult<()> {
        let path = format!("{}/$assign-role", item_path(GROUP, group_id));
        self.send(
            ApiRequest::post(path)
                .api_version("1")
                .json(json!({ "roles": [role_id] })),
        )
        .await?;
        Ok(())
    }

    pub async fn remove_role(&self, group_id: &str, role_id: &str) -> ProviderResult<()> {
        let path = format!("{}/$remove-role", item_path(GROUP, group_id));
        self.send(
            ApiRequest::post(path)
                .api_version("1")
                .json(json!({ "roles": [role_id] })),
        )
        .await?;
        Ok(())
    }

    // =========================================================================
    // Roles
    // =========================================================================

    pub async fn create_role(
        &self,
        name: &str,
        description: &str,
        organization: &str,
    ) -> ProviderResult<Role> {
        let body = json!({
            "name": name,
            "description": description,
            "managingOrganization": organization,
        });
        self.send(ApiRequest::post(ROLE).api_version("1").json(body))
            .await
            .context("createRole")?
            .decode()
    }

    /// Read a role under an explicit policy; used where a 403 must conclude
    /// quickly
    pub async fn get_role_with(&self, policy: &RetryPolicy, id: &str) -> ProviderResult<Role> {
        self.client
            .call_with(
                policy,
                self.cancel,
                ApiRequest::get(item_path(ROLE, id)).api_version("1"),
            )
            .await?
            .decode()
    }

    pub async fn delete_role(&self, id: &str) -> ProviderResult<()> {
        self.send(ApiRequest::delete(item_path(ROLE, id)).api_version("1"))
            .await?;
        Ok(())
    }

    pub async fn role_permissions(&self, role_id: &str) -> ProviderResult<Vec<String>> {
        let bundle: Bundle<PermissionEntry> = self
            .send(
                ApiRequest::get(PERMISSION)
                    .api_version("1")
                    .query("roleId", role_id),
            )
            .await?
            .decode()?;
        Ok(bundle.entry.into_iter().map(|p| p.name).collect())
    }

    pub async fn add_permission(&self, role_id: &str, permission: &str) -> ProviderResult<()> {
        let path = format!("{}/$assign-permission", item_path(ROLE, role_id));
        self.send(
            ApiRequest::post(path)
                .api_version("1")
                .json(json!({ "permissions": [permission] })),
        )
        .await?;
        Ok(())
    }

    pub async fn remove_permission(&self, role_id: &str, permission: &str) -> ProviderResult<()> {
        let path = format!("{}/$remove-permission", item_path(ROLE, role_id));
        self.send(
            ApiRequest::post(path)
                .api_version("1")
                .json(json!({ "permissions": [permission] })),
        )
        .await?;
        Ok(())
    }

    // =========================================================================
    // Applications
    // =========================================================================

    pub async fn create_application(
        &self,
        name: &str,
        description: &str,
        proposition_id: &str,
        global_reference_id: &str,
    ) -> ProviderResult<Application> {
        let body = json!({
            "name": name,
            "description": description,
            "propositionId": proposition_id,
            "globalReferenceId": global_reference_id,
        });
        self.send(ApiRequest::post(APPLICATION).api_version("1").json(body))
            .await
            .context("createApplication")?
            .decode()
    }

    pub async fn get_application(&self, id: &str) -> ProviderResult<Application> {
        self.send(ApiRequest::get(item_path(APPLICATION, id)).api_version("1"))
            .await?
            .decode()
    }

    pub async fn find_applications(
        &self,
        name: &str,
        proposition_id: &str,
    ) -> ProviderResult<Vec<Application>> {
        let bundle: Bundle<Application> = self
            .send(
                ApiRequest::get(APPLICATION)
                    .api_version("1")
                    .query("name", name)
                    .query("propositionId", proposition_id),
            )
            .await?
            .decode()?;
        Ok(bundle.entry)
    }

    // =========================================================================
    // Password policies
    // =========================================================================

    pub async fn create_password_policy(
        &self,
        policy: serde_json::Value,
    ) -> ProviderResult<serde_json::Value> {
        Ok(self
            .send(ApiRequest::post(PASSWORD_POLICY).api_version("1").json(policy))
            .await
            .context("createPasswordPolicy")?
            .body)
    }

    pub async fn get_password_policy(&self, id: &str) -> ProviderResult<serde_json::Value> {
        Ok(self
            .send(ApiRequest::get(item_path(PASSWORD_POLICY, id)).api_version("1"))
            .await?
            .body)
    }

    pub async fn update_password_policy(
        &self,
        id: &str,
        policy: serde_json::Value,
    ) -> ProviderResult<()> {
        self.send(
            ApiRequest::put(item_path(PASSWORD_POLICY, id))
                .api_version("1")
                .json(policy),
        )
        .await
        .context("updatePasswordPolicy")?;
        Ok(())
    }

    pub async fn delete_password_policy(&self, id: &str) -> ProviderResult<()> {
        self.send(ApiRequest::delete(item_path(PASSWORD_POLICY, id)).api_version("1"))
            .await?;
        Ok(())
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Introspect the client's own access token
    pub async fn introspect(&self) -> ProviderResult<Introspection> {
        let token = self.client.access_token().await;
        let url = format!("{}/authorize/oauth2/introspect", self.client.iam_url());
        self.send(
            ApiRequest::post(url)
                .api_version("4")
                .form(&[("token", token.as_str())]),
        )
        .await
        .context("introspect")?
        .decode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn introspection_permission_lookup() {
        let introspection: Introspection = serde_json::from_value(json!({
            "active": true,
            "username": "svc@app.example",
            "organizations": {
                "managingOrganization": "org-1",
                "organizationList": [
                    { "organizationId": "org-1", "permissions": ["ROLE.READ", "ROLE.WRITE"] },
                    { "organizationId": "org-2", "permissions": ["GROUP.READ"] }
                ]
            }
        }))
        .unwrap();
        assert!(introspection.has_permission("org-1", "ROLE.WRITE"));
        assert!(!introspection.has_permission("org-2", "ROLE.WRITE"));
        assert!(!introspection.has_permission("org-3", "ROLE.WRITE"));
    }

    #[test]
    fn group_accepts_legacy_field_names() {
        let group: Group = serde_json::from_value(json!({
            "id": "g-1",
            "groupName": "admins",
            "orgId": "org-1"
        }))
        .unwrap();
        assert_eq!(group.name, "admins");
        assert_eq!(group.managing_organization, "org-1");
        assert_eq!(group.description, "");
    }
}
