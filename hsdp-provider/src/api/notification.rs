//! Notification bus: producers and subscribers

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use hsdp_core::error::{ProviderError, ProviderResult, ResultExt};

use super::item_path;
use crate::client::{ApiRequest, ApiResponse, ServiceClient};

const PRODUCER: &str = "/notification/producer";
const SUBSCRIBER: &str = "/notification/subscriber";
const API_VERSION: &str = "2";

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Producer {
    #[serde(default, rename = "_id", skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub managing_organization_id: String,
    #[serde(default)]
    pub managing_organization: String,
    pub producer_product_name: String,
    #[serde(default)]
    pub producer_service_name: String,
    #[serde(default)]
    pub producer_service_instance_name: String,
    #[serde(default)]
    pub producer_service_base_url: String,
    #[serde(default)]
    pub producer_service_path_url: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    #[serde(default, rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub managing_organization_id: String,
    #[serde(default)]
    pub managing_organization: String,
    #[serde(default)]
    pub subscriber_product_name: String,
    #[serde(default)]
    pub subscriber_service_name: String,
    #[serde(default)]
    pub subscriber_service_instance_name: String,
    #[serde(default)]
    pub subscriber_service_base_url: String,
    #[serde(default)]
    pub subscriber_service_path_url: String,
    #[serde(default)]
    pub description: String,
}

pub struct NotificationApi<'a> {
    client: &'a ServiceClient,
    cancel: &'a CancellationToken,
}

impl<'a> NotificationApi<'a> {
    pub fn new(client: &'a ServiceClient, cancel: &'a CancellationToken) -> Self {
        Self { client, cancel }
    }

    async fn send(&self, request: ApiRequest) -> ProviderResult<ApiResponse> {
        self.client
            .call(self.cancel, request.api_version(API_VERSION))
            .await
    }

    pub async fn create_producer(&self, producer: &Producer) -> ProviderResult<Producer> {
        let body = serde_json::to_value(producer)
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        self.send(ApiRequest::post(PRODUCER).json(body))
            .await
            .context("createProducer")?
            .decode()
    }

    pub async fn get_producer(&self, id: &str) -> ProviderResult<Producer> {
        self.send(ApiRequest::get(item_path(PRODUCER, id)))
            .await?
            .decode()
    }

    pub async fn delete_producer(&self, id: &str) -> ProviderResult<()> {
        self.send(ApiRequest::delete(item_path(PRODUCER, id)))
            .await
            .context("deleteProducer")?;
        Ok(())
    }

    pub async fn get_subscriber(&self, id: &str) -> ProviderResult<Subscriber> {
        self.send(ApiRequest::get(item_path(SUBSCRIBER, id)))
            .await?
            .decode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn producer_id_uses_underscore_field() {
        let producer: Producer = serde_json::from_value(json!({
            "_id": "p-1",
            "managingOrganizationId": "org-1",
            "producerProductName": "product"
        }))
        .unwrap();
        assert_eq!(producer.id, "p-1");

        let body = serde_json::to_value(Producer {
            id: String::new(),
            ..producer
        })
        .unwrap();
        assert!(body.get("_id").is_none());
        assert_eq!(body["managingOrganizationId"], "org-1");
    }
}
