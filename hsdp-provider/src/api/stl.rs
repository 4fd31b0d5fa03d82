//! Edge devices: application firewall exceptions

use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use hsdp_core::error::{ProviderResult, ResultExt};
use hsdp_core::ports::FirewallPorts;

use super::item_path;
use crate::client::{ApiRequest, ServiceClient};

const DEVICES: &str = "/devices";

#[derive(Debug, Clone, Default, Deserialize)]
struct FirewallExceptions {
    #[serde(default)]
    tcp: Vec<u16>,
    #[serde(default)]
    udp: Vec<u16>,
}

pub struct StlApi<'a> {
    client: &'a ServiceClient,
    cancel: &'a CancellationToken,
}

impl<'a> StlApi<'a> {
    pub fn new(client: &'a ServiceClient, cancel: &'a CancellationToken) -> Self {
        Self { client, cancel }
    }

    fn path(serial_number: &str) -> String {
        format!("{}/firewall-exceptions", item_path(DEVICES, serial_number))
    }

    pub async fn firewall_exceptions(&self, serial_number: &str) -> ProviderResult<FirewallPorts> {
        let exceptions: FirewallExceptions = self
            .client
            .call(self.cancel, ApiRequest::get(Self::path(serial_number)))
            .await
            .context("getAppFirewallExceptions")?
            .decode()?;
        Ok(FirewallPorts {
            tcp: exceptions.tcp,
            udp: exceptions.udp,
        })
    }

    pub async fn update_firewall_exceptions(
        &self,
        serial_number: &str,
        ports: &FirewallPorts,
    ) -> ProviderResult<FirewallPorts> {
        let response = self
            .client
            .call(
                self.cancel,
                ApiRequest::put(Self::path(serial_number))
                    .json(json!({ "tcp": ports.tcp, "udp": ports.udp })),
            )
            .await
            .context("updateAppFirewallExceptions")?;
        // Some devices answer with an empty body
        if response.body.is_null() {
            return Ok(ports.clone());
        }
        let exceptions: FirewallExceptions = response.decode()?;
        Ok(FirewallPorts {
            tcp: exceptions.tcp,
            udp: exceptions.udp,
        })
    }
}
