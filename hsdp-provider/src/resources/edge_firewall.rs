//! hsdp_edge_app_firewall_exceptions: application firewall exceptions of an
//! edge device
//!
//! Each port family is either managed explicitly (`tcp`, `udp`) or merged
//! into whatever the device already has (`ensure_tcp`, `ensure_udp`).

use log::debug;

use hsdp_core::client::ApiFamily;
use hsdp_core::diagnostics::Diagnostics;
use hsdp_core::error::ProviderResult;
use hsdp_core::ports::{FirewallPorts, PortPlan, prune_ports};
use hsdp_core::resource::{Record, Value};
use hsdp_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::{base_schema, connect, string_attr};
use crate::Ctx;
use crate::api::stl::StlApi;

resource_handler!(EdgeAppFirewallExceptions, "hsdp_edge_app_firewall_exceptions");

fn schema() -> ResourceSchema {
    base_schema("hsdp_edge_app_firewall_exceptions")
        .with_description("Application firewall exceptions of an edge device")
        .attribute(string_attr("serial_number").required().force_new())
        .attribute(AttributeSchema::new("tcp", types::port_set()).conflicts_with(&["ensure_tcp"]))
        .attribute(AttributeSchema::new("udp", types::port_set()).conflicts_with(&["ensure_udp"]))
        .attribute(AttributeSchema::new("ensure_tcp", types::port_set()).conflicts_with(&["tcp"]))
        .attribute(AttributeSchema::new("ensure_udp", types::port_set()).conflicts_with(&["udp"]))
        .attribute(
            AttributeSchema::new("clear_on_destroy", AttributeType::Bool)
                .with_default(Value::Bool(false)),
        )
}

fn port_values(ports: &[u16]) -> Value {
    Value::Set(ports.iter().map(|p| Value::Int(i64::from(*p))).collect())
}

fn ports_in(value: Option<&Value>) -> Vec<u16> {
    value
        .map(Value::items)
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_int)
        .filter_map(|n| u16::try_from(n).ok())
        .collect()
}

/// Ensured ports the prior state had and the current attributes no longer do
fn dropped_ensured(record: &Record, key: &str) -> Vec<u16> {
    let now = ports_in(record.get(key));
    ports_in(record.prior().get(key))
        .into_iter()
        .filter(|p| !now.contains(p))
        .collect()
}

async fn apply(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<()> {
    let plan = PortPlan::from_record(record)?;
    let serial_number = record.get_string("serial_number");
    let client = connect(ctx, record, ApiFamily::Stl, None).await?;
    let stl = StlApi::new(&client, ctx.cancel);

    let remote = stl.firewall_exceptions(&serial_number).await?;
    let current = FirewallPorts {
        tcp: prune_ports(&remote.tcp, &dropped_ensured(record, "ensure_tcp")),
        udp: prune_ports(&remote.udp, &dropped_ensured(record, "ensure_udp")),
    };
    let desired = plan.desired_on_apply(&current);
    if desired != remote {
        debug!(
            "updating firewall exceptions of {}: tcp {:?} udp {:?}",
            serial_number, desired.tcp, desired.udp
        );
        stl.update_firewall_exceptions(&serial_number, &desired)
            .await?;
    }
    record.set_id(serial_number);
    Ok(())
}

async fn create(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    apply(ctx, record).await?;
    Ok(Diagnostics::new())
}

async fn read(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let serial_number = record.id().to_string();
    let client = connect(ctx, record, ApiFamily::Stl, None).await?;
    let remote = StlApi::new(&client, ctx.cancel)
        .firewall_exceptions(&serial_number)
        .await?;
    record.set_string("serial_number", serial_number);

    // Explicit lists mirror the device; ensured lists keep what is still there
    for (explicit, ensure, ports) in [
        ("tcp", "ensure_tcp", &remote.tcp),
        ("udp", "ensure_udp", &remote.udp),
    ] {
        let ensured = ports_in(record.get(ensure));
        if ensured.is_empty() {
            if record.get(explicit).is_some() {
                record.set(explicit, port_values(ports));
            }
        } else {
            let kept: Vec<u16> = ensured.into_iter().filter(|p| ports.contains(p)).collect();
            record.set(ensure, port_values(&kept));
        }
    }
    Ok(Diagnostics::new())
}

async fn update(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    apply(ctx, record).await?;
    Ok(Diagnostics::new())
}

async fn delete(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let plan = PortPlan::from_record(record)?;
    let serial_number = record.id().to_string();
    let client = connect(ctx, record, ApiFamily::Stl, None).await?;
    let stl = StlApi::new(&client, ctx.cancel);

    let current = stl.firewall_exceptions(&serial_number).await?;
    if let Some(desired) = plan.desired_on_destroy(&current) {
        stl.update_firewall_exceptions(&serial_number, &desired)
            .await?;
    }
    Ok(Diagnostics::new())
}
