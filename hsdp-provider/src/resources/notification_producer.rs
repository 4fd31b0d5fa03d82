//! hsdp_notification_producer: a notification bus producer
//!
//! With `soft_delete`, a destroy answered with 403 counts as done: the
//! producer is out of the caller's reach either way.

use hsdp_core::client::ApiFamily;
use hsdp_core::diagnostics::Diagnostics;
use hsdp_core::error::ProviderResult;
use hsdp_core::resource::{Record, Value};
use hsdp_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

use super::{base_schema, connect, string_attr};
use crate::Ctx;
use crate::api::notification::{NotificationApi, Producer};

resource_handler!(NotificationProducer, "hsdp_notification_producer");

fn schema() -> ResourceSchema {
    base_schema("hsdp_notification_producer")
        .with_description("Notification producer")
        .attribute(string_attr("managing_organization_id").required().force_new())
        .attribute(string_attr("managing_organization").force_new())
        .attribute(string_attr("producer_product_name").required().force_new())
        .attribute(string_attr("producer_service_name").force_new())
        .attribute(string_attr("producer_service_instance_name").force_new())
        .attribute(string_attr("producer_service_base_url").force_new())
        .attribute(string_attr("producer_service_path_url").force_new())
        .attribute(string_attr("description").force_new())
        .attribute(
            AttributeSchema::new("soft_delete", AttributeType::Bool)
                .with_default(Value::Bool(false)),
        )
}

fn desired_producer(record: &Record) -> Producer {
    Producer {
        id: String::new(),
        managing_organization_id: record.get_string("managing_organization_id"),
        managing_organization: record.get_string("managing_organization"),
        producer_product_name: record.get_string("producer_product_name"),
        producer_service_name: record.get_string("producer_service_name"),
        producer_service_instance_name: record.get_string("producer_service_instance_name"),
        producer_service_base_url: record.get_string("producer_service_base_url"),
        producer_service_path_url: record.get_string("producer_service_path_url"),
        description: record.get_string("description"),
    }
}

fn write_producer(record: &mut Record, producer: Producer) {
    record.set_string("managing_organization_id", producer.managing_organization_id);
    record.set_string("managing_organization", producer.managing_organization);
    record.set_string("producer_product_name", producer.producer_product_name);
    record.set_string("producer_service_name", producer.producer_service_name);
    record.set_string(
        "producer_service_instance_name",
        producer.producer_service_instance_name,
    );
    record.set_string("producer_service_base_url", producer.producer_service_base_url);
    record.set_string("producer_service_path_url", producer.producer_service_path_url);
    record.set_string("description", producer.description);
}

async fn create(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let client = connect(ctx, record, ApiFamily::Notification, None).await?;
    let producer = NotificationApi::new(&client, ctx.cancel)
        .create_producer(&desired_producer(record))
        .await?;
    record.set_id(producer.id);
    Ok(Diagnostics::new())
}

async fn read(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let client = connect(ctx, record, ApiFamily::Notification, None).await?;
    let producer = NotificationApi::new(&client, ctx.cancel)
        .get_producer(record.id())
        .await?;
    write_producer(record, producer);
    Ok(Diagnostics::new())
}

async fn update(_ctx: Ctx<'_>, _record: &mut Record) -> ProviderResult<Diagnostics> {
    // Only `soft_delete` can change in place, and it is local
    Ok(Diagnostics::new())
}

async fn delete(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let client = connect(ctx, record, ApiFamily::Notification, None).await?;
    NotificationApi::new(&client, ctx.cancel)
        .delete_producer(record.id())
        .await?;
    Ok(Diagnostics::new())
}
