//! hsdp_notification_subscriber: look up a notification subscriber by id

use hsdp_core::client::ApiFamily;
use hsdp_core::diagnostics::Diagnostics;
use hsdp_core::error::ProviderResult;
use hsdp_core::resource::Record;
use hsdp_core::schema::ResourceSchema;

use super::{base_schema, connect, string_attr};
use crate::Ctx;
use crate::api::notification::NotificationApi;

data_source_handler!(NotificationSubscriber, "hsdp_notification_subscriber");

const OUTPUTS: [&str; 8] = [
    "managing_organization_id",
    "managing_organization",
    "subscriber_product_name",
    "subscriber_service_name",
    "subscriber_service_instance_name",
    "subscriber_service_base_url",
    "subscriber_service_path_url",
    "description",
];

fn schema() -> ResourceSchema {
    let mut schema = base_schema("hsdp_notification_subscriber")
        .with_description("Notification subscriber")
        .attribute(string_attr("subscriber_id").required());
    for output in OUTPUTS {
        schema = schema.attribute(string_attr(output).computed());
    }
    schema
}

async fn read(ctx: Ctx<'_>, record: &mut Record) -> ProviderResult<Diagnostics> {
    let id = record.get_string("subscriber_id");
    let client = connect(ctx, record, ApiFamily::Notification, None).await?;
    let subscriber = NotificationApi::new(&client, ctx.cancel)
        .get_subscriber(&id)
        .await?;

    record.set_id(subscriber.id);
    for (key, value) in OUTPUTS.into_iter().zip([
        subscriber.managing_organization_id,
        subscriber.managing_organization,
        subscriber.subscriber_product_name,
        subscriber.subscriber_service_name,
        subscriber.subscriber_service_instance_name,
        subscriber.subscriber_service_base_url,
        subscriber.subscriber_service_path_url,
        subscriber.description,
    ]) {
        record.set_string(key, value);
    }
    Ok(Diagnostics::new())
}
