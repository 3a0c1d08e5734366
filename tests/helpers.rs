use mailroom::amqp::{BrokerSettings, Channel, ConnectionFactory, ConnectionManager};
use std::sync::Arc;

pub fn get_broker_settings() -> BrokerSettings {
    BrokerSettings::default()
}

pub fn get_connection_factory() -> ConnectionFactory {
    ConnectionFactory::new_from_config(&get_broker_settings()).unwrap()
}

pub async fn get_connection_manager() -> Arc<ConnectionManager> {
    Arc::new(
        ConnectionManager::connect(&get_connection_factory())
            .await
            .expect("Failed to connect to RabbitMQ"),
    )
}

/// Declare an auto-delete queue so test queues do not pile up on the broker.
pub async fn declare_temporary_queue(channel: &Channel, queue_name: &str) {
    let options = lapin::options::QueueDeclareOptions {
        passive: false,
        durable: false,
        exclusive: false,
        auto_delete: true,
        nowait: false,
    };
    channel
        .raw()
        .queue_declare(queue_name, options, <_>::default())
        .await
        .expect("Could not declare queue");
}
