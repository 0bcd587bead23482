//! The durable broker consumer (§4.G). Wires [`message_handling::process_message`]
//! into `coverage_queue`'s at-most-ten-attempt retry envelope.

pub mod message_handling;

use std::sync::Arc;

use futures_lite::stream::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable, LongInt, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::repo::RepoCache;
use crate::store::Store;
use message_handling::{process_message, Outcome};

pub const EXCHANGE: &str = "coverage_exchange";
pub const QUEUE: &str = "coverage_queue";
pub const ROUTING_KEY: &str = "coverage.report";
pub const RETRY_HEADER: &str = "x-retry-count";
pub const MAX_RETRY_COUNT: i64 = 10;

pub async fn connect(amqp_url: &str) -> Result<Connection> {
    Ok(Connection::connect(amqp_url, ConnectionProperties::default()).await?)
}

pub async fn declare_topology(channel: &Channel) -> Result<()> {
    channel
        .exchange_declare(
            EXCHANGE,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    channel
        .queue_declare(
            QUEUE,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    channel
        .queue_bind(
            QUEUE,
            EXCHANGE,
            ROUTING_KEY,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;
    channel.basic_qos(1, BasicQosOptions::default()).await?;
    Ok(())
}

fn retry_count(headers: Option<&FieldTable>) -> i64 {
    let Some(headers) = headers else { return 0 };
    match headers.inner().get(RETRY_HEADER) {
        Some(AMQPValue::LongInt(n)) => *n as i64,
        Some(AMQPValue::LongLongInt(n)) => *n,
        Some(AMQPValue::ShortString(s)) => s.as_str().parse().unwrap_or(0),
        Some(AMQPValue::LongString(s)) => s.to_string().parse().unwrap_or(0),
        _ => 0,
    }
}

fn headers_with_retry(original: Option<&FieldTable>, new_count: i64) -> FieldTable {
    let mut headers = original.cloned().unwrap_or_default();
    headers.insert(
        ShortString::from(RETRY_HEADER),
        AMQPValue::LongInt(new_count as LongInt),
    );
    headers
}

/// Runs the consumer loop until the connection is closed or the process is
/// signaled to shut down. Each delivery is processed to completion before
/// the next is fetched (`prefetch = 1`): graceful shutdown drains the
/// in-flight message before returning.
pub async fn run(
    channel: Channel,
    store: Arc<dyn Store>,
    repo_cache: Arc<RepoCache>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> Result<()> {
    let mut consumer = channel
        .basic_consume(
            QUEUE,
            "deltacov-ingestion-worker",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    info!("waiting for coverage reports");

    loop {
        let delivery = tokio::select! {
            next = consumer.next() => next,
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("shutdown requested, stopping consumer");
                    break;
                }
                continue;
            }
        };

        let Some(delivery) = delivery else {
            break;
        };
        let delivery = delivery?;

        let retries = retry_count(delivery.properties.headers().as_ref());
        let outcome = process_message(store.as_ref(), repo_cache.as_ref(), &delivery.data).await;

        match outcome {
            Ok(Outcome::Completed) | Ok(Outcome::AdmissionMiss) => {
                delivery.ack(BasicAckOptions::default()).await?;
            }
            Ok(Outcome::NackNoRequeue) => {
                delivery
                    .nack(BasicNackOptions {
                        requeue: false,
                        ..Default::default()
                    })
                    .await?;
            }
            Err(e) => {
                error!(error = %e, retries, "processing failed");
                if retries >= MAX_RETRY_COUNT {
                    warn!(retries, "retry budget exhausted, dropping message");
                    delivery
                        .nack(BasicNackOptions {
                            requeue: false,
                            ..Default::default()
                        })
                        .await?;
                    continue;
                }

                let new_retries = retries + 1;
                let headers = headers_with_retry(delivery.properties.headers().as_ref(), new_retries);
                let mut properties = BasicProperties::default()
                    .with_headers(headers)
                    .with_content_type(
                        delivery
                            .properties
                            .content_type()
                            .clone()
                            .unwrap_or_else(|| "application/json".into()),
                    )
                    .with_delivery_mode(delivery.properties.delivery_mode().unwrap_or(2));
                if let Some(message_id) = delivery.properties.message_id().clone() {
                    properties = properties.with_message_id(message_id);
                }

                let republished = channel
                    .basic_publish(
                        EXCHANGE,
                        ROUTING_KEY,
                        BasicPublishOptions::default(),
                        &delivery.data,
                        properties,
                    )
                    .await;

                match republished {
                    Ok(_) => {
                        delivery.ack(BasicAckOptions::default()).await?;
                    }
                    Err(e) => {
                        error!(error = %e, "republish failed, dropping message");
                        delivery
                            .nack(BasicNackOptions {
                                requeue: false,
                                ..Default::default()
                            })
                            .await?;
                    }
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_count_defaults_to_zero_without_headers() {
        assert_eq!(retry_count(None), 0);
    }

    #[test]
    fn retry_count_reads_integer_header() {
        let mut headers = FieldTable::default();
        headers.insert(ShortString::from(RETRY_HEADER), AMQPValue::LongInt(3));
        assert_eq!(retry_count(Some(&headers)), 3);
    }

    #[test]
    fn retry_count_tolerates_string_encoded_header() {
        let mut headers = FieldTable::default();
        headers.insert(
            ShortString::from(RETRY_HEADER),
            AMQPValue::ShortString("7".into()),
        );
        assert_eq!(retry_count(Some(&headers)), 7);
    }

    #[test]
    fn headers_with_retry_increments_without_losing_other_headers() {
        let mut original = FieldTable::default();
        original.insert(ShortString::from("message_origin"), AMQPValue::ShortString("ci".into()));
        let updated = headers_with_retry(Some(&original), 4);
        assert_eq!(retry_count(Some(&updated)), 4);
        assert!(updated.inner().get("message_origin").is_some());
    }
}
