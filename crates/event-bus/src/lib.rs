//! Event bus for the order-fulfillment workflow.
//!
//! Services never share memory; the bus is the only cross-service resource.
//! This crate provides:
//! - [`EventEnvelope`], the `{eventId, eventType, eventTime, ...payload}`
//!   wire shape every event travels in, and [`EventContract`] for typed
//!   event families decoded with an exhaustive match
//! - [`EventBus`], a topic-exchange abstraction with durable queues,
//!   at-least-once delivery and explicit ack / requeue / dead-letter
//! - [`AmqpEventBus`] implementing it on a RabbitMQ broker, and
//!   [`InMemoryEventBus`] implementing it in process for tests and
//!   single-process runs
//! - [`EventPublisher`], which fans one envelope out to several routing keys
//!   and retries broker failures with an explicit [`RetryPolicy`]
//! - [`ProcessedEvents`] for consumer-side deduplication by event id
//!
//! [`RetryPolicy`]: common::RetryPolicy

pub mod amqp;
pub mod bus;
pub mod dedup;
pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod publisher;
pub mod topology;

pub use amqp::AmqpEventBus;
pub use bus::{Delivery, DeliveryTag, EventBus, QueueStats, Settlement};
pub use dedup::{InMemoryProcessedEvents, ProcessedEvents};
pub use error::{DecodeError, EventBusError, Result};
pub use event::{EventContract, EventEnvelope, EventEnvelopeBuilder, EventId};
pub use memory::{DeadLetter, InMemoryEventBus};
pub use postgres::PostgresProcessedEvents;
pub use publisher::EventPublisher;
pub use topology::{QueueBinding, dead_letter_queue, routing_key_matches, standard_bindings};
