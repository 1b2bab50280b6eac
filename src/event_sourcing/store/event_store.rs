use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::event_sourcing::core::{Aggregate, DomainEvent, EventEnvelope};

// ============================================================================
// Generic Event Store - Append-only Event Log
// ============================================================================
//
// Responsibilities:
// 1. Append events per aggregate (append-only)
// 2. Load event history for an aggregate in sequence order
// 3. Optimistic concurrency on the expected version
// 4. Publish every appended envelope to subscribers (outbox)
//
// All operations are synchronous: an append never spans an await point, so a
// caller dropped mid-operation cannot leave a half-written stream.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EventStoreError {
    #[error("Cannot append empty event list")]
    EmptyAppend,

    #[error("Concurrency conflict on {aggregate_id}: expected version {expected}, but current is {actual}")]
    ConcurrencyConflict {
        aggregate_id: Uuid,
        expected: u64,
        actual: u64,
    },

    #[error("Event store lock poisoned")]
    Poisoned,
}

pub struct EventStore<E: DomainEvent> {
    streams: RwLock<HashMap<Uuid, Vec<EventEnvelope<E>>>>,
    aggregate_type_name: String,
    publisher: broadcast::Sender<EventEnvelope<E>>,
}

impl<E: DomainEvent> EventStore<E> {
    pub fn new(aggregate_type_name: &str, channel_capacity: usize) -> Self {
        let (publisher, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            streams: RwLock::new(HashMap::new()),
            aggregate_type_name: aggregate_type_name.to_string(),
            publisher,
        }
    }

    pub fn aggregate_type_name(&self) -> &str {
        &self.aggregate_type_name
    }

    /// Append events to the event store
    /// Returns the new version number after appending
    pub fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: u64,
        events: Vec<EventEnvelope<E>>,
    ) -> Result<u64, EventStoreError> {
        if events.is_empty() {
            return Err(EventStoreError::EmptyAppend);
        }

        let mut streams = self.streams.write().map_err(|_| EventStoreError::Poisoned)?;
        let stream = streams.entry(aggregate_id).or_default();

        let current_version = stream.len() as u64;
        if current_version != expected_version {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual: current_version,
            });
        }

        let mut new_version = expected_version;
        let event_count = events.len();

        for mut envelope in events {
            new_version += 1;
            // The store owns sequence numbering
            envelope.sequence_number = new_version;
            envelope.aggregate_id = aggregate_id;

            // No subscribers is not an error
            let _ = self.publisher.send(envelope.clone());
            stream.push(envelope);
        }

        tracing::debug!(
            aggregate_id = %aggregate_id,
            aggregate_type = %self.aggregate_type_name,
            new_version = new_version,
            event_count = event_count,
            "Appended events to event store"
        );

        Ok(new_version)
    }

    /// Load all events for an aggregate
    pub fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<EventEnvelope<E>>, EventStoreError> {
        let streams = self.streams.read().map_err(|_| EventStoreError::Poisoned)?;
        Ok(streams.get(&aggregate_id).cloned().unwrap_or_default())
    }

    /// Get current version of aggregate (0 for unknown aggregates)
    pub fn get_current_version(&self, aggregate_id: Uuid) -> Result<u64, EventStoreError> {
        let streams = self.streams.read().map_err(|_| EventStoreError::Poisoned)?;
        Ok(streams.get(&aggregate_id).map_or(0, |s| s.len() as u64))
    }

    /// Check if aggregate exists
    pub fn aggregate_exists(&self, aggregate_id: Uuid) -> Result<bool, EventStoreError> {
        Ok(self.get_current_version(aggregate_id)? > 0)
    }

    /// Rebuild an aggregate by replaying its stream
    pub fn load_aggregate<A>(&self, aggregate_id: Uuid) -> anyhow::Result<A>
    where
        A: Aggregate<Event = E>,
        <A as Aggregate>::Error: std::fmt::Display,
    {
        let events = self.load_events(aggregate_id)?;
        if events.is_empty() {
            anyhow::bail!("Aggregate not found: {}", aggregate_id);
        }
        A::load_from_events(events)
    }

    /// Receive every envelope appended from now on
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope<E>> {
        self.publisher.subscribe()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
