//! Append-only log of single events.
//!
//! Each event is stored under its generated id and tagged with two
//! indexes: `aggregate_id` for listing and `aggregate_event_id`
//! (`{aggregate_id}-{event_id}`) for ordered range scans. Because ids are
//! fixed-width and sortable, "events since X" is an open-ended scan from
//! `{aggregate_id}-{X}`.

use futures::future::join_all;
use lineage_db::{Bucket, IndexRange, Indexes, StoredDoc};
use lineage_types::records::{AGGREGATE_EVENT_ID_INDEX, AGGREGATE_ID_INDEX};
use lineage_types::{ActorId, EventId, EventRecord, composite_key};
use serde::Serialize;

use crate::error::EventError;
use crate::store::EventStore;

/// Index tags written with every event record.
fn event_indexes(aggregate_id: &ActorId, event_id: &EventId) -> Indexes {
    Indexes::from([
        (AGGREGATE_ID_INDEX.to_owned(), aggregate_id.to_string()),
        (
            AGGREGATE_EVENT_ID_INDEX.to_owned(),
            composite_key(aggregate_id, event_id),
        ),
    ])
}

impl<K: Bucket> EventStore<K> {
    /// Append `events` to the log of `aggregate_id`.
    ///
    /// Every event gets a fresh id, in the order given. All writes run
    /// concurrently; the returned ids are in input order.
    ///
    /// # Errors
    ///
    /// - [`EventError::Serialization`] if an event cannot be encoded. Nothing
    ///   is written in that case.
    /// - [`EventError::PartialWrite`] if any write fails. Records already
    ///   written stay in place.
    pub async fn store_events<T: Serialize>(
        &self,
        aggregate_id: &ActorId,
        events: &[T],
    ) -> Result<Vec<EventId>, EventError> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let mut records = Vec::with_capacity(events.len());
        for event in events {
            let record = EventRecord {
                id: self.ids.next_event_id(),
                aggregate_id: aggregate_id.clone(),
                event: serde_json::to_value(event)?,
            };
            let doc = serde_json::to_value(&record)?;
            records.push((record.id, doc));
        }

        let results = join_all(records.iter().map(|(id, doc)| {
            let indexes = event_indexes(aggregate_id, id);
            async move { self.events.put(id.as_str(), doc, &indexes, None).await }
        }))
        .await;

        let mut written = Vec::new();
        let mut failed = Vec::new();
        let mut messages = Vec::new();
        for ((id, _), result) in records.iter().zip(results) {
            match result {
                Ok(()) => written.push(id.to_string()),
                Err(e) => {
                    messages.push(format!("{id}: {e}"));
                    failed.push(id.to_string());
                }
            }
        }

        if !failed.is_empty() {
            tracing::warn!(
                %aggregate_id,
                written = written.len(),
                failed = failed.len(),
                "Event batch only partially written"
            );
            return Err(EventError::PartialWrite {
                aggregate_id: aggregate_id.clone(),
                written,
                failed,
                message: messages.join("; "),
            });
        }

        tracing::debug!(%aggregate_id, count = records.len(), "Stored events");
        Ok(records.into_iter().map(|(id, _)| id).collect())
    }

    /// Events of `aggregate_id` stored strictly after `last_event_id`,
    /// ascending by id.
    ///
    /// # Errors
    ///
    /// Returns the storage or decoding error.
    pub async fn get_events_for(
        &self,
        aggregate_id: &ActorId,
        last_event_id: &EventId,
    ) -> Result<Vec<EventRecord>, EventError> {
        let docs = self
            .events
            .get_by_index(
                AGGREGATE_EVENT_ID_INDEX,
                &composite_key(aggregate_id, last_event_id),
                IndexRange::From,
            )
            .await?;

        // The scan is lexicographic over composite keys, so it can run past
        // this aggregate into others sharing its prefix.
        let mut records: Vec<EventRecord> = decode_events(docs)?
            .into_iter()
            .filter(|r| r.aggregate_id == *aggregate_id && r.id > *last_event_id)
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    /// Every event of `aggregate_id`, ascending by id.
    ///
    /// # Errors
    ///
    /// Returns the storage or decoding error.
    pub async fn all_events_for(
        &self,
        aggregate_id: &ActorId,
    ) -> Result<Vec<EventRecord>, EventError> {
        let docs = self
            .events
            .get_by_index(AGGREGATE_ID_INDEX, aggregate_id.as_str(), IndexRange::Exact)
            .await?;
        let mut records = decode_events(docs)?;
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }
}

fn decode_events(docs: Vec<StoredDoc>) -> Result<Vec<EventRecord>, EventError> {
    docs.into_iter()
        .map(|d| serde_json::from_value(d.doc).map_err(EventError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_indexes_use_composite_key() {
        let indexes = event_indexes(&ActorId::from("b1"), &EventId::from("00000000000000000042"));
        assert_eq!(
            indexes.get(AGGREGATE_ID_INDEX).map(String::as_str),
            Some("b1")
        );
        assert_eq!(
            indexes.get(AGGREGATE_EVENT_ID_INDEX).map(String::as_str),
            Some("b1-00000000000000000042")
        );
    }
}
