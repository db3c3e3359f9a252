//! Event packs: a batch of events stored as one record per actor version.

use std::cmp::Ordering;

use lineage_db::{Bucket, IndexRange, Indexes};
use lineage_types::records::{AGGREGATE_CLOCK_INDEX, AGGREGATE_ID_INDEX, AGGREGATE_PACK_ID_INDEX};
use lineage_types::{ActorId, Clock, EventPackId, EventPackRecord, composite_key};
use serde::Serialize;
use serde_json::{Number, Value};

use crate::error::EventError;
use crate::store::EventStore;

impl<K: Bucket> EventStore<K> {
    /// Store `events` as one pack for `aggregate_id` at `clock`.
    ///
    /// # Errors
    ///
    /// Returns the encoding or storage error.
    pub async fn store_event_pack<T: Serialize>(
        &self,
        aggregate_id: &ActorId,
        clock: &Clock,
        events: &[T],
    ) -> Result<EventPackId, EventError> {
        let record = EventPackRecord {
            id: self.ids.next_event_pack_id(),
            aggregate_id: aggregate_id.clone(),
            events: events
                .iter()
                .map(serde_json::to_value)
                .collect::<Result<_, _>>()?,
        };

        let indexes = Indexes::from([
            (AGGREGATE_ID_INDEX.to_owned(), aggregate_id.to_string()),
            (AGGREGATE_CLOCK_INDEX.to_owned(), composite_key(aggregate_id, clock)),
            (
                AGGREGATE_PACK_ID_INDEX.to_owned(),
                composite_key(aggregate_id, &record.id),
            ),
        ]);
        let doc = serde_json::to_value(&record)?;
        self.packs
            .put(record.id.as_str(), &doc, &indexes, None)
            .await?;

        tracing::debug!(
            %aggregate_id,
            pack_id = %record.id,
            %clock,
            events = record.events.len(),
            "Stored event pack"
        );
        Ok(record.id)
    }

    /// Events of the pack stored for `aggregate_id` at `clock`, ordered by
    /// each event's own `id` field.
    ///
    /// Events without an `id` keep their stored order ahead of those that
    /// have one.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::NotFound`] if no pack was stored at `clock`,
    /// or the storage or decoding error.
    pub async fn get_event_pack_for(
        &self,
        aggregate_id: &ActorId,
        clock: &Clock,
    ) -> Result<Vec<Value>, EventError> {
        let tag = composite_key(aggregate_id, clock);
        let mut docs = self
            .packs
            .get_by_index(AGGREGATE_CLOCK_INDEX, &tag, IndexRange::Exact)
            .await?
            .into_iter();

        let Some(first) = docs.next() else {
            return Err(EventError::NotFound(format!("event pack {tag}")));
        };
        let extra = docs.count();
        if extra > 0 {
            tracing::warn!(%aggregate_id, %clock, extra, "Several event packs for one clock");
        }

        let pack: EventPackRecord = serde_json::from_value(first.doc)?;
        let mut events = pack.events;
        events.sort_by(by_event_id);
        Ok(events)
    }

    /// Every pack stored for `aggregate_id`, ordered by pack id.
    ///
    /// # Errors
    ///
    /// Returns the storage or decoding error.
    pub async fn event_packs(
        &self,
        aggregate_id: &ActorId,
    ) -> Result<Vec<EventPackRecord>, EventError> {
        let docs = self
            .packs
            .get_by_index(AGGREGATE_ID_INDEX, aggregate_id.as_str(), IndexRange::Exact)
            .await?;
        let mut packs = docs
            .into_iter()
            .map(|d| serde_json::from_value::<EventPackRecord>(d.doc))
            .collect::<Result<Vec<_>, _>>()?;
        packs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(packs)
    }
}

/// Total order on event payloads by their `id` field:
/// missing < number < string < anything else.
fn by_event_id(a: &Value, b: &Value) -> Ordering {
    fn rank(id: Option<&Value>) -> u8 {
        match id {
            None | Some(Value::Null) => 0,
            Some(Value::Number(_)) => 1,
            Some(Value::String(_)) => 2,
            Some(_) => 3,
        }
    }

    let (x, y) = (a.get("id"), b.get("id"));
    match (x, y) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => compare_numbers(x, y),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(x).cmp(&rank(y)),
    }
}

/// Integers compare exactly; floats fall back to `f64` ordering.
fn compare_numbers(x: &Number, y: &Number) -> Ordering {
    if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
        return x.cmp(&y);
    }
    if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
        return x.cmp(&y);
    }
    match (x.as_u64(), y.as_u64()) {
        // A negative integer against one above i64::MAX.
        (None, Some(_)) if x.is_i64() => Ordering::Less,
        (Some(_), None) if y.is_i64() => Ordering::Greater,
        _ => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.total_cmp(&y)
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn numbers_sort_numerically() {
        let mut events = vec![json!({ "id": 10 }), json!({ "id": 9 }), json!({ "id": 2.5 })];
        events.sort_by(by_event_id);
        assert_eq!(
            events,
            vec![json!({ "id": 2.5 }), json!({ "id": 9 }), json!({ "id": 10 })]
        );
    }

    #[test]
    fn large_integer_ids_keep_precision() {
        let mut events = vec![
            json!({ "id": 9_007_199_254_740_993_u64 }),
            json!({ "id": u64::MAX }),
            json!({ "id": 9_007_199_254_740_992_u64 }),
            json!({ "id": -1 }),
        ];
        events.sort_by(by_event_id);
        assert_eq!(
            events,
            vec![
                json!({ "id": -1 }),
                json!({ "id": 9_007_199_254_740_992_u64 }),
                json!({ "id": 9_007_199_254_740_993_u64 }),
                json!({ "id": u64::MAX }),
            ]
        );
        assert_eq!(
            by_event_id(
                &json!({ "id": 9_007_199_254_740_993_u64 }),
                &json!({ "id": 9_007_199_254_740_992_u64 })
            ),
            Ordering::Greater
        );
    }

    #[test]
    fn missing_ids_first_and_stable() {
        let mut events = vec![
            json!({ "id": "b" }),
            json!({ "name": "first" }),
            json!({ "id": 1 }),
            json!({ "name": "second" }),
            json!({ "id": "a" }),
        ];
        events.sort_by(by_event_id);
        assert_eq!(
            events,
            vec![
                json!({ "name": "first" }),
                json!({ "name": "second" }),
                json!({ "id": 1 }),
                json!({ "id": "a" }),
                json!({ "id": "b" }),
            ]
        );
    }
}
