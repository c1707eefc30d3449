use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use stockroom_core::{AggregateId, ExpectedVersion};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};

/// In-memory append-only event store.
///
/// Intended for tests/dev. All streams sit behind one `RwLock`, which is what
/// makes `append_atomic` a true compare-and-swap across streams.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<AggregateId, Vec<StoredEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events across all streams.
    pub fn event_count(&self) -> usize {
        match self.streams.read() {
            Ok(streams) => streams.values().map(Vec::len).sum(),
            Err(poisoned) => poisoned.into_inner().values().map(Vec::len).sum(),
        }
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }
}

/// Every event in a batch must target the batch's stream and aggregate type.
fn validate_batch(append: &StreamAppend) -> Result<(), EventStoreError> {
    for (idx, e) in append.events.iter().enumerate() {
        if e.aggregate_id != append.aggregate_id {
            return Err(EventStoreError::InvalidAppend(format!(
                "batch for {} contains event for {} (index {idx})",
                append.aggregate_id, e.aggregate_id
            )));
        }
        if e.aggregate_type != append.aggregate_type {
            return Err(EventStoreError::AggregateTypeMismatch(format!(
                "batch for '{}' contains event of type '{}' (index {idx})",
                append.aggregate_type, e.aggregate_type
            )));
        }
    }
    Ok(())
}

fn check_stream(append: &StreamAppend, stream: Option<&Vec<StoredEvent>>) -> Result<(), EventStoreError> {
    let current = stream
        .map(|s| InMemoryEventStore::current_version(s))
        .unwrap_or(0);

    if !append.expected_version.matches(current) {
        return Err(EventStoreError::Concurrency(format!(
            "stream {}: expected {:?}, found {current}",
            append.aggregate_id, append.expected_version
        )));
    }

    // Aggregate type is fixed by the first event of a stream.
    if let Some(existing) = stream.and_then(|s| s.first()) {
        if existing.aggregate_type != append.aggregate_type {
            return Err(EventStoreError::AggregateTypeMismatch(format!(
                "stream aggregate_type is '{}', attempted append with '{}'",
                existing.aggregate_type, append.aggregate_type
            )));
        }
    }

    Ok(())
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let Some(first) = events.first() else {
            return Ok(vec![]);
        };

        let append = StreamAppend {
            aggregate_id: first.aggregate_id,
            aggregate_type: first.aggregate_type.clone(),
            expected_version,
            events,
        };
        self.append_atomic(vec![append])
    }

    fn append_atomic(&self, appends: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventStoreError> {
        let appends: Vec<StreamAppend> = appends.into_iter().filter(|a| !a.events.is_empty()).collect();
        if appends.is_empty() {
            return Ok(vec![]);
        }

        let mut seen = HashSet::new();
        for append in &appends {
            validate_batch(append)?;
            if !seen.insert(append.aggregate_id) {
                return Err(EventStoreError::InvalidAppend(format!(
                    "stream {} appears twice in one atomic append",
                    append.aggregate_id
                )));
            }
        }

        let mut streams = self
            .streams
            .write()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        // Check every stream before touching any of them.
        for append in &appends {
            check_stream(append, streams.get(&append.aggregate_id))?;
        }

        let mut committed = Vec::new();
        for append in appends {
            let stream = streams.entry(append.aggregate_id).or_default();
            let mut next = Self::current_version(stream) + 1;
            for e in append.events {
                let stored = StoredEvent {
                    event_id: e.event_id,
                    aggregate_id: e.aggregate_id,
                    aggregate_type: e.aggregate_type,
                    sequence_number: next,
                    event_type: e.event_type,
                    event_version: e.event_version,
                    occurred_at: e.occurred_at,
                    payload: e.payload,
                };
                next += 1;
                stream.push(stored.clone());
                committed.push(stored);
            }
        }

        Ok(committed)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        Ok(streams.get(&aggregate_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn event(aggregate_id: AggregateId, aggregate_type: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            event_type: "test.happened".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: json!({ "n": 1 }),
        }
    }

    fn batch(aggregate_id: AggregateId, expected: ExpectedVersion, n: usize) -> StreamAppend {
        StreamAppend {
            aggregate_id,
            aggregate_type: "test.thing".to_string(),
            expected_version: expected,
            events: (0..n).map(|_| event(aggregate_id, "test.thing")).collect(),
        }
    }

    #[test]
    fn append_assigns_gapless_sequence_numbers() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();

        store
            .append(vec![event(id, "test.thing"), event(id, "test.thing")], ExpectedVersion::Exact(0))
            .unwrap();
        let more = store
            .append(vec![event(id, "test.thing")], ExpectedVersion::Exact(2))
            .unwrap();

        assert_eq!(more[0].sequence_number, 3);
        let loaded = store.load_stream(id).unwrap();
        let seqs: Vec<u64> = loaded.iter().map(|e| e.sequence_number).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn stale_expected_version_is_a_concurrency_error() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store
            .append(vec![event(id, "test.thing")], ExpectedVersion::Exact(0))
            .unwrap();

        let err = store
            .append(vec![event(id, "test.thing")], ExpectedVersion::Exact(0))
            .unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));
    }

    #[test]
    fn atomic_append_is_all_or_nothing() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        let b = AggregateId::new();
        store.append_atomic(vec![batch(b, ExpectedVersion::Exact(0), 1)]).unwrap();

        // `b` is at version 1, so the second batch is stale and nothing lands.
        let err = store
            .append_atomic(vec![
                batch(a, ExpectedVersion::Exact(0), 2),
                batch(b, ExpectedVersion::Exact(0), 1),
            ])
            .unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));
        assert!(store.load_stream(a).unwrap().is_empty());
        assert_eq!(store.load_stream(b).unwrap().len(), 1);

        store
            .append_atomic(vec![
                batch(a, ExpectedVersion::Exact(0), 2),
                batch(b, ExpectedVersion::Exact(1), 1),
            ])
            .unwrap();
        assert_eq!(store.event_count(), 4);
    }

    #[test]
    fn same_stream_twice_in_one_append_is_rejected() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        let err = store
            .append_atomic(vec![
                batch(a, ExpectedVersion::Exact(0), 1),
                batch(a, ExpectedVersion::Exact(0), 1),
            ])
            .unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidAppend(_)));
    }

    #[test]
    fn aggregate_type_is_fixed_per_stream() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store
            .append(vec![event(id, "test.thing")], ExpectedVersion::Any)
            .unwrap();

        let err = store
            .append(vec![event(id, "test.other")], ExpectedVersion::Any)
            .unwrap_err();
        assert!(matches!(err, EventStoreError::AggregateTypeMismatch(_)));
    }
}
