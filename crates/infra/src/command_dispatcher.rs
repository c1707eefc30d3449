//! Command execution pipeline (application-level orchestration).
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store
//!   ↓
//! 2. Rehydrate aggregate (apply historical events to rebuild state)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Persist events (append-only, optimistic concurrency check)
//!   ↓
//! 5. Publish events to bus
//! ```
//!
//! `dispatch` runs the pipeline for one aggregate. Workflows that must change
//! several aggregates together (an order and the products it moves stock
//! for) use `begin` / [`Transaction::stage`] / `commit`: each staged command
//! is decided against the state loaded for it, and the commit checks every
//! stream's version in a single atomic append.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use rust_decimal::Decimal;
use stockroom_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use stockroom_events::{EventBus, EventEnvelope};
use stockroom_invoicing::InvoiceError;

use crate::event_store::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};

/// Application-level failure of a command or workflow action.
///
/// Domain errors map 1:1 onto variants here so callers can match on the
/// business outcome without unwrapping layers.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Another writer appended to a stream since it was loaded.
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    /// The command clashes with state already recorded. Retrying cannot help.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("not found")]
    NotFound,

    #[error("insufficient stock for {product}: available {available}, requested {requested}")]
    InsufficientStock {
        product: String,
        available: Decimal,
        requested: Decimal,
    },

    #[error("cannot {action} when state is {from}")]
    InvalidTransition { from: String, action: String },

    #[error("constraint violated: {0}")]
    ConstraintViolation(String),

    /// The invoicing collaborator failed; whatever was committed before stays.
    #[error(transparent)]
    Invoice(#[from] InvoiceError),

    /// Failed to deserialize historical event payloads into the aggregate event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Store(EventStoreError),

    /// Publication failed after a successful append (at-least-once; retry may duplicate).
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Conflict(msg),
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
            DomainError::InsufficientStock {
                product,
                available,
                requested,
            } => DispatchError::InsufficientStock {
                product,
                available,
                requested,
            },
            DomainError::InvalidTransition { from, action } => {
                DispatchError::InvalidTransition { from, action }
            }
            DomainError::ConstraintViolation(msg) => DispatchError::ConstraintViolation(msg),
        }
    }
}

/// An aggregate rehydrated from its stream, plus the stream version it was read at.
#[derive(Debug, Clone)]
pub struct Loaded<A> {
    aggregate_id: AggregateId,
    version: u64,
    aggregate: A,
}

impl<A> Loaded<A> {
    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    /// Stream version at load time; staged commands expect exactly this.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Current state, including events staged but not yet committed.
    pub fn aggregate(&self) -> &A {
        &self.aggregate
    }

    pub fn into_inner(self) -> A {
        self.aggregate
    }
}

/// Commands decided but not yet committed. Created by [`CommandDispatcher::begin`].
#[derive(Debug, Default)]
pub struct Transaction {
    appends: Vec<StreamAppend>,
}

impl Transaction {
    pub fn is_empty(&self) -> bool {
        self.appends.iter().all(|a| a.events.is_empty())
    }

    /// Decide `command` against `loaded`, apply the resulting events to it and
    /// queue them for commit.
    ///
    /// Staging twice against the same `Loaded` sees the earlier events; both
    /// batches land in one stream append expecting the originally loaded version.
    pub fn stage<A>(
        &mut self,
        loaded: &mut Loaded<A>,
        aggregate_type: &str,
        command: &A::Command,
    ) -> Result<Vec<A::Event>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: stockroom_events::Event + Serialize,
    {
        let decided = loaded.aggregate.handle(command)?;
        if decided.is_empty() {
            return Ok(decided);
        }

        let uncommitted = decided
            .iter()
            .map(|ev| UncommittedEvent::from_typed(loaded.aggregate_id, aggregate_type, Uuid::now_v7(), ev))
            .collect::<Result<Vec<_>, _>>()?;

        for ev in &decided {
            loaded.aggregate.apply(ev);
        }

        match self
            .appends
            .iter_mut()
            .find(|a| a.aggregate_id == loaded.aggregate_id)
        {
            Some(existing) => existing.events.extend(uncommitted),
            None => self.appends.push(StreamAppend {
                aggregate_id: loaded.aggregate_id,
                aggregate_type: aggregate_type.to_string(),
                expected_version: ExpectedVersion::Exact(loaded.version),
                events: uncommitted,
            }),
        }

        Ok(decided)
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Events are persisted before publication: if the append fails nothing is
/// published. If publication fails after a successful append the error is
/// returned but the events stay committed (at-least-once delivery).
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn begin(&self) -> Transaction {
        Transaction::default()
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Load and rehydrate an aggregate. A stream that does not exist yields the
    /// fresh instance built by `make_aggregate` at version 0.
    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Loaded<A>, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        Ok(Loaded {
            aggregate_id,
            version: stream_version(&history),
            aggregate,
        })
    }

    /// Append every staged stream atomically, then publish the committed events.
    pub fn commit(&self, tx: Transaction) -> Result<Vec<StoredEvent>, DispatchError> {
        if tx.is_empty() {
            return Ok(vec![]);
        }

        let streams = tx.appends.len();
        let committed = self.store.append_atomic(tx.appends)?;
        tracing::debug!(streams, events = committed.len(), "transaction committed");

        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }

    /// Dispatch a single command through the full pipeline.
    ///
    /// On `DispatchError::Concurrency` the caller may reload and retry.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: stockroom_events::Event + Serialize + DeserializeOwned,
    {
        let mut loaded = self.load(aggregate_id, make_aggregate)?;
        let mut tx = self.begin();
        tx.stage(&mut loaded, aggregate_type, &command)?;
        self.commit(tx)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(aggregate_id: AggregateId, stream: &[StoredEvent]) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            ))));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}
