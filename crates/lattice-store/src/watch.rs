//! The watch engine: a polling change feed over the transaction space.
//!
//! Each subscription runs as one cooperative task. The loop reads the head
//! revision, fetches every row whose creation or deletion transaction falls
//! in the newly observed interval, groups the events by revision with the
//! collapsing rule (a TOUCH supersedes a DELETE of the same tuple at the
//! same revision), and emits `RevisionChanges` in strictly ascending order.
//!
//! Emission never blocks: the output channel is bounded and a full buffer
//! terminates the subscription with `WatchDisconnected`. The consumer is
//! expected to re-subscribe from its last received revision.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use lattice_config::WatchConfig;
use lattice_types::{
    RelationTuple, Revision, RevisionChanges, StoreError, TupleUpdate, UpdateOperation,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{Result, TupleDatastore};

/// Default capacity of the per-subscription emission channel.
pub const DEFAULT_WATCH_BUFFER_LENGTH: usize = 128;

/// Default delay between empty polls.
pub const DEFAULT_WATCH_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Factory for watch subscriptions over a datastore.
pub struct WatchEngine {
    store: Arc<dyn TupleDatastore>,
    buffer_length: usize,
    poll_interval: Duration,
}

/// The receiving side of one subscription.
///
/// Both channels are closed exactly once, when the subscription task
/// terminates. A terminal error, if any, is delivered on `errors`.
pub struct WatchSubscription {
    pub updates: mpsc::Receiver<RevisionChanges>,
    pub errors: mpsc::Receiver<StoreError>,
}

impl WatchEngine {
    pub fn new(store: Arc<dyn TupleDatastore>, buffer_length: usize, poll_interval: Duration) -> Self {
        Self {
            store,
            buffer_length: buffer_length.max(1),
            poll_interval,
        }
    }

    pub fn from_config(store: Arc<dyn TupleDatastore>, config: &WatchConfig) -> Self {
        Self::new(store, config.buffer_length, config.poll_interval())
    }

    /// Engine with the default buffer length and poll interval.
    pub fn with_defaults(store: Arc<dyn TupleDatastore>) -> Self {
        Self::new(store, DEFAULT_WATCH_BUFFER_LENGTH, DEFAULT_WATCH_POLL_INTERVAL)
    }

    /// Start a subscription emitting every revision after `after_revision`.
    ///
    /// The subscription runs until cancelled, disconnected by backpressure,
    /// or failed by the underlying store; it never retries internally.
    pub fn watch(&self, after_revision: Revision, cancel: CancellationToken) -> WatchSubscription {
        let (updates_tx, updates_rx) = mpsc::channel(self.buffer_length);
        let (errors_tx, errors_rx) = mpsc::channel(1);

        let store = Arc::clone(&self.store);
        let poll_interval = self.poll_interval;
        tokio::spawn(run_subscription(
            store,
            after_revision,
            poll_interval,
            updates_tx,
            errors_tx,
            cancel,
        ));

        WatchSubscription {
            updates: updates_rx,
            errors: errors_rx,
        }
    }
}

impl WatchSubscription {
    /// Adapt the channel pair into a single fallible stream. The terminal
    /// error, if any, is yielded after the last change set.
    pub fn into_stream(self) -> impl Stream<Item = Result<RevisionChanges>> {
        let WatchSubscription {
            mut updates,
            mut errors,
        } = self;
        async_stream::stream! {
            while let Some(changes) = updates.recv().await {
                yield Ok(changes);
            }
            if let Some(err) = errors.recv().await {
                yield Err(err);
            }
        }
    }
}

async fn run_subscription(
    store: Arc<dyn TupleDatastore>,
    mut current: Revision,
    poll_interval: Duration,
    updates: mpsc::Sender<RevisionChanges>,
    errors: mpsc::Sender<StoreError>,
    cancel: CancellationToken,
) {
    loop {
        let loaded = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = errors.try_send(StoreError::WatchCanceled);
                return;
            }
            loaded = load_changes(store.as_ref(), current) => loaded,
        };

        let (staged, new_current) = match loaded {
            Ok(loaded) => loaded,
            Err(err) => {
                tracing::debug!(after = %current, error = %err, "watch subscription failed");
                let _ = errors.try_send(err);
                return;
            }
        };

        let had_changes = !staged.is_empty();
        for changes in staged {
            if updates.try_send(changes).is_err() {
                tracing::debug!(after = %current, "watch subscription disconnected: buffer full");
                let _ = errors.try_send(StoreError::WatchDisconnected);
                return;
            }
        }

        if !had_changes {
            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                _ = cancel.cancelled() => {
                    let _ = errors.try_send(StoreError::WatchCanceled);
                    return;
                }
            }
        }

        current = new_current;
    }
}

/// Per-revision staging area, keyed by the canonical tuple string.
#[derive(Default)]
struct ChangeRecord {
    touches: HashMap<String, RelationTuple>,
    deletes: HashMap<String, RelationTuple>,
}

impl ChangeRecord {
    fn into_updates(self) -> Vec<TupleUpdate> {
        self.touches
            .into_values()
            .map(TupleUpdate::touch)
            .chain(self.deletes.into_values().map(TupleUpdate::delete))
            .collect()
    }
}

fn add_change(
    staged: &mut BTreeMap<u64, ChangeRecord>,
    revision: Revision,
    tuple: RelationTuple,
    operation: UpdateOperation,
) {
    let record = staged.entry(revision.value()).or_default();
    let key = tuple.to_string();

    match operation {
        UpdateOperation::Delete => {
            // A delete is kept only if no touch landed at this revision.
            if !record.touches.contains_key(&key) {
                record.deletes.insert(key, tuple);
            }
        }
        // CREATE and TOUCH are indistinguishable in the feed.
        _ => {
            record.deletes.remove(&key);
            record.touches.insert(key, tuple);
        }
    }
}

/// Fetch and collapse everything that happened in `(after, head]`.
///
/// Returns the staged change sets in ascending revision order together with
/// the new cursor position.
async fn load_changes(
    store: &dyn TupleDatastore,
    after: Revision,
) -> Result<(Vec<RevisionChanges>, Revision)> {
    let head = store.head_revision().await?;
    if head <= after {
        return Ok((Vec::new(), after));
    }

    let rows = store.changed_tuples(after, head).await?;

    let mut staged: BTreeMap<u64, ChangeRecord> = BTreeMap::new();
    for row in rows {
        if row.created > after && row.created <= head {
            add_change(&mut staged, row.created, row.tuple.clone(), UpdateOperation::Touch);
        }
        if let Some(deleted) = row.deleted {
            if deleted > after && deleted <= head {
                add_change(&mut staged, deleted, row.tuple, UpdateOperation::Delete);
            }
        }
    }

    let changes = staged
        .into_iter()
        .map(|(revision, record)| RevisionChanges {
            revision: Revision(revision),
            changes: record.into_updates(),
        })
        .collect();

    Ok((changes, head))
}
