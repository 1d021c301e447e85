//! Queue registry: resource id → admission queue.
//!
//! Each queue sits behind its own mutex, which is the single mutation point
//! for that resource. Different resources never contend with each other.
//! Queues are created on first join and detached again as soon as a
//! mutation leaves them empty.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, error};

use viewgate_core::error::AppError;
use viewgate_core::types::{ParticipantId, ResourceId};

use super::admission::{AdmissionQueue, JoinOutcome, Mutation, MutationSink};
use super::participant::{RemovalReason, ViewerEntry};
use super::status::{QueueStatus, QueueSummary, StatusBoard};

type SharedQueue = Arc<Mutex<AdmissionQueue>>;

/// Registry of all live admission queues.
pub struct QueueRegistry {
    /// Resource id → queue.
    queues: DashMap<ResourceId, SharedQueue>,
    /// Published summaries for lock-free reads.
    board: StatusBoard,
    /// Occupant slots for newly created queues.
    capacity: usize,
    /// Receives every mutation while its queue is still locked.
    sink: Arc<dyn MutationSink>,
}

impl std::fmt::Debug for QueueRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueRegistry")
            .field("queues", &self.queues.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl QueueRegistry {
    /// Creates an empty registry.
    pub fn new(capacity: usize, sink: Arc<dyn MutationSink>) -> Self {
        Self {
            queues: DashMap::new(),
            board: StatusBoard::new(),
            capacity: capacity.max(1),
            sink,
        }
    }

    /// Join the queue for `resource_id`, creating it if needed.
    pub async fn join(
        &self,
        resource_id: &ResourceId,
        participant_id: ParticipantId,
        now: DateTime<Utc>,
    ) -> Result<JoinOutcome, AppError> {
        loop {
            let queue = self.get_or_create(resource_id);
            let mut guard = queue.lock().await;
            if guard.is_retired() {
                // Detached between lookup and lock; the map already holds a fresh slot.
                continue;
            }

            let joining = participant_id.clone();
            let mutation = guarded(resource_id, "join", || guard.join(joining, now))?;
            let outcome = mutation
                .joined
                .as_ref()
                .map(|(_, outcome)| *outcome)
                .ok_or_else(|| AppError::internal("join produced no outcome"))?;

            self.commit(&queue, &mut guard, &mutation);
            return Ok(outcome);
        }
    }

    /// Remove a participant voluntarily or on disconnect.
    pub async fn leave(
        &self,
        resource_id: &ResourceId,
        participant_id: &ParticipantId,
        reason: RemovalReason,
    ) -> Result<Mutation, AppError> {
        self.apply(resource_id, "leave", |q| q.leave(participant_id, reason))
            .await
    }

    /// Remove a participant, but only if `still_owned` holds once the queue
    /// turn has begun.
    ///
    /// A closing session passes its ownership check here so that a
    /// reconnect cannot land between the check and the removal. Returns
    /// `None` when `still_owned` said no.
    pub async fn leave_if<P>(
        &self,
        resource_id: &ResourceId,
        participant_id: &ParticipantId,
        reason: RemovalReason,
        still_owned: P,
    ) -> Result<Option<Mutation>, AppError>
    where
        P: FnOnce() -> bool,
    {
        let Some(queue) = self.get(resource_id) else {
            return Ok(still_owned().then(Mutation::default));
        };
        let mut guard = queue.lock().await;
        if !still_owned() {
            return Ok(None);
        }
        if guard.is_retired() {
            return Ok(Some(Mutation::default()));
        }
        let mutation = guarded(resource_id, "leave", || guard.leave(participant_id, reason))?;
        self.commit(&queue, &mut guard, &mutation);
        Ok(Some(mutation))
    }

    /// Remove a participant on liveness timeout.
    pub async fn evict(
        &self,
        resource_id: &ResourceId,
        participant_id: &ParticipantId,
    ) -> Result<Mutation, AppError> {
        self.apply(resource_id, "evict", |q| q.evict(participant_id))
            .await
    }

    /// Refresh a participant's heartbeat. Returns whether it is queued.
    pub async fn heartbeat(
        &self,
        resource_id: &ResourceId,
        participant_id: &ParticipantId,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let Some(queue) = self.get(resource_id) else {
            return Ok(false);
        };
        let mut guard = queue.lock().await;
        if guard.is_retired() {
            return Ok(false);
        }
        guarded(resource_id, "heartbeat", || guard.heartbeat(participant_id, now))
    }

    /// Current listing of a resource; empty if no queue exists.
    pub async fn queue_list(&self, resource_id: &ResourceId) -> Vec<ViewerEntry> {
        let Some(queue) = self.get(resource_id) else {
            return Vec::new();
        };
        let guard = queue.lock().await;
        guard.viewers()
    }

    /// Evict stale participants from every queue, one queue at a time.
    ///
    /// A failure inside one queue is logged and skipped; the sweep carries on
    /// with the remaining resources.
    pub async fn sweep(&self, now: DateTime<Utc>, timeout: Duration) -> Vec<(ResourceId, Mutation)> {
        let mut changed = Vec::new();

        for (resource_id, queue) in self.snapshot() {
            let mut guard = queue.lock().await;
            if guard.is_retired() {
                continue;
            }
            match guarded(&resource_id, "sweep", || guard.evict_stale(now, timeout)) {
                Ok(mutation) => {
                    self.commit(&queue, &mut guard, &mutation);
                    if !mutation.is_noop() {
                        changed.push((resource_id, mutation));
                    }
                }
                Err(_) => continue,
            }
        }

        changed
    }

    /// Detach queues left empty without a mutation noticing. Busy queues are skipped.
    pub fn collect_garbage(&self) -> usize {
        let mut collected = 0;
        for (resource_id, queue) in self.snapshot() {
            let Ok(mut guard) = queue.try_lock() else {
                continue;
            };
            if !guard.is_retired() && guard.is_empty() {
                self.retire(&resource_id, &queue, &mut guard);
                collected += 1;
            }
        }
        if collected > 0 {
            debug!(collected, "Collected empty queues");
        }
        collected
    }

    /// Last published status for a resource. Takes no queue lock.
    pub fn status(&self, resource_id: &ResourceId) -> QueueStatus {
        self.board.get(resource_id)
    }

    /// Summaries of every live queue. Takes no queue lock.
    pub fn all_statuses(&self) -> Vec<QueueSummary> {
        self.board.summaries()
    }

    /// Number of live queues.
    pub fn len(&self) -> usize {
        self.queues.len()
    }

    /// Whether no queue exists.
    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    fn get(&self, resource_id: &ResourceId) -> Option<SharedQueue> {
        self.queues
            .get(resource_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    fn get_or_create(&self, resource_id: &ResourceId) -> SharedQueue {
        let entry = self.queues.entry(resource_id.clone()).or_insert_with(|| {
            debug!(resource_id = %resource_id, "Creating admission queue");
            Arc::new(Mutex::new(AdmissionQueue::new(
                resource_id.clone(),
                self.capacity,
            )))
        });
        Arc::clone(entry.value())
    }

    fn snapshot(&self) -> Vec<(ResourceId, SharedQueue)> {
        self.queues
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    async fn apply<F>(&self, resource_id: &ResourceId, op: &'static str, f: F) -> Result<Mutation, AppError>
    where
        F: FnOnce(&mut AdmissionQueue) -> Mutation,
    {
        let Some(queue) = self.get(resource_id) else {
            return Ok(Mutation::default());
        };
        let mut guard = queue.lock().await;
        if guard.is_retired() {
            return Ok(Mutation::default());
        }
        let mutation = guarded(resource_id, op, || f(&mut guard))?;
        self.commit(&queue, &mut guard, &mutation);
        Ok(mutation)
    }

    /// Runs with the queue still locked: hand the mutation to the sink,
    /// then publish the new status or detach the queue if it emptied.
    fn commit(&self, queue: &SharedQueue, guard: &mut AdmissionQueue, mutation: &Mutation) {
        if mutation.is_noop() {
            return;
        }
        let resource_id = guard.resource_id();
        // Queue state is already committed; a failing sink only loses delivery.
        let _ = guarded(resource_id, "publish", || self.sink.publish(resource_id, mutation));

        if guard.is_empty() {
            let resource_id = guard.resource_id().clone();
            self.retire(&resource_id, queue, guard);
        } else {
            self.board.publish(guard.status());
        }
    }

    fn retire(&self, resource_id: &ResourceId, queue: &SharedQueue, guard: &mut AdmissionQueue) {
        if !guard.retire() {
            return;
        }
        self.board.remove(resource_id);
        self.queues
            .remove_if(resource_id, |_, current| Arc::ptr_eq(current, queue));
        debug!(resource_id = %resource_id, "Admission queue removed");
    }
}

/// Run one queue operation, containing any panic to this resource.
fn guarded<T, F>(resource_id: &ResourceId, op: &'static str, f: F) -> Result<T, AppError>
where
    F: FnOnce() -> T,
{
    catch_unwind(AssertUnwindSafe(f)).map_err(|_| {
        error!(resource_id = %resource_id, op, "Queue operation panicked");
        AppError::internal(format!("queue operation '{op}' failed for {resource_id}"))
    })
}
